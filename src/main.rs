use std::io::IsTerminal;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodeflow_core::config::AppConfig;
use nodeflow_core::event::{EventBus, RunEvent};
use nodeflow_core::graph::Graph;
use nodeflow_core::settings::OutputAction;
use nodeflow_core::traits::{ClientFactory, CredentialProvider, Speaker, SuppliedCredential};
use nodeflow_core::types::GeneratedFile;
use nodeflow_engine::{schedule, CommandSpeaker, PipelineRunner, RunReport};
use nodeflow_llm::ProviderFactory;

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Run node-graph pipelines against generative providers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one or more workflow files concurrently
    Run {
        /// Workflow JSON files (graph snapshots or saved workflows)
        #[arg(required = true)]
        workflows: Vec<PathBuf>,
        /// OpenAI API key for gpt-4 prompt nodes
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_key: Option<String>,
        /// Fail instead of asking for a missing OpenAI key
        #[arg(long)]
        no_prompt: bool,
        /// Write a JSON summary of every run to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check workflows: print execution order and linking-rule violations
    Validate {
        #[arg(required = true)]
        workflows: Vec<PathBuf>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// A parsed workflow file.
struct Workflow {
    label: String,
    graph: Graph,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nodeflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "nodeflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            workflows,
            openai_key,
            no_prompt,
            report,
        } => {
            let workflows = workflows
                .iter()
                .map(|p| load_workflow(p.as_path()))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let credential = openai_key.map(SuppliedCredential::new).unwrap_or_default();
            run_workflows(&config, workflows, credential, no_prompt, report.as_deref()).await
        }
        Commands::Validate { workflows } => validate_workflows(&workflows),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }
}

fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let graph = Graph::from_json(&text).with_context(|| format!("parsing {}", path.display()))?;
    let label = graph.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow".to_string())
    });
    Ok(Workflow { label, graph })
}

async fn run_workflows(
    config: &AppConfig,
    workflows: Vec<Workflow>,
    mut credential: SuppliedCredential,
    no_prompt: bool,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let factory: Arc<dyn ClientFactory> = Arc::new(ProviderFactory::new(config.clone()));
    let speaker: Arc<dyn Speaker> = Arc::new(CommandSpeaker::new(config.output.speech_command.clone()));

    let results = join_all(
        workflows
            .iter()
            .map(|w| run_one(w, &factory, &speaker, &credential)),
    )
    .await;

    let mut reports = Vec::new();
    let mut needs_key = Vec::new();
    for (workflow, result) in workflows.iter().zip(results) {
        match result {
            Ok(report) => reports.push((workflow, report)),
            Err(e) if e.is_precondition() => needs_key.push(workflow),
            Err(e) => return Err(e).with_context(|| format!("running {}", workflow.label)),
        }
    }

    // A run that needs the OpenAI key never started; ask once and run those again.
    if !needs_key.is_empty() {
        if no_prompt || !std::io::stdin().is_terminal() {
            bail!("OpenAI API key is missing. Pass --openai-key or set OPENAI_API_KEY.");
        }
        credential = prompt_openai_key()?;
        let retried = join_all(
            needs_key
                .iter()
                .map(|w| run_one(w, &factory, &speaker, &credential)),
        )
        .await;
        for (workflow, result) in needs_key.into_iter().zip(retried) {
            let report = result.with_context(|| format!("running {}", workflow.label))?;
            reports.push((workflow, report));
        }
    }

    let output_dir = config.output_dir();
    let mut failed = 0;
    for (workflow, report) in &reports {
        match save_downloads(&output_dir, report) {
            Ok(paths) => {
                for path in paths {
                    println!("[{}] saved {}", workflow.label, path.display());
                }
            }
            Err(e) => warn!(workflow = %workflow.label, error = %e, "Could not save downloads"),
        }
        if !report.succeeded() {
            failed += 1;
        }
        println!(
            "[{}] {} in {} ms",
            workflow.label, report.status, report.elapsed_ms
        );
    }

    if let Some(path) = report_path {
        write_summary(path, &reports)?;
    }

    if failed > 0 {
        bail!("{} of {} workflows failed", failed, reports.len());
    }
    Ok(())
}

/// One run with its own event bus and console printer.
async fn run_one(
    workflow: &Workflow,
    factory: &Arc<dyn ClientFactory>,
    speaker: &Arc<dyn Speaker>,
    credential: &SuppliedCredential,
) -> nodeflow_core::Result<RunReport> {
    let bus = Arc::new(EventBus::default());
    let printer = tokio::spawn(print_events(workflow.label.clone(), bus.subscribe()));

    let runner = PipelineRunner::new(factory.clone())
        .with_speaker(speaker.clone())
        .with_sink(bus.clone());
    let result = runner.run(workflow.graph.clone(), credential).await;

    // Dropping every sender closes the channel and ends the printer.
    drop(runner);
    drop(bus);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer failed");
    }
    result
}

async fn print_events(label: String, mut rx: tokio::sync::broadcast::Receiver<RunEvent>) {
    loop {
        match rx.recv().await {
            Ok(RunEvent::Log(event)) => println!("[{}] {}", label, event),
            Ok(RunEvent::File(file)) => {
                let action = match file.action {
                    OutputAction::Download => "download",
                    OutputAction::Open => "view",
                };
                println!("[{}] file {} ({})", label, file.name, action);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(workflow = %label, skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn prompt_openai_key() -> anyhow::Result<SuppliedCredential> {
    let key: String = dialoguer::Password::new()
        .with_prompt("OpenAI API key (used for this run only)")
        .interact()?;
    let credential = SuppliedCredential::new(key);
    if credential.credential().is_none() {
        bail!("OpenAI API key is missing.");
    }
    Ok(credential)
}

/// Write every file marked for download into `dir`.
///
/// A file that cannot be written is logged and skipped so the rest still land.
fn save_downloads(dir: &Path, report: &RunReport) -> anyhow::Result<Vec<PathBuf>> {
    let downloads: Vec<_> = report
        .files
        .iter()
        .filter(|f| f.action == OutputAction::Download)
        .collect();
    if downloads.is_empty() {
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut saved = Vec::with_capacity(downloads.len());
    for file in downloads {
        match save_file(dir, file) {
            Ok(path) => {
                info!(path = %path.display(), "Saved generated file");
                saved.push(path);
            }
            Err(e) => warn!(file = %file.name, error = %e, "Skipping generated file"),
        }
    }
    Ok(saved)
}

fn save_file(dir: &Path, file: &GeneratedFile) -> anyhow::Result<PathBuf> {
    let name = file.file_name();
    // Exactly one plain component, so the file stays inside `dir`.
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => bail!("{:?} is not a plain file name", name),
    }

    let path = dir.join(name);
    let bytes = file.decode()?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn write_summary(path: &Path, reports: &[(&Workflow, RunReport)]) -> anyhow::Result<()> {
    let runs: Vec<serde_json::Value> = reports
        .iter()
        .map(|(workflow, report)| {
            serde_json::json!({
                "workflow": workflow.label,
                "run": report.summary(),
            })
        })
        .collect();
    let text = serde_json::to_string_pretty(&runs)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), runs = runs.len(), "Wrote run summary");
    Ok(())
}

fn validate_workflows(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut invalid = 0;
    for path in paths {
        let workflow = load_workflow(path)?;
        let schedule = schedule(&workflow.graph).with_context(|| format!("checking {}", workflow.label))?;

        let order: Vec<&str> = schedule.order.iter().map(|n| n.name.as_str()).collect();
        println!("{}: {}", workflow.label, order.join(" -> "));

        if !schedule.is_complete() {
            let excluded: Vec<&str> = schedule.excluded.iter().map(|n| n.name.as_str()).collect();
            println!("  cycle or unreachable: {}", excluded.join(", "));
            invalid += 1;
        }
        let violations = workflow.graph.policy_violations();
        for violation in &violations {
            println!("  {}", violation);
        }
        if !violations.is_empty() {
            invalid += 1;
        }
        if workflow.graph.needs_secondary() {
            println!("  needs an OpenAI API key");
        }
        info!(workflow = %workflow.label, nodes = workflow.graph.nodes.len(), "Validated");
    }

    if invalid > 0 {
        bail!("{} problem(s) found", invalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use nodeflow_core::types::RunStatus;

    fn report_with(files: Vec<GeneratedFile>) -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            status: RunStatus::Success,
            order: Vec::new(),
            artifacts: HashMap::new(),
            events: Vec::new(),
            files,
            failed_node: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    fn pdf(name: &str) -> GeneratedFile {
        GeneratedFile::from_bytes(name, "application/pdf", b"%PDF-1.4", OutputAction::Download)
    }

    #[test]
    fn test_save_downloads_writes_only_downloads() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("out");
        let report = report_with(vec![
            pdf("Report_1.pdf"),
            GeneratedFile::from_bytes("Cover_2.png", "image/png", b"png", OutputAction::Open),
        ]);

        let saved = save_downloads(&dir, &report).unwrap();

        assert_eq!(saved, vec![dir.join("Report_1.pdf")]);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), b"%PDF-1.4");
        assert!(!dir.join("Cover_2.png").exists());
    }

    #[test]
    fn test_save_downloads_never_leaves_output_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("out");
        let report = report_with(vec![
            pdf("../escaped.pdf"),
            pdf("Q1/Q2 Report.pdf"),
            pdf("/abs.pdf"),
            pdf(".."),
            pdf("Kept.pdf"),
        ]);

        let saved = save_downloads(&dir, &report).unwrap();

        assert_eq!(saved, vec![dir.join("Kept.pdf")]);
        assert!(!root.path().join("escaped.pdf").exists());
        assert!(!dir.join("Q1").exists());
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_save_downloads_skips_undecodable_file() {
        let root = tempfile::tempdir().unwrap();
        let broken = GeneratedFile {
            name: "Broken.pdf".to_string(),
            url: "blob:nowhere".to_string(),
            action: OutputAction::Download,
        };
        let report = report_with(vec![broken, pdf("Good.pdf")]);

        let saved = save_downloads(root.path(), &report).unwrap();

        assert_eq!(saved, vec![root.path().join("Good.pdf")]);
    }

    #[test]
    fn test_nothing_to_download_creates_no_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("never");
        assert!(save_downloads(&dir, &report_with(Vec::new())).unwrap().is_empty());
        assert!(!dir.exists());
    }
}
