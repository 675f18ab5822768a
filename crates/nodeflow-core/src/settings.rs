use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Model served by the primary provider.
pub const PRIMARY_MODEL: &str = "gemini-2.5-flash";
/// Model name that selects the secondary provider.
pub const SECONDARY_MODEL: &str = "gpt-4";

/// The kind of a node. Decides which handler runs it and how its inputs
/// are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Input,
    Prompt,
    Process,
    Output,
    Iteration,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Input => "input",
            NodeType::Prompt => "prompt",
            NodeType::Process => "process",
            NodeType::Output => "output",
            NodeType::Iteration => "iteration",
        }
    }

    /// Fan-in types join every upstream artifact; the rest take one.
    pub fn accepts_multiple_inputs(&self) -> bool {
        matches!(self, NodeType::Process | NodeType::Output)
    }

    /// Maximum number of inbound edges the editor allows, `None` if unlimited.
    pub fn max_inbound(&self) -> Option<usize> {
        match self {
            NodeType::Process => Some(3),
            NodeType::Output => None,
            NodeType::Input | NodeType::Prompt | NodeType::Iteration => Some(1),
        }
    }

    /// Whether a new inbound edge replaces the existing one instead of
    /// being appended.
    pub fn replaces_inbound(&self) -> bool {
        matches!(
            self,
            NodeType::Input | NodeType::Prompt | NodeType::Iteration
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSettings {
    Input(InputSettings),
    Prompt(PromptSettings),
    Process(ProcessSettings),
    Output(OutputSettings),
    Iteration(IterationSettings),
}

impl NodeSettings {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeSettings::Input(_) => NodeType::Input,
            NodeSettings::Prompt(_) => NodeType::Prompt,
            NodeSettings::Process(_) => NodeType::Process,
            NodeSettings::Output(_) => NodeType::Output,
            NodeSettings::Iteration(_) => NodeType::Iteration,
        }
    }

    /// Settings a freshly placed node of this type starts with.
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Input => NodeSettings::Input(InputSettings::default()),
            NodeType::Prompt => NodeSettings::Prompt(PromptSettings::default()),
            NodeType::Process => NodeSettings::Process(ProcessSettings::default()),
            NodeType::Output => NodeSettings::Output(OutputSettings::default()),
            NodeType::Iteration => NodeSettings::Iteration(IterationSettings::default()),
        }
    }

    pub(crate) fn from_value(node_type: NodeType, value: serde_json::Value) -> serde_json::Result<Self> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        Ok(match node_type {
            NodeType::Input => NodeSettings::Input(serde_json::from_value(value)?),
            NodeType::Prompt => NodeSettings::Prompt(serde_json::from_value(value)?),
            NodeType::Process => NodeSettings::Process(serde_json::from_value(value)?),
            NodeType::Output => NodeSettings::Output(serde_json::from_value(value)?),
            NodeType::Iteration => NodeSettings::Iteration(serde_json::from_value(value)?),
        })
    }

    pub(crate) fn to_value(&self) -> serde_json::Value {
        let value = match self {
            NodeSettings::Input(s) => serde_json::to_value(s),
            NodeSettings::Prompt(s) => serde_json::to_value(s),
            NodeSettings::Process(s) => serde_json::to_value(s),
            NodeSettings::Output(s) => serde_json::to_value(s),
            NodeSettings::Iteration(s) => serde_json::to_value(s),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

// ── Input ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Text,
    Url,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputSettings {
    #[serde(rename = "inputType")]
    pub mode: InputMode,
    #[serde(rename = "inputText")]
    pub text: String,
    pub url: String,
}

// ── Prompt ───────────────────────────────────────────────────────

/// Which provider a prompt node resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderChoice {
    Primary,
    Secondary,
    /// An unimplemented model name; served by the primary provider.
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptSettings {
    #[serde(rename = "llm")]
    pub provider: String,
    pub prompt_text: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            provider: PRIMARY_MODEL.to_string(),
            prompt_text: "Enter your prompt here...".to_string(),
        }
    }
}

impl PromptSettings {
    pub fn provider_choice(&self) -> ProviderChoice {
        match self.provider.as_str() {
            SECONDARY_MODEL => ProviderChoice::Secondary,
            "" | PRIMARY_MODEL => ProviderChoice::Primary,
            other => ProviderChoice::Fallback(other.to_string()),
        }
    }

    pub fn uses_secondary(&self) -> bool {
        self.provider_choice() == ProviderChoice::Secondary
    }
}

// ── Process ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    #[default]
    Merge,
    Diff,
    Common,
}

impl ProcessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessMode::Merge => "merge",
            ProcessMode::Diff => "diff",
            ProcessMode::Common => "common",
        }
    }

    /// Build the generative prompt that combines `texts` in this mode.
    pub fn build_prompt(&self, texts: &[String]) -> String {
        let count = texts.len();
        let (instruction, heading, label) = match self {
            ProcessMode::Diff => (
                format!(
                    "Analyze the following {count} pieces of text and provide a concise, \
                     bullet-point summary of the key contrasting points and differences between them."
                ),
                "--- Texts for Comparison ---",
                "Text",
            ),
            ProcessMode::Common => (
                format!(
                    "Analyze the following {count} pieces of text and generate a concise, \
                     bullet-point summary of the shared themes, overlapping information, \
                     and commonalities found across all of them."
                ),
                "--- Texts for Analysis ---",
                "Text",
            ),
            ProcessMode::Merge => (
                format!(
                    "Intelligently combine the following {count} pieces of text into a single, \
                     coherent, and well-structured document. Maintain the core information and \
                     logical flow, avoiding redundancy where possible."
                ),
                "--- Texts to Merge ---",
                "Piece",
            ),
        };

        let body = texts
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{} {}:\n{}", label, i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!("{instruction}\n\n{heading}\n\n{body}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessSettings {
    #[serde(rename = "processType", deserialize_with = "or_default")]
    pub mode: ProcessMode,
}

// ── Output ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Console,
    Pdf,
    Image,
    Audio,
}

/// What the collaborator should do with a materialized file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputAction {
    #[default]
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "newTab", alias = "open")]
    Open,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputSettings {
    #[serde(rename = "outputType", deserialize_with = "or_default")]
    pub kind: OutputKind,
    pub action: OutputAction,
}

/// Unknown or malformed values fall back to the default variant instead of
/// rejecting the whole workflow.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

// ── Iteration ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    #[default]
    For,
    While,
    If,
}

/// Loop/condition fields. Stored and round-tripped, never evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IterationSettings {
    pub loop_type: LoopType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<String>,
}

impl Default for IterationSettings {
    fn default() -> Self {
        Self {
            loop_type: LoopType::For,
            initialization: Some("let i = 0".to_string()),
            condition: Some("i < 10".to_string()),
            increment: Some("i++".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_limits() {
        assert_eq!(NodeType::Process.max_inbound(), Some(3));
        assert_eq!(NodeType::Output.max_inbound(), None);
        assert_eq!(NodeType::Prompt.max_inbound(), Some(1));
        assert!(NodeType::Iteration.replaces_inbound());
        assert!(!NodeType::Output.replaces_inbound());
        assert!(NodeType::Output.accepts_multiple_inputs());
        assert!(!NodeType::Input.accepts_multiple_inputs());
    }

    #[test]
    fn test_provider_choice() {
        let mut s = PromptSettings::default();
        assert_eq!(s.provider_choice(), ProviderChoice::Primary);

        s.provider = "gpt-4".into();
        assert!(s.uses_secondary());

        s.provider = "grok".into();
        assert_eq!(s.provider_choice(), ProviderChoice::Fallback("grok".into()));
    }

    #[test]
    fn test_diff_prompt_wording() {
        let prompt = ProcessMode::Diff.build_prompt(&["alpha".into(), "beta".into()]);
        assert!(prompt.starts_with("Analyze the following 2 pieces of text"));
        assert!(prompt.contains("differences"));
        assert!(prompt.contains("Text 1:\nalpha\n\nText 2:\nbeta"));
    }

    #[test]
    fn test_merge_prompt_uses_pieces() {
        let prompt = ProcessMode::Merge.build_prompt(&["one".into()]);
        assert!(prompt.contains("--- Texts to Merge ---"));
        assert!(prompt.contains("Piece 1:\none"));
    }

    #[test]
    fn test_settings_defaults_from_partial_json() {
        let s = NodeSettings::from_value(
            NodeType::Output,
            serde_json::json!({ "outputType": "pdf" }),
        )
        .unwrap();
        assert_eq!(
            s,
            NodeSettings::Output(OutputSettings {
                kind: OutputKind::Pdf,
                action: OutputAction::Download,
            })
        );

        let s = NodeSettings::from_value(NodeType::Prompt, serde_json::Value::Null).unwrap();
        assert_eq!(s, NodeSettings::Prompt(PromptSettings::default()));
    }

    #[test]
    fn test_unknown_process_and_output_types_fall_back() {
        let s = NodeSettings::from_value(
            NodeType::Process,
            serde_json::json!({ "processType": "summarize" }),
        )
        .unwrap();
        assert_eq!(s, NodeSettings::Process(ProcessSettings { mode: ProcessMode::Merge }));

        let s = NodeSettings::from_value(
            NodeType::Output,
            serde_json::json!({ "outputType": "video", "action": "newTab" }),
        )
        .unwrap();
        assert_eq!(
            s,
            NodeSettings::Output(OutputSettings {
                kind: OutputKind::Console,
                action: OutputAction::Open,
            })
        );

        let s = NodeSettings::from_value(NodeType::Output, serde_json::json!({ "outputType": null }))
            .unwrap();
        assert_eq!(s, NodeSettings::Output(OutputSettings::default()));

        let s = NodeSettings::from_value(NodeType::Process, serde_json::json!({ "processType": "diff" }))
            .unwrap();
        assert_eq!(s, NodeSettings::Process(ProcessSettings { mode: ProcessMode::Diff }));
    }

    #[test]
    fn test_output_action_aliases() {
        let a: OutputAction = serde_json::from_str("\"newTab\"").unwrap();
        assert_eq!(a, OutputAction::Open);
        let a: OutputAction = serde_json::from_str("\"open\"").unwrap();
        assert_eq!(a, OutputAction::Open);
    }
}
