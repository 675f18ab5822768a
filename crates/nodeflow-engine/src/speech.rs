use std::process::Stdio;

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::Speaker;

/// Speaks text by spawning a local TTS program and writing the text to its
/// stdin. Fire-and-forget: the call returns once the process has started
/// and its exit status is only traced.
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    command: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Default for CommandSpeaker {
    fn default() -> Self {
        Self::new(vec!["espeak".to_string(), "--stdin".to_string()])
    }
}

impl Speaker for CommandSpeaker {
    fn speak<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (program, args) = self
                .command
                .split_first()
                .ok_or_else(|| FlowError::Config("speech_command is empty".to_string()))?;

            let mut child = tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;

            debug!(program = %program, chars = text.chars().count(), "Speaking text");
            let program = program.clone();
            let text = text.to_owned();
            let stdin = child.stdin.take();
            tokio::spawn(async move {
                if let Some(mut stdin) = stdin {
                    // Closing stdin marks the end of the text.
                    if let Err(e) = stdin.write_all(text.as_bytes()).await {
                        warn!(program = %program, error = %e, "Could not write text to speech command");
                    }
                }
                match child.wait().await {
                    Ok(s) if !s.success() => {
                        warn!(program = %program, code = s.code(), "Speech command exited non-zero")
                    }
                    Err(e) => warn!(program = %program, error = %e, "Speech command failed"),
                    _ => {}
                }
            });
            Ok(())
        })
    }
}
