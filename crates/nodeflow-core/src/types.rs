use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::settings::OutputAction;

/// The value a node hands downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Text(String),
    /// A materialized file. Keeps the text it was produced from so that
    /// downstream aggregation still has something to join.
    File { name: String, text: String },
}

impl Artifact {
    pub fn empty() -> Self {
        Artifact::Text(String::new())
    }

    pub fn as_text(&self) -> &str {
        match self {
            Artifact::Text(text) => text,
            Artifact::File { text, .. } => text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_text().is_empty()
    }
}

impl From<String> for Artifact {
    fn from(text: String) -> Self {
        Artifact::Text(text)
    }
}

impl From<&str> for Artifact {
    fn from(text: &str) -> Self {
        Artifact::Text(text.to_string())
    }
}

/// Severity/category of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Data,
    Success,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Data => "data",
            LogKind::Success => "success",
            LogKind::Error => "error",
        }
    }
}

/// A single entry of a run's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            time: Local::now().format("%H:%M:%S").to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<7} {}", self.time, self.kind.as_str(), self.message)
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Descriptor of a file produced during a run.
///
/// `url` is a `data:` URI holding the full content, so the descriptor alone
/// is enough to save or display the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub action: OutputAction,
}

/// Appended to the display name of files registered for their text alone.
pub const TEXT_CONTENT_SUFFIX: &str = " (text content)";

impl GeneratedFile {
    /// Name to save under, without any display suffix.
    pub fn file_name(&self) -> &str {
        self.name.strip_suffix(TEXT_CONTENT_SUFFIX).unwrap_or(&self.name)
    }

    /// Build a descriptor whose url embeds `bytes` as base64.
    pub fn from_bytes(name: impl Into<String>, mime: &str, bytes: &[u8], action: OutputAction) -> Self {
        Self {
            name: name.into(),
            url: format!("data:{};base64,{}", mime, BASE64.encode(bytes)),
            action,
        }
    }

    /// MIME type declared by the data URI.
    pub fn mime(&self) -> Option<&str> {
        let rest = self.url.strip_prefix("data:")?;
        let (meta, _) = rest.split_once(',')?;
        Some(meta.split(';').next().unwrap_or(meta))
    }

    /// Decode the embedded content.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let rest = self
            .url
            .strip_prefix("data:")
            .ok_or_else(|| FlowError::Render(format!("{}: not a data URI", self.name)))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| FlowError::Render(format!("{}: malformed data URI", self.name)))?;

        if meta.ends_with(";base64") {
            BASE64
                .decode(payload)
                .map_err(|e| FlowError::Render(format!("{}: {}", self.name, e)))
        } else {
            Ok(payload.as_bytes().to_vec())
        }
    }
}
