//! Task results and artifacts.

use std::path::PathBuf;

use pagepilot_config::Strategy;
use pagepilot_protocols::{DownloadEvent, ElementHandle};
use serde::{Deserialize, Serialize};

use crate::error::AutomationError;

/// Outcome class of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
    Timeout,
    /// Empty prompt, never sent.
    Skipped,
}

/// A file on local disk produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub method: Strategy,
}

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    /// Answer text from a chat workflow.
    Text { text: String },
    /// Remote location, when downloading is disabled.
    Url { url: String },
    File(LocalArtifact),
}

/// Evidence that an artifact exists before its bytes are local.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingArtifact {
    /// `src`/`href` read from an element.
    Reference {
        url: String,
        element: Option<ElementHandle>,
    },
    /// A browser download event.
    Download(DownloadEvent),
    /// A network request seen while the task ran.
    Captured { url: String },
    /// A fresh file found on disk.
    Written { path: PathBuf },
}

impl PendingArtifact {
    /// Strategy that produced this evidence.
    pub fn method(&self) -> Strategy {
        match self {
            PendingArtifact::Reference { .. } => Strategy::Direct,
            PendingArtifact::Download(_) => Strategy::ClickDownload,
            PendingArtifact::Captured { .. } => Strategy::NetworkCapture,
            PendingArtifact::Written { .. } => Strategy::FilesystemScan,
        }
    }
}

/// Result of one task, as reported in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub index: u32,
    pub status: TaskStatus,
    pub elapsed_ms: u64,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl TaskResult {
    pub fn success(index: u32, output: TaskOutput, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            index,
            status: TaskStatus::Success,
            elapsed_ms,
            attempts,
            output: Some(output),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(index: u32, error: &AutomationError, attempts: u32, elapsed_ms: u64) -> Self {
        let status = match error {
            AutomationError::Timeout { .. } => TaskStatus::Timeout,
            _ => TaskStatus::Failure,
        };
        Self {
            index,
            status,
            elapsed_ms,
            attempts,
            output: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }

    pub fn skipped(index: u32) -> Self {
        Self {
            index,
            status: TaskStatus::Skipped,
            elapsed_ms: 0,
            attempts: 0,
            output: None,
            error: None,
            error_kind: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    /// Failed or timed out.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, TaskStatus::Failure | TaskStatus::Timeout)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Some(TaskOutput::Text { text }) => Some(text),
            _ => None,
        }
    }
}

/// Results of a whole queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<TaskResult>,
    pub total_time_ms: u64,
    pub reconnects: u32,
    /// Diagnostic screenshot taken on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl RunReport {
    /// No task failed or timed out.
    pub fn succeeded(&self) -> bool {
        !self.results.iter().any(TaskResult::is_failure)
    }

    /// Tasks that finished successfully.
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn first_failure(&self) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.is_failure())
    }

    /// Path of the last file artifact, if any.
    pub fn last_output_path(&self) -> Option<&PathBuf> {
        self.results.iter().rev().find_map(|r| match &r.output {
            Some(TaskOutput::File(artifact)) => Some(&artifact.path),
            _ => None,
        })
    }
}
