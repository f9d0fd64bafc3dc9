//! External media transcoder.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use pagepilot_config::TranscodeConfig;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{AutomationError, Result};

/// Stderr lines kept in the error message.
const STDERR_TAIL_LINES: usize = 5;

/// Invokes `ffmpeg` (or a compatible program) as a black box.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
    timeout: Duration,
    enabled: bool,
}

impl Transcoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            enabled: true,
        }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            enabled: config.enabled,
        }
    }

    /// When disabled, artifacts are copied without re-muxing.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `-y -i <input> -c:v copy (-c:a copy | -an) <output>`
    pub fn args(input: &Path, output: &Path, keep_audio: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-c:v".into(),
            "copy".into(),
        ];
        if keep_audio {
            args.push("-c:a".into());
            args.push("copy".into());
        } else {
            args.push("-an".into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Run the transcoder and wait for it to exit.
    pub async fn run(&self, input: &Path, output: &Path, keep_audio: bool) -> Result<()> {
        info!(
            input = %input.display(),
            output = %output.display(),
            keep_audio,
            "Transcoding artifact"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(input, output, keep_audio))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                AutomationError::Transcode(format!(
                    "{} did not finish within {}ms",
                    self.program,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| AutomationError::Transcode(format!("cannot run {}: {}", self.program, e)))?;

        if result.status.success() {
            debug!(program = %self.program, "Transcoder finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(AutomationError::Transcode(format!(
            "{} exited with code {}: {}",
            self.program,
            result.status.code().unwrap_or(-1),
            tail
        )))
    }
}
