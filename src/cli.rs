//! CLI definitions for pagepilot.

use std::path::PathBuf;

use clap::Parser;
use pagepilot_config::{InputSource, Preset, TaskConfig};

/// Drive a web application in an already-running browser.
#[derive(Parser, Debug)]
#[command(name = "pagepilot")]
#[command(about = "Run prompts through a web UI over CDP and print one JSON result line")]
#[command(version)]
pub(crate) struct Cli {
    /// Task configuration: inline JSON, a file path with --file, or base64 with --base64
    pub input: String,

    /// Treat the input as a path to a JSON or TOML file
    #[arg(long, conflicts_with = "base64")]
    pub file: bool,

    /// Treat the input as base64-encoded JSON
    #[arg(long)]
    pub base64: bool,

    /// Built-in selector bundle (chatgpt, gemini, flow)
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Browser remote-debugging endpoint
    #[arg(long, env = "PAGEPILOT_CDP_URL")]
    pub cdp: Option<String>,

    /// Page to open on connect
    #[arg(long)]
    pub goto: Option<String>,

    /// Idle wait bound in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Answer wait bound in milliseconds
    #[arg(long)]
    pub answer_wait: Option<u64>,

    /// Generation completion bound in milliseconds
    #[arg(long)]
    pub wait_timeout: Option<u64>,

    /// Stability window in milliseconds
    #[arg(long)]
    pub stabilize: Option<u64>,

    /// Save a screenshot when a task fails
    #[arg(long, overrides_with = "no_screenshot")]
    pub screenshot: bool,

    #[arg(long, overrides_with = "screenshot")]
    pub no_screenshot: bool,

    /// Default mode for prompts without one
    #[arg(long)]
    pub mode: Option<String>,

    /// Leave the current mode alone
    #[arg(long)]
    pub no_mode_switch: bool,

    /// Output file for generated artifacts
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Attempts per task, including the first
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long)]
    pub retry_delay: Option<u64>,
}

impl Cli {
    pub fn input_source(&self) -> InputSource {
        if self.file {
            InputSource::File
        } else if self.base64 {
            InputSource::Base64
        } else {
            InputSource::Inline
        }
    }

    /// Apply flags on top of the loaded configuration.
    pub fn apply(&self, config: &mut TaskConfig) {
        if let Some(preset) = self.preset {
            config.preset = Some(preset);
        }
        if let Some(cdp) = &self.cdp {
            config.cdp_url = cdp.clone();
        }
        if let Some(goto) = &self.goto {
            config.goto_url = Some(goto.clone());
        }
        if let Some(ms) = self.timeout {
            config.global_timeout_ms = ms;
        }
        if let Some(ms) = self.answer_wait {
            config.answer_wait_ms = ms;
        }
        if let Some(ms) = self.wait_timeout {
            config.wait_timeout_ms = ms;
        }
        if let Some(ms) = self.stabilize {
            config.stabilize_ms = ms;
        }
        if self.screenshot {
            config.screenshot = true;
        }
        if self.no_screenshot {
            config.screenshot = false;
        }
        if let Some(mode) = &self.mode {
            config.mode = Some(mode.clone());
        }
        if self.no_mode_switch {
            config.skip_mode_switch = true;
        }
        if let Some(path) = &self.output {
            config.output_path = Some(path.clone());
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.retry_delay {
            config.retry_delay_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["pagepilot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_input_source() {
        assert_eq!(parse(&["{}"]).input_source(), InputSource::Inline);
        assert_eq!(parse(&["--file", "task.json"]).input_source(), InputSource::File);
        assert_eq!(parse(&["--base64", "e30="]).input_source(), InputSource::Base64);
    }

    #[test]
    fn test_file_and_base64_conflict() {
        assert!(Cli::try_parse_from(["pagepilot", "--file", "--base64", "x"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--cdp",
            "http://127.0.0.1:9333",
            "--goto",
            "https://chat.example.com/",
            "--answer-wait",
            "1000",
            "--no-screenshot",
            "--no-mode-switch",
            "--max-retries",
            "5",
            "--output",
            "/tmp/out.mp4",
            "{}",
        ]);
        let mut config = TaskConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.cdp_url, "http://127.0.0.1:9333");
        assert_eq!(config.goto_url.as_deref(), Some("https://chat.example.com/"));
        assert_eq!(config.answer_wait_ms, 1000);
        assert!(!config.screenshot);
        assert!(config.skip_mode_switch);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/out.mp4")));
        assert_eq!(config.stabilize_ms, TaskConfig::default().stabilize_ms);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = parse(&["{}"]);
        let mut config = TaskConfig {
            screenshot: false,
            mode: Some("video".to_string()),
            ..Default::default()
        };
        cli.apply(&mut config);
        assert!(!config.screenshot);
        assert_eq!(config.mode.as_deref(), Some("video"));
    }
}
