//! Artifact acquisition and transcode configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::default_true;

/// One artifact acquisition method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `src`/`href` of the completion element.
    Direct,
    /// Click the download button and wait for the browser download.
    ClickDownload,
    /// Request URLs observed on the page.
    NetworkCapture,
    /// Newest plausible file in the download directories.
    FilesystemScan,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::ClickDownload => "click_download",
            Strategy::NetworkCapture => "network_capture",
            Strategy::FilesystemScan => "filesystem_scan",
        }
    }
}

/// Artifact acquisition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Strategies tried in order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<Strategy>,

    /// How long to wait for a click-triggered download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_ms: u64,

    /// Captured URLs must contain one of these hosts...
    #[serde(default = "default_capture_hosts")]
    pub capture_hosts: Vec<String>,

    /// ...and one of these markers.
    #[serde(default = "default_capture_markers")]
    pub capture_markers: Vec<String>,

    #[serde(default = "default_scan_dirs")]
    pub scan_dirs: Vec<PathBuf>,

    /// Lowercase extensions without the dot.
    #[serde(default = "default_scan_extensions")]
    pub scan_extensions: Vec<String>,

    /// Case-insensitive regex the file name must match.
    #[serde(default = "default_scan_name_pattern")]
    pub scan_name_pattern: String,

    /// Files older than this are ignored.
    #[serde(default = "default_recency")]
    pub recency_ms: u64,

    #[serde(default = "default_min_size")]
    pub min_size_bytes: u64,

    /// Total time the scan keeps looking.
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_ms: u64,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            download_timeout_ms: default_download_timeout(),
            capture_hosts: default_capture_hosts(),
            capture_markers: default_capture_markers(),
            scan_dirs: default_scan_dirs(),
            scan_extensions: default_scan_extensions(),
            scan_name_pattern: default_scan_name_pattern(),
            recency_ms: default_recency(),
            min_size_bytes: default_min_size(),
            scan_timeout_ms: default_scan_timeout(),
            scan_interval_ms: default_scan_interval(),
        }
    }
}

fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::Direct,
        Strategy::ClickDownload,
        Strategy::NetworkCapture,
        Strategy::FilesystemScan,
    ]
}

fn default_download_timeout() -> u64 {
    180_000
}

fn default_capture_hosts() -> Vec<String> {
    vec![
        "storage.googleapis.com".to_string(),
        "googleusercontent.com".to_string(),
    ]
}

fn default_capture_markers() -> Vec<String> {
    vec![".mp4".to_string(), "video".to_string(), "download".to_string()]
}

fn default_scan_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/mnt/downloads"),
        PathBuf::from("~/Downloads"),
    ]
}

fn default_scan_extensions() -> Vec<String> {
    vec!["mp4".to_string()]
}

fn default_scan_name_pattern() -> String {
    r"flow|video|scene|export|^\d{1,2}月".to_string()
}

fn default_recency() -> u64 {
    300_000
}

fn default_min_size() -> u64 {
    100_000
}

fn default_scan_timeout() -> u64 {
    60_000
}

fn default_scan_interval() -> u64 {
    2_000
}

/// External transcoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Re-mux through the transcoder; otherwise the artifact is copied as-is.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ffmpeg")]
    pub program: String,

    #[serde(default = "default_transcode_timeout")]
    pub timeout_ms: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_ffmpeg(),
            timeout_ms: default_transcode_timeout(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_transcode_timeout() -> u64 {
    300_000
}
