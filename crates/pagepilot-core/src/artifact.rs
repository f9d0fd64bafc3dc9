//! Artifact acquisition.
//!
//! Strategies run in the configured order until one yields a file:
//!
//! 1. `direct`: `src`/`href` of the completion element (http(s), `data:` or `blob:`)
//! 2. `click_download`: click the download button and take the browser download
//! 3. `network_capture`: newest matching request URL seen since the trigger
//! 4. `filesystem_scan`: newest plausible file in the download directories
//!
//! The winning file is then transcoded (or copied) to the output path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use base64::Engine;
use pagepilot_config::{AcquisitionConfig, Strategy};
use pagepilot_protocols::{BrowserPage, ElementHandle, SelectorSet};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::error::{AutomationError, Result};
use crate::result::{LocalArtifact, PendingArtifact};
use crate::selector::SelectorResolver;
use crate::transcode::Transcoder;
use crate::wait::{wait_for, PollError};

/// Attributes that may carry the artifact URL, in order.
const URL_ATTRIBUTES: &[&str] = &["src", "href"];

/// What the caller knows when generation finishes.
#[derive(Debug, Clone, Default)]
pub struct AcquireRequest {
    /// Element that signalled completion.
    pub hint: Option<ElementHandle>,
    /// Elements carrying the artifact URL.
    pub artifact: SelectorSet,
    pub download_button: SelectorSet,
    /// Request URLs seen before the trigger; never captured.
    pub requests_before: HashSet<String>,
    pub output_path: PathBuf,
}

/// A file ready for post-processing.
#[derive(Debug)]
struct Staged {
    path: PathBuf,
    /// Ours to delete once finalized.
    temporary: bool,
}

pub struct ArtifactAcquirer {
    config: AcquisitionConfig,
    name_pattern: Regex,
    transcoder: Transcoder,
    keep_audio: bool,
    http: reqwest::Client,
    work_dir: PathBuf,
    element_timeout: Duration,
    poll_interval: Duration,
    staged: AtomicU64,
}

impl ArtifactAcquirer {
    pub fn new(config: AcquisitionConfig, transcoder: Transcoder, keep_audio: bool) -> Result<Self> {
        let name_pattern = RegexBuilder::new(&config.scan_name_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| AutomationError::Configuration(format!("scan_name_pattern: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.download_timeout_ms))
            .build()
            .map_err(|e| AutomationError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            config,
            name_pattern,
            transcoder,
            keep_audio,
            http,
            work_dir: std::env::temp_dir().join("pagepilot-work"),
            element_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            staged: AtomicU64::new(0),
        })
    }

    /// Directory for files downloaded before post-processing.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Bounds for waiting on the download button.
    pub fn with_timing(mut self, element_timeout: Duration, poll_interval: Duration) -> Self {
        self.element_timeout = element_timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Run the strategy chain and place the artifact at `request.output_path`.
    pub async fn acquire(
        &self,
        page: &dyn BrowserPage,
        request: &AcquireRequest,
    ) -> Result<LocalArtifact> {
        let mut failures = Vec::new();

        for &strategy in &self.config.strategies {
            debug!(strategy = strategy.as_str(), "Trying acquisition strategy");
            let attempt = match self.locate(strategy, page, request).await {
                Ok(Some(pending)) => self.materialize(page, &pending, request).await,
                Ok(None) => Err(AutomationError::Acquisition("nothing found".to_string())),
                Err(e) => Err(e),
            };

            match attempt {
                Ok(staged) => {
                    info!(strategy = strategy.as_str(), path = %staged.path.display(), "Artifact located");
                    return self.finalize(staged, &request.output_path, strategy).await;
                }
                Err(e) if e.is_disconnect() => return Err(e),
                Err(e) => {
                    warn!(strategy = strategy.as_str(), error = %e, "Acquisition strategy failed");
                    failures.push(format!("{}: {}", strategy.as_str(), e));
                }
            }
        }

        Err(AutomationError::Acquisition(if failures.is_empty() {
            "no strategies enabled".to_string()
        } else {
            failures.join("; ")
        }))
    }

    async fn locate(
        &self,
        strategy: Strategy,
        page: &dyn BrowserPage,
        request: &AcquireRequest,
    ) -> Result<Option<PendingArtifact>> {
        match strategy {
            Strategy::Direct => self.direct_reference(page, request).await,
            Strategy::ClickDownload => self.click_download(page, request).await,
            Strategy::NetworkCapture => Ok(self.network_capture(page, request)),
            Strategy::FilesystemScan => self.filesystem_scan().await,
        }
    }

    async fn direct_reference(
        &self,
        page: &dyn BrowserPage,
        request: &AcquireRequest,
    ) -> Result<Option<PendingArtifact>> {
        let mut candidates: Vec<ElementHandle> = request.hint.iter().cloned().collect();
        if !request.artifact.is_empty() {
            let found = SelectorResolver::new(page)
                .find_all_visible(&request.artifact)
                .await?;
            candidates.extend(found.into_iter().rev());
        }

        for element in candidates {
            for name in URL_ATTRIBUTES {
                let value = match page.attribute(&element, name).await {
                    Ok(value) => value,
                    Err(e) if e.is_disconnect() => return Err(e.into()),
                    Err(e) => {
                        debug!(error = %e, "Cannot read artifact attribute");
                        None
                    }
                };
                if let Some(url) = value.filter(|v| is_fetchable(v)) {
                    return Ok(Some(PendingArtifact::Reference {
                        url,
                        element: Some(element),
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn click_download(
        &self,
        page: &dyn BrowserPage,
        request: &AcquireRequest,
    ) -> Result<Option<PendingArtifact>> {
        if request.download_button.is_empty() {
            return Ok(None);
        }
        let button = match SelectorResolver::new(page)
            .wait_visible(&request.download_button, self.element_timeout, self.poll_interval)
            .await
        {
            Ok(button) => button,
            Err(AutomationError::Timeout { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let timeout = Duration::from_millis(self.config.download_timeout_ms);
        let event = page.click_and_wait_download(&button, timeout).await?;
        debug!(url = %event.url, file = %event.suggested_filename, "Download event");
        Ok(Some(PendingArtifact::Download(event)))
    }

    fn network_capture(&self, page: &dyn BrowserPage, request: &AcquireRequest) -> Option<PendingArtifact> {
        page.observed_requests()
            .into_iter()
            .rev()
            .filter(|url| !request.requests_before.contains(url))
            .find(|url| self.is_capture_candidate(url))
            .map(|url| PendingArtifact::Captured { url })
    }

    fn is_capture_candidate(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();
        self.config.capture_hosts.iter().any(|h| host.contains(&h.to_lowercase()))
            && self
                .config
                .capture_markers
                .iter()
                .any(|m| lower.contains(&m.to_lowercase()))
    }

    async fn filesystem_scan(&self) -> Result<Option<PendingArtifact>> {
        let found = wait_for(
            || async { self.scan_once().await.map_err(PollError::from) },
            Duration::from_millis(self.config.scan_timeout_ms),
            Duration::from_millis(self.config.scan_interval_ms),
            "filesystem scan",
        )
        .await;

        match found {
            Ok(path) => Ok(Some(PendingArtifact::Written { path })),
            Err(AutomationError::Timeout { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Newest file in the scan directories that passes every filter.
    async fn scan_once(&self) -> Result<Option<PathBuf>> {
        let now = SystemTime::now();
        let recency = Duration::from_millis(self.config.recency_ms);
        let mut best: Option<(SystemTime, PathBuf)> = None;

        for dir in &self.config.scan_dirs {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !self.matches_name(&path) {
                    continue;
                }
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                if !meta.is_file() || meta.len() < self.config.min_size_bytes {
                    continue;
                }
                let Ok(modified) = meta.modified() else {
                    continue;
                };
                let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
                if age > recency {
                    continue;
                }
                if best.as_ref().is_none_or(|(t, _)| modified > *t) {
                    best = Some((modified, path));
                }
            }
        }
        Ok(best.map(|(_, path)| path))
    }

    fn matches_name(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .scan_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            });
        let name_ok = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.name_pattern.is_match(name));
        ext_ok && name_ok
    }

    /// Bring the pending artifact onto local disk.
    async fn materialize(
        &self,
        page: &dyn BrowserPage,
        pending: &PendingArtifact,
        request: &AcquireRequest,
    ) -> Result<Staged> {
        match pending {
            PendingArtifact::Reference { url, .. } | PendingArtifact::Captured { url } => {
                self.fetch(page, url, &request.output_path).await
            }
            PendingArtifact::Download(event) => match &event.saved_path {
                Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => Ok(Staged {
                    path: path.clone(),
                    temporary: true,
                }),
                _ => self.fetch(page, &event.url, &request.output_path).await,
            },
            PendingArtifact::Written { path } => Ok(Staged {
                path: path.clone(),
                temporary: false,
            }),
        }
    }

    /// Download `url` into the work directory.
    async fn fetch(&self, page: &dyn BrowserPage, url: &str, output: &Path) -> Result<Staged> {
        let bytes = if url.starts_with("data:") {
            decode_data_url(url)?
        } else if url.starts_with("blob:") {
            let data_url = page.fetch_as_data_url(url).await?;
            decode_data_url(&data_url)?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url).await?
        } else {
            return Err(AutomationError::Acquisition(format!(
                "unsupported URL scheme: {}",
                truncate(url)
            )));
        };

        if bytes.is_empty() {
            return Err(AutomationError::Acquisition(format!(
                "empty body from {}",
                truncate(url)
            )));
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self.staging_path(output);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Staged artifact");
        Ok(Staged {
            path,
            temporary: true,
        })
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AutomationError::Acquisition(format!("GET {}: {}", truncate(url), e)))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| AutomationError::Acquisition(format!("reading {}: {}", truncate(url), e)))?;
        Ok(body.to_vec())
    }

    fn staging_path(&self, output: &Path) -> PathBuf {
        let ext = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let n = self.staged.fetch_add(1, Ordering::SeqCst);
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%3f");
        self.work_dir
            .join(format!("artifact-{}-{}-{}.{}", stamp, std::process::id(), n, ext))
    }

    /// Transcode or copy to `output`, then drop the staged file if it is ours.
    async fn finalize(&self, staged: Staged, output: &Path, method: Strategy) -> Result<LocalArtifact> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let placed = if self.transcoder.is_enabled() {
            self.transcoder.run(&staged.path, output, self.keep_audio).await
        } else {
            tokio::fs::copy(&staged.path, output)
                .await
                .map(|_| ())
                .map_err(AutomationError::from)
        };

        if staged.temporary {
            if let Err(e) = tokio::fs::remove_file(&staged.path).await {
                debug!(path = %staged.path.display(), error = %e, "Could not remove staged file");
            }
        }
        placed?;

        let size_bytes = tokio::fs::metadata(output).await?.len();
        info!(path = %output.display(), size_bytes, method = method.as_str(), "Artifact saved");
        Ok(LocalArtifact {
            path: output.to_path_buf(),
            size_bytes,
            method,
        })
    }
}

fn is_fetchable(url: &str) -> bool {
    ["http://", "https://", "data:", "blob:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Decode a `data:` URL. Payloads without `;base64` are percent-encoded.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AutomationError::Acquisition("not a data: URL".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AutomationError::Acquisition("data: URL without payload".to_string()))?;

    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| AutomationError::Acquisition(format!("invalid base64 payload: {}", e)))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// Keep long data URLs out of messages.
fn truncate(url: &str) -> String {
    const MAX: usize = 120;
    if url.len() <= MAX {
        return url.to_string();
    }
    let mut end = MAX;
    while !url.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &url[..end])
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
