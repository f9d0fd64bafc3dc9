//! Event subscription, request capture and browser-managed downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cdp::error::CdpError;
use crate::cdp::protocol::{CdpEvent, DownloadProgress, DownloadWillBegin};

use super::core::PageSession;

/// A finished browser download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub url: String,
    pub suggested_filename: String,
    /// Saved as `<dir>/<guid>` (`allowAndName` behavior).
    pub path: PathBuf,
}

impl PageSession {
    /// Subscribe to this page's events.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Request URLs seen via `Network.requestWillBeSent`, oldest first.
    pub fn observed_requests(&self) -> Vec<String> {
        self.requests.lock().iter().cloned().collect()
    }

    /// Let the browser save downloads into `dir`, named by download guid.
    pub async fn enable_downloads(&self, dir: &Path) -> Result<(), CdpError> {
        self.call(
            "Page.setDownloadBehavior",
            Some(json!({
                "behavior": "allowAndName",
                "downloadPath": dir.to_string_lossy(),
            })),
        )
        .await?;
        Ok(())
    }

    /// Click a node and wait for the download it starts to complete.
    pub async fn click_and_wait_download(
        &self,
        backend_id: i64,
        dir: &Path,
        timeout: Duration,
    ) -> Result<CompletedDownload, CdpError> {
        self.enable_downloads(dir).await?;

        // Subscribe before clicking so the begin event is not missed.
        let mut rx = self.subscribe();
        self.click_node(backend_id).await?;

        tokio::time::timeout(timeout, Self::wait_download(&mut rx, dir))
            .await
            .map_err(|_| {
                CdpError::Timeout(format!("No download completed within {}ms", timeout.as_millis()))
            })?
    }

    pub(super) async fn wait_download(
        rx: &mut broadcast::Receiver<CdpEvent>,
        dir: &Path,
    ) -> Result<CompletedDownload, CdpError> {
        let mut begun: Option<DownloadWillBegin> = None;

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Download waiter lagged by {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(CdpError::SessionClosed),
            };

            match event.method.as_str() {
                "Page.downloadWillBegin" | "Browser.downloadWillBegin" => {
                    let info: DownloadWillBegin = serde_json::from_value(event.params)?;
                    debug!("Download started: {} ({})", info.suggested_filename, info.guid);
                    begun = Some(info);
                }
                "Page.downloadProgress" | "Browser.downloadProgress" => {
                    let progress: DownloadProgress = serde_json::from_value(event.params)?;
                    let Some(info) = begun.as_ref().filter(|b| b.guid == progress.guid) else {
                        continue;
                    };
                    match progress.state.as_str() {
                        "completed" => {
                            return Ok(CompletedDownload {
                                url: info.url.clone(),
                                suggested_filename: info.suggested_filename.clone(),
                                path: dir.join(&info.guid),
                            });
                        }
                        "canceled" => {
                            return Err(CdpError::DownloadFailed(format!(
                                "{} was canceled",
                                info.suggested_filename
                            )));
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }
}
