//! One invocation, start to finish.

use std::path::PathBuf;
use std::sync::Arc;

use pagepilot_config::TaskConfig;
use pagepilot_protocols::BrowserConnector;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{AutomationError, Result};
use crate::orchestrator::TaskOrchestrator;
use crate::result::RunReport;
use crate::session::{SessionManager, SessionOptions};
use crate::workflow::build_workflow;

/// Wires configuration, session, workflow and orchestrator together.
pub struct Runner {
    config: TaskConfig,
}

impl Runner {
    pub fn new(config: TaskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Run every prompt against a browser reached through `connector`.
    ///
    /// Task failures are reported in the [`RunReport`]; only setup problems
    /// (no prompts, unusable workflow configuration) return an error.
    pub async fn run(&self, connector: Arc<dyn BrowserConnector>) -> Result<RunReport> {
        if self.config.prompts.is_empty() {
            return Err(AutomationError::Configuration("no prompts found".to_string()));
        }
        let workflow = build_workflow(&self.config)?;
        let orchestrator = TaskOrchestrator::from_config(&self.config);
        let mut session = SessionManager::new(connector, SessionOptions::from_config(&self.config));

        info!(
            prompts = self.config.prompts.len(),
            workflow = workflow.name(),
            endpoint = %self.config.cdp_url,
            "Starting run"
        );
        let start = Instant::now();
        let results = orchestrator
            .run_queue(workflow.as_ref(), &mut session, &self.config.prompts)
            .await;

        let mut report = RunReport {
            results,
            total_time_ms: start.elapsed().as_millis() as u64,
            reconnects: session.reconnect_count(),
            screenshot: None,
        };

        if !report.succeeded() {
            if let Some(failed) = report.first_failure() {
                warn!(index = failed.index, error = ?failed.error, "Run finished with a failure");
            }
            if self.config.screenshot {
                report.screenshot = session.screenshot_best_effort(&self.screenshot_path()).await;
            }
        }

        session.close().await;
        info!(
            completed = report.completed(),
            total_time_ms = report.total_time_ms,
            reconnects = report.reconnects,
            "Run finished"
        );
        Ok(report)
    }

    fn screenshot_path(&self) -> PathBuf {
        self.config.screenshot_path.clone().unwrap_or_else(|| {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            std::env::temp_dir().join(format!("pagepilot-failure-{}.png", stamp))
        })
    }
}
