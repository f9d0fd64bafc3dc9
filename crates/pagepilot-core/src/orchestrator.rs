//! Task orchestration: per-task retries and the sequential queue.

use std::time::Duration;

use pagepilot_config::{PromptItem, TaskConfig};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::result::TaskResult;
use crate::session::SessionManager;
use crate::workflow::Workflow;

/// How often, and how far apart, a task is attempted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Runs prompts through a workflow one at a time.
pub struct TaskOrchestrator {
    policy: RetryPolicy,
    inter_task_delay: Duration,
}

impl TaskOrchestrator {
    pub fn new(policy: RetryPolicy, inter_task_delay: Duration) -> Self {
        Self {
            policy,
            inter_task_delay,
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(
            RetryPolicy::from_config(config),
            Duration::from_millis(config.inter_task_delay_ms),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one task under the retry policy. Never fails; errors end up in the result.
    pub async fn run_task(
        &self,
        workflow: &dyn Workflow,
        session: &mut SessionManager,
        task: &PromptItem,
    ) -> TaskResult {
        if task.text.trim().is_empty() {
            info!(index = task.index, "Empty prompt, skipping");
            return TaskResult::skipped(task.index);
        }

        let start = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(
                index = task.index,
                attempt,
                max_attempts,
                workflow = workflow.name(),
                "Running task"
            );

            let outcome = match workflow.prepare(session, attempt).await {
                Ok(()) => workflow.execute(session, task).await,
                Err(e) => Err(e),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let e = match outcome {
                Ok(output) => {
                    info!(index = task.index, attempt, elapsed_ms, "Task succeeded");
                    return TaskResult::success(task.index, output, attempt, elapsed_ms);
                }
                Err(e) => e,
            };

            if e.is_disconnect() {
                session.invalidate();
            }
            if !e.is_retryable() || attempt >= max_attempts {
                error!(
                    index = task.index,
                    attempt,
                    kind = e.kind(),
                    error = %e,
                    "Task failed"
                );
                return TaskResult::failure(task.index, &e, attempt, elapsed_ms);
            }

            warn!(
                index = task.index,
                attempt,
                max_attempts,
                error = %e,
                "Attempt failed, retrying in {:?}",
                self.policy.delay
            );
            sleep(self.policy.delay).await;
        }
    }

    /// Run tasks in order with the inter-task delay between them.
    ///
    /// Stops at the first failed task; results so far are returned.
    pub async fn run_queue(
        &self,
        workflow: &dyn Workflow,
        session: &mut SessionManager,
        tasks: &[PromptItem],
    ) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut sent_any = false;

        for task in tasks {
            let will_send = !task.text.trim().is_empty();
            if will_send && sent_any && !self.inter_task_delay.is_zero() {
                sleep(self.inter_task_delay).await;
            }

            let result = self.run_task(workflow, session, task).await;
            sent_any |= will_send;
            let failed = result.is_failure();
            results.push(result);

            if failed {
                warn!(
                    index = task.index,
                    remaining = tasks.len() - results.len(),
                    "Stopping queue after failed task"
                );
                break;
            }
        }
        results
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
