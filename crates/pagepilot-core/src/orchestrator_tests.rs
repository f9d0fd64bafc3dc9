use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pagepilot_protocols::PageError;

use super::*;
use crate::error::{AutomationError, Result};
use crate::fake::{session_for, FakePage};
use crate::result::{TaskOutput, TaskStatus};

/// Plays back scripted outcomes; answers `answer {index}` once the script runs out.
#[derive(Default)]
struct ScriptedWorkflow {
    script: Mutex<VecDeque<AutomationError>>,
    prepared: Mutex<Vec<u32>>,
    executed: Mutex<Vec<(u32, Instant)>>,
}

impl ScriptedWorkflow {
    fn failing(errors: Vec<AutomationError>) -> Self {
        Self {
            script: Mutex::new(errors.into()),
            ..Default::default()
        }
    }

    fn executed_indices(&self) -> Vec<u32> {
        self.executed.lock().iter().map(|(i, _)| *i).collect()
    }
}

#[async_trait]
impl Workflow for ScriptedWorkflow {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn prepare(&self, session: &mut SessionManager, attempt: u32) -> Result<()> {
        self.prepared.lock().push(attempt);
        session.ensure_live().await
    }

    async fn execute(&self, _session: &mut SessionManager, task: &PromptItem) -> Result<TaskOutput> {
        self.executed.lock().push((task.index, Instant::now()));
        match self.script.lock().pop_front() {
            Some(e) => Err(e),
            None => Ok(TaskOutput::Text {
                text: format!("answer {}", task.index),
            }),
        }
    }
}

fn app_error() -> AutomationError {
    AutomationError::Application("Could not generate".to_string())
}

fn orchestrator(max_attempts: u32) -> TaskOrchestrator {
    TaskOrchestrator::new(
        RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(10),
        },
        Duration::from_millis(800),
    )
}

fn pages(n: usize) -> Vec<Arc<FakePage>> {
    (0..n).map(|_| FakePage::blank()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_retryable_failures() {
    let workflow = ScriptedWorkflow::failing(vec![app_error(), app_error()]);
    let mut session = session_for(pages(1));

    let start = Instant::now();
    let result = orchestrator(3)
        .run_task(&workflow, &mut session, &PromptItem::new(1, "hi"))
        .await;

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.text(), Some("answer 1"));
    assert_eq!(*workflow.prepared.lock(), vec![1, 2, 3]);
    assert!(start.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let workflow = ScriptedWorkflow::failing(vec![app_error(), app_error(), app_error()]);
    let mut session = session_for(pages(1));

    let result = orchestrator(2)
        .run_task(&workflow, &mut session, &PromptItem::new(4, "hi"))
        .await;

    assert_eq!(result.status, TaskStatus::Failure);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.index, 4);
    assert_eq!(result.error_kind.as_deref(), Some("application_error"));
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_error_ends_task() {
    let workflow = ScriptedWorkflow::failing(vec![AutomationError::Acquisition(
        "direct: nothing found".to_string(),
    )]);
    let mut session = session_for(pages(1));

    let start = Instant::now();
    let result = orchestrator(5)
        .run_task(&workflow, &mut session, &PromptItem::new(1, "hi"))
        .await;

    assert_eq!(result.status, TaskStatus::Failure);
    assert_eq!(result.attempts, 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_timeouts_report_timeout_status() {
    let timeout = || AutomationError::timeout("generation complete", Duration::from_secs(60));
    let workflow = ScriptedWorkflow::failing(vec![timeout(), timeout()]);
    let mut session = session_for(pages(1));

    let result = orchestrator(2)
        .run_task(&workflow, &mut session, &PromptItem::new(1, "hi"))
        .await;

    assert_eq!(result.status, TaskStatus::Timeout);
    assert!(result.error.unwrap().contains("Timeout"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_rebuilds_session() {
    let workflow = ScriptedWorkflow::failing(vec![AutomationError::Page(PageError::TargetClosed(
        "Target page, context or browser has been closed".to_string(),
    ))]);
    let mut session = session_for(pages(2));

    let result = orchestrator(3)
        .run_task(&workflow, &mut session, &PromptItem::new(1, "hi"))
        .await;

    assert!(result.is_success());
    assert_eq!(result.attempts, 2);
    assert_eq!(session.reconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_prompt_is_skipped() {
    let workflow = ScriptedWorkflow::default();
    let mut session = session_for(pages(1));

    let result = orchestrator(3)
        .run_task(&workflow, &mut session, &PromptItem::new(2, "   "))
        .await;

    assert_eq!(result.status, TaskStatus::Skipped);
    assert_eq!(result.attempts, 0);
    assert!(workflow.prepared.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_queue_runs_in_order_with_delay() {
    let workflow = ScriptedWorkflow::default();
    let mut session = session_for(pages(1));
    let tasks = vec![
        PromptItem::new(1, "first"),
        PromptItem::new(2, ""),
        PromptItem::new(3, "third"),
        PromptItem::new(4, "fourth"),
    ];

    let results = orchestrator(3)
        .run_queue(&workflow, &mut session, &tasks)
        .await;

    let statuses: Vec<TaskStatus> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Success,
            TaskStatus::Skipped,
            TaskStatus::Success,
            TaskStatus::Success
        ]
    );
    assert_eq!(workflow.executed_indices(), vec![1, 3, 4]);

    let executed = workflow.executed.lock();
    for pair in executed.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(800));
    }
}

#[tokio::test(start_paused = true)]
async fn test_queue_stops_at_first_failure() {
    let workflow = ScriptedWorkflow::default();
    let mut session = session_for(pages(1));
    let tasks = vec![
        PromptItem::new(1, "first"),
        PromptItem::new(2, "second"),
        PromptItem::new(3, "third"),
    ];

    // task 1 succeeds, then task 2 hits a non-retryable error
    let orchestrator = orchestrator(3);
    let first = orchestrator.run_task(&workflow, &mut session, &tasks[0]).await;
    assert!(first.is_success());
    workflow
        .script
        .lock()
        .push_back(AutomationError::Precondition("not signed in".to_string()));

    let results = orchestrator.run_queue(&workflow, &mut session, &tasks[1..]).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].index, 2);
    assert_eq!(results[0].error_kind.as_deref(), Some("precondition_failed"));
    assert_eq!(workflow.executed_indices(), vec![1, 2]);
}

#[test]
fn test_policy_from_config() {
    let config = TaskConfig {
        max_retries: 0,
        retry_delay_ms: 2_500,
        ..Default::default()
    };
    let policy = RetryPolicy::from_config(&config);
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.delay, Duration::from_millis(2_500));
}
