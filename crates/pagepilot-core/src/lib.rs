//! # PagePilot Core
//!
//! Automation engine that drives web applications through their UI.
//!
//! The building blocks, bottom-up:
//!
//! - [`wait`] - deadline-bounded polling with transient/fatal check errors
//! - [`stability`] - "value stopped changing" detection for streamed output
//! - [`SelectorResolver`] - first visible match across fallback selectors
//! - [`SessionManager`] - connect, verify sign-in, reconnect on loss
//! - [`workflow`] - chat and generation steps against one page
//! - [`ArtifactAcquirer`] - turn a generated result into a local file
//! - [`TaskOrchestrator`] - retries per task and the sequential queue
//! - [`Runner`] - one invocation from configuration to [`RunReport`]

pub mod artifact;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod runner;
pub mod selector;
pub mod session;
pub mod stability;
pub mod transcode;
pub mod wait;
pub mod workflow;

#[cfg(test)]
mod fake;

pub use artifact::{decode_data_url, AcquireRequest, ArtifactAcquirer};
pub use error::{AutomationError, Result};
pub use orchestrator::{RetryPolicy, TaskOrchestrator};
pub use result::{LocalArtifact, PendingArtifact, RunReport, TaskOutput, TaskResult, TaskStatus};
pub use runner::Runner;
pub use selector::SelectorResolver;
pub use session::{SessionManager, SessionOptions, SessionState};
pub use stability::{wait_for_stable, Sample};
pub use transcode::Transcoder;
pub use wait::{wait_for, wait_until, PollError};
pub use workflow::{build_workflow, ChatWorkflow, GenerationOptions, GenerationWorkflow, StepTiming, Workflow};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod scenario_tests;
