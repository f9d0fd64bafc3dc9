//! The single JSON line printed on stdout.

use clap::error::ErrorKind;
use pagepilot_core::{AutomationError, RunReport};
use serde_json::{json, Map, Value};

/// Record for a run in which every task succeeded or was skipped.
pub(crate) fn success(report: &RunReport) -> Value {
    let mut record = Map::new();
    record.insert("success".into(), Value::Bool(true));
    record.insert("results".into(), json!(report.results));
    record.insert("totalTimeMs".into(), json!(report.total_time_ms));
    record.insert("reconnects".into(), json!(report.reconnects));
    if let Some(path) = report.last_output_path() {
        record.insert("outputPath".into(), json!(path.display().to_string()));
    }
    for result in &report.results {
        if let Some(text) = result.text() {
            record.insert(format!("result_p{}", result.index), json!(text));
        }
    }
    Value::Object(record)
}

/// Record for a run that stopped at a failed task.
pub(crate) fn run_failure(report: &RunReport) -> Value {
    let (kind, message) = report
        .first_failure()
        .map(|r| {
            (
                r.error_kind.clone().unwrap_or_else(|| "failure".to_string()),
                r.error.clone().unwrap_or_default(),
            )
        })
        .unwrap_or_else(|| ("failure".to_string(), String::new()));

    let mut record = json!({
        "error": kind,
        "message": message,
        "completed": report.completed(),
        "results": report.results,
        "totalTimeMs": report.total_time_ms,
    });
    if let Some(path) = &report.screenshot {
        record["screenshot"] = json!(path.display().to_string());
    }
    record
}

/// Record for rejected command-line arguments.
///
/// `None` for `--help` and `--version`, which clap prints and exits on normally.
pub(crate) fn usage_failure(error: &clap::Error) -> Option<Value> {
    match error.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => None,
        _ => Some(setup_failure(&AutomationError::Configuration(
            error.to_string().trim_end().to_string(),
        ))),
    }
}

/// Record for an error raised before any task ran.
pub(crate) fn setup_failure(error: &AutomationError) -> Value {
    json!({
        "error": error.kind(),
        "message": error.to_string(),
        "completed": 0,
        "results": [],
    })
}
