//! Named, timed build stages.

use crate::errors::{BuildError, Result};
use crate::events::EventSink;
use crate::observability::StageTimer;
use serde_json::json;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info_span, Instrument};

/// Runs the stages of one task in sequence, reporting each one.
///
/// Every stage prints `[<task>] <label>...` followed by `took <n>ms` or
/// `failed`, and emits `stage.started`, `stage.completed` or `stage.failed`.
pub struct TaskRunner {
    task: String,
    sink: Arc<dyn EventSink>,
}

impl TaskRunner {
    /// Creates a runner for the named task.
    #[must_use]
    pub fn new(task: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            task: task.into(),
            sink,
        }
    }

    /// Returns the task label.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Runs one stage.
    ///
    /// A failure is returned as [`BuildError::StageFailed`] carrying the
    /// stage label and the original error.
    pub async fn stage<T, F, Fut>(&self, label: &str, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        announce(&format!("[{}] {}...", self.task, label));
        self.sink.emit_kind(
            "stage.started",
            Some(json!({ "task": self.task, "stage": label })),
        );

        let timer = StageTimer::start(label);
        let span = info_span!("stage", task = %self.task, stage = %label);
        let result = action().instrument(span).await;
        let duration_ms = timer.elapsed_ms();

        match result {
            Ok(value) => {
                finish(&format!(" took {duration_ms}ms"));
                self.sink.emit_kind(
                    "stage.completed",
                    Some(json!({ "task": self.task, "stage": label, "duration_ms": duration_ms })),
                );
                Ok(value)
            }
            Err(e) => {
                finish(" failed");
                error!(task = %self.task, stage = %label, error = %e, "Stage failed");
                self.sink.emit_kind(
                    "stage.failed",
                    Some(json!({
                        "task": self.task,
                        "stage": label,
                        "duration_ms": duration_ms,
                        "error": e.to_dict(),
                    })),
                );
                Err(BuildError::stage_failed(label, e))
            }
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

fn announce(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{text}");
    let _ = stdout.flush();
}

fn finish(text: &str) {
    println!("{text}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_stage_success_emits_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = TaskRunner::new("build", sink.clone());

        let value = runner.stage("Compiling", || async { Ok(42) }).await.unwrap();

        assert_eq!(value, 42);
        assert_eq!(sink.kinds(), vec!["stage.started", "stage.completed"]);
        let completed = &sink.events()[1];
        assert_eq!(completed.field_str("stage"), Some("Compiling"));
        assert!(completed.field_i64("duration_ms").is_some());
    }

    #[tokio::test]
    async fn test_stage_failure_wraps_error() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = TaskRunner::new("package", sink.clone());

        let err = runner
            .stage("Archiving", || async { Err::<(), _>(BuildError::Archive("disk full".into())) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Archiving failed: Archive error: disk full");
        assert_eq!(sink.kinds(), vec!["stage.started", "stage.failed"]);
    }

    #[tokio::test]
    async fn test_action_runs_once() {
        let runner = TaskRunner::new("build", Arc::new(crate::events::NoOpEventSink));
        let calls = AtomicUsize::new(0);

        runner
            .stage("Counting", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
