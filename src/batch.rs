//! Sequential bulk execution with per-item fault isolation.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use crate::{OutlineError, Result};

/// Supplies the caller-side identity recorded for each batch item.
pub trait BatchItem {
    fn batch_id(&self) -> String;
}

impl BatchItem for String {
    fn batch_id(&self) -> String {
        self.clone()
    }
}

impl BatchItem for &str {
    fn batch_id(&self) -> String {
        (*self).to_owned()
    }
}

impl<T> BatchItem for (String, T) {
    fn batch_id(&self) -> String {
        self.0.clone()
    }
}

/// Terminal state of one batch item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Failed,
}

/// Outcome of one item: the operation's value or its error message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Success { payload: T },
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchItemResult<T> {
    pub id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome<T>,
}

impl<T> BatchItemResult<T> {
    pub fn status(&self) -> BatchStatus {
        match self.outcome {
            ItemOutcome::Success { .. } => BatchStatus::Success,
            ItemOutcome::Failed { .. } => BatchStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == BatchStatus::Success
    }

    /// Present iff the item succeeded.
    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            ItemOutcome::Success { payload } => Some(payload),
            ItemOutcome::Failed { .. } => None,
        }
    }

    /// Present iff the item failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ItemOutcome::Success { .. } => None,
            ItemOutcome::Failed { error } => Some(error),
        }
    }
}

/// Aggregated report of one batch run.
///
/// `results[i]` belongs to the i-th input item and
/// `succeeded + failed == total`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchResult<T> {
    pub operation: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult<T>>,
}

impl<T> BatchResult<T> {
    fn from_results(operation: &str, results: Vec<BatchItemResult<T>>) -> Self {
        let succeeded = results.iter().filter(|result| result.is_success()).count();
        Self {
            operation: operation.to_owned(),
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Failed items in input order.
    pub fn failures(&self) -> impl Iterator<Item = &BatchItemResult<T>> {
        self.results.iter().filter(|result| !result.is_success())
    }
}

/// Applies one operation to many items, strictly one after another.
///
/// Items are never dispatched concurrently: the shared rate limiter is
/// read before a send and written after it, and overlapping sends could
/// overspend the budget in between.
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchProcessor;

impl BatchProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Runs `operation` over `items` in input order.
    ///
    /// An empty batch fails with [`OutlineError::Validation`] before
    /// `operation` is ever called. Otherwise every error returned by
    /// `operation` is recorded against its item and processing continues.
    pub async fn run<I, T, E, F, Fut>(
        &self,
        items: impl IntoIterator<Item = I>,
        mut operation: F,
        operation_name: &str,
    ) -> Result<BatchResult<T>>
    where
        I: BatchItem,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let items: Vec<I> = items.into_iter().collect();
        if items.is_empty() {
            return Err(OutlineError::Validation(format!(
                "{operation_name}: batch requires at least one item"
            )));
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let id = item.batch_id();
            let outcome = match operation(item).await {
                Ok(payload) => ItemOutcome::Success { payload },
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(operation = operation_name, id = %id, error = %err, "batch item failed");

                    ItemOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            results.push(BatchItemResult { id, outcome });
        }

        let report = BatchResult::from_results(operation_name, results);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            operation = operation_name,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn all_successes_are_counted() {
        let report = BatchProcessor::new()
            .run(
                vec!["one", "two", "three", "four"],
                |id| async move { Ok::<_, OutlineError>(id.len()) },
                "measure",
            )
            .await
            .expect("non-empty batch");

        assert_eq!(report.operation, "measure");
        assert_eq!((report.total, report.succeeded, report.failed), (4, 4, 0));
        assert!(report.all_succeeded());
        assert_eq!(report.results[2].payload(), Some(&5));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let mut seen = Vec::new();
        let report = BatchProcessor::new()
            .run(
                ["a", "b", "c"],
                |id| {
                    seen.push(id.to_owned());
                    async move {
                        if id == "b" {
                            Err(OutlineError::NotFound {
                                message: "Document not found".to_owned(),
                            })
                        } else {
                            Ok(json!({ "id": id }))
                        }
                    }
                },
                "archive",
            )
            .await
            .expect("non-empty batch");

        assert_eq!(seen, ["a", "b", "c"]);
        assert_eq!((report.total, report.succeeded, report.failed), (3, 2, 1));
        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(report.results[1].status(), BatchStatus::Failed);
        assert_eq!(report.results[1].error(), Some("not found: Document not found"));
        assert!(report.results[1].payload().is_none());
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_before_any_call() {
        let mut calls = 0usize;
        let err = BatchProcessor::new()
            .run(
                Vec::<String>::new(),
                |_| {
                    calls += 1;
                    async { Ok::<(), OutlineError>(()) }
                },
                "archive",
            )
            .await
            .expect_err("empty batch must fail");

        assert!(matches!(err, OutlineError::Validation(_)));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn arbitrary_error_types_are_recorded() {
        let report = BatchProcessor::new()
            .run(
                vec![("x".to_owned(), 1), ("y".to_owned(), -1)],
                |(_, n)| async move {
                    if n < 0 {
                        Err(anyhow::anyhow!("negative input {n}"))
                    } else {
                        Ok(n * 2)
                    }
                },
                "double",
            )
            .await
            .expect("non-empty batch");

        assert_eq!(report.succeeded + report.failed, report.total);
        assert_eq!(report.results[1].error(), Some("negative input -1"));
    }

    #[tokio::test]
    async fn report_serializes_with_status_tags() {
        let report = BatchProcessor::new()
            .run(
                ["a", "b"],
                |id| async move {
                    if id == "a" {
                        Ok(json!({ "title": "Runbook" }))
                    } else {
                        Err(OutlineError::Validation("bad id".to_owned()))
                    }
                },
                "get",
            )
            .await
            .expect("non-empty batch");

        assert_eq!(
            serde_json::to_value(&report).expect("serializable"),
            json!({
                "operation": "get",
                "total": 2,
                "succeeded": 1,
                "failed": 1,
                "results": [
                    { "id": "a", "status": "success", "payload": { "title": "Runbook" } },
                    { "id": "b", "status": "failed", "error": "validation error: bad id" }
                ]
            })
        );
    }
}
