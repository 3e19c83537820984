//! Paged batch processing with per-item failure isolation

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;

use crate::error::EngineResult;

/// Outcome counts of one batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub errors: usize,
}

/// Process one page of entity ids concurrently.
///
/// A failing item is logged and counted; it never aborts the page.
pub async fn run_page<I, F, Fut, R>(job: &str, ids: I, process: F, summary: &mut BatchSummary)
where
    I: IntoIterator<Item = String>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = EngineResult<R>>,
{
    let ids: Vec<String> = ids.into_iter().collect();
    let results = join_all(ids.iter().cloned().map(&process)).await;

    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(_) => summary.processed += 1,
            Err(e) => {
                summary.errors += 1;
                warn!(job = %job, entity_id = %id, error = %e, "Batch item failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let mut summary = BatchSummary::default();
        let ids = vec!["a".to_string(), "bad".to_string(), "c".to_string()];

        run_page(
            "test",
            ids,
            |id| async move {
                if id == "bad" {
                    Err(EngineError::not_found("Creator", id))
                } else {
                    Ok(())
                }
            },
            &mut summary,
        )
        .await;

        assert_eq!(summary, BatchSummary { processed: 2, errors: 1 });
    }
}
