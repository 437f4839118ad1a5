// ============================================================================
// ANALYSIS RUN
// ============================================================================
// Per-row inference followed by summarization. Every selected row becomes
// one scheduled call; the run waits for all of them, whatever order they
// finish in. Cancelling the run drops pending calls, discards in-flight
// results and resolves the run with `SummarizeError::Cancelled`.
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{ConvoResult, InferenceError, SummarizeError};
use crate::inference::{parse_structured, InferenceClient, Prompts};
use crate::query::DisplayRow;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::store::RowId;
use crate::summarizer::{FinalSummary, Summarizer};

/// Insight for one row, or why there is none
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub row_id: RowId,
    pub result: Result<JsonValue, InferenceError>,
}

impl RowOutcome {
    pub fn is_usable(&self) -> bool {
        self.result.is_ok()
    }
}

/// One analysis run: a scheduler shared by both phases, the client, and the
/// run's cancellation signal.
pub struct AnalysisRun {
    scheduler: Scheduler,
    client: Arc<dyn InferenceClient>,
    prompts: Arc<Prompts>,
    summarizer: Summarizer,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AnalysisRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRun")
            .field("scheduler", &self.scheduler)
            .field("summarizer", &self.summarizer)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AnalysisRun {
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: &EngineConfig,
        client: Arc<dyn InferenceClient>,
        prompts: Prompts,
        cancel: CancellationToken,
    ) -> ConvoResult<Self> {
        let scheduler = Scheduler::new(&config.scheduler)?;
        let prompts = Arc::new(prompts);
        let summarizer = Summarizer::new(
            scheduler.clone(),
            client.clone(),
            prompts.clone(),
            &config.summarizer,
        );
        Ok(Self {
            scheduler,
            client,
            prompts,
            summarizer,
            cancel,
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// One inference call per row. Failures are recorded per row.
    pub async fn run_rows(&self, rows: Vec<DisplayRow>) -> Result<Vec<RowOutcome>, SummarizeError> {
        let handles: Vec<_> = rows
            .into_iter()
            .map(|row| {
                let client = self.client.clone();
                let prompt = self.prompts.render_row(&row);
                let row_id = row.row_id;
                let handle = self.scheduler.submit(async move {
                    let text = client.call(&prompt).await?;
                    parse_structured(&text)
                });
                async move {
                    RowOutcome {
                        row_id,
                        result: handle.await.map_err(InferenceError::from).and_then(|r| r),
                    }
                }
            })
            .collect();
        let submitted = handles.len();

        let outcomes = self.until_cancelled(join_all(handles)).await?;
        let usable = outcomes.iter().filter(|o| o.is_usable()).count();
        if usable < submitted {
            warn!(
                target: "convolens::pipeline",
                failed = submitted - usable,
                "Some row calls failed"
            );
        }
        info!(
            target: "convolens::pipeline",
            rows = submitted,
            usable,
            "Row phase complete"
        );
        Ok(outcomes)
    }

    /// Row phase, then summarization.
    pub async fn run(&self, rows: Vec<DisplayRow>) -> Result<FinalSummary, SummarizeError> {
        let outcomes = self.run_rows(rows).await?;
        self.until_cancelled(self.summarizer.summarize_all(outcomes))
            .await?
    }

    async fn until_cancelled<F: Future>(&self, work: F) -> Result<F::Output, SummarizeError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.scheduler.cancel_all();
                info!(target: "convolens::pipeline", "Analysis run cancelled");
                Err(SummarizeError::Cancelled)
            }
            output = work => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::summarizer::tests::MockClient;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn rows(n: u32) -> Vec<DisplayRow> {
        (0..n)
            .map(|i| DisplayRow {
                row_id: i,
                values: vec![("Id".into(), format!("c{}", i))],
            })
            .collect()
    }

    fn engine_config(rpm: u32) -> EngineConfig {
        EngineConfig {
            scheduler: SchedulerConfig::with_rate(rpm),
            ..EngineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rows_records_failures_per_row() {
        let client = MockClient::new(|prompt| {
            if prompt.contains("\"c1\"") {
                Ok("I cannot answer that".into())
            } else if prompt.contains("\"c2\"") {
                Err(InferenceError::Quota { message: "slow".into() })
            } else {
                Ok("{\"topic\": \"billing\"}".into())
            }
        });
        let run = AnalysisRun::new(&engine_config(600), client, Prompts::default(), CancellationToken::new())
            .unwrap();

        let outcomes = run.run_rows(rows(4)).await.unwrap();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].result, Ok(json!({ "topic": "billing" })));
        assert!(matches!(outcomes[1].result, Err(InferenceError::Format { .. })));
        assert!(matches!(outcomes[2].result, Err(InferenceError::Quota { .. })));
        assert!(outcomes[3].is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_summarizes() {
        let client = MockClient::new(|_| Ok("{\"n\": 1}".into()));
        let run = AnalysisRun::new(&engine_config(6000), client.clone(), Prompts::default(), CancellationToken::new())
            .unwrap();

        let summary = run.run(rows(30)).await.unwrap();
        assert_eq!(summary.inputs, 30);
        assert_eq!(summary.batches, 2);
        // 30 rows + 2 batches + 1 final
        assert_eq!(client.calls(), 33);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_calls() {
        let client = MockClient::new(|_| Ok("{}".into()));
        let cancel = CancellationToken::new();
        // One call per second.
        let run = AnalysisRun::new(&engine_config(60), client.clone(), Prompts::default(), cancel.clone())
            .unwrap();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });

        let err = run.run(rows(10)).await.unwrap_err();
        trigger.await.unwrap();
        assert!(matches!(err, SummarizeError::Cancelled));
        assert_eq!(client.calls(), 3);

        // Nothing left queued after the cancel.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.calls(), 3);
        assert_eq!(run.stats().cancelled, 7);
    }
}
