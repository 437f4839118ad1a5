// ============================================================================
// MAP-REDUCE SUMMARIZER
// ============================================================================
// Row insights that fit in one call go straight to the final reduce. Larger
// sets are cut into fixed-size batches, all submitted at once through the
// shared scheduler; surviving batch summaries then feed one final reduce.
// A failed batch is dropped and counted, never retried.
// ============================================================================

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::config::SummarizerConfig;
use crate::error::{InferenceError, SummarizeError};
use crate::inference::{parse_structured, InferenceClient, Prompts};
use crate::pipeline::RowOutcome;
use crate::scheduler::Scheduler;

/// Result of a complete summarization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    /// Raw text of the final reduce call
    pub text: String,
    /// The text parsed as JSON, when it is JSON
    pub structured: Option<JsonValue>,
    /// Usable row insights that went in
    pub inputs: usize,
    /// Intermediate batches submitted; zero on the direct path
    pub batches: usize,
    pub failed_batches: usize,
}

#[derive(Clone)]
pub struct Summarizer {
    scheduler: Scheduler,
    client: Arc<dyn InferenceClient>,
    prompts: Arc<Prompts>,
    batch_size: usize,
    direct_limit: usize,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("batch_size", &self.batch_size)
            .field("direct_limit", &self.direct_limit)
            .finish()
    }
}

impl Summarizer {
    pub fn new(
        scheduler: Scheduler,
        client: Arc<dyn InferenceClient>,
        prompts: Arc<Prompts>,
        config: &SummarizerConfig,
    ) -> Self {
        Self {
            scheduler,
            client,
            prompts,
            batch_size: config.batch_size.max(1),
            direct_limit: config.effective_direct_limit(),
        }
    }

    /// Reduce per-row outcomes to one summary. Failed rows are ignored.
    pub async fn summarize_all(&self, outcomes: Vec<RowOutcome>) -> Result<FinalSummary, SummarizeError> {
        let usable: Vec<JsonValue> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.result.ok())
            .collect();
        if usable.is_empty() {
            return Err(SummarizeError::NoUsableResults);
        }
        let inputs = usable.len();

        if inputs <= self.direct_limit {
            let text = self
                .reduce(self.prompts.render_final(&usable))
                .await
                .map_err(SummarizeError::FinalReduceFailed)?;
            info!(target: "convolens::summarize", inputs, "Summarized without batching");
            return Ok(FinalSummary {
                structured: parse_structured(&text).ok(),
                text,
                inputs,
                batches: 0,
                failed_batches: 0,
            });
        }

        let handles: Vec<_> = usable
            .chunks(self.batch_size)
            .map(|batch| {
                let client = self.client.clone();
                let prompt = self.prompts.render_batch(batch);
                self.scheduler.submit(async move {
                    let text = client.call(&prompt).await?;
                    parse_structured(&text)
                })
            })
            .collect();
        let batches = handles.len();

        let mut survivors = Vec::with_capacity(batches);
        for (index, result) in join_all(handles).await.into_iter().enumerate() {
            match result.map_err(InferenceError::from).and_then(|r| r) {
                Ok(summary) => survivors.push(summary),
                Err(error) => warn!(
                    target: "convolens::summarize",
                    batch = index,
                    error = %error,
                    "Intermediate batch failed"
                ),
            }
        }
        let failed_batches = batches - survivors.len();
        if survivors.is_empty() {
            return Err(SummarizeError::AllBatchesFailed { batches });
        }

        let text = self
            .reduce(self.prompts.render_final(&survivors))
            .await
            .map_err(SummarizeError::FinalReduceFailed)?;

        info!(
            target: "convolens::summarize",
            inputs,
            batches,
            failed_batches,
            "Summarized through intermediate batches"
        );

        Ok(FinalSummary {
            structured: parse_structured(&text).ok(),
            text,
            inputs,
            batches,
            failed_batches,
        })
    }

    async fn reduce(&self, prompt: String) -> Result<String, InferenceError> {
        let client = self.client.clone();
        self.scheduler
            .submit(async move { client.call(&prompt).await })
            .await?
    }
}
