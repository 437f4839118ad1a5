// ============================================================================
// ENGINE
// ============================================================================
// Owns the current dataset. Queries take a snapshot of the store, so a
// reload swapping in a new store never disturbs a query already running.
// Loading always starts from an empty engine; a failed load leaves none.
// ============================================================================

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::analysis::{analyze, AnalysisReport};
use crate::config::EngineConfig;
use crate::error::{ConvoResult, IngestError, QueryError, QueryResult};
use crate::filter::{apply_filters, FilterSpec, RowIdSet};
use crate::inference::{InferenceClient, Prompts};
use crate::pipeline::AnalysisRun;
use crate::query::{self, DisplayRow, PageSpec, QueryPage, SortSpec};
use crate::store::{FieldCatalog, IngestReport, RecordStore, RowId};
use crate::sweep::{summarize, SummaryStatistics};

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: ArcSwapOption<RecordStore>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> ConvoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store: ArcSwapOption::empty(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Replace the dataset with the contents of `reader`.
    pub fn load<R: Read>(&self, reader: R) -> ConvoResult<IngestReport> {
        self.reset();
        let (store, report) = RecordStore::ingest(reader, &self.config.schema)?;
        self.install(store);
        Ok(report)
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> ConvoResult<IngestReport> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.load(BufReader::new(file))
    }

    /// `load` on the blocking pool, for callers inside a runtime.
    pub async fn load_async<R>(&self, reader: R) -> ConvoResult<IngestReport>
    where
        R: Read + Send + 'static,
    {
        self.reset();
        let schema = self.config.schema.clone();
        let (store, report) = tokio::task::spawn_blocking(move || RecordStore::ingest(reader, &schema))
            .await
            .map_err(|e| IngestError::TaskFailed {
                message: e.to_string(),
            })??;
        self.install(store);
        Ok(report)
    }

    /// Drop the current dataset
    pub fn reset(&self) {
        if self.store.swap(None).is_some() {
            info!(target: "convolens::engine", "Dataset released");
        }
    }

    fn install(&self, store: RecordStore) {
        info!(
            target: "convolens::engine",
            rows = store.len(),
            fields = store.catalog().fields().len(),
            "Dataset installed"
        );
        self.store.store(Some(Arc::new(store)));
    }

    pub fn is_loaded(&self) -> bool {
        self.store.load().is_some()
    }

    /// Consistent view of the current dataset
    pub fn snapshot(&self) -> QueryResult<Arc<RecordStore>> {
        self.store.load_full().ok_or(QueryError::NotLoaded)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn total_rows(&self) -> QueryResult<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn catalog(&self) -> QueryResult<FieldCatalog> {
        Ok(self.snapshot()?.catalog().clone())
    }

    pub fn filter_rows(&self, filter: &FilterSpec) -> QueryResult<RowIdSet> {
        let store = self.snapshot()?;
        Ok(apply_filters(&store, filter))
    }

    pub fn query_page(
        &self,
        filter: &FilterSpec,
        sort: Option<&SortSpec>,
        page: PageSpec,
    ) -> QueryResult<QueryPage> {
        let store = self.snapshot()?;
        query::query_page(&store, filter, sort, page, &self.config.query)
    }

    /// Statistics over the filtered set
    pub fn summary(&self, filter: &FilterSpec) -> QueryResult<SummaryStatistics> {
        let store = self.snapshot()?;
        Ok(summarize(&store, &apply_filters(&store, filter)))
    }

    pub fn analyze(&self, filter: &FilterSpec) -> QueryResult<AnalysisReport> {
        let store = self.snapshot()?;
        Ok(analyze(&store, &apply_filters(&store, filter)))
    }

    pub fn export_rows(&self, rows: &[RowId]) -> QueryResult<String> {
        let store = self.snapshot()?;
        query::export_rows(&store, rows)
    }

    pub fn fetch_full_rows(&self, rows: &[RowId]) -> QueryResult<Vec<DisplayRow>> {
        let store = self.snapshot()?;
        query::fetch_full_rows(&store, rows)
    }

    // ------------------------------------------------------------------------
    // Analysis Runs
    // ------------------------------------------------------------------------

    /// New inference run configured from this engine. Must be called inside
    /// a Tokio runtime.
    pub fn analysis_run(
        &self,
        client: Arc<dyn InferenceClient>,
        prompts: Prompts,
        cancel: CancellationToken,
    ) -> ConvoResult<AnalysisRun> {
        AnalysisRun::new(&self.config, client, prompts, cancel)
    }
}
