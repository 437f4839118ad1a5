// ============================================================================
// QUERY EXECUTOR
// ============================================================================
// filter -> stable sort -> page slice -> materialize the slice. Scoped
// statistics are computed over the whole filtered set, not the page.
// ============================================================================

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::QueryConfig;
use crate::constants::{DEFAULT_PAGE_SIZE, QUERY_SLOW_THRESHOLD_MS};
use crate::error::{QueryError, QueryResult};
use crate::filter::{apply_filters, FilterSpec, RowIdSet};
use crate::logging::PerfTimer;
use crate::store::{normalize_field_name, RecordStore, RowId};
use crate::sweep::{summarize, SummaryStatistics};

// ----------------------------------------------------------------------------
// Request Types
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// One-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageSpec {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    fn validate(&self, limits: &QueryConfig) -> QueryResult<()> {
        if self.page == 0 || self.page_size == 0 || self.page_size > limits.max_page_size {
            return Err(QueryError::InvalidPage {
                page: self.page,
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    /// Half-open window into a list of `len` items, clamped
    fn window(&self, len: usize) -> (usize, usize) {
        let start = (self.page - 1).saturating_mul(self.page_size).min(len);
        let end = self.page.saturating_mul(self.page_size).min(len);
        (start, end)
    }
}

// ----------------------------------------------------------------------------
// Response Types
// ----------------------------------------------------------------------------

/// A materialized row: `(display name, value)` in catalog order, present
/// fields only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRow {
    pub row_id: RowId,
    pub values: Vec<(String, String)>,
}

impl DisplayRow {
    pub fn get(&self, display_name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == display_name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub rows: Vec<DisplayRow>,
    /// Size of the filtered set
    pub match_count: usize,
    pub scoped_summary: SummaryStatistics,
    /// Size of the whole dataset
    pub total_rows: usize,
    pub page: usize,
    pub page_size: usize,
}

// ----------------------------------------------------------------------------
// Sorting
// ----------------------------------------------------------------------------

/// Comparable view of a field value. Numbers order numerically among
/// themselves and before any text.
#[derive(Debug, Clone, Copy)]
enum SortKey<'a> {
    Number(f64),
    Text(&'a str),
}

impl<'a> SortKey<'a> {
    fn of(value: Option<&'a str>) -> Self {
        let text = value.unwrap_or("");
        match text.parse::<f64>() {
            Ok(number) if !number.is_nan() => SortKey::Number(number),
            _ => SortKey::Text(text),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
        }
    }
}

/// Stable sort of row ids by one field
pub fn sort_rows(store: &RecordStore, rows: &RowIdSet, sort: &SortSpec) -> Vec<RowId> {
    let field = normalize_field_name(&sort.key);
    let mut keyed: Vec<(RowId, SortKey<'_>)> = rows
        .iter()
        .map(|row| (row, SortKey::of(store.value(row, &field))))
        .collect();

    match sort.direction {
        SortDirection::Ascending => keyed.sort_by(|a, b| a.1.compare(&b.1)),
        SortDirection::Descending => keyed.sort_by(|a, b| b.1.compare(&a.1)),
    }
    keyed.into_iter().map(|(row, _)| row).collect()
}

// ----------------------------------------------------------------------------
// Query Operations
// ----------------------------------------------------------------------------

/// Filter, sort and page the store.
pub fn query_page(
    store: &RecordStore,
    filter: &FilterSpec,
    sort: Option<&SortSpec>,
    page: PageSpec,
    limits: &QueryConfig,
) -> QueryResult<QueryPage> {
    page.validate(limits)?;
    let timer = PerfTimer::start("query_page", QUERY_SLOW_THRESHOLD_MS);

    let matched = apply_filters(store, filter);
    let ordered = match sort {
        Some(sort) => sort_rows(store, &matched, sort),
        None => matched.as_slice().to_vec(),
    };

    let (start, end) = page.window(ordered.len());
    let rows = ordered[start..end]
        .iter()
        .map(|row| materialize(store, *row))
        .collect::<QueryResult<Vec<_>>>()?;
    let scoped_summary = summarize(store, &matched);

    debug!(
        target: "convolens::query",
        matched = matched.len(),
        page = page.page,
        returned = rows.len(),
        elapsed_ms = timer.stop(),
        "Query page served"
    );

    Ok(QueryPage {
        rows,
        match_count: matched.len(),
        scoped_summary,
        total_rows: store.len(),
        page: page.page,
        page_size: page.page_size,
    })
}

/// Full records for the given ids, in the given order
pub fn fetch_full_rows(store: &RecordStore, rows: &[RowId]) -> QueryResult<Vec<DisplayRow>> {
    rows.iter().map(|row| materialize(store, *row)).collect()
}

/// Delimited export of the given ids with the ingestion column order:
/// input headers first, then custom metric keys.
pub fn export_rows(store: &RecordStore, rows: &[RowId]) -> QueryResult<String> {
    let fields = store.catalog().fields();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(store.schema().delimiter as u8)
        .from_writer(Vec::new());

    writer
        .write_record(fields.iter().map(|f| f.display_name.as_str()))
        .map_err(export_failed)?;

    for row in rows {
        if store.record(*row).is_none() {
            return Err(QueryError::UnknownRow { row_id: *row });
        }
        writer
            .write_record(fields.iter().map(|f| store.value(*row, &f.name).unwrap_or("")))
            .map_err(export_failed)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| QueryError::ExportFailed {
            message: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| QueryError::ExportFailed {
        message: e.to_string(),
    })
}

fn export_failed(e: csv::Error) -> QueryError {
    QueryError::ExportFailed {
        message: e.to_string(),
    }
}

fn materialize(store: &RecordStore, row: RowId) -> QueryResult<DisplayRow> {
    if store.record(row).is_none() {
        return Err(QueryError::UnknownRow { row_id: row });
    }
    let values = store
        .catalog()
        .fields()
        .iter()
        .filter_map(|field| {
            store
                .value(row, &field.name)
                .map(|value| (field.display_name.clone(), value.to_string()))
        })
        .collect();
    Ok(DisplayRow { row_id: row, values })
}
