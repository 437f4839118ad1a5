// ============================================================================
// RECORD STORE & INDEXER
// ============================================================================
// One sequential pass over a delimited stream builds:
// - the row store (row id = ingestion order, never reused)
// - an inverted index field -> value -> ascending row ids
// - running totals for containment and handle time
// - the field catalog that tells the UI which filters to offer
//
// The store is immutable once `ingest` returns. Reloading a dataset builds a
// fresh store; there is no incremental update.
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;

use ahash::{AHashMap, AHashSet};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::config::SchemaConfig;
use crate::constants::INGEST_SLOW_THRESHOLD_MS;
use crate::error::{IngestError, IngestResult};
use crate::filter::RowIdSet;
use crate::logging::PerfTimer;
use crate::sweep::{summarize, SummaryStatistics};
use crate::timestamp::Timestamp;

/// Stable zero-based identity of an ingested record.
pub type RowId = u32;

/// Canonical form of a field name: trimmed and lower-cased.
pub fn normalize_field_name(raw: &str) -> CompactString {
    CompactString::from(raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}').to_lowercase())
}

// ----------------------------------------------------------------------------
// Standard Fields
// ----------------------------------------------------------------------------

/// Fields with a fixed role in the engine. Their column names come from
/// `SchemaConfig`; every other column lives in the record's extension map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardField {
    ConversationId,
    StartTime,
    EndTime,
    Domain,
    Channel,
    Contained,
    Transcript,
    PackedMetrics,
}

impl StandardField {
    pub const COUNT: usize = 8;

    pub const ALL: [StandardField; Self::COUNT] = [
        StandardField::ConversationId,
        StandardField::StartTime,
        StandardField::EndTime,
        StandardField::Domain,
        StandardField::Channel,
        StandardField::Contained,
        StandardField::Transcript,
        StandardField::PackedMetrics,
    ];

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }

    /// Configured column name for this role
    pub fn column<'a>(&self, schema: &'a SchemaConfig) -> &'a str {
        match self {
            StandardField::ConversationId => &schema.id_field,
            StandardField::StartTime => &schema.start_field,
            StandardField::EndTime => &schema.end_field,
            StandardField::Domain => &schema.domain_field,
            StandardField::Channel => &schema.channel_field,
            StandardField::Contained => &schema.contained_field,
            StandardField::Transcript => &schema.full_text_field,
            StandardField::PackedMetrics => &schema.packed_field,
        }
    }
}

// ----------------------------------------------------------------------------
// Record
// ----------------------------------------------------------------------------

/// One ingested row. Known fields are typed and held in fixed slots; input
/// columns outside the standard set and expanded custom metrics live in
/// `extra`. Only non-empty values are stored, so "missing" and "empty" are
/// the same thing.
#[derive(Debug, Clone, Default)]
pub struct Record {
    known: [Option<CompactString>; StandardField::COUNT],
    extra: AHashMap<CompactString, CompactString>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    contained: bool,
}

impl Record {
    #[inline]
    pub fn known(&self, field: StandardField) -> Option<&str> {
        self.known[field.slot()].as_deref()
    }

    #[inline]
    pub fn extra(&self, field: &str) -> Option<&str> {
        self.extra.get(field).map(CompactString::as_str)
    }

    /// Parsed start timestamp, `None` when missing or unparsable
    #[inline]
    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    /// Parsed end timestamp, `None` when missing or unparsable
    #[inline]
    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    /// Start/end pair usable for concurrency and handle time
    #[inline]
    pub fn interval(&self) -> Option<(Timestamp, Timestamp)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end >= start => Some((start, end)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_contained(&self) -> bool {
        self.contained
    }
}

// ----------------------------------------------------------------------------
// Field Catalog
// ----------------------------------------------------------------------------

/// How a field is offered for filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Bounded set of selectable values, sorted
    Discrete { options: Vec<String> },
    /// Substring match
    FreeText,
    /// Not offered
    Excluded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Normalized name used for index lookups
    pub name: String,
    /// Original casing, used for display and export
    pub display_name: String,
    /// Expanded from the packed metrics field
    pub custom: bool,
    pub distinct_values: usize,
    pub non_empty_rows: usize,
    pub filter: FilterKind,
}

/// Fields in header order, input columns first and custom metric keys after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldCatalog {
    fields: Vec<FieldInfo>,
}

impl FieldCatalog {
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn headers(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.custom)
            .map(|f| f.display_name.clone())
            .collect()
    }

    pub fn custom_metric_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.custom)
            .map(|f| f.display_name.clone())
            .collect()
    }

    pub fn discrete_filter_options(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter_map(|f| match &f.filter {
                FilterKind::Discrete { options } => Some((f.name.clone(), options.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn free_text_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.filter == FilterKind::FreeText)
            .map(|f| f.name.clone())
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Inverted Index
// ----------------------------------------------------------------------------

/// field -> value -> ascending row ids. Append-only; ids are pushed in
/// ingestion order so every bucket is sorted without an explicit sort.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    index: AHashMap<CompactString, AHashMap<CompactString, Vec<RowId>>>,
}

impl InvertedIndex {
    fn insert(&mut self, field: &str, value: &str, row: RowId) {
        self.index
            .entry(CompactString::from(field))
            .or_default()
            .entry(CompactString::from(value))
            .or_default()
            .push(row);
    }

    /// Rows holding exactly this value
    pub fn find(&self, field: &str, value: &str) -> &[RowId] {
        self.index
            .get(field)
            .and_then(|values| values.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rows holding any of the values, ascending and deduplicated
    pub fn find_any<'a, I>(&self, field: &str, values: I) -> Vec<RowId>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = Vec::new();
        if let Some(value_map) = self.index.get(field) {
            for value in values {
                if let Some(ids) = value_map.get(value) {
                    result.extend_from_slice(ids);
                }
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Number of distinct values indexed for a field
    pub fn distinct_values(&self, field: &str) -> usize {
        self.index.get(field).map_or(0, |values| values.len())
    }

    /// All distinct values for a field, unordered
    pub fn values(&self, field: &str) -> Vec<&str> {
        self.index
            .get(field)
            .map(|values| values.keys().map(CompactString::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of rows with a non-empty value for a field
    pub fn non_empty_rows(&self, field: &str) -> usize {
        self.index
            .get(field)
            .map_or(0, |values| values.values().map(Vec::len).sum())
    }
}

// ----------------------------------------------------------------------------
// Running Totals
// ----------------------------------------------------------------------------

/// Dataset-wide aggregates maintained while rows are appended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunningTotals {
    pub rows: u64,
    pub contained: u64,
    pub handle_time_sum_ms: i64,
    pub handle_time_count: u64,
}

impl RunningTotals {
    fn observe(&mut self, record: &Record) {
        self.rows += 1;
        if record.contained {
            self.contained += 1;
        }
        if let Some((start, end)) = record.interval() {
            self.handle_time_sum_ms += end.as_millis() - start.as_millis();
            self.handle_time_count += 1;
        }
    }

    /// Mean handle time in milliseconds
    pub fn mean_handle_time_ms(&self) -> f64 {
        if self.handle_time_count == 0 {
            0.0
        } else {
            self.handle_time_sum_ms as f64 / self.handle_time_count as f64
        }
    }
}

// ----------------------------------------------------------------------------
// Ingest Report
// ----------------------------------------------------------------------------

/// Everything the caller needs to render filters after a load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub headers: Vec<String>,
    pub custom_metric_keys: Vec<String>,
    pub discrete_filter_options: BTreeMap<String, Vec<String>>,
    pub free_text_fields: Vec<String>,
    pub summary: SummaryStatistics,
    pub total_rows: usize,
    pub skipped_records: usize,
}

// ----------------------------------------------------------------------------
// Record Store
// ----------------------------------------------------------------------------

/// Column of the input stream and where its value goes
#[derive(Debug, Clone)]
struct ColumnBinding {
    name: CompactString,
    standard: Option<StandardField>,
}

#[derive(Debug)]
pub struct RecordStore {
    schema: SchemaConfig,
    records: Vec<Record>,
    index: InvertedIndex,
    catalog: FieldCatalog,
    standard_lookup: AHashMap<CompactString, StandardField>,
    totals: RunningTotals,
}

impl RecordStore {
    /// Ingest a delimited stream. Malformed records are skipped and counted;
    /// an unreadable stream or a missing header row fails the whole load.
    pub fn ingest<R: Read>(reader: R, schema: &SchemaConfig) -> IngestResult<(Self, IngestReport)> {
        let timer = PerfTimer::start("ingest", INGEST_SLOW_THRESHOLD_MS);
        let mut builder = StoreBuilder::new(schema.clone());

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(schema.delimiter as u8)
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| IngestError::unreadable(e.to_string()))?
            .clone();
        builder.bind_headers(&headers)?;

        let mut raw = csv::StringRecord::new();
        let mut skipped = 0usize;
        loop {
            match csv_reader.read_record(&mut raw) {
                Ok(true) => builder.push(&raw),
                Ok(false) => break,
                Err(e) => match e.kind() {
                    csv::ErrorKind::Io(_) => {
                        return Err(IngestError::unreadable(e.to_string()));
                    }
                    _ => {
                        skipped += 1;
                        debug!(
                            target: "convolens::ingest",
                            error = %e,
                            "Skipping malformed record"
                        );
                    }
                },
            }
        }

        let store = builder.finish();
        let summary = summarize(&store, &store.all_rows());
        let report = IngestReport {
            headers: store.catalog.headers(),
            custom_metric_keys: store.catalog.custom_metric_keys(),
            discrete_filter_options: store.catalog.discrete_filter_options(),
            free_text_fields: store.catalog.free_text_fields(),
            summary,
            total_rows: store.len(),
            skipped_records: skipped,
        };

        if skipped > 0 {
            warn!(
                target: "convolens::ingest",
                skipped,
                "Malformed records were skipped"
            );
        }
        info!(
            target: "convolens::ingest",
            rows = report.total_rows,
            fields = store.catalog.fields().len(),
            custom_keys = report.custom_metric_keys.len(),
            contained = store.totals.contained,
            mean_handle_time_ms = store.totals.mean_handle_time_ms(),
            elapsed_ms = timer.stop(),
            "Dataset ingested"
        );

        Ok((store, report))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    #[inline]
    pub fn record(&self, row: RowId) -> Option<&Record> {
        self.records.get(row as usize)
    }

    #[inline]
    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    #[inline]
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    #[inline]
    pub fn totals(&self) -> RunningTotals {
        self.totals
    }

    /// Every row id, ascending
    pub fn all_rows(&self) -> RowIdSet {
        RowIdSet::full(self.records.len())
    }

    /// Value of a normalized field for a row
    pub fn value(&self, row: RowId, field: &str) -> Option<&str> {
        let record = self.record(row)?;
        match self.standard_lookup.get(field) {
            Some(standard) => record.known(*standard),
            None => record.extra(field),
        }
    }
}

// ----------------------------------------------------------------------------
// Store Builder
// ----------------------------------------------------------------------------

struct StoreBuilder {
    schema: SchemaConfig,
    columns: Vec<Option<ColumnBinding>>,
    standard_lookup: AHashMap<CompactString, StandardField>,
    /// Names a custom key may not take: standard columns and input headers
    reserved: AHashSet<CompactString>,
    /// Field order and display names, input columns first
    field_order: Vec<(CompactString, String, bool)>,
    known_fields: AHashSet<CompactString>,
    records: Vec<Record>,
    index: InvertedIndex,
    totals: RunningTotals,
}

impl StoreBuilder {
    fn new(schema: SchemaConfig) -> Self {
        let mut standard_lookup = AHashMap::new();
        for field in StandardField::ALL {
            standard_lookup.insert(normalize_field_name(field.column(&schema)), field);
        }
        let reserved = standard_lookup.keys().cloned().collect();

        Self {
            schema,
            columns: Vec::new(),
            standard_lookup,
            reserved,
            field_order: Vec::new(),
            known_fields: AHashSet::new(),
            records: Vec::new(),
            index: InvertedIndex::default(),
            totals: RunningTotals::default(),
        }
    }

    fn bind_headers(&mut self, headers: &csv::StringRecord) -> IngestResult<()> {
        if headers.iter().all(|h| normalize_field_name(h).is_empty()) {
            return Err(IngestError::MissingHeader);
        }

        for header in headers.iter() {
            let name = normalize_field_name(header);
            // Blank and repeated headers keep their position but are not read.
            if name.is_empty() || self.known_fields.contains(&name) {
                self.columns.push(None);
                continue;
            }
            self.reserved.insert(name.clone());
            self.known_fields.insert(name.clone());
            self.field_order
                .push((name.clone(), header.trim().trim_start_matches('\u{feff}').to_string(), false));
            self.columns.push(Some(ColumnBinding {
                standard: self.standard_lookup.get(&name).copied(),
                name,
            }));
        }
        Ok(())
    }

    fn push(&mut self, raw: &csv::StringRecord) {
        let row = self.records.len() as RowId;
        let mut record = Record::default();

        for (binding, value) in self.columns.iter().zip(raw.iter()) {
            let Some(binding) = binding else { continue };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value = CompactString::from(value);
            match binding.standard {
                Some(standard) => record.known[standard.slot()] = Some(value),
                None => {
                    record.extra.insert(binding.name.clone(), value);
                }
            }
        }

        if let Some(packed) = record.known(StandardField::PackedMetrics).map(str::to_owned) {
            for (key, display, value) in self.expand_packed(&packed) {
                if !self.known_fields.contains(&key) {
                    self.known_fields.insert(key.clone());
                    self.field_order.push((key.clone(), display, true));
                }
                record.extra.insert(key, value);
            }
        }

        record.start = record.known(StandardField::StartTime).and_then(Timestamp::parse);
        record.end = record.known(StandardField::EndTime).and_then(Timestamp::parse);
        record.contained = record
            .known(StandardField::Contained)
            .is_some_and(|v| self.schema.is_contained(v));

        for standard in StandardField::ALL {
            if let Some(value) = record.known(standard) {
                let column = normalize_field_name(standard.column(&self.schema));
                self.index.insert(&column, value, row);
            }
        }
        for (field, value) in &record.extra {
            self.index.insert(field, value, row);
        }

        self.totals.observe(&record);
        self.records.push(record);
    }

    /// Split `key=value||key=value` into normalized, collision-free pairs.
    /// Returns `(field name, display name, value)`.
    fn expand_packed(&self, packed: &str) -> SmallVec<[(CompactString, String, CompactString); 8]> {
        let mut pairs = SmallVec::new();
        for pair in packed.split(self.schema.pair_delimiter.as_str()) {
            let Some((key, value)) = pair.split_once(self.schema.kv_delimiter.as_str()) else {
                continue;
            };
            let display = key.trim();
            let value = value.trim();
            if display.is_empty() || value.is_empty() {
                continue;
            }
            let mut name = normalize_field_name(display);
            let mut display = display.to_string();
            if self.reserved.contains(&name) {
                name.push_str(&self.schema.collision_suffix);
                display.push_str(&self.schema.collision_suffix);
            }
            pairs.push((name, display, CompactString::from(value)));
        }
        pairs
    }

    fn finish(self) -> RecordStore {
        let packed = normalize_field_name(&self.schema.packed_field);
        let full_text = normalize_field_name(&self.schema.full_text_field);
        let limit = self.schema.discrete_value_limit;

        let fields = self
            .field_order
            .iter()
            .map(|(name, display, custom)| {
                let distinct = self.index.distinct_values(name);
                let filter = if *name == packed || distinct == 0 {
                    FilterKind::Excluded
                } else if *name == full_text || distinct > limit {
                    FilterKind::FreeText
                } else {
                    let mut options: Vec<String> =
                        self.index.values(name).into_iter().map(str::to_owned).collect();
                    options.sort_unstable();
                    FilterKind::Discrete { options }
                };
                FieldInfo {
                    name: name.to_string(),
                    display_name: display.clone(),
                    custom: *custom,
                    distinct_values: distinct,
                    non_empty_rows: self.index.non_empty_rows(name),
                    filter,
                }
            })
            .collect();

        RecordStore {
            schema: self.schema,
            records: self.records,
            index: self.index,
            catalog: FieldCatalog { fields },
            standard_lookup: self.standard_lookup,
            totals: self.totals,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const SAMPLE: &str = "\
Conversation_ID,Start_Time,End_Time,Domain,Channel,Contained,Transcript,Custom_Metrics
c1,2024-01-01T00:00:00,2024-01-01T00:10:00,Billing,Chat,true,Customer asked about VPN setup,Region=US||Tier=Gold
c2,2024-01-01T00:05:00,2024-01-01T00:15:00,Billing,Voice,false,Refund request,Region=EU||Tier=Silver
c3,2024-01-01T00:20:00,2024-01-01T00:30:00,Tech,Chat,yes,vpn keeps dropping,Region=US
c4,2024-01-02T09:00:00,2024-01-02T09:30:00,Tech,Voice,no,Password reset,
";

    pub(crate) fn sample_store() -> RecordStore {
        RecordStore::ingest(SAMPLE.as_bytes(), &SchemaConfig::default())
            .unwrap()
            .0
    }

    #[test]
    fn test_ingest_counts_and_headers() {
        let (store, report) =
            RecordStore::ingest(SAMPLE.as_bytes(), &SchemaConfig::default()).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.skipped_records, 0);
        assert_eq!(report.headers[0], "Conversation_ID");
        assert_eq!(report.custom_metric_keys, vec!["Region", "Tier"]);
        assert_eq!(store.totals().contained, 2);
        assert_eq!(store.totals().handle_time_count, 4);
        assert_eq!(store.totals().mean_handle_time_ms(), 900_000.0);
    }

    #[test]
    fn test_packed_metrics_expand_and_index() {
        let store = sample_store();

        assert_eq!(store.value(0, "region"), Some("US"));
        assert_eq!(store.value(0, "tier"), Some("Gold"));
        assert_eq!(store.value(3, "region"), None);
        assert_eq!(store.index().find("region", "US"), &[0, 2]);
        assert_eq!(store.index().find("tier", "Gold"), &[0]);

        let options = store.catalog().discrete_filter_options();
        assert_eq!(options["region"], vec!["EU", "US"]);
        assert_eq!(options["tier"], vec!["Gold", "Silver"]);
    }

    #[test]
    fn test_field_names_are_normalized() {
        let store = sample_store();
        assert_eq!(store.value(1, "domain"), Some("Billing"));
        assert_eq!(store.value(1, "Domain"), None);
        assert_eq!(store.catalog().get("domain").unwrap().display_name, "Domain");
    }

    #[test]
    fn test_custom_key_collision_is_renamed() {
        let data = "domain,custom_metrics\nSales,Domain=Internal||score=4\n";
        let (store, report) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();

        assert_eq!(store.value(0, "domain"), Some("Sales"));
        assert_eq!(store.value(0, "domain_custom"), Some("Internal"));
        assert_eq!(store.value(0, "score"), Some("4"));
        assert_eq!(report.custom_metric_keys, vec!["Domain_custom", "score"]);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let data = "a,b\n1,2\n3\n4,5,6\n7,8\n";
        let (store, report) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();

        assert_eq!(report.skipped_records, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(1, "a"), Some("7"));
    }

    #[test]
    fn test_empty_stream_is_fatal() {
        let err = RecordStore::ingest("".as_bytes(), &SchemaConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingHeader));
    }

    #[test]
    fn test_unreadable_stream_is_fatal() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }
        let err = RecordStore::ingest(Broken, &SchemaConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn test_index_buckets_cover_exactly_non_empty_rows() {
        let store = sample_store();
        for info in store.catalog().fields() {
            let mut rows: Vec<RowId> = store
                .index()
                .values(&info.name)
                .into_iter()
                .flat_map(|v| store.index().find(&info.name, v).to_vec())
                .collect();
            rows.sort_unstable();
            let expected: Vec<RowId> = (0..store.len() as RowId)
                .filter(|row| store.value(*row, &info.name).is_some())
                .collect();
            assert_eq!(rows, expected, "field {}", info.name);
        }
    }

    #[test]
    fn test_catalog_classification() {
        let mut schema = SchemaConfig::default();
        schema.discrete_value_limit = 2;
        let (store, report) = RecordStore::ingest(SAMPLE.as_bytes(), &schema).unwrap();

        // Transcript is always free text; conversation ids exceed the limit.
        assert!(report.free_text_fields.contains(&"transcript".to_string()));
        assert!(report.free_text_fields.contains(&"conversation_id".to_string()));
        assert_eq!(
            store.catalog().get("custom_metrics").unwrap().filter,
            FilterKind::Excluded
        );
        assert_eq!(
            store.catalog().get("domain").unwrap().filter,
            FilterKind::Discrete { options: vec!["Billing".into(), "Tech".into()] }
        );
    }

    #[test]
    fn test_unparsable_timestamps_kept_in_store() {
        let data = "start_time,end_time,contained\nnot a date,2024-01-01T00:10:00,true\n";
        let (store, report) = RecordStore::ingest(data.as_bytes(), &SchemaConfig::default()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.record(0).unwrap().interval(), None);
        assert_eq!(report.summary.population, 1);
        assert_eq!(report.summary.invalid_timing, 1);
        assert_eq!(report.summary.contained_count, 1);
    }
}
