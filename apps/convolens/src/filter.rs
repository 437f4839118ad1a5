// ============================================================================
// FILTER ENGINE
// ============================================================================
// Field filters AND together; values within one discrete field OR together.
// Discrete entries resolve through the inverted index. Date ranges and
// substring matches scan only the rows still in the candidate set, so they
// are evaluated after the cheap index lookups have narrowed it.
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::store::{normalize_field_name, RecordStore, RowId};
use crate::timestamp::Timestamp;

// ----------------------------------------------------------------------------
// Row Id Set
// ----------------------------------------------------------------------------

/// Ascending, duplicate-free set of row ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIdSet(Vec<RowId>);

impl RowIdSet {
    /// Every id in `0..len`
    pub fn full(len: usize) -> Self {
        Self((0..len as RowId).collect())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build from ids in any order
    pub fn from_unsorted(mut ids: Vec<RowId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Build from ids already ascending and unique
    fn from_sorted(ids: Vec<RowId>) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        Self(ids)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[RowId] {
        &self.0
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.0.binary_search(&row).is_ok()
    }

    pub fn into_vec(self) -> Vec<RowId> {
        self.0
    }

    /// Merge-intersect with another ascending id list
    pub fn intersect(&self, other: &[RowId]) -> Self {
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::with_capacity(self.0.len().min(other.len()));
        while i < self.0.len() && j < other.len() {
            match self.0[i].cmp(&other[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        Self::from_sorted(out)
    }

    /// Keep the ids satisfying a predicate
    pub fn retain<F: FnMut(RowId) -> bool>(&self, mut keep: F) -> Self {
        Self::from_sorted(self.0.iter().copied().filter(|row| keep(*row)).collect())
    }
}

impl FromIterator<RowId> for RowIdSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

// ----------------------------------------------------------------------------
// Filter Definitions
// ----------------------------------------------------------------------------

/// Constraint on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldFilter {
    /// Exact match against any of the values
    Values(BTreeSet<String>),
    /// Case-insensitive substring match
    Contains(String),
    /// Inclusive bounds on the start timestamp
    DateRange {
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    },
}

impl FieldFilter {
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn contains(needle: impl Into<String>) -> Self {
        FieldFilter::Contains(needle.into())
    }

    /// Date range from user-entered bounds. A bare date as the upper bound
    /// includes that whole day. Blank bounds are absent; anything else that
    /// does not parse is rejected.
    pub fn date_range_from_strs(from: Option<&str>, to: Option<&str>) -> QueryResult<Self> {
        Ok(FieldFilter::DateRange {
            from: parse_bound(from, Timestamp::parse)?,
            to: parse_bound(to, Timestamp::parse_upper_bound)?,
        })
    }

    /// Entries that constrain nothing are skipped entirely
    pub fn is_unconstrained(&self) -> bool {
        match self {
            FieldFilter::Values(values) => values.is_empty(),
            FieldFilter::Contains(needle) => needle.trim().is_empty(),
            FieldFilter::DateRange { from, to } => from.is_none() && to.is_none(),
        }
    }

    fn stage(&self) -> u8 {
        match self {
            FieldFilter::Values(_) => 0,
            FieldFilter::DateRange { .. } => 1,
            FieldFilter::Contains(_) => 2,
        }
    }
}

fn parse_bound(
    raw: Option<&str>,
    parse: fn(&str) -> Option<Timestamp>,
) -> QueryResult<Option<Timestamp>> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => parse(raw).map(Some).ok_or_else(|| QueryError::InvalidDate {
            value: raw.to_string(),
        }),
    }
}

/// Field name -> constraint. Names are normalized on lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec(BTreeMap<String, FieldFilter>);

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, filter: FieldFilter) -> Self {
        self.insert(field, filter);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, filter: FieldFilter) {
        self.0.insert(field.into(), filter);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(FieldFilter::is_unconstrained)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldFilter)> {
        self.0.iter()
    }
}

// ----------------------------------------------------------------------------
// Evaluation
// ----------------------------------------------------------------------------

/// Rows matching every entry of the filter, ascending.
pub fn apply_filters(store: &RecordStore, spec: &FilterSpec) -> RowIdSet {
    let mut candidates = store.all_rows();

    let mut entries: Vec<(&String, &FieldFilter)> = spec
        .iter()
        .filter(|(_, filter)| !filter.is_unconstrained())
        .collect();
    entries.sort_by_key(|(_, filter)| filter.stage());

    for (field, filter) in entries {
        if candidates.is_empty() {
            break;
        }
        let field = normalize_field_name(field);
        candidates = match filter {
            FieldFilter::Values(values) => {
                let matched = store
                    .index()
                    .find_any(&field, values.iter().map(String::as_str));
                candidates.intersect(&matched)
            }
            FieldFilter::DateRange { from, to } => candidates.retain(|row| {
                store
                    .record(row)
                    .and_then(|r| r.start())
                    .is_some_and(|start| start.is_within(*from, *to))
            }),
            FieldFilter::Contains(needle) => {
                let needle = needle.to_lowercase();
                candidates.retain(|row| {
                    store
                        .value(row, &field)
                        .is_some_and(|value| value.to_lowercase().contains(&needle))
                })
            }
        };
        trace!(
            target: "convolens::filter",
            field = %field,
            remaining = candidates.len(),
            "Filter entry applied"
        );
    }

    candidates
}
