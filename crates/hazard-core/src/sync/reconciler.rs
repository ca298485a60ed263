//! Applying deltas to a view's local collection
//!
//! A view is parametrized by a [`ViewSpec`]: a filter predicate, a sort
//! comparator, and where its initial contents come from. One [`Reconciler`]
//! serves any view; the "active" and "resolved" lists differ only in filter and ordering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::codec::{self, FIELD_IS_RESOLVED, HAZARD_RECORD_TYPE};
use crate::models::{FieldValue, HazardReport, RecordChange, RecordId};
use crate::remote::{RecordFilter, RecordQuery, SortKey};

/// Predicate deciding whether a report belongs in a view.
pub type ReportFilter = Arc<dyn Fn(&HazardReport) -> bool + Send + Sync>;

/// Total order of reports within a view.
pub type ReportComparator = Arc<dyn Fn(&HazardReport, &HazardReport) -> Ordering + Send + Sync>;

/// Where a view's initial contents are loaded from.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewSource {
    /// Bulk query against the store.
    Query(RecordQuery),
    /// A single record fetched by identity.
    Record(RecordId),
}

/// Filter, order, and initial source of one view.
#[derive(Clone)]
pub struct ViewSpec {
    name: String,
    filter: ReportFilter,
    comparator: ReportComparator,
    source: ViewSource,
}

impl ViewSpec {
    pub fn new(
        name: impl Into<String>,
        source: ViewSource,
        filter: impl Fn(&HazardReport) -> bool + Send + Sync + 'static,
        comparator: impl Fn(&HazardReport, &HazardReport) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            filter: Arc::new(filter),
            comparator: Arc::new(comparator),
            source,
        }
    }

    /// Unresolved reports, oldest first.
    #[must_use]
    pub fn active() -> Self {
        let query = RecordQuery::new(HAZARD_RECORD_TYPE)
            .filter(RecordFilter::FieldEquals {
                field: FIELD_IS_RESOLVED.to_string(),
                value: FieldValue::Bool(false),
            })
            .sort_by(SortKey::CreatedAt, true);
        Self::new(
            "active",
            ViewSource::Query(query),
            |report| !report.is_resolved,
            |left, right| saved_first(left.created_at, right.created_at, i64::cmp),
        )
    }

    /// Resolved reports, most recently modified first.
    #[must_use]
    pub fn resolved() -> Self {
        let query = RecordQuery::new(HAZARD_RECORD_TYPE)
            .filter(RecordFilter::FieldEquals {
                field: FIELD_IS_RESOLVED.to_string(),
                value: FieldValue::Bool(true),
            })
            .sort_by(SortKey::ModifiedAt, false);
        Self::new(
            "resolved",
            ViewSource::Query(query),
            |report| report.is_resolved,
            |left, right| {
                saved_first(left.modified_at, right.modified_at, |l, r| r.cmp(l))
            },
        )
    }

    /// Every report, oldest first.
    #[must_use]
    pub fn all() -> Self {
        let query = RecordQuery::new(HAZARD_RECORD_TYPE).sort_by(SortKey::CreatedAt, true);
        Self::new(
            "all",
            ViewSource::Query(query),
            |_| true,
            |left, right| saved_first(left.created_at, right.created_at, i64::cmp),
        )
    }

    /// Detail view tracking one record.
    #[must_use]
    pub fn single(record_id: RecordId) -> Self {
        let wanted = record_id.clone();
        Self::new(
            format!("record {record_id}"),
            ViewSource::Record(record_id),
            move |report| report.record_id().as_ref() == Some(&wanted),
            |_, _| Ordering::Equal,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn source(&self) -> &ViewSource {
        &self.source
    }

    pub fn accepts(&self, report: &HazardReport) -> bool {
        (self.filter)(report)
    }

    pub fn compare(&self, left: &HazardReport, right: &HazardReport) -> Ordering {
        (self.comparator)(left, right)
    }
}

impl fmt::Debug for ViewSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSpec")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Unsaved reports (no timestamp) sort after saved ones.
fn saved_first(
    left: Option<i64>,
    right: Option<i64>,
    order: impl Fn(&i64, &i64) -> Ordering,
) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => order(&left, &right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    record_id: Option<RecordId>,
    report: HazardReport,
}

/// Ordered, filtered reports owned by exactly one view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCollection {
    entries: Vec<Entry>,
}

impl LocalCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HazardReport> {
        self.entries.iter().map(|entry| &entry.report)
    }

    pub fn get(&self, record_id: &RecordId) -> Option<&HazardReport> {
        self.position(record_id).map(|index| &self.entries[index].report)
    }

    pub fn contains(&self, record_id: &RecordId) -> bool {
        self.position(record_id).is_some()
    }

    /// Identities in collection order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.entries
            .iter()
            .filter_map(|entry| entry.record_id.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, record_id: &RecordId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.record_id.as_ref() == Some(record_id))
    }
}

/// Counts of what one batch did to a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    pub ignored: usize,
    pub decode_failures: usize,
}

impl ApplyReport {
    /// Whether the collection changed.
    pub const fn changed(&self) -> bool {
        self.inserted + self.replaced + self.removed > 0
    }
}

/// Applies delta batches to a [`LocalCollection`] under one [`ViewSpec`].
#[derive(Debug, Clone)]
pub struct Reconciler {
    spec: ViewSpec,
}

impl Reconciler {
    pub const fn new(spec: ViewSpec) -> Self {
        Self { spec }
    }

    pub const fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    /// Apply a batch, then re-sort the whole collection.
    ///
    /// Records that fail to decode are skipped; the rest of the batch still
    /// applies. Applying the same batch twice leaves the collection as one
    /// application would.
    pub fn apply(&self, changes: &[RecordChange], collection: &mut LocalCollection) -> ApplyReport {
        let mut report = ApplyReport::default();

        for change in changes {
            match change {
                RecordChange::Created(record) | RecordChange::Updated(record) => {
                    let decoded = match codec::from_remote(record) {
                        Ok(decoded) => decoded,
                        Err(error) => {
                            tracing::warn!(
                                "Dropping {} delta in view '{}': {error}",
                                change.reason(),
                                self.spec.name
                            );
                            report.decode_failures += 1;
                            continue;
                        }
                    };
                    let record_id = record.record_id().cloned();
                    let existing = record_id
                        .as_ref()
                        .and_then(|record_id| collection.position(record_id));
                    let accepted = self.spec.accepts(&decoded);

                    match (existing, accepted) {
                        (Some(index), true) => {
                            collection.entries[index].report = decoded;
                            report.replaced += 1;
                        }
                        (Some(index), false) => {
                            collection.entries.remove(index);
                            report.removed += 1;
                        }
                        // An update for an unseen record is treated as an insert.
                        (None, true) => {
                            collection.entries.push(Entry {
                                record_id,
                                report: decoded,
                            });
                            report.inserted += 1;
                        }
                        (None, false) => report.ignored += 1,
                    }
                }
                RecordChange::Deleted(record_id) => match collection.position(record_id) {
                    Some(index) => {
                        collection.entries.remove(index);
                        report.removed += 1;
                    }
                    None => report.ignored += 1,
                },
            }
        }

        collection
            .entries
            .sort_by(|left, right| self.spec.compare(&left.report, &right.report));

        tracing::trace!("View '{}' applied batch: {report:?}", self.spec.name);
        report
    }
}
