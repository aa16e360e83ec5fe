//! Storage of period summaries.
//!
//! Stores are handed to [`crate::pipeline::SheetPipeline::persist`]
//! explicitly; nothing here is global. Every write is an upsert keyed by
//! `(period, box code)`, so persisting the same report twice leaves the store
//! unchanged.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{with_store, SqliteStore};

use crate::boxes::BoxCode;
use crate::error::Result;
use crate::report::{BoxTotal, PeriodSummary};
use crate::utils::PeriodKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Box code under which a summary's unassigned bucket is stored.
pub const UNASSIGNED_CODE: &str = "UNASSIGNED";

pub trait SummaryStore {
    /// Inserts or replaces the total of `box_code` for `period`.
    fn upsert(&mut self, period: &str, box_code: &BoxCode, total: &BoxTotal) -> Result<()>;

    /// Inserts or replaces the row counts of `period`.
    fn upsert_counts(
        &mut self,
        period: &str,
        transaction_count: usize,
        skipped_row_count: usize,
    ) -> Result<()>;

    /// Writes every box total, the unassigned bucket and the counts of one
    /// period. Stores that can should make this all-or-nothing.
    fn upsert_summary(&mut self, summary: &PeriodSummary) -> Result<()> {
        for (code, total) in &summary.totals {
            self.upsert(&summary.period, code, total)?;
        }
        self.upsert(
            &summary.period,
            &BoxCode::new(UNASSIGNED_CODE),
            &summary.unassigned,
        )?;
        self.upsert_counts(
            &summary.period,
            summary.transaction_count,
            summary.skipped_row_count,
        )
    }

    /// Stored summaries whose period falls in `range`, in period order.
    fn fetch_summaries(&self, range: &PeriodRange) -> Result<Vec<PeriodSummary>>;
}

/// Inclusive bounds on period labels. Open on either side when `None`.
///
/// Month-like labels ("Jan", "January 2024", "2024-01") compare by calendar
/// month, anything else lexically and after all months.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl PeriodRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    pub fn single(period: impl Into<String>) -> Self {
        let period = period.into();
        Self::between(period.clone(), period)
    }

    pub fn contains(&self, period: &str) -> bool {
        let key = PeriodKey::from_label(period);
        let after_start = self
            .start
            .as_deref()
            .map_or(true, |start| PeriodKey::from_label(start) <= key);
        let before_end = self
            .end
            .as_deref()
            .map_or(true, |end| key <= PeriodKey::from_label(end));
        after_start && before_end
    }
}

/// Reassembles summaries from stored rows.
///
/// Shared by store implementations: `boxes` yields `(period, code, total)`,
/// `counts` yields `(period, transactions, skipped)`.
pub(crate) fn assemble_summaries<B, C>(boxes: B, counts: C, range: &PeriodRange) -> Vec<PeriodSummary>
where
    B: IntoIterator<Item = (String, BoxCode, BoxTotal)>,
    C: IntoIterator<Item = (String, usize, usize)>,
{
    let mut by_period: BTreeMap<(PeriodKey, String), PeriodSummary> = BTreeMap::new();

    for (period, code, total) in boxes {
        if !range.contains(&period) {
            continue;
        }
        let summary = period_entry(&mut by_period, period);
        if code.as_str() == UNASSIGNED_CODE {
            summary.unassigned = total;
        } else {
            summary.totals.insert(code, total);
        }
    }

    for (period, transactions, skipped) in counts {
        if !range.contains(&period) {
            continue;
        }
        let summary = period_entry(&mut by_period, period);
        summary.transaction_count = transactions;
        summary.skipped_row_count = skipped;
    }

    by_period.into_values().collect()
}

fn period_entry(
    by_period: &mut BTreeMap<(PeriodKey, String), PeriodSummary>,
    period: String,
) -> &mut PeriodSummary {
    by_period
        .entry((PeriodKey::from_label(&period), period.clone()))
        .or_insert_with(|| PeriodSummary {
            period,
            totals: BTreeMap::new(),
            unassigned: BoxTotal::default(),
            transaction_count: 0,
            skipped_row_count: 0,
        })
}

/// Map-backed store, mostly for tests and one-off runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    boxes: BTreeMap<(String, BoxCode), BoxTotal>,
    counts: BTreeMap<String, (usize, usize)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows: `(period, box)` totals plus per-period counts.
    pub fn len(&self) -> usize {
        self.boxes.len() + self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.counts.is_empty()
    }
}

impl SummaryStore for InMemoryStore {
    fn upsert(&mut self, period: &str, box_code: &BoxCode, total: &BoxTotal) -> Result<()> {
        self.boxes
            .insert((period.to_string(), box_code.clone()), *total);
        Ok(())
    }

    fn upsert_counts(
        &mut self,
        period: &str,
        transaction_count: usize,
        skipped_row_count: usize,
    ) -> Result<()> {
        self.counts
            .insert(period.to_string(), (transaction_count, skipped_row_count));
        Ok(())
    }

    fn fetch_summaries(&self, range: &PeriodRange) -> Result<Vec<PeriodSummary>> {
        Ok(assemble_summaries(
            self.boxes
                .iter()
                .map(|((period, code), total)| (period.clone(), code.clone(), *total)),
            self.counts
                .iter()
                .map(|(period, (txns, skipped))| (period.clone(), *txns, *skipped)),
            range,
        ))
    }
}
