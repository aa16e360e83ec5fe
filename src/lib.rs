//! # VAT Box Summary
//!
//! A library for turning loosely formatted VAT transaction sheets (one sheet
//! per reporting period) into standardized VAT box totals.
//!
//! ## Core Concepts
//!
//! - **Column classification**: each sheet's headers are matched against a
//!   configurable synonym table ("Sale Amt", "Supply/Purchase Value", "Tax")
//!   to find the supply, purchase, VAT and box columns. An optional
//!   [`ColumnSuggester`] is consulted when the heuristics come up short.
//! - **Normalization**: cells become [`rust_decimal::Decimal`] amounts; blank
//!   or unreadable rows are skipped and counted, never fatal.
//! - **Aggregation**: rows land in their own box, else in the box the
//!   default precedence table picks for their populated columns, else in an
//!   explicit unassigned bucket. Derived boxes (net VAT) are computed last.
//! - **Reports**: one [`PeriodSummary`] per sheet, collected in a
//!   [`MultiPeriodReport`] that renders to a table, CSV or JSON and can be
//!   persisted through a [`SummaryStore`].
//!
//! ## Example
//!
//! ```rust
//! use vat_box_summary::*;
//!
//! let sheet = RawSheet::from_grid(
//!     "Jan 2024",
//!     vec![
//!         vec!["Sale Amt".into(), "VAT".into(), "Box".into()],
//!         vec![1000i64.into(), 50i64.into(), "A".into()],
//!         vec![(-200i64).into(), (-10i64).into(), "A".into()],
//!     ],
//! );
//!
//! let report = summarize_sheets(&[sheet], &EngineConfig::default()).unwrap();
//! let box_a = report.periods[0].total("A").unwrap();
//! assert_eq!(box_a.amount.to_string(), "800");
//! assert_eq!(box_a.vat.to_string(), "40");
//! ```

pub mod aggregator;
pub mod boxes;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod suggest;
pub mod utils;

#[cfg(feature = "gemini")]
pub mod llm;

pub use aggregator::BoxAggregator;
pub use boxes::*;
pub use classifier::{token_overlap, ColumnClassifier};
pub use config::{normalize_header, EngineConfig, SynonymTable};
pub use error::{Result, VatSummaryError};
pub use normalizer::{NormalizedRows, RowNormalizer};
pub use persistence::{InMemoryStore, PeriodRange, SummaryStore};
pub use pipeline::{SheetOutcome, SheetPipeline};
pub use report::*;
pub use schema::*;
pub use suggest::{ColumnSuggester, NoopSuggester, StaticSuggester};
pub use utils::*;

#[cfg(feature = "sqlite")]
pub use persistence::{with_store, SqliteStore};

use log::{debug, info};
use std::sync::Arc;

/// One-call entry points over [`SheetPipeline`].
pub struct VatSummaryProcessor;

impl VatSummaryProcessor {
    pub fn process(sheets: &[RawSheet], config: &EngineConfig) -> Result<MultiPeriodReport> {
        Self::process_with_suggester(sheets, config, None)
    }

    pub fn process_with_suggester(
        sheets: &[RawSheet],
        config: &EngineConfig,
        suggester: Option<Arc<dyn ColumnSuggester>>,
    ) -> Result<MultiPeriodReport> {
        info!(
            "Processing workbook with {} sheets ({} boxes configured)",
            sheets.len(),
            config.boxes.boxes.len()
        );
        debug!(
            "Fuzzy threshold {}, suggester {}",
            config.match_threshold,
            if suggester.is_some() { "configured" } else { "off" }
        );

        let mut pipeline = SheetPipeline::new(config.clone())?;
        if let Some(suggester) = suggester {
            pipeline = pipeline.with_suggester(suggester);
        }
        pipeline.run(sheets)
    }

    /// Builds sheets from named raw grids (header rows are detected) and
    /// summarizes them.
    pub fn process_grids<N>(
        grids: Vec<(N, Vec<Vec<CellValue>>)>,
        config: &EngineConfig,
    ) -> Result<MultiPeriodReport>
    where
        N: Into<String>,
    {
        let sheets: Vec<RawSheet> = grids
            .into_iter()
            .map(|(name, grid)| RawSheet::from_grid_detect_header(name, grid, config))
            .collect();
        Self::process(&sheets, config)
    }
}

pub fn summarize_sheets(sheets: &[RawSheet], config: &EngineConfig) -> Result<MultiPeriodReport> {
    VatSummaryProcessor::process(sheets, config)
}

pub fn summarize_grids<N: Into<String>>(
    grids: Vec<(N, Vec<Vec<CellValue>>)>,
    config: &EngineConfig,
) -> Result<MultiPeriodReport> {
    VatSummaryProcessor::process_grids(grids, config)
}
