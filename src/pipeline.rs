use crate::aggregator::BoxAggregator;
use crate::classifier::ColumnClassifier;
use crate::config::EngineConfig;
use crate::error::{Result, VatSummaryError};
use crate::normalizer::{NormalizedRows, RowNormalizer};
use crate::persistence::SummaryStore;
use crate::report::{MultiPeriodReport, PeriodFailure, PeriodSummary};
use crate::schema::{CellValue, ColumnMapping, RawSheet};
use crate::suggest::ColumnSuggester;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;

/// Everything produced for one sheet, for callers that want to audit the
/// column mapping or the skipped rows behind a summary.
#[derive(Debug, Clone)]
pub struct SheetOutcome {
    pub mapping: ColumnMapping,
    pub rows: NormalizedRows,
    pub summary: PeriodSummary,
}

/// Runs classification, normalization and aggregation for each sheet.
pub struct SheetPipeline {
    config: EngineConfig,
    suggester: Option<Arc<dyn ColumnSuggester>>,
}

impl Default for SheetPipeline {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            suggester: None,
        }
    }
}

impl SheetPipeline {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            suggester: None,
        })
    }

    /// Fallback classifier consulted when header heuristics leave roles open.
    pub fn with_suggester(mut self, suggester: Arc<dyn ColumnSuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a sheet from a raw cell grid, locating its header row first.
    pub fn sheet_from_grid(&self, name: impl Into<String>, grid: Vec<Vec<CellValue>>) -> RawSheet {
        RawSheet::from_grid_detect_header(name, grid, &self.config)
    }

    pub fn process_sheet(&self, sheet: &RawSheet) -> Result<SheetOutcome> {
        let classifier = ColumnClassifier::new(&self.config).with_suggester(self.suggester.clone());
        let sample_len = sheet.rows.len().min(self.config.sample_rows);
        let mapping = classifier.classify(&sheet.period, &sheet.headers, &sheet.rows[..sample_len])?;

        let rows = RowNormalizer::new(&mapping, &self.config.boxes).normalize(&sheet.period, &sheet.rows);
        let summary = BoxAggregator::new(&self.config.boxes).aggregate(
            &sheet.period,
            &rows.transactions,
            rows.skipped_count(),
        )?;

        debug!(
            "[{}] {} transactions, {} skipped rows",
            sheet.period, summary.transaction_count, summary.skipped_row_count
        );

        Ok(SheetOutcome {
            mapping,
            rows,
            summary,
        })
    }

    /// Summarizes every sheet in order. A sheet that fails is recorded in
    /// `failures` and the run moves on.
    pub fn run(&self, sheets: &[RawSheet]) -> Result<MultiPeriodReport> {
        if sheets.is_empty() {
            return Err(VatSummaryError::EmptyInput);
        }
        info!("Summarizing {} sheets", sheets.len());

        let mut report = MultiPeriodReport::new(&self.config.boxes);
        for sheet in sheets {
            let outcome = self.process_sheet(sheet).map(|o| o.summary);
            record(&mut report, &sheet.period, outcome)?;
        }

        log_report(&report);
        Ok(report)
    }

    /// Same result as [`SheetPipeline::run`], with up to `max_workers` sheets
    /// processed at once on scoped threads.
    pub fn run_parallel(&self, sheets: &[RawSheet]) -> Result<MultiPeriodReport> {
        if sheets.is_empty() {
            return Err(VatSummaryError::EmptyInput);
        }
        let workers = self.config.max_workers.max(1);
        info!(
            "Summarizing {} sheets on up to {} workers",
            sheets.len(),
            workers
        );

        let mut report = MultiPeriodReport::new(&self.config.boxes);
        for chunk in sheets.chunks(workers) {
            let results: Vec<Result<PeriodSummary>> = thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|sheet| {
                        let handle =
                            scope.spawn(move || self.process_sheet(sheet).map(|o| o.summary));
                        (sheet, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(sheet, handle)| join_sheet(&sheet.period, handle))
                    .collect()
            });

            for (sheet, outcome) in chunk.iter().zip(results) {
                record(&mut report, &sheet.period, outcome)?;
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Writes every box total and the row counts of each period to `store`.
    ///
    /// Upserts only, so persisting the same report again changes nothing.
    /// Each period goes through [`SummaryStore::upsert_summary`]; the first
    /// failing period stops the write. The report itself is not touched.
    pub fn persist<S>(&self, report: &MultiPeriodReport, store: &mut S) -> Result<()>
    where
        S: SummaryStore + ?Sized,
    {
        for summary in &report.periods {
            store.upsert_summary(summary)?;
        }
        info!("Persisted {} period summaries", report.periods.len());
        Ok(())
    }
}

fn record(
    report: &mut MultiPeriodReport,
    period: &str,
    outcome: Result<PeriodSummary>,
) -> Result<()> {
    match outcome {
        Ok(summary) => report.periods.push(summary),
        Err(err) if err.is_recoverable() => {
            warn!("Sheet '{}' skipped: {}", period, err);
            report.failures.push(PeriodFailure {
                period: period.to_string(),
                reason: err.to_string(),
            });
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Joins a sheet worker, turning a panic into a failure of that sheet.
fn join_sheet(
    period: &str,
    handle: thread::ScopedJoinHandle<'_, Result<PeriodSummary>>,
) -> Result<PeriodSummary> {
    handle.join().unwrap_or_else(|_| {
        Err(VatSummaryError::WorkerPanicked {
            period: period.to_string(),
        })
    })
}

fn log_report(report: &MultiPeriodReport) {
    info!(
        "Summarized {} periods ({} failed)",
        report.periods.len(),
        report.failures.len()
    );
}
