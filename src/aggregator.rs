use crate::boxes::{AggregateField, BoxCode, BoxDefinition, DerivedFigure};
use crate::error::Result;
use crate::report::{BoxTotal, PeriodSummary};
use crate::schema::NormalizedTransaction;
use log::{debug, trace};
use rust_decimal::Decimal;

/// Sums normalized transactions into the configured boxes.
///
/// Assignment order for each transaction: its own recognized box code, then
/// the first default rule whose role combination equals the transaction's,
/// then the unassigned bucket. Nothing is dropped.
///
/// Sums are checked: a sheet whose totals leave the decimal range fails with
/// [`crate::error::VatSummaryError::AmountOverflow`].
pub struct BoxAggregator<'a> {
    boxes: &'a BoxDefinition,
}

impl<'a> BoxAggregator<'a> {
    pub fn new(boxes: &'a BoxDefinition) -> Self {
        Self { boxes }
    }

    pub fn aggregate(
        &self,
        period: &str,
        transactions: &[NormalizedTransaction],
        skipped_row_count: usize,
    ) -> Result<PeriodSummary> {
        let mut summary = PeriodSummary::empty(period, self.boxes);
        summary.transaction_count = transactions.len();
        summary.skipped_row_count = skipped_row_count;

        for txn in transactions {
            match self.assign(txn) {
                Some((code, explicit)) => {
                    let total = self.contribution(txn, code, explicit);
                    trace!(
                        "[{}] row {} -> box {} ({} / {})",
                        period,
                        txn.source_row_index,
                        code,
                        total.amount,
                        total.vat
                    );
                    summary.add_to_box(code, &total)?;
                }
                None => {
                    trace!(
                        "[{}] row {} ({}) left unassigned",
                        period,
                        txn.source_row_index,
                        txn.roles
                    );
                    summary.add_unassigned(&BoxTotal::new(txn.amount, txn.vat_amount, 1))?;
                }
            }
        }

        self.apply_derived(&mut summary)?;

        debug!(
            "[{}] aggregated {} transactions, {} unassigned",
            period, summary.transaction_count, summary.unassigned.transaction_count
        );

        Ok(summary)
    }

    /// Target box and whether it came from the row's own box code.
    fn assign<'t>(&'t self, txn: &'t NormalizedTransaction) -> Option<(&'t BoxCode, bool)> {
        if let Some(code) = txn.box_code.as_ref().filter(|c| self.boxes.spec(c).is_some()) {
            return Some((code, true));
        }
        self.boxes
            .default_box_for(&txn.roles)
            .map(|code| (code, false))
    }

    /// What a transaction adds to `code`.
    ///
    /// The amount lands when the box collects the transaction's own amount
    /// field, or when the row names the box itself and the box collects any
    /// amount. VAT lands when the box collects VAT.
    fn contribution(&self, txn: &NormalizedTransaction, code: &BoxCode, explicit: bool) -> BoxTotal {
        let Some(spec) = self.boxes.spec(code) else {
            return BoxTotal::default();
        };

        let own_field = (txn.roles.supply && spec.aggregates(AggregateField::Supply))
            || (txn.roles.purchase && spec.aggregates(AggregateField::Purchase));
        let amount = if own_field || (explicit && spec.aggregates_any_amount()) {
            txn.amount
        } else {
            Decimal::ZERO
        };
        let vat = if spec.aggregates(AggregateField::Vat) {
            txn.vat_amount
        } else {
            Decimal::ZERO
        };

        BoxTotal::new(amount, vat, 1)
    }

    fn apply_derived(&self, summary: &mut PeriodSummary) -> Result<()> {
        for derived in &self.boxes.derived {
            let figure = |code: &BoxCode| {
                let total = summary.totals.get(code).copied().unwrap_or_default();
                match derived.figure {
                    DerivedFigure::Amount => total.amount,
                    DerivedFigure::Vat => total.vat,
                }
            };
            let sum = |codes: &[BoxCode]| {
                codes
                    .iter()
                    .map(&figure)
                    .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
            };
            let value = match (sum(&derived.add), sum(&derived.subtract)) {
                (Some(add), Some(subtract)) => add.checked_sub(subtract),
                _ => None,
            }
            .ok_or_else(|| summary.overflow())?;

            let total = match derived.figure {
                DerivedFigure::Amount => BoxTotal::new(value, Decimal::ZERO, 0),
                DerivedFigure::Vat => BoxTotal::new(Decimal::ZERO, value, 0),
            };
            summary.totals.insert(derived.code.clone(), total);
        }
        Ok(())
    }
}
