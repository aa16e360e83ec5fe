use crate::boxes::BoxDefinition;
use crate::error::VatSummaryError;
use crate::schema::{
    CellValue, ColumnMapping, ColumnRole, NormalizedTransaction, RawRow, RoleCombination,
    SkippedRow,
};
use log::{debug, trace};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Output of [`RowNormalizer::normalize`].
///
/// `transactions.len() + skipped.len()` always equals the input row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRows {
    pub transactions: Vec<NormalizedTransaction>,
    pub skipped: Vec<SkippedRow>,
}

impl NormalizedRows {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn total_rows(&self) -> usize {
        self.transactions.len() + self.skipped.len()
    }
}

/// Reading of one mapped value cell.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ValueCell {
    Missing,
    Value(Decimal),
}

impl ValueCell {
    fn read(row: &RawRow, column: Option<usize>) -> Self {
        column
            .and_then(|idx| row.get(idx).to_decimal())
            .map(ValueCell::Value)
            .unwrap_or(ValueCell::Missing)
    }

    fn value(self) -> Option<Decimal> {
        match self {
            ValueCell::Value(v) => Some(v),
            ValueCell::Missing => None,
        }
    }
}

/// Turns raw rows into canonical transactions for one period.
pub struct RowNormalizer<'a> {
    mapping: &'a ColumnMapping,
    boxes: &'a BoxDefinition,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(mapping: &'a ColumnMapping, boxes: &'a BoxDefinition) -> Self {
        Self { mapping, boxes }
    }

    pub fn normalize(&self, period: &str, rows: &[RawRow]) -> NormalizedRows {
        let mut out = NormalizedRows::default();

        for (row_index, row) in rows.iter().enumerate() {
            match self.normalize_row(period, row_index, row) {
                Ok(txn) => out.transactions.push(txn),
                Err(err) => {
                    trace!("[{}] skipping row {}: {}", period, row_index, err);
                    let reason = match err {
                        VatSummaryError::MalformedRow { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    out.skipped.push(SkippedRow { row_index, reason });
                }
            }
        }

        debug!(
            "[{}] normalized {} rows into {} transactions ({} skipped)",
            period,
            rows.len(),
            out.transactions.len(),
            out.skipped.len()
        );

        out
    }

    fn normalize_row(
        &self,
        period: &str,
        row_index: usize,
        row: &RawRow,
    ) -> Result<NormalizedTransaction, VatSummaryError> {
        let malformed = |reason: &str| VatSummaryError::MalformedRow {
            row: row_index,
            reason: reason.to_string(),
        };

        if row.is_blank() {
            return Err(malformed("row is blank"));
        }

        let supply = ValueCell::read(row, self.mapping.column_for(ColumnRole::SupplyValue));
        let purchase = ValueCell::read(row, self.mapping.column_for(ColumnRole::PurchaseValue));
        let vat = ValueCell::read(row, self.mapping.column_for(ColumnRole::VatValue));

        if supply == ValueCell::Missing
            && purchase == ValueCell::Missing
            && vat == ValueCell::Missing
        {
            return Err(malformed("no numeric value in the mapped value columns"));
        }

        let (amount, roles) = match (supply.value(), purchase.value()) {
            (Some(s), Some(p)) if s.is_zero() && !p.is_zero() => {
                (p, RoleCombination::new(false, true, false))
            }
            (Some(s), Some(p)) => {
                if !p.is_zero() {
                    debug!(
                        "[{}] row {} has both supply {} and purchase {}; using supply",
                        period, row_index, s, p
                    );
                }
                (s, RoleCombination::new(true, false, false))
            }
            (Some(s), None) => (s, RoleCombination::new(true, false, false)),
            (None, Some(p)) => (p, RoleCombination::new(false, true, false)),
            (None, None) => (Decimal::ZERO, RoleCombination::default()),
        };

        let vat_amount = match vat.value() {
            Some(v) if !amount.is_zero() && v.is_sign_negative() != amount.is_sign_negative() => -v,
            Some(v) => v,
            None => Decimal::ZERO,
        };

        let roles = RoleCombination {
            vat: vat != ValueCell::Missing,
            ..roles
        };

        let raw_box = self
            .mapping
            .column_for(ColumnRole::BoxCode)
            .map(|idx| row.get(idx))
            .filter(|cell| !cell.is_blank())
            .and_then(CellValue::as_text)
            .map(|text| text.trim().to_string());

        let box_code = raw_box.as_deref().and_then(|raw| self.boxes.resolve_code(raw));
        if let (Some(raw), None) = (&raw_box, &box_code) {
            debug!(
                "[{}] row {} has unrecognized box '{}'; default assignment applies",
                period, row_index, raw
            );
        }

        Ok(NormalizedTransaction {
            period: period.to_string(),
            amount,
            vat_amount,
            box_code,
            raw_box,
            roles,
            source_row_index: row_index,
        })
    }
}
