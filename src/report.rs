use crate::boxes::{BoxCode, BoxDefinition};
use crate::error::{Result, VatSummaryError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoxTotal {
    pub amount: Decimal,
    pub vat: Decimal,
    pub transaction_count: usize,
}

impl BoxTotal {
    pub fn new(amount: Decimal, vat: Decimal, transaction_count: usize) -> Self {
        Self {
            amount,
            vat,
            transaction_count,
        }
    }

    /// Field-wise sum, `None` when a figure leaves the decimal range.
    pub fn checked_add(&self, other: &BoxTotal) -> Option<BoxTotal> {
        Some(Self {
            amount: self.amount.checked_add(other.amount)?,
            vat: self.vat.checked_add(other.vat)?,
            transaction_count: self.transaction_count.checked_add(other.transaction_count)?,
        })
    }
}

/// Box totals for one period (one sheet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: String,
    /// Every configured and derived box, zero when nothing landed in it.
    pub totals: BTreeMap<BoxCode, BoxTotal>,
    /// Transactions no box or default rule could take.
    pub unassigned: BoxTotal,
    pub transaction_count: usize,
    pub skipped_row_count: usize,
}

impl PeriodSummary {
    /// All-zero summary covering every box of `boxes`.
    pub fn empty(period: impl Into<String>, boxes: &BoxDefinition) -> Self {
        Self {
            period: period.into(),
            totals: boxes
                .all_codes()
                .map(|code| (code.clone(), BoxTotal::default()))
                .collect(),
            unassigned: BoxTotal::default(),
            transaction_count: 0,
            skipped_row_count: 0,
        }
    }

    pub fn total(&self, code: &str) -> Option<&BoxTotal> {
        self.totals.get(&BoxCode::new(code))
    }

    /// Adds `total` to box `code`.
    pub fn add_to_box(&mut self, code: &BoxCode, total: &BoxTotal) -> Result<()> {
        let current = self.totals.get(code).copied().unwrap_or_default();
        let sum = current.checked_add(total).ok_or_else(|| self.overflow())?;
        self.totals.insert(code.clone(), sum);
        Ok(())
    }

    pub fn add_unassigned(&mut self, total: &BoxTotal) -> Result<()> {
        self.unassigned = self
            .unassigned
            .checked_add(total)
            .ok_or_else(|| self.overflow())?;
        Ok(())
    }

    /// Adds another summary box by box (period label is kept).
    ///
    /// On overflow `self` is left as it was.
    pub fn absorb(&mut self, other: &PeriodSummary) -> Result<()> {
        let mut merged = self.clone();
        for (code, total) in &other.totals {
            merged.add_to_box(code, total)?;
        }
        merged.add_unassigned(&other.unassigned)?;
        merged.transaction_count += other.transaction_count;
        merged.skipped_row_count += other.skipped_row_count;
        *self = merged;
        Ok(())
    }

    pub fn total_rows(&self) -> usize {
        self.transaction_count + self.skipped_row_count
    }

    pub(crate) fn overflow(&self) -> VatSummaryError {
        VatSummaryError::AmountOverflow {
            period: self.period.clone(),
        }
    }
}

/// A sheet that could not be summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodFailure {
    pub period: String,
    pub reason: String,
}

/// Per-period outcome of a run, in sheet order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPeriodReport {
    pub periods: Vec<PeriodSummary>,
    pub failures: Vec<PeriodFailure>,
    /// Column order for tabular output, usually the box definition's.
    #[serde(default)]
    pub box_order: Vec<BoxCode>,
}

impl MultiPeriodReport {
    /// Empty report whose table lists boxes in `boxes` order.
    pub fn new(boxes: &BoxDefinition) -> Self {
        Self {
            box_order: boxes.all_codes().cloned().collect(),
            ..Self::default()
        }
    }

    pub fn summary(&self, period: &str) -> Option<&PeriodSummary> {
        self.periods.iter().find(|s| s.period == period)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Sum of every successful period, `None` when there is none.
    pub fn grand_total(&self, label: impl Into<String>) -> Result<Option<PeriodSummary>> {
        let mut iter = self.periods.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut total = first.clone();
        total.period = label.into();
        for summary in iter {
            total.absorb(summary)?;
        }
        Ok(Some(total))
    }

    fn table_codes(&self) -> Vec<&BoxCode> {
        let mut codes: Vec<&BoxCode> = self.box_order.iter().collect();
        for summary in &self.periods {
            for code in summary.totals.keys() {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
        }
        codes
    }

    /// Tabular view: one row per period, amount and VAT columns per box,
    /// then one row per failed sheet with its reason.
    pub fn to_table(&self) -> ReportTable {
        let codes = self.table_codes();

        let mut columns = vec!["Period".to_string()];
        for code in &codes {
            columns.push(format!("Box {} Net", code));
            columns.push(format!("Box {} VAT", code));
        }
        columns.extend(
            [
                "Unassigned Net",
                "Unassigned VAT",
                "Transactions",
                "Skipped Rows",
                "Status",
                "Reason",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        let mut rows: Vec<Vec<String>> = self
            .periods
            .iter()
            .map(|summary| {
                let mut row = vec![summary.period.clone()];
                for code in &codes {
                    let total = summary.totals.get(*code).copied().unwrap_or_default();
                    row.push(format_money(total.amount));
                    row.push(format_money(total.vat));
                }
                row.push(format_money(summary.unassigned.amount));
                row.push(format_money(summary.unassigned.vat));
                row.push(summary.transaction_count.to_string());
                row.push(summary.skipped_row_count.to_string());
                row.push("ok".to_string());
                row.push(String::new());
                row
            })
            .collect();

        for failure in &self.failures {
            let mut row = vec![failure.period.clone()];
            row.resize(columns.len() - 2, String::new());
            row.push("failed".to_string());
            row.push(failure.reason.clone());
            rows.push(row);
        }

        ReportTable { columns, rows }
    }

    pub fn to_csv(&self) -> String {
        self.to_table().to_csv()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(&csv_line(&self.columns));
        for row in &self.rows {
            output.push_str(&csv_line(row));
        }
        output
    }
}

fn csv_line(fields: &[String]) -> String {
    let escaped: Vec<String> = fields
        .iter()
        .map(|field| {
            if field.contains([',', '"', '\n']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.clone()
            }
        })
        .collect();
    format!("{}\n", escaped.join(","))
}

fn format_money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn summary(period: &str, a: (Decimal, Decimal), skipped: usize) -> PeriodSummary {
        let mut s = PeriodSummary::empty(period, &BoxDefinition::uae_standard());
        s.totals.insert(BoxCode::new("A"), BoxTotal::new(a.0, a.1, 1));
        s.transaction_count = 1;
        s.skipped_row_count = skipped;
        s
    }

    #[test]
    fn test_empty_summary_covers_all_boxes() {
        let s = PeriodSummary::empty("Jan", &BoxDefinition::uae_standard());
        assert_eq!(s.totals.len(), 4);
        assert!(s.totals.values().all(|t| *t == BoxTotal::default()));
    }

    fn report(periods: Vec<PeriodSummary>, failures: Vec<PeriodFailure>) -> MultiPeriodReport {
        MultiPeriodReport {
            periods,
            failures,
            ..MultiPeriodReport::new(&BoxDefinition::uae_standard())
        }
    }

    #[test]
    fn test_grand_total() {
        let report = report(
            vec![
                summary("Jan", (dec!(100), dec!(5)), 1),
                summary("Feb", (dec!(-40), dec!(-2)), 0),
            ],
            vec![],
        );
        let total = report.grand_total("FY").unwrap().unwrap();
        assert_eq!(total.period, "FY");
        assert_eq!(total.total("A").unwrap().amount, dec!(60));
        assert_eq!(total.total("A").unwrap().vat, dec!(3));
        assert_eq!(total.transaction_count, 2);
        assert_eq!(total.skipped_row_count, 1);
        assert!(MultiPeriodReport::default().grand_total("x").unwrap().is_none());
    }

    #[test]
    fn test_absorb_overflow_leaves_summary_untouched() {
        let mut jan = summary("Jan", (Decimal::MAX, dec!(1)), 0);
        let before = jan.clone();
        let err = jan.absorb(&summary("Feb", (dec!(1), dec!(1)), 0)).unwrap_err();
        assert!(matches!(err, VatSummaryError::AmountOverflow { ref period } if period == "Jan"));
        assert_eq!(jan, before);

        let totals = report(vec![before, summary("Feb", (Decimal::MAX, dec!(0)), 0)], vec![]);
        assert!(totals.grand_total("FY").is_err());
    }

    #[test]
    fn test_table_and_csv() {
        let report = report(
            vec![summary("Jan, 2024", (dec!(1000), dec!(50)), 2)],
            vec![PeriodFailure {
                period: "Notes".to_string(),
                reason: "no columns".to_string(),
            }],
        );
        let table = report.to_table();
        assert_eq!(table.columns[0], "Period");
        assert_eq!(table.columns[1], "Box A Net");
        assert_eq!(table.columns.len(), 1 + 4 * 2 + 6);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], "1000.00");
        assert_eq!(table.rows[0][2], "50.00");
        assert_eq!(table.rows[0][12], "2");
        assert_eq!(table.rows[0][13], "ok");

        let failed = &table.rows[1];
        assert_eq!(failed.len(), table.columns.len());
        assert_eq!(failed[0], "Notes");
        assert_eq!(failed[1], "");
        assert_eq!(failed[13], "failed");
        assert_eq!(failed[14], "no columns");

        let csv = report.to_csv();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Period,Box A Net,Box A VAT"));
        assert!(lines.next().unwrap().starts_with("\"Jan, 2024\",1000.00,50.00"));
        assert!(lines.next().unwrap().ends_with(",failed,no columns"));
        assert!(!report.is_complete());
    }

    #[test]
    fn test_table_follows_box_order() {
        let codes = ["1", "4", "6", "10"];
        let mut jan = PeriodSummary {
            period: "Jan".to_string(),
            totals: BTreeMap::new(),
            unassigned: BoxTotal::default(),
            transaction_count: 0,
            skipped_row_count: 0,
        };
        for code in codes {
            jan.totals.insert(BoxCode::new(code), BoxTotal::default());
        }
        jan.totals.insert(BoxCode::new("X"), BoxTotal::new(dec!(7), dec!(0), 1));
        let report = MultiPeriodReport {
            periods: vec![jan],
            failures: vec![],
            box_order: codes.iter().map(BoxCode::new).collect(),
        };

        let table = report.to_table();
        let nets: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.starts_with("Box ") && c.ends_with(" Net"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            nets,
            vec!["Box 1 Net", "Box 4 Net", "Box 6 Net", "Box 10 Net", "Box X Net"]
        );
        assert_eq!(table.rows[0][9], "7.00");
    }

    #[test]
    fn test_json_output() {
        let report = report(vec![summary("Jan", (dec!(1.10), dec!(0.05)), 0)], vec![]);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"period\": \"Jan\""));
        let back: MultiPeriodReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
