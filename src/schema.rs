use crate::boxes::BoxCode;
use crate::classifier::ColumnClassifier;
use crate::config::EngineConfig;
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single spreadsheet cell as handed over by the file-parsing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(Decimal),
    Date(NaiveDate),
    Text(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// True for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric reading of the cell. Dates are never amounts.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Number(value) => Some(*value),
            CellValue::Text(text) => crate::utils::parse_amount(text),
            CellValue::Empty | CellValue::Date(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(text) => Some(Cow::Borrowed(text.as_str())),
            CellValue::Number(value) => Some(Cow::Owned(value.normalize().to_string())),
            CellValue::Date(date) => Some(Cow::Owned(date.format("%Y-%m-%d").to_string())),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Decimal::from_f64(value)
            .map(CellValue::Number)
            .unwrap_or(CellValue::Empty)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(Decimal::from(value))
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(Decimal::from(value))
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

/// One data row: column index to cell. Missing indices read as empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRow {
    cells: BTreeMap<usize, CellValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cell(mut self, column: usize, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: usize, value: impl Into<CellValue>) {
        let value = value.into();
        if value == CellValue::Empty {
            self.cells.remove(&column);
        } else {
            self.cells.insert(column, value);
        }
    }

    pub fn get(&self, column: usize) -> &CellValue {
        self.cells.get(&column).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, &CellValue)> {
        self.cells.iter().map(|(idx, cell)| (*idx, cell))
    }
}

impl From<Vec<CellValue>> for RawRow {
    fn from(values: Vec<CellValue>) -> Self {
        values.into_iter().collect()
    }
}

impl FromIterator<CellValue> for RawRow {
    fn from_iter<I: IntoIterator<Item = CellValue>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (idx, value) in iter.into_iter().enumerate() {
            row.insert(idx, value);
        }
        row
    }
}

/// One worksheet: the sheet name doubles as the period label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSheet {
    pub period: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawSheet {
    pub fn new(period: impl Into<String>, headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            period: period.into(),
            headers,
            rows,
        }
    }

    /// Builds a sheet from a cell grid whose first row holds the headers.
    pub fn from_grid(period: impl Into<String>, grid: Vec<Vec<CellValue>>) -> Self {
        Self::from_grid_with_header(period, grid, 0)
    }

    /// Builds a sheet whose header sits at `header_row`; rows above it are dropped.
    pub fn from_grid_with_header(
        period: impl Into<String>,
        grid: Vec<Vec<CellValue>>,
        header_row: usize,
    ) -> Self {
        let mut grid_rows = grid.into_iter().skip(header_row);
        let headers = grid_rows
            .next()
            .map(|cells| {
                cells
                    .iter()
                    .map(|cell| cell.as_text().map(Cow::into_owned).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            period: period.into(),
            headers,
            rows: grid_rows.map(RawRow::from).collect(),
        }
    }

    /// Like [`RawSheet::from_grid`], but first locates the header row among
    /// the leading `config.header_scan_rows` rows (title blocks, blank lines).
    pub fn from_grid_detect_header(
        period: impl Into<String>,
        grid: Vec<Vec<CellValue>>,
        config: &EngineConfig,
    ) -> Self {
        let header_row = ColumnClassifier::new(config).detect_header_row(&grid);
        Self::from_grid_with_header(period, grid, header_row)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Canonical semantic role of a raw column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    SupplyValue,
    PurchaseValue,
    VatValue,
    BoxCode,
    Ignored,
}

impl ColumnRole {
    /// Roles a column can be classified into, in assignment priority order.
    pub const ASSIGNABLE: [ColumnRole; 4] = [
        ColumnRole::SupplyValue,
        ColumnRole::PurchaseValue,
        ColumnRole::VatValue,
        ColumnRole::BoxCode,
    ];

    pub const VALUE_ROLES: [ColumnRole; 3] = [
        ColumnRole::SupplyValue,
        ColumnRole::PurchaseValue,
        ColumnRole::VatValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::SupplyValue => "supply_value",
            ColumnRole::PurchaseValue => "purchase_value",
            ColumnRole::VatValue => "vat_value",
            ColumnRole::BoxCode => "box_code",
            ColumnRole::Ignored => "ignored",
        }
    }

    pub fn is_value_role(&self) -> bool {
        Self::VALUE_ROLES.contains(self)
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        match key.as_str() {
            "supply_value" | "supplyvalue" => Ok(ColumnRole::SupplyValue),
            "purchase_value" | "purchasevalue" => Ok(ColumnRole::PurchaseValue),
            "vat_value" | "vatvalue" => Ok(ColumnRole::VatValue),
            "box_code" | "boxcode" => Ok(ColumnRole::BoxCode),
            "ignored" => Ok(ColumnRole::Ignored),
            _ => Err(format!("unknown column role '{}'", s)),
        }
    }
}

/// How a column ended up with its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchSource {
    Exact,
    Fuzzy { score: f64 },
    Suggested,
}

/// What happened when the fallback collaborator was (or was not) asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollaboratorOutcome {
    #[default]
    NotConsulted,
    Applied { accepted: usize },
    Failed { reason: String },
}

/// Column index to role assignment for one sheet.
///
/// At most one column holds each assignable role. Built by the classifier
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    headers: Vec<String>,
    roles: Vec<ColumnRole>,
    sources: BTreeMap<usize, MatchSource>,
    collaborator: CollaboratorOutcome,
}

impl ColumnMapping {
    pub(crate) fn new(
        headers: Vec<String>,
        roles: Vec<ColumnRole>,
        sources: BTreeMap<usize, MatchSource>,
        collaborator: CollaboratorOutcome,
    ) -> Self {
        debug_assert_eq!(headers.len(), roles.len());
        Self {
            headers,
            roles,
            sources,
            collaborator,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn role_of(&self, column: usize) -> ColumnRole {
        self.roles
            .get(column)
            .copied()
            .unwrap_or(ColumnRole::Ignored)
    }

    pub fn column_for(&self, role: ColumnRole) -> Option<usize> {
        if role == ColumnRole::Ignored {
            return None;
        }
        self.roles.iter().position(|r| *r == role)
    }

    pub fn header_for(&self, role: ColumnRole) -> Option<&str> {
        self.column_for(role).map(|idx| self.headers[idx].as_str())
    }

    pub fn match_source(&self, column: usize) -> Option<&MatchSource> {
        self.sources.get(&column)
    }

    pub fn collaborator(&self) -> &CollaboratorOutcome {
        &self.collaborator
    }

    /// Assigned (column, role) pairs in column order.
    pub fn assigned(&self) -> impl Iterator<Item = (usize, ColumnRole)> + '_ {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, role)| **role != ColumnRole::Ignored)
            .map(|(idx, role)| (idx, *role))
    }

    pub fn has_value_column(&self) -> bool {
        ColumnRole::VALUE_ROLES
            .iter()
            .any(|role| self.column_for(*role).is_some())
    }
}

/// Which value roles a row actually populated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub struct RoleCombination {
    #[serde(default)]
    pub supply: bool,
    #[serde(default)]
    pub purchase: bool,
    #[serde(default)]
    pub vat: bool,
}

impl RoleCombination {
    pub fn new(supply: bool, purchase: bool, vat: bool) -> Self {
        Self {
            supply,
            purchase,
            vat,
        }
    }
}

impl fmt::Display for RoleCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.supply {
            parts.push("supply");
        }
        if self.purchase {
            parts.push("purchase");
        }
        if self.vat {
            parts.push("vat");
        }
        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join("+"))
        }
    }
}

/// A canonical transaction produced from one raw row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub period: String,
    /// Signed net value; negative values are returns or credit notes.
    pub amount: Decimal,
    pub vat_amount: Decimal,
    /// Recognized box from the sheet, if any.
    pub box_code: Option<BoxCode>,
    /// Box cell text as found, kept for audit when it was not recognized.
    pub raw_box: Option<String>,
    pub roles: RoleCombination,
    pub source_row_index: usize,
}

/// A row the normalizer dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row_index: usize,
    pub reason: String,
}
