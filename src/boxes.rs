use crate::error::{Result, VatSummaryError};
use crate::persistence::UNASSIGNED_CODE;
use crate::schema::RoleCombination;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Short uppercase identifier of a VAT return box ("A", "B", "10", ...).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct BoxCode(String);

impl BoxCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoxCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BoxCode {
    fn from(code: &str) -> Self {
        BoxCode::new(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AggregateField {
    #[schemars(description = "Net value of sales/outputs (supply value column)")]
    Supply,

    #[schemars(description = "Net value of purchases/inputs (purchase value column)")]
    Purchase,

    #[schemars(description = "VAT charged or reclaimed on the transaction")]
    Vat,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BoxSpec {
    #[schemars(description = "Box code as it appears in the return, e.g. 'A'")]
    pub code: BoxCode,

    #[schemars(description = "Human readable label shown next to the box totals")]
    #[serde(default)]
    pub description: String,

    #[schemars(
        description = "Figures summed into this box. Supply/Purchase select which transaction net values count; Vat adds the VAT amount."
    )]
    pub aggregates: Vec<AggregateField>,
}

impl BoxSpec {
    pub fn new(code: &str, description: &str, aggregates: Vec<AggregateField>) -> Self {
        Self {
            code: BoxCode::new(code),
            description: description.to_string(),
            aggregates,
        }
    }

    pub fn aggregates(&self, field: AggregateField) -> bool {
        self.aggregates.contains(&field)
    }

    pub fn aggregates_any_amount(&self) -> bool {
        self.aggregates(AggregateField::Supply) || self.aggregates(AggregateField::Purchase)
    }
}

/// One row of the default assignment table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DefaultRule {
    #[schemars(description = "Exact combination of populated value roles this rule applies to")]
    pub when: RoleCombination,

    #[schemars(description = "Box receiving transactions without a recognized box code")]
    pub box_code: BoxCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum DerivedFigure {
    Amount,
    Vat,
}

/// A box computed from other boxes after summation (e.g. net VAT payable).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DerivedBox {
    pub code: BoxCode,

    #[serde(default)]
    pub description: String,

    #[schemars(description = "Which figure of the referenced boxes is combined")]
    pub figure: DerivedFigure,

    #[serde(default)]
    pub add: Vec<BoxCode>,

    #[serde(default)]
    pub subtract: Vec<BoxCode>,
}

/// Static box configuration shared read-only by every sheet of a run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BoxDefinition {
    #[schemars(description = "Boxes that receive transactions, in report order")]
    pub boxes: Vec<BoxSpec>,

    #[schemars(
        description = "Alternative spellings of box codes found in sheets, e.g. FTA numbering '1' -> 'A'"
    )]
    #[serde(default)]
    pub aliases: BTreeMap<String, BoxCode>,

    #[schemars(
        description = "Ordered precedence table for transactions without a recognized box code. First matching rule wins."
    )]
    #[serde(default)]
    pub default_rules: Vec<DefaultRule>,

    #[serde(default)]
    pub derived: Vec<DerivedBox>,
}

impl Default for BoxDefinition {
    fn default() -> Self {
        Self::uae_standard()
    }
}

impl BoxDefinition {
    /// Box A-D layout used by the UAE summary workbook.
    ///
    /// A and B take supplies, C takes recoverable purchases and D is
    /// A's VAT less C's VAT. FTA box numbers 1, 4 and 6 are accepted as
    /// aliases of A, B and C.
    pub fn uae_standard() -> Self {
        use AggregateField::{Purchase, Supply, Vat};

        let aliases = [("1", "A"), ("4", "B"), ("6", "C")]
            .into_iter()
            .map(|(alias, code)| (alias.to_string(), BoxCode::new(code)))
            .collect();

        let rule = |supply, purchase, vat, code: &str| DefaultRule {
            when: RoleCombination::new(supply, purchase, vat),
            box_code: BoxCode::new(code),
        };

        Self {
            boxes: vec![
                BoxSpec::new("A", "Standard Rated Supplies (5%)", vec![Supply, Vat]),
                BoxSpec::new("B", "Zero Rated Supplies (0%)", vec![Supply, Vat]),
                BoxSpec::new("C", "Recoverable Input VAT", vec![Purchase, Vat]),
            ],
            aliases,
            default_rules: vec![
                rule(true, false, true, "A"),
                rule(true, false, false, "A"),
                rule(false, true, true, "C"),
                rule(false, true, false, "C"),
            ],
            derived: vec![DerivedBox {
                code: BoxCode::new("D"),
                description: "Net VAT Payable (Box A VAT - Box C VAT)".to_string(),
                figure: DerivedFigure::Vat,
                add: vec![BoxCode::new("A")],
                subtract: vec![BoxCode::new("C")],
            }],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definition: BoxDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<()> {
        if self.boxes.is_empty() {
            return Err(VatSummaryError::InvalidConfig(
                "box definition must declare at least one box".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for code in self.all_codes() {
            if code.as_str().is_empty() {
                return Err(VatSummaryError::InvalidConfig(
                    "box codes must not be empty".to_string(),
                ));
            }
            if code.as_str() == UNASSIGNED_CODE {
                return Err(VatSummaryError::InvalidConfig(format!(
                    "box code '{}' is reserved",
                    UNASSIGNED_CODE
                )));
            }
            if !seen.insert(code.clone()) {
                return Err(VatSummaryError::InvalidConfig(format!(
                    "box code '{}' is declared twice",
                    code
                )));
            }
        }

        for (alias, target) in &self.aliases {
            if self.spec(target).is_none() {
                return Err(VatSummaryError::InvalidConfig(format!(
                    "alias '{}' points at '{}', which is not a transaction box",
                    alias, target
                )));
            }
        }

        for (idx, rule) in self.default_rules.iter().enumerate() {
            if self.spec(&rule.box_code).is_none() {
                return Err(VatSummaryError::InvalidConfig(format!(
                    "default rule #{} targets '{}', which is not a transaction box",
                    idx, rule.box_code
                )));
            }
        }

        for (idx, derived) in self.derived.iter().enumerate() {
            for term in derived.add.iter().chain(&derived.subtract) {
                let earlier_derived = self.derived[..idx].iter().any(|d| &d.code == term);
                if self.spec(term).is_none() && !earlier_derived {
                    return Err(VatSummaryError::InvalidConfig(format!(
                        "derived box '{}' references unknown or later box '{}'",
                        derived.code, term
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn spec(&self, code: &BoxCode) -> Option<&BoxSpec> {
        self.boxes.iter().find(|spec| &spec.code == code)
    }

    /// Transaction boxes followed by derived boxes, in report order.
    pub fn all_codes(&self) -> impl Iterator<Item = &BoxCode> {
        self.boxes
            .iter()
            .map(|spec| &spec.code)
            .chain(self.derived.iter().map(|d| &d.code))
    }

    pub fn description(&self, code: &BoxCode) -> Option<&str> {
        self.spec(code)
            .map(|spec| spec.description.as_str())
            .or_else(|| {
                self.derived
                    .iter()
                    .find(|d| &d.code == code)
                    .map(|d| d.description.as_str())
            })
    }

    /// Resolves a box cell ("Box A", "a", "box-1", 6) to a transaction box.
    ///
    /// Derived boxes are never valid targets for individual transactions.
    pub fn resolve_code(&self, raw: &str) -> Option<BoxCode> {
        let cleaned: String = raw
            .to_uppercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let tokens: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|t| !matches!(*t, "BOX" | "FTA" | "VAT"))
            .collect();

        let mut candidates = Vec::with_capacity(2);
        candidates.push(tokens.concat());
        if let Some(first) = tokens.first() {
            candidates.push(first.strip_prefix("BOX").unwrap_or(first).to_string());
        }

        candidates
            .into_iter()
            .filter(|c| !c.is_empty())
            .find_map(|candidate| self.lookup(&candidate))
    }

    fn lookup(&self, candidate: &str) -> Option<BoxCode> {
        let code = BoxCode::new(candidate);
        if self.spec(&code).is_some() {
            return Some(code);
        }
        self.aliases
            .iter()
            .find(|(alias, _)| alias.trim().eq_ignore_ascii_case(candidate))
            .map(|(_, target)| target.clone())
    }

    /// Box for a transaction without a usable code, per the precedence table.
    pub fn default_box_for(&self, roles: &RoleCombination) -> Option<&BoxCode> {
        self.default_rules
            .iter()
            .find(|rule| &rule.when == roles)
            .map(|rule| &rule.box_code)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BoxDefinition)
    }
}
