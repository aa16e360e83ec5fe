use crate::boxes::BoxDefinition;
use crate::error::{Result, VatSummaryError};
use crate::schema::ColumnRole;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Declarative header vocabulary used by the column classifier.
///
/// New header variants are added here, not in code.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SynonymTable {
    #[schemars(description = "Header phrases per role, matched after normalization")]
    pub roles: BTreeMap<ColumnRole, Vec<String>>,

    #[schemars(
        description = "Token rewrites applied to headers and synonyms alike, e.g. 'amt' -> 'amount'"
    )]
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,

    #[schemars(
        description = "Headers containing any of these tokens may only match a synonym exactly (e.g. 'VAT Number', 'VAT %')"
    )]
    #[serde(default)]
    pub excluded_tokens: Vec<String>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        let phrases = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut roles = BTreeMap::new();
        roles.insert(
            ColumnRole::SupplyValue,
            phrases(&[
                "supply value",
                "sales value",
                "output value",
                "sale amount",
                "supply amount",
                "taxable supplies",
                "sales",
                "supply/purchase value",
                "net",
                "net value",
                "net amount",
            ]),
        );
        roles.insert(
            ColumnRole::PurchaseValue,
            phrases(&[
                "purchase value",
                "input value",
                "purchase amount",
                "expense amount",
                "taxable purchases",
                "purchases",
                "cost value",
            ]),
        );
        roles.insert(
            ColumnRole::VatValue,
            phrases(&[
                "vat",
                "vat amount",
                "vat value",
                "tax amount",
                "tax value",
                "tax",
                "output vat",
                "input vat",
                "vat total",
            ]),
        );
        roles.insert(
            ColumnRole::BoxCode,
            phrases(&["box", "vat box", "fta box", "box code", "return box"]),
        );

        let abbreviations = [
            ("amt", "amount"),
            ("amnt", "amount"),
            ("val", "value"),
            ("sales", "sale"),
            ("supplies", "supply"),
            ("purchases", "purchase"),
            ("purch", "purchase"),
            ("expenses", "expense"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        let excluded_tokens = phrases(&[
            "number",
            "no",
            "trn",
            "registration",
            "rate",
            "percent",
            "date",
            "description",
            "name",
            "type",
        ]);

        Self {
            roles,
            abbreviations,
            excluded_tokens,
        }
    }
}

impl SynonymTable {
    /// Tokens of a header after lowercasing, punctuation stripping and
    /// abbreviation rewriting. `%` becomes the token `percent`.
    pub fn tokens(&self, header: &str) -> Vec<String> {
        normalize_header(header)
            .split_whitespace()
            .map(|token| {
                self.abbreviations
                    .get(token)
                    .cloned()
                    .unwrap_or_else(|| token.to_string())
            })
            .collect()
    }

    pub fn normalize(&self, header: &str) -> String {
        self.tokens(header).join(" ")
    }

    pub fn synonyms(&self, role: ColumnRole) -> &[String] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_excluded(&self, tokens: &[String]) -> bool {
        tokens
            .iter()
            .any(|t| self.excluded_tokens.iter().any(|ex| ex == t))
    }

    pub fn validate(&self) -> Result<()> {
        if self.roles.contains_key(&ColumnRole::Ignored) {
            return Err(VatSummaryError::InvalidConfig(
                "synonyms cannot be declared for the 'ignored' role".to_string(),
            ));
        }
        let has_value_role = ColumnRole::VALUE_ROLES
            .iter()
            .any(|role| !self.synonyms(*role).is_empty());
        if !has_value_role {
            return Err(VatSummaryError::InvalidConfig(
                "synonym table must cover at least one value role".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lowercases, maps `%` to a word and turns punctuation into single spaces.
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for c in header.chars() {
        if c == '%' {
            out.push_str(" percent ");
        } else if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Runtime settings for a pipeline run, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    pub boxes: BoxDefinition,

    pub synonyms: SynonymTable,

    #[schemars(
        description = "Minimum token-overlap score (shared words / distinct words) for a fuzzy header match. Range: (0.0, 1.0]."
    )]
    pub match_threshold: f64,

    #[schemars(description = "Rows handed to the classifier as a value sample")]
    pub sample_rows: usize,

    #[schemars(description = "Upper bound on a fallback classifier call, in milliseconds")]
    pub suggester_timeout_ms: u64,

    #[schemars(description = "Rows scanned when locating the header row of a raw grid")]
    pub header_scan_rows: usize,

    #[schemars(description = "Maximum sheets processed concurrently by run_parallel")]
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            boxes: BoxDefinition::uae_standard(),
            synonyms: SynonymTable::default(),
            match_threshold: 0.5,
            sample_rows: 10,
            suggester_timeout_ms: 5_000,
            header_scan_rows: 30,
            max_workers: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(VatSummaryError::InvalidConfig(format!(
                "match_threshold {} must be in (0.0, 1.0]",
                self.match_threshold
            )));
        }
        if self.max_workers == 0 {
            return Err(VatSummaryError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        self.boxes.validate()?;
        self.synonyms.validate()
    }

    pub fn suggester_timeout(&self) -> Duration {
        Duration::from_millis(self.suggester_timeout_ms)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Supply/Purchase Value "), "supply purchase value");
        assert_eq!(normalize_header("VAT %"), "vat percent");
        assert_eq!(normalize_header("Net\u{a0}Amount (AED)"), "net amount aed");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn test_tokens_apply_abbreviations() {
        let table = SynonymTable::default();
        assert_eq!(table.normalize("Sale Amt"), "sale amount");
        assert_eq!(table.normalize("Sales Amount"), "sale amount");
        assert_eq!(table.normalize("Purch. Val"), "purchase value");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "match_threshold": 0.6 }"#).unwrap();
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.sample_rows, 10);
        assert_eq!(config.boxes.boxes.len(), 3);
        assert!(!config.synonyms.synonyms(ColumnRole::VatValue).is_empty());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = EngineConfig::from_json(r#"{ "match_threshold": 0.0 }"#).unwrap_err();
        assert!(matches!(err, VatSummaryError::InvalidConfig(_)));
        assert!(EngineConfig::from_json(r#"{ "match_threshold": 1.5 }"#).is_err());
    }

    #[test]
    fn test_synonyms_for_ignored_rejected() {
        let json = r#"{ "synonyms": { "roles": { "ignored": ["notes"], "vat_value": ["vat"] } } }"#;
        assert!(EngineConfig::from_json(json).is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = EngineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("match_threshold"));
        assert!(schema_json.contains("excluded_tokens"));
    }
}
