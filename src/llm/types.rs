use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Content,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
}

/// One header the model placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSuggestion {
    #[schemars(description = "The header exactly as it was given")]
    pub header: String,

    #[schemars(description = "One of the offered role names, or 'unknown'")]
    pub role: String,
}

/// Structured answer requested from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSuggestionResponse {
    pub columns: Vec<ColumnSuggestion>,

    #[schemars(description = "Overall confidence between 0 and 1")]
    #[serde(default)]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub reasoning: Option<String>,
}

impl ColumnSuggestionResponse {
    /// Header -> role for the headers that were actually asked about.
    /// Later duplicates of a header are ignored.
    pub fn into_suggestions(self, asked: &[String]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for column in self.columns {
            if asked.contains(&column.header) && !out.contains_key(&column.header) {
                out.insert(column.header, column.role.trim().to_string());
            }
        }
        out
    }

    /// Response schema in the subset Gemini accepts: everything inlined,
    /// no `$schema`, `$ref` or `definitions`.
    pub fn gemini_schema() -> serde_json::Result<serde_json::Value> {
        let settings = schemars::gen::SchemaSettings::openapi3().with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        });
        let root = settings
            .into_generator()
            .into_root_schema_for::<ColumnSuggestionResponse>();
        let mut value = serde_json::to_value(root.schema)?;
        strip_unsupported(&mut value);
        Ok(value)
    }
}

fn strip_unsupported(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("title");
            map.remove("additionalProperties");
            map.remove("definitions");
            for child in map.values_mut() {
                strip_unsupported(child);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_unsupported),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_asked_headers_are_kept() {
        let response: ColumnSuggestionResponse = serde_json::from_str(
            r#"{
                "columns": [
                    {"header": "Amount", "role": " supply_value "},
                    {"header": "Amount", "role": "vat_value"},
                    {"header": "Invented", "role": "vat_value"}
                ],
                "confidence": 0.9
            }"#,
        )
        .unwrap();
        let out = response.into_suggestions(&["Amount".to_string(), "Memo".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out["Amount"], "supply_value");
    }

    #[test]
    fn test_gemini_schema_is_flat() {
        let schema = ColumnSuggestionResponse::gemini_schema().unwrap();
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("$schema"));
        assert!(!text.contains("definitions"));
        assert!(text.contains("columns"));
    }

    #[test]
    fn test_request_uses_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::user("hi")],
            system_instruction: None,
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: None,
                temperature: Some(0.0),
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("generationConfig"));
        assert!(json.contains("responseMimeType"));
        assert!(!json.contains("systemInstruction"));
    }
}
