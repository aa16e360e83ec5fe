use crate::error::{Result, VatSummaryError};
use crate::llm::client::GeminiClient;
use crate::llm::prompts::{column_mapping_request, SYSTEM_PROMPT_COLUMN_MAPPING};
use crate::llm::types::{ColumnSuggestionResponse, Content};
use crate::suggest::ColumnSuggester;
use log::debug;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// [`ColumnSuggester`] that asks Gemini for a structured header mapping.
///
/// Owns a single-threaded runtime so it can be called from the synchronous
/// pipeline. The pipeline's own suggester timeout still applies on top of
/// `request_timeout`.
pub struct GeminiSuggester {
    client: GeminiClient,
    model: String,
    runtime: Runtime,
    request_timeout: Duration,
}

impl GeminiSuggester {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            client,
            model: model.into(),
            runtime,
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn parse_answer(text: &str, headers: &[String]) -> Result<BTreeMap<String, String>> {
        let json = text
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let response: ColumnSuggestionResponse = serde_json::from_str(json)?;
        if let Some(reasoning) = &response.reasoning {
            debug!(
                "Gemini column mapping (confidence {:?}): {}",
                response.confidence, reasoning
            );
        }
        Ok(response.into_suggestions(headers))
    }
}

impl ColumnSuggester for GeminiSuggester {
    fn suggest(&self, headers: &[String], roles: &[String]) -> Result<BTreeMap<String, String>> {
        if headers.is_empty() || roles.is_empty() {
            return Ok(BTreeMap::new());
        }

        let schema = ColumnSuggestionResponse::gemini_schema()?;
        let request = column_mapping_request(headers, roles);

        let text = self
            .runtime
            .block_on(async {
                tokio::time::timeout(
                    self.request_timeout,
                    self.client.generate_content(
                        &self.model,
                        SYSTEM_PROMPT_COLUMN_MAPPING,
                        vec![Content::user(request)],
                        Some(schema),
                    ),
                )
                .await
            })
            .map_err(|_| VatSummaryError::ClassificationTimeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            })??;

        Self::parse_answer(&text, headers)
    }
}
