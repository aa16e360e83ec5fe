use crate::config::normalize_header;
use crate::error::{Result, VatSummaryError};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Answer a suggester gives for headers it cannot place.
pub const UNKNOWN_ROLE: &str = "unknown";

/// Fallback column classification service.
///
/// Given headers the heuristics could not place and the role names still
/// open, returns header -> suggested role name (or [`UNKNOWN_ROLE`]).
/// Anything that is not one of the offered roles is ignored by the caller.
pub trait ColumnSuggester: Send + Sync {
    fn suggest(&self, headers: &[String], roles: &[String]) -> Result<BTreeMap<String, String>>;
}

/// Suggester that never suggests anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSuggester;

impl ColumnSuggester for NoopSuggester {
    fn suggest(&self, _headers: &[String], _roles: &[String]) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
}

/// Suggester backed by a fixed header -> role table, keyed on normalized headers.
#[derive(Debug, Clone, Default)]
pub struct StaticSuggester {
    table: BTreeMap<String, String>,
}

impl StaticSuggester {
    pub fn new<I, H, R>(entries: I) -> Self
    where
        I: IntoIterator<Item = (H, R)>,
        H: AsRef<str>,
        R: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(header, role)| (normalize_header(header.as_ref()), role.into()))
                .collect(),
        }
    }
}

impl ColumnSuggester for StaticSuggester {
    fn suggest(&self, headers: &[String], _roles: &[String]) -> Result<BTreeMap<String, String>> {
        Ok(headers
            .iter()
            .map(|header| {
                let role = self
                    .table
                    .get(&normalize_header(header))
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
                (header.clone(), role)
            })
            .collect())
    }
}

/// Calls `suggester` on a helper thread and waits at most `timeout`.
///
/// A call that overruns is abandoned; its thread finishes in the background
/// and its answer is dropped.
pub fn suggest_with_timeout(
    suggester: &Arc<dyn ColumnSuggester>,
    headers: Vec<String>,
    roles: Vec<String>,
    timeout: Duration,
) -> Result<BTreeMap<String, String>> {
    let (tx, rx) = mpsc::sync_channel(1);
    let worker = Arc::clone(suggester);

    thread::Builder::new()
        .name("column-suggester".to_string())
        .spawn(move || {
            let _ = tx.send(worker.suggest(&headers, &roles));
        })
        .map_err(|e| VatSummaryError::ClassificationUnavailable(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(VatSummaryError::ClassificationTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(VatSummaryError::ClassificationUnavailable(
            "suggester stopped without answering".to_string(),
        )),
    }
}
