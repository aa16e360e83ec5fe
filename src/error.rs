use thiserror::Error;

#[derive(Error, Debug)]
pub enum VatSummaryError {
    #[error("No usable value columns found in sheet '{period}' (need a supply, purchase or VAT column)")]
    NoUsableColumns { period: String },

    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Column classification collaborator timed out after {timeout_ms}ms")]
    ClassificationTimeout { timeout_ms: u64 },

    #[error("Column classification collaborator unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Box totals for sheet '{period}' exceed the decimal range")]
    AmountOverflow { period: String },

    #[error("Sheet worker panicked while processing '{period}'")]
    WorkerPanicked { period: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("No sheets supplied")]
    EmptyInput,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl VatSummaryError {
    /// Sheet- and row-level errors that a run records and moves past.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            VatSummaryError::EmptyInput | VatSummaryError::InvalidConfig(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for VatSummaryError {
    fn from(err: rusqlite::Error) -> Self {
        VatSummaryError::PersistenceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VatSummaryError>;
