use thiserror::Error;

/// Failure to retrieve a page. Always isolated to the one site that hit it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Request timed out")]
    Timeout,
}

impl FetchError {
    /// Network and timeout failures may succeed on a second attempt; a status
    /// code answered by the server will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failure to turn page content into a price.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Malformed document: {reason}")]
    MalformedDocument { reason: String },

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Element not found: {rule}")]
    RuleNotFound { rule: String },

    #[error("No digits found in '{text}'")]
    NoDigitsFound { text: String },

    #[error("Price out of range: {digits}")]
    PriceOutOfRange { digits: String },

    #[error("Price is not positive in '{text}'")]
    NonPositivePrice { text: String },
}

/// Everything that can end up in an error report for one site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Batch deadline exceeded")]
    DeadlineExceeded,

    #[error("Worker aborted: {0}")]
    WorkerAborted(String),
}

impl SiteError {
    /// Stable machine-readable classification, used in serialized reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SiteError::Fetch(FetchError::Network(_)) => "network",
            SiteError::Fetch(FetchError::HttpStatus(_)) => "http_status",
            SiteError::Fetch(FetchError::Timeout) => "timeout",
            SiteError::Extraction(ExtractionError::MalformedDocument { .. }) => "malformed_document",
            SiteError::Extraction(ExtractionError::InvalidRule { .. }) => "invalid_rule",
            SiteError::Extraction(ExtractionError::RuleNotFound { .. }) => "rule_not_found",
            SiteError::Extraction(ExtractionError::NoDigitsFound { .. }) => "no_digits_found",
            SiteError::Extraction(ExtractionError::PriceOutOfRange { .. }) => "price_out_of_range",
            SiteError::Extraction(ExtractionError::NonPositivePrice { .. }) => "non_positive_price",
            SiteError::DeadlineExceeded => "deadline_exceeded",
            SiteError::WorkerAborted(_) => "worker_aborted",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid aggregation settings: {0}")]
    InvalidSettings(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
