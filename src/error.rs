use std::path::PathBuf;
use thiserror::Error;

/// Problems with the run setup. Raised before any scanning starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("period start {start} is after period end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("measurement interval must be at least one day")]
    ZeroInterval,

    #[error("{0} list is empty")]
    EmptyVariation(&'static str),

    #[error("{0} list contains 0")]
    ZeroVariation(&'static str),

    #[error("no weekdays given for weekday date selection")]
    NoWeekdays,

    #[error("unknown municipality: {0}")]
    UnknownMunicipality(String),

    #[error("no municipalities to scan")]
    NoMunicipalities,

    #[error("invalid boundary data in {path}: {reason}")]
    BoundaryData { path: PathBuf, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of a single upstream request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited (HTTP {0})")]
    RateLimited(u16),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Timeouts, connection failures, 5xx and rate limiting are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::RateLimited(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimited(_))
    }

    /// Classify a non-success HTTP status. Error bodies are often full HTML pages,
    /// so only a short prefix is kept.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 || status == 405 || body.contains("Not Allowed") {
            return FetchError::RateLimited(status);
        }
        let mut short: String = body.chars().take(150).collect();
        if body.chars().count() > 150 {
            short.push_str("...");
        }
        FetchError::Status { status, body: short }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status(status.as_u16(), "")
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// All attempts of a retried call failed.
#[derive(Error, Debug)]
#[error("request failed after {attempts} attempt(s): {last}")]
pub struct RetrievalError {
    pub attempts: u32,
    #[source]
    pub last: FetchError,
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is not valid: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("checkpoint lists {0} task(s) that are not part of this run's plan")]
    PlanMismatch(usize),
}

#[derive(Error, Debug)]
pub enum RunStatusError {
    #[error("run status I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run status file {path} is not valid: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
