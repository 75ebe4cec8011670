use thiserror::Error;

/// Configuration problems detected before any network call. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("unknown tracker variant: {0} (expected \"jira\" or \"linear\")")]
    UnknownTracker(String),
}

/// Tracker backend failures. Caught at the batch-fetch boundary and
/// downgraded to "no issue for this request"; never escapes an adapter.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("tracker request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed tracker response: {0}")]
    Malformed(String),
}

/// Outbound messaging failures. Fatal once the bounded retry is exhausted.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("slack API error ({code})")]
    Api { code: String },

    #[error("slack request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
}
