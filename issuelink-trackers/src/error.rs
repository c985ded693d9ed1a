use issuelink_config::TrackerKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{vendor} integration is not configured: {reason}")]
    Configuration { vendor: TrackerKind, reason: String },

    #[error("no adapter registered for tracker type '{0}'")]
    Unsupported(TrackerKind),

    #[error("{vendor} could not find {resource}")]
    NotFound { vendor: TrackerKind, resource: String },

    #[error("{vendor} request for {resource} failed: status={status} body={body}")]
    Rejected {
        vendor: TrackerKind,
        resource: String,
        status: u16,
        body: String,
    },

    #[error("failed to reach {vendor} for {resource}: {source}")]
    Transport {
        vendor: TrackerKind,
        resource: String,
        source: reqwest::Error,
    },

    #[error("failed to decode {vendor} response for {resource}: {source}")]
    Decode {
        vendor: TrackerKind,
        resource: String,
        source: reqwest::Error,
    },

    #[error("{vendor} returned no {what}")]
    EmptyListing { vendor: TrackerKind, what: &'static str },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl TrackerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound { .. })
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
