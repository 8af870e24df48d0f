use thiserror::Error;

use crate::core::RunStatus;

#[derive(Error, Debug)]
pub enum CertifyError {
    #[error("Test \"{slug}\" is already registered")]
    DuplicateSlug { slug: String },

    #[error("Test \"{slug}\" not found")]
    UnknownTest { slug: String },

    #[error("Test run {run_id} not found")]
    UnknownRun { run_id: uuid::Uuid },

    #[error("Test run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: uuid::Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl CertifyError {
    pub fn duplicate_slug(slug: impl Into<String>) -> Self {
        Self::DuplicateSlug { slug: slug.into() }
    }

    pub fn unknown_test(slug: impl Into<String>) -> Self {
        Self::UnknownTest { slug: slug.into() }
    }

    pub fn unknown_run(run_id: uuid::Uuid) -> Self {
        Self::UnknownRun { run_id }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Failures raised by the HTTP, browser and validation collaborators.
///
/// These never abort a suite: the probe that issued the call turns them into
/// a `fail` or `skip` scenario depending on whether the failing call was the
/// subject of the check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Invalid response body: {message}")]
    InvalidBody { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CertifyError>;
