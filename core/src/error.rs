//! Error types for the Geckoboard client.
//!
//! # Design
//! `ApiError` is the decoded error body the API returns for 3xx/4xx
//! responses. It compares structurally so callers can match on the exact
//! status code and message. Everything else a call can fail with is a
//! variant of `Error`: request construction, serialization, transport,
//! cancellation, and the fixed message used for every 5xx response.

use std::fmt;

use serde::Deserialize;

/// Message returned for any 5xx response, regardless of body.
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "Sorry, there seems to be a problem with \
    Geckoboard's servers. Please try again, or check https://geckoboard.statuspage.io";

/// The `message` object nested under `error` in an API error body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Detail {
    pub message: String,
}

/// An error reported by the API in a `{"error": {"message": ...}}` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status_code: u16,
    #[serde(rename = "error")]
    pub detail: Detail,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            detail: Detail {
                message: message.into(),
            },
        }
    }

    pub fn message(&self) -> &str {
        &self.detail.message
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There was an error sending the data to Geckoboard's API: {:?}: with response code {}",
            self.detail.message, self.status_code
        )
    }
}

impl std::error::Error for ApiError {}

/// Why a request URL was rejected.
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("invalid control character in URL")]
    ControlCharacter,

    /// Parsing would send the request somewhere other than the path given,
    /// e.g. by resolving `..` segments or percent-encoding characters.
    #[error("path would be rewritten to {0:?}")]
    PathRewritten(String),

    #[error(transparent)]
    Parse(#[from] url::ParseError),
}

/// Primary error type for the [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: UrlError,
    },

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("{}", UNEXPECTED_RESPONSE_MESSAGE)]
    UnexpectedResponse,

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The API returned an error status whose body is not a valid error document.
    #[error(transparent)]
    MalformedErrorBody(serde_json::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("missing API key: {var} is not set")]
    MissingApiKey { var: &'static str },

    #[error("invalid timeout {value:?} in {var}: expected a positive number of seconds")]
    InvalidTimeout { var: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
