//! Error types for the Census API client.

use thiserror::Error;

/// Errors surfaced by the client and the export helpers.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested year is not covered by the accessor or dataset.
    /// Checked before any network call is made.
    #[error("geography is not available in {year} (supported years: {supported:?})")]
    UnsupportedYear { year: u32, supported: Vec<u32> },

    /// The API answered 200 with its HTML "Invalid Key" page instead of data.
    #[error("the Census API rejected the API key")]
    InvalidApiKey,

    /// [`Client::query`](crate::Client::query) was given more fields than
    /// one request may carry. [`Client::get`](crate::Client::get) splits
    /// long lists transparently; the single-request path does not.
    #[error("only {cap} fields per request are allowed (got {got})")]
    TooManyFields { got: usize, cap: usize },

    /// Any non-200, non-204 response. The body is attached for diagnostics.
    #[error("request failed with HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The response body could not be decoded as tabular JSON, or a
    /// float-typed cell failed strict numeric parsing.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// Transport-level failure from the HTTP client.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
