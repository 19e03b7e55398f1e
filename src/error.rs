use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::results::PositionKey;

/// Errors that end a run, or stop it from starting.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Invalid or incomplete configuration. Always fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A list-level session failure (start navigation, list scan).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Detail fetch exhausted its retries while `continueOnError` is off.
    #[error("detail fetch failed for {position} ({url}): {message}")]
    DetailFailed {
        position: PositionKey,
        url: String,
        message: String,
    },

    /// The list page could not be observed again after returning from a detail.
    #[error("list page lost at {position}: {message}")]
    ListLost {
        position: PositionKey,
        message: String,
    },

    #[error("failed to write {path}: {message}")]
    Persistence { path: PathBuf, message: String },
}

/// Failures reported by a [`crate::crawlers::session::Session`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {after:?} while {context}")]
    Timeout { context: String, after: Duration },

    #[error("container {selector} not found on {url}")]
    MissingContainer { selector: String, url: String },

    #[error("session is closed")]
    Closed,

    #[error("webdriver command failed while {context}: {message}")]
    Command { context: String, message: String },
}

/// Why a raw detail link could not be turned into a URL to visit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("detail URL is empty")]
    Absent,

    #[error("unsupported scheme in {0}")]
    UnsupportedScheme(String),

    #[error("relative detail URL {0} (enable resolveRelativeUrls to follow it)")]
    Relative(String),

    #[error("malformed detail URL {raw}: {message}")]
    Malformed { raw: String, message: String },
}
