//! Error type shared by every stage of the grab pipeline.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the grab pipeline.
///
/// Most of these never escape a job: item-level and file-level failures are
/// logged and skipped. The ones that do (missing grabber, write failures,
/// serialization) fail the job that raised them.
#[derive(Debug, Error)]
pub enum EpgError {
    #[error("failed to access '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to parse channels file '{path}': {reason}")]
    ChannelsParse { path: PathBuf, reason: String },
    #[error("invalid site config '{path}': {reason}")]
    SiteConfig { path: PathBuf, reason: String },
    #[error("no grabber registered for site '{0}'")]
    UnknownSite(String),
    #[error("grab timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("scrape failed: {0}")]
    Scrape(String),
    #[error("xml serialization failed: {0}")]
    Xml(String),
    #[error("invalid cron expression '{expr}': {reason}")]
    Schedule { expr: String, reason: String },
    #[error("invalid date '{0}' (expected RFC 3339 or YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("invalid glob pattern '{0}'")]
    Glob(String),
    #[error("job aborted: {0}")]
    JobAborted(String),
}

impl EpgError {
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EpgError::File {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = EpgError> = std::result::Result<T, E>;
