use std::path::PathBuf;
use std::time::Duration;

use crate::transport::TransportError;
use crate::util::{retriable_status, snippet};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to the extraction service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service did not accept the task.
    #[error("task submission rejected (HTTP {status}): {message}")]
    SubmissionFailed { status: u16, message: String },

    /// Status queries kept failing with retryable errors.
    #[error("status query for task {task_id} failed {attempts} time(s) in a row: {source}")]
    PollingTransport {
        task_id: String,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    /// The task reached a terminal failure state on the remote side.
    #[error("task {task_id} failed remotely with status `{status}`")]
    RemoteProcessingFailed { task_id: String, status: String },

    #[error("task {task_id} did not finish within {elapsed:?}")]
    Timeout { task_id: String, elapsed: Duration },

    #[error("waiting for task {task_id} was cancelled")]
    Cancelled { task_id: String },

    #[error("could not list files of task {task_id} (HTTP {status}): {message}")]
    ListingFailed {
        task_id: String,
        status: u16,
        message: String,
    },

    #[error("could not download {file_name} (HTTP {status}): {message}")]
    DownloadFailed {
        file_name: String,
        status: u16,
        message: String,
    },

    /// The body ended before the size announced in the file listing.
    #[error("download of {file_name} incomplete: {received} of {expected} byte(s)")]
    IncompleteDownload {
        file_name: String,
        expected: u64,
        received: u64,
    },

    #[error("{context} failed (HTTP {status}): {message}")]
    RequestFailed {
        context: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response while {context}: {source}")]
    InvalidResponse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Transport hiccups and transient HTTP statuses (408, 429, 5xx) are
    /// worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::IncompleteDownload { .. } => true,
            Error::RequestFailed { status, .. } => retriable_status(*status),
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login failed (HTTP {status}): {message}")]
    LoginFailed { status: u16, message: String },

    #[error("logout failed (HTTP {status})")]
    LogoutFailed { status: u16 },

    #[error("no credential available; log in first")]
    NotLoggedIn,
}

/// Input problems detected locally, before any request is sent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown product `{0}`")]
    UnknownProduct(String),

    #[error("none of the requested bands {requested:?} exist in product `{product}`")]
    NoValidBands {
        product: String,
        requested: Vec<String>,
    },

    #[error("at least one layer must be requested")]
    EmptyLayers,

    #[error("invalid date `{0}` (expected MM-DD-YYYY)")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("invalid area geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid file name `{0}`")]
    InvalidFileName(String),
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct RemoteErrorBody {
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    // Validation failures come back as {"message": ..., "errors": [...]}
    #[serde(default)]
    pub(crate) errors: Option<serde_json::Value>,
}

/// Condenses a non-2xx response body into something worth showing a user.
pub(crate) fn describe_remote_error(status: u16, body: &str) -> String {
    let parsed = serde_json::from_str::<RemoteErrorBody>(body).unwrap_or_default();
    let headline = parsed
        .message
        .as_deref()
        .or(parsed.error.as_deref())
        .map(str::to_string);

    let mut out = match headline {
        Some(h) => h,
        None if body.trim().is_empty() => "(empty response body)".to_string(),
        None => snippet(body),
    };

    if let Some(errors) = parsed.errors {
        out.push_str(&format!(" [{}]", snippet(&errors.to_string())));
    }

    if status == 401 || status == 403 {
        out.push_str("\n- the bearer token may have expired; log in again");
    }

    out
}
