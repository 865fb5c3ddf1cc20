// crates/network/src/error.rs
//! Error types for network operations

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for request operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Every failure a request operation can deliver.
///
/// This set is closed: transport, status, decoding, business, file and resume
/// failures are all normalized into one of these variants before they reach a
/// caller.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The request URL could not be built from the descriptor
    #[error("Invalid request URL")]
    InvalidUrl,

    /// The transport failed for a reason other than connectivity
    #[error("Request failed: {0}")]
    RequestFailed(#[source] TransportError),

    /// HTTP status outside 200..=299
    #[error("Server responded with status code {0}")]
    ResponseCodeError(u16),

    /// The server returned no data
    #[error("Server returned an empty response")]
    EmptyResponseData,

    /// The body could not be decoded into the requested model
    #[error("Failed to parse response: {0}")]
    JsonParseFailed(#[source] serde_json::Error),

    /// The backend envelope reported a non-success code
    #[error("{msg}")]
    BusinessError { code: i64, msg: String },

    /// No connectivity, either reported by the gate or by the transport
    #[error("Network is unavailable, check your network settings")]
    NoNetwork,

    /// An upload file has no content or does not exist on disk
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// An upload file could not be read
    #[error("Failed to read file {}: {source}", path.display())]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A download could not be written or moved into place
    #[error("Failed to write file {}: {source}", path.display())]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Upload progress reporting failed
    #[error("Upload progress error: {0}")]
    UploadProgressError(#[source] TransportError),

    /// The download body was cut off mid-transfer; carries resume data
    #[error("Download interrupted: {0}")]
    DownloadProgressError(#[source] TransportError),

    /// The download finished but the resulting file is missing or empty
    #[error("Downloaded file is empty")]
    EmptyDownloadFile,

    /// Resume data was rejected or the partial download cannot be continued
    #[error("Failed to resume download: {0}")]
    ResumeDataError(#[source] TransportError),
}

impl NetworkError {
    /// Returns true if the failure was caused by missing connectivity
    pub fn is_no_network(&self) -> bool {
        matches!(self, NetworkError::NoNetwork)
    }

    /// HTTP status code for `ResponseCodeError`
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetworkError::ResponseCodeError(code) => Some(*code),
            _ => None,
        }
    }

    /// Backend code for `BusinessError`
    pub fn business_code(&self) -> Option<i64> {
        match self {
            NetworkError::BusinessError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Resume data attached to an interrupted download, if any
    ///
    /// Feed it back through `EndpointDescriptor::with_resume_data` to continue
    /// the transfer.
    pub fn resume_data(&self) -> Option<&[u8]> {
        match self {
            NetworkError::RequestFailed(e)
            | NetworkError::ResumeDataError(e)
            | NetworkError::DownloadProgressError(e) => e.resume_data(),
            _ => None,
        }
    }
}

/// Classification of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The device has no route to the network
    NotConnected,
    /// The request exceeded a configured timeout
    TimedOut,
    /// The connection dropped while the request was in flight
    ConnectionLost,
    /// The host refused or could not accept a connection
    CannotConnectToHost,
    /// The request itself could not be built
    InvalidRequest,
    /// A partial download cannot be continued
    CannotResume,
    /// Resume data could not be decoded
    ResumeDataCorrupted,
    /// Anything else
    Other,
}

impl TransportErrorKind {
    /// Returns true for the kinds that mean "no connectivity"
    pub fn is_connectivity(self) -> bool {
        matches!(
            self,
            TransportErrorKind::NotConnected
                | TransportErrorKind::TimedOut
                | TransportErrorKind::ConnectionLost
        )
    }

    /// Returns true for the kinds specific to resuming a download
    pub fn is_resume(self) -> bool {
        matches!(
            self,
            TransportErrorKind::CannotResume | TransportErrorKind::ResumeDataCorrupted
        )
    }

    /// Maps an I/O error kind observed under a transport failure
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Option<Self> {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable | ErrorKind::NetworkDown => {
                Some(TransportErrorKind::NotConnected)
            }
            ErrorKind::TimedOut => Some(TransportErrorKind::TimedOut),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Some(TransportErrorKind::ConnectionLost),
            ErrorKind::ConnectionRefused => Some(TransportErrorKind::CannotConnectToHost),
            _ => None,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::NotConnected => "not connected",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::ConnectionLost => "connection lost",
            TransportErrorKind::CannotConnectToHost => "cannot connect to host",
            TransportErrorKind::InvalidRequest => "invalid request",
            TransportErrorKind::CannotResume => "cannot resume",
            TransportErrorKind::ResumeDataCorrupted => "resume data corrupted",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// Transport failure in a shape independent of the HTTP library
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    resume_data: Option<Vec<u8>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resume_data: None,
        }
    }

    /// Attaches resume data to the failure
    pub fn with_resume_data(mut self, resume_data: Vec<u8>) -> Self {
        self.resume_data = Some(resume_data);
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn resume_data(&self) -> Option<&[u8]> {
        self.resume_data.as_deref()
    }

    /// Classifies a reqwest error
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = classify_reqwest(err);
        Self::new(kind, err.to_string())
    }
}

fn classify_reqwest(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_builder() {
        return TransportErrorKind::InvalidRequest;
    }

    // The innermost io::Error says more than reqwest's own flags
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(kind) = TransportErrorKind::from_io_kind(io.kind()) {
                return kind;
            }
        }
        source = cause.source();
    }

    if err.is_timeout() {
        TransportErrorKind::TimedOut
    } else if err.is_connect() {
        TransportErrorKind::CannotConnectToHost
    } else if err.is_body() {
        TransportErrorKind::ConnectionLost
    } else {
        TransportErrorKind::Other
    }
}

/// Errors raised while building a client or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse config file
    #[error("Failed to parse config file at {}: {source}", path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Config contains invalid values
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// No tokio runtime is available to drive requests
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
