// crates/network/src/normalize.rs
//! Failure classification
//!
//! Every pipeline step reports what went wrong as a [`Failure`]. Only
//! [`normalize`] turns a failure into a [`NetworkError`].

use crate::error::{NetworkError, TransportError, TransportErrorKind};
use std::fmt;
use std::path::PathBuf;

/// A raw failure observed somewhere in the request pipeline
#[derive(Debug)]
pub enum Failure {
    /// Status outside 200..=299
    Status(u16),
    /// The descriptor could not be mapped to a URL
    RequestMapping(String),
    /// The body could not be decoded
    Decode(serde_json::Error),
    /// Parameters or headers could not be encoded
    ParameterEncoding(TransportError),
    /// The transport failed
    Transport(TransportError),
    /// A download body was cut off after some bytes were stored; carries resume data
    DownloadInterrupted(TransportError),
    /// The envelope carried a non-success code
    Business { code: i64, msg: String },
    /// The reachability gate reported no connectivity
    Unreachable,
    /// Upload content missing in memory and on disk
    MissingFile(PathBuf),
    /// Upload content could not be read while streaming
    FileRead { path: PathBuf, source: std::io::Error },
    /// Download could not be written or moved
    FileWrite { path: PathBuf, source: std::io::Error },
    /// No download destination was configured
    DestinationMissing,
    /// The download produced no file or an empty one
    EmptyDownload,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Status(code) => write!(f, "status code {}", code),
            Failure::RequestMapping(reason) => write!(f, "request mapping: {}", reason),
            Failure::Decode(e) => write!(f, "decode: {}", e),
            Failure::ParameterEncoding(e) => write!(f, "parameter encoding: {}", e),
            Failure::Transport(e) => write!(f, "transport: {}", e),
            Failure::DownloadInterrupted(e) => write!(f, "download interrupted: {}", e),
            Failure::Business { code, msg } => write!(f, "business code {}: {}", code, msg),
            Failure::Unreachable => f.write_str("network unreachable"),
            Failure::MissingFile(path) => write!(f, "missing file {}", path.display()),
            Failure::FileRead { path, source } => write!(f, "read {}: {}", path.display(), source),
            Failure::FileWrite { path, source } => write!(f, "write {}: {}", path.display(), source),
            Failure::DestinationMissing => f.write_str("download destination not configured"),
            Failure::EmptyDownload => f.write_str("empty download"),
        }
    }
}

/// Maps a pipeline failure into the public error taxonomy
pub fn normalize(failure: Failure) -> NetworkError {
    match failure {
        Failure::Status(code) => NetworkError::ResponseCodeError(code),
        Failure::RequestMapping(reason) => {
            log::debug!("request mapping failed: {}", reason);
            NetworkError::InvalidUrl
        }
        Failure::Decode(e) => NetworkError::JsonParseFailed(e),
        Failure::ParameterEncoding(e) => NetworkError::RequestFailed(e),
        Failure::Transport(e) => normalize_transport(e),
        Failure::DownloadInterrupted(e) => NetworkError::DownloadProgressError(e),
        Failure::Business { code, msg } => NetworkError::BusinessError { code, msg },
        Failure::Unreachable => NetworkError::NoNetwork,
        Failure::MissingFile(path) => NetworkError::FileNotFound(path),
        Failure::FileRead { path, source } => NetworkError::FileReadFailed { path, source },
        Failure::FileWrite { path, source } => NetworkError::FileWriteFailed { path, source },
        Failure::DestinationMissing => NetworkError::FileWriteFailed {
            path: PathBuf::new(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "download destination not configured",
            ),
        },
        Failure::EmptyDownload => NetworkError::EmptyDownloadFile,
    }
}

fn normalize_transport(error: TransportError) -> NetworkError {
    let kind = error.kind();
    if kind.is_connectivity() {
        NetworkError::NoNetwork
    } else if kind.is_resume() {
        NetworkError::ResumeDataError(error)
    } else if kind == TransportErrorKind::InvalidRequest {
        NetworkError::InvalidUrl
    } else {
        NetworkError::RequestFailed(error)
    }
}

impl From<Failure> for NetworkError {
    fn from(failure: Failure) -> Self {
        normalize(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(kind: TransportErrorKind) -> Failure {
        Failure::Transport(TransportError::new(kind, "test"))
    }

    #[test]
    fn test_status_maps_to_response_code() {
        assert!(matches!(
            normalize(Failure::Status(503)),
            NetworkError::ResponseCodeError(503)
        ));
    }

    #[test]
    fn test_request_mapping_maps_to_invalid_url() {
        let err = normalize(Failure::RequestMapping("relative URL without a base".into()));
        assert!(matches!(err, NetworkError::InvalidUrl));
    }

    #[test]
    fn test_decode_maps_to_json_parse_failed() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(
            normalize(Failure::Decode(source)),
            NetworkError::JsonParseFailed(_)
        ));
    }

    #[test]
    fn test_parameter_encoding_maps_to_request_failed() {
        let err = normalize(Failure::ParameterEncoding(TransportError::new(
            TransportErrorKind::InvalidRequest,
            "bad header",
        )));
        assert!(matches!(err, NetworkError::RequestFailed(_)));
    }

    #[test]
    fn test_connectivity_transport_errors_map_to_no_network() {
        for kind in [
            TransportErrorKind::NotConnected,
            TransportErrorKind::TimedOut,
            TransportErrorKind::ConnectionLost,
        ] {
            assert!(normalize(transport(kind)).is_no_network(), "{kind:?}");
        }
    }

    #[test]
    fn test_resume_transport_errors_map_to_resume_error() {
        for kind in [
            TransportErrorKind::CannotResume,
            TransportErrorKind::ResumeDataCorrupted,
        ] {
            assert!(matches!(
                normalize(transport(kind)),
                NetworkError::ResumeDataError(_)
            ));
        }
    }

    #[test]
    fn test_other_transport_errors_map_to_request_failed() {
        for kind in [TransportErrorKind::CannotConnectToHost, TransportErrorKind::Other] {
            assert!(matches!(
                normalize(transport(kind)),
                NetworkError::RequestFailed(_)
            ));
        }
    }

    #[test]
    fn test_interrupted_download_keeps_resume_data() {
        let error = TransportError::new(TransportErrorKind::ConnectionLost, "body cut off")
            .with_resume_data(b"blob".to_vec());
        let err = normalize(Failure::DownloadInterrupted(error));
        assert!(matches!(err, NetworkError::DownloadProgressError(_)));
        assert_eq!(err.resume_data(), Some(&b"blob"[..]));
        assert!(!err.is_no_network());
    }

    #[test]
    fn test_business_unreachable_and_files() {
        let err = normalize(Failure::Business {
            code: 7,
            msg: "bad".into(),
        });
        assert!(matches!(err, NetworkError::BusinessError { code: 7, ref msg } if msg == "bad"));

        assert!(normalize(Failure::Unreachable).is_no_network());

        let err = normalize(Failure::MissingFile(PathBuf::from("/nope.png")));
        assert!(matches!(err, NetworkError::FileNotFound(ref p) if p == &PathBuf::from("/nope.png")));

        assert!(matches!(
            normalize(Failure::DestinationMissing),
            NetworkError::FileWriteFailed { .. }
        ));
        assert!(matches!(
            normalize(Failure::EmptyDownload),
            NetworkError::EmptyDownloadFile
        ));
    }
}
