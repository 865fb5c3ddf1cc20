// crates/network/src/resume.rs
//! Download resume capability

use crate::error::{TransportError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// State needed to continue an interrupted download
///
/// Callers treat the encoded form as opaque bytes: it comes back attached to a
/// failed download and goes in through `EndpointDescriptor::with_resume_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeData {
    pub url: String,
    pub temp_path: PathBuf,
    pub bytes_downloaded: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub total_size: Option<u64>,
    pub interrupted_at: chrono::DateTime<chrono::Utc>,
}

impl ResumeData {
    pub fn new(url: impl Into<String>, temp_path: impl Into<PathBuf>, bytes_downloaded: u64) -> Self {
        Self {
            url: url.into(),
            temp_path: temp_path.into(),
            bytes_downloaded,
            etag: None,
            last_modified: None,
            total_size: None,
            interrupted_at: chrono::Utc::now(),
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn with_total_size(mut self, total_size: Option<u64>) -> Self {
        self.total_size = total_size;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        // A struct of plain fields always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decodes an opaque resume blob
    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| {
            TransportError::new(
                TransportErrorKind::ResumeDataCorrupted,
                format!("resume data is not readable: {}", e),
            )
        })
    }

    /// Checks that the partial file is still there and matches the recorded size
    pub async fn verify(&self) -> Result<(), TransportError> {
        let cannot_resume =
            |reason: String| TransportError::new(TransportErrorKind::CannotResume, reason);

        if self.bytes_downloaded == 0 {
            return Err(cannot_resume("no bytes were downloaded".to_string()));
        }

        let metadata = tokio::fs::metadata(&self.temp_path).await.map_err(|e| {
            cannot_resume(format!(
                "partial file {} unavailable: {}",
                self.temp_path.display(),
                e
            ))
        })?;

        if metadata.len() != self.bytes_downloaded {
            return Err(cannot_resume(format!(
                "partial file holds {} bytes, expected {}",
                metadata.len(),
                self.bytes_downloaded
            )));
        }

        if let Some(total) = self.total_size {
            if metadata.len() > total {
                return Err(cannot_resume(format!(
                    "partial file larger than total size {}",
                    total
                )));
            }
        }

        Ok(())
    }

    /// `Range` header value requesting the remaining bytes
    pub fn range_header(&self) -> String {
        format!("bytes={}-", self.bytes_downloaded)
    }

    /// Validator for `If-Range`, preferring the ETag
    pub fn if_range(&self) -> Option<&str> {
        self.etag.as_deref().or(self.last_modified.as_deref())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_garbage_is_corrupted() {
        let err = ResumeData::decode(b"\x00\x01garbage").unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::ResumeDataCorrupted);
    }

    #[test]
    fn test_encode_decode() {
        let data = ResumeData::new("https://cdn.example.com/a.zip", "/tmp/a.part", 512)
            .with_etag(Some("\"abc\"".to_string()))
            .with_total_size(Some(2048));
        let decoded = ResumeData::decode(&data.encode()).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.range_header(), "bytes=512-");
        assert_eq!(decoded.if_range(), Some("\"abc\""));
    }

    #[tokio::test]
    async fn test_verify_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = ResumeData::new("https://x", dir.path().join("gone.part"), 10);
        let err = data.verify().await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::CannotResume);
    }

    #[tokio::test]
    async fn test_verify_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.part");
        std::fs::write(&path, [0u8; 5]).unwrap();

        let data = ResumeData::new("https://x", &path, 10);
        assert_eq!(
            data.verify().await.unwrap_err().kind(),
            TransportErrorKind::CannotResume
        );

        let data = ResumeData::new("https://x", &path, 5);
        assert!(data.verify().await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_larger_than_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.part");
        std::fs::write(&path, [0u8; 8]).unwrap();

        let data = ResumeData::new("https://x", &path, 8).with_total_size(Some(4));
        assert!(data.verify().await.is_err());
    }
}
