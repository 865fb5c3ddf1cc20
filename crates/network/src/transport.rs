// crates/network/src/transport.rs
//! HTTP transport
//!
//! Wraps a reqwest client with fixed timeouts and a [`RequestObserver`], and
//! turns an [`EndpointDescriptor`] into one HTTP exchange. Status codes are
//! reported, not judged: validation happens in the orchestrator.

use crate::config::NetworkConfig;
use crate::endpoint::{DownloadDestination, DownloadTarget, EndpointDescriptor, Task, UploadContent, UploadFile};
use crate::error::{ConfigError, TransportError, TransportErrorKind};
use crate::foreground::ForegroundContext;
use crate::normalize::Failure;
use crate::files::delete_file;
use crate::observer::{RequestObserver, TransferDirection};
use crate::progress::{Progress, ProgressCallback, ProgressReporter};
use crate::resume::ResumeData;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG, IF_RANGE, LAST_MODIFIED, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client as ReqwestClient, RequestBuilder, StatusCode, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Response as received from the transport
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Where a download was stored
    pub final_location: Option<PathBuf>,
}

/// Response metadata handed to a download destination
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: u16,
    pub url: Url,
    pub headers: HeaderMap,
}

impl ResponseMeta {
    /// File name suggested by the server
    ///
    /// Taken from `Content-Disposition`, else the last URL path segment.
    pub fn suggested_filename(&self) -> Option<String> {
        self.headers
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| {
                self.url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .and_then(sanitize_file_name)
    }
}

fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        if let Some(encoded) = param.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'value
            if let Some((_, name)) = encoded.rsplit_once('\'') {
                return Some(name.trim_matches('"').to_string());
            }
        } else if let Some(name) = param.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain
}

fn sanitize_file_name(name: String) -> Option<String> {
    Path::new(&name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// HTTP client used by the orchestrator
#[derive(Clone)]
pub struct TransportClient {
    inner: ReqwestClient,
    foreground: Arc<dyn ForegroundContext>,
    observer: Arc<dyn RequestObserver>,
    temp_dir: PathBuf,
}

impl TransportClient {
    /// Creates a client with the configured request and resource timeouts
    pub fn new(
        config: &NetworkConfig,
        foreground: Arc<dyn ForegroundContext>,
        observer: Arc<dyn RequestObserver>,
    ) -> Result<Self, ConfigError> {
        let inner = ReqwestClient::builder()
            .timeout(config.resource_timeout())
            .read_timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            inner,
            foreground,
            observer,
            temp_dir: config.temp_dir(),
        })
    }

    /// Sends the request described by `descriptor`
    ///
    /// `progress` receives upload or download progress on the foreground
    /// context. Dropping the returned future aborts the exchange.
    pub async fn dispatch(
        &self,
        descriptor: &EndpointDescriptor,
        progress: Option<ProgressCallback>,
    ) -> Result<RawResponse, Failure> {
        self.observer.will_send(descriptor);
        let outcome = self.perform(descriptor, progress).await;
        self.observer.did_complete(descriptor, outcome.as_ref());
        outcome
    }

    /// Returns true if a HEAD request to `url` gets any response
    pub async fn is_accessible(&self, url: &str) -> bool {
        self.inner.head(url).send().await.is_ok()
    }

    async fn perform(
        &self,
        descriptor: &EndpointDescriptor,
        progress: Option<ProgressCallback>,
    ) -> Result<RawResponse, Failure> {
        let url = descriptor.url().map_err(Failure::RequestMapping)?;

        match descriptor.task() {
            Task::Plain => self.execute(self.builder(descriptor, url, false)).await,
            Task::Parameters(params) => {
                let body = serde_json::to_vec(&params).map_err(|e| {
                    Failure::ParameterEncoding(TransportError::new(
                        TransportErrorKind::InvalidRequest,
                        e.to_string(),
                    ))
                })?;
                let mut builder = self.builder(descriptor, url, false).body(body);
                if !descriptor.headers().contains_key(CONTENT_TYPE) {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                self.execute(builder).await
            }
            Task::Upload(files) => {
                let reporter = Arc::new(self.reporter(descriptor, TransferDirection::Upload, progress));
                let builder = self.builder(descriptor, url, true);
                self.upload(builder, files, reporter).await
            }
            Task::Download {
                destination,
                resume_data,
            } => {
                let reporter = self.reporter(descriptor, TransferDirection::Download, progress);
                let builder = self.builder(descriptor, url.clone(), false);
                self.download(builder, &url, destination, resume_data, &reporter)
                    .await
            }
        }
    }

    fn builder(&self, descriptor: &EndpointDescriptor, url: Url, multipart: bool) -> RequestBuilder {
        let mut headers = descriptor.headers().clone();
        if multipart {
            // The multipart boundary header replaces any preset content type
            headers.remove(CONTENT_TYPE);
        }
        self.inner
            .request(descriptor.method().clone(), url)
            .headers(headers)
    }

    fn reporter(
        &self,
        descriptor: &EndpointDescriptor,
        direction: TransferDirection,
        progress: Option<ProgressCallback>,
    ) -> ProgressReporter {
        let observer = Arc::clone(&self.observer);
        let snapshot = descriptor.clone();
        ProgressReporter::new(None, progress, Arc::clone(&self.foreground)).with_tap(Box::new(
            move |p: &Progress| observer.did_progress(&snapshot, direction, p),
        ))
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<RawResponse, Failure> {
        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_failure)?;

        Ok(RawResponse {
            status,
            headers,
            body,
            final_location: None,
        })
    }

    async fn upload(
        &self,
        builder: RequestBuilder,
        files: Vec<UploadFile>,
        reporter: Arc<ProgressReporter>,
    ) -> Result<RawResponse, Failure> {
        let read_failure: ReadFailureSlot = Arc::new(Mutex::new(None));
        let mut form = Form::new();
        let mut total = 0u64;

        for file in files {
            let (length, chunks) = match file.content {
                UploadContent::Bytes(data) => (data.len() as u64, bytes_stream(data)),
                UploadContent::File(path) => {
                    let metadata = tokio::fs::metadata(&path).await.map_err(|source| {
                        Failure::FileRead {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    (metadata.len(), file_stream(path, Arc::clone(&read_failure)))
                }
            };
            total += length;

            let counter = Arc::clone(&reporter);
            let counted = chunks.inspect_ok(move |chunk| counter.advance(chunk.len() as u64));
            let part = Part::stream_with_length(Body::wrap_stream(counted), length)
                .file_name(file.file_name)
                .mime_str(&file.mime_type)
                .map_err(|e| Failure::ParameterEncoding(TransportError::from_reqwest(&e)))?;
            form = form.part(file.name, part);
        }

        reporter.start(Some(total), 0);
        let result = self.execute(builder.multipart(form)).await;

        match result {
            Ok(response) => {
                reporter.finish();
                Ok(response)
            }
            Err(failure) => {
                // A read error surfaces from reqwest as a generic body error
                let recorded = read_failure.lock().unwrap_or_else(|e| e.into_inner()).take();
                match recorded {
                    Some((path, source)) => Err(Failure::FileRead { path, source }),
                    None => Err(failure),
                }
            }
        }
    }

    async fn download(
        &self,
        builder: RequestBuilder,
        url: &Url,
        destination: DownloadDestination,
        resume_data: Option<Vec<u8>>,
        reporter: &ProgressReporter,
    ) -> Result<RawResponse, Failure> {
        let resume = match resume_data {
            Some(bytes) => {
                let data = ResumeData::decode(&bytes).map_err(Failure::Transport)?;
                data.verify().await.map_err(Failure::Transport)?;
                Some(data)
            }
            None => None,
        };

        let mut builder = builder;
        if let Some(data) = &resume {
            builder = builder.header(RANGE, data.range_header());
            if let Some(validator) = data.if_range() {
                builder = builder.header(IF_RANGE, validator);
            }
        }

        let response = builder.send().await.map_err(transport_failure)?;
        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        if !status.is_success() {
            let body = response.bytes().await.map_err(transport_failure)?;
            return Ok(RawResponse {
                status: status.as_u16(),
                headers,
                body,
                final_location: None,
            });
        }

        let (temp_path, offset) = match resume {
            Some(data) if status == StatusCode::PARTIAL_CONTENT => {
                (data.temp_path.clone(), data.bytes_downloaded)
            }
            Some(data) => {
                log::info!("Server ignored range request, restarting {}", url);
                (data.temp_path.clone(), 0)
            }
            None => (temporary_download_path(&self.temp_dir), 0),
        };
        let mut partial = PartialFile::new(temp_path.clone());

        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(&temp_path).await
        } else {
            File::create(&temp_path).await
        }
        .map_err(|source| file_write(&temp_path, source))?;

        let total = response.content_length().map(|len| len + offset);
        reporter.start(total, offset);

        let etag = header_string(&headers, ETAG);
        let last_modified = header_string(&headers, LAST_MODIFIED);
        let mut written = offset;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = file.flush().await;
                    drop(file);
                    let error = TransportError::from_reqwest(&e);
                    if written == 0 {
                        return Err(Failure::Transport(error));
                    }
                    partial.keep();
                    let resume = ResumeData::new(url.as_str(), &temp_path, written)
                        .with_etag(etag)
                        .with_last_modified(last_modified)
                        .with_total_size(total);
                    log::info!(
                        "Download interrupted after {} bytes ({}), resume data available",
                        written,
                        error.kind()
                    );
                    return Err(Failure::DownloadInterrupted(
                        error.with_resume_data(resume.encode()),
                    ));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|source| file_write(&temp_path, source))?;
            written += chunk.len() as u64;
            reporter.advance(chunk.len() as u64);
        }

        file.flush()
            .await
            .map_err(|source| file_write(&temp_path, source))?;
        drop(file);
        reporter.finish();

        let meta = ResponseMeta {
            status: status.as_u16(),
            url: final_url,
            headers: headers.clone(),
        };
        let target = destination(&temp_path, &meta);
        move_into_place(&temp_path, &target).await?;
        partial.keep();

        Ok(RawResponse {
            status: status.as_u16(),
            headers,
            body: Bytes::new(),
            final_location: Some(target.path),
        })
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient").finish_non_exhaustive()
    }
}

type ReadFailureSlot = Arc<Mutex<Option<(PathBuf, std::io::Error)>>>;

fn transport_failure(err: reqwest::Error) -> Failure {
    Failure::Transport(TransportError::from_reqwest(&err))
}

fn file_write(path: &Path, source: std::io::Error) -> Failure {
    Failure::FileWrite {
        path: path.to_path_buf(),
        source,
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn temporary_download_path(dir: &Path) -> PathBuf {
    dir.join(format!("tz-download-{}.part", uuid::Uuid::new_v4()))
}

/// Partial download file, removed on drop unless kept
///
/// Covers every way a download can end early, including the request future
/// being dropped on cancel.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    /// Leaves the file in place; it was moved or handed off as resume data
    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep && self.path.exists() && delete_file(&self.path) {
            log::debug!("Removed partial download {}", self.path.display());
        }
    }
}

fn bytes_stream(data: Bytes) -> BoxStream<'static, std::io::Result<Bytes>> {
    let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| Ok(data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len()))))
        .collect();
    stream::iter(chunks).boxed()
}

fn file_stream(path: PathBuf, failure: ReadFailureSlot) -> BoxStream<'static, std::io::Result<Bytes>> {
    let reading = path.clone();
    stream::try_unfold(None::<File>, move |file| {
        let path = reading.clone();
        async move {
            let mut file = match file {
                Some(file) => file,
                None => File::open(&path).await?,
            };
            let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
            let read = file.read(&mut buf).await?;
            if read == 0 {
                return Ok(None);
            }
            buf.truncate(read);
            Ok::<_, std::io::Error>(Some((Bytes::from(buf), Some(file))))
        }
    })
    .inspect_err(move |e: &std::io::Error| {
        let mut slot = failure.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some((path.clone(), std::io::Error::new(e.kind(), e.to_string())));
    })
    .boxed()
}

async fn move_into_place(temp_path: &Path, target: &DownloadTarget) -> Result<(), Failure> {
    if target.options.create_intermediate_directories {
        if let Some(parent) = target.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| file_write(&target.path, source))?;
        }
    }

    if target.options.remove_previous_file && tokio::fs::try_exists(&target.path).await.unwrap_or(false) {
        tokio::fs::remove_file(&target.path)
            .await
            .map_err(|source| file_write(&target.path, source))?;
    }

    if let Err(e) = tokio::fs::rename(temp_path, &target.path).await {
        // rename fails across file systems; fall back to copying
        log::debug!("Rename failed ({}), copying {}", e, temp_path.display());
        tokio::fs::copy(temp_path, &target.path)
            .await
            .map_err(|source| file_write(&target.path, source))?;
        if let Err(e) = tokio::fs::remove_file(temp_path).await {
            log::warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::DownloadOptions;
    use reqwest::header::HeaderValue;

    fn meta(url: &str, disposition: Option<&str>) -> ResponseMeta {
        let mut headers = HeaderMap::new();
        if let Some(value) = disposition {
            headers.insert(CONTENT_DISPOSITION, HeaderValue::from_str(value).unwrap());
        }
        ResponseMeta {
            status: 200,
            url: Url::parse(url).unwrap(),
            headers,
        }
    }

    #[test]
    fn test_suggested_filename_from_disposition() {
        let m = meta(
            "https://cdn.example.com/files/123",
            Some("attachment; filename=\"report.pdf\""),
        );
        assert_eq!(m.suggested_filename().as_deref(), Some("report.pdf"));
    }

    #[test]
    fn test_suggested_filename_prefers_extended_form() {
        let m = meta(
            "https://cdn.example.com/files/123",
            Some("attachment; filename=\"plain.txt\"; filename*=UTF-8''fancy.txt"),
        );
        assert_eq!(m.suggested_filename().as_deref(), Some("fancy.txt"));
    }

    #[test]
    fn test_suggested_filename_from_url() {
        let m = meta("https://cdn.example.com/files/book.epub", None);
        assert_eq!(m.suggested_filename().as_deref(), Some("book.epub"));

        let m = meta("https://cdn.example.com/", None);
        assert_eq!(m.suggested_filename(), None);
    }

    #[test]
    fn test_suggested_filename_strips_directories() {
        let m = meta(
            "https://cdn.example.com/x",
            Some("attachment; filename=\"../../etc/passwd\""),
        );
        assert_eq!(m.suggested_filename().as_deref(), Some("passwd"));
    }

    #[tokio::test]
    async fn test_bytes_stream_chunks() {
        let data = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10]);
        let chunks: Vec<Bytes> = bytes_stream(data).try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
    }

    #[tokio::test]
    async fn test_file_stream_records_read_failure() {
        let slot: ReadFailureSlot = Arc::new(Mutex::new(None));
        let missing = PathBuf::from("/definitely/not/here.bin");
        let result: Result<Vec<Bytes>, _> = file_stream(missing.clone(), Arc::clone(&slot))
            .try_collect()
            .await;

        assert!(result.is_err());
        let recorded = slot.lock().unwrap().take();
        assert_eq!(recorded.map(|(p, _)| p), Some(missing));
    }

    #[tokio::test]
    async fn test_move_into_place_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("download.part");
        let target_path = dir.path().join("nested").join("final.bin");
        std::fs::write(&temp, b"new").unwrap();
        std::fs::create_dir_all(target_path.parent().unwrap()).unwrap();
        std::fs::write(&target_path, b"old").unwrap();

        let target = DownloadTarget::new(&target_path).with_options(DownloadOptions {
            remove_previous_file: true,
            create_intermediate_directories: true,
        });
        move_into_place(&temp, &target).await.unwrap();

        assert_eq!(std::fs::read(&target_path).unwrap(), b"new");
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_move_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("download.part");
        std::fs::write(&temp, b"data").unwrap();

        let target = DownloadTarget::new(dir.path().join("absent").join("final.bin"));
        let result = move_into_place(&temp, &target).await;
        assert!(matches!(result, Err(Failure::FileWrite { .. })));
    }

    #[test]
    fn test_partial_file_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = temporary_download_path(dir.path());
        let kept = temporary_download_path(dir.path());
        std::fs::write(&dropped, b"partial").unwrap();
        std::fs::write(&kept, b"partial").unwrap();

        drop(PartialFile::new(dropped.clone()));
        let mut guard = PartialFile::new(kept.clone());
        guard.keep();
        drop(guard);

        assert!(!dropped.exists());
        assert!(kept.exists());
        assert!(dropped.starts_with(dir.path()));
    }
}
