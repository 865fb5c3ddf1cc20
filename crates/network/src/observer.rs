// crates/network/src/observer.rs
//! Request observers
//!
//! Observers see each request before it is sent, on every progress update and
//! when the transport completes. They are purely advisory.

use crate::endpoint::{EndpointDescriptor, Task, UploadContent};
use crate::files::{file_size, format_file_size};
use crate::normalize::Failure;
use crate::progress::Progress;
use crate::transport::RawResponse;
use std::fmt;

/// Which way a body is moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => f.write_str("Upload"),
            TransferDirection::Download => f.write_str("Download"),
        }
    }
}

/// Hooks into the transport lifecycle
pub trait RequestObserver: Send + Sync {
    fn will_send(&self, _descriptor: &EndpointDescriptor) {}

    fn did_progress(
        &self,
        _descriptor: &EndpointDescriptor,
        _direction: TransferDirection,
        _progress: &Progress,
    ) {
    }

    fn did_complete(&self, _descriptor: &EndpointDescriptor, _outcome: Result<&RawResponse, &Failure>) {}
}

/// Observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {}

/// Observer that writes each request's lifecycle to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

const BODY_PREVIEW_LIMIT: usize = 1024;

impl RequestObserver for LogObserver {
    fn will_send(&self, descriptor: &EndpointDescriptor) {
        log::info!(
            "Starting request: {} {}",
            descriptor.method(),
            descriptor.url_string()
        );

        if let Some(params) = descriptor.parameters() {
            log::debug!("Parameters: {}", serde_json::Value::Object(params.clone()));
        }

        let header_names: Vec<&str> = descriptor.headers().keys().map(|k| k.as_str()).collect();
        log::debug!("Headers: {:?}", header_names);

        match descriptor.task() {
            Task::Upload(files) => {
                log::info!("Uploading {} file(s)", files.len());
                for (index, file) in files.iter().enumerate() {
                    let detail = match &file.content {
                        UploadContent::Bytes(data) => {
                            format!("size: {}", format_file_size(data.len() as u64))
                        }
                        UploadContent::File(path) => match file_size(path) {
                            Some(size) => {
                                format!("path: {} | size: {}", path.display(), format_file_size(size))
                            }
                            None => format!("path: {}", path.display()),
                        },
                    };
                    log::info!(
                        "  file {}: name={} | fileName={} | mimeType={} | {}",
                        index + 1,
                        file.name,
                        file.file_name,
                        file.mime_type,
                        detail
                    );
                }
            }
            Task::Download { resume_data, .. } => {
                log::info!("Download configured, resuming: {}", resume_data.is_some());
            }
            Task::Plain | Task::Parameters(_) => {}
        }
    }

    fn did_progress(&self, descriptor: &EndpointDescriptor, direction: TransferDirection, progress: &Progress) {
        log::debug!(
            "{} progress: {} | {}",
            direction,
            descriptor.url_string(),
            progress.percent_string()
        );
    }

    fn did_complete(&self, descriptor: &EndpointDescriptor, outcome: Result<&RawResponse, &Failure>) {
        let url = descriptor.url_string();
        match outcome {
            Ok(response) => {
                log::info!("Request succeeded: {} | status: {}", url, response.status);
                if let Some(location) = &response.final_location {
                    let size = file_size(location)
                        .map(format_file_size)
                        .unwrap_or_else(|| "unknown".to_string());
                    log::info!("Downloaded file: {} | size: {}", location.display(), size);
                } else if !response.body.is_empty() {
                    let end = response.body.len().min(BODY_PREVIEW_LIMIT);
                    log::debug!(
                        "Response body: {}",
                        String::from_utf8_lossy(&response.body[..end])
                    );
                }
            }
            Err(failure) => {
                log::info!("Request failed: {} | error: {}", url, failure);
            }
        }
    }
}
