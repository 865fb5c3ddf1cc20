// crates/network/src/networking.rs
//! Request orchestrator
//!
//! Every operation follows the same path: reachability check, operation
//! specific pre-validation, transport dispatch, status validation, decoding,
//! post-processing. Whatever fails on the way is normalized once and
//! delivered through the request's [`RequestHandle`].

use crate::config::NetworkConfig;
use crate::endpoint::{DescriptorComposer, Endpoint, EndpointDescriptor, StaticToken, TokenProvider, UploadContent};
use crate::error::ConfigError;
use crate::files::{delete_file, file_size};
use crate::foreground::ForegroundContext;
use crate::handle::RequestHandle;
use crate::normalize::{normalize, Failure};
use crate::observer::{LogObserver, RequestObserver};
use crate::progress::ProgressCallback;
use crate::reachability::Reachability;
use crate::response::{self, WireEnvelope};
use crate::transport::{RawResponse, TransportClient};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Entry point for all requests
///
/// Cheap to clone; clones share the transport and the reachability gate.
#[derive(Clone)]
pub struct Networking {
    transport: TransportClient,
    reachability: Arc<dyn Reachability>,
    composer: Arc<DescriptorComposer>,
    success_code: i64,
    runtime: Handle,
}

impl Networking {
    /// Creates an orchestrator that logs requests and sends no token
    ///
    /// Must be called from within a tokio runtime; requests run on it.
    pub fn new(
        config: &NetworkConfig,
        reachability: Arc<dyn Reachability>,
        foreground: Arc<dyn ForegroundContext>,
    ) -> Result<Self, ConfigError> {
        Self::with_collaborators(
            config,
            reachability,
            foreground,
            Arc::new(LogObserver),
            Arc::new(StaticToken::none()),
        )
    }

    /// Creates an orchestrator with a custom observer and token provider
    pub fn with_collaborators(
        config: &NetworkConfig,
        reachability: Arc<dyn Reachability>,
        foreground: Arc<dyn ForegroundContext>,
        observer: Arc<dyn RequestObserver>,
        token: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = Handle::try_current()?;
        let transport = TransportClient::new(config, foreground, observer)?;

        Ok(Self {
            transport,
            reachability,
            composer: Arc::new(DescriptorComposer::new(config, token)),
            success_code: config.business_success_code,
            runtime,
        })
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Descriptor for `endpoint` with the default headers applied
    pub fn compose<E: Endpoint + ?Sized>(&self, endpoint: &E) -> EndpointDescriptor {
        self.composer.compose(endpoint)
    }

    /// Sends a request and decodes the JSON body into `M`
    pub fn request<M>(&self, descriptor: EndpointDescriptor) -> RequestHandle<M>
    where
        M: DeserializeOwned + Send + 'static,
    {
        self.run(descriptor, None, no_precheck, |response| response::decode(&response))
    }

    /// Sends a request whose body is a `{code, msg, data}` envelope
    ///
    /// Delivers `data` decoded into `M` when `code` is the configured success
    /// code, otherwise `BusinessError`.
    pub fn request_business<M>(&self, descriptor: EndpointDescriptor) -> RequestHandle<M>
    where
        M: DeserializeOwned + Send + 'static,
    {
        let success_code = self.success_code;
        self.run(descriptor, None, no_precheck, move |response| {
            let envelope: WireEnvelope = response::decode(&response)?;
            response::unwrap_business(envelope.into(), success_code)
        })
    }

    /// Uploads the descriptor's files as a multipart body
    ///
    /// Files are checked before anything is sent.
    pub fn request_upload<M>(
        &self,
        descriptor: EndpointDescriptor,
        progress: Option<ProgressCallback>,
    ) -> RequestHandle<M>
    where
        M: DeserializeOwned + Send + 'static,
    {
        self.run(descriptor, progress, check_upload_files, |response| {
            response::decode(&response)
        })
    }

    /// Downloads into the descriptor's destination and yields the file path
    pub fn request_download(
        &self,
        descriptor: EndpointDescriptor,
        progress: Option<ProgressCallback>,
    ) -> RequestHandle<PathBuf> {
        self.run(descriptor, progress, check_download_destination, downloaded_file)
    }

    fn run<T, P, F>(
        &self,
        descriptor: EndpointDescriptor,
        progress: Option<ProgressCallback>,
        precheck: P,
        finish: F,
    ) -> RequestHandle<T>
    where
        T: Send + 'static,
        P: FnOnce(&EndpointDescriptor) -> Result<(), Failure> + Send + 'static,
        F: FnOnce(RawResponse) -> Result<T, Failure> + Send + 'static,
    {
        if !self.reachability.is_reachable() {
            log::info!(
                "Network unreachable, not sending {} {}",
                descriptor.method(),
                descriptor.url_string()
            );
            return RequestHandle::resolved(self.runtime.clone(), Err(normalize(Failure::Unreachable)));
        }

        let (handle, delivery) = RequestHandle::pending(self.runtime.clone());
        let transport = self.transport.clone();
        let task = self.runtime.spawn(async move {
            let outcome = pipeline(&transport, &descriptor, progress, precheck, finish).await;
            if !delivery.deliver(outcome.map_err(normalize)) {
                log::debug!("Outcome dropped for {}", descriptor.url_string());
            }
        });
        handle.cancel_handle().attach(task.abort_handle());
        handle
    }
}

impl std::fmt::Debug for Networking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Networking")
            .field("success_code", &self.success_code)
            .field("reachable", &self.reachability.is_reachable())
            .finish_non_exhaustive()
    }
}

async fn pipeline<T, P, F>(
    transport: &TransportClient,
    descriptor: &EndpointDescriptor,
    progress: Option<ProgressCallback>,
    precheck: P,
    finish: F,
) -> Result<T, Failure>
where
    P: FnOnce(&EndpointDescriptor) -> Result<(), Failure>,
    F: FnOnce(RawResponse) -> Result<T, Failure>,
{
    precheck(descriptor)?;
    let response = transport.dispatch(descriptor, progress).await?;
    let response = response::validate(response)?;
    finish(response)
}

fn no_precheck(_descriptor: &EndpointDescriptor) -> Result<(), Failure> {
    Ok(())
}

fn check_upload_files(descriptor: &EndpointDescriptor) -> Result<(), Failure> {
    for file in descriptor.upload_files().unwrap_or_default() {
        match &file.content {
            UploadContent::Bytes(data) if data.is_empty() => {
                return Err(Failure::MissingFile(PathBuf::from(&file.file_name)));
            }
            UploadContent::File(path) if !path.exists() => {
                return Err(Failure::MissingFile(path.clone()));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_download_destination(descriptor: &EndpointDescriptor) -> Result<(), Failure> {
    match descriptor.download_destination() {
        Some(_) => Ok(()),
        None => Err(Failure::DestinationMissing),
    }
}

fn downloaded_file(response: RawResponse) -> Result<PathBuf, Failure> {
    let path = response.final_location.ok_or(Failure::EmptyDownload)?;
    match file_size(&path) {
        Some(size) if size > 0 => Ok(path),
        Some(_) => {
            delete_file(&path);
            Err(Failure::EmptyDownload)
        }
        None => Err(Failure::EmptyDownload),
    }
}
