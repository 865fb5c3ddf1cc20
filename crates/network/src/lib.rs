// crates/network/src/lib.rs
//! HTTP networking facade
//!
//! A [`Networking`] orchestrator checks reachability, dispatches the request,
//! validates and decodes the response, and delivers exactly one
//! [`NetworkError`]-typed outcome per request.

mod config;
mod endpoint;
mod error;
mod files;
mod foreground;
mod handle;
mod networking;
mod normalize;
mod observer;
mod progress;
mod reachability;
mod response;
mod resume;
mod transport;

pub use config::NetworkConfig;
pub use endpoint::{
    default_download_destination, DescriptorComposer, DownloadDestination, DownloadOptions,
    DownloadTarget, Endpoint, EndpointDescriptor, Parameters, SharedToken, StaticToken, Task,
    TokenProvider, UploadContent, UploadFile,
};
pub use error::{ConfigError, NetworkError, NetworkResult, TransportError, TransportErrorKind};
pub use files::{delete_file, file_size, format_file_size};
pub use foreground::{ForegroundContext, ForegroundPump, ForegroundQueue, ForegroundTask, ForegroundThread};
pub use handle::{CancelHandle, RequestHandle};
pub use networking::Networking;
pub use normalize::{normalize, Failure};
pub use observer::{LogObserver, NoopObserver, RequestObserver, TransferDirection};
pub use progress::{Progress, ProgressCallback, TransferProgress};
pub use reachability::{
    ConnectionType, ConnectivityProbe, ConnectivityStatus, Reachability, ReachabilityGate,
};
pub use response::{decode, unwrap_business, validate, BusinessEnvelope};
pub use resume::ResumeData;
pub use transport::{RawResponse, ResponseMeta, TransportClient};

pub use reqwest::header;
pub use reqwest::Method;
