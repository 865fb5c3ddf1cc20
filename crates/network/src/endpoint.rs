// crates/network/src/endpoint.rs
//! Endpoint descriptors
//!
//! Callers describe an API call by implementing [`Endpoint`] with as little as
//! a base URL, path and method. [`DescriptorComposer`] then fills in default
//! headers and produces the [`EndpointDescriptor`] the orchestrator consumes.

use crate::config::NetworkConfig;
use crate::transport::ResponseMeta;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// JSON request parameters
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Maps the temporary download file and response metadata to the final location
pub type DownloadDestination = Arc<dyn Fn(&Path, &ResponseMeta) -> DownloadTarget + Send + Sync>;

/// A single API call as the caller describes it
pub trait Endpoint {
    fn base_url(&self) -> String;

    fn path(&self) -> String;

    fn method(&self) -> Method;

    fn parameters(&self) -> Option<Parameters> {
        None
    }

    /// Endpoint-specific headers; defaults are added for anything missing
    fn headers(&self) -> HeaderMap {
        HeaderMap::new()
    }

    fn upload_files(&self) -> Option<Vec<UploadFile>> {
        None
    }

    fn download_destination(&self) -> Option<DownloadDestination> {
        None
    }

    fn resume_data(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Content of an upload part
#[derive(Debug, Clone)]
pub enum UploadContent {
    /// Bytes held in memory
    Bytes(Bytes),
    /// A file on local storage, streamed at send time
    File(PathBuf),
}

/// One file in a multipart upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Form field name
    pub name: String,
    /// File name sent to the server
    pub file_name: String,
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    pub content: UploadContent,
}

impl UploadFile {
    pub fn from_bytes(
        data: impl Into<Bytes>,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            content: UploadContent::Bytes(data.into()),
        }
    }

    /// File-backed upload; `file_name` defaults to the last path component
    pub fn from_path(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        file_name: Option<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let file_name = file_name.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Self {
            name: name.into(),
            file_name,
            mime_type: mime_type.into(),
            content: UploadContent::File(path),
        }
    }

    /// Local path for file-backed content
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            UploadContent::File(path) => Some(path),
            UploadContent::Bytes(_) => None,
        }
    }
}

/// What to do with an existing file at the download target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    pub remove_previous_file: bool,
    pub create_intermediate_directories: bool,
}

/// Final location of a downloaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub path: PathBuf,
    pub options: DownloadOptions,
}

impl DownloadTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: DownloadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Destination that stores files under `downloads_dir`
///
/// The name is chosen from `file_name`, then the server-suggested name, then a
/// generated UUID. The directory is created and an existing file at the target
/// replaced when the download is moved into place.
pub fn default_download_destination(
    downloads_dir: impl Into<PathBuf>,
    file_name: Option<String>,
) -> DownloadDestination {
    let downloads_dir = downloads_dir.into();
    Arc::new(move |_temporary: &Path, response: &ResponseMeta| {
        let name = file_name
            .clone()
            .or_else(|| response.suggested_filename())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        DownloadTarget::new(downloads_dir.join(name)).with_options(DownloadOptions {
            remove_previous_file: true,
            create_intermediate_directories: true,
        })
    })
}

/// Shape of the request body
#[derive(Clone)]
pub enum Task {
    /// No body
    Plain,
    /// JSON-encoded parameters
    Parameters(Parameters),
    /// multipart/form-data
    Upload(Vec<UploadFile>),
    /// Body streamed to a file
    Download {
        destination: DownloadDestination,
        resume_data: Option<Vec<u8>>,
    },
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Plain => f.write_str("Plain"),
            Task::Parameters(params) => f.debug_tuple("Parameters").field(params).finish(),
            Task::Upload(files) => f.debug_tuple("Upload").field(files).finish(),
            Task::Download { resume_data, .. } => f
                .debug_struct("Download")
                .field("resume", &resume_data.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// Fully-formed description of one request
#[derive(Clone)]
pub struct EndpointDescriptor {
    base_url: String,
    path: String,
    method: Method,
    parameters: Option<Parameters>,
    headers: HeaderMap,
    upload_files: Option<Vec<UploadFile>>,
    download_destination: Option<DownloadDestination>,
    resume_data: Option<Vec<u8>>,
}

impl EndpointDescriptor {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            method,
            parameters: None,
            headers: HeaderMap::new(),
            upload_files: None,
            download_destination: None,
            resume_data: None,
        }
    }

    /// Snapshot of an endpoint without any default headers
    pub fn from_endpoint<E: Endpoint + ?Sized>(endpoint: &E) -> Self {
        Self {
            base_url: endpoint.base_url(),
            path: endpoint.path(),
            method: endpoint.method(),
            parameters: endpoint.parameters(),
            headers: endpoint.headers(),
            upload_files: endpoint.upload_files(),
            download_destination: endpoint.download_destination(),
            resume_data: endpoint.resume_data(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_upload_files(mut self, files: Vec<UploadFile>) -> Self {
        self.upload_files = Some(files);
        self
    }

    pub fn with_download_destination(mut self, destination: DownloadDestination) -> Self {
        self.download_destination = Some(destination);
        self
    }

    pub fn with_resume_data(mut self, resume_data: Vec<u8>) -> Self {
        self.resume_data = Some(resume_data);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn upload_files(&self) -> Option<&[UploadFile]> {
        self.upload_files.as_deref()
    }

    pub fn download_destination(&self) -> Option<&DownloadDestination> {
        self.download_destination.as_ref()
    }

    pub fn resume_data(&self) -> Option<&[u8]> {
        self.resume_data.as_deref()
    }

    /// `base_url` and `path` joined with exactly one slash
    pub fn url_string(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Parsed request URL
    pub fn url(&self) -> Result<Url, String> {
        Url::parse(&self.url_string()).map_err(|e| format!("{}: {}", self.url_string(), e))
    }

    /// Body shape: uploads win over downloads, downloads over parameters
    pub fn task(&self) -> Task {
        if let Some(files) = self.upload_files.as_ref().filter(|f| !f.is_empty()) {
            return Task::Upload(files.clone());
        }
        if let Some(destination) = &self.download_destination {
            return Task::Download {
                destination: Arc::clone(destination),
                resume_data: self.resume_data.clone(),
            };
        }
        match &self.parameters {
            Some(params) => Task::Parameters(params.clone()),
            None => Task::Plain,
        }
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("method", &self.method)
            .field("url", &self.url_string())
            .field("task", &self.task())
            .finish_non_exhaustive()
    }
}

/// Source of the bearer token attached by [`DescriptorComposer`]
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Token fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token the application updates after sign-in / sign-out
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.into());
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Fills in default headers before a descriptor reaches the orchestrator
#[derive(Clone)]
pub struct DescriptorComposer {
    user_agent: String,
    token: Arc<dyn TokenProvider>,
}

impl DescriptorComposer {
    pub fn new(config: &NetworkConfig, token: Arc<dyn TokenProvider>) -> Self {
        Self {
            user_agent: config.user_agent(),
            token,
        }
    }

    /// Builds the descriptor for `endpoint`
    ///
    /// Headers the endpoint sets itself are never overwritten.
    pub fn compose<E: Endpoint + ?Sized>(&self, endpoint: &E) -> EndpointDescriptor {
        let mut descriptor = EndpointDescriptor::from_endpoint(endpoint);
        let is_upload = descriptor
            .upload_files
            .as_ref()
            .is_some_and(|files| !files.is_empty());

        let mut defaults = Vec::with_capacity(3);
        if !is_upload {
            defaults.push((CONTENT_TYPE, "application/json".to_string()));
        }
        defaults.push((USER_AGENT, self.user_agent.clone()));
        if let Some(token) = self.token.token() {
            defaults.push((AUTHORIZATION, format!("Bearer {}", token)));
        }

        for (name, value) in defaults {
            if descriptor.headers.contains_key(&name) {
                continue;
            }
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    descriptor.headers.insert(name, value);
                }
                Err(e) => log::warn!("Skipping default header {}: {}", name, e),
            }
        }

        descriptor
    }
}

impl fmt::Debug for DescriptorComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorComposer")
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    enum UserApi {
        Profile,
        Login { user: String },
        Avatar(Vec<u8>),
        Export(PathBuf),
    }

    impl Endpoint for UserApi {
        fn base_url(&self) -> String {
            "https://api.example.com/".to_string()
        }

        fn path(&self) -> String {
            match self {
                UserApi::Profile => "/user/profile",
                UserApi::Login { .. } => "/user/login",
                UserApi::Avatar(_) => "/user/avatar",
                UserApi::Export(_) => "/user/export",
            }
            .to_string()
        }

        fn method(&self) -> Method {
            match self {
                UserApi::Profile | UserApi::Export(_) => Method::GET,
                _ => Method::POST,
            }
        }

        fn parameters(&self) -> Option<Parameters> {
            match self {
                UserApi::Login { user } => json!({ "user": user }).as_object().cloned(),
                _ => None,
            }
        }

        fn upload_files(&self) -> Option<Vec<UploadFile>> {
            match self {
                UserApi::Avatar(data) => Some(vec![UploadFile::from_bytes(
                    data.clone(),
                    "avatar",
                    "avatar.png",
                    "image/png",
                )]),
                _ => None,
            }
        }

        fn download_destination(&self) -> Option<DownloadDestination> {
            match self {
                UserApi::Export(dir) => Some(default_download_destination(dir.clone(), None)),
                _ => None,
            }
        }
    }

    fn composer(token: Option<&str>) -> DescriptorComposer {
        let config = NetworkConfig {
            platform: "iOS".to_string(),
            os_version: "17.4".to_string(),
            app_version: "2.3.1".to_string(),
            ..Default::default()
        };
        let token = match token {
            Some(t) => StaticToken::new(t),
            None => StaticToken::none(),
        };
        DescriptorComposer::new(&config, Arc::new(token))
    }

    #[test]
    fn test_url_joining() {
        let descriptor = composer(None).compose(&UserApi::Profile);
        assert_eq!(descriptor.url_string(), "https://api.example.com/user/profile");
        assert!(descriptor.url().is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let descriptor = EndpointDescriptor::new("not a url", "x", Method::GET);
        assert!(descriptor.url().is_err());
    }

    #[test]
    fn test_default_headers() {
        let descriptor = composer(Some("abc")).compose(&UserApi::Profile);
        let headers = descriptor.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[USER_AGENT], "iOS/17.4 App/2.3.1");
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
    }

    #[test]
    fn test_no_token_no_authorization() {
        let descriptor = composer(None).compose(&UserApi::Profile);
        assert!(!descriptor.headers().contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_endpoint_headers_win() {
        struct Custom;
        impl Endpoint for Custom {
            fn base_url(&self) -> String {
                "https://api.example.com".to_string()
            }
            fn path(&self) -> String {
                "feed".to_string()
            }
            fn method(&self) -> Method {
                Method::GET
            }
            fn headers(&self) -> HeaderMap {
                let mut headers = HeaderMap::new();
                headers.insert(USER_AGENT, HeaderValue::from_static("custom/1"));
                headers
            }
        }

        let descriptor = composer(None).compose(&Custom);
        assert_eq!(descriptor.headers()[USER_AGENT], "custom/1");
    }

    #[test]
    fn test_task_shapes() {
        let c = composer(None);
        assert!(matches!(c.compose(&UserApi::Profile).task(), Task::Plain));
        assert!(matches!(
            c.compose(&UserApi::Login { user: "a".into() }).task(),
            Task::Parameters(_)
        ));

        let upload = c.compose(&UserApi::Avatar(vec![1, 2, 3]));
        assert!(matches!(upload.task(), Task::Upload(ref files) if files.len() == 1));
        assert!(!upload.headers().contains_key(CONTENT_TYPE));

        let download = c.compose(&UserApi::Export(PathBuf::from("/tmp")));
        assert!(matches!(download.task(), Task::Download { resume_data: None, .. }));
    }

    #[test]
    fn test_upload_file_name_defaults_to_path() {
        let file = UploadFile::from_path("/var/data/report.pdf", "doc", None, "application/pdf");
        assert_eq!(file.file_name, "report.pdf");
        assert_eq!(file.path(), Some(Path::new("/var/data/report.pdf")));
    }

    #[test]
    fn test_shared_token() {
        let token = SharedToken::new();
        assert_eq!(token.token(), None);
        token.set("t1");
        assert_eq!(token.token().as_deref(), Some("t1"));
        token.clear();
        assert_eq!(token.token(), None);
    }

    #[test]
    fn test_default_destination_leaves_filesystem_alone() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("Downloads");
        let meta = ResponseMeta {
            status: 200,
            url: Url::parse("https://cdn.example.com/files/book.epub").unwrap(),
            headers: HeaderMap::new(),
        };

        let destination = default_download_destination(&downloads, None);
        let target = destination(Path::new("/tmp/x.part"), &meta);
        assert_eq!(target.path, downloads.join("book.epub"));
        assert!(target.options.remove_previous_file);
        assert!(target.options.create_intermediate_directories);
        assert!(!downloads.exists());

        let named = default_download_destination(&downloads, Some("mine.epub".to_string()));
        assert_eq!(named(Path::new("/tmp/x.part"), &meta).path, downloads.join("mine.epub"));
    }
}
