//! Byte transport for manifests and cube payloads
//!
//! Every remote read goes through a [`ResourceSource`]. [`UriSource`] picks a
//! transport from the URI scheme: `file://` and bare paths read the local
//! filesystem, `http(s)://` uses reqwest when the `http` feature is enabled.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;

use crate::core::{Error, Result};

/// Bytes of one fetched resource with its media type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), content_type: content_type.into() }
    }

    /// Payload typed by the extension of `uri`
    pub fn for_uri(bytes: impl Into<Vec<u8>>, uri: &str) -> Self {
        Self::new(bytes, content_type_for(uri))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fetches resources by URI. Missing resources are [`Error::NotFound`].
pub trait ResourceSource: Send + Sync + 'static {
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Payload>> + Send;
}

impl<S: ResourceSource> ResourceSource for Arc<S> {
    fn fetch(&self, uri: &str) -> impl Future<Output = Result<Payload>> + Send {
        (**self).fetch(uri)
    }
}

/// Fetch and parse a JSON document
pub async fn fetch_json<S, T>(source: &S, uri: &str) -> Result<T>
where
    S: ResourceSource + ?Sized,
    T: DeserializeOwned,
{
    let payload = source.fetch(uri).await?;
    Ok(serde_json::from_slice(&payload.bytes)?)
}

/// Media type guessed from the extension of a path or URL
pub fn content_type_for(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("obj") | Some("mtl") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Resolve `reference` against `base` the way a browser resolves a link:
/// absolute URLs are kept, `/`-rooted paths replace the base path, anything
/// else replaces the last segment of the base path. Dot segments are collapsed.
pub fn resolve_uri(base: &str, reference: &str) -> String {
    if has_scheme(reference) {
        return reference.to_string();
    }

    let base = base.split(['?', '#']).next().unwrap_or(base);
    let (origin, base_path) = split_origin(base);

    let joined = if reference.starts_with('/') {
        reference.to_string()
    } else {
        match base_path.rfind('/') {
            Some(idx) => format!("{}{}", &base_path[..=idx], reference),
            None => reference.to_string(),
        }
    };

    format!("{}{}", origin, normalize_path(&joined))
}

fn has_scheme(uri: &str) -> bool {
    match uri.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Split `scheme://authority` from the path. Bare paths have an empty origin.
fn split_origin(uri: &str) -> (&str, &str) {
    match uri.find("://") {
        Some(idx) => {
            let rest = &uri[idx + 3..];
            let path_start = rest.find('/').map(|p| idx + 3 + p).unwrap_or(uri.len());
            (&uri[..path_start], &uri[path_start..])
        }
        None => ("", uri),
    }
}

fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if trailing && !segments.is_empty() {
        out.push('/');
    }
    out
}

/// Local filesystem path for a `file://` URI or bare path
pub fn file_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    (!has_scheme(uri)).then(|| PathBuf::from(uri))
}

/// `file://` URI for a local path
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Reads `file://` URIs and bare paths with tokio's async filesystem API.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSource;

impl ResourceSource for FileSource {
    async fn fetch(&self, uri: &str) -> Result<Payload> {
        let path = file_path(uri)
            .ok_or_else(|| Error::Transport(format!("not a file URI: {}", uri)))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Payload::for_uri(bytes, uri)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(path.display().to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-memory resources keyed by URI
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: Mutex<HashMap<String, Payload>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, payload: Payload) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.into(), payload);
    }

    /// Insert a JSON document
    pub fn insert_json(&self, uri: impl Into<String>, json: impl Into<String>) {
        self.insert(uri, Payload::new(json.into().into_bytes(), "application/json"));
    }

    pub fn remove(&self, uri: &str) -> Option<Payload> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
    }

    fn get(&self, uri: &str) -> Option<Payload> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }
}

impl ResourceSource for MemorySource {
    async fn fetch(&self, uri: &str) -> Result<Payload> {
        self.get(uri).ok_or_else(|| Error::not_found(uri.to_string()))
    }
}

/// HTTP(S) transport
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "http")]
impl ResourceSource for HttpSource {
    async fn fetch(&self, uri: &str) -> Result<Payload> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", uri, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(uri.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Transport(format!("{}: HTTP {}", uri, status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(uri).to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", uri, e)))?;

        Ok(Payload::new(bytes.to_vec(), content_type))
    }
}

/// Dispatches on the URI scheme. The default transport.
#[derive(Clone, Debug, Default)]
pub struct UriSource {
    file: FileSource,
    #[cfg(feature = "http")]
    http: HttpSource,
}

impl UriSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceSource for UriSource {
    async fn fetch(&self, uri: &str) -> Result<Payload> {
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            #[cfg(feature = "http")]
            return self.http.fetch(uri).await;
            #[cfg(not(feature = "http"))]
            return Err(Error::Transport(format!(
                "{}: built without the `http` feature",
                uri
            )));
        }
        self.file.fetch(uri).await
    }
}
