//! JSON blob storage
//!
//! Drawing versions and change reports live in an object store addressed by
//! `scheme://bucket/path` URIs. The [`BlobStore`] trait hides the backend;
//! [`FsBlobStore`] maps buckets onto directories under a root folder and
//! [`MemoryBlobStore`] keeps everything in process.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

/// Scheme assumed when a configured bucket has none
pub const DEFAULT_SCHEME: &str = "gs";

/// Parsed blob URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUri {
    pub scheme: String,
    pub bucket: String,
    /// Object path inside the bucket (may be empty)
    pub path: String,
}

impl BlobUri {
    /// Parse `scheme://bucket/path`
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::InvalidInput(format!("Blob URI has no scheme: {}", uri)))?;
        if scheme.is_empty() {
            return Err(Error::InvalidInput(format!("Blob URI has no scheme: {}", uri)));
        }

        let (bucket, path) = match rest.split_once('/') {
            Some((bucket, path)) => (bucket, path),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(Error::InvalidInput(format!("Blob URI has no bucket: {}", uri)));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }
}

impl std::fmt::Display for BlobUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.path)
    }
}

/// URI of the stored change report for a job
///
/// `bucket` may be given with or without a scheme (`gs://bt-results` or
/// `bt-results`); trailing slashes are ignored.
pub fn results_uri(bucket: &str, job_id: &str) -> String {
    let bucket = bucket.trim_end_matches('/');
    if bucket.contains("://") {
        format!("{}/results/{}.json", bucket, job_id)
    } else {
        format!("{}://{}/results/{}.json", DEFAULT_SCHEME, bucket, job_id)
    }
}

/// Read/write access to JSON blobs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read and parse the JSON blob at `uri`
    ///
    /// Fails with [`Error::NotFound`] when no blob exists.
    async fn read(&self, uri: &str) -> Result<Value>;

    /// Serialize and store `value` at `uri`, replacing any existing blob
    async fn write(&self, uri: &str, value: &Value) -> Result<()>;
}

/// Filesystem-backed blob store
///
/// `scheme://bucket/path` is stored at `{root}/{bucket}/{path}`; the scheme is
/// not part of the location.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a URI to its file path, rejecting paths that leave the root
    pub fn path_for(&self, uri: &str) -> Result<PathBuf> {
        let parsed = BlobUri::parse(uri)?;
        if parsed.path.is_empty() {
            return Err(Error::InvalidInput(format!("Blob URI has no object path: {}", uri)));
        }

        let relative = Path::new(&parsed.bucket).join(&parsed.path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(Error::InvalidInput(format!("Blob URI escapes storage root: {}", uri)));
        }

        Ok(self.root.join(relative))
    }
}

/// Sibling temp file unique to one write, e.g. `J1.json.<uuid>.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4().simple()))
}

async fn write_then_rename(temp_path: &Path, path: &Path, content: String) -> Result<()> {
    tokio::fs::write(temp_path, content).await?;
    tokio::fs::rename(temp_path, path).await?;
    Ok(())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, uri: &str) -> Result<Value> {
        let path = self.path_for(uri)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(uri.to_string()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        debug!(uri, path = %path.display(), "Read blob");
        Ok(serde_json::from_str(&content)?)
    }

    async fn write(&self, uri: &str, value: &Value) -> Result<()> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a per-call temp file, then rename into place
        let content = serde_json::to_string(value)?;
        let temp_path = temp_path_for(&path);
        if let Err(e) = write_then_rename(&temp_path, &path, content).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(uri, path = %path.display(), "Wrote blob");
        Ok(())
    }
}

/// In-memory blob store keyed by the full URI
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Value>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, uri: &str) -> Result<Value> {
        BlobUri::parse(uri)?;
        self.blobs
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::NotFound(uri.to_string()))
    }

    async fn write(&self, uri: &str, value: &Value) -> Result<()> {
        BlobUri::parse(uri)?;
        self.blobs.write().await.insert(uri.to_string(), value.clone());
        Ok(())
    }
}
