use std::path::{Path, PathBuf};

use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::queue::TaskQueue;
use crate::core::error::{io_at, LauncherError, LauncherResult};
use crate::core::http::ensure_success;

/// A single file to download with optional SHA-1 and size for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl DownloadEntry {
    pub fn new(url: impl Into<String>, dest: PathBuf) -> Self {
        Self {
            url: url.into(),
            dest,
            sha1: None,
            size: None,
        }
    }

    pub fn with_sha1(mut self, sha1: impl Into<String>) -> Self {
        let sha1 = sha1.into();
        self.sha1 = (!sha1.is_empty()).then_some(sha1);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = (size > 0).then_some(size);
        self
    }
}

/// SHA-1 and size validated downloader. Hands work to a [`TaskQueue`].
#[derive(Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Single file download ────────────────────────────

    /// Download a single file, validating SHA-1 and size before writing.
    ///
    /// Creates parent directories as needed and recreates the target on every
    /// attempt, so a retry never appends to a partial file.
    pub async fn download_file(&self, entry: &DownloadEntry) -> LauncherResult<()> {
        let dest = entry.dest.as_path();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_at(parent))?;
        }

        let response = ensure_success(self.client.get(&entry.url).send().await?)?;
        let bytes = response.bytes().await?;

        if let Some(expected) = entry.size {
            if bytes.len() as u64 != expected {
                return Err(LauncherError::SizeMismatch {
                    path: dest.to_path_buf(),
                    expected,
                    actual: bytes.len() as u64,
                });
            }
        }

        if let Some(expected) = entry.sha1.as_deref() {
            let actual = sha1_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        // Scoped so the handle is closed before the task reports success.
        {
            let mut file = tokio::fs::File::create(dest).await.map_err(io_at(dest))?;
            file.write_all(&bytes).await.map_err(io_at(dest))?;
            file.flush().await.map_err(io_at(dest))?;
        }

        debug!("Downloaded: {} -> {:?}", entry.url, dest);
        Ok(())
    }

    // ── Queue integration ───────────────────────────────

    /// Enqueue `entry` as a retryable task on `queue`.
    pub fn enqueue(&self, queue: &TaskQueue, entry: DownloadEntry) {
        let downloader = self.clone();
        queue.add_task(move || {
            let downloader = downloader.clone();
            let entry = entry.clone();
            async move { downloader.download_file(&entry).await }
        });
    }

    /// Whether `path` exists and, when a hash is known, matches it.
    pub async fn is_cached(path: &Path, sha1: Option<&str>) -> LauncherResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        match sha1 {
            Some(expected) if !expected.is_empty() => Self::validate_sha1(path, expected).await,
            _ => Ok(true),
        }
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        let bytes = tokio::fs::read(path).await.map_err(io_at(path))?;
        Ok(sha1_hex(&bytes).eq_ignore_ascii_case(expected))
    }
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
