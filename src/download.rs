//! HTTP downloads of third-party artifacts.
//!
//! Artifacts are fetched over HTTPS, optionally checked against a pinned
//! SHA-256, and placed at their final path with a rename so a reader never
//! sees a half-written file.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use sha2::Digest as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP client with bounded retries
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    attempts: u32,
}

impl Downloader {
    /// Build a client from configuration
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("macprov/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("building HTTP client: {e}"))?;

        Ok(Self {
            client,
            attempts: config.retries.max(1),
        })
    }

    /// Fetch a URL into memory, retrying transport and server errors
    pub async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, DownloadError> {
        let parsed = validate_url(url)?;
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            log::info!("Downloading {} (attempt {}/{})", url, attempt, self.attempts);

            match self.fetch_once(parsed.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::warn!("Download of {} failed: {}", url, e);
                    let retryable = e.status().is_none_or(|s| s.is_server_error());
                    last_error = e.to_string();
                    if !retryable {
                        return Err(DownloadError::RequestFailed {
                            url: url.to_string(),
                            attempts: attempt,
                            reason: last_error,
                        });
                    }
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(Duration::from_secs(2 * u64::from(attempt))).await;
            }
        }

        Err(DownloadError::RequestFailed {
            url: url.to_string(),
            attempts: self.attempts,
            reason: last_error,
        })
    }

    async fn fetch_once(&self, url: url::Url) -> std::result::Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download `url` to `dest`, replacing any previous copy
    pub async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<PathBuf> {
        let data = self.fetch(url).await?;
        if let Some(expected) = expected_sha256 {
            verify_sha256(url, &data, expected).await?;
        }
        place_atomically(&data, dest).await?;
        log::info!("Saved {} ({} bytes)", dest.display(), data.len());
        Ok(dest.to_path_buf())
    }
}

/// Only HTTPS URLs are accepted
pub fn validate_url(url: &str) -> std::result::Result<url::Url, DownloadError> {
    let parsed = url::Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "https" {
        return Err(DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme '{}' is not https", parsed.scheme()),
        });
    }
    Ok(parsed)
}

/// Compare data against a hex SHA-256, case-insensitively.
///
/// Hashing runs on the blocking pool; disk images are large.
pub async fn verify_sha256(
    url: &str,
    data: &[u8],
    expected: &str,
) -> std::result::Result<(), DownloadError> {
    let data = data.to_vec();
    let actual = tokio::task::spawn_blocking(move || hex::encode(sha2::Sha256::digest(&data)))
        .await
        .map_err(|e| DownloadError::RequestFailed {
            url: url.to_string(),
            attempts: 1,
            reason: format!("hash task failed: {e}"),
        })?;

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            url: url.to_string(),
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

/// Path an artifact must live at when its name is its identifier
pub fn artifact_path(dir: &Path, id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{id}.{extension}"))
}

/// Write to a sibling temp file, then rename over `dest`
pub async fn place_atomically(data: &[u8], dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, data).await?;
    if let Err(e) = tokio::fs::rename(&partial, dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    Ok(())
}
