use std::path::{Path, PathBuf};

use log::{debug, info};
use tokio::io::AsyncWriteExt;

use embedpack_core::BuildConfig;

use crate::index::WheelRef;

const RUNTIME_ARCHIVE_URL: &str = "https://www.python.org/ftp/python";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build download client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} failed with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// On-disk download cache rooted at the configured cache directory.
///
/// Entries are keyed by file name. The pipeline never deletes an entry;
/// validity rules differ per asset kind (see the `ensure_*` methods).
pub struct AssetCache {
    client: reqwest::Client,
    root: PathBuf,
}

impl AssetCache {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("embedpack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self {
            client,
            root: root.into(),
        })
    }

    /// Fetch the upstream embeddable archive for the configured release.
    /// Presence of the cached file is sufficient proof of validity.
    ///
    /// # Errors
    /// Returns an error if the download or the cache write fails.
    pub async fn ensure_runtime_archive(
        &self,
        config: &BuildConfig,
    ) -> Result<PathBuf, FetchError> {
        let file_name = config.archive_file_name();
        let local = self.root.join(&file_name);
        if local.exists() {
            debug!("runtime archive cached: {}", local.display());
            return Ok(local);
        }

        let url = format!("{RUNTIME_ARCHIVE_URL}/{}/{file_name}", config.version);
        info!("fetching runtime archive {url}");
        self.download_to(&url, &local).await?;
        Ok(local)
    }

    /// Fetch a bootstrap script. A cached copy is reused only when the
    /// remote HEAD probe's declared `Content-Length` equals the local file
    /// size; on mismatch the entry is overwritten.
    ///
    /// # Errors
    /// Returns an error if the HEAD probe, the download, or the cache write
    /// fails.
    pub async fn ensure_bootstrap_script(
        &self,
        url: &str,
        file_name: &str,
    ) -> Result<PathBuf, FetchError> {
        let local = self.root.join(file_name);
        if local.exists() {
            let local_len = std::fs::metadata(&local)
                .map_err(|e| FetchError::io_with_path("failed to stat cached script", &local, &e))?
                .len();
            let remote_len = self.remote_content_length(url).await?;
            if cached_copy_current(local_len, remote_len) {
                debug!("bootstrap script cached and current: {}", local.display());
                return Ok(local);
            }
            info!("bootstrap script stale (local {local_len} bytes, remote {remote_len:?}), refetching");
        }

        info!("fetching bootstrap script {url}");
        self.download_to(url, &local).await?;
        Ok(local)
    }

    /// Fetch a wheel file resolved from the package index. Wheel file names
    /// embed their version, so presence of the cached file is sufficient.
    ///
    /// # Errors
    /// Returns an error if the download or the cache write fails.
    pub async fn ensure_wheel(&self, wheel: &WheelRef) -> Result<PathBuf, FetchError> {
        let local = self.root.join(&wheel.file_name);
        if local.exists() {
            debug!("wheel cached: {}", local.display());
            return Ok(local);
        }

        info!("fetching wheel {}", wheel.file_name);
        self.download_to(&wheel.url, &local).await?;
        Ok(local)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn remote_content_length(&self, url: &str) -> Result<Option<u64>, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        use futures_util::StreamExt;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .map_err(|e| FetchError::io_with_path("failed to create cache directory", parent, &e))?;

        // Stream into a sibling temp file and rename only once the body is
        // complete: the `ensure_*` methods treat presence at the final path
        // as validity, so a truncated download must never land there.
        let temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FetchError::io_with_path("failed to create temp download file", parent, &e))?;
        let mut file = tokio::fs::File::create(temp.path())
            .await
            .map_err(|e| FetchError::io_with_path("failed to open temp download file", temp.path(), &e))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::request(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io_with_path("failed to write cache file", dest, &e))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| FetchError::io_with_path("failed to flush cache file", dest, &e))?;
        drop(file);

        temp.persist(dest)
            .map_err(|e| FetchError::io_with_path("failed to persist cache file", dest, &e.error))?;

        debug!("downloaded {downloaded} bytes to {}", dest.display());
        Ok(())
    }
}

/// A cached bootstrap script counts as current only when the remote probe
/// declared a length and it matches the local size. A missing header forces
/// a refetch.
fn cached_copy_current(local_len: u64, remote_len: Option<u64>) -> bool {
    remote_len == Some(local_len)
}
