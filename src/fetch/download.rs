//! Streaming downloads straight to disk

use crate::fetch::{Fetcher, ScopedResponse};
use crate::url::{
    default_file_name, disambiguate, is_usable_file_name, parse_url, sanitize_file_name,
};
use crate::CrawlError;
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Size of each write to disk
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Where and how to store a download
///
/// The client's `read-timeout` bounds the whole request, body included, and
/// only obtaining the response is retried. Large files on slow links need a
/// client with a longer timeout, passed in through [`Fetcher::with_client`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Target directory; the fetcher's download directory when `None`
    pub dir: Option<PathBuf>,

    /// Target filename; derived from the URL path when `None`, blank, `.`
    /// or `..`
    pub file_name: Option<String>,

    /// Write under a new name when the target exists, instead of skipping
    pub allow_duplicate: bool,

    /// Extra request headers
    pub headers: Option<HeaderMap>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: None,
            allow_duplicate: true,
            headers: None,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Skips the download when the target path already exists
    pub fn no_duplicate(mut self) -> Self {
        self.allow_duplicate = false;
        self
    }
}

/// Outcome of a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// False when an existing file was kept and nothing was fetched
    pub written: bool,

    /// Path of the written (or already existing) file
    pub path: PathBuf,
}

impl Fetcher {
    /// Streams the body of `url` into a file
    ///
    /// The target directory is created if needed. If the target path exists,
    /// the call either returns `written: false` without touching the network,
    /// or picks a fresh name by inserting `_` before the extension.
    ///
    /// A failure while writing removes the partial file before the error is
    /// returned; so does dropping the returned future mid-download.
    pub async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<Download, CrawlError> {
        let url = parse_url(url)?;

        let dir = options
            .dir
            .clone()
            .unwrap_or_else(|| self.download_dir.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CrawlError::filesystem(&dir, e))?;

        // A blank, `.` or `..` name would point at a directory, not a file.
        let name = options
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|name| is_usable_file_name(name))
            .unwrap_or_else(|| sanitize_file_name(&default_file_name(&url)));
        let mut path = dir.join(name);

        if exists(&path).await? {
            if !options.allow_duplicate {
                tracing::debug!(path = %path.display(), "already existed, noop");
                return Ok(Download {
                    written: false,
                    path,
                });
            }
            while exists(&path).await? {
                path = disambiguate(&path);
            }
            tracing::warn!(path = %path.display(), "file already existed, renaming new one");
        }

        let mut response = self.open_url(url, options.headers.clone());
        response.start().await?;

        tracing::debug!(url = %response.url(), path = %path.display(), "downloading");
        match write_body(&mut response, &path).await {
            Ok(size) => {
                response.close();
                tracing::debug!(path = %path.display(), bytes = size, "downloaded");
                Ok(Download {
                    written: true,
                    path,
                })
            }
            Err(e) => {
                tracing::warn!(url = %response.url(), error = %e, "failed to download file");
                Err(e)
            }
        }
    }
}

async fn exists(path: &Path) -> Result<bool, CrawlError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| CrawlError::filesystem(path, e))
}

async fn write_body(response: &mut ScopedResponse, path: &Path) -> Result<u64, CrawlError> {
    let url = response.url().clone();
    let body = response
        .response_mut()
        .ok_or_else(|| CrawlError::Usage(format!("response for {} is not open", url)))?;

    let file: File = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| CrawlError::filesystem(path, e))?;

    // Declared before the writer so the file is closed before it is removed.
    let partial = PartialFile::new(path);
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut size = 0u64;

    while let Some(chunk) = body.chunk().await.map_err(|e| CrawlError::http(&url, e))? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| CrawlError::filesystem(path, e))?;
        size += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| CrawlError::filesystem(path, e))?;

    partial.keep();
    Ok(size)
}

/// Removes a file on drop unless it was marked complete
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file")
            }
        }
    }
}
