// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Branch archive download.
//!
//! ```text
//! fetch(task)
//!   GET {archive}/{account}/{repo}/archive/refs/heads/{branch}.{zip|tar.gz}
//!     via RateLimitedClient (quota check, status check)
//!        |
//!        v
//!   stream chunks --> {session}/{repo}_{branch}.{ext}   (create_new)
//!        |
//!   error mid-stream --> PartialFileGuard removes the file
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::DownloadTask;
use crate::error::{FsError, GbakResult, NetworkError};
use crate::github::with_segments;
use crate::net::RateLimitedClient;

/// Archive format requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    #[default]
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// File extension, also the URL suffix.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Progress display style for downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressDisplay {
    /// Bar when the size is known, spinner otherwise.
    #[default]
    Bar,
    /// No visual progress.
    Silent,
}

/// Encode a branch name for use inside a file name.
///
/// `%`, `/` and `\` are percent-encoded so the mapping stays injective.
#[must_use]
pub fn file_safe(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    out
}

/// `{session_dir}/{repo}_{branch}.{ext}`
#[must_use]
pub fn archive_path(
    session_dir: &Path,
    repository: &str,
    branch: &str,
    format: ArchiveFormat,
) -> PathBuf {
    session_dir.join(format!(
        "{}_{}.{}",
        file_safe(repository),
        file_safe(branch),
        format.extension()
    ))
}

/// `{archive_base}/{account}/{repo}/archive/refs/heads/{branch}.{ext}`
///
/// Slashes in `branch` stay path separators.
///
/// # Errors
///
/// Returns `NetworkError::InvalidUrl` if `archive_base` cannot be a base URL.
pub fn archive_url(
    archive_base: &Url,
    account: &str,
    repository: &str,
    branch: &str,
    format: ArchiveFormat,
) -> GbakResult<Url> {
    let file = format!("{branch}.{}", format.extension());
    let segments = [account, repository, "archive", "refs", "heads"]
        .into_iter()
        .chain(file.split('/'));
    with_segments(archive_base, segments)
}

fn bar_style() -> ProgressStyle {
    static STYLE: OnceLock<ProgressStyle> = OnceLock::new();
    STYLE
        .get_or_init(|| {
            ProgressStyle::with_template(
                "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} @ {binary_bytes_per_sec}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        })
        .clone()
}

fn spinner_style() -> ProgressStyle {
    static STYLE: OnceLock<ProgressStyle> = OnceLock::new();
    STYLE
        .get_or_init(|| {
            ProgressStyle::with_template("{spinner:.green} {msg} {bytes} @ {binary_bytes_per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        })
        .clone()
}

/// Removes a partially written archive on Drop unless kept.
struct PartialFileGuard {
    path: PathBuf,
    keep: bool,
}

impl PartialFileGuard {
    const fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    const fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Downloads branch archives of one account in one format.
pub struct ArchiveFetcher<'a> {
    client: &'a RateLimitedClient,
    archive_base: Url,
    account: String,
    format: ArchiveFormat,
    progress: ProgressDisplay,
}

impl<'a> ArchiveFetcher<'a> {
    #[must_use]
    pub fn new(
        client: &'a RateLimitedClient,
        archive_base: Url,
        account: impl Into<String>,
        format: ArchiveFormat,
    ) -> Self {
        Self {
            client,
            archive_base,
            account: account.into(),
            format,
            progress: ProgressDisplay::default(),
        }
    }

    #[must_use]
    pub const fn with_progress(mut self, progress: ProgressDisplay) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Archive URL for `repository`/`branch`.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if the archive base cannot carry a path.
    pub fn url_for(&self, repository: &str, branch: &str) -> GbakResult<Url> {
        archive_url(&self.archive_base, &self.account, repository, branch, self.format)
    }

    fn create_progress_bar(&self, total_size: u64, label: String) -> Option<ProgressBar> {
        let pb = match self.progress {
            ProgressDisplay::Silent => return None,
            ProgressDisplay::Bar if total_size > 0 => {
                let pb = ProgressBar::new(total_size);
                pb.set_style(bar_style());
                pb
            }
            ProgressDisplay::Bar => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(spinner_style());
                pb
            }
        };
        pb.set_message(label);
        Some(pb)
    }

    /// Download the archive of `task` to `task.destination`.
    ///
    /// The body is written unmodified. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `NetworkError` if the request or the body transfer fails.
    /// - `FsError::Write` if the file exists or cannot be written.
    /// - `GbakError::Cancelled` if cancellation interrupts a backoff; nothing
    ///   is written in that case.
    pub async fn fetch(&self, task: &DownloadTask) -> GbakResult<u64> {
        let url = self.url_for(&task.repository, &task.branch)?;
        let response = self.client.perform(&url, HeaderMap::new()).await?;

        let total_size = response.content_length().unwrap_or(0);
        let output = &task.destination;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(output)
            .await
            .map_err(|e| FsError::write(output, e))?;

        // Removes the partial file on any error path below
        let mut guard = PartialFileGuard::new(output.clone());

        let progress_bar = self.create_progress_bar(
            total_size,
            crate::logging::fetch_line("Fetching", &task.repository, &task.branch),
        );

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if let Some(pb) = &progress_bar {
                    pb.abandon_with_message("failed");
                }
                NetworkError::from_reqwest(url.as_str(), &e)
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FsError::write(output, e))?;
            written += chunk.len() as u64;

            if let Some(pb) = &progress_bar {
                pb.inc(chunk.len() as u64);
            }
        }

        file.flush().await.map_err(|e| FsError::write(output, e))?;
        guard.keep();

        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        debug!(path = %output.display(), bytes = written, "archive written");
        Ok(written)
    }
}
