// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! One backup run: fixed timestamp, fresh directory, byte counter.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{ConfigError, FsError, GbakResult};

/// Format of the session timestamp (local time, microseconds).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// State of a running backup. Owned by the orchestrator.
#[derive(Debug)]
pub struct BackupSession {
    timestamp: String,
    started: Instant,
    destination_root: PathBuf,
    session_dir: PathBuf,
    authenticated: bool,
    bytes_total: u64,
    files: Vec<PathBuf>,
}

impl BackupSession {
    /// Validate `destination_root`, capture the timestamp and create the
    /// session directory.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub fn start(destination_root: &Path, authenticated: bool) -> GbakResult<Self> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::create(destination_root, timestamp, authenticated)
    }

    /// Create the session for an explicit timestamp.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidDestination` if `destination_root` is not a directory.
    /// - `FsError::SessionExists` if `destination_root/timestamp` exists.
    /// - `FsError::CreateDir` for any other creation failure.
    pub fn create(
        destination_root: &Path,
        timestamp: String,
        authenticated: bool,
    ) -> GbakResult<Self> {
        ensure_destination(destination_root)?;

        let session_dir = destination_root.join(&timestamp);
        match std::fs::create_dir(&session_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FsError::SessionExists {
                    path: session_dir.display().to_string(),
                }
                .into());
            }
            Err(e) => return Err(FsError::create_dir(&session_dir, e).into()),
        }

        Ok(Self {
            timestamp,
            started: Instant::now(),
            destination_root: destination_root.to_path_buf(),
            session_dir,
            authenticated,
            bytes_total: 0,
            files: Vec::new(),
        })
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[must_use]
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    #[must_use]
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub const fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Account for a completed download.
    pub fn record(&mut self, path: PathBuf, bytes: u64) {
        self.bytes_total += bytes;
        self.files.push(path);
    }
}

/// # Errors
///
/// Returns `ConfigError::InvalidDestination` unless `path` is an existing directory.
pub fn ensure_destination(path: &Path) -> GbakResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::InvalidDestination {
            path: path.display().to_string(),
        }
        .into())
    }
}
