// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Backup orchestration.
//!
//! ```text
//! BackupOrchestrator::run()
//!   Init       destination is a dir?          no --> ConfigError
//!              timestamp (once), mkdir ts/    exists --> FsError
//!   Enumerate  repositories, branch sets      --> Vec<DownloadTask>
//!   Fetch      for task in order:
//!                cancelled? --> stop, Cancelled
//!                ArchiveFetcher::fetch --> bytes_total += n
//!   Finalize   BackupReport (Completed | Cancelled), exit 0
//! ```
//!
//! Strictly sequential. Any error ends the run; cancellation does not.

pub mod archive;
pub mod session;


use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use indicatif::HumanBytes;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{GbakError, GbakResult};
use crate::github::{Branch, Repository, RepositoryEnumerator, parse_base};
use crate::logging::fetch_line;
use crate::net::RateLimitedClient;

pub use archive::{ArchiveFetcher, ArchiveFormat, ProgressDisplay, archive_path, archive_url};
pub use session::BackupSession;

/// One archive to download. Derived, never persisted, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub repository: String,
    pub branch: String,
    pub destination: PathBuf,
}

/// One task per branch of `repository`, in branch order.
#[must_use]
pub fn plan_tasks(
    session_dir: &Path,
    format: ArchiveFormat,
    repository: &Repository,
    branches: &[Branch],
) -> Vec<DownloadTask> {
    branches
        .iter()
        .map(|branch| DownloadTask {
            repository: repository.name.clone(),
            branch: branch.name.clone(),
            destination: archive_path(session_dir, &repository.name, &branch.name, format),
        })
        .collect()
}

/// What the user asked for.
#[derive(Debug, Clone, Builder)]
pub struct BackupOptions {
    /// Account whose repositories are backed up.
    #[builder(into)]
    pub account: String,
    /// Existing directory receiving the session directory.
    #[builder(into)]
    pub destination: PathBuf,
    /// Every branch instead of the default branch only.
    #[builder(default)]
    pub all_branches: bool,
    #[builder(default)]
    pub format: ArchiveFormat,
    #[builder(default)]
    pub progress: ProgressDisplay,
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct BackupReport {
    pub outcome: Outcome,
    pub timestamp: String,
    pub session_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub bytes_total: u64,
    pub elapsed: Duration,
}

impl BackupReport {
    fn from_session(session: BackupSession, outcome: Outcome) -> Self {
        let elapsed = session.elapsed();
        Self {
            outcome,
            timestamp: session.timestamp().to_string(),
            session_dir: session.session_dir().to_path_buf(),
            bytes_total: session.bytes_total(),
            files: session.files().to_vec(),
            elapsed,
        }
    }

    /// `Backup completed: 1.50 MiB written to /dest/ts in 0.3 minutes`
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = match self.outcome {
            Outcome::Completed => "completed",
            Outcome::Cancelled => "cancelled",
        };
        format!(
            "Backup {verb}: {} written to {} in {:.1} minutes",
            HumanBytes(self.bytes_total),
            self.session_dir.display(),
            self.elapsed.as_secs_f64() / 60.0
        )
    }
}

/// Sequences enumeration and downloads for one session.
pub struct BackupOrchestrator {
    client: RateLimitedClient,
    api: ApiConfig,
    options: BackupOptions,
}

impl BackupOrchestrator {
    #[must_use]
    pub const fn new(client: RateLimitedClient, api: ApiConfig, options: BackupOptions) -> Self {
        Self {
            client,
            api,
            options,
        }
    }

    /// Run the whole backup.
    ///
    /// Cancellation is not an error: the report carries
    /// [`Outcome::Cancelled`] and every file written so far is kept.
    ///
    /// # Errors
    ///
    /// - `ConfigError` if the destination is not a directory (no request is made).
    /// - `FsError` if the session directory exists or a write fails.
    /// - `NetworkError` / `InvalidResponseError` from enumeration or download.
    pub async fn run(&self) -> GbakResult<BackupReport> {
        let mut session =
            BackupSession::start(&self.options.destination, self.client.is_authenticated())?;

        info!(
            "Starting backup of {}'s {}GitHub repositories at {}",
            self.options.account,
            if session.is_authenticated() { "" } else { "public " },
            session.timestamp()
        );

        let tasks = match self.enumerate(&session).await {
            Ok(tasks) => tasks,
            Err(GbakError::Cancelled) => return Ok(finish(session, Outcome::Cancelled)),
            Err(e) => return Err(e),
        };

        let outcome = self.fetch_all(&tasks, &mut session).await?;
        Ok(finish(session, outcome))
    }

    async fn enumerate(&self, session: &BackupSession) -> GbakResult<Vec<DownloadTask>> {
        let account = self.options.account.as_str();
        let enumerator = RepositoryEnumerator::new(&self.client, &self.api)?;
        let repositories = enumerator.list_repositories(account).await?;
        info!(count = repositories.len(), "Found repositories");

        let mut tasks = Vec::with_capacity(repositories.len());
        for repository in &repositories {
            if self.client.cancellation().is_requested() {
                return Err(GbakError::Cancelled);
            }
            let branches = enumerator
                .branches_for(account, repository, self.options.all_branches)
                .await?;
            tasks.extend(plan_tasks(
                session.session_dir(),
                self.options.format,
                repository,
                &branches,
            ));
        }
        Ok(tasks)
    }

    async fn fetch_all(
        &self,
        tasks: &[DownloadTask],
        session: &mut BackupSession,
    ) -> GbakResult<Outcome> {
        let archive_base = parse_base(&self.api.archive_url)?;
        let fetcher = ArchiveFetcher::new(
            &self.client,
            archive_base,
            self.options.account.clone(),
            self.options.format,
        )
        .with_progress(self.options.progress);

        for task in tasks {
            if self.client.cancellation().is_requested() {
                info!("Cancellation requested, skipping remaining archives");
                return Ok(Outcome::Cancelled);
            }

            let bytes = match fetcher.fetch(task).await {
                Ok(bytes) => bytes,
                Err(GbakError::Cancelled) => return Ok(Outcome::Cancelled),
                Err(e) => return Err(e),
            };
            info!(
                "{} ({})",
                fetch_line("Saved", &task.repository, &task.branch),
                HumanBytes(bytes)
            );
            session.record(task.destination.clone(), bytes);
        }
        Ok(Outcome::Completed)
    }
}

fn finish(session: BackupSession, outcome: Outcome) -> BackupReport {
    let report = BackupReport::from_session(session, outcome);
    info!(
        timestamp = %report.timestamp,
        files = report.files.len(),
        bytes = report.bytes_total,
        "{}",
        report.summary()
    );
    report
}
