// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! CLI module using clap derive.
//!
//! ```text
//! gbak [options] <account> <destination>
//!   -a, --all-branches   every branch, not only the default one
//!   -t, --tar-gz         tar.gz instead of zip
//!   -c, --config FILE    TOML configuration
//!   -l, --log-level N    0=off .. 5=trace
//!       --log-file FILE
//!   -q, --quiet          no progress display
//!       --token TOKEN    env GITHUB_PERSONAL_ACCESS_TOKEN
//!   -v, --version
//! ```


use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::backup::{ArchiveFormat, BackupOptions, ProgressDisplay};

/// Environment variable holding the access token.
pub const TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Back up a GitHub account's repositories as branch archives.
#[derive(Debug, Parser)]
#[command(
    name = "gbak",
    version,
    about = "Backup the given user's GitHub repositories.",
    disable_version_flag = true,
    after_help = "Example: gbak myuser ~/backup/\n\n\
                  Set the environment variable GITHUB_PERSONAL_ACCESS_TOKEN for authentication.\n\
                  Authentication is required to access private repositories and to avoid rate limiting.\n\
                  Each run writes <DEST>/<timestamp>/<repository>_<branch>.<zip|tar.gz>."
)]
pub struct Cli {
    /// GitHub user.
    #[arg(value_name = "ACCOUNT")]
    pub account: String,

    /// Destination directory (must exist).
    #[arg(value_name = "DEST")]
    pub destination: PathBuf,

    /// Backup all branches (default: only the default branch).
    #[arg(short = 'a', long = "all-branches")]
    pub all_branches: bool,

    /// Download tar.gz archives (default: zip).
    #[arg(short = 't', long = "tar-gz")]
    pub tar_gz: bool,

    /// Print version.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Path to a TOML configuration file.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Console log level (0=off, 1=errors, 2=warnings, 3=info, 4=debug, 5=trace).
    #[arg(
        short = 'l',
        long = "log-level",
        value_name = "LEVEL",
        value_parser = clap::value_parser!(u8).range(0..=5)
    )]
    pub log_level: Option<u8>,

    /// Also write the log to this file.
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Hide the download progress display.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// GitHub personal access token.
    #[arg(long, value_name = "TOKEN", env = TOKEN_ENV, hide_env_values = true)]
    pub token: Option<String>,
}

impl Cli {
    #[must_use]
    pub const fn format(&self) -> ArchiveFormat {
        if self.tar_gz {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Zip
        }
    }

    #[must_use]
    pub const fn progress(&self) -> ProgressDisplay {
        if self.quiet {
            ProgressDisplay::Silent
        } else {
            ProgressDisplay::Bar
        }
    }

    #[must_use]
    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions::builder()
            .account(self.account.clone())
            .destination(self.destination.clone())
            .all_branches(self.all_branches)
            .format(self.format())
            .progress(self.progress())
            .build()
    }
}

/// Parses command-line arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

/// Tries to parse command-line arguments from an iterator.
///
/// # Errors
///
/// Returns a `clap::Error` if the arguments are invalid or if help/version
/// information was requested.
pub fn try_parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
