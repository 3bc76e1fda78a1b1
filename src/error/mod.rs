// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Error handling module.
//!
//! ```text
//!               GbakError (16 bytes)
//!                      |
//!   +--------+--------+--------+-----------+
//!   |        |        |        |           |
//!   v        v        v        v           v
//! Config    Fs     Network  Invalid     Cancelled
//!  Box      Box      Box    Response    (not a failure)
//!                             Box
//!
//! Sub-errors:
//!   Config          InvalidDestination, InvalidValue
//!   Fs              SessionExists, CreateDir, Write
//!   Network         Connection, Timeout, TooManyRedirects, HttpStatus
//!   InvalidResponse url + message
//!
//! exit_code(): Config=2  Fs=3  Network=4  InvalidResponse=5
//! ```

use std::path::Path;

use thiserror::Error;

/// Convenience alias for `anyhow::Result`.
pub type Result<T> = anyhow::Result<T>;

/// Process exit status for configuration failures.
pub const EXIT_CONFIG: u8 = 2;

/// Result type using [`GbakError`].
pub type GbakResult<T> = std::result::Result<T, GbakError>;

/// Top-level error type for a backup run.
///
/// All sub-errors are boxed to keep this enum at 16 bytes on the stack.
#[derive(Debug, Error)]
pub enum GbakError {
    /// Invalid configuration or destination.
    #[error("config error: {0}")]
    Config(#[from] Box<ConfigError>),

    /// Filesystem operation failed.
    #[error("filesystem error: {0}")]
    Fs(#[from] Box<FsError>),

    /// Network operation failed.
    #[error("network error: {0}")]
    Network(#[from] Box<NetworkError>),

    /// The API answered with something other than the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] Box<InvalidResponseError>),

    /// Cancellation was observed while waiting. Callers unwind on this
    /// and report a partial, successful run.
    #[error("cancelled")]
    Cancelled,
}

impl GbakError {
    /// Process exit status for this error.
    ///
    /// Cancellation is a normal outcome and maps to 0.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled => 0,
            Self::Config(_) => EXIT_CONFIG,
            Self::Fs(_) => 3,
            Self::Network(_) => 4,
            Self::InvalidResponse(_) => 5,
        }
    }

    /// Returns true for the cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// --- From implementations for boxing ---

/// Macro to generate `From` implementations that box the source error.
macro_rules! impl_from_boxed {
    ($($error:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$error> for GbakError {
                fn from(err: $error) -> Self {
                    GbakError::$variant(Box::new(err))
                }
            }
        )+
    };
}

impl_from_boxed! {
    ConfigError => Config,
    FsError => Fs,
    NetworkError => Network,
    InvalidResponseError => InvalidResponse,
}

// --- Config Errors ---

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Destination is missing or not a directory.
    #[error("invalid destination directory: {path}")]
    InvalidDestination { path: String },

    /// Invalid configuration value.
    #[error("invalid value for '{key}' in section '[{section}]': {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}

// --- Filesystem Errors ---

/// Filesystem operation errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// The session directory for this timestamp already exists.
    #[error("session directory already exists: {path}")]
    SessionExists { path: String },

    /// Failed to create a directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an archive.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub(crate) fn create_dir(path: &Path, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.display().to_string(),
            source,
        }
    }
}

// --- Network Errors ---

/// Network operation errors. None of them are retried.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Could not connect, or the connection broke mid-transfer.
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The request timed out.
    #[error("request timed out: {url}")]
    Timeout { url: String },

    /// The redirect limit was exceeded.
    #[error("too many redirects: {url}")]
    TooManyRedirects { url: String },

    /// Non-success HTTP status. The body carries the service's error detail.
    #[error("http error {status}: {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// URL could not be built.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl NetworkError {
    /// Classify a `reqwest` failure for `url`.
    #[must_use]
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_redirect() {
            Self::TooManyRedirects { url }
        } else if err.is_body() || err.is_decode() {
            Self::Connection {
                url,
                message: format!("transfer interrupted: {err}"),
            }
        } else {
            Self::Connection {
                url,
                message: err.to_string(),
            }
        }
    }
}

// --- Response Errors ---

/// The API response did not match the expected schema.
#[derive(Debug, Error)]
#[error("unexpected response from {url}: {message}")]
pub struct InvalidResponseError {
    pub url: String,
    pub message: String,
}
