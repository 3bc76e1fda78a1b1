// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Library root.
//!
//! # Crate Architecture
//!
//! ```text
//!                        main.rs
//!                           |
//!                +----------+----------+
//!                v                     v
//!             cli (clap)        config (TOML, env)
//!                |                     |
//!                +----------+----------+
//!                           v
//!              ,---------------------------,
//!              |          backup           |
//!              |  session, orchestrator,   |
//!              |  archive fetcher          |
//!              '------+-------------+------'
//!                     |             |
//!                     v             v
//!                  github          net
//!              repos/branches  rate-limited GET
//!
//!   +-----------------------------------------+
//!   |  foundation   error, logging, cancel    |
//!   +-----------------------------------------+
//! ```

pub mod backup;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod logging;
pub mod net;
