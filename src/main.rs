// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Entry point.
//!
//! ```text
//! cli::parse() --> Config --> Logging --> Ctrl+C listener
//!   --> BackupOrchestrator::run()
//!         Ok(report)  --> exit 0 (completed or cancelled)
//!         Err(e)      --> exit e.exit_code()
//! ```

use std::process::ExitCode;

use gbak::backup::BackupOrchestrator;
use gbak::cancel::Cancellation;
use gbak::cli::{self, Cli};
use gbak::config::Config;
use gbak::error::{ConfigError, EXIT_CONFIG, Result};
use gbak::logging::{LogConfig, LogLevel, init_logging};
use gbak::net::RateLimitedClient;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            if e.downcast_ref::<ConfigError>().is_some() {
                return ExitCode::from(EXIT_CONFIG);
            }
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_logging(&build_log_config(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    run_backup(&cli, config).await
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut loader = Config::builder();
    if let Some(path) = &cli.config {
        loader = loader.add_toml_file(path);
    }
    loader = loader.with_env_prefix("GBAK");
    if let Some(level) = cli.log_level {
        loader = loader.set("log.level", i64::from(level))?;
    }
    if let Some(path) = &cli.log_file {
        loader = loader.set("log.file", path.display().to_string())?;
    }
    loader.build()
}

fn build_log_config(config: &Config) -> LogConfig {
    LogConfig::builder()
        .with_console_level(config.log.level)
        .maybe_with_log_file(config.log.file.clone())
        .with_show_target(config.log.level >= LogLevel::DEBUG)
        .build()
}

async fn run_backup(cli: &Cli, config: Config) -> ExitCode {
    let cancel = Cancellation::new();
    let listener = cancel.listen_for_ctrl_c();

    let client = match RateLimitedClient::new(
        &config.api,
        config.rate_limit.policy(),
        cli.token.clone(),
        cancel,
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let orchestrator = BackupOrchestrator::new(client, config.api, cli.backup_options());
    let result = orchestrator.run().await;
    listener.abort();

    match result {
        Ok(_report) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
