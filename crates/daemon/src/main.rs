// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cbd: the certbench agent.

use std::ffi::OsStr;
use std::process::ExitCode;

use cb_daemon::{startup, Config, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cbd: {e}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("cbd: cannot create {}: {e}", config.state_dir.display());
        return ExitCode::from(2);
    }

    let dir = config.log_path.parent().unwrap_or(&config.state_dir);
    let file = config.log_path.file_name().unwrap_or(OsStr::new("agent.log"));
    let (writer, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("CB_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("agent failed: {}", e);
            eprintln!("cbd: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(config: Config) -> Result<(), LifecycleError> {
    let started = startup(&config).await?;
    let shutdown = CancellationToken::new();

    let mut sigterm = signal(SignalKind::terminate())?;
    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = tokio::signal::ctrl_c() => info!("received interrupt"),
        }
        token.cancel();
    });

    started.serve(shutdown).await;
    Ok(())
}
