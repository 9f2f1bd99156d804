// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln` — run a pipeline script against a container backend.

use clap::{Parser, Subcommand};
use kiln_engine::{EnvSecretsManager, Executor, ExecutorConfig, OutputStream};
use kiln_script::FetchConfig;
use kiln_storage::FsStateStore;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kiln", about = "Local-first CI runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pipeline script.
    Run {
        /// Path to the pipeline script.
        script: PathBuf,
        /// Driver DSN, e.g. `native`, `docker`, `k8s://ns?kubeconfig=…`.
        #[arg(long, default_value = "native")]
        driver: String,
        /// Run ID (reuse with --resume to continue an interrupted run).
        #[arg(long)]
        run_id: Option<String>,
        /// Resume: skip completed steps, reattach to running containers.
        #[arg(long)]
        resume: bool,
        /// Directory for durable run state. In-memory when omitted.
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Overall pipeline timeout, e.g. `30s`, `10m`.
        #[arg(long)]
        timeout: Option<String>,
        /// Disable the script's `fetch` API.
        #[arg(long)]
        no_fetch: bool,
        /// Suppress live task output.
        #[arg(long)]
        quiet: bool,
    },
    /// List registered drivers.
    Drivers,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Drivers => {
            for name in kiln_driver::registry::global().names() {
                println!("{}", name);
            }
            ExitCode::SUCCESS
        }
        Command::Run { script, driver, run_id, resume, state_dir, timeout, no_fetch, quiet } => {
            run(script, driver, run_id, resume, state_dir, timeout, no_fetch, quiet).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    script: PathBuf,
    driver: String,
    run_id: Option<String>,
    resume: bool,
    state_dir: Option<PathBuf>,
    timeout: Option<String>,
    no_fetch: bool,
    quiet: bool,
) -> ExitCode {
    let source = match tokio::fs::read_to_string(&script).await {
        Ok(source) => source,
        Err(e) => {
            eprintln!("kiln: cannot read {}: {}", script.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut config = ExecutorConfig::new(driver)
        .resume(resume)
        .secrets(Arc::new(EnvSecretsManager));
    if let Some(id) = run_id {
        config = config.run_id(id);
    }
    if let Some(raw) = timeout {
        match kiln_core::parse_duration(&raw) {
            Ok(duration) => config = config.timeout(duration),
            Err(e) => {
                eprintln!("kiln: invalid --timeout: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(dir) = state_dir {
        match FsStateStore::new(dir).await {
            Ok(store) => config = config.state_store(Arc::new(store)),
            Err(e) => {
                eprintln!("kiln: cannot open state dir: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    if no_fetch {
        config.fetch = Some(FetchConfig { enabled: false, ..FetchConfig::default() });
    }
    if !quiet {
        config = config.output(Arc::new(|stream, chunk| {
            match stream {
                OutputStream::Stdout => {
                    let _ = std::io::stdout().write_all(chunk);
                    let _ = std::io::stdout().flush();
                }
                OutputStream::Stderr => {
                    let _ = std::io::stderr().write_all(chunk);
                    let _ = std::io::stderr().flush();
                }
            }
        }));
    }

    match Executor::new().run(config, &source).await {
        Ok(report) => {
            tracing::info!(run_id = %report.run_id, "pipeline complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("kiln: pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
