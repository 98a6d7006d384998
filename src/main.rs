//! Matching engine CLI binary.
//!
//! Parses the CLI surface, loads configuration, constructs the database handle, and
//! drives [`matchengine::find_matches`] to completion, streaming a summary of emitted
//! matches to stdout. A `Ctrl-C` trips the shared [`Cancellation`] token so in-flight
//! workers drain without emitting partial results (§5).

use clap::Parser;
use matchengine::cancellation::Cancellation;
use matchengine::cli::Cli;
use matchengine::config::Config;
use matchengine::db::InMemoryDatabase;
use matchengine::logging::init_logging;
use matchengine::trial_match::flatten_trial_match;
use matchengine::{find_matches, Config as MatchEngineConfig, MatchEngineError};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("fatal: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.runtime, cli.verbose);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "matching run failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<MatchEngineConfig, MatchEngineError> {
    match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load().or_else(|_| Ok(Config::default())),
    }
}

/// No networked document-store driver is shipped (§6 — out of scope); the binary wires
/// the in-memory fake so `--dry-run`-style invocations and the test suite have a
/// concrete `Database` to drive against. A production deployment supplies its own
/// `Database` impl over the configured `config.database` connection settings.
async fn run(cli: Cli, config: MatchEngineConfig) -> Result<(), MatchEngineError> {
    let db = Arc::new(InMemoryDatabase::new(Vec::new(), Vec::new(), Vec::new()));
    let request = cli.to_request();
    let cancellation = Cancellation::new();

    let ctrl_c_cancellation = cancellation.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested, draining in-flight work");
            ctrl_c_cancellation.cancel();
        }
    });

    let mut stream = find_matches(db, &config, &request, cancellation).await?;

    use futures::StreamExt;
    let mut emitted = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(trial_match) => {
                emitted += flatten_trial_match(&trial_match).len();
            }
            Err(err) => {
                tracing::warn!(error = %err, "path execution failed");
            }
        }
    }
    println!("emitted {emitted} trial-match document(s)");
    Ok(())
}
