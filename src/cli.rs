//! CLI surface (§6)
//!
//! Thin `clap`-derive wrapper around [`crate::engine::FindMatchesRequest`] plus the
//! ambient flags (`--config`, `-v`/`--verbose`, `--dry-run`) that exist only to drive the
//! binary, not the core.

use crate::engine::FindMatchesRequest;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "matchengine",
    about = "Matches patients against clinical-trial eligibility criteria",
    version
)]
pub struct Cli {
    /// Restrict to these trial protocol numbers. Default: all trials.
    #[arg(long = "trials", value_name = "PROTOCOL_NO", num_args = 1..)]
    pub trials: Vec<String>,

    /// Restrict to these sample ids. Default: all live patients.
    #[arg(long = "samples", value_name = "SAMPLE_ID", num_args = 1..)]
    pub samples: Vec<String>,

    /// Include closed trials and suspended steps/arms/doses.
    #[arg(long)]
    pub match_on_closed: bool,

    /// Include deceased patients when no explicit `--samples` are given.
    #[arg(long)]
    pub match_on_deceased_patients: bool,

    /// Worker pool size. Default: `5 * CPU count` (or the config override).
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Configuration file path. Default: layered `config.toml`/`config.local.toml`/env.
    #[arg(long)]
    pub config: Option<String>,

    /// Raise the log level by one step.
    #[arg(short, long)]
    pub verbose: bool,

    /// Run the pipeline through translation and log the resulting queries without
    /// executing them against the database.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    #[must_use]
    pub fn to_request(&self) -> FindMatchesRequest {
        FindMatchesRequest {
            protocol_nos: (!self.trials.is_empty()).then(|| self.trials.clone()),
            sample_ids: (!self.samples.is_empty()).then(|| self.samples.clone()),
            match_on_closed: self.match_on_closed,
            match_on_deceased: self.match_on_deceased_patients,
            worker_count: self.workers,
            dry_run: self.dry_run,
        }
    }
}
