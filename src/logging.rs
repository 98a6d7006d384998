//! Tracing setup (SPEC_FULL.md §2.1)
//!
//! Structured, leveled logging around each pipeline stage: trial acceptance/rejection,
//! clause suspension skips, per-path query execution, cache hit/miss counters, worker
//! lifecycle, and error escalation are emitted as `tracing` events from the modules that
//! own them (`engine.rs`, `clause.rs`, `pool.rs`). This module only wires the subscriber.

use crate::config::RuntimeConfig;
use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber from `runtime`'s level/format knobs.
/// `verbose` raises the configured level by one step, matching the CLI's `-v` flag.
pub fn init_logging(runtime: &RuntimeConfig, verbose: bool) {
    let level = raise_one_step(&runtime.log_level, verbose);
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match runtime.log_format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}

fn raise_one_step(level: &str, verbose: bool) -> String {
    if !verbose {
        return level.to_string();
    }
    match level.to_lowercase().as_str() {
        "error" => "warn",
        "warn" => "info",
        "info" => "debug",
        "debug" => "trace",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_level_by_one_step() {
        assert_eq!(raise_one_step("info", true), "debug");
        assert_eq!(raise_one_step("trace", true), "trace");
    }

    #[test]
    fn non_verbose_leaves_level_unchanged() {
        assert_eq!(raise_one_step("warn", false), "warn");
    }
}
