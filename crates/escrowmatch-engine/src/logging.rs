//! Tracing subscriber setup for hosts embedding the engine.
//!
//! `RUST_LOG` wins when set. Otherwise the engine crates log at `info`
//! (`debug` when `verbose`) and everything else at `warn`.

use escrowmatch_types::{EscrowMatchError, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const ENGINE_CRATES: &[&str] = &[
    "escrowmatch_types",
    "escrowmatch_custody",
    "escrowmatch_settlement",
    "escrowmatch_governance",
    "escrowmatch_engine",
];

fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let directives: Vec<String> = ENGINE_CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect();
    EnvFilter::new(format!("{},warn", directives.join(",")))
}

/// Install a global subscriber. `json` switches to one JSON object per line.
///
/// # Errors
/// `Configuration` if a global subscriber is already installed.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
    let installed = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init()
    };
    installed.map_err(|e| EscrowMatchError::Configuration(format!("logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_names_every_engine_crate() {
        let rendered = default_filter(true).to_string();
        for name in ENGINE_CRATES {
            assert!(rendered.contains(&format!("{name}=debug")), "Got: {rendered}");
        }
    }
}
