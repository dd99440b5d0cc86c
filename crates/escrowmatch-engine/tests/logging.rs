//! Integration test: global logging setup.
//!
//! Lives in its own binary because it installs the process-wide subscriber.

use escrowmatch_engine::logging::init_logging;
use escrowmatch_types::EscrowMatchError;

#[test]
fn init_logging_installs_once() {
    init_logging(true, true).unwrap();
    tracing::info!(target: "escrowmatch_engine", check = "json", "Logging initialised");

    assert!(matches!(
        init_logging(false, false).unwrap_err(),
        EscrowMatchError::Configuration(msg) if msg.starts_with("logging")
    ));
}
