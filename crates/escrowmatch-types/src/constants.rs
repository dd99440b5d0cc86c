//! System-wide constants for the EscrowMatch engine.

/// Denominator for basis-point fee rates.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Highest accepted fee rate (100%).
pub const MAX_FEE_RATE_BPS: u32 = BPS_DENOMINATOR;

/// Default fee rate (2.5%).
pub const DEFAULT_FEE_RATE_BPS: u32 = 250;

/// Default minimum trade amount, in asset base units.
pub const DEFAULT_MIN_TRADE_AMOUNT: i64 = 1;

/// Default maximum trade amount, in asset base units.
pub const DEFAULT_MAX_TRADE_AMOUNT: i64 = 1_000_000;

/// Default per-account cooldown between fills, in seconds.
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// Default number of distinct admin approvals for an emergency withdrawal.
pub const DEFAULT_REQUIRED_APPROVALS: usize = 2;

/// Default emergency-withdrawal timelock, in seconds (24h).
pub const DEFAULT_TIMELOCK_SECS: i64 = 24 * 60 * 60;

/// Snapshot file format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "EscrowMatch";
