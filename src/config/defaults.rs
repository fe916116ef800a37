//! Default constants for reconciliation configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Matching Defaults
// =============================================================================

/// Decimal digits kept when rounding similarity ratios.
pub const DEFAULT_RATIO_PRECISION: u32 = 4;

/// Largest precision accepted from config; an `f64` holds about 15 significant digits.
pub const MAX_RATIO_PRECISION: u32 = 15;

/// Field that carries a record's identity.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

// =============================================================================
// Threshold Preparer Defaults
// =============================================================================

/// Lowest ratio (inclusive) still treated as an update of the best candidate.
pub const DEFAULT_BAND_LOW: f64 = 0.75;

/// Ratio (exclusive) from which a candidate counts as unchanged.
pub const DEFAULT_BAND_HIGH: f64 = 0.999999;

// =============================================================================
// Environment
// =============================================================================

/// Prefix for environment overrides, e.g. `RECONCILE_MATCHING__PRIMARY_KEY`.
pub const ENV_PREFIX: &str = "RECONCILE_";
