//! Default constants for rosterlink configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Credential Store Defaults
// =============================================================================

/// Identities requested per listing page
/// Matches the largest page the managed credential store serves.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Domain appended to canonical handles
pub const DEFAULT_CANONICAL_DOMAIN: &str = "test.com";

// =============================================================================
// Document Store Defaults
// =============================================================================

/// Collection holding roster records
pub const DEFAULT_COLLECTION: &str = "officials";

// =============================================================================
// Reporting Defaults
// =============================================================================

/// Number of handle domains reported after the index is built
pub const DEFAULT_TOP_DOMAINS: usize = 5;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ROSTERLINK_";
