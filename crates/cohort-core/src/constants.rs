/// Cohort system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of percentile buckets a user identity hashes into.
pub const PERCENTILE_BUCKETS: u64 = 100;

/// Lowest traffic percentage an experiment may run with.
pub const MIN_TRAFFIC_PERCENTAGE: u8 = 1;

/// Highest traffic or rollout percentage.
pub const MAX_PERCENTAGE: u8 = 100;

/// Seed for the control/treatment parity hash. Distinct from the unseeded
/// inclusion hash so arm and inclusion are not derived from the same bits.
pub const COHORT_HASH_SEED: u64 = 0x5eed_c0_4a27;

/// Variant name recorded on EXCLUDED assignments.
pub const EXCLUDED_VARIANT_NAME: &str = "excluded";

/// Environment used when none is supplied.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Confidence level assigned to newly created experiments.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 95.0;

/// Default control/test variant names.
pub const DEFAULT_CONTROL_VARIANT: &str = "control";
pub const DEFAULT_TEST_VARIANT: &str = "test";
