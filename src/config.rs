//! Engine tuning, loaded from env.
//!
//! Unset or unparsable variables fall back to the defaults in [`EngineConfig::default`].

/// Matching and lifecycle parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum waitlist entries examined per screening type per matching run.
    pub batch_size: usize,
    /// A patient holding this many unclaimed allocations is skipped.
    pub max_unclaimed_allocations: usize,
    /// Time a patient has to claim an allocation before it expires.
    pub allocation_ttl_secs: u64,
    pub check_in_code_len: usize,
    /// Seed for check-in code generation. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_unclaimed_allocations: 3,
            allocation_ttl_secs: 7 * 24 * 60 * 60,
            check_in_code_len: 6,
            rng_seed: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl EngineConfig {
    /// Load from `MATCH_BATCH_SIZE`, `MAX_UNCLAIMED_ALLOCATIONS`, `ALLOCATION_TTL_SECS`,
    /// `CHECK_IN_CODE_LEN` and `CHECK_IN_SEED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse::<usize>("MATCH_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            max_unclaimed_allocations: env_parse("MAX_UNCLAIMED_ALLOCATIONS")
                .unwrap_or(defaults.max_unclaimed_allocations),
            allocation_ttl_secs: env_parse("ALLOCATION_TTL_SECS")
                .unwrap_or(defaults.allocation_ttl_secs),
            check_in_code_len: env_parse::<usize>("CHECK_IN_CODE_LEN")
                .filter(|n| (4..=12).contains(n))
                .unwrap_or(defaults.check_in_code_len),
            rng_seed: env_parse("CHECK_IN_SEED"),
        }
    }

    /// Default config with a fixed check-in seed, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.max_unclaimed_allocations, 3);
        assert_eq!(c.allocation_ttl_secs, 604_800);
        assert_eq!(c.check_in_code_len, 6);
        assert!(c.rng_seed.is_none());
    }

    #[test]
    fn seeded_keeps_other_defaults() {
        let c = EngineConfig::seeded(7);
        assert_eq!(c.rng_seed, Some(7));
        assert_eq!(c.batch_size, 10);
    }
}
