//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding a fixed signature seed.
pub const SIGNATURE_SEED_ENV: &str = "SPYGLASS_SIGNATURE_SEED";
/// Environment variable overriding [`EngineConfig::min_rounds`].
pub const MIN_ROUNDS_ENV: &str = "SPYGLASS_MIN_ROUNDS";

/// Configuration shared by a registry and every recording context built on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum number of recording rounds per block (default: 2).
    ///
    /// Two rounds are enough to separate a non-distinguishable matcher (such as
    /// a `bool`) from an equal literal, since its signature flips between rounds.
    pub min_rounds: usize,

    /// Upper bound on recording rounds per block (default: 16).
    ///
    /// A block is otherwise run once per distinct call it contains.
    pub max_rounds: usize,

    /// Seed for signature values. `None` seeds from entropy.
    pub signature_seed: Option<u64>,

    /// Poll interval for verifications with a timeout (default: 10ms).
    pub verify_poll_interval: Duration,

    /// Log calls a mock makes on itself while answering (default: true).
    ///
    /// Self-calls are always answered; this only controls whether they show up
    /// in the call log and therefore in verification.
    pub record_self_calls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_rounds: 2,
            max_rounds: 16,
            signature_seed: None,
            verify_poll_interval: Duration::from_millis(10),
            record_self_calls: true,
        }
    }
}

impl EngineConfig {
    /// Defaults, overridden by `SPYGLASS_SIGNATURE_SEED` / `SPYGLASS_MIN_ROUNDS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(SIGNATURE_SEED_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => config.signature_seed = Some(seed),
                Err(e) => tracing::warn!(value = %raw, error = %e, "ignoring invalid {}", SIGNATURE_SEED_ENV),
            }
        }
        if let Ok(raw) = std::env::var(MIN_ROUNDS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(rounds) => config.min_rounds = rounds,
                Err(e) => tracing::warn!(value = %raw, error = %e, "ignoring invalid {}", MIN_ROUNDS_ENV),
            }
        }
        config.normalized()
    }

    pub fn with_min_rounds(mut self, rounds: usize) -> Self {
        self.min_rounds = rounds;
        self.normalized()
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self.normalized()
    }

    pub fn with_signature_seed(mut self, seed: u64) -> Self {
        self.signature_seed = Some(seed);
        self
    }

    pub fn with_verify_poll_interval(mut self, interval: Duration) -> Self {
        self.verify_poll_interval = interval;
        self
    }

    pub fn with_record_self_calls(mut self, record: bool) -> Self {
        self.record_self_calls = record;
        self
    }

    /// Clamp round bounds so that `1 <= min_rounds <= max_rounds`.
    fn normalized(mut self) -> Self {
        self.min_rounds = self.min_rounds.max(1);
        self.max_rounds = self.max_rounds.max(self.min_rounds);
        self
    }
}
