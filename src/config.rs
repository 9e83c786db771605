//! Engine configuration with environment overrides
//!
//! **Env:** `BLAWKVEC_BATCH_SIZE` (rows per batch, 0 = one batch per task),
//! `BLAWKVEC_FENCE_EACH_BATCH` (1/0, true/false). Parse failure keeps the
//! default and logs a warning.

use log::warn;

/// Environment variable for the default batch size
pub const ENV_BATCH_SIZE: &str = "BLAWKVEC_BATCH_SIZE";

/// Environment variable for per-batch device fencing
pub const ENV_FENCE_EACH_BATCH: &str = "BLAWKVEC_FENCE_EACH_BATCH";

/// Tunables shared by every task of a pipeline invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows per batch when a task partition does not set one (0 = whole task range)
    pub batch_size: usize,

    /// Device tasks wait for their stream after every batch instead of once
    /// at the end of the batch loop
    pub fence_each_batch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: 0,
            fence_each_batch: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `BLAWKVEC_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();

        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.batch_size = n,
                Err(_) => warn!("{}={:?} is not a row count, keeping {}", ENV_BATCH_SIZE, raw, config.batch_size),
            }
        }

        if let Some(raw) = lookup(ENV_FENCE_EACH_BATCH) {
            match parse_flag(&raw) {
                Some(flag) => config.fence_each_batch = flag,
                None => warn!("{}={:?} is not a flag, keeping {}", ENV_FENCE_EACH_BATCH, raw, config.fence_each_batch),
            }
        }

        config
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fence_each_batch(mut self, fence: bool) -> Self {
        self.fence_each_batch = fence;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    let s = raw.trim();
    if s == "1" || s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("on") {
        Some(true)
    } else if s == "0" || s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}
