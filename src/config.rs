use crate::error::ConsensusError;

/// Per-chain runtime configuration. Defaults are sized for active-validator
/// counts in the tens to low hundreds, where vote and result volume stays
/// small enough that unbounded queues are safe.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Seconds allotted to each packing slot.
    pub block_interval_secs: u64,
    /// Capacity of the vote duplicate filter (intended range 128–1000).
    pub dedup_capacity: usize,
    /// How many above-height votes to buffer before dropping the oldest.
    pub future_vote_capacity: usize,
    /// Finalized results kept for late re-delivery.
    pub result_cache_capacity: usize,
    /// Awaiting-confirmation map size above which sweeps start removing.
    pub candidate_sweep_threshold: usize,
    /// Age past which a swept candidate is considered stale.
    pub candidate_max_age_secs: u64,
    /// Sweeper tick period.
    pub sweep_interval_secs: u64,
    /// Height-stall monitor period.
    pub height_monitor_interval_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_interval_secs: 10,
            dedup_capacity: 512,
            future_vote_capacity: 256,
            result_cache_capacity: 50,
            candidate_sweep_threshold: 200,
            candidate_max_age_secs: 120,
            sweep_interval_secs: 10,
            height_monitor_interval_secs: 300,
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.block_interval_secs == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "block_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "dedup_capacity must be greater than 0".to_string(),
            ));
        }
        if self.future_vote_capacity == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "future_vote_capacity must be greater than 0".to_string(),
            ));
        }
        if self.result_cache_capacity == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "result_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 || self.height_monitor_interval_secs == 0 {
            return Err(ConsensusError::InvalidConfiguration(
                "timer periods must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ChainConfigBuilder {
    config: ChainConfig,
}

impl ChainConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ChainConfig::default(),
        }
    }

    /// Start builder from an existing config (useful for partial updates).
    pub fn from_existing(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn with_block_interval(mut self, secs: u64) -> Self {
        self.config.block_interval_secs = secs;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.config.dedup_capacity = capacity;
        self
    }

    pub fn with_future_vote_capacity(mut self, capacity: usize) -> Self {
        self.config.future_vote_capacity = capacity;
        self
    }

    pub fn with_result_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.result_cache_capacity = capacity;
        self
    }

    pub fn with_candidate_sweep(mut self, threshold: usize, max_age_secs: u64) -> Self {
        self.config.candidate_sweep_threshold = threshold;
        self.config.candidate_max_age_secs = max_age_secs;
        self
    }

    pub fn with_sweep_interval(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    pub fn with_height_monitor_interval(mut self, secs: u64) -> Self {
        self.config.height_monitor_interval_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        self.config.validate()
    }

    pub fn build(self) -> Result<ChainConfig, ConsensusError> {
        self.validate()?;
        Ok(self.config)
    }
}

impl Default for ChainConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
