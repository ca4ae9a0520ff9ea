use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::pipeline::control::{Cancelled, RunSignal};

/// Inclusive millisecond range a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }

    pub fn sample(&self) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

impl FromStr for DelayRange {
    type Err = String;

    /// Accepts `"min-max"` or a single fixed value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid delay range '{s}'"))
        };
        match s.split_once('-') {
            Some((min, max)) => Ok(DelayRange::new(parse(min)?, parse(max)?)),
            None => {
                let fixed = parse(s)?;
                Ok(DelayRange::new(fixed, fixed))
            }
        }
    }
}

impl fmt::Display for DelayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}ms", self.min_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub item: DelayRange,
    pub page: DelayRange,
    /// Back-off after a page-level source error.
    pub error: DelayRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            item: DelayRange::new(1_000, 3_000),
            page: DelayRange::new(2_000, 5_000),
            error: DelayRange::new(5_000, 10_000),
        }
    }
}

impl PacingConfig {
    pub fn none() -> Self {
        Self {
            item: DelayRange::ZERO,
            page: DelayRange::ZERO,
            error: DelayRange::ZERO,
        }
    }
}

/// Inserts the randomized pauses between source calls. Every wait ends early
/// on cancellation.
#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub async fn between_items(&self, signal: &RunSignal) -> Result<(), Cancelled> {
        Self::wait(self.config.item, signal).await
    }

    pub async fn between_pages(&self, signal: &RunSignal) -> Result<(), Cancelled> {
        Self::wait(self.config.page, signal).await
    }

    pub async fn after_error(&self, signal: &RunSignal) -> Result<(), Cancelled> {
        Self::wait(self.config.error, signal).await
    }

    async fn wait(range: DelayRange, signal: &RunSignal) -> Result<(), Cancelled> {
        if range.is_zero() {
            return if signal.is_cancelled() { Err(Cancelled) } else { Ok(()) };
        }
        signal.sleep(range.sample()).await
    }
}
