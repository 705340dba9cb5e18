//! Runtime configuration
//!
//! The tick period defines the virtual-time rate and must be identical on
//! the authority and every participant. The postdate delay stamps
//! authority-originated events slightly in the future, which keeps them out
//! of participants' projected past and cuts invalidation churn.

use std::time::Duration;

use lockstep_core::time::ticks_in;

use crate::{RuntimeError, RuntimeResult};

/// Loop timing parameters
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Virtual tick period (wall clock per tick)
    pub tick_period: Duration,
    /// How often history is compacted via safe advance
    pub compact_interval: Duration,
    /// How often heartbeats are emitted
    pub heartbeat_interval: Duration,
    /// How far in the future authority-originated events are stamped
    pub postdate_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            // 30 ticks per second
            tick_period: Duration::from_micros(33_333),
            compact_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            postdate_delay: Duration::from_millis(250),
        }
    }
}

impl RuntimeConfig {
    /// Reject degenerate timings before any loop is built around them
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.tick_period.is_zero() {
            return Err(RuntimeError::InvalidConfig("tick_period must be non-zero"));
        }
        if self.compact_interval.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "compact_interval must be non-zero",
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "heartbeat_interval must be non-zero",
            ));
        }
        Ok(())
    }

    /// The postdate delay expressed in whole ticks
    pub fn postdate_ticks(&self) -> u64 {
        ticks_in(self.postdate_delay, self.tick_period)
    }
}
