//! Gateway configuration.
//!
//! Every knob has a default matching the reference concentrator timings, so an empty JSON object
//! (or no file at all) yields a working setup.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Minimum lead time needed to program the radio before a transmission.
pub const TX_START_DELAY_US: u32 = 1_500;
/// How far ahead of its target time an entry is considered due.
pub const TX_JIT_DELAY_US: u32 = 40_000;
/// Safety gap kept between two transmissions.
pub const TX_MARGIN_DELAY_US: u32 = 1_000;
/// LoRaWAN Class B beacon period.
pub const BEACON_PERIOD_US: u32 = 128_000_000;
/// Number of future beacons kept in the queue at once.
pub const BEACONS_IN_QUEUE: u32 = 3;
/// Quiet time required before a beacon.
pub const BEACON_GUARD_US: u32 = 3_000_000;
/// Beacon on-air time plus margin.
pub const BEACON_RESERVED_US: u32 = 2_120_000;
/// Entries per radio.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Queue sizing and timing constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    pub capacity: usize,
    pub start_delay_us: u32,
    pub jit_delay_us: u32,
    pub margin_us: u32,
    pub beacon_period_us: u32,
    pub beacons_in_queue: u32,
    pub beacon_guard_us: u32,
    pub beacon_reserved_us: u32,
    /// Slots only beacons may use once the queue fills up (0 disables the reservation).
    pub reserved_beacon_slots: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            start_delay_us: TX_START_DELAY_US,
            jit_delay_us: TX_JIT_DELAY_US,
            margin_us: TX_MARGIN_DELAY_US,
            beacon_period_us: BEACON_PERIOD_US,
            beacons_in_queue: BEACONS_IN_QUEUE,
            beacon_guard_us: BEACON_GUARD_US,
            beacon_reserved_us: BEACON_RESERVED_US,
            reserved_beacon_slots: 0,
        }
    }
}

impl JitConfig {
    /// Furthest in the future a Class A/B packet may be scheduled; also the stale threshold.
    pub fn max_advance_us(&self) -> u32 {
        self.beacons_in_queue
            .saturating_add(1)
            .saturating_mul(self.beacon_period_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.reserved_beacon_slots >= self.capacity {
            return Err(ConfigError::Invalid(format!(
                "reserved_beacon_slots ({}) must be below capacity ({})",
                self.reserved_beacon_slots, self.capacity
            )));
        }
        // Entries are ordered relative to a point max_advance before now.
        if u64::from(self.max_advance_us()) * 2 > u64::from(u32::MAX) {
            return Err(ConfigError::Invalid(format!(
                "max advance of {} us does not fit twice in the counter range",
                self.max_advance_us()
            )));
        }
        if self.jit_delay_us == 0 {
            return Err(ConfigError::Invalid("jit_delay_us must be non-zero".into()));
        }
        Ok(())
    }
}

/// Settings of the thread that drains the queue into the concentrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Sleep between two polls when nothing is due.
    pub poll_interval_ms: u64,
    /// Core to pin the dispatcher thread to.
    pub core: Option<usize>,
    /// Priority level passed to [`crate::threading::set_thread_priority`].
    pub thread_priority: i32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            core: None,
            thread_priority: 2,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub jit: JitConfig,
    pub dispatcher: DispatcherConfig,
}

impl GatewayConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_str(text)?;
        config.jit.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_advance_spans_four_beacon_periods() {
        assert_eq!(JitConfig::default().max_advance_us(), 512_000_000);
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config = GatewayConfig::from_json("{}").unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config =
            GatewayConfig::from_json(r#"{"jit":{"capacity":8},"dispatcher":{"core":1}}"#).unwrap();
        assert_eq!(config.jit.capacity, 8);
        assert_eq!(config.jit.jit_delay_us, TX_JIT_DELAY_US);
        assert_eq!(config.dispatcher.core, Some(1));
        assert_eq!(config.dispatcher.poll_interval_ms, 10);
    }

    #[test]
    fn rejects_inconsistent_values() {
        assert!(matches!(
            GatewayConfig::from_json(r#"{"jit":{"capacity":0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GatewayConfig::from_json(r#"{"jit":{"capacity":4,"reserved_beacon_slots":4}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GatewayConfig::from_json(r#"{"jit":{"beacons_in_queue":20}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GatewayConfig::from_json("{not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
