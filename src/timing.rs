//! Timing policy and collision validation.
//!
//! Every queued transmission occupies the radio from `pre_delay` before its target time (the
//! hardware has to be armed) until `post_delay` after it (the frame is on air). Two entries
//! collide when those intervals, widened by the safety margin, overlap.

use crate::clock::{advance_us, delta_us, CounterUs};
use crate::config::JitConfig;
use crate::packet_type::PacketType;

/// Radio occupancy of one scheduled transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxWindow {
    pub time_us: CounterUs,
    pub pre_delay_us: u32,
    pub post_delay_us: u32,
}

/// Per-class delay derivation plus the shared timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    pub start_delay_us: u32,
    pub jit_delay_us: u32,
    pub margin_us: u32,
    pub max_advance_us: u32,
    pub beacon_guard_us: u32,
    pub beacon_reserved_us: u32,
}

impl TimingPolicy {
    pub fn from_config(config: &JitConfig) -> Self {
        Self {
            start_delay_us: config.start_delay_us,
            jit_delay_us: config.jit_delay_us,
            margin_us: config.margin_us,
            max_advance_us: config.max_advance_us(),
            beacon_guard_us: config.beacon_guard_us,
            beacon_reserved_us: config.beacon_reserved_us,
        }
    }

    pub fn pre_delay_us(&self, packet_type: PacketType) -> u32 {
        match packet_type {
            PacketType::ClassA | PacketType::ClassB | PacketType::ClassC => {
                self.start_delay_us.saturating_add(self.jit_delay_us)
            }
            PacketType::Beacon => self
                .start_delay_us
                .saturating_add(self.beacon_guard_us)
                .saturating_add(self.jit_delay_us),
        }
    }

    /// Data frames occupy the channel for their time on air; beacons for the reserved slot.
    pub fn post_delay_us(&self, packet_type: PacketType, time_on_air_us: u32) -> u32 {
        match packet_type {
            PacketType::ClassA | PacketType::ClassB | PacketType::ClassC => time_on_air_us,
            PacketType::Beacon => self.beacon_reserved_us,
        }
    }

    pub fn window(
        &self,
        time_us: CounterUs,
        packet_type: PacketType,
        time_on_air_us: u32,
    ) -> TxWindow {
        TxWindow {
            time_us,
            pre_delay_us: self.pre_delay_us(packet_type),
            post_delay_us: self.post_delay_us(packet_type, time_on_air_us),
        }
    }

    /// Lead time below which a packet can no longer be programmed.
    pub fn min_lead_us(&self) -> u32 {
        self.start_delay_us
            .saturating_add(self.margin_us)
            .saturating_add(self.jit_delay_us)
    }

    /// Target of an immediate downlink when nothing stands in the way.
    pub fn asap_time_us(&self, now: CounterUs) -> CounterUs {
        advance_us(now, self.jit_delay_us.saturating_mul(2))
    }

    /// Earliest start for a packet with `pre_delay_us` right after `previous` ends.
    pub fn slot_after(&self, previous: &TxWindow, pre_delay_us: u32) -> CounterUs {
        let gap = previous
            .post_delay_us
            .saturating_add(pre_delay_us)
            .saturating_add(self.jit_delay_us)
            .saturating_add(self.margin_us);
        advance_us(previous.time_us, gap)
    }

    /// Window of an already queued entry as seen by an incoming packet.
    ///
    /// Class A and C traffic may start as close to a beacon as the hardware allows, so the
    /// beacon guard is dropped from the queued beacon's pre-delay for them.
    pub fn effective_window(
        &self,
        queued: &TxWindow,
        queued_type: PacketType,
        incoming_type: PacketType,
    ) -> TxWindow {
        if queued_type.is_beacon() && incoming_type.may_approach_beacon() {
            TxWindow {
                pre_delay_us: self.start_delay_us,
                ..*queued
            }
        } else {
            *queued
        }
    }

    /// Wrap-safe overlap test between two windows.
    pub fn collides(&self, a: &TxWindow, b: &TxWindow) -> bool {
        let a_after_b = delta_us(a.time_us, b.time_us);
        let b_after_a = delta_us(b.time_us, a.time_us);
        let margin = u64::from(self.margin_us);
        let a_needs = u64::from(a.pre_delay_us) + u64::from(b.post_delay_us) + margin;
        let b_needs = u64::from(b.pre_delay_us) + u64::from(a.post_delay_us) + margin;
        u64::from(a_after_b) <= a_needs || u64::from(b_after_a) <= b_needs
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self::from_config(&JitConfig::default())
    }
}
