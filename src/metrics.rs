//! Scheduling and transmission counters.
//!
//! Counters are plain relaxed atomics: they are updated on the enqueue and dispatch hot paths and
//! only read for reporting, so no ordering with the queue contents is needed.

use crate::error::JitError;
use crate::packet_type::{PacketType, PacketTypeTable};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-reason rejection counters.
#[derive(Debug, Default)]
struct RejectCounters {
    invalid: AtomicU64,
    full: AtomicU64,
    too_late: AtomicU64,
    too_early: AtomicU64,
    collision_packet: AtomicU64,
    collision_beacon: AtomicU64,
}

impl RejectCounters {
    fn counter(&self, error: JitError) -> Option<&AtomicU64> {
        match error {
            JitError::Invalid => Some(&self.invalid),
            JitError::Full => Some(&self.full),
            JitError::TooLate => Some(&self.too_late),
            JitError::TooEarly => Some(&self.too_early),
            JitError::CollisionPacket => Some(&self.collision_packet),
            JitError::CollisionBeacon => Some(&self.collision_beacon),
            JitError::Empty => None,
        }
    }

    fn snapshot(&self) -> RejectSnapshot {
        RejectSnapshot {
            invalid: self.invalid.load(Ordering::Relaxed),
            full: self.full.load(Ordering::Relaxed),
            too_late: self.too_late.load(Ordering::Relaxed),
            too_early: self.too_early.load(Ordering::Relaxed),
            collision_packet: self.collision_packet.load(Ordering::Relaxed),
            collision_beacon: self.collision_beacon.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free statistics shared by a queue and its dispatcher.
#[derive(Debug)]
pub struct JitStats {
    enqueued: PacketTypeTable<AtomicU64>,
    rejected: PacketTypeTable<RejectCounters>,
    stale_dropped: PacketTypeTable<AtomicU64>,
    transmitted: PacketTypeTable<AtomicU64>,
    tx_failed: PacketTypeTable<AtomicU64>,
}

impl Default for JitStats {
    fn default() -> Self {
        Self::new()
    }
}

impl JitStats {
    pub fn new() -> Self {
        Self {
            enqueued: PacketTypeTable::from_fn(|_| AtomicU64::new(0)),
            rejected: PacketTypeTable::from_fn(|_| RejectCounters::default()),
            stale_dropped: PacketTypeTable::from_fn(|_| AtomicU64::new(0)),
            transmitted: PacketTypeTable::from_fn(|_| AtomicU64::new(0)),
            tx_failed: PacketTypeTable::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn record_enqueued(&self, packet_type: PacketType) {
        self.enqueued[packet_type].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, packet_type: PacketType, error: JitError) {
        if let Some(counter) = self.rejected[packet_type].counter(error) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stale_drop(&self, packet_type: PacketType) {
        self.stale_dropped[packet_type].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transmitted(&self, packet_type: PacketType) {
        self.transmitted[packet_type].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_failed(&self, packet_type: PacketType) {
        self.tx_failed[packet_type].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JitStatsSnapshot {
        JitStatsSnapshot {
            enqueued: PacketTypeTable::from_fn(|t| self.enqueued[t].load(Ordering::Relaxed)),
            rejected: PacketTypeTable::from_fn(|t| self.rejected[t].snapshot()),
            stale_dropped: PacketTypeTable::from_fn(|t| {
                self.stale_dropped[t].load(Ordering::Relaxed)
            }),
            transmitted: PacketTypeTable::from_fn(|t| self.transmitted[t].load(Ordering::Relaxed)),
            tx_failed: PacketTypeTable::from_fn(|t| self.tx_failed[t].load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of the rejection counters of one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectSnapshot {
    pub invalid: u64,
    pub full: u64,
    pub too_late: u64,
    pub too_early: u64,
    pub collision_packet: u64,
    pub collision_beacon: u64,
}

impl RejectSnapshot {
    pub fn total(&self) -> u64 {
        self.invalid
            + self.full
            + self.too_late
            + self.too_early
            + self.collision_packet
            + self.collision_beacon
    }
}

/// Point-in-time copy of [`JitStats`], serialisable for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JitStatsSnapshot {
    pub enqueued: PacketTypeTable<u64>,
    pub rejected: PacketTypeTable<RejectSnapshot>,
    pub stale_dropped: PacketTypeTable<u64>,
    pub transmitted: PacketTypeTable<u64>,
    pub tx_failed: PacketTypeTable<u64>,
}

impl JitStatsSnapshot {
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.iter().map(|(_, v)| *v).sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.iter().map(|(_, r)| r.total()).sum()
    }

    pub fn total_transmitted(&self) -> u64 {
        self.transmitted.iter().map(|(_, v)| *v).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_class() {
        let stats = JitStats::new();
        stats.record_enqueued(PacketType::ClassA);
        stats.record_enqueued(PacketType::ClassA);
        stats.record_enqueued(PacketType::Beacon);
        stats.record_rejected(PacketType::ClassB, JitError::TooEarly);
        stats.record_rejected(PacketType::ClassB, JitError::CollisionBeacon);
        stats.record_rejected(PacketType::ClassB, JitError::Empty);
        stats.record_stale_drop(PacketType::Beacon);

        let snap = stats.snapshot();
        assert_eq!(snap.enqueued[PacketType::ClassA], 2);
        assert_eq!(snap.enqueued[PacketType::Beacon], 1);
        assert_eq!(snap.total_enqueued(), 3);
        assert_eq!(snap.rejected[PacketType::ClassB].too_early, 1);
        assert_eq!(snap.rejected[PacketType::ClassB].collision_beacon, 1);
        assert_eq!(snap.total_rejected(), 2);
        assert_eq!(snap.stale_dropped[PacketType::Beacon], 1);
    }

    #[test]
    fn snapshot_serializes_as_arrays() {
        let stats = JitStats::new();
        stats.record_transmitted(PacketType::ClassC);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["transmitted"], serde_json::json!([0, 0, 1, 0]));
    }
}
