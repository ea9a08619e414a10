//! Synthetic downlink traffic for exercising a queue against a concentrator.
//!
//! Three producer threads feed the queue the way a network server would: Class A replies one
//! receive delay after simulated uplinks, immediate Class C pushes, and a beacon planner that
//! keeps the next few beacons queued.

use crate::clock::{advance_us, delta_us, CounterUs};
use crate::concentrator::Concentrator;
use crate::packet::{Bandwidth, DownlinkPacket, Modulation};
use crate::packet_type::PacketType;
use crate::scheduler::JitQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::trace;

/// Beacon payload length for EU868 (17 bytes).
pub const BEACON_PAYLOAD_SIZE: usize = 17;

/// Rates and radio settings of the generated traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficProfile {
    /// Interval between simulated uplinks answered in RX1 (0 disables Class A).
    pub class_a_interval_ms: u64,
    /// Interval between immediate Class C pushes (0 disables Class C).
    pub class_c_interval_ms: u64,
    pub rx1_delay_us: u32,
    pub payload_size: usize,
    pub spreading_factor: u8,
    pub frequency_hz: u32,
    pub beacons: bool,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            class_a_interval_ms: 400,
            class_c_interval_ms: 1_500,
            rx1_delay_us: 1_000_000,
            payload_size: 16,
            spreading_factor: 9,
            frequency_hz: 869_525_000,
            beacons: true,
        }
    }
}

/// Keeps beacon times aligned on the period and queued `horizon_us` ahead.
#[derive(Debug, Clone)]
pub struct BeaconPlanner {
    period_us: u32,
    beacons_ahead: u32,
    horizon_us: u32,
    next_us: CounterUs,
}

impl BeaconPlanner {
    /// First beacon one period after `start`.
    ///
    /// # Arguments
    /// * `start` - Concentrator time the planner starts from
    /// * `period_us` - Beacon period
    /// * `beacons_ahead` - Number of beacons kept queued; at least one is always planned
    pub fn new(start: CounterUs, period_us: u32, beacons_ahead: u32) -> Self {
        let beacons_ahead = beacons_ahead.max(1);
        Self {
            period_us,
            beacons_ahead,
            horizon_us: period_us.saturating_mul(beacons_ahead).min(u32::MAX / 4),
            next_us: advance_us(start, period_us),
        }
    }

    pub fn next_us(&self) -> CounterUs {
        self.next_us
    }

    /// Beacon times that entered the horizon at `now`.
    ///
    /// Slots already behind `now` are skipped rather than returned.
    pub fn due(&mut self, now: CounterUs) -> Vec<CounterUs> {
        let mut due = Vec::new();
        if self.period_us == 0 {
            return due;
        }

        let behind = delta_us(now, self.next_us);
        if behind != 0 && behind < u32::MAX / 2 {
            let missed = behind.div_ceil(self.period_us);
            self.next_us = advance_us(self.next_us, missed.saturating_mul(self.period_us));
        }

        for _ in 0..self.beacons_ahead {
            if delta_us(self.next_us, now) > self.horizon_us {
                break;
            }
            due.push(self.next_us);
            self.next_us = advance_us(self.next_us, self.period_us);
        }
        due
    }
}

/// Producer threads feeding one queue.
pub struct TrafficGenerator {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl TrafficGenerator {
    pub fn start(
        queue: Arc<JitQueue>,
        concentrator: Arc<dyn Concentrator>,
        profile: TrafficProfile,
        beacon_period_us: u32,
        beacons_ahead: u32,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::new();
        let modulation = Modulation::lora(profile.spreading_factor, Bandwidth::Khz125);

        if profile.class_a_interval_ms > 0 {
            let (queue, radio, running) = (queue.clone(), concentrator.clone(), running.clone());
            let profile = profile.clone();
            handles.push(std::thread::Builder::new().name("ClassA-Producer".into()).spawn(
                move || {
                    let interval = Duration::from_millis(profile.class_a_interval_ms);
                    while running.load(Ordering::Relaxed) {
                        let uplink_at = radio.now_us();
                        let reply = DownlinkPacket::timestamped(
                            vec![0x60; profile.payload_size],
                            advance_us(uplink_at, profile.rx1_delay_us),
                            profile.frequency_hz,
                            modulation,
                        );
                        let _ = queue.enqueue(uplink_at, reply, PacketType::ClassA);
                        std::thread::sleep(interval);
                    }
                },
            )?);
        }

        if profile.class_c_interval_ms > 0 {
            let (queue, radio, running) = (queue.clone(), concentrator.clone(), running.clone());
            let profile = profile.clone();
            handles.push(std::thread::Builder::new().name("ClassC-Producer".into()).spawn(
                move || {
                    let interval = Duration::from_millis(profile.class_c_interval_ms);
                    while running.load(Ordering::Relaxed) {
                        let push = DownlinkPacket::immediate(
                            vec![0xA0; profile.payload_size],
                            profile.frequency_hz,
                            modulation,
                        );
                        if let Ok(target) = queue.enqueue(radio.now_us(), push, PacketType::ClassC)
                        {
                            trace!(target_us = target, "class C push placed");
                        }
                        std::thread::sleep(interval);
                    }
                },
            )?);
        }

        if profile.beacons && beacon_period_us > 0 {
            let (queue, radio, running) = (queue.clone(), concentrator.clone(), running.clone());
            let frequency_hz = profile.frequency_hz;
            handles.push(std::thread::Builder::new().name("Beacon-Planner".into()).spawn(
                move || {
                    let mut planner =
                        BeaconPlanner::new(radio.now_us(), beacon_period_us, beacons_ahead);
                    let beacon_modulation = Modulation::beacon(9, Bandwidth::Khz125);
                    while running.load(Ordering::Relaxed) {
                        let now = radio.now_us();
                        for at in planner.due(now) {
                            let beacon = DownlinkPacket::timestamped(
                                vec![0; BEACON_PAYLOAD_SIZE],
                                at,
                                frequency_hz,
                                beacon_modulation,
                            );
                            let _ = queue.enqueue(now, beacon, PacketType::Beacon);
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                },
            )?);
        }

        Ok(Self { running, handles })
    }

    pub fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_fills_horizon_once() {
        let mut planner = BeaconPlanner::new(0, 1_000_000, 3);
        assert_eq!(planner.due(0), vec![1_000_000, 2_000_000, 3_000_000]);
        assert!(planner.due(500_000).is_empty());
        assert_eq!(planner.due(1_000_000), vec![4_000_000]);
        assert_eq!(planner.next_us(), 5_000_000);
    }

    #[test]
    fn planner_skips_missed_slots() {
        let mut planner = BeaconPlanner::new(0, 1_000_000, 2);
        // long pause: slots 1s..=9s passed
        let due = planner.due(9_500_000);
        assert_eq!(due, vec![10_000_000, 11_000_000]);
    }

    #[test]
    fn planner_crosses_counter_wrap() {
        let start = u32::MAX - 1_500_000;
        let mut planner = BeaconPlanner::new(start, 1_000_000, 2);
        let due = planner.due(start);
        assert_eq!(due, vec![start.wrapping_add(1_000_000), start.wrapping_add(2_000_000)]);
        assert!(due[1] < due[0]);
    }

    #[test]
    fn planner_with_zero_beacons_ahead_still_returns() {
        let mut planner = BeaconPlanner::new(0, 128_000_000, 0);
        assert_eq!(planner.due(1), vec![128_000_000]);
        assert!(planner.due(2).is_empty());
        // far past the first slot: skip to the next aligned one
        assert_eq!(planner.due(300_000_000), vec![384_000_000]);
    }
}
