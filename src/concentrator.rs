//! Concentrator abstraction.
//!
//! The dispatcher only needs three things from the radio front-end: its counter time, whether it
//! is free to accept a frame, and a way to hand it one. [`SimulatedConcentrator`] provides them
//! from the host's monotonic clock for demos and tests.

use crate::airtime::{SemtechAirtime, TimeOnAir};
use crate::clock::{advance_us, delta_us, CounterUs};
use crate::error::ConcentratorError;
use crate::packet::DownlinkPacket;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Transmit state reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Nothing programmed.
    Free,
    /// A frame is programmed and waiting for its start time.
    Scheduled,
    /// A frame is on air.
    Emitting,
}

/// Radio front-end driving one half-duplex transceiver.
pub trait Concentrator: Send + Sync {
    /// Current value of the free-running microsecond counter.
    fn now_us(&self) -> CounterUs;

    fn tx_status(&self) -> TxStatus;

    /// Program `packet` for transmission at its `target_time_us`.
    fn send(&self, packet: &DownlinkPacket) -> Result<(), ConcentratorError>;
}

/// Frame accepted by a [`SimulatedConcentrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub packet_id: u64,
    pub target_time_us: CounterUs,
    pub end_time_us: CounterUs,
    pub programmed_at_us: CounterUs,
}

/// Frames kept by [`SimulatedConcentrator::sent`]; older ones are only counted.
pub const SENT_HISTORY_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct RadioState {
    history: VecDeque<SentFrame>,
    frames_sent: u64,
}

impl RadioState {
    fn status_at(&self, now: CounterUs) -> TxStatus {
        let Some(last) = self.history.back() else {
            return TxStatus::Free;
        };
        // A frame programmed after its own start time counts as started immediately.
        let offset = |at: CounterUs| {
            let d = delta_us(at, last.programmed_at_us);
            if d > u32::MAX / 2 {
                0
            } else {
                d
            }
        };
        let since_programmed = delta_us(now, last.programmed_at_us);
        if since_programmed < offset(last.target_time_us) {
            TxStatus::Scheduled
        } else if since_programmed < offset(last.end_time_us) {
            TxStatus::Emitting
        } else {
            TxStatus::Free
        }
    }
}

/// In-process concentrator whose counter follows the host monotonic clock.
pub struct SimulatedConcentrator {
    epoch: Instant,
    counter_at_epoch: CounterUs,
    airtime: Arc<dyn TimeOnAir>,
    state: Mutex<RadioState>,
}

impl SimulatedConcentrator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Counter starting at `counter` (set it close to `u32::MAX` to exercise the wrap).
    pub fn starting_at(counter: CounterUs) -> Self {
        Self {
            epoch: Instant::now(),
            counter_at_epoch: counter,
            airtime: Arc::new(SemtechAirtime),
            state: Mutex::new(RadioState::default()),
        }
    }

    pub fn with_airtime(mut self, airtime: Arc<dyn TimeOnAir>) -> Self {
        self.airtime = airtime;
        self
    }

    /// Most recent frames, oldest first, at most [`SENT_HISTORY_CAPACITY`] of them.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Frames that went on air or are still waiting for their slot, overwritten ones excluded.
    pub fn frames_sent(&self) -> u64 {
        self.state.lock().frames_sent
    }
}

impl Default for SimulatedConcentrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Concentrator for SimulatedConcentrator {
    fn now_us(&self) -> CounterUs {
        let elapsed = self.epoch.elapsed().as_micros();
        // Truncation to 32 bits is the counter wrap.
        advance_us(self.counter_at_epoch, elapsed as u32)
    }

    fn tx_status(&self) -> TxStatus {
        let now = self.now_us();
        self.state.lock().status_at(now)
    }

    fn send(&self, packet: &DownlinkPacket) -> Result<(), ConcentratorError> {
        let toa = self.airtime.time_on_air_us(packet);
        let now = self.now_us();
        let mut state = self.state.lock();
        match state.status_at(now) {
            TxStatus::Emitting => return Err(ConcentratorError::Busy),
            // A pending frame is overwritten by the new one, as on the real chip.
            TxStatus::Scheduled => {
                state.history.pop_back();
                state.frames_sent -= 1;
            }
            TxStatus::Free => {}
        }
        if state.history.len() == SENT_HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back(SentFrame {
            packet_id: packet.id,
            target_time_us: packet.target_time_us,
            end_time_us: advance_us(packet.target_time_us, toa),
            programmed_at_us: now,
        });
        state.frames_sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airtime::FixedAirtime;
    use crate::packet::{Bandwidth, Modulation};

    #[test]
    fn counter_starts_at_offset_and_wraps() {
        let radio = SimulatedConcentrator::starting_at(u32::MAX);
        let now = radio.now_us();
        // a handful of microseconds elapsed at most: the counter already wrapped
        assert!(now < 1_000_000 || now == u32::MAX);
    }

    #[test]
    fn status_follows_programmed_frame() {
        let radio =
            SimulatedConcentrator::new().with_airtime(Arc::new(FixedAirtime(10_000_000)));
        assert_eq!(radio.tx_status(), TxStatus::Free);
        let target = radio.now_us().wrapping_add(10_000_000);
        let packet = DownlinkPacket::timestamped(
            vec![1],
            target,
            869_525_000,
            Modulation::lora(7, Bandwidth::Khz125),
        );
        radio.send(&packet).unwrap();
        assert_eq!(radio.tx_status(), TxStatus::Scheduled);
        let sent = radio.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_id, packet.id);
        assert_eq!(sent[0].end_time_us, target.wrapping_add(10_000_000));
    }

    #[test]
    fn scheduled_frame_is_overwritten() {
        let radio = SimulatedConcentrator::new();
        let m = Modulation::lora(7, Bandwidth::Khz125);
        let first = DownlinkPacket::timestamped(vec![1], radio.now_us() + 5_000_000, 0, m);
        let second = DownlinkPacket::timestamped(vec![2], radio.now_us() + 6_000_000, 0, m);
        radio.send(&first).unwrap();
        radio.send(&second).unwrap();
        let sent = radio.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].packet_id, second.id);
    }

    #[test]
    fn history_is_bounded_but_count_is_not() {
        let radio = SimulatedConcentrator::new().with_airtime(Arc::new(FixedAirtime(0)));
        let m = Modulation::lora(7, Bandwidth::Khz125);
        let total = SENT_HISTORY_CAPACITY + 10;
        for _ in 0..total {
            // target already reached: the radio is free again for the next frame
            let packet = DownlinkPacket::timestamped(vec![1], radio.now_us(), 0, m);
            radio.send(&packet).unwrap();
        }
        assert_eq!(radio.sent().len(), SENT_HISTORY_CAPACITY);
        assert_eq!(radio.frames_sent(), total as u64);
    }
}
