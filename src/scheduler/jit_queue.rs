//! Just-in-time downlink queue.
//!
//! The queue holds every downlink accepted for one half-duplex radio, sorted by target
//! transmission time, and guarantees that no two of them overlap on air. Producers enqueue frames
//! as soon as the network server hands them over; the dispatcher polls [`JitQueue::peek`] with the
//! current concentrator time and dequeues whatever is due within the JIT look-ahead window.
//!
//! Algorithm:
//! 1. Enqueue resolves immediate Class C requests to the first conflict-free slot (ASAP search)
//! 2. Enqueue rejects frames that are too late, too far ahead, or overlap a queued frame
//! 3. Accepted frames are appended and the queue is re-sorted by target time
//! 4. Peek drops entries whose slot already passed, then reports the earliest due entry
//! 5. Dequeue swap-removes an entry and re-sorts
//!
//! Every operation runs under one exclusive lock owned by the queue, so a concurrent observer
//! never sees a partially sorted or colliding set of entries. Indices returned by `peek` are only
//! meaningful until the next mutation; [`JitQueue::take_due`] does both steps under one lock.

use crate::airtime::{SemtechAirtime, TimeOnAir};
use crate::clock::{delta_us, CounterUs, WrapOrder};
use crate::config::JitConfig;
use crate::error::{EnqueueError, JitError};
use crate::metrics::JitStats;
use crate::packet::{DownlinkPacket, TxMode};
use crate::packet_type::PacketType;
use crate::timing::{TimingPolicy, TxWindow};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A downlink accepted by the queue, with its radio occupancy.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub packet: DownlinkPacket,
    pub pre_delay_us: u32,
    pub post_delay_us: u32,
    pub packet_type: PacketType,
}

impl QueueEntry {
    pub fn window(&self) -> TxWindow {
        TxWindow {
            time_us: self.packet.target_time_us,
            pre_delay_us: self.pre_delay_us,
            post_delay_us: self.post_delay_us,
        }
    }

    fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.packet.id,
            target_time_us: self.packet.target_time_us,
            pre_delay_us: self.pre_delay_us,
            post_delay_us: self.post_delay_us,
            packet_type: self.packet_type,
            size_bytes: self.packet.len(),
        }
    }
}

/// Read-only view of a queued entry, in queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub id: u64,
    pub target_time_us: CounterUs,
    pub pre_delay_us: u32,
    pub post_delay_us: u32,
    pub packet_type: PacketType,
    pub size_bytes: usize,
}

/// Entries plus the bookkeeping that must change with them.
#[derive(Debug)]
struct QueueStore {
    entries: Vec<QueueEntry>,
    beacon_count: usize,
    /// Last concentrator time seen by enqueue or peek; anchors the sort order.
    reference_us: CounterUs,
}

impl QueueStore {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            beacon_count: 0,
            reference_us: 0,
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.beacon_count = 0;
        self.reference_us = 0;
    }

    fn sort(&mut self, lookback_us: u32) {
        let order = WrapOrder::looking_back(self.reference_us, lookback_us);
        self.entries.sort_by(|a, b| {
            order.cmp(a.packet.target_time_us, b.packet.target_time_us)
        });
    }

    fn push(&mut self, entry: QueueEntry, lookback_us: u32) {
        if entry.packet_type.is_beacon() {
            self.beacon_count += 1;
        }
        self.entries.push(entry);
        self.sort(lookback_us);
    }

    /// Move the last entry into `index`, then restore the order.
    fn remove_at(&mut self, index: usize, lookback_us: u32) -> QueueEntry {
        let entry = self.entries.swap_remove(index);
        if entry.packet_type.is_beacon() {
            self.beacon_count -= 1;
        }
        self.sort(lookback_us);
        entry
    }
}

/// Bounded, time-sorted, collision-free downlink queue for one radio.
pub struct JitQueue {
    policy: TimingPolicy,
    capacity: usize,
    reserved_beacon_slots: usize,
    airtime: Arc<dyn TimeOnAir>,
    store: Mutex<QueueStore>,
    stats: JitStats,
}

impl JitQueue {
    /// Queue using the built-in LoRa/FSK airtime model.
    pub fn new(config: &JitConfig) -> Self {
        Self::with_airtime(config, Arc::new(SemtechAirtime))
    }

    /// Queue taking frame durations from `airtime` (usually the radio HAL).
    pub fn with_airtime(config: &JitConfig, airtime: Arc<dyn TimeOnAir>) -> Self {
        Self {
            policy: TimingPolicy::from_config(config),
            capacity: config.capacity,
            reserved_beacon_slots: config.reserved_beacon_slots,
            airtime,
            store: Mutex::new(QueueStore::with_capacity(config.capacity)),
            stats: JitStats::new(),
        }
    }

    /// Drop every entry and start over empty.
    pub fn init(&self) {
        self.store.lock().clear();
    }

    pub fn policy(&self) -> &TimingPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.store.lock().entries.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn beacon_count(&self) -> usize {
        self.store.lock().beacon_count
    }

    /// Entries in queue order.
    pub fn snapshot(&self) -> Vec<EntrySummary> {
        self.store.lock().entries.iter().map(QueueEntry::summary).collect()
    }

    /// Schedule `packet` for transmission.
    ///
    /// Immediate Class C requests are given the earliest slot that fits, written back into
    /// `target_time_us`. On success the resolved target time is returned and the queue owns the
    /// packet; on rejection the packet comes back inside the error.
    ///
    /// # Arguments
    /// * `now` - Current concentrator counter, used for the lead-time checks and the ASAP search
    /// * `packet` - Downlink to schedule; moved into the queue on success
    /// * `packet_type` - Class of the downlink, which selects its pre/post delays and which
    ///   time checks apply
    ///
    /// # Returns
    /// The target counter time the packet will be transmitted at.
    ///
    /// # Errors
    /// - `Full`: no slot left (or only slots reserved for beacons)
    /// - `Invalid`: empty/oversized payload, unsupported modulation, or an immediate request that
    ///   is not Class C
    /// - `TooLate`: not enough lead time left to program the radio
    /// - `TooEarly`: Class A/B timestamp beyond the maximum advance
    /// - `CollisionPacket` / `CollisionBeacon`: overlaps a queued data frame / beacon
    pub fn enqueue(
        &self,
        now: CounterUs,
        mut packet: DownlinkPacket,
        packet_type: PacketType,
    ) -> Result<CounterUs, EnqueueError> {
        // The HAL may be slow to answer; keep it outside the lock. Malformed frames never reach
        // it and are rejected by `admit` in the usual check order.
        let time_on_air = if packet.is_well_formed() {
            self.airtime.time_on_air_us(&packet)
        } else {
            0
        };
        let pre_delay_us = self.policy.pre_delay_us(packet_type);
        let post_delay_us = self.policy.post_delay_us(packet_type, time_on_air);

        let outcome = {
            let mut store = self.store.lock();
            store.reference_us = now;
            match self.admit(&store, now, &mut packet, packet_type, pre_delay_us, post_delay_us) {
                Ok(()) => {
                    let queued = store.entries.len() + 1;
                    let target = packet.target_time_us;
                    store.push(
                        QueueEntry {
                            packet,
                            pre_delay_us,
                            post_delay_us,
                            packet_type,
                        },
                        self.policy.max_advance_us,
                    );
                    Ok((target, queued))
                }
                Err(kind) => Err(EnqueueError::new(kind, packet)),
            }
        };

        match outcome {
            Ok((target, queued)) => {
                self.stats.record_enqueued(packet_type);
                debug!(
                    packet_type = %packet_type,
                    target_us = target,
                    lead_us = delta_us(target, now),
                    post_delay_us,
                    queued,
                    "downlink enqueued"
                );
                Ok(target)
            }
            Err(err) => {
                self.stats.record_rejected(packet_type, err.kind);
                warn!(
                    packet_type = %packet_type,
                    target_us = err.packet.target_time_us,
                    now_us = now,
                    reason = %err.kind,
                    "downlink rejected"
                );
                Err(err)
            }
        }
    }

    /// Checks run under the lock before an entry is inserted.
    fn admit(
        &self,
        store: &QueueStore,
        now: CounterUs,
        packet: &mut DownlinkPacket,
        packet_type: PacketType,
        pre_delay_us: u32,
        post_delay_us: u32,
    ) -> Result<(), JitError> {
        if store.entries.len() >= self.capacity {
            return Err(JitError::Full);
        }
        let immediate = packet.tx_mode == TxMode::Immediate;
        if !packet.is_well_formed() || (immediate && packet_type != PacketType::ClassC) {
            return Err(JitError::Invalid);
        }
        if !packet_type.is_beacon() && self.reserved_beacon_slots > 0 {
            let limit = (self.capacity.saturating_sub(self.reserved_beacon_slots)
                + store.beacon_count)
                .min(self.capacity);
            if store.entries.len() >= limit {
                return Err(JitError::Full);
            }
        }

        if immediate {
            packet.target_time_us =
                self.resolve_asap(&store.entries, now, pre_delay_us, post_delay_us, packet_type);
            packet.tx_mode = TxMode::Timestamped;
        }

        let lead = delta_us(packet.target_time_us, now);
        if lead <= self.policy.min_lead_us() {
            return Err(JitError::TooLate);
        }
        if packet_type.is_advance_bounded() && lead > self.policy.max_advance_us {
            return Err(JitError::TooEarly);
        }

        let candidate = TxWindow {
            time_us: packet.target_time_us,
            pre_delay_us,
            post_delay_us,
        };
        if let Some(entry) = store
            .entries
            .iter()
            .find(|entry| self.overlaps(entry, &candidate, packet_type))
        {
            return Err(if entry.packet_type.is_beacon() {
                JitError::CollisionBeacon
            } else {
                JitError::CollisionPacket
            });
        }
        Ok(())
    }

    fn overlaps(&self, entry: &QueueEntry, candidate: &TxWindow, incoming: PacketType) -> bool {
        let queued = self
            .policy
            .effective_window(&entry.window(), entry.packet_type, incoming);
        self.policy.collides(candidate, &queued)
    }

    /// Earliest slot for an immediate downlink.
    ///
    /// Tries `now + 2 * jit_delay` first. When that collides, walks the sorted entries and tries
    /// the slot right after each one, stopping at the first that clears the following entry, or
    /// after the last entry.
    fn resolve_asap(
        &self,
        entries: &[QueueEntry],
        now: CounterUs,
        pre_delay_us: u32,
        post_delay_us: u32,
        packet_type: PacketType,
    ) -> CounterUs {
        let window = |time_us| TxWindow {
            time_us,
            pre_delay_us,
            post_delay_us,
        };

        let mut candidate = self.policy.asap_time_us(now);
        if entries
            .iter()
            .all(|entry| !self.overlaps(entry, &window(candidate), packet_type))
        {
            return candidate;
        }

        for (i, entry) in entries.iter().enumerate() {
            candidate = self.policy.slot_after(&entry.window(), pre_delay_us);
            match entries.get(i + 1) {
                None => break,
                Some(next) if !self.overlaps(next, &window(candidate), packet_type) => break,
                Some(_) => {}
            }
        }
        candidate
    }

    /// Remove and return the entry at `index`.
    ///
    /// The last entry takes the freed slot and the queue is re-sorted, so any index obtained
    /// earlier is invalidated.
    ///
    /// # Errors
    /// - `Invalid`: `index` is outside the capacity or past the last entry
    /// - `Empty`: nothing queued
    pub fn dequeue(&self, index: usize) -> Result<(DownlinkPacket, PacketType), JitError> {
        if index >= self.capacity {
            return Err(JitError::Invalid);
        }
        let entry = {
            let mut store = self.store.lock();
            if store.entries.is_empty() {
                return Err(JitError::Empty);
            }
            if index >= store.entries.len() {
                return Err(JitError::Invalid);
            }
            store.remove_at(index, self.policy.max_advance_us)
        };
        debug!(
            packet_type = %entry.packet_type,
            target_us = entry.packet.target_time_us,
            index,
            "downlink dequeued"
        );
        Ok((entry.packet, entry.packet_type))
    }

    /// Index of the entry due within the JIT window at `now`, if any.
    ///
    /// Side effect: entries whose target time is already behind `now` (or absurdly far ahead)
    /// are dropped first. The drop and the selection happen under the same lock acquisition.
    ///
    /// # Returns
    /// - `Ok(Some(index))`: the entry with the smallest lead, which is below the JIT delay
    /// - `Ok(None)`: nothing is due yet, or every entry was stale and has been dropped
    ///
    /// # Errors
    /// - `Empty`: nothing queued
    pub fn peek(&self, now: CounterUs) -> Result<Option<usize>, JitError> {
        let (selected, dropped) = {
            let mut store = self.store.lock();
            self.peek_locked(&mut store, now)?
        };
        self.report_stale(&dropped, now);
        Ok(selected)
    }

    /// Peek and dequeue under a single lock acquisition.
    ///
    /// This is what the dispatcher uses: a concurrent enqueue re-sorts the entries, so an index
    /// from [`peek`](Self::peek) may point at another packet by the time `dequeue` runs.
    ///
    /// # Errors
    /// - `Empty`: nothing queued
    pub fn take_due(
        &self,
        now: CounterUs,
    ) -> Result<Option<(DownlinkPacket, PacketType)>, JitError> {
        let (taken, dropped) = {
            let mut store = self.store.lock();
            let (selected, dropped) = self.peek_locked(&mut store, now)?;
            let taken = selected.map(|index| store.remove_at(index, self.policy.max_advance_us));
            (taken, dropped)
        };
        self.report_stale(&dropped, now);
        Ok(taken.map(|entry| {
            debug!(
                packet_type = %entry.packet_type,
                target_us = entry.packet.target_time_us,
                lead_us = delta_us(entry.packet.target_time_us, now),
                "downlink due"
            );
            (entry.packet, entry.packet_type)
        }))
    }

    fn peek_locked(
        &self,
        store: &mut QueueStore,
        now: CounterUs,
    ) -> Result<(Option<usize>, Vec<EntrySummary>), JitError> {
        if store.entries.is_empty() {
            return Err(JitError::Empty);
        }
        store.reference_us = now;

        let mut dropped = Vec::new();
        let mut i = 0;
        while i < store.entries.len() {
            let lead = delta_us(store.entries[i].packet.target_time_us, now);
            if lead >= self.policy.max_advance_us {
                let entry = store.remove_at(i, self.policy.max_advance_us);
                dropped.push(entry.summary());
                // The queue shrank and was re-sorted: scan again from the start.
                i = 0;
                continue;
            }
            i += 1;
        }

        let earliest = store
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index, delta_us(entry.packet.target_time_us, now)))
            .min_by_key(|&(_, lead)| lead);
        let selected = match earliest {
            Some((index, lead)) if lead < self.policy.jit_delay_us => Some(index),
            _ => None,
        };
        Ok((selected, dropped))
    }

    fn report_stale(&self, dropped: &[EntrySummary], now: CounterUs) {
        for entry in dropped {
            self.stats.record_stale_drop(entry.packet_type);
            warn!(
                packet_type = %entry.packet_type,
                target_us = entry.target_time_us,
                now_us = now,
                "dropping downlink that missed its slot"
            );
        }
    }

    /// Human-readable dump of the queue.
    pub fn describe(&self, show_all: bool) -> String {
        let store = self.store.lock();
        let mut out = String::new();
        if store.entries.is_empty() {
            out.push_str("queue is empty");
            return out;
        }
        let _ = write!(
            out,
            "queue contains {} packets ({} beacons)",
            store.entries.len(),
            store.beacon_count
        );
        if show_all {
            for (i, entry) in store.entries.iter().enumerate() {
                let _ = write!(
                    out,
                    "\n - node[{i}]: count_us={} pre={} post={} type={} size={}",
                    entry.packet.target_time_us,
                    entry.pre_delay_us,
                    entry.post_delay_us,
                    entry.packet_type,
                    entry.packet.len()
                );
            }
        }
        out
    }

    /// Log [`describe`](Self::describe) at INFO when `verbosity > 0`, DEBUG otherwise.
    pub fn print(&self, show_all: bool, verbosity: u8) {
        let text = self.describe(show_all);
        if verbosity > 0 {
            info!("[jit] {text}");
        } else {
            debug!("[jit] {text}");
        }
    }
}

impl std::fmt::Debug for JitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitQueue")
            .field("policy", &self.policy)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
