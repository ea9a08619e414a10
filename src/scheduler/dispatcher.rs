//! JIT dispatcher thread.
//!
//! Polls the queue with the concentrator clock and hands every due downlink to the radio. One
//! dispatcher serves one queue/concentrator pair.
//!
//! Each tick:
//! 1. Read the concentrator counter
//! 2. Take the entry due within the JIT window (stale entries are dropped by the queue)
//! 3. Check the radio TX state: a frame still on air means the due one is lost, a pending frame
//!    is overwritten
//! 4. Program the frame and publish a [`TxEvent`] for observers
//! 5. Sleep for the poll interval when nothing was due

use crate::clock::{delta_us, CounterUs};
use crate::concentrator::{Concentrator, TxStatus};
use crate::config::DispatcherConfig;
use crate::error::JitError;
use crate::packet::DownlinkPacket;
use crate::packet_type::PacketType;
use crate::scheduler::jit_queue::JitQueue;
use crate::threading::{set_thread_core, set_thread_priority};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the event channel; events are dropped when observers fall behind.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What happened to a downlink taken from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Programmed into a free radio.
    Sent,
    /// Programmed, replacing a frame that was still waiting for its slot.
    SentOverwriting,
    /// Lost: the radio was still emitting.
    Busy,
    /// Lost: the radio refused the frame.
    Failed(String),
}

impl TxOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TxOutcome::Sent | TxOutcome::SentOverwriting)
    }
}

/// Report published for every downlink the dispatcher handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub packet_id: u64,
    pub packet_type: PacketType,
    pub target_time_us: CounterUs,
    pub dispatched_at_us: CounterUs,
    pub outcome: TxOutcome,
}

/// Drains a [`JitQueue`] into a [`Concentrator`].
pub struct JitDispatcher {
    queue: Arc<JitQueue>,
    concentrator: Arc<dyn Concentrator>,
    config: DispatcherConfig,
    events: Sender<TxEvent>,
    dropped_events: AtomicU64,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JitDispatcher {
    /// Build a dispatcher and the receiving end of its event channel.
    ///
    /// # Arguments
    /// * `queue` - Queue to drain, usually shared with the producers
    /// * `concentrator` - Radio that provides the counter time and takes the frames
    /// * `config` - Poll interval plus the priority and core of the dispatcher thread
    ///
    /// # Returns
    /// The dispatcher (not yet running) and a bounded receiver of [`TxEvent`]s. Events are
    /// dropped, and counted in [`dropped_events`](Self::dropped_events), when nobody drains it.
    pub fn new(
        queue: Arc<JitQueue>,
        concentrator: Arc<dyn Concentrator>,
        config: DispatcherConfig,
    ) -> (Self, Receiver<TxEvent>) {
        let (events, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        let dispatcher = Self {
            queue,
            concentrator,
            config,
            events,
            dropped_events: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        };
        (dispatcher, receiver)
    }

    pub fn queue(&self) -> &Arc<JitQueue> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Events lost because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Run one tick at the concentrator's current time.
    pub fn run_once(&self) -> Option<TxEvent> {
        self.run_at(self.concentrator.now_us())
    }

    /// Run one tick as if the concentrator counter read `now`.
    pub fn run_at(&self, now: CounterUs) -> Option<TxEvent> {
        match self.queue.take_due(now) {
            Ok(Some((packet, packet_type))) => Some(self.dispatch(now, packet, packet_type)),
            Ok(None) | Err(JitError::Empty) => None,
            Err(err) => {
                warn!(error = %err, "jit peek failed");
                None
            }
        }
    }

    fn dispatch(&self, now: CounterUs, packet: DownlinkPacket, packet_type: PacketType) -> TxEvent {
        let lead_us = delta_us(packet.target_time_us, now);
        let outcome = match self.concentrator.tx_status() {
            TxStatus::Emitting => {
                error!(
                    packet_type = %packet_type,
                    target_us = packet.target_time_us,
                    "concentrator is currently emitting, downlink lost"
                );
                TxOutcome::Busy
            }
            TxStatus::Scheduled => {
                warn!("a downlink was already scheduled, overwriting it");
                self.send(&packet, TxOutcome::SentOverwriting)
            }
            TxStatus::Free => self.send(&packet, TxOutcome::Sent),
        };

        if outcome.is_sent() {
            self.queue.stats().record_transmitted(packet_type);
            info!(
                packet_type = %packet_type,
                target_us = packet.target_time_us,
                lead_us,
                size = packet.len(),
                "downlink programmed"
            );
        } else {
            self.queue.stats().record_tx_failed(packet_type);
        }

        let event = TxEvent {
            packet_id: packet.id,
            packet_type,
            target_time_us: packet.target_time_us,
            dispatched_at_us: now,
            outcome,
        };
        if self.events.try_send(event.clone()).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    fn send(&self, packet: &DownlinkPacket, on_success: TxOutcome) -> TxOutcome {
        match self.concentrator.send(packet) {
            Ok(()) => on_success,
            Err(err) => {
                error!(error = %err, target_us = packet.target_time_us, "transmission failed");
                TxOutcome::Failed(err.to_string())
            }
        }
    }

    /// Spawn the dispatcher thread.
    ///
    /// The thread is named `JIT-Dispatcher`. It applies the configured priority and core
    /// pinning, then ticks until [`stop`](Self::stop) is called, sleeping for the poll interval
    /// whenever nothing was due. Does nothing if the thread is already running.
    ///
    /// # Errors
    /// The OS error if the thread could not be spawned.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::Relaxed);

        let dispatcher = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let poll_interval = self.config.poll_interval();
        let core = self.config.core;
        let priority = self.config.thread_priority;

        let spawned = std::thread::Builder::new()
            .name("JIT-Dispatcher".to_string())
            .spawn(move || {
                set_thread_priority(priority);
                if let Some(core) = core {
                    set_thread_core(core);
                }
                debug!("jit dispatcher started");
                while running.load(Ordering::Relaxed) {
                    if dispatcher.run_once().is_none() {
                        std::thread::sleep(poll_interval);
                    }
                }
                debug!("jit dispatcher stopped");
            });
        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(join) = self.handle.lock().take() {
            if join.join().is_err() {
                error!("jit dispatcher thread panicked");
            }
        }
    }
}
