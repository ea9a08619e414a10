//! Downlink scheduling: the JIT queue and the thread that drains it.

pub mod dispatcher;
pub mod jit_queue;

pub use dispatcher::{JitDispatcher, TxEvent, TxOutcome};
pub use jit_queue::{EntrySummary, JitQueue, QueueEntry};
