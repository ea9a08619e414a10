//! Thread priority and core pinning for the dispatcher thread.
//!
//! Both calls are best effort. Failures are logged at DEBUG and otherwise ignored.

use tracing::debug;

/// Raise the scheduling priority of the calling thread.
///
/// On Linux the level maps to a real-time policy:
/// - `>= 3`: `SCHED_FIFO` 90
/// - `2`: `SCHED_FIFO` 70
/// - `1`: `SCHED_RR` 30
/// - `0`: `SCHED_OTHER`
///
/// # Arguments
/// * `level` - Priority level, from 0 (normal) to 3 (highest)
///
/// # Platform Support
/// - **Linux**: Uses `pthread_setschedparam` on the calling thread
/// - **Other platforms**: No-op, logged at DEBUG
pub fn set_thread_priority(level: i32) {
    #[cfg(target_os = "linux")]
    {
        use libc::{
            pthread_self, pthread_setschedparam, sched_param, SCHED_FIFO, SCHED_OTHER, SCHED_RR,
        };

        let (policy, sched_priority) = match level {
            l if l >= 3 => (SCHED_FIFO, 90),
            2 => (SCHED_FIFO, 70),
            1 => (SCHED_RR, 30),
            _ => (SCHED_OTHER, 0),
        };

        // SAFETY: sched_param is plain data and pthread_self is always a valid handle.
        let rc = unsafe {
            let mut param: sched_param = std::mem::zeroed();
            param.sched_priority = sched_priority;
            pthread_setschedparam(pthread_self(), policy, &param)
        };
        if rc != 0 {
            debug!(level, rc, "could not raise thread priority");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        debug!(level, "thread priority not supported on this platform");
    }
}

/// Pin the calling thread to `core_id`.
///
/// # Platform Support
/// - **Linux**: Uses `pthread_setaffinity_np` with a single-core set
/// - **Other platforms**: No-op, logged at DEBUG
pub fn set_thread_core(core_id: usize) {
    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, pthread_self, pthread_setaffinity_np, CPU_SET, CPU_ZERO};

        // SAFETY: cpu_set_t is plain data, initialised with CPU_ZERO before use.
        let rc = unsafe {
            let mut set: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut set);
            CPU_SET(core_id, &mut set);
            pthread_setaffinity_np(pthread_self(), std::mem::size_of::<cpu_set_t>(), &set)
        };
        if rc != 0 {
            debug!(core_id, rc, "could not pin thread");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        debug!(core_id, "thread pinning not supported on this platform");
    }
}
