//! Concentrator clock arithmetic.
//!
//! The concentrator exposes a free-running 32-bit microsecond counter that wraps roughly every
//! 71.6 minutes. Every comparison in the scheduler goes through [`delta_us`], which is a plain
//! wrapping subtraction: "`a` is at most `x` after `b`" is written `delta_us(a, b) <= x` and stays
//! correct across the wrap.

use std::cmp::Ordering;

/// Microsecond timestamp read from the concentrator counter.
pub type CounterUs = u32;

/// Number of microseconds from `earlier` to `later`, modulo 2^32.
#[inline]
pub const fn delta_us(later: CounterUs, earlier: CounterUs) -> u32 {
    later.wrapping_sub(earlier)
}

/// Counter value `offset_us` after `base`, modulo 2^32.
#[inline]
pub const fn advance_us(base: CounterUs, offset_us: u32) -> CounterUs {
    base.wrapping_add(offset_us)
}

/// Whether `time` is no more than `window_us` after `reference`.
#[inline]
pub const fn within_us(time: CounterUs, reference: CounterUs, window_us: u32) -> bool {
    delta_us(time, reference) <= window_us
}

/// Total order on counter values seen from a critical point.
///
/// Values are compared by their distance past `critical`, so anything between `critical` and
/// `critical + 2^32` sorts in true chronological order even when the counter wrapped in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapOrder {
    critical: CounterUs,
}

impl WrapOrder {
    pub const fn new(critical: CounterUs) -> Self {
        Self { critical }
    }

    /// Critical point `lookback_us` before `now`.
    pub const fn looking_back(now: CounterUs, lookback_us: u32) -> Self {
        Self::new(now.wrapping_sub(lookback_us))
    }

    #[inline]
    pub const fn key(&self, time: CounterUs) -> u32 {
        delta_us(time, self.critical)
    }

    #[inline]
    pub fn cmp(&self, a: CounterUs, b: CounterUs) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_survives_wrap() {
        let before_wrap = u32::MAX - 99;
        let after_wrap = 400;
        assert_eq!(delta_us(after_wrap, before_wrap), 500);
        assert_eq!(advance_us(before_wrap, 500), after_wrap);
    }

    #[test]
    fn past_time_is_a_huge_delta() {
        assert_eq!(delta_us(1_000, 1_001), u32::MAX);
        assert!(!within_us(1_000, 1_001, 1_000_000));
    }

    #[test]
    fn wrap_order_sorts_across_wrap() {
        let order = WrapOrder::looking_back(u32::MAX - 10, 1_000);
        let mut times = vec![50u32, u32::MAX - 5, 10, u32::MAX - 500];
        times.sort_by(|a, b| order.cmp(*a, *b));
        assert_eq!(times, vec![u32::MAX - 500, u32::MAX - 5, 10, 50]);
    }
}
