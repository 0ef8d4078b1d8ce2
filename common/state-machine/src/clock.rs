// Licensed under the Apache-2.0 license

/// Monotonic time expressed in scheduler ticks. The tick period is platform
/// defined; services only ever compare tick counts.
pub type Tick = u64;

/// Source of the current tick count.
///
/// Implementations must be monotonically non-decreasing. On hardware this
/// wraps the machine timer; tests drive a hand-advanced counter.
pub trait Clock {
    fn now(&self) -> Tick;
}

/// Returns whether at least `duration` ticks have passed since `reference`.
///
/// Saturates instead of wrapping, so a reference taken "in the future"
/// (e.g. before a clock reset) reads as not-yet-elapsed rather than as a
/// huge elapsed interval.
pub fn is_elapsed(now: Tick, reference: Tick, duration: Tick) -> bool {
    now.saturating_sub(reference) >= duration
}
