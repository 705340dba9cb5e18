//! Virtual time
//!
//! Virtual time is a discrete, monotonically increasing tick counter shared
//! by every replica. It is distinct from wall-clock time: the drivers count
//! elapsed tick periods and bump the clock, so a late timer fire self-corrects
//! on the next one.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// A virtual-time tick
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualTime(pub u64);

impl VirtualTime {
    pub const ZERO: VirtualTime = VirtualTime(0);

    #[inline]
    pub fn new(tick: u64) -> Self {
        VirtualTime(tick)
    }

    #[inline]
    pub fn tick(self) -> u64 {
        self.0
    }

    /// The following tick
    #[inline]
    pub fn next(self) -> Self {
        VirtualTime(self.0 + 1)
    }

    /// Ticks from `earlier` up to `self`, zero if `earlier` is ahead
    #[inline]
    pub fn ticks_since(self, earlier: VirtualTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for VirtualTime {
    type Output = VirtualTime;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        VirtualTime(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualTime {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl fmt::Debug for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vt({})", self.0)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole ticks covering `span` at the given tick period, rounding up.
///
/// Used to express wall-clock delays (e.g. the postdate delay) in ticks.
/// A zero period yields zero; configurations reject it before it gets here.
pub fn ticks_in(span: Duration, period: Duration) -> u64 {
    let period_us = period.as_micros();
    if period_us == 0 {
        return 0;
    }
    (span.as_micros().div_ceil(period_us)) as u64
}

/// Wall-clock span covered by `ticks` at the given tick period
pub fn span_of(ticks: u64, period: Duration) -> Duration {
    Duration::from_micros((period.as_micros() as u64).saturating_mul(ticks))
}
