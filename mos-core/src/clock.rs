//! Centisecond software clock (the guest's TIME counter).
//!
//! The counter holds hundredths of a second since an adjustable epoch,
//! truncated to 40 bits and wrapping silently. Writing the clock
//! rebases the epoch so an immediate read reproduces the written value.
//! The epoch is kept as a host `Instant` plus an offset rather than a
//! shifted `Instant`, so rebasing to a large counter value cannot
//! underflow host monotonic time.

use std::time::Instant;

/// The counter is 5 bytes wide.
pub const CLOCK_MASK: u64 = (1 << 40) - 1;

/// Centisecond clock with adjustable epoch.
pub struct CentiClock {
    base: Instant,
    offset: u64,
}

impl Default for CentiClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CentiClock {
    /// Clock reading zero at the moment of creation.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: 0,
        }
    }

    /// Current counter value, masked to 40 bits.
    pub fn read(&self) -> u64 {
        let elapsed_cs = self.base.elapsed().as_millis() as u64 / 10;
        elapsed_cs.wrapping_add(self.offset) & CLOCK_MASK
    }

    /// Rebase so the counter reads `value` now.
    pub fn write(&mut self, value: u64) {
        self.base = Instant::now();
        self.offset = value & CLOCK_MASK;
    }

    /// Centiseconds elapsed since `start` (an earlier `read`), modulo
    /// the counter width.
    pub fn elapsed_since(&self, start: u64) -> u64 {
        self.read().wrapping_sub(start) & CLOCK_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_near_zero() {
        let clock = CentiClock::new();
        assert!(clock.read() < 10);
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut clock = CentiClock::new();
        clock.write(123_456);
        let v = clock.read();
        assert!((123_456..123_458).contains(&v), "read back {v}");
    }

    #[test]
    fn test_write_masks_to_40_bits() {
        let mut clock = CentiClock::new();
        clock.write(u64::MAX);
        assert!(clock.read() <= CLOCK_MASK);
    }

    #[test]
    fn test_elapsed_since() {
        let mut clock = CentiClock::new();
        clock.write(500);
        let start = clock.read();
        assert!(clock.elapsed_since(start) < 2);
    }
}
