//! Guest-requested relative-time timers.
//!
//! Timers are polled by the guest, never pushed: `extern_register_timer` arms
//! one and `extern_check_timer` reads its expiry exactly once. Deadlines are
//! wall clock, not guest-tick clock. A registry is scoped to a single run.

use std::time::{Duration, Instant};

use crate::error::{BadgeError, BadgeResult};

#[derive(Debug, Clone, Copy)]
enum TimerCell {
    Pending { deadline: Instant },
    Expired,
    Cleared,
}

#[derive(Debug, Default)]
pub struct TimerRegistry {
    cells: Vec<TimerCell>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Arm a new timer expiring `ms` milliseconds from now. The returned
    /// handle is an index into the table and stays valid for the whole run.
    pub fn register(&mut self, ms: u32) -> u32 {
        let deadline = Instant::now() + Duration::from_millis(u64::from(ms));
        self.cells.push(TimerCell::Pending { deadline });
        (self.cells.len() - 1) as u32
    }

    /// Read-once expiry check: the first check past the deadline consumes the
    /// timer, every later one reports `false` until the handle is reissued.
    /// Unknown handles are a guest programming error.
    pub fn check(&mut self, id: u32) -> BadgeResult<bool> {
        let cell = self
            .cells
            .get_mut(id as usize)
            .ok_or(BadgeError::InvalidTimerHandle(id))?;

        if let TimerCell::Pending { deadline } = *cell {
            if Instant::now() >= deadline {
                *cell = TimerCell::Expired;
            }
        }

        match *cell {
            TimerCell::Expired => {
                *cell = TimerCell::Cleared;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Disarm a timer so it never reports expiry.
    pub fn cancel(&mut self, id: u32) -> BadgeResult<()> {
        let cell = self
            .cells
            .get_mut(id as usize)
            .ok_or(BadgeError::InvalidTimerHandle(id))?;
        *cell = TimerCell::Cleared;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_read_once() {
        let mut timers = TimerRegistry::new();
        let id = timers.register(10);

        std::thread::sleep(Duration::from_millis(20));
        assert!(timers.check(id).unwrap());
        assert!(!timers.check(id).unwrap());
        assert!(!timers.check(id).unwrap());
    }

    #[test]
    fn zero_duration_expires_immediately_once() {
        let mut timers = TimerRegistry::new();
        let id = timers.register(0);

        std::thread::sleep(Duration::from_millis(1));
        assert!(timers.check(id).unwrap());
        assert!(!timers.check(id).unwrap());
    }

    #[test]
    fn pending_timer_reports_false() {
        let mut timers = TimerRegistry::new();
        let id = timers.register(60_000);
        assert!(!timers.check(id).unwrap());
        // Still pending, so checking again is fine.
        assert!(!timers.check(id).unwrap());
    }

    #[test]
    fn handles_are_table_indices() {
        let mut timers = TimerRegistry::new();
        assert_eq!(timers.register(1), 0);
        assert_eq!(timers.register(1), 1);
        assert_eq!(timers.register(1), 2);
    }

    #[test]
    fn unknown_handle_fails_fast() {
        let mut timers = TimerRegistry::new();
        assert!(matches!(
            timers.check(3),
            Err(BadgeError::InvalidTimerHandle(3))
        ));
        assert!(matches!(
            timers.cancel(0),
            Err(BadgeError::InvalidTimerHandle(0))
        ));
    }

    #[test]
    fn cancel_suppresses_expiry() {
        let mut timers = TimerRegistry::new();
        let id = timers.register(0);
        timers.cancel(id).unwrap();

        std::thread::sleep(Duration::from_millis(1));
        assert!(!timers.check(id).unwrap());
    }
}
