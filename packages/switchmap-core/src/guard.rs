//! Serialization of discovery passes: one at a time, and not more often than
//! a cooldown allows.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardBusy {
    #[error("A discovery pass is already in progress")]
    InProgress,

    #[error(
        "Last discovery started at {last_start}; next pass allowed in {} s",
        .remaining.num_seconds()
    )]
    CoolingDown {
        last_start: DateTime<Utc>,
        remaining: Duration,
    },
}

#[derive(Debug, Default)]
struct GuardState {
    running: bool,
    last_start: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct RunGuard {
    cooldown: Duration,
    state: Mutex<GuardState>,
}

impl RunGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_last_run(cooldown, None)
    }

    /// Guard resuming from a previously recorded pass start
    pub fn with_last_run(cooldown: Duration, last_start: Option<DateTime<Utc>>) -> Self {
        Self {
            cooldown,
            state: Mutex::new(GuardState {
                running: false,
                last_start,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn last_start(&self) -> Option<DateTime<Utc>> {
        self.state().last_start
    }

    /// Start a pass at `now` if none is running and the cooldown has elapsed.
    pub fn try_acquire(&self, now: DateTime<Utc>) -> Result<RunPermit<'_>, GuardBusy> {
        self.acquire(now, false)
    }

    /// Start a pass ignoring the cooldown. A running pass still blocks.
    pub fn try_acquire_forced(&self, now: DateTime<Utc>) -> Result<RunPermit<'_>, GuardBusy> {
        self.acquire(now, true)
    }

    fn acquire(&self, now: DateTime<Utc>, force: bool) -> Result<RunPermit<'_>, GuardBusy> {
        let mut state = self.state();

        if state.running {
            return Err(GuardBusy::InProgress);
        }

        if !force {
            if let Some(last_start) = state.last_start {
                let elapsed = now - last_start;
                if elapsed < self.cooldown {
                    return Err(GuardBusy::CoolingDown {
                        last_start,
                        remaining: self.cooldown - elapsed,
                    });
                }
            }
        }

        state.running = true;
        state.last_start = Some(now);
        tracing::debug!("Discovery permit granted at {}", now.to_rfc3339());

        Ok(RunPermit { guard: self, started_at: now })
    }
}

/// Held for the duration of one pass; released on drop
#[derive(Debug)]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
    started_at: DateTime<Utc>,
}

impl RunPermit<'_> {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn release(self) {}
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.state().running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let guard = RunGuard::new(Duration::zero());
        let now = Utc::now();

        let permit = guard.try_acquire(now).unwrap();
        assert_eq!(guard.try_acquire(now).unwrap_err(), GuardBusy::InProgress);
        assert_eq!(guard.try_acquire_forced(now).unwrap_err(), GuardBusy::InProgress);

        permit.release();
        assert!(guard.try_acquire(now).is_ok());
    }

    #[test]
    fn test_cooldown_measured_from_last_start() {
        let guard = RunGuard::new(Duration::minutes(15));
        let t0 = Utc::now();

        drop(guard.try_acquire(t0).unwrap());

        match guard.try_acquire(t0 + Duration::minutes(10)) {
            Err(GuardBusy::CoolingDown { remaining, last_start }) => {
                assert_eq!(remaining, Duration::minutes(5));
                assert_eq!(last_start, t0);
            }
            other => panic!("expected cooldown, got {:?}", other),
        }

        assert!(guard.try_acquire(t0 + Duration::minutes(15)).is_ok());
        assert_eq!(guard.last_start(), Some(t0 + Duration::minutes(15)));
    }

    #[test]
    fn test_resumes_from_recorded_run() {
        let t0 = Utc::now();
        let guard = RunGuard::with_last_run(Duration::minutes(15), Some(t0));

        assert!(guard.try_acquire(t0 + Duration::minutes(1)).is_err());
        let permit = guard.try_acquire_forced(t0 + Duration::minutes(1)).unwrap();
        assert_eq!(permit.started_at(), t0 + Duration::minutes(1));
    }
}
