//! # Reconnect Supervisor
//!
//! Decides when a device that hit a fatal I/O error gets another open
//! attempt. The worker does the sleeping and opening; this type only keeps
//! the counters.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fatal error                                                            │
//! │     │                                                                   │
//! │     ├── previous trigger < 5s ago ─────────────► Skip                   │
//! │     ▼                                                                   │
//! │  attempts += 1 ── attempts > max (3) ──────────► Exhausted (Failed)     │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Retry { delay = 2s × attempts }                                        │
//! │     sleep delay, force close, sleep 1s, open                            │
//! │        ├── ok ───► attempts = 0                                         │
//! │        └── err ──► on_retry_failed() (same schedule, no 5s check)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use scanlink_core::DEFAULT_MAX_RECONNECT_ATTEMPTS;

/// Timing and bounds of automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
    /// Pause between closing and reopening.
    pub settle: Duration,
    /// Fatal errors closer together than this are ignored.
    pub min_interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            settle: Duration::from_secs(1),
            min_interval: Duration::from_secs(5),
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// What the worker should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// A reconnect was triggered moments ago; do nothing.
    Skip,
    /// Wait `delay`, then run attempt number `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// The budget is spent; an operator has to reconnect.
    Exhausted { attempts: u32 },
}

/// Attempt counter for one device.
#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    attempts: u32,
    last_trigger: Option<Instant>,
}

impl ReconnectSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            last_trigger: None,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called when the session reports a fatal error.
    pub fn on_fatal(&mut self, now: Instant) -> ReconnectStep {
        if let Some(last) = self.last_trigger {
            if now.saturating_duration_since(last) < self.policy.min_interval {
                return ReconnectStep::Skip;
            }
        }
        self.last_trigger = Some(now);
        self.next_attempt()
    }

    /// Called when a reconnect attempt failed to open the port.
    pub fn on_retry_failed(&mut self) -> ReconnectStep {
        self.next_attempt()
    }

    pub fn on_success(&mut self) {
        self.attempts = 0;
    }

    /// Clears all state. Used for operator connects and disconnects.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_trigger = None;
    }

    fn next_attempt(&mut self) -> ReconnectStep {
        self.attempts += 1;
        if self.attempts > self.policy.max_attempts {
            return ReconnectStep::Exhausted {
                attempts: self.attempts - 1,
            };
        }
        ReconnectStep::Retry {
            attempt: self.attempts,
            delay: self.policy.base_delay * self.attempts,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
