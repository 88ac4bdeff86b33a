//! Reconnect policy and connection status, independent of the transport.

use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// `min(max_delay, base_delay * 2^attempt)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting {
        attempt: u32,
    },
    Connected,
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    /// Terminal until the user restarts the connection.
    GaveUp {
        attempts: u32,
    },
    Stopped,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting { .. } => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting { .. } => "reconnecting",
            ConnectionStatus::GaveUp { .. } => "disconnected",
            ConnectionStatus::Stopped => "stopped",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::GaveUp { .. } | ConnectionStatus::Stopped)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting { attempt } if *attempt > 0 => {
                write!(f, "connecting (attempt {attempt})")
            }
            ConnectionStatus::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting in {}ms (attempt {attempt})", delay.as_millis())
            }
            ConnectionStatus::GaveUp { attempts } => {
                write!(f, "disconnected after {attempts} attempts, press r to retry")
            }
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

impl CloseDecision {
    pub fn status(&self) -> ConnectionStatus {
        match *self {
            CloseDecision::Retry { attempt, delay } => ConnectionStatus::Reconnecting { attempt, delay },
            CloseDecision::GiveUp { attempts } => ConnectionStatus::GaveUp { attempts },
        }
    }
}

/// Counts consecutive failures and decides what happens after each one.
#[derive(Debug, Clone, Default)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn on_connecting(&self) -> ConnectionStatus {
        ConnectionStatus::Connecting {
            attempt: self.attempt,
        }
    }

    pub fn on_open(&mut self) -> ConnectionStatus {
        self.attempt = 0;
        ConnectionStatus::Connected
    }

    /// Called after a close or a failed connect.
    pub fn on_close(&mut self) -> CloseDecision {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > self.policy.max_attempts {
            return CloseDecision::GiveUp {
                attempts: self.attempt - 1,
            };
        }
        CloseDecision::Retry {
            attempt: self.attempt,
            delay: self.policy.delay_for(self.attempt),
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
