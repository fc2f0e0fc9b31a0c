//! Public types for the connection manager.

use std::time::Duration;

/// Connection state for the single hub session.
///
/// Transitions happen only through [`ConnectionManager`](crate::ConnectionManager)
/// methods; callers observe but never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Configuration for connection attempts and drop recovery.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Maximum reconnection attempts after an unexpected drop.
    pub reconnect_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub reconnect_initial_delay: Duration,
    /// Multiplier applied to the delay on each subsequent attempt.
    pub reconnect_backoff_factor: f64,
    /// Cap on the inter-attempt delay.
    pub reconnect_max_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_attempts: 3,
            reconnect_initial_delay: Duration::from_millis(250),
            reconnect_backoff_factor: 2.0,
            reconnect_max_delay: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Calculates the backoff delay for a given attempt number (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs =
            self.reconnect_initial_delay.as_secs_f64() * self.reconnect_backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.reconnect_max_delay.as_secs_f64()))
    }
}
