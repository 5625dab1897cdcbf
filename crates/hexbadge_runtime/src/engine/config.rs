use std::time::Duration;

use hexbadge_config::{BadgeConfig, UnsupportedMessage};

/// What to do when the guest emits a message variant the host has no
/// handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedMessagePolicy {
    /// Log a warning and drop the message; its request id never resolves.
    /// This is what the physical badge does.
    Drop,
    /// Abort the guest run.
    Fail,
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub unsupported_message: UnsupportedMessagePolicy,
    /// Timeout for proxied guest HTTP requests.
    pub http_timeout: Duration,
}

impl RuntimeOptions {
    pub fn create_from_badge_config(config: &BadgeConfig) -> Self {
        Self {
            unsupported_message: match config.ipc.unsupported_message {
                UnsupportedMessage::Drop => UnsupportedMessagePolicy::Drop,
                UnsupportedMessage::Fail => UnsupportedMessagePolicy::Fail,
            },
            http_timeout: Duration::from_millis(config.http.timeout_ms),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            unsupported_message: UnsupportedMessagePolicy::Drop,
            http_timeout: Duration::from_secs(30),
        }
    }
}
