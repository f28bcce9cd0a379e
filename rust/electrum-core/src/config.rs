//! Session configuration.
//!
//! Every knob has a default and can be overridden from the environment:
//!
//! | variable | default |
//! |---|---|
//! | `ELECTRUM_REQUEST_TIMEOUT_MS` | 5000 |
//! | `ELECTRUM_MAX_PENDING` | 8192 |
//! | `ELECTRUM_PUSH_CAPACITY` | 1 |
//! | `ELECTRUM_NOTIFICATION_CAPACITY` | 16 |
//! | `ELECTRUM_MAX_LINE_LENGTH` | 8 MiB |

use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_PENDING: usize = 8192;
pub const DEFAULT_PUSH_CAPACITY: usize = 1;
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 16;
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on how long a request waits for its response.
    pub request_timeout: Duration,
    /// Requests beyond this many in flight are refused before sending.
    pub max_pending: usize,
    /// Capacity of each push listener channel.
    ///
    /// The reader loop blocks on a full listener channel, so a listener that
    /// stops draining stalls every frame behind it.
    pub push_capacity: usize,
    /// Capacity of the output channel of each subscription flow.
    pub notification_capacity: usize,
    /// Longest inbound line the stream transport accepts.
    pub max_line_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            push_capacity: DEFAULT_PUSH_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl SessionConfig {
    /// Defaults, overridden by any `ELECTRUM_*` variables that parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
        };

        let defaults = Self::default();
        Self {
            request_timeout: positive("ELECTRUM_REQUEST_TIMEOUT_MS")
                .map(|ms| Duration::from_millis(ms as u64))
                .unwrap_or(defaults.request_timeout),
            max_pending: positive("ELECTRUM_MAX_PENDING").unwrap_or(defaults.max_pending),
            push_capacity: positive("ELECTRUM_PUSH_CAPACITY").unwrap_or(defaults.push_capacity),
            notification_capacity: positive("ELECTRUM_NOTIFICATION_CAPACITY")
                .unwrap_or(defaults.notification_capacity),
            max_line_length: positive("ELECTRUM_MAX_LINE_LENGTH")
                .unwrap_or(defaults.max_line_length),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_push_capacity(mut self, capacity: usize) -> Self {
        self.push_capacity = capacity.max(1);
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }
}
