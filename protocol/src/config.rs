//! # Service Configuration & Constants
//!
//! Every tunable default in coinpass lives here. Runtime overrides come in
//! through the node's CLI; the library only ever sees the resulting values
//! via [`SessionConfig`](crate::session::SessionConfig),
//! [`RetryPolicy`](crate::retry::RetryPolicy) and
//! [`ReselectionPolicy`](crate::group::ReselectionPolicy).

use std::time::Duration;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Lifetime of an issued session token. A session is valid strictly before
/// `issued_at + SESSION_TTL`.
pub const SESSION_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// How often the background reaper sweeps expired sessions out of the
/// credential store.
pub const SESSION_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Identity Policy
// ---------------------------------------------------------------------------

/// Longest accepted username, in bytes. Usernames are ASCII, so bytes and
/// characters coincide.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Longest accepted password, in bytes. Argon2 will happily hash megabytes;
/// we would rather not.
pub const MAX_SECRET_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Coin counter value of a freshly created group.
pub const INITIAL_COIN: u64 = 1;

// ---------------------------------------------------------------------------
// Persistence Retry
// ---------------------------------------------------------------------------

/// Attempts made against the directory before a transient fault is reported
/// as `PersistenceUnavailable`. Includes the first try.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry. Doubles on each subsequent attempt.
pub const RETRY_BASE_BACKOFF: Duration = Duration::from_millis(20);

/// Ceiling for the exponential backoff.
pub const RETRY_MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound of the random jitter added to every backoff.
pub const RETRY_JITTER: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Default port for the HTTP API.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9090;
