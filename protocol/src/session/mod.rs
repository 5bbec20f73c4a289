//! # Session Authority
//!
//! In-memory issuance and validation of short-lived session tokens. A token
//! is an opaque random identifier bound to three things:
//!
//! - the **owner** username it was issued to,
//! - the client **address** that logged in,
//! - an **expiration** instant (`issued_at + ttl`).
//!
//! ## Architecture
//!
//! ```text
//! token.rs   — SessionToken generation, the Session record
//! error.rs   — Why a validation failed
//! store.rs   — CredentialStore: token map + identity index behind one lock
//! reaper.rs  — Periodic sweep of expired sessions
//! ```
//!
//! ## Invariants
//!
//! 1. At most one live session per username. Issuing a new one removes the
//!    previous token first.
//! 2. A session is valid strictly before its expiration instant.
//! 3. Any mismatch between the presented identity/address and the session's
//!    binding evicts the session before the failure is returned. A leaked
//!    token cannot be retried with different claims.
//!
//! The token map and the identity index are guarded by a single
//! `parking_lot::Mutex`, which makes issue, validate, revoke and sweep
//! linearizable with respect to each other. Nothing here is persisted:
//! restarting the node logs everybody out.

pub mod error;
pub mod reaper;
pub mod store;
pub mod token;

pub use error::SessionError;
pub use reaper::{spawn_reaper, spawn_reaper_with};
pub use store::{CredentialStore, SessionConfig};
pub use token::{Session, SessionToken};
