// Copyright (c) 2026 Ben Schreiber. MIT License.
// See LICENSE for details.

//! # coinpass Core Library
//!
//! Clients register, log in, form groups, and pass a single coin around
//! each group. Two pieces carry every invariant in the system:
//!
//! - the **session authority**, which issues short-lived tokens bound to a
//!   username and a client address, and refuses them the moment anything
//!   about the binding looks off;
//! - **coin custody**, which lets only a group's current holder pass the
//!   coin and makes racing transfers resolve to exactly one winner.
//!
//! ## Architecture
//!
//! - **config**: Defaults for TTLs, retry schedule, ports.
//! - **identity**: Username and password character policy.
//! - **session**: Credential store, token lifecycle, expiry reaper.
//! - **auth**: The authentication gate in front of every protected call.
//! - **group**: Group model, membership, coin custody.
//! - **storage**: Directory traits and the sled-backed `CoinDb`.
//! - **retry**: Bounded retry for transient storage faults.
//! - **error**: The client-facing error taxonomy.
//! - **service**: `CoinService`, the facade the node's HTTP layer calls.
//!
//! Request flow: credentials → gate (user exists? token valid?) →
//! membership / custody → directory write → result.

pub mod auth;
pub mod config;
pub mod error;
pub mod group;
pub mod identity;
pub mod retry;
pub mod service;
pub mod session;
pub mod storage;

pub use error::{ServiceError, ServiceResult};
pub use service::{CoinService, ServiceConfig};
