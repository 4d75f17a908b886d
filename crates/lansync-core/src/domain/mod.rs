//! Domain entities for LanSync.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Every type here is a plain synchronous struct; the node
//! crate wraps them in async mutexes and decides *when* to call them.
//!
//! # Why keep time out of the domain? (for beginners)
//!
//! Presence eviction and received-file ids depend on the clock.  Instead of
//! calling `Instant::now()` deep inside the logic, the operations that care
//! about time take the current instant as a parameter (`touch_at`,
//! `sweep_at`, `record_received_at`).  Production code passes the real clock;
//! tests pass hand-picked instants and get deterministic results.

pub mod auth;
pub mod catalog;
pub mod identity;
pub mod peers;
pub mod presence;
pub mod snapshot;
