//! Application layer for a LanSync node.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the pure domain types in
//! `lansync_core` and the infrastructure that talks to sockets, disks and
//! terminals.  It owns *when* domain operations run and what happens after
//! them (for example: "after a file is added to the catalog, push a fresh
//! snapshot to the UI").
//!
//! # Sub-modules
//!
//! - **`context`**     – [`context::ServerContext`], the single object that
//!   owns all mutable node state and is handed to every request handler and
//!   background task.
//! - **`broadcaster`** – Pushes immutable state snapshots to whoever renders
//!   the UI.
//! - **`routes`**      – The declarative HTTP route table, checked in a fixed
//!   order.
//! - **`api`**         – Error taxonomy and JSON bodies of the HTTP API.
//! - **`commands`**    – The presentation layer's command contract
//!   (select, remove, save, init, rotate).

pub mod api;
pub mod broadcaster;
pub mod commands;
pub mod context;
pub mod routes;
