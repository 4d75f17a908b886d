//! Infrastructure layer for a LanSync node.
//!
//! OS-facing adapters: the HTTP listener, the rendezvous WebSocket client,
//! interface enumeration, the presence timer, the public tunnel seam,
//! configuration files, and the console bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lansync_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod http_server;
pub mod network_identity;
pub mod presence_sweep;
pub mod storage;
pub mod tracker_sync;
pub mod tunnel;
pub mod ui_bridge;
