//! # lansync-core
//!
//! Shared library for LanSync containing the node's in-memory domain state,
//! the HTTP/1.1 and `multipart/form-data` codecs used by the transfer server,
//! and the JSON messages spoken on the rendezvous channel.
//!
//! This crate has zero dependencies on sockets, async runtimes, or the file
//! system.  Everything here can be exercised from plain unit tests.
//!
//! # Architecture overview (for beginners)
//!
//! LanSync lets devices on the same network (or bridged through a public
//! relay) swap files without a permanent server.  Each desktop node runs a
//! small HTTP server; phones and other browsers log in with a 4-digit
//! passcode, list the files the desktop is sharing, download them, and upload
//! files of their own into the desktop's inbox.
//!
//! - **`domain`** – The state a node owns: the passcode and sessions
//!   (`auth`), shared and received files (`catalog`), recently-seen clients
//!   (`presence`), the peer table cached from the rendezvous service
//!   (`peers`), local address selection (`identity`), and the snapshot pushed
//!   to the user interface (`snapshot`).
//!
//! - **`protocol`** – How bytes travel: parsing HTTP request heads, encoding
//!   response heads, incrementally splitting multipart upload bodies, and the
//!   rendezvous JSON frames.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `lansync_core::FileCatalog` instead of `lansync_core::domain::catalog::FileCatalog`.
pub use domain::auth::{AuthError, AuthState, Passcode, Session};
pub use domain::catalog::{CatalogError, FileCatalog, ReceivedFile, SharedFile};
pub use domain::identity::{select_local_address, AdapterPolicy, InterfaceAddr};
pub use domain::peers::{PeerRecord, PeerTable};
pub use domain::presence::PresenceTracker;
pub use domain::snapshot::{ReceivedFileView, StateSnapshot, TrackerStatus};
pub use protocol::http::{HttpError, Method, RequestHead, ResponseHead, StatusCode};
pub use protocol::multipart::{MultipartError, MultipartEvent, MultipartParser, PartHeaders};
pub use protocol::rendezvous::{InboundMessage, OutboundMessage};
