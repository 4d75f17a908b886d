//! Wire formats: HTTP/1.1 heads, multipart upload bodies, and rendezvous frames.

pub mod http;
pub mod multipart;
pub mod rendezvous;

pub use http::{parse_request_head, HttpError, Method, RequestHead, ResponseHead, StatusCode};
pub use multipart::{boundary_from_content_type, MultipartError, MultipartEvent, MultipartParser};
pub use rendezvous::{InboundMessage, OutboundMessage};
