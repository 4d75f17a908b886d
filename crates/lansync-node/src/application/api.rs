//! HTTP API error taxonomy and JSON bodies.
//!
//! Every per-request failure becomes an [`ApiError`], which knows its status
//! code and renders as `{ "success": false, "error": "<message>" }`.  None of
//! them are fatal to the listener.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lansync_core::StatusCode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Wrong passcode at `/api/login`.
    #[error("wrong passcode")]
    AuthenticationFailure,

    /// Missing or unknown session on a gated route.
    #[error("login required")]
    AuthorizationFailure,

    /// Unparseable body, head, or path.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Unknown download name or static asset.
    #[error("not found")]
    NotFound,

    #[error("body exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("Content-Length is required")]
    LengthRequired,

    #[error("request head too large")]
    HeadTooLarge,

    #[error("timed out waiting for the request")]
    RequestTimeout,

    /// Scratch storage could not be written; nothing was recorded.
    #[error("upload failed: {0}")]
    UploadFailure(String),

    /// A shared file exists but could not be opened or read.
    #[error("could not read file: {0}")]
    ReadFailure(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailure => StatusCode::Unauthorized,
            Self::AuthorizationFailure => StatusCode::Forbidden,
            Self::MalformedRequest(_) => StatusCode::BadRequest,
            Self::NotFound => StatusCode::NotFound,
            Self::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
            Self::LengthRequired => StatusCode::LengthRequired,
            Self::HeadTooLarge => StatusCode::HeaderFieldsTooLarge,
            Self::RequestTimeout => StatusCode::RequestTimeout,
            Self::UploadFailure(_) | Self::ReadFailure(_) => StatusCode::InternalServerError,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub passcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    /// Bearer token for `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub id: u64,
    pub name: String,
    pub sender: String,
}
