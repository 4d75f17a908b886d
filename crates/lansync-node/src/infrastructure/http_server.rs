//! Transfer server: the HTTP listener peers and browsers talk to.
//!
//! # Connection model
//!
//! One request per connection.  The accept loop spawns a task per socket;
//! each task reads the request head, touches presence for the caller's IP,
//! resolves the route, applies the auth gate, runs the handler and closes the
//! socket with `Connection: close`.  A slow upload or download only ever
//! occupies its own task, so other peers are routed and answered while it
//! runs.
//!
//! # Failure isolation
//!
//! Handlers return [`RequestError`].  API errors become a JSON error response;
//! I/O errors (usually the peer hanging up mid-transfer) are logged at `warn`
//! and the task ends.  Neither reaches the accept loop.
//!
//! # Streaming
//!
//! Downloads are opened lazily, so a file deleted after it was shared is a
//! 404 at request time.  Once the response head is written the open handle
//! is streamed to completion even if the name is unshared meanwhile.
//!
//! Uploads run through [`MultipartParser`] and are written straight to the
//! scratch directory; the catalog is only updated after the whole body has
//! arrived and the file is flushed.  Any failure removes the partial file.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lansync_core::protocol::http::{
    attachment_disposition, content_type_for, decode_path_segment, parse_request_head,
    static_asset_path,
};
use lansync_core::protocol::multipart::boundary_from_content_type;
use lansync_core::{
    HttpError, MultipartEvent, MultipartParser, RequestHead, ResponseHead, StatusCode,
};

use crate::application::api::{ApiError, LoginRequest, LoginResponse, UploadResponse};
use crate::application::context::ServerContext;
use crate::application::routes::{Route, RouteTable};

/// Time a client gets to send the complete request head.
pub const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest gap tolerated between two body reads.
const BODY_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const LOGIN_BODY_LIMIT: u64 = 16 * 1024;

/// Cap on the `sender` multipart text field.
const SENDER_FIELD_LIMIT: usize = 256;

const READ_CHUNK: usize = 64 * 1024;

/// How long unread request bytes are drained after the response is sent.
const LINGER_TIMEOUT: Duration = Duration::from_secs(2);
const LINGER_MAX_BYTES: usize = 1024 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
enum HeadError {
    #[error("connection closed before a request arrived")]
    Closed,

    #[error("request head not received within {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Http(#[from] HttpError),
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct HttpServer {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    routes: Arc<RouteTable>,
}

impl HttpServer {
    /// Binds the listener, creates the scratch directory and records the
    /// actual port (which differs from `addr` when binding port 0).
    ///
    /// # Errors
    ///
    /// Fails if the scratch directory cannot be created or the address is in
    /// use.
    pub async fn bind(addr: SocketAddr, ctx: Arc<ServerContext>) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&ctx.settings.scratch_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create scratch directory {}",
                    ctx.settings.scratch_dir.display()
                )
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind transfer server on {addr}"))?;
        let local = listener.local_addr()?;
        ctx.set_port(local.port()).await;

        let routes = Arc::new(RouteTable::standard(ctx.settings.upload_requires_auth));
        Ok(Self {
            listener,
            ctx,
            routes,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `running` is cleared.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("transfer server listening on {}", self.local_addr()?);

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the shutdown flag is seen even when idle.
            match timeout(Duration::from_millis(200), self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    debug!("connection from {peer}");
                    let ctx = Arc::clone(&self.ctx);
                    let routes = Arc::clone(&self.routes);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, ctx, routes).await;
                    });
                }
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }

        Ok(())
    }
}

// ── Per-connection handling ───────────────────────────────────────────────────

/// Runs [`serve_connection`] and logs the outcome.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    routes: Arc<RouteTable>,
) {
    match serve_connection(&mut stream, peer, &ctx, &routes).await {
        Ok(()) => {}
        Err(RequestError::Api(e)) => {
            debug!("request from {peer} rejected: {e}");
            if let Err(io_err) = write_error(&mut stream, &e).await {
                debug!("could not send error response to {peer}: {io_err}");
            }
        }
        Err(RequestError::Io(e)) => warn!("connection {peer} failed: {e}"),
    }
    close_gracefully(stream).await;
}

async fn serve_connection(
    stream: &mut TcpStream,
    peer: SocketAddr,
    ctx: &Arc<ServerContext>,
    routes: &RouteTable,
) -> Result<(), RequestError> {
    let (head, leftover) = match read_head(stream).await {
        Ok(parsed) => parsed,
        Err(HeadError::Closed) => return Ok(()),
        Err(HeadError::TimedOut(_)) => return Err(ApiError::RequestTimeout.into()),
        Err(HeadError::Io(e)) => return Err(e.into()),
        Err(HeadError::Http(HttpError::HeadTooLarge { .. })) => {
            return Err(ApiError::HeadTooLarge.into())
        }
        Err(HeadError::Http(e)) => return Err(ApiError::MalformedRequest(e.to_string()).into()),
    };

    // Every request counts as "seen", gated route or not.
    ctx.touch_presence(&peer.ip().to_string()).await;

    let matched = routes
        .resolve(&head.method, &head.path)
        .ok_or(ApiError::NotFound)?;
    debug!(method = head.method.as_str(), path = %head.path, route = ?matched.route, "request");

    if matched.requires_auth {
        let authorized = match head.bearer_token() {
            Some(token) => ctx.is_authenticated(token).await,
            None => false,
        };
        if !authorized {
            return Err(ApiError::AuthorizationFailure.into());
        }
    }

    match matched.route {
        Route::Preflight => {
            let response = base_head(StatusCode::NoContent).content_length(0);
            stream.write_all(&response.encode()).await?;
            Ok(())
        }
        Route::Login => handle_login(stream, peer, &head, leftover, ctx).await,
        Route::ListFiles => write_json(stream, StatusCode::Ok, &ctx.shared_names().await).await,
        Route::Upload => handle_upload(stream, peer, &head, leftover, ctx).await,
        Route::Download => handle_download(stream, &head, ctx).await,
        Route::StaticAsset => serve_static(stream, &head, ctx).await,
    }
}

/// Reads until a complete request head is buffered.  Returns the head and
/// any body bytes that arrived with it.
async fn read_head(stream: &mut TcpStream) -> Result<(RequestHead, Vec<u8>), HeadError> {
    let deadline = Instant::now() + HEAD_READ_TIMEOUT;
    let mut buf = Vec::with_capacity(2048);
    let mut chunk = [0u8; 4096];

    loop {
        if let Some((head, consumed)) = parse_request_head(&buf)? {
            let leftover = buf.split_off(consumed);
            return Ok((head, leftover));
        }
        let n = match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => return Err(HeadError::TimedOut(HEAD_READ_TIMEOUT)),
        };
        if n == 0 {
            return Err(HeadError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Drains unread request bytes briefly before closing, so the peer sees our
/// response instead of a reset.
async fn close_gracefully(mut stream: TcpStream) {
    let _ = stream.shutdown().await;
    let mut scratch = [0u8; 4096];
    let drain = async {
        let mut drained = 0usize;
        while drained < LINGER_MAX_BYTES {
            match stream.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
    };
    let _ = timeout(LINGER_TIMEOUT, drain).await;
}

// ── Request bodies ────────────────────────────────────────────────────────────

/// Declared body length.  Chunked and length-less bodies are refused.
fn body_length(head: &RequestHead) -> Result<u64, ApiError> {
    if head.is_chunked() {
        return Err(ApiError::LengthRequired);
    }
    match head.content_length() {
        Ok(Some(len)) => Ok(len),
        Ok(None) => Err(ApiError::LengthRequired),
        Err(e) => Err(ApiError::MalformedRequest(e.to_string())),
    }
}

/// Yields exactly `remaining` body bytes: first the ones buffered with the
/// head, then from the socket.
struct BodyReader {
    leftover: Vec<u8>,
    remaining: u64,
    buf: Vec<u8>,
}

impl BodyReader {
    fn new(mut leftover: Vec<u8>, length: u64) -> Self {
        let keep = leftover.len().min(usize::try_from(length).unwrap_or(usize::MAX));
        leftover.truncate(keep);
        Self {
            remaining: length - keep as u64,
            leftover,
            buf: vec![0u8; READ_CHUNK],
        }
    }

    async fn next_chunk(&mut self, stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
        if !self.leftover.is_empty() {
            return Ok(Some(std::mem::take(&mut self.leftover)));
        }
        if self.remaining == 0 {
            return Ok(None);
        }

        let want = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(self.buf.len());
        let n = match timeout(BODY_IDLE_TIMEOUT, stream.read(&mut self.buf[..want])).await {
            Ok(read) => read?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "request body stalled",
                ))
            }
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed before the body was complete",
            ));
        }
        self.remaining -= n as u64;
        Ok(Some(self.buf[..n].to_vec()))
    }
}

async fn read_small_body(
    stream: &mut TcpStream,
    head: &RequestHead,
    leftover: Vec<u8>,
    limit: u64,
) -> Result<Vec<u8>, RequestError> {
    let length = body_length(head)?;
    if length > limit {
        return Err(ApiError::PayloadTooLarge { limit }.into());
    }
    let mut reader = BodyReader::new(leftover, length);
    let mut body = Vec::with_capacity(length as usize);
    while let Some(chunk) = reader.next_chunk(stream).await? {
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ── Login ─────────────────────────────────────────────────────────────────────

async fn handle_login(
    stream: &mut TcpStream,
    peer: SocketAddr,
    head: &RequestHead,
    leftover: Vec<u8>,
    ctx: &ServerContext,
) -> Result<(), RequestError> {
    let body = read_small_body(stream, head, leftover, LOGIN_BODY_LIMIT).await?;
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::MalformedRequest(format!("login body: {e}")))?;

    match ctx.login(&request.passcode).await {
        Ok(session) => {
            info!("login from {peer} accepted");
            let response = LoginResponse {
                success: true,
                token: Some(session.token.to_string()),
            };
            write_json(stream, StatusCode::Ok, &response).await
        }
        Err(e) => {
            info!("login from {peer} rejected: {e}");
            Err(ApiError::AuthenticationFailure.into())
        }
    }
}

// ── Upload ────────────────────────────────────────────────────────────────────

/// A fully written upload, not yet in the catalog.
#[derive(Debug)]
struct StoredUpload {
    name: String,
    path: PathBuf,
    bytes: u64,
    sender: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    File,
    Sender,
    Ignored,
}

/// Applies multipart events: the first file part goes to the scratch
/// directory, a `sender` text field is captured, everything else is dropped.
struct UploadSink {
    scratch_dir: PathBuf,
    current: PartKind,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    name: Option<String>,
    bytes: u64,
    file_complete: bool,
    field: Vec<u8>,
    sender: Option<String>,
}

impl UploadSink {
    fn new(scratch_dir: PathBuf) -> Self {
        Self {
            scratch_dir,
            current: PartKind::Ignored,
            writer: None,
            path: None,
            name: None,
            bytes: 0,
            file_complete: false,
            field: Vec::new(),
            sender: None,
        }
    }

    async fn apply(&mut self, event: MultipartEvent) -> Result<(), ApiError> {
        match event {
            MultipartEvent::PartStart(headers) => {
                if headers.is_file() && self.path.is_none() {
                    let name = headers.safe_filename().ok_or_else(|| {
                        ApiError::MalformedRequest("file part has no usable name".into())
                    })?;
                    let path = self.scratch_dir.join(format!("{}-{name}", Uuid::new_v4()));
                    // Record the path first so discard() cleans up even if
                    // creation half-succeeded.
                    self.path = Some(path.clone());
                    let file = File::create(&path)
                        .await
                        .map_err(|e| ApiError::UploadFailure(e.to_string()))?;
                    self.writer = Some(BufWriter::new(file));
                    self.name = Some(name);
                    self.current = PartKind::File;
                } else if !headers.is_file() && headers.name.as_deref() == Some("sender") {
                    self.field.clear();
                    self.current = PartKind::Sender;
                } else {
                    self.current = PartKind::Ignored;
                }
            }
            MultipartEvent::Data(bytes) => match self.current {
                PartKind::File => {
                    if let Some(writer) = self.writer.as_mut() {
                        writer
                            .write_all(&bytes)
                            .await
                            .map_err(|e| ApiError::UploadFailure(e.to_string()))?;
                        self.bytes += bytes.len() as u64;
                    }
                }
                PartKind::Sender => {
                    if self.field.len() + bytes.len() > SENDER_FIELD_LIMIT {
                        return Err(ApiError::MalformedRequest("sender field too long".into()));
                    }
                    self.field.extend_from_slice(&bytes);
                }
                PartKind::Ignored => {}
            },
            MultipartEvent::PartEnd => {
                match self.current {
                    PartKind::File => {
                        if let Some(mut writer) = self.writer.take() {
                            writer
                                .flush()
                                .await
                                .map_err(|e| ApiError::UploadFailure(e.to_string()))?;
                            writer
                                .get_mut()
                                .sync_all()
                                .await
                                .map_err(|e| ApiError::UploadFailure(e.to_string()))?;
                        }
                        self.file_complete = true;
                    }
                    PartKind::Sender => {
                        let value = String::from_utf8(std::mem::take(&mut self.field))
                            .map_err(|_| {
                                ApiError::MalformedRequest("sender field is not UTF-8".into())
                            })?;
                        let value = value.trim();
                        if !value.is_empty() {
                            self.sender = Some(value.to_string());
                        }
                    }
                    PartKind::Ignored => {}
                }
                self.current = PartKind::Ignored;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<StoredUpload, ApiError> {
        match (self.file_complete, self.name.take(), self.path.take()) {
            (true, Some(name), Some(path)) => Ok(StoredUpload {
                name,
                path,
                bytes: self.bytes,
                sender: self.sender.take(),
            }),
            (_, name, path) => {
                self.name = name;
                self.path = path;
                Err(ApiError::MalformedRequest(
                    "upload contains no complete file part".into(),
                ))
            }
        }
    }

    /// Removes any partially written scratch file.
    async fn discard(&mut self) {
        self.writer = None;
        if let Some(path) = self.path.take() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("could not remove partial upload {}: {e}", path.display());
                }
            }
        }
    }
}

async fn receive_upload(
    stream: &mut TcpStream,
    reader: &mut BodyReader,
    parser: &mut MultipartParser,
    sink: &mut UploadSink,
) -> Result<StoredUpload, RequestError> {
    while let Some(chunk) = reader.next_chunk(stream).await? {
        let events = parser
            .feed(&chunk)
            .map_err(|e| ApiError::MalformedRequest(e.to_string()))?;
        for event in events {
            sink.apply(event).await?;
        }
    }
    parser
        .finish()
        .map_err(|e| ApiError::MalformedRequest(e.to_string()))?;
    Ok(sink.finish()?)
}

async fn handle_upload(
    stream: &mut TcpStream,
    peer: SocketAddr,
    head: &RequestHead,
    leftover: Vec<u8>,
    ctx: &ServerContext,
) -> Result<(), RequestError> {
    let content_type = head
        .header("content-type")
        .ok_or_else(|| ApiError::MalformedRequest("missing Content-Type".into()))?;
    let boundary = boundary_from_content_type(content_type)
        .map_err(|e| ApiError::MalformedRequest(e.to_string()))?;
    let length = body_length(head)?;
    if let Some(limit) = ctx.settings.max_upload_bytes {
        if length > limit {
            return Err(ApiError::PayloadTooLarge { limit }.into());
        }
    }

    let mut reader = BodyReader::new(leftover, length);
    let mut parser = MultipartParser::new(&boundary);
    let mut sink = UploadSink::new(ctx.settings.scratch_dir.clone());

    let stored = match receive_upload(stream, &mut reader, &mut parser, &mut sink).await {
        Ok(stored) => stored,
        Err(e) => {
            sink.discard().await;
            return Err(e);
        }
    };

    let sender = stored
        .sender
        .or_else(|| {
            head.header("x-sender-name")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.chars().take(SENDER_FIELD_LIMIT).collect())
        })
        .unwrap_or_else(|| peer.ip().to_string());

    let received = ctx
        .record_received(stored.name, stored.path, sender)
        .await;
    info!(
        id = received.id,
        name = %received.name,
        sender = %received.sender,
        bytes = stored.bytes,
        "file received"
    );

    let response = UploadResponse {
        success: true,
        id: received.id,
        name: received.name,
        sender: received.sender,
    };
    write_json(stream, StatusCode::Ok, &response).await
}

// ── Download and static assets ────────────────────────────────────────────────

async fn handle_download(
    stream: &mut TcpStream,
    head: &RequestHead,
    ctx: &ServerContext,
) -> Result<(), RequestError> {
    let raw = head.path.trim_start_matches('/');
    let name =
        decode_path_segment(raw).map_err(|e| ApiError::MalformedRequest(e.to_string()))?;

    let shared = match ctx.find_shared(&name).await {
        Some(shared) => shared,
        None => return serve_static(stream, head, ctx).await,
    };

    let file = open_for_read(&shared.absolute_path).await?;
    let disposition = attachment_disposition(&shared.name);
    let sent = stream_file(stream, file, &shared.absolute_path, Some(disposition)).await?;
    info!(name = %shared.name, bytes = sent, "download served");
    Ok(())
}

async fn serve_static(
    stream: &mut TcpStream,
    head: &RequestHead,
    ctx: &ServerContext,
) -> Result<(), RequestError> {
    let root = ctx
        .settings
        .static_dir
        .as_deref()
        .ok_or(ApiError::NotFound)?;
    let relative = static_asset_path(&head.path).ok_or(ApiError::NotFound)?;
    let path = root.join(relative);

    let file = open_for_read(&path).await?;
    stream_file(stream, file, &path, None).await?;
    Ok(())
}

/// Opens a regular file; a missing file or a directory is a 404.
async fn open_for_read(path: &Path) -> Result<File, ApiError> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(e) => return Err(ApiError::ReadFailure(e.to_string())),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::ReadFailure(e.to_string()))?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound);
    }
    Ok(file)
}

/// Writes the response head and streams the file.  Returns bytes sent.
async fn stream_file(
    stream: &mut TcpStream,
    file: File,
    path: &Path,
    disposition: Option<String>,
) -> Result<u64, RequestError> {
    let length = file
        .metadata()
        .await
        .map_err(|e| ApiError::ReadFailure(e.to_string()))?
        .len();

    let mut response = base_head(StatusCode::Ok)
        .header("Content-Type", content_type_for(path))
        .content_length(length);
    if let Some(disposition) = disposition {
        response = response.header("Content-Disposition", disposition);
    }
    stream.write_all(&response.encode()).await?;

    // A file that grows after the head is written must not overrun
    // Content-Length.
    let mut body = file.take(length);
    let sent = tokio::io::copy(&mut body, stream).await?;
    stream.flush().await?;
    Ok(sent)
}

// ── Response helpers ──────────────────────────────────────────────────────────

fn base_head(status: StatusCode) -> ResponseHead {
    ResponseHead::new(status)
        .with_cors()
        .header("Connection", "close")
}

async fn write_json<T: Serialize + ?Sized>(
    stream: &mut TcpStream,
    status: StatusCode,
    value: &T,
) -> Result<(), RequestError> {
    let body = serde_json::to_vec(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let head = base_head(status)
        .header("Content-Type", "application/json")
        .content_length(body.len() as u64);
    stream.write_all(&head.encode()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

async fn write_error(stream: &mut TcpStream, err: &ApiError) -> Result<(), RequestError> {
    write_json(stream, err.status(), &err.body()).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lansync_core::PartHeaders;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lansync-sink-{tag}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file_part(name: &str) -> MultipartEvent {
        MultipartEvent::PartStart(PartHeaders {
            name: Some("file".into()),
            filename: Some(name.into()),
            content_type: None,
        })
    }

    fn text_part(name: &str) -> MultipartEvent {
        MultipartEvent::PartStart(PartHeaders {
            name: Some(name.into()),
            filename: None,
            content_type: None,
        })
    }

    #[tokio::test]
    async fn test_sink_writes_file_and_captures_sender() {
        // Arrange
        let dir = scratch("ok");
        let mut sink = UploadSink::new(dir.clone());

        // Act
        for ev in [
            text_part("sender"),
            MultipartEvent::Data(b"Mobile-42".to_vec()),
            MultipartEvent::PartEnd,
            file_part("photo.jpg"),
            MultipartEvent::Data(b"abc".to_vec()),
            MultipartEvent::Data(b"def".to_vec()),
            MultipartEvent::PartEnd,
        ] {
            sink.apply(ev).await.unwrap();
        }
        let stored = sink.finish().unwrap();

        // Assert
        assert_eq!(stored.name, "photo.jpg");
        assert_eq!(stored.sender.as_deref(), Some("Mobile-42"));
        assert_eq!(stored.bytes, 6);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"abcdef");
        assert!(stored.path.starts_with(&dir));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_sink_without_file_part_is_malformed() {
        let dir = scratch("nofile");
        let mut sink = UploadSink::new(dir.clone());
        sink.apply(text_part("note")).await.unwrap();
        sink.apply(MultipartEvent::PartEnd).await.unwrap();

        let err = sink.finish().unwrap_err();

        assert!(matches!(err, ApiError::MalformedRequest(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_discard_removes_partial_file() {
        let dir = scratch("discard");
        let mut sink = UploadSink::new(dir.clone());
        sink.apply(file_part("big.bin")).await.unwrap();
        sink.apply(MultipartEvent::Data(vec![0u8; 1024])).await.unwrap();

        sink.discard().await;

        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_oversized_sender_field_is_rejected() {
        let dir = scratch("sender");
        let mut sink = UploadSink::new(dir.clone());
        sink.apply(text_part("sender")).await.unwrap();

        let err = sink
            .apply(MultipartEvent::Data(vec![b'x'; SENDER_FIELD_LIMIT + 1]))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::MalformedRequest(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_body_length_requires_content_length() {
        let head = |headers: Vec<(&str, &str)>| RequestHead {
            method: lansync_core::Method::Post,
            path: "/api/login".into(),
            query: None,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };

        assert_eq!(body_length(&head(vec![("Content-Length", "12")])), Ok(12));
        assert_eq!(body_length(&head(vec![])), Err(ApiError::LengthRequired));
        assert_eq!(
            body_length(&head(vec![("Transfer-Encoding", "chunked")])),
            Err(ApiError::LengthRequired)
        );
        assert!(matches!(
            body_length(&head(vec![("Content-Length", "abc")])),
            Err(ApiError::MalformedRequest(_))
        ));
    }
}
