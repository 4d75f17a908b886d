//! Incremental `multipart/form-data` parser.
//!
//! Uploads can be far larger than memory, so the body is never collected.
//! The caller feeds network chunks of any size to [`MultipartParser::feed`]
//! and receives a flat stream of events:
//!
//! ```text
//! PartStart(headers) Data.. Data.. PartEnd  PartStart(headers) Data.. PartEnd
//! ```
//!
//! `Data` events for one part, concatenated, are exactly that part's bytes.
//! Chunk boundaries are irrelevant: the parser holds back just enough bytes
//! to recognise a delimiter split across two reads.
//!
//! # Body layout (for beginners)
//!
//! ```text
//! --XyZ\r\n
//! Content-Disposition: form-data; name="sender"\r\n
//! \r\n
//! Mobile-42\r\n
//! --XyZ\r\n
//! Content-Disposition: form-data; name="file"; filename="photo.jpg"\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <raw bytes>\r\n
//! --XyZ--\r\n
//! ```

use thiserror::Error;

/// Upper bound for one part's header block.
pub const MAX_PART_HEADER_BYTES: usize = 8 * 1024;

/// RFC 2046 limit on boundary length.
const MAX_BOUNDARY_LEN: usize = 70;

const MAX_PART_HEADERS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("Content-Type is not multipart/form-data with a usable boundary")]
    MissingBoundary,

    #[error("malformed part headers: {0}")]
    MalformedPartHeaders(String),

    #[error("part headers exceed {0} bytes")]
    PartHeadersTooLarge(usize),

    #[error("boundary line is not followed by CRLF or \"--\"")]
    MalformedBoundary,

    #[error("body ended before the closing boundary")]
    UnexpectedEof,
}

/// Extracts the boundary from a `Content-Type` header value.
///
/// # Errors
///
/// Returns [`MultipartError::MissingBoundary`] unless the media type is
/// `multipart/form-data` with a non-empty boundary of at most 70 bytes.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, MultipartError> {
    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or("").trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::MissingBoundary);
    }
    parse_params(&parts.collect::<Vec<_>>().join(";"))
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v)
        .filter(|b| !b.is_empty() && b.len() <= MAX_BOUNDARY_LEN)
        .ok_or(MultipartError::MissingBoundary)
}

/// Headers of one part that the upload handler cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// Form field name from `Content-Disposition`.
    pub name: Option<String>,
    /// Client-supplied file name, exactly as sent.
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl PartHeaders {
    /// `true` for parts carrying a file rather than a plain text field.
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// The client file name reduced to a safe base name.
    ///
    /// Some browsers send full paths (`C:\Users\me\photo.jpg`); only the last
    /// component is kept.  Empty, `.` and `..` yield `None`.
    pub fn safe_filename(&self) -> Option<String> {
        let raw = self.filename.as_deref()?;
        let base = raw
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or("")
            .trim();
        let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
        match cleaned.as_str() {
            "" | "." | ".." => None,
            _ => Some(cleaned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartEvent {
    PartStart(PartHeaders),
    Data(Vec<u8>),
    PartEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterDelimiter,
    Headers,
    Body,
    Done,
}

/// Push-style parser; see the module docs.
#[derive(Debug)]
pub struct MultipartParser {
    /// `\r\n--<boundary>`
    delimiter: Vec<u8>,
    buf: Vec<u8>,
    state: State,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = b"\r\n--".to_vec();
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            delimiter,
            // The first boundary has no leading CRLF; seeding one lets the
            // same delimiter search find it.
            buf: b"\r\n".to_vec(),
            state: State::Preamble,
        }
    }

    /// `true` once the closing boundary has been seen.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Consumes `chunk` and returns the events it completed.
    ///
    /// # Errors
    ///
    /// Returns a [`MultipartError`] on malformed input; the parser must not be
    /// fed again afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<MultipartEvent>, MultipartError> {
        if self.state == State::Done {
            return Ok(Vec::new());
        }
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match self.state {
                State::Preamble => match find(&self.buf, &self.delimiter) {
                    Some(at) => {
                        self.buf.drain(..at + self.delimiter.len());
                        self.state = State::AfterDelimiter;
                    }
                    None => {
                        let keep = self.delimiter.len() - 1;
                        let drop = self.buf.len().saturating_sub(keep);
                        self.buf.drain(..drop);
                        break;
                    }
                },
                State::AfterDelimiter => {
                    if self.buf.len() < 2 {
                        break;
                    }
                    if self.buf.starts_with(b"--") {
                        self.buf.clear();
                        self.state = State::Done;
                        break;
                    }
                    if !self.buf.starts_with(b"\r\n") {
                        return Err(MultipartError::MalformedBoundary);
                    }
                    self.buf.drain(..2);
                    self.state = State::Headers;
                }
                State::Headers => {
                    let parsed = {
                        let mut raw = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
                        let outcome = match httparse::parse_headers(&self.buf, &mut raw) {
                            Ok(httparse::Status::Complete((consumed, headers))) => {
                                Some((consumed, part_headers(headers)))
                            }
                            Ok(httparse::Status::Partial) => None,
                            Err(e) => {
                                return Err(MultipartError::MalformedPartHeaders(e.to_string()))
                            }
                        };
                        outcome
                    };
                    match parsed {
                        Some((consumed, headers)) => {
                            self.buf.drain(..consumed);
                            events.push(MultipartEvent::PartStart(headers));
                            self.state = State::Body;
                        }
                        None => {
                            if self.buf.len() > MAX_PART_HEADER_BYTES {
                                return Err(MultipartError::PartHeadersTooLarge(
                                    MAX_PART_HEADER_BYTES,
                                ));
                            }
                            break;
                        }
                    }
                }
                State::Body => match find(&self.buf, &self.delimiter) {
                    Some(at) => {
                        if at > 0 {
                            events.push(MultipartEvent::Data(self.buf[..at].to_vec()));
                        }
                        self.buf.drain(..at + self.delimiter.len());
                        events.push(MultipartEvent::PartEnd);
                        self.state = State::AfterDelimiter;
                    }
                    None => {
                        let safe = self.buf.len().saturating_sub(self.delimiter.len() - 1);
                        if safe > 0 {
                            events.push(MultipartEvent::Data(self.buf.drain(..safe).collect()));
                        }
                        break;
                    }
                },
                State::Done => break,
            }
        }
        Ok(events)
    }

    /// Declares end of input.
    ///
    /// # Errors
    ///
    /// Returns [`MultipartError::UnexpectedEof`] if the closing boundary was
    /// never seen.
    pub fn finish(&self) -> Result<(), MultipartError> {
        if self.state == State::Done {
            Ok(())
        } else {
            Err(MultipartError::UnexpectedEof)
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn part_headers(parsed: &[httparse::Header<'_>]) -> PartHeaders {
    let mut out = PartHeaders::default();
    for header in parsed {
        let value = String::from_utf8_lossy(header.value);
        if header.name.eq_ignore_ascii_case("content-disposition") {
            for (key, val) in parse_params(&value) {
                if key.eq_ignore_ascii_case("name") {
                    out.name = Some(val);
                } else if key.eq_ignore_ascii_case("filename") {
                    out.filename = Some(val);
                }
            }
        } else if header.name.eq_ignore_ascii_case("content-type") {
            out.content_type = Some(value.trim().to_string());
        }
    }
    out
}

/// Splits `a=1; b="x;y"; c` into key/value pairs, honouring quoted strings.
/// Bare tokens without `=` (such as `form-data`) are skipped.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ';' || c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            continue;
        }
        chars.next();

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
            while matches!(chars.peek(), Some(c) if *c != ';') {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }
        params.push((key.trim().to_string(), value));
    }
    params
}
