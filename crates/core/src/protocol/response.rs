//! HTTP/1.1 response construction and serialization.

use bumpalo::collections::Vec as BumpVec;

use crate::error::Result;
use crate::memory::{ArenaBuf, SessionArena};

/// An HTTP response under construction, allocated in the session arena that
/// produced its request.
///
/// Builder-style: chain [`with_header`](Self::with_header) and
/// [`with_body`](Self::with_body), then [`serialize`](Self::serialize).
/// `Content-Length` is always computed from the body at serialization time;
/// a caller-supplied value is discarded.
#[must_use]
pub struct Response<'a> {
    pub status: u16,
    headers: BumpVec<'a, (&'a str, &'a str)>,
    pub body: &'a [u8],
}

impl<'a> Response<'a> {
    pub fn new(arena: &'a SessionArena, status: u16) -> Self {
        Response {
            status,
            headers: BumpVec::new_in(arena.bump()),
            body: &[],
        }
    }

    /// A plain-text response.
    pub fn text(arena: &'a SessionArena, status: u16, body: &'a str) -> Self {
        Self::new(arena, status)
            .with_header("Content-Type", "text/plain")
            .with_body(body.as_bytes())
    }

    /// A JSON response.
    pub fn json(arena: &'a SessionArena, status: u16, body: &'a str) -> Self {
        Self::new(arena, status)
            .with_header("Content-Type", "application/json")
            .with_body(body.as_bytes())
    }

    pub fn with_header(mut self, name: &'a str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn with_body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(&'a str, &'a str)] {
        &self.headers
    }

    /// Serialize to the wire format:
    ///
    /// ```text
    /// HTTP/1.1 <status> <reason>\r\n
    /// <header>: <value>\r\n ...
    /// Content-Length: <body length>\r\n
    /// \r\n
    /// <body>
    /// ```
    pub fn serialize(&self, arena: &'a SessionArena) -> Result<ArenaBuf<'a>> {
        let mut out = arena.buf(256 + self.body.len())?;

        let status_line = bumpalo::format!(
            in arena.bump(),
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        );
        out.extend_from_slice(status_line.as_bytes())?;

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            out.extend_from_slice(name.as_bytes())?;
            out.extend_from_slice(b": ")?;
            out.extend_from_slice(value.as_bytes())?;
            out.extend_from_slice(b"\r\n")?;
        }

        let length_line =
            bumpalo::format!(in arena.bump(), "Content-Length: {}\r\n\r\n", self.body.len());
        out.extend_from_slice(length_line.as_bytes())?;
        out.extend_from_slice(self.body)?;
        Ok(out)
    }
}

/// Reason phrase for a status code. Codes outside the served set map to
/// `"Unknown"`.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
