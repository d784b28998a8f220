//! HTTP/1.1 request parsing.

use bumpalo::collections::Vec as BumpVec;

use crate::error::{Error, ParseErrorKind, Result};
use crate::memory::SessionArena;

/// A parsed HTTP/1.1 request.
///
/// ```text
/// Method SP Path SP Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Zero-copy: `method`, `path`, `version`, header names/values, and `body`
/// are slices of the receive buffer; the header list lives in the owning
/// session's arena. Nothing here survives the arena reset that follows the
/// response.
///
/// Header names are stored as received; lookups via
/// [`header`](Self::header) are case-insensitive and, for duplicate names,
/// the last occurrence wins.
pub struct Request<'a> {
    /// Request method (GET, POST, ...), as sent by the client.
    pub method: &'a str,
    /// Request path, including any query string.
    pub path: &'a str,
    /// Protocol version token, or `""` when the client omitted it.
    pub version: &'a str,
    headers: BumpVec<'a, (&'a str, &'a str)>,
    /// Exactly `Content-Length` bytes, or empty when the header is absent.
    pub body: &'a [u8],
}

/// Outcome of a parse attempt over the bytes buffered so far.
pub enum ParseStatus<'a> {
    /// A full request (head plus declared body) was present.
    Complete(Request<'a>),
    /// More bytes are needed; the caller should read again and re-parse.
    Partial,
}

impl<'a> Request<'a> {
    /// Parse the buffered request bytes.
    ///
    /// Line terminators may be `\r\n` or bare `\n`. Returns
    /// [`ParseStatus::Partial`] until the terminating blank line and the
    /// full `Content-Length` body have been buffered; malformed input is an
    /// [`Error::Parse`] that the session answers with `400 Bad Request`.
    pub fn parse(buf: &'a [u8], arena: &'a SessionArena) -> Result<ParseStatus<'a>> {
        let mut pos = 0usize;

        let Some((line, next)) = split_line(buf, pos) else {
            return Ok(ParseStatus::Partial);
        };
        pos = next;

        let start = as_text(line)?;
        let mut parts = start.split_whitespace();
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(m), Some(p)) => (m, p),
            _ if start.trim().is_empty() => return Err(parse_error(ParseErrorKind::EmptyRequest)),
            _ => return Err(parse_error(ParseErrorKind::InvalidRequestLine)),
        };
        let version = parts.next().unwrap_or("");
        if parts.next().is_some() {
            return Err(parse_error(ParseErrorKind::InvalidRequestLine));
        }

        let mut headers = BumpVec::new_in(arena.bump());
        loop {
            let Some((line, next)) = split_line(buf, pos) else {
                return Ok(ParseStatus::Partial);
            };
            pos = next;
            if line.is_empty() {
                break;
            }
            let text = as_text(line)?;
            let Some(colon) = text.find(':') else {
                return Err(parse_error(ParseErrorKind::InvalidHeader));
            };
            let name = text[..colon].trim();
            let value = text[colon + 1..].trim();
            headers.push((name, value));
        }

        if let Some(encoding) = lookup(&headers, "Transfer-Encoding") {
            if encoding.to_ascii_lowercase().contains("chunked") {
                return Err(parse_error(ParseErrorKind::UnsupportedTransferEncoding));
            }
        }

        let body = match lookup(&headers, "Content-Length") {
            Some(value) => {
                let length: usize = value
                    .parse()
                    .map_err(|_| parse_error(ParseErrorKind::InvalidContentLength))?;
                let available = &buf[pos..];
                if available.len() < length {
                    return Ok(ParseStatus::Partial);
                }
                &available[..length]
            }
            // Anything after the blank line without a declared length is
            // ignored; sequential keep-alive only, no pipelining.
            None => &[],
        };

        Ok(ParseStatus::Complete(Request {
            method,
            path,
            version,
            headers,
            body,
        }))
    }

    /// Look up a header value by name, case-insensitively. On duplicate
    /// names the last occurrence wins.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        lookup(&self.headers, name)
    }

    /// Headers in receive order, names as the client sent them.
    pub fn headers(&self) -> &[(&'a str, &'a str)] {
        &self.headers
    }

    /// Whether the client asked to keep the connection open. HTTP/1.1
    /// default is yes; only `Connection: close` (any case) turns it off.
    pub fn wants_keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => true,
        }
    }
}

fn lookup<'a>(headers: &[(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// Next line ending in `\n`, with any trailing `\r` stripped.
/// `None` when no terminator has been buffered yet.
fn split_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = &buf[pos..];
    let newline = rest.iter().position(|&b| b == b'\n')?;
    let mut line = &rest[..newline];
    if let [head @ .., b'\r'] = line {
        line = head;
    }
    Some((line, pos + newline + 1))
}

fn as_text(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line).map_err(|_| parse_error(ParseErrorKind::InvalidEncoding))
}

fn parse_error(kind: ParseErrorKind) -> Error {
    Error::Parse { kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> SessionArena {
        SessionArena::new(64 * 1024)
    }

    fn complete<'a>(buf: &'a [u8], arena: &'a SessionArena) -> Request<'a> {
        match Request::parse(buf, arena).unwrap() {
            ParseStatus::Complete(req) => req,
            ParseStatus::Partial => panic!("expected a complete request"),
        }
    }

    #[test]
    fn parse_get_request() {
        let arena = arena();
        let req = complete(b"GET /index.html HTTP/1.1\r\nHost: example\r\n\r\n", &arena);
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("Host"), Some("example"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn parse_missing_version() {
        let arena = arena();
        let req = complete(b"GET /\r\n\r\n", &arena);
        assert_eq!(req.version, "");
    }

    #[test]
    fn parse_tolerates_bare_newlines() {
        let arena = arena();
        let req = complete(b"GET / HTTP/1.1\nHost: example\n\n", &arena);
        assert_eq!(req.header("Host"), Some("example"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let arena = arena();
        let req = complete(b"GET / HTTP/1.1\r\ncOnTeNt-TyPe: text/plain\r\n\r\n", &arena);
        assert_eq!(req.header("Content-Type"), Some("text/plain"));
        assert_eq!(req.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn duplicate_headers_last_wins_but_both_stored() {
        let arena = arena();
        let req = complete(b"GET / HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\n\r\n", &arena);
        assert_eq!(req.header("X-Tag"), Some("two"));
        assert_eq!(req.headers().len(), 2);
        assert_eq!(req.headers()[0], ("X-Tag", "one"));
    }

    #[test]
    fn body_follows_content_length_exactly() {
        let arena = arena();
        let req = complete(b"POST /u HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloEXTRA", &arena);
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn content_length_zero_means_empty_body() {
        let arena = arena();
        let req = complete(b"POST /u HTTP/1.1\r\nContent-Length: 0\r\n\r\n", &arena);
        assert!(req.body.is_empty());
    }

    #[test]
    fn no_content_length_ignores_trailing_bytes() {
        let arena = arena();
        let req = complete(b"GET / HTTP/1.1\r\n\r\nstray bytes", &arena);
        assert!(req.body.is_empty());
    }

    #[test]
    fn incomplete_head_is_partial() {
        let arena = arena();
        assert!(matches!(
            Request::parse(b"GET / HTTP/1.1\r\nHost: exa", &arena).unwrap(),
            ParseStatus::Partial
        ));
        assert!(matches!(
            Request::parse(b"", &arena).unwrap(),
            ParseStatus::Partial
        ));
    }

    #[test]
    fn short_body_is_partial() {
        let arena = arena();
        assert!(matches!(
            Request::parse(b"POST /u HTTP/1.1\r\nContent-Length: 10\r\n\r\nhel", &arena).unwrap(),
            ParseStatus::Partial
        ));
    }

    #[test]
    fn blank_start_line_is_rejected() {
        let arena = arena();
        match Request::parse(b"\r\n\r\n", &arena) {
            Err(Error::Parse {
                kind: ParseErrorKind::EmptyRequest,
            }) => {}
            other => panic!("expected EmptyRequest, got {:?}", other.err()),
        }
    }

    #[test]
    fn malformed_start_line_is_rejected() {
        let arena = arena();
        for raw in [&b"JUSTAMETHOD\r\n\r\n"[..], &b"GET / HTTP/1.1 extra\r\n\r\n"[..]] {
            match Request::parse(raw, &arena) {
                Err(Error::Parse {
                    kind: ParseErrorKind::InvalidRequestLine,
                }) => {}
                other => panic!("expected InvalidRequestLine, got {:?}", other.err()),
            }
        }
    }

    #[test]
    fn header_without_colon_is_rejected() {
        let arena = arena();
        match Request::parse(b"GET / HTTP/1.1\r\nbroken header\r\n\r\n", &arena) {
            Err(Error::Parse {
                kind: ParseErrorKind::InvalidHeader,
            }) => {}
            other => panic!("expected InvalidHeader, got {:?}", other.err()),
        }
    }

    #[test]
    fn bad_content_length_is_rejected() {
        let arena = arena();
        match Request::parse(b"POST / HTTP/1.1\r\nContent-Length: -4\r\n\r\n", &arena) {
            Err(Error::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            }) => {}
            other => panic!("expected InvalidContentLength, got {:?}", other.err()),
        }
    }

    #[test]
    fn chunked_transfer_encoding_is_rejected() {
        let arena = arena();
        match Request::parse(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
            &arena,
        ) {
            Err(Error::Parse {
                kind: ParseErrorKind::UnsupportedTransferEncoding,
            }) => {}
            other => panic!("expected UnsupportedTransferEncoding, got {:?}", other.err()),
        }
    }

    #[test]
    fn connection_close_disables_keep_alive() {
        let arena = arena();
        let req = complete(b"GET / HTTP/1.1\r\nConnection: Close\r\n\r\n", &arena);
        assert!(!req.wants_keep_alive());

        let req = complete(b"GET / HTTP/1.1\r\n\r\n", &arena);
        assert!(req.wants_keep_alive());
    }
}
