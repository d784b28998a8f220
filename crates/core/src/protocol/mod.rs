//! HTTP/1.1 codec: request parsing and response serialization.
//!
//! Both directions operate exclusively against the owning session's arena —
//! a [`Request`] is slices over the arena-held receive buffer, a
//! [`Response`] serializes into an arena buffer, and everything is reclaimed
//! together when the exchange completes.
//!
//! ## Message format
//!
//! ```text
//! GET /path HTTP/1.1\r\n          HTTP/1.1 200 OK\r\n
//! Host: example\r\n               Content-Type: text/plain\r\n
//! \r\n                            Content-Length: 13\r\n
//!                                 \r\n
//!                                 Hello, World!
//! ```
//!
//! Scope notes:
//!
//! - `Content-Length` is authoritative for body framing in both directions;
//!   `Transfer-Encoding: chunked` is rejected with `400`.
//! - Bare `\n` line terminators are accepted on input.
//! - Sequential keep-alive only; pipelined request bytes are discarded.

pub mod request;
pub mod response;

pub use request::{ParseStatus, Request};
pub use response::{Response, reason_phrase};
