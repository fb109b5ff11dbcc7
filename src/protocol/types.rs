//! Response Types for the Line Protocol
//!
//! Every reply the server sends is a status line followed by a body line:
//!
//! ```text
//! <status>\r\n<body>\r\n
//! ```
//!
//! The status is `OK` or `ERROR`. For errors the body is a human-readable
//! message. For dictionary reads the body is itself a sequence of
//! `field:value\r\n` lines.
//!
//! ## Examples
//!
//! Successful write: `OK\r\n\r\n`
//! String read: `OK\r\nalice\r\n`
//! Absent key: `OK\r\nnull\r\n`
//! Dictionary read: `OK\r\nage:30\r\nheight:null\r\n\r\n`
//! Error: `ERROR\r\nEmpty Key\r\n`

use crate::storage::FieldValues;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The line terminator used in replies
pub const CRLF: &str = "\r\n";

/// Text sent in place of an absent key or an absent dictionary field.
pub const NULL_SENTINEL: &str = "null";

/// Reply status lines
pub mod status {
    pub const OK: &str = "OK";
    pub const ERROR: &str = "ERROR";
}

/// A reply to one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The command succeeded; the body may be empty.
    Ok(String),

    /// The command was rejected or failed.
    Error(String),
}

impl Response {
    /// Successful command with an empty body.
    pub fn ok() -> Self {
        Response::Ok(String::new())
    }

    /// Successful read of a single value.
    pub fn value(s: impl Into<String>) -> Self {
        Response::Ok(s.into())
    }

    /// Successful read of an absent key.
    pub fn null() -> Self {
        Response::Ok(NULL_SENTINEL.to_string())
    }

    /// Successful dictionary read, one `field:value` line per field.
    pub fn dict(fields: &FieldValues) -> Self {
        let mut body = String::new();
        for (field, value) in fields {
            body.push_str(field);
            body.push(':');
            body.push_str(value.as_deref().unwrap_or(NULL_SENTINEL));
            body.push_str(CRLF);
        }
        Response::Ok(body)
    }

    /// Creates a new error response.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    /// Returns true if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Returns the body text.
    pub fn body(&self) -> &str {
        match self {
            Response::Ok(body) | Response::Error(body) => body,
        }
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Bytes {
        let (status, body) = match self {
            Response::Ok(body) => (status::OK, body),
            Response::Error(message) => (status::ERROR, message),
        };

        let mut buf = BytesMut::with_capacity(status.len() + body.len() + 2 * CRLF.len());
        buf.put_slice(status.as_bytes());
        buf.put_slice(CRLF.as_bytes());
        buf.put_slice(body.as_bytes());
        buf.put_slice(CRLF.as_bytes());
        buf.freeze()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(body) if body.is_empty() => write!(f, "OK"),
            Response::Ok(body) => write!(f, "\"{}\"", body),
            Response::Error(message) => write!(f, "(error) {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_serialize() {
        assert_eq!(&Response::ok().serialize()[..], b"OK\r\n\r\n");
    }

    #[test]
    fn test_value_serialize() {
        assert_eq!(&Response::value("alice").serialize()[..], b"OK\r\nalice\r\n");
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(&Response::null().serialize()[..], b"OK\r\nnull\r\n");
    }

    #[test]
    fn test_error_serialize() {
        let response = Response::error("Empty Key");
        assert!(response.is_error());
        assert_eq!(&response.serialize()[..], b"ERROR\r\nEmpty Key\r\n");
    }

    #[test]
    fn test_dict_serialize() {
        let mut fields = FieldValues::new();
        fields.insert("height".to_string(), None);
        fields.insert("age".to_string(), Some("30".to_string()));

        let response = Response::dict(&fields);
        assert_eq!(response.body(), "age:30\r\nheight:null\r\n");
        assert_eq!(
            &response.serialize()[..],
            b"OK\r\nage:30\r\nheight:null\r\n\r\n"
        );
    }

    #[test]
    fn test_empty_dict_serialize() {
        assert_eq!(&Response::dict(&FieldValues::new()).serialize()[..], b"OK\r\n\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(Response::ok().to_string(), "OK");
        assert_eq!(Response::value("v").to_string(), "\"v\"");
        assert_eq!(Response::error("Empty Key").to_string(), "(error) Empty Key");
    }
}
