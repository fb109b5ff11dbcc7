//! Line Protocol Implementation
//!
//! This module implements the text protocol DuoKV speaks over TCP.
//!
//! ## Overview
//!
//! Clients send one command per line and receive a two-line reply
//! (`OK` or `ERROR`, then a body). There is no binary framing and no
//! length prefix; keys, values and dictionary fields cannot contain spaces.
//!
//! ## Modules
//!
//! - `types`: Defines the `Response` enum and its wire framing
//! - `parser`: Line splitting, command grammar and TTL parsing
//!
//! ## Example
//!
//! ```
//! use duokv::protocol::{parse_command, Command, Response};
//!
//! let command = parse_command("get string name\r\n").unwrap();
//! assert_eq!(command, Command::GetString { key: "name".to_string() });
//!
//! let reply = Response::value("Ariz").serialize();
//! assert_eq!(&reply[..], b"OK\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{
    parse_command, parse_ttl, Command, LineParser, ParseError, ParseResult, TtlParseError,
    MAX_LINE_LENGTH,
};
pub use types::{Response, NULL_SENTINEL};
