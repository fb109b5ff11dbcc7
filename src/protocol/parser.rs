//! Line Protocol Parser
//!
//! This module turns raw connection bytes into commands.
//!
//! ## Framing
//!
//! One command per `\n`-terminated line. The [`LineParser`] returns either:
//! - `Ok(Some((line, consumed)))` - A complete line, `consumed` bytes were used
//! - `Ok(None)` - No newline yet, wait for more data
//! - `Err(ParseError::LineTooLong)` - The pending line exceeds [`MAX_LINE_LENGTH`]
//!
//! ## Grammar
//!
//! ```text
//! get string <key>
//! get dict <key> [field ...]
//! set string <key> <value> [ttl]
//! set dict <key> <field:value> ... [ttl]
//! delete <key>
//! ```
//!
//! Tokens are separated by single spaces and empty tokens are kept, so
//! `get string ` carries an empty key. The command handler rejects it; `set`
//! commands reject it here already, before their TTL and fields are parsed.
//! A TTL is an optional signed multiplier followed by one of `s m h d w`.

use crate::storage::{Dict, Ttl};
use thiserror::Error;

/// Maximum length of a single command line (64 KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Characters stripped from both ends of a line before tokenizing
const TRIM_SET: &[char] = &['\n', '\t', '\r'];

/// Command keywords
pub mod keyword {
    pub const GET: &str = "get";
    pub const SET: &str = "set";
    pub const DELETE: &str = "delete";
    pub const STRING: &str = "string";
    pub const DICT: &str = "dict";
}

/// Errors raised while parsing a TTL such as `30s` or `2h`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TtlParseError {
    #[error("unrecognized unit letter: {0}")]
    UnknownUnit(String),

    #[error("failed to parse amount: {0}")]
    InvalidAmount(String),

    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Errors that can occur while parsing a command line.
///
/// The `Display` text of each variant is the message sent back to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line was blank after trimming
    #[error("Empty Command")]
    EmptyCommand,

    #[error("Not enough arguments")]
    NotEnoughArguments,

    #[error("Too Many Arguments")]
    TooManyArguments,

    /// The second token of a get/set named an unknown value type
    #[error("Type Not Supported")]
    TypeNotSupported(String),

    /// The first token is not a known command
    #[error("Command Not Supported")]
    CommandNotSupported(String),

    #[error("TTL Parse Error: {0}")]
    Ttl(#[from] TtlParseError),

    /// A dictionary token that is not exactly `field:value`
    #[error("Invalid Dict Input")]
    InvalidDictInput(String),

    /// A write named an empty key; checked before its TTL and fields
    #[error("Empty Key")]
    EmptyKey,

    /// The message exceeds maximum allowed size
    #[error("line too large: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a string value
    GetString { key: String },

    /// Read a whole dictionary, or only some fields of it
    GetDict { key: String, fields: Vec<String> },

    /// Write a string value
    SetString { key: String, value: String, ttl: Ttl },

    /// Merge fields into a dictionary
    SetDict { key: String, fields: Dict, ttl: Ttl },

    /// Remove a key of either kind
    Delete { key: String },
}

impl Command {
    /// Returns the key the command targets.
    pub fn key(&self) -> &str {
        match self {
            Command::GetString { key }
            | Command::GetDict { key, .. }
            | Command::SetString { key, .. }
            | Command::SetDict { key, .. }
            | Command::Delete { key } => key,
        }
    }

    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetString { .. } => "get string",
            Command::GetDict { .. } => "get dict",
            Command::SetString { .. } => "set string",
            Command::SetDict { .. } => "set dict",
            Command::Delete { .. } => "delete",
        }
    }
}

/// Splits a byte stream into command lines.
///
/// # Example
///
/// ```ignore
/// use duokv::protocol::parser::LineParser;
/// use bytes::{Buf, BytesMut};
///
/// let mut parser = LineParser::new();
/// let mut buffer = BytesMut::from(&b"get string name\r\n"[..]);
///
/// if let Some((line, consumed)) = parser.parse(&buffer)? {
///     buffer.advance(consumed);
///     println!("Parsed: {}", line);
/// }
/// ```
#[derive(Debug, Default)]
pub struct LineParser {
    /// Bytes already known to contain no newline
    scanned: usize,
}

impl LineParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { scanned: 0 }
    }

    /// Attempts to take one line from the front of the buffer.
    ///
    /// The returned line still carries its terminator; invalid UTF-8 is replaced
    /// rather than rejected.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
        let start = self.scanned.min(buf.len());

        match buf[start..].iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let consumed = start + pos + 1;
                self.scanned = 0;
                if consumed > MAX_LINE_LENGTH {
                    return Err(ParseError::LineTooLong {
                        size: consumed,
                        max: MAX_LINE_LENGTH,
                    });
                }
                let line = String::from_utf8_lossy(&buf[..consumed]).into_owned();
                Ok(Some((line, consumed)))
            }
            None if buf.len() > MAX_LINE_LENGTH => Err(ParseError::LineTooLong {
                size: buf.len(),
                max: MAX_LINE_LENGTH,
            }),
            None => {
                self.scanned = buf.len();
                Ok(None)
            }
        }
    }
}

/// Parses one command line into a [`Command`].
pub fn parse_command(line: &str) -> ParseResult<Command> {
    let trimmed = line.trim_matches(TRIM_SET);
    if trimmed.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let tokens: Vec<&str> = trimmed.split(' ').collect();

    match tokens[0] {
        keyword::GET => match value_type(&tokens)? {
            keyword::STRING => parse_get_string(&tokens),
            keyword::DICT => parse_get_dict(&tokens),
            other => Err(ParseError::TypeNotSupported(other.to_string())),
        },
        keyword::SET => match value_type(&tokens)? {
            keyword::STRING => parse_set_string(&tokens),
            keyword::DICT => parse_set_dict(&tokens),
            other => Err(ParseError::TypeNotSupported(other.to_string())),
        },
        keyword::DELETE => parse_delete(&tokens),
        other => Err(ParseError::CommandNotSupported(other.to_string())),
    }
}

fn value_type<'a>(tokens: &[&'a str]) -> ParseResult<&'a str> {
    tokens
        .get(1)
        .copied()
        .ok_or(ParseError::NotEnoughArguments)
}

/// get string <key>
fn parse_get_string(tokens: &[&str]) -> ParseResult<Command> {
    if tokens.len() < 3 {
        return Err(ParseError::NotEnoughArguments);
    }
    if tokens.len() > 3 {
        return Err(ParseError::TooManyArguments);
    }

    Ok(Command::GetString {
        key: tokens[2].to_string(),
    })
}

/// get dict <key> [field ...]
fn parse_get_dict(tokens: &[&str]) -> ParseResult<Command> {
    if tokens.len() < 3 {
        return Err(ParseError::NotEnoughArguments);
    }

    Ok(Command::GetDict {
        key: tokens[2].to_string(),
        fields: tokens[3..].iter().map(|f| f.to_string()).collect(),
    })
}

/// Key of a `set` command, rejected early when empty.
fn write_key(tokens: &[&str]) -> ParseResult<String> {
    match tokens[2] {
        "" => Err(ParseError::EmptyKey),
        key => Ok(key.to_string()),
    }
}

/// set string <key> <value> [ttl]
fn parse_set_string(tokens: &[&str]) -> ParseResult<Command> {
    if tokens.len() > 5 {
        return Err(ParseError::TooManyArguments);
    }
    if tokens.len() < 4 {
        return Err(ParseError::NotEnoughArguments);
    }
    let key = write_key(tokens)?;

    let ttl = match tokens.get(4) {
        Some(text) => parse_ttl(text)?,
        None => Ttl::Persist,
    };

    Ok(Command::SetString {
        key,
        value: tokens[3].to_string(),
        ttl,
    })
}

/// set dict <key> <field:value> ... [ttl]
///
/// The last token is a TTL when it contains no `:`.
fn parse_set_dict(tokens: &[&str]) -> ParseResult<Command> {
    if tokens.len() < 4 {
        return Err(ParseError::NotEnoughArguments);
    }
    let key = write_key(tokens)?;

    let last = tokens[tokens.len() - 1];
    let last_is_ttl = !last.contains(':');
    let field_tokens = if last_is_ttl {
        &tokens[3..tokens.len() - 1]
    } else {
        &tokens[3..]
    };
    if field_tokens.is_empty() {
        return Err(ParseError::NotEnoughArguments);
    }

    let ttl = if last_is_ttl {
        parse_ttl(last)?
    } else {
        Ttl::Persist
    };

    let mut fields = Dict::new();
    for token in field_tokens {
        let mut parts = token.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(value), None) => {
                fields.insert(field.to_string(), value.to_string());
            }
            _ => return Err(ParseError::InvalidDictInput(token.to_string())),
        }
    }

    Ok(Command::SetDict {
        key,
        fields,
        ttl,
    })
}

/// delete <key>
fn parse_delete(tokens: &[&str]) -> ParseResult<Command> {
    if tokens.len() < 2 {
        return Err(ParseError::NotEnoughArguments);
    }
    if tokens.len() > 2 {
        return Err(ParseError::TooManyArguments);
    }

    Ok(Command::Delete {
        key: tokens[1].to_string(),
    })
}

/// Parses a TTL such as `30s`, `h` (one hour) or `-1s` (delete on write).
///
/// An empty string means no TTL. Units: `s` seconds, `m` minutes, `h` hours,
/// `d` days, `w` weeks. The multiplier defaults to 1 and may be negative.
pub fn parse_ttl(text: &str) -> Result<Ttl, TtlParseError> {
    let trimmed = text.trim_matches(' ');
    let unit = match trimmed.chars().last() {
        Some(unit) => unit,
        None => return Ok(Ttl::Persist),
    };

    let unit_secs: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => return Err(TtlParseError::UnknownUnit(trimmed.to_string())),
    };

    let amount_text = &trimmed[..trimmed.len() - unit.len_utf8()];
    let amount: i64 = if amount_text.is_empty() {
        1
    } else {
        amount_text
            .parse()
            .map_err(|_| TtlParseError::InvalidAmount(amount_text.to_string()))?
    };

    let secs = amount
        .checked_mul(unit_secs)
        .ok_or_else(|| TtlParseError::Overflow(trimmed.to_string()))?;

    Ok(Ttl::from_secs(secs))
}
