//! Command Handler Module
//!
//! This module is the command facade: the only entry points the connection
//! layer uses to reach the storage engine.
//!
//! ## Supported Commands
//!
//! - `get string <key>` - Read a string value
//! - `get dict <key> [field ...]` - Read a dictionary, or only some of its fields
//! - `set string <key> <value> [ttl]` - Write a string value
//! - `set dict <key> <field:value> ... [ttl]` - Merge fields into a dictionary
//! - `delete <key>` - Remove a key of either kind
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   parse()   │───>│  dispatch() │───>│ get_/set_/  │     │
//! │  │             │    │             │    │ delete_key  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every facade method checks its key before the storage engine is touched.
//! An absent key or field is a normal `None` result, never an error.

use crate::protocol::{parse_command, Command, ParseError, Response};
use crate::storage::{Dict, FieldValues, StorageEngine, StorageError, Ttl};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors surfaced by the command facade.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The line could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Empty Key")]
    EmptyKey,

    #[error("Storage Failure")]
    Storage(#[from] StorageError),
}

impl CommandError {
    /// Returns true for faults inside the engine, as opposed to bad input.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, CommandError::Storage(_))
    }
}

/// Result type for facade operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Executes commands against the storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Parses and executes one command line, returning the reply to send.
    ///
    /// Errors are turned into `ERROR` replies carrying the error's message.
    pub fn execute(&self, line: &str) -> Response {
        let result = parse_command(line)
            .map_err(CommandError::from)
            .and_then(|command| self.dispatch(command));

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.is_storage_failure() {
                    error!(error = ?e, "Command failed in storage engine");
                } else {
                    debug!(error = ?e, "Command rejected");
                }
                Response::error(e.to_string())
            }
        }
    }

    /// Runs a parsed command and formats its result.
    pub fn dispatch(&self, command: Command) -> CommandResult<Response> {
        debug!(command = command.name(), key = command.key(), "Executing command");

        match command {
            Command::GetString { key } => Ok(match self.get_string(&key)? {
                Some(value) => Response::value(value),
                None => Response::null(),
            }),
            Command::GetDict { key, fields } => {
                let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                Ok(match self.get_dict(&key, &fields)? {
                    Some(values) => Response::dict(&values),
                    None => Response::null(),
                })
            }
            Command::SetString { key, value, ttl } => {
                self.set_string(key, value, ttl)?;
                Ok(Response::ok())
            }
            Command::SetDict { key, fields, ttl } => {
                self.set_dict(key, fields, ttl)?;
                Ok(Response::ok())
            }
            Command::Delete { key } => {
                self.delete_key(&key)?;
                Ok(Response::ok())
            }
        }
    }

    // ========================================================================
    // Facade operations
    // ========================================================================

    /// Reads a string value. Dictionaries read as absent.
    pub fn get_string(&self, key: &str) -> CommandResult<Option<String>> {
        check_key(key)?;
        Ok(self.storage.get_string(key)?)
    }

    /// Writes a string value with the given TTL.
    pub fn set_string(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Ttl,
    ) -> CommandResult<()> {
        let key = key.into();
        check_key(&key)?;
        Ok(self.storage.set_string(key, value, ttl)?)
    }

    /// Reads a dictionary. With no fields the whole dictionary is returned,
    /// otherwise one entry per requested field (`None` for missing ones).
    pub fn get_dict(&self, key: &str, fields: &[&str]) -> CommandResult<Option<FieldValues>> {
        check_key(key)?;
        Ok(self.storage.get_dict(key, fields)?)
    }

    /// Merges fields into a dictionary with the given TTL.
    pub fn set_dict(&self, key: impl Into<String>, fields: Dict, ttl: Ttl) -> CommandResult<()> {
        let key = key.into();
        check_key(&key)?;
        Ok(self.storage.set_dict(key, fields, ttl)?)
    }

    /// Removes a key. Returns whether it existed.
    pub fn delete_key(&self, key: &str) -> CommandResult<bool> {
        check_key(key)?;
        Ok(self.storage.delete_key(key)?)
    }
}

fn check_key(key: &str) -> CommandResult<()> {
    if key.is_empty() {
        return Err(CommandError::EmptyKey);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    #[test]
    fn test_set_get_string() {
        let handler = create_handler();

        let response = handler.execute("set string user:1 alice\r\n");
        assert_eq!(response, Response::ok());

        let response = handler.execute("get string user:1\r\n");
        assert_eq!(response, Response::value("alice"));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        assert_eq!(handler.execute("get string nope"), Response::null());
        assert_eq!(handler.execute("get dict nope"), Response::null());
        assert_eq!(handler.execute("get dict nope a b"), Response::null());
    }

    #[test]
    fn test_literal_null_value() {
        let handler = create_handler();

        // Stored "null" and absence look the same on the wire
        handler.execute("set string k null");
        assert_eq!(handler.get_string("k").unwrap(), Some("null".to_string()));
        assert_eq!(handler.execute("get string k"), Response::null());
    }

    #[test]
    fn test_set_get_dict() {
        let handler = create_handler();

        assert_eq!(
            handler.execute("set dict user:1:meta age:30 city:Paris"),
            Response::ok()
        );
        assert_eq!(
            handler.execute("get dict user:1:meta"),
            Response::Ok("age:30\r\ncity:Paris\r\n".to_string())
        );
        assert_eq!(
            handler.execute("get dict user:1:meta age height"),
            Response::Ok("age:30\r\nheight:null\r\n".to_string())
        );
    }

    #[test]
    fn test_set_dict_merges() {
        let handler = create_handler();

        handler.execute("set dict k a:1 b:2");
        handler.execute("set dict k b:3 c:4");

        assert_eq!(
            handler.execute("get dict k"),
            Response::Ok("a:1\r\nb:3\r\nc:4\r\n".to_string())
        );
    }

    #[test]
    fn test_kind_mismatch_reads_absent() {
        let handler = create_handler();

        handler.execute("set dict d a:1");
        handler.execute("set string s v");

        assert_eq!(handler.execute("get string d"), Response::null());
        assert_eq!(handler.execute("get dict s"), Response::null());
    }

    #[test]
    fn test_delete() {
        let handler = create_handler();

        handler.execute("set string k v");
        assert_eq!(handler.execute("delete k"), Response::ok());
        assert_eq!(handler.execute("get string k"), Response::null());

        // Deleting a missing key is not an error
        assert_eq!(handler.execute("delete k"), Response::ok());
        assert!(!handler.delete_key("k").unwrap());
    }

    #[test]
    fn test_negative_ttl_deletes() {
        let handler = create_handler();

        handler.execute("set string k v");
        assert_eq!(handler.execute("set string k v2 -1s"), Response::ok());
        assert_eq!(handler.execute("get string k"), Response::null());
    }

    #[test]
    fn test_expired_key_swept() {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));

        handler
            .set_string("k", "v", Ttl::Expire(Duration::from_millis(10)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        // Still readable until the sweep runs
        assert_eq!(handler.execute("get string k"), Response::value("v"));

        storage.sweep_expired().unwrap();
        assert_eq!(handler.execute("get string k"), Response::null());
    }

    #[test]
    fn test_empty_key_rejected() {
        let handler = create_handler();

        assert_eq!(handler.execute("get string "), Response::error("Empty Key"));
        assert_eq!(handler.execute("set string  v"), Response::error("Empty Key"));
        assert_eq!(handler.execute("set dict  a:1"), Response::error("Empty Key"));
        assert_eq!(handler.execute("delete "), Response::error("Empty Key"));
        assert_eq!(
            handler.execute("set string  v 10x"),
            Response::error("Empty Key")
        );
        assert_eq!(
            handler.execute("set dict  a:1 bad"),
            Response::error("Empty Key")
        );

        assert!(matches!(
            handler.get_dict("", &[]),
            Err(CommandError::EmptyKey)
        ));
        assert!(matches!(
            handler.set_dict("", Dict::new(), Ttl::Persist),
            Err(CommandError::EmptyKey)
        ));
    }

    #[test]
    fn test_parse_errors() {
        let handler = create_handler();

        assert_eq!(handler.execute("\r\n"), Response::error("Empty Command"));
        assert_eq!(
            handler.execute("set string k"),
            Response::error("Not enough arguments")
        );
        assert_eq!(
            handler.execute("delete a b"),
            Response::error("Too Many Arguments")
        );
        assert_eq!(
            handler.execute("get list k"),
            Response::error("Type Not Supported")
        );
        assert_eq!(
            handler.execute("flush"),
            Response::error("Command Not Supported")
        );
        assert_eq!(
            handler.execute("set string k v 10x"),
            Response::error("TTL Parse Error: unrecognized unit letter: 10x")
        );
        assert_eq!(
            handler.execute("set dict k a:1:2"),
            Response::error("Invalid Dict Input")
        );
    }

    #[test]
    fn test_rejected_command_leaves_store_untouched() {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));

        handler.execute("set string k v 10x");
        handler.execute("set dict k a:1 bad");

        assert!(storage.is_empty());
    }

    #[test]
    fn test_storage_failure_message() {
        let err = CommandError::from(StorageError::LockPoisoned("read"));
        assert!(err.is_storage_failure());
        assert_eq!(err.to_string(), "Storage Failure");
        assert!(!CommandError::EmptyKey.is_storage_failure());
    }
}
