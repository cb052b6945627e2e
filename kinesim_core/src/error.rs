//! Error types for the kinesim core.

use thiserror::Error;

/// Everything that can go wrong inside the runtime.
///
/// The command dispatcher and message translator turn every variant into a
/// failed response; none of them is fatal.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist
    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    /// Entity name already in use
    #[error("Entity '{0}' already exists")]
    DuplicateEntity(String),

    /// Two commands registered under one name
    #[error("Command '{0}' registered twice")]
    DuplicateCommand(String),

    /// Dispatcher has no handler for the name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Input line was blank
    #[error("Empty command")]
    EmptyCommand,

    /// Required argument absent
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    /// Argument present but not a number
    #[error("Invalid number '{value}' for {context}")]
    InvalidNumber { value: String, context: &'static str },

    /// Argument present but otherwise unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Inbound message failed schema validation
    #[error("Decode error: {0}")]
    Decode(String),

    /// Tile code did not parse
    #[error("Invalid tile code '{0}'")]
    InvalidTileCode(String),

    /// Patch geometry is unusable
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// No loaded or archived tile/patch under that key
    #[error("Tile or patch '{0}' not found")]
    TileNotFound(String),

    /// Operation not allowed in the clock's current state
    #[error("Clock error: {0}")]
    ClockState(String),

    /// Unknown configuration key or mistyped value
    #[error("Config error: {0}")]
    Config(String),

    /// Tile archive failure
    #[error("Archive error: {0}")]
    Archive(#[from] sled::Error),

    /// JSON encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Creates an entity-not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::EntityNotFound(name.into())
    }

    /// Creates a decode error.
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::Decode(msg.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
