//! Error types for the coach_core library.

use crate::notation::NotationError;
use crate::series::SeriesError;
use crate::types::ProgramStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of entity a not-found error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Program,
    Week,
    Session,
    Group,
    ExerciseRow,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Program => "program",
            EntityType::Week => "week",
            EntityType::Session => "session",
            EntityType::Group => "group",
            EntityType::ExerciseRow => "exercise_row",
        };
        f.write_str(name)
    }
}

/// Level of the program tree a validation error was raised at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Week,
    Session,
    Group,
    Item,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Week => "week",
            Level::Session => "session",
            Level::Group => "group",
            Level::Item => "item",
        };
        f.write_str(name)
    }
}

/// Input validation failures. Always correctable by the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Program name is required")]
    NameRequired,

    #[error("Program name must not exceed {max} characters")]
    NameTooLong { max: usize },

    #[error("Week name must not exceed {max} characters")]
    WeekNameTooLong { max: usize },

    #[error("Session name is required")]
    SessionNameRequired,

    #[error("Session name must not exceed {max} characters")]
    SessionNameTooLong { max: usize },

    #[error("{level} order index out of range: {order_index}")]
    OrderIndexOutOfRange { level: Level, order_index: i64 },

    #[error("Duplicate {level} orderIndex: {order_index}")]
    DuplicateOrderIndex { level: Level, order_index: i64 },

    #[error("Exercise group must have at least one exercise")]
    EmptyGroup,

    #[error("Exercise ID is required")]
    ExerciseIdRequired,

    #[error("Series {series_index}: {source}")]
    Series {
        series_index: usize,
        source: SeriesError,
    },

    #[error("Program has no weeks")]
    NoWeeks,

    #[error("Invalid prescription notation: {0}")]
    Notation(#[from] NotationError),
}

/// Core error type for coach_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller lacks the permission the operation requires
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced entity is absent or outside the caller's organization
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    /// Illegal program status change
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: ProgramStatus,
        to: ProgramStatus,
    },

    /// Create-from-template source is a regular program
    #[error("Program {0} is not a template")]
    NotATemplate(String),

    #[error("Cannot delete the last week of a program")]
    LastWeek,

    #[error("Cannot delete the last session of a program")]
    LastSession,

    /// Persistence failure; details are logged where the error is converted
    #[error("Internal error")]
    Repository,

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: EntityType, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }
}

impl From<NotationError> for Error {
    fn from(err: NotationError) -> Self {
        Error::Validation(ValidationError::Notation(err))
    }
}
