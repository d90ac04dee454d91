use std::cell::RefCell;

use thiserror::Error;

use crate::types::NumberType;

/// Errors raised by point, level, linkage and region operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PointError {
    #[error("Invalid {kind} handle: slot {slot}, generation {generation}")]
    InvalidHandle {
        kind: &'static str,
        slot: u32,
        generation: u32,
    },
    #[error("No more than {limit} {what} may be open simultaneously")]
    CapacityExceeded { what: &'static str, limit: usize },
    #[error("Name \"{name}\" must be less than {max} characters")]
    InvalidName { name: String, max: usize },
    #[error("Field definition error: {0}")]
    FieldDefinition(String),
    #[error("\"{first}\" & \"{second}\" must be in same level")]
    LevelMismatch { first: String, second: String },
    #[error("Linkage error: {0}")]
    Linkage(String),
    #[error("No linkage defined between levels: {child} and {parent}")]
    LinkageUndefined { child: usize, parent: usize },
    #[error("Field type {number_type} of \"{field}\" not supported for {purpose}")]
    UnsupportedFieldType {
        field: String,
        number_type: NumberType,
        purpose: &'static str,
    },
    #[error("Unable to allocate {requested} elements in '{routine}'")]
    OutOfMemory {
        routine: &'static str,
        requested: usize,
    },
    #[error("Field \"{field}\" not found{}", level_suffix(.level))]
    FieldNotFound { field: String, level: Option<usize> },
    #[error("Point record number {record} out of range (level {level} has {count} records)")]
    RecordOutOfRange {
        level: usize,
        record: usize,
        count: usize,
    },
    #[error("Level {0} not found")]
    LevelNotFound(String),
    #[error("Point \"{0}\" does not exist")]
    PointNotFound(String),
    #[error("\"{0}\" already exists")]
    AlreadyExists(String),
    #[error("Attribute \"{0}\" not found")]
    AttributeNotFound(String),
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[error("Storage error in '{method_name}': {msg}")]
    Storage {
        method_name: &'static str,
        msg: String,
    },
}

fn level_suffix(level: &Option<usize>) -> String {
    level.map(|l| format!(" in level {l}")).unwrap_or_default()
}

/// A `Result` type alias using [`PointError`].
pub type Result<T> = std::result::Result<T, PointError>;

/// One entry on the error stack: the failing routine and what went wrong.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub routine: &'static str,
    pub error: PointError,
}

thread_local! {
    static ERROR_STACK: RefCell<Vec<ErrorRecord>> = const { RefCell::new(Vec::new()) };
}

/// Pushes a failure onto the calling thread's error stack and notifies the
/// installed error handler, if any.
pub(crate) fn push_error(routine: &'static str, error: &PointError) {
    log::warn!("{routine}: {error}");
    crate::config::notify_error_handler(routine, error);
    ERROR_STACK.with(|stack| {
        stack.borrow_mut().push(ErrorRecord {
            routine,
            error: error.clone(),
        })
    });
}

/// Records the error of a failed operation on the error stack and passes the
/// result through unchanged.
pub(crate) fn trap<T>(routine: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        push_error(routine, e);
    }
    result
}

/// Snapshot of the error stack, oldest first.
pub fn error_stack() -> Vec<ErrorRecord> {
    ERROR_STACK.with(|stack| stack.borrow().clone())
}

/// The most recently pushed error, if any.
pub fn last_error() -> Option<ErrorRecord> {
    ERROR_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Empties the error stack and releases its storage.
pub fn clear_error_stack() {
    ERROR_STACK.with(|stack| {
        stack.replace(Vec::new());
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trap_pushes_only_failures() {
        clear_error_stack();
        let ok: Result<u8> = trap("noop", Ok(3));
        assert_eq!(ok, Ok(3));
        assert!(error_stack().is_empty());

        let err: Result<u8> = trap("level_index", Err(PointError::LevelNotFound("Obs".into())));
        assert!(err.is_err());
        let last = last_error().unwrap();
        assert_eq!(last.routine, "level_index");
        assert_eq!(last.error, PointError::LevelNotFound("Obs".into()));

        clear_error_stack();
        assert!(last_error().is_none());
    }

    #[test]
    fn test_field_not_found_message() {
        let e = PointError::FieldNotFound {
            field: "Time".into(),
            level: Some(1),
        };
        assert_eq!(e.to_string(), "Field \"Time\" not found in level 1");
        let e = PointError::FieldNotFound {
            field: "Longitude".into(),
            level: None,
        };
        assert_eq!(e.to_string(), "Field \"Longitude\" not found");
    }
}
