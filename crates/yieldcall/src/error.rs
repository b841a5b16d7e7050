//! Error types for engine setup and task execution

use crate::value::Value;

/// Outcome of a task, an action, or a whole run
pub type Outcome = Result<Value, Failure>;

/// Result type for setup operations
pub type SetupResult<T> = Result<T, SetupError>;

/// Result type returned by the engines' `run` functions
pub type RunResult<T> = Result<T, Error>;

/// Raised synchronously while an engine is being set up, before any task runs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// The supplied action table is not a mapping of names to handlers
    #[error("Invalid action table: {0}")]
    InvalidTable(String),

    /// A reserved action name was supplied by the embedder
    #[error("Reserved action {0:?} is already in the action table")]
    DuplicateAction(String),

    /// A reserved action name has no engine binding
    #[error("Reserved action {0:?} has no binding")]
    MissingBinding(String),
}

/// A failure travelling through tasks
///
/// Failures are thrown into tasks, stored on rotator records and handed to
/// every waiter, so they are cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// A request named an action absent from the table
    #[error("Unknown action: {0:?}")]
    UnknownAction(String),

    /// An action was called with the wrong number of arguments
    #[error("Argument error in {action:?}: {reason}")]
    InvalidArguments {
        /// Action name
        action: String,
        /// What was wrong
        reason: String,
    },

    /// A value had the wrong type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// A task yielded something an engine cannot dispatch
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Raised by task or action code
    #[error("{kind}: {message}")]
    Raised {
        /// Failure class, chosen by the raiser
        kind: String,
        /// Human readable message
        message: String,
    },

    /// `stack_add` beyond the configured depth limit
    #[error("Stack overflow: frame limit {0} reached")]
    StackOverflow(usize),

    /// `new_coro` beyond the configured live-task limit
    #[error("Task limit {0} reached")]
    TaskLimit(usize),

    /// No task can ever be resumed again
    #[error("Deadlock: every task is waiting")]
    Deadlock,

    /// A suspension reached a driver that cannot handle it
    #[error("Unhandled suspension: {0}")]
    Unhandled(String),

    /// A task broke the resume protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Interrupt requested by the embedder
    #[error("Interrupted")]
    Interrupted,

    /// Exit requested with a status code
    #[error("Exit with status {0}")]
    Exit(i32),
}

impl Failure {
    /// Build a [`Failure::Raised`]
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Failure::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build a [`Failure::TypeMismatch`] for `got`
    pub fn type_mismatch(expected: impl Into<String>, got: &Value) -> Self {
        Failure::TypeMismatch {
            expected: expected.into(),
            got: got.type_name().to_string(),
        }
    }

    /// Whether this failure aborts a whole run under the default policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, Failure::Interrupted | Failure::Exit(_))
    }
}

/// Error returned by `run`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Setup failed; no task ran
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The root task (or a fatal failure) terminated the run
    #[error(transparent)]
    Failed(#[from] Failure),
}

impl Error {
    /// The task failure, if this is not a setup error
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Error::Failed(failure) => Some(failure),
            Error::Setup(_) => None,
        }
    }
}
