//! Suspendable tasks
//!
//! A [`Task`] is a resumable state machine. Each call to [`Task::resume`]
//! runs it up to its next suspension point, where it either yields a
//! request for an engine to service or terminates with a value or a
//! failure.
//!
//! ```text
//!            resume(Value | Throw)
//!   engine ───────────────────────▶ task
//!          ◀─────────────────────── Yield(Call | Suspend)
//!                                   Done(value) / Failed(failure)
//! ```
//!
//! Tasks can be written by hand ([`from_fn`]) or with `async` blocks via
//! [`AsyncTask`].

mod driver;
pub mod future;

pub use driver::{block_on, reject_outer};
pub use future::{AsyncTask, Cx};

use crate::error::{Failure, Outcome};
use crate::value::{Kwargs, Value};

/// A boxed, type-erased task
pub type BoxTask = Box<dyn Task>;

/// A named action request
#[derive(Debug)]
pub struct Request {
    /// Action name looked up in the engine's table
    pub name: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Kwargs,
}

impl Request {
    /// Create a request with positional arguments only
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs: Kwargs::default(),
        }
    }

    /// Add a keyword argument
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

/// What a task hands to whoever resumes it when it suspends
#[derive(Debug)]
pub enum Yield {
    /// Ask the engine to dispatch an action
    Call(Request),
    /// Raw suspension for the outer driver, bypassing dispatch
    Suspend(Value),
}

/// Input for the next resumption
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// Continue with a value
    Value(Value),
    /// Raise a failure at the suspension point
    Throw(Failure),
}

impl Resume {
    /// Input that starts a fresh task
    pub fn start() -> Self {
        Resume::Value(Value::None)
    }

    /// Convert back into a result
    pub fn into_outcome(self) -> Outcome {
        match self {
            Resume::Value(value) => Ok(value),
            Resume::Throw(failure) => Err(failure),
        }
    }
}

impl From<Outcome> for Resume {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(value) => Resume::Value(value),
            Err(failure) => Resume::Throw(failure),
        }
    }
}

/// Result of one resumption
#[derive(Debug)]
pub enum Step {
    /// The task suspended
    Yield(Yield),
    /// The task returned normally
    Done(Value),
    /// The task terminated with a failure
    Failed(Failure),
}

impl From<Outcome> for Step {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(value) => Step::Done(value),
            Err(failure) => Step::Failed(failure),
        }
    }
}

/// A suspendable computation
///
/// The first resumption of a fresh task receives [`Resume::start`]. Once a
/// task returned [`Step::Done`] or [`Step::Failed`] it must not be resumed
/// again; engines never do so.
pub trait Task {
    /// Run until the next suspension point or termination
    fn resume(&mut self, input: Resume) -> Step;

    /// Resume with a value
    fn send(&mut self, value: Value) -> Step {
        self.resume(Resume::Value(value))
    }

    /// Resume by raising `failure` at the suspension point
    fn throw(&mut self, failure: Failure) -> Step {
        self.resume(Resume::Throw(failure))
    }
}

impl<T: Task + ?Sized> Task for Box<T> {
    fn resume(&mut self, input: Resume) -> Step {
        (**self).resume(input)
    }
}

/// Build a request for action `name`
pub fn call(name: impl Into<String>, args: Vec<Value>) -> Yield {
    Yield::Call(Request::new(name, args))
}

/// Yield `data` straight to the outer driver
///
/// Meant for suspending actions: the engine forwards the suspension of an
/// in-flight action outward unchanged.
pub fn suspend(data: Value) -> Yield {
    Yield::Suspend(data)
}

/// A task backed by a closure
pub struct FnTask<F> {
    f: F,
}

impl<F: FnMut(Resume) -> Step> Task for FnTask<F> {
    fn resume(&mut self, input: Resume) -> Step {
        (self.f)(input)
    }
}

/// Build a hand-written state machine from a closure
pub fn from_fn<F: FnMut(Resume) -> Step>(f: F) -> FnTask<F> {
    FnTask { f }
}

/// A task that returns `value` on its first resumption
pub fn ready(value: Value) -> impl Task {
    let mut value = Some(value);
    from_fn(move |_| match value.take() {
        Some(value) => Step::Done(value),
        None => Step::Failed(Failure::Protocol("resumed after completion".into())),
    })
}

/// A task that fails with `failure` on its first resumption
pub fn failing(failure: Failure) -> impl Task {
    let mut failure = Some(failure);
    from_fn(move |_| match failure.take() {
        Some(failure) => Step::Failed(failure),
        None => Step::Failed(Failure::Protocol("resumed after completion".into())),
    })
}
