//! Action handlers and the name-indexed action table
//!
//! Every suspension of a task that wants something done is a named request.
//! Engines resolve the name through an [`ActionTable`] and invoke the
//! [`Handler`] found there.

pub mod dispatch;

pub use dispatch::{bind, dispatch, Builtin};

use crate::error::{Failure, Outcome, SetupError};
use crate::task::{BoxTask, Task};
use crate::value::{Kwargs, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

/// Arguments of one action invocation
#[derive(Debug, Default)]
pub struct Call {
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Kwargs,
}

impl Call {
    /// Create a call with positional arguments only
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Kwargs::default(),
        }
    }

    /// Get a positional argument
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Get a keyword argument
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Check that exactly `count` positional arguments and no keyword
    /// arguments were passed
    pub fn expect_args(&self, action: &str, count: usize) -> Result<(), Failure> {
        if self.args.len() != count {
            return Err(Failure::InvalidArguments {
                action: action.to_string(),
                reason: format!("expected {count} argument(s), got {}", self.args.len()),
            });
        }
        if let Some(key) = self.kwargs.keys().next() {
            return Err(Failure::InvalidArguments {
                action: action.to_string(),
                reason: format!("unexpected keyword argument {key:?}"),
            });
        }
        Ok(())
    }
}

/// What a handler produces
pub enum Invocation {
    /// Finished synchronously
    Ready(Outcome),
    /// Must suspend: the engine drives this task in place of the handler,
    /// forwarding its yields to the outer driver, and uses its result
    Task(BoxTask),
    /// One of the engine's own reserved operations
    Builtin(Builtin),
}

impl Invocation {
    /// Successful synchronous result
    pub fn value(value: impl Into<Value>) -> Self {
        Invocation::Ready(Ok(value.into()))
    }

    /// Failed synchronous result
    pub fn failure(failure: Failure) -> Self {
        Invocation::Ready(Err(failure))
    }

    /// Suspending result
    pub fn task(task: impl Task + 'static) -> Self {
        Invocation::Task(Box::new(task))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Invocation::Task(_) => f.write_str("Task(..)"),
            Invocation::Builtin(builtin) => f.debug_tuple("Builtin").field(builtin).finish(),
        }
    }
}

impl From<Outcome> for Invocation {
    fn from(outcome: Outcome) -> Self {
        Invocation::Ready(outcome)
    }
}

/// A named, invocable action
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(Call) -> Invocation>);

impl Handler {
    /// Handler from a closure returning an [`Invocation`]
    pub fn new(f: impl Fn(Call) -> Invocation + 'static) -> Self {
        Handler(Rc::new(f))
    }

    /// Handler that always completes synchronously
    pub fn sync(f: impl Fn(Call) -> Outcome + 'static) -> Self {
        Self::new(move |call| Invocation::Ready(f(call)))
    }

    /// Handler that suspends by running the task it builds
    pub fn suspending<T: Task + 'static>(f: impl Fn(Call) -> T + 'static) -> Self {
        Self::new(move |call| Invocation::Task(Box::new(f(call))))
    }

    /// Invoke the handler
    pub fn invoke(&self, call: Call) -> Invocation {
        (self.0)(call)
    }

    /// Check if both handles share the same closure
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// Table of actions indexed by name
///
/// Built by the embedder, handed to an engine, which binds its reserved
/// names into it and only reads it afterwards.
#[derive(Clone, Default)]
pub struct ActionTable {
    handlers: FxHashMap<String, Handler>,
}

impl ActionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; returns the handler previously under `name`
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) -> Option<Handler> {
        self.handlers.insert(name.into(), handler)
    }

    /// Register a plain function as a synchronous action
    pub fn add(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Call) -> Outcome + 'static,
    ) -> &mut Self {
        self.insert(name, Handler::sync(f));
        self
    }

    /// Register a suspending action
    pub fn add_suspending<T: Task + 'static>(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Call) -> T + 'static,
    ) -> &mut Self {
        self.insert(name, Handler::suspending(f));
        self
    }

    /// Builder form of [`ActionTable::add`]
    pub fn with(mut self, name: impl Into<String>, f: impl Fn(Call) -> Outcome + 'static) -> Self {
        self.add(name, f);
        self
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Check if a handler is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Look `name` up and invoke it
    pub fn invoke(&self, name: &str, call: Call) -> Result<Invocation, Failure> {
        let handler = self
            .get(name)
            .ok_or_else(|| Failure::UnknownAction(name.to_string()))?;
        Ok(handler.invoke(call))
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ActionTable").field("actions", &names).finish()
    }
}

/// Build a table from a dynamic mapping of names to [`Value::Action`]s
impl TryFrom<Value> for ActionTable {
    type Error = SetupError;

    fn try_from(value: Value) -> Result<Self, SetupError> {
        let Value::Map(entries) = value else {
            return Err(SetupError::InvalidTable(format!(
                "expected a map, got {}",
                value.type_name()
            )));
        };
        let mut table = ActionTable::new();
        for (name, entry) in entries {
            match entry {
                Value::Action(handler) => {
                    table.insert(name, handler);
                }
                other => {
                    return Err(SetupError::InvalidTable(format!(
                        "entry {name:?} is a {}, not an action",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(table)
    }
}
