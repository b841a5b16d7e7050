//! Dynamic values exchanged between tasks, actions and engines
//!
//! Requests name their action by string and carry untyped arguments, so
//! everything that crosses a suspension point is a [`Value`]. Besides plain
//! data a value can carry a not-yet-started task ([`TaskHandle`]), a live
//! scheduling record of the rotator, or an action handler (for tables built
//! dynamically).

use crate::action::Handler;
use crate::engine::record::{RecordRef, TaskId};
use crate::task::{BoxTask, Task};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Keyword arguments of a request
pub type Kwargs = FxHashMap<String, Value>;

/// A dynamically typed value
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value (the resume value of a fresh task)
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Owned string
    Str(String),
    /// Ordered sequence
    List(Vec<Value>),
    /// String-keyed mapping
    Map(FxHashMap<String, Value>),
    /// A task waiting to be handed to an engine
    Task(TaskHandle),
    /// A rotator scheduling record
    Record(RecordRef),
    /// Snapshot of the rotator registry (id -> record)
    Registry(FxHashMap<TaskId, RecordRef>),
    /// An action handler
    Action(Handler),
    /// Embedder-defined payload
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Wrap a task so it can be passed as an argument
    pub fn task(task: impl Task + 'static) -> Self {
        Value::Task(TaskHandle::new(task))
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Task(_) => "task",
            Value::Record(_) => "record",
            Value::Registry(_) => "registry",
            Value::Action(_) => "action",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Check if this is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Get as bool if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if this is an int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float; integers are widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as slice if this is a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the record if this is a record
    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Get the registry snapshot if this is one
    pub fn as_registry(&self) -> Option<&FxHashMap<TaskId, RecordRef>> {
        match self {
            Value::Registry(map) => Some(map),
            _ => None,
        }
    }

    /// Downcast an opaque payload
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(any) => any.downcast_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Task(handle) => fmt::Debug::fmt(handle, f),
            Value::Record(record) => fmt::Debug::fmt(record, f),
            Value::Registry(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Action(_) => f.write_str("<action>"),
            Value::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

/// Structural equality for data; identity for tasks, records, actions and
/// opaque payloads.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Task(a), Value::Task(b)) => a.ptr_eq(b),
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::Registry(a), Value::Registry(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(id, r)| b.get(id).is_some_and(|o| o.ptr_eq(r)))
            }
            (Value::Action(a), Value::Action(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<TaskId> for Value {
    fn from(id: TaskId) -> Self {
        Value::Int(id.as_u64() as i64)
    }
}

impl From<RecordRef> for Value {
    fn from(record: RecordRef) -> Self {
        Value::Record(record)
    }
}

impl From<Handler> for Value {
    fn from(handler: Handler) -> Self {
        Value::Action(handler)
    }
}

/// A task travelling inside a [`Value`]
///
/// Values are cloneable while tasks are not, so the task sits behind a
/// shared take-once slot: the first engine operation that consumes it
/// (`stack_add`, `new_coro`) takes it out, later attempts find it empty.
#[derive(Clone)]
pub struct TaskHandle(Rc<RefCell<Option<BoxTask>>>);

impl TaskHandle {
    /// Wrap a task
    pub fn new(task: impl Task + 'static) -> Self {
        Self::from_boxed(Box::new(task))
    }

    /// Wrap an already boxed task
    pub fn from_boxed(task: BoxTask) -> Self {
        TaskHandle(Rc::new(RefCell::new(Some(task))))
    }

    /// Take the task out, leaving the handle empty
    pub fn take(&self) -> Option<BoxTask> {
        self.0.borrow_mut().take()
    }

    /// Whether the task has already been handed over
    pub fn is_taken(&self) -> bool {
        self.0.borrow().is_none()
    }

    /// Check if both handles share the same slot
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_taken() {
            f.write_str("<task (taken)>")
        } else {
            f.write_str("<task>")
        }
    }
}
