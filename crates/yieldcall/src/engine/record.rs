//! Rotator task records and the registry arena
//!
//! Records are shared (`Rc<RefCell<..>>`) because the same record is held
//! by the registry, by the sweep currently driving it, by waiters' lists and
//! by any task that asked for it through `new_coro`/`this_info`/`all_info`.
//! The registry holds only live records, ordered by id; ids come from a
//! counter and are never reused.

use crate::error::{Failure, Outcome};
use crate::task::BoxTask;
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Identifier of a rotator task, unique within one run
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of one rotator task
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    /// Absent while the task is being resumed and after it terminated
    pub(crate) coro: Option<BoxTask>,
    pub(crate) val: Value,
    pub(crate) exc: Option<Failure>,
    pub(crate) active: bool,
    pub(crate) terminated: bool,
    pub(crate) waiting: Vec<RecordRef>,
}

impl TaskRecord {
    fn new(id: TaskId, coro: BoxTask) -> Self {
        Self {
            id,
            coro: Some(coro),
            val: Value::None,
            exc: None,
            active: true,
            terminated: false,
            waiting: Vec::new(),
        }
    }

    /// Input for the next resumption
    pub(crate) fn pending_input(&self) -> crate::task::Resume {
        match &self.exc {
            Some(failure) => crate::task::Resume::Throw(failure.clone()),
            None => crate::task::Resume::Value(self.val.clone()),
        }
    }

    pub(crate) fn settle(&mut self, outcome: Outcome) {
        match outcome {
            Ok(value) => {
                self.val = value;
                self.exc = None;
            }
            Err(failure) => {
                self.val = Value::None;
                self.exc = Some(failure);
            }
        }
    }
}

/// Shared handle to the scheduling state of one rotator task
#[derive(Clone)]
pub struct RecordRef(Rc<RefCell<TaskRecord>>);

impl RecordRef {
    pub(crate) fn new(id: TaskId, coro: BoxTask) -> Self {
        RecordRef(Rc::new(RefCell::new(TaskRecord::new(id, coro))))
    }

    pub(crate) fn borrow(&self) -> std::cell::Ref<'_, TaskRecord> {
        self.0.borrow()
    }

    pub(crate) fn borrow_mut(&self) -> std::cell::RefMut<'_, TaskRecord> {
        self.0.borrow_mut()
    }

    /// Task id
    pub fn id(&self) -> TaskId {
        self.borrow().id
    }

    /// Whether the task may be resumed in the current sweep
    pub fn is_active(&self) -> bool {
        self.borrow().active
    }

    /// Whether the task has finished
    pub fn is_terminated(&self) -> bool {
        self.borrow().terminated
    }

    /// Last value delivered to the task, or its return value once terminated
    pub fn val(&self) -> Value {
        self.borrow().val.clone()
    }

    /// Pending failure, or the terminal failure once terminated
    pub fn exc(&self) -> Option<Failure> {
        self.borrow().exc.clone()
    }

    /// Ids of the tasks waiting for this one
    pub fn waiting_ids(&self) -> Vec<TaskId> {
        self.borrow().waiting.iter().map(RecordRef::id).collect()
    }

    /// `val` if there is no `exc`, else `exc`
    pub fn result(&self) -> Outcome {
        let record = self.borrow();
        match &record.exc {
            Some(failure) => Err(failure.clone()),
            None => Ok(record.val.clone()),
        }
    }

    /// Check if both handles point at the same record
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Re-activate a waiter of a terminated record
    pub(crate) fn wake(&self) {
        let mut record = self.borrow_mut();
        if !record.terminated {
            record.active = true;
            record.val = Value::None;
            record.exc = None;
        }
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => f
                .debug_struct("TaskRecord")
                .field("id", &record.id)
                .field("active", &record.active)
                .field("terminated", &record.terminated)
                .field("val", &record.val)
                .field("exc", &record.exc)
                .finish_non_exhaustive(),
            Err(_) => f.write_str("TaskRecord(<borrowed>)"),
        }
    }
}

/// Live records indexed by id
#[derive(Default)]
pub struct Registry {
    records: BTreeMap<TaskId, RecordRef>,
    next_id: u64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `coro` under the next id
    pub fn spawn(&mut self, coro: BoxTask) -> RecordRef {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let record = RecordRef::new(id, coro);
        self.records.insert(id, record.clone());
        record
    }

    /// Get a live record
    pub fn get(&self, id: TaskId) -> Option<&RecordRef> {
        self.records.get(&id)
    }

    /// Evict a record
    pub fn remove(&mut self, id: TaskId) -> Option<RecordRef> {
        self.records.remove(&id)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is live
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of live records in insertion order
    pub fn snapshot(&self) -> Vec<TaskId> {
        self.records.keys().copied().collect()
    }

    /// Iterate live records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &RecordRef)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Copy of the live set as a map
    pub fn to_map(&self) -> FxHashMap<TaskId, RecordRef> {
        self.iter().map(|(id, r)| (id, r.clone())).collect()
    }

    /// Evict every record, dropping tasks and waiter lists
    ///
    /// A task's body may hold records (its own, ones it waits on) while
    /// records hold tasks and waiters; clearing both sides breaks those
    /// reference cycles.
    pub fn clear(&mut self) {
        for record in mem::take(&mut self.records).into_values() {
            let (coro, waiting) = {
                let mut inner = record.borrow_mut();
                (inner.coro.take(), mem::take(&mut inner.waiting))
            };
            drop(coro);
            drop(waiting);
        }
    }
}
