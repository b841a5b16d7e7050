//! Multi-task rotator
//!
//! Drives a dynamically growing set of tasks cooperatively. Every task has a
//! record ([`RecordRef`]) in the registry; the rotator
//! repeatedly sweeps the registry and drives each active record until it
//! becomes inactive or terminates.
//!
//! A sweep visits a snapshot of the live ids taken when it starts, newest
//! first. Records spawned during a sweep join the next one, where they run
//! before their (older) spawner.
//!
//! Reserved actions, all acting on the record being driven:
//!
//! | action          | effect                                               |
//! |-----------------|------------------------------------------------------|
//! | `new_coro(t)`   | spawn `t`, answer its record                         |
//! | `wait_coro(r)`  | sleep until `r` terminates (no-op if it already has) |
//! | `this_id()`     | own id                                               |
//! | `this_info()`   | own record                                           |
//! | `all_info()`    | every live record, keyed by id, unordered            |
//! | `schedule()`    | give up the rest of this sweep                       |

use super::record::{RecordRef, Registry, TaskId};
use super::{EngineOptions, FatalPolicy};
use crate::action::dispatch::{self, builtin, record_arg, task_arg, EngineOp};
use crate::action::{ActionTable, Call, Invocation};
use crate::error::{Failure, Outcome, RunResult, SetupResult};
use crate::task::{block_on, call, reject_outer, BoxTask, Request, Resume, Step, Task, Yield};
use crate::value::Value;
use tracing::{debug, trace};

/// Reserved action: spawn a task
pub const NEW_CORO: &str = "new_coro";
/// Reserved action: wait for a task to terminate
pub const WAIT_CORO: &str = "wait_coro";
/// Reserved action: own id
pub const THIS_ID: &str = "this_id";
/// Reserved action: own record
pub const THIS_INFO: &str = "this_info";
/// Reserved action: all live records
pub const ALL_INFO: &str = "all_info";
/// Reserved action: yield for one sweep
pub const SCHEDULE: &str = "schedule";

/// Reserved action names of the rotator
pub const RESERVED: &[&str] = &[NEW_CORO, WAIT_CORO, THIS_ID, THIS_INFO, ALL_INFO, SCHEDULE];

/// Request spawning `task`
pub fn new_coro(task: impl Task + 'static) -> Yield {
    call(NEW_CORO, vec![Value::task(task)])
}

/// Request waiting for `record`
pub fn wait_coro(record: &RecordRef) -> Yield {
    call(WAIT_CORO, vec![Value::Record(record.clone())])
}

/// Request for the current task's id
pub fn this_id() -> Yield {
    call(THIS_ID, vec![])
}

/// Request for the current task's record
pub fn this_info() -> Yield {
    call(THIS_INFO, vec![])
}

/// Request for all live records
pub fn all_info() -> Yield {
    call(ALL_INFO, vec![])
}

/// Request to yield for the rest of the sweep
pub fn schedule() -> Yield {
    call(SCHEDULE, vec![])
}

/// `val` of `record` if it has no `exc`, else `exc`
pub fn get_result(record: &RecordRef) -> Outcome {
    record.result()
}

fn no_args(action: &'static str, op: fn() -> EngineOp) -> crate::action::Handler {
    builtin(move |call: Call| {
        call.expect_args(action, 0)?;
        Ok(op())
    })
}

fn bindings() -> ActionTable {
    let mut table = ActionTable::new();
    table.insert(NEW_CORO, builtin(|call| task_arg(NEW_CORO, call).map(EngineOp::NewCoro)));
    table.insert(WAIT_CORO, builtin(|call| record_arg(WAIT_CORO, call).map(EngineOp::WaitCoro)));
    table.insert(THIS_ID, no_args(THIS_ID, || EngineOp::ThisId));
    table.insert(THIS_INFO, no_args(THIS_INFO, || EngineOp::ThisInfo));
    table.insert(ALL_INFO, no_args(ALL_INFO, || EngineOp::AllInfo));
    table.insert(SCHEDULE, no_args(SCHEDULE, || EngineOp::Schedule));
    table
}

/// Rotator statistics
#[derive(Debug, Clone, Default)]
pub struct RotatorStats {
    /// Total tasks spawned, root included
    pub spawned: u64,

    /// Total tasks terminated
    pub completed: u64,

    /// Sweeps started
    pub sweeps: u64,

    /// Currently live tasks
    pub live: usize,
}

/// The record being driven
struct Visit {
    record: RecordRef,
    /// Set by `schedule()`; ends this visit without deactivating the record
    yielded: bool,
}

/// The multi-task engine
pub struct Rotator {
    registry: Registry,
    root: RecordRef,
    actions: ActionTable,
    options: EngineOptions,

    /// Ids still to visit in this sweep, oldest first (visited from the back)
    sweep: Vec<TaskId>,
    current: Option<Visit>,

    /// Suspending action in flight for the current record
    action: Option<BoxTask>,

    /// Whether any task was resumed during this sweep
    progressed: bool,
    finished: bool,
    stats: RotatorStats,
}

impl Rotator {
    /// Create a rotator with `task` as root and default options
    pub fn new(task: impl Task + 'static, actions: ActionTable) -> SetupResult<Self> {
        Self::with_options(task, actions, EngineOptions::default())
    }

    /// Create a rotator with `task` as root
    pub fn with_options(
        task: impl Task + 'static,
        mut actions: ActionTable,
        options: EngineOptions,
    ) -> SetupResult<Self> {
        dispatch::bind(&mut actions, RESERVED, &bindings())?;
        let mut registry = Registry::new();
        let root = registry.spawn(Box::new(task));
        debug!(actions = actions.len(), ?options, root = %root.id(), "rotator ready");
        Ok(Self {
            registry,
            root,
            actions,
            options,
            sweep: Vec::new(),
            current: None,
            action: None,
            progressed: false,
            finished: false,
            stats: RotatorStats {
                spawned: 1,
                ..RotatorStats::default()
            },
        })
    }

    /// Record of the root task
    pub fn root(&self) -> &RecordRef {
        &self.root
    }

    /// Live records
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether the run is over
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get rotator statistics
    pub fn stats(&self) -> RotatorStats {
        RotatorStats {
            live: self.registry.len(),
            ..self.stats.clone()
        }
    }

    fn fatal(&self) -> &FatalPolicy {
        &self.options.fatal
    }

    fn current_record(&self) -> Result<RecordRef, Failure> {
        self.current
            .as_ref()
            .map(|visit| visit.record.clone())
            .ok_or_else(|| Failure::Protocol("no task is being driven".into()))
    }

    /// Mark `record` terminated with `outcome`, wake its waiters, evict it
    ///
    /// Returns the engine's final step when the failure is fatal.
    fn terminate(&mut self, record: &RecordRef, outcome: Outcome) -> Option<Step> {
        let id = record.id();
        let fatal = match &outcome {
            Err(failure) if self.fatal().is_fatal(failure) => Some(failure.clone()),
            _ => None,
        };

        let (coro, waiters) = {
            let mut inner = record.borrow_mut();
            inner.active = false;
            inner.terminated = true;
            inner.settle(outcome);
            (inner.coro.take(), std::mem::take(&mut inner.waiting))
        };
        drop(coro);
        for waiter in &waiters {
            waiter.wake();
        }
        self.registry.remove(id);
        self.current = None;
        self.stats.completed += 1;
        debug!(task = %id, woken = waiters.len(), live = self.registry.len(), "task terminated");

        if let Some(failure) = fatal {
            debug!(task = %id, %failure, "fatal failure aborts the run");
            self.finished = true;
            return Some(Step::Failed(failure));
        }
        None
    }

    /// Store the outcome of an action on the current record
    fn settle(&mut self, outcome: Outcome) -> Option<Step> {
        let record = match self.current_record() {
            Ok(record) => record,
            Err(failure) => {
                self.finished = true;
                return Some(Step::Failed(failure));
            }
        };
        match outcome {
            Err(failure) if self.fatal().is_fatal(&failure) => self.terminate(&record, Err(failure)),
            outcome => {
                record.borrow_mut().settle(outcome);
                None
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Option<Step> {
        trace!(action = %request.name, "dispatch");
        let outcome = match dispatch::dispatch(&self.actions, request) {
            Ok(Invocation::Ready(outcome)) => outcome,
            Ok(Invocation::Task(action)) => {
                self.action = Some(action);
                return None;
            }
            Ok(Invocation::Builtin(op)) => self.apply(op.0),
            Err(failure) => Err(failure),
        };
        self.settle(outcome)
    }

    fn apply(&mut self, op: EngineOp) -> Outcome {
        let current = self.current_record()?;
        match op {
            EngineOp::NewCoro(task) => {
                if let Some(max) = self.options.max_tasks {
                    if self.registry.len() >= max {
                        return Err(Failure::TaskLimit(max));
                    }
                }
                let record = self.registry.spawn(task);
                self.stats.spawned += 1;
                debug!(task = %record.id(), parent = %current.id(), "task spawned");
                Ok(Value::Record(record))
            }
            EngineOp::WaitCoro(target) => {
                if !target.is_terminated() {
                    target.borrow_mut().waiting.push(current.clone());
                    current.borrow_mut().active = false;
                    trace!(task = %current.id(), target = %target.id(), "waiting");
                }
                Ok(Value::None)
            }
            EngineOp::ThisId => Ok(Value::from(current.id())),
            EngineOp::ThisInfo => Ok(Value::Record(current)),
            EngineOp::AllInfo => Ok(Value::Registry(self.registry.to_map())),
            EngineOp::Schedule => {
                if let Some(visit) = self.current.as_mut() {
                    visit.yielded = true;
                }
                Ok(Value::None)
            }
            other => Err(Failure::InvalidRequest(format!(
                "{:?} is not available in the rotator",
                other.name()
            ))),
        }
    }

    /// Resume the current record once
    fn step_current(&mut self) -> Option<Step> {
        let (record, yielded) = match self.current.as_ref() {
            Some(visit) => (visit.record.clone(), visit.yielded),
            None => return None,
        };
        if yielded || !record.is_active() {
            self.current = None;
            return None;
        }

        let (coro, input) = {
            let mut inner = record.borrow_mut();
            let input = inner.pending_input();
            (inner.coro.take(), input)
        };
        let Some(mut coro) = coro else {
            return self.terminate(
                &record,
                Err(Failure::Protocol("record has no task to resume".into())),
            );
        };

        self.progressed = true;
        let step = coro.resume(input);
        record.borrow_mut().coro = Some(coro);

        match step {
            Step::Yield(Yield::Call(request)) => self.dispatch(request),
            Step::Yield(Yield::Suspend(data)) => self.settle(Err(Failure::InvalidRequest(format!(
                "tasks cannot suspend to the driver directly (got {data:?})"
            )))),
            Step::Done(value) => self.terminate(&record, Ok(value)),
            Step::Failed(failure) => self.terminate(&record, Err(failure)),
        }
    }

    /// Start the next sweep, or finish
    fn next_sweep(&mut self) -> Option<Step> {
        if self.root.is_terminated() {
            self.finished = true;
            let outcome = get_result(&self.root);
            debug!(
                sweeps = self.stats.sweeps,
                spawned = self.stats.spawned,
                ok = outcome.is_ok(),
                "rotator finished"
            );
            return Some(Step::from(outcome));
        }
        // only resuming a task can wake another, so an idle sweep means
        // nothing will ever run again
        if self.stats.sweeps > 0 && !self.progressed {
            self.finished = true;
            debug!(live = self.registry.len(), "deadlock: no task was resumed in a full sweep");
            return Some(Step::Failed(Failure::Deadlock));
        }
        self.sweep = self.registry.snapshot();
        self.progressed = false;
        self.stats.sweeps += 1;
        trace!(sweep = self.stats.sweeps, live = self.sweep.len(), "sweep started");
        None
    }
}

impl Task for Rotator {
    fn resume(&mut self, input: Resume) -> Step {
        if self.finished {
            return Step::Failed(Failure::Protocol("rotator resumed after completion".into()));
        }

        // outer input only means something to an in-flight action
        let mut feed = self.action.is_some().then_some(input);

        loop {
            if let Some(mut action) = self.action.take() {
                let done = match action.resume(feed.take().unwrap_or_else(Resume::start)) {
                    Step::Yield(request) => {
                        self.action = Some(action);
                        return Step::Yield(request);
                    }
                    Step::Done(value) => self.settle(Ok(value)),
                    Step::Failed(failure) => self.settle(Err(failure)),
                };
                if let Some(step) = done {
                    return step;
                }
                continue;
            }

            if self.current.is_some() {
                if let Some(step) = self.step_current() {
                    return step;
                }
                continue;
            }

            if let Some(id) = self.sweep.pop() {
                if let Some(record) = self.registry.get(id) {
                    if !record.is_terminated() {
                        self.current = Some(Visit {
                            record: record.clone(),
                            yielded: false,
                        });
                    }
                }
                continue;
            }

            if let Some(step) = self.next_sweep() {
                return step;
            }
        }
    }
}

impl Drop for Rotator {
    fn drop(&mut self) {
        self.action = None;
        self.current = None;
        self.registry.clear();
    }
}

/// Run `task` as the root of a rotator until it terminates
///
/// Returns [`get_result`] of the root. Tasks still live at that point are
/// dropped without being resumed again.
pub fn run(task: impl Task + 'static, actions: ActionTable) -> RunResult<Value> {
    run_with(task, actions, EngineOptions::default())
}

/// [`run`] with explicit options
pub fn run_with(
    task: impl Task + 'static,
    actions: ActionTable,
    options: EngineOptions,
) -> RunResult<Value> {
    let mut rotator = Rotator::with_options(task, actions, options)?;
    Ok(block_on(&mut rotator, reject_outer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, SetupError};
    use crate::task::{self, AsyncTask};

    #[test]
    fn test_root_only() {
        let root = AsyncTask::new(|cx| async move {
            let id = cx.this_id().await?;
            Ok(Value::from(id))
        });
        assert_eq!(run(root, ActionTable::new()), Ok(Value::Int(0)));
    }

    #[test]
    fn test_each_reserved_name_collides() {
        for &name in RESERVED {
            let table = ActionTable::new().with(name, |_| Ok(Value::None));
            assert_eq!(
                run(task::ready(Value::None), table),
                Err(Error::Setup(SetupError::DuplicateAction(name.into())))
            );
        }
    }

    #[test]
    fn test_this_info_is_the_live_record() {
        let root = AsyncTask::new(|cx| async move {
            let me = cx.this_info().await?;
            let all = cx.all_info().await?;
            let id = cx.this_id().await?;
            let same = all.get(&id).is_some_and(|r| r.ptr_eq(&me));
            Ok(Value::List(vec![Value::Bool(same), Value::Bool(me.is_active())]))
        });
        assert_eq!(
            run(root, ActionTable::new()),
            Ok(Value::List(vec![Value::Bool(true), Value::Bool(true)]))
        );
    }

    #[test]
    fn test_wait_on_terminated_returns_immediately() {
        let root = AsyncTask::new(|cx| async move {
            let child = cx.new_coro(task::ready(Value::Int(5))).await?;
            cx.schedule().await?;
            // the child ran during the last sweep
            assert!(child.is_terminated());
            cx.wait_coro(&child).await?;
            get_result(&child)
        });
        assert_eq!(run(root, ActionTable::new()), Ok(Value::Int(5)));
    }

    #[test]
    fn test_task_limit() {
        let root = AsyncTask::new(|cx| async move {
            cx.new_coro(task::ready(Value::None)).await?;
            match cx.new_coro(task::ready(Value::None)).await {
                Err(Failure::TaskLimit(n)) => Ok(Value::Int(n as i64)),
                Ok(_) => Ok(Value::None),
                Err(other) => Err(other),
            }
        });
        let options = EngineOptions::default().with_max_tasks(2);
        assert_eq!(run_with(root, ActionTable::new(), options), Ok(Value::Int(2)));
    }

    #[test]
    fn test_self_wait_is_a_deadlock() {
        let root = AsyncTask::new(|cx| async move {
            let me = cx.this_info().await?;
            cx.wait_coro(&me).await?;
            Ok(Value::None)
        });
        assert_eq!(run(root, ActionTable::new()), Err(Error::Failed(Failure::Deadlock)));
    }

    #[test]
    fn test_stats() {
        let root = AsyncTask::new(|cx| async move {
            let child = cx.new_coro(task::ready(Value::None)).await?;
            cx.wait_coro(&child).await?;
            Ok(Value::None)
        });
        let mut rotator = Rotator::new(root, ActionTable::new()).unwrap();
        assert_eq!(block_on(&mut rotator, reject_outer), Ok(Value::None));
        let stats = rotator.stats();
        assert_eq!(stats.spawned, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.live, 0);
        assert!(rotator.is_finished());
    }
}
