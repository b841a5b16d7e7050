//! Trampoline runner
//!
//! Runs one logical task with an explicit frame list instead of the host
//! call stack. A frame that wants to call another suspendable unit requests
//! `stack_add(task)`: the engine pushes the task, resumes it until it
//! terminates, pops it and resumes the caller with its result.
//!
//! ```text
//!   frames: [root, f1, f2]          only the top (f2) is resumed
//!
//!   f2 yields request   -> dispatch, answer becomes f2's next input
//!   f2 yields stack_add -> push f3, start it
//!   f2 returns v        -> pop f2, f1 resumes with v
//!   f2 fails with e     -> pop f2, e is thrown into f1
//!   root terminates     -> run ends with its value or failure
//! ```
//!
//! Recursion depth is bounded by the frame list (and
//! [`EngineOptions::max_depth`]), not by the host's stack.

use super::{EngineOptions, FatalPolicy};
use crate::action::dispatch::{self, builtin, task_arg, EngineOp};
use crate::action::{ActionTable, Invocation};
use crate::error::{Failure, Outcome, RunResult, SetupResult};
use crate::task::{block_on, call, reject_outer, BoxTask, Request, Resume, Step, Task, Yield};
use crate::value::Value;
use std::mem;
use tracing::{debug, trace};

/// Name of the stack engine's reserved action
pub const STACK_ADD: &str = "stack_add";

/// Reserved action names of the stack engine
pub const RESERVED: &[&str] = &[STACK_ADD];

/// Request that pushes `task` on the frame list and waits for its result
pub fn stack_add(task: impl Task + 'static) -> Yield {
    call(STACK_ADD, vec![Value::task(task)])
}

fn bindings() -> ActionTable {
    let mut table = ActionTable::new();
    table.insert(
        STACK_ADD,
        builtin(|call| task_arg(STACK_ADD, call).map(EngineOp::StackAdd)),
    );
    table
}

/// Stack engine statistics
#[derive(Debug, Clone, Default)]
pub struct StackStats {
    /// Current number of frames
    pub frame_count: usize,

    /// Highest frame count reached
    pub peak_depth: usize,

    /// Total requests dispatched
    pub dispatched: u64,
}

/// The trampoline engine
///
/// Usually driven through [`run`]; as a [`Task`] it can also be driven by an
/// outer loop or nested inside another engine.
pub struct StackEngine {
    frames: Vec<BoxTask>,
    actions: ActionTable,
    options: EngineOptions,

    /// Input for the top frame's next resumption
    pending: Resume,

    /// Suspending action in flight for the top frame
    action: Option<BoxTask>,

    finished: bool,
    peak_depth: usize,
    dispatched: u64,
}

impl StackEngine {
    /// Create an engine for `task` with default options
    pub fn new(task: impl Task + 'static, actions: ActionTable) -> SetupResult<Self> {
        Self::with_options(task, actions, EngineOptions::default())
    }

    /// Create an engine for `task`
    ///
    /// Fails if `actions` already uses a reserved name.
    pub fn with_options(
        task: impl Task + 'static,
        mut actions: ActionTable,
        options: EngineOptions,
    ) -> SetupResult<Self> {
        dispatch::bind(&mut actions, RESERVED, &bindings())?;
        debug!(actions = actions.len(), ?options, "stack engine ready");
        Ok(Self {
            frames: vec![Box::new(task)],
            actions,
            options,
            pending: Resume::start(),
            action: None,
            finished: false,
            peak_depth: 1,
            dispatched: 0,
        })
    }

    /// Current number of frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the root frame has terminated
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Get engine statistics
    pub fn stats(&self) -> StackStats {
        StackStats {
            frame_count: self.frames.len(),
            peak_depth: self.peak_depth,
            dispatched: self.dispatched,
        }
    }

    fn fatal(&self) -> &FatalPolicy {
        &self.options.fatal
    }

    /// Terminate the top frame with `outcome`
    ///
    /// Returns the engine's own final step once the root terminates.
    fn unwind(&mut self, outcome: Outcome) -> Option<Step> {
        if self.frames.len() > 1 {
            self.frames.pop();
            trace!(depth = self.frames.len(), ok = outcome.is_ok(), "frame popped");
            self.pending = Resume::from(outcome);
            return None;
        }
        self.frames.clear();
        self.finished = true;
        match &outcome {
            Ok(_) => debug!(peak_depth = self.peak_depth, "stack run finished"),
            Err(failure) => debug!(%failure, "stack run failed"),
        }
        Some(Step::from(outcome))
    }

    /// Feed the outcome of an action back to the top frame
    fn settle(&mut self, outcome: Outcome) -> Option<Step> {
        match outcome {
            Err(failure) if self.fatal().is_fatal(&failure) => {
                debug!(%failure, "fatal action failure terminates frame");
                self.unwind(Err(failure))
            }
            outcome => {
                self.pending = Resume::from(outcome);
                None
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Option<Step> {
        self.dispatched += 1;
        trace!(action = %request.name, depth = self.frames.len(), "dispatch");
        match dispatch::dispatch(&self.actions, request) {
            Ok(Invocation::Ready(outcome)) => self.settle(outcome),
            Ok(Invocation::Task(action)) => {
                self.action = Some(action);
                None
            }
            Ok(Invocation::Builtin(op)) => {
                let outcome = self.apply(op.0);
                self.settle(outcome)
            }
            Err(failure) => self.settle(Err(failure)),
        }
    }

    fn apply(&mut self, op: EngineOp) -> Outcome {
        match op {
            EngineOp::StackAdd(task) => {
                if let Some(max) = self.options.max_depth {
                    if self.frames.len() >= max {
                        return Err(Failure::StackOverflow(max));
                    }
                }
                self.frames.push(task);
                self.peak_depth = self.peak_depth.max(self.frames.len());
                trace!(depth = self.frames.len(), "frame pushed");
                // the pushed frame is started with None
                Ok(Value::None)
            }
            other => Err(Failure::InvalidRequest(format!(
                "{:?} is not available in the stack engine",
                other.name()
            ))),
        }
    }
}

impl Task for StackEngine {
    fn resume(&mut self, input: Resume) -> Step {
        if self.finished {
            return Step::Failed(Failure::Protocol("stack engine resumed after completion".into()));
        }

        // outer input only means something to an in-flight action
        let mut feed = self.action.is_some().then_some(input);

        loop {
            if let Some(mut action) = self.action.take() {
                let step = action.resume(feed.take().unwrap_or_else(Resume::start));
                let done = match step {
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

            let input = mem::replace(&mut self.pending, Resume::start());
            let Some(top) = self.frames.last_mut() else {
                self.finished = true;
                return Step::Failed(Failure::Protocol("empty frame list".into()));
            };
            let done = match top.resume(input) {
                Step::Yield(Yield::Call(request)) => self.dispatch(request),
                Step::Yield(Yield::Suspend(data)) => {
                    self.pending = Resume::Throw(Failure::InvalidRequest(format!(
                        "tasks cannot suspend to the driver directly (got {data:?})"
                    )));
                    None
                }
                Step::Done(value) => self.unwind(Ok(value)),
                Step::Failed(failure) => self.unwind(Err(failure)),
            };
            if let Some(step) = done {
                return step;
            }
        }
    }
}

/// Run `task` on a stack engine until its root frame terminates
///
/// Suspensions tunnelled out by actions have nowhere to go and are answered
/// with [`Failure::Unhandled`]; use [`block_on`] with a [`StackEngine`] to
/// service them.
pub fn run(task: impl Task + 'static, actions: ActionTable) -> RunResult<Value> {
    run_with(task, actions, EngineOptions::default())
}

/// [`run`] with explicit options
pub fn run_with(
    task: impl Task + 'static,
    actions: ActionTable,
    options: EngineOptions,
) -> RunResult<Value> {
    let mut engine = StackEngine::with_options(task, actions, options)?;
    Ok(block_on(&mut engine, reject_outer)?)
}
