//! `async` authoring for tasks
//!
//! [`AsyncTask`] wraps a future behind the [`Task`] interface. The future
//! talks to its engine through a [`Cx`]: awaiting a request parks it in a
//! shared slot and returns `Pending`; the task hands the parked request to
//! the engine and, on the next resumption, stores the answer in the slot
//! before polling again.
//!
//! Only futures built from `Cx` requests are supported. A future that
//! returns `Pending` without parking a request has nothing to wait on in a
//! single-threaded engine and fails with [`Failure::Protocol`].

use super::{call, Request, Resume, Step, Task, Yield};
use crate::engine::record::{RecordRef, TaskId};
use crate::engine::{rotator, stack};
use crate::error::{Failure, Outcome};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct Slot {
    outgoing: Option<Yield>,
    incoming: Option<Resume>,
}

/// Request context handed to an async task body
#[derive(Clone, Default)]
pub struct Cx {
    slot: Rc<RefCell<Slot>>,
}

impl Cx {
    /// Suspend with `request` and wait for the answer
    pub fn request(&self, request: Yield) -> Pending {
        Pending {
            cx: self.clone(),
            request: Some(request),
        }
    }

    /// Call action `name` with positional arguments
    pub fn call(&self, name: &str, args: Vec<Value>) -> Pending {
        self.request(call(name, args))
    }

    /// Call an action with a fully built request (keyword arguments)
    pub fn call_request(&self, request: Request) -> Pending {
        self.request(Yield::Call(request))
    }

    /// Yield `data` directly to whatever drives the engine
    pub fn suspend(&self, data: Value) -> Pending {
        self.request(Yield::Suspend(data))
    }

    /// Run `task` on the stack engine's frame list and wait for its result
    pub fn stack_add(&self, task: impl Task + 'static) -> Pending {
        self.request(stack::stack_add(task))
    }

    /// Spawn `task` on the rotator
    pub async fn new_coro(&self, task: impl Task + 'static) -> Result<RecordRef, Failure> {
        match self.request(rotator::new_coro(task)).await? {
            Value::Record(record) => Ok(record),
            other => Err(Failure::type_mismatch("record", &other)),
        }
    }

    /// Wait until `record` terminates
    pub async fn wait_coro(&self, record: &RecordRef) -> Result<(), Failure> {
        self.request(rotator::wait_coro(record)).await.map(drop)
    }

    /// Id of the current rotator task
    pub async fn this_id(&self) -> Result<TaskId, Failure> {
        let value = self.request(rotator::this_id()).await?;
        match value.as_int() {
            Some(id) if id >= 0 => Ok(TaskId::from_u64(id as u64)),
            _ => Err(Failure::type_mismatch("task id", &value)),
        }
    }

    /// Record of the current rotator task
    pub async fn this_info(&self) -> Result<RecordRef, Failure> {
        match self.request(rotator::this_info()).await? {
            Value::Record(record) => Ok(record),
            other => Err(Failure::type_mismatch("record", &other)),
        }
    }

    /// All live rotator records
    pub async fn all_info(&self) -> Result<FxHashMap<TaskId, RecordRef>, Failure> {
        match self.request(rotator::all_info()).await? {
            Value::Registry(map) => Ok(map),
            other => Err(Failure::type_mismatch("registry", &other)),
        }
    }

    /// Give up the rest of this sweep
    pub async fn schedule(&self) -> Result<(), Failure> {
        self.request(rotator::schedule()).await.map(drop)
    }
}

/// Future of one request; resolves to the engine's answer
pub struct Pending {
    cx: Cx,
    request: Option<Yield>,
}

impl Future for Pending {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        let mut slot = this.cx.slot.borrow_mut();
        if let Some(request) = this.request.take() {
            if slot.outgoing.is_some() {
                return Poll::Ready(Err(Failure::Protocol(
                    "a task may only wait on one request at a time".into(),
                )));
            }
            slot.outgoing = Some(request);
            return Poll::Pending;
        }
        match slot.incoming.take() {
            Some(answer) => Poll::Ready(answer.into_outcome()),
            None => Poll::Pending,
        }
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = Outcome>>>;

/// A task whose body is an `async` block
///
/// ```ignore
/// let task = AsyncTask::new(|cx| async move {
///     let n = cx.call("echo", vec![Value::Int(42)]).await?;
///     Ok(n)
/// });
/// ```
pub struct AsyncTask {
    cx: Cx,
    future: Option<BoxFuture>,
    started: bool,
}

impl AsyncTask {
    /// Build a task from a body receiving its request context
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Outcome> + 'static,
    {
        let cx = Cx::default();
        let future: BoxFuture = Box::pin(body(cx.clone()));
        Self {
            cx,
            future: Some(future),
            started: false,
        }
    }

    /// Whether the body has run to completion
    pub fn is_finished(&self) -> bool {
        self.future.is_none()
    }
}

impl Task for AsyncTask {
    fn resume(&mut self, input: Resume) -> Step {
        if self.future.is_none() {
            return Step::Failed(Failure::Protocol("resumed after completion".into()));
        }

        if !self.started {
            self.started = true;
            // nothing to catch a throw before the body starts
            if let Resume::Throw(failure) = input {
                self.future = None;
                return Step::Failed(failure);
            }
        } else {
            self.cx.slot.borrow_mut().incoming = Some(input);
        }

        let mut context = Context::from_waker(Waker::noop());
        let polled = match self.future.as_mut() {
            Some(future) => future.as_mut().poll(&mut context),
            None => return Step::Failed(Failure::Protocol("resumed after completion".into())),
        };
        match polled {
            Poll::Ready(outcome) => {
                self.future = None;
                Step::from(outcome)
            }
            Poll::Pending => match self.cx.slot.borrow_mut().outgoing.take() {
                Some(request) => Step::Yield(request),
                None => {
                    self.future = None;
                    Step::Failed(Failure::Protocol(
                        "task is pending without a request".into(),
                    ))
                }
            },
        }
    }
}
