//! Outermost driver for a task

use super::{Resume, Step, Task, Yield};
use crate::error::{Failure, Outcome};

/// Drive `task` to completion
///
/// Every yield that reaches this level is handed to `outer`, whose answer
/// resumes the task. Engines are tasks too, so this is also how an embedder
/// runs an engine above its own event loop.
pub fn block_on<T, F>(task: &mut T, mut outer: F) -> Outcome
where
    T: Task + ?Sized,
    F: FnMut(Yield) -> Resume,
{
    let mut input = Resume::start();
    loop {
        match task.resume(input) {
            Step::Yield(request) => input = outer(request),
            Step::Done(value) => return Ok(value),
            Step::Failed(failure) => return Err(failure),
        }
    }
}

/// Outer handler for runs with nothing above them
///
/// Throws [`Failure::Unhandled`] back at the suspension, so the task (or
/// action) that tunnelled it can recover.
pub fn reject_outer(request: Yield) -> Resume {
    let what = match request {
        Yield::Call(req) => format!("request for {:?} reached the top-level driver", req.name),
        Yield::Suspend(data) => format!("suspension with {data:?} reached the top-level driver"),
    };
    tracing::debug!(reason = %what, "rejecting outward suspension");
    Resume::Throw(Failure::Unhandled(what))
}
