//! Yieldcall: cooperative task engines with interceptable actions
//!
//! Tasks are resumable state machines that suspend by requesting a named
//! action. The engine resolves the name in an action table supplied by the
//! embedder, invokes the handler and resumes the task with the answer, so
//! the embedder decides what every blocking operation means.
//!
//! Two engines are provided:
//! - [`stack`]: a trampoline that runs one logical task with an explicit
//!   frame list (`stack_add`), keeping deep delegation off the host stack
//! - [`rotator`]: a round-robin scheduler for many tasks that spawn, wait
//!   on and inspect each other
//!
//! # Example
//!
//! ```ignore
//! use yieldcall::{rotator, ActionTable, AsyncTask, Value};
//!
//! let actions = ActionTable::new().with("echo", |call| Ok(call.args[0].clone()));
//! let root = AsyncTask::new(|cx| async move {
//!     let child = cx.new_coro(AsyncTask::new(|cx| async move {
//!         cx.call("echo", vec![Value::Int(42)]).await
//!     })).await?;
//!     cx.wait_coro(&child).await?;
//!     rotator::get_result(&child)
//! });
//! assert_eq!(rotator::run(root, actions), Ok(Value::Int(42)));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod action;
pub mod engine;
pub mod error;
pub mod task;
pub mod value;

pub use action::{ActionTable, Call, Handler, Invocation};
pub use engine::record::{RecordRef, Registry, TaskId};
pub use engine::rotator::{self, Rotator, RotatorStats};
pub use engine::stack::{self, StackEngine, StackStats};
pub use engine::{EngineOptions, FatalPolicy};
pub use error::{Error, Failure, Outcome, RunResult, SetupError, SetupResult};
pub use task::{block_on, AsyncTask, BoxTask, Cx, Request, Resume, Step, Task, Yield};
pub use value::{Kwargs, TaskHandle, Value};
