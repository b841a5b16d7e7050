//! Shared helpers for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use yieldcall::{ActionTable, AsyncTask, Call, Outcome, Value};

static INIT_LOGGING: Once = Once::new();

/// Initialize trace-level test logging; only the first call has an effect
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// `echo(x) -> x`
pub fn echo(call: Call) -> Outcome {
    call.expect_args("echo", 1)?;
    Ok(call.args.into_iter().next().unwrap_or_default())
}

/// Table with just `echo`
pub fn echo_actions() -> ActionTable {
    ActionTable::new().with("echo", echo)
}

/// Ordered log shared between tasks
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// A task that returns `value` after one `schedule()`
pub fn after_one_cycle(value: Value) -> AsyncTask {
    AsyncTask::new(move |cx| async move {
        cx.schedule().await?;
        Ok(value)
    })
}
