//! Integration tests for engines running inside other engines
//!
//! An engine is a task, so it can be pushed as a frame, spawned as a rotator
//! task, or returned by a suspending action. Requests its in-flight actions
//! yield travel outward to whatever drives it.

mod common;

use common::init_test_logging;
use yieldcall::action::Invocation;
use yieldcall::rotator::{self, Rotator};
use yieldcall::stack::{self, StackEngine};
use yieldcall::task::block_on;
use yieldcall::{ActionTable, AsyncTask, Failure, Handler, Resume, Value, Yield};

/// Suspending action forwarding `double(x)` to whoever drives the engine
fn relay_actions() -> ActionTable {
    let mut actions = ActionTable::new();
    actions.add_suspending("relay", |call| {
        let x = call.arg(0).cloned().unwrap_or_default();
        AsyncTask::new(move |cx| async move { cx.call("double", vec![x]).await })
    });
    actions
}

fn double_actions() -> ActionTable {
    ActionTable::new().with("double", |call| {
        let n = call.arg(0).and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(n * 2))
    })
}

#[test]
fn test_rotator_as_a_stack_frame() {
    init_test_logging();

    let inner_root = AsyncTask::new(|cx| async move {
        let child = cx
            .new_coro(AsyncTask::new(|cx| async move {
                cx.call("relay", vec![Value::Int(21)]).await
            }))
            .await?;
        cx.wait_coro(&child).await?;
        rotator::get_result(&child)
    });
    let inner = Rotator::new(inner_root, relay_actions()).unwrap();

    let outer_root = AsyncTask::new(move |cx| async move { cx.stack_add(inner).await });
    assert_eq!(stack::run(outer_root, double_actions()), Ok(Value::Int(42)));
}

#[test]
fn test_stack_engine_as_a_suspending_action() {
    init_test_logging();

    // `subrun(task)` runs `task` on a fresh stack engine in place of the action
    let mut actions = ActionTable::new();
    actions.insert(
        "subrun",
        Handler::new(|call| {
            let Some(Value::Task(handle)) = call.args.into_iter().next() else {
                return Invocation::failure(Failure::InvalidArguments {
                    action: "subrun".into(),
                    reason: "expected a task".into(),
                });
            };
            let Some(task) = handle.take() else {
                return Invocation::failure(Failure::Protocol("task already taken".into()));
            };
            match StackEngine::new(task, relay_actions()) {
                Ok(engine) => Invocation::task(engine),
                Err(err) => Invocation::failure(Failure::raised("SetupError", err.to_string())),
            }
        }),
    );

    let root = AsyncTask::new(|cx| async move {
        let sub = AsyncTask::new(|cx| async move { cx.call("relay", vec![Value::Int(5)]).await });
        let a = cx.call("subrun", vec![Value::task(sub)]).await?;
        let b = cx.call("subrun", vec![Value::task(yieldcall::task::ready(Value::Int(1)))]).await?;
        Ok(Value::List(vec![a, b]))
    });

    let mut asked = Vec::new();
    let mut engine = Rotator::new(root, actions).unwrap();
    let out = block_on(&mut engine, |request| match request {
        Yield::Call(req) if req.name == "double" => {
            let n = req.args.first().and_then(Value::as_int).unwrap_or(0);
            asked.push(n);
            Resume::Value(Value::Int(n * 2))
        }
        _ => Resume::Throw(Failure::InvalidRequest("unexpected".into())),
    });

    assert_eq!(asked, vec![5]);
    assert_eq!(out, Ok(Value::List(vec![Value::Int(10), Value::Int(1)])));
}

#[test]
fn test_outer_failure_reaches_inner_task() {
    init_test_logging();

    let inner_root = AsyncTask::new(|cx| async move {
        match cx.call("relay", vec![Value::Int(1)]).await {
            Err(Failure::UnknownAction(name)) => Ok(Value::Str(name)),
            other => other,
        }
    });
    let inner = StackEngine::new(inner_root, relay_actions()).unwrap();

    // the outer engine has no `double`, so the relayed request fails there
    let outer_root = AsyncTask::new(move |cx| async move { cx.stack_add(inner).await });
    assert_eq!(
        stack::run(outer_root, ActionTable::new()),
        Ok(Value::from("double"))
    );
}
