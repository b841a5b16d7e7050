//! Integration tests for action tables and engine setup

mod common;

use common::{echo, init_test_logging};
use rustc_hash::FxHashMap;
use yieldcall::action::{bind, dispatch, Invocation};
use yieldcall::rotator::{self, Rotator};
use yieldcall::stack::{self, StackEngine};
use yieldcall::task::{self, Request};
use yieldcall::{ActionTable, Error, Failure, Handler, SetupError, Value};

#[test]
fn test_every_reserved_name_is_rejected_in_both_engines() {
    init_test_logging();

    for &name in stack::RESERVED {
        let table = ActionTable::new().with(name, echo);
        assert_eq!(
            stack::run(task::ready(Value::None), table).unwrap_err(),
            Error::Setup(SetupError::DuplicateAction(name.to_string()))
        );
    }
    for &name in rotator::RESERVED {
        let table = ActionTable::new().with(name, echo);
        assert!(matches!(
            Rotator::new(task::ready(Value::None), table),
            Err(SetupError::DuplicateAction(n)) if n == name
        ));
    }
}

#[test]
fn test_missing_binding_for_custom_reserved_set() {
    init_test_logging();

    let bindings = ActionTable::new().with("spawn", echo);
    let mut table = ActionTable::new();
    assert_eq!(
        bind(&mut table, &["spawn", "join"], &bindings),
        Err(SetupError::MissingBinding("join".into()))
    );
    assert!(table.is_empty());

    assert_eq!(bind(&mut table, &["spawn"], &bindings), Ok(()));
    assert!(table.contains("spawn"));
}

#[test]
fn test_invalid_table_from_dynamic_value() {
    init_test_logging();

    assert!(matches!(
        ActionTable::try_from(Value::from("not a table")),
        Err(SetupError::InvalidTable(_))
    ));

    let mut entries = FxHashMap::default();
    entries.insert("echo".to_string(), Value::Action(Handler::sync(echo)));
    let table = ActionTable::try_from(Value::Map(entries)).unwrap();

    let root = yieldcall::AsyncTask::new(|cx| async move { cx.call("echo", vec![Value::Int(42)]).await });
    assert_eq!(stack::run(root, table), Ok(Value::Int(42)));
}

#[test]
fn test_engines_leave_caller_table_untouched() {
    init_test_logging();

    let table = ActionTable::new().with("echo", echo);
    let engine = StackEngine::new(task::ready(Value::None), table.clone()).unwrap();
    assert_eq!(engine.depth(), 1);
    assert!(!table.contains(stack::STACK_ADD));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_dispatch_propagates_handler_failure_unchanged() {
    init_test_logging();

    let failure = Failure::raised("OSError", "disk full");
    let expected = failure.clone();
    let table = ActionTable::new().with("write", move |_| Err(failure.clone()));

    match dispatch(&table, Request::new("write", vec![])) {
        Ok(Invocation::Ready(Err(got))) => assert_eq!(got, expected),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        dispatch(&table, Request::new("read", vec![])),
        Err(Failure::UnknownAction(name)) if name == "read"
    ));
}

#[test]
fn test_echo_argument_checking() {
    init_test_logging();

    let root = yieldcall::AsyncTask::new(|cx| async move {
        match cx.call("echo", vec![]).await {
            Err(Failure::InvalidArguments { action, .. }) => Ok(Value::Str(action)),
            other => other,
        }
    });
    let table = ActionTable::new().with("echo", echo);
    assert_eq!(rotator::run(root, table), Ok(Value::from("echo")));
}
