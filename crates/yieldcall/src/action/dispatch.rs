//! Reserved-name binding and request dispatch

use super::{ActionTable, Call, Invocation};
use crate::engine::record::RecordRef;
use crate::error::{Failure, SetupError, SetupResult};
use crate::task::{BoxTask, Request};
use crate::value::Value;
use std::fmt;

/// An engine operation produced by a reserved action
///
/// Only the engines' own bindings can build one; the engine that receives
/// it applies it to its scheduling state.
pub struct Builtin(pub(crate) EngineOp);

pub(crate) enum EngineOp {
    StackAdd(BoxTask),
    NewCoro(BoxTask),
    WaitCoro(RecordRef),
    ThisId,
    ThisInfo,
    AllInfo,
    Schedule,
}

impl EngineOp {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            EngineOp::StackAdd(_) => "stack_add",
            EngineOp::NewCoro(_) => "new_coro",
            EngineOp::WaitCoro(_) => "wait_coro",
            EngineOp::ThisId => "this_id",
            EngineOp::ThisInfo => "this_info",
            EngineOp::AllInfo => "all_info",
            EngineOp::Schedule => "schedule",
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.0.name())
    }
}

/// Bind every `reserved` name of an engine into `table`
///
/// Nothing is inserted unless all names pass: a reserved name already in
/// `table` is a [`SetupError::DuplicateAction`], one missing from
/// `bindings` a [`SetupError::MissingBinding`].
pub fn bind(table: &mut ActionTable, reserved: &[&str], bindings: &ActionTable) -> SetupResult<()> {
    let mut resolved = Vec::with_capacity(reserved.len());
    for &name in reserved {
        if table.contains(name) {
            return Err(SetupError::DuplicateAction(name.to_string()));
        }
        let handler = bindings
            .get(name)
            .ok_or_else(|| SetupError::MissingBinding(name.to_string()))?;
        resolved.push((name, handler.clone()));
    }
    for (name, handler) in resolved {
        table.insert(name, handler);
    }
    Ok(())
}

/// Resolve `request` against `table` and invoke the handler
pub fn dispatch(table: &ActionTable, request: Request) -> Result<Invocation, Failure> {
    let Request { name, args, kwargs } = request;
    table.invoke(&name, Call { args, kwargs })
}

/// Take the single task argument of a reserved action
pub(crate) fn task_arg(action: &str, call: Call) -> Result<BoxTask, Failure> {
    call.expect_args(action, 1)?;
    match call.args.into_iter().next() {
        Some(Value::Task(handle)) => handle.take().ok_or_else(|| Failure::InvalidArguments {
            action: action.to_string(),
            reason: "task was already handed to an engine".into(),
        }),
        Some(other) => Err(Failure::type_mismatch("task", &other)),
        None => Err(Failure::type_mismatch("task", &Value::None)),
    }
}

/// Take the single record argument of a reserved action
pub(crate) fn record_arg(action: &str, call: Call) -> Result<RecordRef, Failure> {
    call.expect_args(action, 1)?;
    match call.args.into_iter().next() {
        Some(Value::Record(record)) => Ok(record),
        Some(other) => Err(Failure::type_mismatch("record", &other)),
        None => Err(Failure::type_mismatch("record", &Value::None)),
    }
}

/// Handler for a reserved action whose call builds an engine operation
pub(crate) fn builtin(
    f: impl Fn(Call) -> Result<EngineOp, Failure> + 'static,
) -> super::Handler {
    super::Handler::new(move |call| match f(call) {
        Ok(op) => Invocation::Builtin(Builtin(op)),
        Err(failure) => Invocation::Ready(Err(failure)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Outcome;

    fn echo(call: Call) -> Outcome {
        Ok(call.args.into_iter().next().unwrap_or_default())
    }

    fn bindings() -> ActionTable {
        ActionTable::new().with("a", echo).with("b", echo)
    }

    #[test]
    fn test_bind_inserts_reserved() {
        let mut table = ActionTable::new().with("user", echo);
        bind(&mut table, &["a", "b"], &bindings()).unwrap();
        assert!(table.contains("a"));
        assert!(table.contains("b"));
        assert!(table.contains("user"));
    }

    #[test]
    fn test_bind_rejects_duplicates() {
        let mut table = ActionTable::new().with("b", echo);
        assert_eq!(
            bind(&mut table, &["a", "b"], &bindings()),
            Err(SetupError::DuplicateAction("b".into()))
        );
        // no partial binding
        assert!(!table.contains("a"));
    }

    #[test]
    fn test_bind_requires_bindings() {
        let mut table = ActionTable::new();
        assert_eq!(
            bind(&mut table, &["a", "c"], &bindings()),
            Err(SetupError::MissingBinding("c".into()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_dispatch_passes_kwargs() {
        let mut table = ActionTable::new();
        table.add("kw", |call| Ok(call.kwarg("x").cloned().unwrap_or_default()));

        let req = Request::new("kw", vec![]).with_kwarg("x", 5);
        assert!(matches!(
            dispatch(&table, req),
            Ok(Invocation::Ready(Ok(Value::Int(5))))
        ));
        assert!(matches!(
            dispatch(&table, Request::new("missing", vec![])),
            Err(Failure::UnknownAction(_))
        ));
    }

    #[test]
    fn test_task_arg_is_take_once() {
        let value = Value::task(crate::task::ready(Value::None));
        assert!(task_arg("stack_add", Call::new(vec![value.clone()])).is_ok());
        assert!(matches!(
            task_arg("stack_add", Call::new(vec![value])),
            Err(Failure::InvalidArguments { .. })
        ));
        assert!(matches!(
            task_arg("stack_add", Call::new(vec![Value::Int(1)])),
            Err(Failure::TypeMismatch { .. })
        ));
    }
}
