//! Synchronous walker for plans without suspending steps

use serde_json::{Map, Value};

use super::{
    Completed, Invocation, Propagate, absorb, complete_leaf, fail, fetch_sync,
    non_null_violation, not_a_list, select_variant,
};
use crate::compiler::plan::{Completion, SelectionPlan, Step};
use crate::core::error::FieldError;
use crate::core::path::Path;

pub(crate) fn execute_selection(
    plan: &SelectionPlan,
    parent: &Value,
    path: Option<&Path<'_>>,
    invocation: &Invocation,
    errors: &mut Vec<FieldError>,
) -> Completed {
    let mut map = Map::with_capacity(plan.steps.len());
    let mut propagate = false;
    for step in &plan.steps {
        if !step.condition.evaluate(&invocation.variables) {
            continue;
        }
        let step_path = Path::key(path, &step.response_key);
        match execute_step(step, parent, &step_path, invocation, errors) {
            Ok(value) => {
                map.insert(step.response_key.to_string(), value);
            }
            Err(Propagate) => propagate = true,
        }
    }
    if propagate {
        Err(Propagate)
    } else {
        Ok(Value::Object(map))
    }
}

pub(crate) fn execute_step(
    step: &Step,
    parent: &Value,
    path: &Path<'_>,
    invocation: &Invocation,
    errors: &mut Vec<FieldError>,
) -> Completed {
    match fetch_sync(step, parent, invocation) {
        Ok(value) => complete(step, &step.completion, value, path, invocation, errors),
        Err(error) => fail(step, error, path, errors),
    }
}

/// Complete a value, absorbing propagation at nullable positions
pub(crate) fn complete(
    step: &Step,
    completion: &Completion,
    value: Value,
    path: &Path<'_>,
    invocation: &Invocation,
    errors: &mut Vec<FieldError>,
) -> Completed {
    match completion {
        Completion::NonNull(inner) => {
            let value = complete_value(step, inner, value, path, invocation, errors)?;
            if value.is_null() {
                Err(non_null_violation(step, path, errors))
            } else {
                Ok(value)
            }
        }
        nullable => complete_value(step, nullable, value, path, invocation, errors)
            .or_else(|_| absorb(nullable)),
    }
}

fn complete_value(
    step: &Step,
    completion: &Completion,
    value: Value,
    path: &Path<'_>,
    invocation: &Invocation,
    errors: &mut Vec<FieldError>,
) -> Completed {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match completion {
        Completion::NonNull(_) => complete(step, completion, value, path, invocation, errors),
        Completion::Leaf(serializer) => complete_leaf(serializer.as_ref(), value, path, errors),
        Completion::List(item) => {
            let Value::Array(items) = value else {
                return Err(not_a_list(step, path, errors));
            };
            let mut completed = Vec::with_capacity(items.len());
            let mut propagate = false;
            for (index, item_value) in items.into_iter().enumerate() {
                let item_path = Path::index(path, index);
                match complete(step, item, item_value, &item_path, invocation, errors) {
                    Ok(value) => completed.push(value),
                    Err(Propagate) => propagate = true,
                }
            }
            if propagate {
                Err(Propagate)
            } else {
                Ok(Value::Array(completed))
            }
        }
        Completion::Object(plan) => execute_selection(plan, &value, Some(path), invocation, errors),
        Completion::Abstract(abstract_dispatch) => {
            let plan = select_variant(step, abstract_dispatch, &value, path, errors)?;
            execute_selection(plan, &value, Some(path), invocation, errors)
        }
    }
}
