//! Async walker
//!
//! At each level, sync steps run inline in declaration order while steps
//! that suspend are started together and joined. Each step writes into its
//! own result slot and error list, so the response shape and the error order
//! do not depend on completion order. Subtrees that never suspend are handed
//! to the sync walker.
//!
//! Dropping the returned future drops every joined child future; nothing
//! from an abandoned fan-out reaches the result.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value};

use super::{
    Completed, Invocation, Propagate, absorb, complete_leaf, fail, fetch_sync,
    non_null_violation, not_a_list, select_variant, walker,
};
use crate::compiler::binder::Fetch;
use crate::compiler::plan::{Completion, SelectionPlan, Step};
use crate::core::error::FieldError;
use crate::core::path::Path;

/// Execute one selection set
///
/// `serial` forces declaration-order awaiting at this level only (mutation
/// roots); nested levels follow `invocation.parallel`.
pub(crate) fn execute_selection<'a>(
    plan: &'a SelectionPlan,
    parent: &'a Value,
    path: Option<&'a Path<'a>>,
    invocation: &'a Invocation,
    serial: bool,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Completed> {
    async move {
        if !plan.suspends {
            return walker::execute_selection(plan, parent, path, invocation, errors);
        }

        let active: Vec<&'a Step> = plan
            .steps
            .iter()
            .filter(|step| step.condition.evaluate(&invocation.variables))
            .collect();
        let paths: Vec<Path<'a>> = active
            .iter()
            .map(|&step| Path::key(path, &step.response_key))
            .collect();
        let mut slots: Vec<Option<Completed>> = Vec::with_capacity(active.len());

        if serial || !invocation.parallel {
            for (&step, step_path) in active.iter().zip(&paths) {
                let completed = if step.suspends {
                    execute_step(step, parent, step_path, invocation, errors).await
                } else {
                    walker::execute_step(step, parent, step_path, invocation, errors)
                };
                slots.push(Some(completed));
            }
        } else {
            let mut slot_errors: Vec<Vec<FieldError>> =
                active.iter().map(|_| Vec::new()).collect();
            let mut pending = Vec::new();
            for ((&step, step_path), step_errors) in
                active.iter().zip(&paths).zip(slot_errors.iter_mut())
            {
                if step.suspends {
                    pending.push(execute_step(step, parent, step_path, invocation, step_errors));
                    slots.push(None);
                } else {
                    slots.push(Some(walker::execute_step(
                        step,
                        parent,
                        step_path,
                        invocation,
                        step_errors,
                    )));
                }
            }

            let mut joined = join_all(pending).await.into_iter();
            for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                *slot = joined.next();
            }
            for step_errors in slot_errors {
                errors.extend(step_errors);
            }
        }

        let mut map = Map::with_capacity(active.len());
        let mut propagate = false;
        for (step, slot) in active.iter().zip(slots) {
            match slot.unwrap_or(Err(Propagate)) {
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
    .boxed()
}

fn execute_step<'a>(
    step: &'a Step,
    parent: &'a Value,
    path: &'a Path<'a>,
    invocation: &'a Invocation,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Completed> {
    async move {
        let raw = match &step.binding.fetch {
            Fetch::Await(call) => call(parent, invocation).await,
            _ => fetch_sync(step, parent, invocation),
        };
        match raw {
            Ok(value) => complete(step, &step.completion, value, path, invocation, errors).await,
            Err(error) => fail(step, error, path, errors),
        }
    }
    .boxed()
}

fn complete<'a>(
    step: &'a Step,
    completion: &'a Completion,
    value: Value,
    path: &'a Path<'a>,
    invocation: &'a Invocation,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Completed> {
    async move {
        if !completion.suspends() {
            return walker::complete(step, completion, value, path, invocation, errors);
        }
        match completion {
            Completion::NonNull(inner) => {
                let value = complete_value(step, inner, value, path, invocation, errors).await?;
                if value.is_null() {
                    Err(non_null_violation(step, path, errors))
                } else {
                    Ok(value)
                }
            }
            nullable => match complete_value(step, nullable, value, path, invocation, errors).await
            {
                Ok(value) => Ok(value),
                Err(Propagate) => absorb(nullable),
            },
        }
    }
    .boxed()
}

fn complete_value<'a>(
    step: &'a Step,
    completion: &'a Completion,
    value: Value,
    path: &'a Path<'a>,
    invocation: &'a Invocation,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Completed> {
    async move {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match completion {
            Completion::NonNull(_) => {
                complete(step, completion, value, path, invocation, errors).await
            }
            Completion::Leaf(serializer) => complete_leaf(serializer.as_ref(), value, path, errors),
            Completion::List(item) => {
                complete_list(step, item, value, path, invocation, errors).await
            }
            Completion::Object(plan) => {
                execute_selection(plan, &value, Some(path), invocation, false, errors).await
            }
            Completion::Abstract(dispatch) => {
                let plan = select_variant(step, dispatch, &value, path, errors)?;
                execute_selection(plan, &value, Some(path), invocation, false, errors).await
            }
        }
    }
    .boxed()
}

async fn complete_list<'a>(
    step: &'a Step,
    item: &'a Completion,
    value: Value,
    path: &'a Path<'a>,
    invocation: &'a Invocation,
    errors: &'a mut Vec<FieldError>,
) -> Completed {
    let Value::Array(items) = value else {
        return Err(not_a_list(step, path, errors));
    };

    let outcomes = if invocation.parallel {
        let paths: Vec<Path<'_>> = (0..items.len()).map(|i| Path::index(path, i)).collect();
        let mut item_errors: Vec<Vec<FieldError>> = paths.iter().map(|_| Vec::new()).collect();
        let pending: Vec<_> = items
            .into_iter()
            .zip(&paths)
            .zip(item_errors.iter_mut())
            .map(|((value, item_path), errors)| {
                complete(step, item, value, item_path, invocation, errors)
            })
            .collect();
        let outcomes = join_all(pending).await;
        for item_error in item_errors {
            errors.extend(item_error);
        }
        outcomes
    } else {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, value) in items.into_iter().enumerate() {
            let item_path = Path::index(path, index);
            outcomes.push(complete(step, item, value, &item_path, invocation, errors).await);
        }
        outcomes
    };

    let mut completed = Vec::with_capacity(outcomes.len());
    let mut propagate = false;
    for outcome in outcomes {
        match outcome {
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
