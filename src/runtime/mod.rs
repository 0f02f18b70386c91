//! Plan invocation
//!
//! A compiled plan is run by one of two walkers:
//!
//! - [`walker`]: plain recursive functions, used when no step in the plan
//!   suspends. No future is ever created.
//! - [`scheduler`]: boxed futures per level. Sync steps run inline, steps
//!   that suspend are launched together and joined.
//!
//! Both share the completion rules in this module: a failing field records a
//! [`FieldError`] at its own path and yields [`Propagate`], which is absorbed
//! by the nearest nullable position.

mod scheduler;
mod walker;

use serde::Serialize;
use serde_json::Value;

use crate::compiler::binder::Fetch;
use crate::compiler::plan::{AbstractDispatch, Completion, SelectionPlan, Step};
use crate::compiler::CompiledPlan;
pub use crate::core::context::{Context, Variables};
use crate::core::error::{FieldError, JitError};
use crate::core::path::Path;
use crate::schema::{OperationKind, ScalarSerializer};

/// Response of one invocation: `{"data": ..., "errors": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ExecutionResult {
    /// A result without data, e.g. after a timeout
    pub fn from_error(error: FieldError) -> Self {
        Self {
            data: Value::Null,
            errors: vec![error],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-invocation inputs shared by every step
pub(crate) struct Invocation {
    pub variables: Variables,
    pub context: Context,
    pub parallel: bool,
}

/// Marker for a null that must bubble to the nearest nullable position
///
/// The error itself is recorded where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Propagate;

pub(crate) type Completed = Result<Value, Propagate>;

impl CompiledPlan {
    /// Run the plan
    ///
    /// Plans without suspending steps complete without ever yielding.
    pub async fn invoke(
        &self,
        root: &Value,
        context: &Context,
        variables: &Variables,
    ) -> ExecutionResult {
        self.invoke_with(root, context, variables, true).await
    }

    /// Run the plan, optionally awaiting suspending siblings one at a time
    pub async fn invoke_with(
        &self,
        root: &Value,
        context: &Context,
        variables: &Variables,
        parallel: bool,
    ) -> ExecutionResult {
        let invocation = self.invocation(context, variables, parallel);
        let mut errors = Vec::new();
        let data = if self.root.suspends {
            let serial = self.kind == OperationKind::Mutation;
            scheduler::execute_selection(&self.root, root, None, &invocation, serial, &mut errors)
                .await
        } else {
            walker::execute_selection(&self.root, root, None, &invocation, &mut errors)
        };
        finish(data, errors)
    }

    /// Run a plan that contains no suspending step, blocking the caller
    pub fn invoke_sync(
        &self,
        root: &Value,
        context: &Context,
        variables: &Variables,
    ) -> Result<ExecutionResult, JitError> {
        if self.root.suspends {
            return Err(JitError::RequiresAsync {
                operation: self
                    .operation_name
                    .clone()
                    .unwrap_or_else(|| format!("anonymous {}", self.kind)),
            });
        }
        let invocation = self.invocation(context, variables, false);
        let mut errors = Vec::new();
        let data = walker::execute_selection(&self.root, root, None, &invocation, &mut errors);
        Ok(finish(data, errors))
    }

    fn invocation(&self, context: &Context, variables: &Variables, parallel: bool) -> Invocation {
        let mut variables = variables.clone();
        for (name, default) in &self.variable_defaults {
            if !variables.contains_key(name) {
                variables.insert(name.clone(), default.clone());
            }
        }
        Invocation {
            variables,
            context: context.clone(),
            parallel,
        }
    }
}

fn finish(data: Completed, errors: Vec<FieldError>) -> ExecutionResult {
    ExecutionResult {
        data: data.unwrap_or(Value::Null),
        errors,
    }
}

/// Raw value of a step that does not await
pub(crate) fn fetch_sync(
    step: &Step,
    parent: &Value,
    invocation: &Invocation,
) -> anyhow::Result<Value> {
    match &step.binding.fetch {
        Fetch::Constant(value) => Ok(value.clone()),
        Fetch::Attribute(name) => Ok(parent.get(&**name).cloned().unwrap_or(Value::Null)),
        Fetch::Call(call) => call(parent, invocation),
        Fetch::Await(_) => Err(anyhow::anyhow!(
            "Resolver for {}.{} suspends and cannot run synchronously",
            step.parent_type,
            step.field_name
        )),
    }
}

/// Record a resolver failure and apply the step's nullability
pub(crate) fn fail(
    step: &Step,
    error: anyhow::Error,
    path: &Path<'_>,
    errors: &mut Vec<FieldError>,
) -> Completed {
    errors.push(FieldError::new(error.to_string(), path.to_response_path()));
    absorb(&step.completion)
}

/// Null for a nullable position, propagation otherwise
pub(crate) fn absorb(completion: &Completion) -> Completed {
    match completion {
        Completion::NonNull(_) => Err(Propagate),
        _ => Ok(Value::Null),
    }
}

pub(crate) fn non_null_violation(
    step: &Step,
    path: &Path<'_>,
    errors: &mut Vec<FieldError>,
) -> Propagate {
    errors.push(FieldError::new(
        format!(
            "Cannot return null for non-nullable field {}.{}.",
            step.parent_type, step.field_name
        ),
        path.to_response_path(),
    ));
    Propagate
}

pub(crate) fn not_a_list(step: &Step, path: &Path<'_>, errors: &mut Vec<FieldError>) -> Propagate {
    errors.push(FieldError::new(
        format!(
            "Expected Iterable, but did not find one for field \"{}.{}\".",
            step.parent_type, step.field_name
        ),
        path.to_response_path(),
    ));
    Propagate
}

pub(crate) fn complete_leaf(
    serializer: Option<&ScalarSerializer>,
    value: Value,
    path: &Path<'_>,
    errors: &mut Vec<FieldError>,
) -> Completed {
    match serializer {
        None => Ok(value),
        Some(serializer) => serializer.serialize(&value).map_err(|e| {
            errors.push(FieldError::new(e.to_string(), path.to_response_path()));
            Propagate
        }),
    }
}

/// Pick the per-type selection for a value of an abstract type
pub(crate) fn select_variant<'p>(
    step: &Step,
    dispatch: &'p AbstractDispatch,
    value: &Value,
    path: &Path<'_>,
    errors: &mut Vec<FieldError>,
) -> Result<&'p SelectionPlan, Propagate> {
    dispatch
        .concrete_type(value)
        .and_then(|name| dispatch.variants.get(&name))
        .ok_or_else(|| {
            errors.push(FieldError::new(
                format!(
                    "Abstract type \"{}\" must resolve to an Object type at runtime for field \"{}.{}\".",
                    dispatch.abstract_type, step.parent_type, step.field_name
                ),
                path.to_response_path(),
            ));
            Propagate
        })
}
