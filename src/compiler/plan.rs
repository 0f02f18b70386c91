//! Compiled plan structures
//!
//! A plan is a tree of [`Step`]s, one per response key after fragment
//! expansion. Every step carries its resolver binding, its inclusion
//! condition and a [`Completion`] that mirrors the declared output type, so
//! invocation never consults the schema.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::binder::ResolverBinding;
use super::directives::Condition;
use crate::core::error::CompileError;
use crate::schema::{
    OperationKind, ResolverMode, ScalarSerializer, SchemaId, SchemaRegistry, TypeRef, TypeResolver,
};

/// One compiled field selection
#[derive(Debug)]
pub struct Step {
    pub(crate) field_name: Arc<str>,
    pub(crate) response_key: Arc<str>,
    pub(crate) parent_type: Arc<str>,
    pub(crate) ty: TypeRef,
    pub(crate) binding: ResolverBinding,
    pub(crate) condition: Condition,
    pub(crate) completion: Completion,
    pub(crate) suspends: bool,
}

impl Step {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn response_key(&self) -> &str {
        &self.response_key
    }

    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn binding(&self) -> &ResolverBinding {
        &self.binding
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn is_nullable(&self) -> bool {
        self.ty.is_nullable()
    }

    pub fn is_list(&self) -> bool {
        self.ty.is_list()
    }

    /// Whether this step or anything below it awaits a suspending resolver
    pub fn suspends(&self) -> bool {
        self.suspends
    }

    /// Child steps of an object-typed field
    pub fn children(&self) -> Option<&[Step]> {
        self.completion
            .object_plan()
            .map(|plan| plan.steps.as_slice())
    }
}

/// How a raw value is shaped into the response, following the output type
#[derive(Debug)]
pub(crate) enum Completion {
    NonNull(Box<Completion>),
    List(Box<Completion>),
    Leaf(Option<ScalarSerializer>),
    Object(SelectionPlan),
    Abstract(AbstractDispatch),
}

impl Completion {
    pub(crate) fn suspends(&self) -> bool {
        match self {
            Completion::NonNull(inner) | Completion::List(inner) => inner.suspends(),
            Completion::Leaf(_) => false,
            Completion::Object(plan) => plan.suspends,
            Completion::Abstract(dispatch) => dispatch.suspends,
        }
    }

    fn object_plan(&self) -> Option<&SelectionPlan> {
        match self {
            Completion::NonNull(inner) | Completion::List(inner) => inner.object_plan(),
            Completion::Object(plan) => Some(plan),
            _ => None,
        }
    }
}

/// Steps of one selection set on one object type
#[derive(Debug, Default)]
pub(crate) struct SelectionPlan {
    pub steps: Vec<Step>,
    pub suspends: bool,
}

impl SelectionPlan {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        let suspends = steps.iter().any(|step| step.suspends);
        Self { steps, suspends }
    }
}

/// Runtime type-tag dispatch for an interface or union typed field
#[derive(Debug)]
pub(crate) struct AbstractDispatch {
    pub abstract_type: Arc<str>,
    pub type_resolver: Option<TypeResolver>,
    pub variants: IndexMap<String, SelectionPlan>,
    pub suspends: bool,
}

impl AbstractDispatch {
    /// Concrete type name of a value, `None` when it cannot be determined
    pub(crate) fn concrete_type(&self, value: &Value) -> Option<String> {
        match &self.type_resolver {
            Some(resolver) => resolver.resolve(value),
            None => value
                .get("__typename")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// A custom resolver the plan was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResolver {
    pub type_name: Arc<str>,
    pub field: Arc<str>,
    pub mode: ResolverMode,
}

/// An executable, immutable plan for one operation
///
/// Plans hold no per-invocation state and can be invoked concurrently from
/// any number of tasks.
#[derive(Debug)]
pub struct CompiledPlan {
    pub(crate) operation_name: Option<String>,
    pub(crate) kind: OperationKind,
    pub(crate) root_type: Arc<str>,
    pub(crate) root: SelectionPlan,
    pub(crate) variable_defaults: Vec<(String, Value)>,
    pub(crate) schema_id: SchemaId,
    pub(crate) generation: Uuid,
    pub(crate) bindings: Vec<BoundResolver>,
    pub(crate) step_count: usize,
}

impl CompiledPlan {
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn steps(&self) -> &[Step] {
        &self.root.steps
    }

    pub fn schema_id(&self) -> &SchemaId {
        &self.schema_id
    }

    /// Generation of the registry the plan was compiled against
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Whether invocation needs an async runtime
    pub fn is_async(&self) -> bool {
        self.root.suspends
    }

    /// Number of steps across all dispatch variants
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Custom resolvers bound into the plan
    pub fn bindings(&self) -> &[BoundResolver] {
        &self.bindings
    }

    /// Compare the plan's resolver classifications with a registry
    ///
    /// Fails on the first field whose registered resolver changed between
    /// sync and suspending. Fields whose resolver disappeared or appeared are
    /// not mode changes; such plans are merely outdated and can be rebuilt.
    pub fn verify_bindings(&self, registry: &SchemaRegistry) -> Result<(), CompileError> {
        for bound in &self.bindings {
            let current = registry
                .field(&bound.type_name, &bound.field)
                .and_then(|def| def.resolver_mode());
            if let Some(current) = current
                && current != bound.mode
            {
                return Err(CompileError::ResolverModeChanged {
                    type_name: bound.type_name.to_string(),
                    field: bound.field.to_string(),
                    compiled: bound.mode,
                    current,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for CompiledPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.operation_name {
            write!(f, " {}", name)?;
        }
        writeln!(
            f,
            " on {} [{}, {} steps]",
            self.root_type,
            if self.is_async() { "async" } else { "sync" },
            self.step_count
        )?;
        for (name, value) in &self.variable_defaults {
            writeln!(f, "  ${} = {}", name, value)?;
        }
        write_selection(f, &self.root, 1)
    }
}

fn write_selection(f: &mut fmt::Formatter<'_>, plan: &SelectionPlan, depth: usize) -> fmt::Result {
    for step in &plan.steps {
        let indent = "  ".repeat(depth);
        write!(f, "{}{}", indent, step.response_key)?;
        if step.response_key != step.field_name {
            write!(f, ": {}", step.field_name)?;
        }
        write!(
            f,
            " {} <{} {}>",
            step.ty,
            step.binding.kind(),
            step.binding.mode()
        )?;
        if !step.condition.is_always() {
            write!(f, " @if{}", step.condition)?;
        }
        if step.suspends {
            f.write_str(" ~")?;
        }
        writeln!(f)?;
        write_completion(f, &step.completion, depth + 1)?;
    }
    Ok(())
}

fn write_completion(
    f: &mut fmt::Formatter<'_>,
    completion: &Completion,
    depth: usize,
) -> fmt::Result {
    match completion {
        Completion::NonNull(inner) | Completion::List(inner) => write_completion(f, inner, depth),
        Completion::Leaf(_) => Ok(()),
        Completion::Object(plan) => write_selection(f, plan, depth),
        Completion::Abstract(dispatch) => {
            for (type_name, plan) in &dispatch.variants {
                writeln!(
                    f,
                    "{}... on {} (from {})",
                    "  ".repeat(depth),
                    type_name,
                    dispatch.abstract_type
                )?;
                write_selection(f, plan, depth + 1)?;
            }
            Ok(())
        }
    }
}
