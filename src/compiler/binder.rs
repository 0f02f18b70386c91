//! Resolver binding
//!
//! Each field is bound exactly once, when the plan is built. A field without
//! a registered resolver reads its value straight off the parent; a field
//! with one gets a closure that captures the resolver, its argument
//! materializer and the field description. The sync/suspending split comes
//! from the resolver's registration variant and is never re-examined.

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::operation::InputValue;
use crate::core::context::Variables;
use crate::runtime::Invocation;
use crate::schema::{FieldDef, FieldInfo, Resolver, ResolverArgs, ResolverMode};

pub(crate) type SyncCall = Arc<dyn Fn(&Value, &Invocation) -> Result<Value> + Send + Sync>;
pub(crate) type AsyncCall =
    Arc<dyn Fn(&Value, &Invocation) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// How a step obtains its raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Known at compile time (`__typename`)
    Constant,
    /// Property of the parent value named after the field
    DefaultAttribute,
    /// Registered resolver
    Custom,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Constant => f.write_str("constant"),
            BindingKind::DefaultAttribute => f.write_str("attribute"),
            BindingKind::Custom => f.write_str("custom"),
        }
    }
}

pub(crate) enum Fetch {
    Constant(Value),
    Attribute(Arc<str>),
    Call(SyncCall),
    Await(AsyncCall),
}

/// Value source of a step, fixed at plan build
pub struct ResolverBinding {
    kind: BindingKind,
    mode: ResolverMode,
    pub(crate) fetch: Fetch,
}

impl ResolverBinding {
    pub(crate) fn constant(value: Value) -> Self {
        Self {
            kind: BindingKind::Constant,
            mode: ResolverMode::Sync,
            fetch: Fetch::Constant(value),
        }
    }

    /// Bind a schema field, given the arguments written in the query
    pub(crate) fn bind(
        parent_type: &Arc<str>,
        def: &FieldDef,
        arguments: &[(String, InputValue)],
    ) -> Self {
        let Some(resolver) = &def.resolver else {
            return Self {
                kind: BindingKind::DefaultAttribute,
                mode: ResolverMode::Sync,
                fetch: Fetch::Attribute(Arc::clone(&def.name)),
            };
        };

        let plan = ArgumentPlan::new(def, arguments);
        let field = FieldInfo {
            parent_type: Arc::clone(parent_type),
            field_name: Arc::clone(&def.name),
        };
        let fetch = match resolver {
            Resolver::Sync(resolve) => {
                let resolve = Arc::clone(resolve);
                Fetch::Call(Arc::new(move |parent: &Value, invocation: &Invocation| {
                    resolve(plan.args(parent, invocation, &field))
                }))
            }
            Resolver::Suspending(resolver) => {
                let resolver = Arc::clone(resolver);
                Fetch::Await(Arc::new(move |parent: &Value, invocation: &Invocation| {
                    let resolver = Arc::clone(&resolver);
                    let args = plan.args(parent, invocation, &field);
                    async move { resolver.resolve(args).await }.boxed()
                }))
            }
        };

        Self {
            kind: BindingKind::Custom,
            mode: resolver.mode(),
            fetch,
        }
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn mode(&self) -> ResolverMode {
        self.mode
    }
}

impl fmt::Debug for ResolverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverBinding")
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish()
    }
}

enum ArgSource {
    Const(Value),
    Variable {
        name: String,
        default: Option<Value>,
    },
    Dynamic(InputValue),
}

/// Argument materializer in schema declaration order
///
/// Literal arguments and defaults are embedded once. When no argument
/// depends on a variable the whole map is prebuilt and only cloned per call.
struct ArgumentPlan {
    sources: Vec<(String, ArgSource)>,
    constant: Option<Variables>,
}

impl ArgumentPlan {
    fn new(def: &FieldDef, given: &[(String, InputValue)]) -> Self {
        let mut sources = Vec::with_capacity(def.arguments.len());
        for (name, argument) in &def.arguments {
            let written = given
                .iter()
                .find(|(arg, _)| arg == name)
                .map(|(_, value)| value);
            let source = match (written, &argument.default_value) {
                (Some(InputValue::Const(value)), _) => ArgSource::Const(value.clone()),
                (Some(InputValue::Variable(var)), default) => ArgSource::Variable {
                    name: var.clone(),
                    default: default.clone(),
                },
                (Some(dynamic), _) => ArgSource::Dynamic(dynamic.clone()),
                (None, Some(default)) => ArgSource::Const(default.clone()),
                (None, None) => continue,
            };
            sources.push((name.clone(), source));
        }

        let constant = sources
            .iter()
            .all(|(_, source)| matches!(source, ArgSource::Const(_)))
            .then(|| {
                sources
                    .iter()
                    .filter_map(|(name, source)| match source {
                        ArgSource::Const(value) => Some((name.clone(), value.clone())),
                        _ => None,
                    })
                    .collect()
            });

        Self { sources, constant }
    }

    fn materialize(&self, variables: &Variables) -> Variables {
        if let Some(constant) = &self.constant {
            return constant.clone();
        }
        let mut arguments = Variables::new();
        for (name, source) in &self.sources {
            let value = match source {
                ArgSource::Const(value) => value.clone(),
                ArgSource::Variable { name: var, default } => {
                    match variables.get(var).or(default.as_ref()) {
                        Some(value) => value.clone(),
                        None => continue,
                    }
                }
                ArgSource::Dynamic(input) => input.resolve(variables),
            };
            arguments.insert(name.clone(), value);
        }
        arguments
    }

    fn args(&self, parent: &Value, invocation: &Invocation, field: &FieldInfo) -> ResolverArgs {
        ResolverArgs {
            parent: parent.clone(),
            arguments: self.materialize(&invocation.variables),
            context: invocation.context.clone(),
            field: field.clone(),
        }
    }
}
