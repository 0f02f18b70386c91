//! Plan compiler
//!
//! Turns one operation of a parsed document into a [`CompiledPlan`]:
//!
//! 1. fragments are indexed and checked for dangling spreads and cycles
//! 2. fields are collected per object type, with `@skip`/`@include` folded
//! 3. every response key becomes a [`Step`] bound to its resolver
//! 4. interface and union fields get one fully merged selection per
//!    possible object type
//!
//! ```rust,ignore
//! let plan = PlanBuilder::new(&registry).compile("{ posts { id title } }", None)?;
//! let result = plan.invoke(&json!({}), &Context::new(), &Variables::new()).await;
//! ```

pub mod binder;
pub mod directives;
pub mod fragments;
pub mod operation;
pub mod plan;

pub use binder::{BindingKind, ResolverBinding};
pub use directives::Condition;
pub use fragments::FragmentRegistry;
pub use operation::OperationDocument;
pub use plan::{BoundResolver, CompiledPlan, Step};

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::core::error::{CompileError, JitError};
use crate::schema::{OperationKind, ResolverMode, SchemaRegistry, TypeDef, TypeKind, TypeRef};
use fragments::FieldCollector;
use operation::Selection;
use plan::{AbstractDispatch, Completion, SelectionPlan};

/// Builds plans against one schema registry
pub struct PlanBuilder<'s> {
    registry: &'s SchemaRegistry,
}

impl<'s> PlanBuilder<'s> {
    pub fn new(registry: &'s SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Parse and compile query text
    pub fn compile(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<CompiledPlan, JitError> {
        let document = OperationDocument::parse(query)?;
        Ok(self.build(&document, operation_name)?)
    }

    /// Compile one operation of a parsed document
    pub fn build(
        &self,
        document: &OperationDocument,
        operation_name: Option<&str>,
    ) -> Result<CompiledPlan, CompileError> {
        let operation = document.operation(operation_name)?;
        tracing::debug!(
            operation = operation.name.as_deref().unwrap_or("<anonymous>"),
            kind = %operation.kind,
            "compiling plan"
        );

        if operation.kind == OperationKind::Subscription {
            return Err(CompileError::UnsupportedOperation {
                kind: operation.kind,
            });
        }
        let root = self
            .registry
            .root_type(operation.kind)
            .ok_or(CompileError::MissingRootType {
                kind: operation.kind,
            })?;

        let fragments = FragmentRegistry::new(&document.fragments)?;
        fragments.check_selection_set(&operation.selection_set)?;

        let mut build = Build {
            registry: self.registry,
            collector: FieldCollector {
                schema: self.registry,
                fragments: &fragments,
            },
            bindings: Vec::new(),
            step_count: 0,
        };
        let root_selection = [(operation.selection_set.as_slice(), Condition::Always)];
        let root_plan = build.selection(root, &root_selection)?;

        let plan = CompiledPlan {
            operation_name: operation.name.clone(),
            kind: operation.kind,
            root_type: Arc::clone(&root.name),
            root: root_plan,
            variable_defaults: operation
                .variables
                .iter()
                .filter_map(|var| {
                    var.default_value
                        .as_ref()
                        .map(|value| (var.name.clone(), value.clone()))
                })
                .collect(),
            schema_id: self.registry.id().clone(),
            generation: self.registry.generation(),
            bindings: build.bindings,
            step_count: build.step_count,
        };

        tracing::debug!(
            operation = plan.operation_name().unwrap_or("<anonymous>"),
            steps = plan.step_count(),
            is_async = plan.is_async(),
            "plan compiled"
        );
        Ok(plan)
    }
}

/// Compile query text in one call
pub fn compile_query(
    registry: &SchemaRegistry,
    query: &str,
    operation_name: Option<&str>,
) -> Result<CompiledPlan, JitError> {
    PlanBuilder::new(registry).compile(query, operation_name)
}

struct Build<'d, 'r> {
    registry: &'r SchemaRegistry,
    collector: FieldCollector<'d, 'r>,
    bindings: Vec<plan::BoundResolver>,
    step_count: usize,
}

impl<'d> Build<'d, '_> {
    fn selection(
        &mut self,
        object: &TypeDef,
        sources: &[(&'d [Selection], Condition)],
    ) -> Result<SelectionPlan, CompileError> {
        let collected = self.collector.collect(&object.name, sources)?;
        let mut steps = Vec::with_capacity(collected.len());

        for (response_key, occurrences) in collected {
            let condition = Condition::any(occurrences.iter().map(|o| o.condition.clone()));
            let shared = occurrences
                .iter()
                .all(|o| o.condition == occurrences[0].condition);
            let children: Vec<(&'d [Selection], Condition)> = occurrences
                .iter()
                .map(|o| {
                    let inherited = if shared {
                        Condition::Always
                    } else {
                        o.condition.clone()
                    };
                    (o.field.selection_set.as_slice(), inherited)
                })
                .collect();

            let field = occurrences[0].field;
            let step = if field.name == "__typename" {
                Step {
                    field_name: Arc::from("__typename"),
                    response_key: Arc::from(response_key),
                    parent_type: Arc::clone(&object.name),
                    ty: TypeRef::named_nn("String"),
                    binding: ResolverBinding::constant(Value::String(object.name.to_string())),
                    condition,
                    completion: Completion::NonNull(Box::new(Completion::Leaf(None))),
                    suspends: false,
                }
            } else {
                let def = object.fields.get(&field.name).ok_or_else(|| {
                    CompileError::UnknownField {
                        type_name: object.name.to_string(),
                        field: field.name.clone(),
                    }
                })?;
                let binding = ResolverBinding::bind(&object.name, def, &field.arguments);
                if binding.kind() == BindingKind::Custom {
                    self.bindings.push(plan::BoundResolver {
                        type_name: Arc::clone(&object.name),
                        field: Arc::clone(&def.name),
                        mode: binding.mode(),
                    });
                }
                let completion = self.completion(&def.ty, &children)?;
                let suspends = binding.mode() == ResolverMode::Suspending
                    || completion.suspends();
                Step {
                    field_name: Arc::clone(&def.name),
                    response_key: Arc::from(response_key),
                    parent_type: Arc::clone(&object.name),
                    ty: def.ty.clone(),
                    binding,
                    condition,
                    completion,
                    suspends,
                }
            };
            self.step_count += 1;
            steps.push(step);
        }

        Ok(SelectionPlan::new(steps))
    }

    fn completion(
        &mut self,
        ty: &TypeRef,
        children: &[(&'d [Selection], Condition)],
    ) -> Result<Completion, CompileError> {
        match ty {
            TypeRef::NonNull(inner) => Ok(Completion::NonNull(Box::new(
                self.completion(inner, children)?,
            ))),
            TypeRef::List(inner) => Ok(Completion::List(Box::new(
                self.completion(inner, children)?,
            ))),
            TypeRef::Named(name) => {
                let registry = self.registry;
                let def = registry
                    .get_type(name)
                    .ok_or_else(|| CompileError::UnknownType {
                        name: name.to_string(),
                    })?;
                match def.kind {
                    TypeKind::Scalar | TypeKind::Enum => {
                        Ok(Completion::Leaf(def.serializer.clone()))
                    }
                    TypeKind::Object => Ok(Completion::Object(self.selection(def, children)?)),
                    TypeKind::Interface | TypeKind::Union => {
                        let possible = registry.possible_types(name);
                        if possible.is_empty() {
                            return Err(CompileError::NoPossibleTypes {
                                name: name.to_string(),
                            });
                        }
                        let mut variants = IndexMap::with_capacity(possible.len());
                        for concrete in possible {
                            let object = registry.get_type(concrete).ok_or_else(|| {
                                CompileError::UnknownType {
                                    name: concrete.to_string(),
                                }
                            })?;
                            let plan = self.selection(object, children)?;
                            variants.insert(concrete.to_string(), plan);
                        }
                        let suspends = variants.values().any(|plan| plan.suspends);
                        Ok(Completion::Abstract(AbstractDispatch {
                            abstract_type: Arc::clone(&def.name),
                            type_resolver: def.type_resolver.clone(),
                            variants,
                            suspends,
                        }))
                    }
                    TypeKind::InputObject => Err(CompileError::UnknownType {
                        name: name.to_string(),
                    }),
                }
            }
        }
    }
}
