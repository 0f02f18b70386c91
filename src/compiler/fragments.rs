//! Fragment registry and field collection
//!
//! Fields are always collected against a concrete object type. Fragments
//! whose type condition the object satisfies are merged in place with their
//! directives folded into every field they contribute; fragments that can
//! never match the object are dropped.

use indexmap::IndexMap;
use std::collections::HashMap;

use super::directives::Condition;
use super::operation::{FieldSelection, FragmentDef, Selection};
use crate::core::error::CompileError;
use crate::schema::SchemaRegistry;

/// Named fragments of one document
#[derive(Debug)]
pub struct FragmentRegistry<'d> {
    fragments: HashMap<&'d str, &'d FragmentDef>,
}

impl<'d> FragmentRegistry<'d> {
    /// Index fragments and reject dangling spreads or spread cycles
    pub fn new(fragments: &'d [FragmentDef]) -> Result<Self, CompileError> {
        let registry = Self {
            fragments: fragments
                .iter()
                .map(|fragment| (fragment.name.as_str(), fragment))
                .collect(),
        };

        let mut done = Vec::new();
        for fragment in fragments {
            let mut stack = vec![fragment.name.as_str()];
            registry.check_spreads(&fragment.selection_set, &mut stack, &mut done)?;
            done.push(fragment.name.as_str());
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<&'d FragmentDef, CompileError> {
        self.fragments
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownFragment {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Reject unknown spreads anywhere in an operation's selection set
    pub fn check_selection_set(&self, selections: &'d [Selection]) -> Result<(), CompileError> {
        let mut done = self.fragments.keys().copied().collect();
        self.check_spreads(selections, &mut Vec::new(), &mut done)
    }

    fn check_spreads(
        &self,
        selections: &'d [Selection],
        stack: &mut Vec<&'d str>,
        done: &mut Vec<&'d str>,
    ) -> Result<(), CompileError> {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    self.check_spreads(&field.selection_set, stack, done)?;
                }
                Selection::InlineFragment { selection_set, .. } => {
                    self.check_spreads(selection_set, stack, done)?;
                }
                Selection::FragmentSpread { name, .. } => {
                    let fragment = self.get(name)?;
                    if stack.contains(&name.as_str()) {
                        return Err(CompileError::FragmentCycle { name: name.clone() });
                    }
                    if done.contains(&name.as_str()) {
                        continue;
                    }
                    stack.push(fragment.name.as_str());
                    self.check_spreads(&fragment.selection_set, stack, done)?;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

/// One appearance of a response key inside a selection set
#[derive(Debug, Clone)]
pub(crate) struct FieldOccurrence<'d> {
    pub field: &'d FieldSelection,
    pub condition: Condition,
}

/// Fields grouped by response key in first-appearance order
pub(crate) type CollectedFields<'d> = IndexMap<&'d str, Vec<FieldOccurrence<'d>>>;

/// Walks selection sets, expanding fragments for one object type
pub(crate) struct FieldCollector<'d, 'r> {
    pub schema: &'r SchemaRegistry,
    pub fragments: &'r FragmentRegistry<'d>,
}

impl<'d> FieldCollector<'d, '_> {
    /// Collect the fields of several selection sets, each under its own condition
    pub fn collect(
        &self,
        object_type: &str,
        sources: &[(&'d [Selection], Condition)],
    ) -> Result<CollectedFields<'d>, CompileError> {
        let mut fields = CollectedFields::new();
        for (selections, condition) in sources {
            self.collect_into(object_type, selections, condition, &mut fields)?;
        }
        Ok(fields)
    }

    fn collect_into(
        &self,
        object_type: &str,
        selections: &'d [Selection],
        condition: &Condition,
        fields: &mut CollectedFields<'d>,
    ) -> Result<(), CompileError> {
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    let condition = condition
                        .clone()
                        .and(Condition::from_directives(&field.directives));
                    if condition.is_never() {
                        continue;
                    }
                    fields
                        .entry(field.response_key())
                        .or_default()
                        .push(FieldOccurrence { field, condition });
                }
                Selection::FragmentSpread { name, directives } => {
                    let fragment = self.fragments.get(name)?;
                    let condition = condition
                        .clone()
                        .and(Condition::from_directives(directives))
                        .and(Condition::from_directives(&fragment.directives));
                    if condition.is_never()
                        || !self.applies(&fragment.type_condition, object_type)?
                    {
                        continue;
                    }
                    self.collect_into(object_type, &fragment.selection_set, &condition, fields)?;
                }
                Selection::InlineFragment {
                    type_condition,
                    directives,
                    selection_set,
                } => {
                    let condition = condition
                        .clone()
                        .and(Condition::from_directives(directives));
                    if condition.is_never() {
                        continue;
                    }
                    if let Some(type_condition) = type_condition
                        && !self.applies(type_condition, object_type)?
                    {
                        continue;
                    }
                    self.collect_into(object_type, selection_set, &condition, fields)?;
                }
            }
        }
        Ok(())
    }

    fn applies(&self, type_condition: &str, object_type: &str) -> Result<bool, CompileError> {
        if self.schema.get_type(type_condition).is_none() {
            return Err(CompileError::UnknownType {
                name: type_condition.to_string(),
            });
        }
        Ok(self.schema.type_satisfies(type_condition, object_type))
    }
}
