//! Owned form of a parsed GraphQL document
//!
//! The parser AST borrows from the query text. Plans outlive that text, so
//! the document is converted once into these owned nodes before compiling.
//! Argument values that contain no variable references are folded into JSON
//! constants here.

use graphql_parser::query::{
    self, Definition, Document, OperationDefinition, SelectionSet, TypeCondition, Value as GqlValue,
};
use serde_json::{Map, Value, json};

use crate::core::context::Variables;
use crate::core::error::{CompileError, JitError};
use crate::schema::{OperationKind, TypeRef};

/// A parsed query document
#[derive(Debug, Clone)]
pub struct OperationDocument {
    pub operations: Vec<Operation>,
    pub fragments: Vec<FragmentDef>,
    normalized: String,
}

/// One operation definition
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: Option<String>,
    pub kind: OperationKind,
    pub variables: Vec<VariableDecl>,
    pub selection_set: Vec<Selection>,
}

/// A declared operation variable
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

/// A node of a selection set
#[derive(Debug, Clone)]
pub enum Selection {
    Field(FieldSelection),
    FragmentSpread {
        name: String,
        directives: Vec<DirectiveNode>,
    },
    InlineFragment {
        type_condition: Option<String>,
        directives: Vec<DirectiveNode>,
        selection_set: Vec<Selection>,
    },
}

/// A selected field
#[derive(Debug, Clone)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Vec<Selection>,
}

impl FieldSelection {
    /// Key under which the field appears in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// A directive applied to a field or fragment
#[derive(Debug, Clone)]
pub struct DirectiveNode {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
}

impl DirectiveNode {
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

/// A named fragment definition
#[derive(Debug, Clone)]
pub struct FragmentDef {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Vec<Selection>,
}

/// Argument value as written in the query
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// Fully known at compile time
    Const(Value),
    /// `$name`
    Variable(String),
    /// List containing at least one variable
    List(Vec<InputValue>),
    /// Input object containing at least one variable
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    /// Materialize against invocation variables; absent variables become null
    pub fn resolve(&self, variables: &Variables) -> Value {
        match self {
            InputValue::Const(value) => value.clone(),
            InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            InputValue::List(items) => {
                Value::Array(items.iter().map(|item| item.resolve(variables)).collect())
            }
            InputValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.resolve(variables)))
                    .collect(),
            ),
        }
    }

    fn from_ast(value: &GqlValue<'_, String>) -> Self {
        match value {
            GqlValue::Variable(name) => InputValue::Variable(name.clone()),
            GqlValue::List(items) => {
                let items: Vec<_> = items.iter().map(InputValue::from_ast).collect();
                if items.iter().all(|item| matches!(item, InputValue::Const(_))) {
                    InputValue::Const(Value::Array(
                        items.into_iter().map(InputValue::into_const).collect(),
                    ))
                } else {
                    InputValue::List(items)
                }
            }
            GqlValue::Object(fields) => {
                let fields: Vec<_> = fields
                    .iter()
                    .map(|(name, value)| (name.clone(), InputValue::from_ast(value)))
                    .collect();
                if fields.iter().all(|(_, v)| matches!(v, InputValue::Const(_))) {
                    InputValue::Const(Value::Object(
                        fields
                            .into_iter()
                            .map(|(name, value)| (name, value.into_const()))
                            .collect(),
                    ))
                } else {
                    InputValue::Object(fields)
                }
            }
            other => InputValue::Const(const_to_json(other)),
        }
    }

    fn into_const(self) -> Value {
        match self {
            InputValue::Const(value) => value,
            _ => Value::Null,
        }
    }
}

/// Convert a GraphQL literal to JSON
///
/// Variable references have no literal value and convert to null.
pub(crate) fn const_to_json(value: &GqlValue<'_, String>) -> Value {
    match value {
        GqlValue::Null | GqlValue::Variable(_) => Value::Null,
        GqlValue::Int(i) => i.as_i64().map(Value::from).unwrap_or(Value::Null),
        GqlValue::Float(f) => json!(f),
        GqlValue::String(s) => json!(s),
        GqlValue::Boolean(b) => json!(b),
        GqlValue::Enum(e) => json!(e),
        GqlValue::List(list) => Value::Array(list.iter().map(const_to_json).collect()),
        GqlValue::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.clone(), const_to_json(v));
            }
            Value::Object(map)
        }
    }
}

impl OperationDocument {
    /// Parse query text into an owned document
    pub fn parse(text: &str) -> Result<Self, JitError> {
        let document = query::parse_query::<String>(text).map_err(|e| JitError::Parse {
            message: e.to_string(),
        })?;
        let mut operations = Vec::new();
        let mut fragments = Vec::new();
        for definition in &document.definitions {
            match definition {
                Definition::Operation(op) => operations.push(convert_operation(op)),
                Definition::Fragment(fragment) => {
                    let TypeCondition::On(type_condition) = &fragment.type_condition;
                    fragments.push(FragmentDef {
                        name: fragment.name.clone(),
                        type_condition: type_condition.clone(),
                        directives: convert_directives(&fragment.directives),
                        selection_set: convert_selection_set(&fragment.selection_set),
                    });
                }
            }
        }

        Ok(Self {
            operations,
            fragments,
            normalized: canonical_text(document),
        })
    }

    /// Canonical re-serialization of the document
    ///
    /// Formatting differences (whitespace, commas, comments) collapse to the
    /// same text.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Pick the operation to run
    ///
    /// Without a name the first operation is used.
    pub fn operation(&self, name: Option<&str>) -> Result<&Operation, CompileError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| CompileError::OperationNotFound {
                    name: name.to_string(),
                }),
            None => self.operations.first().ok_or(CompileError::NoOperation),
        }
    }
}

/// Print a parsed document in canonical form
///
/// An anonymous query without variables or directives prints in shorthand,
/// so `{ a }` and `query { a }` produce the same text.
pub(crate) fn canonical_text(mut document: Document<'_, String>) -> String {
    for definition in &mut document.definitions {
        let shorthand = match definition {
            Definition::Operation(OperationDefinition::Query(q))
                if q.name.is_none()
                    && q.variable_definitions.is_empty()
                    && q.directives.is_empty() =>
            {
                Some(q.selection_set.clone())
            }
            _ => None,
        };
        if let Some(selection_set) = shorthand {
            *definition = Definition::Operation(OperationDefinition::SelectionSet(selection_set));
        }
    }
    document.to_string()
}

/// Canonical text of a query, or the text unchanged when it does not parse
pub fn normalize_query(text: &str) -> String {
    query::parse_query::<String>(text)
        .map(canonical_text)
        .unwrap_or_else(|_| text.to_string())
}

fn convert_operation(op: &OperationDefinition<'_, String>) -> Operation {
    match op {
        OperationDefinition::SelectionSet(selection_set) => Operation {
            name: None,
            kind: OperationKind::Query,
            variables: Vec::new(),
            selection_set: convert_selection_set(selection_set),
        },
        OperationDefinition::Query(q) => Operation {
            name: q.name.clone(),
            kind: OperationKind::Query,
            variables: convert_variables(&q.variable_definitions),
            selection_set: convert_selection_set(&q.selection_set),
        },
        OperationDefinition::Mutation(m) => Operation {
            name: m.name.clone(),
            kind: OperationKind::Mutation,
            variables: convert_variables(&m.variable_definitions),
            selection_set: convert_selection_set(&m.selection_set),
        },
        OperationDefinition::Subscription(s) => Operation {
            name: s.name.clone(),
            kind: OperationKind::Subscription,
            variables: convert_variables(&s.variable_definitions),
            selection_set: convert_selection_set(&s.selection_set),
        },
    }
}

fn convert_variables(definitions: &[query::VariableDefinition<'_, String>]) -> Vec<VariableDecl> {
    definitions
        .iter()
        .map(|def| VariableDecl {
            name: def.name.clone(),
            ty: TypeRef::from_ast(&def.var_type),
            default_value: def.default_value.as_ref().map(const_to_json),
        })
        .collect()
}

fn convert_selection_set(selection_set: &SelectionSet<'_, String>) -> Vec<Selection> {
    selection_set
        .items
        .iter()
        .map(|item| match item {
            query::Selection::Field(field) => Selection::Field(FieldSelection {
                alias: field.alias.clone(),
                name: field.name.clone(),
                arguments: convert_arguments(&field.arguments),
                directives: convert_directives(&field.directives),
                selection_set: convert_selection_set(&field.selection_set),
            }),
            query::Selection::FragmentSpread(spread) => Selection::FragmentSpread {
                name: spread.fragment_name.clone(),
                directives: convert_directives(&spread.directives),
            },
            query::Selection::InlineFragment(inline) => Selection::InlineFragment {
                type_condition: inline
                    .type_condition
                    .as_ref()
                    .map(|TypeCondition::On(name)| name.clone()),
                directives: convert_directives(&inline.directives),
                selection_set: convert_selection_set(&inline.selection_set),
            },
        })
        .collect()
}

fn convert_arguments(arguments: &[(String, GqlValue<'_, String>)]) -> Vec<(String, InputValue)> {
    arguments
        .iter()
        .map(|(name, value)| (name.clone(), InputValue::from_ast(value)))
        .collect()
}

fn convert_directives(directives: &[query::Directive<'_, String>]) -> Vec<DirectiveNode> {
    directives
        .iter()
        .map(|directive| DirectiveNode {
            name: directive.name.clone(),
            arguments: convert_arguments(&directive.arguments),
        })
        .collect()
}
