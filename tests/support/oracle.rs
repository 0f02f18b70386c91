//! Interpretive reference executor
//!
//! Walks the parsed document on every request: fields are collected at run
//! time with `@skip`/`@include` evaluated against the variables, resolvers
//! are looked up by name and awaited one at a time, and every value is
//! completed by reading its declared type. Nothing is precomputed, so its
//! output is the expected output of a compiled plan for the same inputs.
//!
//! Only valid operations are supported; anything a compiled plan would reject
//! makes this executor panic.

use futures::future::{BoxFuture, FutureExt};
use graphql_parser::query::{
    Definition, Directive, Field, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet, TypeCondition, Value as GqlValue, VariableDefinition,
};
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use jit::prelude::*;

struct Propagate;

type Completed = Result<Value, Propagate>;

type Fields<'a, 'q> = IndexMap<String, Vec<&'a Field<'q, String>>>;

/// Run `query` against `schema` without compiling it
pub async fn execute(
    schema: &SchemaRegistry,
    query: &str,
    operation_name: Option<&str>,
    root: &Value,
    context: &Context,
    variables: &Variables,
) -> ExecutionResult {
    let document =
        graphql_parser::parse_query::<String>(query).expect("reference executor needs valid text");

    let mut fragments = HashMap::new();
    let mut operations = Vec::new();
    for definition in &document.definitions {
        match definition {
            Definition::Fragment(fragment) => {
                fragments.insert(fragment.name.as_str(), fragment);
            }
            Definition::Operation(operation) => operations.push(operation),
        }
    }

    let operation = match operation_name {
        Some(name) => operations
            .iter()
            .find(|operation| operation_name_of(operation) == Some(name)),
        None => operations.first(),
    }
    .expect("operation exists");

    let (kind, definitions, selection_set) = match operation {
        OperationDefinition::SelectionSet(set) => (OperationKind::Query, &[][..], set),
        OperationDefinition::Query(query) => (
            OperationKind::Query,
            query.variable_definitions.as_slice(),
            &query.selection_set,
        ),
        OperationDefinition::Mutation(mutation) => (
            OperationKind::Mutation,
            mutation.variable_definitions.as_slice(),
            &mutation.selection_set,
        ),
        OperationDefinition::Subscription(_) => panic!("subscriptions are not executed"),
    };

    let run = Run {
        schema,
        fragments,
        variables: with_defaults(variables, definitions),
        context: context.clone(),
    };
    let root_type = schema
        .root_type(kind)
        .expect("root type exists")
        .name
        .to_string();

    let mut errors = Vec::new();
    let data = run
        .execute_selection(
            root_type,
            vec![selection_set],
            root.clone(),
            ResponsePath::default(),
            &mut errors,
        )
        .await;

    ExecutionResult {
        data: data.unwrap_or(Value::Null),
        errors,
    }
}

fn operation_name_of<'d>(operation: &'d OperationDefinition<'_, String>) -> Option<&'d str> {
    match operation {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

fn with_defaults(
    variables: &Variables,
    definitions: &[VariableDefinition<'_, String>],
) -> Variables {
    let mut variables = variables.clone();
    for definition in definitions {
        if let Some(default) = &definition.default_value
            && !variables.contains_key(&definition.name)
        {
            let value = input(default, &Variables::new());
            variables.insert(definition.name.clone(), value);
        }
    }
    variables
}

fn input(value: &GqlValue<'_, String>, variables: &Variables) -> Value {
    match value {
        GqlValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        GqlValue::Null => Value::Null,
        GqlValue::Int(int) => int.as_i64().map(Value::from).unwrap_or(Value::Null),
        GqlValue::Float(float) => json!(float),
        GqlValue::String(text) | GqlValue::Enum(text) => json!(text),
        GqlValue::Boolean(flag) => json!(flag),
        GqlValue::List(items) => {
            Value::Array(items.iter().map(|item| input(item, variables)).collect())
        }
        GqlValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), input(value, variables)))
                .collect(),
        ),
    }
}

/// Field being completed, with every selection set merged into it
struct FieldContext<'a, 'q> {
    parent_type: String,
    field_name: String,
    selection_sets: Vec<&'a SelectionSet<'q, String>>,
}

struct Run<'a, 'q> {
    schema: &'a SchemaRegistry,
    fragments: HashMap<&'a str, &'a FragmentDefinition<'q, String>>,
    variables: Variables,
    context: Context,
}

impl<'a, 'q> Run<'a, 'q> {
    fn included(&self, directives: &[Directive<'q, String>]) -> bool {
        directives.iter().all(|directive| {
            let flag = match directive
                .arguments
                .iter()
                .find(|(name, _)| name == "if")
                .map(|(_, value)| value)
            {
                Some(GqlValue::Boolean(flag)) => *flag,
                Some(GqlValue::Variable(name)) => {
                    matches!(self.variables.get(name), Some(Value::Bool(true)))
                }
                _ => false,
            };
            match directive.name.as_str() {
                "skip" => !flag,
                "include" => flag,
                _ => true,
            }
        })
    }

    fn collect(
        &self,
        object_type: &str,
        selection_set: &'a SelectionSet<'q, String>,
        fields: &mut Fields<'a, 'q>,
    ) {
        for selection in &selection_set.items {
            match selection {
                Selection::Field(field) => {
                    if self.included(&field.directives) {
                        let key = field.alias.clone().unwrap_or_else(|| field.name.clone());
                        fields.entry(key).or_default().push(field);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !self.included(&spread.directives) {
                        continue;
                    }
                    let fragment = self.fragments[spread.fragment_name.as_str()];
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    if self.schema.type_satisfies(condition, object_type) {
                        self.collect(object_type, &fragment.selection_set, fields);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if !self.included(&inline.directives) {
                        continue;
                    }
                    let applies = match &inline.type_condition {
                        Some(TypeCondition::On(condition)) => {
                            self.schema.type_satisfies(condition, object_type)
                        }
                        None => true,
                    };
                    if applies {
                        self.collect(object_type, &inline.selection_set, fields);
                    }
                }
            }
        }
    }

    fn arguments(&self, def: &FieldDef, field: &Field<'q, String>) -> Variables {
        let mut arguments = Variables::new();
        for (name, argument) in &def.arguments {
            let written = field
                .arguments
                .iter()
                .find(|(arg, _)| arg == name)
                .map(|(_, value)| value);
            let value = match written {
                Some(GqlValue::Variable(var)) => {
                    match self.variables.get(var).or(argument.default_value.as_ref()) {
                        Some(value) => value.clone(),
                        None => continue,
                    }
                }
                Some(value) => input(value, &self.variables),
                None => match &argument.default_value {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            arguments.insert(name.clone(), value);
        }
        arguments
    }

    fn execute_selection<'s>(
        &'s self,
        object_type: String,
        selection_sets: Vec<&'a SelectionSet<'q, String>>,
        parent: Value,
        path: ResponsePath,
        errors: &'s mut Vec<FieldError>,
    ) -> BoxFuture<'s, Completed> {
        async move {
            let mut fields = Fields::new();
            for selection_set in selection_sets {
                self.collect(&object_type, selection_set, &mut fields);
            }

            let mut map = Map::new();
            let mut propagate = false;
            for (key, occurrences) in fields {
                let field_path = path.clone().key(&key);
                match self
                    .execute_field(&object_type, occurrences, &parent, field_path, errors)
                    .await
                {
                    Ok(value) => {
                        map.insert(key, value);
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

    async fn execute_field(
        &self,
        object_type: &str,
        occurrences: Vec<&'a Field<'q, String>>,
        parent: &Value,
        path: ResponsePath,
        errors: &mut Vec<FieldError>,
    ) -> Completed {
        let field = occurrences[0];
        if field.name == "__typename" {
            return Ok(json!(object_type));
        }
        let def = self
            .schema
            .field(object_type, &field.name)
            .expect("field exists on its parent type");

        let raw = match &def.resolver {
            Some(resolver) => {
                resolver
                    .call(ResolverArgs {
                        parent: parent.clone(),
                        arguments: self.arguments(def, field),
                        context: self.context.clone(),
                        field: FieldInfo {
                            parent_type: Arc::from(object_type),
                            field_name: def.name.clone(),
                        },
                    })
                    .await
            }
            None => Ok(parent.get(field.name.as_str()).cloned().unwrap_or(Value::Null)),
        };

        let context = FieldContext {
            parent_type: object_type.to_string(),
            field_name: field.name.clone(),
            selection_sets: occurrences
                .iter()
                .map(|&field| &field.selection_set)
                .collect(),
        };
        match raw {
            Ok(value) => self.complete(&context, &def.ty, value, path, errors).await,
            Err(error) => {
                errors.push(FieldError::new(error.to_string(), path));
                if def.ty.is_nullable() {
                    Ok(Value::Null)
                } else {
                    Err(Propagate)
                }
            }
        }
    }

    fn complete<'s>(
        &'s self,
        field: &'s FieldContext<'a, 'q>,
        ty: &'s TypeRef,
        value: Value,
        path: ResponsePath,
        errors: &'s mut Vec<FieldError>,
    ) -> BoxFuture<'s, Completed> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    let value = self
                        .complete_value(field, inner, value, path.clone(), errors)
                        .await?;
                    if value.is_null() {
                        errors.push(FieldError::new(
                            format!(
                                "Cannot return null for non-nullable field {}.{}.",
                                field.parent_type, field.field_name
                            ),
                            path,
                        ));
                        Err(Propagate)
                    } else {
                        Ok(value)
                    }
                }
                nullable => Ok(self
                    .complete_value(field, nullable, value, path, errors)
                    .await
                    .unwrap_or(Value::Null)),
            }
        }
        .boxed()
    }

    fn complete_value<'s>(
        &'s self,
        field: &'s FieldContext<'a, 'q>,
        ty: &'s TypeRef,
        value: Value,
        path: ResponsePath,
        errors: &'s mut Vec<FieldError>,
    ) -> BoxFuture<'s, Completed> {
        async move {
            if value.is_null() {
                return Ok(Value::Null);
            }
            match ty {
                TypeRef::NonNull(_) => self.complete(field, ty, value, path, errors).await,
                TypeRef::List(item) => {
                    let Value::Array(items) = value else {
                        errors.push(FieldError::new(
                            format!(
                                "Expected Iterable, but did not find one for field \"{}.{}\".",
                                field.parent_type, field.field_name
                            ),
                            path,
                        ));
                        return Err(Propagate);
                    };
                    let mut completed = Vec::with_capacity(items.len());
                    let mut propagate = false;
                    for (index, item_value) in items.into_iter().enumerate() {
                        let item_path = path.clone().index(index);
                        match self.complete(field, item, item_value, item_path, errors).await {
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
                TypeRef::Named(name) => {
                    let def = self.schema.get_type(name).expect("named type exists");
                    match def.kind {
                        TypeKind::Object => {
                            self.execute_selection(
                                name.to_string(),
                                field.selection_sets.clone(),
                                value,
                                path,
                                errors,
                            )
                            .await
                        }
                        TypeKind::Interface | TypeKind::Union => {
                            let concrete = match &def.type_resolver {
                                Some(resolver) => resolver.resolve(&value),
                                None => value
                                    .get("__typename")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            };
                            let concrete = concrete.filter(|concrete| {
                                self.schema
                                    .possible_types(name)
                                    .iter()
                                    .any(|possible| &**possible == concrete.as_str())
                            });
                            match concrete {
                                Some(concrete) => {
                                    self.execute_selection(
                                        concrete,
                                        field.selection_sets.clone(),
                                        value,
                                        path,
                                        errors,
                                    )
                                    .await
                                }
                                None => {
                                    errors.push(FieldError::new(
                                        format!(
                                            "Abstract type \"{}\" must resolve to an Object type at runtime for field \"{}.{}\".",
                                            name, field.parent_type, field.field_name
                                        ),
                                        path,
                                    ));
                                    Err(Propagate)
                                }
                            }
                        }
                        _ => match &def.serializer {
                            None => Ok(value),
                            Some(serializer) => serializer.serialize(&value).map_err(|error| {
                                errors.push(FieldError::new(error.to_string(), path));
                                Propagate
                            }),
                        },
                    }
                }
            }
        }
        .boxed()
    }
}
