//! Schema registry consumed by the plan compiler
//!
//! The registry maps `(parent type, field)` pairs to everything the compiler
//! needs to bind a field once: declared type (nullability and list-ness),
//! arguments with their defaults, and an optional resolver whose
//! sync/suspending classification is part of its registration.
//!
//! Registries are immutable once built. Each build receives a fresh
//! generation id; two registries sharing a [`SchemaId`] but not a generation
//! are a reload of the same schema.

pub mod resolver;
pub mod sdl;

pub use resolver::{
    FieldInfo, Resolver, ResolverArgs, ResolverMode, ScalarSerializer, SuspendingResolver,
    TypeResolver,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::SchemaError;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Stable, opaque identity of a schema, used in plan cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId(Arc<str>);

impl SchemaId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Generate a random id for schemas that have no natural name
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of operation, each with its own root type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => f.write_str("query"),
            OperationKind::Mutation => f.write_str("mutation"),
            OperationKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Declared output or input type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(Arc<str>),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// `Name`
    pub fn named(name: impl AsRef<str>) -> Self {
        TypeRef::Named(Arc::from(name.as_ref()))
    }

    /// `Name!`
    pub fn named_nn(name: impl AsRef<str>) -> Self {
        Self::non_null(Self::named(name))
    }

    /// `[inner]`
    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    /// `inner!`
    pub fn non_null(inner: TypeRef) -> Self {
        match inner {
            TypeRef::NonNull(_) => inner,
            other => TypeRef::NonNull(Box::new(other)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        !matches!(self, TypeRef::NonNull(_))
    }

    /// Whether the outermost non-null-stripped type is a list
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::NonNull(inner) => inner.is_list(),
            TypeRef::List(_) => true,
            TypeRef::Named(_) => false,
        }
    }

    /// Name of the type once all list and non-null wrappers are stripped
    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    pub(crate) fn from_ast(ty: &graphql_parser::query::Type<'_, String>) -> Self {
        use graphql_parser::query::Type;
        match ty {
            Type::NamedType(name) => TypeRef::named(name),
            Type::ListType(inner) => TypeRef::list(TypeRef::from_ast(inner)),
            Type::NonNullType(inner) => TypeRef::non_null(TypeRef::from_ast(inner)),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// Category of a named type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Scalar,
    Enum,
    InputObject,
}

impl TypeKind {
    pub fn is_abstract(self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_composite(self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }
}

/// Declared argument of a field
#[derive(Debug, Clone)]
pub struct ArgumentDef {
    pub name: Arc<str>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl ArgumentDef {
    pub fn new(name: impl AsRef<str>, ty: TypeRef) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
            default_value: None,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Declared field of an object or interface type
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Arc<str>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, ArgumentDef>,
    pub resolver: Option<Resolver>,
}

impl FieldDef {
    pub fn new(name: impl AsRef<str>, ty: TypeRef) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            ty,
            arguments: IndexMap::new(),
            resolver: None,
        }
    }

    pub fn argument(mut self, argument: ArgumentDef) -> Self {
        self.arguments.insert(argument.name.to_string(), argument);
        self
    }

    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Classification of the field, `None` when it reads the parent value
    pub fn resolver_mode(&self) -> Option<ResolverMode> {
        self.resolver.as_ref().map(Resolver::mode)
    }
}

/// A named type of the schema
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: Arc<str>,
    pub kind: TypeKind,
    pub fields: IndexMap<String, FieldDef>,
    /// Interfaces implemented by an object or interface type
    pub interfaces: Vec<Arc<str>>,
    /// Member types of a union
    pub members: Vec<Arc<str>>,
    pub serializer: Option<ScalarSerializer>,
    pub type_resolver: Option<TypeResolver>,
}

impl TypeDef {
    fn with_kind(name: impl AsRef<str>, kind: TypeKind) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            kind,
            fields: IndexMap::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            serializer: None,
            type_resolver: None,
        }
    }

    pub fn object(name: impl AsRef<str>) -> Self {
        Self::with_kind(name, TypeKind::Object)
    }

    pub fn interface(name: impl AsRef<str>) -> Self {
        Self::with_kind(name, TypeKind::Interface)
    }

    pub fn union<I, S>(name: impl AsRef<str>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut def = Self::with_kind(name, TypeKind::Union);
        def.members = members
            .into_iter()
            .map(|member| Arc::from(member.as_ref()))
            .collect();
        def
    }

    pub fn scalar(name: impl AsRef<str>) -> Self {
        Self::with_kind(name, TypeKind::Scalar)
    }

    pub fn enumeration(name: impl AsRef<str>) -> Self {
        Self::with_kind(name, TypeKind::Enum)
    }

    pub fn input_object(name: impl AsRef<str>) -> Self {
        Self::with_kind(name, TypeKind::InputObject)
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.to_string(), field);
        self
    }

    pub fn implements(mut self, interface: impl AsRef<str>) -> Self {
        self.interfaces.push(Arc::from(interface.as_ref()));
        self
    }

    pub fn serializer(mut self, serializer: ScalarSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn type_resolver(mut self, resolver: TypeResolver) -> Self {
        self.type_resolver = Some(resolver);
        self
    }
}

/// Builder collecting type definitions before validation
pub struct SchemaBuilder {
    id: SchemaId,
    types: IndexMap<String, TypeDef>,
    roots: HashMap<OperationKind, String>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    pub fn new(id: SchemaId) -> Self {
        let mut types = IndexMap::new();
        for scalar in BUILTIN_SCALARS {
            types.insert(scalar.to_string(), TypeDef::scalar(scalar));
        }
        Self {
            id,
            types,
            roots: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Register a type; built-in scalars may be overridden once
    pub fn register(mut self, def: TypeDef) -> Self {
        let name = def.name.to_string();
        let replaces_builtin = BUILTIN_SCALARS.contains(&name.as_str())
            && self
                .types
                .get(&name)
                .is_some_and(|t| t.serializer.is_none());
        if self.types.contains_key(&name) && !replaces_builtin {
            self.duplicates.push(name);
            return self;
        }
        self.types.insert(name, def);
        self
    }

    pub fn query_root(self, name: impl Into<String>) -> Self {
        self.root(OperationKind::Query, name)
    }

    pub fn mutation_root(self, name: impl Into<String>) -> Self {
        self.root(OperationKind::Mutation, name)
    }

    pub fn subscription_root(self, name: impl Into<String>) -> Self {
        self.root(OperationKind::Subscription, name)
    }

    fn root(mut self, kind: OperationKind, name: impl Into<String>) -> Self {
        self.roots.insert(kind, name.into());
        self
    }

    /// Attach a resolver to an already registered field
    pub fn resolver(
        mut self,
        type_name: &str,
        field: &str,
        resolver: Resolver,
    ) -> Result<Self, SchemaError> {
        let def = self
            .types
            .get_mut(type_name)
            .and_then(|t| t.fields.get_mut(field))
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })?;
        def.resolver = Some(resolver);
        Ok(self)
    }

    /// Attach a serializer to a scalar or enum type
    pub fn serializer(
        mut self,
        type_name: &str,
        serializer: ScalarSerializer,
    ) -> Result<Self, SchemaError> {
        let def = self
            .types
            .get_mut(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: "serializer".to_string(),
            })?;
        def.serializer = Some(serializer);
        Ok(self)
    }

    /// Attach a runtime type lookup to an interface or union
    pub fn type_resolver(
        mut self,
        type_name: &str,
        resolver: TypeResolver,
    ) -> Result<Self, SchemaError> {
        let def = self
            .types
            .get_mut(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
                referenced_by: "type resolver".to_string(),
            })?;
        def.type_resolver = Some(resolver);
        Ok(self)
    }

    /// Validate references and freeze the registry
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(SchemaError::DuplicateType { name });
        }

        let mut roots = self.roots;
        for (kind, default) in [
            (OperationKind::Query, "Query"),
            (OperationKind::Mutation, "Mutation"),
            (OperationKind::Subscription, "Subscription"),
        ] {
            if !roots.contains_key(&kind) && self.types.contains_key(default) {
                roots.insert(kind, default.to_string());
            }
        }
        if !roots.contains_key(&OperationKind::Query) {
            return Err(SchemaError::MissingQueryRoot);
        }
        for name in roots.values() {
            match self.types.get(name) {
                Some(def) if def.kind == TypeKind::Object => {}
                Some(_) => return Err(SchemaError::InvalidRootType { name: name.clone() }),
                None => {
                    return Err(SchemaError::UnknownType {
                        name: name.clone(),
                        referenced_by: "schema".to_string(),
                    });
                }
            }
        }

        for def in self.types.values() {
            for field in def.fields.values() {
                let referenced = field.ty.named_type();
                if !self.types.contains_key(referenced) {
                    return Err(SchemaError::UnknownType {
                        name: referenced.to_string(),
                        referenced_by: format!("{}.{}", def.name, field.name),
                    });
                }
            }
            for name in def.interfaces.iter().chain(def.members.iter()) {
                if !self.types.contains_key(name.as_ref()) {
                    return Err(SchemaError::UnknownType {
                        name: name.to_string(),
                        referenced_by: def.name.to_string(),
                    });
                }
            }
        }

        let mut possible_types: HashMap<String, Vec<Arc<str>>> = HashMap::new();
        for def in self.types.values() {
            match def.kind {
                TypeKind::Union => {
                    possible_types.insert(def.name.to_string(), def.members.clone());
                }
                TypeKind::Object => {
                    for interface in &def.interfaces {
                        possible_types
                            .entry(interface.to_string())
                            .or_default()
                            .push(Arc::clone(&def.name));
                    }
                }
                _ => {}
            }
        }

        Ok(SchemaRegistry {
            id: self.id,
            generation: Uuid::new_v4(),
            types: self.types,
            roots,
            possible_types,
        })
    }
}

/// Immutable schema metadata shared by compiled plans
pub struct SchemaRegistry {
    id: SchemaId,
    generation: Uuid,
    types: IndexMap<String, TypeDef>,
    roots: HashMap<OperationKind, String>,
    possible_types: HashMap<String, Vec<Arc<str>>>,
}

impl SchemaRegistry {
    pub fn builder(id: SchemaId) -> SchemaBuilder {
        SchemaBuilder::new(id)
    }

    pub fn id(&self) -> &SchemaId {
        &self.id
    }

    /// Fresh id assigned by the build that produced this registry
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn field(&self, type_name: &str, field: &str) -> Option<&FieldDef> {
        self.types.get(type_name).and_then(|t| t.fields.get(field))
    }

    pub fn root_type(&self, kind: OperationKind) -> Option<&TypeDef> {
        self.roots.get(&kind).and_then(|name| self.types.get(name))
    }

    /// Object types that can appear where the abstract type is expected
    pub fn possible_types(&self, abstract_type: &str) -> &[Arc<str>] {
        self.possible_types
            .get(abstract_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether a value of object type `object_type` satisfies `condition`
    pub fn type_satisfies(&self, condition: &str, object_type: &str) -> bool {
        condition == object_type
            || self
                .possible_types(condition)
                .iter()
                .any(|t| t.as_ref() == object_type)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("types", &self.types.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog() -> SchemaBuilder {
        SchemaRegistry::builder(SchemaId::new("blog"))
            .register(
                TypeDef::object("Query").field(
                    FieldDef::new(
                        "posts",
                        TypeRef::non_null(TypeRef::list(TypeRef::named_nn("Post"))),
                    )
                    .resolver(Resolver::sync(|_| Ok(json!([])))),
                ),
            )
            .register(
                TypeDef::object("Post")
                    .implements("Node")
                    .field(FieldDef::new("id", TypeRef::named_nn("ID")))
                    .field(FieldDef::new("title", TypeRef::named("String"))),
            )
            .register(
                TypeDef::interface("Node").field(FieldDef::new("id", TypeRef::named_nn("ID"))),
            )
            .register(TypeDef::union("Search", ["Post"]))
    }

    #[test]
    fn test_type_ref_flags_and_display() {
        let ty = TypeRef::non_null(TypeRef::list(TypeRef::named_nn("Post")));
        assert!(!ty.is_nullable());
        assert!(ty.is_list());
        assert_eq!(ty.named_type(), "Post");
        assert_eq!(ty.to_string(), "[Post!]!");
        assert_eq!(TypeRef::non_null(TypeRef::named_nn("A")).to_string(), "A!");
    }

    #[test]
    fn test_build_resolves_roots_and_possible_types() {
        let registry = blog().build().unwrap();

        assert_eq!(
            registry
                .root_type(OperationKind::Query)
                .map(|t| t.name.as_ref()),
            Some("Query")
        );
        assert!(registry.root_type(OperationKind::Mutation).is_none());
        assert!(registry.type_satisfies("Node", "Post"));
        assert!(registry.type_satisfies("Search", "Post"));
        assert!(!registry.type_satisfies("Search", "Query"));
        assert_eq!(
            registry
                .field("Query", "posts")
                .and_then(FieldDef::resolver_mode),
            Some(ResolverMode::Sync)
        );
    }

    #[test]
    fn test_each_build_gets_new_generation() {
        let first = blog().build().unwrap();
        let second = blog().build().unwrap();
        assert_eq!(first.id(), second.id());
        assert_ne!(first.generation(), second.generation());
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        let err = SchemaRegistry::builder(SchemaId::new("broken"))
            .register(TypeDef::object("Query").field(FieldDef::new("me", TypeRef::named("User"))))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                name: "User".to_string(),
                referenced_by: "Query.me".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_query_root() {
        let err = SchemaRegistry::builder(SchemaId::new("empty"))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingQueryRoot);
    }

    #[test]
    fn test_resolver_on_unknown_field() {
        let result = blog().resolver("Post", "body", Resolver::sync(|_| Ok(json!(null))));
        assert!(matches!(result, Err(SchemaError::UnknownField { .. })));
    }

    #[test]
    fn test_duplicate_type() {
        let err = blog()
            .register(TypeDef::object("Post"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateType {
                name: "Post".to_string()
            }
        );
    }
}
