//! Build a schema from SDL text
//!
//! SDL declares types, fields, arguments and defaults. Resolvers, scalar
//! serializers and type resolvers are attached afterwards through the
//! [`SchemaBuilder`] methods, since SDL cannot express them.
//!
//! ```rust,ignore
//! let registry = SchemaBuilder::from_sdl(SchemaId::new("blog"), r#"
//!     type Query { posts: [Post!]! }
//!     type Post { id: ID!  title: String! }
//! "#)?
//! .resolver("Query", "posts", Resolver::sync(|_| Ok(json!([]))))?
//! .build()?;
//! ```

use anyhow::{Context as _, Result};
use graphql_parser::schema::{self, Definition, TypeDefinition};
use std::path::Path;

use super::{ArgumentDef, FieldDef, SchemaBuilder, SchemaId, TypeDef, TypeRef};
use crate::compiler::operation::const_to_json;
use crate::core::error::SchemaError;

impl SchemaBuilder {
    /// Parse SDL into a builder
    pub fn from_sdl(id: SchemaId, sdl: &str) -> Result<Self, SchemaError> {
        let document = schema::parse_schema::<String>(sdl).map_err(|e| SchemaError::Parse {
            message: e.to_string(),
        })?;

        let mut builder = SchemaBuilder::new(id);
        for definition in &document.definitions {
            match definition {
                Definition::SchemaDefinition(def) => {
                    if let Some(name) = &def.query {
                        builder = builder.query_root(name.clone());
                    }
                    if let Some(name) = &def.mutation {
                        builder = builder.mutation_root(name.clone());
                    }
                    if let Some(name) = &def.subscription {
                        builder = builder.subscription_root(name.clone());
                    }
                }
                Definition::TypeDefinition(def) => {
                    builder = builder.register(convert_type(def));
                }
                Definition::TypeExtension(_) | Definition::DirectiveDefinition(_) => {
                    tracing::debug!("ignoring SDL extension or directive definition");
                }
            }
        }
        Ok(builder)
    }

    /// Read and parse an SDL file
    pub fn from_sdl_file<P: AsRef<Path>>(id: SchemaId, path: P) -> Result<Self> {
        let path = path.as_ref();
        let sdl = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file {}", path.display()))?;
        Ok(Self::from_sdl(id, &sdl)?)
    }
}

fn convert_type(def: &TypeDefinition<'_, String>) -> TypeDef {
    match def {
        TypeDefinition::Scalar(scalar) => TypeDef::scalar(&scalar.name),
        TypeDefinition::Object(object) => {
            let mut ty = TypeDef::object(&object.name);
            for interface in &object.implements_interfaces {
                ty = ty.implements(interface);
            }
            object
                .fields
                .iter()
                .fold(ty, |ty, field| ty.field(convert_field(field)))
        }
        TypeDefinition::Interface(interface) => {
            let mut ty = TypeDef::interface(&interface.name);
            for parent in &interface.implements_interfaces {
                ty = ty.implements(parent);
            }
            interface
                .fields
                .iter()
                .fold(ty, |ty, field| ty.field(convert_field(field)))
        }
        TypeDefinition::Union(union) => TypeDef::union(&union.name, &union.types),
        TypeDefinition::Enum(enumeration) => TypeDef::enumeration(&enumeration.name),
        TypeDefinition::InputObject(input) => TypeDef::input_object(&input.name),
    }
}

fn convert_field(field: &schema::Field<'_, String>) -> FieldDef {
    field.arguments.iter().fold(
        FieldDef::new(&field.name, TypeRef::from_ast(&field.field_type)),
        |def, arg| {
            let mut argument = ArgumentDef::new(&arg.name, TypeRef::from_ast(&arg.value_type));
            if let Some(default) = &arg.default_value {
                argument = argument.default_value(const_to_json(default));
            }
            def.argument(argument)
        },
    )
}
