//! Typed error handling for the plan compiler and executor
//!
//! This module provides the error hierarchy that lets callers tell apart
//! failures that prevent a plan from existing from failures that happen while
//! a plan runs.
//!
//! # Error Categories
//!
//! - [`CompileError`]: the operation cannot be turned into a plan (fatal, never cached)
//! - [`SchemaError`]: the schema registry could not be built (returned by the builder)
//! - [`FieldError`]: a resolver failed during invocation (captured, never fatal)
//! - [`JitError`]: umbrella type returned by the executor facade
//!
//! # Example
//!
//! ```rust,ignore
//! use jit::prelude::*;
//!
//! match executor.execute(Request::new("{ posts { id } }")).await {
//!     Ok(result) if result.errors.is_empty() => println!("{}", result.data),
//!     Ok(result) => eprintln!("partial result, {} errors", result.errors.len()),
//!     Err(JitError::Compile(CompileError::UnknownFragment { name })) => {
//!         eprintln!("fragment {} is not defined", name);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::core::path::ResponsePath;
use crate::schema::{OperationKind, ResolverMode};

/// The main error type returned by the executor facade
#[derive(Debug, Error)]
pub enum JitError {
    /// The query text is not valid GraphQL
    #[error("GraphQL parse error: {message}")]
    Parse { message: String },

    /// The operation could not be compiled into a plan
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A plan with suspending resolvers was invoked through the blocking entry point
    #[error(
        "Plan for {operation} contains suspending resolvers and must be invoked asynchronously"
    )]
    RequiresAsync { operation: String },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl JitError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            JitError::Parse { .. } => "GRAPHQL_PARSE_ERROR",
            JitError::Compile(e) => e.error_code(),
            JitError::RequiresAsync { .. } => "REQUIRES_ASYNC",
            JitError::Config { .. } => "CONFIG_ERROR",
        }
    }
}

// =============================================================================
// Compile Errors
// =============================================================================

/// Errors raised while building a plan
///
/// These are fatal: no plan is returned and nothing is stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The document contains no operation definition
    #[error("No operation found in document")]
    NoOperation,

    /// The requested operation name does not exist in the document
    #[error("Unknown operation named '{name}'")]
    OperationNotFound { name: String },

    /// The operation kind is not executed by this engine
    #[error("{kind} operations are not supported")]
    UnsupportedOperation { kind: OperationKind },

    /// The schema has no root type for the operation kind
    #[error("Schema does not define a root type for {kind} operations")]
    MissingRootType { kind: OperationKind },

    /// A type named in the operation is not part of the schema
    #[error("Unknown type '{name}'")]
    UnknownType { name: String },

    /// A selected field is not declared on its parent type
    #[error("Cannot query field '{field}' on type '{type_name}'")]
    UnknownField { type_name: String, field: String },

    /// A fragment spread names a fragment that is not defined
    #[error("Unknown fragment '{name}'")]
    UnknownFragment { name: String },

    /// A fragment spreads itself, directly or through other fragments
    #[error("Cannot spread fragment '{name}' within itself")]
    FragmentCycle { name: String },

    /// An interface or union has no object type that can satisfy it
    #[error("Abstract type '{name}' has no possible object types")]
    NoPossibleTypes { name: String },

    /// A resolver changed classification after the plan was compiled
    #[error(
        "Resolver for '{type_name}.{field}' was compiled as {compiled} but the schema now declares it {current}"
    )]
    ResolverModeChanged {
        type_name: String,
        field: String,
        compiled: ResolverMode,
        current: ResolverMode,
    },
}

impl CompileError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CompileError::NoOperation | CompileError::OperationNotFound { .. } => {
                "GRAPHQL_INVALID_OPERATION"
            }
            CompileError::UnsupportedOperation { .. } => "GRAPHQL_UNSUPPORTED_OPERATION",
            CompileError::MissingRootType { .. } | CompileError::UnknownType { .. } => {
                "GRAPHQL_UNKNOWN_TYPE"
            }
            CompileError::UnknownField { .. } => "GRAPHQL_UNKNOWN_FIELD",
            CompileError::UnknownFragment { .. } | CompileError::FragmentCycle { .. } => {
                "GRAPHQL_INVALID_FRAGMENT"
            }
            CompileError::NoPossibleTypes { .. } => "GRAPHQL_ABSTRACT_TYPE",
            CompileError::ResolverModeChanged { .. } => "GRAPHQL_STALE_PLAN",
        }
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors raised while building a [`crate::schema::SchemaRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The SDL source could not be parsed
    #[error("Failed to parse schema: {message}")]
    Parse { message: String },

    /// A type is registered twice
    #[error("Type '{name}' is defined more than once")]
    DuplicateType { name: String },

    /// A type reference points at nothing
    #[error("Type '{name}' referenced by '{referenced_by}' is not defined")]
    UnknownType { name: String, referenced_by: String },

    /// The schema has no query root
    #[error("Schema has no query root type")]
    MissingQueryRoot,

    /// A root operation type is not an object type
    #[error("Root type '{name}' must be an object type")]
    InvalidRootType { name: String },

    /// A resolver was attached to a field that does not exist
    #[error("Cannot attach resolver: field '{type_name}.{field}' is not defined")]
    UnknownField { type_name: String, field: String },
}

// =============================================================================
// Field Errors
// =============================================================================

/// A resolver failure captured during plan invocation
///
/// Field errors never abort the invocation. They are collected into the
/// result's error list in declaration order, each carrying the response path
/// of the field that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Human-readable error message
    pub message: String,

    /// Response keys and list indices leading to the failed field
    #[serde(skip_serializing_if = "ResponsePath::is_empty")]
    pub path: ResponsePath,
}

impl FieldError {
    /// Create an error located at the given response path
    pub fn new(message: impl Into<String>, path: ResponsePath) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }

    /// Create an error that belongs to the whole request rather than a field
    pub fn request(message: impl Into<String>) -> Self {
        Self::new(message, ResponsePath::default())
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (at {})", self.message, self.path)
        }
    }
}
