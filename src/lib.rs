//! # This-JIT
//!
//! Compile-once GraphQL execution plans.
//!
//! A query is parsed, its fragments expanded and its fields bound to their
//! resolvers exactly once. The resulting [`CompiledPlan`](compiler::CompiledPlan)
//! is cached and invoked directly for every later request with the same
//! normalized text.
//!
//! ## Features
//!
//! - **Compile-Time Binding**: fields without a resolver read the parent value directly
//! - **Sync/Suspending Classification**: fixed at registration, never probed per call
//! - **Fan-Out**: suspending siblings run together, fully sync plans never create a future
//! - **Directive Folding**: literal `@skip`/`@include` remove fields from the plan
//! - **Null Propagation**: errors bubble to the nearest nullable field with their path
//! - **Plan Cache**: LRU with optional TTL, keyed by schema id and normalized text,
//!   behind a [`PlanStore`](cache::PlanStore) trait with a no-op variant
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jit::prelude::*;
//! use serde_json::json;
//!
//! let registry = SchemaBuilder::from_sdl(SchemaId::new("blog"), r#"
//!     type Query { posts: [Post!]! }
//!     type Post { id: ID!  title: String! }
//! "#)?
//! .resolver("Query", "posts", Resolver::suspending(|_| async {
//!     Ok(json!([{ "id": "1", "title": "Post 1" }]))
//! }))?
//! .build()?;
//!
//! let executor = JitExecutor::new(registry);
//! let result = executor.execute(Request::new("{ posts { id title } }")).await?;
//! assert_eq!(result.data, json!({ "posts": [{ "id": "1", "title": "Post 1" }] }));
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod core;
pub mod executor;
pub mod runtime;
pub mod schema;
pub mod telemetry;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Schema ===
    pub use crate::schema::{
        ArgumentDef, FieldDef, FieldInfo, OperationKind, Resolver, ResolverArgs, ResolverMode,
        ScalarSerializer, SchemaBuilder, SchemaId, SchemaRegistry, SuspendingResolver, TypeDef,
        TypeKind, TypeRef, TypeResolver,
    };

    // === Compiler ===
    pub use crate::compiler::{
        BindingKind, CompiledPlan, Condition, PlanBuilder, ResolverBinding, Step, compile_query,
    };

    // === Runtime ===
    pub use crate::core::{Context, Variables};
    pub use crate::runtime::ExecutionResult;

    // === Cache ===
    pub use crate::cache::{
        CacheEntry, CacheKey, CacheStats, Lookup, NoopPlanStore, PlanCache, PlanStore,
    };

    // === Executor ===
    pub use crate::executor::{JitExecutor, Request};

    // === Errors ===
    pub use crate::core::{
        CompileError, FieldError, JitError, PathSegment, ResponsePath, SchemaError,
    };

    // === Config ===
    pub use crate::config::{CacheConfig, ExecutionConfig, JitConfig};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
}
