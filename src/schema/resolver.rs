//! Resolver descriptors registered on schema fields
//!
//! A resolver is declared either synchronous or suspending when it is
//! registered. That declaration is the only thing the compiler looks at when
//! classifying a field; the callable itself is never probed.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::core::context::{Context, Variables};

/// Execution classification of a resolver, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverMode {
    /// Returns its value without yielding to the runtime
    Sync,
    /// Returns a future that may suspend
    Suspending,
}

impl fmt::Display for ResolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverMode::Sync => f.write_str("sync"),
            ResolverMode::Suspending => f.write_str("suspending"),
        }
    }
}

/// Static description of the field being resolved
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub parent_type: Arc<str>,
    pub field_name: Arc<str>,
}

/// Everything a custom resolver receives
#[derive(Debug, Clone)]
pub struct ResolverArgs {
    /// The value the parent step produced
    pub parent: Value,

    /// Materialized arguments in schema declaration order
    pub arguments: Variables,

    /// Request context
    pub context: Context,

    /// Field being resolved
    pub field: FieldInfo,
}

impl ResolverArgs {
    /// Get a raw argument value
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Deserialize an argument into a concrete type
    pub fn arg_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.arguments.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

/// Trait for resolvers that suspend
///
/// Implement this for struct-based resolvers holding their own state (a
/// client, a loader). Closures can be registered with
/// [`Resolver::suspending`] instead.
#[async_trait]
pub trait SuspendingResolver: Send + Sync {
    async fn resolve(&self, args: ResolverArgs) -> Result<Value>;
}

struct FnResolver<F>(F);

#[async_trait]
impl<F, Fut> SuspendingResolver for FnResolver<F>
where
    F: Fn(ResolverArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn resolve(&self, args: ResolverArgs) -> Result<Value> {
        (self.0)(args).await
    }
}

pub(crate) type SyncResolveFn = dyn Fn(ResolverArgs) -> Result<Value> + Send + Sync;

/// A resolver attached to a schema field
///
/// The variant is the compile-time classification of the field.
#[derive(Clone)]
pub enum Resolver {
    Sync(Arc<SyncResolveFn>),
    Suspending(Arc<dyn SuspendingResolver>),
}

impl Resolver {
    /// Register a synchronous closure
    pub fn sync<F>(resolve: F) -> Self
    where
        F: Fn(ResolverArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Resolver::Sync(Arc::new(resolve))
    }

    /// Register a closure returning a future
    pub fn suspending<F, Fut>(resolve: F) -> Self
    where
        F: Fn(ResolverArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Resolver::Suspending(Arc::new(FnResolver(resolve)))
    }

    /// Register a struct implementing [`SuspendingResolver`]
    pub fn from_suspending<R: SuspendingResolver + 'static>(resolver: R) -> Self {
        Resolver::Suspending(Arc::new(resolver))
    }

    pub fn mode(&self) -> ResolverMode {
        match self {
            Resolver::Sync(_) => ResolverMode::Sync,
            Resolver::Suspending(_) => ResolverMode::Suspending,
        }
    }

    /// Call the resolver regardless of its mode
    ///
    /// Used by callers that interpret a schema directly; compiled plans bind
    /// the concrete variant once instead.
    pub fn call(&self, args: ResolverArgs) -> BoxFuture<'static, Result<Value>> {
        match self {
            Resolver::Sync(resolve) => {
                let outcome = resolve(args);
                Box::pin(async move { outcome })
            }
            Resolver::Suspending(resolver) => {
                let resolver = Arc::clone(resolver);
                Box::pin(async move { resolver.resolve(args).await })
            }
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver({})", self.mode())
    }
}

/// Output conversion for a custom scalar or enum type
#[derive(Clone)]
pub struct ScalarSerializer(Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>);

impl ScalarSerializer {
    pub fn new<F>(serialize: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(serialize))
    }

    pub fn serialize(&self, value: &Value) -> Result<Value> {
        (self.0)(value)
    }
}

impl fmt::Debug for ScalarSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScalarSerializer")
    }
}

/// Runtime type lookup for an interface or union
///
/// Returns the concrete object type name of a value. Without one, the
/// `__typename` property of the value is used.
#[derive(Clone)]
pub struct TypeResolver(Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>);

impl TypeResolver {
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    pub fn resolve(&self, value: &Value) -> Option<String> {
        (self.0)(value)
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TypeResolver")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(arguments: Value) -> ResolverArgs {
        ResolverArgs {
            parent: json!({ "id": "1" }),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
            context: Context::new(),
            field: FieldInfo {
                parent_type: Arc::from("Query"),
                field_name: Arc::from("post"),
            },
        }
    }

    #[test]
    fn test_mode_follows_constructor() {
        let sync = Resolver::sync(|_| Ok(json!(1)));
        let suspending = Resolver::suspending(|_| async { Ok(json!(1)) });

        assert_eq!(sync.mode(), ResolverMode::Sync);
        assert_eq!(suspending.mode(), ResolverMode::Suspending);
        assert_eq!(format!("{:?}", suspending), "Resolver(suspending)");
    }

    #[tokio::test]
    async fn test_call_runs_both_variants() {
        let sync = Resolver::sync(|args| Ok(args.parent["id"].clone()));
        let suspending = Resolver::suspending(|args| async move {
            Ok(json!(format!("post-{}", args.parent["id"].as_str().unwrap_or_default())))
        });

        assert_eq!(sync.call(args(json!({}))).await.unwrap(), json!("1"));
        assert_eq!(
            suspending.call(args(json!({}))).await.unwrap(),
            json!("post-1")
        );
    }

    #[test]
    fn test_arg_as_deserializes() {
        let args = args(json!({ "limit": 5, "filter": null }));
        assert_eq!(args.arg_as::<i64>("limit").unwrap(), Some(5));
        assert_eq!(args.arg_as::<i64>("filter").unwrap(), None);
        assert_eq!(args.arg_as::<i64>("missing").unwrap(), None);
        assert!(args.arg_as::<String>("limit").is_err());
    }
}
