//! Executor facade: parse, cache, compile and invoke in one call
//!
//! ```rust,ignore
//! let executor = JitExecutor::with_config(registry, JitConfig::from_yaml_file("jit.yaml")?)?;
//!
//! let result = executor
//!     .execute(Request::new("query Feed($n: Int) { posts(limit: $n) { id title } }")
//!         .variables(json!({ "n": 10 }))
//!         .context(Context::new().with_data(db)))
//!     .await?;
//! ```

use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::cache::{CacheKey, CacheStats, Lookup, NoopPlanStore, PlanCache, PlanStore};
use crate::compiler::{CompiledPlan, OperationDocument, PlanBuilder};
use crate::config::JitConfig;
use crate::core::context::{Context, Variables};
use crate::core::error::{FieldError, JitError};
use crate::runtime::ExecutionResult;
use crate::schema::SchemaRegistry;

/// One GraphQL request
#[derive(Debug, Clone)]
pub struct Request {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
    /// Value handed to root resolvers as their parent
    pub root: Value,
    pub context: Context,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Variables::new(),
            root: Value::Object(Default::default()),
            context: Context::new(),
        }
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set variables from a JSON object; other values are ignored
    pub fn variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = map;
        }
        self
    }

    pub fn root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// Owns a schema registry, a plan store and configuration
pub struct JitExecutor {
    registry: RwLock<Arc<SchemaRegistry>>,
    cache: Arc<dyn PlanStore>,
    config: JitConfig,
}

impl JitExecutor {
    /// Create an executor with the default configuration
    pub fn new(registry: SchemaRegistry) -> Self {
        let config = JitConfig::default();
        Self::with_cache(
            registry,
            Arc::new(PlanCache::from_config(&config.cache)),
            config,
        )
    }

    /// Create an executor with its own store built from `config`
    pub fn with_config(registry: SchemaRegistry, config: JitConfig) -> Result<Self, JitError> {
        config.validate()?;
        if !config.cache.enabled {
            return Ok(Self::with_cache(registry, Arc::new(NoopPlanStore::new()), config));
        }
        let cache = Arc::new(PlanCache::from_config(&config.cache));
        Ok(Self::with_cache(registry, cache, config))
    }

    /// Create an executor sharing an existing store
    pub fn with_cache<S>(registry: SchemaRegistry, cache: Arc<S>, config: JitConfig) -> Self
    where
        S: PlanStore + 'static,
    {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            cache,
            config,
        }
    }

    /// Current schema registry
    pub fn registry(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn cache(&self) -> &Arc<dyn PlanStore> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Swap in a rebuilt registry
    ///
    /// Cached plans are kept. Each is checked against the new registry the
    /// next time it is requested.
    pub fn reload_schema(&self, registry: SchemaRegistry) {
        tracing::info!(
            schema = %registry.id(),
            generation = %registry.generation(),
            "schema reloaded"
        );
        let mut current = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(registry);
    }

    /// Compile without touching the cache
    pub fn compile(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<CompiledPlan, JitError> {
        PlanBuilder::new(&self.registry()).compile(query, operation_name)
    }

    /// Fetch the cached plan for a query, compiling and caching it on a miss
    ///
    /// A cached plan built against an older registry generation is rebuilt,
    /// unless one of its resolvers switched between sync and suspending: that
    /// entry is dropped and the request fails with
    /// [`crate::core::error::CompileError::ResolverModeChanged`].
    pub fn prepare(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<Arc<CompiledPlan>, JitError> {
        let registry = self.registry();
        let document = OperationDocument::parse(query)?;
        let key = CacheKey::from_normalized(registry.id(), document.normalized(), operation_name);

        match self.cache.lookup(&key, registry.generation()) {
            Lookup::Hit(plan) => return Ok(plan),
            Lookup::Stale(plan) => {
                if let Err(err) = plan.verify_bindings(&registry) {
                    self.cache.remove(&key);
                    tracing::warn!(key = %key, error = %err, "dropping stale plan");
                    return Err(err.into());
                }
                tracing::debug!(key = %key, "recompiling plan for new schema generation");
            }
            Lookup::Miss => {}
        }

        let started = Instant::now();
        let plan = Arc::new(PlanBuilder::new(&registry).build(&document, operation_name)?);
        let elapsed = started.elapsed();
        self.cache.record_compilation(elapsed);
        tracing::debug!(
            key = %key,
            elapsed_us = elapsed.as_micros() as u64,
            "plan compiled"
        );

        self.cache.put_by_key(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Run a request
    ///
    /// Field errors are part of the returned result; `Err` means no plan
    /// could be produced.
    pub async fn execute(&self, request: Request) -> Result<ExecutionResult, JitError> {
        let plan = self.prepare(&request.query, request.operation_name.as_deref())?;
        let invocation = plan.invoke_with(
            &request.root,
            &request.context,
            &request.variables,
            self.config.execution.parallel,
        );

        let Some(timeout) = self.config.execution.timeout() else {
            return Ok(invocation.await);
        };
        match tokio::time::timeout(timeout, invocation).await {
            Ok(result) => Ok(result),
            Err(_) => {
                tracing::warn!(
                    operation = plan.operation_name().unwrap_or("<anonymous>"),
                    timeout_ms = timeout.as_millis() as u64,
                    "invocation timed out"
                );
                Ok(ExecutionResult::from_error(FieldError::request(format!(
                    "Execution cancelled: timed out after {}ms",
                    timeout.as_millis()
                ))))
            }
        }
    }

    /// Run a request whose plan never suspends, blocking the caller
    pub fn execute_sync(&self, request: Request) -> Result<ExecutionResult, JitError> {
        let plan = self.prepare(&request.query, request.operation_name.as_deref())?;
        plan.invoke_sync(&request.root, &request.context, &request.variables)
    }
}

impl std::fmt::Debug for JitExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitExecutor")
            .field("registry", &self.registry())
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}
