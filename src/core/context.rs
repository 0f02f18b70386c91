//! Per-request context handed to custom resolvers

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Variable values supplied with a request, keyed by variable name
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Typed data shared with every custom resolver of one invocation
///
/// Values are stored by type, so each type can be inserted once. Cloning a
/// context is cheap: the storage is reference counted.
///
/// # Example
///
/// ```rust,ignore
/// struct Database { /* ... */ }
///
/// let context = Context::new().with_data(Database::connect()?);
///
/// // inside a resolver
/// let db = args.context.data::<Database>().ok_or_else(|| anyhow!("no database"))?;
/// ```
#[derive(Clone, Default)]
pub struct Context {
    data: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous value of the same type
    pub fn with_data<T: Any + Send + Sync>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.data).insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    /// Borrow the value of type `T`, if one was stored
    pub fn data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| value.as_ref().downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Viewer(&'static str);

    #[test]
    fn test_typed_lookup() {
        let context = Context::new().with_data(Viewer("alice")).with_data(42u32);

        assert_eq!(context.data::<Viewer>(), Some(&Viewer("alice")));
        assert_eq!(context.data::<u32>(), Some(&42));
        assert!(context.data::<String>().is_none());
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_clone_shares_storage() {
        let context = Context::new().with_data(Viewer("bob"));
        let cloned = context.clone();
        let extended = cloned.with_data(7i64);

        assert!(context.data::<i64>().is_none());
        assert_eq!(extended.data::<Viewer>(), Some(&Viewer("bob")));
    }
}
