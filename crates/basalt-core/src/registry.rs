//! Operator registry for dynamic dispatch.

use crate::operator::Operator;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory producing a fresh, uninitialized operator.
pub type OperatorFactory = Arc<dyn Fn() -> Box<dyn Operator> + Send + Sync>;

/// Registry of operator factories.
///
/// Maps operation type names (e.g., "Add", "MatMul") to factories creating
/// their `Operator` implementations. The registry is filled once at runtime
/// start-up and only read afterwards, so graph builds can share it freely.
///
/// # Example
///
/// ```ignore
/// let mut registry = OperatorRegistry::new();
/// registry.register("Neg", || Box::new(UnaryOperator::new(UnaryKind::Neg)));
///
/// let factory = registry.find("Neg").unwrap();
/// let mut op = factory();
/// ```
pub struct OperatorRegistry {
    /// Map from op_type string to operator factory.
    factories: HashMap<String, OperatorFactory>,
}

impl OperatorRegistry {
    /// Create a new empty operator registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an operator factory.
    ///
    /// Returns `false` and leaves the existing entry in place if `name` is
    /// already registered.
    pub fn register<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            tracing::warn!(op_type = name, "operator already registered, ignoring");
            return false;
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
        true
    }

    /// Look up an operator factory by name.
    pub fn find(&self, name: &str) -> Option<&OperatorFactory> {
        self.factories.get(name)
    }

    /// Check if an operator is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Get the number of registered operators.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Iterate over all registered operator names.
    pub fn operator_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.operator_names().collect();
        names.sort_unstable();
        f.debug_struct("OperatorRegistry")
            .field("operators", &names)
            .finish()
    }
}
