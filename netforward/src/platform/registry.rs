//! Global dialect registry for looking up dialects by name.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use super::dialect::Dialect;
use super::vendors;
use crate::error::DialectError;

/// Global dialect registry.
static REGISTRY: Lazy<RwLock<DialectRegistry>> = Lazy::new(|| {
    let mut registry = DialectRegistry::new();
    registry.register_builtin_dialects();
    RwLock::new(registry)
});

/// Registry of named dialects.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Dialect>,
}

impl DialectRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<DialectRegistry> {
        &REGISTRY
    }

    fn register_builtin_dialects(&mut self) {
        for dialect in [
            vendors::generic::dialect(),
            vendors::linux::dialect(),
            vendors::ruijie::dialect(),
            vendors::maipu::dialect(),
        ] {
            self.dialects.insert(dialect.name.clone(), dialect);
        }
    }

    /// Register a dialect. Names must be unique.
    pub fn register(&mut self, dialect: Dialect) -> Result<(), DialectError> {
        if self.dialects.contains_key(&dialect.name) {
            return Err(DialectError::AlreadyRegistered {
                name: dialect.name.clone(),
            });
        }
        self.dialects.insert(dialect.name.clone(), dialect);
        Ok(())
    }

    /// Get a dialect by name.
    pub fn get(&self, name: &str) -> Option<&Dialect> {
        self.dialects.get(name)
    }

    /// Check if a dialect is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.dialects.contains_key(name)
    }

    /// List all registered dialect names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.dialects.keys()
    }

    /// Look a dialect up in the global registry.
    pub fn lookup(name: &str) -> Result<Dialect, DialectError> {
        let registry = REGISTRY.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| DialectError::UnknownDialect {
                name: name.to_string(),
            })
    }

    /// Register a dialect in the global registry.
    pub fn register_global(dialect: Dialect) -> Result<(), DialectError> {
        let mut registry = REGISTRY.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.register(dialect)
    }
}
