//! # Node Class Registry
//!
//! Maps class names to the plug schema a fresh node of that class carries.
//! The load engine only sees the [`ClassResolver`] seam, so hosts can plug
//! in their own lookup. [`ClassRegistry`] is the shared default: several
//! documents may hold the same `Arc<ClassRegistry>`.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::{BOX_CLASS, PlugSpec};

/// Plugs a node of a given class is born with.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    pub class: String,
    pub plugs: Vec<PlugSpec>,
}

impl NodeSchema {
    pub fn new(class: impl Into<String>) -> Self {
        Self { class: class.into(), plugs: Vec::new() }
    }

    pub fn with_plug(mut self, spec: PlugSpec) -> Self {
        self.plugs.push(spec);
        self
    }

    pub fn plug(&self, name: &str) -> Option<&PlugSpec> {
        self.plugs.iter().find(|p| p.name == name)
    }
}

/// Class lookup used while instantiating definitions.
pub trait ClassResolver: Send + Sync {
    fn resolve(&self, class: &str) -> Option<Arc<NodeSchema>>;
}

/// Thread-safe class registry.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<NodeSchema>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the plugless container class `Box`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(NodeSchema::new(BOX_CLASS));
        registry
    }

    /// Register (or replace) a class. Returns the previous schema.
    pub fn register(&self, schema: NodeSchema) -> Option<Arc<NodeSchema>> {
        self.classes.write().insert(schema.class.clone(), Arc::new(schema))
    }

    pub fn unregister(&self, class: &str) -> Option<Arc<NodeSchema>> {
        self.classes.write().remove(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.read().contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ClassResolver for ClassRegistry {
    fn resolve(&self, class: &str) -> Option<Arc<NodeSchema>> {
        self.classes.read().get(class).cloned()
    }
}
