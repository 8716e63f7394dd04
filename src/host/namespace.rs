//! Namespace snapshots: the binding tree the collector walks

use crate::runtime::Value;
use serde::{Deserialize, Serialize};

/// Storage cell behind a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell", rename_all = "snake_case")]
pub enum Cell {
    /// Mutable single-value container (`Ref`-like)
    Ref {
        /// Current contents
        value: Value,
    },
    /// Constant binding
    Constant {
        /// Bound value
        value: Value,
    },
    /// Untyped global variable
    Global {
        /// Current value
        value: Value,
    },
}

/// One named binding in a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Binding name
    pub name: String,
    /// Runtime address of the storage cell
    pub address: u64,
    /// What the binding holds
    #[serde(flatten)]
    pub cell: Cell,
    /// Imported or re-exported from another namespace
    #[serde(default)]
    pub imported: bool,
}

impl Binding {
    /// Compiler-generated names (closures, gensyms) start with `#`
    pub fn is_compiler_internal(&self) -> bool {
        self.name.starts_with('#')
    }
}

/// A namespace with its bindings and nested namespaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name (last path component)
    pub name: String,
    /// Bindings defined here
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// Nested namespaces
    #[serde(default)]
    pub children: Vec<Namespace>,
}

impl Namespace {
    /// Empty namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: add a binding
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Builder: add a nested namespace
    pub fn with_child(mut self, child: Namespace) -> Self {
        self.children.push(child);
        self
    }
}
