//! # Host runtime interfaces
//!
//! The pipeline never talks to the JIT directly. Function discovery,
//! compilation and IR emission go through [`HostCompiler`]; symbol naming
//! goes through [`Mangler`]. Functions are identified by interned
//! [`FunctionHandle`]s, so two distinct methods that share a display name
//! never collide.

pub mod namespace;
pub mod recorded;

pub use namespace::{Binding, Cell, Namespace};
pub use recorded::{RecordedFunction, RecordedHost, Recording};

use crate::ir::symbols::sanitize_identifier;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Path of a namespace from the root, e.g. `Main.Physics`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespacePath(pub Vec<String>);

impl NamespacePath {
    /// Path from dotted text
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Path of a nested namespace
    pub fn child(&self, name: &str) -> Self {
        let mut parts = self.0.clone();
        parts.push(name.to_string());
        Self(parts)
    }

    /// Path components
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Opaque, interned identity of one compiled method signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionHandle(pub u32);

/// What the host knows about a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Display name
    pub name: String,
    /// Owning namespace
    pub namespace: NamespacePath,
    /// Argument types of this signature
    pub argument_types: Vec<String>,
}

/// Interner mapping function signatures to handles
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    infos: Vec<FunctionInfo>,
    index: HashMap<FunctionInfo, FunctionHandle>,
}

impl FunctionTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for a signature, allocating one on first sight
    pub fn intern(&mut self, info: FunctionInfo) -> FunctionHandle {
        if let Some(&handle) = self.index.get(&info) {
            return handle;
        }
        let handle = FunctionHandle(self.infos.len() as u32);
        self.infos.push(info.clone());
        self.index.insert(info, handle);
        handle
    }

    /// Signature behind a handle
    pub fn get(&self, handle: FunctionHandle) -> Option<&FunctionInfo> {
        self.infos.get(handle.0 as usize)
    }

    /// Number of interned signatures
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True if nothing was interned
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// The host runtime's compiler
pub trait HostCompiler {
    /// Name, namespace and signature of a function
    fn describe(&self, function: FunctionHandle) -> Result<FunctionInfo>;

    /// Functions embedded in the compiled function's constant pool
    fn callees(&self, function: FunctionHandle) -> Result<Vec<FunctionHandle>>;

    /// Force ahead-of-time compilation if the function was never compiled
    fn ensure_compiled(&mut self, function: FunctionHandle) -> Result<()>;

    /// Full IR dump for one compiled function
    fn emit_ir(&self, function: FunctionHandle) -> Result<String>;
}

/// Symbol naming service
pub trait Mangler {
    /// Symbol for `name` defined in `namespace`
    fn mangle(&self, name: &str, namespace: &NamespacePath) -> String;

    /// Symbol naming the namespace itself (used for its globals file)
    fn mangle_namespace(&self, namespace: &NamespacePath) -> String {
        namespace
            .parts()
            .iter()
            .map(|part| sanitize_identifier(part))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Joins namespace components and the name with underscores
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatMangler;

impl Mangler for FlatMangler {
    fn mangle(&self, name: &str, namespace: &NamespacePath) -> String {
        let prefix = self.mangle_namespace(namespace);
        let name = sanitize_identifier(name);
        if prefix.is_empty() {
            name
        } else {
            format!("{}_{}", prefix, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, args: &[&str]) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            namespace: NamespacePath::parse("Main"),
            argument_types: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_interning_is_by_signature() {
        let mut table = FunctionTable::new();
        let a = table.intern(info("f", &["Int64"]));
        let b = table.intern(info("f", &["Float64"]));
        let c = table.intern(info("f", &["Int64"]));
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b).unwrap().argument_types, vec!["Float64"]);
    }

    #[test]
    fn test_flat_mangler() {
        let ns = NamespacePath::parse("Main.Physics");
        assert_eq!(FlatMangler.mangle("step!", &ns), "Main_Physics_step_");
        assert_eq!(FlatMangler.mangle_namespace(&ns), "Main_Physics");
        assert_eq!(ns.to_string(), "Main.Physics");
    }
}
