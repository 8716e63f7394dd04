//! Global binding discovery

use super::encode::encode_scalar_or_aggregate;
use crate::host::{Cell, Mangler, Namespace, NamespacePath};
use crate::runtime::Value;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// An externally visible storage location seeded from a runtime value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalBinding {
    /// Runtime address of the storage cell at discovery time
    pub address: u64,
    /// Name within the owning namespace
    pub identifier: String,
    /// Namespace owning the binding
    pub owning_namespace: NamespacePath,
    /// Symbol used in the output
    pub mangled_name: String,
    /// `@sym = global ...`
    pub ir_definition: String,
    /// `@sym = external global ...`
    pub ir_declaration: String,
}

impl GlobalBinding {
    /// Encode `value` as a binding named `identifier` in `namespace`
    pub fn new(
        address: u64,
        identifier: &str,
        namespace: &NamespacePath,
        value: &Value,
        mangler: &dyn Mangler,
    ) -> Result<Self> {
        let mangled_name = mangler.mangle(identifier, namespace);
        let (ir_definition, ir_declaration) =
            encode_scalar_or_aggregate(&mangled_name, value).map_err(|err| match err {
                Error::UnsupportedValueType { type_name, .. } => Error::UnsupportedValueType {
                    identifier: format!("{}.{}", namespace, identifier),
                    type_name,
                },
                other => other,
            })?;
        Ok(Self {
            address,
            identifier: identifier.to_string(),
            owning_namespace: namespace.clone(),
            mangled_name,
            ir_definition,
            ir_declaration,
        })
    }

    /// The binding's symbol as it appears in IR
    pub fn symbol(&self) -> String {
        crate::ir::symbols::global_symbol(&self.mangled_name)
    }
}

/// Result of a binding scan
#[derive(Debug, Default)]
pub struct BindingScan {
    /// Qualifying bindings keyed by runtime address
    pub bindings: BTreeMap<u64, GlobalBinding>,
    /// Qualifying bindings whose value could not be encoded
    pub rejected: Vec<Error>,
}

/// Walk `root` and every nested namespace, collecting the mutable cells
/// that can become static globals.
///
/// Imported names, compiler-internal names, non-`Ref` cells and cells holding
/// functions, types or strings are skipped.
pub fn collect_bindings(root: &Namespace, mangler: &dyn Mangler) -> BindingScan {
    let mut scan = BindingScan::default();
    let path = NamespacePath(vec![root.name.clone()]);
    visit(root, &path, mangler, &mut scan);
    tracing::debug!(
        "collected {} bindings under {} ({} rejected)",
        scan.bindings.len(),
        root.name,
        scan.rejected.len()
    );
    scan
}

fn visit(namespace: &Namespace, path: &NamespacePath, mangler: &dyn Mangler, scan: &mut BindingScan) {
    for binding in &namespace.bindings {
        if binding.imported || binding.is_compiler_internal() {
            continue;
        }
        let Cell::Ref { value } = &binding.cell else {
            continue;
        };
        if !value.is_externalizable() {
            continue;
        }

        match GlobalBinding::new(binding.address, &binding.name, path, value, mangler) {
            Ok(global) => {
                scan.bindings.insert(binding.address, global);
            }
            Err(err) => scan.rejected.push(err),
        }
    }

    for child in &namespace.children {
        visit(child, &path.child(&child.name), mangler, scan);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Binding, FlatMangler};

    fn cell(name: &str, address: u64, value: Value) -> Binding {
        Binding {
            name: name.to_string(),
            address,
            cell: Cell::Ref { value },
            imported: false,
        }
    }

    fn sample() -> Namespace {
        Namespace::new("Main")
            .with_binding(cell("counter", 0x100, Value::int64(0)))
            .with_binding(cell("#hidden", 0x108, Value::int64(1)))
            .with_binding(cell("greeting", 0x110, Value::Str { value: "hi".into() }))
            .with_binding(Binding {
                name: "LIMIT".into(),
                address: 0x118,
                cell: Cell::Constant {
                    value: Value::int64(10),
                },
                imported: false,
            })
            .with_binding(Binding {
                imported: true,
                ..cell("shared", 0x120, Value::int64(3))
            })
            .with_binding(cell("sym", 0x128, Value::Opaque { type_name: "Symbol".into() }))
            .with_child(
                Namespace::new("Physics").with_binding(cell("gravity", 0x200, Value::Float64 { value: 9.81 })),
            )
    }

    #[test]
    fn test_selection_rules() {
        let scan = collect_bindings(&sample(), &FlatMangler);
        let names: Vec<_> = scan.bindings.values().map(|b| b.mangled_name.as_str()).collect();
        assert_eq!(names, vec!["Main_counter", "Main_Physics_gravity"]);
        assert_eq!(scan.rejected.len(), 1);
        assert_eq!(
            scan.bindings[&0x200].owning_namespace,
            NamespacePath::parse("Main.Physics")
        );
    }

    #[test]
    fn test_scan_is_idempotent() {
        let ns = sample();
        let first = collect_bindings(&ns, &FlatMangler);
        let second = collect_bindings(&ns, &FlatMangler);
        assert_eq!(first.bindings, second.bindings);
    }
}
