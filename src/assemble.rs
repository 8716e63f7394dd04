//! # Module Assembly
//!
//! Groups prepared functions and the bindings they reference by owning
//! namespace. Every global-binding alias left in a function body is
//! resolved to a [`GlobalBinding`], either one found by the collector or
//! one reconstructed from live memory, and every call to another compiled
//! function is pointed at that function's output symbol.

use crate::collect::{CallGraphEntry, GlobalBinding};
use crate::extract::{ExtractTarget, ExtractedIR};
use crate::host::{FunctionHandle, Mangler, NamespacePath};
use crate::ir::region::match_region;
use crate::ir::symbols::{global_symbol, parse_compiled_name};
use crate::runtime::{reconstruct, ContainerLayout, RuntimeIntrospection};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// One function of the call graph on its way to the output
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub handle: FunctionHandle,
    /// Name in the runtime
    pub friendly_name: String,
    /// Output symbol (without `@`)
    pub mangled_name: String,
    pub argument_types: Vec<String>,
    pub namespace: NamespacePath,
    pub is_entry_point: bool,
    /// Position among functions sharing a mangled name
    pub overload: usize,
    /// Filled once by the preparer
    pub extracted_ir: Option<ExtractedIR>,
}

impl CompiledFunction {
    pub fn from_entry(entry: &CallGraphEntry, is_entry_point: bool) -> Self {
        Self {
            handle: entry.handle,
            friendly_name: entry.info.name.clone(),
            mangled_name: entry.mangled_name.clone(),
            argument_types: entry.info.argument_types.clone(),
            namespace: entry.info.namespace.clone(),
            is_entry_point,
            overload: entry.overload,
            extracted_ir: None,
        }
    }

    /// Symbol the function is defined under in the output
    pub fn output_name(&self) -> &str {
        if self.is_entry_point {
            "main"
        } else {
            &self.mangled_name
        }
    }

    /// Extraction parameters for this function
    pub fn target(&self) -> ExtractTarget<'_> {
        ExtractTarget {
            friendly_name: &self.friendly_name,
            external_name: &self.mangled_name,
            is_entry_point: self.is_entry_point,
            overload: self.overload,
        }
    }
}

/// Turns a function into its rewritten IR (extraction plus passes)
pub trait FunctionPreparer {
    fn prepare(&mut self, function: &CompiledFunction) -> Result<ExtractedIR>;
}

/// Output unit for one namespace
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceModule {
    pub namespace: NamespacePath,
    pub mangled_namespace_name: String,
    /// Bindings owned by this namespace, by address
    pub global_bindings: BTreeMap<u64, GlobalBinding>,
    /// Indices into [`Assembly::functions`]
    pub functions: Vec<usize>,
    /// Layout of every container type used by the module's functions
    pub container_layouts: BTreeMap<String, ContainerLayout>,
}

impl NamespaceModule {
    fn new(namespace: NamespacePath, mangler: &dyn Mangler) -> Self {
        Self {
            mangled_namespace_name: mangler.mangle_namespace(&namespace),
            namespace,
            global_bindings: BTreeMap::new(),
            functions: Vec::new(),
            container_layouts: BTreeMap::new(),
        }
    }
}

/// Result of assembly
#[derive(Debug, Default)]
pub struct Assembly {
    pub modules: BTreeMap<NamespacePath, NamespaceModule>,
    pub functions: Vec<CompiledFunction>,
    /// Soft findings (unresolved addresses)
    pub diagnostics: Vec<Error>,
}

impl Assembly {
    /// Functions registered under `module`
    pub fn functions_of<'a>(
        &'a self,
        module: &'a NamespaceModule,
    ) -> impl Iterator<Item = &'a CompiledFunction> + 'a {
        module.functions.iter().map(move |&i| &self.functions[i])
    }

    /// The binding stored at `address`, wherever it lives
    pub fn binding(&self, address: u64) -> Option<&GlobalBinding> {
        self.modules
            .values()
            .find_map(|m| m.global_bindings.get(&address))
    }
}

/// Assembly context.
///
/// Holds the per-namespace counters used to name reconstructed bindings
/// (`_global_1`, `_global_2`, ... within each namespace).
pub struct Assembler<'a> {
    mangler: &'a dyn Mangler,
    runtime: &'a dyn RuntimeIntrospection,
    synthesized: HashMap<NamespacePath, usize>,
}

impl<'a> Assembler<'a> {
    pub fn new(mangler: &'a dyn Mangler, runtime: &'a dyn RuntimeIntrospection) -> Self {
        Self {
            mangler,
            runtime,
            synthesized: HashMap::new(),
        }
    }

    pub fn assemble(
        &mut self,
        mut functions: Vec<CompiledFunction>,
        mut known_bindings: BTreeMap<u64, GlobalBinding>,
        preparer: &mut dyn FunctionPreparer,
    ) -> Result<Assembly> {
        let mut modules: BTreeMap<NamespacePath, NamespaceModule> = BTreeMap::new();
        let mut diagnostics = Vec::new();

        for function in functions.iter_mut() {
            if function.extracted_ir.is_none() {
                function.extracted_ir = Some(preparer.prepare(function)?);
            }
        }
        let callees = CalleeIndex::new(&functions);

        for (index, function) in functions.iter_mut().enumerate() {
            let module = modules
                .entry(function.namespace.clone())
                .or_insert_with(|| NamespaceModule::new(function.namespace.clone(), self.mangler));
            module.functions.push(index);

            let Some(ir) = function.extracted_ir.as_mut() else {
                continue;
            };
            merge_layouts(module, ir)?;

            let mut renames: HashMap<String, String> = HashMap::new();
            let refs: Vec<(u64, String)> = ir
                .address_table
                .global_refs
                .iter()
                .map(|(&a, s)| (a, s.clone()))
                .collect();

            for (address, alias) in refs {
                let binding = match known_bindings.get(&address) {
                    Some(binding) => binding.clone(),
                    None => match self.synthesize(address, &function.namespace) {
                        Ok(binding) => {
                            known_bindings.insert(address, binding.clone());
                            binding
                        }
                        Err(err) => {
                            tracing::warn!("{}: {}", function.friendly_name, err);
                            diagnostics.push(Error::MissingBindingForAddress {
                                function: function.friendly_name.clone(),
                                address,
                            });
                            continue;
                        }
                    },
                };

                let symbol = binding.symbol();
                ir.external_globals
                    .insert(symbol.clone(), binding.ir_declaration.clone());
                renames.insert(alias, symbol);
                modules
                    .entry(binding.owning_namespace.clone())
                    .or_insert_with(|| NamespaceModule::new(binding.owning_namespace.clone(), self.mangler))
                    .global_bindings
                    .insert(address, binding);
            }

            let own = function.friendly_name.as_str();
            for (symbol, line) in &ir.declaration_table {
                if let Some(target) = callees.resolve(symbol, line, own) {
                    renames.insert(symbol.clone(), global_symbol(target));
                }
            }

            ir.rename(&renames);
            tracing::debug!(
                "assembled {} into {} ({} renames)",
                function.friendly_name,
                function.namespace,
                renames.len()
            );
        }

        tracing::info!(
            "assembled {} functions into {} namespace modules",
            functions.len(),
            modules.len()
        );

        Ok(Assembly {
            modules,
            functions,
            diagnostics,
        })
    }

    /// Rebuild an unknown binding from live memory under `namespace`
    fn synthesize(&mut self, address: u64, namespace: &NamespacePath) -> Result<GlobalBinding> {
        let value = reconstruct(self.runtime, address).ok_or(Error::RuntimeRead {
            address,
            what: "binding value".to_string(),
        })?;
        let counter = self.synthesized.entry(namespace.clone()).or_insert(0);
        *counter += 1;
        let name = format!("_global_{}", counter);
        tracing::debug!("reconstructed 0x{:x} as {}.{}", address, namespace, name);
        GlobalBinding::new(address, &name, namespace, &value, self.mangler)
    }
}

fn merge_layouts(module: &mut NamespaceModule, ir: &ExtractedIR) -> Result<()> {
    for (symbol, layout) in &ir.container_layouts {
        match module.container_layouts.get(symbol) {
            Some(existing) if existing != layout => {
                return Err(Error::InconsistentContainerLayout {
                    symbol: symbol.clone(),
                    namespace: module.namespace.to_string(),
                });
            }
            Some(_) => {}
            None => {
                module.container_layouts.insert(symbol.clone(), *layout);
            }
        }
    }
    Ok(())
}

/// Output names of compiled functions by friendly name
struct CalleeIndex {
    by_name: HashMap<String, Vec<(usize, String)>>,
}

impl CalleeIndex {
    fn new(functions: &[CompiledFunction]) -> Self {
        let mut by_name: HashMap<String, Vec<(usize, String)>> = HashMap::new();
        for f in functions {
            by_name
                .entry(f.friendly_name.clone())
                .or_default()
                .push((f.argument_types.len(), f.output_name().to_string()));
        }
        Self { by_name }
    }

    /// Output name for a declared `julia_<name>_<n>` symbol, if unambiguous
    fn resolve(&self, symbol: &str, declaration: &str, caller: &str) -> Option<&str> {
        let (stem, _) = parse_compiled_name(symbol)?;
        let candidates = self.by_name.get(stem)?;
        if let [(_, name)] = candidates.as_slice() {
            return Some(name.as_str());
        }
        let arity = parameter_count(declaration, symbol)?;
        let mut matching = candidates.iter().filter(|(n, _)| *n == arity);
        match (matching.next(), matching.next()) {
            (Some((_, name)), None) => Some(name.as_str()),
            _ => {
                tracing::debug!(
                    "{}: call to {} is ambiguous between {} signatures",
                    caller,
                    symbol,
                    candidates.len()
                );
                None
            }
        }
    }
}

/// Number of parameters in a declaration of `symbol`
fn parameter_count(declaration: &str, symbol: &str) -> Option<usize> {
    let open = declaration.find(symbol)? + symbol.len();
    let region = match_region(declaration, open, b'(', b')')?;
    let params = region.inner(declaration).trim();
    if params.is_empty() {
        return Some(0);
    }
    let mut depth = 0i32;
    let mut count = 1;
    for b in params.bytes() {
        match b {
            b'(' | b'{' | b'[' | b'<' => depth += 1,
            b')' | b'}' | b']' | b'>' => depth -= 1,
            b',' if depth == 0 => count += 1,
            _ => {}
        }
    }
    Some(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FlatMangler;
    use crate::runtime::{HeapSnapshot, Value};

    struct Canned(HashMap<String, ExtractedIR>);

    impl FunctionPreparer for Canned {
        fn prepare(&mut self, function: &CompiledFunction) -> Result<ExtractedIR> {
            self.0
                .get(&function.friendly_name)
                .cloned()
                .ok_or_else(|| Error::FunctionNotFound {
                    function: function.friendly_name.clone(),
                })
        }
    }

    fn function(name: &str, ns: &str, args: usize) -> CompiledFunction {
        let namespace = NamespacePath::parse(ns);
        CompiledFunction {
            handle: FunctionHandle(0),
            friendly_name: name.to_string(),
            mangled_name: FlatMangler.mangle(name, &namespace),
            argument_types: vec!["Int64".to_string(); args],
            namespace,
            is_entry_point: false,
            overload: 0,
            extracted_ir: None,
        }
    }

    fn ir_reading(symbol: &str, address: u64) -> ExtractedIR {
        let mut ir = ExtractedIR::default();
        ir.function_headers.push("define i64 @f() {".into());
        ir.function_bodies
            .push(format!("\n  %1 = load i64, ptr {}, align 8\n  ret i64 %1\n", symbol));
        ir.address_table.global_refs.insert(address, symbol.to_string());
        ir
    }

    fn counter_binding() -> GlobalBinding {
        GlobalBinding::new(
            0x100,
            "counter",
            &NamespacePath::parse("Main"),
            &Value::int64(0),
            &FlatMangler,
        )
        .unwrap()
    }

    #[test]
    fn test_shared_binding_resolves_once() {
        let mut canned = HashMap::new();
        canned.insert("a".to_string(), ir_reading("@\"jl_global#7\"", 0x100));
        canned.insert("b".to_string(), ir_reading("@\"jl_global#19\"", 0x100));
        let functions = vec![function("a", "Main.A", 0), function("b", "Main.B", 0)];
        let known = BTreeMap::from([(0x100, counter_binding())]);

        let heap = HeapSnapshot::new();
        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let out = assembler
            .assemble(functions, known, &mut Canned(canned))
            .unwrap();

        let owners: Vec<_> = out
            .modules
            .values()
            .filter(|m| m.global_bindings.contains_key(&0x100))
            .map(|m| m.namespace.to_string())
            .collect();
        assert_eq!(owners, vec!["Main"]);
        for f in &out.functions {
            let ir = f.extracted_ir.as_ref().unwrap();
            assert!(ir.function_bodies[0].contains("ptr @Main_counter,"));
            assert!(ir.external_globals.contains_key("@Main_counter"));
        }
        assert_eq!(out.modules.len(), 3);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_reconstructed_bindings_counted_per_namespace() {
        let mut heap = HeapSnapshot::new();
        heap.define_string(0x7008, "hello");
        heap.define_string(0x8008, "world");

        let mut canned = HashMap::new();
        canned.insert("a".to_string(), ir_reading("@\"jl_global#1\"", 0x7008));
        canned.insert("b".to_string(), ir_reading("@\"jl_global#2\"", 0x8008));
        let functions = vec![function("a", "Main.A", 0), function("b", "Main.B", 0)];

        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let out = assembler
            .assemble(functions, BTreeMap::new(), &mut Canned(canned))
            .unwrap();

        let a = &out.modules[&NamespacePath::parse("Main.A")];
        let b = &out.modules[&NamespacePath::parse("Main.B")];
        assert_eq!(a.global_bindings[&0x7008].mangled_name, "Main_A__global_1");
        assert_eq!(b.global_bindings[&0x8008].mangled_name, "Main_B__global_1");
    }

    #[test]
    fn test_unresolvable_address_is_soft() {
        let mut canned = HashMap::new();
        canned.insert("a".to_string(), ir_reading("@\"jl_global#1\"", 0xdead0));
        let heap = HeapSnapshot::new();
        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let out = assembler
            .assemble(vec![function("a", "Main", 0)], BTreeMap::new(), &mut Canned(canned))
            .unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].is_soft());
        let ir = out.functions[0].extracted_ir.as_ref().unwrap();
        assert!(ir.function_bodies[0].contains("jl_global#1"));
    }

    #[test]
    fn test_garbage_header_becomes_missing_binding() {
        let mut heap = HeapSnapshot::new();
        heap.write_word(0x6000, 0xFFFF_FFFF_FFFF_FFF0);
        let mut canned = HashMap::new();
        canned.insert("a".to_string(), ir_reading("@\"jl_global#1\"", 0x6008));

        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let out = assembler
            .assemble(vec![function("a", "Main", 0)], BTreeMap::new(), &mut Canned(canned))
            .unwrap();
        assert!(matches!(
            out.diagnostics.as_slice(),
            [Error::MissingBindingForAddress { address: 0x6008, .. }]
        ));
    }

    #[test]
    fn test_callee_declarations_renamed() {
        let mut caller = ExtractedIR::default();
        caller.function_headers.push("define i64 @main() {".into());
        caller
            .function_bodies
            .push("\n  %1 = call i64 @julia_sq_12(i64 3)\n  %2 = call i64 @julia_inc_4(i64 %1, i64 1)\n  ret i64 %2\n".into());
        caller
            .declaration_table
            .insert("@julia_sq_12".into(), "declare i64 @julia_sq_12(i64)".into());
        caller
            .declaration_table
            .insert("@julia_inc_4".into(), "declare i64 @julia_inc_4(i64, i64)".into());

        let mut canned = HashMap::new();
        canned.insert("main".to_string(), caller);
        canned.insert("sq".to_string(), ExtractedIR::default());
        canned.insert("inc".to_string(), ExtractedIR::default());

        let mut inc_one = function("inc", "Main", 1);
        inc_one.mangled_name = "Main_inc".into();
        let mut inc_two = function("inc", "Main", 2);
        inc_two.mangled_name = "Main_inc_1".into();
        inc_two.overload = 1;
        let mut main = function("main", "Main", 0);
        main.is_entry_point = true;

        let heap = HeapSnapshot::new();
        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let out = assembler
            .assemble(
                vec![main, function("sq", "Main", 1), inc_one, inc_two],
                BTreeMap::new(),
                &mut Canned(canned),
            )
            .unwrap();

        let ir = out.functions[0].extracted_ir.as_ref().unwrap();
        assert!(ir.function_bodies[0].contains("call i64 @Main_sq(i64 3)"));
        assert!(ir.function_bodies[0].contains("call i64 @Main_inc_1(i64 %1, i64 1)"));
        assert_eq!(
            ir.declaration_table.get("@Main_inc_1").map(String::as_str),
            Some("declare i64 @Main_inc_1(i64, i64)")
        );
    }

    #[test]
    fn test_inconsistent_layouts_rejected() {
        let mut a = ExtractedIR::default();
        a.container_layouts.insert("@T".into(), ContainerLayout::inline(8));
        let mut b = ExtractedIR::default();
        b.container_layouts.insert("@T".into(), ContainerLayout::inline(16));
        let mut canned = HashMap::new();
        canned.insert("a".to_string(), a);
        canned.insert("b".to_string(), b);

        let heap = HeapSnapshot::new();
        let mut assembler = Assembler::new(&FlatMangler, &heap);
        let err = assembler
            .assemble(
                vec![function("a", "Main", 0), function("b", "Main", 0)],
                BTreeMap::new(),
                &mut Canned(canned),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentContainerLayout { .. }));
    }

    #[test]
    fn test_parameter_count() {
        assert_eq!(parameter_count("declare void @f()", "@f"), Some(0));
        assert_eq!(
            parameter_count("declare i64 @g({ i64, ptr } %0, i64)", "@g"),
            Some(2)
        );
    }
}
