//! Call graph discovery from an entry function

use crate::host::{FunctionHandle, FunctionInfo, HostCompiler, Mangler};
use crate::Result;
use std::collections::{HashMap, HashSet, VecDeque};

/// Runtime built-ins that are never pulled into the output
pub const SKIPPED_BUILTINS: &[&str] = &[
    "throw_boundserror",
    "throw_inexacterror",
    "throw_overflowerr_binaryop",
    "throw_domerror",
];

/// A function reached from the entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallGraphEntry {
    /// Identity of the function
    pub handle: FunctionHandle,
    /// Name, namespace and signature
    pub info: FunctionInfo,
    /// Assigned output symbol
    pub mangled_name: String,
    /// 0 for the first signature mangling to a symbol, n for the n-th repeat
    pub overload: usize,
}

/// Reachable functions in discovery order
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    entries: Vec<CallGraphEntry>,
    index: HashMap<FunctionHandle, usize>,
}

impl CallGraph {
    /// The entry function (first discovered)
    pub fn entry(&self) -> Option<&CallGraphEntry> {
        self.entries.first()
    }

    /// Lookup by handle
    pub fn get(&self, handle: FunctionHandle) -> Option<&CallGraphEntry> {
        self.index.get(&handle).map(|&i| &self.entries[i])
    }

    /// Assigned name of a function
    pub fn name_of(&self, handle: FunctionHandle) -> Option<&str> {
        self.get(handle).map(|e| e.mangled_name.as_str())
    }

    /// True if the function was visited
    pub fn contains(&self, handle: FunctionHandle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Entries in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &CallGraphEntry> {
        self.entries.iter()
    }

    /// Number of functions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was visited
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Breadth-first traversal from `entry` over the host's callee metadata.
///
/// Every visited function is compiled if needed, named, and recorded once,
/// keyed by handle, so direct and mutual recursion terminate.
pub fn collect_call_graph(
    host: &mut dyn HostCompiler,
    entry: FunctionHandle,
    mangler: &dyn Mangler,
) -> Result<CallGraph> {
    let mut graph = CallGraph::default();
    let mut seen: HashSet<FunctionHandle> = HashSet::new();
    let mut name_uses: HashMap<String, usize> = HashMap::new();
    let mut assigned: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<FunctionHandle> = VecDeque::new();

    seen.insert(entry);
    queue.push_back(entry);

    while let Some(handle) = queue.pop_front() {
        let info = host.describe(handle)?;
        if handle != entry && SKIPPED_BUILTINS.contains(&info.name.as_str()) {
            tracing::debug!("skipping runtime built-in {}", info.name);
            continue;
        }

        host.ensure_compiled(handle)?;

        let base = mangler.mangle(&info.name, &info.namespace);
        let uses = name_uses.entry(base.clone()).or_insert(0);
        let overload = *uses;
        *uses += 1;
        let mut mangled_name = base.clone();
        let mut suffix = overload;
        while (suffix > 0 && mangled_name == base) || assigned.contains(&mangled_name) {
            suffix = suffix.max(1);
            mangled_name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        assigned.insert(mangled_name.clone());

        tracing::debug!(
            "call graph: {}.{}({}) -> {}",
            info.namespace,
            info.name,
            info.argument_types.join(", "),
            mangled_name
        );

        for callee in host.callees(handle)? {
            if seen.insert(callee) {
                queue.push_back(callee);
            }
        }

        graph.index.insert(handle, graph.entries.len());
        graph.entries.push(CallGraphEntry {
            handle,
            info,
            mangled_name,
            overload,
        });
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FlatMangler, RecordedFunction, RecordedHost};

    fn func(name: &str, args: &[&str]) -> RecordedFunction {
        RecordedFunction {
            name: name.to_string(),
            namespace: "Main".to_string(),
            argument_types: args.iter().map(|s| s.to_string()).collect(),
            callees: Vec::new(),
            ir: String::new(),
            compiled: false,
        }
    }

    #[test]
    fn test_recursion_visits_once() {
        let mut host = RecordedHost::new();
        let main = host.add(func("main", &[]));
        let even = host.add(func("is_even", &["Int64"]));
        let odd = host.add(func("is_odd", &["Int64"]));
        host.add_callee(main, even);
        host.add_callee(main, odd);
        host.add_callee(even, odd);
        host.add_callee(odd, even);
        host.add_callee(even, even);

        let graph = collect_call_graph(&mut host, main, &FlatMangler).unwrap();
        assert_eq!(graph.len(), 3);
        let order: Vec<_> = graph.iter().map(|e| e.handle).collect();
        assert_eq!(order, vec![main, even, odd]);
        assert_eq!(host.compiled_on_demand.len(), 3);
    }

    #[test]
    fn test_builtins_skipped_and_overloads_named() {
        let mut host = RecordedHost::new();
        let main = host.add(func("main", &[]));
        let f_int = host.add(func("f", &["Int64"]));
        let f_float = host.add(func("f", &["Float64"]));
        let oob = host.add(func("throw_boundserror", &["Vector", "Int64"]));
        host.add_callee(main, f_int);
        host.add_callee(main, f_float);
        host.add_callee(f_int, oob);

        let graph = collect_call_graph(&mut host, main, &FlatMangler).unwrap();
        assert!(!graph.contains(oob));
        assert_eq!(graph.name_of(f_int), Some("Main_f"));
        assert_eq!(graph.name_of(f_float), Some("Main_f_1"));
        assert_eq!(graph.get(f_float).unwrap().overload, 1);
    }

    #[test]
    fn test_suffixed_names_never_collide() {
        let mut host = RecordedHost::new();
        let main = host.add(func("main", &[]));
        let f_int = host.add(func("f", &["Int64"]));
        let f_float = host.add(func("f", &["Float64"]));
        let f_one = host.add(func("f_1", &[]));
        host.add_callee(main, f_int);
        host.add_callee(main, f_float);
        host.add_callee(main, f_one);

        let graph = collect_call_graph(&mut host, main, &FlatMangler).unwrap();
        let names: Vec<_> = graph.iter().map(|e| e.mangled_name.as_str()).collect();
        assert_eq!(names, vec!["Main_main", "Main_f", "Main_f_1", "Main_f_1_1"]);
        assert_eq!(graph.get(f_one).unwrap().overload, 0);
    }

    #[test]
    fn test_suffix_skips_taken_names() {
        let mut host = RecordedHost::new();
        let main = host.add(func("main", &[]));
        let f_one = host.add(func("f_1", &[]));
        let f_int = host.add(func("f", &["Int64"]));
        let f_float = host.add(func("f", &["Float64"]));
        host.add_callee(main, f_one);
        host.add_callee(main, f_int);
        host.add_callee(main, f_float);

        let graph = collect_call_graph(&mut host, main, &FlatMangler).unwrap();
        assert_eq!(graph.name_of(f_one), Some("Main_f_1"));
        assert_eq!(graph.name_of(f_int), Some("Main_f"));
        assert_eq!(graph.name_of(f_float), Some("Main_f_2"));
        assert_eq!(graph.get(f_float).unwrap().overload, 1);
    }

    #[test]
    fn test_naming_is_deterministic() {
        let build = || {
            let mut host = RecordedHost::new();
            let main = host.add(func("main", &[]));
            let g = host.add(func("g", &[]));
            let h = host.add(func("h", &[]));
            host.add_callee(main, h);
            host.add_callee(main, g);
            host.add_callee(h, g);
            let graph = collect_call_graph(&mut host, main, &FlatMangler).unwrap();
            graph.iter().map(|e| e.mangled_name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
