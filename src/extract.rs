//! # IR Extraction
//!
//! Splits one function's full IR dump into the pieces the later passes and
//! the module assembler work on:
//!
//! ```text
//! raw dump ─┬─ define @julia_*  → function_headers / function_bodies (self first)
//!           ├─ @x = inttoptr …  → address_table (binding / container type / other)
//!           ├─ @x = …           → alias_table (constant pools renamed per function)
//!           ├─ declare …        → declaration_table (runtime helpers dropped)
//!           ├─ attributes #N    → attribute_set
//!           └─ target / !N      → target_lines / metadata
//! ```

use crate::ir::region::match_braces;
use crate::ir::symbols::{
    address_cast, bare_name, global_symbol, parse_compiled_name, rename_globals,
    sanitize_identifier,
};
use crate::runtime::ContainerLayout;
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Name fragment of aliases pointing at global binding cells
pub const GLOBAL_REF_FRAGMENT: &str = "jl_global";
/// Name fragment of aliases pointing at container type descriptors
pub const CONTAINER_TYPE_FRAGMENT: &str = "GenericMemory";

/// Runtime helpers whose declarations never reach the output
pub const DENIED_DECLARATIONS: &[&str] = &[
    "ijl_gc_",
    "jl_gc_",
    "julia.gc_alloc_obj",
    "julia.get_pgcstack",
    "julia.new_gc_frame",
    "julia.push_gc_frame",
    "julia.pop_gc_frame",
    "julia.get_gc_frame_slot",
    "julia.gc_loaded",
    "ijl_box_",
    "jl_box_",
    "ijl_alloc_genericmemory",
    "jl_alloc_genericmemory",
    "julia.memoryref",
];

lazy_static! {
    static ref DEFINE_LINE: Regex = Regex::new(r"(?m)^define\b[^\n]*$").unwrap();
    static ref DEFINED_NAME: Regex =
        Regex::new(r#"(@"[^"]+"|@[-a-zA-Z$._0-9]+)\("#).unwrap();
    static ref ALIAS_LINE: Regex =
        Regex::new(r#"^(@"[^"]+"|@[-a-zA-Z$._0-9]+)\s*=\s*(.+)$"#).unwrap();
    static ref CONST_POOL: Regex = Regex::new(r"^_j_const[#_]?(\d+)$").unwrap();
}

/// What the extractor needs to know about the function being extracted
#[derive(Debug, Clone, Copy)]
pub struct ExtractTarget<'a> {
    /// Name the function has in the runtime
    pub friendly_name: &'a str,
    /// Name the definition gets in the output (ignored for the entry point)
    pub external_name: &'a str,
    /// Entry point definitions become `main`
    pub is_entry_point: bool,
    /// Overload index, keeps constant pool names of same-named signatures apart
    pub overload: usize,
}

impl ExtractTarget<'_> {
    /// Symbol of the definition in the output
    pub fn output_symbol(&self) -> String {
        if self.is_entry_point {
            "@main".to_string()
        } else {
            global_symbol(self.external_name)
        }
    }

    fn const_pool_name(&self, counter: &str) -> String {
        let stem = sanitize_identifier(self.friendly_name);
        if self.overload == 0 {
            format!("_j_const_{}_{}", stem, counter)
        } else {
            format!("_j_const_{}.{}_{}", stem, self.overload, counter)
        }
    }
}

/// Aliases that cast a raw runtime address, by what they point at.
/// Each map goes from address to the original symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable {
    /// Global binding cells
    pub global_refs: BTreeMap<u64, String>,
    /// Container type descriptors
    pub container_type_refs: BTreeMap<u64, String>,
    /// Everything else
    pub other_refs: BTreeMap<u64, String>,
}

impl AddressTable {
    /// Address behind a container type symbol
    pub fn container_address(&self, symbol: &str) -> Option<u64> {
        self.container_type_refs
            .iter()
            .find(|(_, s)| s.as_str() == symbol)
            .map(|(&addr, _)| addr)
    }

    /// True if `symbol` is a container type alias
    pub fn is_container_symbol(&self, symbol: &str) -> bool {
        self.container_type_refs.values().any(|s| s == symbol)
    }
}

/// Structured IR of one compiled function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedIR {
    /// `define ... {` lines; index 0 is the function itself
    pub function_headers: Vec<String>,
    /// Body text between the braces, parallel to `function_headers`
    pub function_bodies: Vec<String>,
    /// Textual constants: symbol → full line
    pub alias_table: BTreeMap<String, String>,
    /// Raw address aliases
    pub address_table: AddressTable,
    /// External function declarations: symbol → full line
    pub declaration_table: BTreeMap<String, String>,
    /// `attributes #N = {...}` lines
    pub attribute_set: Vec<String>,
    /// `target datalayout` / `target triple` lines
    pub target_lines: Vec<String>,
    /// `!N = ...` metadata lines
    pub metadata: Vec<String>,
    /// Container layouts used by the container rewrite, by type symbol
    pub container_layouts: BTreeMap<String, ContainerLayout>,
    /// Declarations of bindings the function refers to: symbol → line
    pub external_globals: BTreeMap<String, String>,
    /// The unmodified dump
    pub raw_ir: String,
}

impl ExtractedIR {
    /// Full text of the i-th function definition
    pub fn function_text(&self, index: usize) -> String {
        format!(
            "{}{}}}",
            self.function_headers[index], self.function_bodies[index]
        )
    }

    /// Add a declaration unless the symbol is already declared
    pub fn declare(&mut self, symbol: &str, line: &str) -> bool {
        if self.declaration_table.contains_key(symbol) {
            return false;
        }
        self.declaration_table
            .insert(symbol.to_string(), line.to_string());
        true
    }

    /// Apply symbol renames to every definition and declaration
    pub fn rename(&mut self, renames: &HashMap<String, String>) {
        if renames.is_empty() {
            return;
        }
        for text in self
            .function_headers
            .iter_mut()
            .chain(self.function_bodies.iter_mut())
        {
            *text = rename_globals(text, renames);
        }
        self.declaration_table = std::mem::take(&mut self.declaration_table)
            .into_iter()
            .map(|(symbol, line)| {
                (
                    renames.get(&symbol).cloned().unwrap_or(symbol),
                    rename_globals(&line, renames),
                )
            })
            .collect();
    }

    /// Render the function as a standalone IR file
    pub fn render(&self, comment: &str) -> String {
        let mut out = String::new();
        for line in comment.lines() {
            out.push_str("; ");
            out.push_str(line);
            out.push('\n');
        }
        let sections: [Vec<String>; 7] = [
            self.target_lines.clone(),
            self.alias_table.values().cloned().collect(),
            self.external_globals.values().cloned().collect(),
            (0..self.function_headers.len())
                .map(|i| self.function_text(i))
                .collect(),
            self.declaration_table.values().cloned().collect(),
            self.attribute_set.clone(),
            self.metadata.clone(),
        ];
        for section in sections.iter().filter(|s| !s.is_empty()) {
            out.push('\n');
            for item in section {
                out.push_str(item);
                out.push('\n');
            }
        }
        out
    }
}

struct Definition {
    name: String,
    header: String,
    body: String,
    span: Range<usize>,
}

/// Extract the structured IR of `target` from its full dump
pub fn extract(target: &ExtractTarget<'_>, raw_ir: &str) -> Result<ExtractedIR> {
    let definitions = find_definitions(raw_ir, target.friendly_name)?;

    let mut compiled: Vec<&Definition> = definitions
        .iter()
        .filter(|d| parse_compiled_name(&d.name).is_some())
        .collect();
    let self_index = compiled
        .iter()
        .position(|d| parse_compiled_name(&d.name).map(|(stem, _)| stem) == Some(target.friendly_name))
        .ok_or_else(|| Error::FunctionNotFound {
            function: target.friendly_name.to_string(),
        })?;
    let own = compiled.remove(self_index);
    compiled.insert(0, own);

    let mut renames: HashMap<String, String> = HashMap::new();
    renames.insert(own.name.clone(), target.output_symbol());

    let mut ir = ExtractedIR {
        raw_ir: raw_ir.to_string(),
        ..Default::default()
    };
    for def in &compiled {
        ir.function_headers.push(def.header.clone());
        ir.function_bodies.push(def.body.clone());
    }

    let mut pending_aliases: Vec<(String, String)> = Vec::new();
    let mut offset = 0;
    for line in raw_ir.split('\n') {
        let start = offset;
        offset += line.len() + 1;
        if definitions.iter().any(|d| d.span.contains(&start)) {
            continue;
        }
        classify_top_level(line, target, &mut ir, &mut renames, &mut pending_aliases);
    }

    for (symbol, line) in pending_aliases {
        let symbol = renames.get(&symbol).cloned().unwrap_or(symbol);
        ir.alias_table.insert(symbol, rename_globals(&line, &renames));
    }
    ir.rename(&renames);

    tracing::debug!(
        "extracted {}: {} definitions, {} aliases, {} address refs, {} declarations",
        target.friendly_name,
        ir.function_headers.len(),
        ir.alias_table.len(),
        ir.address_table.global_refs.len()
            + ir.address_table.container_type_refs.len()
            + ir.address_table.other_refs.len(),
        ir.declaration_table.len()
    );

    Ok(ir)
}

fn find_definitions(raw_ir: &str, function: &str) -> Result<Vec<Definition>> {
    let mut definitions = Vec::new();
    for m in DEFINE_LINE.find_iter(raw_ir) {
        let line = m.as_str().trim_end();
        if !line.ends_with('{') {
            return Err(Error::malformed(
                function,
                "function definition",
                format!("body brace not on the define line: {}", line),
            ));
        }
        let open = m.start() + line.len() - 1;
        let region = match_braces(raw_ir, open).ok_or_else(|| {
            Error::malformed(function, "function definition", "unbalanced braces")
        })?;
        let name = DEFINED_NAME
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|n| n.as_str().to_string())
            .ok_or_else(|| {
                Error::malformed(function, "function definition", format!("no name in: {}", line))
            })?;
        definitions.push(Definition {
            name,
            header: raw_ir[m.start()..=open].to_string(),
            body: region.inner(raw_ir).to_string(),
            span: m.start()..region.end(),
        });
    }
    Ok(definitions)
}

fn classify_top_level(
    line: &str,
    target: &ExtractTarget<'_>,
    ir: &mut ExtractedIR,
    renames: &mut HashMap<String, String>,
    pending_aliases: &mut Vec<(String, String)>,
) {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with("source_filename") {
        return;
    }

    if trimmed.starts_with("target ") {
        ir.target_lines.push(trimmed.to_string());
    } else if trimmed.starts_with("declare ") {
        let Some(symbol) = DEFINED_NAME
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return;
        };
        let name = bare_name(&symbol);
        if DENIED_DECLARATIONS.iter().any(|denied| name.starts_with(denied)) {
            return;
        }
        ir.declaration_table.insert(symbol, trimmed.to_string());
    } else if trimmed.starts_with("attributes ") {
        ir.attribute_set.push(trimmed.to_string());
    } else if trimmed.starts_with('!') {
        ir.metadata.push(trimmed.to_string());
    } else if let Some(caps) = ALIAS_LINE.captures(trimmed) {
        let symbol = caps[1].to_string();
        let name = bare_name(&symbol).to_string();

        if let Some(address) = address_cast(&caps[2]) {
            let bucket = if name.contains(GLOBAL_REF_FRAGMENT) {
                &mut ir.address_table.global_refs
            } else if name.contains(CONTAINER_TYPE_FRAGMENT) {
                &mut ir.address_table.container_type_refs
            } else {
                &mut ir.address_table.other_refs
            };
            bucket.entry(address).or_insert(symbol);
            return;
        }

        if let Some(counter) = CONST_POOL.captures(&name).and_then(|c| c.get(1)) {
            let renamed = global_symbol(&target.const_pool_name(counter.as_str()));
            renames.insert(symbol.clone(), renamed);
        }
        pending_aliases.push((symbol, trimmed.to_string()));
    }
}
