//! Dynamically-sized container rewrite
//!
//! The runtime represents every growable container as a `{ length, data }`
//! header allocated by `jl_alloc_genericmemory`, and reaches the shared empty
//! instance of a container type by loading it out of the type descriptor.
//! Both need the live runtime. This pass rewrites them block by block:
//!
//! ```text
//! %x = load atomic ptr, ptr getelementptr inbounds (i8, ptr @T, i64 32) unordered, align 8
//! %c = icmp eq ptr %x, null                 →  %x = bitcast ptr @_j_empty_memory_f to ptr
//! br i1 %c, label %fail, label %ok          →  br label %ok          (fail block blanked)
//!
//! %m = call ptr @jl_alloc_genericmemory(ptr @T, i64 %n)
//!     →  %"m.bytes" = mul i64 %n, <elsize>
//!        %m = call ptr @malloc(i64 16)
//!        %"m.data" = call ptr @malloc(i64 %"m.bytes")      ; or calloc(%n, 8)
//!        store i64 %n, ptr %m
//!        store ptr %"m.data", ptr (%m + 8)
//! ```

use super::{declare_calloc, declare_malloc};
use crate::extract::ExtractedIR;
use crate::ir::blocks::{join_blocks, split_blocks, BasicBlock};
use crate::ir::symbols::{assigned_local, derived_local, global_symbol, globals_in, sanitize_identifier};
use crate::runtime::{ContainerLayout, RuntimeIntrospection};
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Element sizes above this are suspicious enough to log
pub const LARGE_ELEMENT_SIZE: u64 = 256;
/// Size of the `{ length, data }` container header
pub const HEADER_SIZE: u64 = 16;
/// Slot size of containers holding references
pub const POINTER_SLOT_SIZE: u64 = 8;

const MEMORYREF_MARKER: &str = "@julia.memoryref";

lazy_static! {
    static ref CONTAINER_LOAD: Regex = Regex::new(
        r#"load atomic ptr, ptr getelementptr inbounds \(i8, ptr (@"[^"]+"|@[-a-zA-Z$._0-9]+), i64 -?\d+\) unordered"#
    )
    .unwrap();
    static ref NULL_CHECK: Regex =
        Regex::new(r#"^\s*(%"[^"]+"|%[-a-zA-Z$._0-9]+) = icmp (eq|ne) ptr (%"[^"]+"|%[-a-zA-Z$._0-9]+), null\b"#).unwrap();
    static ref COND_BRANCH: Regex = Regex::new(
        r#"^(\s*)br i1 (%"[^"]+"|%[-a-zA-Z$._0-9]+), label (%"[^"]+"|%[-a-zA-Z$._0-9]+), label (%"[^"]+"|%[-a-zA-Z$._0-9]+)"#
    )
    .unwrap();
    static ref ALLOC_CALL: Regex =
        Regex::new(r"call (?:[^@]*\s)?ptr @i?jl_alloc_genericmemory\(([^)]*)\)").unwrap();
}

/// Counters for one function
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContainerStats {
    /// Empty-instance loads replaced by the singleton
    pub dereferences: usize,
    /// Runtime allocations replaced by `malloc`/`calloc`
    pub allocations: usize,
    /// Marker calls deleted
    pub markers: usize,
}

impl ContainerStats {
    pub fn total(&self) -> usize {
        self.dereferences + self.allocations + self.markers
    }
}

/// The container rewrite over one runtime
pub struct ContainerPass<'r> {
    runtime: &'r dyn RuntimeIntrospection,
}

impl<'r> ContainerPass<'r> {
    pub fn new(runtime: &'r dyn RuntimeIntrospection) -> Self {
        Self { runtime }
    }

    /// Rewrite every body of `ir`.
    ///
    /// `stem` names the function's empty-container singleton.
    pub fn run(&self, function: &str, stem: &str, ir: &mut ExtractedIR) -> Result<ContainerStats> {
        self.resolve_layouts(function, ir)?;

        let singleton = global_symbol(&format!("_j_empty_memory_{}", sanitize_identifier(stem)));
        let mut stats = ContainerStats::default();
        let mut needs_calloc = false;

        for index in 0..ir.function_bodies.len() {
            let mut rewrite = BodyRewrite {
                function,
                ir,
                singleton: &singleton,
                stats: &mut stats,
                needs_calloc: &mut needs_calloc,
            };
            let body = rewrite.ir.function_bodies[index].clone();
            let rewritten = rewrite.body(&body)?;
            ir.function_bodies[index] = rewritten;
        }

        if stats.dereferences > 0 {
            ir.alias_table.insert(
                singleton.clone(),
                format!("{} = internal global {{ i64, ptr }} zeroinitializer, align 16", singleton),
            );
        }
        if stats.allocations > 0 {
            declare_malloc(ir);
        }
        if needs_calloc {
            declare_calloc(ir);
        }

        if stats.total() > 0 {
            tracing::debug!(
                "container pass on {}: {} dereferences, {} allocations, {} markers",
                function,
                stats.dereferences,
                stats.allocations,
                stats.markers
            );
        }
        Ok(stats)
    }

    /// Read the layout of every container type the bodies mention
    fn resolve_layouts(&self, function: &str, ir: &mut ExtractedIR) -> Result<()> {
        let used: BTreeSet<String> = ir
            .function_bodies
            .iter()
            .flat_map(|body| globals_in(body))
            .filter(|sym| ir.address_table.is_container_symbol(sym))
            .map(str::to_string)
            .collect();

        for symbol in used {
            if ir.container_layouts.contains_key(&symbol) {
                continue;
            }
            let Some(address) = ir.address_table.container_address(&symbol) else {
                continue;
            };
            let layout = self
                .runtime
                .read_layout(address)
                .ok_or_else(|| Error::RuntimeRead {
                    address,
                    what: format!("container layout of {}", symbol),
                })?;
            if !layout.mutable_or_abstract && layout.element_size > LARGE_ELEMENT_SIZE {
                tracing::warn!(
                    "{} in {}: element size {} bytes exceeds {}",
                    symbol,
                    function,
                    layout.element_size,
                    LARGE_ELEMENT_SIZE
                );
            }
            ir.container_layouts.insert(symbol, layout);
        }
        Ok(())
    }
}

struct BodyRewrite<'a> {
    function: &'a str,
    ir: &'a ExtractedIR,
    singleton: &'a str,
    stats: &'a mut ContainerStats,
    needs_calloc: &'a mut bool,
}

impl BodyRewrite<'_> {
    fn body(&mut self, body: &str) -> Result<String> {
        let mut blocks = split_blocks(body);
        let mut failed: Vec<String> = Vec::new();

        for block in blocks.iter_mut() {
            while let Some(label) = self.dereference(block)? {
                failed.push(label);
            }
            self.allocations(block)?;
            self.markers(block);
        }

        for label in failed {
            let block = blocks
                .iter_mut()
                .find(|b| b.has_label(&label))
                .ok_or_else(|| {
                    Error::malformed(
                        self.function,
                        "container dereference",
                        format!("failure block {} not found", label),
                    )
                })?;
            block.blank();
        }

        Ok(join_blocks(&blocks))
    }

    /// Rewrite the first empty-instance dereference of a block.
    /// Returns the label of the failure block to blank.
    fn dereference(&mut self, block: &mut BasicBlock) -> Result<Option<String>> {
        let Some((load_idx, symbol)) = block.lines.iter().enumerate().find_map(|(i, line)| {
            let caps = CONTAINER_LOAD.captures(line)?;
            let symbol = caps.get(1)?.as_str();
            self.ir
                .address_table
                .is_container_symbol(symbol)
                .then(|| (i, symbol.to_string()))
        }) else {
            return Ok(None);
        };

        let malformed = |detail: String| Error::malformed(self.function, "container dereference", detail);

        let load = &block.lines[load_idx];
        let value = assigned_local(load)
            .ok_or_else(|| malformed(format!("unassigned load of {}", symbol)))?
            .to_string();

        let (cmp_idx, flag, equal) = block.lines[load_idx + 1..]
            .iter()
            .enumerate()
            .find_map(|(off, line)| {
                let caps = NULL_CHECK.captures(line)?;
                (caps[3] == *value).then(|| (load_idx + 1 + off, caps[1].to_string(), &caps[2] == "eq"))
            })
            .ok_or_else(|| malformed(format!("no null check of {}", value)))?;

        let (br_idx, indent, fail, ok) = block.lines[cmp_idx + 1..]
            .iter()
            .enumerate()
            .find_map(|(off, line)| {
                let caps = COND_BRANCH.captures(line)?;
                (caps[2] == *flag).then(|| {
                    let (a, b) = (caps[3].to_string(), caps[4].to_string());
                    let (fail, ok) = if equal { (a, b) } else { (b, a) };
                    (cmp_idx + 1 + off, caps[1].to_string(), fail, ok)
                })
            })
            .ok_or_else(|| malformed(format!("no branch on {}", flag)))?;

        let load_indent: String = load.chars().take_while(|c| c.is_whitespace()).collect();
        block.lines[load_idx] = format!("{}{} = bitcast ptr {} to ptr", load_indent, value, self.singleton);
        block.lines[br_idx] = format!("{}br label {}", indent, ok);
        block.lines.remove(cmp_idx);

        self.stats.dereferences += 1;
        Ok(Some(fail))
    }

    fn allocations(&mut self, block: &mut BasicBlock) -> Result<()> {
        let mut out: Vec<String> = Vec::with_capacity(block.lines.len());
        for line in block.lines.drain(..) {
            let Some(caps) = ALLOC_CALL.captures(&line) else {
                out.push(line);
                continue;
            };
            let malformed = |detail: String| Error::malformed(self.function, "container allocation", detail);

            let dst = assigned_local(&line)
                .ok_or_else(|| malformed("allocation result is not assigned".to_string()))?;
            let args: Vec<&str> = caps[1].split(',').map(str::trim).collect();
            let [ty, count] = args.as_slice() else {
                return Err(malformed(format!("expected 2 arguments, got {}", args.len())));
            };
            let symbol = ty
                .split_whitespace()
                .last()
                .filter(|s| s.starts_with('@'))
                .ok_or_else(|| malformed(format!("container type operand `{}`", ty)))?;
            let count = count
                .strip_prefix("i64 ")
                .map(str::trim)
                .ok_or_else(|| malformed(format!("length operand `{}`", count)))?;
            let layout = self
                .ir
                .container_layouts
                .get(symbol)
                .copied()
                .ok_or_else(|| malformed(format!("no layout for {}", symbol)))?;

            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            out.extend(self.allocation_lines(&indent, dst, count, layout));
            self.stats.allocations += 1;
        }
        block.lines = out;
        Ok(())
    }

    fn allocation_lines(&mut self, indent: &str, dst: &str, count: &str, layout: ContainerLayout) -> Vec<String> {
        let bytes = derived_local(dst, "bytes");
        let data = derived_local(dst, "data");
        let slot = derived_local(dst, "data_slot");
        let element_size = if layout.mutable_or_abstract {
            POINTER_SLOT_SIZE
        } else {
            layout.element_size
        };

        let payload = if layout.needs_zero_fill() {
            *self.needs_calloc = true;
            format!("{} = call ptr @calloc(i64 {}, i64 {})", data, count, POINTER_SLOT_SIZE)
        } else {
            format!("{} = call ptr @malloc(i64 {})", data, bytes)
        };

        [
            format!("{} = mul i64 {}, {}", bytes, count, element_size),
            format!("{} = call ptr @malloc(i64 {})", dst, HEADER_SIZE),
            payload,
            format!("store i64 {}, ptr {}, align 8", count, dst),
            format!("{} = getelementptr inbounds i8, ptr {}, i64 8", slot, dst),
            format!("store ptr {}, ptr {}, align 8", data, slot),
        ]
        .into_iter()
        .map(|l| format!("{}{}", indent, l))
        .collect()
    }

    fn markers(&mut self, block: &mut BasicBlock) {
        let before = block.lines.len();
        block
            .lines
            .retain(|line| !(line.contains("call void ") && line.contains(MEMORYREF_MARKER)));
        self.stats.markers += before - block.lines.len();
    }
}
