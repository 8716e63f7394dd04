//! GC elimination
//!
//! Removes the shadow-stack frame the JIT sets up around every function,
//! optionally swaps pool allocations for `malloc`, and decides whether
//! what is left still depends on the runtime.

use super::{declare_malloc, is_allocation_call};
use crate::config::GcPolicy;
use crate::extract::ExtractedIR;
use crate::ir::symbols::{assigned_local, bare_name, globals_in, local_value, locals_in, ADDRESS_CAST};
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Calls into the runtime's allocation and GC namespace
pub const RUNTIME_CALL_MARKERS: &[&str] = &[
    "@ijl_gc_",
    "@jl_gc_",
    "@julia.gc_alloc",
    "@ijl_alloc_",
    "@jl_alloc_",
];

/// Shadow-stack frame setup
pub const FRAME_MARKERS: &[&str] = &["@julia.get_pgcstack", "@julia.new_gc_frame", "%gcframe"];

/// Runtime intrinsics that only exist to maintain the frame
const FRAME_INTRINSICS: &[&str] = &[
    "@julia.get_pgcstack",
    "@julia.new_gc_frame",
    "@julia.push_gc_frame",
    "@julia.pop_gc_frame",
    "@julia.get_gc_frame_slot",
];

const PSEUDO_PREFIXES: &[&str] = &["pgcstack", "ptls", "gcframe", "task.gcstack", "frame.prev"];
const TAG_ADDR_SUFFIX: &str = ".tag_addr";

lazy_static! {
    static ref POOL_ALLOC_CALL: Regex = Regex::new(
        r"^(\s*)(%\S+) = call .*@(?:ijl_gc_pool_alloc_instrumented|ijl_gc_pool_alloc|ijl_gc_small_alloc)\(([^)]*)\)"
    )
    .unwrap();
}

/// Counters for one function
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Lines deleted as frame scaffolding
    pub removed_lines: usize,
    /// Pool allocations replaced by `malloc`
    pub substituted_allocations: usize,
}

/// The GC elimination pass under one policy
#[derive(Debug, Clone, Copy)]
pub struct GcPass {
    policy: GcPolicy,
}

impl GcPass {
    pub fn new(policy: GcPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> GcPolicy {
        self.policy
    }

    /// Apply the policy's rewrites to every definition in `ir`
    pub fn run(&self, function: &str, ir: &mut ExtractedIR) -> GcStats {
        let mut stats = GcStats::default();
        if !self.policy.strips_scaffolding() {
            return stats;
        }

        for body in ir.function_bodies.iter_mut() {
            if self.policy.substitutes_allocator() {
                let (rewritten, count) = substitute_allocator(body);
                *body = rewritten;
                stats.substituted_allocations += count;
            }
            let (rewritten, removed) = strip_scaffolding(body);
            *body = rewritten;
            stats.removed_lines += removed;
        }

        if stats.substituted_allocations > 0 {
            declare_malloc(ir);
        }

        tracing::debug!(
            "gc pass ({}) on {}: {} scaffolding lines removed, {} allocations substituted",
            self.policy,
            function,
            stats.removed_lines,
            stats.substituted_allocations
        );
        stats
    }

    /// Judge the rewritten function.
    ///
    /// `Ok(None)` when self-contained, `Ok(Some(diagnostic))` for a soft
    /// finding, `Err` under `strict`.
    pub fn verdict(&self, function: &str, ir: &ExtractedIR) -> Result<Option<Error>> {
        let Some(reason) = residue_of(ir) else {
            return Ok(None);
        };
        let err = Error::NonSelfContainedCode {
            function: function.to_string(),
            reason,
        };
        if self.policy == GcPolicy::Strict {
            return Err(err);
        }
        tracing::warn!("{} (policy {})", err, self.policy);
        Ok(Some(err))
    }
}

/// True if `ir_text` has no runtime dependency left
pub fn is_self_contained(ir_text: &str) -> bool {
    residue(ir_text).is_none()
}

/// First runtime dependency found in `ir_text`
pub fn residue(ir_text: &str) -> Option<String> {
    for line in ir_text.lines() {
        let code = line.split(';').next().unwrap_or_default();
        if let Some(marker) = RUNTIME_CALL_MARKERS.iter().find(|m| code.contains(*m)) {
            return Some(format!("calls runtime allocator `{}`: {}", marker, code.trim()));
        }
        if let Some(marker) = FRAME_MARKERS.iter().find(|m| code.contains(*m)) {
            return Some(format!("sets up a GC frame via `{}`", marker));
        }
        if ADDRESS_CAST.is_match(code) {
            return Some(format!("embeds a raw runtime address: {}", code.trim()));
        }
    }
    None
}

/// Residue over a whole extracted function, including references to
/// unclassified runtime objects whose aliases were dropped
pub fn residue_of(ir: &ExtractedIR) -> Option<String> {
    for index in 0..ir.function_headers.len() {
        if let Some(reason) = residue(&ir.function_text(index)) {
            return Some(reason);
        }
    }
    if let Some(reason) = ir.alias_table.values().find_map(|line| residue(line)) {
        return Some(reason);
    }
    let dropped: HashSet<&str> = ir.address_table.other_refs.values().map(String::as_str).collect();
    ir.function_bodies
        .iter()
        .flat_map(|body| globals_in(body))
        .find(|symbol| dropped.contains(symbol))
        .map(|symbol| format!("references runtime object {}", symbol))
}

fn is_pseudo_variable(token: &str) -> bool {
    let name = bare_name(token);
    PSEUDO_PREFIXES.iter().any(|p| name.starts_with(p))
        || name.contains("pgcstack")
        || name.ends_with(TAG_ADDR_SUFFIX)
}

/// Delete lines that build or use the GC frame and object tag addresses.
///
/// Values computed only from deleted lines are deleted as well; allocation
/// calls always survive so their residue stays visible.
pub fn strip_scaffolding(body: &str) -> (String, usize) {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut removed = vec![false; lines.len()];
    let mut dead: HashSet<&str> = HashSet::new();

    loop {
        let mut changed = false;
        for (idx, line) in lines.iter().enumerate() {
            if removed[idx] || is_allocation_call(line) {
                continue;
            }
            let code = line.split(';').next().unwrap_or_default();
            let hit = locals_in(code).any(|tok| is_pseudo_variable(tok) || dead.contains(tok))
                || globals_in(code).any(|sym| FRAME_INTRINSICS.contains(&sym));
            if hit {
                removed[idx] = true;
                changed = true;
                if let Some(value) = assigned_local(line) {
                    dead.insert(value);
                }
            }
        }
        if !changed {
            break;
        }
    }

    let count = removed.iter().filter(|r| **r).count();
    let kept: Vec<&str> = lines
        .iter()
        .zip(&removed)
        .filter(|(_, r)| !**r)
        .map(|(l, _)| *l)
        .collect();
    (kept.join("\n"), count)
}

/// Replace pool allocations of tagged temporaries with `malloc(osize)`.
///
/// Must run before [`strip_scaffolding`]: the tag-address lines identify
/// which calls produce runtime objects.
pub fn substitute_allocator(body: &str) -> (String, usize) {
    let tagged: HashSet<String> = body
        .lines()
        .filter_map(assigned_local)
        .filter_map(|value| {
            bare_name(value)
                .strip_suffix(TAG_ADDR_SUFFIX)
                .map(local_value)
        })
        .collect();

    let mut count = 0;
    let lines: Vec<String> = body
        .split('\n')
        .map(|line| {
            let Some(caps) = POOL_ALLOC_CALL.captures(line) else {
                return line.to_string();
            };
            if !tagged.contains(&caps[2]) {
                return line.to_string();
            }
            let Some(osize) = caps[3]
                .split(',')
                .nth(2)
                .and_then(|arg| arg.split_whitespace().last())
            else {
                return line.to_string();
            };
            count += 1;
            format!("{}{} = call ptr @malloc(i64 {})", &caps[1], &caps[2], osize)
        })
        .collect();
    (lines.join("\n"), count)
}
