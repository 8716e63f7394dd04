//! # Rewrite passes
//!
//! Both passes edit an [`ExtractedIR`](crate::extract::ExtractedIR) in
//! place, one function body at a time:
//!
//! - [`gc`] - shadow-stack removal, allocator substitution, self-containment verdict
//! - [`container`] - the runtime's dynamically-sized container protocol to `malloc`/`calloc`

pub mod container;
pub mod gc;

pub use container::{ContainerPass, ContainerStats};
pub use gc::{is_self_contained, GcPass, GcStats};

use crate::extract::ExtractedIR;

pub const MALLOC_DECLARATION: &str = "declare noalias ptr @malloc(i64)";
pub const CALLOC_DECLARATION: &str = "declare noalias ptr @calloc(i64, i64)";

const ALLOCATION_CALLS: &[&str] = &[
    "@ijl_gc_pool_alloc",
    "@ijl_gc_small_alloc",
    "@ijl_gc_alloc",
    "@jl_gc_alloc",
    "@julia.gc_alloc_obj",
    "@ijl_alloc_genericmemory",
    "@jl_alloc_genericmemory",
    "@malloc(",
    "@calloc(",
];

/// True for a line calling an allocator, runtime or libc
pub(crate) fn is_allocation_call(line: &str) -> bool {
    line.contains(" call ") && ALLOCATION_CALLS.iter().any(|c| line.contains(c))
}

pub(crate) fn declare_malloc(ir: &mut ExtractedIR) {
    ir.declare("@malloc", MALLOC_DECLARATION);
}

pub(crate) fn declare_calloc(ir: &mut ExtractedIR) {
    ir.declare("@calloc", CALLOC_DECLARATION);
}
