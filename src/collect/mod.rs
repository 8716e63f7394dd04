//! # Discovery
//!
//! Finds what the output has to contain: the functions reachable from the
//! entry point ([`call_graph`]) and the mutable bindings that become static
//! globals ([`bindings`]), encoded by [`encode`].

pub mod bindings;
pub mod call_graph;
pub mod encode;

pub use bindings::{collect_bindings, BindingScan, GlobalBinding};
pub use call_graph::{collect_call_graph, CallGraph, CallGraphEntry, SKIPPED_BUILTINS};
pub use encode::{encode_scalar_or_aggregate, encode_value, EncodedValue};
