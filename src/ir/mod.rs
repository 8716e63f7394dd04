//! # IR text utilities
//!
//! Structural helpers over the textual IR the runtime JIT emits:
//!
//! - [`region`] - brace matching that respects quotes and comments
//! - [`blocks`] - basic block splitting and reassembly
//! - [`symbols`] - token-exact symbol renaming and name helpers

pub mod blocks;
pub mod region;
pub mod symbols;

pub use blocks::{join_blocks, split_blocks, BasicBlock};
pub use region::{find_open, match_braces, match_region, Region};
pub use symbols::rename_globals;
