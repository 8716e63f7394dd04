//! Property-based tests for the IR text utilities and the writer
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Block splitting and rejoining never loses text
//! 2. The region matcher finds the matching brace at any nesting depth
//! 3. Renaming is a no-op without renames and never touches longer names
//! 4. Writing the same content twice performs no second write

use proptest::prelude::*;
use statify::ir::symbols::rename_globals;
use statify::ir::{join_blocks, match_braces, split_blocks};
use statify::{write_if_changed, WriteStatus};
use std::collections::HashMap;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Lines that look like IR: labels, instructions, comments and blanks
fn ir_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z_][a-zA-Z0-9_.]{0,8}:".prop_map(|s| s),
        "  %[a-z0-9]{1,4} = add i64 %[a-z0-9]{1,4}, [0-9]{1,3}".prop_map(|s| s),
        "  br label %[a-zA-Z0-9]{1,6}".prop_map(|s| s),
        "  ; [a-z {}]{0,16}".prop_map(|s| s),
        Just(String::new()),
    ]
}

fn ir_body() -> impl Strategy<Value = String> {
    prop::collection::vec(ir_line(), 0..40).prop_map(|lines| lines.join("\n"))
}

/// Brace-free filler text (no quotes or comment markers either)
fn filler() -> impl Strategy<Value = String> {
    "[a-z0-9 %@=,\n]{0,12}".prop_map(|s| s)
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn split_then_join_is_lossless(body in ir_body()) {
        prop_assert_eq!(join_blocks(&split_blocks(&body)), body);
    }

    #[test]
    fn every_block_after_the_first_is_labelled(body in ir_body()) {
        let blocks = split_blocks(&body);
        prop_assert!(blocks[0].label.is_none());
        for block in &blocks[1..] {
            prop_assert!(block.label.is_some());
        }
    }

    #[test]
    fn outer_brace_matches_last_byte(depth in 1usize..12, parts in prop::collection::vec(filler(), 24)) {
        let mut text = String::new();
        for part in parts.iter().take(depth) {
            text.push('{');
            text.push_str(part);
        }
        for part in parts.iter().skip(12).take(depth) {
            text.push_str(part);
            text.push('}');
        }
        let region = match_braces(&text, 0).unwrap();
        prop_assert_eq!(region.close, text.len() - 1);
    }

    #[test]
    fn unbalanced_text_has_no_region(depth in 2usize..12, fill in filler()) {
        let text = format!("{}{}{}", "{".repeat(depth), fill, "}".repeat(depth - 1));
        prop_assert!(match_braces(&text, 0).is_none());
    }

    #[test]
    fn rename_without_renames_is_identity(body in ir_body()) {
        prop_assert_eq!(rename_globals(&body, &HashMap::new()), body);
    }

    #[test]
    fn rename_is_token_exact(counter in 1u32..1000, suffix in 0u32..10) {
        let short = format!("@julia_f_{}", counter);
        let long = format!("@julia_f_{}{}", counter, suffix);
        let mut renames = HashMap::new();
        renames.insert(short.clone(), "@main".to_string());
        let text = format!("call void {}()\ncall void {}()", short, long);
        let out = rename_globals(&text, &renames);
        prop_assert_eq!(out, format!("call void @main()\ncall void {}()", long));
    }

    #[test]
    fn second_write_is_unchanged(content in "[ -~\n]{1,200}") {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.ir");
        prop_assert_eq!(write_if_changed(&path, &content).unwrap(), WriteStatus::Written);
        prop_assert_eq!(write_if_changed(&path, &content).unwrap(), WriteStatus::Unchanged);
    }
}
