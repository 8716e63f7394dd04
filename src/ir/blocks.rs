//! Basic block splitting for function bodies
//!
//! A body is split at label lines (`name:` at column 0). Lines are owned
//! values so several rewrites can edit, drop and blank them without any
//! offset bookkeeping; [`join_blocks`] reassembles the body text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LABEL_LINE: Regex =
        Regex::new(r#"^(?:"([^"]+)"|([-a-zA-Z$._0-9]+)):"#).unwrap();
}

/// A basic block of a function body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Block label without the trailing colon; `None` for the text before
    /// the first label (the implicit entry block)
    pub label: Option<String>,
    /// Position of the block within the body
    pub sequence_index: usize,
    /// Lines of the block, label line included
    pub lines: Vec<String>,
}

impl BasicBlock {
    /// Whether the block was blanked (or never had text)
    pub fn is_blank(&self) -> bool {
        self.lines.is_empty()
    }

    /// Remove every line, label included
    pub fn blank(&mut self) {
        self.lines.clear();
    }

    /// True if the label equals `name` (given with or without `%`)
    pub fn has_label(&self, name: &str) -> bool {
        let name = name.strip_prefix('%').unwrap_or(name);
        let name = name.trim_matches('"');
        self.label.as_deref() == Some(name)
    }
}

/// Label defined by a line, if it is a label line
pub fn label_of(line: &str) -> Option<String> {
    LABEL_LINE.captures(line).map(|cap| {
        cap.get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    })
}

/// Split a function body into basic blocks
pub fn split_blocks(body: &str) -> Vec<BasicBlock> {
    let mut blocks: Vec<BasicBlock> = vec![BasicBlock {
        label: None,
        sequence_index: 0,
        lines: Vec::new(),
    }];

    for line in body.split('\n') {
        if let Some(label) = label_of(line) {
            blocks.push(BasicBlock {
                label: Some(label),
                sequence_index: blocks.len(),
                lines: vec![line.to_string()],
            });
        } else if let Some(current) = blocks.last_mut() {
            current.lines.push(line.to_string());
        }
    }

    blocks
}

/// Reassemble blocks into body text. Blank blocks contribute nothing.
pub fn join_blocks(blocks: &[BasicBlock]) -> String {
    blocks
        .iter()
        .flat_map(|block| block.lines.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\ntop:\n  %0 = add i64 %a, 1\n  br label %L3\n\nL3:                                               ; preds = %top\n  ret i64 %0\n";

    #[test]
    fn test_split_labels() {
        let blocks = split_blocks(BODY);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].label, None);
        assert_eq!(blocks[1].label.as_deref(), Some("top"));
        assert_eq!(blocks[2].label.as_deref(), Some("L3"));
        assert_eq!(blocks[2].sequence_index, 2);
        assert!(blocks[2].has_label("%L3"));
    }

    #[test]
    fn test_join_is_lossless() {
        assert_eq!(join_blocks(&split_blocks(BODY)), BODY);
    }

    #[test]
    fn test_blank_block_disappears() {
        let mut blocks = split_blocks(BODY);
        blocks[2].blank();
        let text = join_blocks(&blocks);
        assert!(!text.contains("L3:"));
        assert!(text.contains("br label %L3"));
    }

    #[test]
    fn test_quoted_and_numeric_labels() {
        assert_eq!(label_of("\"L 5\":").as_deref(), Some("L 5"));
        assert_eq!(label_of("12:   ; preds = %3").as_deref(), Some("12"));
        assert_eq!(label_of("  %1 = load i64, ptr %x"), None);
    }
}
