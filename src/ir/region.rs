//! Delimiter matching over IR text
//!
//! Function bodies, struct types and attribute groups are all brace
//! delimited. Matching is aware of quoted names and string constants
//! (`@"a{b"`, `c"{\00"`) and of `;` line comments, so braces inside those
//! never count.

/// A delimited region of a text, as byte offsets.
///
/// `open` is the offset of the opening delimiter and `close` the offset of
/// its matching closing delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Offset of the opening delimiter
    pub open: usize,
    /// Offset of the matching closing delimiter
    pub close: usize,
}

impl Region {
    /// Text strictly between the delimiters
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open + 1..self.close]
    }

    /// Text including both delimiters
    pub fn outer<'a>(&self, text: &'a str) -> &'a str {
        &text[self.open..=self.close]
    }

    /// Offset one past the closing delimiter
    pub fn end(&self) -> usize {
        self.close + 1
    }
}

/// Find the delimiter matching the one at `open_at`.
///
/// Returns `None` if `open_at` does not hold `open`, or if the text ends
/// before the region is balanced.
pub fn match_region(text: &str, open_at: usize, open: u8, close: u8) -> Option<Region> {
    let bytes = text.as_bytes();
    if bytes.get(open_at) != Some(&open) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_quote = false;
    let mut in_comment = false;

    for (idx, &b) in bytes.iter().enumerate().skip(open_at) {
        if in_comment {
            if b == b'\n' {
                in_comment = false;
            }
            continue;
        }
        if in_quote {
            // IR strings escape with `\XX` hex pairs, never `\"`
            if b == b'"' {
                in_quote = false;
            }
            continue;
        }

        match b {
            b'"' => in_quote = true,
            b';' => in_comment = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(Region {
                        open: open_at,
                        close: idx,
                    });
                }
            }
            _ => {}
        }
    }

    None
}

/// Match a `{ ... }` region starting at `open_at`
pub fn match_braces(text: &str, open_at: usize) -> Option<Region> {
    match_region(text, open_at, b'{', b'}')
}

/// Offset of the first `open` delimiter at or after `from` that is not
/// inside a quote or comment
pub fn find_open(text: &str, from: usize, open: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut in_quote = false;
    let mut in_comment = false;

    for (idx, &b) in bytes.iter().enumerate().skip(from) {
        if in_comment {
            in_comment = b != b'\n';
            continue;
        }
        if in_quote {
            in_quote = b != b'"';
            continue;
        }
        match b {
            b'"' => in_quote = true,
            b';' => in_comment = true,
            _ if b == open => return Some(idx),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_braces() {
        let text = "define void @f() {\n  ret void\n}\n";
        let open = text.find('{').unwrap();
        let region = match_braces(text, open).unwrap();
        assert_eq!(region.inner(text), "\n  ret void\n");
        assert_eq!(&text[region.end()..], "\n");
    }

    #[test]
    fn test_nested_struct_types() {
        let text = "{ %x = alloca { i64, { ptr, ptr } }\n}";
        let region = match_braces(text, 0).unwrap();
        assert_eq!(region.close, text.len() - 1);
    }

    #[test]
    fn test_braces_in_strings_and_comments_ignored() {
        let text = "{\n  ; closing } in a comment\n  store [2 x i8] c\"}{\", ptr @\"a}b\"\n}";
        let region = match_braces(text, 0).unwrap();
        assert_eq!(region.close, text.len() - 1);
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(match_braces("{ { }", 0), None);
        assert_eq!(match_braces("x{}", 0), None);
    }

    #[test]
    fn test_find_open_skips_quotes() {
        let text = "@\"{\" = global i8 0 {";
        assert_eq!(find_open(text, 0, b'{'), Some(text.len() - 1));
    }
}
