//! Symbol and value-name helpers shared by the extractor and the passes
//!
//! Renaming is token exact: `@julia_f_1` never matches inside
//! `@julia_f_12`, and quoted names are matched as a whole.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

lazy_static! {
    /// A global symbol reference, quoted or bare
    pub static ref GLOBAL_TOKEN: Regex =
        Regex::new(r#"@"[^"]*"|@[-a-zA-Z$._0-9]+"#).unwrap();

    /// A local value reference, quoted or bare
    pub static ref LOCAL_TOKEN: Regex =
        Regex::new(r#"%"[^"]*"|%[-a-zA-Z$._0-9]+"#).unwrap();

    /// An integer literal cast to a pointer, i.e. a baked-in runtime address
    pub static ref ADDRESS_CAST: Regex =
        Regex::new(r"inttoptr\s*\(?\s*i64\s+(\d+)\s+to\b").unwrap();

    /// Name of a function compiled by the runtime JIT
    static ref COMPILED_NAME: Regex = Regex::new(r"^julia_(.+)_(\d+)$").unwrap();

    static ref BARE_IDENT: Regex = Regex::new(r"^[-a-zA-Z$._][-a-zA-Z$._0-9]*$").unwrap();
}

/// Strip the sigil and any quotes from a symbol or value name
pub fn bare_name(token: &str) -> &str {
    token
        .trim_start_matches(['@', '%'])
        .trim_matches('"')
}

/// Render a global symbol, quoting names that need it
pub fn global_symbol(name: &str) -> String {
    if BARE_IDENT.is_match(name) {
        format!("@{}", name)
    } else {
        format!("@\"{}\"", name)
    }
}

/// Render a local value name, quoting names that need it
pub fn local_value(name: &str) -> String {
    if BARE_IDENT.is_match(name) {
        format!("%{}", name)
    } else {
        format!("%\"{}\"", name)
    }
}

/// Derive a helper value name from an existing one, e.g. `%5` + `bytes`
/// gives `%"5.bytes"` and `%mem` gives `%mem.bytes`
pub fn derived_local(token: &str, suffix: &str) -> String {
    local_value(&format!("{}.{}", bare_name(token), suffix))
}

/// Replace any character that cannot appear in a bare identifier
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Split a compiled function name such as `julia_foo_42` into `("foo", 42)`
pub fn parse_compiled_name(name: &str) -> Option<(&str, u64)> {
    let caps = COMPILED_NAME.captures(bare_name(name))?;
    let stem = caps.get(1)?.as_str();
    let counter = caps.get(2)?.as_str().parse().ok()?;
    Some((stem, counter))
}

/// Rename global symbols according to `renames`.
///
/// Keys and values are full tokens including the `@` sigil.
pub fn rename_globals(text: &str, renames: &HashMap<String, String>) -> String {
    if renames.is_empty() {
        return text.to_string();
    }
    GLOBAL_TOKEN
        .replace_all(text, |caps: &Captures| {
            let token = &caps[0];
            renames
                .get(token)
                .cloned()
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// All local value names referenced on a line, in order
pub fn locals_in(line: &str) -> impl Iterator<Item = &str> {
    LOCAL_TOKEN.find_iter(line).map(|m| m.as_str())
}

/// All global symbols referenced on a line, in order
pub fn globals_in(line: &str) -> impl Iterator<Item = &str> {
    GLOBAL_TOKEN.find_iter(line).map(|m| m.as_str())
}

/// The value a line assigns, for `%x = ...` lines
pub fn assigned_local(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let eq = trimmed.find(" = ")?;
    let lhs = trimmed[..eq].trim();
    if lhs.starts_with('%') && LOCAL_TOKEN.find(lhs).map(|m| m.as_str()) == Some(lhs) {
        Some(lhs)
    } else {
        None
    }
}

/// First raw address cast on a line
pub fn address_cast(text: &str) -> Option<u64> {
    ADDRESS_CAST
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_is_token_exact() {
        let mut renames = HashMap::new();
        renames.insert("@julia_f_1".to_string(), "@main".to_string());
        let text = "call i64 @julia_f_1(i64 %0)\ncall i64 @julia_f_12(i64 %0)";
        let out = rename_globals(text, &renames);
        assert_eq!(out, "call i64 @main(i64 %0)\ncall i64 @julia_f_12(i64 %0)");
    }

    #[test]
    fn test_rename_quoted() {
        let mut renames = HashMap::new();
        renames.insert("@\"jl_global#12\"".to_string(), "@Main_x".to_string());
        let out = rename_globals("load i64, ptr @\"jl_global#12\", align 8", &renames);
        assert_eq!(out, "load i64, ptr @Main_x, align 8");
    }

    #[test]
    fn test_compiled_names() {
        assert_eq!(parse_compiled_name("@julia_add_one_77"), Some(("add_one", 77)));
        assert_eq!(parse_compiled_name("@\"julia_push!_3\""), Some(("push!", 3)));
        assert_eq!(parse_compiled_name("@jfptr_add_78"), None);
    }

    #[test]
    fn test_local_naming() {
        assert_eq!(derived_local("%5", "bytes"), "%\"5.bytes\"");
        assert_eq!(derived_local("%\"box::Foo\"", "data"), "%\"box::Foo.data\"");
        assert_eq!(global_symbol("jl_global#1"), "@\"jl_global#1\"");
    }

    #[test]
    fn test_assigned_local() {
        assert_eq!(assigned_local("  %x = add i64 1, 2"), Some("%x"));
        assert_eq!(assigned_local("  %\"a b\" = add i64 1, 2"), Some("%\"a b\""));
        assert_eq!(assigned_local("  store i64 1, ptr %x"), None);
    }

    #[test]
    fn test_address_cast() {
        assert_eq!(
            address_cast("@x = private constant ptr inttoptr (i64 140234 to ptr)"),
            Some(140234)
        );
        assert_eq!(address_cast("%1 = inttoptr i64 %0 to ptr"), None);
    }
}
