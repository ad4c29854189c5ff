//! Short identifier generation.

use tempera_carton::{phf_set, CompactString, FxHashSet, PhfSet};

/// Script keywords and reserved words, never usable as identifiers.
static RESERVED: PhfSet<&'static str> = phf_set! {
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
};

#[inline]
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// The `n`-th short name: `a` … `z`, `aa`, `ab` … `az`, `ba` …
///
/// # Examples
/// ```
/// use tempera_croquis::nth_name;
///
/// assert_eq!(nth_name(0), "a");
/// assert_eq!(nth_name(25), "z");
/// assert_eq!(nth_name(26), "aa");
/// assert_eq!(nth_name(52), "ba");
/// ```
pub fn nth_name(n: usize) -> CompactString {
    let mut letters = Vec::new();
    let mut rest = n + 1;
    while rest > 0 {
        rest -= 1;
        letters.push(b'a' + (rest % 26) as u8);
        rest /= 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// Shortest name that is neither reserved nor in `avoid`.
pub fn shortest_free_name(avoid: &FxHashSet<CompactString>) -> CompactString {
    let mut n = 0;
    loop {
        let name = nth_name(n);
        if !avoid.contains(&name) && !is_reserved(&name) {
            return name;
        }
        n += 1;
    }
}
