//! Stylesheet grammar, compression and `url()` rewriting.

use once_cell::sync::Lazy;
use regex::Regex;
use tempera_armature::{rule, tokenize, Action::*, Grammar, GrammarError};
use tempera_carton::{ContentHash, MediaCache};
use tempera_relief::{Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::debug;

use crate::emit::CompiledEmitter;
use crate::markup::{flatten_content, single_text, REGION_CONTENT};

static GRAMMAR: Lazy<Result<Grammar, GrammarError>> = Lazy::new(|| {
    Grammar::builder("stylesheet")
        .state(
            "root",
            vec![
                // `.` and `#` are not here: dropping the space in front of
                // them changes the selector.
                rule(r"\s*[{}():;,]\s*", &[Start(NodeKind::CssOperator), Record(None), Shift, Stop]),
                rule(r#"""#, &[Push("double-quoted-string"), Start(NodeKind::CssString), Record(None), Shift]),
                rule(r"'", &[Push("single-quoted-string"), Start(NodeKind::CssString), Record(None), Shift]),
                rule(r"/\*", &[Push("multiline-comment"), Shift]),
                rule(r"//", &[Push("singleline-comment"), Shift]),
                rule(r"<!--|-->", &[Shift]),
                rule(r"url\(", &[Shift, Start(NodeKind::CssUrl), Push("url")]),
                rule(r#"[^\s{}();:,"'/]+"#, &[Record(None), Shift]),
                rule(r"/", &[Record(None), Shift]).not_followed_by(r"[/*]"),
                rule(r"\s+", &[Start(NodeKind::CssWhitespace), Record(None), Shift, Stop]),
                rule(r".", &[Fail("Parse error in stylesheet")]),
            ],
        )
        .state(
            "double-quoted-string",
            vec![
                rule(r#"""#, &[Record(None), Pop, Shift, Stop]),
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r#"[^"\\]+"#, &[Record(None), Shift]),
            ],
        )
        .state(
            "single-quoted-string",
            vec![
                rule(r"'", &[Record(None), Pop, Shift, Stop]),
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r"[^'\\]+", &[Record(None), Shift]),
            ],
        )
        .state(
            "multiline-comment",
            vec![
                rule(r"\*/", &[Shift, Pop]),
                rule(r"[^*]+", &[Shift]),
                rule(r"\*", &[Shift]),
            ],
        )
        .tolerant_state(
            "singleline-comment",
            vec![rule(r"\n", &[Shift, Pop]), rule(r"[^\n]+", &[Shift])],
        )
        .state(
            "url",
            vec![
                rule(r#"""#, &[Push("url-double-quoted"), Shift]),
                rule(r"'", &[Push("url-single-quoted"), Shift]),
                rule(r#"[^'")]+"#, &[Record(None), Shift]),
                rule(r"\)", &[Shift, Pop, Stop]),
            ],
        )
        .state(
            "url-double-quoted",
            vec![
                rule(r#"""#, &[Shift, Pop]),
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r#"[^"\\]+"#, &[Record(None), Shift]),
            ],
        )
        .state(
            "url-single-quoted",
            vec![
                rule(r"'", &[Shift, Pop]),
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r"[^'\\]+", &[Record(None), Shift]),
            ],
        )
        .build()
});

static ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(.)").unwrap());
static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());

pub fn grammar() -> CompileResult<&'static Grammar> {
    GRAMMAR.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

/// Compress the stylesheet inside `region`, in place.
pub fn compile_region(tree: &mut ParseTree, region: NodeId, cache: &MediaCache) -> CompileResult<()> {
    flatten_content(tree, region);
    if let Some(text) = single_text(tree, region) {
        if let Ok(compiled) = compile_stylesheet_source(&text, tree.path(), None, cache) {
            tree.set_children(region, vec![Child::Text(compiled.into())]);
            return Ok(());
        }
    }

    tokenize(tree, region, grammar()?, REGION_CONTENT, NodeKind::TEMPLATE_CONSTRUCTS)?;
    normalize_urls(tree, region, None);
    compress(tree, region);
    debug!(path = tree.path(), "compile_region: stylesheet");
    Ok(())
}

/// Compress a complete stylesheet file.
///
/// With `url`, the public location of the file, relative `url()` values
/// are rewritten against the file's directory.
pub fn compile_stylesheet_source(
    source: &str,
    path: &str,
    url: Option<&str>,
    cache: &MediaCache,
) -> CompileResult<String> {
    let key = ContentHash::of_parts(&["stylesheet", url.unwrap_or(""), source]);
    let compiled = cache.get_or_compile(key, || {
        let mut tree = ParseTree::new(path, source);
        let root = tree.root();
        tokenize(&mut tree, root, grammar()?, &[], &[])?;
        normalize_urls(&mut tree, root, url);
        compress(&mut tree, root);
        Ok::<_, CompileError>(tree.serialize_with(root, &CompiledEmitter))
    })?;
    Ok(compiled.to_string())
}

/// Unescape and trim every `url()` value, rewriting relative ones against
/// `base` when given.
fn normalize_urls(tree: &mut ParseTree, node: NodeId, base: Option<&str>) {
    for id in tree.descendants(node, &[NodeKind::CssUrl], &[]) {
        let mut list: Vec<Child> = tree
            .take_branch(id, 0)
            .into_iter()
            .map(|child| match child {
                Child::Text(text) => Child::Text(ESCAPE.replace_all(&text, "$1").as_ref().into()),
                node => node,
            })
            .collect();
        if let Some(Child::Text(first)) = list.first_mut() {
            *first = first.trim_start().into();
        }
        if let Some(Child::Text(last)) = list.last_mut() {
            *last = last.trim_end().into();
        }

        if let (Some(base), [Child::Text(value)]) = (base, list.as_slice()) {
            if !is_absolute(value) {
                let rewritten = rewrite(base, value);
                list = vec![Child::Text(rewritten.into())];
            }
        }
        tree.set_branch(id, 0, list);
    }
}

/// Scheme URLs, absolute paths and fragment references are kept.
fn is_absolute(url: &str) -> bool {
    url.starts_with('/') || url.starts_with('#') || SCHEME.is_match(url)
}

/// Join `url` to the directory of `base` and resolve `.` and `..`.
fn rewrite(base: &str, url: &str) -> String {
    let directory = base.rfind('/').map_or("", |i| &base[..=i]);
    normalize_path(&format!("{directory}{url}"))
}

fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Operators lose their padding. Other whitespace runs become one space,
/// or nothing next to an operator or at the edges of the stylesheet.
fn compress(tree: &mut ParseTree, region: NodeId) {
    compress_lists(tree, region, true);
}

fn compress_lists(tree: &mut ParseTree, owner: NodeId, edges: bool) {
    for branch in 0..tree.branches(owner).len() {
        let list: Vec<Child> = tree.branches(owner)[branch].clone();
        for (index, child) in list.iter().enumerate() {
            let Child::Node(id) = *child else {
                continue;
            };
            match tree.kind(id) {
                NodeKind::CssWhitespace => {
                    let before = index.checked_sub(1).and_then(|i| list.get(i));
                    let after = list.get(index + 1);
                    let dropped = (edges && (before.is_none() || after.is_none()))
                        || is_operator(tree, before)
                        || is_operator(tree, after);
                    let text = if dropped { "" } else { " " };
                    tree.set_children(id, vec![Child::Text(text.into())]);
                }
                NodeKind::CssOperator => {
                    let trimmed = tree.raw_text(id).trim().to_string();
                    tree.set_children(id, vec![Child::Text(trimmed.into())]);
                }
                NodeKind::CssString | NodeKind::CssUrl => {}
                _ => compress_lists(tree, id, false),
            }
        }
    }
}

fn is_operator(tree: &ParseTree, child: Option<&Child>) -> bool {
    matches!(child, Some(Child::Node(id)) if tree.kind(*id) == NodeKind::CssOperator)
}
