//! Script grammar and compilation of script regions.

use once_cell::sync::Lazy;
use tempera_armature::{rule, tokenize, Action::*, Grammar, GrammarError};
use tempera_carton::{ContentHash, MediaCache};
use tempera_croquis::resolve_and_minify;
use tempera_relief::{Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::debug;

use crate::emit::CompiledEmitter;
use crate::markup::{flatten_content, single_text, REGION_CONTENT};

const KEYWORDS: &str = r"(?:break|case|catch|const|continue|debugger|default|delete|do|else|enum|false|finally|for|function|if|instanceof|in|let|new|null|return|switch|this|throw|true|try|typeof|var|void|while|with)";

static GRAMMAR: Lazy<Result<Grammar, GrammarError>> = Lazy::new(|| {
    Grammar::builder("script")
        .state(
            "root",
            vec![
                rule(r"\s*\{\s*", &[Start(NodeKind::JsScope), Shift]),
                rule(r"\s*\}", &[Stop, Shift]),
                rule(r"/\*", &[Push("multiline-comment"), Shift]),
                rule(r"//", &[Push("singleline-comment"), Shift]),
                rule(r#"""#, &[Push("double-quoted-string"), Start(NodeKind::JsDoubleQuotedString), Shift]),
                rule(r"'", &[Push("single-quoted-string"), Start(NodeKind::JsSingleQuotedString), Shift]),
                rule(KEYWORDS, &[Start(NodeKind::JsKeyword), Record(None), Shift, Stop])
                    .not_followed_by(r"[a-zA-Z0-9_$]"),
                rule(r"[ \t]*[;,=?:|^&!<>*%~.+-][ \t]*", &[Start(NodeKind::JsOperator), Record(None), Shift, Stop]),
                rule(r"\s*\(\s*", &[Start(NodeKind::JsParentheses), Shift]),
                rule(r"\s*\)", &[Stop, Shift, Push("after-value")]),
                rule(r"\s*\[\s*", &[Start(NodeKind::JsSquareBrackets), Shift]),
                rule(r"\s*\]", &[Stop, Shift, Push("after-value")]),
                rule(
                    r"[a-zA-Z_$][a-zA-Z_$0-9]*",
                    &[Start(NodeKind::JsVariable), Record(None), Shift, Stop, Push("after-value")],
                ),
                rule(
                    r"[0-9][0-9a-zA-Z_.]*",
                    &[Start(NodeKind::JsNumber), Record(None), Shift, Stop, Push("after-value")],
                ),
                rule(r"\s+", &[Start(NodeKind::JsWhitespace), Record(None), Shift, Stop]),
                rule(r"\s*/", &[Start(NodeKind::JsRegex), Record(None), Shift, Push("regex")]).not_followed_by(r"[/*]"),
                rule(r".", &[Fail("Unexpected character in script")]),
            ],
        )
        .state(
            "double-quoted-string",
            vec![
                rule(r#"""#, &[Pop, Shift, Stop]),
                rule(r"\\'", &[Record(Some("'")), Shift]),
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r#"[^"\\]+"#, &[Record(None), Shift]),
            ],
        )
        .state(
            "single-quoted-string",
            vec![
                rule(r"'", &[Pop, Shift, Stop]),
                rule(r#"\\""#, &[Record(Some("\"")), Shift]),
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
            vec![
                rule(r"\n", &[Pop, Start(NodeKind::JsWhitespace), Record(None), Shift, Stop]),
                rule(r"[^\n]+", &[Shift]),
            ],
        )
        .tolerant_state(
            "after-value",
            vec![
                rule(r"[ \t]*/[ \t]*", &[Start(NodeKind::JsOperator), Record(None), Shift, Stop])
                    .not_followed_by(r"[/*]"),
                rule(r"/\*", &[Push("multiline-comment"), Shift]),
                rule(r"//[^\n]*", &[Shift]),
                rule(r"", &[Pop]),
            ],
        )
        .state(
            "regex",
            vec![
                rule(r"(?s)\\.", &[Record(None), Shift]),
                rule(r"\[(?:\\.|[^\]\\\n])*\]", &[Record(None), Shift]),
                rule(r"[^/\\\[\n]+", &[Record(None), Shift]),
                rule(r"/[a-z]*", &[Record(None), Shift, Stop, Pop, Push("after-value")]),
                rule(r"\n", &[Fail("Unterminated regular expression")]),
            ],
        )
        .build()
});

pub fn grammar() -> CompileResult<&'static Grammar> {
    GRAMMAR.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

/// Minify the script inside `region`, in place.
///
/// Pure text regions go through the media cache; a region that fails there
/// is compiled again in the tree so the error points into the template.
pub fn compile_region(tree: &mut ParseTree, region: NodeId, cache: &MediaCache) -> CompileResult<()> {
    flatten_content(tree, region);
    if let Some(text) = single_text(tree, region) {
        if let Ok(compiled) = compile_script_source(&text, tree.path(), cache) {
            tree.set_children(region, vec![Child::Text(compiled.into())]);
            return Ok(());
        }
    }

    tokenize(tree, region, grammar()?, REGION_CONTENT, NodeKind::TEMPLATE_CONSTRUCTS)?;
    compress(tree, region);
    let report = resolve_and_minify(tree, region)?;
    debug!(path = tree.path(), free = report.free.len(), "compile_region: script");
    Ok(())
}

/// Minify a complete script file.
pub fn compile_script_source(source: &str, path: &str, cache: &MediaCache) -> CompileResult<String> {
    let key = ContentHash::of_parts(&["script", source]);
    let compiled = cache.get_or_compile(key, || {
        let mut tree = ParseTree::new(path, source);
        let root = tree.root();
        tokenize(&mut tree, root, grammar()?, &[], &[])?;
        compress(&mut tree, root);
        resolve_and_minify(&mut tree, root)?;
        Ok::<_, CompileError>(tree.serialize_with(root, &CompiledEmitter))
    })?;
    Ok(compiled.to_string())
}

/// Strip whitespace that carries no meaning.
fn compress(tree: &mut ParseTree, region: NodeId) {
    compress_lists(tree, region, true);
}

/// Operators lose their padding. A whitespace run is dropped at the edges
/// of a bracketed list and next to punctuation; a line break is only
/// dropped next to an operator that cannot end a statement, so automatic
/// semicolon insertion still sees it.
fn compress_lists(tree: &mut ParseTree, owner: NodeId, bracketed: bool) {
    for branch in 0..tree.branches(owner).len() {
        let list: Vec<Child> = tree.branches(owner)[branch].clone();
        let mut run: Vec<NodeId> = Vec::new();
        for (index, child) in list.iter().enumerate() {
            let Child::Node(id) = *child else {
                continue;
            };
            match tree.kind(id) {
                NodeKind::JsWhitespace => {
                    run.push(id);
                    let run_ends = !matches!(list.get(index + 1), Some(Child::Node(next)) if tree.kind(*next) == NodeKind::JsWhitespace);
                    if run_ends {
                        let before = (index + 1).checked_sub(run.len() + 1).map(|i| &list[i]);
                        let after = list.get(index + 1);
                        compress_run(tree, &run, before, after, bracketed);
                        run.clear();
                    }
                }
                NodeKind::JsOperator => {
                    let trimmed = tree.raw_text(id).trim().to_string();
                    tree.set_children(id, vec![Child::Text(trimmed.into())]);
                }
                NodeKind::JsScope | NodeKind::JsParentheses | NodeKind::JsSquareBrackets => {
                    compress_lists(tree, id, true);
                }
                _ => compress_lists(tree, id, false),
            }
        }
    }
}

fn compress_run(tree: &mut ParseTree, run: &[NodeId], before: Option<&Child>, after: Option<&Child>, bracketed: bool) {
    let newline = run.iter().any(|id| tree.raw_text(*id).contains('\n'));
    let kept = match (before, after) {
        (None, _) | (_, None) if bracketed => "",
        (Some(before), Some(after)) if newline => {
            if ends_statement_safely(tree, before) || ends_statement_safely(tree, after) {
                ""
            } else {
                "\n"
            }
        }
        (Some(before), Some(after)) if is_punctuation(tree, before) || is_punctuation(tree, after) => "",
        _ if newline => "\n",
        _ => " ",
    };
    for (i, id) in run.iter().enumerate() {
        let text = if i == 0 { kept } else { "" };
        tree.set_children(*id, vec![Child::Text(text.into())]);
    }
}

fn is_punctuation(tree: &ParseTree, child: &Child) -> bool {
    matches!(child, Child::Node(id) if matches!(
        tree.kind(*id),
        NodeKind::JsOperator
            | NodeKind::JsScope
            | NodeKind::JsParentheses
            | NodeKind::JsSquareBrackets
            | NodeKind::JsDoubleQuotedString
            | NodeKind::JsSingleQuotedString
    ))
}

/// Operators other than `+` and `-` never end a statement.
fn ends_statement_safely(tree: &ParseTree, child: &Child) -> bool {
    matches!(child, Child::Node(id) if tree.kind(*id) == NodeKind::JsOperator
        && !matches!(tree.raw_text(*id).trim(), "+" | "-"))
}
