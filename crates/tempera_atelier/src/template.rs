//! Template tag grammar.
//!
//! Splits raw template text into content runs, `{% tags %}`, `{{ variables }}`
//! and comments. Whitespace inside tags is recorded as text so that default
//! emission reproduces the source exactly; the compiled emitter writes tags
//! in canonical form instead.

use compact_str::CompactString;
use once_cell::sync::Lazy;
use phf::phf_map;
use tempera_armature::{nest, rule, tokenize, Action::*, BlockMapping, Grammar, GrammarError};
use tempera_relief::{Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::debug;

/// One tag element or variable part: bare words and quoted strings.
const ELEMENT: &str = r#"(?:[^'"\s%}]+|"[^"]*"|'[^']*')+"#;

static GRAMMAR: Lazy<Result<Grammar, GrammarError>> = Lazy::new(|| {
    Grammar::builder("template")
        .state(
            "root",
            vec![
                rule(r"\{#", &[Start(NodeKind::TemplateComment), Record(None), Shift, Push("comment")]),
                rule(
                    r"\{%\s*comment\s*%\}",
                    &[Start(NodeKind::TemplateMultilineComment), Record(None), Shift, Push("multiline-comment")],
                ),
                rule(r"\{%", &[Start(NodeKind::TemplateTag), Shift, Push("tag")]),
                rule(r"\{\{", &[Start(NodeKind::TemplateVariable), Shift, Push("variable")]),
                rule(r"[^{]+", &[Start(NodeKind::Content), Record(None), Shift, Stop]),
                rule(r"\{", &[Start(NodeKind::Content), Record(None), Shift, Stop]).not_followed_by(r"[%#{]"),
                rule(r".", &[Fail("Error in parser")]),
            ],
        )
        .state(
            "comment",
            vec![
                rule(r"#\}", &[Record(None), Shift, Stop, Pop]),
                rule(r"[^\n#]+", &[Record(None), Shift]),
                rule(r"\n", &[Fail("No newlines allowed in single line template comment")]),
                rule(r"#", &[Record(None), Shift]),
            ],
        )
        .state(
            "multiline-comment",
            vec![
                rule(r"\{%\s*endcomment\s*%\}", &[Record(None), Shift, Stop, Pop]),
                rule(r"\{#", &[Start(NodeKind::TemplateComment), Record(None), Shift, Push("comment")]),
                rule(r"[^{]+", &[Record(None), Shift]),
                rule(r"\{", &[Record(None), Shift]),
            ],
        )
        .state(
            "tag",
            vec![
                rule(ELEMENT, &[Start(NodeKind::TemplateTagElement), Record(None), Shift, Stop]),
                rule(r"%\}", &[Stop, Shift, Pop]),
                rule(r"\s+", &[Record(None), Shift]),
                rule(r".", &[Fail("Error in parser: template tag")]),
            ],
        )
        .state(
            "variable",
            vec![
                rule(ELEMENT, &[Start(NodeKind::TemplateVariablePart), Record(None), Shift, Stop]),
                rule(r"\}\}", &[Stop, Shift, Pop]),
                rule(r"\s+", &[Record(None), Shift]),
                rule(r".", &[Fail("Error in parser: template variable")]),
            ],
        )
        .build()
});

/// Tags that stand alone, by tag name.
static INLINE_TAGS: phf::Map<&'static str, NodeKind> = phf_map! {
    "extends" => NodeKind::Extends,
    "include" => NodeKind::Include,
    "load" => NodeKind::Load,
    "trans" => NodeKind::Trans,
    "plural" => NodeKind::Plural,
    "url" => NodeKind::Url,
    "callmacro" => NodeKind::CallMacro,
    "!" => NodeKind::PreprocessorConfig,
};

/// `(opening tag, follow-up tags, construct kind)`; the last follow-up closes.
const BLOCK_TAGS: &[(&str, &[&str], NodeKind)] = &[
    ("block", &["endblock"], NodeKind::Block),
    ("blocktrans", &["plural", "endblocktrans"], NodeKind::BlockTrans),
    ("macro", &["endmacro"], NodeKind::Macro),
    ("ifdebug", &["endifdebug"], NodeKind::IfDebug),
    ("decorate", &["enddecorate"], NodeKind::Decorate),
    ("compress", &["endcompress"], NodeKind::Compress),
    ("!raw", &["!endraw"], NodeKind::RawOutput),
    ("if", &["else", "endif"], NodeKind::If),
    ("for", &["empty", "endfor"], NodeKind::For),
    ("ifequal", &["else", "endifequal"], NodeKind::IfEqual),
    ("ifnotequal", &["else", "endifnotequal"], NodeKind::IfNotEqual),
    ("with", &["endwith"], NodeKind::With),
    ("spaceless", &["endspaceless"], NodeKind::Spaceless),
    ("filter", &["endfilter"], NodeKind::Filter),
    ("autoescape", &["endautoescape"], NodeKind::AutoEscape),
];

static BLOCKS: Lazy<Result<BlockMapping<CompactString>, GrammarError>> = Lazy::new(|| {
    BlockMapping::build(BLOCK_TAGS.iter().map(|(open, follow, kind)| {
        let follow = follow.iter().map(|name| CompactString::from(*name)).collect();
        (CompactString::from(*open), follow, *kind)
    }))
});

pub fn grammar() -> CompileResult<&'static Grammar> {
    GRAMMAR.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

pub fn blocks() -> CompileResult<&'static BlockMapping<CompactString>> {
    BLOCKS.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

/// Tokenize raw template text and build its block structure.
pub fn parse(tree: &mut ParseTree) -> CompileResult<()> {
    let root = tree.root();
    tokenize(tree, root, grammar()?, &[], &[])?;
    specialize_inline_tags(tree, root);
    nest(tree, root, blocks()?, &[NodeKind::TemplateTag, NodeKind::Plural], |tree, id| {
        tag_name(tree, id)
    })
}

fn specialize_inline_tags(tree: &mut ParseTree, root: NodeId) {
    let mut count = 0usize;
    for tag in tree.descendants(root, &[NodeKind::TemplateTag], &[]) {
        let kind = tag_name(tree, tag).and_then(|name| INLINE_TAGS.get(name.as_str()).copied());
        if let Some(kind) = kind {
            tree.specialize(tag, kind);
            count += 1;
        }
    }
    debug!(path = tree.path(), inline = count, "specialize_inline_tags");
}

/// Element nodes of a tag. For nested constructs these are the parameters.
pub fn element_nodes(tree: &ParseTree, tag: NodeId) -> Vec<NodeId> {
    let node = tree.node(tag);
    let list = match node.construct() {
        Some(construct) => construct.params.as_slice(),
        None => node.children(),
    };
    list.iter()
        .filter_map(Child::as_node)
        .filter(|id| tree.kind(*id) == NodeKind::TemplateTagElement)
        .collect()
}

/// Element texts of a tag, in order.
pub fn elements(tree: &ParseTree, tag: NodeId) -> Vec<CompactString> {
    element_nodes(tree, tag)
        .into_iter()
        .map(|id| tree.raw_text(id))
        .collect()
}

/// First element of a tag.
pub fn tag_name(tree: &ParseTree, tag: NodeId) -> Option<CompactString> {
    element_nodes(tree, tag).first().map(|id| tree.raw_text(*id))
}

/// Concatenated parts of a `{{ variable }}`.
pub fn variable_name(tree: &ParseTree, variable: NodeId) -> CompactString {
    let mut name = CompactString::default();
    for part in tree.child_nodes(variable) {
        if tree.kind(part) == NodeKind::TemplateVariablePart {
            name.push_str(&tree.raw_text(part));
        }
    }
    name
}

/// Content of a quoted string element, or `None` for bare words.
pub fn literal(element: &str) -> Option<&str> {
    let mut chars = element.chars();
    match (chars.next(), chars.next_back()) {
        (Some(open @ ('"' | '\'')), Some(close)) if open == close && element.len() >= 2 => {
            Some(&element[1..element.len() - 1])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(source: &str) -> ParseTree {
        let mut tree = ParseTree::new("t.html", source);
        parse(&mut tree).unwrap();
        tree
    }

    fn kinds(tree: &ParseTree) -> Vec<NodeKind> {
        tree.child_nodes(tree.root()).map(|id| tree.kind(id)).collect()
    }

    #[test]
    fn test_token_kinds() {
        let tree = parsed("a {# note #}{{ x|y }}{% load i18n %}{% comment %}{# x #}{% endcomment %}");
        assert_eq!(
            kinds(&tree),
            vec![
                NodeKind::Content,
                NodeKind::TemplateComment,
                NodeKind::TemplateVariable,
                NodeKind::Load,
                NodeKind::TemplateMultilineComment,
            ]
        );
    }

    #[test]
    fn test_lone_braces_are_content() {
        let tree = parsed("a { b } {");
        assert!(kinds(&tree).iter().all(|kind| *kind == NodeKind::Content));
        assert_eq!(tree.serialize(), "a { b } {");
    }

    #[test]
    fn test_quoted_elements_keep_spaces() {
        let tree = parsed(r#"{% include "my file.html" %}"#);
        let tag = tree.child_nodes(tree.root()).next().unwrap();
        assert_eq!(elements(&tree, tag), vec!["include", "\"my file.html\""]);
    }

    #[test]
    fn test_variable_name() {
        let tree = parsed("{{ block.super }}{{a | b}}");
        let vars: Vec<CompactString> = tree
            .child_nodes(tree.root())
            .map(|id| variable_name(&tree, id))
            .collect();
        assert_eq!(vars, vec!["block.super", "a|b"]);
    }

    #[test]
    fn test_blocktrans_with_plural() {
        let tree = parsed("{% blocktrans %}one{% plural %}many{% endblocktrans %}");
        let node = tree.child_nodes(tree.root()).next().unwrap();
        assert_eq!(tree.kind(node), NodeKind::BlockTrans);
        assert_eq!(tree.branches(node).len(), 2);
    }

    #[test]
    fn test_newline_in_comment_is_an_error() {
        let mut tree = ParseTree::new("t.html", "{# a\nb #}");
        let err = parse(&mut tree).unwrap_err();
        assert!(err.to_string().contains("No newlines allowed"), "{err}");
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal("\"base.html\""), Some("base.html"));
        assert_eq!(literal("'x'"), Some("x"));
        assert_eq!(literal("\"x'"), None);
        assert_eq!(literal("name"), None);
        assert_eq!(literal("\""), None);
    }
}
