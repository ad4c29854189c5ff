//! Markup grammar and the passes run over markup.
//!
//! Markup is lexed inside the content runs left by the template grammar.
//! Template constructs are entered as separate runs; every other template
//! node stays where it is, so lexer state carries across `{{ variables }}`
//! inside attribute values or script bodies.
//!
//! Script and style bodies are lexed as raw text up to their closing tag.

use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use tempera_armature::{nest, rule, tokenize, Action, Action::*, BlockMapping, Grammar, GrammarError, RuleSpec};
use tempera_relief::{push_child, Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::debug;

use crate::context::CompileContext;
use crate::{pack, script, stylesheet};

/// Entity reference such as `&amp;` or `&#160;`.
const ENTITY: &str = r"&[#a-zA-Z0-9]+;";

/// Kinds whose whitespace is significant.
const PRESERVE_WHITESPACE: &[NodeKind] = &[
    NodeKind::HtmlScript,
    NodeKind::HtmlStyle,
    NodeKind::HtmlPre,
    NodeKind::HtmlTextarea,
    NodeKind::RawOutput,
];

/// Content kinds a script or stylesheet run reads through.
pub(crate) const REGION_CONTENT: &[NodeKind] = &[NodeKind::HtmlContent, NodeKind::HtmlWhitespace, NodeKind::HtmlEntity];

/// Rules of the inside of a tag; `close` runs on `>`.
fn tag_inside(close: &[Action]) -> Vec<RuleSpec> {
    vec![
        rule(
            r"[\w:.@-]+=",
            &[
                Start(NodeKind::HtmlTagAttribute),
                Start(NodeKind::HtmlAttributeKey),
                Record(None),
                Shift,
                Stop,
                Start(NodeKind::HtmlAttributeValue),
                Push("attribute-value"),
            ],
        ),
        rule(
            r"[\w:.@-]+",
            &[
                Start(NodeKind::HtmlTagAttribute),
                Start(NodeKind::HtmlAttributeKey),
                Record(None),
                Shift,
                Stop,
                Stop,
            ],
        ),
        rule(r"/>", &[Start(NodeKind::HtmlTagEndSign), Stop, Shift, Pop, Stop]),
        rule(r">", close),
        rule(r"\s+", &[Start(NodeKind::HtmlTagWhitespace), Record(None), Shift, Stop]),
        rule(r".", &[Fail("Parse error in HTML tag")]),
    ]
}

/// Rules of a quoted attribute value closed by `quote`.
fn quoted_value(quote: &'static str, text: &'static str) -> Vec<RuleSpec> {
    vec![
        rule(quote, &[Record(None), Shift, Pop, Pop, Stop, Stop]),
        rule(ENTITY, &[Start(NodeKind::HtmlEntity), Record(None), Shift, Stop]),
        rule(text, &[Record(None), Shift]),
        rule(r"&", &[Record(None), Shift]),
    ]
}

/// Rules of a raw-text element body closed by `</name`.
fn raw_body(end: &'static str) -> Vec<RuleSpec> {
    vec![
        rule(r"</", &[Pop, Start(NodeKind::HtmlEndTag), Shift, Push("end-tag")]).followed_by(end),
        rule(r"[^<]+", &[Record(None), Shift]),
        rule(r"<", &[Record(None), Shift]),
    ]
}

static GRAMMAR: Lazy<Result<Grammar, GrammarError>> = Lazy::new(|| {
    Grammar::builder("markup")
        .state(
            "root",
            vec![
                rule(
                    r"<!(?:--)?\[if",
                    &[Start(NodeKind::HtmlConditionalStart), Record(None), Shift, Push("conditional-comment")],
                ),
                rule(
                    r"<!(?:--)?\[endif\](?:--)?>",
                    &[Start(NodeKind::HtmlConditionalEnd), Record(None), Shift, Stop],
                ),
                rule(r"<!\[CDATA\[", &[Start(NodeKind::HtmlCdata), Shift, Push("cdata")]),
                rule(r"(?i)<!DOCTYPE", &[Start(NodeKind::HtmlDoctype), Record(None), Shift, Push("doctype")]),
                rule(r"<!--", &[Start(NodeKind::HtmlComment), Shift, Push("comment")]),
                rule(r"</", &[Start(NodeKind::HtmlEndTag), Shift, Push("end-tag")]).followed_by(r"\w"),
                rule(r"<", &[Start(NodeKind::HtmlTag), Shift, Push("tag")]).followed_by(r"\w"),
                rule(ENTITY, &[Start(NodeKind::HtmlEntity), Record(None), Shift, Stop]),
                rule(r"[^<\s&]+|&", &[Start(NodeKind::HtmlContent), Record(None), Shift, Stop]),
                rule(r"\s+", &[Start(NodeKind::HtmlWhitespace), Record(None), Shift, Stop]),
                rule(r".", &[Fail("Parse error in HTML document")]),
            ],
        )
        .state(
            "conditional-comment",
            vec![
                rule(r"[\s\w()!|&]+", &[Record(None), Shift]),
                rule(r"\](?:--)?>", &[Record(None), Shift, Pop, Stop]),
                rule(r".", &[Fail("Parse error in conditional comment")]),
            ],
        )
        .state(
            "comment",
            vec![
                rule(r"-->", &[Shift, Pop, Stop]),
                rule(r"[^-]+", &[Record(None), Shift]),
                rule(r"-", &[Record(None), Shift]),
            ],
        )
        .state(
            "cdata",
            vec![
                rule(r"\]\]>", &[Shift, Pop, Stop]),
                rule(r"[^\]]+", &[Record(None), Shift]),
                rule(r"\]", &[Record(None), Shift]),
            ],
        )
        .state(
            "doctype",
            vec![
                rule(r">", &[Record(None), Stop, Shift, Pop]),
                rule(r"[^>]+", &[Record(None), Shift]),
            ],
        )
        .state(
            "tag",
            vec![
                rule(
                    r"(?i)script",
                    &[Start(NodeKind::HtmlTagName), Record(None), Shift, Stop, Pop, Push("script-tag")],
                )
                .not_followed_by(r"[^\s/>]"),
                rule(
                    r"(?i)style",
                    &[Start(NodeKind::HtmlTagName), Record(None), Shift, Stop, Pop, Push("style-tag")],
                )
                .not_followed_by(r"[^\s/>]"),
                rule(
                    r"[^\s/>]+",
                    &[Start(NodeKind::HtmlTagName), Record(None), Shift, Stop, Pop, Push("inside-tag")],
                ),
                rule(r".", &[Fail("Parse error in HTML tag")]),
            ],
        )
        .state(
            "end-tag",
            vec![
                rule(
                    r"[^\s/>]+",
                    &[Start(NodeKind::HtmlTagName), Record(None), Shift, Stop, Pop, Push("inside-tag")],
                ),
                rule(r".", &[Fail("Parse error in HTML tag")]),
            ],
        )
        .state("inside-tag", tag_inside(&[Shift, Pop, Stop]))
        .state("script-tag", tag_inside(&[Shift, Pop, Stop, Push("script-body")]))
        .state("style-tag", tag_inside(&[Shift, Pop, Stop, Push("style-body")]))
        .state("script-body", raw_body(r"(?i)script[\s>]"))
        .state("style-body", raw_body(r"(?i)style[\s>]"))
        .state(
            "attribute-value",
            vec![
                rule(r"'", &[Record(None), Shift, Push("single-quoted-value")]),
                rule(r#"""#, &[Record(None), Shift, Push("double-quoted-value")]),
                rule(r"(?:[^\s/>'\x22]|/[^\s>])+", &[Record(None), Shift]),
                rule(r"", &[Pop, Stop, Stop]),
            ],
        )
        .state("single-quoted-value", quoted_value(r"'", r"[^'&]+"))
        .state("double-quoted-value", quoted_value(r#"""#, r#"[^"&]+"#))
        .build()
});

pub fn grammar() -> CompileResult<&'static Grammar> {
    GRAMMAR.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

/// Elements whose content is nested into one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Script,
    Style,
    Pre,
    Textarea,
}

impl Element {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "script" => Some(Element::Script),
            "style" => Some(Element::Style),
            "pre" => Some(Element::Pre),
            "textarea" => Some(Element::Textarea),
            _ => None,
        }
    }

    fn kind(self) -> NodeKind {
        match self {
            Element::Script => NodeKind::HtmlScript,
            Element::Style => NodeKind::HtmlStyle,
            Element::Pre => NodeKind::HtmlPre,
            Element::Textarea => NodeKind::HtmlTextarea,
        }
    }
}

/// Classification of markup markers for nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkupKey {
    Conditional,
    EndConditional,
    Open(Element),
    Close(Element),
}

static ELEMENTS: Lazy<Result<BlockMapping<MarkupKey>, GrammarError>> = Lazy::new(|| {
    let elements = [Element::Script, Element::Style, Element::Pre, Element::Textarea];
    BlockMapping::build(
        [(
            MarkupKey::Conditional,
            vec![MarkupKey::EndConditional],
            NodeKind::HtmlConditionalComment,
        )]
        .into_iter()
        .chain(
            elements
                .into_iter()
                .map(|e| (MarkupKey::Open(e), vec![MarkupKey::Close(e)], e.kind())),
        ),
    )
});

fn elements() -> CompileResult<&'static BlockMapping<MarkupKey>> {
    ELEMENTS.as_ref().map_err(|e| CompileError::Grammar(e.to_string()))
}

fn classify(tree: &ParseTree, id: NodeId) -> Option<MarkupKey> {
    match tree.kind(id) {
        NodeKind::HtmlConditionalStart => Some(MarkupKey::Conditional),
        NodeKind::HtmlConditionalEnd => Some(MarkupKey::EndConditional),
        NodeKind::HtmlTag if !is_self_closing(tree, tree.children(id)) => {
            tag_name(tree, tree.children(id)).and_then(|name| Element::from_name(&name)).map(MarkupKey::Open)
        }
        NodeKind::HtmlEndTag => {
            tag_name(tree, tree.children(id)).and_then(|name| Element::from_name(&name)).map(MarkupKey::Close)
        }
        _ => None,
    }
}

fn is_kind(tree: &ParseTree, child: Option<&Child>, kind: NodeKind) -> bool {
    matches!(child, Some(Child::Node(id)) if tree.kind(*id) == kind)
}

fn is_self_closing(tree: &ParseTree, tag: &[Child]) -> bool {
    is_kind(tree, tag.last(), NodeKind::HtmlTagEndSign)
}

/// Name of the tag whose children are `tag`.
pub fn tag_name(tree: &ParseTree, tag: &[Child]) -> Option<String> {
    tag.iter()
        .filter_map(Child::as_node)
        .find(|id| tree.kind(*id) == NodeKind::HtmlTagName)
        .map(|id| tree.raw_text(id).to_string())
}

pub fn attribute_name(tree: &ParseTree, attribute: NodeId) -> String {
    tree.child_nodes(attribute)
        .find(|id| tree.kind(*id) == NodeKind::HtmlAttributeKey)
        .map(|key| tree.raw_text(key).trim_end_matches('=').to_string())
        .unwrap_or_default()
}

/// Value of an attribute as written, quotes included.
pub fn attribute_value(tree: &ParseTree, attribute: NodeId) -> Option<String> {
    tree.child_nodes(attribute)
        .find(|id| tree.kind(*id) == NodeKind::HtmlAttributeValue)
        .map(|value| tree.text_of(value))
}

/// The attribute `name` among the children of a tag.
pub fn attribute_node(tree: &ParseTree, tag: &[Child], name: &str) -> Option<NodeId> {
    tag.iter()
        .filter_map(Child::as_node)
        .filter(|id| tree.kind(*id) == NodeKind::HtmlTagAttribute)
        .find(|id| attribute_name(tree, *id).eq_ignore_ascii_case(name))
}

/// Value of the attribute `name` among the children of a tag, unquoted.
pub fn attribute(tree: &ParseTree, tag: &[Child], name: &str) -> Option<String> {
    let attribute = attribute_node(tree, tag, name)?;
    let value = attribute_value(tree, attribute).unwrap_or_default();
    Some(value.trim_matches(|c| c == '"' || c == '\'').to_string())
}

/// Replace the value of `attribute` by `value`, double quoted.
///
/// Returns false for an attribute written without a value.
pub fn set_attribute_value(tree: &mut ParseTree, attribute: NodeId, value: &str) -> bool {
    let Some(node) = tree.child_nodes(attribute).find(|id| tree.kind(*id) == NodeKind::HtmlAttributeValue) else {
        return false;
    };
    tree.set_children(node, vec![Child::Text(format!("\"{value}\"").into())]);
    true
}

/// Opening-tag children of a nested element.
pub(crate) fn params(tree: &ParseTree, element: NodeId) -> &[Child] {
    tree.node(element).construct().map_or(&[], |c| c.params.as_slice())
}

/// `<script>` or `<style>` with a `src` attribute.
fn is_external(tree: &ParseTree, element: NodeId) -> bool {
    attribute(tree, params(tree, element), "src").is_some()
}

/// Scripts without a `type`, or typed as JavaScript.
fn is_javascript(tree: &ParseTree, script: NodeId) -> bool {
    attribute(tree, params(tree, script), "type").map_or(true, |kind| {
        let kind = kind.to_ascii_lowercase();
        kind.contains("javascript") || kind.contains("ecmascript")
    })
}

/// Lex the content runs of a parsed template as markup.
pub fn lex(tree: &mut ParseTree) -> CompileResult<()> {
    let root = tree.root();
    tokenize(
        tree,
        root,
        grammar()?,
        &[NodeKind::Content, NodeKind::Expanded],
        NodeKind::TEMPLATE_CONSTRUCTS,
    )
}

/// Nest script, style, pre and textarea elements and conditional comments.
pub fn nest_elements(tree: &mut ParseTree) -> CompileResult<()> {
    let root = tree.root();
    nest(
        tree,
        root,
        elements()?,
        &[
            NodeKind::HtmlTag,
            NodeKind::HtmlEndTag,
            NodeKind::HtmlConditionalStart,
            NodeKind::HtmlConditionalEnd,
        ],
        classify,
    )
}

/// Run the markup passes over a template tree.
pub fn process(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    let options = ctx.options.clone();
    let root = tree.root();
    lex(tree)?;
    if options.remove_empty_class_attributes {
        remove_empty_class_attributes(tree, root);
    }
    nest_elements(tree)?;

    comments_to_content(tree, root);
    tree.remove_kind(root, NodeKind::HtmlComment);

    if options.merge_internal_javascript {
        merge_internal(tree, root, NodeKind::HtmlScript);
    }
    if options.merge_internal_css {
        merge_internal(tree, root, NodeKind::HtmlStyle);
    }

    if options.pack_external_javascript {
        pack::pack_scripts(tree, ctx)?;
    }
    if options.pack_external_css {
        pack::pack_stylesheets(tree, ctx)?;
    }

    let cache = ctx.cache();
    if options.compile_javascript {
        let scripts = tree.descendants(root, &[NodeKind::HtmlScript], &[NodeKind::RawOutput]);
        for node in scripts {
            if !is_external(tree, node) && is_javascript(tree, node) {
                script::compile_region(tree, node, cache)?;
            }
        }
    }
    if options.compile_css {
        for node in tree.descendants(root, &[NodeKind::HtmlStyle], &[NodeKind::RawOutput]) {
            stylesheet::compile_region(tree, node, cache)?;
        }
    }

    if options.whitespace_compression {
        compress_whitespace(tree, root);
    }
    Ok(())
}

/// Drop `class=""` attributes and the whitespace in front of them, then
/// trailing whitespace in every tag.
fn remove_empty_class_attributes(tree: &mut ParseTree, root: NodeId) {
    for tag in tree.descendants(root, &[NodeKind::HtmlTag], &[NodeKind::RawOutput]) {
        let children = tree.take_branch(tag, 0);
        let mut kept: Vec<Child> = Vec::with_capacity(children.len());
        for child in children {
            if let Child::Node(id) = child {
                if is_empty_class(tree, id) {
                    if is_kind(tree, kept.last(), NodeKind::HtmlTagWhitespace) {
                        kept.pop();
                    }
                    continue;
                }
            }
            kept.push(child);
        }

        let end_sign = if is_self_closing(tree, &kept) { kept.pop() } else { None };
        while is_kind(tree, kept.last(), NodeKind::HtmlTagWhitespace) {
            kept.pop();
        }
        kept.extend(end_sign);
        tree.set_branch(tag, 0, kept);
    }
}

fn is_empty_class(tree: &ParseTree, id: NodeId) -> bool {
    tree.kind(id) == NodeKind::HtmlTagAttribute
        && attribute_name(tree, id).eq_ignore_ascii_case("class")
        && attribute_value(tree, id).map_or(true, |value| matches!(value.as_str(), "" | "\"\"" | "''"))
}

/// Comments and CDATA sections inside scripts and styles are code.
fn comments_to_content(tree: &mut ParseTree, root: NodeId) {
    for region in tree.descendants(root, &[NodeKind::HtmlScript, NodeKind::HtmlStyle], &[]) {
        for id in tree.descendants(region, &[NodeKind::HtmlComment, NodeKind::HtmlCdata], &[]) {
            let text = tree.text_of(id);
            tree.specialize(id, NodeKind::HtmlContent);
            tree.set_children(id, vec![Child::Text(text.into())]);
        }
    }
}

/// Move the content of every internal `kind` element into the first one.
///
/// Elements inside conditional comments stay where they are.
fn merge_internal(tree: &mut ParseTree, root: NodeId, kind: NodeKind) {
    let found: Vec<NodeId> = tree
        .descendants(root, &[kind], &[NodeKind::HtmlConditionalComment, NodeKind::RawOutput])
        .into_iter()
        .filter(|id| !is_external(tree, *id))
        .collect();
    let Some((&first, rest)) = found.split_first() else {
        return;
    };

    for &other in rest {
        for child in tree.take_branch(other, 0) {
            tree.append(first, 0, child);
        }
    }
    let removed: FxHashSet<NodeId> = rest.iter().copied().collect();
    tree.remove_nodes(root, &removed);
    debug!(kind = %kind, merged = removed.len(), "merge_internal");
}

/// Turn the markup tokens inside a script or style region back into text,
/// so the region's own grammar sees one buffer per list.
pub(crate) fn flatten_content(tree: &mut ParseTree, region: NodeId) {
    for branch in 0..tree.branches(region).len() {
        let list = tree.take_branch(region, branch);
        let mut flat = Vec::with_capacity(list.len());
        for child in list {
            match child {
                Child::Node(id) if REGION_CONTENT.contains(&tree.kind(id)) => {
                    let text = tree.text_of(id);
                    push_child(&mut flat, Child::Text(text.into()));
                }
                Child::Node(id) if tree.kind(id).is_template_construct() => {
                    flatten_content(tree, id);
                    flat.push(Child::Node(id));
                }
                child => push_child(&mut flat, child),
            }
        }
        tree.set_branch(region, branch, flat);
    }
}

/// Text of a region holding nothing but text.
pub(crate) fn single_text(tree: &ParseTree, region: NodeId) -> Option<String> {
    match tree.branches(region) {
        [list] => match list.as_slice() {
            [Child::Text(text)] => Some(text.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Collapse every whitespace run of the markup to one space.
fn compress_whitespace(tree: &mut ParseTree, root: NodeId) {
    let mut found = Vec::new();
    tree.walk(root, &mut |tree, id| {
        let kind = tree.kind(id);
        if matches!(kind, NodeKind::HtmlWhitespace | NodeKind::HtmlTagWhitespace) {
            found.push(id);
        }
        !PRESERVE_WHITESPACE.contains(&kind)
    });
    for id in found {
        tree.set_children(id, vec![Child::Text(" ".into())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexed(source: &str) -> ParseTree {
        let mut tree = ParseTree::new("t.html", source);
        let root = tree.root();
        tokenize(&mut tree, root, grammar().unwrap(), &[], &[]).unwrap();
        tree
    }

    fn nested(source: &str) -> ParseTree {
        let mut tree = lexed(source);
        nest_elements(&mut tree).unwrap();
        tree
    }

    fn kinds(tree: &ParseTree) -> Vec<NodeKind> {
        tree.child_nodes(tree.root()).map(|id| tree.kind(id)).collect()
    }

    #[test]
    fn test_markup_round_trips() {
        for source in [
            "<!DOCTYPE html>\n<html lang=en>",
            "<p class=\"a b\" hidden>x &amp; y</p>",
            "<br />a & b<img src='i.png'/>",
            "<!-- note --><![CDATA[ x ]]>",
            "<!--[if IE]><p>old</p><![endif]-->",
            "<script>if (a<b) { x = '</p>'; }</script>",
        ] {
            assert_eq!(nested(source).serialize(), source);
        }
    }

    #[test]
    fn test_tag_structure() {
        let tree = lexed("<a href=\"x\" download>");
        let tag = tree.child_nodes(tree.root()).next().unwrap();
        let parts: Vec<NodeKind> = tree.child_nodes(tag).map(|id| tree.kind(id)).collect();
        assert_eq!(
            parts,
            vec![
                NodeKind::HtmlTagName,
                NodeKind::HtmlTagWhitespace,
                NodeKind::HtmlTagAttribute,
                NodeKind::HtmlTagWhitespace,
                NodeKind::HtmlTagAttribute,
            ]
        );
        assert_eq!(attribute(&tree, tree.children(tag), "href").as_deref(), Some("x"));
        assert_eq!(attribute(&tree, tree.children(tag), "download").as_deref(), Some(""));
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let tree = nested("<script type=\"text/javascript\">a<b && c</script>");
        assert_eq!(kinds(&tree), vec![NodeKind::HtmlScript]);
        let script = tree.child_nodes(tree.root()).next().unwrap();
        assert_eq!(tree.children(script), &[Child::Text("a<b && c".into())]);
        assert!(is_javascript(&tree, script));
        assert!(!is_external(&tree, script));
    }

    #[test]
    fn test_conditional_comment_nests() {
        let tree = nested("<!--[if lt IE 9]><script src=\"h.js\"></script><![endif]-->");
        assert_eq!(kinds(&tree), vec![NodeKind::HtmlConditionalComment]);
        let conditional = tree.child_nodes(tree.root()).next().unwrap();
        let script = tree.child_nodes(conditional).next().unwrap();
        assert_eq!(tree.kind(script), NodeKind::HtmlScript);
        assert!(is_external(&tree, script));
    }

    #[test]
    fn test_unclosed_script_is_an_error() {
        let mut tree = ParseTree::new("t.html", "<script>var a;");
        let root = tree.root();
        let err = tokenize(&mut tree, root, grammar().unwrap(), &[], &[]).unwrap_err();
        assert!(
            matches!(err, CompileError::UnterminatedState { state: "script-body", .. }),
            "{err}"
        );
    }

    #[test]
    fn test_stray_angle_bracket() {
        let mut tree = ParseTree::new("t.html", "a < b");
        let root = tree.root();
        let err = tokenize(&mut tree, root, grammar().unwrap(), &[], &[]).unwrap_err();
        assert!(err.to_string().contains("Parse error in HTML document"), "{err}");
    }

    #[test]
    fn test_remove_empty_class_attributes() {
        let mut tree = lexed("<div class=\"\" id=\"x\"><span class='' /><p class>");
        let root = tree.root();
        remove_empty_class_attributes(&mut tree, root);
        assert_eq!(tree.serialize(), "<div id=\"x\"><span/><p>");
    }

    #[test]
    fn test_compress_whitespace_skips_pre() {
        let mut tree = nested("<p>a \n b</p>  <pre> x\n  y </pre>");
        let root = tree.root();
        compress_whitespace(&mut tree, root);
        assert_eq!(tree.serialize(), "<p>a b</p> <pre> x\n  y </pre>");
    }

    #[test]
    fn test_merge_internal_scripts() {
        let mut tree = nested("<script>a();</script><script src=\"x.js\"></script><script>b();</script>");
        let root = tree.root();
        merge_internal(&mut tree, root, NodeKind::HtmlScript);
        assert_eq!(tree.serialize(), "<script>a();b();</script><script src=\"x.js\"></script>");
    }
}
