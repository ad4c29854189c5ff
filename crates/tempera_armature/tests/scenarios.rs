//! Lexing and nesting working together on a small tag language.

use once_cell::sync::Lazy;
use tempera_armature::{nest, rule, tokenize, Action::*, BlockMapping, Grammar};
use tempera_relief::{Child, CompileError, NodeId, NodeKind, ParseTree};

static TAGS: Lazy<Grammar> = Lazy::new(|| {
    Grammar::builder("tags")
        .state(
            "root",
            vec![
                rule(r"\{%", &[Start(NodeKind::TemplateTag), Shift, Push("tag")]),
                rule(r"[^{]+|\{", &[Start(NodeKind::Content), Record(None), Shift, Stop]),
            ],
        )
        .state(
            "tag",
            vec![
                rule(r"%\}", &[Stop, Shift, Pop]),
                rule(r"\s+", &[Record(None), Shift]),
                rule(
                    r"[^\s%]+",
                    &[Start(NodeKind::TemplateTagElement), Record(None), Shift, Stop],
                ),
            ],
        )
        .build()
        .unwrap()
});

static IF_ONLY: Lazy<BlockMapping<String>> = Lazy::new(|| {
    BlockMapping::build([(
        "if".to_string(),
        vec!["else".to_string(), "endif".to_string()],
        NodeKind::If,
    )])
    .unwrap()
});

fn tag_name(tree: &ParseTree, id: NodeId) -> Option<String> {
    let first = tree.child_nodes(id).next()?;
    Some(tree.raw_text(first).to_string())
}

fn parse(source: &str) -> Result<ParseTree, CompileError> {
    let mut tree = ParseTree::new("scenario.html", source);
    let root = tree.root();
    tokenize(&mut tree, root, &TAGS, &[], &[])?;
    nest(&mut tree, root, &IF_ONLY, &[NodeKind::TemplateTag], tag_name)?;
    Ok(tree)
}

fn contents(tree: &ParseTree, list: &[Child]) -> Vec<String> {
    list.iter()
        .filter_map(Child::as_node)
        .map(|id| tree.raw_text(id).to_string())
        .collect()
}

#[test]
fn open_alternate_close_fills_two_branches() {
    let tree = parse("{% if P1 %}C1{% else %}C2{% endif %}").unwrap();
    let root = tree.root();
    let nodes: Vec<NodeId> = tree.child_nodes(root).collect();
    assert_eq!(nodes.len(), 1);

    let node = tree.node(nodes[0]);
    assert_eq!(node.kind, NodeKind::If);
    let construct = node.construct().unwrap();
    assert_eq!(contents(&tree, &construct.params), vec!["if", "P1"]);
    assert_eq!(node.branches.len(), 2);
    assert_eq!(contents(&tree, &node.branches[0]), vec!["C1"]);
    assert_eq!(contents(&tree, &node.branches[1]), vec!["C2"]);
    assert!(construct.end.is_some());
}

#[test]
fn open_close_fills_one_branch() {
    let tree = parse("{% if P1 %}C1{% endif %}").unwrap();
    let node = tree.node(tree.child_nodes(tree.root()).next().unwrap());
    assert_eq!(node.branches.len(), 1);
    assert_eq!(contents(&tree, &node.branches[0]), vec!["C1"]);
    assert!(node.construct().unwrap().markers.is_empty());
}

#[test]
fn missing_close_is_an_error() {
    let err = parse("x{% if P1 %}A{% else %}B").unwrap_err();
    assert!(matches!(err, CompileError::UnterminatedConstruct { kind: "if", .. }));
    assert_eq!(
        err.to_string(),
        "In: scenario.html\nLine 1, column 2: if tag not terminated"
    );
}

#[test]
fn lex_and_nest_are_output_neutral() {
    for source in [
        "",
        "plain { text",
        "{% if a %}x{% else %}y{% endif %}",
        "a {%if b%} {% if c %}{%endif%} {%else  %}\n z{% endif %}!",
    ] {
        let tree = parse(source).unwrap();
        assert_eq!(tree.serialize(), source);
    }
}
