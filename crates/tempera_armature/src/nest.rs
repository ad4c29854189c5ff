//! Block nesting engine.
//!
//! Folds flat marker nodes (`{% if %}`, `{% else %}`, `{% endif %}`, or an
//! opening and a closing markup tag) into a single construct node whose
//! branch lists hold the content between the markers.

use std::hash::Hash;

use rustc_hash::FxHashMap;
use tempera_relief::{push_child, Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree, MAX_BRANCHES};
use tracing::debug;

use crate::grammar::GrammarError;

#[derive(Debug, Clone)]
pub struct Block<K> {
    /// Expected follow-up markers; the last one terminates the block
    pub follow: Vec<K>,
    /// Kind the opening marker is specialized to
    pub kind: NodeKind,
}

/// Marker classification to block description.
#[derive(Debug, Clone)]
pub struct BlockMapping<K> {
    blocks: FxHashMap<K, Block<K>>,
}

impl<K: Eq + Hash + Clone> BlockMapping<K> {
    /// Build a mapping from `(opening key, follow-ups, kind)` entries.
    pub fn build(entries: impl IntoIterator<Item = (K, Vec<K>, NodeKind)>) -> Result<Self, GrammarError> {
        let mut blocks = FxHashMap::default();
        for (key, follow, kind) in entries {
            if follow.is_empty() {
                return Err(GrammarError::Mapping(format!("{kind} has no terminator")));
            }
            if follow.len() > MAX_BRANCHES {
                return Err(GrammarError::Mapping(format!(
                    "{kind} needs {} branches, at most {MAX_BRANCHES} are supported",
                    follow.len()
                )));
            }
            blocks.insert(key, Block { follow, kind });
        }
        Ok(Self { blocks })
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<&Block<K>> {
        self.blocks.get(key)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Nest the markers found in every branch list of `parent`.
///
/// `classify` is only asked about nodes whose kind is in `eligible`.
pub fn nest<K, F>(
    tree: &mut ParseTree,
    parent: NodeId,
    mapping: &BlockMapping<K>,
    eligible: &[NodeKind],
    classify: F,
) -> CompileResult<()>
where
    K: Eq + Hash + Clone,
    F: Fn(&ParseTree, NodeId) -> Option<K>,
{
    debug!(path = tree.path(), blocks = mapping.len(), "nest");
    let nester = Nester {
        mapping,
        eligible,
        classify,
    };
    nester.nest_node(tree, parent)
}

struct Nester<'a, K, F> {
    mapping: &'a BlockMapping<K>,
    eligible: &'a [NodeKind],
    classify: F,
}

struct Open<K> {
    node: NodeId,
    follow: Vec<K>,
    branch: usize,
}

impl<K, F> Nester<'_, K, F>
where
    K: Eq + Hash + Clone,
    F: Fn(&ParseTree, NodeId) -> Option<K>,
{
    fn nest_node(&self, tree: &mut ParseTree, node: NodeId) -> CompileResult<()> {
        for branch in 0..tree.branches(node).len() {
            let list = tree.take_branch(node, branch);
            let nested = self.nest_list(tree, list)?;
            tree.set_branch(node, branch, nested);
        }
        Ok(())
    }

    fn nest_list(&self, tree: &mut ParseTree, list: Vec<Child>) -> CompileResult<Vec<Child>> {
        let mut out = Vec::with_capacity(list.len());
        let mut open: Vec<Open<K>> = Vec::new();

        for child in list {
            let id = match child {
                Child::Node(id) => id,
                text => {
                    place(tree, &mut out, &open, text);
                    continue;
                }
            };

            let key = if self.eligible.contains(&tree.kind(id)) {
                (self.classify)(tree, id)
            } else {
                None
            };

            if let Some(key) = key {
                if let Some(block) = self.mapping.get(&key) {
                    tree.specialize(id, block.kind);
                    let params = tree.take_branch(id, 0);
                    tree.construct_mut(id).params = params;
                    place(tree, &mut out, &open, Child::Node(id));
                    open.push(Open {
                        node: id,
                        follow: block.follow.clone(),
                        branch: 0,
                    });
                    continue;
                }

                if let Some(top) = open.last_mut() {
                    if top.follow.last() == Some(&key) {
                        tree.construct_mut(top.node).end = Some(id);
                        open.pop();
                        continue;
                    }
                    let alternates = top.follow.len() - 1;
                    if let Some(position) = top.follow[..alternates].iter().position(|k| *k == key) {
                        top.branch += position + 1;
                        top.follow.drain(..=position);
                        tree.construct_mut(top.node).markers.push((top.branch, id));
                        continue;
                    }
                }
            }

            place(tree, &mut out, &open, Child::Node(id));
            self.nest_node(tree, id)?;
        }

        if let Some(outer) = open.first() {
            return Err(CompileError::UnterminatedConstruct {
                kind: tree.kind(outer.node).name(),
                loc: tree.loc(outer.node).clone(),
            });
        }
        Ok(out)
    }
}

/// Append to the current branch of the innermost open construct, or to the
/// list being rebuilt.
fn place<K>(tree: &mut ParseTree, out: &mut Vec<Child>, open: &[Open<K>], child: Child) {
    match open.last() {
        Some(top) => tree.append(top.node, top.branch, child),
        None => push_child(out, child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempera_relief::SourceLocation;

    fn mapping() -> BlockMapping<String> {
        BlockMapping::build([
            ("if".to_string(), vec!["else".to_string(), "endif".to_string()], NodeKind::If),
            ("for".to_string(), vec!["empty".to_string(), "endfor".to_string()], NodeKind::For),
        ])
        .unwrap()
    }

    fn tag_name(tree: &ParseTree, id: NodeId) -> Option<String> {
        tree.raw_text(id).split_whitespace().next().map(str::to_string)
    }

    /// Root holding `{%tag%}` markers and literal text, one per item.
    fn flat(items: &[&str]) -> ParseTree {
        let mut tree = ParseTree::new("t.html", "");
        let root = tree.root();
        for (column, item) in items.iter().enumerate() {
            match item.strip_prefix('%') {
                Some(tag) => {
                    let loc = SourceLocation::new("t.html", 1, column as u32 + 1);
                    let node = tree.create(NodeKind::TemplateTag, loc);
                    tree.append_text(node, tag);
                    tree.append_node(root, node);
                }
                None => tree.append_text(root, item),
            }
        }
        tree
    }

    fn run(tree: &mut ParseTree) -> CompileResult<()> {
        let root = tree.root();
        nest(tree, root, &mapping(), &[NodeKind::TemplateTag], tag_name)
    }

    #[test]
    fn test_nesting_preserves_text() {
        let mut tree = flat(&["a", "%if x", "A", "%else", "B", "%endif", "b"]);
        run(&mut tree).unwrap();
        assert_eq!(tree.serialize(), "a{%if x%}A{%else%}B{%endif%}b");
        let node = tree.child_nodes(tree.root()).next().unwrap();
        assert_eq!(tree.kind(node), NodeKind::If);
    }

    #[test]
    fn test_nested_constructs() {
        let mut tree = flat(&["%for i", "%if i", "x", "%endif", "%empty", "none", "%endfor"]);
        run(&mut tree).unwrap();
        let root = tree.root();
        let outer = tree.child_nodes(root).next().unwrap();
        assert_eq!(tree.kind(outer), NodeKind::For);
        let branches = tree.branches(outer);
        assert_eq!(branches.len(), 2);
        let inner = branches[0][0].as_node().unwrap();
        assert_eq!(tree.kind(inner), NodeKind::If);
        assert_eq!(tree.branches(inner)[0], vec![Child::Text("x".into())]);
        assert_eq!(branches[1], vec![Child::Text("none".into())]);
    }

    #[test]
    fn test_alternate_is_not_repeatable() {
        let mut tree = flat(&["%if x", "A", "%else", "B", "%else", "C", "%endif"]);
        run(&mut tree).unwrap();
        let node = tree.child_nodes(tree.root()).next().unwrap();
        let branches = tree.branches(node);
        assert_eq!(branches.len(), 2);
        // The second `else` is ordinary content of the second branch.
        assert_eq!(branches[1].len(), 3);
        assert_eq!(tree.node(node).construct().unwrap().markers.len(), 1);
    }

    #[test]
    fn test_outermost_unterminated_construct_is_reported() {
        let mut tree = flat(&["x", "%for i", "%if i", "y"]);
        let err = run(&mut tree).unwrap_err();
        match err {
            CompileError::UnterminatedConstruct { kind, loc } => {
                assert_eq!(kind, "for");
                assert_eq!(loc.column, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stray_terminator_is_content() {
        let mut tree = flat(&["a", "%endif", "b"]);
        run(&mut tree).unwrap();
        let node = tree.child_nodes(tree.root()).next().unwrap();
        assert_eq!(tree.kind(node), NodeKind::TemplateTag);
    }

    #[test]
    fn test_recurses_into_ordinary_nodes() {
        let mut tree = flat(&[]);
        let root = tree.root();
        let wrapper = tree.create(NodeKind::HtmlTag, SourceLocation::start_of("t.html"));
        for tag in ["if x", "endif"] {
            let node = tree.create(NodeKind::TemplateTag, SourceLocation::start_of("t.html"));
            tree.append_text(node, tag);
            tree.append_node(wrapper, node);
        }
        tree.append_node(root, wrapper);

        run(&mut tree).unwrap();
        let inner = tree.child_nodes(wrapper).next().unwrap();
        assert_eq!(tree.kind(inner), NodeKind::If);
        assert_eq!(tree.child_nodes(wrapper).count(), 1);
    }

    #[test]
    fn test_ineligible_kinds_are_not_classified() {
        let mut tree = flat(&["%if x", "%endif"]);
        let root = tree.root();
        nest(&mut tree, root, &mapping(), &[NodeKind::HtmlTag], tag_name).unwrap();
        assert!(tree
            .child_nodes(root)
            .all(|id| tree.kind(id) == NodeKind::TemplateTag));
    }

    #[test]
    fn test_mapping_validation() {
        let err = BlockMapping::build([("x", vec![], NodeKind::Block)]).unwrap_err();
        assert_eq!(err.to_string(), "block mapping: block has no terminator");

        let follow = vec!["alt"; MAX_BRANCHES + 1];
        assert!(BlockMapping::build([("x", follow, NodeKind::Block)]).is_err());
    }
}
