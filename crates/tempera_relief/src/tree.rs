//! The parse tree arena and its query/mutation operations.

use tempera_carton::{CompactString, FxHashMap, FxHashSet};

use crate::ast::{Binding, Branches, Child, Construct, Node, NodeData, NodeId, NodeKind, SourceLocation};

/// Arena owning every node of one compilation unit.
///
/// Ownership is hierarchical: each reachable node sits in exactly one list
/// (a branch, construct parameters, marker or terminator slot) of its
/// parent. Nodes removed from the tree stay in the arena but are no longer
/// reachable from the root.
#[derive(Debug, Clone)]
pub struct ParseTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ParseTree {
    /// Create a tree whose root holds `source` as a single text child.
    pub fn new(path: impl Into<CompactString>, source: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId::new(0),
        };
        let root = tree.create(NodeKind::Root, SourceLocation::start_of(path));
        tree.root = root;
        if !source.is_empty() {
            tree.append(root, 0, Child::Text(source.into()));
        }
        tree
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Path the tree was created for.
    pub fn path(&self) -> &str {
        &self.node(self.root).loc.path
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    #[inline]
    pub fn loc(&self, id: NodeId) -> &SourceLocation {
        &self.node(id).loc
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[Child] {
        self.node(id).children()
    }

    #[inline]
    pub fn branches(&self, id: NodeId) -> &[Vec<Child>] {
        &self.node(id).branches
    }

    /// Child nodes of the primary branch (text skipped).
    pub fn child_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().filter_map(Child::as_node)
    }

    /// Create an unattached empty node.
    pub fn create(&mut self, kind: NodeKind, loc: SourceLocation) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, loc));
        id
    }

    /// Append a child to branch `branch` of `parent`.
    ///
    /// Text following text is merged into one fragment.
    pub fn append(&mut self, parent: NodeId, branch: usize, child: Child) {
        push_child(self.node_mut(parent).branch_mut(branch), child);
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if !text.is_empty() {
            self.append(parent, 0, Child::Text(text.into()));
        }
    }

    pub fn append_node(&mut self, parent: NodeId, child: NodeId) {
        self.append(parent, 0, Child::Node(child));
    }

    /// Refine the kind of a node in place. Children are kept.
    #[inline]
    pub fn specialize(&mut self, id: NodeId, kind: NodeKind) {
        self.node_mut(id).kind = kind;
    }

    /// Take branch `branch` out of `id`, leaving it empty.
    pub fn take_branch(&mut self, id: NodeId, branch: usize) -> Vec<Child> {
        std::mem::take(self.node_mut(id).branch_mut(branch))
    }

    /// Take every branch out of `id`, leaving a single empty branch.
    pub fn take_branches(&mut self, id: NodeId) -> Branches {
        let node = self.node_mut(id);
        let mut empty = Branches::new();
        empty.push(Vec::new());
        std::mem::replace(&mut node.branches, empty)
    }

    pub fn set_branch(&mut self, id: NodeId, branch: usize, children: Vec<Child>) {
        *self.node_mut(id).branch_mut(branch) = children;
    }

    pub fn set_children(&mut self, id: NodeId, children: Vec<Child>) {
        let node = self.node_mut(id);
        node.branches.truncate(1);
        *node.branch_mut(0) = children;
    }

    /// Construct payload of `id`, created empty if missing.
    pub fn construct_mut(&mut self, id: NodeId) -> &mut Construct {
        let node = self.node_mut(id);
        if !matches!(node.data, NodeData::Construct(_)) {
            node.data = NodeData::Construct(Construct::default());
        }
        match &mut node.data {
            NodeData::Construct(c) => c,
            _ => unreachable!(),
        }
    }

    /// Binding payload of `id`, created empty if missing.
    pub fn binding_mut(&mut self, id: NodeId) -> &mut Binding {
        let node = self.node_mut(id);
        if !matches!(node.data, NodeData::Binding(_)) {
            node.data = NodeData::Binding(Binding::default());
        }
        match &mut node.data {
            NodeData::Binding(b) => b,
            _ => unreachable!(),
        }
    }

    /// Concatenated text children of the primary branch, ignoring nodes.
    pub fn raw_text(&self, id: NodeId) -> CompactString {
        let mut out = CompactString::default();
        for child in self.children(id) {
            if let Child::Text(text) = child {
                out.push_str(text);
            }
        }
        out
    }

    /// Descendants of `from` whose kind is in `kinds`, depth-first in
    /// document order.
    ///
    /// Nodes whose kind is in `dont_enter` may still be yielded but are not
    /// descended into. Construct parameters are not visited.
    pub fn descendants(&self, from: NodeId, kinds: &[NodeKind], dont_enter: &[NodeKind]) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.collect_descendants(from, &mut |tree, id| {
            let kind = tree.kind(id);
            if kinds.contains(&kind) {
                found.push(id);
            }
            !dont_enter.contains(&kind)
        });
        found
    }

    /// Visit every descendant; `visit` returns whether to enter the node.
    pub fn walk(&self, from: NodeId, visit: &mut dyn FnMut(&ParseTree, NodeId) -> bool) {
        self.collect_descendants(from, visit);
    }

    fn collect_descendants(&self, from: NodeId, visit: &mut dyn FnMut(&ParseTree, NodeId) -> bool) {
        for branch in self.branches(from) {
            for id in branch.iter().filter_map(Child::as_node) {
                if visit(self, id) {
                    self.collect_descendants(id, visit);
                }
            }
        }
    }

    /// Branch list and index holding `target`, searched from the root.
    pub fn locate(&self, target: NodeId) -> Option<(NodeId, usize, usize)> {
        self.locate_from(self.root, target)
    }

    fn locate_from(&self, from: NodeId, target: NodeId) -> Option<(NodeId, usize, usize)> {
        for (b, branch) in self.branches(from).iter().enumerate() {
            for (i, child) in branch.iter().enumerate() {
                if let Child::Node(id) = child {
                    if *id == target {
                        return Some((from, b, i));
                    }
                    if let found @ Some(_) = self.locate_from(*id, target) {
                        return found;
                    }
                }
            }
        }
        None
    }

    /// Remove the given nodes wherever they appear below `from`.
    pub fn remove_nodes(&mut self, from: NodeId, nodes: &FxHashSet<NodeId>) {
        if nodes.is_empty() {
            return;
        }
        self.rewrite_lists(from, &mut |_, id, out| {
            if !nodes.contains(&id) {
                out.push(Child::Node(id));
            }
        });
    }

    /// Remove every node of `kind` below `from`.
    pub fn remove_kind(&mut self, from: NodeId, kind: NodeKind) {
        let found: FxHashSet<NodeId> = self.descendants(from, &[kind], &[]).into_iter().collect();
        self.remove_nodes(from, &found);
    }

    /// Replace every node of `kind` below `from` by the concatenation of
    /// its branch lists.
    pub fn collapse_kind(&mut self, from: NodeId, kind: NodeKind) {
        self.rewrite_lists(from, &mut |tree, id, out| {
            if tree.kind(id) == kind {
                for branch in tree.take_branches(id) {
                    for child in branch {
                        push_child(out, child);
                    }
                }
            } else {
                out.push(Child::Node(id));
            }
        });
    }

    /// Splice `replacement` in place of `target`.
    ///
    /// Returns false when `target` is not reachable from the root.
    pub fn replace_node(&mut self, target: NodeId, replacement: Vec<Child>) -> bool {
        let Some((parent, branch, index)) = self.locate(target) else {
            return false;
        };
        let list = self.take_branch(parent, branch);
        let mut rebuilt = Vec::with_capacity(list.len() + replacement.len());
        let mut replacement = Some(replacement);
        for (i, child) in list.into_iter().enumerate() {
            if i == index {
                for c in replacement.take().into_iter().flatten() {
                    push_child(&mut rebuilt, c);
                }
            } else {
                push_child(&mut rebuilt, child);
            }
        }
        self.set_branch(parent, branch, rebuilt);
        true
    }

    /// Rebuild every branch list below `from` bottom-up. `map` decides what
    /// each child node turns into; text is kept.
    fn rewrite_lists(&mut self, from: NodeId, map: &mut dyn FnMut(&mut ParseTree, NodeId, &mut Vec<Child>)) {
        let branch_count = self.branches(from).len();
        for b in 0..branch_count {
            let list = self.take_branch(from, b);
            let mut rebuilt = Vec::with_capacity(list.len());
            for child in list {
                match child {
                    Child::Text(text) => push_child(&mut rebuilt, Child::Text(text)),
                    Child::Node(id) => {
                        self.rewrite_lists(id, map);
                        let mut produced = Vec::new();
                        map(self, id, &mut produced);
                        for c in produced {
                            push_child(&mut rebuilt, c);
                        }
                    }
                }
            }
            self.set_branch(from, b, rebuilt);
        }
    }

    /// Total, independent copy of the subtree at `id`.
    ///
    /// Branches, parameters, markers and terminators are copied; bindings
    /// pointing inside the subtree are remapped to the copies.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let copied: Vec<(NodeId, Node)> = self
            .subtree(id)
            .into_iter()
            .map(|old| (old, self.node(old).clone()))
            .collect();
        self.import(copied, true)
    }

    /// Copy the subtree at `id` of another tree into this one.
    ///
    /// Bindings pointing outside the copied subtree are dropped.
    pub fn graft(&mut self, other: &ParseTree, id: NodeId) -> NodeId {
        let copied: Vec<(NodeId, Node)> = other
            .subtree(id)
            .into_iter()
            .map(|old| (old, other.node(old).clone()))
            .collect();
        self.import(copied, false)
    }

    /// Every node of the subtree at `id`, root first.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            let current = out[i];
            out.extend(self.node(current).referenced_nodes());
            i += 1;
        }
        out
    }

    fn import(&mut self, copied: Vec<(NodeId, Node)>, keep_outer_links: bool) -> NodeId {
        let base = self.nodes.len() as u32;
        let remap: FxHashMap<NodeId, NodeId> = copied
            .iter()
            .enumerate()
            .map(|(i, (old, _))| (*old, NodeId::new(base + i as u32)))
            .collect();
        let map_child = |child: Child| match child {
            Child::Node(id) => Child::Node(remap[&id]),
            text => text,
        };

        for (_, mut node) in copied {
            for branch in node.branches.iter_mut() {
                *branch = std::mem::take(branch).into_iter().map(map_child).collect();
            }
            match &mut node.data {
                NodeData::Construct(c) => {
                    c.params = std::mem::take(&mut c.params).into_iter().map(map_child).collect();
                    for (_, marker) in c.markers.iter_mut() {
                        *marker = remap[&*marker];
                    }
                    c.end = c.end.map(|end| remap[&end]);
                }
                NodeData::Binding(b) => {
                    b.link = match b.link {
                        Some(link) => remap
                            .get(&link)
                            .copied()
                            .or(if keep_outer_links { Some(link) } else { None }),
                        None => None,
                    };
                }
                NodeData::None => {}
            }
            self.nodes.push(node);
        }
        NodeId::new(base)
    }
}

/// Push `child` onto `list`, merging adjacent text.
pub fn push_child(list: &mut Vec<Child>, child: Child) {
    if let Child::Text(text) = &child {
        if text.is_empty() {
            return;
        }
        if let Some(Child::Text(last)) = list.last_mut() {
            last.push_str(text);
            return;
        }
    }
    list.push(child);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::start_of("test.html")
    }

    /// root: "a" [tag: "x"] "b"
    fn sample() -> (ParseTree, NodeId) {
        let mut tree = ParseTree::new("test.html", "");
        let root = tree.root();
        let tag = tree.create(NodeKind::TemplateTag, loc());
        tree.append_text(tag, "x");
        tree.append_text(root, "a");
        tree.append_node(root, tag);
        tree.append_text(root, "b");
        (tree, tag)
    }

    #[test]
    fn test_append_merges_text() {
        let mut tree = ParseTree::new("t", "ab");
        let root = tree.root();
        tree.append_text(root, "cd");
        assert_eq!(tree.children(root), &[Child::Text("abcd".into())]);
    }

    #[test]
    fn test_remove_nodes_by_identity() {
        let (mut tree, tag) = sample();
        let root = tree.root();
        // Structurally identical but distinct node stays.
        let twin = tree.create(NodeKind::TemplateTag, loc());
        tree.append_text(twin, "x");
        tree.append_node(root, twin);

        let set: FxHashSet<NodeId> = [tag].into_iter().collect();
        tree.remove_nodes(root, &set);

        assert_eq!(
            tree.children(root),
            &[Child::Text("ab".into()), Child::Node(twin)]
        );
    }

    #[test]
    fn test_collapse_kind() {
        let (mut tree, tag) = sample();
        let root = tree.root();
        tree.specialize(tag, NodeKind::Block);
        tree.collapse_kind(root, NodeKind::Block);
        assert_eq!(tree.children(root), &[Child::Text("axb".into())]);
    }

    #[test]
    fn test_collapse_concatenates_branches() {
        let mut tree = ParseTree::new("t", "");
        let root = tree.root();
        let node = tree.create(NodeKind::If, loc());
        tree.append(node, 0, Child::Text("one".into()));
        tree.append(node, 1, Child::Text("two".into()));
        tree.append_node(root, node);

        tree.collapse_kind(root, NodeKind::If);
        assert_eq!(tree.children(root), &[Child::Text("onetwo".into())]);
    }

    #[test]
    fn test_descendants_dont_enter() {
        let mut tree = ParseTree::new("t", "");
        let root = tree.root();
        let outer = tree.create(NodeKind::RawOutput, loc());
        let inner = tree.create(NodeKind::TemplateVariable, loc());
        let sibling = tree.create(NodeKind::TemplateVariable, loc());
        tree.append_node(outer, inner);
        tree.append_node(root, outer);
        tree.append_node(root, sibling);

        let all = tree.descendants(root, &[NodeKind::TemplateVariable], &[]);
        assert_eq!(all, vec![inner, sibling]);

        let outside = tree.descendants(root, &[NodeKind::TemplateVariable], &[NodeKind::RawOutput]);
        assert_eq!(outside, vec![sibling]);
    }

    #[test]
    fn test_replace_node() {
        let (mut tree, tag) = sample();
        let root = tree.root();
        assert!(tree.replace_node(tag, vec![Child::Text("-".into())]));
        assert_eq!(tree.children(root), &[Child::Text("a-b".into())]);
        assert!(!tree.replace_node(tag, Vec::new()));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let (mut tree, tag) = sample();
        let copy = tree.deep_clone(tag);
        assert_ne!(copy, tag);

        tree.append_text(copy, "y");
        assert_eq!(tree.raw_text(tag), "x");
        assert_eq!(tree.raw_text(copy), "xy");
    }

    #[test]
    fn test_deep_clone_remaps_inner_links() {
        let mut tree = ParseTree::new("t", "");
        let root = tree.root();
        let scope = tree.create(NodeKind::JsScope, loc());
        let decl = tree.create(NodeKind::JsVariable, loc());
        let usage = tree.create(NodeKind::JsVariable, loc());
        let outer = tree.create(NodeKind::JsVariable, loc());
        tree.append_node(scope, decl);
        tree.append_node(scope, usage);
        tree.append_node(root, outer);
        tree.append_node(root, scope);
        tree.binding_mut(usage).link = Some(decl);
        tree.binding_mut(decl).link = Some(outer);

        let copy = tree.deep_clone(scope);
        let copied: Vec<NodeId> = tree.child_nodes(copy).collect();
        assert_eq!(copied.len(), 2);
        assert_eq!(tree.node(copied[1]).binding().and_then(|b| b.link), Some(copied[0]));
        // Links leaving the subtree keep pointing at the original.
        assert_eq!(tree.node(copied[0]).binding().and_then(|b| b.link), Some(outer));
    }

    #[test]
    fn test_graft_from_other_tree() {
        let (other, _) = sample();
        let mut tree = ParseTree::new("main.html", "");
        let root = tree.root();
        let grafted = tree.graft(&other, other.root());
        tree.specialize(grafted, NodeKind::Expanded);
        tree.append_node(root, grafted);

        assert_eq!(tree.serialize(), "a{%x%}b");
    }
}
