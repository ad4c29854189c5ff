//! Serialization of parse trees back to text.
//!
//! Each node kind has a default emission rule. An [`Emitter`] sees every
//! node first and may take over its output, falling back to the default
//! rule for anything it does not handle.

use crate::ast::{Child, NodeData, NodeId};
use crate::tree::ParseTree;

/// Per-kind emission override.
pub trait Emitter {
    /// Write `node` into `out` and return true, or return false to use the
    /// default rule.
    fn emit(&self, out: &mut Emission<'_>, node: NodeId) -> bool;
}

/// Emitter that never overrides anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEmitter;

impl Emitter for DefaultEmitter {
    #[inline]
    fn emit(&self, _out: &mut Emission<'_>, _node: NodeId) -> bool {
        false
    }
}

/// Output buffer threaded through one serialization.
pub struct Emission<'a> {
    tree: &'a ParseTree,
    emitter: &'a dyn Emitter,
    buf: String,
}

impl<'a> Emission<'a> {
    pub fn new(tree: &'a ParseTree, emitter: &'a dyn Emitter) -> Self {
        Self {
            tree,
            emitter,
            buf: String::new(),
        }
    }

    #[inline]
    pub fn tree(&self) -> &'a ParseTree {
        self.tree
    }

    #[inline]
    pub fn push_str(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Emit a node, giving the emitter the first chance.
    pub fn node(&mut self, id: NodeId) {
        let emitter = self.emitter;
        if !emitter.emit(self, id) {
            self.default_node(id);
        }
    }

    pub fn child(&mut self, child: &Child) {
        match child {
            Child::Text(text) => self.buf.push_str(text),
            Child::Node(id) => self.node(*id),
        }
    }

    pub fn list(&mut self, children: &[Child]) {
        for child in children {
            self.child(child);
        }
    }

    /// Emit every branch of `id` without delimiters, markers or terminator.
    pub fn branches(&mut self, id: NodeId) {
        let tree = self.tree;
        for branch in tree.branches(id) {
            self.list(branch);
        }
    }

    /// Default emission rule for `id`.
    pub fn default_node(&mut self, id: NodeId) {
        let tree = self.tree;
        let node = tree.node(id);
        match &node.data {
            NodeData::Construct(construct) => {
                let (open, close) = node.kind.param_delimiters();
                self.push_str(open);
                self.list(&construct.params);
                self.push_str(close);
                for (index, branch) in node.branches.iter().enumerate() {
                    for (_, marker) in construct.markers.iter().filter(|(b, _)| *b == index) {
                        self.node(*marker);
                    }
                    self.list(branch);
                }
                if let Some(end) = construct.end {
                    self.node(end);
                }
            }
            NodeData::Binding(binding) => {
                if let Some(name) = &binding.rename {
                    self.push_str(name);
                } else if let Some(link) = binding.link.filter(|link| *link != id) {
                    self.node(link);
                } else {
                    self.list(node.children());
                }
            }
            NodeData::None => {
                let (open, close) = node.kind.delimiters().unwrap_or(("", ""));
                self.push_str(open);
                self.branches(id);
                self.push_str(close);
            }
        }
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

impl ParseTree {
    /// Serialize the whole tree with the default rules.
    pub fn serialize(&self) -> String {
        self.serialize_node(self.root())
    }

    /// Serialize one node with the default rules.
    pub fn serialize_node(&self, id: NodeId) -> String {
        self.serialize_with(id, &DefaultEmitter)
    }

    /// Serialize one node through `emitter`.
    pub fn serialize_with(&self, id: NodeId, emitter: &dyn Emitter) -> String {
        let mut out = Emission::new(self, emitter);
        out.node(id);
        out.finish()
    }

    /// Default emission of a node as a string.
    #[inline]
    pub fn text_of(&self, id: NodeId) -> String {
        self.serialize_node(id)
    }
}
