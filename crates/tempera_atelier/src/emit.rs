//! Emission of compiled output.

use tempera_relief::{Child, Emission, Emitter, NodeId, NodeKind};

use crate::template::elements;

/// Emitter producing the final compiled template.
///
/// Template tags are written in canonical form, comments and preprocessor
/// configuration vanish, and raw output is copied as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledEmitter;

impl Emitter for CompiledEmitter {
    fn emit(&self, out: &mut Emission<'_>, node: NodeId) -> bool {
        let tree = out.tree();
        match tree.kind(node) {
            NodeKind::TemplateTag
            | NodeKind::Extends
            | NodeKind::Include
            | NodeKind::Load
            | NodeKind::Trans
            | NodeKind::Plural
            | NodeKind::Url
            | NodeKind::CallMacro => {
                out.push_str(&canonical_tag(&elements(tree, node)));
            }
            NodeKind::TemplateVariable => {
                out.push_str("{{");
                for part in tree.child_nodes(node) {
                    if tree.kind(part) == NodeKind::TemplateVariablePart {
                        out.push_str(&tree.raw_text(part));
                    }
                }
                out.push_str("}}");
            }
            NodeKind::TemplateComment | NodeKind::TemplateMultilineComment | NodeKind::PreprocessorConfig => {}
            NodeKind::RawOutput => {
                for child in tree.branches(node).iter().flatten() {
                    match child {
                        Child::Text(text) => out.push_str(text),
                        Child::Node(id) => out.push_str(&tree.text_of(*id)),
                    }
                }
            }
            NodeKind::Compress => out.branches(node),
            NodeKind::CssUrl => {
                out.push_str("url('");
                for child in tree.children(node) {
                    match child {
                        Child::Text(text) => out.push_str(&escape_url(text)),
                        Child::Node(id) => out.node(*id),
                    }
                }
                out.push_str("')");
            }
            kind if kind.is_template_construct() => {
                let Some(construct) = tree.node(node).construct() else {
                    return false;
                };
                out.push_str(&canonical_tag(&elements(tree, node)));
                for (index, branch) in tree.branches(node).iter().enumerate() {
                    for (_, marker) in construct.markers.iter().filter(|(b, _)| *b == index) {
                        out.node(*marker);
                    }
                    out.list(branch);
                }
                if let Some(end) = construct.end {
                    out.node(end);
                }
            }
            _ => return false,
        }
        true
    }
}

fn canonical_tag<S: AsRef<str>>(elements: &[S]) -> String {
    let mut tag = String::from("{%");
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            tag.push(' ');
        }
        tag.push_str(element.as_ref());
    }
    tag.push_str("%}");
    tag
}

/// Escape a `url()` value for a single-quoted CSS string.
fn escape_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        if matches!(c, '\'' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
