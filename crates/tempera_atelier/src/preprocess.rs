//! Template-level passes.
//!
//! Each pass works on a tree already nested by [`crate::template::parse`].
//! Copies of content are always deep clones; a node never appears in two
//! places.

use compact_str::CompactString;
use rustc_hash::{FxHashMap, FxHashSet};
use tempera_relief::{Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::debug;

use crate::compile::load_template;
use crate::context::CompileContext;
use crate::template::{elements, literal, variable_name};

/// Name argument of a tag, quoted or not.
fn argument(tree: &ParseTree, tag: NodeId, index: usize) -> Option<CompactString> {
    let elements = elements(tree, tag);
    let element = elements.get(index)?;
    Some(literal(element).unwrap_or(element.as_str()).into())
}

fn clone_list(tree: &mut ParseTree, list: &[Child]) -> Vec<Child> {
    list.iter()
        .map(|child| match child {
            Child::Text(text) => Child::Text(text.clone()),
            Child::Node(id) => Child::Node(tree.deep_clone(*id)),
        })
        .collect()
}

/// Replace every `{{ name }}` below `from` by a copy of `content`.
fn fill_variable(tree: &mut ParseTree, from: NodeId, name: &str, content: &[Child]) {
    for variable in tree.descendants(from, &[NodeKind::TemplateVariable], &[NodeKind::RawOutput]) {
        if variable_name(tree, variable) == name {
            let copy = clone_list(tree, content);
            tree.specialize(variable, NodeKind::Expanded);
            tree.set_children(variable, copy);
        }
    }
}

/// Resolve `{% extends %}`: the result is the parent tree with the child's
/// blocks merged in.
pub fn extend(child: ParseTree, ctx: &mut CompileContext) -> CompileResult<ParseTree> {
    let root = child.root();
    let Some(tag) = child.child_nodes(root).find(|id| child.kind(*id) == NodeKind::Extends) else {
        return Ok(child);
    };
    let loc = child.loc(tag).clone();
    let elements = elements(&child, tag);
    let Some(name) = elements.get(1).and_then(|e| literal(e)) else {
        return Err(CompileError::template(
            &loc,
            "Preprocessor does not support variable {% extends %} nodes",
        ));
    };

    let mut base = load_template(ctx, name, &loc)?.tree;
    let base_root = base.root();
    let child_blocks = child.descendants(root, &[NodeKind::Block], &[NodeKind::RawOutput]);
    let mut matched = FxHashSet::default();

    for block in base.descendants(base_root, &[NodeKind::Block], &[NodeKind::RawOutput]) {
        let Some(block_name) = argument(&base, block, 1) else {
            continue;
        };
        let Some(&replacement) = child_blocks
            .iter()
            .rev()
            .find(|b| argument(&child, **b, 1).as_deref() == Some(block_name.as_str()))
        else {
            continue;
        };
        matched.insert(block_name);

        let copy = base.graft(&child, replacement);
        let parent_content = base.children(block).to_vec();
        fill_variable(&mut base, copy, "block.super", &parent_content);
        let content = base.take_branch(copy, 0);
        base.set_branch(block, 0, content);
    }

    let orphan = child
        .child_nodes(root)
        .filter(|id| child.kind(*id) == NodeKind::Block)
        .find(|id| argument(&child, *id, 1).map_or(true, |name| !matched.contains(&name)));
    if let Some(orphan) = orphan {
        let message = format!(
            "Found {{% block {} %}} which has not been found in the parent",
            argument(&child, orphan, 1).unwrap_or_default()
        );
        if ctx.options.disallow_orphan_blocks {
            return Err(CompileError::template(child.loc(orphan), message));
        }
        ctx.warn(child.loc(orphan), message);
    }

    let hoisted: Vec<NodeId> = child
        .child_nodes(root)
        .filter(|id| matches!(child.kind(*id), NodeKind::Load | NodeKind::PreprocessorConfig))
        .collect();
    let mut front: Vec<Child> = hoisted
        .into_iter()
        .map(|id| Child::Node(base.graft(&child, id)))
        .collect();
    front.extend(base.take_branch(base_root, 0));
    base.set_branch(base_root, 0, front);

    debug!(parent = name, blocks = matched.len(), "extend");
    Ok(base)
}

/// Expand `{% include "name" %}` with the included template.
///
/// Includes with a variable name or extra arguments stay dynamic.
pub fn expand_includes(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    let root = tree.root();
    for include in tree.descendants(root, &[NodeKind::Include], &[NodeKind::RawOutput]) {
        let elements = elements(tree, include);
        let [_, name] = elements.as_slice() else {
            continue;
        };
        let Some(name) = literal(name) else {
            continue;
        };
        let loc = tree.loc(include).clone();
        let included = load_template(ctx, name, &loc)?;
        let node = tree.graft(&included.tree, included.root());
        tree.specialize(node, NodeKind::Expanded);
        tree.replace_node(include, vec![Child::Node(node)]);
    }
    Ok(())
}

/// Expand `{% decorate "name" %}...{% enddecorate %}`: the decorating
/// template with its `{{ decorater.content }}` replaced by the content.
pub fn expand_decorates(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    let root = tree.root();
    while let Some(decorate) = tree
        .descendants(root, &[NodeKind::Decorate], &[NodeKind::RawOutput])
        .first()
        .copied()
    {
        let loc = tree.loc(decorate).clone();
        let elements = elements(tree, decorate);
        let Some(name) = elements.get(1).and_then(|e| literal(e)) else {
            return Err(CompileError::template(
                &loc,
                "Do not use variable template names in {% decorate %}",
            ));
        };

        let decorating = load_template(ctx, name, &loc)?;
        let node = tree.graft(&decorating.tree, decorating.root());
        tree.specialize(node, NodeKind::Expanded);
        let content = tree.children(decorate).to_vec();
        fill_variable(tree, node, "decorater.content", &content);
        tree.replace_node(decorate, vec![Child::Node(node)]);
    }
    Ok(())
}

/// Apply `{% ! option %}` tags to the context options.
pub fn apply_config(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    let root = tree.root();
    for tag in tree.descendants(root, &[NodeKind::PreprocessorConfig], &[NodeKind::RawOutput]) {
        for option in elements(tree, tag).iter().skip(1) {
            if !ctx.options.change(option) {
                return Err(CompileError::UnknownOption {
                    option: option.clone(),
                    loc: tree.loc(tag).clone(),
                });
            }
        }
    }
    Ok(())
}

/// Replace known `{{ VARIABLES }}` by their values.
pub fn substitute_variables(tree: &mut ParseTree, variables: &FxHashMap<CompactString, CompactString>) {
    if variables.is_empty() {
        return;
    }
    let root = tree.root();
    for variable in tree.descendants(root, &[NodeKind::TemplateVariable], &[NodeKind::RawOutput]) {
        if let Some(value) = variables.get(variable_name(tree, variable).as_str()) {
            tree.specialize(variable, NodeKind::Expanded);
            tree.set_children(variable, vec![Child::Text(value.clone())]);
        }
    }
}

/// Expand `{% callmacro name %}` with copies of `{% macro name %}` and
/// drop the definitions. Calls to unknown macros stay.
pub fn expand_macros(tree: &mut ParseTree) {
    let root = tree.root();
    let definitions = tree.descendants(root, &[NodeKind::Macro], &[NodeKind::RawOutput]);
    let mut macros: FxHashMap<CompactString, NodeId> = FxHashMap::default();
    for &definition in &definitions {
        if let Some(name) = argument(tree, definition, 1) {
            macros.insert(name, definition);
        }
    }

    for call in tree.descendants(root, &[NodeKind::CallMacro], &[NodeKind::RawOutput]) {
        let Some(&definition) = argument(tree, call, 1).and_then(|name| macros.get(&name)) else {
            continue;
        };
        let content = tree.children(definition).to_vec();
        let copy = clone_list(tree, &content);
        let loc = tree.loc(call).clone();
        let node = tree.create(NodeKind::Expanded, loc);
        tree.set_children(node, copy);
        tree.replace_node(call, vec![Child::Node(node)]);
    }

    let definitions: FxHashSet<NodeId> = definitions.into_iter().collect();
    tree.remove_nodes(root, &definitions);
}

/// Keep `{% ifdebug %}` content in debug mode, drop it otherwise.
pub fn resolve_ifdebug(tree: &mut ParseTree, debug: bool) {
    let root = tree.root();
    if debug {
        tree.collapse_kind(root, NodeKind::IfDebug);
    } else {
        tree.remove_kind(root, NodeKind::IfDebug);
    }
}

/// Merge every `{% load %}` into one tag at the top of the template.
///
/// `{% load x from future %}` stays where it is.
pub fn group_loads(tree: &mut ParseTree) {
    let root = tree.root();
    let mut modules: Vec<CompactString> = Vec::new();
    let mut grouped: Vec<NodeId> = Vec::new();
    for load in tree.descendants(root, &[NodeKind::Load], &[NodeKind::RawOutput]) {
        let elements = elements(tree, load);
        if elements.iter().any(|e| e == "from") && elements.iter().any(|e| e == "future") {
            continue;
        }
        for module in elements.into_iter().skip(1) {
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
        grouped.push(load);
    }
    let Some(&first) = grouped.first() else {
        return;
    };

    let removed: FxHashSet<NodeId> = grouped.iter().copied().collect();
    tree.remove_nodes(root, &removed);

    let loc = tree.loc(first).clone();
    let mut children = Vec::with_capacity(modules.len() * 2 + 1);
    for element in std::iter::once(CompactString::from("load")).chain(modules) {
        if !children.is_empty() {
            children.push(Child::Text(" ".into()));
        }
        let node = tree.create(NodeKind::TemplateTagElement, loc.clone());
        tree.append_text(node, &element);
        children.push(Child::Node(node));
    }
    tree.set_children(first, children);

    let mut list = vec![Child::Node(first)];
    list.extend(tree.take_branch(root, 0));
    tree.set_branch(root, 0, list);
    debug!(tags = grouped.len(), "group_loads");
}

pub fn remove_comments(tree: &mut ParseTree) {
    let root = tree.root();
    let comments: FxHashSet<NodeId> = tree
        .descendants(
            root,
            &[NodeKind::TemplateComment, NodeKind::TemplateMultilineComment],
            &[NodeKind::RawOutput],
        )
        .into_iter()
        .collect();
    tree.remove_nodes(root, &comments);
}
