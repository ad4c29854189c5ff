//! Scope resolution and identifier minification.
//!
//! Works on the token tree of a script region. Each `js-scope` node gets a
//! symbol table; the script root is the global scope and is never renamed.

use tempera_carton::{CompactString, FxHashMap, FxHashSet};
use tempera_relief::{Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree};
use tracing::{debug, trace};

use crate::naming::shortest_free_name;

/// Outcome of [`resolve_and_minify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeReport {
    /// Names referenced without any declaration, sorted
    pub free: Vec<CompactString>,
    /// `(declared name, short name)` in assignment order
    pub renamed: Vec<(CompactString, CompactString)>,
    /// Scopes that received at least one short name
    pub scopes: usize,
}

/// Declarations of one scope, in discovery order.
#[derive(Debug, Default)]
struct SymbolTable {
    order: Vec<CompactString>,
    map: FxHashMap<CompactString, NodeId>,
}

impl SymbolTable {
    /// Record a declaration. The first declaration of a name is kept and
    /// returned when `name` is declared again.
    fn declare(&mut self, name: CompactString, node: NodeId) -> Option<NodeId> {
        if let Some(&first) = self.map.get(&name) {
            return Some(first);
        }
        self.order.push(name.clone());
        self.map.insert(name, node);
        None
    }

    #[inline]
    fn get(&self, name: &str) -> Option<NodeId> {
        self.map.get(name).copied()
    }
}

/// Resolve the scopes below `script_root` and rename private declarations.
///
/// References read their name through a link to the declaration, so a
/// renamed declaration renames every reference with it.
pub fn resolve_and_minify(tree: &mut ParseTree, script_root: NodeId) -> CompileResult<ScopeReport> {
    let mut resolver = Resolver {
        global: script_root,
        tables: FxHashMap::default(),
        declared: FxHashSet::default(),
        redeclared: Vec::new(),
        free: FxHashSet::default(),
    };

    resolver.declarations_in(tree, script_root, script_root)?;

    let mut links = std::mem::take(&mut resolver.redeclared);
    resolver.links_in(tree, script_root, &mut vec![script_root], &mut links);
    for (reference, declaration) in links {
        tree.binding_mut(reference).link = Some(declaration);
    }

    let mut report = ScopeReport::default();
    let avoid: FxHashSet<CompactString> = resolver.free.iter().cloned().collect();
    resolver.rename(tree, script_root, &avoid, &mut report);

    separate_scope_openings(tree, script_root);

    report.free = resolver.free.into_iter().collect();
    report.free.sort();
    debug!(
        free = report.free.len(),
        renamed = report.renamed.len(),
        scopes = report.scopes,
        "resolve_and_minify"
    );
    Ok(report)
}

struct Resolver {
    global: NodeId,
    tables: FxHashMap<NodeId, SymbolTable>,
    /// Every identifier recorded as a declaration
    declared: FxHashSet<NodeId>,
    /// `(later declaration, kept declaration)` of names declared twice in one scope
    redeclared: Vec<(NodeId, NodeId)>,
    free: FxHashSet<CompactString>,
}

fn is_operator(tree: &ParseTree, id: NodeId, operator: &str) -> bool {
    tree.kind(id) == NodeKind::JsOperator && tree.raw_text(id).trim() == operator
}

#[inline]
fn significant(tree: &ParseTree, id: NodeId) -> bool {
    !tree.kind(id).is_js_whitespace()
}

/// A token after which a line break may end the statement.
fn ends_expression(tree: &ParseTree, id: NodeId) -> bool {
    match tree.kind(id) {
        NodeKind::JsVariable
        | NodeKind::JsNumber
        | NodeKind::JsDoubleQuotedString
        | NodeKind::JsSingleQuotedString
        | NodeKind::JsRegex
        | NodeKind::JsParentheses
        | NodeKind::JsSquareBrackets
        | NodeKind::JsScope => true,
        NodeKind::JsKeyword => matches!(tree.raw_text(id).as_str(), "this" | "true" | "false" | "null"),
        NodeKind::JsOperator => matches!(tree.raw_text(id).trim(), "++" | "--"),
        _ => false,
    }
}

/// A token that cannot continue the expression before a line break.
fn starts_expression(tree: &ParseTree, id: NodeId) -> bool {
    matches!(
        tree.kind(id),
        NodeKind::JsVariable
            | NodeKind::JsNumber
            | NodeKind::JsDoubleQuotedString
            | NodeKind::JsSingleQuotedString
            | NodeKind::JsRegex
            | NodeKind::JsKeyword
    )
}

impl Resolver {
    fn declare(&mut self, scope: NodeId, name: CompactString, node: NodeId) {
        self.declared.insert(node);
        if let Some(first) = self.tables.entry(scope).or_default().declare(name, node) {
            self.redeclared.push((node, first));
        }
    }

    // Pass 1

    fn declarations_in(&mut self, tree: &ParseTree, node: NodeId, scope: NodeId) -> CompileResult<()> {
        for branch in tree.branches(node) {
            self.declarations(tree, branch, scope)?;
        }
        Ok(())
    }

    fn declarations(&mut self, tree: &ParseTree, list: &[Child], scope: NodeId) -> CompileResult<()> {
        let private = scope != self.global;
        // The next identifier is declared
        let mut armed = false;
        // Inside a `var`/`let`/`const` statement, where `,` starts another declaration
        let mut statement = false;
        // The last significant token ends an expression
        let mut complete = false;
        // A line break follows that token
        let mut line_break = false;

        for (index, id) in list.iter().filter_map(Child::as_node).enumerate() {
            if !significant(tree, id) {
                line_break |= complete && tree.raw_text(id).contains('\n');
                continue;
            }
            if statement && line_break && starts_expression(tree, id) {
                armed = false;
                statement = false;
            }
            line_break = false;
            complete = ends_expression(tree, id);

            match tree.kind(id) {
                NodeKind::JsKeyword => {
                    let keyword = tree.raw_text(id);
                    armed = false;
                    statement = false;
                    match keyword.as_str() {
                        "var" | "let" | "const" if private => {
                            armed = true;
                            statement = true;
                        }
                        "function" => {
                            armed = private;
                            self.parameters(tree, list, index)?;
                        }
                        _ => {}
                    }
                }
                NodeKind::JsVariable => {
                    if armed {
                        self.declare(scope, tree.raw_text(id), id);
                        armed = false;
                    }
                }
                NodeKind::JsOperator => {
                    let operator = tree.raw_text(id);
                    match operator.trim() {
                        "," if statement => armed = true,
                        ";" => {
                            armed = false;
                            statement = false;
                        }
                        _ => armed = false,
                    }
                }
                NodeKind::JsScope => {
                    self.declarations_in(tree, id, id)?;
                    armed = false;
                }
                _ => {
                    self.declarations_in(tree, id, scope)?;
                    armed = false;
                }
            }
        }
        Ok(())
    }

    /// Bind the parameters of the function whose keyword is the
    /// `keyword`-th node of `list` to the scope that follows them.
    fn parameters(&mut self, tree: &ParseTree, list: &[Child], keyword: usize) -> CompileResult<()> {
        let mut nodes = list.iter().filter_map(Child::as_node);
        let keyword = nodes.nth(keyword).unwrap_or(self.global);
        let mut rest = nodes.filter(|id| significant(tree, *id));
        let ended = || CompileError::scope(tree.loc(keyword), "Unexpected end of script in function definition");

        let mut current = rest.next().ok_or_else(ended)?;
        if tree.kind(current) == NodeKind::JsVariable {
            current = rest.next().ok_or_else(ended)?;
        }
        if tree.kind(current) != NodeKind::JsParentheses {
            return Err(CompileError::scope(tree.loc(current), r#"Expected "(" after function keyword"#));
        }

        let mut found = Vec::new();
        let mut need_comma = false;
        for id in tree.child_nodes(current) {
            match tree.kind(id) {
                kind if kind.is_js_whitespace() => {}
                NodeKind::JsVariable if !need_comma => {
                    found.push(id);
                    need_comma = true;
                }
                NodeKind::JsOperator if need_comma && is_operator(tree, id, ",") => need_comma = false,
                _ => {
                    return Err(CompileError::scope(
                        tree.loc(id),
                        "Unexpected token in function parameter list",
                    ))
                }
            }
        }

        let body = rest.next().ok_or_else(ended)?;
        if tree.kind(body) != NodeKind::JsScope {
            return Err(CompileError::scope(tree.loc(body), r#"Expected "{" after function definition"#));
        }
        for id in found {
            self.declare(body, tree.raw_text(id), id);
        }
        Ok(())
    }

    // Pass 2

    fn links_in(
        &mut self,
        tree: &ParseTree,
        node: NodeId,
        scopes: &mut Vec<NodeId>,
        links: &mut Vec<(NodeId, NodeId)>,
    ) {
        for branch in tree.branches(node) {
            let nodes: Vec<NodeId> = branch.iter().filter_map(Child::as_node).collect();
            for (i, &id) in nodes.iter().enumerate() {
                match tree.kind(id) {
                    NodeKind::JsVariable => {
                        if self.declared.contains(&id) {
                            continue;
                        }
                        let previous = nodes[..i].iter().rev().copied().find(|n| significant(tree, *n));
                        let next = nodes[i + 1..].iter().copied().find(|n| significant(tree, *n));
                        if is_property(tree, previous) || is_object_key(tree, &nodes[..i], previous, next) {
                            continue;
                        }
                        let name = tree.raw_text(id);
                        let declaration = scopes
                            .iter()
                            .rev()
                            .find_map(|scope| self.tables.get(scope)?.get(&name));
                        match declaration {
                            Some(declaration) => links.push((id, declaration)),
                            None => {
                                self.free.insert(name);
                            }
                        }
                    }
                    NodeKind::JsScope => {
                        scopes.push(id);
                        self.links_in(tree, id, scopes, links);
                        scopes.pop();
                    }
                    _ => self.links_in(tree, id, scopes, links),
                }
            }
        }
    }

    // Pass 3

    fn rename(
        &self,
        tree: &mut ParseTree,
        node: NodeId,
        avoid: &FxHashSet<CompactString>,
        report: &mut ScopeReport,
    ) {
        let assigned;
        let avoid = match self.tables.get(&node) {
            Some(table) if node != self.global && !table.order.is_empty() => {
                let mut names = avoid.clone();
                for name in &table.order {
                    let short = shortest_free_name(&names);
                    names.insert(short.clone());
                    if let Some(declaration) = table.get(name) {
                        tree.binding_mut(declaration).rename = Some(short.clone());
                    }
                    trace!(%name, %short, "rename");
                    report.renamed.push((name.clone(), short));
                }
                report.scopes += 1;
                assigned = names;
                &assigned
            }
            _ => avoid,
        };

        let children: Vec<NodeId> = tree
            .branches(node)
            .iter()
            .flatten()
            .filter_map(Child::as_node)
            .collect();
        for child in children {
            self.rename(tree, child, avoid, report);
        }
    }
}

/// `a.b`: `b` follows the member-access operator.
fn is_property(tree: &ParseTree, previous: Option<NodeId>) -> bool {
    previous.is_some_and(|p| is_operator(tree, p, "."))
}

/// `{b: 1}`: `b` is followed by `:` that does not close a `?` earlier in
/// the same list and is not the label of a `case`.
fn is_object_key(tree: &ParseTree, before: &[NodeId], previous: Option<NodeId>, next: Option<NodeId>) -> bool {
    if !next.is_some_and(|n| is_operator(tree, n, ":")) {
        return false;
    }
    if previous.is_some_and(|p| tree.kind(p) == NodeKind::JsKeyword && tree.raw_text(p).as_str() == "case") {
        return false;
    }
    let mut open_conditionals = 0usize;
    for &id in before {
        if is_operator(tree, id, "?") {
            open_conditionals += 1;
        } else if is_operator(tree, id, ":") {
            open_conditionals = open_conditionals.saturating_sub(1);
        }
    }
    open_conditionals == 0
}

/// Insert a space into every scope whose content would begin with `{`
/// right after the scope's own opening bracket.
fn separate_scope_openings(tree: &mut ParseTree, script_root: NodeId) {
    for scope in tree.descendants(script_root, &[NodeKind::JsScope], &[]) {
        let starts_with_brace = match tree.children(scope).first() {
            Some(Child::Text(text)) => text.starts_with('{'),
            Some(Child::Node(first)) => tree.text_of(*first).starts_with('{'),
            None => false,
        };
        if starts_with_brace {
            let space = tree.create(NodeKind::RequiredWhitespace, tree.loc(scope).clone());
            tree.append_text(space, " ");
            let mut children = vec![Child::Node(space)];
            children.extend(tree.take_branch(scope, 0));
            tree.set_branch(scope, 0, children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declaration_is_kept() {
        let mut table = SymbolTable::default();
        assert_eq!(table.declare("x".into(), NodeId::new(1)), None);
        assert_eq!(table.declare("x".into(), NodeId::new(2)), Some(NodeId::new(1)));
        assert_eq!(table.get("x"), Some(NodeId::new(1)));
        assert_eq!(table.order.len(), 1);
    }
}
