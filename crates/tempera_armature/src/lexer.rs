//! Regex-driven, stack-based lex engine.
//!
//! A run keeps a stack of grammar states and a stack of open tokens. The
//! text children of a list are scanned as one buffer; at each offset the
//! rules of the top state are tried in order and the first one that fires
//! has its actions executed. Nothing is undone once a rule fired.
//!
//! Non-text children are handled by kind:
//! - passthrough kinds are dissolved and their lists are scanned by the same
//!   run, so lexer state carries across them
//! - enter kinds have each of their lists tokenized as a fresh run and are
//!   then kept as a token of the current run
//! - every other node is kept untouched

use compact_str::{format_compact, CompactString};
use tempera_relief::{push_child, Child, CompileError, CompileResult, NodeId, NodeKind, ParseTree, SourceLocation};
use tracing::debug;

use crate::grammar::{Action, Grammar};

/// Characters of context shown on each side of a lex error.
const CONTEXT: usize = 20;

/// Tokenize every branch list of `node` with `grammar`.
pub fn tokenize(
    tree: &mut ParseTree,
    node: NodeId,
    grammar: &Grammar,
    passthrough: &[NodeKind],
    enter: &[NodeKind],
) -> CompileResult<()> {
    debug!(grammar = grammar.name(), path = tree.path(), "tokenize");
    let mut lexer = Lexer {
        tree,
        grammar,
        passthrough,
        enter,
    };
    lexer.tokenize_node(node)
}

struct Lexer<'a> {
    tree: &'a mut ParseTree,
    grammar: &'a Grammar,
    passthrough: &'a [NodeKind],
    enter: &'a [NodeKind],
}

/// One independent scan: state stack, open tokens and produced list.
struct Run {
    root: usize,
    states: Vec<usize>,
    open: Vec<NodeId>,
    out: Vec<Child>,
    path: CompactString,
    line: u32,
    column: u32,
}

impl Run {
    fn new(root: usize, loc: &SourceLocation) -> Self {
        Self {
            root,
            states: vec![root],
            open: Vec::new(),
            out: Vec::new(),
            path: loc.path.clone(),
            line: loc.line,
            column: loc.column,
        }
    }

    #[inline]
    fn top(&self) -> usize {
        self.states.last().copied().unwrap_or(self.root)
    }

    fn cursor(&self) -> SourceLocation {
        SourceLocation::new(self.path.clone(), self.line, self.column)
    }

    fn seek(&mut self, loc: &SourceLocation) {
        self.line = loc.line;
        self.column = loc.column;
    }

    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl Lexer<'_> {
    fn tokenize_node(&mut self, node: NodeId) -> CompileResult<()> {
        let loc = self.tree.loc(node).clone();
        for branch in 0..self.tree.branches(node).len() {
            let list = self.tree.take_branch(node, branch);
            let tokens = self.run_list(list, &loc)?;
            self.tree.set_branch(node, branch, tokens);
        }
        Ok(())
    }

    fn run_list(&mut self, list: Vec<Child>, loc: &SourceLocation) -> CompileResult<Vec<Child>> {
        let mut run = Run::new(self.grammar.root_index(), loc);
        self.feed(&mut run, list)?;
        self.finish(run)
    }

    fn feed(&mut self, run: &mut Run, list: Vec<Child>) -> CompileResult<()> {
        let mut buf = String::new();
        for child in list {
            match child {
                Child::Text(text) => buf.push_str(&text),
                Child::Node(id) => {
                    if !buf.is_empty() {
                        self.scan(run, &buf)?;
                        buf.clear();
                    }
                    let kind = self.tree.kind(id);
                    if self.passthrough.contains(&kind) {
                        run.seek(self.tree.loc(id));
                        for branch in self.tree.take_branches(id) {
                            self.feed(run, branch)?;
                        }
                    } else {
                        if self.enter.contains(&kind) {
                            self.tokenize_node(id)?;
                        }
                        self.append(run, Child::Node(id));
                    }
                }
            }
        }
        if !buf.is_empty() {
            self.scan(run, &buf)?;
        }
        Ok(())
    }

    fn append(&mut self, run: &mut Run, child: Child) {
        match run.open.last() {
            Some(&token) => self.tree.append(token, 0, child),
            None => push_child(&mut run.out, child),
        }
    }

    fn scan(&mut self, run: &mut Run, text: &str) -> CompileResult<()> {
        let grammar = self.grammar;
        let mut pos = 0;
        while pos < text.len() {
            let state = grammar.state(run.top());
            let rest = &text[pos..];
            let Some((rule, len)) = state
                .rules()
                .iter()
                .find_map(|rule| rule.fire(rest).map(|len| (rule, len)))
            else {
                return Err(lex_error(
                    run,
                    text,
                    pos,
                    format_compact!("no possible transition in state '{}'", state.name()),
                ));
            };
            let matched = &rest[..len];
            let before = (pos, run.states.len(), run.top(), run.open.len());
            let mut shifted = false;

            for action in rule.actions() {
                match *action {
                    Action::Record(None) => self.append(run, Child::Text(matched.into())),
                    Action::Record(Some(replacement)) => self.append(run, Child::Text(replacement.into())),
                    Action::Shift => {
                        if !shifted {
                            shifted = true;
                            pos += len;
                            run.advance(matched);
                        }
                    }
                    Action::Start(kind) => {
                        let token = self.tree.create(kind, run.cursor());
                        self.append(run, Child::Node(token));
                        run.open.push(token);
                    }
                    Action::Stop => {
                        if run.open.pop().is_none() {
                            return Err(lex_error(run, text, pos, "unbalanced token close"));
                        }
                    }
                    Action::Fail(message) => return Err(lex_error(run, text, pos, message)),
                    Action::Push(name) => {
                        let index = grammar.state_index(name).ok_or_else(|| {
                            CompileError::Grammar(format!("{}: no state '{name}'", grammar.name()))
                        })?;
                        run.states.push(index);
                    }
                    Action::Pop => {
                        if run.states.len() <= 1 {
                            return Err(lex_error(run, text, pos, "pop from the root state"));
                        }
                        run.states.pop();
                    }
                }
            }

            if (pos, run.states.len(), run.top(), run.open.len()) == before {
                return Err(lex_error(
                    run,
                    text,
                    pos,
                    format_compact!("rule in state '{}' made no progress", state.name()),
                ));
            }
        }
        Ok(())
    }

    fn finish(&self, run: Run) -> CompileResult<Vec<Child>> {
        if let Some(&token) = run.open.last() {
            return Err(CompileError::UnterminatedToken {
                kind: self.tree.kind(token).name(),
                loc: self.tree.loc(token).clone(),
            });
        }
        for &index in run.states.iter().skip(1).rev() {
            let state = self.grammar.state(index);
            if !state.eof_ok() {
                return Err(CompileError::UnterminatedState {
                    state: state.name(),
                    loc: run.cursor(),
                });
            }
        }
        Ok(run.out)
    }
}

fn lex_error(run: &Run, text: &str, pos: usize, message: impl Into<CompactString>) -> CompileError {
    CompileError::Lex {
        loc: run.cursor(),
        message: message.into(),
        near: near(text, pos),
    }
}

/// Text around `pos`, clamped to character boundaries.
fn near(text: &str, pos: usize) -> String {
    let mut start = pos.saturating_sub(CONTEXT);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + CONTEXT).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].to_string()
}
