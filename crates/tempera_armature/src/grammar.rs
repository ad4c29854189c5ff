//! Grammar tables for the lex engine.
//!
//! A grammar is an ordered set of named states. Each state holds an ordered
//! list of rules; a rule is an anchored pattern, an optional lookahead guard
//! and the actions run when it fires.
//!
//! ```
//! use tempera_armature::{rule, Action::*, Grammar};
//! use tempera_relief::NodeKind;
//!
//! let grammar = Grammar::builder("words")
//!     .state("root", vec![
//!         rule(r"\w+", &[Start(NodeKind::Content), Record(None), Shift, Stop]),
//!         rule(r"\s+", &[Record(None), Shift]),
//!     ])
//!     .build()
//!     .unwrap();
//! assert_eq!(grammar.name(), "words");
//! ```

use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use tempera_relief::NodeKind;
use thiserror::Error;

/// Name of the state every run starts in.
pub const ROOT_STATE: &str = "root";

/// Step executed when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Push a state
    Push(&'static str),
    /// Pop the current state
    Pop,
    /// Append the matched text, or the given replacement
    Record(Option<&'static str>),
    /// Consume the matched text
    Shift,
    /// Open a token of the given kind at the cursor
    Start(NodeKind),
    /// Close the innermost open token
    Stop,
    /// Raise a lex error
    Fail(&'static str),
}

/// Lookahead checked at the end of a match.
#[derive(Debug, Clone)]
pub enum Guard {
    Followed(Regex),
    NotFollowed(Regex),
}

impl Guard {
    #[inline]
    fn holds(&self, rest: &str) -> bool {
        match self {
            Guard::Followed(re) => re.is_match(rest),
            Guard::NotFollowed(re) => !re.is_match(rest),
        }
    }
}

/// Uncompiled rule, as written in a grammar table.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pattern: &'static str,
    guard: Option<(bool, &'static str)>,
    actions: Vec<Action>,
}

/// Rule matching `pattern` and running `actions`.
pub fn rule(pattern: &'static str, actions: &[Action]) -> RuleSpec {
    RuleSpec {
        pattern,
        guard: None,
        actions: actions.to_vec(),
    }
}

impl RuleSpec {
    /// Only fire when the match is followed by `pattern`.
    pub fn followed_by(mut self, pattern: &'static str) -> Self {
        self.guard = Some((true, pattern));
        self
    }

    /// Only fire when the match is not followed by `pattern`.
    pub fn not_followed_by(mut self, pattern: &'static str) -> Self {
        self.guard = Some((false, pattern));
        self
    }
}

/// Compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    guard: Option<Guard>,
    actions: Vec<Action>,
}

impl Rule {
    /// Length of the match at the start of `text` when this rule fires.
    pub fn fire(&self, text: &str) -> Option<usize> {
        let found = self.pattern.find(text)?;
        let len = found.end();
        match &self.guard {
            Some(guard) if !guard.holds(&text[len..]) => None,
            _ => Some(len),
        }
    }

    #[inline]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

#[derive(Debug, Clone)]
pub struct State {
    name: &'static str,
    rules: Vec<Rule>,
    eof_ok: bool,
}

impl State {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether input may end while this state is on the stack.
    #[inline]
    pub fn eof_ok(&self) -> bool {
        self.eof_ok
    }
}

/// Immutable lex state table.
#[derive(Debug, Clone)]
pub struct Grammar {
    name: &'static str,
    states: Vec<State>,
    index: FxHashMap<&'static str, usize>,
}

impl Grammar {
    pub fn builder(name: &'static str) -> GrammarBuilder {
        GrammarBuilder {
            name,
            states: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn state(&self, index: usize) -> &State {
        &self.states[index]
    }

    /// Index of the state called `name`.
    #[inline]
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Index of the root state. Present in every built grammar.
    #[inline]
    pub fn root_index(&self) -> usize {
        self.index.get(ROOT_STATE).copied().unwrap_or(0)
    }
}

pub struct GrammarBuilder {
    name: &'static str,
    states: Vec<(&'static str, Vec<RuleSpec>, bool)>,
}

impl GrammarBuilder {
    /// Add a state which must be popped before input ends.
    pub fn state(mut self, name: &'static str, rules: Vec<RuleSpec>) -> Self {
        self.states.push((name, rules, false));
        self
    }

    /// Add a state input may end in.
    pub fn tolerant_state(mut self, name: &'static str, rules: Vec<RuleSpec>) -> Self {
        self.states.push((name, rules, true));
        self
    }

    /// Compile the table, checking that every pushed state exists.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let grammar = self.name;
        let mut index = FxHashMap::default();
        for (i, (name, _, _)) in self.states.iter().enumerate() {
            if index.insert(*name, i).is_some() {
                return Err(GrammarError::DuplicateState { grammar, state: *name });
            }
        }
        if !index.contains_key(ROOT_STATE) {
            return Err(GrammarError::MissingRoot { grammar });
        }

        let mut states = Vec::with_capacity(self.states.len());
        for (name, specs, eof_ok) in self.states {
            let mut rules = Vec::with_capacity(specs.len());
            for spec in specs {
                for action in &spec.actions {
                    if let Action::Push(target) = action {
                        if !index.contains_key(target) {
                            return Err(GrammarError::UnknownState {
                                grammar,
                                state: name,
                                target: *target,
                            });
                        }
                    }
                }
                let guard = match spec.guard {
                    Some((true, pattern)) => Some(Guard::Followed(anchored(grammar, name, pattern)?)),
                    Some((false, pattern)) => Some(Guard::NotFollowed(anchored(grammar, name, pattern)?)),
                    None => None,
                };
                rules.push(Rule {
                    pattern: anchored(grammar, name, spec.pattern)?,
                    guard,
                    actions: spec.actions,
                });
            }
            states.push(State { name, rules, eof_ok });
        }

        Ok(Grammar {
            name: grammar,
            states,
            index,
        })
    }
}

fn anchored(grammar: &'static str, state: &'static str, pattern: &'static str) -> Result<Regex, GrammarError> {
    RegexBuilder::new(&format!("^(?:{pattern})"))
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| GrammarError::InvalidPattern {
            grammar,
            state,
            pattern,
            source,
        })
}

/// A grammar or nesting table is malformed.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("grammar '{grammar}': state '{state}' has invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        grammar: &'static str,
        state: &'static str,
        pattern: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("grammar '{grammar}' has no 'root' state")]
    MissingRoot { grammar: &'static str },

    #[error("grammar '{grammar}' defines state '{state}' twice")]
    DuplicateState {
        grammar: &'static str,
        state: &'static str,
    },

    #[error("grammar '{grammar}': state '{state}' pushes unknown state '{target}'")]
    UnknownState {
        grammar: &'static str,
        state: &'static str,
        target: &'static str,
    },

    #[error("block mapping: {0}")]
    Mapping(String),
}

#[cfg(test)]
mod tests {
    use super::Action::*;
    use super::*;

    #[test]
    fn test_rules_are_anchored() {
        let grammar = Grammar::builder("t")
            .state("root", vec![rule("b", &[Shift])])
            .build()
            .unwrap();
        let root = grammar.state(grammar.root_index());
        assert_eq!(root.rules()[0].fire("bc"), Some(1));
        assert_eq!(root.rules()[0].fire("ab"), None);
    }

    #[test]
    fn test_guards() {
        let grammar = Grammar::builder("t")
            .state(
                "root",
                vec![
                    rule("/", &[Shift]).not_followed_by("[/*]"),
                    rule("<", &[Shift]).followed_by(r"\w"),
                ],
            )
            .build()
            .unwrap();
        let rules = grammar.state(0).rules();
        assert_eq!(rules[0].fire("/ 2"), Some(1));
        assert_eq!(rules[0].fire("// c"), None);
        assert_eq!(rules[1].fire("<a>"), Some(1));
        assert_eq!(rules[1].fire("< a"), None);
    }

    #[test]
    fn test_missing_root() {
        let err = Grammar::builder("t").state("body", vec![]).build().unwrap_err();
        assert!(matches!(err, GrammarError::MissingRoot { .. }));
    }

    #[test]
    fn test_unknown_push_target() {
        let err = Grammar::builder("t")
            .state("root", vec![rule("x", &[Shift, Push("nowhere")])])
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "grammar 't': state 'root' pushes unknown state 'nowhere'"
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Grammar::builder("t")
            .state("root", vec![rule("(", &[Shift])])
            .build()
            .unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { pattern: "(", .. }));
    }
}
