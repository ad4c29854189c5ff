//! Armature - The lexing and nesting framework for tempera.
//!
//! Like the wire skeleton inside a sculpture, this crate gives every
//! tempera grammar its structure. It knows nothing about any particular
//! language: grammar front ends describe themselves with a [`Grammar`]
//! table and a [`BlockMapping`], and the engines here turn flat text into a
//! nested [`ParseTree`](tempera_relief::ParseTree).
//!
//! - [`tokenize`] runs a regex-driven state machine over the text children
//!   of a node
//! - [`nest`] folds flat open/alternate/close markers into constructs

pub mod grammar;
pub mod lexer;
pub mod nest;

pub use grammar::{rule, Action, Grammar, GrammarBuilder, GrammarError, Guard, RuleSpec};
pub use lexer::tokenize;
pub use nest::{nest, Block, BlockMapping};
