//! Relief - The parse tree for tempera.
//!
//! Like a relief carving raising figures from a flat surface, this crate
//! holds the structure raised from flat template text: the node model
//! every grammar front end reads and mutates, its serialization, and the
//! error and option types shared by the compiler crates.

pub mod ast;
pub mod emit;
pub mod errors;
pub mod options;
pub mod tree;

pub use ast::*;
pub use emit::{DefaultEmitter, Emission, Emitter};
pub use errors::{CompileError, CompileResult, CompileWarning, LoadError};
pub use options::CompileOptions;
pub use tree::{push_child, ParseTree};
