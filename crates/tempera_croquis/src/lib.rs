//! # tempera_croquis
//!
//! Croquis - The script scope analysis layer for tempera.
//!
//! ## Name Origin
//!
//! A **croquis** is a quick sketch that captures the essential features of
//! a subject. This crate sketches the scope structure of script code
//! embedded in templates: which names each `{ }` scope declares, which
//! identifiers refer to them, and which names are free.
//!
//! ## Passes
//!
//! 1. declaration discovery per scope (`var`, `let`, `const`, `function`
//!    names and function parameters)
//! 2. reference linking, innermost scope first
//! 3. renaming of private declarations to short names
//!
//! ```text
//! tempera_armature (tokenize)
//!        ↓
//!  tempera_relief (tokens)
//!        ↓
//! tempera_croquis (scopes)  ← This crate
//!        ↓
//! tempera_atelier (compile)
//! ```

pub mod naming;
mod scope;

pub use naming::{is_reserved, nth_name};
pub use scope::{resolve_and_minify, ScopeReport};
