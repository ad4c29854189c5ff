//! # Tempera
//!
//! Template compiler for Django-style templates written in Rust.
//!
//! This crate re-exports all Tempera sub-crates for unified documentation.
//!
//! ## Crates
//!
//! - [`carton`] - Shared toolbox: collections, content hashing, media cache
//! - [`relief`] - Parse tree, node kinds, errors and options
//! - [`armature`] - Lex engine and block nesting
//! - [`croquis`] - Script scope resolution and minification
//! - [`atelier`] - Grammars and the template compilation pipeline

/// Shared toolbox: collections, content hashing, media cache.
pub use tempera_carton as carton;

/// Parse tree, node kinds, errors and options.
pub use tempera_relief as relief;

/// Lex engine and block nesting.
pub use tempera_armature as armature;

/// Script scope resolution and minification.
pub use tempera_croquis as croquis;

/// Grammars and the template compilation pipeline.
pub use tempera_atelier as atelier;

pub mod config;

pub use config::{load_config, TemperaConfig, CONFIG_FILE};
pub use tempera_atelier::{
    compile_script_source, compile_stylesheet_source, compile_template, Bundle, CompileContext, DirectoryLoader,
    MediaLoader, MemoryLoader, TemplateLoader,
};
pub use tempera_relief::{CompileError, CompileOptions, CompileResult, CompileWarning};
