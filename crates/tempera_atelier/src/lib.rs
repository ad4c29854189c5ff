//! # tempera_atelier
//!
//! Atelier - The template compilation workshop for tempera.
//!
//! ## Name Origin
//!
//! An **atelier** is the workshop where raw material becomes a finished
//! piece. Template source enters here, is parsed, merged with the
//! templates it extends, includes or is decorated by, cleaned of
//! everything a renderer does not need, and leaves as compiled output.
//!
//! ## Pipeline
//!
//! 1. template tags (`template`)
//! 2. `{% extends %}`, `{% include %}` and `{% decorate %}` (`preprocess`)
//! 3. configuration, variables, macros, `{% ifdebug %}`, load grouping
//! 4. markup with its scripts and stylesheets (`markup`, `script`,
//!    `stylesheet`), and `{% compress %}` bundles (`pack`)
//! 5. output (`emit`)
//!
//! ## Example
//!
//! ```
//! use tempera_atelier::{compile_template, CompileContext, MemoryLoader};
//!
//! let loader = MemoryLoader::new().with("base.html", "<p>{% block body %}{% endblock %}</p>");
//! let mut ctx = CompileContext::default().with_loader(loader);
//! let out = compile_template(
//!     "{% extends \"base.html\" %}{% block body %}Hi{% endblock %}",
//!     "page.html",
//!     &mut ctx,
//! )
//! .unwrap();
//! assert_eq!(out, "<p>Hi</p>");
//! ```

pub mod compile;
pub mod context;
pub mod emit;
pub mod loader;
pub mod markup;
pub mod pack;
pub mod preprocess;
pub mod script;
pub mod stylesheet;
pub mod template;

pub use compile::{compile_template, parse_template, Template};
pub use context::CompileContext;
pub use emit::CompiledEmitter;
pub use loader::{DirectoryLoader, MediaLoader, MemoryLoader, TemplateLoader};
pub use pack::Bundle;
pub use script::compile_script_source;
pub use stylesheet::compile_stylesheet_source;

pub use tempera_relief::{CompileError, CompileOptions, CompileResult, CompileWarning, LoadError};
