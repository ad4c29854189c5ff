//! The template compilation pipeline.

use tempera_relief::{CompileResult, NodeId, NodeKind, ParseTree, SourceLocation};
use tracing::debug;

use crate::context::CompileContext;
use crate::emit::CompiledEmitter;
use crate::{markup, preprocess, template};

/// A parsed and processed template.
#[derive(Debug)]
pub struct Template {
    pub tree: ParseTree,
}

impl Template {
    #[inline]
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Compiled output.
    pub fn render(&self) -> String {
        self.tree.serialize_with(self.root(), &CompiledEmitter)
    }
}

/// Compile a template to its compiled output.
pub fn compile_template(source: &str, path: &str, ctx: &mut CompileContext) -> CompileResult<String> {
    let template = parse_template(source, path, ctx, true)?;
    Ok(template.render())
}

/// Parse and process a template.
///
/// Only the main template (`main`) runs the output passes; templates
/// loaded for `{% extends %}`, `{% include %}` and `{% decorate %}` are
/// merged first and processed as part of it.
pub fn parse_template(source: &str, path: &str, ctx: &mut CompileContext, main: bool) -> CompileResult<Template> {
    debug!(path, main, "parse_template");
    let mut tree = ParseTree::new(path, source);
    template::parse(&mut tree)?;

    let mut tree = preprocess::extend(tree, ctx)?;
    preprocess::expand_includes(&mut tree, ctx)?;
    preprocess::expand_decorates(&mut tree, ctx)?;

    if main {
        preprocess::apply_config(&mut tree, ctx)?;
        let options = ctx.options.clone();
        let root = tree.root();

        if options.preprocess_variables {
            preprocess::substitute_variables(&mut tree, &options.variables);
        }
        if options.remove_block_tags {
            tree.collapse_kind(root, NodeKind::Block);
        }
        if options.preprocess_macros {
            preprocess::expand_macros(&mut tree);
        }
        if options.preprocess_ifdebug {
            preprocess::resolve_ifdebug(&mut tree, options.debug);
        }
        if options.merge_all_load_tags {
            preprocess::group_loads(&mut tree);
        }
        preprocess::remove_comments(&mut tree);

        if options.is_html {
            markup::process(&mut tree, ctx)?;
        }
    }
    Ok(Template { tree })
}

/// Parse template `name` for use inside another template.
pub(crate) fn load_template(ctx: &mut CompileContext, name: &str, loc: &SourceLocation) -> CompileResult<Template> {
    let source = ctx.load(name, loc)?;
    ctx.enter(name, loc)?;
    let parsed = parse_template(&source, name, ctx, false);
    ctx.leave();
    parsed
}
