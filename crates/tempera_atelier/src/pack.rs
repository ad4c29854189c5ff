//! Bundling of external media inside `{% compress %}`.
//!
//! External scripts and stylesheet links served from the media or static
//! prefix, or from another host, are fetched through the context's media
//! loader, compiled and joined into one bundle stored in the media cache.
//! The first tag of a bundle points at it; the other tags are dropped.

use std::sync::Arc;

use tempera_carton::{format_compact, CompactString, ContentHash, FxHashSet};
use tempera_relief::{CompileError, CompileOptions, CompileResult, NodeId, NodeKind, ParseTree, SourceLocation};
use tracing::debug;

use crate::context::CompileContext;
use crate::markup::{attribute, attribute_node, params, set_attribute_value, tag_name};
use crate::{script, stylesheet};

/// Compiled media written for one group of tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Url the first tag now points at
    pub url: CompactString,
    /// Urls of the bundled files, in document order
    pub files: Vec<CompactString>,
    pub content: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Media {
    Script,
    Stylesheet,
}

impl Media {
    fn extension(self) -> &'static str {
        match self {
            Media::Script => "js",
            Media::Stylesheet => "css",
        }
    }
}

/// An external file referenced by a tag.
struct Reference {
    tag: NodeId,
    url: String,
    loc: SourceLocation,
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

fn is_packable(options: &CompileOptions, url: &str) -> bool {
    let under = |prefix: &str| !prefix.is_empty() && url.starts_with(prefix);
    under(&options.media_url) || under(&options.static_url) || is_remote(url)
}

/// `{% compress %}` tags not nested in another one.
fn compress_tags(tree: &ParseTree) -> Vec<NodeId> {
    tree.descendants(
        tree.root(),
        &[NodeKind::Compress],
        &[NodeKind::Compress, NodeKind::RawOutput],
    )
}

/// Bundle the external scripts of every `{% compress %}` tag.
pub fn pack_scripts(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    for compress in compress_tags(tree) {
        let scripts: Vec<Reference> = tree
            .descendants(compress, &[NodeKind::HtmlScript], &[NodeKind::RawOutput])
            .into_iter()
            .filter_map(|script| {
                let url = attribute(tree, params(tree, script), "src")?;
                is_packable(&ctx.options, &url).then(|| Reference {
                    tag: script,
                    url,
                    loc: tree.loc(script).clone(),
                })
            })
            .collect();
        let Some((first, rest)) = scripts.split_first() else {
            continue;
        };

        let bundle = build_bundle(ctx, Media::Script, &scripts)?;
        if let Some(src) = attribute_node(tree, params(tree, first.tag), "src") {
            set_attribute_value(tree, src, &bundle.url);
        }
        let removed: FxHashSet<NodeId> = rest.iter().map(|r| r.tag).collect();
        tree.remove_nodes(compress, &removed);
        debug!(url = %bundle.url, files = scripts.len(), "pack_scripts");
        ctx.add_bundle(bundle);
    }
    Ok(())
}

/// `<link rel="stylesheet">`, typed as CSS or untyped.
fn is_stylesheet_link(tree: &ParseTree, tag: NodeId) -> bool {
    let children = tree.children(tag);
    tag_name(tree, children).is_some_and(|name| name.eq_ignore_ascii_case("link"))
        && attribute(tree, children, "rel").is_some_and(|rel| rel.eq_ignore_ascii_case("stylesheet"))
        && attribute(tree, children, "type").map_or(true, |kind| kind.eq_ignore_ascii_case("text/css"))
}

/// Bundle the stylesheet links of every `{% compress %}` tag.
///
/// Links are grouped while their `media` attribute stays the same, so a
/// change of media starts another bundle.
pub fn pack_stylesheets(tree: &mut ParseTree, ctx: &mut CompileContext) -> CompileResult<()> {
    for compress in compress_tags(tree) {
        let links: Vec<(Reference, Option<String>)> = tree
            .descendants(compress, &[NodeKind::HtmlTag], &[NodeKind::RawOutput])
            .into_iter()
            .filter(|tag| is_stylesheet_link(tree, *tag))
            .filter_map(|tag| {
                let children = tree.children(tag);
                let url = attribute(tree, children, "href")?;
                let media = attribute(tree, children, "media");
                is_packable(&ctx.options, &url).then(|| {
                    let loc = tree.loc(tag).clone();
                    (Reference { tag, url, loc }, media)
                })
            })
            .collect();

        let mut removed = FxHashSet::default();
        let mut start = 0;
        while start < links.len() {
            let media = &links[start].1;
            let end = links[start..]
                .iter()
                .position(|(_, other)| other != media)
                .map_or(links.len(), |n| start + n);
            let group: Vec<&Reference> = links[start..end].iter().map(|(r, _)| r).collect();

            let bundle = build_bundle(ctx, Media::Stylesheet, group.iter().copied())?;
            let first = group[0].tag;
            if let Some(href) = attribute_node(tree, tree.children(first), "href") {
                set_attribute_value(tree, href, &bundle.url);
            }
            removed.extend(group[1..].iter().map(|r| r.tag));
            debug!(url = %bundle.url, files = group.len(), "pack_stylesheets");
            ctx.add_bundle(bundle);
            start = end;
        }
        tree.remove_nodes(compress, &removed);
    }
    Ok(())
}

/// Fetch, compile and join `files` into one cached bundle.
fn build_bundle<'a>(
    ctx: &CompileContext,
    media: Media,
    files: impl IntoIterator<Item = &'a Reference>,
) -> CompileResult<Bundle> {
    let mut urls = Vec::new();
    let mut compiled = Vec::new();
    for file in files {
        let source = ctx.load_media(&file.url, &file.loc)?;
        let output = match media {
            Media::Script => script::compile_script_source(&source, &file.url, ctx.cache())?,
            Media::Stylesheet => {
                stylesheet::compile_stylesheet_source(&source, &file.url, Some(&file.url), ctx.cache())?
            }
        };
        urls.push(CompactString::from(file.url.as_str()));
        compiled.push(output);
    }

    let joined = compiled.join("\n");
    let key = ContentHash::of_parts(&[media.extension(), joined.as_str()]);
    let content = ctx.cache().get_or_compile(key, || Ok::<_, CompileError>(joined))?;
    Ok(Bundle {
        url: format_compact!("{}{key}.{}", ctx.options.bundle_url, media.extension()),
        files: urls,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packable_urls() {
        let options = CompileOptions::default();
        assert!(is_packable(&options, "/static/js/app.js"));
        assert!(is_packable(&options, "/media/site.css"));
        assert!(is_packable(&options, "https://cdn.example.com/lib.js"));
        assert!(is_packable(&options, "//cdn.example.com/lib.js"));
        assert!(!is_packable(&options, "/local/app.js"));
        assert!(!is_packable(&options, "app.js"));

        let no_prefixes = CompileOptions {
            media_url: CompactString::default(),
            static_url: CompactString::default(),
            ..CompileOptions::default()
        };
        assert!(!is_packable(&no_prefixes, "/static/js/app.js"));
    }
}
