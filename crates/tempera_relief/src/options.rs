//! Compiler options.

use phf::phf_map;
use serde::{Deserialize, Serialize};
use tempera_carton::{CompactString, FxHashMap};

/// Options controlling which passes run over a template.
///
/// Deserializes from the `options` table of `tempera.config.json`; missing
/// fields take their defaults. Templates can change options for themselves
/// with `{% ! option-name %}` tags (see [`CompileOptions::change`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Collapse markup whitespace runs and strip script/stylesheet whitespace
    pub whitespace_compression: bool,
    /// Replace `{{ NAME }}` by values from [`CompileOptions::variables`]
    pub preprocess_variables: bool,
    /// Output the content of `{% block %}` tags without the tags
    pub remove_block_tags: bool,
    /// Merge every `{% load %}` into one tag at the top
    pub merge_all_load_tags: bool,
    /// Expand `{% callmacro %}` and drop `{% macro %}` definitions
    pub preprocess_macros: bool,
    /// Resolve `{% ifdebug %}` at compile time
    pub preprocess_ifdebug: bool,
    /// Whether `{% ifdebug %}` content is kept
    pub debug: bool,
    /// Run the markup processor
    pub is_html: bool,
    pub compile_css: bool,
    pub compile_javascript: bool,
    pub merge_internal_css: bool,
    pub merge_internal_javascript: bool,
    pub remove_empty_class_attributes: bool,
    /// Orphan `{% block %}` tags are errors instead of warnings
    pub disallow_orphan_blocks: bool,
    /// Bundle external scripts inside `{% compress %}`
    pub pack_external_javascript: bool,
    /// Bundle external stylesheet links inside `{% compress %}`
    pub pack_external_css: bool,
    /// Prefix of media urls eligible for bundling
    pub media_url: CompactString,
    /// Prefix of static urls eligible for bundling
    pub static_url: CompactString,
    /// Prefix of the urls given to bundles
    pub bundle_url: CompactString,
    /// Known template variables and their values
    pub variables: FxHashMap<CompactString, CompactString>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            whitespace_compression: true,
            preprocess_variables: true,
            remove_block_tags: true,
            merge_all_load_tags: true,
            preprocess_macros: true,
            preprocess_ifdebug: true,
            debug: false,
            is_html: true,
            compile_css: true,
            compile_javascript: true,
            merge_internal_css: false,
            merge_internal_javascript: false,
            remove_empty_class_attributes: false,
            disallow_orphan_blocks: false,
            pack_external_javascript: false,
            pack_external_css: false,
            media_url: "/media/".into(),
            static_url: "/static/".into(),
            bundle_url: "/media/cache/".into(),
            variables: FxHashMap::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    WhitespaceCompression,
    MergeInternalJavascript,
    MergeInternalCss,
    Html,
    Macros,
    RemoveEmptyClassAttributes,
    CompileCss,
    CompileJavascript,
    DisallowOrphanBlocks,
    PackExternalJavascript,
    PackExternalCss,
}

static OPTION_NAMES: phf::Map<&'static str, (Flag, bool)> = phf_map! {
    "whitespace-compression" => (Flag::WhitespaceCompression, true),
    "no-whitespace-compression" => (Flag::WhitespaceCompression, false),
    "merge-internal-javascript" => (Flag::MergeInternalJavascript, true),
    "merge-internal-css" => (Flag::MergeInternalCss, true),
    "html" => (Flag::Html, true),
    "no-html" => (Flag::Html, false),
    "no-macro-preprocessing" => (Flag::Macros, false),
    "html-remove-empty-class-attributes" => (Flag::RemoveEmptyClassAttributes, true),
    "compile-css" => (Flag::CompileCss, true),
    "no-compile-css" => (Flag::CompileCss, false),
    "compile-javascript" => (Flag::CompileJavascript, true),
    "no-compile-javascript" => (Flag::CompileJavascript, false),
    "disallow-orphan-blocks" => (Flag::DisallowOrphanBlocks, true),
    "no-disallow-orphan-blocks" => (Flag::DisallowOrphanBlocks, false),
    "pack-external-javascript" => (Flag::PackExternalJavascript, true),
    "pack-external-css" => (Flag::PackExternalCss, true),
};

impl CompileOptions {
    /// Apply a named option such as `no-html`.
    ///
    /// Returns false for unknown names, leaving the options untouched.
    pub fn change(&mut self, option: &str) -> bool {
        let Some(&(flag, value)) = OPTION_NAMES.get(option) else {
            return false;
        };
        *self.flag_mut(flag) = value;
        true
    }

    fn flag_mut(&mut self, flag: Flag) -> &mut bool {
        match flag {
            Flag::WhitespaceCompression => &mut self.whitespace_compression,
            Flag::MergeInternalJavascript => &mut self.merge_internal_javascript,
            Flag::MergeInternalCss => &mut self.merge_internal_css,
            Flag::Html => &mut self.is_html,
            Flag::Macros => &mut self.preprocess_macros,
            Flag::RemoveEmptyClassAttributes => &mut self.remove_empty_class_attributes,
            Flag::CompileCss => &mut self.compile_css,
            Flag::CompileJavascript => &mut self.compile_javascript,
            Flag::DisallowOrphanBlocks => &mut self.disallow_orphan_blocks,
            Flag::PackExternalJavascript => &mut self.pack_external_javascript,
            Flag::PackExternalCss => &mut self.pack_external_css,
        }
    }

    /// Every option name accepted by [`CompileOptions::change`].
    pub fn option_names() -> impl Iterator<Item = &'static str> {
        OPTION_NAMES.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_known_option() {
        let mut options = CompileOptions::default();
        assert!(options.is_html);
        assert!(options.change("no-html"));
        assert!(!options.is_html);
        assert!(options.change("html"));
        assert!(options.is_html);
    }

    #[test]
    fn test_change_unknown_option() {
        let mut options = CompileOptions::default();
        assert!(!options.change("no-such-thing"));
        assert_eq!(options, CompileOptions::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let options: CompileOptions = serde_json::from_str(
            r#"{ "isHtml": false, "variables": { "STATIC_URL": "/static/" } }"#,
        )
        .unwrap();
        assert!(!options.is_html);
        assert!(options.compile_javascript);
        assert_eq!(
            options.variables.get("STATIC_URL").map(|v| v.as_str()),
            Some("/static/")
        );
    }

    #[test]
    fn test_packing_options() {
        let mut options: CompileOptions = serde_json::from_str(r#"{ "bundleUrl": "/assets/packed/" }"#).unwrap();
        assert_eq!(options.bundle_url, "/assets/packed/");
        assert_eq!(options.static_url, "/static/");
        assert!(!options.pack_external_javascript);
        assert!(options.change("pack-external-javascript"));
        assert!(options.change("pack-external-css"));
        assert!(options.pack_external_javascript && options.pack_external_css);
    }

    #[test]
    fn test_every_name_is_accepted() {
        for name in CompileOptions::option_names() {
            assert!(CompileOptions::default().change(name), "{name}");
        }
    }
}
