//! Compile context.

use std::sync::Arc;

use compact_str::CompactString;
use tempera_carton::MediaCache;
use tempera_relief::{CompileError, CompileOptions, CompileResult, CompileWarning, LoadError, SourceLocation};
use tracing::{debug, warn};

use crate::loader::{MediaLoader, TemplateLoader};
use crate::pack::Bundle;

/// State shared by one compilation: options, the loader, the media cache
/// and everything collected along the way.
pub struct CompileContext {
    pub options: CompileOptions,
    loader: Option<Box<dyn TemplateLoader>>,
    media: Option<Box<dyn MediaLoader>>,
    cache: Arc<MediaCache>,
    bundles: Vec<Bundle>,
    warnings: Vec<CompileWarning>,
    dependencies: Vec<CompactString>,
    /// Templates currently being parsed, outermost first
    loading: Vec<CompactString>,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl std::fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileContext")
            .field("options", &self.options)
            .field("loader", &self.loader.is_some())
            .field("media", &self.media.is_some())
            .field("bundles", &self.bundles)
            .field("warnings", &self.warnings)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl CompileContext {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            loader: None,
            media: None,
            cache: Arc::new(MediaCache::new()),
            bundles: Vec::new(),
            warnings: Vec::new(),
            dependencies: Vec::new(),
            loading: Vec::new(),
        }
    }

    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn with_media_loader(mut self, media: impl MediaLoader + 'static) -> Self {
        self.media = Some(Box::new(media));
        self
    }

    /// Share a media cache between contexts.
    pub fn with_cache(mut self, cache: Arc<MediaCache>) -> Self {
        self.cache = cache;
        self
    }

    #[inline]
    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<CompileWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Names of every template loaded so far, in first-load order.
    pub fn dependencies(&self) -> &[CompactString] {
        &self.dependencies
    }

    /// Bundles written for `{% compress %}` tags, in document order.
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub(crate) fn add_bundle(&mut self, bundle: Bundle) {
        debug!(url = %bundle.url, files = bundle.files.len(), "bundle");
        self.bundles.push(bundle);
    }

    pub fn warn(&mut self, loc: &SourceLocation, message: impl Into<CompactString>) {
        let warning = CompileWarning {
            loc: loc.clone(),
            message: message.into(),
        };
        warn!(%warning, "compile warning");
        self.warnings.push(warning);
    }

    /// Fetch the source of template `name`, referenced at `loc`.
    pub fn load(&mut self, name: &str, loc: &SourceLocation) -> CompileResult<String> {
        if !self.dependencies.iter().any(|d| d == name) {
            self.dependencies.push(name.into());
        }
        let result = match &self.loader {
            Some(loader) => loader.load(name),
            None => Err(LoadError::Unsupported),
        };
        debug!(name, ok = result.is_ok(), "load");
        result.map_err(|source| CompileError::Load {
            name: name.into(),
            loc: loc.clone(),
            source,
        })
    }

    /// Fetch the media file at `url`, referenced at `loc`.
    pub fn load_media(&self, url: &str, loc: &SourceLocation) -> CompileResult<String> {
        let result = match &self.media {
            Some(media) => media.load_media(url),
            None => Err(LoadError::Unsupported),
        };
        debug!(url, ok = result.is_ok(), "load_media");
        result.map_err(|source| CompileError::Load {
            name: url.into(),
            loc: loc.clone(),
            source,
        })
    }

    pub(crate) fn enter(&mut self, name: &str, loc: &SourceLocation) -> CompileResult<()> {
        if self.loading.iter().any(|n| n == name) {
            return Err(CompileError::template(
                loc,
                format!("Template '{name}' includes itself"),
            ));
        }
        self.loading.push(name.into());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.loading.pop();
    }
}
