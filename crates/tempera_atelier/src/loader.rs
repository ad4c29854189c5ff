//! Template and media loaders.

use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;
use rustc_hash::FxHashMap;
use tempera_relief::LoadError;

/// Source of named templates for `{% extends %}`, `{% include %}` and
/// `{% decorate %}`.
pub trait TemplateLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<String, LoadError>;
}

impl<F> TemplateLoader for F
where
    F: Fn(&str) -> Result<String, LoadError> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self(name)
    }
}

/// Source of external media files by url, for `{% compress %}` bundles.
pub trait MediaLoader: Send + Sync {
    fn load_media(&self, url: &str) -> Result<String, LoadError>;
}

impl<F> MediaLoader for F
where
    F: Fn(&str) -> Result<String, LoadError> + Send + Sync,
{
    fn load_media(&self, url: &str) -> Result<String, LoadError> {
        self(url)
    }
}

/// Templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: FxHashMap<CompactString, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<CompactString>, source: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    /// Builder form of [`MemoryLoader::insert`].
    pub fn with(mut self, name: impl Into<CompactString>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }
}

impl<N, S> FromIterator<(N, S)> for MemoryLoader
where
    N: Into<CompactString>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        let mut loader = Self::new();
        for (name, source) in iter {
            loader.insert(name, source);
        }
        loader
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self.templates.get(name).cloned().ok_or(LoadError::NotFound)
    }
}

/// A memory loader holds media files under their urls.
impl MediaLoader for MemoryLoader {
    fn load_media(&self, url: &str) -> Result<String, LoadError> {
        self.templates.get(url).cloned().ok_or(LoadError::NotFound)
    }
}

/// Templates read from files below a root directory.
///
/// Names are relative paths; names leaving the root are not found.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            .then(|| self.root.join(relative))
    }
}

impl TemplateLoader for DirectoryLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        let path = self.path_of(name).ok_or(LoadError::NotFound)?;
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound,
            _ => LoadError::Io(e),
        })
    }
}
