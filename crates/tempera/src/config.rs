//! Configuration file loading for tempera.
//!
//! Reads `tempera.config.json` from a project directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempera_atelier::{CompileContext, DirectoryLoader};
use tempera_relief::CompileOptions;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "tempera.config.json";

/// Top-level tempera configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperaConfig {
    /// JSON Schema reference (for editor autocompletion).
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Directory templates are loaded from, relative to the project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    #[serde(default)]
    pub options: CompileOptions,
}

impl TemperaConfig {
    /// A compile context for a project rooted at `dir`.
    ///
    /// Templates load from `templateDir` when set, from `dir` otherwise.
    pub fn context(&self, dir: &Path) -> CompileContext {
        let root = match &self.template_dir {
            Some(templates) => dir.join(templates),
            None => dir.to_path_buf(),
        };
        CompileContext::new(self.options.clone()).with_loader(DirectoryLoader::new(root))
    }
}

/// Load `tempera.config.json` from the given directory (or CWD if None).
///
/// A missing file gives the defaults; an unreadable or invalid one is
/// reported and gives the defaults too.
pub fn load_config(dir: Option<&Path>) -> TemperaConfig {
    let base = dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config_path = base.join(CONFIG_FILE);

    if !config_path.exists() {
        debug!(path = %config_path.display(), "no config file");
        return TemperaConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "failed to parse config, using defaults");
                TemperaConfig::default()
            }
        },
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "failed to read config, using defaults");
            TemperaConfig::default()
        }
    }
}
