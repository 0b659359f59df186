//! Settings from `compose-ide.toml`, overridden by command-line flags.

use anyhow::{Context, Result};
use compose_ide::RenderMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "compose-ide.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the persisted workspace.
    pub storage_dir: PathBuf,
    pub render_mode: RenderMode,
    /// Program run as the external renderer, e.g. `node render.js`.
    pub renderer_command: Option<String>,
    pub renderer_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".compose-ide"),
            render_mode: RenderMode::Builtin,
            renderer_command: None,
            renderer_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Read `path`, or `compose-ide.toml` in the working directory when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::read(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        log::debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn renderer_timeout(&self) -> Duration {
        Duration::from_millis(self.renderer_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str("render_mode = \"external\"\nrenderer_command = \"node render.js\"").unwrap();
        assert_eq!(config.render_mode, RenderMode::External);
        assert_eq!(config.renderer_command.as_deref(), Some("node render.js"));
        assert_eq!(config.storage_dir, PathBuf::from(".compose-ide"));
        assert_eq!(config.renderer_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("colour = \"red\"").is_err());
    }
}
