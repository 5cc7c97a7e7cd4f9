use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::device::Capabilities;
use crate::processor::Version;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Config {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    /// Initial pre-definition table; an empty value defines a flag.
    #[serde(default)]
    pub definitions: BTreeMap<String, String>,
    pub hot_reload: Option<HotReloadConfig>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SourcesConfig {
    pub root: PathBuf,
    pub programs: Option<PathBuf>,
    #[serde(default)]
    pub modifiers: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CompilerConfig {
    #[serde(default = "default_version")]
    pub default_version: String,
    #[serde(default)]
    pub verbose_errors: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_version: default_version(),
            verbose_errors: false,
        }
    }
}

fn default_version() -> String {
    crate::processor::DEFAULT_VERSION.to_string()
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
pub struct CapabilitiesConfig {
    #[serde(default = "enabled")]
    pub compute: bool,
    #[serde(default = "enabled")]
    pub geometry: bool,
    #[serde(default = "enabled")]
    pub tessellation: bool,
    #[serde(default)]
    pub requires_fragment_stage: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            compute: true,
            geometry: true,
            tessellation: true,
            requires_fragment_stage: false,
        }
    }
}

impl From<CapabilitiesConfig> for Capabilities {
    fn from(config: CapabilitiesConfig) -> Self {
        Capabilities {
            compute: config.compute,
            geometry: config.geometry,
            tessellation: config.tessellation,
            requires_fragment_stage: config.requires_fragment_stage,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
pub struct HotReloadConfig {
    pub enabled: bool,
}

impl Config {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Reads and validates a config file. Relative paths in `[sources]` are
    /// resolved against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.sources.root);
        if let Some(programs) = self.sources.programs.as_mut() {
            resolve(programs);
        }
        self.sources.modifiers.iter_mut().for_each(resolve);
    }

    pub fn hot_reload_enabled(&self) -> bool {
        self.hot_reload.is_some_and(|hot_reload| hot_reload.enabled)
    }

    /// Whether to keep watching sources. `--watch` turns it on even when the
    /// config does not.
    pub fn watch_requested(&self, watch_flag: bool) -> bool {
        watch_flag || self.hot_reload_enabled()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sources.root.as_os_str().is_empty() {
            return Err("sources.root cannot be empty".to_string());
        }

        if Version::parse(&self.compiler.default_version).is_none() {
            return Err(format!(
                "compiler.default_version '{}' is not a valid #version",
                self.compiler.default_version
            ));
        }

        for name in self.definitions.keys() {
            let mut chars = name.chars();
            let valid = chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(format!("definitions: '{}' is not a valid name", name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml_basic() {
        let toml_str = r#"
[sources]
root = "shaders"
"#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.sources.root, PathBuf::from("shaders"));
        assert_eq!(config.sources.programs, None);
        assert!(config.sources.modifiers.is_empty());
        assert_eq!(config.compiler.default_version, "410 core");
        assert!(!config.compiler.verbose_errors);
        assert_eq!(Capabilities::from(config.capabilities), Capabilities::default());
        assert!(config.definitions.is_empty());
        assert_eq!(config.hot_reload, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml_full() {
        let toml_str = r#"
[sources]
root = "assets/shaders"
programs = "assets/programs"
modifiers = ["assets/modifiers"]

[compiler]
default_version = "450 core"
verbose_errors = true

[capabilities]
compute = false
requires_fragment_stage = true

[definitions]
USE_FOG = ""
MAX_LIGHTS = "8"

[hot_reload]
enabled = true
"#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.sources.modifiers, vec![PathBuf::from("assets/modifiers")]);
        assert_eq!(config.compiler.default_version, "450 core");
        let capabilities = Capabilities::from(config.capabilities);
        assert!(!capabilities.compute);
        assert!(capabilities.geometry);
        assert!(capabilities.requires_fragment_stage);
        assert_eq!(config.definitions["MAX_LIGHTS"], "8");
        assert!(config.hot_reload_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_watch_requested() {
        let mut config = Config::from_toml("[sources]\nroot = \"s\"").unwrap();
        assert!(!config.watch_requested(false));
        assert!(config.watch_requested(true));

        config.hot_reload = Some(HotReloadConfig { enabled: false });
        assert!(!config.watch_requested(false));

        let config = Config::from_toml("[sources]\nroot = \"s\"\n\n[hot_reload]\nenabled = true").unwrap();
        assert!(config.watch_requested(false));
    }

    #[test]
    fn test_config_missing_sources() {
        assert!(Config::from_toml("[compiler]\nverbose_errors = true").is_err());
    }

    #[test]
    fn test_config_validate_default_version() {
        let mut config = Config::from_toml("[sources]\nroot = \"s\"").unwrap();
        config.compiler.default_version = "newest".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_definition_names() {
        let mut config = Config::from_toml("[sources]\nroot = \"s\"").unwrap();
        config
            .definitions
            .insert("9LIVES".to_string(), "1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hot_reload_config_equality() {
        let config1 = HotReloadConfig { enabled: true };
        let config2 = HotReloadConfig { enabled: true };
        let config3 = HotReloadConfig { enabled: false };
        assert_eq!(config1, config2);
        assert_ne!(config1, config3);
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::from_toml(
            "[sources]\nroot = \"shaders\"\nprograms = \"/abs/programs\"\nmodifiers = [\"mods\"]",
        )
        .unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.sources.root, PathBuf::from("/project/shaders"));
        assert_eq!(config.sources.programs, Some(PathBuf::from("/abs/programs")));
        assert_eq!(config.sources.modifiers, vec![PathBuf::from("/project/mods")]);
    }
}
