//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/nexus/config.toml` (user config)
//! 2. `./nexus.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, NexusConfig, Result};

/// Project-local config filename.
const PROJECT_CONFIG_FILE: &str = "nexus.toml";

/// Config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "nexus";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "NEXUS_CONFIG_DIR";

/// A config file that was checked during discovery.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: NexusConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Highest-precedence loaded file, for save operations.
    pub source: Option<ConfigSource>,
    /// Warnings generated during loading (unreadable layers, plaintext tokens).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// Where edits should be written: the loaded source, else the user config.
    pub fn save_path(&self) -> Option<PathBuf> {
        self.source
            .as_ref()
            .map(|s| s.path.clone())
            .or_else(|| {
                self.sources
                    .first()
                    .filter(|s| s.path.ends_with(USER_CONFIG_FILE))
                    .map(|s| s.path.clone())
            })
            .or_else(xdg_config_path)
    }
}

/// Load configuration by discovering and merging all layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with an explicit user config directory.
///
/// `config_dir` overrides both `NEXUS_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = NexusConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings)?);
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings)?);

    check_plaintext_tokens(&config, &mut warnings);

    let source = sources.iter().rev().find(|s| s.loaded).cloned();

    Ok(LoadedConfig {
        config,
        sources,
        source,
        warnings,
    })
}

/// Load config from a specific file (no discovery).
pub fn load_config_file(path: &Path) -> Result<NexusConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    NexusConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &NexusConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// User config file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory.
///
/// Checks `NEXUS_CONFIG_DIR` first, then falls back to the platform default
/// (`~/.config/nexus` on Linux, `~/Library/Application Support/nexus` on macOS).
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn load_layer(
    config: &mut NexusConfig,
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            })
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            })
        }
    }
}

fn check_plaintext_tokens(config: &NexusConfig, warnings: &mut Vec<String>) {
    for target in &config.targets {
        if target.has_plaintext_token() {
            warnings.push(format!(
                "Target '{}' stores a plaintext auth_token. \
                 Consider passing it with --token or NEXUS_TOKEN instead.",
                target.name
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::TargetTransport;

    #[test]
    fn test_xdg_config_path_shape() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with(USER_CONFIG_FILE));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[[targets]]
name = "local"
url = "http://localhost:8000/mcp"
transport = "http"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(
            config.target("local").unwrap().transport,
            TargetTransport::Http
        );
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.config.targets.is_empty());
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(
            loaded.save_path().unwrap(),
            user.path().join(USER_CONFIG_FILE)
        );
    }

    #[test]
    fn test_project_overrides_user() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            user.path().join(USER_CONFIG_FILE),
            r#"
[defaults]
connect_timeout_secs = 20

[[targets]]
name = "shared"
url = "http://user"

[[targets]]
name = "user-only"
url = "http://u"
"#,
        )
        .unwrap();
        fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            r#"
[[targets]]
name = "shared"
url = "http://project"
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.loaded_from().len(), 2);
        assert_eq!(loaded.config.target("shared").unwrap().url, "http://project");
        assert!(loaded.config.target("user-only").is_some());
        assert_eq!(loaded.config.defaults().connect_timeout_secs, Some(20));
        assert_eq!(
            loaded.save_path().unwrap(),
            project.path().join(PROJECT_CONFIG_FILE)
        );
    }

    #[test]
    fn test_broken_layer_is_a_warning() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(user.path().join(USER_CONFIG_FILE), "[[targets]\n").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("Failed to load"));
    }

    #[test]
    fn test_plaintext_token_warning() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            r#"
[[targets]]
name = "secured"
url = "http://localhost:8000/sse"
auth_token = "abc123"

[[targets]]
name = "open"
url = "http://localhost:9000/sse"
"#,
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("'secured'"));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = NexusConfig::new();
        config
            .add_target(crate::TargetEntry::new("a", "http://a/sse"))
            .unwrap();
        save_config(&config, &path).unwrap();

        assert_eq!(load_config_file(&path).unwrap(), config);
    }
}
