use crate::error::{Error, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// System-wide descriptor directory; always watched unless overridden.
pub const SYSTEM_APPLICATIONS_DIR: &str = "/usr/share/applications/";

/// Icon directory that is always watched in addition to the configured ones.
pub const SYSTEM_ICONS_DIR: &str = "/usr/share/icons/hicolor/86x86/apps/";

pub const DEFAULT_VENDOR_POSITIONS: &str = "/usr/share/appgrid/positions.toml";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub directories: DirectoryConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub terminal: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DirectoryConfig {
    #[serde(default = "default_applications")]
    pub applications: Vec<PathBuf>,
    #[serde(default = "default_icons")]
    pub icons: Vec<PathBuf>,
    #[serde(default = "default_vendor_positions")]
    pub vendor_positions: PathBuf,
    /// Where the position store and folder documents are kept.
    #[serde(default)]
    pub state: Option<PathBuf>,
}

fn default_applications() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(SYSTEM_APPLICATIONS_DIR)];
    if let Some(base_dirs) = BaseDirs::new() {
        dirs.push(base_dirs.data_dir().join("applications"));
    }
    dirs
}

fn default_icons() -> Vec<PathBuf> {
    vec![PathBuf::from(SYSTEM_ICONS_DIR)]
}

fn default_vendor_positions() -> PathBuf {
    PathBuf::from(DEFAULT_VENDOR_POSITIONS)
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            applications: default_applications(),
            icons: default_icons(),
            vendor_positions: default_vendor_positions(),
            state: None,
        }
    }
}

impl DirectoryConfig {
    /// Descriptor directories, each normalised with a trailing separator.
    pub fn application_dirs(&self) -> Vec<PathBuf> {
        suffix_directories(&self.applications)
    }

    /// Icon directories with the system icon directory appended when missing.
    pub fn icon_dirs(&self) -> Vec<PathBuf> {
        with_system_icons(&suffix_directories(&self.icons))
    }

    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state {
            return dir.clone();
        }
        match ProjectDirs::from("org", "appgrid", "appgrid") {
            Some(dirs) => dirs.config_dir().to_path_buf(),
            None => PathBuf::from("."),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_holdback_ms")]
    pub holdback_ms: u64,
    #[serde(default = "default_folder_save_ms")]
    pub folder_save_ms: u64,
    #[serde(default = "default_temporary_removal_ms")]
    pub temporary_removal_ms: u64,
    #[serde(default = "default_launching_timeout_ms")]
    pub launching_timeout_ms: u64,
}

fn default_holdback_ms() -> u64 { 2000 }
fn default_folder_save_ms() -> u64 { 1000 }
fn default_temporary_removal_ms() -> u64 { 3000 }
fn default_launching_timeout_ms() -> u64 { 5000 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            holdback_ms: default_holdback_ms(),
            folder_save_ms: default_folder_save_ms(),
            temporary_removal_ms: default_temporary_removal_ms(),
            launching_timeout_ms: default_launching_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn holdback(&self) -> Duration {
        Duration::from_millis(self.holdback_ms)
    }

    pub fn folder_save(&self) -> Duration {
        Duration::from_millis(self.folder_save_ms)
    }

    pub fn temporary_removal(&self) -> Duration {
        Duration::from_millis(self.temporary_removal_ms)
    }

    pub fn launching_timeout(&self) -> Duration {
        Duration::from_millis(self.launching_timeout_ms)
    }
}

/// Appends a trailing `/` to every directory that lacks one, so prefix
/// matching against file paths never matches a sibling directory.
pub fn suffix_directories(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .map(|dir| {
            let text = dir.to_string_lossy();
            if text.ends_with('/') {
                dir.clone()
            } else {
                PathBuf::from(format!("{}/", text))
            }
        })
        .collect()
}

pub fn with_system_icons(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = dirs.to_vec();
    let system = PathBuf::from(SYSTEM_ICONS_DIR);
    if !dirs.contains(&system) {
        dirs.push(system);
    }
    dirs
}

pub fn config_path() -> PathBuf {
    match ProjectDirs::from("org", "appgrid", "appgrid") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    toml::from_str(&content).map_err(|source| Error::TomlDecode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.timing.holdback_ms, 2000);
        assert_eq!(config.timing.folder_save_ms, 1000);
        assert!(config.general.categories.is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[general]\nscope = \"work\"\ncategories = [\"Game\"]\n\n[timing]\nholdback_ms = 50\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.general.scope.as_deref(), Some("work"));
        assert_eq!(config.general.categories, vec!["Game".to_string()]);
        assert_eq!(config.timing.holdback(), Duration::from_millis(50));
        assert_eq!(config.timing.temporary_removal_ms, 3000);
    }

    #[test]
    fn directories_are_suffixed_and_system_icons_appended() {
        let config = DirectoryConfig {
            applications: vec![PathBuf::from("/opt/apps")],
            icons: vec![PathBuf::from("/opt/icons/")],
            vendor_positions: default_vendor_positions(),
            state: None,
        };
        assert_eq!(config.application_dirs(), vec![PathBuf::from("/opt/apps/")]);
        assert_eq!(
            config.icon_dirs(),
            vec![PathBuf::from("/opt/icons/"), PathBuf::from(SYSTEM_ICONS_DIR)]
        );
    }

    #[test]
    fn broken_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[general\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(Error::TomlDecode { .. })));
    }
}
