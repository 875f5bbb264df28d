use crate::sources::DescriptorSource;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DESKTOP_ENTRY_GROUP: &str = "Desktop Entry";

/// Parsed `[Desktop Entry]` group of a descriptor file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesktopEntry {
    pub path: PathBuf,
    pub name: String,
    pub name_unlocalized: String,
    pub exec: String,
    pub icon: String,
    pub categories: Vec<String>,
    pub entry_type: String,
    pub terminal: bool,
    pub no_display: bool,
    pub hidden: bool,
    values: HashMap<String, String>,
}

impl DesktopEntry {
    pub fn is_valid(&self) -> bool {
        if self.entry_type.is_empty() || self.name_unlocalized.is_empty() {
            return false;
        }
        self.entry_type != "Application" || !self.exec.is_empty()
    }

    pub fn should_display(&self) -> bool {
        !self.no_display && !self.hidden
    }

    /// Raw value of `key` in the `[Desktop Entry]` group.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn from_content(path: &Path, content: &str, locale: Option<&str>) -> Self {
        let values = parse_group(content, DESKTOP_ENTRY_GROUP);
        let flag = |key: &str| values.get(key).is_some_and(|v| v.trim() == "true");
        let get = |key: &str| values.get(key).cloned().unwrap_or_default();

        let name_unlocalized = get("Name");
        let name = locale
            .and_then(|locale| localized(&values, "Name", locale))
            .unwrap_or_else(|| name_unlocalized.clone());

        let categories = get("Categories")
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            path: path.to_path_buf(),
            name,
            name_unlocalized,
            exec: get("Exec"),
            icon: get("Icon"),
            categories,
            entry_type: get("Type"),
            terminal: flag("Terminal"),
            no_display: flag("NoDisplay"),
            hidden: flag("Hidden"),
            values,
        }
    }
}

fn localized(values: &HashMap<String, String>, key: &str, locale: &str) -> Option<String> {
    // "fi_FI.UTF-8@euro" -> try "fi_FI", then "fi"
    let locale = locale.split(['.', '@']).next().unwrap_or(locale);
    let mut candidates = vec![locale];
    if let Some((lang, _)) = locale.split_once('_') {
        candidates.push(lang);
    }

    candidates
        .into_iter()
        .find_map(|candidate| values.get(&format!("{}[{}]", key, candidate)).cloned())
}

/// Collects `key=value` pairs of one `[group]` from a key file.
pub fn parse_group(content: &str, group: &str) -> HashMap<String, String> {
    let header = format!("[{}]", group);
    let mut values = HashMap::new();
    let mut in_group = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }

        if line.starts_with('[') {
            in_group = line == header;
            continue;
        }

        if !in_group { continue; }

        if let Some((key, value)) = line.split_once('=') {
            values
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }

    values
}

/// Default descriptor source reading freedesktop key files from disk.
#[derive(Debug, Clone, Default)]
pub struct DesktopFileParser {
    locale: Option<String>,
}

impl DesktopFileParser {
    /// Picks the display locale from `LC_ALL`, `LC_MESSAGES` or `LANG`.
    pub fn from_env() -> Self {
        let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty() && value != "C" && value != "POSIX");
        Self { locale }
    }

    pub fn with_locale(locale: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
        }
    }
}

impl DescriptorSource for DesktopFileParser {
    fn parse(&self, path: &Path) -> Option<DesktopEntry> {
        match fs::read_to_string(path) {
            Ok(content) => Some(DesktopEntry::from_content(path, &content, self.locale.as_deref())),
            Err(e) => {
                debug!("Cannot read descriptor {:?}: {}", path, e);
                None
            }
        }
    }
}
