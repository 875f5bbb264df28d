//! Persisted display positions, partitioned by scope.
//!
//! The user file is rewritten in full whenever the catalog order changes.
//! A vendor file with the same layout supplies defaults for entries the user
//! never placed.

use crate::error::{Error, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct PositionFile {
    /// Positions outside any scope.
    #[serde(default)]
    pub order: BTreeMap<String, i64>,
    #[serde(default)]
    pub scopes: BTreeMap<String, BTreeMap<String, i64>>,
}

impl PositionFile {
    pub fn scope(&self, scope: Option<&str>) -> Option<&BTreeMap<String, i64>> {
        match scope {
            Some(name) => self.scopes.get(name),
            None => Some(&self.order),
        }
    }

    pub fn scope_mut(&mut self, scope: Option<&str>) -> &mut BTreeMap<String, i64> {
        match scope {
            Some(name) => self.scopes.entry(name.to_string()).or_default(),
            None => &mut self.order,
        }
    }
}

pub fn read_position_file(path: &Path) -> Result<Option<(PositionFile, String)>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    let file = toml::from_str(&content).map_err(|source| Error::TomlDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some((file, content)))
}

/// Replaces `path` with `content` via a temporary file in the same directory.
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    file.write_all(content).map_err(|e| Error::io(file.path(), e))?;
    file.persist(path).map_err(|source| Error::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[derive(Debug)]
pub struct PositionStore {
    path: PathBuf,
    user: PositionFile,
    vendor: PositionFile,
    scope: Option<String>,
    last_content: Option<String>,
}

impl PositionStore {
    pub fn file_name() -> &'static str {
        "positions.toml"
    }

    /// Loads both files; unreadable files are logged and treated as empty.
    pub fn open(path: &Path, vendor_path: &Path, scope: Option<String>) -> Self {
        let vendor = match read_position_file(vendor_path) {
            Ok(file) => file.map(|(file, _)| file).unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring vendor positions: {}", e);
                PositionFile::default()
            }
        };

        let mut store = Self {
            path: path.to_path_buf(),
            user: PositionFile::default(),
            vendor,
            scope,
            last_content: None,
        };
        if let Err(e) = store.reload() {
            warn!("Ignoring stored positions: {}", e);
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn set_scope(&mut self, scope: Option<String>) {
        self.scope = scope;
    }

    fn lookup(file: &PositionFile, scope: Option<&str>, key: &str) -> Option<i64> {
        if key.is_empty() {
            return None;
        }
        file.scope(scope).and_then(|map| map.get(key)).copied()
    }

    /// User position for `path` (or its `filename`), else the vendor default.
    pub fn position(&self, path: &str, filename: &str) -> Option<i64> {
        let scope = self.scope();
        [&self.user, &self.vendor].into_iter().find_map(|file| {
            Self::lookup(file, scope, path).or_else(|| Self::lookup(file, scope, filename))
        })
    }

    /// Clears the active scope and writes `keys` with their index as position.
    pub fn rewrite<I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        let scope = self.scope.clone();
        let map = self.user.scope_mut(scope.as_deref());
        map.clear();
        for (pos, key) in keys.into_iter().enumerate() {
            if !key.is_empty() {
                map.insert(key, pos as i64);
            }
        }

        let content = toml::to_string_pretty(&self.user)?;
        write_atomically(&self.path, content.as_bytes())?;
        self.last_content = Some(content);
        debug!("Saved positions to {:?}", self.path);
        Ok(())
    }

    /// Re-reads the user file. Returns whether its content differs from what
    /// this store last read or wrote, i.e. whether someone else edited it.
    pub fn reload(&mut self) -> Result<bool> {
        match read_position_file(&self.path)? {
            Some((file, content)) => {
                if self.last_content.as_deref() == Some(content.as_str()) {
                    return Ok(false);
                }
                self.user = file;
                self.last_content = Some(content);
                Ok(true)
            }
            None => {
                let changed = self.user != PositionFile::default();
                self.user = PositionFile::default();
                self.last_content = None;
                Ok(changed)
            }
        }
    }
}
