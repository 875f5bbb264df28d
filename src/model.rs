use crate::sources::{DescriptorSource, DesktopEntry};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Stable handle of an [`Entry`] inside a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which icon an entry currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRef {
    /// Symbolic name for the icon-lookup collaborator.
    Id(String),
    /// Absolute icon file bound by the reconciler.
    File { path: PathBuf, serial: u32 },
}

pub const NOT_UPDATING: i32 = -1;

#[derive(Debug, Clone)]
pub struct Entry {
    file_path: Option<PathBuf>,
    descriptor: Option<DesktopEntry>,
    custom_title: String,
    custom_icon: Option<PathBuf>,
    binding_serial: u32,
    is_temporary: bool,
    is_updating: bool,
    is_launching: bool,
    package_name: String,
    updating_progress: i32,
}

impl Entry {
    /// Entry backed by the descriptor at `path` (if it exists).
    pub fn from_descriptor(path: &Path, source: &dyn DescriptorSource) -> Self {
        let mut entry = Self::empty();
        entry.set_file_path(path, source);
        entry
    }

    /// Placeholder for a package being installed.
    pub fn placeholder(
        package_name: &str,
        label: &str,
        icon_path: &str,
        descriptor_path: Option<&Path>,
        source: &dyn DescriptorSource,
    ) -> Self {
        let mut entry = Self::empty();
        entry.package_name = package_name.to_string();
        entry.custom_title = label.to_string();
        if !icon_path.is_empty() {
            entry.custom_icon = Some(PathBuf::from(icon_path));
        }
        if let Some(path) = descriptor_path {
            entry.set_file_path(path, source);
        }
        entry
    }

    fn empty() -> Self {
        Self {
            file_path: None,
            descriptor: None,
            custom_title: String::new(),
            custom_icon: None,
            binding_serial: 0,
            is_temporary: false,
            is_updating: false,
            is_launching: false,
            package_name: String::new(),
            updating_progress: NOT_UPDATING,
        }
    }

    /// Rebinds the entry to a descriptor path. The path is kept even when
    /// the file does not exist yet; the descriptor is then `None`.
    pub fn set_file_path(&mut self, path: &Path, source: &dyn DescriptorSource) {
        if path.as_os_str().is_empty() {
            self.file_path = None;
            self.descriptor = None;
            return;
        }
        self.file_path = Some(path.to_path_buf());
        self.descriptor = source.parse(path);
    }

    pub fn descriptor(&self) -> Option<&DesktopEntry> {
        self.descriptor.as_ref()
    }

    /// Descriptor path, `None` for a package-only placeholder.
    pub fn path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn path_string(&self) -> String {
        self.path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn filename(&self) -> String {
        self.path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Desktop file ID: the path below `applications/` with `/` as `-`.
    pub fn file_id(&self) -> String {
        static FILE_ID: OnceLock<Regex> = OnceLock::new();
        let re = FILE_ID.get_or_init(|| {
            Regex::new(r".*applications/(.*\.desktop)$").expect("static regex")
        });

        let path = self.path_string();
        match re.captures(&path) {
            Some(captures) => captures[1].replace('/', "-"),
            None => self.filename(),
        }
    }

    /// Whether `key` names this entry, by full path or by file name.
    pub fn matches_path(&self, key: &str) -> bool {
        !key.is_empty() && (self.path_string() == key || self.filename() == key)
    }

    pub fn title(&self) -> String {
        if self.is_temporary {
            return self.custom_title.clone();
        }
        self.descriptor
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    pub fn title_unlocalized(&self) -> String {
        if self.is_temporary {
            return self.custom_title.clone();
        }
        self.descriptor
            .as_ref()
            .map(|d| d.name_unlocalized.clone())
            .unwrap_or_default()
    }

    pub fn exec(&self) -> &str {
        self.descriptor.as_ref().map(|d| d.exec.as_str()).unwrap_or("")
    }

    pub fn entry_type(&self) -> &str {
        self.descriptor.as_ref().map(|d| d.entry_type.as_str()).unwrap_or("")
    }

    pub fn categories(&self) -> &[String] {
        self.descriptor.as_ref().map(|d| d.categories.as_slice()).unwrap_or(&[])
    }

    pub fn read_value(&self, key: &str) -> Option<&str> {
        self.descriptor.as_ref().and_then(|d| d.value(key))
    }

    pub fn is_valid(&self) -> bool {
        match &self.descriptor {
            Some(d) => d.is_valid(),
            None => self.is_temporary,
        }
    }

    pub fn should_display(&self) -> bool {
        match &self.descriptor {
            Some(d) => d.should_display(),
            None => self.is_temporary,
        }
    }

    /// Reloads the descriptor from disk and re-checks validity.
    /// Temporary entries are always still valid.
    pub fn is_still_valid(&mut self, source: &dyn DescriptorSource) -> bool {
        if self.is_temporary {
            return true;
        }
        if let Some(path) = self.path().map(Path::to_path_buf) {
            self.set_file_path(&path, source);
        }
        self.is_valid()
    }

    /// The descriptor's own `Icon=` value.
    pub fn original_icon_id(&self) -> &str {
        self.descriptor.as_ref().map(|d| d.icon.as_str()).unwrap_or("")
    }

    pub fn icon(&self) -> IconRef {
        match &self.custom_icon {
            Some(path) => IconRef::File {
                path: path.clone(),
                serial: self.binding_serial,
            },
            None => IconRef::Id(self.original_icon_id().to_string()),
        }
    }

    /// Icon as a single string; bound files carry the serial so that
    /// consumers caching by string notice a rebinding.
    pub fn icon_id(&self) -> String {
        match self.icon() {
            IconRef::File { path, serial } => format!("{}#serial={}", path.display(), serial),
            IconRef::Id(id) => id,
        }
    }

    pub fn icon_filename(&self) -> Option<&Path> {
        self.custom_icon.as_deref()
    }

    /// Binds (or with `None`, unbinds) an icon file. Rebinding the same file
    /// still bumps the serial: its content changed.
    pub fn set_icon_filename(&mut self, path: Option<PathBuf>) {
        if path.is_none() && self.custom_icon.is_none() {
            return;
        }
        self.custom_icon = path;
        self.binding_serial += 1;
    }

    pub fn binding_serial(&self) -> u32 {
        self.binding_serial
    }

    pub fn set_custom_title(&mut self, title: &str) {
        self.custom_title = title.to_string();
    }

    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    pub(crate) fn set_is_temporary(&mut self, value: bool) {
        self.is_temporary = value;
    }

    pub fn is_updating(&self) -> bool {
        self.is_updating
    }

    pub fn set_is_updating(&mut self, value: bool) {
        self.is_updating = value;
    }

    pub fn updating_progress(&self) -> i32 {
        self.updating_progress
    }

    pub fn set_updating_progress(&mut self, value: i32) {
        self.updating_progress = value;
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn set_package_name(&mut self, name: &str) {
        self.package_name = name.to_string();
    }

    pub fn is_launching(&self) -> bool {
        self.is_launching
    }

    pub fn set_is_launching(&mut self, value: bool) {
        self.is_launching = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<PathBuf, &'static str>);

    impl DescriptorSource for Fixed {
        fn parse(&self, path: &Path) -> Option<DesktopEntry> {
            self.0
                .get(path)
                .map(|content| DesktopEntry::from_content(path, content, None))
        }
    }

    fn source() -> Fixed {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("/usr/share/applications/kde4/konsole.desktop"),
            "[Desktop Entry]\nType=Application\nName=Konsole\nExec=konsole\nIcon=utilities-terminal\n",
        );
        Fixed(files)
    }

    #[test]
    fn file_id_flattens_subdirectories() {
        let entry = Entry::from_descriptor(Path::new("/usr/share/applications/kde4/konsole.desktop"), &source());
        assert_eq!(entry.file_id(), "kde4-konsole.desktop");
        assert_eq!(entry.filename(), "konsole.desktop");
        assert!(entry.matches_path("konsole.desktop"));
        assert!(entry.matches_path("/usr/share/applications/kde4/konsole.desktop"));
        assert!(!entry.matches_path(""));
    }

    #[test]
    fn placeholder_without_descriptor_uses_custom_fields() {
        let mut entry = Entry::placeholder("com.foo.bar", "Bar", "/tmp/bar.png", Some(Path::new("/x/bar.desktop")), &source());
        assert_eq!(entry.path(), Some(Path::new("/x/bar.desktop")));
        assert!(entry.descriptor().is_none());
        assert!(!entry.is_valid());

        entry.set_is_temporary(true);
        assert!(entry.is_valid());
        assert!(entry.should_display());
        assert_eq!(entry.title(), "Bar");
        assert_eq!(entry.icon_id(), "/tmp/bar.png#serial=0");
    }

    #[test]
    fn icon_binding_bumps_serial_on_every_rebind() {
        let mut entry = Entry::from_descriptor(Path::new("/usr/share/applications/kde4/konsole.desktop"), &source());
        assert_eq!(entry.icon(), IconRef::Id("utilities-terminal".into()));

        entry.set_icon_filename(Some(PathBuf::from("/icons/utilities-terminal.png")));
        assert_eq!(entry.binding_serial(), 1);
        entry.set_icon_filename(Some(PathBuf::from("/icons/utilities-terminal.png")));
        assert_eq!(entry.binding_serial(), 2);
        assert_eq!(entry.icon_id(), "/icons/utilities-terminal.png#serial=2");
        entry.set_icon_filename(None);
        assert_eq!(entry.binding_serial(), 3);
        entry.set_icon_filename(None);
        assert_eq!(entry.binding_serial(), 3);
        assert_eq!(entry.icon_id(), "utilities-terminal");
    }
}
