use std::path::Path;

pub mod desktop;

pub use desktop::{DesktopEntry, DesktopFileParser};

/// Turns a descriptor file into structured fields.
///
/// `None` means the file is absent or unreadable; a parsed entry may still be
/// invalid (see [`DesktopEntry::is_valid`]).
pub trait DescriptorSource {
    fn parse(&self, path: &Path) -> Option<DesktopEntry>;
}
