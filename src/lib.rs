//! Application-grid backend: watches descriptor and icon directories,
//! reconciles them into an ordered launcher catalog and keeps the user's
//! folder organisation on disk.

pub mod catalog;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod executor;
pub mod folders;
pub mod launcher;
pub mod list_model;
pub mod matcher;
pub mod model;
pub mod monitor;
pub mod ordering;
pub mod positions;
pub mod service;
pub mod sources;
pub mod watched;
pub mod watcher;

pub use catalog::Catalog;
pub use config::{Config, load_config, load_config_from};
pub use error::{Error, Result};
pub use folders::{FolderId, FolderItem, FolderTree};
pub use launcher::Launcher;
pub use list_model::{ListEvent, ListModel};
pub use model::{Entry, EntryId, IconRef};
pub use service::{LaunchOutcome, Service};
