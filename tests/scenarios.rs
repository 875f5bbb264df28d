use appgrid::Launcher;
use appgrid::coalescer::FileBatch;
use appgrid::folders::{FolderItem, FolderTree};
use appgrid::monitor::Monitor;
use appgrid::positions::PositionStore;
use appgrid::sources::DesktopFileParser;
use appgrid::watcher::WatchList;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Setup {
    tmp: TempDir,
    apps: PathBuf,
    monitor: Monitor<WatchList>,
    launcher: Launcher,
}

fn setup() -> Setup {
    let tmp = tempfile::tempdir().unwrap();
    let apps = tmp.path().join("applications/");
    fs::create_dir_all(&apps).unwrap();
    fs::create_dir_all(tmp.path().join("state")).unwrap();

    let positions = PositionStore::open(
        &tmp.path().join("state/positions.toml"),
        &tmp.path().join("vendor.toml"),
        None,
    );
    let mut launcher = Launcher::new(Box::new(DesktopFileParser::default()), positions);
    launcher.set_directories(vec![apps.clone()]);

    Setup {
        tmp,
        apps,
        monitor: Monitor::new(WatchList::default()),
        launcher,
    }
}

fn write_app(dir: &Path, name: &str, title: &str, extra: &str) -> PathBuf {
    let path = dir.join(format!("{}.desktop", name));
    fs::write(
        &path,
        format!("[Desktop Entry]\nType=Application\nName={}\nExec={}\n{}", title, name, extra),
    )
    .unwrap();
    path
}

fn titles(launcher: &Launcher) -> Vec<String> {
    launcher.catalog().iter().map(|(_, e)| e.title()).collect()
}

impl Setup {
    fn scan(&mut self) {
        self.monitor.set_directories(vec![self.apps.clone()]);
        if let Some(batch) = self.monitor.flush() {
            self.launcher.apply(&batch);
        }
    }
}

#[test]
fn hidden_descriptor_is_skipped_on_initial_scan() {
    let mut s = setup();
    write_app(&s.apps, "app1", "App One", "");
    write_app(&s.apps, "app2", "App Two", "Hidden=true\n");
    s.scan();

    assert_eq!(titles(&s.launcher), vec!["App One"]);
}

#[test]
fn placeholder_becomes_the_installed_entry() {
    let mut s = setup();
    s.scan();
    let id = s
        .launcher
        .updating_started("com.foo.bar", "Bar", "", "", "svc")
        .unwrap();
    assert!(s.launcher.updating_progress("com.foo.bar", 50));

    let path = write_app(&s.apps, "com.foo.bar", "Foo Bar", "");
    s.monitor.on_directory_changed(&s.apps);
    let batch = s.monitor.flush().unwrap();
    assert_eq!(batch.added, vec![path.clone()]);
    s.launcher.apply(&batch);

    assert_eq!(s.launcher.catalog().ids(), &[id]);
    let entry = s.launcher.entry(id).unwrap();
    assert!(!entry.is_temporary());
    assert_eq!(entry.path(), Some(path.as_path()));
    assert_eq!(entry.package_name(), "com.foo.bar");
    assert_eq!(entry.updating_progress(), 50);
}

#[test]
fn stored_positions_come_first_then_titles() {
    let mut s = setup();
    let a = write_app(&s.apps, "a", "Alpha", "");
    let b = write_app(&s.apps, "b", "Bravo", "");
    write_app(&s.apps, "c", "Charlie", "");
    fs::write(
        s.launcher.positions().path(),
        format!("[order]\n\"{}\" = 2\n\"{}\" = 0\n", a.display(), b.display()),
    )
    .unwrap();
    s.launcher.reload_positions();
    s.scan();

    assert_eq!(titles(&s.launcher), vec!["Bravo", "Alpha", "Charlie"]);
    assert_eq!(s.launcher.reorder_items(), 0);
}

#[test]
fn finished_placeholders_are_cleaned_up_together() {
    let mut s = setup();
    s.launcher.updating_started("one", "One", "", "", "svc");
    s.launcher.updating_started("two", "Two", "", "", "svc");
    assert!(s.launcher.updating_finished("one"));
    assert!(s.launcher.updating_finished("two"));

    assert_eq!(s.launcher.remove_temporary_launchers(), 2);
    assert!(s.launcher.catalog().is_empty());
}

#[test]
fn descriptor_rewritten_in_place_is_a_single_modification() {
    let mut s = setup();
    let path = write_app(&s.apps, "app", "App", "");
    s.scan();

    write_app(&s.apps, "app", "Renamed", "");
    s.monitor.on_file_changed(&path);
    s.monitor.on_file_changed(&path);
    let batch = s.monitor.flush().unwrap();
    assert_eq!(
        batch,
        FileBatch {
            modified: vec![path],
            ..FileBatch::default()
        }
    );
    s.launcher.apply(&batch);
    assert_eq!(titles(&s.launcher), vec!["Renamed"]);
}

#[test]
fn folder_tree_survives_restart() {
    let mut s = setup();
    write_app(&s.apps, "a", "Alpha", "");
    write_app(&s.apps, "b", "Bravo", "");
    write_app(&s.apps, "c", "Charlie", "");
    s.scan();

    let state = s.tmp.path().join("state");
    let mut tree = FolderTree::new(&state, None);
    tree.load(s.launcher.catalog());
    let folder = tree.create_folder(tree.root(), 0, "Work").unwrap();
    tree.move_to_folder(FolderItem::Entry(s.launcher.catalog().ids()[2]), folder, -1);
    tree.save(s.launcher.catalog()).unwrap();

    let mut reloaded = FolderTree::new(&state, None);
    reloaded.load(s.launcher.catalog());
    assert_eq!(reloaded.dump(s.launcher.catalog()), tree.dump(s.launcher.catalog()));
    assert!(!reloaded.take_save_needed());
}
