//! Event-loop wiring: filesystem notifications, debounce timers and the
//! user-facing operations over catalog, folders and watched launchers.

use crate::config::{Config, suffix_directories, with_system_icons};
use crate::error::{Error, Result};
use crate::executor;
use crate::folders::{FolderId, FolderItem, FolderTree};
use crate::launcher::Launcher;
use crate::list_model::ListEvent;
use crate::model::EntryId;
use crate::monitor::Monitor;
use crate::positions::PositionStore;
use crate::sources::DescriptorSource;
use crate::watched::WatchedLaunchers;
use crate::watcher::{PathWatcher, classify};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use log::{debug, info, warn};
use notify::EventKind;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A restartable one-shot timer: arming again replaces the pending one, so
/// it fires once, a full window after the latest trigger.
#[derive(Debug)]
pub struct Debounce {
    delay: Duration,
    token: Option<RegistrationToken>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, token: None }
    }

    pub fn is_armed(&self) -> bool {
        self.token.is_some()
    }

    pub fn arm<D, F>(&mut self, handle: &LoopHandle<'static, D>, mut fire: F) -> Result<()>
    where
        F: FnMut(&mut D) + 'static,
    {
        self.cancel(handle);
        let token = handle
            .insert_source(Timer::from_duration(self.delay), move |_, _, data| {
                fire(data);
                TimeoutAction::Drop
            })
            .map_err(|e| Error::EventLoop(e.error))?;
        self.token = Some(token);
        Ok(())
    }

    pub fn cancel<D>(&mut self, handle: &LoopHandle<'static, D>) {
        if let Some(token) = self.token.take() {
            handle.remove(token);
        }
    }

    /// Called from the timer callback; the registration is already gone.
    pub fn fired(&mut self) {
        self.token = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Spawned(u32),
    /// The entry is being updated; the package owner decides what to do.
    LaunchRequested { package_name: String },
    NotFound,
}

pub struct Service<W: PathWatcher + 'static> {
    handle: LoopHandle<'static, Service<W>>,
    config: Config,
    monitor: Monitor<W>,
    launcher: Launcher,
    folders: FolderTree,
    watched: WatchedLaunchers,
    holdback: Debounce,
    folder_save: Debounce,
    removal: Debounce,
    launching: HashMap<EntryId, RegistrationToken>,
    folder_events: Vec<(FolderId, ListEvent<FolderItem>)>,
}

impl<W: PathWatcher + 'static> Service<W> {
    pub fn new(
        handle: LoopHandle<'static, Service<W>>,
        config: Config,
        watcher: W,
        source: Box<dyn DescriptorSource>,
    ) -> Self {
        let state_dir = config.directories.state_dir();
        let scope = config.general.scope.clone();
        let positions = PositionStore::open(
            &state_dir.join(PositionStore::file_name()),
            &config.directories.vendor_positions,
            scope.clone(),
        );

        let mut launcher =
            Launcher::new(source, positions).with_categories(config.general.categories.clone());
        launcher.set_directories(config.directories.application_dirs());
        launcher.set_icon_directories(config.directories.icon_dirs());

        let timing = &config.timing;
        Self {
            holdback: Debounce::new(timing.holdback()),
            folder_save: Debounce::new(timing.folder_save()),
            removal: Debounce::new(timing.temporary_removal()),
            folders: FolderTree::new(&state_dir, scope),
            monitor: Monitor::new(watcher),
            watched: WatchedLaunchers::new(),
            launching: HashMap::new(),
            folder_events: Vec::new(),
            launcher,
            config,
            handle,
        }
    }

    /// Scans all configured directories and loads the folder document.
    pub fn start(&mut self) {
        let state_dir = self.config.directories.state_dir();
        match fs::create_dir_all(&state_dir) {
            Ok(()) => self.monitor.watcher_mut().watch(&state_dir),
            Err(e) => warn!("Cannot create state directory {:?}: {}", state_dir, e),
        }

        self.monitor.set_directories(self.launcher.directories().to_vec());
        self.monitor.set_icon_directories(self.launcher.icon_directories().to_vec());
        if let Some(batch) = self.monitor.flush() {
            self.launcher.apply(&batch);
        }
        self.launcher.take_events();
        self.launcher.take_temporary_changed();

        self.folders.load(self.launcher.catalog());
        self.folders.take_events();
        info!(
            "Initial scan found {} launchers in {} directories",
            self.launcher.catalog().len(),
            self.launcher.directories().len()
        );
        self.schedule_folder_save();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn folders(&self) -> &FolderTree {
        &self.folders
    }

    pub fn monitor(&self) -> &Monitor<W> {
        &self.monitor
    }

    pub fn watched(&self) -> &WatchedLaunchers {
        &self.watched
    }

    /// Folder changes since the last call, oldest first.
    pub fn take_folder_events(&mut self) -> Vec<(FolderId, ListEvent<FolderItem>)> {
        std::mem::take(&mut self.folder_events)
    }

    pub fn dump(&self) -> String {
        self.folders.dump(self.launcher.catalog())
    }

    pub fn on_fs_event(&mut self, event: notify::Event) {
        let positions = self.launcher.positions().path().to_path_buf();
        let mut pending = false;

        for path in &event.paths {
            if *path == positions {
                self.launcher.reload_positions();
                self.catalog_changed();
                continue;
            }

            if self.watched.contains(path) {
                let source = self.launcher.source();
                match event.kind {
                    EventKind::Remove(_) => {
                        self.watched.file_removed(path);
                        self.monitor.watcher_mut().unwatch(path);
                    }
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        self.watched.file_changed(path, source);
                    }
                    _ => {}
                }
            }

            if let Some(kind) = classify(&event.kind) {
                pending |= self.monitor.on_path_event(path, kind);
            }
        }

        if pending {
            self.schedule_holdback();
        }
    }

    fn schedule_holdback(&mut self) {
        let handle = self.handle.clone();
        if let Err(e) = self.holdback.arm(&handle, |service: &mut Service<W>| service.on_holdback()) {
            warn!("Cannot arm holdback timer: {}", e);
        }
    }

    fn on_holdback(&mut self) {
        self.holdback.fired();
        if let Some(batch) = self.monitor.flush() {
            self.launcher.apply(&batch);
            self.catalog_changed();
        }
    }

    /// Propagates catalog mutations once a whole operation has completed.
    fn catalog_changed(&mut self) {
        let events = self.launcher.take_events();
        self.folders.sync(&events, self.launcher.catalog());
        if self.launcher.take_temporary_changed() {
            self.folders.request_save();
        }

        let gone: Vec<EntryId> = self
            .launching
            .keys()
            .copied()
            .filter(|id| !self.launcher.catalog().contains(*id))
            .collect();
        for id in gone {
            if let Some(token) = self.launching.remove(&id) {
                self.handle.remove(token);
            }
        }

        self.collect_folder_events();
        if self.folders.take_save_needed() {
            self.schedule_folder_save();
        }
    }

    fn collect_folder_events(&mut self) {
        let events = self.folders.take_events();
        if !events.is_empty() {
            debug!("{} folder changes", events.len());
            self.folder_events.extend(events);
        }
    }

    fn schedule_folder_save(&mut self) {
        let handle = self.handle.clone();
        if let Err(e) = self.folder_save.arm(&handle, |service: &mut Service<W>| service.on_folder_save()) {
            warn!("Cannot arm folder save timer: {}", e);
        }
    }

    fn on_folder_save(&mut self) {
        self.folder_save.fired();
        if let Err(e) = self.folders.save(self.launcher.catalog()) {
            warn!("Failed to save folders: {}", e);
        }
    }

    fn on_removal(&mut self) {
        self.removal.fired();
        let removed = self.launcher.remove_temporary_launchers();
        debug!("Removed {} temporary launchers", removed);
        self.catalog_changed();
    }

    pub fn updating_started(
        &mut self,
        package_name: &str,
        label: &str,
        icon_path: &str,
        descriptor_path: &str,
        service_name: &str,
    ) -> Option<EntryId> {
        let id = self
            .launcher
            .updating_started(package_name, label, icon_path, descriptor_path, service_name);
        self.catalog_changed();
        id
    }

    pub fn updating_progress(&mut self, package_name: &str, progress: i32) {
        self.launcher.updating_progress(package_name, progress);
    }

    pub fn updating_finished(&mut self, package_name: &str) {
        if self.launcher.updating_finished(package_name) {
            let handle = self.handle.clone();
            if let Err(e) = self.removal.arm(&handle, |service: &mut Service<W>| service.on_removal()) {
                warn!("Cannot arm removal timer: {}", e);
            }
        }
    }

    pub fn launch(&mut self, path: &str) -> Result<LaunchOutcome> {
        let Some(id) = self.launcher.catalog().find_by_path(path) else {
            warn!("No launcher item found for {:?}", path);
            return Ok(LaunchOutcome::NotFound);
        };
        let Some(entry) = self.launcher.entry(id) else {
            return Ok(LaunchOutcome::NotFound);
        };

        if entry.is_updating() {
            let package_name = entry.package_name().to_string();
            info!("LaunchRequested {}", package_name);
            return Ok(LaunchOutcome::LaunchRequested { package_name });
        }

        let pid = executor::spawn(entry, self.config.general.terminal.as_deref())?;
        self.mark_launching(id)?;
        Ok(LaunchOutcome::Spawned(pid))
    }

    pub fn notify_launching(&mut self, path: &str) -> Result<()> {
        match self.launcher.notify_launching(path) {
            Some(id) => self.mark_launching(id),
            None => Ok(()),
        }
    }

    fn mark_launching(&mut self, id: EntryId) -> Result<()> {
        self.launcher.set_launching(id, true);
        if let Some(token) = self.launching.remove(&id) {
            self.handle.remove(token);
        }

        let token = self
            .handle
            .insert_source(
                Timer::from_duration(self.config.timing.launching_timeout()),
                move |_, _, service: &mut Service<W>| {
                    service.launching.remove(&id);
                    service.launcher.set_launching(id, false);
                    TimeoutAction::Drop
                },
            )
            .map_err(|e| Error::EventLoop(e.error))?;
        self.launching.insert(id, token);
        Ok(())
    }

    /// Clears the launching flag before the failsafe timeout.
    pub fn clear_launching(&mut self, id: EntryId) {
        if let Some(token) = self.launching.remove(&id) {
            self.handle.remove(token);
        }
        self.launcher.set_launching(id, false);
    }

    pub fn set_scope(&mut self, scope: Option<String>) {
        self.config.general.scope = scope.clone();
        self.launcher.set_scope(scope.clone());
        self.folders.set_scope(scope, self.launcher.catalog());
        self.collect_folder_events();
        if self.folders.take_save_needed() {
            self.schedule_folder_save();
        }
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.config.general.categories = categories.clone();
        self.launcher
            .set_categories(categories, self.monitor.descriptor_files());
        self.catalog_changed();
    }

    pub fn set_directories(&mut self, dirs: &[PathBuf]) {
        let dirs = suffix_directories(dirs);
        self.launcher.set_directories(dirs.clone());
        self.monitor.set_directories(dirs);
        self.schedule_holdback();
    }

    pub fn set_icon_directories(&mut self, dirs: &[PathBuf]) {
        let dirs = with_system_icons(&suffix_directories(dirs));
        self.launcher.set_icon_directories(dirs.clone());
        self.monitor.set_icon_directories(dirs);
        self.schedule_holdback();
    }

    /// Replaces the explicitly watched launcher files.
    pub fn set_watched_paths(&mut self, paths: &[PathBuf]) -> bool {
        let before = self.watched.file_paths();
        let changed = self.watched.set_file_paths(paths, self.launcher.source());
        if changed {
            let after = self.watched.file_paths();
            for path in before.iter().filter(|p| !after.contains(p)) {
                self.monitor.watcher_mut().unwatch(path);
            }
            for path in after.iter().filter(|p| !before.contains(p)) {
                self.monitor.watcher_mut().watch(path);
            }
        }
        changed
    }

    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        self.launcher.move_entry(from, to)
    }

    pub fn is_watched_launcher(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, TimingConfig};
    use crate::sources::DesktopFileParser;
    use crate::watcher::WatchList;
    use calloop::EventLoop;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::time::Instant;
    use tempfile::TempDir;

    struct Harness {
        tmp: TempDir,
        apps: PathBuf,
        event_loop: EventLoop<'static, Service<WatchList>>,
        service: Service<WatchList>,
    }

    fn harness() -> Harness {
        harness_with(TimingConfig {
            holdback_ms: 20,
            folder_save_ms: 10,
            temporary_removal_ms: 30,
            launching_timeout_ms: 30,
        })
    }

    fn harness_with(timing: TimingConfig) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let apps = tmp.path().join("applications");
        fs::create_dir_all(&apps).unwrap();

        let config = Config {
            directories: DirectoryConfig {
                applications: vec![apps.clone()],
                icons: vec![tmp.path().join("icons")],
                vendor_positions: tmp.path().join("vendor.toml"),
                state: Some(tmp.path().join("state")),
            },
            timing,
            ..Config::default()
        };

        let event_loop: EventLoop<'static, Service<WatchList>> = EventLoop::try_new().unwrap();
        let service = Service::new(
            event_loop.handle(),
            config,
            WatchList::default(),
            Box::new(DesktopFileParser::default()),
        );
        Harness {
            tmp,
            apps,
            event_loop,
            service,
        }
    }

    impl Harness {
        fn run_until(&mut self, mut done: impl FnMut(&Service<WatchList>) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !done(&self.service) {
                assert!(Instant::now() < deadline, "condition not reached");
                self.event_loop
                    .dispatch(Some(Duration::from_millis(5)), &mut self.service)
                    .unwrap();
            }
        }

        fn run_for(&mut self, duration: Duration) {
            let deadline = Instant::now() + duration;
            while Instant::now() < deadline {
                self.event_loop
                    .dispatch(Some(Duration::from_millis(5)), &mut self.service)
                    .unwrap();
            }
        }

        fn write_app(&self, name: &str, extra: &str) -> PathBuf {
            let path = self.apps.join(format!("{}.desktop", name));
            fs::write(
                &path,
                format!("[Desktop Entry]\nType=Application\nName={}\nExec=true\n{}", name, extra),
            )
            .unwrap();
            path
        }
    }

    fn titles(service: &Service<WatchList>) -> Vec<String> {
        service.launcher().catalog().iter().map(|(_, e)| e.title()).collect()
    }

    fn created(path: &Path) -> notify::Event {
        notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path.to_path_buf())
    }

    #[test]
    fn debounce_fires_once_a_full_window_after_last_arm() {
        let mut event_loop: EventLoop<'static, Vec<Instant>> = EventLoop::try_new().unwrap();
        let handle = event_loop.handle();
        let mut fired = Vec::new();
        let mut debounce = Debounce::new(Duration::from_millis(100));

        debounce.arm(&handle, |f: &mut Vec<Instant>| f.push(Instant::now())).unwrap();
        let rearm_at = Instant::now() + Duration::from_millis(60);
        while Instant::now() < rearm_at {
            event_loop.dispatch(Some(Duration::from_millis(5)), &mut fired).unwrap();
        }
        assert!(fired.is_empty());

        let last = Instant::now();
        debounce.arm(&handle, |f: &mut Vec<Instant>| f.push(Instant::now())).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while fired.is_empty() && Instant::now() < deadline {
            event_loop.dispatch(Some(Duration::from_millis(5)), &mut fired).unwrap();
        }
        let settle = Instant::now() + Duration::from_millis(150);
        while Instant::now() < settle {
            event_loop.dispatch(Some(Duration::from_millis(5)), &mut fired).unwrap();
        }

        assert_eq!(fired.len(), 1);
        assert!(fired[0].duration_since(last) >= Duration::from_millis(100));
    }

    #[test]
    fn holdback_restarts_on_every_event() {
        let mut h = harness_with(TimingConfig {
            holdback_ms: 300,
            folder_save_ms: 10,
            temporary_removal_ms: 30,
            launching_timeout_ms: 30,
        });
        h.service.start();

        let first = h.write_app("first", "");
        h.service.on_fs_event(created(&first));
        h.run_for(Duration::from_millis(150));
        assert!(h.service.launcher().catalog().is_empty());

        let second = h.write_app("second", "");
        let last = Instant::now();
        h.service.on_fs_event(created(&second));
        // past the first event's window, still inside the second's
        h.run_for(Duration::from_millis(200));
        assert!(h.service.launcher().catalog().is_empty());

        h.run_until(|s| s.launcher().catalog().len() == 2);
        assert!(last.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn external_positions_edit_reorders_catalog() {
        let mut h = harness();
        let a = h.write_app("a", "");
        let b = h.write_app("b", "");
        h.service.start();
        assert_eq!(titles(&h.service), vec!["a", "b"]);

        let positions = h.service.launcher().positions().path().to_path_buf();
        fs::write(
            &positions,
            format!("[order]\n\"{}\" = 0\n\"{}\" = 1\n", b.display(), a.display()),
        )
        .unwrap();
        h.service.on_fs_event(
            notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(positions),
        );

        assert_eq!(titles(&h.service), vec!["b", "a"]);
    }

    #[test]
    fn folder_changes_are_handed_to_observers() {
        let mut h = harness();
        h.write_app("a", "");
        h.service.start();
        assert!(h.service.take_folder_events().is_empty());

        let path = h.write_app("b", "");
        h.service.on_fs_event(created(&path));
        h.run_until(|s| s.launcher().catalog().len() == 2);

        let id = h
            .service
            .launcher()
            .catalog()
            .find_by_path(&path.to_string_lossy())
            .unwrap();
        let root = h.service.folders().root();
        assert_eq!(
            h.service.take_folder_events(),
            vec![(
                root,
                ListEvent::Inserted {
                    index: 1,
                    item: FolderItem::Entry(id)
                }
            )]
        );
        assert!(h.service.take_folder_events().is_empty());
    }

    #[test]
    fn initial_scan_adds_visible_descriptors_and_saves_folders() {
        let mut h = harness();
        h.write_app("app1", "");
        h.write_app("app2", "Hidden=true\n");
        h.service.start();

        assert_eq!(titles(&h.service), vec!["app1"]);
        let document = h.service.folders().document_path();
        h.run_until(|_| document.exists());
        assert!(h.service.dump().contains("app1"));
    }

    #[test]
    fn new_descriptor_is_picked_up_after_holdback() {
        let mut h = harness();
        h.service.start();
        let path = h.write_app("late", "");

        let dir = h.apps.clone();
        h.service.on_fs_event(
            notify::Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone()),
        );
        assert!(h.service.launcher().catalog().is_empty());
        h.run_until(|s| s.launcher().catalog().len() == 1);

        let root = h.service.folders().root();
        assert_eq!(h.service.folders().folder(root).unwrap().len(), 1);

        fs::remove_file(&path).unwrap();
        h.service
            .on_fs_event(notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path(path));
        h.run_until(|s| s.launcher().catalog().is_empty());
        assert!(h.service.folders().folder(root).unwrap().is_empty());
        assert!(h.service.monitor().watcher().is_watched(&dir));
    }

    #[test]
    fn finished_placeholders_are_removed_after_delay() {
        let mut h = harness();
        h.service.start();
        h.service.updating_started("one", "One", "", "", "svc").unwrap();
        h.service.updating_started("two", "Two", "", "", "svc").unwrap();
        assert_eq!(h.service.launcher().catalog().len(), 2);

        h.service.updating_finished("one");
        h.service.updating_finished("two");
        assert_eq!(h.service.launcher().catalog().len(), 2);
        h.run_until(|s| s.launcher().catalog().is_empty());
    }

    #[test]
    fn updating_entry_requests_launch_instead_of_spawning() {
        let mut h = harness();
        let path = h.write_app("busy", "");
        h.service.start();
        h.service.updating_started("busy", "", "", "", "svc").unwrap();

        let outcome = h.service.launch(&path.to_string_lossy()).unwrap();
        assert_eq!(
            outcome,
            LaunchOutcome::LaunchRequested {
                package_name: "busy".into()
            }
        );
        assert_eq!(h.service.launch("nope.desktop").unwrap(), LaunchOutcome::NotFound);
    }

    #[test]
    fn launching_flag_times_out() {
        let mut h = harness();
        h.write_app("app", "");
        h.service.start();
        h.service.notify_launching("app.desktop").unwrap();

        let id = h.service.launcher().catalog().id_at(0).unwrap();
        assert!(h.service.launcher().entry(id).unwrap().is_launching());
        h.run_until(|s| !s.launcher().entry(id).unwrap().is_launching());
    }

    #[test]
    fn category_change_rebuilds_catalog() {
        let mut h = harness();
        h.write_app("chess", "Categories=Game;\n");
        h.write_app("calc", "Categories=Utility;\n");
        h.service.start();
        assert_eq!(h.service.launcher().catalog().len(), 2);

        h.service.set_categories(vec!["Utility".into()]);
        assert_eq!(titles(&h.service), vec!["calc"]);
        h.service.set_categories(Vec::new());
        assert_eq!(titles(&h.service), vec!["calc", "chess"]);
    }

    #[test]
    fn scope_switch_uses_separate_folder_document() {
        let mut h = harness();
        h.write_app("app", "");
        h.service.start();
        h.service.set_scope(Some("work".into()));
        let scoped = h.tmp.path().join("state/work.json");
        assert_eq!(h.service.folders().document_path(), scoped);
        h.run_until(|_| scoped.exists());
    }
}
