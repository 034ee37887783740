use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use crate::catalog::index::{CatalogChange, CatalogNotification, SampleCatalog};
use crate::catalog::watcher::DirectoryWatcher;
use crate::events::EventBus;
use crate::models::config::{LibraryConfig, TagIndexPolicy};
use crate::models::error::CaptureError;
use crate::models::sample::Sample;

/// What the catalog reports to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    SampleAdded(Sample),
    SampleRemoved(Sample),
    /// The index was rebuilt from a fresh scan of `root`.
    Rescanned { root: PathBuf, samples: usize },
}

enum CatalogCommand {
    Scan,
    Notify(CatalogNotification),
    Rebind(PathBuf),
    Sync(Sender<()>),
    Shutdown,
}

/// Cloneable access to a running [`CatalogService`].
///
/// Reads take snapshots under a shared lock. Every mutation is queued to the
/// service's consumer thread.
#[derive(Clone)]
pub struct CatalogHandle {
    commands: Sender<CatalogCommand>,
    index: Arc<RwLock<SampleCatalog>>,
    events: EventBus<CatalogEvent>,
}

impl CatalogHandle {
    pub fn notify(&self, notification: CatalogNotification) {
        if self.commands.send(CatalogCommand::Notify(notification)).is_err() {
            log::debug!("Catalog service stopped; dropping notification");
        }
    }

    pub fn notify_added(&self, path: PathBuf) {
        self.notify(CatalogNotification::Added(path));
    }

    pub fn notify_removed(&self, path: PathBuf) {
        self.notify(CatalogNotification::Removed(path));
    }

    /// Point the catalog at a new root directory.
    pub fn rebind(&self, root: impl Into<PathBuf>) {
        let _ = self.commands.send(CatalogCommand::Rebind(root.into()));
    }

    /// Rebuild the index from a fresh listing of the current root.
    pub fn rescan(&self) {
        let _ = self.commands.send(CatalogCommand::Scan);
    }

    /// Block until every command queued before this call has been applied.
    pub fn sync(&self) {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if self.commands.send(CatalogCommand::Sync(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }

    pub fn subscribe(&self) -> Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn root(&self) -> PathBuf {
        self.index.read().root().to_path_buf()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.index.read().samples()
    }

    pub fn tags(&self) -> Vec<String> {
        self.index.read().tags().iter().cloned().collect()
    }

    pub fn with_tags(&self, tags: &[&str]) -> Vec<Sample> {
        self.index.read().with_tags(tags)
    }

    pub fn get(&self, path: &Path) -> Option<Sample> {
        self.index.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

/// Owns the sample index, its directory watcher and the consumer thread that
/// applies every change in order.
pub struct CatalogService {
    handle: CatalogHandle,
    consumer: Option<thread::JoinHandle<()>>,
}

impl CatalogService {
    /// Scan `config.catalog_root` and start watching it.
    pub fn start(config: &LibraryConfig) -> Result<Self, CaptureError> {
        Self::start_at(
            config.catalog_root.clone(),
            config.tag_index_policy,
            config.watch_interval(),
        )
    }

    pub fn start_at(root: PathBuf, policy: TagIndexPolicy, interval: Duration) -> Result<Self, CaptureError> {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let handle = CatalogHandle {
            commands: commands_tx,
            index: Arc::new(RwLock::new(SampleCatalog::new(root, policy))),
            events: EventBus::new(),
        };

        let mut consumer = Consumer {
            handle: handle.clone(),
            policy,
            interval,
            watcher: None,
        };
        let join = thread::Builder::new()
            .name("catalog-consumer".into())
            .spawn(move || consumer.run(commands_rx))
            .map_err(|_| CaptureError::ThreadSpawn("catalog-consumer".into()))?;

        let service = Self {
            handle,
            consumer: Some(join),
        };
        let root = service.handle.root();
        service.handle.commands.send(CatalogCommand::Rebind(root)).map_err(|_| {
            CaptureError::InvalidState("catalog consumer exited during startup".into())
        })?;
        service.handle.sync();
        Ok(service)
    }

    pub fn handle(&self) -> CatalogHandle {
        self.handle.clone()
    }

    pub fn shutdown(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            let _ = self.handle.commands.send(CatalogCommand::Shutdown);
            let _ = consumer.join();
            log::info!("Catalog service stopped");
        }
    }
}

impl Drop for CatalogService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Consumer {
    handle: CatalogHandle,
    policy: TagIndexPolicy,
    interval: Duration,
    watcher: Option<DirectoryWatcher>,
}

impl Consumer {
    fn run(&mut self, commands: Receiver<CatalogCommand>) {
        for command in commands.iter() {
            match command {
                CatalogCommand::Scan => {
                    let root = self.handle.root();
                    self.rebuild(root);
                }
                CatalogCommand::Notify(notification) => self.apply(&notification),
                CatalogCommand::Rebind(root) => {
                    self.stop_watching();
                    self.rebuild(root.clone());
                    self.start_watching(root);
                }
                CatalogCommand::Sync(done) => {
                    let _ = done.send(());
                }
                CatalogCommand::Shutdown => break,
            }
        }
        self.stop_watching();
    }

    fn apply(&self, notification: &CatalogNotification) {
        let change = self.handle.index.write().apply(notification);
        match change {
            Some(CatalogChange::Added(sample)) => self.handle.events.emit(CatalogEvent::SampleAdded(sample)),
            Some(CatalogChange::Removed(sample)) => self.handle.events.emit(CatalogEvent::SampleRemoved(sample)),
            None => {}
        }
    }

    fn rebuild(&self, root: PathBuf) {
        let mut fresh = SampleCatalog::new(root.clone(), self.policy);
        if let Err(e) = fresh.scan() {
            log::error!("Failed to scan catalog root {}: {}", root.display(), e);
        }
        let samples = fresh.len();
        let mut index = self.handle.index.write();
        fresh.carry_ids_from(&index);
        *index = fresh;
        drop(index);
        self.handle.events.emit(CatalogEvent::Rescanned { root, samples });
    }

    fn start_watching(&mut self, root: PathBuf) {
        let commands = self.handle.commands.clone();
        let spawned = DirectoryWatcher::spawn(root, self.interval, move |notification| {
            let _ = commands.send(CatalogCommand::Notify(notification));
        });
        match spawned {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => log::error!("Catalog changes will not be picked up: {}", e),
        }
    }

    fn stop_watching(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }
}
