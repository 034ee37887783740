use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::catalog::index::CatalogNotification;
use crate::models::error::CaptureError;

/// Polls a directory and reports files appearing and disappearing.
///
/// The first poll reports every file already present, so nothing created
/// between the catalog's initial scan and the watcher starting is missed.
/// Duplicates of the scan are harmless because the catalog dedups by path.
pub struct DirectoryWatcher {
    root: PathBuf,
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub fn spawn<F>(root: PathBuf, interval: Duration, mut emit: F) -> Result<Self, CaptureError>
    where
        F: FnMut(CatalogNotification) + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let watched = root.clone();

        let handle = thread::Builder::new()
            .name("catalog-watcher".into())
            .spawn(move || {
                let mut known = BTreeSet::new();
                loop {
                    for notification in poll(&watched, &mut known) {
                        emit(notification);
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Stopped watching {}", watched.display());
            })
            .map_err(|_| CaptureError::ThreadSpawn("catalog-watcher".into()))?;

        log::info!("Watching {} every {:?}", root.display(), interval);
        Ok(Self {
            root,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Diff the directory against `known`, updating it in place.
fn poll(root: &Path, known: &mut BTreeSet<PathBuf>) -> Vec<CatalogNotification> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to list {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let current: BTreeSet<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    let mut notifications: Vec<CatalogNotification> = known
        .difference(&current)
        .cloned()
        .map(CatalogNotification::Removed)
        .collect();
    notifications.extend(current.difference(known).cloned().map(CatalogNotification::Added));

    *known = current;
    notifications
}
