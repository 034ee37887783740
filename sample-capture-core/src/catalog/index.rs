use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::config::TagIndexPolicy;
use crate::models::sample::Sample;

/// A change to the catalog directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogNotification {
    Added(PathBuf),
    Removed(PathBuf),
}

impl CatalogNotification {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(path) | Self::Removed(path) => path,
        }
    }
}

/// What applying a notification did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    Added(Sample),
    Removed(Sample),
}

/// In-memory index of the samples directly inside one directory.
///
/// Files whose names do not follow the naming grammar are skipped, as are
/// subdirectories. The index is keyed by path, so a sample is never listed
/// twice no matter how often it is reported.
#[derive(Debug)]
pub struct SampleCatalog {
    root: PathBuf,
    policy: TagIndexPolicy,
    samples: HashMap<PathBuf, Sample>,
    tags: BTreeSet<String>,
}

impl SampleCatalog {
    pub fn new(root: impl Into<PathBuf>, policy: TagIndexPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            samples: HashMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> TagIndexPolicy {
        self.policy
    }

    /// List the root once and index every sample in it.
    ///
    /// Returns the number of samples indexed. A missing root is an empty
    /// catalog, not an error.
    pub fn scan(&mut self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Catalog root {} does not exist yet", self.root.display());
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let mut indexed = 0;
        for entry in entries {
            let entry = entry?;
            if self.insert(&entry.path()).is_some() {
                indexed += 1;
            }
        }
        log::info!("Indexed {} samples under {}", indexed, self.root.display());
        Ok(indexed)
    }

    /// Apply one notification. Returns the change, or `None` if the index
    /// already reflected it.
    pub fn apply(&mut self, notification: &CatalogNotification) -> Option<CatalogChange> {
        match notification {
            CatalogNotification::Added(path) => self.insert(path).map(CatalogChange::Added),
            CatalogNotification::Removed(path) => self.remove(path).map(CatalogChange::Removed),
        }
    }

    fn insert(&mut self, path: &Path) -> Option<Sample> {
        if path.parent() != Some(self.root.as_path()) || self.samples.contains_key(path) || !path.is_file() {
            return None;
        }
        let sample = Sample::from_path(path)?;
        for tag in sample.metadata.tags() {
            self.tags.insert(tag.clone());
        }
        self.samples.insert(path.to_path_buf(), sample.clone());
        log::debug!("Catalog: added {}", path.display());
        Some(sample)
    }

    fn remove(&mut self, path: &Path) -> Option<Sample> {
        let sample = self.samples.remove(path)?;
        if self.policy == TagIndexPolicy::Recompute {
            self.tags = self
                .samples
                .values()
                .flat_map(|s| s.metadata.tags().iter().cloned())
                .collect();
        }
        log::debug!("Catalog: removed {}", path.display());
        Some(sample)
    }

    /// Keep the ids `previous` assigned to paths this index also holds.
    pub fn carry_ids_from(&mut self, previous: &SampleCatalog) {
        if previous.root != self.root {
            return;
        }
        for (path, sample) in self.samples.iter_mut() {
            if let Some(old) = previous.samples.get(path) {
                sample.id = old.id.clone();
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Sample> {
        self.samples.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.samples.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples, ordered by path.
    pub fn samples(&self) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self.samples.values().cloned().collect();
        samples.sort_by(|a, b| a.path.cmp(&b.path));
        samples
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Samples carrying every tag in `tags`.
    pub fn with_tags(&self, tags: &[&str]) -> Vec<Sample> {
        let mut matching: Vec<Sample> = self
            .samples
            .values()
            .filter(|s| tags.iter().all(|t| s.metadata.has_tag(t)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.path.cmp(&b.path));
        matching
    }
}
