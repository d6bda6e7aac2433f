//! Lazily loaded, permanently memoized blacklist configuration.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use fxhash::FxHashSet;
use metachannel_types::Arch;

type BlacklistFile = BTreeMap<String, FxHashSet<String>>;

/// Reads blacklist files laid out as `<root>/<channel>/<name>.yml`: a YAML
/// mapping from arch to a list of artifact filenames.
///
/// The files are static configuration. They are read on first use and
/// memoized for the lifetime of the store; a missing or unreadable file
/// behaves as an empty blacklist. The store is injected into the engine so
/// tests can point it at their own directory.
#[derive(Debug)]
pub struct BlacklistStore {
    root: PathBuf,
    cache: DashMap<(String, String), Arc<BlacklistFile>>,
}

impl BlacklistStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
        }
    }

    /// The filenames blacklisted under `name` for one channel and arch.
    pub fn get(&self, name: &str, channel: &str, arch: &Arch) -> FxHashSet<String> {
        self.load(name, channel)
            .get(arch.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// The union of the named blacklist across all component channels.
    pub fn effective(&self, name: &str, channels: &[String], arch: &Arch) -> FxHashSet<String> {
        let mut effective = FxHashSet::default();
        for channel in channels {
            effective.extend(self.get(name, channel, arch));
        }
        effective
    }

    fn load(&self, name: &str, channel: &str) -> Arc<BlacklistFile> {
        let key = (channel.to_string(), name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let path = self.root.join(channel).join(format!("{name}.yml"));
        let parsed = Arc::new(read_blacklist(&path));
        self.cache.entry(key).or_insert(parsed).clone()
    }
}

fn read_blacklist(path: &Path) -> BlacklistFile {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BlacklistFile::new(),
        Err(err) => {
            tracing::warn!("failed to read blacklist {}: {err}", path.display());
            return BlacklistFile::new();
        }
    };
    match serde_yaml::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("failed to parse blacklist {}: {err}", path.display());
            BlacklistFile::new()
        }
    }
}
