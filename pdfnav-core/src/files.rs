use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// An uploaded document. The name is the uniqueness key inside a [`FileSetManager`].
#[derive(Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    content: Bytes,
}

impl File {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{:?} has no file name", path))?;
        let content =
            std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
        Ok(Self::new(name, content))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn byte_len(&self) -> usize {
        self.content.len()
    }

    /// Cheap handle to the file bytes, suitable for handing to a widget.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn is_pdf(&self) -> bool {
        self.content.starts_with(PDF_MAGIC)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("byte_len", &self.content.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSetChange {
    Added(Vec<String>),
    Removed(String),
    Reset,
}

/// Receives every effective mutation of a [`FileSetManager`], together with the
/// file list as it stands after the change.
pub trait FileSetObserver: Send + Sync {
    fn files_changed(&self, change: &FileSetChange, files: &[File]);
}

#[derive(Default)]
pub struct FileSetManager {
    files: RwLock<Vec<File>>,
    observers: Mutex<Vec<Weak<dyn FileSetObserver>>>,
}

impl FileSetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observers are held weakly; dropping the observer unsubscribes it.
    pub fn subscribe(&self, observer: Weak<dyn FileSetObserver>) {
        self.observers.lock().push(observer);
    }

    /// Adds every file whose name is not already held, preserving order.
    /// Returns the names that were actually added.
    pub fn add<I>(&self, files: I) -> Vec<String>
    where
        I: IntoIterator<Item = File>,
    {
        let mut added = Vec::new();
        {
            let mut held = self.files.write();
            for file in files {
                if held.iter().any(|existing| existing.name == file.name) {
                    debug!(name = %file.name, "ignoring duplicate file");
                    continue;
                }
                added.push(file.name.clone());
                held.push(file);
            }
        }
        if !added.is_empty() {
            self.notify(FileSetChange::Added(added.clone()));
        }
        added
    }

    pub fn remove(&self, name: &str) -> Option<File> {
        let removed = {
            let mut held = self.files.write();
            let index = held.iter().position(|file| file.name == name)?;
            held.remove(index)
        };
        self.notify(FileSetChange::Removed(removed.name.clone()));
        Some(removed)
    }

    pub fn reset(&self) {
        let had_files = {
            let mut held = self.files.write();
            let had_files = !held.is_empty();
            held.clear();
            had_files
        };
        if had_files {
            self.notify(FileSetChange::Reset);
        }
    }

    pub fn list(&self) -> Vec<File> {
        self.files.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<File> {
        self.files.read().iter().find(|file| file.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn notify(&self, change: FileSetChange) {
        let snapshot = self.list();
        let observers: Vec<Arc<dyn FileSetObserver>> = {
            let mut observers = self.observers.lock();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.files_changed(&change, &snapshot);
        }
    }
}
