//! Entries, files and the capability adapter that hands them to the picker.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// A node of a dropped or selected tree.
///
/// `full_path` is virtual and rooted at the pick: a dropped folder `photos`
/// is `/photos`, its child `a.png` is `/photos/a.png`. `location` is where
/// the node lives for the [`EntrySource`](crate::EntrySource) that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub full_path: String,
    pub name: String,
    pub kind: EntryKind,
    pub location: PathBuf,
}

impl Entry {
    /// Top-level entry named `name`
    pub fn root(name: impl Into<String>, kind: EntryKind, location: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            full_path: format!("/{name}"),
            name,
            kind,
            location: location.into(),
        }
    }

    pub fn child(&self, name: impl Into<String>, kind: EntryKind, location: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            full_path: format!("{}/{}", self.full_path.trim_end_matches('/'), name),
            name,
            kind,
            location: location.into(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Deduplication key: the full path without its leading `/`
    pub fn key(&self) -> &str {
        self.full_path.strip_prefix('/').unwrap_or(&self.full_path)
    }

    /// Directory part of [`key`](Self::key), with a trailing `/` unless empty
    pub fn relative_dir(&self) -> &str {
        let key = self.key();
        match key.rfind('/') {
            Some(split) => &key[..=split],
            None => "",
        }
    }
}

/// A file ready to be handed to a [`PickerHandler`](crate::PickerHandler)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PickedFile {
    pub location: PathBuf,
    /// Directory of the file relative to the pick root, `""` for top-level
    /// files, otherwise ending in `/`
    pub relative_path: String,
    pub name: String,
    pub size: u64,
}

impl PickedFile {
    /// Build the file for an entry produced by a traversal
    pub fn from_entry(entry: &Entry, size: u64) -> Self {
        Self {
            location: entry.location.clone(),
            relative_path: entry.relative_dir().to_string(),
            name: entry.name.clone(),
            size,
        }
    }

    /// Deduplication key, shared with [`Entry::key`] for the same file
    pub fn key(&self) -> String {
        format!("{}{}", self.relative_path, self.name)
    }
}

/// One dropped or selected item, exposing whichever views it supports
pub trait TransferItem: Send + Sync {
    fn as_entry(&self) -> Option<Entry> {
        None
    }

    fn as_file(&self) -> Option<PickedFile> {
        None
    }

    fn as_string(&self) -> Option<String> {
        None
    }
}

impl TransferItem for Entry {
    fn as_entry(&self) -> Option<Entry> {
        Some(self.clone())
    }
}

impl TransferItem for PickedFile {
    fn as_file(&self) -> Option<PickedFile> {
        Some(self.clone())
    }
}

impl TransferItem for String {
    fn as_string(&self) -> Option<String> {
        Some(self.clone())
    }
}
