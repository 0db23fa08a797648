use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::entry::{Entry, EntryKind, PickedFile, TransferItem};
use crate::PickerResult;

/// Where entries come from.
///
/// The picker only ever asks for the children of a directory entry and for
/// the file behind a file entry.
#[async_trait]
pub trait EntrySource: Send + Sync + 'static {
    /// Children of a directory entry
    async fn read_dir(&self, dir: &Entry) -> PickerResult<Vec<Entry>>;

    /// The file behind a file entry
    async fn file(&self, entry: &Entry) -> PickerResult<PickedFile>;
}

/// [`EntrySource`] over the local filesystem via `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEntrySource;

impl LocalEntrySource {
    pub fn new() -> Self {
        Self
    }

    /// Top-level entry for a path on disk. Symlinks are followed.
    pub async fn entry(&self, path: impl AsRef<Path>) -> PickerResult<Entry> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Entry::root(name, kind_of(&metadata), path))
    }

    /// Transfer item for a path, offering the entry and, for regular files,
    /// the file view too
    pub async fn item(&self, path: impl AsRef<Path>) -> PickerResult<LocalItem> {
        let entry = self.entry(path).await?;
        let file = if entry.is_file() {
            Some(self.file(&entry).await?)
        } else {
            None
        };
        Ok(LocalItem { entry, file })
    }
}

#[async_trait]
impl EntrySource for LocalEntrySource {
    async fn read_dir(&self, dir: &Entry) -> PickerResult<Vec<Entry>> {
        let mut reader = tokio::fs::read_dir(&dir.location).await?;
        let mut children = Vec::new();
        while let Some(child) = reader.next_entry().await? {
            let location = child.path();
            let metadata = match child_metadata(&location).await {
                Ok(Some(metadata)) => metadata,
                Ok(None) => {
                    debug!(path = %location.display(), "Skipping symlinked directory");
                    continue;
                }
                Err(error) => {
                    debug!(path = %location.display(), %error, "Skipping unreadable entry");
                    continue;
                }
            };
            let name = child.file_name().to_string_lossy().into_owned();
            children.push(dir.child(name, kind_of(&metadata), location));
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn file(&self, entry: &Entry) -> PickerResult<PickedFile> {
        let metadata = tokio::fs::metadata(&entry.location).await?;
        Ok(PickedFile::from_entry(entry, metadata.len()))
    }
}

/// Metadata for a directory child. Symlinks to files are followed; symlinks to
/// directories give `None` since they can point back at an ancestor.
async fn child_metadata(location: &Path) -> std::io::Result<Option<std::fs::Metadata>> {
    let link = tokio::fs::symlink_metadata(location).await?;
    if !link.file_type().is_symlink() {
        return Ok(Some(link));
    }
    let target = tokio::fs::metadata(location).await?;
    Ok((!target.is_dir()).then_some(target))
}

fn kind_of(metadata: &std::fs::Metadata) -> EntryKind {
    if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

/// A path picked from the local filesystem
#[derive(Debug, Clone)]
pub struct LocalItem {
    entry: Entry,
    file: Option<PickedFile>,
}

impl LocalItem {
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl TransferItem for LocalItem {
    fn as_entry(&self) -> Option<Entry> {
        Some(self.entry.clone())
    }

    fn as_file(&self) -> Option<PickedFile> {
        self.file.clone()
    }
}
