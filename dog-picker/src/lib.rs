//! # dog-picker: folder and file picker sessions
//!
//! `dog-picker` turns dropped or selected items into a deduplicated, ordered
//! stream of files delivered to a [`PickerHandler`]. It composes the
//! `dog-jobs` queue (one job per pick, drained sequentially) with its
//! breadth-first [`RecursiveIterator`](dog_jobs::RecursiveIterator) to walk
//! nested directories lazily.
//!
//! Items reach the picker through the [`TransferItem`] capability adapter and
//! directories are read through an [`EntrySource`]; [`LocalEntrySource`]
//! implements it over `tokio::fs`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_picker::prelude::*;
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl PickerHandler for Print {
//!     async fn on_upload_next_file(&self, file: PickedFile, _stop: &StopSignal) -> anyhow::Result<()> {
//!         println!("{} ({} bytes)", file.key(), file.size);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> PickerResult<()> {
//! let source = LocalEntrySource::new();
//! let item = source.item("./photos").await?;
//!
//! let picker = FilePicker::new(source, Print, PickerOptions::default().with_accept(".jpg,.png"));
//! picker.drop_items([item]);
//! picker.settled().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod fs;
pub mod handler;
pub mod picker;

pub use config::PickerOptions;
pub use entry::{Entry, EntryKind, PickedFile, TransferItem};
pub use error::{PickerError, PickerResult};
pub use fs::{EntrySource, LocalEntrySource, LocalItem};
pub use handler::{PickerHandler, StopSignal};
pub use picker::FilePicker;

/// Common imports for picker consumers
pub mod prelude {
    pub use crate::{
        Entry, EntryKind, EntrySource, FilePicker, LocalEntrySource, PickedFile, PickerError,
        PickerHandler, PickerOptions, PickerResult, StopSignal, TransferItem,
    };
}
