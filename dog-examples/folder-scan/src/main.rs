mod counter;

use anyhow::Result;
use dog_picker::{FilePicker, LocalEntrySource, PickerOptions};
use tracing::warn;

use crate::counter::FileCounter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    dog_jobs::init_tracing("info");

    // FOLDER_SCAN__ACCEPT, FOLDER_SCAN__DIRECTORY, FOLDER_SCAN__MULTIPLE, ...
    let options = PickerOptions::from_env("FOLDER_SCAN__")?;

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        paths.push(".".to_string());
    }

    let source = LocalEntrySource::new();
    let mut items = Vec::with_capacity(paths.len());
    for path in &paths {
        match source.item(path).await {
            Ok(item) => items.push(item),
            Err(error) => warn!(path = %path, %error, "Skipping path"),
        }
    }

    let picker = FilePicker::new(source, FileCounter::new(), options);
    picker.drop_items(items);
    picker.settled().await;

    let summary = picker.handler().summary().await;
    if summary.files == 0 {
        println!("No files found! Try another folder.");
    } else {
        println!(
            "[folder-scan] {} files, {} bytes ({} failed)",
            summary.files, summary.bytes, summary.failed
        );
    }

    Ok(())
}
