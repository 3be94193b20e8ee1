//! JSON output of weekly batches.
//!
//! # Output Structure
//!
//! Files are grouped by vendor, then by month (date-keyed vendors) or week (period-keyed):
//! ```text
//! output_dir/
//! ├── wecook/
//! │   └── 2024-08/
//! │       ├── 2024-08-05.json
//! │       └── 2024-08-12.json
//! └── factor/
//!     └── 2024-W32/
//!         └── 2024-W32.json
//! ```
//!
//! Files are pretty-printed UTF-8 and replace any earlier file of the same name.

use crate::dates::bucket_for_key;
use crate::error::ScrapeError;
use crate::models::WeekBatch;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Destination for finished batches.
pub trait RecordSink {
    /// Write `batch` as `filename` under `dirs` (relative to the sink's root), creating
    /// directories as needed. Returns where the batch ended up.
    async fn write(
        &self,
        dirs: &[String],
        filename: &str,
        batch: &WeekBatch,
    ) -> Result<PathBuf, ScrapeError>;
}

/// Relative directories and file name of the batch for `key`.
pub fn batch_location(vendor_dir: Option<&str>, key: &str) -> (Vec<String>, String) {
    let mut dirs = Vec::new();
    if let Some(vendor) = vendor_dir {
        dirs.push(vendor.to_string());
    }
    dirs.push(bucket_for_key(key));
    (dirs, format!("{key}.json"))
}

#[derive(Debug, Clone)]
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl RecordSink for JsonFileSink {
    #[instrument(level = "info", skip(self, batch), fields(date = %batch.date))]
    async fn write(
        &self,
        dirs: &[String],
        filename: &str,
        batch: &WeekBatch,
    ) -> Result<PathBuf, ScrapeError> {
        let json = serde_json::to_string_pretty(batch)?;

        let full_json_dir = dirs.iter().fold(self.root.clone(), |dir, d| dir.join(d));
        if let Err(e) = fs::create_dir_all(&full_json_dir).await {
            error!(dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }

        let path = full_json_dir.join(filename);
        fs::write(&path, json).await?;
        info!(
            path = %path.display(),
            meals = batch.number_of_week_menus,
            "Wrote week batch"
        );
        Ok(path)
    }
}
