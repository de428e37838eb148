pub mod pivot;

pub use pivot::{PivotRow, PivotTable};

use crate::types::{AggregatorError, Result};
use std::path::Path;
use uuid::Uuid;

/// Writes a CSV file through a temp file in the same directory, then renames it into place.
pub(crate) fn write_csv_atomic(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AggregatorError::General(format!("output path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let tmp = dir.join(format!(".{}.csv.tmp", Uuid::new_v4()));
    let written = (|| -> Result<()> {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}
