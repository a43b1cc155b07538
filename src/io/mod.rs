//! Input/output helpers.
//!
//! - engine data file: build + write + header read-back (`table`)
//! - JSON run manifest (`manifest`)
//! - atomic file writes shared by both

use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::PipelineError;

pub mod manifest;
pub mod table;

pub use manifest::*;
pub use table::*;

/// Write `path` through a temp file in the same directory, then rename it in.
///
/// The destination is either the previous content or the complete new content;
/// a failure part-way never leaves a truncated file behind.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::io(format!("Failed to create directory '{}'", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PipelineError::io(format!("Failed to create temp file in '{}'", dir.display()), e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|e| PipelineError::io(format!("Failed to write '{}'", path.display()), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io(format!("Failed to sync '{}'", path.display()), e))?;

    tmp.persist(path)
        .map_err(|e| PipelineError::io(format!("Failed to move temp file to '{}'", path.display()), e.error))?;
    Ok(())
}
