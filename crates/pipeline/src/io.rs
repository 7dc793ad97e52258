//! Filesystem helpers shared by the stages

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{PipelineError, Result};

/// UTF-8 byte-order mark written by spreadsheet exports.
const BOM: char = '\u{feff}';

/// Read a text file, dropping a leading byte-order mark.
pub fn read_text(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(match content.strip_prefix(BOM) {
        Some(rest) => rest.to_string(),
        None => content,
    })
}

/// Reset a stage's output directory. Each stage owns its directory
/// exclusively and regenerates it wholesale.
pub fn reset_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("clearing {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Sorted `.csv` files directly under `dir`.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingInputDir(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Final path component as text, for log and error messages.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write a CSV file through a temporary sibling that is renamed over
/// `path` only once fully written, so readers never see a partial file.
pub fn write_csv_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<&mut File>) -> Result<()>,
{
    let parent = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_text_strips_bom() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bom.csv");
        fs::write(&path, "\u{feff}日期,價格\n")?;

        assert_eq!(read_text(&path)?, "日期,價格\n");
        Ok(())
    }

    #[test]
    fn test_list_csv_files_sorted_and_filtered() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("b.csv"), "x\n")?;
        fs::write(dir.path().join("a.CSV"), "x\n")?;
        fs::write(dir.path().join("notes.txt"), "x\n")?;

        let files = list_csv_files(dir.path())?;
        let names: Vec<String> = files.iter().map(|p| file_label(p)).collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
        Ok(())
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let err = list_csv_files(Path::new("/nonexistent/vegcast")).unwrap_err();
        assert!(err.is_fatal_for_run());
    }

    #[test]
    fn test_atomic_write_replaces_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale\n")?;

        write_csv_atomic(&path, |w| {
            w.write_record(["date", "value"])?;
            w.write_record(["107/11/01", "1.5"])?;
            Ok(())
        })?;

        assert_eq!(fs::read_to_string(&path)?, "date,value\n107/11/01,1.5\n");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_reset_output_dir_clears_old_artifacts() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("stage");
        fs::create_dir_all(&out)?;
        fs::write(out.join("old.csv"), "x\n")?;

        reset_output_dir(&out)?;
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out)?.count(), 0);
        Ok(())
    }
}
