use crate::error::{CrmSyncError, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip the contents of `src` into `dest`, nesting every entry under
/// `root_name/`. Entries are written in sorted order so archives are stable.
///
/// Returns the number of files written.
pub fn zip_directory(src: &Path, dest: &Path, root_name: &str) -> Result<usize> {
    if !src.is_dir() {
        return Err(CrmSyncError::ArchiveMissing(src.display().to_string()));
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut files = Vec::new();
    collect_files(src, &mut files)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(dest)?);
    zip.add_directory(format!("{root_name}/"), options)?;

    for path in &files {
        let relative = path
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(format!("{root_name}/{name}"), options)?;
        zip.write_all(&std::fs::read(path)?)?;
    }
    zip.finish()?;

    tracing::debug!(
        src = %src.display(),
        dest = %dest.display(),
        files = files.len(),
        "archive written"
    );
    Ok(files.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
