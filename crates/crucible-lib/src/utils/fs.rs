//! File placement helpers. Everything written into shared directories goes
//! through a temporary sibling first so readers never see a torn file.
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Create a temporary file next to `destination`.
pub fn temp_file_beside(destination: &Path) -> Result<NamedTempFile> {
    let parent = parent_dir(destination)?;
    fs::create_dir_all(&parent).with_context(|| format!("Create directory {:?}", parent))?;
    tempfile::Builder::new()
        .prefix(".crucible-")
        .suffix(".part")
        .tempfile_in(&parent)
        .with_context(|| format!("Create temporary file in {:?}", parent))
}

/// Move a finished temporary file onto `destination`.
///
/// Uses an atomic rename; when the platform refuses it, falls back to a
/// copy into place followed by removal of the temporary file.
pub fn persist(temp: NamedTempFile, destination: &Path) -> Result<()> {
    match temp.persist(destination) {
        Ok(_) => Ok(()),
        Err(err) => {
            log::warn!(
                "Atomic rename into {:?} failed ({}), falling back to replace-copy",
                destination,
                err.error
            );
            let temp = err.file;
            if destination.exists() {
                fs::remove_file(destination)
                    .with_context(|| format!("Remove existing destination {:?}", destination))?;
            }
            fs::copy(temp.path(), destination).with_context(|| {
                format!("Copy {:?} -> {:?}", temp.path(), destination)
            })?;
            Ok(())
        }
    }
}

/// Write `destination` through `writer`. On error the destination is left
/// untouched and the partial temporary file is discarded.
pub fn write_atomically<F>(destination: &Path, writer: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let mut temp = temp_file_beside(destination)?;
    writer(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    persist(temp, destination)
}

pub fn copy_atomically(source: &Path, destination: &Path) -> Result<()> {
    write_atomically(destination, |out| {
        let mut input =
            File::open(source).with_context(|| format!("Open copy source {:?}", source))?;
        std::io::copy(&mut input, out)
            .with_context(|| format!("Copy {:?} -> {:?}", source, destination))?;
        Ok(())
    })
}

/// Create a scratch directory next to `destination`, to be swapped in with
/// [`replace_dir`].
pub fn temp_dir_beside(destination: &Path) -> Result<TempDir> {
    let parent = parent_dir(destination)?;
    fs::create_dir_all(&parent).with_context(|| format!("Create directory {:?}", parent))?;
    tempfile::Builder::new()
        .prefix(".crucible-")
        .tempdir_in(&parent)
        .with_context(|| format!("Create temporary directory in {:?}", parent))
}

/// Replace `destination` with the fully populated `staged` directory.
pub fn replace_dir(staged: TempDir, destination: &Path) -> Result<()> {
    if destination.exists() {
        fs::remove_dir_all(destination)
            .with_context(|| format!("Remove previous directory {:?}", destination))?;
    }
    let staged_path = staged.keep();
    match fs::rename(&staged_path, destination) {
        Ok(_) => Ok(()),
        Err(err) if is_cross_device_link(&err) => {
            copy_dir_recursive(&staged_path, destination)?;
            fs::remove_dir_all(&staged_path)
                .with_context(|| format!("Remove staged dir {:?}", staged_path))?;
            Ok(())
        }
        Err(err) => {
            let _ = fs::remove_dir_all(&staged_path);
            Err(err).with_context(|| format!("Move dir {:?} -> {:?}", staged_path, destination))
        }
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("Create copy dest {:?}", dest))?;
    for entry in fs::read_dir(src).with_context(|| format!("Read dir {:?}", src))? {
        let entry = entry?;
        let target_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target_path)?;
        } else {
            fs::copy(entry.path(), &target_path)
                .with_context(|| format!("Copy file {:?} -> {:?}", entry.path(), target_path))?;
        }
    }
    Ok(())
}

fn is_cross_device_link(err: &std::io::Error) -> bool {
    #[cfg(target_family = "unix")]
    {
        err.kind() == std::io::ErrorKind::CrossesDevices || err.raw_os_error() == Some(18)
    }

    #[cfg(not(target_family = "unix"))]
    {
        let _ = err;
        false
    }
}

fn parent_dir(path: &Path) -> Result<PathBuf> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
        Some(_) => Ok(PathBuf::from(".")),
        None => anyhow::bail!("Path has no parent directory: {:?}", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().contains(".crucible-"))
            .collect()
    }

    #[test]
    fn test_failed_write_leaves_destination_absent() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");

        let result = write_atomically(&dest, |file| {
            file.write_all(b"half of a jar")?;
            anyhow::bail!("connection reset");
        });

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        fs::write(&dest, "complete old jar").unwrap();

        let _ = write_atomically(&dest, |file| {
            file.write_all(b"torn")?;
            anyhow::bail!("interrupted");
        });

        assert_eq!(fs::read_to_string(&dest).unwrap(), "complete old jar");
    }

    #[test]
    fn test_interrupted_before_rename_is_never_observed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("server.jar");

        // Simulates the process dying after the temp file is fully written
        // but before it is renamed: the temp file is simply dropped.
        {
            let mut temp = temp_file_beside(&dest).unwrap();
            temp.write_all(b"fully written").unwrap();
        }

        assert!(!dest.exists());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_replace_dir_swaps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "old").unwrap();

        let staged = temp_dir_beside(&dest).unwrap();
        fs::write(staged.path().join("fresh.txt"), "new").unwrap();
        replace_dir(staged, &dest).unwrap();

        assert!(!dest.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(dest.join("fresh.txt")).unwrap(), "new");
    }
}
