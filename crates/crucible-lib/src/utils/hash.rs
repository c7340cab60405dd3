use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

const READ_CHUNK_SIZE: usize = 16384;

pub fn calculate_sha1(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Open file for hashing: {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("Read bytes while hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha1_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a file, or every file below a directory in a stable order
/// (relative path and content both contribute).
pub fn calculate_tree_sha1(path: &Path) -> Result<String> {
    if !path.is_dir() {
        return calculate_sha1(path);
    }

    let mut entries: Vec<_> = WalkDir::new(path)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Walk directory for hashing: {:?}", path))?
        .into_iter()
        .filter(|entry| entry.file_type().is_file())
        .collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut hasher = Sha1::new();
    for entry in entries {
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(calculate_sha1(entry.path())?.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha1_matches(path: &Path, expected: &str) -> bool {
    match calculate_sha1(path) {
        Ok(actual) => actual.eq_ignore_ascii_case(expected),
        Err(e) => {
            log::debug!("Could not hash {:?} for validation: {}", path, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hello").unwrap();
        assert_eq!(
            calculate_sha1(&file).unwrap(),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert!(sha1_matches(&file, "AAF4C61DDCC5E8A2DABEDE0F3B482CD9AEA9434D"));
        assert_eq!(sha1_bytes(b"hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn test_tree_hash_tracks_names_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir_all(tree.join("a")).unwrap();
        std::fs::write(tree.join("a/one.txt"), "1").unwrap();
        let first = calculate_tree_sha1(&tree).unwrap();

        std::fs::write(tree.join("a/one.txt"), "2").unwrap();
        let second = calculate_tree_sha1(&tree).unwrap();
        assert_ne!(first, second);

        std::fs::rename(tree.join("a/one.txt"), tree.join("a/two.txt")).unwrap();
        assert_ne!(second, calculate_tree_sha1(&tree).unwrap());
    }
}
