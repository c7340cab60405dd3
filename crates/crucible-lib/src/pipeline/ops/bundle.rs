//! Bundled server jars: since 1.18 the distributed server jar is a launcher
//! that carries the real server and its libraries under `META-INF/`.
use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use super::archive::open_archive;
use crate::utils::fs::{copy_atomically, write_atomically};
use crate::utils::hash::sha1_bytes;

pub(crate) const VERSIONS_LIST: &str = "META-INF/versions.list";
pub(crate) const LIBRARIES_LIST: &str = "META-INF/libraries.list";

/// One `hash id path` line of `versions.list` or `libraries.list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub sha1: String,
    pub id: String,
    /// Relative to `META-INF/versions/` or `META-INF/libraries/`
    pub path: String,
}

impl BundleEntry {
    fn parse_list(content: &str) -> Result<Vec<BundleEntry>> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                match parts.as_slice() {
                    [sha1, id, path] => Ok(BundleEntry {
                        sha1: sha1.to_string(),
                        id: id.to_string(),
                        path: path.to_string(),
                    }),
                    _ => anyhow::bail!("Malformed bundle list line: '{}'", line),
                }
            })
            .collect()
    }
}

/// Read a bundle list from `jar`. `None` when the jar is not bundled.
pub(crate) fn read_list(jar: &Path, list: &str) -> Result<Option<Vec<BundleEntry>>> {
    let mut archive = open_archive(jar)?;
    let mut entry = match archive.by_name(list) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {} from {:?}", list, jar)),
    };
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(Some(BundleEntry::parse_list(&content)?))
}

/// Copy the inner file `META-INF/<dir>/<entry.path>` of `jar` to
/// `destination`, verifying its hash.
pub(crate) fn extract_entry(jar: &Path, dir: &str, entry: &BundleEntry, destination: &Path) -> Result<()> {
    let name = format!("META-INF/{}/{}", dir, entry.path);
    let mut archive = open_archive(jar)?;
    let mut file = archive
        .by_name(&name)
        .with_context(|| format!("{} not found in {:?}", name, jar))?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;

    let actual = sha1_bytes(&bytes);
    if !actual.eq_ignore_ascii_case(&entry.sha1) {
        anyhow::bail!(
            "SHA1 mismatch for bundled {}: expected {}, got {}",
            name,
            entry.sha1,
            actual
        );
    }

    write_atomically(destination, |out| {
        use std::io::Write;
        out.write_all(&bytes)?;
        Ok(())
    })
}

/// Extract the server jar from a bundled server, or copy a plain server jar.
pub(super) fn extract_server_jar(input: &Path, output: &Path) -> Result<()> {
    let Some(versions) = read_list(input, VERSIONS_LIST)? else {
        log::debug!("{:?} is not a bundled jar, copying through", input);
        return copy_atomically(input, output);
    };
    let entry = match versions.as_slice() {
        [single] => single,
        [] => anyhow::bail!("{} in {:?} is empty", VERSIONS_LIST, input),
        many => {
            log::warn!(
                "{:?} bundles {} versions, using {}",
                input,
                many.len(),
                many[0].id
            );
            &many[0]
        }
    };
    log::info!("Extracting bundled server {} from {:?}", entry.id, input);
    extract_entry(input, "versions", entry, output)
}
