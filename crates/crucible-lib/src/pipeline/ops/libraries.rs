use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::bundle::{self, LIBRARIES_LIST};
use super::{blocking, StepContext};
use crate::cache::{ArtifactKind, CacheSelector, DownloadDescriptor};
use crate::models::manifest::{OsType, VersionJson};
use crate::utils::fs::write_atomically;
use crate::utils::hash::sha1_matches;

const CONCURRENT_LIBRARY_DOWNLOADS: usize = 8;

/// Download every library the version needs on this OS and write the
/// `-e=<path>` list consumed by the decompiler and compiler tools.
pub(super) async fn run(ctx: &StepContext<'_>) -> Result<()> {
    let json_path = ctx.path("json")?;
    let content = tokio::fs::read_to_string(&json_path)
        .await
        .with_context(|| format!("Failed to read {:?}", json_path))?;
    let version: VersionJson =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", json_path))?;

    let os = OsType::current();
    let resolved = version
        .libraries_for(os)
        // natives-only entries carry no main artifact
        .filter(|lib| lib.downloads.as_ref().map_or(true, |d| d.artifact.is_some()))
        .map(|lib| lib.resolve(&ctx.options.libraries_url))
        .collect::<Result<Vec<_>>>()?;

    log::info!("Resolving {} libraries for {}", resolved.len(), version.id);
    let cache = ctx.cache;
    let mut paths: Vec<PathBuf> = stream::iter(resolved)
        .map(|lib| async move {
            let selector = CacheSelector::library(&lib.relative_path);
            let descriptor = DownloadDescriptor::new(lib.url.clone(), ArtifactKind::Library)
                .with_sha1(lib.sha1.clone());
            cache
                .cached(&selector, &descriptor)
                .await
                .with_context(|| format!("Failed to download library {}", lib.coordinate))
        })
        .buffered(CONCURRENT_LIBRARY_DOWNLOADS)
        .try_collect()
        .await?;

    if let Some(server_jar) = ctx.optional_path("bundle") {
        let libraries_root = cache.root().join("libraries");
        let bundled = blocking(move || extract_bundled_libraries(&server_jar, &libraries_root)).await?;
        paths.extend(bundled);
    }

    let mut seen = BTreeSet::new();
    let lines: Vec<String> = paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .map(|p| format!("-e={}", p.display()))
        .collect();

    let output = ctx.output();
    write_atomically(&output, |file| {
        use std::io::Write;
        for line in &lines {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    })?;
    log::debug!("Wrote {} library entries to {:?}", lines.len(), output);
    Ok(())
}

/// Libraries shipped inside a bundled server jar, unpacked under `root`.
fn extract_bundled_libraries(server_jar: &std::path::Path, root: &std::path::Path) -> Result<Vec<PathBuf>> {
    let Some(entries) = bundle::read_list(server_jar, LIBRARIES_LIST)? else {
        return Ok(Vec::new());
    };

    let mut paths = Vec::with_capacity(entries.len());
    for entry in entries {
        let destination = entry
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment));
        if !(destination.is_file() && sha1_matches(&destination, &entry.sha1)) {
            bundle::extract_entry(server_jar, "libraries", &entry, &destination)?;
        }
        paths.push(destination);
    }
    Ok(paths)
}

/// Read `-e=<path>` lines (or bare paths) from a library list file.
pub(crate) fn read_library_list(path: &std::path::Path) -> Result<Vec<PathBuf>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| PathBuf::from(line.strip_prefix("-e=").unwrap_or(line)))
        .collect())
}
