use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::utils::fs::{replace_dir, temp_dir_beside, write_atomically};

pub(crate) const PACKAGE_INFO_TEMPLATE: &str = "package-info-template.java";

/// Fixed timestamps and ordering so identical inputs produce identical archives.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

pub(crate) fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    ZipArchive::new(file).with_context(|| format!("Failed to read {:?} as ZIP", path))
}

/// Read every file entry of an archive, keyed by entry name.
pub fn read_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = open_archive(path)?;
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {} from {:?}", entry.name(), path))?;
        entries.insert(entry.name().to_string(), bytes);
    }
    Ok(entries)
}

/// Write `entries` as a new archive at `output`, atomically.
pub fn write_entries(output: &Path, entries: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    write_atomically(output, |file| {
        let mut zip = ZipWriter::new(file);
        let options = entry_options();
        for (name, bytes) in entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(())
    })
}

pub(super) fn unpack(input: &Path, output: &Path) -> Result<()> {
    let mut archive = open_archive(input)?;
    let staged = temp_dir_beside(output)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe entry {} in {:?}", entry.name(), input);
            continue;
        };
        let target = staged.path().join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target).with_context(|| format!("Create {:?}", target))?;
        std::io::copy(&mut entry, &mut out)?;
    }

    replace_dir(staged, output)
}

/// Zip a directory tree. Entry names use forward slashes.
pub(super) fn repack(input: &Path, output: &Path) -> Result<()> {
    let mut entries = BTreeMap::new();
    for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(input)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read {:?}", entry.path()))?;
        entries.insert(name, bytes);
    }
    write_entries(output, &entries)
}

/// Read files to inject from either a directory or an archive.
fn read_injected(inject: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    if inject.is_dir() {
        let mut entries = BTreeMap::new();
        for entry in walkdir::WalkDir::new(inject).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                let name = entry
                    .path()
                    .strip_prefix(inject)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                entries.insert(name, std::fs::read(entry.path())?);
            }
        }
        Ok(entries)
    } else {
        read_entries(inject)
    }
}

/// Add the files of `inject` to `input`. When a package-info template is
/// available (explicitly, or as `package-info-template.java` among the
/// injected files) every source package without a `package-info.java`
/// receives one with `{PACKAGE}` replaced by the dotted package name.
pub(super) fn inject(input: &Path, inject: &Path, template: Option<&Path>, output: &Path) -> Result<()> {
    let mut entries = read_entries(input)?;
    let mut injected = read_injected(inject)?;

    let template = match template {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read package-info template {:?}", path))?,
        ),
        None => injected
            .remove(PACKAGE_INFO_TEMPLATE)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()),
    };
    injected.remove(PACKAGE_INFO_TEMPLATE);

    let injected_count = injected.len();
    entries.extend(injected);

    let mut generated = 0;
    if let Some(template) = template {
        let packages: BTreeSet<String> = entries
            .keys()
            .filter(|name| name.ends_with(".java"))
            .filter_map(|name| name.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        for package in packages {
            let info = format!("{}/package-info.java", package);
            if entries.contains_key(&info) {
                continue;
            }
            let body = template.replace("{PACKAGE}", &package.replace('/', "."));
            entries.insert(info, body.into_bytes());
            generated += 1;
        }
    }

    log::debug!(
        "Injected {} file(s) and generated {} package-info file(s) into {:?}",
        injected_count,
        generated,
        output
    );
    write_entries(output, &entries)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn jar(path: &Path, files: &[(&str, &str)]) {
        let entries = files
            .iter()
            .map(|(n, c)| (n.to_string(), c.as_bytes().to_vec()))
            .collect();
        write_entries(path, &entries).unwrap();
    }

    #[test]
    fn test_unpack_then_repack() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.zip");
        jar(&input, &[("a/B.java", "class B {}"), ("res.txt", "hello")]);

        let unpacked = dir.path().join("unpacked");
        unpack(&input, &unpacked).unwrap();
        assert_eq!(std::fs::read_to_string(unpacked.join("a/B.java")).unwrap(), "class B {}");

        let repacked = dir.path().join("out.zip");
        repack(&unpacked, &repacked).unwrap();
        let entries = read_entries(&repacked).unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a/B.java", "res.txt"]);
    }

    #[test]
    fn test_repack_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("pkg")).unwrap();
        std::fs::write(src.join("pkg/A.java"), "class A {}").unwrap();

        repack(&src, &dir.path().join("one.zip")).unwrap();
        repack(&src, &dir.path().join("two.zip")).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("one.zip")).unwrap(),
            std::fs::read(dir.path().join("two.zip")).unwrap()
        );
    }

    #[test]
    fn test_inject_generates_package_info() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sources.zip");
        jar(
            &input,
            &[
                ("net/minecraft/Foo.java", "class Foo {}"),
                ("net/minecraft/world/Bar.java", "class Bar {}"),
                ("net/minecraft/world/package-info.java", "package net.minecraft.world; // kept"),
            ],
        );

        let inject_dir = dir.path().join("inject");
        std::fs::create_dir_all(inject_dir.join("mcp")).unwrap();
        std::fs::write(inject_dir.join("mcp/Marker.java"), "class Marker {}").unwrap();
        std::fs::write(
            inject_dir.join(PACKAGE_INFO_TEMPLATE),
            "@Annotated\npackage {PACKAGE};\n",
        )
        .unwrap();

        let output = dir.path().join("out.zip");
        inject(&input, &inject_dir, None, &output).unwrap();
        let entries = read_entries(&output).unwrap();

        assert!(entries.contains_key("mcp/Marker.java"));
        assert!(!entries.contains_key(PACKAGE_INFO_TEMPLATE));
        assert_eq!(
            String::from_utf8_lossy(&entries["net/minecraft/package-info.java"]),
            "@Annotated\npackage net.minecraft;\n"
        );
        assert_eq!(
            String::from_utf8_lossy(&entries["net/minecraft/world/package-info.java"]),
            "package net.minecraft.world; // kept"
        );
        // the injected package gets one too
        assert!(entries.contains_key("mcp/package-info.java"));
    }
}
