//! Line-oriented rule files and side-annotation stripping.
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::archive::{read_entries, write_entries};
use crate::utils::fs::write_atomically;

const SIDE_ANNOTATIONS: &str = r"@(?:OnlyIn|SideOnly|Environment)\([^)]*\)\s*";
const SIDE_IMPORTS: &[&str] = &[
    "net.minecraftforge.api.distmarker.",
    "net.neoforged.api.distmarker.",
    "net.minecraftforge.fml.relauncher.Side",
    "net.fabricmc.api.Environment",
    "net.fabricmc.api.EnvType",
];

/// Rule lines of every file, in order, without comments or blank lines.
pub(crate) fn read_rules(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut rules = Vec::new();
    for file in files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read rule file {:?}", file))?;
        rules.extend(
            text.lines()
                .map(|line| line.split('#').next().unwrap_or("").trim())
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    Ok(rules)
}

pub(super) fn concat_rules(files: &[PathBuf], output: &Path) -> Result<()> {
    let rules = read_rules(files)?;
    log::debug!("Concatenated {} rule(s) from {} file(s)", rules.len(), files.len());
    write_atomically(output, |out| {
        for rule in &rules {
            writeln!(out, "{}", rule)?;
        }
        Ok(())
    })
}

/// Source file a rule line applies to: `net/minecraft/Foo$Inner field` -> `net/minecraft/Foo.java`.
fn rule_source(rule: &str) -> Option<String> {
    let class = rule.split_whitespace().next()?;
    let class = class.replace('.', "/");
    let outer = class.split('$').next().unwrap_or(&class);
    Some(format!("{}.java", outer))
}

fn strip_source(source: &str, annotation: &Regex) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(import) = trimmed.strip_prefix("import ") {
            if SIDE_IMPORTS.iter().any(|p| import.starts_with(p)) {
                continue;
            }
        }
        if !annotation.is_match(line) {
            out.push_str(line);
            continue;
        }
        let stripped = annotation.replace_all(line, "");
        // a line holding nothing but the annotation disappears entirely
        if stripped.trim().is_empty() {
            continue;
        }
        out.push_str(&stripped);
        if line.ends_with('\n') && !stripped.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Remove side-only annotations from the sources named by `rule_files`, or
/// from every source when no rules are given.
pub(super) fn strip_side_annotations(input: &Path, rule_files: &[PathBuf], output: &Path) -> Result<()> {
    let annotation = Regex::new(SIDE_ANNOTATIONS)?;
    let targets: Option<BTreeSet<String>> = if rule_files.is_empty() {
        None
    } else {
        Some(read_rules(rule_files)?.iter().filter_map(|r| rule_source(r)).collect())
    };

    let mut stripped = 0;
    let entries: BTreeMap<String, Vec<u8>> = read_entries(input)?
        .into_iter()
        .map(|(name, bytes)| {
            let selected = name.ends_with(".java")
                && targets.as_ref().map_or(true, |t| t.contains(&name));
            if !selected {
                return (name, bytes);
            }
            let source = String::from_utf8_lossy(&bytes);
            let result = strip_source(&source, &annotation);
            if result != source {
                stripped += 1;
            }
            (name, result.into_bytes())
        })
        .collect();

    log::debug!("Stripped side annotations from {} source file(s)", stripped);
    write_entries(output, &entries)
}
