//! Unified-diff application with offset and fuzz tolerance.
//!
//! A hunk is first looked for at its recorded position, then at growing
//! offsets from it. If it cannot be placed verbatim, up to `fuzz` leading
//! and trailing context lines are ignored. Hunks that still do not fit are
//! rejected and collected for the reject archive.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::archive::{read_entries, write_entries};
use super::{blocking, StepContext};
use crate::error::Error;

pub const DEFAULT_FUZZ: usize = 2;
const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    fn leading_context(&self) -> usize {
        self.lines
            .iter()
            .take_while(|l| matches!(l, HunkLine::Context(_)))
            .count()
    }

    fn trailing_context(&self) -> usize {
        self.lines
            .iter()
            .rev()
            .take_while(|l| matches!(l, HunkLine::Context(_)))
            .count()
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        );
        for line in &self.lines {
            let _ = match line {
                HunkLine::Context(s) => writeln!(out, " {}", s),
                HunkLine::Remove(s) => writeln!(out, "-{}", s),
                HunkLine::Add(s) => writeln!(out, "+{}", s),
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    /// Archive entry the patch applies to, without the `a/` or `b/` prefix.
    pub fn target(&self) -> &str {
        let path = if self.new_path == DEV_NULL {
            &self.old_path
        } else {
            &self.new_path
        };
        path.strip_prefix("a/")
            .or_else(|| path.strip_prefix("b/"))
            .unwrap_or(path)
    }

    pub fn creates_file(&self) -> bool {
        self.old_path == DEV_NULL
    }

    pub fn deletes_file(&self) -> bool {
        self.new_path == DEV_NULL
    }

    /// Parse every file section of a unified diff.
    pub fn parse_all(text: &str) -> Result<Vec<FilePatch>> {
        let mut patches = Vec::new();
        let mut lines = text.lines().peekable();

        while let Some(line) = lines.next() {
            let Some(old) = line.strip_prefix("--- ") else {
                continue;
            };
            let new = lines
                .next()
                .and_then(|l| l.strip_prefix("+++ "))
                .with_context(|| format!("Expected '+++' after '{}'", line))?;

            let mut patch = FilePatch {
                old_path: strip_timestamp(old),
                new_path: strip_timestamp(new),
                hunks: Vec::new(),
            };

            while let Some(header) = lines.peek() {
                if !header.starts_with("@@") {
                    if header.starts_with("--- ") {
                        break;
                    }
                    lines.next();
                    continue;
                }
                let (old_start, old_len, new_start, new_len) = parse_hunk_header(header)?;
                lines.next();

                let mut hunk = Hunk {
                    old_start,
                    old_len,
                    new_start,
                    new_len,
                    lines: Vec::new(),
                };
                let (mut old_seen, mut new_seen) = (0, 0);
                while old_seen < old_len || new_seen < new_len {
                    let Some(body) = lines.next() else {
                        anyhow::bail!("Truncated hunk in patch for {}", patch.new_path);
                    };
                    if body.starts_with('\\') {
                        continue;
                    }
                    let tag = body.chars().next();
                    let rest = tag.map_or("", |c| &body[c.len_utf8()..]);
                    match tag {
                        Some('+') => {
                            hunk.lines.push(HunkLine::Add(rest.to_string()));
                            new_seen += 1;
                        }
                        Some('-') => {
                            hunk.lines.push(HunkLine::Remove(rest.to_string()));
                            old_seen += 1;
                        }
                        // an empty line is an empty context line
                        Some(' ') | None => {
                            hunk.lines.push(HunkLine::Context(rest.to_string()));
                            old_seen += 1;
                            new_seen += 1;
                        }
                        Some(_) => anyhow::bail!("Unexpected hunk line '{}'", body),
                    }
                }
                patch.hunks.push(hunk);
            }
            patches.push(patch);
        }
        Ok(patches)
    }
}

fn strip_timestamp(header: &str) -> String {
    header.split('\t').next().unwrap_or(header).trim().to_string()
}

fn parse_hunk_header(header: &str) -> Result<(usize, usize, usize, usize)> {
    let invalid = || anyhow::anyhow!("Invalid hunk header '{}'", header);
    let body = header
        .strip_prefix("@@ ")
        .and_then(|h| h.split(" @@").next())
        .ok_or_else(invalid)?;
    let mut parts = body.split_whitespace();
    let old = parts.next().and_then(|p| p.strip_prefix('-')).ok_or_else(invalid)?;
    let new = parts.next().and_then(|p| p.strip_prefix('+')).ok_or_else(invalid)?;

    let range = |spec: &str| -> Result<(usize, usize)> {
        let (start, len) = match spec.split_once(',') {
            Some((s, l)) => (s.parse()?, l.parse()?),
            None => (spec.parse()?, 1),
        };
        Ok((start, len))
    };
    let (old_start, old_len) = range(old).map_err(|_| invalid())?;
    let (new_start, new_len) = range(new).map_err(|_| invalid())?;
    Ok((old_start, old_len, new_start, new_len))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub content: String,
    pub applied: usize,
    pub rejected: Vec<Hunk>,
}

fn lines_match(file: &[String], at: usize, wanted: &[&str]) -> bool {
    at + wanted.len() <= file.len()
        && file[at..at + wanted.len()]
            .iter()
            .zip(wanted)
            .all(|(have, want)| have.trim_end() == want.trim_end())
}

/// Find `wanted` nearest to `expected`, never before `floor`.
fn locate(file: &[String], wanted: &[&str], expected: usize, floor: usize) -> Option<usize> {
    if wanted.is_empty() {
        return Some(expected.max(floor).min(file.len()));
    }
    let last = file.len().checked_sub(wanted.len())?;
    if floor > last {
        return None;
    }
    let expected = expected.clamp(floor, last);
    for distance in 0..=(last - floor) {
        let after = expected + distance;
        if after <= last && lines_match(file, after, wanted) {
            return Some(after);
        }
        if distance > 0 && expected >= floor + distance && lines_match(file, expected - distance, wanted) {
            return Some(expected - distance);
        }
    }
    None
}

/// Apply `patch` to `original`, tolerating moved hunks and up to `max_fuzz`
/// mismatching context lines at either end of a hunk.
pub fn apply_file_patch(original: &str, patch: &FilePatch, max_fuzz: usize) -> PatchOutcome {
    let trailing_newline = original.is_empty() || original.ends_with('\n');
    let mut file: Vec<String> = original.lines().map(str::to_string).collect();
    let mut applied = 0;
    let mut rejected = Vec::new();
    let mut drift: isize = 0;
    let mut floor = 0;

    for hunk in &patch.hunks {
        let old = hunk.old_lines();
        let new = hunk.new_lines();
        let expected = (hunk.old_start.saturating_sub(1) as isize + drift).max(0) as usize;

        let mut placed = None;
        for fuzz in 0..=max_fuzz {
            let lead = fuzz.min(hunk.leading_context());
            let trail = fuzz.min(hunk.trailing_context());
            if fuzz > 0 && lead == 0 && trail == 0 {
                break;
            }
            if fuzz > 0 && lead + trail >= old.len() {
                break;
            }
            let wanted = &old[lead..old.len() - trail];
            if let Some(at) = locate(&file, wanted, expected + lead, floor) {
                if fuzz > 0 {
                    log::debug!("Hunk @@ -{} applied with fuzz {}", hunk.old_start, fuzz);
                }
                placed = Some((at, lead, trail));
                break;
            }
        }

        match placed {
            Some((at, lead, trail)) => {
                let replacement: Vec<String> = new[lead..new.len() - trail]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                let removed = old.len() - lead - trail;
                let inserted = replacement.len();
                file.splice(at..at + removed, replacement);

                let offset = at as isize - (expected + lead) as isize;
                if offset != 0 {
                    log::debug!("Hunk @@ -{} applied at offset {}", hunk.old_start, offset);
                }
                drift += offset + inserted as isize - removed as isize;
                floor = at + inserted;
                applied += 1;
            }
            None => rejected.push(hunk.clone()),
        }
    }

    let mut content = file.join("\n");
    if trailing_newline && !file.is_empty() {
        content.push('\n');
    }
    PatchOutcome {
        content,
        applied,
        rejected,
    }
}

/// Collect patch texts from a directory of `.patch` files or a patch archive.
fn read_patches(patches: &Path) -> Result<BTreeMap<String, String>> {
    let mut texts = BTreeMap::new();
    if patches.is_dir() {
        for entry in walkdir::WalkDir::new(patches).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && entry.path().extension().map_or(false, |e| e == "patch") {
                let name = entry.path().strip_prefix(patches)?.to_string_lossy().replace('\\', "/");
                texts.insert(name, std::fs::read_to_string(entry.path())?);
            }
        }
    } else if patches.is_file() {
        for (name, bytes) in read_entries(patches)? {
            if name.ends_with(".patch") {
                texts.insert(name, String::from_utf8_lossy(&bytes).to_string());
            }
        }
    } else {
        anyhow::bail!("Patch source {:?} does not exist", patches);
    }
    Ok(texts)
}

pub(crate) struct PatchReport {
    pub applied: usize,
    pub rejected: usize,
    pub rejects: BTreeMap<String, Vec<u8>>,
}

/// Apply every patch under `patches` to the sources archive `input`.
pub(crate) fn patch_archive(input: &Path, patches: &Path, fuzz: usize, output: &Path) -> Result<PatchReport> {
    let mut entries = read_entries(input)?;
    let mut report = PatchReport {
        applied: 0,
        rejected: 0,
        rejects: BTreeMap::new(),
    };

    for (patch_name, text) in read_patches(patches)? {
        for file_patch in FilePatch::parse_all(&text)
            .with_context(|| format!("Failed to parse patch {}", patch_name))?
        {
            let target = file_patch.target().to_string();
            if file_patch.deletes_file() {
                entries.remove(&target);
                report.applied += file_patch.hunks.len();
                continue;
            }

            let original = match entries.get(&target) {
                Some(bytes) => String::from_utf8_lossy(bytes).to_string(),
                None if file_patch.creates_file() => String::new(),
                None => {
                    log::warn!("Patch {} targets missing file {}", patch_name, target);
                    let mut rej = String::new();
                    for hunk in &file_patch.hunks {
                        hunk.render(&mut rej);
                    }
                    report.rejected += file_patch.hunks.len();
                    report.rejects.insert(format!("{}.rej", target), rej.into_bytes());
                    continue;
                }
            };

            let outcome = apply_file_patch(&original, &file_patch, fuzz);
            report.applied += outcome.applied;
            if !outcome.rejected.is_empty() {
                let mut rej = format!("--- {}\n+++ {}\n", file_patch.old_path, file_patch.new_path);
                for hunk in &outcome.rejected {
                    hunk.render(&mut rej);
                }
                report.rejected += outcome.rejected.len();
                report.rejects.insert(format!("{}.rej", target), rej.into_bytes());
            }
            entries.insert(target, outcome.content.into_bytes());
        }
    }

    if report.rejected == 0 {
        write_entries(output, &entries)?;
    }
    Ok(report)
}

pub(super) async fn run(ctx: &StepContext<'_>) -> Result<()> {
    let input = ctx.path("input")?;
    let patches = ctx.path("patches")?;
    let fuzz = match ctx.value("fuzz") {
        Some(v) => v
            .parse()
            .with_context(|| format!("Invalid fuzz '{}' for step '{}'", v, ctx.step.name))?,
        None => DEFAULT_FUZZ,
    };
    let output = ctx.output();
    let rejects_path = ctx.step_dir().join("rejects.zip");

    let report = {
        let output = output.clone();
        blocking(move || patch_archive(&input, &patches, fuzz, &output)).await?
    };

    if report.rejected > 0 {
        write_entries(&rejects_path, &report.rejects)?;
        log::error!(
            "{} hunk(s) rejected in step '{}', see {:?}",
            report.rejected,
            ctx.step.name,
            rejects_path
        );
        return Err(Error::PatchRejected {
            step: ctx.step.name.clone(),
            rejected: report.rejected,
            rejects: rejects_path,
        }
        .into());
    }

    if rejects_path.exists() {
        std::fs::remove_file(&rejects_path)
            .with_context(|| format!("Failed to remove stale {:?}", rejects_path))?;
    }
    log::info!("Applied {} hunk(s) in step '{}'", report.applied, ctx.step.name);
    Ok(())
}
