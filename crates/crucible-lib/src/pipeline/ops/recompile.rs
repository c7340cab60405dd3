use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::archive::{read_entries, write_entries};
use super::libraries::read_library_list;
use super::{blocking, StepContext};
use crate::models::manifest::OsType;
use crate::utils::process::run_captured;

/// Sources written to disk for javac, plus the resources carried over as-is.
struct Staged {
    sources: Vec<PathBuf>,
    resources: BTreeMap<String, Vec<u8>>,
}

fn stage_sources(input: &Path, sources_dir: &Path) -> Result<Staged> {
    let mut staged = Staged {
        sources: Vec::new(),
        resources: BTreeMap::new(),
    };
    for (name, bytes) in read_entries(input)? {
        if !name.ends_with(".java") {
            staged.resources.insert(name, bytes);
            continue;
        }
        let target = sources_dir.join(&name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes).with_context(|| format!("Failed to stage {:?}", target))?;
        staged.sources.push(target);
    }
    Ok(staged)
}

fn collect_classes(classes_dir: &Path, into: &mut BTreeMap<String, Vec<u8>>) -> Result<usize> {
    let mut count = 0;
    for entry in walkdir::WalkDir::new(classes_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(classes_dir)?
            .to_string_lossy()
            .replace('\\', "/");
        into.insert(name, std::fs::read(entry.path())?);
        count += 1;
    }
    Ok(count)
}

pub(super) async fn run(ctx: &StepContext<'_>) -> Result<()> {
    let input = ctx.path("input")?;
    let classpath = match ctx.optional_path("libraries") {
        Some(list) => read_library_list(&list)?,
        None => Vec::new(),
    };

    let step_dir = ctx.step_dir();
    tokio::fs::create_dir_all(&step_dir).await?;
    let scratch = tempfile::Builder::new()
        .prefix(".recompile-")
        .tempdir_in(&step_dir)
        .with_context(|| format!("Failed to create scratch directory in {:?}", step_dir))?;
    let sources_dir = scratch.path().join("sources");
    let classes_dir = scratch.path().join("classes");
    std::fs::create_dir_all(&classes_dir)?;

    let staged = {
        let (input, sources_dir) = (input.clone(), sources_dir.clone());
        blocking(move || stage_sources(&input, &sources_dir)).await?
    };
    let Staged {
        sources,
        mut resources,
    } = staged;

    if sources.is_empty() {
        log::warn!("Step '{}' has no sources to compile in {:?}", ctx.step.name, input);
    } else {
        // javac reads the file list from an argument file to stay under command-line limits
        let argfile = scratch.path().join("sources.txt");
        let mut file = std::fs::File::create(&argfile)?;
        for source in &sources {
            writeln!(file, "\"{}\"", source.to_string_lossy().replace('\\', "/"))?;
        }
        drop(file);

        let mut command = Command::new(&ctx.options.javac);
        command
            .arg("-d")
            .arg(&classes_dir)
            .args(["-nowarn", "-g", "-proc:none", "-encoding", "UTF-8"]);
        if let Some(release) = ctx.value("release") {
            command.arg("--release").arg(release);
        }
        if !classpath.is_empty() {
            let separator = OsType::current().classpath_separator();
            let joined = classpath
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(separator);
            command.arg("-classpath").arg(joined);
        }
        command.arg(format!("@{}", argfile.display()));

        log::info!(
            "Compiling {} source file(s) for step '{}'",
            sources.len(),
            ctx.step.name
        );
        run_captured(&mut command, "javac").await?;
    }

    let output = ctx.output();
    blocking(move || {
        let compiled = collect_classes(&classes_dir, &mut resources)?;
        log::debug!("Packed {} compiled class(es)", compiled);
        write_entries(&output, &resources)
    })
    .await
}
