//! Step operations. Each reads its resolved arguments from a [`StepContext`]
//! and writes the step's output path.
mod archive;
mod bundle;
mod download;
mod libraries;
mod patch;
mod recompile;
mod rules;
mod strip;
mod tool;

pub use archive::{read_entries, write_entries};
pub use bundle::BundleEntry;
pub use patch::{apply_file_patch, FilePatch, Hunk, HunkLine, PatchOutcome};
pub use strip::load_class_set;

#[cfg(test)]
pub(crate) use archive::tests as tests_support;

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::definition::{PipelineDefinition, PipelineStep, ResolvedArg};
use super::executor::ExecutorOptions;
use super::template::Operation;
use crate::cache::ArtifactCache;
use crate::utils::fs::{copy_atomically, replace_dir, temp_dir_beside};

pub(crate) struct StepContext<'a> {
    pub step: &'a PipelineStep,
    pub definition: &'a PipelineDefinition,
    pub cache: &'a ArtifactCache,
    pub options: &'a ExecutorOptions,
}

impl StepContext<'_> {
    pub fn arg(&self, key: &str) -> Result<&ResolvedArg> {
        self.step
            .arg(key)
            .with_context(|| format!("Step '{}' is missing argument '{}'", self.step.name, key))
    }

    pub fn path(&self, key: &str) -> Result<PathBuf> {
        self.arg(key)?
            .as_path()
            .with_context(|| format!("Argument '{}' of step '{}' is not a path", key, self.step.name))
    }

    pub fn optional_path(&self, key: &str) -> Option<PathBuf> {
        self.step.arg(key).and_then(|a| a.as_path())
    }

    pub fn paths(&self, key: &str) -> Result<Vec<PathBuf>> {
        Ok(self.arg(key)?.paths())
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.step.arg(key).map(|a| a.render())
    }

    pub fn output(&self) -> PathBuf {
        self.step.output.clone()
    }

    /// Directory for side files (logs, rejects) next to the output.
    pub fn step_dir(&self) -> PathBuf {
        self.step
            .output
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.definition.context.workspace.clone())
    }
}

/// Run blocking archive or filesystem work off the async workers.
pub(crate) async fn blocking<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Blocking step task panicked")?
}

pub(crate) async fn execute(ctx: &StepContext<'_>) -> Result<()> {
    match &ctx.step.operation {
        Operation::DownloadManifest
        | Operation::DownloadVersionJson
        | Operation::DownloadArtifact { .. } => download::run(ctx).await,
        Operation::ListLibraries => libraries::run(ctx).await,
        Operation::ExtractBundle => {
            let (input, output) = (ctx.path("input")?, ctx.output());
            blocking(move || bundle::extract_server_jar(&input, &output)).await
        }
        Operation::Unpack => {
            let (input, output) = (ctx.path("input")?, ctx.output());
            blocking(move || archive::unpack(&input, &output)).await
        }
        Operation::Repack => {
            let (input, output) = (ctx.path("input")?, ctx.output());
            blocking(move || archive::repack(&input, &output)).await
        }
        Operation::Inject => {
            let input = ctx.path("input")?;
            let inject = ctx.path("inject")?;
            let template = ctx.optional_path("package_info_template");
            let output = ctx.output();
            blocking(move || archive::inject(&input, &inject, template.as_deref(), &output)).await
        }
        Operation::Patch => patch::run(ctx).await,
        Operation::Strip { mode } => {
            let mode = *mode;
            let (input, mappings, output) = (ctx.path("input")?, ctx.path("mappings")?, ctx.output());
            blocking(move || strip::strip_jar(&input, &mappings, mode, &output)).await
        }
        Operation::StripSideAnnotations => {
            let input = ctx.path("input")?;
            let rules = match ctx.step.arg("rules") {
                Some(arg) => arg.paths(),
                None => Vec::new(),
            };
            let output = ctx.output();
            blocking(move || rules::strip_side_annotations(&input, &rules, &output)).await
        }
        Operation::ConcatRules => {
            let files = ctx.paths("files")?;
            let output = ctx.output();
            blocking(move || rules::concat_rules(&files, &output)).await
        }
        Operation::Recompile => recompile::run(ctx).await,
        Operation::Tool { function } => tool::run(ctx, function).await,
        Operation::Provided { path } => {
            let (source, output) = (path.clone(), ctx.output());
            blocking(move || provide(&source, &output)).await
        }
    }
}

/// Shared download steps resolve through the session's cache memo.
/// Returns `true` when an earlier pipeline already produced the artifact.
pub(crate) async fn execute_shared(ctx: &StepContext<'_>) -> Result<bool> {
    download::run_shared(ctx).await
}

fn provide(source: &std::path::Path, output: &std::path::Path) -> Result<()> {
    if source.is_dir() {
        let staged = temp_dir_beside(output)?;
        for entry in walkdir::WalkDir::new(source).sort_by_file_name() {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source)?;
            let target = staged.path().join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)
                    .with_context(|| format!("Copy {:?} -> {:?}", entry.path(), target))?;
            }
        }
        replace_dir(staged, output)
    } else {
        copy_atomically(source, output)
            .with_context(|| format!("Failed to provide {:?}", source))
    }
}
