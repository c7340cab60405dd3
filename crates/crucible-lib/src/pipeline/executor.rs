//! Runs a [`PipelineDefinition`]: dependency-ordered, bounded-parallel,
//! with per-step fingerprint caching.
use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::definition::{PipelineDefinition, PipelineStep};
use super::ops::{self, blocking, StepContext};
use super::template::Operation;
use crate::cache::ArtifactCache;
use crate::config::{Settings, LIBRARIES_URL, VERSION_MANIFEST_URL};
use crate::error::Error;
use crate::reporter::{ProgressReporter, SilentProgressReporter};
use crate::utils::fs::write_atomically;
use crate::utils::hash::calculate_tree_sha1;

const FINGERPRINT_FILE: &str = "fingerprint";

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of steps running at once
    pub concurrency: usize,
    pub java: PathBuf,
    pub javac: PathBuf,
    pub manifest_url: String,
    pub libraries_url: String,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            java: PathBuf::from("java"),
            javac: PathBuf::from("javac"),
            manifest_url: VERSION_MANIFEST_URL.to_string(),
            libraries_url: LIBRARIES_URL.to_string(),
        }
    }
}

impl ExecutorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            java: locate_executable(&settings.java),
            javac: locate_executable(&settings.javac),
            ..Self::default()
        }
    }
}

/// Resolve a bare program name against `PATH`, keeping it unchanged when
/// it cannot be found so the spawn error names it.
fn locate_executable(program: &Path) -> PathBuf {
    if program.components().count() > 1 {
        return program.to_path_buf();
    }
    match which::which(program) {
        Ok(path) => path,
        Err(_) => {
            log::debug!("{:?} not found on PATH", program);
            program.to_path_buf()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Completed { cached: bool },
    Failed,
}

/// The output of a finished pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub step: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub output: ArtifactHandle,
    states: BTreeMap<String, StepState>,
}

impl PipelineRun {
    pub fn state(&self, step: &str) -> Option<StepState> {
        self.states.get(step).copied()
    }

    /// Names of the steps whose previous output was reused.
    pub fn cached_steps(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| matches!(s, StepState::Completed { cached: true }))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub struct PipelineExecutor {
    cache: Arc<ArtifactCache>,
    options: ExecutorOptions,
    reporter: Arc<dyn ProgressReporter>,
}

impl PipelineExecutor {
    pub fn new(cache: Arc<ArtifactCache>, options: ExecutorOptions) -> Self {
        Self {
            cache,
            options,
            reporter: Arc::new(SilentProgressReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub async fn run(&self, definition: &PipelineDefinition) -> Result<ArtifactHandle> {
        Ok(self.run_report(definition).await?.output)
    }

    /// Run every step and report the state each one finished in.
    pub async fn run_report(&self, definition: &PipelineDefinition) -> Result<PipelineRun> {
        let final_step = definition
            .final_step()
            .with_context(|| format!("Pipeline {} has no steps", definition.key()))?;
        let total = definition.steps.len() as u32;
        let limit = self.options.concurrency.max(1);

        let mut states: BTreeMap<String, StepState> = definition
            .steps
            .iter()
            .map(|s| (s.name.clone(), StepState::Pending))
            .collect();
        let mut pending: Vec<&PipelineStep> = definition.steps.iter().collect();
        let mut running = FuturesUnordered::new();
        let mut finished = 0u32;

        self.reporter
            .start_phase(&format!("Pipeline {}", definition.key()), Some(total));
        log::info!("Running pipeline {} ({} steps)", definition.key(), total);

        loop {
            let mut idx = 0;
            while running.len() < limit && idx < pending.len() {
                let step = pending[idx];
                let ready = step
                    .depends_on
                    .iter()
                    .all(|dep| matches!(states.get(dep), Some(StepState::Completed { .. })));
                if !ready {
                    idx += 1;
                    continue;
                }
                pending.remove(idx);
                states.insert(step.name.clone(), StepState::Running);
                log::debug!("Starting step '{}' ({})", step.name, step.id);
                self.reporter.step_started(&step.name);
                running.push(self.run_step(definition, step).map(move |result| (step, result)));
            }

            let Some((step, result)) = running.next().await else {
                break;
            };
            match result {
                Ok(cached) => {
                    finished += 1;
                    states.insert(step.name.clone(), StepState::Completed { cached });
                    self.reporter.step_finished(&step.name, cached, finished, total);
                }
                Err(source) => {
                    states.insert(step.name.clone(), StepState::Failed);
                    log::error!("Step '{}' failed: {:#}", step.name, source);
                    self.reporter
                        .done(false, Some(&format!("Step '{}' failed", step.name)));
                    return Err(Error::StepFailed {
                        step: step.name.clone(),
                        source,
                    }
                    .into());
                }
            }
        }

        if !pending.is_empty() {
            let stuck: Vec<&str> = pending.iter().map(|s| s.name.as_str()).collect();
            anyhow::bail!("Steps could never become ready: {}", stuck.join(", "));
        }

        self.reporter.done(true, Some(&format!("Pipeline {} complete", definition.key())));
        Ok(PipelineRun {
            output: ArtifactHandle {
                step: final_step.name.clone(),
                path: final_step.output.clone(),
            },
            states,
        })
    }

    /// Returns `true` when the step's previous output was reused.
    async fn run_step(&self, definition: &PipelineDefinition, step: &PipelineStep) -> Result<bool> {
        let ctx = StepContext {
            step,
            definition,
            cache: &self.cache,
            options: &self.options,
        };
        if step.shared {
            return ops::execute_shared(&ctx).await;
        }

        let step_dir = ctx.step_dir();
        let fingerprint_path = step_dir.join(FINGERPRINT_FILE);
        let fingerprint = {
            let step = step.clone();
            blocking(move || fingerprint(&step)).await?
        };

        if step.output.exists() {
            if let Ok(previous) = tokio::fs::read_to_string(&fingerprint_path).await {
                if previous.trim() == fingerprint {
                    log::debug!("Step '{}' is up to date", step.name);
                    return Ok(true);
                }
            }
        }

        tokio::fs::create_dir_all(&step_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", step_dir))?;
        if fingerprint_path.exists() {
            tokio::fs::remove_file(&fingerprint_path).await?;
        }

        ops::execute(&ctx).await?;

        if !step.output.exists() {
            anyhow::bail!("Step '{}' did not produce {:?}", step.name, step.output);
        }
        write_atomically(&fingerprint_path, |file| {
            use std::io::Write;
            file.write_all(fingerprint.as_bytes())?;
            Ok(())
        })?;
        Ok(false)
    }
}

fn hash_input(hasher: &mut Sha1, path: &Path) -> Result<()> {
    if path.exists() {
        hasher.update(calculate_tree_sha1(path)?.as_bytes());
    }
    Ok(())
}

/// SHA-1 over the step's name, operation, rendered arguments and the
/// content of every input file or directory.
pub fn fingerprint(step: &PipelineStep) -> Result<String> {
    let mut hasher = Sha1::new();
    hasher.update(step.name.as_bytes());
    hasher.update(serde_json::to_vec(&step.operation)?);

    for (key, arg) in &step.args {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(arg.render().as_bytes());
        for path in arg.paths() {
            hash_input(&mut hasher, &path)
                .with_context(|| format!("Failed to hash input {:?} of step '{}'", path, step.name))?;
        }
    }
    if let Operation::Provided { path } = &step.operation {
        hash_input(&mut hasher, path)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}
