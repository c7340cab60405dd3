use anyhow::{Context, Result};

use super::StepContext;
use crate::cache::{ArtifactKind, CacheSelector, DownloadDescriptor};
use crate::models::manifest::{VersionJson, VersionManifest};
use crate::pipeline::template::Operation;
use crate::utils::fs::copy_atomically;

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Work out what a download step fetches and which cache slot it fills.
async fn describe(ctx: &StepContext<'_>) -> Result<(CacheSelector, DownloadDescriptor)> {
    let version = ctx.definition.key().version.as_str();
    let side = ctx.definition.key().side;

    match &ctx.step.operation {
        Operation::DownloadManifest => Ok((
            CacheSelector::launcher_manifest(),
            DownloadDescriptor::new(ctx.options.manifest_url.clone(), ArtifactKind::Manifest),
        )),
        Operation::DownloadVersionJson => {
            let manifest: VersionManifest = read_json(&ctx.path("manifest")?).await?;
            let entry = manifest
                .find(version)
                .with_context(|| format!("Version {} not found in the version manifest", version))?;
            Ok((
                CacheSelector::version_json(version),
                DownloadDescriptor::new(entry.url.clone(), ArtifactKind::VersionJson)
                    .with_sha1(entry.sha1.clone())
                    .with_version(version),
            ))
        }
        Operation::DownloadArtifact { kind } => {
            let json: VersionJson = read_json(&ctx.path("json")?).await?;
            let info = json
                .download(*kind)
                .with_context(|| format!("Version {} has no {:?} download", version, kind))?;
            Ok((
                CacheSelector::versioned(version, *kind),
                DownloadDescriptor::new(info.url.clone(), *kind)
                    .with_sha1(info.sha1.clone())
                    .with_version(version)
                    .with_side(side),
            ))
        }
        other => anyhow::bail!("{} is not a download operation", other.name()),
    }
}

/// A download step with its own workspace output.
pub(super) async fn run(ctx: &StepContext<'_>) -> Result<()> {
    let (_, descriptor) = describe(ctx).await?;
    ctx.cache.download(&descriptor, &ctx.step.output).await?;
    Ok(())
}

pub(super) async fn run_shared(ctx: &StepContext<'_>) -> Result<bool> {
    let (selector, descriptor) = describe(ctx).await?;
    let reused = ctx.cache.is_memoized(&selector);
    let path = ctx.cache.cached(&selector, &descriptor).await?;
    if path != ctx.step.output {
        copy_atomically(&path, &ctx.step.output)?;
    }
    Ok(reused)
}
