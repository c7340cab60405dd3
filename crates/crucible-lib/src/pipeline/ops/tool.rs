use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

use super::StepContext;
use crate::cache::{ArtifactKind, CacheSelector, DownloadDescriptor};
use crate::pipeline::template::ToolFunction;
use crate::utils::process::run_captured;

/// Replace `{name}` placeholders using `lookup`. Unknown names are an error.
fn substitute(template: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        let value = lookup(name).with_context(|| format!("No value for '{{{}}}'", name))?;
        out.push_str(&rest[..start]);
        out.push_str(&value);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

pub(super) async fn run(ctx: &StepContext<'_>, function: &ToolFunction) -> Result<()> {
    let descriptor = DownloadDescriptor::new(function.jar.url_in(&function.repository), ArtifactKind::Library);
    let jar = ctx
        .cache
        .cached(&CacheSelector::maven(&function.jar), &descriptor)
        .await
        .with_context(|| format!("Failed to fetch tool {}", function.jar))?;

    let output = ctx.output();
    let step_dir = ctx.step_dir();
    tokio::fs::create_dir_all(&step_dir).await?;
    let log_path = step_dir.join("console.log");

    let lookup = |name: &str| -> Option<String> {
        match name {
            "output" => Some(output.to_string_lossy().to_string()),
            "log" => Some(log_path.to_string_lossy().to_string()),
            // every other placeholder was resolved into an argument when the graph was built
            _ => ctx.step.arg(name).map(|a| a.render()),
        }
    };

    let jvm_args = function
        .jvm_args
        .iter()
        .map(|a| substitute(a, &lookup))
        .collect::<Result<Vec<_>>>()?;
    let args = function
        .args
        .iter()
        .map(|a| substitute(a, &lookup))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to fill arguments of step '{}'", ctx.step.name))?;

    // tools write their output directly; clear a stale one from an earlier run
    if output.is_file() {
        tokio::fs::remove_file(&output).await?;
    }

    let mut command = Command::new(&ctx.options.java);
    command.args(&jvm_args).arg("-jar").arg(&jar).args(&args).current_dir(&step_dir);

    log::info!("Running {} for step '{}'", function.jar, ctx.step.name);
    let label = format!("tool {}", function.jar.name);
    let result = run_captured(&mut command, &label).await;
    let console = match &result {
        Ok(stdout) => stdout.clone(),
        Err(err) => format!("{:#}", err),
    };
    tokio::fs::write(&log_path, console)
        .await
        .with_context(|| format!("Failed to write {:?}", log_path))?;
    result?;

    ensure_output(&output, &ctx.step.name)
}

fn ensure_output(output: &Path, step: &str) -> Result<()> {
    if !output.exists() {
        anyhow::bail!("Tool for step '{}' did not produce {:?}", step, output);
    }
    Ok(())
}
