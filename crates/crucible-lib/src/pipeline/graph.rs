//! Turns step templates into a resolved, ordered [`PipelineDefinition`].
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use super::definition::{PipelineContext, PipelineDefinition, PipelineStep, ResolvedArg};
use super::template::{ArgValue, Operation, OutputKind, StepTemplate};
use crate::cache::{ArtifactKind, CacheSelector};
use crate::error::Error;

/// Step names that every pipeline of a session shares. Their outputs live
/// in the artifact cache rather than in a workspace.
const SHARED_STEPS: &[(&str, ArtifactKind)] = &[
    ("downloadManifest", ArtifactKind::Manifest),
    ("downloadJson", ArtifactKind::VersionJson),
    ("downloadClient", ArtifactKind::ClientJar),
    ("downloadServer", ArtifactKind::ServerJar),
    ("downloadClientMappings", ArtifactKind::ClientMappings),
    ("downloadServerMappings", ArtifactKind::ServerMappings),
];

pub fn shared_kind(step_name: &str) -> Option<ArtifactKind> {
    SHARED_STEPS
        .iter()
        .find(|(name, _)| *name == step_name)
        .map(|(_, kind)| *kind)
}

/// Identity of a shared step for `version`, e.g. `shared:downloadClient:1.19.2`.
pub fn shared_task_id(step_name: &str, version: &str) -> String {
    format!("shared:{}:{}", step_name, version)
}

fn canonical_operation(kind: ArtifactKind) -> Operation {
    match kind {
        ArtifactKind::Manifest => Operation::DownloadManifest,
        ArtifactKind::VersionJson => Operation::DownloadVersionJson,
        other => Operation::DownloadArtifact { kind: other },
    }
}

/// Build a definition from `templates`.
///
/// Every argument is resolved here; an unknown step or context key fails
/// with `UnresolvedStepReference` and a cycle with `CyclicStepDependency`.
/// The resulting order is topological with ties broken by declaration order.
pub fn build(templates: &[StepTemplate], context: &PipelineContext) -> Result<PipelineDefinition> {
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (idx, template) in templates.iter().enumerate() {
        if index_of.insert(template.name.as_str(), idx).is_some() {
            anyhow::bail!("Step '{}' is declared more than once", template.name);
        }
    }

    let outputs: Vec<(PathBuf, bool)> = templates
        .iter()
        .map(|t| output_location(t, context))
        .collect();

    let mut steps = Vec::with_capacity(templates.len());
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); templates.len()];

    for (idx, template) in templates.iter().enumerate() {
        let declared = template.effective_args();
        let mut args = BTreeMap::new();
        for (key, value) in &declared {
            let resolved = resolve_arg(value, template, context, &index_of, &outputs)?;
            args.insert(key.clone(), resolved);
        }

        let mut depends_on = Vec::new();
        for reference in declared.values().flat_map(|v| v.step_refs()) {
            let dep = index_of[reference.step.as_str()];
            if edges[idx].insert(dep) {
                depends_on.push(reference.step.clone());
            }
        }

        let shared = shared_kind(&template.name);
        let operation = match shared {
            Some(kind) => {
                let canonical = canonical_operation(kind);
                if canonical != template.operation {
                    log::debug!(
                        "Step '{}' is a shared download, using {:?}",
                        template.name,
                        canonical
                    );
                }
                canonical
            }
            None => template.operation.clone(),
        };

        let (output, output_is_dir) = outputs[idx].clone();
        steps.push(PipelineStep {
            name: template.name.clone(),
            id: match shared {
                Some(_) => shared_task_id(&template.name, &context.key.version),
                None => format!("{}:{}", context.key, template.name),
            },
            operation,
            args,
            output,
            output_is_dir,
            depends_on,
            shared: shared.is_some(),
        });
    }

    let order = topological_order(&edges, templates)?;
    let mut slots: Vec<Option<PipelineStep>> = steps.into_iter().map(Some).collect();
    let steps = order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect();

    Ok(PipelineDefinition {
        context: context.clone(),
        steps,
    })
}

fn output_location(template: &StepTemplate, context: &PipelineContext) -> (PathBuf, bool) {
    if let Some(kind) = shared_kind(&template.name) {
        let selector = CacheSelector::versioned(&context.key.version, kind);
        return (selector.path_in(&context.cache_root), false);
    }

    let dir = context.workspace.join("steps").join(&template.name);
    match template.output_kind() {
        OutputKind::Directory => (dir.join("output"), true),
        OutputKind::File { extension } => (dir.join(format!("output.{}", extension)), false),
    }
}

fn resolve_arg(
    value: &ArgValue,
    template: &StepTemplate,
    context: &PipelineContext,
    index_of: &HashMap<&str, usize>,
    outputs: &[(PathBuf, bool)],
) -> Result<ResolvedArg> {
    let unresolved = |reference: &str| -> anyhow::Error {
        Error::UnresolvedStepReference {
            step: template.name.clone(),
            reference: reference.to_string(),
        }
        .into()
    };

    Ok(match value {
        ArgValue::Literal(v) => ResolvedArg::Value(v.clone()),
        ArgValue::File(p) => ResolvedArg::File(p.clone()),
        ArgValue::Context(key) => {
            ResolvedArg::Value(context.lookup(key).ok_or_else(|| unresolved(key))?)
        }
        ArgValue::StepOutput(reference) => {
            let idx = *index_of
                .get(reference.step.as_str())
                .ok_or_else(|| unresolved(&format!("{}Output", reference.step)))?;
            ResolvedArg::StepOutput {
                step: reference.step.clone(),
                path: outputs[idx].0.clone(),
            }
        }
        ArgValue::List(items) => ResolvedArg::List(
            items
                .iter()
                .map(|item| resolve_arg(item, template, context, index_of, outputs))
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

/// Kahn's algorithm over declaration indices. `edges[i]` holds the steps
/// that step `i` depends on.
fn topological_order(edges: &[BTreeSet<usize>], templates: &[StepTemplate]) -> Result<Vec<usize>> {
    let mut in_degree: Vec<usize> = edges.iter().map(|deps| deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); edges.len()];
    for (idx, deps) in edges.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(idx);
        }
    }

    let mut ready: BTreeSet<usize> = (0..edges.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(edges.len());

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < edges.len() {
        let steps = (0..edges.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| templates[i].name.clone())
            .collect();
        return Err(Error::CyclicStepDependency { steps }.into());
    }

    Ok(order)
}
