use std::path::PathBuf;

/// Failures surfaced by the pipeline and dependency-replacement engines.
///
/// Plumbing code propagates `anyhow::Error`; these variants travel inside it
/// and can be recovered with `downcast_ref::<Error>()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid version format '{version}': {reason}")]
    InvalidVersionFormat { version: String, reason: String },

    #[error("Cache miss for '{selector}' (expected {path:?})")]
    CacheMiss { selector: String, path: PathBuf },

    #[error("Network error for {url}: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("Offline mode is enabled and {destination:?} is missing (source: {url})")]
    OfflineAndMissing { url: String, destination: PathBuf },

    #[error("SHA1 mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Dependency '{dependency}' is ambiguous: {reason}")]
    AmbiguousDependencyArtifact { dependency: String, reason: String },

    #[error("Step '{step}' rejected {rejected} patch hunk(s); rejects written to {rejects:?}")]
    PatchRejected {
        step: String,
        rejected: usize,
        rejects: PathBuf,
    },

    #[error("Step '{step}' references unknown '{reference}'")]
    UnresolvedStepReference { step: String, reference: String },

    #[error("Cyclic step dependency between: {}", steps.join(", "))]
    CyclicStepDependency { steps: Vec<String> },

    #[error("Task '{name}' is already registered")]
    DuplicateTaskRegistration { name: String },

    #[error("Step '{step}' failed")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Replacement handler '{handler}' failed for '{dependency}'")]
    HandlerFailed {
        handler: String,
        dependency: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn invalid_version(version: &str, reason: impl Into<String>) -> Self {
        Error::InvalidVersionFormat {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}
