//! The versioned pipeline engine: templates are resolved into a
//! [`PipelineDefinition`] and run by the [`PipelineExecutor`].
pub mod config;
pub mod definition;
pub mod executor;
pub mod graph;
pub mod ops;
pub mod registry;
pub mod template;

pub use config::PipelineConfig;
pub use definition::{DefinitionKey, PipelineContext, PipelineDefinition, PipelineStep, ResolvedArg};
pub use executor::{ArtifactHandle, ExecutorOptions, PipelineExecutor, PipelineRun, StepState};
pub use registry::{DefinitionCache, TaskRegistry};
pub use template::{ArgValue, Operation, StepRef, StepTemplate, StripMode, ToolFunction};
