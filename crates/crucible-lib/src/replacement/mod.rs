//! Dependency replacement: a memoized, first-match-wins handler chain that
//! swaps declared dependencies for artifacts produced by sub-pipelines and
//! published into the synthetic repository.
mod dependency;
mod engine;
pub mod handler;
pub mod obfuscated;

pub use dependency::{Configurations, Dependency};
pub use engine::{materialize_task_name, DependencyReplacementEngine, MaterializationTask};
pub use handler::{
    DependencyResolver, EntryConfigurator, ReplacementContext, ReplacementHandler, ReplacementResult,
    ResolvedDependency, ResolvedModule,
};
pub use obfuscated::ObfuscatedDependencyHandler;
