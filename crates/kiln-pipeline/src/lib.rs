//! Pipeline orchestration engine.
//!
//! This crate implements the Kiln engine: per-kind helper registries with
//! conflict detection, dependency ordering, chain-of-responsibility helper
//! execution, a deduplicating diagnostics channel, and extension hooks with
//! commit/rollback around the builder phase.

pub mod diagnostics;
pub mod events;
pub mod executor;
pub mod extension;
pub mod graph;
pub mod helper;
pub mod host;
pub mod pipeline;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use diagnostics::{
    ensure_all_helpers_executed, Diagnostic, HelperExecutionSnapshot,
};
pub use events::{EventEmitter, PipelineEvent};
pub use executor::{execute_helpers, ArgsFactory, Next, StepRecorder};
pub use extension::{
    commit_extension_results, rollback_extension_results, run_extension_hooks, AppliedExtension,
    ExtensionHook, ExtensionHookEntry, ExtensionHookRun, ExtensionLifecycle, ExtensionRegistration,
    FnExtension, HookOptions, HookResult, PipelineExtension, RollbackErrorMetadata,
    RollbackErrorReport,
};
pub use graph::{build_dependency_graph, DependencyOrder};
pub use helper::{helper_id, Helper, HelperApply, HelperDescriptor, RegisteredHelper};
pub use host::{
    BuilderArgsInput, FinalizeInput, FragmentArgsInput, FragmentStateInput,
    PipelineExecutionMetadata, PipelineHost, PipelineStep, RunResult, RunState,
};
pub use pipeline::{
    AnyHelper, BuilderSurface, ExtensionSurface, FragmentSurface, Pipeline, PipelinePlan, RunPhase,
};
pub use registry::{HelperConflict, HelperRegistry};
