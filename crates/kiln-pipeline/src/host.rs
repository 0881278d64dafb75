//! The host seam: everything the engine asks of the embedding tool.
//!
//! A [`PipelineHost`] decides what a run's options, context, draft and
//! artifact are, and how helper arguments are built from them. The engine only
//! sequences calls into it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use kiln_types::{HelperKind, HelperMode, KilnError, PipelineContext, ReporterHandle, Result};

use crate::diagnostics::{Diagnostic, HelperExecutionSnapshot};
use crate::extension::RollbackErrorReport;
use crate::helper::{HelperDescriptor, RegisteredHelper};

// ---------------------------------------------------------------------------
// Run trace
// ---------------------------------------------------------------------------

/// One entry of the execution trace, recorded whenever a helper is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub id: String,
    pub index: usize,
    pub key: String,
    pub kind: HelperKind,
    pub mode: HelperMode,
    pub priority: i32,
    pub depends_on: Vec<String>,
    pub origin: Option<String>,
}

impl PipelineStep {
    /// `index` is the step's position in the run trace, across both phases.
    pub fn from_entry<A>(entry: &RegisteredHelper<A>, index: usize) -> Self {
        let d = entry.descriptor();
        Self {
            id: entry.id.clone(),
            index,
            key: d.key.clone(),
            kind: d.kind.clone(),
            mode: d.mode,
            priority: d.priority,
            depends_on: d.depends_on.clone(),
            origin: d.origin.clone(),
        }
    }
}

/// Per-kind execution snapshots for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineExecutionMetadata {
    pub fragments: HelperExecutionSnapshot,
    pub builders: HelperExecutionSnapshot,
}

// ---------------------------------------------------------------------------
// Factory inputs
// ---------------------------------------------------------------------------

pub struct FragmentStateInput<'a, H: PipelineHost + ?Sized> {
    pub options: &'a H::RunOptions,
    pub context: &'a H::Context,
    pub build_options: &'a H::BuildOptions,
}

/// Shared run state is handed out as `Arc`s so helper arguments can hold on
/// to it across the `next` continuation.
pub struct FragmentArgsInput<'a, H: PipelineHost + ?Sized> {
    pub helper: &'a HelperDescriptor,
    pub options: &'a Arc<H::RunOptions>,
    pub context: &'a Arc<H::Context>,
    pub build_options: &'a Arc<H::BuildOptions>,
    pub draft: &'a Arc<H::Draft>,
}

pub struct FinalizeInput<'a, H: PipelineHost + ?Sized> {
    pub draft: &'a Arc<H::Draft>,
    pub options: &'a H::RunOptions,
    pub context: &'a H::Context,
    pub build_options: &'a H::BuildOptions,
    pub helpers: &'a HelperExecutionSnapshot,
}

pub struct BuilderArgsInput<'a, H: PipelineHost + ?Sized> {
    pub helper: &'a HelperDescriptor,
    pub options: &'a Arc<H::RunOptions>,
    pub context: &'a Arc<H::Context>,
    pub build_options: &'a Arc<H::BuildOptions>,
    pub artifact: &'a H::Artifact,
}

/// Everything a successful run produced, handed to [`PipelineHost::create_run_result`].
pub struct RunState<H: PipelineHost + ?Sized> {
    pub artifact: H::Artifact,
    pub diagnostics: Vec<Diagnostic>,
    pub steps: Vec<PipelineStep>,
    pub context: Arc<H::Context>,
    pub build_options: Arc<H::BuildOptions>,
    pub options: Arc<H::RunOptions>,
    pub helpers: PipelineExecutionMetadata,
}

/// A ready-made run result for hosts that do not need their own.
#[derive(Debug, Clone)]
pub struct RunResult<A> {
    pub artifact: A,
    pub diagnostics: Vec<Diagnostic>,
    pub steps: Vec<PipelineStep>,
    pub helpers: PipelineExecutionMetadata,
}

impl<H> From<RunState<H>> for RunResult<H::Artifact>
where
    H: PipelineHost + ?Sized,
{
    fn from(state: RunState<H>) -> Self {
        Self {
            artifact: state.artifact,
            diagnostics: state.diagnostics,
            steps: state.steps,
            helpers: state.helpers,
        }
    }
}

impl<A> RunResult<A> {
    /// Keys of every step, in execution order.
    pub fn step_keys(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.key.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// PipelineHost
// ---------------------------------------------------------------------------

/// Factories and callbacks that adapt the engine to a concrete tool.
///
/// Required methods build per-run state; the rest have defaults that log
/// through the run context's reporter.
pub trait PipelineHost: Send + Sync + 'static {
    type RunOptions: Send + Sync + 'static;
    type BuildOptions: Send + Sync + 'static;
    type Context: PipelineContext + 'static;
    /// Mutable state built up by fragment helpers. Helpers receive it through
    /// an `Arc`, so it usually wraps its contents in a lock.
    type Draft: Send + Sync + 'static;
    type Artifact: Clone + Send + Sync + 'static;
    type FragmentArgs: Send + 'static;
    type BuilderArgs: Send + 'static;
    type RunResult: Send + 'static;

    fn fragment_kind(&self) -> HelperKind {
        HelperKind::fragment()
    }

    fn builder_kind(&self) -> HelperKind {
        HelperKind::builder()
    }

    fn create_build_options(&self, options: &Self::RunOptions) -> Result<Self::BuildOptions>;

    fn create_context(&self, options: &Self::RunOptions) -> Result<Self::Context>;

    fn create_fragment_state(
        &self,
        input: FragmentStateInput<'_, Self>,
    ) -> Result<Self::Draft>;

    fn create_fragment_args(
        &self,
        input: FragmentArgsInput<'_, Self>,
    ) -> Result<Self::FragmentArgs>;

    fn finalize_fragment_state(
        &self,
        input: FinalizeInput<'_, Self>,
    ) -> Result<Self::Artifact>;

    fn create_builder_args(
        &self,
        input: BuilderArgsInput<'_, Self>,
    ) -> Result<Self::BuilderArgs>;

    fn create_run_result(&self, state: RunState<Self>) -> Result<Self::RunResult>;

    fn create_error(&self, code: &str, message: &str) -> KilnError {
        KilnError::from_code(code, message)
    }

    fn create_conflict_diagnostic(
        &self,
        helper: &HelperDescriptor,
        existing: &HelperDescriptor,
        message: String,
    ) -> Diagnostic {
        Diagnostic::conflict(helper, existing, message)
    }

    fn create_missing_dependency_diagnostic(
        &self,
        helper: &HelperDescriptor,
        dependency: &str,
        message: String,
    ) -> Diagnostic {
        Diagnostic::missing_dependency(helper, dependency, message)
    }

    fn create_unused_helper_diagnostic(
        &self,
        helper: &HelperDescriptor,
        message: String,
    ) -> Diagnostic {
        Diagnostic::unused_helper(helper, message)
    }

    /// Called once per reporter for every diagnostic it has not seen.
    fn on_diagnostic(&self, reporter: &ReporterHandle, diagnostic: &Diagnostic) {
        let context = serde_json::to_value(diagnostic).ok();
        reporter.warn(diagnostic.message(), context.as_ref());
    }

    fn on_extension_rollback_error(&self, context: &Self::Context, report: &RollbackErrorReport) {
        context.reporter().warn(
            "Pipeline extension rollback failed.",
            Some(&json!({
                "error": report.error.to_string(),
                "extension": report.failed_extension,
                "extensions": report.extension_keys,
                "hookSequence": report.hook_sequence,
                "errorMetadata": report.error_metadata,
            })),
        );
    }
}
