//! The pipeline orchestrator.
//!
//! A [`Pipeline`] owns the helper registries, extension hooks and diagnostic
//! history for its whole lifetime. Every [`Pipeline::run`] derives fresh
//! context, draft and dependency orders, then walks the phases:
//!
//! ```text
//! awaiting-registrations -> building-context -> running-fragments
//!   -> finalizing-fragment-state -> running-extension-hooks
//!   -> running-builders -> committing -> done
//! ```
//!
//! A failure in the hook, builder or commit phases rolls back the applied
//! extension results and returns the original error.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use kiln_types::{HelperKind, KilnError, PipelineContext, ReporterHandle, Result, VALIDATION_ERROR_CODE};

use crate::diagnostics::{
    ensure_all_helpers_executed, missing_dependency_message, unused_helper_message, Diagnostic,
    DiagnosticManager, HelperExecutionSnapshot,
};
use crate::events::{EventEmitter, PipelineEvent};
use crate::executor::{execute_helpers, ArgsFactory, StepRecorder};
use crate::extension::{
    commit_extension_results, rollback_extension_results, run_extension_hooks,
    ExtensionHookEntry, ExtensionHookRun, ExtensionLifecycle, PipelineExtension,
    RollbackErrorReport,
};
use crate::graph::build_dependency_graph;
use crate::helper::{Helper, RegisteredHelper};
use crate::host::{
    BuilderArgsInput, FinalizeInput, FragmentArgsInput, FragmentStateInput, PipelineExecutionMetadata,
    PipelineHost, PipelineStep, RunState,
};
use crate::registry::{HelperConflict, HelperRegistry};

// ---------------------------------------------------------------------------
// RunPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    #[default]
    Idle,
    AwaitingRegistrations,
    BuildingContext,
    RunningFragments,
    FinalizingFragmentState,
    RunningExtensionHooks,
    RunningBuilders,
    Committing,
    RollingBack,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::AwaitingRegistrations => "awaiting-registrations",
            RunPhase::BuildingContext => "building-context",
            RunPhase::RunningFragments => "running-fragments",
            RunPhase::FinalizingFragmentState => "finalizing-fragment-state",
            RunPhase::RunningExtensionHooks => "running-extension-hooks",
            RunPhase::RunningBuilders => "running-builders",
            RunPhase::Committing => "committing",
            RunPhase::RollingBack => "rolling-back",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Resolved execution order per kind, without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub fragments: Vec<String>,
    pub builders: Vec<String>,
    /// Keys of helpers of either kind that could not be ordered.
    pub unresolved: Vec<String>,
}

// ---------------------------------------------------------------------------
// AnyHelper
// ---------------------------------------------------------------------------

/// A helper of either phase, for the generic [`Pipeline::use_helper`] entry point.
pub enum AnyHelper<H: PipelineHost> {
    Fragment(Helper<H::FragmentArgs>),
    Builder(Helper<H::BuilderArgs>),
}

impl<H: PipelineHost> AnyHelper<H> {
    pub fn kind(&self) -> &HelperKind {
        match self {
            AnyHelper::Fragment(helper) => helper.kind(),
            AnyHelper::Builder(helper) => helper.kind(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            AnyHelper::Fragment(helper) => helper.key(),
            AnyHelper::Builder(helper) => helper.key(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct Registry<H: PipelineHost> {
    fragments: HelperRegistry<H::FragmentArgs>,
    builders: HelperRegistry<H::BuilderArgs>,
    hooks: Vec<ExtensionHookEntry<H>>,
}

struct Shared<H: PipelineHost> {
    host: Arc<H>,
    registry: Mutex<Registry<H>>,
    diagnostics: Mutex<DiagnosticManager>,
    pending: Mutex<Vec<BoxFuture<'static, Result<()>>>>,
    phase: Mutex<RunPhase>,
    runs: AtomicU64,
    events: EventEmitter,
}

/// Handle to a pipeline. Clones share the same registries and history.
pub struct Pipeline<H: PipelineHost> {
    shared: Arc<Shared<H>>,
}

impl<H: PipelineHost> Clone for Pipeline<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: PipelineHost> Pipeline<H> {
    pub fn new(host: H) -> Self {
        let registry = Registry {
            fragments: HelperRegistry::new(host.fragment_kind()),
            builders: HelperRegistry::new(host.builder_kind()),
            hooks: Vec::new(),
        };
        Self {
            shared: Arc::new(Shared {
                host: Arc::new(host),
                registry: Mutex::new(registry),
                diagnostics: Mutex::new(DiagnosticManager::default()),
                pending: Mutex::new(Vec::new()),
                phase: Mutex::new(RunPhase::Idle),
                runs: AtomicU64::new(0),
                events: EventEmitter::default(),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.shared.host
    }

    /// Registration surface for fragment helpers.
    pub fn ir(&self) -> FragmentSurface<'_, H> {
        FragmentSurface { pipeline: self }
    }

    /// Registration surface for builder helpers.
    pub fn builders(&self) -> BuilderSurface<'_, H> {
        BuilderSurface { pipeline: self }
    }

    pub fn extensions(&self) -> ExtensionSurface<'_, H> {
        ExtensionSurface { pipeline: self }
    }

    /// Register a helper of either kind.
    ///
    /// Fails with a `ValidationError` when the helper's kind is neither the
    /// host's fragment kind nor its builder kind.
    pub fn use_helper(&self, helper: AnyHelper<H>) -> Result<()> {
        let host = &self.shared.host;
        let kind = helper.kind();
        if *kind != host.fragment_kind() && *kind != host.builder_kind() {
            return Err(host.create_error(
                VALIDATION_ERROR_CODE,
                &format!("Unsupported helper kind \"{kind}\"."),
            ));
        }
        match helper {
            AnyHelper::Fragment(helper) => self.ir().use_helper(helper),
            AnyHelper::Builder(helper) => self.builders().use_helper(helper),
        }
    }

    /// Every diagnostic recorded so far, oldest first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.shared.diagnostics.lock().history().to_vec()
    }

    /// The phase the most recent run reached.
    pub fn phase(&self) -> RunPhase {
        *self.shared.phase.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Resolve both dependency orders without running any helper.
    ///
    /// Pending extension registrations are awaited first; missing dependencies
    /// are recorded as diagnostics exactly as a run would.
    pub async fn plan(&self) -> Result<PipelinePlan> {
        self.await_pending_registrations().await?;
        let (fragment_entries, builder_entries, _) = self.snapshot_registry();

        let (fragments, mut unresolved) = self.resolve_order(&fragment_entries);
        let (builders, unresolved_builders) = self.resolve_order(&builder_entries);
        unresolved.extend(unresolved_builders);

        Ok(PipelinePlan {
            fragments: fragments.iter().map(|e| e.key().to_string()).collect(),
            builders: builders.iter().map(|e| e.key().to_string()).collect(),
            unresolved,
        })
    }

    /// Run the pipeline once.
    ///
    /// Errors from helpers, hooks, commits and host factories are returned
    /// unchanged, after any applied extension results have been rolled back.
    pub async fn run(&self, options: H::RunOptions) -> Result<H::RunResult> {
        let run = self.shared.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let (fragments, builders, hooks) = {
            let registry = self.shared.registry.lock();
            (
                registry.fragments.len(),
                registry.builders.len(),
                registry.hooks.len(),
            )
        };
        self.shared.events.emit(PipelineEvent::RunStarted {
            run,
            fragments,
            builders,
            hooks,
        });

        let outcome = self.execute_run(run, options).await;
        self.shared.diagnostics.lock().unbind_reporter();

        match outcome {
            Ok((result, steps)) => {
                self.enter(run, RunPhase::Done);
                let duration_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(run, steps, duration_ms, "Pipeline run completed");
                self.shared.events.emit(PipelineEvent::RunCompleted {
                    run,
                    steps,
                    duration_ms,
                });
                Ok(result)
            }
            Err(error) => {
                self.enter(run, RunPhase::Failed);
                tracing::warn!(run, %error, "Pipeline run failed");
                self.shared.events.emit(PipelineEvent::RunFailed {
                    run,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn execute_run(&self, run: u64, options: H::RunOptions) -> Result<(H::RunResult, usize)> {
        let host = Arc::clone(&self.shared.host);

        self.enter(run, RunPhase::AwaitingRegistrations);
        self.await_pending_registrations().await?;

        self.enter(run, RunPhase::BuildingContext);
        let options = Arc::new(options);
        let build_options = Arc::new(host.create_build_options(&options)?);
        let context = Arc::new(host.create_context(&options)?);
        self.bind_reporter(context.reporter().clone());
        let draft = Arc::new(host.create_fragment_state(FragmentStateInput {
            options: &*options,
            context: &*context,
            build_options: &*build_options,
        })?);

        let (fragment_entries, builder_entries, hooks) = self.snapshot_registry();
        let steps: Arc<Mutex<Vec<PipelineStep>>> = Arc::default();

        // Fragments
        let (fragment_order, _) = self.resolve_order(&fragment_entries);
        self.enter(run, RunPhase::RunningFragments);
        let fragment_args: ArgsFactory<H::FragmentArgs> = {
            let host = Arc::clone(&host);
            let options = Arc::clone(&options);
            let context = Arc::clone(&context);
            let build_options = Arc::clone(&build_options);
            let draft = Arc::clone(&draft);
            Arc::new(move |entry: &RegisteredHelper<H::FragmentArgs>| {
                host.create_fragment_args(FragmentArgsInput {
                    helper: entry.descriptor(),
                    options: &options,
                    context: &context,
                    build_options: &build_options,
                    draft: &draft,
                })
            })
        };
        let visited =
            execute_helpers(fragment_order, fragment_args, self.step_recorder(run, &steps)).await?;
        let fragment_snapshot =
            self.close_phase(&host.fragment_kind(), &fragment_entries, &visited, &steps)?;

        self.enter(run, RunPhase::FinalizingFragmentState);
        let artifact = host.finalize_fragment_state(FinalizeInput {
            draft: &draft,
            options: &*options,
            context: &*context,
            build_options: &*build_options,
            helpers: &fragment_snapshot,
        })?;

        let (builder_order, _) = self.resolve_order(&builder_entries);

        // Extension hooks
        self.enter(run, RunPhase::RunningExtensionHooks);
        let lifecycle = ExtensionLifecycle::AfterFragments;
        let extension_keys: Vec<String> = hooks
            .iter()
            .filter(|e| e.lifecycle == lifecycle)
            .map(|e| e.extension_key.clone())
            .collect();
        let on_rollback_error = {
            let host = Arc::clone(&host);
            let context = Arc::clone(&context);
            move |report: &RollbackErrorReport| host.on_extension_rollback_error(&context, report)
        };

        let hook_run = run_extension_hooks(
            &hooks,
            lifecycle,
            &context,
            &build_options,
            artifact,
            &on_rollback_error,
        )
        .await;
        let ExtensionHookRun {
            artifact,
            mut results,
        } = match hook_run {
            Ok(hook_run) => hook_run,
            Err(error) => {
                if !extension_keys.is_empty() {
                    self.shared.events.emit(PipelineEvent::ExtensionsRolledBack {
                        run,
                        extensions: extension_keys,
                    });
                }
                return Err(error);
            }
        };
        let applied: Vec<String> = results.iter().map(|r| r.extension_key.clone()).collect();
        self.shared.events.emit(PipelineEvent::ExtensionHooksApplied {
            run,
            lifecycle,
            extensions: applied.clone(),
        });

        // Builders, then commit. Both sit inside the rollback scope.
        self.enter(run, RunPhase::RunningBuilders);
        let builder_args: ArgsFactory<H::BuilderArgs> = {
            let host = Arc::clone(&host);
            let options = Arc::clone(&options);
            let context = Arc::clone(&context);
            let build_options = Arc::clone(&build_options);
            let artifact = artifact.clone();
            Arc::new(move |entry: &RegisteredHelper<H::BuilderArgs>| {
                host.create_builder_args(BuilderArgsInput {
                    helper: entry.descriptor(),
                    options: &options,
                    context: &context,
                    build_options: &build_options,
                    artifact: &artifact,
                })
            })
        };
        let outcome = async {
            let visited =
                execute_helpers(builder_order, builder_args, self.step_recorder(run, &steps))
                    .await?;
            let snapshot =
                self.close_phase(&host.builder_kind(), &builder_entries, &visited, &steps)?;
            self.enter(run, RunPhase::Committing);
            commit_extension_results(&mut results).await?;
            Ok::<_, KilnError>(snapshot)
        }
        .await;

        let builder_snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.enter(run, RunPhase::RollingBack);
                rollback_extension_results(results, &extension_keys, &on_rollback_error).await;
                self.shared.events.emit(PipelineEvent::ExtensionsRolledBack {
                    run,
                    extensions: applied,
                });
                return Err(error);
            }
        };
        if !applied.is_empty() {
            self.shared.events.emit(PipelineEvent::ExtensionsCommitted {
                run,
                extensions: applied,
            });
        }

        let steps = std::mem::take(&mut *steps.lock());
        let step_count = steps.len();
        let result = host.create_run_result(RunState {
            artifact,
            diagnostics: self.diagnostics(),
            steps,
            context,
            build_options,
            options,
            helpers: PipelineExecutionMetadata {
                fragments: fragment_snapshot,
                builders: builder_snapshot,
            },
        })?;

        Ok((result, step_count))
    }

    // -- registration ------------------------------------------------------

    fn register_fragment(&self, helper: Helper<H::FragmentArgs>) -> Result<()> {
        let conflict = self
            .shared
            .registry
            .lock()
            .fragments
            .register(helper)
            .map_err(|e| self.host_error(e))?;
        self.report_conflict(conflict);
        Ok(())
    }

    fn register_builder(&self, helper: Helper<H::BuilderArgs>) -> Result<()> {
        let conflict = self
            .shared
            .registry
            .lock()
            .builders
            .register(helper)
            .map_err(|e| self.host_error(e))?;
        self.report_conflict(conflict);
        Ok(())
    }

    fn report_conflict(&self, conflict: Option<HelperConflict>) {
        if let Some(conflict) = conflict {
            let diagnostic = self.shared.host.create_conflict_diagnostic(
                &conflict.helper,
                &conflict.existing,
                conflict.message,
            );
            self.emit_diagnostic(diagnostic);
        }
    }

    async fn register_extension<E>(&self, extension: &E) -> Result<Option<String>>
    where
        E: PipelineExtension<H> + ?Sized,
    {
        let Some(registration) = extension.register(self).await? else {
            return Ok(None);
        };

        let mut registry = self.shared.registry.lock();
        let extension_key = extension
            .key()
            .unwrap_or_else(|| format!("pipeline.extension#{}", registry.hooks.len() + 1));
        tracing::debug!(
            extension = %extension_key,
            lifecycle = %registration.lifecycle,
            "Registered extension hook"
        );
        registry.hooks.push(ExtensionHookEntry {
            extension_key: extension_key.clone(),
            lifecycle: registration.lifecycle,
            hook: registration.hook,
        });
        Ok(Some(extension_key))
    }

    /// Settle every queued registration, in queue order, even after one fails.
    /// The first failure is returned once the queue is empty.
    async fn await_pending_registrations(&self) -> Result<()> {
        let mut first_error = None;
        // Registrations may queue further registrations, so drain until empty.
        loop {
            let batch = std::mem::take(&mut *self.shared.pending.lock());
            if batch.is_empty() {
                break;
            }
            for registration in batch {
                if let Err(error) = registration.await {
                    tracing::warn!(%error, "Extension registration failed");
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // -- run internals -----------------------------------------------------

    #[allow(clippy::type_complexity)]
    fn snapshot_registry(
        &self,
    ) -> (
        Vec<RegisteredHelper<H::FragmentArgs>>,
        Vec<RegisteredHelper<H::BuilderArgs>>,
        Vec<ExtensionHookEntry<H>>,
    ) {
        let registry = self.shared.registry.lock();
        (
            registry.fragments.entries().to_vec(),
            registry.builders.entries().to_vec(),
            registry.hooks.clone(),
        )
    }

    /// Order one kind's helpers, recording a diagnostic per missing dependency.
    /// Returns the order and the keys of helpers left out of it.
    fn resolve_order<A>(
        &self,
        entries: &[RegisteredHelper<A>],
    ) -> (Vec<RegisteredHelper<A>>, Vec<String>) {
        let mut missing = Vec::new();
        let resolved = build_dependency_graph(
            entries,
            |dependant, dependency| {
                missing.push((dependant.descriptor().clone(), dependency.to_string()))
            },
            |_| {},
        );

        for (helper, dependency) in missing {
            let message = missing_dependency_message(&helper, &dependency);
            let diagnostic = self
                .shared
                .host
                .create_missing_dependency_diagnostic(&helper, &dependency, message);
            self.emit_diagnostic(diagnostic);
        }

        let unresolved = resolved
            .unresolved
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        (resolved.order, unresolved)
    }

    /// Report unvisited helpers, enforce the required-helper rule, and snapshot the phase.
    fn close_phase<A>(
        &self,
        kind: &HelperKind,
        entries: &[RegisteredHelper<A>],
        visited: &HashSet<String>,
        steps: &Mutex<Vec<PipelineStep>>,
    ) -> Result<HelperExecutionSnapshot> {
        self.report_unused_helpers(entries, visited);
        ensure_all_helpers_executed(entries, visited, kind).map_err(|e| self.host_error(e))?;

        let executed: Vec<String> = steps
            .lock()
            .iter()
            .filter(|step| &step.kind == kind)
            .map(|step| step.id.clone())
            .collect();
        Ok(HelperExecutionSnapshot::build(kind, entries, &executed))
    }

    fn report_unused_helpers<A>(&self, entries: &[RegisteredHelper<A>], visited: &HashSet<String>) {
        for entry in entries.iter().filter(|e| !visited.contains(&e.id)) {
            let helper = entry.descriptor();
            let diagnostic = self
                .shared
                .host
                .create_unused_helper_diagnostic(helper, unused_helper_message(helper));
            self.emit_diagnostic(diagnostic);
        }
    }

    fn step_recorder<A: Send + 'static>(
        &self,
        run: u64,
        steps: &Arc<Mutex<Vec<PipelineStep>>>,
    ) -> StepRecorder<A> {
        let steps = Arc::clone(steps);
        let events = self.shared.events.clone();
        Arc::new(move |entry: &RegisteredHelper<A>| {
            let mut steps = steps.lock();
            let index = steps.len();
            steps.push(PipelineStep::from_entry(entry, index));
            drop(steps);
            events.emit(PipelineEvent::HelperStarted {
                run,
                id: entry.id.clone(),
                key: entry.key().to_string(),
                kind: entry.descriptor().kind.clone(),
            });
        })
    }

    fn enter(&self, run: u64, phase: RunPhase) {
        *self.shared.phase.lock() = phase;
        tracing::debug!(run, %phase, "Entering phase");
        self.shared
            .events
            .emit(PipelineEvent::PhaseEntered { run, phase });
    }

    // -- diagnostics -------------------------------------------------------

    fn emit_diagnostic(&self, diagnostic: Diagnostic) {
        let (is_new, delivery) = self.shared.diagnostics.lock().emit(diagnostic.clone());
        if is_new {
            tracing::debug!(
                kind = %diagnostic.kind(),
                key = %diagnostic.key(),
                diagnostic = diagnostic.type_name(),
                "Diagnostic recorded"
            );
            self.shared
                .events
                .emit(PipelineEvent::DiagnosticEmitted { diagnostic });
        }
        if let Some(delivery) = delivery {
            self.shared
                .host
                .on_diagnostic(&delivery.reporter, &delivery.diagnostic);
        }
    }

    fn bind_reporter(&self, reporter: ReporterHandle) {
        let backlog = self.shared.diagnostics.lock().bind_reporter(reporter);
        for delivery in backlog {
            self.shared
                .host
                .on_diagnostic(&delivery.reporter, &delivery.diagnostic);
        }
    }

    /// Route structural errors through the host's error factory.
    fn host_error(&self, error: KilnError) -> KilnError {
        match error {
            KilnError::ValidationError(message) => self
                .shared
                .host
                .create_error(VALIDATION_ERROR_CODE, &message),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Registration surfaces
// ---------------------------------------------------------------------------

pub struct FragmentSurface<'p, H: PipelineHost> {
    pipeline: &'p Pipeline<H>,
}

impl<H: PipelineHost> FragmentSurface<'_, H> {
    /// Fails with a `ValidationError` if the helper is not of the fragment kind.
    pub fn use_helper(&self, helper: Helper<H::FragmentArgs>) -> Result<()> {
        self.pipeline.register_fragment(helper)
    }

    pub fn keys(&self) -> Vec<String> {
        self.pipeline.shared.registry.lock().fragments.keys()
    }
}

pub struct BuilderSurface<'p, H: PipelineHost> {
    pipeline: &'p Pipeline<H>,
}

impl<H: PipelineHost> BuilderSurface<'_, H> {
    /// Fails with a `ValidationError` if the helper is not of the builder kind.
    pub fn use_helper(&self, helper: Helper<H::BuilderArgs>) -> Result<()> {
        self.pipeline.register_builder(helper)
    }

    pub fn keys(&self) -> Vec<String> {
        self.pipeline.shared.registry.lock().builders.keys()
    }
}

pub struct ExtensionSurface<'p, H: PipelineHost> {
    pipeline: &'p Pipeline<H>,
}

impl<H: PipelineHost> ExtensionSurface<'_, H> {
    /// Queue an extension; the next run (or plan) registers it before doing anything else.
    pub fn use_extension(&self, extension: impl PipelineExtension<H> + 'static) {
        let pipeline = self.pipeline.clone();
        let registration: BoxFuture<'static, Result<()>> = Box::pin(async move {
            pipeline.register_extension(&extension).await.map(|_| ())
        });
        self.pipeline.shared.pending.lock().push(registration);
    }

    /// Register an extension now. Returns the key its hook was filed under, if it has one.
    pub async fn register(&self, extension: impl PipelineExtension<H>) -> Result<Option<String>> {
        self.pipeline.register_extension(&extension).await
    }

    /// Number of queued registrations not yet awaited.
    pub fn pending(&self) -> usize {
        self.pipeline.shared.pending.lock().len()
    }

    /// Keys of every registered hook, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.pipeline
            .shared
            .registry
            .lock()
            .hooks
            .iter()
            .map(|e| e.extension_key.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
