//! Extensions, lifecycle hooks, and the commit/rollback protocol.
//!
//! An extension registers helpers and, optionally, one hook bound to a
//! lifecycle point. Hooks may replace the artifact and hand back commit and
//! rollback finalizers. Commit runs only once the whole run has succeeded;
//! on failure every applied hook is rolled back in reverse order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use kiln_types::{KilnError, Result};

use crate::host::PipelineHost;
use crate::pipeline::Pipeline;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionLifecycle {
    /// After the fragment phase is finalized, before any builder runs.
    #[default]
    AfterFragments,
}

impl ExtensionLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionLifecycle::AfterFragments => "after-fragments",
        }
    }
}

impl fmt::Display for ExtensionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

pub struct HookOptions<H: PipelineHost> {
    pub context: Arc<H::Context>,
    pub options: Arc<H::BuildOptions>,
    pub artifact: H::Artifact,
    pub lifecycle: ExtensionLifecycle,
}

/// A deferred side effect, run at most once.
pub type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

fn finalizer<F, Fut>(f: F) -> Finalizer
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// What a hook hands back: an optional replacement artifact plus finalizers.
pub struct HookResult<A> {
    pub artifact: Option<A>,
    pub commit: Option<Finalizer>,
    pub rollback: Option<Finalizer>,
}

impl<A> Default for HookResult<A> {
    fn default() -> Self {
        Self {
            artifact: None,
            commit: None,
            rollback: None,
        }
    }
}

impl<A> HookResult<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: A) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn on_commit<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.commit = Some(finalizer(f));
        self
    }

    pub fn on_rollback<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.rollback = Some(finalizer(f));
        self
    }
}

impl<A> fmt::Debug for HookResult<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookResult")
            .field("artifact", &self.artifact.is_some())
            .field("commit", &self.commit.is_some())
            .field("rollback", &self.rollback.is_some())
            .finish()
    }
}

#[async_trait]
pub trait ExtensionHook<H: PipelineHost>: Send + Sync {
    /// `Ok(None)` means the hook applied nothing that needs finalizing.
    async fn run(&self, options: HookOptions<H>) -> Result<Option<HookResult<H::Artifact>>>;
}

struct HookFn<F>(F);

#[async_trait]
impl<H, F, Fut> ExtensionHook<H> for HookFn<F>
where
    H: PipelineHost,
    F: Fn(HookOptions<H>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HookResult<H::Artifact>>>> + Send + 'static,
{
    async fn run(&self, options: HookOptions<H>) -> Result<Option<HookResult<H::Artifact>>> {
        (self.0)(options).await
    }
}

/// What [`PipelineExtension::register`] may contribute besides helpers.
pub struct ExtensionRegistration<H: PipelineHost> {
    pub hook: Arc<dyn ExtensionHook<H>>,
    pub lifecycle: ExtensionLifecycle,
}

impl<H: PipelineHost> ExtensionRegistration<H> {
    pub fn new(hook: impl ExtensionHook<H> + 'static) -> Self {
        Self {
            hook: Arc::new(hook),
            lifecycle: ExtensionLifecycle::default(),
        }
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(HookOptions<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<HookResult<H::Artifact>>>> + Send + 'static,
    {
        Self::new(HookFn(f))
    }

    pub fn with_lifecycle(mut self, lifecycle: ExtensionLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }
}

/// A hook bound to a lifecycle point, tagged with the extension that contributed it.
pub struct ExtensionHookEntry<H: PipelineHost> {
    pub extension_key: String,
    pub lifecycle: ExtensionLifecycle,
    pub hook: Arc<dyn ExtensionHook<H>>,
}

impl<H: PipelineHost> Clone for ExtensionHookEntry<H> {
    fn clone(&self) -> Self {
        Self {
            extension_key: self.extension_key.clone(),
            lifecycle: self.lifecycle,
            hook: Arc::clone(&self.hook),
        }
    }
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

/// A bundle of helpers and an optional lifecycle hook, registered as one unit.
#[async_trait]
pub trait PipelineExtension<H: PipelineHost>: Send + Sync {
    /// Label used in rollback reports. Unnamed extensions get
    /// `pipeline.extension#<n>`, counting from 1.
    fn key(&self) -> Option<String> {
        None
    }

    async fn register(&self, pipeline: &Pipeline<H>) -> Result<Option<ExtensionRegistration<H>>>;
}

/// An extension built from a closure that receives a handle to the pipeline.
pub struct FnExtension<F> {
    key: Option<String>,
    register: F,
}

impl<F> FnExtension<F> {
    pub fn new<H, Fut>(register: F) -> Self
    where
        H: PipelineHost,
        F: Fn(Pipeline<H>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<ExtensionRegistration<H>>>> + Send + 'static,
    {
        Self {
            key: None,
            register,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[async_trait]
impl<H, F, Fut> PipelineExtension<H> for FnExtension<F>
where
    H: PipelineHost,
    F: Fn(Pipeline<H>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<ExtensionRegistration<H>>>> + Send + 'static,
{
    fn key(&self) -> Option<String> {
        self.key.clone()
    }

    async fn register(&self, pipeline: &Pipeline<H>) -> Result<Option<ExtensionRegistration<H>>> {
        (self.register)(pipeline.clone()).await
    }
}

// ---------------------------------------------------------------------------
// Running, committing and rolling back
// ---------------------------------------------------------------------------

/// Finalizers of one hook that applied successfully.
pub struct AppliedExtension {
    pub extension_key: String,
    pub commit: Option<Finalizer>,
    pub rollback: Option<Finalizer>,
}

impl fmt::Debug for AppliedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppliedExtension")
            .field("extension_key", &self.extension_key)
            .field("commit", &self.commit.is_some())
            .field("rollback", &self.rollback.is_some())
            .finish()
    }
}

/// Output of [`run_extension_hooks`].
#[derive(Debug)]
pub struct ExtensionHookRun<A> {
    pub artifact: A,
    pub results: Vec<AppliedExtension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackErrorMetadata {
    pub name: String,
    pub message: String,
}

/// A rollback finalizer failed. Reported, never returned.
#[derive(Debug)]
pub struct RollbackErrorReport {
    pub error: KilnError,
    /// The extension whose rollback failed.
    pub failed_extension: String,
    /// Every extension with a hook at this lifecycle point.
    pub extension_keys: Vec<String>,
    /// Extensions whose hooks had applied, in application order.
    pub hook_sequence: Vec<String>,
    pub error_metadata: RollbackErrorMetadata,
}

/// Run every hook bound to `lifecycle`, in registration order.
///
/// Each hook sees the artifact as left by the previous one. If a hook fails,
/// the hooks that already applied are rolled back before the error is returned.
pub async fn run_extension_hooks<H, R>(
    hooks: &[ExtensionHookEntry<H>],
    lifecycle: ExtensionLifecycle,
    context: &Arc<H::Context>,
    build_options: &Arc<H::BuildOptions>,
    artifact: H::Artifact,
    on_rollback_error: R,
) -> Result<ExtensionHookRun<H::Artifact>>
where
    H: PipelineHost,
    R: Fn(&RollbackErrorReport) + Send + Sync,
{
    let bound: Vec<&ExtensionHookEntry<H>> =
        hooks.iter().filter(|e| e.lifecycle == lifecycle).collect();
    let extension_keys: Vec<String> = bound.iter().map(|e| e.extension_key.clone()).collect();

    let mut artifact = artifact;
    let mut results = Vec::new();

    for entry in bound {
        tracing::debug!(extension = %entry.extension_key, %lifecycle, "Running extension hook");
        let options = HookOptions {
            context: Arc::clone(context),
            options: Arc::clone(build_options),
            artifact: artifact.clone(),
            lifecycle,
        };

        match entry.hook.run(options).await {
            Ok(None) => {}
            Ok(Some(result)) => {
                if let Some(replacement) = result.artifact {
                    artifact = replacement;
                }
                results.push(AppliedExtension {
                    extension_key: entry.extension_key.clone(),
                    commit: result.commit,
                    rollback: result.rollback,
                });
            }
            Err(error) => {
                tracing::warn!(extension = %entry.extension_key, %error, "Extension hook failed");
                rollback_extension_results(results, &extension_keys, &on_rollback_error).await;
                return Err(error);
            }
        }
    }

    Ok(ExtensionHookRun { artifact, results })
}

/// Run every pending commit finalizer in application order; stops at the first failure.
pub async fn commit_extension_results(results: &mut [AppliedExtension]) -> Result<()> {
    for result in results.iter_mut() {
        if let Some(commit) = result.commit.take() {
            tracing::debug!(extension = %result.extension_key, "Committing extension");
            commit().await?;
        }
    }
    Ok(())
}

/// Run every rollback finalizer in reverse application order.
///
/// Failures are handed to `on_error` and do not stop the remaining rollbacks.
/// Returns how many finalizers ran.
pub async fn rollback_extension_results<R>(
    results: Vec<AppliedExtension>,
    extension_keys: &[String],
    on_error: &R,
) -> usize
where
    R: Fn(&RollbackErrorReport) + Send + Sync,
{
    let hook_sequence: Vec<String> = results.iter().map(|r| r.extension_key.clone()).collect();
    let mut ran = 0;

    for result in results.into_iter().rev() {
        let Some(rollback) = result.rollback else {
            continue;
        };
        ran += 1;
        if let Err(error) = rollback().await {
            tracing::warn!(extension = %result.extension_key, %error, "Extension rollback failed");
            let error_metadata = RollbackErrorMetadata {
                name: error.name().to_string(),
                message: error.to_string(),
            };
            on_error(&RollbackErrorReport {
                error,
                failed_extension: result.extension_key,
                extension_keys: extension_keys.to_vec(),
                hook_sequence: hook_sequence.clone(),
                error_metadata,
            });
        }
    }

    ran
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestContext, TestHost};
    use parking_lot::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn entry(key: &str, registration: ExtensionRegistration<TestHost>) -> ExtensionHookEntry<TestHost> {
        ExtensionHookEntry {
            extension_key: key.to_string(),
            lifecycle: registration.lifecycle,
            hook: registration.hook,
        }
    }

    /// A hook that appends `tag` to the artifact and journals its finalizers.
    fn tagging(key: &'static str, journal: &Journal) -> ExtensionHookEntry<TestHost> {
        let journal = Arc::clone(journal);
        entry(
            key,
            ExtensionRegistration::from_fn(move |options: HookOptions<TestHost>| {
                let journal = Arc::clone(&journal);
                async move {
                    let mut artifact = options.artifact;
                    artifact.push(key.to_string());
                    let on_commit = Arc::clone(&journal);
                    let on_rollback = Arc::clone(&journal);
                    Ok(Some(
                        HookResult::new()
                            .with_artifact(artifact)
                            .on_commit(move || async move {
                                on_commit.lock().push(format!("commit:{key}"));
                                Ok(())
                            })
                            .on_rollback(move || async move {
                                on_rollback.lock().push(format!("rollback:{key}"));
                                Ok(())
                            }),
                    ))
                }
            }),
        )
    }

    fn failing(key: &str) -> ExtensionHookEntry<TestHost> {
        let message = format!("{key} exploded");
        entry(
            key,
            ExtensionRegistration::from_fn(move |_options: HookOptions<TestHost>| {
                let message = message.clone();
                async move { Err(KilnError::Other(message)) }
            }),
        )
    }

    fn context() -> Arc<TestContext> {
        Arc::new(TestContext::default())
    }

    #[test]
    fn lifecycle_uses_kebab_case() {
        assert_eq!(ExtensionLifecycle::AfterFragments.to_string(), "after-fragments");
        let json = serde_json::to_string(&ExtensionLifecycle::AfterFragments).unwrap();
        assert_eq!(json, "\"after-fragments\"");
    }

    #[tokio::test]
    async fn hooks_chain_artifacts_in_registration_order() {
        let journal: Journal = Arc::default();
        let hooks = vec![tagging("one", &journal), tagging("two", &journal)];

        let run = run_extension_hooks(
            &hooks,
            ExtensionLifecycle::AfterFragments,
            &context(),
            &Arc::default(),
            vec!["base".to_string()],
            |_: &RollbackErrorReport| {},
        )
        .await
        .unwrap();

        assert_eq!(run.artifact, vec!["base", "one", "two"]);
        assert_eq!(run.results.len(), 2);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn hook_returning_none_contributes_no_result() {
        let hooks = vec![entry(
            "quiet",
            ExtensionRegistration::from_fn(|_options: HookOptions<TestHost>| async { Ok(None) }),
        )];

        let run = run_extension_hooks(
            &hooks,
            ExtensionLifecycle::AfterFragments,
            &context(),
            &Arc::default(),
            vec![],
            |_: &RollbackErrorReport| {},
        )
        .await
        .unwrap();

        assert!(run.results.is_empty());
    }

    #[tokio::test]
    async fn failing_hook_rolls_back_applied_hooks_in_reverse() {
        let journal: Journal = Arc::default();
        let hooks = vec![
            tagging("one", &journal),
            tagging("two", &journal),
            failing("three"),
            tagging("four", &journal),
        ];

        let err = run_extension_hooks(
            &hooks,
            ExtensionLifecycle::AfterFragments,
            &context(),
            &Arc::default(),
            vec![],
            |_: &RollbackErrorReport| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "three exploded");
        assert_eq!(*journal.lock(), vec!["rollback:two", "rollback:one"]);
    }

    #[tokio::test]
    async fn commit_runs_in_order_and_only_once() {
        let journal: Journal = Arc::default();
        let hooks = vec![tagging("one", &journal), tagging("two", &journal)];
        let mut run = run_extension_hooks(
            &hooks,
            ExtensionLifecycle::AfterFragments,
            &context(),
            &Arc::default(),
            vec![],
            |_: &RollbackErrorReport| {},
        )
        .await
        .unwrap();

        commit_extension_results(&mut run.results).await.unwrap();
        commit_extension_results(&mut run.results).await.unwrap();

        assert_eq!(*journal.lock(), vec!["commit:one", "commit:two"]);
    }

    #[tokio::test]
    async fn rollback_errors_are_reported_and_do_not_stop_rollback() {
        let journal: Journal = Arc::default();
        let reports: Arc<Mutex<Vec<(String, Vec<String>, String)>>> = Arc::default();

        let results = vec![
            AppliedExtension {
                extension_key: "first".into(),
                commit: None,
                rollback: Some({
                    let journal = Arc::clone(&journal);
                    finalizer(move || async move {
                        journal.lock().push("rollback:first".into());
                        Ok(())
                    })
                }),
            },
            AppliedExtension {
                extension_key: "second".into(),
                commit: None,
                rollback: Some(finalizer(|| async {
                    Err(KilnError::from_code("RollbackError", "cannot undo"))
                })),
            },
        ];

        let sink = Arc::clone(&reports);
        let ran = rollback_extension_results(
            results,
            &["first".to_string(), "second".to_string()],
            &move |report: &RollbackErrorReport| {
                sink.lock().push((
                    report.failed_extension.clone(),
                    report.hook_sequence.clone(),
                    report.error_metadata.name.clone(),
                ));
            },
        )
        .await;

        assert_eq!(ran, 2);
        assert_eq!(*journal.lock(), vec!["rollback:first"]);
        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "second");
        assert_eq!(reports[0].1, vec!["first", "second"]);
        assert_eq!(reports[0].2, "RollbackError");
    }

    #[test]
    fn hook_result_debug_shows_presence_only() {
        let result: HookResult<Vec<String>> = HookResult::new().on_commit(|| async { Ok(()) });
        let debug = format!("{result:?}");
        assert!(debug.contains("commit: true"));
        assert!(debug.contains("rollback: false"));
    }
}
