//! Run event stream.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (progress printers, tests) can follow a run without
//! hooking into the engine.

use serde::{Deserialize, Serialize};

use kiln_types::HelperKind;

use crate::diagnostics::Diagnostic;
use crate::extension::ExtensionLifecycle;
use crate::pipeline::RunPhase;

/// Events emitted while a pipeline runs. `run` numbers runs of one pipeline from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run: u64,
        fragments: usize,
        builders: usize,
        hooks: usize,
    },
    PhaseEntered {
        run: u64,
        phase: RunPhase,
    },
    HelperStarted {
        run: u64,
        id: String,
        key: String,
        kind: HelperKind,
    },
    /// Emitted the first time a diagnostic is recorded, whether or not a run is in flight.
    DiagnosticEmitted {
        diagnostic: Diagnostic,
    },
    ExtensionHooksApplied {
        run: u64,
        lifecycle: ExtensionLifecycle,
        extensions: Vec<String>,
    },
    ExtensionsCommitted {
        run: u64,
        extensions: Vec<String>,
    },
    ExtensionsRolledBack {
        run: u64,
        extensions: Vec<String>,
    },
    RunCompleted {
        run: u64,
        steps: usize,
        duration_ms: u64,
    },
    RunFailed {
        run: u64,
        error: String,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{ExtensionRegistration, FnExtension, HookOptions, HookResult};
    use crate::helper::Helper;
    use crate::pipeline::Pipeline;
    use crate::test_support::{BuilderArgs, FragmentArgs, TestHost};
    use kiln_types::{KilnError, RecordingReporter};

    fn pipeline() -> Pipeline<TestHost> {
        Pipeline::new(TestHost::new(&RecordingReporter::new()))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn audit_extension() -> impl crate::extension::PipelineExtension<TestHost> + 'static {
        FnExtension::new(|_pipeline: Pipeline<TestHost>| async {
            Ok::<_, KilnError>(Some(ExtensionRegistration::from_fn(
                |_options: HookOptions<TestHost>| async {
                    Ok(Some(HookResult::new().on_commit(|| async { Ok(()) })))
                },
            )))
        })
        .with_key("audit")
    }

    #[tokio::test]
    async fn commit_is_announced_after_the_builders_ran() {
        let pipeline = pipeline();
        pipeline
            .builders()
            .use_helper(Helper::from_step(
                "out",
                HelperKind::builder(),
                |_: BuilderArgs| async { Ok(()) },
            ))
            .unwrap();
        pipeline.extensions().register(audit_extension()).await.unwrap();
        let mut rx = pipeline.subscribe();

        pipeline.run(None).await.unwrap();
        let events = drain(&mut rx);

        let position = |pred: &dyn Fn(&PipelineEvent) -> bool| events.iter().position(pred);
        let applied = position(&|e| {
            matches!(e, PipelineEvent::ExtensionHooksApplied { extensions, lifecycle, .. }
                if extensions == &["audit"] && *lifecycle == ExtensionLifecycle::AfterFragments)
        })
        .unwrap();
        let builder = position(&|e| {
            matches!(e, PipelineEvent::HelperStarted { key, .. } if key == "out")
        })
        .unwrap();
        let committed = position(&|e| {
            matches!(e, PipelineEvent::ExtensionsCommitted { run: 1, extensions }
                if extensions == &["audit"])
        })
        .unwrap();

        assert!(applied < builder && builder < committed);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::ExtensionsRolledBack { .. })));
    }

    #[tokio::test]
    async fn failed_builder_announces_rollback_instead_of_commit() {
        let pipeline = pipeline();
        pipeline
            .builders()
            .use_helper(Helper::from_step(
                "out",
                HelperKind::builder(),
                |_: BuilderArgs| async { Err(KilnError::Other("no space".into())) },
            ))
            .unwrap();
        pipeline.extensions().register(audit_extension()).await.unwrap();
        let mut rx = pipeline.subscribe();

        pipeline.run(None).await.unwrap_err();
        let events = drain(&mut rx);

        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::ExtensionsRolledBack { extensions, .. } if extensions == &["audit"]
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::ExtensionsCommitted { .. })));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::RunFailed { run: 1, error }) if error == "no space"
        ));
    }

    #[tokio::test]
    async fn repeated_diagnostics_are_announced_once() {
        let pipeline = pipeline();
        let mut rx = pipeline.subscribe();
        pipeline
            .ir()
            .use_helper(
                Helper::from_step("b", HelperKind::fragment(), |_: FragmentArgs| async { Ok(()) })
                    .depends_on(["a"])
                    .optional(),
            )
            .unwrap();

        pipeline.run(None).await.unwrap();
        pipeline.run(None).await.unwrap();

        let announced: Vec<&'static str> = drain(&mut rx)
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::DiagnosticEmitted { diagnostic } => Some(diagnostic.type_name()),
                _ => None,
            })
            .collect();
        assert_eq!(announced, vec!["missing-dependency", "unused-helper"]);
    }

    #[test]
    fn events_serialize_with_variant_tag() {
        let json = serde_json::to_value(PipelineEvent::PhaseEntered {
            run: 3,
            phase: RunPhase::RunningBuilders,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "PhaseEntered": { "run": 3, "phase": "running-builders" } })
        );
    }
}
