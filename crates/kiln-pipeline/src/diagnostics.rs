//! Diagnostics: non-fatal observations about the registry and the graph.
//!
//! Diagnostics accumulate on the pipeline for its whole lifetime. Each is
//! forwarded at most once to a given reporter; binding a reporter that has not
//! seen the history yet replays it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kiln_types::{HelperKind, HelperMode, KilnError, ReporterHandle, Result};

use crate::helper::{HelperDescriptor, RegisteredHelper};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// Two helpers share a key and kind with incompatible modes.
    #[serde(rename_all = "camelCase")]
    Conflict {
        key: String,
        kind: HelperKind,
        mode: HelperMode,
        /// Origins (or keys) of the existing helper and the newcomer.
        helpers: Vec<String>,
        message: String,
    },
    /// A `depends_on` entry names a key nobody registered.
    #[serde(rename_all = "camelCase")]
    MissingDependency {
        key: String,
        kind: HelperKind,
        dependency: String,
        helper: String,
        message: String,
    },
    /// A registered helper was never entered during its phase.
    #[serde(rename_all = "camelCase")]
    UnusedHelper {
        key: String,
        kind: HelperKind,
        helper: String,
        depends_on: Vec<String>,
        message: String,
    },
}

impl Diagnostic {
    pub fn conflict(
        helper: &HelperDescriptor,
        existing: &HelperDescriptor,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic::Conflict {
            key: helper.key.clone(),
            kind: helper.kind.clone(),
            mode: helper.mode,
            helpers: vec![
                existing.origin_or_key().to_string(),
                helper.origin_or_key().to_string(),
            ],
            message: message.into(),
        }
    }

    pub fn missing_dependency(
        helper: &HelperDescriptor,
        dependency: &str,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic::MissingDependency {
            key: helper.key.clone(),
            kind: helper.kind.clone(),
            dependency: dependency.to_string(),
            helper: helper.origin_or_key().to_string(),
            message: message.into(),
        }
    }

    pub fn unused_helper(helper: &HelperDescriptor, message: impl Into<String>) -> Self {
        Diagnostic::UnusedHelper {
            key: helper.key.clone(),
            kind: helper.kind.clone(),
            helper: helper.origin_or_key().to_string(),
            depends_on: helper.depends_on.clone(),
            message: message.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Diagnostic::Conflict { key, .. }
            | Diagnostic::MissingDependency { key, .. }
            | Diagnostic::UnusedHelper { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &HelperKind {
        match self {
            Diagnostic::Conflict { kind, .. }
            | Diagnostic::MissingDependency { kind, .. }
            | Diagnostic::UnusedHelper { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Diagnostic::Conflict { message, .. }
            | Diagnostic::MissingDependency { message, .. }
            | Diagnostic::UnusedHelper { message, .. } => message,
        }
    }

    /// `"conflict"`, `"missing-dependency"` or `"unused-helper"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Diagnostic::Conflict { .. } => "conflict",
            Diagnostic::MissingDependency { .. } => "missing-dependency",
            Diagnostic::UnusedHelper { .. } => "unused-helper",
        }
    }

    /// Content identity: two diagnostics with the same fingerprint are the same observation.
    fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

pub fn missing_dependency_message(helper: &HelperDescriptor, dependency: &str) -> String {
    format!(
        "{} depends on unregistered helper \"{}\".",
        helper.describe(),
        dependency
    )
}

pub fn unused_helper_message(helper: &HelperDescriptor) -> String {
    if helper.depends_on.is_empty() {
        format!("{} was registered but never executed.", helper.describe())
    } else {
        format!(
            "{} was registered but never executed (depends on: {}).",
            helper.describe(),
            helper.depends_on.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// HelperExecutionSnapshot
// ---------------------------------------------------------------------------

/// Which helpers of one kind were registered, which ran, and which did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperExecutionSnapshot {
    pub kind: HelperKind,
    /// Keys in registration order.
    pub registered: Vec<String>,
    /// Keys in execution order.
    pub executed: Vec<String>,
    /// Keys of helpers that never ran, in registration order.
    pub missing: Vec<String>,
}

impl HelperExecutionSnapshot {
    /// `executed_ids` must be in execution order.
    pub fn build<A>(
        kind: &HelperKind,
        entries: &[RegisteredHelper<A>],
        executed_ids: &[String],
    ) -> Self {
        let by_id: HashMap<&str, &str> = entries
            .iter()
            .map(|e| (e.id.as_str(), e.key()))
            .collect();
        let ran: HashSet<&str> = executed_ids.iter().map(String::as_str).collect();

        Self {
            kind: kind.clone(),
            registered: entries.iter().map(|e| e.key().to_string()).collect(),
            executed: executed_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|k| k.to_string()))
                .collect(),
            missing: entries
                .iter()
                .filter(|e| !ran.contains(e.id.as_str()))
                .map(|e| e.key().to_string())
                .collect(),
        }
    }
}

/// Fail with a `ValidationError` naming every required helper that did not run.
pub fn ensure_all_helpers_executed<A>(
    entries: &[RegisteredHelper<A>],
    visited: &HashSet<String>,
    kind: &HelperKind,
) -> Result<()> {
    let missing: Vec<String> = entries
        .iter()
        .filter(|e| !visited.contains(&e.id) && !e.descriptor().optional)
        .map(|e| e.descriptor().describe())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(KilnError::ValidationError(format!(
        "{} helpers did not execute: {}.",
        kind.label(),
        missing.join(", ")
    )))
}

// ---------------------------------------------------------------------------
// DiagnosticManager
// ---------------------------------------------------------------------------

/// A diagnostic that still has to be handed to a reporter.
pub(crate) struct Delivery {
    pub reporter: ReporterHandle,
    pub diagnostic: Diagnostic,
}

#[derive(Default)]
pub(crate) struct DiagnosticManager {
    history: Vec<Diagnostic>,
    by_fingerprint: HashMap<String, usize>,
    delivered: HashMap<Uuid, HashSet<usize>>,
    reporter: Option<ReporterHandle>,
}

impl DiagnosticManager {
    /// Record a diagnostic; returns the delivery owed to the bound reporter, if any.
    ///
    /// Returns `(is_new, delivery)`.
    pub fn emit(&mut self, diagnostic: Diagnostic) -> (bool, Option<Delivery>) {
        let fingerprint = diagnostic.fingerprint();
        let (slot, is_new) = match self.by_fingerprint.get(&fingerprint) {
            Some(&slot) => (slot, false),
            None => {
                let slot = self.history.len();
                self.history.push(diagnostic);
                self.by_fingerprint.insert(fingerprint, slot);
                (slot, true)
            }
        };

        let delivery = self.reporter.clone().and_then(|reporter| {
            let seen = self.delivered.entry(reporter.id()).or_default();
            seen.insert(slot).then(|| Delivery {
                diagnostic: self.history[slot].clone(),
                reporter,
            })
        });

        (is_new, delivery)
    }

    /// Bind the reporter for the current run and return the backlog it has not seen.
    pub fn bind_reporter(&mut self, reporter: ReporterHandle) -> Vec<Delivery> {
        let seen = self.delivered.entry(reporter.id()).or_default();
        let backlog = self
            .history
            .iter()
            .enumerate()
            .filter(|(slot, _)| seen.insert(*slot))
            .map(|(_, diagnostic)| Delivery {
                reporter: reporter.clone(),
                diagnostic: diagnostic.clone(),
            })
            .collect();
        self.reporter = Some(reporter);
        backlog
    }

    /// Stop forwarding; later diagnostics wait for the next bound reporter.
    pub fn unbind_reporter(&mut self) {
        self.reporter = None;
    }

    pub fn history(&self) -> &[Diagnostic] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::Helper;
    use kiln_types::RecordingReporter;

    fn descriptor(key: &str) -> HelperDescriptor {
        HelperDescriptor::new(key, HelperKind::fragment())
    }

    fn unused(key: &str) -> Diagnostic {
        let d = descriptor(key);
        Diagnostic::unused_helper(&d, unused_helper_message(&d))
    }

    fn entries(helpers: Vec<Helper<()>>) -> Vec<RegisteredHelper<()>> {
        helpers
            .into_iter()
            .enumerate()
            .map(|(i, h)| RegisteredHelper::new(h, i))
            .collect()
    }

    fn helper(key: &str) -> Helper<()> {
        Helper::from_step(key, HelperKind::fragment(), |_| async { Ok(()) })
    }

    #[test]
    fn diagnostics_serialize_with_type_tag() {
        let mut a = descriptor("x");
        a.origin = Some("plugin-a".into());
        let mut b = descriptor("x");
        b.origin = Some("plugin-b".into());
        b.mode = HelperMode::Override;

        let json = serde_json::to_value(Diagnostic::conflict(&b, &a, "clash")).unwrap();
        assert_eq!(json["type"], "conflict");
        assert_eq!(json["helpers"], serde_json::json!(["plugin-a", "plugin-b"]));
        assert_eq!(json["mode"], "override");

        let json = serde_json::to_value(unused("y")).unwrap();
        assert_eq!(json["type"], "unused-helper");
        assert_eq!(json["dependsOn"], serde_json::json!([]));
    }

    #[test]
    fn accessors_cover_every_variant() {
        let d = descriptor("b");
        let missing =
            Diagnostic::missing_dependency(&d, "a", missing_dependency_message(&d, "a"));
        assert_eq!(missing.key(), "b");
        assert_eq!(missing.kind(), &HelperKind::fragment());
        assert_eq!(missing.type_name(), "missing-dependency");
        assert_eq!(
            missing.message(),
            "Fragment helper \"b\" depends on unregistered helper \"a\"."
        );
    }

    #[test]
    fn emit_deduplicates_identical_diagnostics() {
        let mut manager = DiagnosticManager::default();
        assert!(manager.emit(unused("a")).0);
        assert!(!manager.emit(unused("a")).0);
        assert!(manager.emit(unused("b")).0);
        assert_eq!(manager.history().len(), 2);
    }

    #[test]
    fn delivers_once_per_reporter() {
        let mut manager = DiagnosticManager::default();
        let handle = ReporterHandle::new(RecordingReporter::new());

        manager.emit(unused("early"));
        let backlog = manager.bind_reporter(handle.clone());
        assert_eq!(backlog.len(), 1);

        let (_, delivery) = manager.emit(unused("late"));
        assert!(delivery.is_some());
        let (_, again) = manager.emit(unused("late"));
        assert!(again.is_none());

        // Rebinding the same reporter owes nothing.
        assert!(manager.bind_reporter(handle.clone()).is_empty());

        manager.unbind_reporter();
        let (_, parked) = manager.emit(unused("between-runs"));
        assert!(parked.is_none());
        assert_eq!(manager.bind_reporter(handle).len(), 1);

        // A fresh reporter gets the whole history.
        let fresh = ReporterHandle::new(RecordingReporter::new());
        assert_eq!(manager.bind_reporter(fresh).len(), 3);
    }

    #[test]
    fn emit_without_reporter_only_records() {
        let mut manager = DiagnosticManager::default();
        let (is_new, delivery) = manager.emit(unused("a"));
        assert!(is_new);
        assert!(delivery.is_none());
    }

    #[test]
    fn snapshot_tracks_registered_executed_and_missing() {
        let entries = entries(vec![helper("a"), helper("b"), helper("c")]);
        let executed = vec![entries[2].id.clone(), entries[0].id.clone()];
        let snapshot =
            HelperExecutionSnapshot::build(&HelperKind::fragment(), &entries, &executed);

        assert_eq!(snapshot.registered, vec!["a", "b", "c"]);
        assert_eq!(snapshot.executed, vec!["c", "a"]);
        assert_eq!(snapshot.missing, vec!["b"]);
    }

    #[test]
    fn ensure_all_helpers_executed_lists_required_helpers() {
        let entries = entries(vec![helper("a"), helper("b"), helper("c").optional()]);
        let visited: HashSet<String> = [entries[0].id.clone()].into_iter().collect();

        let err = ensure_all_helpers_executed(&entries, &visited, &HelperKind::fragment())
            .unwrap_err();

        assert!(err.is_validation());
        let message = err.to_string();
        assert!(message.contains("Fragment helper \"b\""));
        assert!(!message.contains("\"c\""));
    }

    #[test]
    fn ensure_all_helpers_executed_passes_when_only_optional_missing() {
        let entries = entries(vec![helper("a"), helper("b").optional()]);
        let visited: HashSet<String> = [entries[0].id.clone()].into_iter().collect();
        assert!(ensure_all_helpers_executed(&entries, &visited, &HelperKind::fragment()).is_ok());
    }
}
