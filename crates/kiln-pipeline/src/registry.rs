//! Per-kind helper registry with registration-time conflict detection.

use kiln_types::{HelperKind, KilnError, Result};

use crate::helper::{Helper, HelperDescriptor, RegisteredHelper};

/// Two helpers registered under the same key with modes that cannot coexist.
#[derive(Debug, Clone)]
pub struct HelperConflict {
    pub helper: HelperDescriptor,
    pub existing: HelperDescriptor,
    pub message: String,
}

/// Ordered list of helpers of one kind.
///
/// Registration never rejects a helper for a key collision: the collision is
/// returned as a [`HelperConflict`] for the caller to report, and both helpers
/// stay registered.
pub struct HelperRegistry<A> {
    kind: HelperKind,
    entries: Vec<RegisteredHelper<A>>,
}

impl<A> HelperRegistry<A> {
    pub fn new(kind: HelperKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> &HelperKind {
        &self.kind
    }

    /// Register a helper, returning the conflict it raised, if any.
    ///
    /// Fails only when the helper's kind does not belong to this registry.
    pub fn register(&mut self, helper: Helper<A>) -> Result<Option<HelperConflict>> {
        if helper.kind() != &self.kind {
            return Err(KilnError::ValidationError(format!(
                "Attempted to register helper \"{}\" as {} but received kind \"{}\".",
                helper.key(),
                self.kind,
                helper.kind()
            )));
        }

        let conflict = self
            .entries
            .iter()
            .find(|entry| {
                entry.key() == helper.key()
                    && helper
                        .descriptor()
                        .mode
                        .conflicts_with(entry.descriptor().mode)
            })
            .map(|existing| HelperConflict {
                helper: helper.descriptor().clone(),
                existing: existing.descriptor().clone(),
                message: conflict_message(helper.descriptor()),
            });

        let index = self.entries.len();
        let entry = RegisteredHelper::new(helper, index);
        tracing::debug!(helper = %entry.id, "Registered helper");
        self.entries.push(entry);

        Ok(conflict)
    }

    pub fn entries(&self) -> &[RegisteredHelper<A>] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key() == key)
    }
}

fn conflict_message(helper: &HelperDescriptor) -> String {
    format!(
        "Multiple {}s registered for helper \"{}\".",
        helper.mode, helper.key
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
