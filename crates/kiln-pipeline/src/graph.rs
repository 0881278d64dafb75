//! Dependency ordering for the helpers of one kind.
//!
//! Resolution is a level-by-level Kahn pass: every helper whose dependencies
//! are all placed becomes eligible at once, the eligible batch is sorted by
//! ascending priority then registration index, and the batch is appended to
//! the order. Helpers depending on an unregistered key are reported and kept
//! out of the order, along with anything that (transitively) waits on them or
//! sits on a cycle.

use std::collections::{HashMap, HashSet};

use crate::helper::RegisteredHelper;

/// Output of [`build_dependency_graph`].
#[derive(Debug)]
pub struct DependencyOrder<A> {
    /// The resolvable helpers, in execution order.
    pub order: Vec<RegisteredHelper<A>>,
    /// Helpers that never became eligible, in registration order.
    pub unresolved: Vec<RegisteredHelper<A>>,
}

impl<A> DependencyOrder<A> {
    /// Keys of the ordered helpers.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().map(|e| e.key().to_string()).collect()
    }
}

/// Order `entries` so that every helper comes after the helpers it depends on.
///
/// `on_missing_dependency(dependant, key)` fires once per helper and unknown
/// dependency key. `on_unresolved_helpers` fires once, and only when at least
/// one helper could not be placed.
pub fn build_dependency_graph<A>(
    entries: &[RegisteredHelper<A>],
    mut on_missing_dependency: impl FnMut(&RegisteredHelper<A>, &str),
    mut on_unresolved_helpers: impl FnMut(&[RegisteredHelper<A>]),
) -> DependencyOrder<A> {
    // Unplaced helpers per key; a dependency on a key is satisfied once this hits zero.
    let mut pending_by_key: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *pending_by_key.entry(entry.key()).or_insert(0) += 1;
    }

    let mut blocked = vec![false; entries.len()];
    for (slot, entry) in entries.iter().enumerate() {
        let mut seen = HashSet::new();
        for dependency in &entry.descriptor().depends_on {
            if !seen.insert(dependency.as_str()) {
                continue;
            }
            if !pending_by_key.contains_key(dependency.as_str()) {
                tracing::warn!(
                    helper = %entry.id,
                    dependency = %dependency,
                    "Helper depends on an unregistered key"
                );
                on_missing_dependency(entry, dependency);
                blocked[slot] = true;
            }
        }
    }

    let mut placed = vec![false; entries.len()];
    let mut order = Vec::with_capacity(entries.len());

    loop {
        let mut eligible: Vec<usize> = (0..entries.len())
            .filter(|&slot| !placed[slot] && !blocked[slot])
            .filter(|&slot| {
                entries[slot]
                    .descriptor()
                    .depends_on
                    .iter()
                    .all(|dep| pending_by_key.get(dep.as_str()).copied() == Some(0))
            })
            .collect();

        if eligible.is_empty() {
            break;
        }

        eligible.sort_by(|&a, &b| {
            let (a, b) = (&entries[a], &entries[b]);
            a.descriptor()
                .priority
                .cmp(&b.descriptor().priority)
                .then(a.index.cmp(&b.index))
        });

        for slot in eligible {
            placed[slot] = true;
            if let Some(count) = pending_by_key.get_mut(entries[slot].key()) {
                *count -= 1;
            }
            order.push(entries[slot].clone());
        }
    }

    let unresolved: Vec<RegisteredHelper<A>> = entries
        .iter()
        .zip(&placed)
        .filter(|(_, placed)| !**placed)
        .map(|(entry, _)| entry.clone())
        .collect();

    if !unresolved.is_empty() {
        tracing::warn!(
            unresolved = ?unresolved.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "Helpers could not be ordered"
        );
        on_unresolved_helpers(&unresolved);
    }

    DependencyOrder { order, unresolved }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
