//! Helper trait, closure adapters, and the descriptor every helper carries.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kiln_types::{HelperKind, HelperMode, Result};

use crate::executor::Next;

// ---------------------------------------------------------------------------
// HelperApply trait
// ---------------------------------------------------------------------------

/// A node in the helper chain.
///
/// `args` are built for this helper alone. Calling `next.run().await` hands
/// control to the remaining helpers; returning without doing so stops the
/// chain, which is how guard helpers veto further work without failing.
#[async_trait]
pub trait HelperApply<A>: Send + Sync {
    async fn apply(&self, args: A, next: Next<A>) -> Result<()>;
}

struct ChainFn<F>(F);

#[async_trait]
impl<A, F, Fut> HelperApply<A> for ChainFn<F>
where
    A: Send + 'static,
    F: Fn(A, Next<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn apply(&self, args: A, next: Next<A>) -> Result<()> {
        (self.0)(args, next).await
    }
}

struct StepFn<F>(F);

#[async_trait]
impl<A, F, Fut> HelperApply<A> for StepFn<F>
where
    A: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn apply(&self, args: A, next: Next<A>) -> Result<()> {
        (self.0)(args).await?;
        next.run().await
    }
}

// ---------------------------------------------------------------------------
// HelperDescriptor
// ---------------------------------------------------------------------------

/// Registration metadata for a helper, independent of its apply function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperDescriptor {
    pub key: String,
    pub kind: HelperKind,
    pub mode: HelperMode,
    pub priority: i32,
    pub depends_on: Vec<String>,
    pub origin: Option<String>,
    pub optional: bool,
}

impl HelperDescriptor {
    pub fn new(key: impl Into<String>, kind: HelperKind) -> Self {
        Self {
            key: key.into(),
            kind,
            mode: HelperMode::default(),
            priority: 0,
            depends_on: Vec::new(),
            origin: None,
            optional: false,
        }
    }

    /// The provenance label used in diagnostics; falls back to the key.
    pub fn origin_or_key(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.key)
    }

    /// `Fragment helper "ir.meta"`.
    pub fn describe(&self) -> String {
        format!("{} helper \"{}\"", self.kind.label(), self.key)
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// A registrable unit of work: a descriptor plus the function that applies it.
pub struct Helper<A> {
    descriptor: HelperDescriptor,
    apply: Arc<dyn HelperApply<A>>,
}

impl<A> Clone for Helper<A> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<A> fmt::Debug for Helper<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<A: Send + 'static> Helper<A> {
    pub fn new(
        key: impl Into<String>,
        kind: HelperKind,
        apply: impl HelperApply<A> + 'static,
    ) -> Self {
        Self {
            descriptor: HelperDescriptor::new(key, kind),
            apply: Arc::new(apply),
        }
    }

    /// Build a helper from a closure that receives the chain continuation.
    pub fn from_fn<F, Fut>(key: impl Into<String>, kind: HelperKind, f: F) -> Self
    where
        F: Fn(A, Next<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(key, kind, ChainFn(f))
    }

    /// Build a helper that runs `f` and then always continues the chain.
    pub fn from_step<F, Fut>(key: impl Into<String>, kind: HelperKind, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(key, kind, StepFn(f))
    }
}

impl<A> Helper<A> {
    pub fn with_mode(mut self, mode: HelperMode) -> Self {
        self.descriptor.mode = mode;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.descriptor.priority = priority;
        self
    }

    pub fn depends_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor.depends_on = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.descriptor.origin = Some(origin.into());
        self
    }

    /// Mark the helper as optional: not running it does not abort the run.
    pub fn optional(mut self) -> Self {
        self.descriptor.optional = true;
        self
    }

    pub fn descriptor(&self) -> &HelperDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn kind(&self) -> &HelperKind {
        &self.descriptor.kind
    }

    pub(crate) fn applier(&self) -> &Arc<dyn HelperApply<A>> {
        &self.apply
    }
}

// ---------------------------------------------------------------------------
// RegisteredHelper
// ---------------------------------------------------------------------------

/// A helper plus the identity it received at registration.
pub struct RegisteredHelper<A> {
    pub helper: Helper<A>,
    pub id: String,
    pub index: usize,
}

impl<A> RegisteredHelper<A> {
    pub fn new(helper: Helper<A>, index: usize) -> Self {
        let id = helper_id(helper.kind(), helper.key(), index);
        Self { helper, id, index }
    }

    pub fn descriptor(&self) -> &HelperDescriptor {
        self.helper.descriptor()
    }

    pub fn key(&self) -> &str {
        self.helper.key()
    }
}

impl<A> Clone for RegisteredHelper<A> {
    fn clone(&self) -> Self {
        Self {
            helper: self.helper.clone(),
            id: self.id.clone(),
            index: self.index,
        }
    }
}

impl<A> fmt::Debug for RegisteredHelper<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHelper")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("descriptor", self.helper.descriptor())
            .finish()
    }
}

/// `fragment:ir.meta#0`
pub fn helper_id(kind: &HelperKind, key: &str, index: usize) -> String {
    format!("{kind}:{key}#{index}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(key: &str) -> Helper<()> {
        Helper::from_step(key, HelperKind::fragment(), |_| async { Ok(()) })
    }

    #[test]
    fn builder_methods_fill_descriptor() {
        let helper = noop("ir.resources")
            .with_mode(HelperMode::Override)
            .with_priority(5)
            .depends_on(["ir.meta", "ir.schemas"])
            .with_origin("core")
            .optional();

        let d = helper.descriptor();
        assert_eq!(d.key, "ir.resources");
        assert_eq!(d.kind, HelperKind::fragment());
        assert_eq!(d.mode, HelperMode::Override);
        assert_eq!(d.priority, 5);
        assert_eq!(d.depends_on, vec!["ir.meta", "ir.schemas"]);
        assert_eq!(d.origin.as_deref(), Some("core"));
        assert!(d.optional);
    }

    #[test]
    fn descriptor_defaults() {
        let d = noop("a").descriptor().clone();
        assert_eq!(d.mode, HelperMode::Extend);
        assert_eq!(d.priority, 0);
        assert!(d.depends_on.is_empty());
        assert!(!d.optional);
        assert_eq!(d.origin_or_key(), "a");
    }

    #[test]
    fn describe_uses_capitalised_kind() {
        let d = HelperDescriptor::new("writer", HelperKind::builder());
        assert_eq!(d.describe(), "Builder helper \"writer\"");
    }

    #[test]
    fn registered_helper_id_includes_kind_key_and_index() {
        let entry = RegisteredHelper::new(noop("ir.meta"), 3);
        assert_eq!(entry.id, "fragment:ir.meta#3");
        assert_eq!(entry.index, 3);
        assert_eq!(entry.key(), "ir.meta");
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let d = noop("a").depends_on(["b"]).descriptor().clone();
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["dependsOn"], serde_json::json!(["b"]));
        assert_eq!(json["mode"], "extend");
        assert_eq!(json["kind"], "fragment");
    }
}
