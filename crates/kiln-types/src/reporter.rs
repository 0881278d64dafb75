//! Reporter trait, identity-carrying handle, and built-in implementations.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Host-supplied logging sink. No transport is assumed.
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str, context: Option<&Value>);
    fn warn(&self, message: &str, context: Option<&Value>);
    fn error(&self, message: &str, context: Option<&Value>);
    fn debug(&self, message: &str, context: Option<&Value>);
}

/// Anything the engine runs against must expose the reporter bound to it.
pub trait PipelineContext: Send + Sync {
    fn reporter(&self) -> &ReporterHandle;
}

// ---------------------------------------------------------------------------
// ReporterHandle
// ---------------------------------------------------------------------------

/// A shared reporter plus a stable identity.
///
/// Cloning a handle keeps the same id, so "the same reporter" means "a clone
/// of the same handle". Two handles wrapping equal reporters are distinct.
#[derive(Clone)]
pub struct ReporterHandle {
    id: Uuid,
    inner: Arc<dyn Reporter>,
}

impl ReporterHandle {
    pub fn new(reporter: impl Reporter + 'static) -> Self {
        Self::from_arc(Arc::new(reporter))
    }

    pub fn from_arc(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: reporter,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info(&self, message: &str, context: Option<&Value>) {
        self.inner.info(message, context);
    }

    pub fn warn(&self, message: &str, context: Option<&Value>) {
        self.inner.warn(message, context);
    }

    pub fn error(&self, message: &str, context: Option<&Value>) {
        self.inner.error(message, context);
    }

    pub fn debug(&self, message: &str, context: Option<&Value>) {
        self.inner.debug(message, context);
    }
}

impl fmt::Debug for ReporterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterHandle").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// TracingReporter
// ---------------------------------------------------------------------------

/// Forwards every report to `tracing` at the matching level.
#[derive(Debug, Clone)]
pub struct TracingReporter {
    namespace: String,
}

impl TracingReporter {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new("kiln")
    }
}

fn render_context(context: Option<&Value>) -> String {
    context.map(Value::to_string).unwrap_or_default()
}

impl Reporter for TracingReporter {
    fn info(&self, message: &str, context: Option<&Value>) {
        tracing::info!(namespace = %self.namespace, context = %render_context(context), "{message}");
    }

    fn warn(&self, message: &str, context: Option<&Value>) {
        tracing::warn!(namespace = %self.namespace, context = %render_context(context), "{message}");
    }

    fn error(&self, message: &str, context: Option<&Value>) {
        tracing::error!(namespace = %self.namespace, context = %render_context(context), "{message}");
    }

    fn debug(&self, message: &str, context: Option<&Value>) {
        tracing::debug!(namespace = %self.namespace, context = %render_context(context), "{message}");
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedMessage {
    pub level: ReportLevel,
    pub message: String,
    pub context: Option<Value>,
}

/// Keeps every report in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    messages: Arc<Mutex<Vec<ReportedMessage>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ReportedMessage> {
        self.messages.lock().clone()
    }

    pub fn messages_at(&self, level: ReportLevel) -> Vec<ReportedMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    fn record(&self, level: ReportLevel, message: &str, context: Option<&Value>) {
        self.messages.lock().push(ReportedMessage {
            level,
            message: message.to_string(),
            context: context.cloned(),
        });
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str, context: Option<&Value>) {
        self.record(ReportLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: Option<&Value>) {
        self.record(ReportLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: Option<&Value>) {
        self.record(ReportLevel::Error, message, context);
    }

    fn debug(&self, message: &str, context: Option<&Value>) {
        self.record(ReportLevel::Debug, message, context);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
