//! Shared types, errors, and reporter plumbing for the Kiln pipeline engine.
//!
//! This crate provides the foundational types used across all other Kiln crates:
//! - `KilnError`: unified error taxonomy
//! - `HelperKind` / `HelperMode`: helper registration vocabulary
//! - `Reporter` / `ReporterHandle`: host-supplied logging sink with a stable identity
//! - `PipelineContext`: the one thing the engine needs from a host context

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod reporter;

pub use reporter::{
    PipelineContext, RecordingReporter, ReportLevel, ReportedMessage, Reporter, ReporterHandle,
    TracingReporter,
};

/// Unified error type for all Kiln subsystems.
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    // === Structural Errors ===
    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    // === Helper / Extension Errors ===
    #[error("Helper '{key}' ({kind}) failed: {message}")]
    HelperError {
        key: String,
        kind: String,
        message: String,
    },

    #[error("Extension '{extension}' failed: {message}")]
    ExtensionError { extension: String, message: String },

    #[error("[{code}] {message}")]
    Coded { code: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl KilnError {
    /// Returns `true` for errors raised because a structural invariant was violated.
    pub fn is_validation(&self) -> bool {
        match self {
            KilnError::ValidationError(_) => true,
            KilnError::Coded { code, .. } => code == VALIDATION_ERROR_CODE,
            _ => false,
        }
    }

    /// Variant name, used when an error is summarised as metadata.
    pub fn name(&self) -> &str {
        match self {
            KilnError::ValidationError(_) => VALIDATION_ERROR_CODE,
            KilnError::HelperError { .. } => "HelperError",
            KilnError::ExtensionError { .. } => "ExtensionError",
            KilnError::Coded { code, .. } => code,
            KilnError::Io(_) => "IoError",
            KilnError::Json(_) => "JsonError",
            KilnError::Other(_) => "Error",
        }
    }

    /// Build an error from a code and message, the way the default error factory does.
    ///
    /// The `ValidationError` code maps onto [`KilnError::ValidationError`]; every other
    /// code is kept verbatim in [`KilnError::Coded`].
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == VALIDATION_ERROR_CODE {
            KilnError::ValidationError(message)
        } else {
            KilnError::Coded {
                code: code.to_string(),
                message,
            }
        }
    }
}

/// Error code used for structural invariant violations.
pub const VALIDATION_ERROR_CODE: &str = "ValidationError";

/// A convenience alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;

// ---------------------------------------------------------------------------
// HelperKind: which phase a helper belongs to
// ---------------------------------------------------------------------------

/// Name of the phase a helper participates in.
///
/// The engine ships with two kinds, `fragment` and `builder`, but hosts may
/// rename them, so the kind is an open string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HelperKind(String);

impl HelperKind {
    pub const FRAGMENT: &'static str = "fragment";
    pub const BUILDER: &'static str = "builder";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn fragment() -> Self {
        Self::new(Self::FRAGMENT)
    }

    pub fn builder() -> Self {
        Self::new(Self::BUILDER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable label with the first letter capitalised (`"fragment"` -> `"Fragment"`).
    pub fn label(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HelperKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for HelperKind {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// HelperMode: how a helper coexists with others under the same key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperMode {
    #[default]
    Extend,
    Override,
    Merge,
}

impl HelperMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelperMode::Extend => "extend",
            HelperMode::Override => "override",
            HelperMode::Merge => "merge",
        }
    }

    /// Returns `true` when a helper in this mode may not share its key with
    /// an already-registered helper in `existing` mode.
    ///
    /// Only two overrides for the same key collide; extend and merge helpers
    /// stack freely, and a single override may sit on top of them.
    pub fn conflicts_with(&self, existing: HelperMode) -> bool {
        matches!((self, existing), (HelperMode::Override, HelperMode::Override))
    }
}

impl fmt::Display for HelperMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
