// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Wandelwerk.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ExternalTool;
use crate::types::{Format, Operation, RequestState};

/// Placeholder substituted for workspace paths in user-facing diagnostics.
pub const REDACTED_PATH: &str = "<workspace>";

/// Top-level error type for all Wandelwerk operations.
#[derive(Debug, Error)]
pub enum WandelwerkError {
    // -- Validation (surfaced before any workspace exists) --
    #[error("conversion from {from} to {to} ({operation}) is not supported")]
    UnsupportedConversion {
        from: Format,
        to: Format,
        operation: Operation,
    },

    #[error("input too large: {constraint} allows {limit}, request has {actual}")]
    InputTooLarge {
        constraint: &'static str,
        limit: u64,
        actual: u64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid option `{name}`: {reason}")]
    InvalidOptions { name: String, reason: String },

    // -- Execution --
    #[error("could not allocate a workspace: {0}")]
    ResourceExhausted(String),

    #[error("{tool} failed: {diagnostics}")]
    ExternalToolFailure {
        tool: ExternalTool,
        diagnostics: String,
    },

    #[error("{tool} did not finish within {seconds}s")]
    Timeout { tool: ExternalTool, seconds: u64 },

    #[error("delivery failed: {0}")]
    DeliveryFailure(String),

    // -- Library errors (wrapped into ExternalToolFailure by converters) --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("spreadsheet processing failed: {0}")]
    SpreadsheetError(String),

    #[error("archive creation failed: {0}")]
    ArchiveError(String),

    // -- Internal --
    #[error("invalid request state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RequestState, to: RequestState },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("outcome log error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WandelwerkError>;

/// Coarse classification of a failure, recorded in the outcome log and used
/// to pick the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedConversion,
    InputTooLarge,
    InvalidInput,
    InvalidOptions,
    ResourceExhausted,
    ExternalToolFailure,
    Timeout,
    DeliveryFailure,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedConversion => "unsupported_conversion",
            Self::InputTooLarge => "input_too_large",
            Self::InvalidInput => "invalid_input",
            Self::InvalidOptions => "invalid_options",
            Self::ResourceExhausted => "resource_exhausted",
            Self::ExternalToolFailure => "external_tool_failure",
            Self::Timeout => "timeout",
            Self::DeliveryFailure => "delivery_failure",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WandelwerkError {
    /// Shorthand for an [`WandelwerkError::InvalidOptions`] error.
    pub fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOptions {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedConversion { .. } => FailureKind::UnsupportedConversion,
            Self::InputTooLarge { .. } => FailureKind::InputTooLarge,
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::InvalidOptions { .. } => FailureKind::InvalidOptions,
            Self::ResourceExhausted(_) => FailureKind::ResourceExhausted,
            Self::ExternalToolFailure { .. }
            | Self::PdfError(_)
            | Self::ImageError(_)
            | Self::SpreadsheetError(_)
            | Self::ArchiveError(_) => FailureKind::ExternalToolFailure,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::DeliveryFailure(_) => FailureKind::DeliveryFailure,
            Self::InvalidTransition { .. }
            | Self::Config(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Serialization(_) => FailureKind::Internal,
        }
    }

    /// Validation failures are reported before a workspace is allocated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::UnsupportedConversion
                | FailureKind::InputTooLarge
                | FailureKind::InvalidInput
                | FailureKind::InvalidOptions
        )
    }

    /// Attribute a library or I/O failure to the capability that raised it.
    ///
    /// Validation errors and already-attributed failures pass through.
    pub fn into_tool_failure(self, tool: ExternalTool) -> Self {
        match self {
            Self::PdfError(_)
            | Self::ImageError(_)
            | Self::SpreadsheetError(_)
            | Self::ArchiveError(_)
            | Self::Io(_)
            | Self::Serialization(_) => Self::ExternalToolFailure {
                tool,
                diagnostics: self.to_string(),
            },
            other => other,
        }
    }

    /// Replace every occurrence of `root` in the error's text with
    /// [`REDACTED_PATH`].
    pub fn redact(self, root: &Path) -> Self {
        let needle = root.display().to_string();
        if needle.is_empty() {
            return self;
        }
        let scrub = |text: String| text.replace(&needle, REDACTED_PATH);
        match self {
            Self::InvalidInput(s) => Self::InvalidInput(scrub(s)),
            Self::InvalidOptions { name, reason } => Self::InvalidOptions {
                name,
                reason: scrub(reason),
            },
            Self::ResourceExhausted(s) => Self::ResourceExhausted(scrub(s)),
            Self::ExternalToolFailure { tool, diagnostics } => Self::ExternalToolFailure {
                tool,
                diagnostics: scrub(diagnostics),
            },
            Self::DeliveryFailure(s) => Self::DeliveryFailure(scrub(s)),
            Self::PdfError(s) => Self::PdfError(scrub(s)),
            Self::ImageError(s) => Self::ImageError(scrub(s)),
            Self::SpreadsheetError(s) => Self::SpreadsheetError(scrub(s)),
            Self::ArchiveError(s) => Self::ArchiveError(scrub(s)),
            Self::Io(err) => {
                let text = err.to_string();
                if text.contains(&needle) {
                    Self::Io(std::io::Error::new(err.kind(), scrub(text)))
                } else {
                    Self::Io(err)
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn library_errors_classify_as_tool_failures() {
        assert_eq!(
            WandelwerkError::PdfError("bad xref".into()).kind(),
            FailureKind::ExternalToolFailure
        );
        assert_eq!(
            WandelwerkError::ResourceExhausted("disk full".into()).kind(),
            FailureKind::ResourceExhausted
        );
    }

    #[test]
    fn validation_errors_are_flagged() {
        let err = WandelwerkError::InputTooLarge {
            constraint: "MAX_FILE_SIZE_BYTES",
            limit: 10,
            actual: 11,
        };
        assert!(err.is_validation());
        assert!(err.to_string().contains("MAX_FILE_SIZE_BYTES"));
        assert!(!WandelwerkError::DeliveryFailure("reset".into()).is_validation());
    }

    #[test]
    fn into_tool_failure_wraps_library_errors_only() {
        let wrapped = WandelwerkError::ImageError("truncated".into())
            .into_tool_failure(ExternalTool::ImageLibrary);
        match wrapped {
            WandelwerkError::ExternalToolFailure { tool, diagnostics } => {
                assert_eq!(tool, ExternalTool::ImageLibrary);
                assert!(diagnostics.contains("truncated"));
            }
            other => panic!("unexpected variant: {other}"),
        }

        let untouched = WandelwerkError::invalid_option("quality", "must be 1-100")
            .into_tool_failure(ExternalTool::ImageLibrary);
        assert_eq!(untouched.kind(), FailureKind::InvalidOptions);
    }

    #[test]
    fn redact_scrubs_workspace_paths() {
        let root = PathBuf::from("/tmp/wandelwerk-abc");
        let err = WandelwerkError::ExternalToolFailure {
            tool: ExternalTool::OfficeSuite,
            diagnostics: "Error: source file could not be loaded: /tmp/wandelwerk-abc/in/input_1.docx"
                .into(),
        }
        .redact(&root);
        let text = err.to_string();
        assert!(!text.contains("/tmp/wandelwerk-abc"));
        assert!(text.contains("<workspace>/in/input_1.docx"));
    }
}
