// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the upload page.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Severity drives how the caller presents it.

use serde::Serialize;

use crate::error::WandelwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The user can fix the request (different file, option, or format).
    ActionRequired,
    /// Resubmitting later may work (timeout, full disk).
    Transient,
    /// The file itself cannot be converted as-is.
    Permanent,
    /// Something went wrong on our side.
    Internal,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether resubmitting the same request might succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `WandelwerkError` into a `HumanError`.
pub fn humanize_error(err: &WandelwerkError) -> HumanError {
    match err {
        // -- Validation --
        WandelwerkError::UnsupportedConversion { from, to, operation } => HumanError {
            message: format!("We can't {operation} {from} files to {to}."),
            suggestion: "Pick one of the listed target formats for this file type.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        WandelwerkError::InputTooLarge {
            constraint,
            limit,
            actual,
        } => HumanError {
            message: "This upload is too large.".into(),
            suggestion: format!(
                "{} allows {limit} but this request needs {actual}. Try a smaller file or fewer pages.",
                describe_constraint(constraint)
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        WandelwerkError::InvalidInput(detail) => HumanError {
            message: "We couldn't read this upload.".into(),
            suggestion: format!("Check the file and the selected formats, then try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        WandelwerkError::InvalidOptions { name, reason } => HumanError {
            message: format!("The `{name}` setting isn't valid."),
            suggestion: format!("Adjust it and try again: {reason}."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Execution --
        WandelwerkError::ResourceExhausted(_) => HumanError {
            message: "The server is out of working space.".into(),
            suggestion: "Please try again in a few minutes.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        WandelwerkError::ExternalToolFailure { tool, diagnostics } => HumanError {
            message: format!("The {tool} couldn't convert this file."),
            suggestion: format!(
                "The file may be damaged or use features the converter doesn't understand. ({})",
                first_line(diagnostics)
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        WandelwerkError::Timeout { seconds, .. } => HumanError {
            message: "The conversion took too long.".into(),
            suggestion: format!(
                "It was stopped after {seconds} seconds. Try a smaller file or fewer pages."
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        WandelwerkError::DeliveryFailure(_) => HumanError {
            message: "The download was interrupted.".into(),
            suggestion: "Submit the file again to get a fresh copy.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        WandelwerkError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged. Try opening it on a computer first to check it works, or try a different file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        WandelwerkError::ImageError(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        WandelwerkError::SpreadsheetError(_) => HumanError {
            message: "There's a problem with this spreadsheet.".into(),
            suggestion: "Try re-saving it as .xlsx or .csv and upload again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Internal --
        WandelwerkError::ArchiveError(_)
        | WandelwerkError::InvalidTransition { .. }
        | WandelwerkError::Config(_)
        | WandelwerkError::Database(_)
        | WandelwerkError::Io(_)
        | WandelwerkError::Serialization(_) => HumanError {
            message: "Something went wrong on our side.".into(),
            suggestion: "Please try again. If it keeps happening, let the administrator know.".into(),
            retriable: true,
            severity: Severity::Internal,
        },
    }
}

fn describe_constraint(constraint: &str) -> &'static str {
    match constraint {
        "MAX_FILE_SIZE_BYTES" => "The upload size limit",
        "MAX_PDF_PAGES" => "The PDF page limit",
        "MAX_IMAGE_BATCH_PAGES" => "The image batch limit",
        "MAX_RESIZED_PIXELS" => "The resized image pixel limit",
        _ => "A server limit",
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no details")
}
