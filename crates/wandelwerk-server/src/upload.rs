// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multipart upload → `ConversionRequest`.
//
// Recognised parts:
//   file       one per input, in order (repeatable)
//   source     optional; inferred from the first file's extension
//   target     required
//   operation  optional; defaults to `convert`
// Every other part is a conversion option (`pages`, `rotation`, ...).

use std::collections::BTreeMap;

use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use tracing::debug;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::types::{ConversionOptions, ConversionRequest, Format, InputFile, Operation};

/// Room for multipart framing and the text fields on top of the file bytes.
pub const BODY_SLACK_BYTES: u64 = 1024 * 1024;

/// Request body limit for a given upload ceiling.
pub fn body_limit(max_file_size_bytes: u64) -> usize {
    usize::try_from(max_file_size_bytes.saturating_add(BODY_SLACK_BYTES)).unwrap_or(usize::MAX)
}

/// Read a whole multipart upload into a request.
///
/// The upload ceiling itself is enforced by validation, which knows the exact
/// total. A body that overruns even the transport limit is reported as
/// `InputTooLarge` with the transport limit as a lower bound of its size.
pub async fn read_request(
    mut multipart: Multipart,
    max_file_size_bytes: u64,
) -> Result<ConversionRequest> {
    let mut files = Vec::new();
    let mut source = None;
    let mut target = None;
    let mut operation = None;
    let mut fields = BTreeMap::new();

    let broken = |err: MultipartError| upload_error(err, max_file_size_bytes);
    while let Some(field) = multipart.next_field().await.map_err(broken)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("upload_{}", files.len() + 1));
                let bytes = field.bytes().await.map_err(broken)?;
                debug!(%filename, bytes = bytes.len(), "Received file part");
                files.push(InputFile::new(filename, bytes.to_vec()));
            }
            "source" => source = non_empty(text(field, max_file_size_bytes).await?),
            "target" => target = non_empty(text(field, max_file_size_bytes).await?),
            "operation" => operation = non_empty(text(field, max_file_size_bytes).await?),
            _ => {
                let value = text(field, max_file_size_bytes).await?;
                fields.insert(name, value);
            }
        }
    }

    let first = files
        .first()
        .ok_or_else(|| WandelwerkError::InvalidInput("the upload contains no `file` part".into()))?;
    let source = match source {
        Some(source) => source.parse()?,
        None => Format::from_filename(&first.name).ok_or_else(|| {
            WandelwerkError::InvalidInput(format!(
                "cannot tell the format of `{}`; send a `source` field",
                first.name
            ))
        })?,
    };
    let target: Format = target
        .ok_or_else(|| WandelwerkError::InvalidInput("missing `target` field".into()))?
        .parse()?;
    let operation = match operation {
        Some(operation) => operation.parse()?,
        None => Operation::Convert,
    };
    let options = ConversionOptions::from_map(&fields)?;

    Ok(ConversionRequest::new(source, target, operation, files).with_options(options))
}

async fn text(field: Field<'_>, max_file_size_bytes: u64) -> Result<String> {
    field
        .text()
        .await
        .map_err(|err| upload_error(err, max_file_size_bytes))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn upload_error(err: MultipartError, max_file_size_bytes: u64) -> WandelwerkError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return WandelwerkError::InputTooLarge {
            constraint: "MAX_FILE_SIZE_BYTES",
            limit: max_file_size_bytes,
            actual: body_limit(max_file_size_bytes) as u64,
        };
    }
    WandelwerkError::InvalidInput(format!("malformed upload: {}", err.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_limit_adds_slack() {
        assert_eq!(body_limit(10), 10 + BODY_SLACK_BYTES as usize);
        assert_eq!(body_limit(u64::MAX), usize::MAX);
    }

    #[test]
    fn blank_fields_are_absent() {
        assert_eq!(non_empty("  ".into()), None);
        assert_eq!(non_empty(" pdf ".into()), Some("pdf".into()));
    }
}
