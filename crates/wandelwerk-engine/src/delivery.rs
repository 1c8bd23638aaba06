// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result delivery: hands a finished artifact to the transport and releases
// the request's workspace once the last byte has been taken.

use std::io;
use std::mem;

use futures::Stream;
use futures::stream;
use tracing::{debug, warn};
use wandelwerk_core::error::FailureKind;
use wandelwerk_core::types::ConversionResult;

use crate::outcome::{Outcome, PendingOutcome};
use crate::workspace::Workspace;

/// Size of each chunk yielded by [`Delivery::into_stream`].
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A completed conversion waiting to be sent.
///
/// Owns the artifact and the workspace guard. Dropping a delivery before
/// the artifact was fully taken records the request as a delivery failure.
pub struct Delivery {
    result: ConversionResult,
    workspace: Option<Workspace>,
    outcome: Option<PendingOutcome>,
}

impl Delivery {
    pub fn new(result: ConversionResult, workspace: Workspace, outcome: PendingOutcome) -> Self {
        Self {
            result,
            workspace: Some(workspace),
            outcome: Some(outcome),
        }
    }

    pub fn media_type(&self) -> &str {
        &self.result.media_type
    }

    pub fn filename(&self) -> &str {
        &self.result.filename
    }

    pub fn len(&self) -> usize {
        self.result.artifact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.artifact.is_empty()
    }

    /// `Content-Disposition` value for the suggested filename.
    pub fn content_disposition(&self) -> String {
        content_disposition(&self.result.filename)
    }

    /// Take the whole artifact at once.
    pub async fn into_bytes(self) -> Vec<u8> {
        self.into_result().await.artifact
    }

    /// Take the whole result at once.
    pub async fn into_result(mut self) -> ConversionResult {
        self.delivered().await;
        mem::replace(
            &mut self.result,
            ConversionResult {
                artifact: Vec::new(),
                media_type: String::new(),
                filename: String::new(),
            },
        )
    }

    /// Stream the artifact in [`CHUNK_SIZE`] pieces.
    ///
    /// Delivery counts as complete when the last chunk is yielded. Dropping
    /// the stream earlier counts as a delivery failure.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
        stream::unfold((self, 0usize), |(mut delivery, offset)| async move {
            let len = delivery.result.artifact.len();
            if offset >= len {
                delivery.delivered().await;
                return None;
            }
            let end = (offset + CHUNK_SIZE).min(len);
            let chunk = delivery.result.artifact[offset..end].to_vec();
            if end == len {
                delivery.delivered().await;
            }
            Some((Ok(chunk), (delivery, end)))
        })
    }

    async fn delivered(&mut self) {
        if let Some(outcome) = self.outcome.take() {
            debug!(request_id = %outcome.request_id(), bytes = self.len(), "Artifact delivered");
            outcome
                .finish(Outcome::Completed, None, Some(self.len() as u64))
                .await;
        }
        self.workspace = None;
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(outcome) = self.outcome.take() {
            warn!(request_id = %outcome.request_id(), "Delivery abandoned before the last chunk");
            outcome.finish_detached(Outcome::Failed, Some(FailureKind::DeliveryFailure), None);
        }
    }
}

/// `attachment; filename="…"`, plus an RFC 5987 `filename*` when the name is
/// not plain ASCII.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    if filename.is_ascii() {
        return format!("attachment; filename=\"{fallback}\"");
    }
    let mut encoded = String::new();
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
