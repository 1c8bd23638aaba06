// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mapping of conversion failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use wandelwerk_core::error::{FailureKind, WandelwerkError};
use wandelwerk_core::human_errors::{HumanError, humanize_error};

/// A request failure on its way to the caller.
#[derive(Debug)]
pub struct ApiError(pub WandelwerkError);

impl From<WandelwerkError> for ApiError {
    fn from(err: WandelwerkError) -> Self {
        Self(err)
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: FailureKind,
    #[serde(flatten)]
    pub human: HumanError,
}

/// HTTP status for a failure kind.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnsupportedConversion => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        FailureKind::InputTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        FailureKind::InvalidInput | FailureKind::InvalidOptions => StatusCode::BAD_REQUEST,
        FailureKind::ResourceExhausted => StatusCode::INSUFFICIENT_STORAGE,
        FailureKind::ExternalToolFailure => StatusCode::BAD_GATEWAY,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::DeliveryFailure | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(%kind, error = %self.0, "Request failed");
        } else {
            tracing::debug!(%kind, error = %self.0, "Request refused");
        }
        let body = ErrorBody {
            kind,
            human: humanize_error(&self.0),
        };
        (status, Json(body)).into_response()
    }
}
