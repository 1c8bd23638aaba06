// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// API route definitions.

use std::collections::BTreeSet;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use wandelwerk_core::registry::CapabilityEntry;
use wandelwerk_core::types::Format;
use wandelwerk_engine::ConversionService;

use crate::error::ApiError;
use crate::upload::{body_limit, read_request};

/// Shared application state.
pub type AppState = ConversionService;

/// Create API routes.
pub fn create_routes(service: ConversionService) -> Router {
    let limit = body_limit(service.dispatcher().limits().max_file_size_bytes);
    Router::new()
        .route("/health", get(health_check))
        .route("/conversions", get(list_conversions))
        .route("/convert", post(convert))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(service)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "wandelwerk",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConversionsQuery {
    pub source: Option<String>,
}

/// One registry entry as listed by the API.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversionInfo {
    pub source: String,
    pub target: String,
    pub operation: String,
    pub tool: String,
    pub inputs: String,
}

impl From<&CapabilityEntry> for ConversionInfo {
    fn from(entry: &CapabilityEntry) -> Self {
        Self {
            source: entry.source.to_string(),
            target: entry.target.to_string(),
            operation: entry.operation.to_string(),
            tool: entry.tool.to_string(),
            inputs: entry.arity.to_string(),
        }
    }
}

/// Targets reachable from one source format.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetList {
    pub source: String,
    pub targets: Vec<String>,
}

/// Every supported conversion, or the targets for `?source=`.
async fn list_conversions(
    State(service): State<AppState>,
    Query(query): Query<ConversionsQuery>,
) -> Result<Response, ApiError> {
    let registry = service.registry();
    let Some(source) = query.source else {
        let entries: Vec<ConversionInfo> = registry.entries().map(ConversionInfo::from).collect();
        return Ok(Json(entries).into_response());
    };

    let source: Format = source.parse()?;
    let targets: BTreeSet<Format> = registry.supported_targets(source);
    Ok(Json(TargetList {
        source: source.to_string(),
        targets: targets.iter().map(Format::to_string).collect(),
    })
    .into_response())
}

/// Upload, convert, and stream the artifact back.
async fn convert(
    State(service): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let max_bytes = service.dispatcher().limits().max_file_size_bytes;
    let request = read_request(multipart, max_bytes).await?;
    let delivery = service.process(request).await?;

    info!(
        filename = %delivery.filename(),
        media_type = %delivery.media_type(),
        bytes = delivery.len(),
        "Sending artifact"
    );
    let headers = [
        (CONTENT_TYPE, delivery.media_type().to_owned()),
        (CONTENT_DISPOSITION, delivery.content_disposition()),
        (CONTENT_LENGTH, delivery.len().to_string()),
    ];
    Ok((headers, Body::from_stream(delivery.into_stream())).into_response())
}
