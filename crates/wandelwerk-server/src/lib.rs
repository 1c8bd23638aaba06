// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wandelwerk HTTP surface: multipart upload in, converted artifact out.

pub mod error;
pub mod routes;
pub mod upload;

use axum::Router;
use tower_http::trace::TraceLayer;
use wandelwerk_engine::ConversionService;

pub use error::ApiError;
pub use routes::create_routes;

/// The complete application: API routes under `/api` with request tracing.
pub fn app(service: ConversionService) -> Router {
    Router::new()
        .nest("/api", create_routes(service))
        .layer(TraceLayer::new_for_http())
}
