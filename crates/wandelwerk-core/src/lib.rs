// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wandelwerk: Core types, errors, and the capability registry shared across
// all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod registry;
pub mod types;

pub use config::AppConfig;
pub use error::{FailureKind, WandelwerkError};
pub use registry::{CapabilityEntry, CapabilityRegistry, ExternalTool, InputArity};
pub use types::*;
