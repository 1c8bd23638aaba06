// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wandelwerk engine: scoped workspaces, capability dispatch, result
// delivery and the outcome log.

pub mod converter;
pub mod delivery;
pub mod dispatcher;
pub mod external;
pub mod outcome;
pub mod pipeline;
pub mod workspace;

pub use converter::{Converter, ConverterSet};
pub use delivery::Delivery;
pub use dispatcher::{Dispatcher, Limits};
pub use outcome::{Outcome, OutcomeLog, OutcomeRecord, OutcomeSink, PendingOutcome};
pub use pipeline::ConversionService;
pub use workspace::{Workspace, WorkspaceManager};
