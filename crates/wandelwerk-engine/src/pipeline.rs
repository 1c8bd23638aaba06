// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion service: drives one request through its lifecycle:
//
//   Received ──validate──▶ Validated ──workspace + convert──▶ Dispatched
//      │                                                        │
//      └──▶ Rejected                              Completed ◀───┴───▶ Failed
//
// Validation runs before any workspace exists. A request that is not
// cancelled mid-flight ends with exactly one outcome record: rejections and
// failures here, completions (or abandoned downloads) when the returned
// `Delivery` is consumed.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use wandelwerk_core::config::AppConfig;
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::CapabilityRegistry;
use wandelwerk_core::types::{ConversionRequest, RequestState};

use crate::delivery::Delivery;
use crate::dispatcher::Dispatcher;
use crate::outcome::{Outcome, OutcomeLog, OutcomeSink, PendingOutcome};
use crate::workspace::WorkspaceManager;

/// Entry point for conversions, shared by every request handler.
#[derive(Clone)]
pub struct ConversionService {
    dispatcher: Arc<Dispatcher>,
    workspaces: WorkspaceManager,
    sink: Arc<dyn OutcomeSink>,
}

impl ConversionService {
    pub fn new(
        dispatcher: Dispatcher,
        workspaces: WorkspaceManager,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            workspaces,
            sink,
        }
    }

    /// Production wiring: standard converters, the configured workspace root
    /// and the SQLite outcome log at `outcome_log_path`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let sink = Arc::new(OutcomeLog::open(&config.outcome_log_path)?);
        Ok(Self::new(
            Dispatcher::new(config),
            WorkspaceManager::new(&config.workspace_root),
            sink,
        ))
    }

    pub fn registry(&self) -> &'static CapabilityRegistry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Validate and run `request`.
    ///
    /// On success the artifact is ready in memory and the workspace is still
    /// held by the returned [`Delivery`]; it is released once the artifact
    /// has been handed over. On error no workspace remains.
    #[instrument(skip_all, fields(request_id = %request.id, source = %request.source, target = %request.target, operation = %request.operation, inputs = request.inputs.len()))]
    pub async fn process(&self, request: ConversionRequest) -> Result<Delivery> {
        let state = RequestState::Received;
        let request = Arc::new(request);

        // Page counting parses whole PDFs and the digest reads every byte.
        let (checked, pending) = {
            let dispatcher = Arc::clone(&self.dispatcher);
            let sink = Arc::clone(&self.sink);
            let request = Arc::clone(&request);
            tokio::task::spawn_blocking(move || {
                let pending = PendingOutcome::new(sink, &request);
                (dispatcher.validate(&request), pending)
            })
            .await
            .map_err(|err| WandelwerkError::InvalidInput(format!("validation aborted: {err}")))?
        };

        if let Err(err) = checked {
            state.transition(RequestState::Rejected)?;
            info!(kind = %err.kind(), %err, "Request rejected");
            pending.finish(Outcome::Rejected, Some(err.kind()), None).await;
            return Err(err);
        }
        let state = state
            .transition(RequestState::Validated)?
            .transition(RequestState::Dispatched)?;

        let run = async {
            let workspace = self.workspaces.acquire(request.id)?;
            let result = self.dispatcher.convert(&request, &workspace).await?;
            Ok::<_, WandelwerkError>((result, workspace))
        };

        match run.await {
            Ok((result, workspace)) => {
                state.transition(RequestState::Completed)?;
                Ok(Delivery::new(result, workspace, pending))
            }
            Err(err) => {
                state.transition(RequestState::Failed)?;
                // A caller error caught by a converter is not an operational fault.
                if err.is_validation() {
                    info!(kind = %err.kind(), %err, "Conversion refused");
                } else {
                    warn!(kind = %err.kind(), %err, "Conversion failed");
                }
                pending.finish(Outcome::Failed, Some(err.kind()), None).await;
                Err(err)
            }
        }
    }
}
