// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subprocess plumbing shared by the converters that shell out.

use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, warn};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::ExternalTool;

/// Upper bound on diagnostic text kept from a failing tool.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

/// Run `command` to completion on behalf of `tool`.
///
/// The child is killed if the returned future is dropped, so wrapping this in
/// `tokio::time::timeout` (or cancelling the request) never leaks a process.
/// A spawn failure or non-zero exit becomes `ExternalToolFailure` carrying
/// the tail of the tool's stderr (or stdout when stderr is empty).
pub async fn run_tool(tool: ExternalTool, mut command: Command) -> Result<Output> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(%tool, %program, "Spawning external tool");
    let output = command
        .output()
        .await
        .map_err(|err| WandelwerkError::ExternalToolFailure {
            tool,
            diagnostics: format!("could not start `{program}`: {err}"),
        })?;

    if output.status.success() {
        return Ok(output);
    }

    let diagnostics = diagnostics(&output);
    warn!(%tool, %program, status = %output.status, "External tool failed");
    Err(WandelwerkError::ExternalToolFailure {
        tool,
        diagnostics: format!("`{program}` exited with {}: {diagnostics}", output.status),
    })
}

fn diagnostics(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    let text = text.trim();
    if text.is_empty() {
        return "no output".into();
    }
    let skip = text.chars().count().saturating_sub(MAX_DIAGNOSTIC_CHARS);
    text.chars().skip(skip).collect()
}
