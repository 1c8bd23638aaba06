// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared helpers for the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use wandelwerk_core::config::AppConfig;
use wandelwerk_core::types::{ConversionOptions, ConversionRequest, Format, InputFile, Operation};
use wandelwerk_engine::outcome::OutcomeEntry;
use wandelwerk_engine::{ConversionService, Dispatcher, Outcome, OutcomeLog, WorkspaceManager};

/// A service over a private workspace root and an in-memory outcome log.
pub struct Harness {
    pub root: TempDir,
    pub log: Arc<OutcomeLog>,
    pub service: ConversionService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::with_dispatcher(Dispatcher::new(&config))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        let root = tempfile::tempdir().expect("workspace root");
        let log = Arc::new(OutcomeLog::open_in_memory().expect("outcome log"));
        let service = ConversionService::new(dispatcher, WorkspaceManager::new(root.path()), log.clone());
        Self { root, log, service }
    }

    /// Rows with `outcome`, waiting briefly for writes made from `Drop`,
    /// which land on the blocking pool.
    pub async fn wait_for_outcomes(&self, outcome: Outcome, count: usize) -> Vec<OutcomeEntry> {
        for _ in 0..200 {
            let entries = self.log.entries_for_outcome(outcome).expect("outcome query");
            if entries.len() >= count {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} {outcome} outcome(s)");
    }

    /// Number of entries left under the workspace root.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.root.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn request(
    source: Format,
    target: Format,
    operation: Operation,
    inputs: Vec<(&str, Vec<u8>)>,
) -> ConversionRequest {
    let inputs = inputs
        .into_iter()
        .map(|(name, bytes)| InputFile::new(name, bytes))
        .collect();
    ConversionRequest::new(source, target, operation, inputs)
}

pub fn options(pairs: &[(&str, &str)]) -> ConversionOptions {
    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ConversionOptions::from_map(&map).expect("valid options")
}

/// Entry names and contents of a zip archive, in archive order.
pub fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("zip archive");
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).expect("zip entry");
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).expect("zip entry contents");
            (file.name().to_string(), contents)
        })
        .collect()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).expect("script dir");
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}
