// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Settings come from `AppConfig::default()`, optionally replaced by a JSON
// file, then overridden field by field from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WandelwerkError};

/// Persistent service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ceiling on the total bytes uploaded in one request.
    pub max_file_size_bytes: u64,
    /// Ceiling on PDF pages per request (summed across merge inputs).
    pub max_pdf_pages: u32,
    /// Ceiling on images going into, or pages rendered out of, one request.
    pub max_image_batch_pages: u32,
    /// Wall-clock budget for one capability invocation.
    pub external_tool_timeout_seconds: u64,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Parent directory for per-request workspaces.
    pub workspace_root: PathBuf,
    /// Append-only outcome log (SQLite database).
    pub outcome_log_path: PathBuf,
    /// Office suite executable.
    pub office_binary: String,
    /// PDF rasteriser executable.
    pub pdftoppm_binary: String,
    /// Default rasterisation resolution.
    pub render_dpi: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            max_pdf_pages: 100,
            max_image_batch_pages: 20,
            external_tool_timeout_seconds: 60,
            bind_address: "127.0.0.1:8080".into(),
            workspace_root: std::env::temp_dir(),
            outcome_log_path: PathBuf::from("wandelwerk-outcomes.db"),
            office_binary: "soffice".into(),
            pdftoppm_binary: "pdftoppm".into(),
            render_dpi: 150,
        }
    }
}

impl AppConfig {
    /// Load settings: defaults, then the optional JSON file, then the process
    /// environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON configuration file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|err| {
            WandelwerkError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Apply overrides from a key lookup (normally the environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = parse_var(&lookup, "MAX_FILE_SIZE_BYTES")? {
            self.max_file_size_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_PDF_PAGES")? {
            self.max_pdf_pages = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_IMAGE_BATCH_PAGES")? {
            self.max_image_batch_pages = v;
        }
        if let Some(v) = parse_var(&lookup, "EXTERNAL_TOOL_TIMEOUT_SECONDS")? {
            self.external_tool_timeout_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, "WANDELWERK_RENDER_DPI")? {
            self.render_dpi = v;
        }
        if let Some(v) = lookup("WANDELWERK_BIND") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("WANDELWERK_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("WANDELWERK_OUTCOME_LOG") {
            self.outcome_log_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("WANDELWERK_OFFICE_BINARY") {
            self.office_binary = v;
        }
        if let Some(v) = lookup("WANDELWERK_PDFTOPPM_BINARY") {
            self.pdftoppm_binary = v;
        }

        if self.external_tool_timeout_seconds == 0 {
            return Err(WandelwerkError::Config(
                "EXTERNAL_TOOL_TIMEOUT_SECONDS must be greater than zero".into(),
            ));
        }
        Ok(self)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.external_tool_timeout_seconds)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WandelwerkError::Config(format!("{key}: `{raw}` is not a valid number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_ceilings() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size_bytes, 52_428_800);
        assert_eq!(config.max_pdf_pages, 100);
        assert_eq!(config.max_image_batch_pages, 20);
        assert_eq!(config.tool_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn environment_overrides_apply() {
        let config = AppConfig::default()
            .with_overrides(lookup_from(&[
                ("MAX_FILE_SIZE_BYTES", "1024"),
                ("MAX_PDF_PAGES", " 5 "),
                ("EXTERNAL_TOOL_TIMEOUT_SECONDS", "3"),
                ("WANDELWERK_OFFICE_BINARY", "/opt/libreoffice/program/soffice"),
            ]))
            .unwrap();
        assert_eq!(config.max_file_size_bytes, 1024);
        assert_eq!(config.max_pdf_pages, 5);
        assert_eq!(config.tool_timeout(), Duration::from_secs(3));
        assert_eq!(config.office_binary, "/opt/libreoffice/program/soffice");
        assert_eq!(config.max_image_batch_pages, 20);
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let err = AppConfig::default()
            .with_overrides(lookup_from(&[("MAX_PDF_PAGES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_PDF_PAGES"));

        assert!(AppConfig::default()
            .with_overrides(lookup_from(&[("EXTERNAL_TOOL_TIMEOUT_SECONDS", "0")]))
            .is_err());
    }

    #[test]
    fn json_file_keeps_defaults_for_missing_fields() {
        let config: AppConfig = serde_json::from_str(r#"{ "max_pdf_pages": 7 }"#).unwrap();
        assert_eq!(config.max_pdf_pages, 7);
        assert_eq!(config.max_image_batch_pages, 20);
    }
}
