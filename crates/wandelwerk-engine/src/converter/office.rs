// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Office-suite converter: `soffice --headless --convert-to`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::{CapabilityEntry, ExternalTool};
use wandelwerk_core::types::{ConversionOptions, Format};

use super::{Converter, collect_outputs, input};
use crate::external::run_tool;

/// Drives a headless office suite. Every run uses a private user profile
/// next to the output directory, so concurrent conversions do not contend
/// for the suite's profile lock.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    binary: PathBuf,
}

impl OfficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the command line for converting `input` into `output_dir`.
    pub fn command(&self, entry: &CapabilityEntry, input: &Path, output_dir: &Path) -> Command {
        let profile = output_dir.with_file_name("profile");
        let mut command = Command::new(&self.binary);
        command
            .arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck")
            .arg(format!("-env:UserInstallation={}", file_url(&profile)));
        if entry.source == Format::Pdf {
            // Open the PDF in Writer rather than Draw.
            command.arg("--infilter=writer_pdf_import");
        }
        command
            .arg("--convert-to")
            .arg(export_filter(entry.target))
            .arg("--outdir")
            .arg(output_dir)
            .arg(input);
        command
    }
}

/// `file://` URL for a local path. Everything outside the unreserved set,
/// `/` and `:` is percent-encoded byte by byte.
fn file_url(path: &Path) -> String {
    let bytes = path.as_os_str().as_encoded_bytes();
    let mut url = String::from("file://");
    // Drive-letter paths need the third slash.
    if !bytes.starts_with(b"/") {
        url.push('/');
    }
    for &byte in bytes {
        match byte {
            b'\\' if cfg!(windows) => url.push('/'),
            b'/' | b':' | b'-' | b'.' | b'_' | b'~' => url.push(byte as char),
            byte if byte.is_ascii_alphanumeric() => url.push(byte as char),
            byte => url.push_str(&format!("%{byte:02X}")),
        }
    }
    url
}

/// `--convert-to` argument: the extension, plus an explicit export filter
/// where the extension alone is ambiguous.
fn export_filter(target: Format) -> String {
    match target {
        Format::Docx => "docx:MS Word 2007 XML".into(),
        Format::Xlsx => "xlsx:Calc MS Excel 2007 XML".into(),
        Format::Pptx => "pptx:Impress MS PowerPoint 2007 XML".into(),
        other => other.extension().into(),
    }
}

#[async_trait]
impl Converter for OfficeConverter {
    fn tool(&self) -> ExternalTool {
        ExternalTool::OfficeSuite
    }

    #[instrument(skip_all, fields(source = %entry.source, target = %entry.target))]
    async fn run(
        &self,
        entry: &CapabilityEntry,
        inputs: &[PathBuf],
        output_dir: &Path,
        _options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>> {
        let input = input(inputs, 0)?;
        run_tool(self.tool(), self.command(entry, input, output_dir)).await?;

        // soffice can exit 0 without writing anything (e.g. a failed import).
        let outputs = collect_outputs(output_dir)?;
        if outputs.is_empty() {
            return Err(WandelwerkError::ExternalToolFailure {
                tool: self.tool(),
                diagnostics: format!(
                    "no {} output was produced",
                    entry.target.extension()
                ),
            });
        }

        info!(outputs = outputs.len(), "Office conversion finished");
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use wandelwerk_core::registry::CapabilityRegistry;
    use wandelwerk_core::types::Operation;

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn profile_url_is_percent_encoded() {
        let entry = CapabilityRegistry::standard()
            .lookup(Format::Docx, Format::Pdf)
            .unwrap();
        let command = OfficeConverter::new("soffice").command(
            entry,
            Path::new("/srv/my work/100%/in/input_1.docx"),
            Path::new("/srv/my work/100%/out"),
        );
        assert!(
            args(&command).contains(&"-env:UserInstallation=file:///srv/my%20work/100%25/profile".to_string())
        );
        assert_eq!(file_url(Path::new("/tmp/Grüße")), "file:///tmp/Gr%C3%BC%C3%9Fe");
    }

    #[test]
    fn docx_to_pdf_command_line() {
        let entry = CapabilityRegistry::standard()
            .lookup(Format::Docx, Format::Pdf)
            .unwrap();
        let converter = OfficeConverter::new("soffice");
        let command = converter.command(
            entry,
            Path::new("/ws/in/input_1.docx"),
            Path::new("/ws/out"),
        );

        assert_eq!(command.as_std().get_program(), OsStr::new("soffice"));
        assert_eq!(
            args(&command),
            vec![
                "--headless",
                "--norestore",
                "--nolockcheck",
                "-env:UserInstallation=file:///ws/profile",
                "--convert-to",
                "pdf",
                "--outdir",
                "/ws/out",
                "/ws/in/input_1.docx",
            ]
        );
    }

    #[test]
    fn pdf_import_uses_writer_filter() {
        let entry = CapabilityRegistry::standard()
            .lookup_operation(Format::Pdf, Format::Docx, Operation::Convert)
            .unwrap();
        let command = OfficeConverter::new("soffice").command(
            entry,
            Path::new("/ws/in/input_1.pdf"),
            Path::new("/ws/out"),
        );
        let args = args(&command);
        assert!(args.contains(&"--infilter=writer_pdf_import".to_string()));
        assert!(args.contains(&"docx:MS Word 2007 XML".to_string()));
    }
}
