// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native converter: tabular and text conversions built directly on the
// parsing crates (csv, calamine, lopdf text extraction, printpdf).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};
use wandelwerk_core::error::{Result, WandelwerkError};
use wandelwerk_core::registry::{CapabilityEntry, ExternalTool};
use wandelwerk_core::types::{ConversionOptions, Format};
use wandelwerk_document::sheet::{self, Sheet, XlsxWriter};
use wandelwerk_document::{PdfReader, PdfWriter};

use super::{Converter, blocking, input, output_path, write_output};

/// Sheet name for workbooks built from a single table.
const DEFAULT_SHEET: &str = "Sheet1";

#[derive(Debug, Clone, Default)]
pub struct NativeConverter;

impl NativeConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Converter for NativeConverter {
    fn tool(&self) -> ExternalTool {
        ExternalTool::Native
    }

    #[instrument(skip_all, fields(source = %entry.source, target = %entry.target))]
    async fn run(
        &self,
        entry: &CapabilityEntry,
        inputs: &[PathBuf],
        output_dir: &Path,
        _options: &ConversionOptions,
    ) -> Result<Vec<PathBuf>> {
        let (source, target) = (entry.source, entry.target);
        let input = input(inputs, 0)?.clone();
        let output_dir = output_dir.to_path_buf();

        blocking(self.tool(), move || {
            let bytes = std::fs::read(&input)?;
            match (source, target) {
                (Format::Csv, Format::Xlsx) => {
                    let rows = sheet::read_csv(&bytes)?;
                    write_workbook(&input, &output_dir, rows)
                }
                (Format::Xlsx | Format::Xls | Format::Ods, Format::Csv) => {
                    workbook_to_csv(&bytes, &input, &output_dir)
                }
                (Format::Pdf, Format::Xlsx) => {
                    let text = PdfReader::from_bytes(&bytes)?.extract_text()?;
                    write_workbook(&input, &output_dir, content_rows(&text))
                }
                (Format::Pdf, Format::Text) => {
                    let text = PdfReader::from_bytes(&bytes)?.extract_text()?;
                    let path = output_path(&output_dir, &input, "txt");
                    std::fs::write(&path, text)?;
                    Ok(vec![path])
                }
                (Format::Text, Format::Pdf) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let pdf = PdfWriter::a4().create_from_text(&text)?;
                    let path = output_path(&output_dir, &input, "pdf");
                    std::fs::write(&path, pdf)?;
                    Ok(vec![path])
                }
                (source, target) => Err(WandelwerkError::ExternalToolFailure {
                    tool: ExternalTool::Native,
                    diagnostics: format!("no native conversion from {source} to {target}"),
                }),
            }
        })
        .await
    }
}

fn write_workbook(input: &Path, output_dir: &Path, rows: Vec<Vec<String>>) -> Result<Vec<PathBuf>> {
    let mut writer = XlsxWriter::new();
    writer.add_sheet(Sheet::new(DEFAULT_SHEET, rows));
    let path = output_path(output_dir, input, "xlsx");
    std::fs::write(&path, writer.to_bytes()?)?;
    Ok(vec![path])
}

/// One CSV per worksheet. A single-sheet workbook keeps the input's name;
/// otherwise each file is named after its sheet.
fn workbook_to_csv(bytes: &[u8], input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let sheets = sheet::read_workbook(bytes)?;
    if let [only] = sheets.as_slice() {
        let path = output_path(output_dir, input, "csv");
        std::fs::write(&path, sheet::write_csv(&only.rows)?)?;
        return Ok(vec![path]);
    }

    let mut used = HashSet::new();
    let mut outputs = Vec::with_capacity(sheets.len());
    for sheet in &sheets {
        let base = file_safe(&sheet.name);
        let mut name = base.clone();
        let mut counter = 2;
        while !used.insert(name.to_lowercase()) {
            name = format!("{base}_{counter}");
            counter += 1;
        }
        debug!(sheet = %sheet.name, file = %name, "Writing sheet as CSV");
        outputs.push(write_output(
            output_dir,
            &format!("{name}.csv"),
            &sheet::write_csv(&sheet.rows)?,
        )?);
    }
    Ok(outputs)
}

/// Sheet name reduced to characters safe in an archive entry name.
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "sheet".into()
    } else {
        cleaned
    }
}

/// Extracted PDF text as a single `Content` column, one non-blank line per
/// row.
fn content_rows(text: &str) -> Vec<Vec<String>> {
    std::iter::once(vec!["Content".to_string()])
        .chain(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| vec![line.to_string()]),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_rows_skip_blank_lines() {
        let rows = content_rows("  first \n\n second\n");
        assert_eq!(
            rows,
            vec![vec!["Content"], vec!["first"], vec!["second"]]
                .into_iter()
                .map(|row| row.into_iter().map(String::from).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn file_safe_names() {
        assert_eq!(file_safe("Q1/Q2 *draft*"), "Q1_Q2 _draft_");
        assert_eq!(file_safe("..hidden"), "hidden");
        assert_eq!(file_safe("///"), "___");
        assert_eq!(file_safe("  "), "sheet");
    }
}
