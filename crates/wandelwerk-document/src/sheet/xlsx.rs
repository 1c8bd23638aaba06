// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal XLSX (SpreadsheetML) writer: one worksheet part per sheet, inline
// strings, and numeric cells where the text is an exact decimal.

use std::collections::HashSet;
use std::fmt::Write as _;

use quick_xml::escape::escape;
use tracing::{info, instrument};
use wandelwerk_core::error::WandelwerkError;

use super::Sheet;
use crate::archive;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Excel refuses sheet names longer than this.
const MAX_SHEET_NAME: usize = 31;

const STYLES: &str = concat!(
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill>"#,
    r#"<fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"</styleSheet>"#,
);

/// Accumulates sheets and serialises them as an XLSX package.
#[derive(Debug, Default)]
pub struct XlsxWriter {
    sheets: Vec<Sheet>,
}

impl XlsxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet. Its name is made valid and unique when written.
    pub fn add_sheet(&mut self, sheet: Sheet) -> &mut Self {
        self.sheets.push(sheet);
        self
    }

    /// Serialise the workbook. A workbook without sheets gets one empty
    /// `Sheet1`, since the format requires at least one.
    #[instrument(skip(self), fields(sheets = self.sheets.len()))]
    pub fn to_bytes(&self) -> Result<Vec<u8>, WandelwerkError> {
        let placeholder = [Sheet::new("Sheet1", Vec::new())];
        let sheets: &[Sheet] = if self.sheets.is_empty() {
            &placeholder
        } else {
            &self.sheets
        };
        let names = unique_sheet_names(sheets);

        let mut parts: Vec<(String, String)> = Vec::with_capacity(sheets.len() + 5);
        parts.push(("[Content_Types].xml".into(), content_types(sheets.len())));
        parts.push((
            "_rels/.rels".into(),
            format!(
                r#"{XML_DECL}<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
            ),
        ));
        parts.push(("xl/workbook.xml".into(), workbook_xml(&names)));
        parts.push(("xl/_rels/workbook.xml.rels".into(), workbook_rels(sheets.len())));
        parts.push(("xl/styles.xml".into(), format!("{XML_DECL}{STYLES}")));
        for (index, sheet) in sheets.iter().enumerate() {
            parts.push((
                format!("xl/worksheets/sheet{}.xml", index + 1),
                worksheet_xml(sheet),
            ));
        }

        let bytes = archive::pack(&parts)?;
        info!(bytes = bytes.len(), "XLSX written");
        Ok(bytes)
    }
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
    );
    for n in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn workbook_xml(names: &[String]) -> String {
    let mut xml = format!(r#"{XML_DECL}<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
    for (index, name) in names.iter().enumerate() {
        let n = index + 1;
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name.as_str())
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut xml = format!(r#"{XML_DECL}<Relationships xmlns="{PKG_REL_NS}">"#);
    for n in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        );
    }
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#,
        sheet_count + 1
    );
    xml
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut xml = format!(r#"{XML_DECL}<worksheet xmlns="{MAIN_NS}"><sheetData>"#);
    for (row_index, row) in sheet.rows.iter().enumerate() {
        if row.iter().all(String::is_empty) {
            continue;
        }
        let r = row_index + 1;
        let _ = write!(xml, r#"<row r="{r}">"#);
        for (col_index, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let cell_ref = format!("{}{r}", column_name(col_index));
            if is_exact_number(value) {
                let _ = write!(xml, r#"<c r="{cell_ref}"><v>{value}</v></c>"#);
            } else {
                let _ = write!(
                    xml,
                    r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    escape(strip_control(value).as_str())
                );
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Spreadsheet column letters for a 0-based index: 0 → A, 25 → Z, 26 → AA.
pub fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// A value is stored as a number only when parsing and re-printing it gives
/// the same text, so "007" and "1e3" stay strings.
fn is_exact_number(value: &str) -> bool {
    value
        .parse::<f64>()
        .is_ok_and(|number| number.is_finite() && number.to_string() == value)
}

/// XML 1.0 forbids most C0 control characters, even escaped.
fn strip_control(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Valid, unique sheet names: forbidden characters replaced, length capped,
/// and duplicates suffixed with ` (2)`, ` (3)`, ... (case-insensitively).
fn unique_sheet_names(sheets: &[Sheet]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(sheets.len());
    for (index, sheet) in sheets.iter().enumerate() {
        let mut base: String = sheet
            .name
            .chars()
            .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
            .collect();
        base = base.trim_matches('\'').trim().to_string();
        if base.is_empty() {
            base = format!("Sheet{}", index + 1);
        }
        let base: String = base.chars().take(MAX_SHEET_NAME).collect();

        let mut candidate = base.clone();
        let mut counter = 2;
        while !seen.insert(candidate.to_lowercase()) {
            let suffix = format!(" ({counter})");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            candidate = base.chars().take(keep).collect::<String>() + &suffix;
            counter += 1;
        }
        names.push(candidate);
    }
    names
}
