// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Workbook reading (XLSX, XLS, ODS) via calamine.

use std::io::Cursor;

use calamine::{Data, ExcelDateTime, Reader, open_workbook_auto_from_rs};
use chrono::Timelike;
use tracing::{debug, instrument};
use wandelwerk_core::error::WandelwerkError;

use super::Sheet;

/// Read every worksheet of a workbook, in workbook order.
///
/// Cells are rendered as text. Each sheet's rows start at A1: leading empty
/// rows and columns before the used range are kept as blanks so positions
/// survive the round trip to CSV.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn read_workbook(data: &[u8]) -> Result<Vec<Sheet>, WandelwerkError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec())).map_err(|err| {
        WandelwerkError::SpreadsheetError(format!("failed to open workbook: {}", err))
    })?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name).map_err(|err| {
            WandelwerkError::SpreadsheetError(format!("failed to read sheet {}: {}", name, err))
        })?;

        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize];
        for row in range.rows() {
            let mut cells = vec![String::new(); first_col as usize];
            cells.extend(row.iter().map(cell_text));
            while cells.last().is_some_and(String::is_empty) {
                cells.pop();
            }
            rows.push(cells);
        }
        while rows.last().is_some_and(Vec::is_empty) {
            rows.pop();
        }

        debug!(sheet = %name, rows = rows.len(), "Sheet read");
        sheets.push(Sheet::new(name, rows));
    }

    if sheets.is_empty() {
        return Err(WandelwerkError::SpreadsheetError(
            "workbook has no worksheets".into(),
        ));
    }
    Ok(sheets)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => e.to_string(),
        Data::DateTime(dt) => datetime_text(dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Excel stores dates as day serials. Render them the way a CSV reader
/// expects: `2024-01-01`, `2024-01-01 12:00:00`, or `18:00:00` for a bare
/// time of day. Durations become `h:mm:ss`.
fn datetime_text(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        if let Some(duration) = dt.as_duration() {
            let seconds = duration.num_seconds();
            let sign = if seconds < 0 { "-" } else { "" };
            let seconds = seconds.unsigned_abs();
            return format!(
                "{sign}{}:{:02}:{:02}",
                seconds / 3600,
                seconds % 3600 / 60,
                seconds % 60
            );
        }
    }
    match dt.as_datetime() {
        Some(value) if (0.0..1.0).contains(&dt.as_f64()) => value.format("%H:%M:%S").to_string(),
        Some(value) if value.num_seconds_from_midnight() == 0 => value.format("%Y-%m-%d").to_string(),
        Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        // Outside chrono's range; the serial is all that is left.
        None => dt.as_f64().to_string(),
    }
}
