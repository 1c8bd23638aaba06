// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet module: tabular data read from CSV and workbooks, written back as CSV
// or XLSX.

pub mod delimited;
pub mod workbook;
pub mod xlsx;

pub use delimited::{read_csv, write_csv};
pub use workbook::read_workbook;
pub use xlsx::XlsxWriter;

/// One worksheet of string cells, row-major. Rows may differ in length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// True when no row has a non-empty cell.
    pub fn is_blank(&self) -> bool {
        self.rows.iter().flatten().all(|cell| cell.is_empty())
    }
}
