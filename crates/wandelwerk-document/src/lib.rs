// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// wandelwerk-document: In-process document operations for Wandelwerk.
//
// Provides PDF operations (read, create, merge, split, rotate, compress,
// extract), image processing (resize, rotate, re-encode), spreadsheet I/O
// (CSV, workbook reading, XLSX writing), and deterministic ZIP packing.

pub mod archive;
pub mod image;
pub mod pdf;
pub mod sheet;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

// Re-export the primary structs so callers can use `wandelwerk_document::PdfReader` etc.
pub use crate::image::processor::ImageProcessor;
pub use pdf::reader::PdfReader;
pub use pdf::writer::PdfWriter;
pub use sheet::{Sheet, XlsxWriter};
