// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deterministic ZIP packing for multi-file results.

use std::io::{Cursor, Write};

use tracing::{debug, instrument};
use wandelwerk_core::error::WandelwerkError;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

/// Pack `(name, bytes)` entries into a ZIP archive, in the order given.
///
/// Timestamps and permissions are fixed, so the same entries always yield
/// byte-identical archives.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn pack<N, B>(entries: &[(N, B)]) -> Result<Vec<u8>, WandelwerkError>
where
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut buffer = Vec::new();
    let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
    for (name, bytes) in entries {
        zip.start_file(name.as_ref(), options).map_err(archive_error)?;
        zip.write_all(bytes.as_ref())?;
    }
    zip.finish().map_err(archive_error)?;

    debug!(archive_bytes = buffer.len(), "Archive packed");
    Ok(buffer)
}

fn archive_error(err: zip::result::ZipError) -> WandelwerkError {
    WandelwerkError::ArchiveError(err.to_string())
}
