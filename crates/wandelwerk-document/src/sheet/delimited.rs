// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CSV reading and writing.

use tracing::{debug, instrument};
use wandelwerk_core::error::WandelwerkError;

/// Parse CSV bytes into rows. No header row is assumed and ragged rows are
/// kept as they are. A leading UTF-8 byte-order mark is ignored.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn read_csv(data: &[u8]) -> Result<Vec<Vec<String>>, WandelwerkError> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| {
            WandelwerkError::SpreadsheetError(format!("CSV row {}: {}", index + 1, err))
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(rows = rows.len(), "CSV parsed");
    Ok(rows)
}

/// Serialise rows as RFC 4180 CSV with `\n` line endings.
pub fn write_csv(rows: &[Vec<String>]) -> Result<Vec<u8>, WandelwerkError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| WandelwerkError::SpreadsheetError(format!("CSV write: {}", err)))?;
    }

    writer
        .into_inner()
        .map_err(|err| WandelwerkError::SpreadsheetError(format!("CSV flush: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_and_ragged_rows() {
        let rows = read_csv(b"\xEF\xBB\xBFname,note\n\"Doe, J\",\"said \"\"hi\"\"\"\nsolo\n").unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["name".to_string(), "note".to_string()],
                vec!["Doe, J".to_string(), "said \"hi\"".to_string()],
                vec!["solo".to_string()],
            ]
        );
    }

    #[test]
    fn writes_with_quoting() {
        let rows = vec![
            vec!["a".to_string(), "b,c".to_string()],
            vec!["".to_string()],
        ];
        let bytes = write_csv(&rows).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a,\"b,c\"\n\"\"\n");
    }

    #[test]
    fn invalid_utf8_is_a_spreadsheet_error() {
        let err = read_csv(b"ok\n\xff\xfe\n").unwrap_err();
        assert!(matches!(err, WandelwerkError::SpreadsheetError(_)));
    }
}
