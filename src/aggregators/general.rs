//! "general" exports: one summary row per day, pipe-separated.

use std::path::Path;

use tracing::warn;

use crate::aggregators::utility::{delimited_reader, field, parse_int};
use crate::archive::open_text;
use crate::error::Result;

const DATE: usize = 0;
const TOTAL_TRANSACTIONS: usize = 12;

/// Reads the date and total transaction count from the first data row.
///
/// Returns `Ok(None)` and logs a warning when the file has no data row.
pub fn process_general_data(path: impl AsRef<Path>) -> Result<Option<(String, i64)>> {
    let path = path.as_ref();
    let text = open_text(path)?;
    let mut reader = delimited_reader(&text, b'|');
    let mut records = reader.records();

    // header
    if records.next().transpose()?.is_none() {
        warn!(file = %path.display(), "File is empty");
        return Ok(None);
    }
    let Some(row) = records.next().transpose()? else {
        warn!(file = %path.display(), "File has no data rows");
        return Ok(None);
    };

    let date = field(path, &row, DATE)?.to_string();
    let total = parse_int(path, &row, TOTAL_TRANSACTIONS)?;
    Ok(Some((date, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::fs;

    const HEADER: &str = "fecha|a|b|c|d|e|f|g|h|i|j|k|total\n";

    #[test]
    fn test_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2018-10-01.general");
        fs::write(
            &path,
            format!("{HEADER}2018-10-01|1|2|3|4|5|6|7|8|9|10|11|5930344\n2018-10-01|0|0|0|0|0|0|0|0|0|0|0|1\n"),
        )
        .unwrap();

        assert_eq!(
            process_general_data(&path).unwrap(),
            Some(("2018-10-01".to_string(), 5930344))
        );
    }

    #[test]
    fn test_empty_and_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("2018-nodata.general");
        let header_only = dir.path().join("2018-10-02.general");
        fs::write(&empty, "").unwrap();
        fs::write(&header_only, HEADER).unwrap();

        assert_eq!(process_general_data(&empty).unwrap(), None);
        assert_eq!(process_general_data(&header_only).unwrap(), None);
    }

    #[test]
    fn test_non_numeric_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2018-10-01.general");
        fs::write(&path, format!("{HEADER}2018-10-01|1|2|3|4|5|6|7|8|9|10|11|n/a\n")).unwrap();

        let err = process_general_data(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }), "{err}");
    }
}
