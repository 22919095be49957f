//! "trip" exports: expanded trips between fare zones, resolved to communes
//! through the zone dictionary.

use std::path::Path;

use tracing::warn;

use crate::aggregators::types::{AggregateMapping, ErrorSet};
use crate::aggregators::utility::{delimited_reader, field, parse_float};
use crate::archive::open_text;
use crate::error::Result;
use crate::reference::ReferenceTable;

const HEADER_ROWS: usize = 2;
const TRIP_VALUE: usize = 1;
const ORIGIN_ZONE: usize = 24;
const DESTINATION_ZONE: usize = 25;

/// Sums expanded trips by `(origin commune, destination commune)`.
///
/// Rows whose zones are missing from `zones` are skipped and their codes
/// recorded in the returned [`ErrorSet`]. `Ok((None, _))` means the file had
/// no data to contribute.
pub fn process_trip_data(
    path: impl AsRef<Path>,
    zones: &ReferenceTable<String>,
) -> Result<(Option<AggregateMapping<f64>>, ErrorSet)> {
    let path = path.as_ref();
    let mut errors = ErrorSet::new();
    let text = open_text(path)?;
    let mut reader = delimited_reader(&text, b'|');
    let mut records = reader.records();

    for _ in 0..HEADER_ROWS {
        if records.next().transpose()?.is_none() {
            warn!(file = %path.display(), "File is empty");
            return Ok((None, errors));
        }
    }

    let mut trips = AggregateMapping::new();
    let mut rows = 0usize;
    for result in records {
        let row = result?;
        rows += 1;
        let value = parse_float(path, &row, TRIP_VALUE)?;
        let origin = field(path, &row, ORIGIN_ZONE)?;
        let destination = field(path, &row, DESTINATION_ZONE)?;

        match (zones.get(origin), zones.get(destination)) {
            (Some(start), Some(end)) => trips.accumulate(start, end, value),
            (start, end) => {
                if start.is_none() {
                    errors.insert(origin.to_string());
                }
                if end.is_none() {
                    errors.insert(destination.to_string());
                }
            }
        }
    }

    if rows == 0 {
        warn!(file = %path.display(), "File has no data rows");
        return Ok((None, errors));
    }
    Ok((Some(trips), errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn trip_row(value: &str, origin: &str, destination: &str) -> String {
        let mut fields = vec!["-"; 26];
        fields[TRIP_VALUE] = value;
        fields[ORIGIN_ZONE] = origin;
        fields[DESTINATION_ZONE] = destination;
        fields.join("|")
    }

    fn zones() -> ReferenceTable<String> {
        [
            ("135", "CERRO NAVIA"),
            ("56", "RENCA"),
            ("522", "PUDAHUEL"),
            ("137", "CERRO NAVIA"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn write_trips(dir: &Path, rows: &[String]) -> std::path::PathBuf {
        let path = dir.join("2016-03-14.trip");
        let mut text = String::from("header\nsubheader\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_accumulates_by_commune_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trips(
            dir.path(),
            &[
                trip_row("1.31", "135", "56"),
                trip_row("1.33", "56", "522"),
                trip_row("0.5", "137", "56"),
            ],
        );

        let (trips, errors) = process_trip_data(&path, &zones()).unwrap();
        let trips = trips.unwrap();
        assert!(errors.is_empty());
        assert_eq!(trips.get("CERRO NAVIA", "RENCA"), Some(1.31 + 0.5));
        assert_eq!(trips.get("RENCA", "PUDAHUEL"), Some(1.33));
        assert_eq!(trips.len(), 2);
    }

    #[test]
    fn test_unknown_zone_is_recorded_not_accumulated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trips(
            dir.path(),
            &[trip_row("1.31", "135", "999"), trip_row("2.0", "56", "135")],
        );

        let (trips, errors) = process_trip_data(&path, &zones()).unwrap();
        let trips = trips.unwrap();
        assert_eq!(errors.into_iter().collect::<Vec<_>>(), vec!["999"]);
        assert_eq!(trips.get("CERRO NAVIA", "RENCA"), None);
        assert_eq!(trips.get("RENCA", "CERRO NAVIA"), Some(2.0));
    }

    #[test]
    fn test_header_only_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let one_header = dir.path().join("2016-nodata.trip");
        fs::write(&one_header, "header\n").unwrap();
        let both_headers = write_trips(dir.path(), &[]);

        assert_eq!(process_trip_data(&one_header, &zones()).unwrap().0, None);
        assert_eq!(process_trip_data(&both_headers, &zones()).unwrap().0, None);
    }

    #[test]
    fn test_bad_value_fails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trips(dir.path(), &[trip_row("abc", "135", "56")]);

        let err = process_trip_data(&path, &zones()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_short_row_fails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_trips(dir.path(), &["1|1.31|135".to_string()]);

        assert!(matches!(
            process_trip_data(&path, &zones()),
            Err(Error::ShortRow { .. })
        ));
    }
}
