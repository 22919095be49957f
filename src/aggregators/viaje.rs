//! "viaje" exports: expanded trips with commune names already attached.
//!
//! Trips starting or ending at locations without a commune (rail stations,
//! mostly) are resolved through the extra-location table by location name.

use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::aggregators::types::{AggregateMapping, ErrorSet};
use crate::aggregators::utility::{
    delimited_reader, field, location_key, normalize_commune, parse_float,
};
use crate::archive::open_text;
use crate::error::Result;
use crate::reference::ReferenceTable;

const HEADER_ROWS: usize = 2;
const ORIGIN_NAME: usize = 10;
const DESTINATION_NAME: usize = 11;
const ORIGIN_COMMUNE: usize = 12;
const DESTINATION_COMMUNE: usize = 13;
const TRIP_VALUE: usize = 23;

/// Fills in whichever side is missing from the extra-location table.
///
/// Returns the names that still could not be resolved, title-cased.
pub fn resolve_extra_locations(
    origin_name: &str,
    destination_name: &str,
    start: &mut Option<String>,
    end: &mut Option<String>,
    extra_locations: &ReferenceTable<String>,
) -> ErrorSet {
    let mut errors = ErrorSet::new();
    for (name, commune) in [(origin_name, start), (destination_name, end)] {
        if commune.is_some() {
            continue;
        }
        let key = location_key(name);
        match extra_locations.get(&key) {
            Some(found) => *commune = Some(found.clone()),
            None => {
                errors.insert(key);
            }
        }
    }
    errors
}

/// Sums expanded trips by `(origin commune, destination commune)`.
///
/// A row is only accumulated when both communes resolve; otherwise the
/// unresolved location names go to the returned [`ErrorSet`].
pub fn process_viaje_data(
    path: impl AsRef<Path>,
    extra_locations: &ReferenceTable<String>,
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
        accumulate_row(path, &row, extra_locations, &mut trips, &mut errors)?;
    }

    if rows == 0 {
        warn!(file = %path.display(), "File has no data rows");
        return Ok((None, errors));
    }
    Ok((Some(trips), errors))
}

fn accumulate_row(
    path: &Path,
    row: &StringRecord,
    extra_locations: &ReferenceTable<String>,
    trips: &mut AggregateMapping<f64>,
    errors: &mut ErrorSet,
) -> Result<()> {
    let value = parse_float(path, row, TRIP_VALUE)?;
    let mut start = normalize_commune(field(path, row, ORIGIN_COMMUNE)?);
    let mut end = normalize_commune(field(path, row, DESTINATION_COMMUNE)?);

    if start.is_none() || end.is_none() {
        let unresolved = resolve_extra_locations(
            field(path, row, ORIGIN_NAME)?,
            field(path, row, DESTINATION_NAME)?,
            &mut start,
            &mut end,
            extra_locations,
        );
        if !unresolved.is_empty() {
            errors.extend(unresolved);
            return Ok(());
        }
    }

    if let (Some(start), Some(end)) = (start, end) {
        trips.accumulate(&start, &end, value);
    }
    Ok(())
}
