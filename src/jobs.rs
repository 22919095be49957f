//! Report jobs: resolve input files, aggregate, write the report and
//! optionally publish it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::aggregators::general::process_general_data;
use crate::aggregators::stops::StopTransactions;
use crate::aggregators::trip::process_trip_data;
use crate::aggregators::viaje::process_viaje_data;
use crate::aggregators::{AggregateMapping, DailyTotals, ErrorSet};
use crate::config::{METRO_TABLE, METROTREN_TABLE, STOP_TABLE, Settings};
use crate::files::{DATE_FORMAT, DateBounds, date_prefix, file_date, find_files};
use crate::output::{CommuneTrips, write_kepler_map, write_report};
use crate::reference::{
    ReferenceTable, load_commune_table, load_geo_table, load_metro_table, load_stop_table,
    load_zone_table,
};
use crate::storage::ObjectStore;

pub const DAILY_TRANSACTIONS_REPORT: &str = "transaccionesPorDia";
pub const COMMUNE_TRIPS_REPORT: &str = "viajesEntreComunas";
pub const STOP_EXPORT_SUFFIX: &str = "4daytransactionbystop.gz";

/// Total transactions per day from `*general` exports.
#[tracing::instrument(skip(bounds), fields(input_dir = %input_dir.display()))]
pub fn run_general(
    input_dir: &Path,
    output_dir: &Path,
    bounds: Option<DateBounds>,
) -> Result<PathBuf> {
    let files = find_files("general", input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?;
    info!(files = files.len(), "General exports found");

    let mut totals = DailyTotals::default();
    for path in &files {
        let Some((date, total)) = skip_per_file(path, process_general_data(path))?.flatten() else {
            continue;
        };
        if let Some(bounds) = bounds {
            match NaiveDate::parse_from_str(&date, DATE_FORMAT) {
                Ok(day) if bounds.contains(day) => {}
                Ok(_) => {
                    debug!(file = %path.display(), date = %date, "Outside date bounds");
                    continue;
                }
                Err(_) => {
                    warn!(file = %path.display(), date = %date, "Row date is not a date");
                    continue;
                }
            }
        }
        totals.accumulate(&date, total);
    }

    let report = write_report(&totals, output_dir, DAILY_TRANSACTIONS_REPORT)?;
    info!(days = totals.len(), "Daily transactions done");
    Ok(report)
}

/// Expanded trips between communes from `*trip` exports, with fare zones
/// resolved through `zone_table`.
#[tracing::instrument(skip(bounds), fields(input_dir = %input_dir.display()))]
pub fn run_trips(
    input_dir: &Path,
    output_dir: &Path,
    bounds: Option<DateBounds>,
    zone_table: &Path,
) -> Result<PathBuf> {
    let zones = load_zone_table(zone_table)
        .with_context(|| format!("Failed to load {}", zone_table.display()))?;
    info!(zones = zones.len(), "Zone dictionary loaded");

    run_commune_trips("trip", input_dir, output_dir, bounds, |path| {
        process_trip_data(path, &zones)
    })
}

/// Expanded trips between communes from `*viaje` exports, falling back to
/// `extra_location_table` for trips without a commune.
#[tracing::instrument(skip(bounds), fields(input_dir = %input_dir.display()))]
pub fn run_viajes(
    input_dir: &Path,
    output_dir: &Path,
    bounds: Option<DateBounds>,
    extra_location_table: &Path,
) -> Result<PathBuf> {
    let extra_locations: ReferenceTable<String> = load_commune_table(extra_location_table)
        .with_context(|| format!("Failed to load {}", extra_location_table.display()))?;
    info!(locations = extra_locations.len(), "Extra locations loaded");

    run_commune_trips("viaje", input_dir, output_dir, bounds, |path| {
        process_viaje_data(path, &extra_locations)
    })
}

fn run_commune_trips<F>(
    type_tag: &str,
    input_dir: &Path,
    output_dir: &Path,
    bounds: Option<DateBounds>,
    process: F,
) -> Result<PathBuf>
where
    F: Fn(&Path) -> crate::error::Result<(Option<AggregateMapping<f64>>, ErrorSet)>,
{
    let files = find_files(type_tag, input_dir)
        .with_context(|| format!("Failed to list {}", input_dir.display()))?;
    info!(type_tag, files = files.len(), "Exports found");

    let mut report = CommuneTrips::default();
    let mut unresolved = ErrorSet::new();
    for path in files.iter().filter(|path| within_bounds(path, bounds)) {
        let Some((trips, errors)) = skip_per_file(path, process(path.as_path()))? else {
            continue;
        };
        unresolved.extend(errors);
        if let Some(trips) = trips {
            debug!(file = %path.display(), pairs = trips.len(), "File aggregated");
            report.add_day(date_prefix(path), &trips);
        }
    }

    report_unresolved(&unresolved);
    let path = write_report(&report, output_dir, COMMUNE_TRIPS_REPORT)?;
    info!(days = report.days(), "Commune trips done");
    Ok(path)
}

/// Boardings per stop and day for the dates of `bounds` available in the
/// early transaction bucket.
///
/// Exports are cached in `settings.data_path`; dates already on disk are not
/// downloaded again.
#[tracing::instrument(skip(store, settings))]
pub async fn run_stops(
    store: &dyn ObjectStore,
    settings: &Settings,
    bounds: DateBounds,
    output_filename: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    let bucket = settings.early_transaction_bucket()?;
    let dates_in_range: Vec<NaiveDate> = store
        .list_available_dates(bucket)
        .await
        .with_context(|| format!("Failed to list dates in {bucket}"))?
        .into_iter()
        .filter(|date| bounds.contains(*date))
        .collect();
    if dates_in_range.is_empty() {
        bail!(
            "There is no data between {} and {}",
            bounds.lower,
            bounds.upper
        );
    }
    info!(dates = dates_in_range.len(), "Dates found in period");

    let exports = fetch_stop_exports(store, bucket, &settings.data_path, &dates_in_range).await?;

    let mut transactions = StopTransactions::default();
    for path in &exports {
        skip_per_file(path, transactions.process_file(path))?;
    }

    let stops = load_stop_table(settings.input(STOP_TABLE)).context("Failed to load stop list")?;
    transactions.add_stop_locations(&stops, &dates_in_range);
    let metro =
        load_metro_table(settings.input(METRO_TABLE)).context("Failed to load metro list")?;
    transactions.add_metro_locations(&metro, &dates_in_range);
    let metrotren = load_geo_table(settings.input(METROTREN_TABLE))
        .context("Failed to load metrotren stations")?;
    transactions.add_metrotren_locations(&metrotren);

    let rows = transactions.report_rows();
    let report = write_report(rows.as_slice(), output_dir, output_filename)?;

    let template = settings.kepler_template();
    match &settings.mapbox_key {
        Some(key) if template.exists() => {
            write_kepler_map(&template, output_dir, output_filename, key, &rows)?;
        }
        Some(_) => warn!(template = %template.display(), "Map template not found, skipping map"),
        None => debug!("MAPBOX_KEY not set, skipping map"),
    }

    info!(stations = transactions.stations.len(), rows = rows.len(), "Stop transactions done");
    Ok(report)
}

/// Makes sure every date has its export in `data_path`, downloading the
/// missing ones. Dates with no object in the bucket are skipped.
async fn fetch_stop_exports(
    store: &dyn ObjectStore,
    bucket: &str,
    data_path: &Path,
    dates: &[NaiveDate],
) -> Result<Vec<PathBuf>> {
    let mut exports = Vec::with_capacity(dates.len());
    for date in dates {
        let key = format!("{}.{STOP_EXPORT_SUFFIX}", date.format(DATE_FORMAT));
        let local = data_path.join(&key);
        if local.exists() {
            info!(file = %key, "File exists in local storage, skipping download");
            exports.push(local);
            continue;
        }
        match store.download(bucket, &key, &local).await {
            Ok(()) => exports.push(local),
            Err(e) if e.is_not_found() => warn!(bucket, key = %key, "Export not found, skipping"),
            Err(e) => return Err(e).with_context(|| format!("Failed to download {key}")),
        }
    }
    Ok(exports)
}

/// Uploads `path` to `bucket` under `<name before the first dot>.gz`.
#[tracing::instrument(skip(store), fields(path = %path.display()))]
pub async fn publish(store: &dyn ObjectStore, path: &Path, bucket: &str) -> Result<String> {
    if !store.bucket_exists(bucket).await? {
        bail!("Bucket '{bucket}' does not exist");
    }
    let key = format!("{}.gz", date_prefix(path));
    store
        .upload(path, bucket, &key)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;
    info!(bucket, key = %key, "Report published");
    Ok(key)
}

fn within_bounds(path: &Path, bounds: Option<DateBounds>) -> bool {
    let Some(bounds) = bounds else {
        return true;
    };
    match file_date(path) {
        Some(date) => bounds.contains(date),
        None => {
            warn!(file = %path.display(), "File name has no date prefix, skipping");
            false
        }
    }
}

/// Logs per-file failures and turns them into `None`; anything else aborts.
fn skip_per_file<T>(path: &Path, result: crate::error::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_per_file() => {
            error!(file = %path.display(), error = %e, "Skipping file");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to process {}", path.display())),
    }
}

fn report_unresolved(errors: &ErrorSet) {
    for name in errors {
        warn!("{name} has no commune");
    }
}
