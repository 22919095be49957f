//! Daily boardings per stop, enriched with stop locations.
//!
//! Transactions come from semicolon-separated `4daytransactionbystop` exports.
//! Locations are layered on afterwards from the general stop list, the metro
//! station list and the metrotren GeoJSON, in that order. Each pass only
//! fills fields that are still empty, except coordinates, which every
//! matching pass overwrites.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::aggregators::utility::{reinterpret_utf8, title_case};
use crate::archive::open_text;
use crate::error::{Error, Result};
use crate::files::DATE_FORMAT;
use crate::reference::{GeoPoint, MetroStation, ReferenceTable, StopLocation};

const STOP_CODE: usize = 0;
const DATE: usize = 3;
const STOP_NAME: usize = 5;
const AREA: usize = 6;
const MODE: usize = 8;
const LINE: usize = 9;
const TRANSACTIONS: usize = 10;

const METRO_MODE: &str = "METRO";
const NO_VALUE: &str = "-";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationInfo {
    pub stop_name: Option<String>,
    pub stop_code: Option<String>,
    pub area: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Boardings per `YYYY-MM-DD`.
    pub dates: BTreeMap<String, i64>,
}

fn fill_if_absent(slot: &mut Option<String>, value: impl Into<String>) {
    if slot.is_none() {
        *slot = Some(value.into());
    }
}

impl StationInfo {
    fn set_point(&mut self, point: GeoPoint) {
        self.latitude = Some(point.latitude);
        self.longitude = Some(point.longitude);
    }

    /// Gives every date in range a zero count unless it already has one.
    fn fill_dates(&mut self, dates_in_range: &[NaiveDate]) {
        for date in dates_in_range {
            self.dates
                .entry(date.format(DATE_FORMAT).to_string())
                .or_insert(0);
        }
    }

    /// Names of the fields a report row needs but this station lacks.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.longitude.is_none() {
            missing.push("longitude");
        }
        if self.latitude.is_none() {
            missing.push("latitude");
        }
        if self.area.is_none() {
            missing.push("area");
        }
        if self.stop_name.is_none() {
            missing.push("stop name");
        }
        if self.stop_code.is_none() {
            missing.push("stop code");
        }
        missing
    }
}

/// All stations keyed by stop code, plus the metro codes (station and line)
/// seen in transactions.
#[derive(Debug, Clone, Default)]
pub struct StopTransactions {
    pub stations: BTreeMap<String, StationInfo>,
    pub metro_stations: BTreeSet<String>,
}

impl StopTransactions {
    fn station(&mut self, code: &str) -> &mut StationInfo {
        self.stations
            .entry(code.to_string())
            .or_insert_with(StationInfo::default)
    }

    /// Adds the transactions of one export file.
    ///
    /// The file is read in full before anything is added, so a file that
    /// fails leaves `self` untouched. Returns `false` and logs a warning when
    /// the file has no header line.
    pub fn process_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        debug!(file = %path.display(), "Reading stop transactions");
        let Some(file) = Self::read_file(path)? else {
            warn!(file = %path.display(), "File is empty");
            return Ok(false);
        };
        self.merge(file);
        Ok(true)
    }

    fn read_file(path: &Path) -> Result<Option<StopTransactions>> {
        let text = open_text(path)?;
        let mut lines = text.lines();
        if lines.next().is_none() {
            return Ok(None);
        }

        let mut file = StopTransactions::default();
        for (index, line) in lines.enumerate() {
            // header is line 1
            let line_number = index as u64 + 2;
            let values: Vec<&str> = line.split(';').collect();
            if values.len() <= TRANSACTIONS {
                return Err(Error::ShortRow {
                    path: path.to_path_buf(),
                    line: line_number,
                    expected: TRANSACTIONS + 1,
                    found: values.len(),
                });
            }

            let mut stop_code = reinterpret_utf8(values[STOP_CODE]);
            if stop_code == NO_VALUE {
                continue;
            }
            let transactions: i64 =
                values[TRANSACTIONS]
                    .trim()
                    .parse()
                    .map_err(|_| Error::Parse {
                        path: path.to_path_buf(),
                        line: line_number,
                        field: values[TRANSACTIONS].to_string(),
                    })?;

            if values[MODE] == METRO_MODE {
                stop_code.push_str(values[LINE]);
                file.metro_stations.insert(stop_code.clone());
            }
            let stop_name = match values[STOP_NAME] {
                NO_VALUE => stop_code.clone(),
                name => name.to_string(),
            };

            let station = file.station(&stop_code);
            station.stop_name = Some(stop_name);
            station.stop_code = Some(stop_code.clone());
            station.area = Some(title_case(values[AREA]));
            *station.dates.entry(values[DATE].to_string()).or_insert(0) += transactions;
        }
        Ok(Some(file))
    }

    /// Folds the transactions of one file into `self`. Observed fields of
    /// later files replace earlier ones; counts add up.
    fn merge(&mut self, other: StopTransactions) {
        self.metro_stations.extend(other.metro_stations);
        for (code, info) in other.stations {
            let station = self.station(&code);
            if info.stop_name.is_some() {
                station.stop_name = info.stop_name;
            }
            if info.stop_code.is_some() {
                station.stop_code = info.stop_code;
            }
            if info.area.is_some() {
                station.area = info.area;
            }
            for (date, count) in info.dates {
                *station.dates.entry(date).or_insert(0) += count;
            }
        }
    }

    /// First pass: bus stops from the general stop list.
    pub fn add_stop_locations(
        &mut self,
        stops: &ReferenceTable<StopLocation>,
        dates_in_range: &[NaiveDate],
    ) {
        for (code, stop) in stops.iter() {
            let station = self.station(code);
            station.set_point(stop.point);
            fill_if_absent(&mut station.area, NO_VALUE);
            fill_if_absent(&mut station.stop_name, stop.name.as_str());
            fill_if_absent(&mut station.stop_code, code);
            if station.dates.is_empty() {
                station.fill_dates(dates_in_range);
            }
        }
    }

    /// Second pass: metro stations, keyed by station name and line.
    pub fn add_metro_locations(
        &mut self,
        metro: &ReferenceTable<MetroStation>,
        dates_in_range: &[NaiveDate],
    ) {
        for (code, metro_station) in metro.iter() {
            let seen = self.metro_stations.contains(code);
            let name = title_case(&metro_station.station);
            let station = self.station(code);
            station.set_point(metro_station.point);
            fill_if_absent(&mut station.stop_name, format!("Estación {name}"));
            fill_if_absent(
                &mut station.stop_code,
                format!("Estación {name} {}", metro_station.line),
            );
            if !seen {
                fill_if_absent(&mut station.area, title_case(&metro_station.area));
                station.fill_dates(dates_in_range);
            }
        }
    }

    /// Third pass: metrotren stations, keyed by name.
    pub fn add_metrotren_locations(&mut self, metrotren: &ReferenceTable<GeoPoint>) {
        for (name, point) in metrotren.iter() {
            let station = self.station(name);
            station.set_point(*point);
            fill_if_absent(&mut station.stop_name, name);
        }
    }

    /// Flattens complete stations into report rows, one per date.
    ///
    /// Stations missing any reported field are logged and left out.
    pub fn report_rows(&self) -> Vec<StopRow> {
        let mut rows = Vec::new();
        for (key, station) in &self.stations {
            let (Some(stop_name), Some(stop_code), Some(area), Some(latitude), Some(longitude)) = (
                &station.stop_name,
                &station.stop_code,
                &station.area,
                station.latitude,
                station.longitude,
            ) else {
                for field in station.missing_fields() {
                    warn!(station = %key, "Station doesn't have {field}");
                }
                continue;
            };

            for (date, boardings) in &station.dates {
                rows.push(StopRow {
                    date: format!("{date} 00:00:00"),
                    stop_name: stop_name.clone(),
                    stop_code: stop_code.clone(),
                    area: area.clone(),
                    latitude,
                    longitude,
                    boardings: *boardings,
                });
            }
        }
        rows
    }
}

/// One line of the stop report.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRow {
    pub date: String,
    pub stop_name: String,
    pub stop_code: String,
    pub area: String,
    pub latitude: f64,
    pub longitude: f64,
    pub boardings: i64,
}
