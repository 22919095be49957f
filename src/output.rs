//! Report serialization.
//!
//! Every report is written as `<name>.csv`, gzip-compressed to `<name>.gz`,
//! and the CSV removed. Reports are written in one pass; an interrupted run
//! can leave a partial CSV behind that the next run overwrites.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::aggregators::stops::StopRow;
use crate::aggregators::{AggregateMapping, DailyTotals};
use crate::archive::Encoding;
use crate::error::Result;

pub const DAILY_TRANSACTIONS_HEADER: &[&str] = &["Fecha", "Transacciones"];
pub const COMMUNE_TRIPS_HEADER: &[&str] =
    &["Fecha", "Comuna_origen", "Comuna_destino", "N°_viajes_expandidos"];
pub const STOP_TRANSACTIONS_HEADER: &[&str] = &[
    "Fecha",
    "Código de usuario",
    "Código ts",
    "Comuna",
    "Latitud",
    "Longitud",
    "Subidas",
];

/// Something that can be laid out as a CSV report.
pub trait Report {
    fn header(&self) -> &'static [&'static str];

    fn rows(&self) -> Vec<Vec<String>>;

    fn encoding(&self) -> Encoding {
        Encoding::Utf8
    }
}

/// Formats a float the way the legacy reports did: whole numbers keep a
/// trailing `.0`, everything else uses the shortest round-trip form.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl Report for DailyTotals {
    fn header(&self) -> &'static [&'static str] {
        DAILY_TRANSACTIONS_HEADER
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.iter()
            .map(|(date, total)| vec![date.to_string(), total.to_string()])
            .collect()
    }
}

/// Expanded trips between communes, one mapping per day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommuneTrips {
    days: BTreeMap<String, AggregateMapping<f64>>,
}

impl CommuneTrips {
    pub fn add_day(&mut self, date: &str, trips: &AggregateMapping<f64>) {
        self.days
            .entry(date.to_string())
            .or_insert_with(AggregateMapping::new)
            .merge(trips);
    }

    pub fn days(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl Report for CommuneTrips {
    fn header(&self) -> &'static [&'static str] {
        COMMUNE_TRIPS_HEADER
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.days
            .iter()
            .flat_map(|(date, trips)| {
                trips.iter().map(move |(start, end, value)| {
                    vec![
                        date.clone(),
                        start.to_string(),
                        end.to_string(),
                        format_float(value),
                    ]
                })
            })
            .collect()
    }
}

impl Report for [StopRow] {
    fn header(&self) -> &'static [&'static str] {
        STOP_TRANSACTIONS_HEADER
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.iter()
            .map(|row| {
                vec![
                    row.date.clone(),
                    row.stop_name.clone(),
                    row.stop_code.clone(),
                    row.area.clone(),
                    format_float(row.latitude),
                    format_float(row.longitude),
                    row.boardings.to_string(),
                ]
            })
            .collect()
    }

    fn encoding(&self) -> Encoding {
        Encoding::Latin1
    }
}

/// Writes `report` to `<output_dir>/<name>.gz` and returns that path.
pub fn write_report<R: Report + ?Sized>(
    report: &R,
    output_dir: impl AsRef<Path>,
    name: &str,
) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;
    let csv_path = output_dir.join(format!("{name}.csv"));
    let gz_path = output_dir.join(format!("{name}.gz"));

    let rows = report.rows();
    write_csv(report, &rows, &csv_path)?;
    gzip_file(&csv_path, &gz_path)?;
    fs::remove_file(&csv_path)?;

    info!(path = %gz_path.display(), rows = rows.len(), "Report written");
    Ok(gz_path)
}

fn write_csv<R: Report + ?Sized>(report: &R, rows: &[Vec<String>], path: &Path) -> Result<()> {
    let encoding = report.encoding();
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(File::create(path)?));

    let header = report
        .header()
        .iter()
        .map(|field| encoding.encode(field))
        .collect::<Result<Vec<_>>>()?;
    writer.write_record(&header)?;

    for row in rows {
        let fields = row
            .iter()
            .map(|field| encoding.encode(field))
            .collect::<Result<Vec<_>>>()?;
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

/// Compresses `src` into `dst`, going through a `.tmp` file so a failed
/// compression never leaves a truncated `dst`.
fn gzip_file(src: &Path, dst: &Path) -> Result<()> {
    let tmp = dst.with_extension("gz.tmp");
    let mut input = File::open(src)?;
    let mut encoder = GzEncoder::new(File::create(&tmp)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    fs::rename(&tmp, dst)?;
    Ok(())
}

/// Fills the Kepler.gl HTML template with the stop rows and writes
/// `<output_dir>/<name>.html`.
pub fn write_kepler_map(
    template_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    name: &str,
    mapbox_key: &str,
    rows: &[StopRow],
) -> Result<PathBuf> {
    let template = fs::read_to_string(template_path.as_ref())?;
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::json!([
                row.date,
                row.stop_name,
                row.stop_code,
                row.area,
                row.latitude,
                row.longitude,
                row.boardings,
            ])
        })
        .collect();

    let html = template
        .replace("<MAPBOX_KEY>", mapbox_key)
        .replace("<DATA>", &serde_json::to_string(&data)?);

    let path = output_dir.as_ref().join(format!("{name}.html"));
    fs::write(&path, html)?;
    info!(path = %path.display(), "Map written");
    Ok(path)
}
