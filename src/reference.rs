//! Auxiliary lookup tables used to resolve raw codes into communes and
//! station metadata.
//!
//! Every loader treats a missing file as fatal ([`Error::MissingTable`]) and
//! a row with too few or non-numeric fields as [`Error::Table`]. CSV variants
//! skip exactly one header line. Duplicate keys keep the last value.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use tracing::debug;

use crate::archive::{Encoding, open_text_with};
use crate::error::{Error, Result};

/// An immutable mapping from a raw code to a resolved value.
#[derive(Debug, Clone)]
pub struct ReferenceTable<V> {
    entries: HashMap<String, V>,
}

impl<V> ReferenceTable<V> {
    pub fn get(&self, code: &str) -> Option<&V> {
        self.entries.get(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V> Default for ReferenceTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for ReferenceTable<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A bus stop from the general stop list.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLocation {
    pub name: String,
    pub point: GeoPoint,
}

/// A metro station, keyed in its table by station name followed by line.
#[derive(Debug, Clone, PartialEq)]
pub struct MetroStation {
    pub station: String,
    pub line: String,
    pub area: String,
    pub point: GeoPoint,
}

/// Zone dictionary: comma-separated UTF-8, zone code in column 3, commune in
/// column 6.
pub fn load_zone_table(path: impl AsRef<Path>) -> Result<ReferenceTable<String>> {
    let path = path.as_ref();
    let text = read_table(path, Encoding::Utf8)?;
    let rows = read_rows(path, &text, b',', 7)?;
    let table: ReferenceTable<String> = rows
        .iter()
        .map(|row| (row[3].to_string(), row[6].to_string()))
        .collect();
    debug!(file = %path.display(), entries = table.len(), "Zone table loaded");
    Ok(table)
}

/// A flat JSON object of raw name to commune, e.g. the extra-location table:
///
/// ```json
/// { "Estacion San Bernardo": "San Bernardo" }
/// ```
pub fn load_commune_table(path: impl AsRef<Path>) -> Result<ReferenceTable<String>> {
    let path = path.as_ref();
    let text = read_table(path, Encoding::Utf8)?;
    let entries: HashMap<String, String> =
        serde_json::from_str(&text).map_err(|e| table_error(path, e.to_string()))?;
    debug!(file = %path.display(), entries = entries.len(), "Commune table loaded");
    Ok(ReferenceTable { entries })
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: FeatureProperties,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct FeatureProperties {
    name: String,
}

#[derive(Deserialize)]
struct Geometry {
    coordinates: Vec<f64>,
}

/// GeoJSON point features keyed by `properties.name`. Coordinates are
/// `[longitude, latitude]`.
pub fn load_geo_table(path: impl AsRef<Path>) -> Result<ReferenceTable<GeoPoint>> {
    let path = path.as_ref();
    let text = read_table(path, Encoding::Utf8)?;
    let collection: FeatureCollection =
        serde_json::from_str(&text).map_err(|e| table_error(path, e.to_string()))?;

    let mut entries = HashMap::with_capacity(collection.features.len());
    for feature in collection.features {
        let [longitude, latitude, ..] = feature.geometry.coordinates[..] else {
            return Err(table_error(
                path,
                format!("feature {:?} has fewer than two coordinates", feature.properties.name),
            ));
        };
        entries.insert(
            feature.properties.name,
            GeoPoint {
                latitude,
                longitude,
            },
        );
    }
    Ok(ReferenceTable { entries })
}

/// General stop list: pipe-separated Latin-1, stop code in column 4, name in
/// 5, latitude in 7, longitude in 8.
pub fn load_stop_table(path: impl AsRef<Path>) -> Result<ReferenceTable<StopLocation>> {
    let path = path.as_ref();
    let text = read_table(path, Encoding::Latin1)?;
    let mut entries = HashMap::new();
    for row in read_rows(path, &text, b'|', 9)? {
        let point = GeoPoint {
            latitude: parse_coordinate(path, &row, 7)?,
            longitude: parse_coordinate(path, &row, 8)?,
        };
        entries.insert(
            row[4].to_string(),
            StopLocation {
                name: row[5].to_string(),
                point,
            },
        );
    }
    Ok(ReferenceTable { entries })
}

/// Metro station list: semicolon-separated UTF-8, area in column 1, latitude
/// in 2, longitude in 3, line in 4, station name in 7.
pub fn load_metro_table(path: impl AsRef<Path>) -> Result<ReferenceTable<MetroStation>> {
    let path = path.as_ref();
    let text = read_table(path, Encoding::Utf8)?;
    let mut entries = HashMap::new();
    for row in read_rows(path, &text, b';', 8)? {
        let station = MetroStation {
            station: row[7].to_string(),
            line: row[4].to_string(),
            area: row[1].to_string(),
            point: GeoPoint {
                latitude: parse_coordinate(path, &row, 2)?,
                longitude: parse_coordinate(path, &row, 3)?,
            },
        };
        entries.insert(format!("{}{}", station.station, station.line), station);
    }
    Ok(ReferenceTable { entries })
}

fn read_table(path: &Path, encoding: Encoding) -> Result<String> {
    open_text_with(path, encoding).map_err(|e| match e {
        Error::Io(io) if io.kind() == ErrorKind::NotFound => Error::MissingTable {
            path: path.to_path_buf(),
        },
        other => other,
    })
}

fn read_rows(path: &Path, text: &str, delimiter: u8, min_fields: usize) -> Result<Vec<StringRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| table_error(path, e.to_string()))?;
        if row.len() < min_fields {
            let line = row.position().map_or(0, |p| p.line());
            return Err(table_error(
                path,
                format!("line {line}: expected at least {min_fields} fields, found {}", row.len()),
            ));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_coordinate(path: &Path, row: &StringRecord, index: usize) -> Result<f64> {
    row[index].trim().parse().map_err(|_| {
        let line = row.position().map_or(0, |p| p.line());
        table_error(path, format!("line {line}: invalid coordinate {:?}", &row[index]))
    })
}

fn table_error(path: &Path, reason: String) -> Error {
    Error::Table {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_zone_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_dictionary.csv");
        fs::write(
            &path,
            "a,b,c,ZONA777,e,f,COMUNA\n\
             x,x,x,135,x,x,CERRO NAVIA\n\
             x,x,x,56,x,x,RENCA\n\
             x,x,x,135,x,x,ÑUÑOA\n",
        )
        .unwrap();

        let table = load_zone_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("56").map(String::as_str), Some("RENCA"));
        // last value wins
        assert_eq!(table.get("135").map(String::as_str), Some("ÑUÑOA"));
        assert_eq!(table.get("ZONA777"), None);
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_zone_table(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, Error::MissingTable { .. }), "{err}");
    }

    #[test]
    fn test_short_row_is_table_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone_dictionary.csv");
        fs::write(&path, "h,h,h,h,h,h,h\n1,2,3\n").unwrap();

        let err = load_zone_table(&path).unwrap_err();
        assert!(matches!(err, Error::Table { .. }), "{err}");
    }

    #[test]
    fn test_commune_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra_location_communes.json");
        fs::write(
            &path,
            r#"{"Estacion San Bernardo": "San Bernardo", "Estacion Lo Espejo": "Lo Espejo"}"#,
        )
        .unwrap();

        let table = load_commune_table(&path).unwrap();
        assert_eq!(
            table.get("Estacion Lo Espejo").map(String::as_str),
            Some("Lo Espejo")
        );
    }

    #[test]
    fn test_geo_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrotren.geojson");
        fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "ESTACION NOS"},
                 "geometry": {"type": "Point", "coordinates": [-70.71, -33.63]}}
            ]}"#,
        )
        .unwrap();

        let table = load_geo_table(&path).unwrap();
        assert_eq!(
            table.get("ESTACION NOS"),
            Some(&GeoPoint {
                latitude: -33.63,
                longitude: -70.71
            })
        );
    }

    #[test]
    fn test_stop_table_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.csv");
        fs::write(
            &path,
            b"a|b|c|d|codigo|nombre|g|lat|lon\n\
              x|x|x|x|PA433|Pe\xf1alol\xe9n|x|-33.48|-70.55\n",
        )
        .unwrap();

        let table = load_stop_table(&path).unwrap();
        let stop = table.get("PA433").unwrap();
        assert_eq!(stop.name, "Peñalolén");
        assert_eq!(stop.point.latitude, -33.48);
        assert_eq!(stop.point.longitude, -70.55);
    }

    #[test]
    fn test_stop_table_bad_coordinate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop.csv");
        fs::write(&path, "h|h|h|h|h|h|h|h|h\nx|x|x|x|PA1|n|x|north|-70.5\n").unwrap();

        assert!(matches!(load_stop_table(&path), Err(Error::Table { .. })));
    }

    #[test]
    fn test_metro_table_keys_by_station_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metro.csv");
        fs::write(
            &path,
            "id;comuna;lat;lon;linea;f;g;estacion\n\
             1;PROVIDENCIA;-33.42;-70.61;L1;x;x;LOS LEONES\n\
             2;PROVIDENCIA;-33.43;-70.60;L6;x;x;LOS LEONES\n",
        )
        .unwrap();

        let table = load_metro_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        let station = table.get("LOS LEONESL6").unwrap();
        assert_eq!(station.line, "L6");
        assert_eq!(station.area, "PROVIDENCIA");
        assert_eq!(station.point.longitude, -70.60);
    }
}
