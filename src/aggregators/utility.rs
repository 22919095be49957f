use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::error::{Error, Result};

/// Builds a header-less, flexible reader over decoded export text.
pub fn delimited_reader(text: &str, delimiter: u8) -> Reader<&[u8]> {
    ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// Title-cases like Python's `str.title`: a cased character is upper-cased
/// when it follows an uncased one and lower-cased otherwise.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased && previous_cased {
            out.extend(c.to_lowercase());
        } else if cased {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        previous_cased = cased;
    }
    out
}

/// Normalises a raw commune field. `-` and blank fields mean "unknown".
pub fn normalize_commune(raw: &str) -> Option<String> {
    if raw == "-" {
        return None;
    }
    let name = title_case(raw);
    let name = name.trim_end();
    match name {
        "" => None,
        // historical data-entry spelling
        "Nunoa" => Some("Ñuñoa".to_string()),
        _ => Some(name.to_string()),
    }
}

/// Lookup key for a raw location name in the extra-location table.
pub fn location_key(raw: &str) -> String {
    title_case(raw.trim())
}

/// Stop codes are UTF-8 bytes that went through the Latin-1 decoder; undo
/// that. Codes that are not valid UTF-8 are returned unchanged.
pub fn reinterpret_utf8(s: &str) -> String {
    let bytes: Option<Vec<u8>> = s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect();
    bytes
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| s.to_string())
}

fn line_of(row: &StringRecord) -> u64 {
    row.position().map_or(0, |p| p.line())
}

pub fn field<'r>(path: &Path, row: &'r StringRecord, index: usize) -> Result<&'r str> {
    row.get(index).ok_or_else(|| Error::ShortRow {
        path: path.to_path_buf(),
        line: line_of(row),
        expected: index + 1,
        found: row.len(),
    })
}

pub fn parse_float(path: &Path, row: &StringRecord, index: usize) -> Result<f64> {
    let raw = field(path, row, index)?;
    raw.trim().parse().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        line: line_of(row),
        field: raw.to_string(),
    })
}

pub fn parse_int(path: &Path, row: &StringRecord, index: usize) -> Result<i64> {
    let raw = field(path, row, index)?;
    raw.trim().parse().map_err(|_| Error::Parse {
        path: path.to_path_buf(),
        line: line_of(row),
        field: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("ESTACION SAN BERNARDO"), "Estacion San Bernardo");
        assert_eq!(title_case("ÑUÑOA"), "Ñuñoa");
        assert_eq!(title_case("o'higgins"), "O'Higgins");
        assert_eq!(title_case("linea 4a"), "Linea 4A");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_normalize_commune() {
        assert_eq!(normalize_commune("-"), None);
        assert_eq!(normalize_commune("   "), None);
        assert_eq!(normalize_commune("SAN MIGUEL  "), Some("San Miguel".into()));
        assert_eq!(normalize_commune("NUNOA"), Some("Ñuñoa".into()));
        assert_eq!(normalize_commune("NUNOA "), Some("Ñuñoa".into()));
        assert_eq!(normalize_commune("ÑUÑOA"), Some("Ñuñoa".into()));
    }

    #[test]
    fn test_location_key() {
        assert_eq!(location_key(" ESTACION LO ESPEJO "), "Estacion Lo Espejo");
    }

    #[test]
    fn test_reinterpret_utf8() {
        // "Ñ" as UTF-8 bytes read through Latin-1
        assert_eq!(reinterpret_utf8("PA\u{c3}\u{91}"), "PAÑ");
        assert_eq!(reinterpret_utf8("PA433"), "PA433");
        // a lone Latin-1 byte is not valid UTF-8
        assert_eq!(reinterpret_utf8("PA\u{f1}"), "PA\u{f1}");
    }

    #[test]
    fn test_field_parsing() {
        let mut reader = delimited_reader("a|1.5|x|7\n", b'|');
        let row = reader.records().next().unwrap().unwrap();
        let path = Path::new("2020-03-01.viaje");

        assert_eq!(parse_float(path, &row, 1).unwrap(), 1.5);
        assert_eq!(parse_int(path, &row, 3).unwrap(), 7);
        assert!(matches!(parse_float(path, &row, 2), Err(Error::Parse { .. })));
        assert!(matches!(
            field(path, &row, 9),
            Err(Error::ShortRow {
                expected: 10,
                found: 4,
                ..
            })
        ));
    }
}
