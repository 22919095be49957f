//! Locating export files on disk and filtering them by date.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Finds every `*<type_tag>`, `*<type_tag>.gz` and `*<type_tag>.zip` file in
/// `directory`, ordered by the file name prefix before the first `.`.
///
/// Prefixes are `YYYY-MM-DD`, so lexicographic order is chronological. Ties
/// keep the plain, gzip, zip variant order. Hidden files are skipped.
pub fn find_files(type_tag: &str, directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let suffixes = [
        type_tag.to_string(),
        format!("{type_tag}.gz"),
        format!("{type_tag}.zip"),
    ];

    let mut names = Vec::new();
    for entry in fs::read_dir(directory.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push((name.to_string(), entry.path()));
            }
        }
    }
    names.sort();

    let mut files = Vec::new();
    for suffix in &suffixes {
        files.extend(
            names
                .iter()
                .filter(|(name, _)| name.ends_with(suffix.as_str()))
                .map(|(_, path)| path.clone()),
        );
    }
    files.sort_by(|a, b| date_prefix(a).cmp(date_prefix(b)));

    Ok(files)
}

/// The part of the file name before the first `.`.
pub fn date_prefix(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or("")
}

/// Parses the file name prefix as a date, if it is one.
pub fn file_date(path: &Path) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date_prefix(path), DATE_FORMAT).ok()
}

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBounds {
    pub lower: NaiveDate,
    pub upper: NaiveDate,
}

impl DateBounds {
    /// Builds bounds from optional CLI values; both or neither must be given.
    pub fn from_options(
        lower: Option<NaiveDate>,
        upper: Option<NaiveDate>,
    ) -> Result<Option<Self>> {
        match (lower, upper) {
            (None, None) => Ok(None),
            (Some(lower), Some(upper)) => Self::new(lower, upper).map(Some),
            _ => Err(Error::Validation(
                "--lower-bound and --upper-bound must be given together".into(),
            )),
        }
    }

    pub fn new(lower: NaiveDate, upper: NaiveDate) -> Result<Self> {
        if lower > upper {
            return Err(Error::Validation(
                "lower-bound must be lower than upper-bound".into(),
            ));
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.lower <= date && date <= self.upper
    }
}

pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| format!("Not a valid date: '{s}'."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(files: &[PathBuf]) -> Vec<&str> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect()
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn test_find_files_orders_by_date_across_variants() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "2018-10-03.general.zip",
                "2018-10-01.general",
                "2018-10-02.general.gz",
                "2018-10-01.general.gz",
                "2018-10-01.trip",
                "2018-10-01.trip.gz",
                "2018-10-01.general.csv",
                ".2018-09-01.general",
            ],
        );

        let files = find_files("general", dir.path()).unwrap();
        assert_eq!(
            names(&files),
            vec![
                "2018-10-01.general",
                "2018-10-01.general.gz",
                "2018-10-02.general.gz",
                "2018-10-03.general.zip",
            ]
        );
    }

    #[test]
    fn test_find_files_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_files("viaje", dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_date_prefix() {
        assert_eq!(date_prefix(Path::new("/a/b/2020-03-01.viaje.gz")), "2020-03-01");
        assert_eq!(
            file_date(Path::new("2020-03-01.viaje")),
            NaiveDate::from_ymd_opt(2020, 3, 1)
        );
        assert_eq!(file_date(Path::new("2020-nodata.viaje")), None);
    }

    #[test]
    fn test_bounds_validation() {
        let d = |s| parse_date(s).unwrap();
        assert_eq!(DateBounds::from_options(None, None).unwrap(), None);
        assert!(matches!(
            DateBounds::from_options(Some(d("2020-10-10")), None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            DateBounds::from_options(None, Some(d("2020-10-10"))),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            DateBounds::from_options(Some(d("2021-10-10")), Some(d("2020-10-10"))),
            Err(Error::Validation(_))
        ));

        let bounds = DateBounds::new(d("2020-01-01"), d("2020-01-03")).unwrap();
        assert!(!bounds.contains(d("2019-12-31")));
        assert!(bounds.contains(d("2020-01-01")));
        assert!(bounds.contains(d("2020-01-02")));
        assert!(bounds.contains(d("2020-01-03")));
        assert!(!bounds.contains(d("2020-01-05")));
    }

    #[test]
    fn test_parse_date_message() {
        assert_eq!(parse_date("1").unwrap_err(), "Not a valid date: '1'.");
    }
}
