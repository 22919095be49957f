//! Runtime settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const ZONE_TABLE: &str = "zone_dictionary.csv";
pub const EXTRA_LOCATION_TABLE: &str = "extra_location_communes.json";
pub const STOP_TABLE: &str = "stop.csv";
pub const METRO_TABLE: &str = "metro.csv";
pub const METROTREN_TABLE: &str = "metrotren.geojson";
pub const KEPLER_TEMPLATE: &str = "template.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Bucket with the `<date>.4daytransactionbystop.gz` exports.
    pub early_transaction_bucket: Option<String>,
    /// Upload target for finished reports.
    pub miscellaneous_bucket: Option<String>,
    pub mapbox_key: Option<String>,
    pub inputs_path: PathBuf,
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub template_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let path = |name: &str, default: &str| PathBuf::from(var(name).unwrap_or_else(|| default.to_string()));

        Self {
            early_transaction_bucket: var("EARLY_TRANSACTION_BUCKET_NAME"),
            miscellaneous_bucket: var("MISCELLANEOUS_BUCKET_NAME"),
            mapbox_key: var("MAPBOX_KEY"),
            inputs_path: path("INPUTS_PATH", "inputs"),
            data_path: path("DATA_PATH", "data"),
            output_path: path("OUTPUT_PATH", "output"),
            template_path: path("TEMPLATE_PATH", "template"),
        }
    }

    pub fn early_transaction_bucket(&self) -> Result<&str> {
        self.early_transaction_bucket
            .as_deref()
            .ok_or_else(|| anyhow!("EARLY_TRANSACTION_BUCKET_NAME must be set"))
    }

    pub fn miscellaneous_bucket(&self) -> Result<&str> {
        self.miscellaneous_bucket
            .as_deref()
            .ok_or_else(|| anyhow!("MISCELLANEOUS_BUCKET_NAME must be set"))
    }

    pub fn input(&self, table: &str) -> PathBuf {
        self.inputs_path.join(table)
    }

    pub fn kepler_template(&self) -> PathBuf {
        self.template_path.join(KEPLER_TEMPLATE)
    }
}
