//! Per-export aggregation.
//!
//! Each variant opens one export file through [`crate::archive`], skips its
//! header rows, resolves keys through reference tables and sums values into
//! a fresh mapping. Callers merge per-file results, so a file that fails
//! contributes nothing.

pub mod general;
pub mod stops;
pub mod trip;
pub mod types;
pub mod utility;
pub mod viaje;

pub use types::{AggregateMapping, DailyTotals, ErrorSet};
