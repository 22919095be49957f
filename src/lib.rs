pub mod aggregators;
pub mod archive;
pub mod config;
pub mod error;
pub mod files;
pub mod jobs;
pub mod output;
pub mod reference;
pub mod storage;
