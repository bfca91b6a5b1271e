//! CLI subcommand implementations for the imgprobe binary.

pub mod catalog_cmd;
pub mod doctor;
pub mod fetch_cmd;
pub mod output;
pub mod report;
pub mod scrape_cmd;
