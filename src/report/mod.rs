//! Terminal reports for photometry tables, input records and runs.

pub mod format;

pub use format::{format_photometry_table, format_record, format_run_summary};
