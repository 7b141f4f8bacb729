//! CLI command implementations.

pub mod check;
pub mod run;

pub use check::{check_connection, print_outcome};
pub use run::{print_report, report_json, run_forever, run_once};
