//! Local output files.

mod csv_dump;

pub use csv_dump::write_table;
