pub mod backend;
pub mod queries;
pub mod schema;
pub mod store_impl;

pub use backend::DuckDbBackend;

/// Re-exported so tests can reach `duckdb::params!` without their own
/// dependency on the crate.
pub use duckdb;
