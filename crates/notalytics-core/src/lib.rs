pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod event;
pub mod funnel;
pub mod interactions;
pub mod range;
pub mod rollups;
pub mod sessions;
pub mod store;
pub mod timeseries;
