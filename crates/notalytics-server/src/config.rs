/// Environment parsing lives in `notalytics-core` so integration tests can
/// build a `Config` without the server.
pub use notalytics_core::config::Config;
