//! Tracing and logging setup shared by the server binary and tests.

/// Initialize process-wide observability (tracing/logging).
///
/// The output format comes from `TETHERCAP_LOG_FORMAT` (`json`, the default,
/// or `pretty`). Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;
