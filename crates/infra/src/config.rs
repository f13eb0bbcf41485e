//! Environment configuration for the capture job system.

use std::str::FromStr;
use std::time::Duration;

use tethercap_core::ValidationLimits;

pub const MAX_FRAMES_ENV: &str = "TETHERCAP_MAX_FRAMES_PER_JOB";
pub const MAX_INTERVAL_ENV: &str = "TETHERCAP_MAX_INTERVAL_SECONDS";
pub const SIMULATED_CAPTURE_ENV: &str = "TETHERCAP_SIMULATED_CAPTURE_MS";

#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub limits: ValidationLimits,
    /// Latency of the simulated camera.
    pub simulated_capture: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            limits: ValidationLimits::default(),
            simulated_capture: Duration::from_millis(250),
        }
    }
}

impl JobsConfig {
    /// Read from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limits = ValidationLimits {
            max_frames_per_job: env_or(MAX_FRAMES_ENV, defaults.limits.max_frames_per_job),
            max_interval_seconds: env_seconds_or(
                MAX_INTERVAL_ENV,
                defaults.limits.max_interval_seconds,
            ),
            ..defaults.limits
        };
        let simulated_ms = env_or(
            SIMULATED_CAPTURE_ENV,
            defaults.simulated_capture.as_millis() as u64,
        );

        Self {
            limits,
            simulated_capture: Duration::from_millis(simulated_ms),
        }
    }
}

/// Parse `name` from the environment; unset or unparsable values yield
/// `default`.
pub fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match std::env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

/// Like [`env_or`] for a length of time in seconds; negative or non-finite
/// values yield `default`.
pub fn env_seconds_or(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(raw) => parse_seconds_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_seconds_or(name: &str, raw: &str, default: f64) -> f64 {
    let value = parse_or(name, raw, default);
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        tracing::warn!(var = name, value = raw, default, "out of range config value, using default");
        default
    }
}

fn parse_or<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(var = name, value = raw, ?default, "unparsable config value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_on_garbage() {
        assert_eq!(parse_or("X", "42", 7u32), 42);
        assert_eq!(parse_or("X", " 12 ", 7u32), 12);
        assert_eq!(parse_or("X", "lots", 7u32), 7);
        assert_eq!(parse_or("X", "2.5", 1.0f64), 2.5);
    }

    #[test]
    fn seconds_reject_non_finite_and_negative() {
        assert_eq!(parse_seconds_or("X", "120", 3600.0), 120.0);
        assert_eq!(parse_seconds_or("X", "inf", 3600.0), 3600.0);
        assert_eq!(parse_seconds_or("X", "NaN", 3600.0), 3600.0);
        assert_eq!(parse_seconds_or("X", "1e400", 3600.0), 3600.0);
        assert_eq!(parse_seconds_or("X", "-5", 3600.0), 3600.0);
        assert_eq!(parse_seconds_or("X", "soon", 3600.0), 3600.0);
    }

    #[test]
    fn unset_variable_uses_default() {
        assert_eq!(env_or("TETHERCAP_TEST_SURELY_UNSET", 5u64), 5);
    }

    #[test]
    fn defaults_match_validation_limits() {
        let config = JobsConfig::default();
        assert_eq!(config.limits.max_frames_per_job, 1000);
        assert_eq!(config.limits.max_interval_seconds, 3600.0);
        assert_eq!(config.simulated_capture, Duration::from_millis(250));
    }
}
