//! Engine configuration: the three window durations from `spec.md` §4.E.
//!
//! The teacher's `lib::config::SchedulerConfig`
//! (`examples/devtari-io-cronback/lib/config.rs`) carries these same window
//! fields alongside a cell id, gRPC address/port and a database uri — all
//! service-binary concerns this crate doesn't have. What's left is plain
//! enough that a full `config`-crate-backed loader would be ceremony for
//! three durations; callers wire this up however their own application
//! loads configuration (env, file, CLI flags) and pass the result in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the projector loop, and its look-ahead window.
    #[serde(with = "humantime_serde_secs")]
    pub schedule_window: Duration,
    /// Period of the runner loop.
    #[serde(with = "humantime_serde_secs")]
    pub runner_window: Duration,
    /// Period of the janitor loop.
    #[serde(with = "humantime_serde_secs")]
    pub cleanup_window: Duration,
}

impl SchedulerConfig {
    pub fn new(
        schedule_window: Duration,
        runner_window: Duration,
        cleanup_window: Duration,
    ) -> Self {
        Self {
            schedule_window,
            runner_window,
            cleanup_window,
        }
    }
}

impl Default for SchedulerConfig {
    /// One-second windows all around, matching the cadence used throughout
    /// `spec.md` §8's concrete scenarios.
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }
}

mod humantime_serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
