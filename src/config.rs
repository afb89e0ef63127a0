// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Number of leaderboard entries archived into a `ClassResult` when a quiz ends.
pub const ARCHIVE_TOP_N: usize = 5;

/// Weight given to a new clock-offset sample when blending it into the estimate.
pub const CLOCK_SMOOTHING_WEIGHT: f64 = 0.3;

/// Round trips performed when a sync loop calibrates its clock.
pub const CLOCK_CALIBRATION_SAMPLES: usize = 3;

pub const DEFAULT_SYNC_TICK_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    /// `sqlite:` URL for the persistent store. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    /// The single shared password that unlocks the admin screens.
    pub admin_password: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub sync_tick_ms: u64,
    pub clock_sync_interval_secs: u64,
    pub scheduler_tick_ms: u64,
    /// How long after a question closes an answer for it is still accepted.
    pub answer_grace_ms: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let admin_password = env::var("ADMIN_PASSWORD")
            .expect("ADMIN_PASSWORD must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 3600),
            admin_password,
            rust_log,
            bind_addr,
            sync_tick_ms: parse_or("SYNC_TICK_MS", DEFAULT_SYNC_TICK_MS),
            clock_sync_interval_secs: parse_or("CLOCK_SYNC_INTERVAL_SECS", 30),
            scheduler_tick_ms: parse_or("SCHEDULER_TICK_MS", 1000),
            answer_grace_ms: parse_or("ANSWER_GRACE_MS", 2000),
        }
    }
}

/// Reads a positive number from the environment, falling back to `default`.
fn parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}
