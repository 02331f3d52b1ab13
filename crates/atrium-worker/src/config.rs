// Worker configuration from environment variables

use std::time::Duration as StdDuration;

use chrono::{Duration, FixedOffset};

use atrium_digest::DigestConfig;

/// Configuration for the digest worker
#[derive(Debug, Clone, Default)]
pub struct DigestWorkerConfig {
    /// Postgres connection string
    pub database_url: Option<String>,
    /// Seconds between pipeline invocations
    pub interval_secs: Option<u64>,
    /// Minimum seconds between two digests to the same recipient
    pub min_interval_secs: Option<i64>,
    /// Seconds an event must settle before it is claimable
    pub claim_cutoff_secs: Option<i64>,
    /// Maximum events claimed per invocation
    pub batch_size: Option<usize>,
    /// Seconds before a claim is treated as abandoned
    pub claim_lease_secs: Option<i64>,
    /// Display timezone offset for message timestamps, in hours
    pub tz_offset_hours: Option<i32>,
}

impl DigestWorkerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            interval_secs: parse_var("DIGEST_INTERVAL_SECS"),
            min_interval_secs: parse_var("DIGEST_MIN_INTERVAL_SECS"),
            claim_cutoff_secs: parse_var("DIGEST_CLAIM_CUTOFF_SECS"),
            batch_size: parse_var("DIGEST_BATCH_SIZE"),
            claim_lease_secs: parse_var("DIGEST_CLAIM_LEASE_SECS"),
            tz_offset_hours: parse_var("DIGEST_TZ_OFFSET_HOURS"),
        }
    }

    /// Get the database URL with default
    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| "postgres://localhost:5432/atrium".to_string())
    }

    /// Get the schedule interval with default (15 minutes)
    pub fn interval(&self) -> StdDuration {
        StdDuration::from_secs(self.interval_secs.unwrap_or(900))
    }

    /// Build the pipeline configuration
    pub fn digest_config(&self) -> DigestConfig {
        let mut config = DigestConfig::default();
        if let Some(secs) = self.min_interval_secs {
            config = config.with_min_interval(Duration::seconds(secs));
        }
        if let Some(secs) = self.claim_cutoff_secs {
            config = config.with_claim_cutoff(Duration::seconds(secs));
        }
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        if let Some(secs) = self.claim_lease_secs {
            config = config.with_claim_lease(Duration::seconds(secs));
        }
        if let Some(hours) = self.tz_offset_hours {
            if let Some(tz) = FixedOffset::east_opt(hours * 3600) {
                config = config.with_tz(tz);
            }
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
