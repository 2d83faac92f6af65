use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::policy::BusinessPolicy;

/// Runtime settings for a [`crate::scheduler::Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub wal_path: PathBuf,
    /// Appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub no_show_grace_minutes: u32,
    /// `None` disables the no-show sweeper.
    pub sweep_interval: Option<Duration>,
    pub policy: BusinessPolicy,
}

impl SchedulerConfig {
    /// Defaults with the WAL at `wal_path` and no background sweeper.
    pub fn for_path(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            compact_threshold: 1000,
            metrics_port: None,
            no_show_grace_minutes: 30,
            sweep_interval: None,
            policy: BusinessPolicy::default(),
        }
    }

    /// Read `CLINIC_*` variables. Missing or malformed values use the default.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CLINIC_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let mut config = Self::for_path(PathBuf::from(data_dir).join("clinic.wal"));

        config.compact_threshold = env_or("CLINIC_COMPACT_THRESHOLD", config.compact_threshold);
        config.metrics_port = env_parse("CLINIC_METRICS_PORT");
        config.no_show_grace_minutes =
            env_or("CLINIC_NO_SHOW_GRACE_MINUTES", config.no_show_grace_minutes);
        config.sweep_interval = match env_parse::<u64>("CLINIC_SWEEP_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(60)),
        };

        let policy = &mut config.policy;
        let open_hour = env_or("CLINIC_OPEN_HOUR", policy.open_hour);
        let close_hour = env_or("CLINIC_CLOSE_HOUR", policy.close_hour);
        if open_hour < close_hour && close_hour <= 24 {
            policy.open_hour = open_hour;
            policy.close_hour = close_hour;
        } else {
            tracing::warn!("ignoring business hours {open_hour}..{close_hour}");
        }
        policy.customer_notice_hours =
            env_or("CLINIC_CUSTOMER_NOTICE_HOURS", policy.customer_notice_hours);
        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_parse(key).unwrap_or(default)
}
