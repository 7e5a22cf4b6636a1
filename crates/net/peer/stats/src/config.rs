//! Peer statistics CLI arguments and registry configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::score::{InactivityPolicy, ScoreWeights};

/// Default statistics store file name, relative to the data directory.
pub const DEFAULT_STORE_FILE: &str = "statistics.sto";

/// Default age after which statistics are expired.
const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Default longer retention window, reserved for stale entries.
const DEFAULT_STALE_RETENTION_DAYS: u64 = 14;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Peer statistics configuration.
#[derive(Debug, Args, Clone, Serialize, Deserialize)]
#[command(next_help_heading = "Peer Statistics")]
#[serde(default)]
pub struct PeerStatsArgs {
    /// Statistics store file, relative to the data directory unless absolute.
    #[arg(long = "stats.store-file", default_value = DEFAULT_STORE_FILE, value_name = "FILE")]
    pub store_file: PathBuf,

    /// Expire statistics created more than this many days ago.
    #[arg(long = "stats.retention-days", default_value = "7", value_name = "DAYS")]
    pub retention_days: u64,

    /// Retention for stale entries (not yet enforced).
    #[arg(long = "stats.stale-retention-days", default_value = "14", value_name = "DAYS")]
    pub stale_retention_days: u64,

    /// Track a moving average of tunnel build times and log it.
    #[arg(long = "stats.observe-build-times")]
    pub observe_build_times: bool,

    /// Score weights (config file only).
    #[arg(skip)]
    pub weights: ScoreWeights,

    /// Inactivity thresholds (config file only).
    #[arg(skip)]
    pub inactivity: InactivityPolicy,
}

impl Default for PeerStatsArgs {
    fn default() -> Self {
        Self {
            store_file: PathBuf::from(DEFAULT_STORE_FILE),
            retention_days: DEFAULT_RETENTION_DAYS,
            stale_retention_days: DEFAULT_STALE_RETENTION_DAYS,
            observe_build_times: false,
            weights: ScoreWeights::default(),
            inactivity: InactivityPolicy::default(),
        }
    }
}

impl PeerStatsArgs {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn stale_retention(&self) -> Duration {
        Duration::from_secs(self.stale_retention_days.saturating_mul(SECS_PER_DAY))
    }

    /// Resolve the store file against `datadir`.
    pub fn store_path(&self, datadir: &Path) -> PathBuf {
        datadir.join(&self.store_file)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            weights: self.weights.clone(),
            inactivity: self.inactivity.clone(),
            observe_build_times: self.observe_build_times,
        }
    }
}

/// Runtime behaviour of a [`PeerStatsRegistry`](crate::PeerStatsRegistry).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryConfig {
    pub weights: ScoreWeights,
    pub inactivity: InactivityPolicy,
    pub observe_build_times: bool,
}
