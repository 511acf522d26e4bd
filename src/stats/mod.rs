//! Durable supervisor statistics.
//!
//! One small camelCase JSON document, rewritten atomically after every tick
//! (write temp file, fsync, rename). A missing or unreadable file starts a
//! fresh record; persistence problems are never fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::StatsDelta;

/// Per-device key holding restarts a repaired stats file could not attribute.
pub const UNATTRIBUTED_DEVICE: &str = "(unattributed)";

/// Counters that survive process restarts.
///
/// Only [`Stats::apply`] and [`Stats::record_check`] mutate the counters, so
/// `total_restarts` always equals the sum of `per_device_restart_counts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total_checks: u64,
    pub total_restarts: u64,
    pub per_device_restart_counts: BTreeMap<String, u64>,
    pub last_check_timestamp: Option<DateTime<Utc>>,
    pub process_start_timestamp: DateTime<Utc>,
    pub total_connect_failures: u64,
    pub total_restart_failures: u64,
    pub total_device_reboots: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_checks: 0,
            total_restarts: 0,
            per_device_restart_counts: BTreeMap::new(),
            last_check_timestamp: None,
            process_start_timestamp: Utc::now(),
            total_connect_failures: 0,
            total_restart_failures: 0,
            total_device_reboots: 0,
        }
    }
}

impl Stats {
    /// Count one tick.
    pub fn record_check(&mut self, now: DateTime<Utc>) {
        self.total_checks += 1;
        self.last_check_timestamp = Some(now);
    }

    /// Fold one tick's merged delta into the totals.
    pub fn apply(&mut self, delta: &StatsDelta) {
        for (device, count) in &delta.per_device_restarts {
            *self.per_device_restart_counts.entry(device.clone()).or_insert(0) += count;
            self.total_restarts += count;
        }
        self.total_connect_failures += delta.connect_failures;
        self.total_restart_failures += delta.restart_failures;
        self.total_device_reboots += delta.device_reboots;
    }

    pub fn restarts_for(&self, device_id: &str) -> u64 {
        self.per_device_restart_counts
            .get(device_id)
            .copied()
            .unwrap_or(0)
    }

    /// Repair a document whose total disagrees with the per-device map
    /// without lowering any counter. A total above the sum keeps its surplus
    /// under [`UNATTRIBUTED_DEVICE`]; a total below it is raised to the sum.
    fn reconcile(&mut self) {
        let sum: u64 = self.per_device_restart_counts.values().sum();
        if sum == self.total_restarts {
            return;
        }
        warn!(
            total = self.total_restarts,
            per_device_sum = sum,
            "Stats file restart totals disagree, keeping the larger count"
        );
        if self.total_restarts > sum {
            *self
                .per_device_restart_counts
                .entry(UNATTRIBUTED_DEVICE.to_string())
                .or_insert(0) += self.total_restarts - sum;
        } else {
            self.total_restarts = sum;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("failed to persist stats to {path}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize stats: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads and writes the stats document.
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored counters, or a fresh record if there are none.
    ///
    /// `processStartTimestamp` always reflects the current process.
    pub fn load(&self) -> Stats {
        let mut stats = match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<Stats>(&contents) {
                Ok(stats) => {
                    debug!(path = %self.path.display(), checks = stats.total_checks, "Loaded stats");
                    stats
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Stats file is corrupt, starting fresh");
                    Stats::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Stats::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stats file unreadable, starting fresh");
                Stats::default()
            }
        };
        stats.reconcile();
        stats.process_start_timestamp = Utc::now();
        stats
    }

    /// Atomically replace the stats file.
    pub fn save(&self, stats: &Stats) -> Result<(), StatsError> {
        let json = serde_json::to_vec_pretty(stats)?;
        let io_err = |source| StatsError::PersistenceFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
            file.write_all(&json).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(entries: &[(&str, u64)]) -> StatsDelta {
        let mut d = StatsDelta::default();
        for (device, n) in entries {
            d.per_device_restarts.insert((*device).to_string(), *n);
            d.restarts += n;
        }
        d
    }

    #[test]
    fn test_apply_keeps_totals_consistent() {
        let mut stats = Stats::default();
        stats.apply(&delta(&[("d1", 2), ("d2", 1)]));
        stats.apply(&delta(&[("d1", 1)]));
        assert_eq!(stats.total_restarts, 4);
        assert_eq!(stats.restarts_for("d1"), 3);
        assert_eq!(
            stats.per_device_restart_counts.values().sum::<u64>(),
            stats.total_restarts
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("nested").join("stats.json"));

        let mut stats = Stats::default();
        stats.record_check(Utc::now());
        stats.apply(&delta(&[("AC1", 2)]));
        store.save(&stats).unwrap();

        assert!(!dir.path().join("nested").join("stats.json.tmp").exists());

        let loaded = store.load();
        assert_eq!(loaded.total_checks, 1);
        assert_eq!(loaded.total_restarts, 2);
        assert_eq!(loaded.restarts_for("AC1"), 2);
        assert_eq!(loaded.last_check_timestamp, stats.last_check_timestamp);
    }

    #[test]
    fn test_camel_case_document() {
        let stats = Stats::default();
        let json = serde_json::to_value(&stats).unwrap();
        for key in [
            "totalChecks",
            "totalRestarts",
            "perDeviceRestartCounts",
            "lastCheckTimestamp",
            "processStartTimestamp",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_missing_fields_default() {
        let stats: Stats = serde_json::from_str(r#"{"totalChecks": 7}"#).unwrap();
        assert_eq!(stats.total_checks, 7);
        assert_eq!(stats.total_restarts, 0);
        assert!(stats.per_device_restart_counts.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{not json").unwrap();
        let stats = StatsStore::new(&path).load();
        assert_eq!(stats.total_checks, 0);
    }

    #[test]
    fn test_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsStore::new(dir.path().join("absent.json")).load();
        assert_eq!(stats, Stats {
            process_start_timestamp: stats.process_start_timestamp,
            ..Stats::default()
        });
    }

    #[test]
    fn test_inconsistent_total_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(
            &path,
            r#"{"totalRestarts": 10, "perDeviceRestartCounts": {"a": 2, "b": 3}}"#,
        )
        .unwrap();
        let stats = StatsStore::new(&path).load();
        assert_eq!(stats.total_restarts, 10);
        assert_eq!(stats.restarts_for("a"), 2);
        assert_eq!(stats.restarts_for(UNATTRIBUTED_DEVICE), 5);
        assert_eq!(
            stats.per_device_restart_counts.values().sum::<u64>(),
            stats.total_restarts
        );
    }

    #[test]
    fn test_low_total_is_raised_to_per_device_sum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(
            &path,
            r#"{"totalRestarts": 1, "perDeviceRestartCounts": {"a": 2, "b": 3}}"#,
        )
        .unwrap();
        let stats = StatsStore::new(&path).load();
        assert_eq!(stats.total_restarts, 5);
        assert!(!stats.per_device_restart_counts.contains_key(UNATTRIBUTED_DEVICE));
    }
}
