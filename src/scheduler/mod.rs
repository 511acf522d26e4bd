//! Monitor Scheduler: fixed-cadence check loop
//!
//! Each tick evaluates every account concurrently (bounded worker pool) and
//! every device of an account sequentially. Workers never touch the stats:
//! they return an [`AccountReport`] and the scheduler folds the deltas in one
//! place, then persists.

mod context;

pub use context::{AccountRuntime, AppContext, SchedulerSettings};

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::OfflinePolicy;
use crate::control_plane::{ControlPlaneError, OnlineHints};
use crate::recovery::TickLedger;
use crate::stats::Stats;
use crate::types::{AccountReport, DeviceReport, RecoveryOutcome, SkipReason, StatsDelta};

/// A tick that could not finish normally. The loop cools down and retries.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("worker pool closed: {0}")]
    WorkerPool(#[from] tokio::sync::AcquireError),
    #[error("{stage} task aborted: {source}")]
    Aborted {
        stage: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Counts for one finished tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub accounts: usize,
    pub failed_accounts: usize,
    pub devices_checked: usize,
    pub devices_skipped: usize,
    pub running: u64,
    pub restarted: u64,
    pub restart_failed: u64,
    pub connect_failed: u64,
    pub deferred: u64,
    pub reboots_requested: u64,
    pub elapsed_ms: u64,
}

impl TickSummary {
    fn add_report(&mut self, report: &AccountReport) {
        for device in &report.devices {
            if device.skipped.is_some() {
                self.devices_skipped += 1;
            } else {
                self.devices_checked += 1;
            }
            self.running += device.count(RecoveryOutcome::Running);
            self.restarted += device.count(RecoveryOutcome::RestartedOk);
            self.restart_failed += device.count(RecoveryOutcome::RestartFailed);
            self.connect_failed += device.count(RecoveryOutcome::ConnectFailed);
            self.deferred += device.count(RecoveryOutcome::Deferred);
            if device.reboot_requested {
                self.reboots_requested += 1;
            }
        }
    }
}

/// Owns the stats and drives ticks until cancelled.
pub struct MonitorScheduler {
    ctx: Arc<AppContext>,
    stats: Stats,
    tick: u64,
}

impl MonitorScheduler {
    /// Load persisted stats and prepare the loop.
    pub fn new(ctx: AppContext) -> Self {
        let stats = ctx.stats_store.load();
        Self {
            ctx: Arc::new(ctx),
            stats,
            tick: 0,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Run ticks until the cancellation token fires, then persist and return
    /// the final stats.
    pub async fn run(mut self) -> Stats {
        let cancel = self.ctx.cancel.clone();
        info!(
            accounts = self.ctx.accounts.len(),
            interval_secs = self.ctx.settings.check_interval.as_secs(),
            previous_checks = self.stats.total_checks,
            previous_restarts = self.stats.total_restarts,
            "🔁 Monitor loop starting"
        );

        while !cancel.is_cancelled() {
            let pause = match self.run_tick().await {
                Ok(_) => self.ctx.settings.check_interval,
                Err(e) => {
                    error!(error = %e, cooldown_secs = self.ctx.settings.error_cooldown.as_secs(), "Check failed, cooling down");
                    self.ctx.settings.error_cooldown
                }
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = cancel.cancelled() => {}
            }
        }

        info!("🛑 Monitor loop stopped, saving final stats");
        self.persist();
        self.stats
    }

    /// One full pass over every account.
    ///
    /// Account evaluation and the webhook run in their own tasks, so a panic
    /// in either surfaces as [`SchedulerError::Aborted`]. The check is still
    /// counted, and a failed notification comes after the stats are saved.
    pub async fn run_tick(&mut self) -> Result<TickSummary, SchedulerError> {
        let started = Instant::now();
        self.tick += 1;
        self.stats.record_check(Utc::now());

        let account_count = self.ctx.accounts.len();
        let (reports, failed_accounts) = tokio::spawn(collect_reports(Arc::clone(&self.ctx)))
            .await
            .map_err(|source| SchedulerError::Aborted {
                stage: "account evaluation",
                source,
            })??;

        let mut delta = StatsDelta::default();
        let mut summary = TickSummary {
            tick: self.tick,
            accounts: account_count,
            failed_accounts,
            ..TickSummary::default()
        };
        for (_, report) in &reports {
            delta.merge(&report.delta());
            summary.add_report(report);
        }

        self.stats.apply(&delta);
        self.persist();
        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let notified = self.notify(&reports).await;
        self.log_summary(&summary);
        notified.map(|()| summary)
    }

    fn persist(&self) {
        if let Err(e) = self.ctx.stats_store.save(&self.stats) {
            error!(error = %e, "Failed to save stats; counters continue in memory");
        }
    }

    /// Delivery errors are only logged; a panicking notifier fails the tick.
    async fn notify(&self, reports: &[(usize, AccountReport)]) -> Result<(), SchedulerError> {
        let Some(notifier) = self.ctx.notifier.clone() else {
            return Ok(());
        };
        let events: Vec<_> = reports
            .iter()
            .flat_map(|(_, r)| r.attempts().cloned())
            .collect();
        let tick = self.tick;
        let delivery = tokio::spawn(async move { notifier.notify_tick(tick, &events).await })
            .await
            .map_err(|source| SchedulerError::Aborted {
                stage: "notification",
                source,
            })?;
        if let Err(e) = delivery {
            warn!(error = %e, "Webhook notification failed");
        }
        Ok(())
    }

    fn log_summary(&self, summary: &TickSummary) {
        let next_in = self.ctx.settings.check_interval.as_secs();
        info!(
            check = summary.tick,
            total_checks = self.stats.total_checks,
            total_restarts = self.stats.total_restarts,
            devices_checked = summary.devices_checked,
            devices_skipped = summary.devices_skipped,
            running = summary.running,
            restarted = summary.restarted,
            restart_failed = summary.restart_failed,
            connect_failed = summary.connect_failed,
            deferred = summary.deferred,
            elapsed_ms = summary.elapsed_ms,
            "📊 Check #{} complete, next check in {}s",
            summary.tick,
            next_in
        );
    }
}

/// Evaluate every account on a bounded worker pool. Returns the reports in
/// account order and the number of workers that panicked.
async fn collect_reports(
    ctx: Arc<AppContext>,
) -> Result<(Vec<(usize, AccountReport)>, usize), SchedulerError> {
    let account_count = ctx.accounts.len();
    let pool = Arc::new(Semaphore::new(ctx.settings.worker_count(account_count)));
    let mut tasks: JoinSet<(usize, AccountReport)> = JoinSet::new();

    for index in 0..account_count {
        let ctx = Arc::clone(&ctx);
        let permit = Arc::clone(&pool).acquire_owned().await?;
        tasks.spawn(async move {
            let _permit = permit;
            (index, evaluate_account(&ctx, index).await)
        });
    }

    let mut reports: Vec<(usize, AccountReport)> = Vec::with_capacity(account_count);
    let mut failed_accounts = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(pair) => reports.push(pair),
            Err(e) => {
                failed_accounts += 1;
                error!(error = %e, "Account worker panicked; its results are lost for this check");
            }
        }
    }
    if failed_accounts > 0 {
        let finished: BTreeSet<usize> = reports.iter().map(|(i, _)| *i).collect();
        for (i, runtime) in ctx.accounts.iter().enumerate() {
            if !finished.contains(&i) {
                error!(account = %runtime.account.name, "Account produced no report this check");
            }
        }
    }
    reports.sort_by_key(|(i, _)| *i);
    Ok((reports, failed_accounts))
}

/// Evaluate one account: hints first (best effort), then each device in order.
async fn evaluate_account(ctx: &AppContext, index: usize) -> AccountReport {
    let runtime = &ctx.accounts[index];
    let account = &runtime.account;
    let settings = &ctx.settings;

    let mut report = AccountReport {
        account: account.name.clone(),
        hints_available: false,
        hint_error: None,
        devices: Vec::with_capacity(account.devices.len()),
    };

    if ctx.cancel.is_cancelled() {
        for device in &account.devices {
            let mut dr = DeviceReport::new(device, None);
            dr.skipped = Some(SkipReason::Cancelled);
            report.devices.push(dr);
        }
        return report;
    }

    let hints = match tokio::time::timeout(
        settings.listing_timeout,
        runtime
            .control_plane
            .list_all_devices(settings.page_size, settings.max_pages),
    )
    .await
    {
        Ok(Ok(statuses)) => {
            report.hints_available = true;
            OnlineHints::from_statuses(&statuses)
        }
        Ok(Err(e)) => {
            log_hint_error(&account.name, &e);
            report.hint_error = Some(e.to_string());
            OnlineHints::default()
        }
        Err(_) => {
            let msg = format!("device listing timed out after {}s", settings.listing_timeout.as_secs());
            warn!(account = %account.name, "{msg}; checking every device");
            report.hint_error = Some(msg);
            OnlineHints::default()
        }
    };

    let mut ledger = TickLedger::new();
    for device in &account.devices {
        let hint = hints.lookup(device);
        let mut dr = DeviceReport::new(device, hint);

        if ctx.cancel.is_cancelled() {
            dr.skipped = Some(SkipReason::Cancelled);
            report.devices.push(dr);
            continue;
        }

        if hint == Some(false) {
            if settings.restart_offline_devices {
                dr.reboot_requested = request_reboot(runtime, &device.device_id).await;
            }
            if settings.offline_policy == OfflinePolicy::Skip {
                info!(account = %account.name, device = %device.device_id, name = %device.display_name, "Device reported offline, skipping");
                dr.skipped = Some(SkipReason::ReportedOffline);
                report.devices.push(dr);
                continue;
            }
        }

        dr.attempts = ctx.engine.check_device(device, &mut ledger, &ctx.cancel).await;
        log_device(&account.name, &dr);
        report.devices.push(dr);
    }

    report
}

async fn request_reboot(runtime: &AccountRuntime, device_id: &str) -> bool {
    match runtime.control_plane.request_restart(device_id).await {
        Ok(true) => {
            info!(account = %runtime.account.name, device = device_id, "Requested reboot of offline device");
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(account = %runtime.account.name, device = device_id, error = %e, "Reboot request failed");
            false
        }
    }
}

fn log_hint_error(account: &str, e: &ControlPlaneError) {
    match e {
        ControlPlaneError::Unauthorized { .. } | ControlPlaneError::ClockSkew { .. } => {
            error!(account, error = %e, "Control-plane listing failed; checking every device");
        }
        _ => warn!(account, error = %e, "Control-plane listing failed; checking every device"),
    }
}

fn log_device(account: &str, report: &DeviceReport) {
    for a in &report.attempts {
        match a.outcome {
            RecoveryOutcome::Running | RecoveryOutcome::RestartedOk => info!(
                account,
                device = %report.device_id,
                name = %report.display_name,
                package = %a.package,
                app = %a.app_name,
                outcome = %a.outcome,
                "App status"
            ),
            RecoveryOutcome::Deferred => warn!(
                account,
                device = %report.device_id,
                package = %a.package,
                outcome = %a.outcome,
                detail = a.detail.as_deref().unwrap_or(""),
                "App restart deferred to next check"
            ),
            RecoveryOutcome::RestartFailed | RecoveryOutcome::ConnectFailed => error!(
                account,
                device = %report.device_id,
                name = %report.display_name,
                package = %a.package,
                outcome = %a.outcome,
                detail = a.detail.as_deref().unwrap_or(""),
                "App recovery failed"
            ),
        }
    }
}

