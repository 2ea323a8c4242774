//! Check registry and periodic scheduler.
//!
//! # Responsibilities
//! - Hold the set of registered checks behind a reader/writer lock
//! - Fan out every check once per tick and wait for the whole generation
//! - Bound each checker run by a deadline
//!
//! # Design Decisions
//! - One interval for all checks, not configurable per check
//! - A tick never overlaps the next one; a slow generation delays the schedule
//! - A failing checker only affects its own check

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::HealthConfig;
use crate::health::check::{Check, CheckSnapshot, Status};
use crate::health::checker::{checker_for_type, CheckError};
use crate::lifecycle::shutdown_requested;
use crate::observability::metrics;

/// Default tick interval.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// How many ticks a scheduler run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// Run until shut down.
    Forever,
    /// Run exactly this many ticks, then return.
    Times(u64),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid iteration count {0}: use -1 for unbounded or a non-negative count")]
pub struct InvalidIterations(pub i64);

impl TryFrom<i64> for Iterations {
    type Error = InvalidIterations;

    fn try_from(count: i64) -> Result<Self, Self::Error> {
        match count {
            -1 => Ok(Iterations::Forever),
            n if n >= 0 => Ok(Iterations::Times(n as u64)),
            n => Err(InvalidIterations(n)),
        }
    }
}

impl FromStr for Iterations {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: i64 = s.trim().parse().map_err(|e| format!("{e}"))?;
        Iterations::try_from(n).map_err(|e| e.to_string())
    }
}

impl fmt::Display for Iterations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iterations::Forever => f.write_str("forever"),
            Iterations::Times(n) => write!(f, "{n}"),
        }
    }
}

/// Registry of checks plus the scheduler that runs them.
pub struct Monitor {
    check_interval: Duration,
    check_timeout: Option<Duration>,
    checks: RwLock<HashMap<String, Arc<Check>>>,
}

impl Monitor {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            check_interval,
            check_timeout: None,
            checks: RwLock::new(HashMap::with_capacity(5)),
        }
    }

    /// Cap individual checker runs below the tick interval.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    /// Build a monitor and register every configured check.
    pub fn from_config(config: &HealthConfig) -> Result<Self, CheckError> {
        let mut monitor = Monitor::new(Duration::from_millis(config.check_interval_ms));
        if let Some(ms) = config.check_timeout_ms {
            monitor = monitor.with_check_timeout(Duration::from_millis(ms));
        }

        let probe_timeout = monitor.deadline();
        for cfg in &config.checks {
            let checker = checker_for_type(&cfg.check_type, probe_timeout)?;
            let check = Check::new(cfg.id.clone())
                .with_checker(cfg.check_type.clone(), checker)
                .with_args(cfg.args.clone())
                .with_max_count(cfg.max_count);
            monitor.add_check(check);
        }

        Ok(monitor)
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Deadline applied to each checker run.
    pub fn deadline(&self) -> Duration {
        match self.check_timeout {
            Some(timeout) => timeout.min(self.check_interval),
            None => self.check_interval,
        }
    }

    /// Insert or replace a check by id.
    pub fn add_check(&self, check: Check) {
        let id = check.id.clone();
        let replaced = self.write().insert(id.clone(), Arc::new(check)).is_some();
        tracing::debug!(check = %id, replaced, "Check registered");
    }

    /// Remove a check by id. Absent ids are ignored.
    pub fn remove_check(&self, id: &str) {
        if self.write().remove(id).is_some() {
            tracing::debug!(check = %id, "Check removed");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Check>> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Checks currently HEALTHY.
    pub fn healthy(&self) -> Vec<Arc<Check>> {
        self.filter(|status| status == Status::Healthy)
    }

    /// Checks in any status other than HEALTHY.
    pub fn unhealthy(&self) -> Vec<Arc<Check>> {
        self.filter(|status| status != Status::Healthy)
    }

    /// Serializable copy of every check, sorted by id.
    pub fn snapshot(&self) -> Vec<CheckSnapshot> {
        let mut all: Vec<CheckSnapshot> = self.read().values().map(|c| c.snapshot()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn filter(&self, keep: impl Fn(Status) -> bool) -> Vec<Arc<Check>> {
        self.read()
            .values()
            .filter(|check| keep(check.status()))
            .cloned()
            .collect()
    }

    /// Drive the tick loop. Returns the number of ticks performed.
    pub async fn run(&self, iterations: Iterations, mut shutdown: broadcast::Receiver<()>) -> u64 {
        if iterations == Iterations::Times(0) {
            return 0;
        }

        tracing::info!(
            interval_ms = self.check_interval.as_millis() as u64,
            iterations = %iterations,
            checks = self.len(),
            "Health monitor starting"
        );

        let start = time::Instant::now() + self.check_interval;
        let mut ticker = time::interval_at(start, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }

            self.run_checks().await;
            ticks += 1;

            if let Iterations::Times(n) = iterations {
                if ticks >= n {
                    break;
                }
            }
        }

        ticks
    }

    /// Run every registered check once and wait for all of them.
    pub async fn run_checks(&self) {
        let checks: Vec<Arc<Check>> = self.read().values().cloned().collect();
        tracing::debug!(count = checks.len(), "Running checks");

        let started = Instant::now();
        let deadline = self.deadline();
        let mut tasks = JoinSet::new();
        for check in checks {
            tasks.spawn(execute(check, deadline));
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "Check task aborted");
            }
        }

        metrics::record_tick(started.elapsed());
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Check>>> {
        self.checks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Check>>> {
        self.checks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL)
    }
}

async fn execute(check: Arc<Check>, deadline: Duration) {
    let token = CancellationToken::new();
    let outcome = time::timeout(deadline, check.checker().run(&check.args, &token)).await;

    match outcome {
        Ok(Ok(status)) => check.update_status(status, None),
        Ok(Err(e)) => check.update_status(Status::Unknown, Some(&e)),
        Err(_) => {
            token.cancel();
            let e = CheckError::Timeout(deadline);
            check.update_status(Status::Unknown, Some(&e));
        }
    }

    metrics::record_check_status(&check.id, check.status());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checker::Checker;
    use async_trait::async_trait;

    struct Fixed(Status);

    #[async_trait]
    impl Checker for Fixed {
        async fn run(
            &self,
            _args: &str,
            _cancel: &CancellationToken,
        ) -> Result<Status, CheckError> {
            Ok(self.0)
        }
    }

    struct Hang;

    #[async_trait]
    impl Checker for Hang {
        async fn run(&self, _args: &str, cancel: &CancellationToken) -> Result<Status, CheckError> {
            cancel.cancelled().await;
            Err(CheckError::Cancelled)
        }
    }

    #[test]
    fn test_iterations_parsing() {
        assert_eq!(Iterations::try_from(-1i64), Ok(Iterations::Forever));
        assert_eq!(Iterations::try_from(3i64), Ok(Iterations::Times(3)));
        assert_eq!(Iterations::try_from(-2i64), Err(InvalidIterations(-2)));
        assert_eq!("-1".parse::<Iterations>(), Ok(Iterations::Forever));
        assert!("abc".parse::<Iterations>().is_err());
    }

    #[test]
    fn test_add_is_upsert() {
        let monitor = Monitor::default();
        monitor.add_check(Check::new("web").with_max_count(1));
        monitor.add_check(Check::new("web").with_max_count(4));
        assert_eq!(monitor.len(), 1);
        assert_eq!(monitor.get("web").unwrap().max_count, 4);

        monitor.remove_check("web");
        monitor.remove_check("web");
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_healthy_unhealthy_partition() {
        let monitor = Monitor::default();
        let seeds = [
            ("a", Status::Healthy),
            ("b", Status::Sickly),
            ("c", Status::Healthy),
        ];
        for (id, status) in seeds {
            let check = Check::new(id).with_max_count(3);
            check.update_status(status, None);
            monitor.add_check(check);
        }
        monitor.add_check(Check::new("d"));

        let healthy = monitor.healthy();
        let unhealthy = monitor.unhealthy();
        assert_eq!(healthy.len(), 2);
        assert_eq!(unhealthy.len(), 2);
        assert_eq!(healthy.len() + unhealthy.len(), monitor.len());
        assert!(healthy.iter().all(|c| c.status() == Status::Healthy));
        assert!(unhealthy.iter().all(|c| c.status() != Status::Healthy));
    }

    #[tokio::test]
    async fn test_new_check_is_unhealthy_until_first_run() {
        let monitor = Monitor::default();
        monitor.add_check(Check::new("web"));
        assert!(monitor.healthy().is_empty());
        assert_eq!(monitor.unhealthy().len(), 1);

        monitor.run_checks().await;
        assert_eq!(monitor.healthy().len(), 1);
        assert!(monitor.unhealthy().is_empty());
    }

    #[test]
    fn test_deadline_bounded_by_interval() {
        let monitor =
            Monitor::new(Duration::from_secs(1)).with_check_timeout(Duration::from_secs(5));
        assert_eq!(monitor.deadline(), Duration::from_secs(1));

        let monitor =
            Monitor::new(Duration::from_secs(1)).with_check_timeout(Duration::from_millis(200));
        assert_eq!(monitor.deadline(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_run_checks_updates_every_check() {
        let monitor = Monitor::new(Duration::from_millis(10));
        monitor.add_check(Check::new("ok").with_checker("fixed", Box::new(Fixed(Status::Healthy))));
        monitor.add_check(
            Check::new("bad")
                .with_checker("fixed", Box::new(Fixed(Status::Sickly)))
                .with_max_count(2),
        );

        monitor.run_checks().await;
        assert_eq!(monitor.get("ok").unwrap().status(), Status::Healthy);
        assert_eq!(monitor.get("bad").unwrap().status(), Status::Sickly);

        monitor.run_checks().await;
        assert_eq!(monitor.get("bad").unwrap().status(), Status::Failed);
    }

    #[tokio::test]
    async fn test_hung_checker_times_out_as_unknown() {
        let monitor =
            Monitor::new(Duration::from_millis(50)).with_check_timeout(Duration::from_millis(20));
        let hung = Check::new("hung").with_checker("hang", Box::new(Hang));
        monitor.add_check(hung.with_max_count(5));
        let fine = Check::new("fine").with_checker("fixed", Box::new(Fixed(Status::Healthy)));
        monitor.add_check(fine);

        monitor.run_checks().await;

        let hung = monitor.get("hung").unwrap();
        assert_eq!(hung.status(), Status::Unknown);
        assert_eq!(hung.count(), 1);
        assert_eq!(monitor.get("fine").unwrap().status(), Status::Healthy);
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_immediately() {
        let monitor = Monitor::new(Duration::from_secs(60));
        let (_tx, rx) = broadcast::channel(1);
        assert_eq!(monitor.run(Iterations::Times(0), rx).await, 0);
    }

    #[test]
    fn test_from_config_rejects_unknown_type() {
        let mut config = HealthConfig::default();
        config.checks.push(crate::config::CheckConfig {
            id: "x".into(),
            check_type: "smoke-signal".into(),
            args: String::new(),
            max_count: 1,
        });
        assert!(matches!(Monitor::from_config(&config), Err(CheckError::UnknownType(_))));
    }
}
