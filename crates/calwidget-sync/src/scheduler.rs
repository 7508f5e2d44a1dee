//! Background refresh scheduler.
//!
//! This module provides a scheduler that periodically refreshes widget data
//! with support for:
//! - A configurable refresh interval (5 minutes by default)
//! - Jitter so several widgets do not poll in lockstep
//! - Cooldown after a manual refresh
//! - Exponential backoff on errors, capped at the refresh interval
//! - Pausing while the widget is hidden, catching up on resume

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng as _;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between refreshes.
    pub sync_interval: Duration,
    /// Maximum jitter added to the interval (as fraction 0.0-1.0).
    pub jitter_fraction: f64,
    /// Cooldown period after a manual refresh.
    pub refresh_cooldown: Duration,
    /// Initial backoff duration on error.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            jitter_fraction: 0.1,
            refresh_cooldown: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given interval; backoff is capped at it.
    pub fn new(sync_interval: Duration) -> Self {
        Self {
            sync_interval,
            max_backoff: sync_interval,
            ..Default::default()
        }
    }

    /// Builder: set jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set refresh cooldown.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Builder: set backoff parameters. `max` never exceeds the refresh interval.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.min(self.sync_interval);
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the next refresh delay with jitter.
    pub fn next_sync_delay(&self) -> Duration {
        let base = self.sync_interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Calculates backoff delay based on consecutive failures.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let exponent = i32::try_from(consecutive_failures - 1).unwrap_or(i32::MAX);
        let delay = base * self.backoff_multiplier.powi(exponent);
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }
}

/// A value in `[-range, range]`.
fn rand_jitter(range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    rand::rng().random_range(-range..=range)
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Manual refresh, skipped during cooldown unless `force` is set.
    Refresh { force: bool },
    /// Pause the timer.
    Pause,
    /// Resume the timer, refreshing at once if a tick was skipped.
    Resume,
}

/// Scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Whether the scheduler is paused.
    pub paused: bool,
    /// A tick fell into a pause.
    pub missed_tick: bool,
    /// Number of consecutive refresh failures.
    pub consecutive_failures: u32,
    /// Last successful refresh time.
    pub last_sync: Option<DateTime<Utc>>,
    /// Last refresh attempt time.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Last manual refresh time (for cooldown).
    pub last_refresh: Option<Instant>,
}

impl SchedulerState {
    /// Creates a new scheduler state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful refresh.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_sync = Some(Utc::now());
        self.last_attempt = self.last_sync;
        self.last_error = None;
    }

    /// Records a failed refresh.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }

    /// Records a manual refresh.
    pub fn record_refresh(&mut self) {
        self.last_refresh = Some(Instant::now());
    }

    /// Returns true if we're in cooldown period.
    pub fn in_cooldown(&self, cooldown: Duration) -> bool {
        self.last_refresh
            .is_some_and(|last_refresh| last_refresh.elapsed() < cooldown)
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// The scheduler drives periodic background refreshes.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    /// Creates a new scheduler with the given configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::new(RwLock::new(SchedulerState::new())),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands to the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs the scheduler loop with the given refresh function.
    ///
    /// The function runs once immediately, then on every tick. It returns an
    /// error message on failure.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), String>> + Send,
    {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // the loop ends when every handle is gone
        drop(command_tx);

        let runner = Runner { config, state };
        info!(
            interval_secs = runner.config.sync_interval.as_secs(),
            "scheduler started"
        );

        runner.do_sync(&sync_fn).await;

        loop {
            let delay = runner.calculate_next_delay().await;
            debug!(delay_secs = delay.as_secs(), "scheduling next refresh");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut state = runner.state.write().await;
                        if state.paused {
                            debug!("scheduler paused, skipping refresh");
                            state.missed_tick = true;
                            continue;
                        }
                    }
                    runner.do_sync(&sync_fn).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Refresh { force }) => {
                            let in_cooldown = runner
                                .state
                                .read()
                                .await
                                .in_cooldown(runner.config.refresh_cooldown);

                            if force || !in_cooldown {
                                runner.state.write().await.record_refresh();
                                runner.do_sync(&sync_fn).await;
                            } else {
                                debug!("skipping refresh due to cooldown");
                            }
                        }
                        Some(SchedulerCommand::Pause) => {
                            info!("scheduler paused");
                            runner.state.write().await.paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            info!("scheduler resumed");
                            let missed = {
                                let mut state = runner.state.write().await;
                                state.paused = false;
                                std::mem::take(&mut state.missed_tick)
                            };
                            if missed {
                                runner.do_sync(&sync_fn).await;
                            }
                        }
                        None => {
                            info!("scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

struct Runner {
    config: SchedulerConfig,
    state: SharedSchedulerState,
}

impl Runner {
    async fn calculate_next_delay(&self) -> Duration {
        let state = self.state.read().await;

        if state.consecutive_failures > 0 {
            let backoff = self.config.backoff_delay(state.consecutive_failures);
            debug!(
                failures = state.consecutive_failures,
                backoff_secs = backoff.as_secs(),
                "using backoff delay"
            );
            return backoff;
        }

        // after a manual refresh the next tick is measured from it
        if state.in_cooldown(self.config.refresh_cooldown)
            && let Some(last_refresh) = state.last_refresh
        {
            let remaining = self
                .config
                .refresh_cooldown
                .saturating_sub(last_refresh.elapsed());
            return remaining.max(self.config.next_sync_delay());
        }

        self.config.next_sync_delay()
    }

    async fn do_sync<F, Fut>(&self, sync_fn: &F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        debug!("starting refresh");
        match sync_fn().await {
            Ok(()) => {
                debug!("refresh completed");
                self.state.write().await.record_success();
            }
            Err(e) => {
                warn!(error = %e, "refresh failed");
                self.state.write().await.record_failure(e);
            }
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Triggers a manual refresh (respects cooldown unless force is true).
    pub async fn refresh(&self, force: bool) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx
            .send(SchedulerCommand::Refresh { force })
            .await
    }

    /// Pauses the timer.
    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Pause).await
    }

    /// Resumes the timer.
    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Resume).await
    }

    /// Returns the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    /// Returns true if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert!(config.jitter_fraction > 0.0);
        assert!(config.max_backoff <= config.sync_interval);
    }

    #[test]
    fn config_next_sync_delay() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.1);

        for _ in 0..100 {
            let delay = config.next_sync_delay();
            assert!(delay.as_secs_f64() >= 54.0);
            assert!(delay.as_secs_f64() <= 66.0);
        }

        let exact = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.0);
        assert_eq!(exact.next_sync_delay(), Duration::from_secs(60));
    }

    #[test]
    fn config_backoff_delay() {
        let config = SchedulerConfig::new(Duration::from_secs(300)).with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(3600),
            2.0,
        );

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));

        // capped at the refresh interval, not the requested maximum
        assert_eq!(config.backoff_delay(10), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn state_record_success() {
        let mut state = SchedulerState::new();
        state.consecutive_failures = 5;

        state.record_success();

        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_sync.is_some());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn state_record_failure() {
        let mut state = SchedulerState::new();

        state.record_failure("offline");

        assert_eq!(state.consecutive_failures, 1);
        assert!(state.last_attempt.is_some());
        assert_eq!(state.last_error, Some("offline".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn state_cooldown() {
        let mut state = SchedulerState::new();
        let cooldown = Duration::from_secs(30);

        assert!(!state.in_cooldown(cooldown));

        state.record_refresh();
        assert!(state.in_cooldown(cooldown));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!state.in_cooldown(cooldown));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_commands() {
        let config = SchedulerConfig::new(Duration::from_secs(300));
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let sync_count = Arc::new(AtomicU32::new(0));
        let sync_count_clone = sync_count.clone();

        let scheduler_task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let count = sync_count_clone.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        });

        // initial refresh
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 1);

        // manual refresh, then a second one inside the cooldown is ignored
        handle.refresh(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.refresh(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 2);

        handle.refresh(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 3);

        handle.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_paused().await);

        // nothing was skipped, so resuming does not refresh
        handle.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_paused().await);
        assert_eq!(sync_count.load(Ordering::SeqCst), 3);

        // the loop ends with the last handle
        drop(handle);
        scheduler_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_ticks_on_interval() {
        let config = SchedulerConfig::new(Duration::from_secs(300)).with_jitter(0.0);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let sync_count = Arc::new(AtomicU32::new(0));
        let counter = sync_count.clone();
        let scheduler_task = tokio::spawn(scheduler.run(move || {
            let count = counter.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 2);

        drop(handle);
        scheduler_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn paused_scheduler_catches_up_on_resume() {
        let config = SchedulerConfig::new(Duration::from_secs(300)).with_jitter(0.0);
        let scheduler = Scheduler::new(config);
        let handle = scheduler.handle();

        let sync_count = Arc::new(AtomicU32::new(0));
        let counter = sync_count.clone();
        let scheduler_task = tokio::spawn(scheduler.run(move || {
            let count = counter.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.pause().await.unwrap();

        // two ticks pass while hidden
        tokio::time::sleep(Duration::from_secs(700)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 1);
        assert!(handle.state().await.missed_tick);

        handle.resume().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync_count.load(Ordering::SeqCst), 2);
        assert!(!handle.state().await.missed_tick);

        drop(handle);
        scheduler_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_backs_off_then_recovers() {
        let config = SchedulerConfig::new(Duration::from_secs(300))
            .with_jitter(0.0)
            .with_backoff(Duration::from_secs(10), Duration::from_secs(300), 2.0);

        let scheduler = Scheduler::new(config);
        let state = scheduler.state();
        let handle = scheduler.handle();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let scheduler_task = tokio::spawn(scheduler.run(move || {
            let count = counter.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst);
                if n < 3 { Err(format!("failure {n}")) } else { Ok(()) }
            }
        }));

        // attempts at 0s, 10s, 30s and 70s
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(state.read().await.consecutive_failures, 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.read().await.consecutive_failures, 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(state.read().await.consecutive_failures, 0);

        drop(handle);
        scheduler_task.await.unwrap();
    }
}
