//! Recurring background measurements.
//!
//! A [`Scheduler`] is either disabled (interval 0, no loop) or running one
//! ticking loop. Every reconfiguration cancels the previous loop before a new
//! one is spawned, all under a single lock acquisition, so a stale loop can
//! never tick after a newer one started. Cancellation is observed between
//! ticks only: a measurement already running finishes first.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::Client;
use crate::error::{Result, SpeedError};
use crate::storage::{Config, ConfigStore};

const HOUR: Duration = Duration::from_secs(60 * 60);

type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct State {
    interval_hours: u32,
    active: Option<(CancellationToken, JoinHandle<()>)>,
}

pub struct Scheduler {
    job: Job,
    period_unit: Duration,
    config: Option<ConfigStore>,
    state: Mutex<State>,
    live_loops: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Create a disabled scheduler that runs `job` on every tick.
    pub fn new<F, Fut>(job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Scheduler {
            job: Arc::new(move || Box::pin(job()) as BoxFuture<'static, ()>),
            period_unit: HOUR,
            config: None,
            state: Mutex::new(State::default()),
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scheduler running `client` measurements, started with the interval
    /// saved in `store`. Failed runs are logged; there is no caller to
    /// report them to.
    pub fn for_client(client: Client, store: ConfigStore) -> Self {
        let initial = store.load().interval_hours;
        let scheduler = Scheduler::new(move || {
            let client = client.clone();
            async move {
                if let Err(e) = client.run_measurement().await {
                    warn!(error = %e, "scheduled measurement failed");
                }
            }
        })
        .with_config(store);
        scheduler.set_interval(initial);
        scheduler
    }

    /// Persist interval changes made through [`set_schedule`](Self::set_schedule).
    pub fn with_config(mut self, store: ConfigStore) -> Self {
        self.config = Some(store);
        self
    }

    /// Length of one interval unit. Defaults to one hour.
    pub fn with_period_unit(mut self, unit: Duration) -> Self {
        self.period_unit = unit;
        self
    }

    /// Validate, persist and apply a new interval. Negative values are
    /// rejected before anything changes.
    pub fn set_schedule(&self, hours: i64) -> Result<()> {
        let hours = validate_interval(hours)?;
        if let Some(store) = &self.config {
            store.save(Config {
                interval_hours: hours,
            })?;
        }
        self.set_interval(hours);
        Ok(())
    }

    /// Replace the running loop (if any) with one ticking every `hours`.
    /// Zero disables scheduled runs.
    pub fn set_interval(&self, hours: u32) {
        let mut state = self.lock();

        if let Some((token, _handle)) = state.active.take() {
            token.cancel();
        }
        state.interval_hours = hours;

        if hours == 0 {
            info!("scheduled measurements disabled");
            return;
        }

        let token = CancellationToken::new();
        let period = self.period_unit * hours;
        let handle = tokio::spawn(tick_loop(
            Arc::clone(&self.job),
            period,
            token.clone(),
            LoopGuard::enter(&self.live_loops),
        ));
        state.active = Some((token, handle));
        info!(interval_hours = hours, "scheduled measurements enabled");
    }

    /// Current interval in hours; 0 when disabled.
    pub fn interval(&self) -> u32 {
        self.lock().interval_hours
    }

    /// Number of background loops still running. Cancelled loops count
    /// until they observe their cancellation.
    pub fn active_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accept an interval in hours, rejecting negative or out-of-range values.
pub fn validate_interval(hours: i64) -> Result<u32> {
    u32::try_from(hours).map_err(|_| SpeedError::InvalidInterval(hours))
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some((token, _handle)) = state.active.take() {
            token.cancel();
        }
    }
}

async fn tick_loop(job: Job, period: Duration, cancel: CancellationToken, _guard: LoopGuard) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                info!("running scheduled measurement");
                job().await;
            }
        }
    }
    info!("scheduler loop stopped");
}

/// Counts a loop as live from spawn until its task ends.
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        LoopGuard(Arc::clone(counter))
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_scheduler() -> (Scheduler, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let scheduler = Scheduler::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });
        (scheduler, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_interval() {
        let (scheduler, _) = counting_scheduler();
        assert_eq!(scheduler.interval(), 0);
        scheduler.set_interval(6);
        assert_eq!(scheduler.interval(), 6);
        scheduler.set_interval(0);
        assert_eq!(scheduler.interval(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_period() {
        let (scheduler, runs) = counting_scheduler();
        scheduler.set_interval(2);

        tokio::time::sleep(HOUR).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "no run before the first period");

        tokio::time::sleep(HOUR * 4 + Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn period_unit_scales_the_interval() {
        let (scheduler, runs) = counting_scheduler();
        let scheduler = scheduler.with_period_unit(Duration::from_secs(1));
        scheduler.set_interval(2);

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_reconfiguration_leaves_no_loops() {
        let (scheduler, runs) = counting_scheduler();
        scheduler.set_interval(0);
        scheduler.set_interval(1);
        scheduler.set_interval(0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.active_loops(), 0);

        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfiguring_keeps_a_single_loop() {
        let (scheduler, runs) = counting_scheduler();
        for hours in [3, 1, 2, 1] {
            scheduler.set_interval(hours);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.active_loops(), 1);

        tokio::time::sleep(HOUR * 3 + Duration::from_secs(1)).await;
        // Only the last (1 hour) loop ticks.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_schedule_is_rejected() {
        let (scheduler, _) = counting_scheduler();
        scheduler.set_interval(4);
        let err = scheduler.set_schedule(-1).unwrap_err();
        assert!(matches!(err, SpeedError::InvalidInterval(-1)));
        assert_eq!(scheduler.interval(), 4);
    }

    #[test]
    fn oversized_interval_names_both_bounds() {
        let too_big = i64::from(u32::MAX) + 1;
        let err = validate_interval(too_big).unwrap_err();
        assert!(matches!(err, SpeedError::InvalidInterval(n) if n == too_big));
        assert_eq!(
            err.to_string(),
            format!("interval must be between 0 and {} hours, got {too_big}", u32::MAX)
        );
        assert_eq!(validate_interval(i64::from(u32::MAX)).unwrap(), u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn set_schedule_persists_interval() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        let (scheduler, _) = counting_scheduler();
        let scheduler = scheduler.with_config(store.clone());

        scheduler.set_schedule(12).unwrap();
        assert_eq!(scheduler.interval(), 12);
        assert_eq!(store.load().interval_hours, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_stops_the_loop() {
        let (scheduler, runs) = counting_scheduler();
        scheduler.set_interval(1);
        let live = Arc::clone(&scheduler.live_loops);
        drop(scheduler);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
        tokio::time::sleep(HOUR * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
