//! Simulation clock and the real-time update loop.
//!
//! The clock owns a small state machine (`Stopped | Running | Paused`) and,
//! while running, one dedicated OS thread that advances the entity registry
//! on a fixed cadence:
//!
//! ```text
//!   ┌──────────── tick ────────────┐
//!   │ dt = now - last_mark         │
//!   │ registry.update_kinetics(dt) │
//!   │ processing = now - start     │
//!   └──────────────┬───────────────┘
//!        overrun?  │  no: recv_timeout(clamp(interval - processing))
//!   warn + notify  │      stop signal / disconnect ends the loop
//!   next tick now  ▼
//! ```
//!
//! `stop` and `pause` signal the worker and join it, so the tick in flight
//! always completes before they return.

use crate::error::{CoreError, CoreResult};
use crate::registry::EntityRegistry;
use crossbeam::channel::{self, RecvTimeoutError, Sender, TryRecvError};
use kinesim_env::{Notification, NotificationSink, TimeSource};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run state of the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClockState::Stopped => "stopped",
            ClockState::Running => "running",
            ClockState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Cadence of the update loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTiming {
    /// Target time between tick starts
    pub interval: Duration,

    /// Shortest wait between ticks
    pub min_sleep: Duration,

    /// Longest wait between ticks
    pub max_sleep: Duration,
}

impl ClockTiming {
    /// Builds a timing from a tick rate and sleep bounds in milliseconds.
    ///
    /// A zero rate is treated as 1 Hz; `max_sleep` never drops below `min_sleep`.
    pub fn from_rate(tick_rate_hz: u32, min_sleep_ms: u64, max_sleep_ms: u64) -> Self {
        let interval = Duration::from_secs_f64(1.0 / f64::from(tick_rate_hz.max(1)));
        let min_sleep = Duration::from_millis(min_sleep_ms);
        let max_sleep = Duration::from_millis(max_sleep_ms).max(min_sleep);
        Self { interval, min_sleep, max_sleep }
    }

    /// How long to wait after a tick that took `processing`, or `None` on overrun.
    pub fn wait_after(&self, processing: Duration) -> Option<Duration> {
        if processing > self.interval {
            return None;
        }
        Some((self.interval - processing).clamp(self.min_sleep, self.max_sleep))
    }
}

impl Default for ClockTiming {
    /// 50 Hz, sleeping between 1 ms and one full interval.
    fn default() -> Self {
        Self::from_rate(50, 1, 20)
    }
}

/// Point-in-time view of the clock for status reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockStatus {
    pub state: ClockState,
    pub elapsed: Duration,
    pub ticks: u64,
    pub timing: ClockTiming,
}

impl fmt::Display for ClockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} elapsed={:.3}s ticks={} rate={:.1}Hz",
            self.state,
            self.elapsed.as_secs_f64(),
            self.ticks,
            1.0 / self.timing.interval.as_secs_f64()
        )
    }
}

#[derive(Debug)]
struct ClockInner {
    state: ClockState,

    /// Simulated time accumulated up to `last_mark`
    elapsed: Duration,

    /// Time-source reading elapsed was last brought up to
    last_mark: Duration,

    ticks: u64,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Flips the clock to `Stopped` if the worker unwinds out of a tick.
struct PanicGuard {
    inner: Arc<Mutex<ClockInner>>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            lock(&self.inner).state = ClockState::Stopped;
        }
    }
}

fn lock(inner: &Mutex<ClockInner>) -> MutexGuard<'_, ClockInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Real-time clock driving the registry's kinetics step.
pub struct SimClock {
    inner: Arc<Mutex<ClockInner>>,

    /// Serializes start/stop/pause/resume; holds the live worker
    control: Mutex<Option<Worker>>,

    timing: Mutex<ClockTiming>,
    registry: Arc<EntityRegistry>,
    time: Arc<dyn TimeSource>,
    notifier: Arc<dyn NotificationSink>,
}

impl SimClock {
    /// Creates a stopped clock with zero elapsed time.
    pub fn new(
        registry: Arc<EntityRegistry>,
        time: Arc<dyn TimeSource>,
        notifier: Arc<dyn NotificationSink>,
        timing: ClockTiming,
    ) -> Self {
        let now = time.now();
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                state: ClockState::Stopped,
                elapsed: Duration::ZERO,
                last_mark: now,
                ticks: 0,
            })),
            control: Mutex::new(None),
            timing: Mutex::new(timing),
            registry,
            time,
            notifier,
        }
    }

    pub fn state(&self) -> ClockState {
        lock(&self.inner).state
    }

    /// False once the loop has been stopped, paused, or has died.
    pub fn is_running(&self) -> bool {
        self.state() == ClockState::Running
    }

    /// Simulated time since the last fresh start or reset.
    pub fn elapsed(&self) -> Duration {
        let inner = lock(&self.inner);
        match inner.state {
            ClockState::Running => inner.elapsed + self.time.now().saturating_sub(inner.last_mark),
            _ => inner.elapsed,
        }
    }

    pub fn timing(&self) -> ClockTiming {
        *self.timing.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the cadence. Takes effect the next time the loop starts.
    pub fn set_timing(&self, timing: ClockTiming) {
        *self.timing.lock().unwrap_or_else(|e| e.into_inner()) = timing;
    }

    pub fn status(&self) -> ClockStatus {
        let elapsed = self.elapsed();
        let inner = lock(&self.inner);
        ClockStatus {
            state: inner.state,
            elapsed,
            ticks: inner.ticks,
            timing: self.timing(),
        }
    }

    /// Starts a fresh run with elapsed time zeroed.
    ///
    /// # Returns
    /// * `true` - The loop was started
    /// * `false` - Already running; nothing changed
    pub fn start(&self) -> bool {
        self.launch(true)
    }

    /// Restarts the loop keeping elapsed time. Returns false if already running.
    pub fn resume(&self) -> bool {
        self.launch(false)
    }

    /// Halts the loop, waiting for the in-flight tick. Returns false if it
    /// was already stopped.
    pub fn stop(&self) -> bool {
        self.halt(ClockState::Stopped)
    }

    /// Halts the loop like `stop`, leaving the clock `Paused`. Returns false
    /// if it was not running.
    pub fn pause(&self) -> bool {
        if self.state() != ClockState::Running {
            return false;
        }
        self.halt(ClockState::Paused)
    }

    /// Zeroes elapsed time. Fails while running.
    pub fn reset(&self) -> CoreResult<()> {
        let _control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        let mut inner = lock(&self.inner);
        if inner.state == ClockState::Running {
            return Err(CoreError::ClockState("cannot reset while running".to_string()));
        }
        inner.state = ClockState::Stopped;
        inner.elapsed = Duration::ZERO;
        inner.ticks = 0;
        inner.last_mark = self.time.now();
        Ok(())
    }

    /// Rebases elapsed time without touching the run state.
    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut inner = lock(&self.inner);
        inner.elapsed = elapsed;
        inner.last_mark = self.time.now();
    }

    fn launch(&self, fresh: bool) -> bool {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut inner = lock(&self.inner);
            if inner.state == ClockState::Running {
                return false;
            }
            if fresh {
                inner.elapsed = Duration::ZERO;
                inner.ticks = 0;
            }
            inner.state = ClockState::Running;
            inner.last_mark = self.time.now();
        }

        // A worker that died mid-tick left its handle behind
        if let Some(dead) = control.take() {
            let _ = dead.handle.join();
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let inner = Arc::clone(&self.inner);
        let registry = Arc::clone(&self.registry);
        let time = Arc::clone(&self.time);
        let notifier = Arc::clone(&self.notifier);
        let timing = self.timing();

        let spawned = thread::Builder::new().name("kinesim-update".to_string()).spawn(move || {
            let _guard = PanicGuard { inner: Arc::clone(&inner) };
            run_loop(&inner, &registry, time.as_ref(), notifier.as_ref(), timing, &stop_rx);
        });

        match spawned {
            Ok(handle) => {
                info!("Update loop started ({}, fresh={})", timing_label(&timing), fresh);
                *control = Some(Worker { stop_tx, handle });
                true
            }
            Err(e) => {
                warn!("Failed to spawn update loop: {}", e);
                lock(&self.inner).state = ClockState::Stopped;
                false
            }
        }
    }

    fn halt(&self, target: ClockState) -> bool {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        let previous = self.state();

        if let Some(worker) = control.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                warn!("Update loop terminated by a panic");
            }
        }

        let mut inner = lock(&self.inner);
        if previous == ClockState::Running {
            let now = self.time.now();
            let since = now.saturating_sub(inner.last_mark);
            inner.elapsed += since;
            inner.last_mark = now;
        }
        inner.state = target;
        info!("Update loop {} at {:.3}s", target, inner.elapsed.as_secs_f64());
        previous != target
    }
}

impl Drop for SimClock {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(worker) = control.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}

fn timing_label(timing: &ClockTiming) -> String {
    format!("interval={}ms", timing.interval.as_millis())
}

fn run_loop(
    inner: &Mutex<ClockInner>,
    registry: &EntityRegistry,
    time: &dyn TimeSource,
    notifier: &dyn NotificationSink,
    timing: ClockTiming,
    stop_rx: &channel::Receiver<()>,
) {
    loop {
        let tick_start = time.now();
        let dt = {
            let mut inner = lock(inner);
            let dt = tick_start.saturating_sub(inner.last_mark);
            inner.elapsed += dt;
            inner.last_mark = tick_start;
            inner.ticks += 1;
            dt
        };

        registry.update_kinetics(dt.as_secs_f64());

        let processing = time.now().saturating_sub(tick_start);
        match timing.wait_after(processing) {
            Some(wait) => match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            },
            None => {
                let processing_ms = processing.as_secs_f64() * 1000.0;
                let interval_ms = timing.interval.as_secs_f64() * 1000.0;
                warn!("Tick overran: {:.2}ms > {:.2}ms", processing_ms, interval_ms);
                if let Err(e) = notifier.notify(Notification::TickOverrun { processing_ms, interval_ms }) {
                    debug!("Overrun notification dropped: {}", e);
                }
                match stop_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
    }
    debug!("Update loop exiting");
}
