//! Progress reporting sinks.
//!
//! Long-running work (rendering) reports through a [`ProgressSink`] injected
//! by the caller. The sink decides what to do with the events: log them,
//! fan them out, throttle them or drop them. Reporting never blocks on
//! anything but the sink's own short-lived lock.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// What the `total` of a progress run counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressMode {
    /// Discrete units of work (pixels, samples); reported with `update`
    Samples,
    /// Wall-clock budget in seconds; reported with `update_time`
    Time,
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    /// A run begins. `total` is used in `Samples` mode, `total_time` (seconds)
    /// in `Time` mode.
    fn start(&self, mode: ProgressMode, total: u64, total_time: f64);

    /// `processed` units of `total` are done.
    fn update(&self, processed: u64);

    /// `elapsed` seconds of `total_time` have passed.
    fn update_time(&self, elapsed: f64);

    /// The run finished.
    fn end(&self);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn start(&self, _mode: ProgressMode, _total: u64, _total_time: f64) {}
    fn update(&self, _processed: u64) {}
    fn update_time(&self, _elapsed: f64) {}
    fn end(&self) {}
}

struct LogState {
    mode: ProgressMode,
    total: u64,
    total_time: f64,
    start: Instant,
    last_report: Instant,
}

/// Writes throttled progress lines through the `log` facade.
pub struct LogProgress {
    interval: Duration,
    state: Mutex<Option<LogState>>,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl LogProgress {
    /// Report at most once per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(None),
        }
    }
}

impl ProgressSink for LogProgress {
    fn start(&self, mode: ProgressMode, total: u64, total_time: f64) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = Some(LogState {
            mode,
            total,
            total_time,
            start: now,
            last_report: now,
        });
    }

    fn update(&self, processed: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = state.as_mut().filter(|s| s.mode == ProgressMode::Samples) else {
            return;
        };

        let now = Instant::now();
        if now.duration_since(state.last_report) < self.interval {
            return;
        }
        state.last_report = now;

        let percent = processed as f64 / state.total.max(1) as f64 * 100.0;
        if processed == 0 {
            log::info!("Processing [{}/{}, {:.1}%]", processed, state.total, percent);
        } else {
            let elapsed = now.duration_since(state.start).as_secs_f64();
            let eta = elapsed * state.total.saturating_sub(processed) as f64 / processed as f64;
            log::info!(
                "Processing [{}/{}, {:.1}%, ETA {:.1}s]",
                processed,
                state.total,
                percent,
                eta
            );
        }
    }

    fn update_time(&self, elapsed: f64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = state.as_mut().filter(|s| s.mode == ProgressMode::Time) else {
            return;
        };

        let now = Instant::now();
        if now.duration_since(state.last_report) < self.interval {
            return;
        }
        state.last_report = now;

        log::info!(
            "Processing [{:.1}s/{:.1}s, {:.1}%, ETA {:.1}s]",
            elapsed,
            state.total_time,
            elapsed / state.total_time * 100.0,
            (state.total_time - elapsed).max(0.0)
        );
    }

    fn end(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.as_ref() {
            Some(state) => log::info!(
                "Processing [completed in {:.2}s]",
                state.start.elapsed().as_secs_f64()
            ),
            None => log::info!("Processing [completed]"),
        }
    }
}

/// Forwards every event to several sinks.
#[derive(Default)]
pub struct MuxProgress {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl MuxProgress {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }
}

impl ProgressSink for MuxProgress {
    fn start(&self, mode: ProgressMode, total: u64, total_time: f64) {
        self.sinks.iter().for_each(|s| s.start(mode, total, total_time));
    }

    fn update(&self, processed: u64) {
        self.sinks.iter().for_each(|s| s.update(processed));
    }

    fn update_time(&self, elapsed: f64) {
        self.sinks.iter().for_each(|s| s.update_time(elapsed));
    }

    fn end(&self) {
        self.sinks.iter().for_each(|s| s.end());
    }
}

/// Forwards updates to an inner sink only when `delay` has passed since the
/// last forwarded update. Start and end always go through.
pub struct DelayProgress {
    inner: Arc<dyn ProgressSink>,
    delay: Duration,
    last_forward: Mutex<Instant>,
}

impl DelayProgress {
    pub fn new(inner: Arc<dyn ProgressSink>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            last_forward: Mutex::new(Instant::now()),
        }
    }

    /// True (and the clock restarted) when an update may go through.
    fn due(&self) -> bool {
        let mut last = self.last_forward.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if now.duration_since(*last) > self.delay {
            *last = now;
            true
        } else {
            false
        }
    }
}

impl ProgressSink for DelayProgress {
    fn start(&self, mode: ProgressMode, total: u64, total_time: f64) {
        *self.last_forward.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.inner.start(mode, total, total_time);
    }

    fn update(&self, processed: u64) {
        if self.due() {
            self.inner.update(processed);
        }
    }

    fn update_time(&self, elapsed: f64) {
        if self.due() {
            self.inner.update_time(elapsed);
        }
    }

    fn end(&self) {
        self.inner.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counts events and remembers the last update.
    #[derive(Default)]
    struct Recorder {
        starts: AtomicU64,
        updates: AtomicU64,
        last: AtomicU64,
        ends: AtomicU64,
    }

    impl ProgressSink for Recorder {
        fn start(&self, _mode: ProgressMode, _total: u64, _total_time: f64) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn update(&self, processed: u64) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.last.store(processed, Ordering::SeqCst);
        }
        fn update_time(&self, _elapsed: f64) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        fn end(&self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_mux_forwards_to_all() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let mux = MuxProgress::new(vec![a.clone(), b.clone()]);

        mux.start(ProgressMode::Samples, 10, 0.0);
        mux.update(4);
        mux.end();

        for r in [&a, &b] {
            assert_eq!(r.starts.load(Ordering::SeqCst), 1);
            assert_eq!(r.last.load(Ordering::SeqCst), 4);
            assert_eq!(r.ends.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_delay_drops_rapid_updates() {
        let inner = Arc::new(Recorder::default());
        let delay = DelayProgress::new(inner.clone(), Duration::from_secs(3600));

        delay.start(ProgressMode::Samples, 100, 0.0);
        for i in 0..50 {
            delay.update(i);
        }
        delay.end();

        assert_eq!(inner.starts.load(Ordering::SeqCst), 1);
        assert_eq!(inner.updates.load(Ordering::SeqCst), 0);
        assert_eq!(inner.ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_passes_updates_after_delay() {
        let inner = Arc::new(Recorder::default());
        let delay = DelayProgress::new(inner.clone(), Duration::ZERO);

        delay.start(ProgressMode::Samples, 100, 0.0);
        std::thread::sleep(Duration::from_millis(2));
        delay.update(42);

        assert_eq!(inner.last.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_log_progress_ignores_other_mode() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sink = LogProgress::new(Duration::ZERO);

        // Events before start and in the wrong mode are ignored
        sink.update(1);
        sink.start(ProgressMode::Time, 0, 2.0);
        sink.update(1);
        sink.update_time(1.0);
        sink.end();
    }
}
