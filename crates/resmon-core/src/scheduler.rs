//! The poll loop.
//!
//! One thread polls every source in registration order, then sleeps until
//! `tick_start + period`. A stop request is only acted on between ticks, so
//! every source finishes the tick in progress before the sources are closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use crate::trace::{Timestamp, TraceSource};

/// Longest single sleep, so a stop request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Stopping,
    Stopped,
}

/// Requests a scheduler stop from another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wall clock in nanoseconds since the Unix epoch.
pub fn now_nanos() -> Timestamp {
    Utc::now().timestamp_nanos_opt().unwrap_or(Timestamp::MAX)
}

pub struct Scheduler {
    sources: Vec<Box<dyn TraceSource>>,
    period: Duration,
    stop: StopHandle,
    state: State,
    ticks: u64,
}

impl Scheduler {
    /// Takes sources that have already done their initial enumeration.
    pub fn new(sources: Vec<Box<dyn TraceSource>>, period: Duration) -> Self {
        Self {
            sources,
            period,
            stop: StopHandle::default(),
            state: State::Running,
            ticks: 0,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Polls until stopped, then closes every source. Returns the number of
    /// completed ticks.
    pub fn run(&mut self) -> u64 {
        info!(
            sources = self.sources.len(),
            period_ms = self.period.as_millis() as u64,
            "starting poll loop"
        );

        while !self.stop.is_stopped() {
            let tick_start = Instant::now();
            self.tick(now_nanos());
            self.sleep_until(tick_start + self.period);
        }

        self.state = State::Stopping;
        info!(ticks = self.ticks, "stopping");
        self.shutdown();
        self.ticks
    }

    fn tick(&mut self, timestamp: Timestamp) {
        for source in &mut self.sources {
            if let Err(err) = source.poll(timestamp) {
                warn!(family = source.family(), error = %err, "poll failed");
            }
        }
        self.ticks += 1;
        trace!(tick = self.ticks, "tick complete");
    }

    /// Sleeps until `deadline`. Returns at once if the tick overran.
    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.stop.is_stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    fn shutdown(&mut self) {
        for source in &mut self.sources {
            match source.close() {
                Ok(()) => debug!(family = source.family(), "source closed"),
                Err(err) => error!(family = source.family(), error = %err, "failed to close source"),
            }
        }
        self.sources.clear();
        self.state = State::Stopped;
        info!("all sources closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectError;
    use crate::trace::TraceError;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct ScriptedSource {
        name: &'static str,
        log: Log,
        polls: usize,
        stop_after: Option<(usize, StopHandle)>,
        fail: bool,
        work: Duration,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    impl ScriptedSource {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: log.clone(),
                polls: 0,
                stop_after: None,
                fail: false,
                work: Duration::ZERO,
                starts: Arc::default(),
            }
        }
    }

    impl TraceSource for ScriptedSource {
        fn family(&self) -> &'static str {
            self.name
        }

        fn poll(&mut self, timestamp: Timestamp) -> Result<(), TraceError> {
            self.starts.lock().unwrap().push(Instant::now());
            self.polls += 1;
            self.log.push(format!("poll {} {}", self.name, timestamp > 0));
            if !self.work.is_zero() {
                std::thread::sleep(self.work);
            }
            if let Some((limit, stop)) = &self.stop_after
                && self.polls >= *limit
            {
                stop.stop();
            }
            if self.fail {
                return Err(CollectError::Parse("scripted failure".to_string()).into());
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), TraceError> {
            self.log.push(format!("close {}", self.name));
            Ok(())
        }
    }

    #[test]
    fn test_polls_in_order_and_closes_once() {
        let log = Log::default();
        let handle = StopHandle::default();
        let mut first = ScriptedSource::new("first", &log);
        let second = ScriptedSource::new("second", &log);

        let mut scheduler = Scheduler::new(Vec::new(), Duration::from_millis(1));
        scheduler.stop = handle.clone();
        first.stop_after = Some((2, handle));
        scheduler.sources = vec![Box::new(first), Box::new(second)];

        assert_eq!(scheduler.state(), State::Running);
        let ticks = scheduler.run();

        assert_eq!(ticks, 2);
        assert_eq!(scheduler.state(), State::Stopped);
        // The stop request lands mid-tick; "second" is still polled.
        assert_eq!(
            log.entries(),
            vec![
                "poll first true",
                "poll second true",
                "poll first true",
                "poll second true",
                "close first",
                "close second",
            ]
        );
    }

    #[test]
    fn test_failing_source_does_not_stop_others() {
        let log = Log::default();
        let mut scheduler = Scheduler::new(Vec::new(), Duration::from_millis(1));
        let mut broken = ScriptedSource::new("broken", &log);
        broken.fail = true;
        let mut healthy = ScriptedSource::new("healthy", &log);
        healthy.stop_after = Some((3, scheduler.stop_handle()));
        scheduler.sources = vec![Box::new(broken), Box::new(healthy)];

        assert_eq!(scheduler.run(), 3);
        let polls = log
            .entries()
            .iter()
            .filter(|e| e.starts_with("poll healthy"))
            .count();
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_stop_before_run_only_closes() {
        let log = Log::default();
        let source = ScriptedSource::new("only", &log);
        let mut scheduler = Scheduler::new(vec![Box::new(source)], Duration::from_secs(10));
        scheduler.stop();

        assert_eq!(scheduler.run(), 0);
        assert_eq!(log.entries(), vec!["close only"]);
    }

    #[test]
    fn test_stop_from_another_thread() {
        let log = Log::default();
        let source = ScriptedSource::new("slow", &log);
        let mut scheduler = Scheduler::new(vec![Box::new(source)], Duration::from_secs(5));
        let handle = scheduler.stop_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.stop();
        });
        let started = Instant::now();
        let ticks = scheduler.run();
        stopper.join().unwrap();

        assert_eq!(ticks, 1);
        // Sliced sleep notices the stop long before the 5 s period ends.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_tick_cadence_does_not_drift() {
        let period = Duration::from_millis(40);
        let work = Duration::from_millis(30);
        let ticks = 6;
        let log = Log::default();
        let mut scheduler = Scheduler::new(Vec::new(), period);
        let mut source = ScriptedSource::new("timed", &log);
        source.work = work;
        source.stop_after = Some((ticks, scheduler.stop_handle()));
        let starts = source.starts.clone();
        scheduler.sources = vec![Box::new(source)];

        scheduler.run();

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), ticks);
        let gaps = ticks as u32 - 1;
        let span = starts[ticks - 1] - starts[0];
        let expected = period * gaps;
        // Relative sleeps would add the work to every gap: expected + 150 ms.
        // Allow half of that for scheduling jitter.
        assert!(span >= expected, "span {span:?}");
        assert!(span < expected + work * gaps / 2, "span {span:?}");
    }

    #[test]
    fn test_overrun_starts_next_tick_immediately() {
        let period = Duration::from_millis(50);
        let work = Duration::from_millis(100);
        let log = Log::default();
        let mut scheduler = Scheduler::new(Vec::new(), period);
        let mut source = ScriptedSource::new("heavy", &log);
        source.work = work;
        source.stop_after = Some((3, scheduler.stop_handle()));
        let starts = source.starts.clone();
        scheduler.sources = vec![Box::new(source)];

        scheduler.run();

        let starts = starts.lock().unwrap();
        let gap = starts[2] - starts[1];
        // Waiting out a period after an overrun would put the gap at work + period.
        assert!(gap >= work, "gap {gap:?}");
        assert!(gap < work + period, "gap {gap:?}");
    }
}
