//! The adaptive time sampler: one [`TimeSample`] per cycle, published on the
//! bus, with cadence that adapts between full-rate and power-saving modes.
//!
//! The loop runs as a spawned task that waits on an injectable
//! [`CycleProvider`] (the host's repaint-aligned primitive in production, a
//! channel-driven pulse source in tests) and a shutdown broadcast channel.
//! There is no catch-up after a suspension: resuming simply samples the
//! current wall time.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::common::lock_or_recover;
use crate::config::CadenceMode;
use crate::events::{topic, BusMessage};
use crate::time::{ClockSource, TimeSample};

/// The scheduling capability behind the sampler loop.
///
/// Each call resolves when the next cycle should run. The sampler re-queries
/// the cadence mode before every wait, so a mode change takes effect on the
/// very next cycle.
pub trait CycleProvider: Send + 'static {
    fn next_cycle(&mut self, mode: CadenceMode) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// The production provider: sleeps one frame in `Active` mode and a full
/// second in `PowerSaver`, capping the effective rate at 1 Hz.
pub struct FrameCycleProvider {
    frame: Duration,
}

impl FrameCycleProvider {
    pub fn new(frame: Duration) -> Self {
        Self { frame }
    }
}

impl CycleProvider for FrameCycleProvider {
    fn next_cycle(&mut self, mode: CadenceMode) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let delay = match mode {
            CadenceMode::Active => self.frame,
            CadenceMode::PowerSaver => Duration::from_secs(1),
        };
        Box::pin(tokio::time::sleep(delay))
    }
}

/// A deterministic provider for tests: each pulse sent on the paired channel
/// releases exactly one cycle. When the pulse source is dropped the provider
/// parks forever, leaving shutdown to the sampler's stop signal.
pub struct ManualCycleProvider {
    pulses: mpsc::UnboundedReceiver<()>,
}

impl ManualCycleProvider {
    pub fn new() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { pulses: rx })
    }
}

impl CycleProvider for ManualCycleProvider {
    fn next_cycle(&mut self, _mode: CadenceMode) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.pulses.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        })
    }
}

struct SamplerShared {
    cadence: Mutex<CadenceMode>,
    timezone: Mutex<String>,
}

/// Drives the engine: queries the clock source once per cycle, publishes the
/// sample as `tick`, and publishes `secondBoundary` / `minuteBoundary` only
/// when the respective field changed, letting slow consumers avoid redundant
/// work.
///
/// Cheap to clone; all clones control the same loop.
#[derive(Clone)]
pub struct Sampler {
    bus: EventBus,
    clock: Arc<dyn ClockSource>,
    shared: Arc<SamplerShared>,
    control: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl Sampler {
    pub fn new(
        bus: EventBus,
        clock: Arc<dyn ClockSource>,
        cadence: CadenceMode,
        timezone: String,
    ) -> Self {
        Self {
            bus,
            clock,
            shared: Arc::new(SamplerShared {
                cadence: Mutex::new(cadence),
                timezone: Mutex::new(timezone),
            }),
            control: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the sampling loop. Returns `false` (with a warning) if a loop
    /// is already running: two overlapping loops are never created. Also
    /// returns `false` when called outside a tokio runtime.
    pub fn start(&self, mut cycles: impl CycleProvider) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("Sampler started outside a tokio runtime; ignored.");
                return false;
            }
        };
        let mut control = lock_or_recover(&self.control);
        if control.is_some() {
            warn!("Sampler is already running; duplicate start ignored.");
            return false;
        }
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *control = Some(shutdown_tx);

        let bus = self.bus.clone();
        let clock = self.clock.clone();
        let shared = self.shared.clone();
        runtime.spawn(async move {
            debug!("Sampler loop started.");
            let mut last_second: i32 = -1;
            let mut last_minute: i32 = -1;
            loop {
                let mode = *lock_or_recover(&shared.cadence);
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = cycles.next_cycle(mode) => {
                        let timezone = lock_or_recover(&shared.timezone).clone();
                        run_cycle(&bus, clock.as_ref(), &timezone, &mut last_second, &mut last_minute);
                    }
                }
            }
            debug!("Sampler loop stopped.");
        });
        true
    }

    /// Cancels the pending cycle and ends the loop. Idempotent; safe to call
    /// from any task, including a visibility-change handler.
    pub fn stop(&self) {
        if let Some(shutdown_tx) = lock_or_recover(&self.control).take() {
            shutdown_tx.send(()).ok();
        }
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.control).is_some()
    }

    /// Takes effect before the next cycle's wait.
    pub fn set_cadence(&self, mode: CadenceMode) {
        *lock_or_recover(&self.shared.cadence) = mode;
    }

    pub fn cadence(&self) -> CadenceMode {
        *lock_or_recover(&self.shared.cadence)
    }

    /// Retargets the clock source. Takes effect on the next cycle.
    pub fn set_timezone(&self, timezone_id: impl Into<String>) {
        *lock_or_recover(&self.shared.timezone) = timezone_id.into();
    }

    pub fn timezone(&self) -> String {
        lock_or_recover(&self.shared.timezone).clone()
    }
}

/// One complete cycle: sample, publish `tick`, publish boundary topics on
/// field edges. All of it runs synchronously to completion before the loop
/// suspends again, so every subscriber observes the identical sample.
fn run_cycle(
    bus: &EventBus,
    clock: &dyn ClockSource,
    timezone_id: &str,
    last_second: &mut i32,
    last_minute: &mut i32,
) {
    let sample: Arc<TimeSample> = Arc::new(clock.now(timezone_id));
    let second = sample.seconds as i32;
    let minute = sample.minutes as i32;

    bus.publish(topic::TICK, &BusMessage::Tick(sample.clone()));
    if second != *last_second {
        bus.publish(topic::SECOND_BOUNDARY, &BusMessage::SecondBoundary(sample.clone()));
        *last_second = second;
    }
    if minute != *last_minute {
        bus.publish(topic::MINUTE_BOUNDARY, &BusMessage::MinuteBoundary(sample));
        *last_minute = minute;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed sequence of samples, repeating the last one.
    struct ScriptedClock {
        samples: Mutex<VecDeque<TimeSample>>,
        last: Mutex<TimeSample>,
    }

    impl ScriptedClock {
        fn new(samples: Vec<TimeSample>) -> Self {
            let last = samples[0].clone();
            Self {
                samples: Mutex::new(samples.into()),
                last: Mutex::new(last),
            }
        }
    }

    impl ClockSource for ScriptedClock {
        fn now(&self, _timezone_id: &str) -> TimeSample {
            let mut queue = self.samples.lock().expect("script lock");
            match queue.pop_front() {
                Some(sample) => {
                    *self.last.lock().expect("script lock") = sample.clone();
                    sample
                }
                None => self.last.lock().expect("script lock").clone(),
            }
        }
    }

    fn sample(minutes: u32, seconds: u32, milliseconds: u32) -> TimeSample {
        TimeSample {
            wall_clock_millis: i64::from(minutes * 60_000 + seconds * 1000 + milliseconds),
            timezone_id: "local".to_string(),
            hours: 12,
            minutes,
            seconds,
            milliseconds,
        }
    }

    fn boundary_counts(bus: &EventBus) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let seconds = Arc::new(AtomicUsize::new(0));
        let minutes = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        bus.subscribe(topic::TICK, move |_, _| {
            t.fetch_add(1, Ordering::SeqCst);
        });
        let s = seconds.clone();
        bus.subscribe(topic::SECOND_BOUNDARY, move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let m = minutes.clone();
        bus.subscribe(topic::MINUTE_BOUNDARY, move |_, _| {
            m.fetch_add(1, Ordering::SeqCst);
        });
        (ticks, seconds, minutes)
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("expected count never reached");
    }

    #[test]
    fn boundaries_fire_only_on_field_edges() {
        let bus = EventBus::new(10);
        let (ticks, seconds, minutes) = boundary_counts(&bus);
        let clock = ScriptedClock::new(vec![
            sample(0, 1, 0),
            sample(0, 1, 400), // same second, no boundary
            sample(0, 2, 0),   // second edge
            sample(1, 2, 0),   // minute edge only
        ]);
        let mut last_second = -1;
        let mut last_minute = -1;
        for _ in 0..4 {
            run_cycle(&bus, &clock, "local", &mut last_second, &mut last_minute);
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
        assert_eq!(seconds.load(Ordering::SeqCst), 2);
        assert_eq!(minutes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn start_outside_a_runtime_is_refused_not_a_panic() {
        let bus = EventBus::new(10);
        let clock = Arc::new(ScriptedClock::new(vec![sample(0, 0, 0)]));
        let sampler = Sampler::new(bus, clock, CadenceMode::Active, "local".to_string());
        let (_pulse, provider) = ManualCycleProvider::new();
        assert!(!sampler.start(provider));
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn manual_pulses_release_exactly_one_cycle_each() {
        let bus = EventBus::new(10);
        let (ticks, _, _) = boundary_counts(&bus);
        let clock = Arc::new(ScriptedClock::new(vec![sample(0, 0, 0)]));
        let sampler = Sampler::new(bus, clock, CadenceMode::Active, "local".to_string());

        let (pulse, provider) = ManualCycleProvider::new();
        assert!(sampler.start(provider));
        for _ in 0..3 {
            pulse.send(()).expect("sampler alive");
        }
        wait_for(&ticks, 3).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        sampler.stop();
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected_and_stop_is_idempotent() {
        let bus = EventBus::new(10);
        let clock = Arc::new(ScriptedClock::new(vec![sample(0, 0, 0)]));
        let sampler = Sampler::new(bus, clock, CadenceMode::Active, "local".to_string());

        let (_pulse_a, provider_a) = ManualCycleProvider::new();
        let (_pulse_b, provider_b) = ManualCycleProvider::new();
        assert!(sampler.start(provider_a));
        assert!(!sampler.start(provider_b));
        assert!(sampler.is_running());

        sampler.stop();
        sampler.stop();
        assert!(!sampler.is_running());

        // A stopped sampler may be started again.
        let (_pulse_c, provider_c) = ManualCycleProvider::new();
        assert!(sampler.start(provider_c));
        sampler.stop();
    }

    #[tokio::test]
    async fn stopped_sampler_publishes_nothing_more() {
        let bus = EventBus::new(10);
        let (ticks, _, _) = boundary_counts(&bus);
        let clock = Arc::new(ScriptedClock::new(vec![sample(0, 0, 0)]));
        let sampler = Sampler::new(bus, clock, CadenceMode::Active, "local".to_string());

        let (pulse, provider) = ManualCycleProvider::new();
        assert!(sampler.start(provider));
        pulse.send(()).expect("sampler alive");
        wait_for(&ticks, 1).await;

        sampler.stop();
        // Give the loop a moment to observe the shutdown signal, then pulse
        // into the void.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = pulse.send(());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cadence_and_timezone_updates_are_visible() {
        let bus = EventBus::new(10);
        let clock = Arc::new(ScriptedClock::new(vec![sample(0, 0, 0)]));
        let sampler = Sampler::new(bus, clock, CadenceMode::Active, "local".to_string());
        sampler.set_cadence(CadenceMode::PowerSaver);
        assert_eq!(sampler.cadence(), CadenceMode::PowerSaver);
        sampler.set_timezone("Asia/Karachi");
        assert_eq!(sampler.timezone(), "Asia/Karachi");
    }
}
