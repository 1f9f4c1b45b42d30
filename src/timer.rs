//! The code which actually makes the timer tick.

use crate::app::{OverflowTransfer, TimerModel};
use crate::event::ModelEvent;
use chrono::{DateTime, Utc};
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use std::ffi::c_int;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{error, trace, warn};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Seconds between periodic saves.
pub const SAVE_INTERVAL: f64 = 60.0 * 5.0;
/// Seconds between repeated expiry notifications.
pub const NOTIFY_INTERVAL: f64 = 60.0 * 15.0;

/// Signals which end the tick loop so the final save can run.
pub const SHUTDOWN_SIGNALS: [c_int; 4] = [SIGINT, SIGTERM, SIGHUP, SIGQUIT];

/// Sets `shutdown` when any of `SHUTDOWN_SIGNALS` arrives.
pub fn register_shutdown_signals(shutdown: &Arc<AtomicBool>) -> io::Result<()> {
    for signal in SHUTDOWN_SIGNALS {
        signal_hook::flag::register(signal, Arc::clone(shutdown))?;
    }
    Ok(())
}

/// Wall-clock source, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        use chrono::TimeZone;
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, secs: f64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::milliseconds((secs * 1000.0) as i64);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// What a periodic save did during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SaveOutcome {
    NotDue,
    Saved,
    Failed,
}

/// Summary of a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Seconds added to the selected mode.
    pub delta: f64,
    pub notified: bool,
    pub overflow: Option<OverflowTransfer>,
    pub save: SaveOutcome,
}

/// Advances the model by wall-clock time once per tick.
pub struct TimerController {
    clock: Arc<dyn Clock>,
    events: Receiver<ModelEvent>,
    last_tick: DateTime<Utc>,
    last_notify: Option<DateTime<Utc>>,
    last_save_attempt: Option<DateTime<Utc>>,
}

impl TimerController {
    pub fn new(model: &mut TimerModel) -> Self {
        let clock = model.clock();
        Self {
            last_tick: clock.now(),
            events: model.subscribe(),
            clock,
            last_notify: None,
            last_save_attempt: None,
        }
    }

    /// Accrues time since the previous tick, then handles expiry
    /// notifications, overflow and the periodic save.
    pub fn tick(&mut self, model: &mut TimerModel) -> TickReport {
        let now = self.clock.now();
        self.handle_events();

        let mut delta = seconds_between(self.last_tick, now);
        if delta < 0.0 {
            warn!("Clock went backwards by {:.1}s, not counting it", -delta);
            delta = 0.0;
        }
        model.accrue(delta);

        let mut notified = false;
        if model.selected().is_exhausted() && self.notify_due(now) {
            notified = model.notify_tick();
            self.last_notify = Some(now);
        }

        let overflow = model.resolve_overflow();

        let save = if self.save_due(model, now) {
            self.last_save_attempt = Some(now);
            match model.save() {
                Ok(()) => SaveOutcome::Saved,
                Err(e) => {
                    error!("Periodic save failed, retrying later: {}", e);
                    SaveOutcome::Failed
                }
            }
        } else {
            SaveOutcome::NotDue
        };

        self.last_tick = now;
        TickReport {
            delta,
            notified,
            overflow,
            save,
        }
    }

    /// A mode change makes an exhausted mode notify on the next tick.
    fn handle_events(&mut self) {
        for event in self.events.try_iter() {
            if let ModelEvent::ModeChanged { .. } = event {
                self.last_notify = None;
            }
        }
    }

    fn notify_due(&self, now: DateTime<Utc>) -> bool {
        self.last_notify
            .map_or(true, |last| seconds_between(last, now) >= NOTIFY_INTERVAL)
    }

    fn save_due(&self, model: &TimerModel, now: DateTime<Utc>) -> bool {
        let last = match (model.last_save(), self.last_save_attempt) {
            (Some(saved), Some(attempt)) => Some(saved.max(attempt)),
            (saved, attempt) => saved.or(attempt),
        };
        last.map_or(true, |last| seconds_between(last, now) >= SAVE_INTERVAL)
    }
}

/// Runs the tick loop until `shutdown` is set.
pub fn run_timer_loop(
    model: Arc<Mutex<TimerModel>>,
    mut controller: TimerController,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(TICK_INTERVAL);

        let mut model = match model.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let report = controller.tick(&mut model);
        trace!(
            "tick: +{:.3}s notified={} overflow={:?} save={:?}",
            report.delta,
            report.notified,
            report.overflow,
            report.save
        );
    }
}
