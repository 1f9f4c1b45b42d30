//! Timer model: the mode collection, selection and save/load.

use crate::event::{EventBus, ModelEvent};
use crate::models::{default_modes, Mode, ModeRecord};
use crate::persistence::{self, PersistenceError, SaveState};
use crate::timer::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
    #[error("Invalid duration for {name}: {seconds}")]
    InvalidDuration { name: String, seconds: f64 },
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Construction parameters for a `TimerModel`.
pub struct ModelConfig {
    pub save_path: PathBuf,
    /// Modes used when there is no usable save file.
    pub defaults: Vec<ModeRecord>,
    /// Mode selected on startup and after a reset.
    pub start_mode: Option<String>,
    pub clock: Arc<dyn Clock>,
}

impl ModelConfig {
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            defaults: default_modes(),
            start_mode: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[cfg(test)]
    pub fn with_defaults(mut self, defaults: Vec<ModeRecord>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_start_mode(mut self, start_mode: impl Into<String>) -> Self {
        self.start_mode = Some(start_mode.into());
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Overtime moved from an exhausted mode into its overflow target.
#[derive(Debug, Clone, PartialEq)]
pub struct OverflowTransfer {
    pub from: String,
    pub to: String,
    pub overtime: f64,
}

/// Owns the modes and tracks which one is selected and which one accrues.
///
/// `selected` is the user's choice. `active` is where elapsed time goes and
/// only differs from `selected` after an overflow.
pub struct TimerModel {
    save_path: PathBuf,
    defaults: Vec<ModeRecord>,
    start_mode_name: Option<String>,
    modes: Vec<Mode>,
    selected: usize,
    active: usize,
    start_mode: usize,
    notify: bool,
    window: Map<String, Value>,
    last_save: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl TimerModel {
    /// Builds the model from the save file, or from the defaults if the file
    /// is missing or unusable, then selects the saved or start mode.
    pub fn new(config: ModelConfig) -> Self {
        let ModelConfig {
            save_path,
            mut defaults,
            start_mode,
            clock,
        } = config;

        if defaults.is_empty() {
            warn!("No default modes configured, using built-in modes");
            defaults = default_modes();
        }

        let mut model = Self {
            save_path,
            defaults,
            start_mode_name: start_mode,
            modes: Vec::new(),
            selected: 0,
            active: 0,
            start_mode: 0,
            notify: true,
            window: Map::new(),
            last_save: None,
            clock,
            events: EventBus::new(),
        };
        model.load();
        model
    }

    /// Replaces the whole mode collection with the save file's contents, or
    /// with a fresh copy of the defaults if the file can't be used.
    pub fn load(&mut self) {
        let state = Self::read_state(&self.save_path, &self.defaults);
        let modes: Vec<Mode> = state.timers.into_iter().map(Mode::from).collect();

        let find = |name: &str| modes.iter().position(|m| m.name() == name);
        let start = match self.start_mode_name.as_deref() {
            Some(name) => find(name).unwrap_or_else(|| {
                warn!(
                    "Mode '{}' not recognized, defaulting to {}",
                    name,
                    modes[0].name()
                );
                0
            }),
            None => 0,
        };
        let selected = state
            .selected_mode
            .as_deref()
            .and_then(find)
            .unwrap_or(start);

        self.modes = modes;
        self.start_mode = start;
        self.notify = state.notify;
        self.window = state.window;
        self.select_index(selected);
    }

    fn read_state(path: &Path, defaults: &[ModeRecord]) -> SaveState {
        let fallback = || SaveState {
            timers: defaults.to_vec(),
            notify: true,
            window: Map::new(),
            selected_mode: None,
        };

        if !path.is_file() {
            info!("No save file at {}, starting fresh", path.display());
            return fallback();
        }

        match persistence::load(path) {
            Ok(state) => {
                info!("Save file loaded successfully");
                state
            }
            Err(e) => {
                error!("Unable to load save file. Ignoring: {}", e);
                fallback()
            }
        }
    }

    /// Registers a listener for model events.
    pub fn subscribe(&mut self) -> Receiver<ModelEvent> {
        self.events.subscribe()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.name() == name)
    }

    fn mode_index(&self, name: &str) -> Option<usize> {
        self.modes.iter().position(|m| m.name() == name)
    }

    pub fn selected(&self) -> &Mode {
        &self.modes[self.selected]
    }

    pub fn active(&self) -> &Mode {
        &self.modes[self.active]
    }

    #[cfg(test)]
    pub fn start_mode(&self) -> &Mode {
        &self.modes[self.start_mode]
    }

    pub fn is_notify_enabled(&self) -> bool {
        self.notify
    }

    pub fn set_notify_enabled(&mut self, enabled: bool) {
        self.notify = enabled;
    }

    /// UI-owned state carried through the save file untouched.
    #[cfg(test)]
    pub fn window_state(&self) -> &Map<String, Value> {
        &self.window
    }

    #[cfg(test)]
    pub fn set_window_state(&mut self, window: Map<String, Value>) {
        self.window = window;
    }

    /// Time of the last successful save.
    pub fn last_save(&self) -> Option<DateTime<Utc>> {
        self.last_save
    }

    /// Selects the named mode, which also makes it active.
    ///
    /// Every selection is saved immediately and announced with `ModeChanged`.
    pub fn select(&mut self, name: &str) -> Result<(), ModelError> {
        match self.mode_index(name) {
            Some(index) => {
                self.select_index(index);
                Ok(())
            }
            None => {
                error!("Attempted to set unknown mode: {}", name);
                Err(ModelError::UnknownMode(name.to_string()))
            }
        }
    }

    fn select_index(&mut self, index: usize) {
        self.selected = index;
        self.active = index;
        if let Err(e) = self.save() {
            error!("Failed to save after mode change: {}", e);
        }
        let mode = self.modes[index].name().to_string();
        self.events.emit(ModelEvent::ModeChanged { mode });
    }

    /// Zeroes every mode and selects the start mode again.
    pub fn reset(&mut self) {
        for index in 0..self.modes.len() {
            self.modes[index].reset();
            self.emit_updated(index);
        }
        self.select_index(self.start_mode);
    }

    pub fn set_total(&mut self, name: &str, total: f64) -> Result<(), ModelError> {
        let index = self.adjustable_index(name, total)?;
        self.modes[index].set_total(total);
        self.emit_updated(index);
        Ok(())
    }

    pub fn set_used(&mut self, name: &str, used: f64) -> Result<(), ModelError> {
        let index = self.adjustable_index(name, used)?;
        self.modes[index].set_used(used);
        self.emit_updated(index);
        Ok(())
    }

    /// Durations must be finite and non-negative to survive the save file.
    fn adjustable_index(&self, name: &str, seconds: f64) -> Result<usize, ModelError> {
        let index = self
            .mode_index(name)
            .ok_or_else(|| ModelError::UnknownMode(name.to_string()))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ModelError::InvalidDuration {
                name: name.to_string(),
                seconds,
            });
        }
        Ok(index)
    }

    /// Adds elapsed time to the selected mode and, if different, the active one.
    pub fn accrue(&mut self, delta: f64) {
        self.modes[self.selected].add_used(delta);
        self.emit_updated(self.selected);
        if self.active != self.selected {
            self.modes[self.active].add_used(delta);
            self.emit_updated(self.active);
        }
    }

    /// Moves the active mode's overtime into its overflow target.
    ///
    /// Resolves a single hop. A target that is itself exhausted is handled
    /// on a later call. Missing or dangling targets leave the mode in overtime.
    pub fn resolve_overflow(&mut self) -> Option<OverflowTransfer> {
        let from = self.active;
        let source = &self.modes[from];
        if source.remaining() >= 0.0 {
            return None;
        }

        let target_name = source.overflow()?;
        let Some(to) = self.mode_index(target_name) else {
            debug!(
                "Overflow target '{}' of {} does not exist",
                target_name,
                source.name()
            );
            return None;
        };
        if to == from {
            return None;
        }

        let overtime = -source.remaining();
        let total = source.total();
        self.modes[from].set_used(total);
        self.emit_updated(from);
        self.modes[to].add_used(overtime);
        self.emit_updated(to);
        self.active = to;

        let transfer = OverflowTransfer {
            from: self.modes[from].name().to_string(),
            to: self.modes[to].name().to_string(),
            overtime,
        };
        debug!(
            "Overflowed {:.1}s from {} into {}",
            transfer.overtime, transfer.from, transfer.to
        );
        Some(transfer)
    }

    /// Announces that the selected mode is exhausted.
    /// Returns false when notifications are disabled.
    pub fn notify_tick(&mut self) -> bool {
        if !self.notify {
            return false;
        }
        let mode = self.selected().name().to_string();
        debug!("Timer expired: {}", mode);
        self.events.emit(ModelEvent::NotifyTick { mode });
        true
    }

    /// Snapshot of everything the save file stores.
    pub fn save_state(&self) -> SaveState {
        SaveState {
            timers: self.modes.iter().map(Mode::serialize).collect(),
            notify: self.notify,
            window: self.window.clone(),
            selected_mode: Some(self.selected().name().to_string()),
        }
    }

    /// Writes the current state to the save file.
    pub fn save(&mut self) -> Result<(), ModelError> {
        persistence::save(&self.save_path, &self.save_state())?;
        self.last_save = Some(self.clock.now());
        debug!("Saved timers to {}", self.save_path.display());
        Ok(())
    }

    fn emit_updated(&mut self, index: usize) {
        let mode = self.modes[index].name().to_string();
        self.events.emit(ModelEvent::ModeUpdated { mode });
    }
}
