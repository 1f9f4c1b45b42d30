//! Data models for the Timeclock application.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remaining time reported by modes that never run out.
pub const UNLIMITED_REMAINING: f64 = 1.0;

/// Whether a mode has a budget that can be exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    /// Budgeted mode which goes into overtime once `used` passes `total`.
    #[default]
    #[serde(alias = "Mode")]
    Finite,
    /// Mode like "Asleep" which accrues time but is never exhausted.
    #[serde(alias = "UnlimitedMode")]
    Unlimited,
}

/// Plain record form of a mode, used for defaults and the save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRecord {
    #[serde(default, alias = "class")]
    pub kind: ModeKind,
    pub name: String,
    pub total: f64,
    #[serde(default)]
    pub used: f64,
    #[serde(default)]
    pub overflow: Option<String>,
}

impl ModeRecord {
    /// Creates a finite mode record with nothing used yet.
    pub fn finite(name: &str, total: f64) -> Self {
        Self {
            kind: ModeKind::Finite,
            name: name.to_string(),
            total,
            used: 0.0,
            overflow: None,
        }
    }

    /// Creates an unlimited mode record with nothing used yet.
    pub fn unlimited(name: &str, total: f64) -> Self {
        Self {
            kind: ModeKind::Unlimited,
            ..Self::finite(name, total)
        }
    }

    /// Sets the mode which receives overtime from this one.
    pub fn with_overflow(mut self, target: &str) -> Self {
        self.overflow = Some(target.to_string());
        self
    }
}

/// The built-in allotments: 8h asleep, 3.5h overhead, 6h work, 5.5h leisure.
pub fn default_modes() -> Vec<ModeRecord> {
    vec![
        ModeRecord::unlimited("Asleep", 3600.0 * 8.0),
        ModeRecord::finite("Overhead", 3600.0 * 3.5).with_overflow("Leisure"),
        ModeRecord::finite("Work", 3600.0 * 6.0),
        ModeRecord::finite("Leisure", 3600.0 * 5.5),
    ]
}

/// A single named time allotment.
///
/// Mutation goes through `TimerModel`, which emits the matching
/// `ModeUpdated` event.
#[derive(Debug, Clone, PartialEq)]
pub struct Mode {
    name: String,
    total: f64,
    used: f64,
    overflow: Option<String>,
    kind: ModeKind,
}

impl Mode {
    #[cfg(test)]
    pub fn new(name: &str, total: f64, kind: ModeKind) -> Self {
        Self {
            name: name.to_string(),
            total,
            used: 0.0,
            overflow: None,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    pub fn overflow(&self) -> Option<&str> {
        self.overflow.as_deref()
    }

    #[cfg(test)]
    pub fn kind(&self) -> ModeKind {
        self.kind
    }

    /// Returns the seconds left in the budget. Negative means overtime.
    pub fn remaining(&self) -> f64 {
        match self.kind {
            ModeKind::Finite => self.total - self.used,
            ModeKind::Unlimited => UNLIMITED_REMAINING,
        }
    }

    /// Returns true once a finite mode has used its whole budget.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() <= 0.0
    }

    /// Returns true if compact views should show this mode.
    pub fn is_visible(&self) -> bool {
        self.kind == ModeKind::Finite
    }

    /// Returns the remaining time formatted as `HH:MM:SS` (or `-HH:MM:SS`).
    pub fn remaining_str(&self) -> String {
        format_remaining(self.remaining())
    }

    pub(crate) fn set_total(&mut self, total: f64) {
        self.total = total;
    }

    pub(crate) fn set_used(&mut self, used: f64) {
        self.used = used;
    }

    pub(crate) fn add_used(&mut self, delta: f64) {
        self.used += delta;
    }

    pub(crate) fn reset(&mut self) {
        self.used = 0.0;
    }

    /// Produces the record stored in the save file.
    pub fn serialize(&self) -> ModeRecord {
        ModeRecord {
            kind: self.kind,
            name: self.name.clone(),
            total: self.total,
            used: self.used,
            overflow: self.overflow.clone(),
        }
    }
}

impl From<ModeRecord> for Mode {
    fn from(record: ModeRecord) -> Self {
        Self {
            name: record.name,
            total: record.total,
            used: record.used,
            overflow: record.overflow,
            kind: record.kind,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ModeKind::Finite => write!(f, "{}: {}", self.name, self.remaining_str()),
            ModeKind::Unlimited => write!(f, "{}", self.name),
        }
    }
}

/// Formats seconds as `HH:MM:SS`, prefixed with `-` when negative.
pub fn format_remaining(secs: f64) -> String {
    let rounded = secs.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let whole = rounded.abs() as u64;
    // Wraps at 24h like a wall clock face.
    let hours = (whole / 3600) % 24;
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        hours,
        (whole / 60) % 60,
        whole % 60
    )
}
