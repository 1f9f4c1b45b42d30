//! Versioned save file for timer state.
//!
//! The file holds a JSON array `[version, ...]`. Versions 1 to 5 are the
//! historical tuple layouts and are migrated on load; version 6 is written.

use crate::models::{ModeKind, ModeRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version written by `save`.
pub const CURRENT_SAVE_VERSION: i64 = 6;

/// Mode names implied by position in version 1-4 files.
const LEGACY_MODE_NAMES: [&str; 4] = ["Asleep", "Overhead", "Work", "Leisure"];

/// Version 1 keyed its values by the id of the button for each mode.
const LEGACY_BUTTON_IDS: [&str; 4] = ["N/A", "btn_overheadMode", "btn_workMode", "btn_playMode"];

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Save file too new! (Expected {expected}, got {found})")]
    UnsupportedVersion { expected: i64, found: i64 },
    #[error("Malformed save file: {0}")]
    Malformed(String),
}

/// Everything the save file carries, in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveState {
    pub timers: Vec<ModeRecord>,
    pub notify: bool,
    /// Opaque slice owned by whatever UI is attached.
    pub window: Map<String, Value>,
    pub selected_mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NotifySettings {
    enable: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { enable: true }
    }
}

/// Version 6 payload.
#[derive(Debug, Serialize, Deserialize)]
struct SavePayload {
    timers: Vec<ModeRecord>,
    #[serde(default)]
    notify: NotifySettings,
    #[serde(default)]
    window: Map<String, Value>,
    #[serde(default)]
    selected_mode: Option<String>,
}

/// Reads and migrates the save file at `path`.
pub fn load(path: &Path) -> Result<SaveState, PersistenceError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Writes `state` to `path`, replacing any previous file atomically.
///
/// The data goes to a sibling `.tmp` file first, which is synced and then
/// renamed over the target, so an interruption leaves the old file intact.
pub fn save(path: &Path, state: &SaveState) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = encode(state)?;
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Path of the scratch file used while saving.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("timeclock.sav"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `state` in the current save format.
pub fn encode(state: &SaveState) -> Result<Vec<u8>, PersistenceError> {
    let payload = SavePayload {
        timers: state.timers.clone(),
        notify: NotifySettings {
            enable: state.notify,
        },
        window: state.window.clone(),
        selected_mode: state.selected_mode.clone(),
    };
    Ok(serde_json::to_vec_pretty(&(CURRENT_SAVE_VERSION, payload))?)
}

/// Parses save data of any known version into canonical form.
pub fn decode(bytes: &[u8]) -> Result<SaveState, PersistenceError> {
    let loaded: Value = serde_json::from_slice(bytes)?;
    let items = loaded
        .as_array()
        .ok_or_else(|| malformed("top level is not a versioned tuple"))?;
    let version = items
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("missing version number"))?;

    let state = match version {
        CURRENT_SAVE_VERSION => {
            expect_len(items, 2)?;
            let payload: SavePayload = field(items, 1)?;
            SaveState {
                timers: payload.timers,
                notify: payload.notify.enable,
                window: payload.window,
                selected_mode: payload.selected_mode,
            }
        }
        5 => {
            expect_len(items, 4)?;
            let mut timers: Vec<ModeRecord> = field(items, 1)?;
            backfill_overhead_overflow(&mut timers);
            SaveState {
                timers,
                notify: field(items, 2)?,
                window: field(items, 3)?,
                selected_mode: None,
            }
        }
        4 => {
            expect_len(items, 5)?;
            SaveState {
                timers: expand_legacy(&items[1], &items[2])?,
                notify: field(items, 3)?,
                window: field(items, 4)?,
                selected_mode: None,
            }
        }
        3 => {
            expect_len(items, 4)?;
            SaveState {
                timers: expand_legacy(&items[1], &items[2])?,
                notify: field(items, 3)?,
                window: Map::new(),
                selected_mode: None,
            }
        }
        1 | 2 => {
            expect_len(items, 3)?;
            SaveState {
                timers: expand_legacy(&items[1], &items[2])?,
                notify: true,
                window: Map::new(),
                selected_mode: None,
            }
        }
        found => {
            return Err(PersistenceError::UnsupportedVersion {
                expected: CURRENT_SAVE_VERSION,
                found,
            })
        }
    };

    validate(&state)?;
    Ok(state)
}

fn malformed(reason: &str) -> PersistenceError {
    PersistenceError::Malformed(reason.to_string())
}

fn expect_len(items: &[Value], len: usize) -> Result<(), PersistenceError> {
    if items.len() == len {
        Ok(())
    } else {
        Err(PersistenceError::Malformed(format!(
            "expected {} fields, found {}",
            len,
            items.len()
        )))
    }
}

fn field<T: DeserializeOwned>(items: &[Value], index: usize) -> Result<T, PersistenceError> {
    let value = items
        .get(index)
        .ok_or_else(|| PersistenceError::Malformed(format!("missing field {}", index)))?;
    Ok(serde_json::from_value(value.clone())?)
}

/// Version 5 predates the default overflow from Overhead into Leisure.
fn backfill_overhead_overflow(timers: &mut [ModeRecord]) {
    if let Some(overhead) = timers.iter_mut().find(|t| t.name == "Overhead") {
        if overhead.overflow.is_none() {
            overhead.overflow = Some("Leisure".to_string());
        }
    }
}

/// Turns a legacy `total`/`used` pair into named mode records.
fn expand_legacy(total: &Value, used: &Value) -> Result<Vec<ModeRecord>, PersistenceError> {
    let total = positional(total)?;
    let used = positional(used)?;

    total
        .into_iter()
        .map(|(pos, total)| {
            let name = LEGACY_MODE_NAMES.get(pos).ok_or_else(|| {
                PersistenceError::Malformed(format!("no legacy mode at position {}", pos))
            })?;
            let kind = if pos == 0 {
                ModeKind::Unlimited
            } else {
                ModeKind::Finite
            };
            Ok(ModeRecord {
                kind,
                name: name.to_string(),
                total,
                used: used.get(&pos).copied().unwrap_or(0.0),
                overflow: None,
            })
        })
        .collect()
}

/// Reads a legacy value table keyed by position or by version 1 button id.
fn positional(value: &Value) -> Result<BTreeMap<usize, f64>, PersistenceError> {
    let number = |v: &Value| {
        v.as_f64()
            .ok_or_else(|| PersistenceError::Malformed(format!("not a number: {}", v)))
    };

    match value {
        Value::Array(values) => values
            .iter()
            .enumerate()
            .map(|(pos, v)| Ok((pos, number(v)?)))
            .collect(),
        Value::Object(entries) => entries
            .iter()
            .map(|(key, v)| {
                let pos = key
                    .parse::<usize>()
                    .ok()
                    .or_else(|| LEGACY_BUTTON_IDS.iter().position(|id| *id == key.as_str()))
                    .ok_or_else(|| {
                        PersistenceError::Malformed(format!("unknown timer key: {}", key))
                    })?;
                Ok((pos, number(v)?))
            })
            .collect(),
        other => Err(PersistenceError::Malformed(format!(
            "expected a timer table, found {}",
            other
        ))),
    }
}

fn validate(state: &SaveState) -> Result<(), PersistenceError> {
    if state.timers.is_empty() {
        return Err(malformed("no timers"));
    }
    let mut seen = HashSet::new();
    for timer in &state.timers {
        if !seen.insert(timer.name.as_str()) {
            return Err(PersistenceError::Malformed(format!(
                "duplicate mode name: {}",
                timer.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_modes;
    use serde_json::json;
    use tempfile::TempDir;

    fn decode_json(value: Value) -> Result<SaveState, PersistenceError> {
        decode(&serde_json::to_vec(&value).unwrap())
    }

    fn names(state: &SaveState) -> Vec<&str> {
        state.timers.iter().map(|t| t.name.as_str()).collect()
    }

    fn sample_state() -> SaveState {
        let mut timers = default_modes();
        timers[2].used = 1234.5;
        let mut window = Map::new();
        window.insert("position".to_string(), json!([10, 20]));
        SaveState {
            timers,
            notify: false,
            window,
            selected_mode: Some("Work".to_string()),
        }
    }

    #[test]
    fn test_version_1_button_ids() {
        let state = decode_json(json!([
            1,
            {"btn_overheadMode": 14400, "btn_workMode": 21600, "btn_playMode": 18000},
            {"btn_overheadMode": 60, "btn_workMode": 0, "btn_playMode": 5}
        ]))
        .unwrap();

        assert_eq!(names(&state), ["Overhead", "Work", "Leisure"]);
        assert_eq!(state.timers[0].total, 14400.0);
        assert_eq!(state.timers[0].used, 60.0);
        assert_eq!(state.timers[2].total, 18000.0);
        assert_eq!(state.timers[2].used, 5.0);
        assert!(state.notify);
        assert_eq!(state.selected_mode, None);
    }

    #[test]
    fn test_version_1_positional_keys() {
        let state = decode_json(json!([
            1,
            {"1": 14400, "2": 21600, "3": 21600},
            {"1": 0, "2": 0, "3": 0}
        ]))
        .unwrap();

        assert_eq!(names(&state), ["Overhead", "Work", "Leisure"]);
        let totals: Vec<f64> = state.timers.iter().map(|t| t.total).collect();
        assert_eq!(totals, [14400.0, 21600.0, 21600.0]);
        assert!(state.timers.iter().all(|t| t.kind == ModeKind::Finite));
        assert!(state.notify);
    }

    #[test]
    fn test_version_2_includes_asleep() {
        let state = decode_json(json!([
            2,
            {"0": 28800, "1": 12600, "2": 21600, "3": 19800},
            {"0": 100, "1": 200, "2": 300}
        ]))
        .unwrap();

        assert_eq!(names(&state), ["Asleep", "Overhead", "Work", "Leisure"]);
        assert_eq!(state.timers[0].kind, ModeKind::Unlimited);
        assert_eq!(state.timers[1].used, 200.0);
        assert_eq!(state.timers[3].used, 0.0);
        assert!(state.timers.iter().all(|t| t.overflow.is_none()));
    }

    #[test]
    fn test_version_3_notify_flag() {
        let state = decode_json(json!([3, [28800, 12600, 21600, 19800], [0, 1, 2, 3], false]))
            .unwrap();
        assert_eq!(names(&state), ["Asleep", "Overhead", "Work", "Leisure"]);
        assert_eq!(state.timers[3].used, 3.0);
        assert!(!state.notify);
        assert!(state.window.is_empty());
    }

    #[test]
    fn test_version_4_window_state() {
        let state = decode_json(json!([
            4,
            {"1": 12600, "2": 21600},
            {"1": 10, "2": 20},
            true,
            {"position": [5, 6], "decorated": false}
        ]))
        .unwrap();
        assert_eq!(names(&state), ["Overhead", "Work"]);
        assert!(state.notify);
        assert_eq!(state.window["decorated"], json!(false));
    }

    #[test]
    fn test_version_5_backfills_overhead_overflow() {
        let state = decode_json(json!([
            5,
            [
                {"name": "Overhead", "total": 12600, "used": 50},
                {"name": "Work", "total": 21600, "used": 0, "overflow": null},
                {"name": "Leisure", "total": 19800, "used": 0}
            ],
            true,
            {}
        ]))
        .unwrap();
        assert_eq!(state.timers[0].overflow.as_deref(), Some("Leisure"));
        assert_eq!(state.timers[0].used, 50.0);
        assert_eq!(state.timers[1].overflow, None);
    }

    #[test]
    fn test_version_5_keeps_explicit_overflow() {
        let state = decode_json(json!([
            5,
            [
                {"name": "Overhead", "total": 12600, "used": 0, "overflow": "Work"},
                {"name": "Work", "total": 21600, "used": 0}
            ],
            false,
            {}
        ]))
        .unwrap();
        assert_eq!(state.timers[0].overflow.as_deref(), Some("Work"));
        assert!(!state.notify);
    }

    #[test]
    fn test_version_6_with_class_tags() {
        let state = decode_json(json!([
            6,
            {
                "timers": [
                    {"class": "UnlimitedMode", "name": "Asleep", "total": 28800, "used": 7, "overflow": null},
                    {"class": "Mode", "name": "Work", "total": 21600, "used": 3, "overflow": null}
                ],
                "notify": {"enable": false},
                "window": {},
                "selected_mode": "Work"
            }
        ]))
        .unwrap();
        assert_eq!(state.timers[0].kind, ModeKind::Unlimited);
        assert_eq!(state.timers[1].kind, ModeKind::Finite);
        assert!(!state.notify);
        assert_eq!(state.selected_mode.as_deref(), Some("Work"));
    }

    #[test]
    fn test_unknown_versions_rejected() {
        for version in [0, 7, 99] {
            let err = decode_json(json!([version, {}])).unwrap_err();
            assert!(matches!(
                err,
                PersistenceError::UnsupportedVersion { found, .. } if found == version
            ));
        }
    }

    #[test]
    fn test_structurally_invalid_payloads() {
        let cases = [
            json!({"version": 6}),
            json!([]),
            json!(["6", {}]),
            json!([6]),
            json!([6, {"timers": []}]),
            json!([6, {"timers": "nope"}]),
            json!([2, {"7": 100}, {}]),
            json!([2, {"btn_unknown": 100}, {}]),
            json!([3, [1, 2], [0, 0]]),
            json!([5, [{"name": "Work", "total": 1}, {"name": "Work", "total": 2}], true, {}]),
            json!([6, {"timers": [{"kind": "bogus", "name": "Work", "total": 1}]}]),
        ];
        for case in cases {
            assert!(decode_json(case.clone()).is_err(), "accepted {}", case);
        }
    }

    #[test]
    fn test_truncated_bytes() {
        let bytes = encode(&sample_state()).unwrap();
        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
    }

    #[test]
    fn test_encode_writes_current_version() {
        let bytes = encode(&sample_state()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0], json!(CURRENT_SAVE_VERSION));
        assert_eq!(value[1]["notify"]["enable"], json!(false));
        assert_eq!(value[1]["selected_mode"], json!("Work"));
        assert_eq!(value[1]["timers"][0]["kind"], json!("unlimited"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("timeclock.sav");
        let state = sample_state();

        save(&path, &state).unwrap();
        assert!(!temp_path(&path).exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timeclock.sav");
        let state = sample_state();
        save(&path, &state).unwrap();

        // A crash after writing the scratch file but before the rename.
        fs::write(temp_path(&path), b"[6, {\"timers\": [").unwrap();

        assert_eq!(load(&path).unwrap(), state);

        // The next save overwrites the leftover scratch file.
        let mut newer = state.clone();
        newer.timers[1].used = 99.0;
        save(&path, &newer).unwrap();
        assert_eq!(load(&path).unwrap(), newer);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_to_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timeclock.sav");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"").unwrap();

        let err = save(&path, &sample_state()).unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.sav")).unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/data/timeclock.sav")),
            PathBuf::from("/data/timeclock.sav.tmp")
        );
    }
}
