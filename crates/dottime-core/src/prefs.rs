use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::partition::{MIN_BIRTH_YEAR, TimeData, ViewMode};
use crate::reminder::ReminderSettings;
use crate::theme::{BackgroundPreset, DotPreset, FontPreset};

pub const BIRTH_YEAR_KEY: &str = "birth_year";
pub const VIEW_TYPE_KEY: &str = "view_type";
pub const DOT_COLOR_KEY: &str = "dot_color";
pub const BACKGROUND_KEY: &str = "background";
pub const FONT_KEY: &str = "font";
pub const NOTIFICATIONS_ENABLED_KEY: &str = "notifications.enabled";
pub const NOTIFICATIONS_TIME_KEY: &str = "notifications.time";
pub const ONBOARDING_COMPLETE_KEY: &str = "onboarding.complete";

/// String-keyed preferences persisted as one JSON object.
#[derive(Debug)]
pub struct PreferenceStore {
    pub data_dir: PathBuf,
    pub prefs_path: PathBuf,
    pub widget_path: PathBuf,
    values: BTreeMap<String, String>,
}

/// What a home-screen widget needs to draw its counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct WidgetSnapshot {
    pub remaining: u32,
    pub total: u32,
    pub label: String,
    pub view: ViewMode,
}

impl WidgetSnapshot {
    pub fn new(data: &TimeData, view: ViewMode) -> Self {
        Self {
            remaining: data.remaining_units,
            total: data.total_units,
            label: data.label.clone(),
            view,
        }
    }
}

impl PreferenceStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let prefs_path = data_dir.join("preferences.json");
        let widget_path = data_dir.join("widget.json");

        let values = if prefs_path.exists() {
            let raw = fs::read_to_string(&prefs_path)
                .with_context(|| format!("failed reading {}", prefs_path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", prefs_path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        info!(
            data_dir = %data_dir.display(),
            prefs = %prefs_path.display(),
            count = values.len(),
            "opened preference store"
        );

        Ok(Self {
            data_dir,
            prefs_path,
            widget_path,
            values,
        })
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[tracing::instrument(skip(self, value))]
    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) -> anyhow::Result<()> {
        let value = value.into();
        debug!(key, value = %value, "storing preference");
        self.values.insert(key.to_string(), value);
        self.save()
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, key: &str) -> anyhow::Result<bool> {
        let removed = self.values.remove(key).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Missing keys and unparseable values both yield `default`; the latter
    /// is logged.
    pub fn get_or<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_parsed(key) {
            Some(value) => value,
            None => default,
        }
    }

    fn get_parsed<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get_raw(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, value = %raw, error = %err, "ignoring unparseable preference");
                None
            }
        }
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.get_parsed(BIRTH_YEAR_KEY)
    }

    /// Rejects years outside `[1900, current_year]`.
    pub fn set_birth_year(&mut self, year: i32, current_year: i32) -> anyhow::Result<()> {
        validate_birth_year(year, current_year)?;
        self.set_raw(BIRTH_YEAR_KEY, year.to_string())
    }

    pub fn view_type(&self) -> Option<ViewMode> {
        self.get_parsed(VIEW_TYPE_KEY)
    }

    pub fn set_view_type(&mut self, mode: ViewMode) -> anyhow::Result<()> {
        self.set_raw(VIEW_TYPE_KEY, mode.as_str())
    }

    pub fn dot_color(&self) -> DotPreset {
        self.get_or(DOT_COLOR_KEY, DotPreset::default())
    }

    pub fn set_dot_color(&mut self, preset: DotPreset) -> anyhow::Result<()> {
        self.set_raw(DOT_COLOR_KEY, preset.as_str())
    }

    pub fn background(&self) -> BackgroundPreset {
        self.get_or(BACKGROUND_KEY, BackgroundPreset::default())
    }

    pub fn set_background(&mut self, preset: BackgroundPreset) -> anyhow::Result<()> {
        self.set_raw(BACKGROUND_KEY, preset.as_str())
    }

    pub fn font(&self) -> FontPreset {
        self.get_or(FONT_KEY, FontPreset::default())
    }

    pub fn set_font(&mut self, preset: FontPreset) -> anyhow::Result<()> {
        self.set_raw(FONT_KEY, preset.as_str())
    }

    pub fn reminder_settings(&self) -> ReminderSettings {
        let defaults = ReminderSettings::default();
        let enabled = self
            .get_raw(NOTIFICATIONS_ENABLED_KEY)
            .map(crate::config::parse_bool)
            .unwrap_or(defaults.enabled);
        let (hour, minute) = self
            .get_raw(NOTIFICATIONS_TIME_KEY)
            .and_then(|raw| {
                let parsed = crate::datetime::parse_clock_time(raw);
                if parsed.is_none() {
                    warn!(value = %raw, "ignoring unparseable reminder time");
                }
                parsed
            })
            .unwrap_or((defaults.hour, defaults.minute));
        ReminderSettings {
            enabled,
            hour,
            minute,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_reminder_settings(&mut self, settings: ReminderSettings) -> anyhow::Result<()> {
        if settings.hour > 23 || settings.minute > 59 {
            return Err(anyhow!(
                "invalid reminder time {:02}:{:02}",
                settings.hour,
                settings.minute
            ));
        }
        self.values.insert(
            NOTIFICATIONS_ENABLED_KEY.to_string(),
            settings.enabled.to_string(),
        );
        self.values.insert(
            NOTIFICATIONS_TIME_KEY.to_string(),
            format!("{:02}:{:02}", settings.hour, settings.minute),
        );
        self.save()
    }

    pub fn onboarding_complete(&self) -> bool {
        self.get_raw(ONBOARDING_COMPLETE_KEY)
            .map(crate::config::parse_bool)
            .unwrap_or(false)
    }

    pub fn set_onboarding_complete(&mut self, complete: bool) -> anyhow::Result<()> {
        self.set_raw(ONBOARDING_COMPLETE_KEY, complete.to_string())
    }

    #[tracing::instrument(skip(self, snapshot), fields(view = %snapshot.view))]
    pub fn write_widget_snapshot(&self, snapshot: &WidgetSnapshot) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(snapshot)?;
        write_atomic(&self.widget_path, serialized.as_bytes())
            .context("failed to save widget.json")
    }

    pub fn load_widget_snapshot(&self) -> anyhow::Result<Option<WidgetSnapshot>> {
        if !self.widget_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.widget_path)
            .with_context(|| format!("failed reading {}", self.widget_path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.widget_path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self) -> anyhow::Result<()> {
        let serialized = serde_json::to_string_pretty(&self.values)?;
        write_atomic(&self.prefs_path, serialized.as_bytes())
            .context("failed to save preferences.json")
    }
}

pub fn validate_birth_year(year: i32, current_year: i32) -> anyhow::Result<()> {
    if (MIN_BIRTH_YEAR..=current_year).contains(&year) {
        Ok(())
    } else {
        Err(anyhow!(
            "birth year must be between {MIN_BIRTH_YEAR} and {current_year}, got {year}"
        ))
    }
}

#[tracing::instrument(skip(path, payload))]
fn write_atomic(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = payload.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let temp = tempdir().expect("tempdir");
        let store = PreferenceStore::open(temp.path()).expect("open store");
        assert_eq!(store.birth_year(), None);
        assert_eq!(store.view_type(), None);
        assert_eq!(store.dot_color(), DotPreset::Default);
        assert_eq!(store.get_or("unknown", 42u32), 42);
        assert!(!store.onboarding_complete());
        assert_eq!(store.reminder_settings(), ReminderSettings::default());
    }

    #[test]
    fn values_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        {
            let mut store = PreferenceStore::open(temp.path()).expect("open store");
            store.set_birth_year(1987, 2026).expect("birth year");
            store.set_view_type(ViewMode::Life).expect("view");
            store.set_dot_color(DotPreset::Mint).expect("color");
            store
                .set_reminder_settings(ReminderSettings {
                    enabled: true,
                    hour: 21,
                    minute: 5,
                })
                .expect("reminder");
        }

        let store = PreferenceStore::open(temp.path()).expect("reopen store");
        assert_eq!(store.birth_year(), Some(1987));
        assert_eq!(store.view_type(), Some(ViewMode::Life));
        assert_eq!(store.dot_color(), DotPreset::Mint);
        assert_eq!(store.get_raw(NOTIFICATIONS_TIME_KEY), Some("21:05"));
        assert!(store.reminder_settings().enabled);
    }

    #[test]
    fn corrupt_values_fall_back() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("preferences.json"),
            r#"{"birth_year":"nineteen","view_type":"decade","dot_color":"neon"}"#,
        )
        .expect("seed prefs");

        let store = PreferenceStore::open(temp.path()).expect("open store");
        assert_eq!(store.birth_year(), None);
        assert_eq!(store.view_type(), None);
        assert_eq!(store.dot_color(), DotPreset::Default);
    }

    #[test]
    fn birth_year_bounds_are_enforced() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        assert!(store.set_birth_year(1899, 2026).is_err());
        assert!(store.set_birth_year(2027, 2026).is_err());
        store.set_birth_year(1900, 2026).expect("lower bound");
        store.set_birth_year(2026, 2026).expect("upper bound");
        assert_eq!(store.birth_year(), Some(2026));
    }

    #[test]
    fn remove_reports_presence() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        store.set_font(FontPreset::Space).expect("font");
        assert!(store.remove(FONT_KEY).expect("remove"));
        assert!(!store.remove(FONT_KEY).expect("remove again"));
        assert_eq!(store.font(), FontPreset::System);
    }

    #[test]
    fn widget_snapshot_round_trip() {
        let temp = tempdir().expect("tempdir");
        let store = PreferenceStore::open(temp.path()).expect("open store");
        assert_eq!(store.load_widget_snapshot().expect("load"), None);

        let data = TimeData {
            total_units: 31,
            passed_units: 15,
            remaining_units: 16,
            label: "days left this month".to_string(),
            progress: 15.0 / 31.0,
        };
        let snapshot = WidgetSnapshot::new(&data, ViewMode::Month);
        store.write_widget_snapshot(&snapshot).expect("write");
        assert_eq!(store.load_widget_snapshot().expect("load"), Some(snapshot));
    }
}
