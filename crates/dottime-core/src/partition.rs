//! Time-partition calculation: splits the period around a reference
//! date into unit cells (days of the month, days of the year, or years
//! of a life) and summarizes how many have passed.
//!
//! Everything here is pure. The reference date is always passed in, so
//! callers decide which clock and timezone "now" comes from.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate
};
use serde::{
  Deserialize,
  Serialize
};

/// Life expectancy used by [`ViewMode::Life`], in years.
pub const LIFE_EXPECTANCY_YEARS: u32 =
  85;

/// Birth year assumed when none has been configured.
pub const DEFAULT_BIRTH_YEAR: i32 = 1990;

/// Earliest birth year accepted from users.
pub const MIN_BIRTH_YEAR: i32 = 1900;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
  Month,
  Year,
  Life
}

impl ViewMode {
  pub const ALL: [ViewMode; 3] = [
    ViewMode::Month,
    ViewMode::Year,
    ViewMode::Life
  ];

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | ViewMode::Month => "month",
      | ViewMode::Year => "year",
      | ViewMode::Life => "life"
    }
  }

  #[must_use]
  pub fn display_name(
    self
  ) -> &'static str {
    match self {
      | ViewMode::Month => "Month",
      | ViewMode::Year => "Year",
      | ViewMode::Life => "Life"
    }
  }

  /// Header text shown next to the
  /// remaining count.
  #[must_use]
  pub fn label(self) -> &'static str {
    match self {
      | ViewMode::Month => {
        "days left this month"
      }
      | ViewMode::Year => {
        "days left this year"
      }
      | ViewMode::Life => {
        "years remaining"
      }
    }
  }
}

impl fmt::Display for ViewMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ViewMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "month" => Ok(ViewMode::Month),
      | "year" => Ok(ViewMode::Year),
      | "life" => Ok(ViewMode::Life),
      | other => {
        Err(anyhow!(
          "unknown view mode: {other} \
           (expected month, year or \
           life)"
        ))
      }
    }
  }
}

/// Summary of one period. The default
/// value (all zero, empty label) is what
/// an unrecognized view key yields.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct TimeData {
  pub total_units:     u32,
  pub passed_units:    u32,
  pub remaining_units: u32,
  pub label:           String,
  pub progress:        f64
}

impl TimeData {
  fn new(
    total_units: u32,
    passed_units: u32,
    remaining_units: u32,
    label: &str
  ) -> Self {
    Self {
      total_units,
      passed_units,
      remaining_units,
      label: label.to_string(),
      progress: progress_of(
        passed_units,
        total_units
      )
    }
  }

  #[must_use]
  pub fn progress_percent(
    &self
  ) -> f64 {
    self.progress * 100.0
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct DotCell {
  pub index:     u32,
  pub is_passed: bool,
  pub is_today:  bool
}

#[must_use]
pub fn is_leap_year(year: i32) -> bool {
  (year % 4 == 0 && year % 100 != 0)
    || year % 400 == 0
}

#[must_use]
pub fn days_in_year(year: i32) -> u32 {
  if is_leap_year(year) { 366 } else { 365 }
}

/// Gregorian month length. `month` is
/// 1-based; out-of-range months yield 0.
#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  match month {
    | 1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
    | 4 | 6 | 9 | 11 => 30,
    | 2 => {
      if is_leap_year(year) {
        29
      } else {
        28
      }
    }
    | _ => 0
  }
}

/// 1-based ordinal day (Jan 1 is 1).
#[must_use]
pub fn day_of_year(
  date: NaiveDate
) -> u32 {
  date.ordinal()
}

fn progress_of(
  passed: u32,
  total: u32
) -> f64 {
  if total == 0 {
    return 0.0;
  }
  f64::from(passed) / f64::from(total)
}

/// Age by calendar-year subtraction
/// only; month and day of birth are not
/// known here.
#[must_use]
pub fn age_in_years(
  birth_year: i32,
  now: NaiveDate
) -> i32 {
  now.year() - birth_year
}

#[must_use]
pub fn compute_time_data(
  mode: ViewMode,
  birth_year: i32,
  now: NaiveDate
) -> TimeData {
  match mode {
    | ViewMode::Month => {
      let total = days_in_month(
        now.year(),
        now.month()
      );
      let passed = now.day() - 1;
      TimeData::new(
        total,
        passed,
        total - passed,
        mode.label()
      )
    }
    | ViewMode::Year => {
      let total =
        days_in_year(now.year());
      let passed = day_of_year(now) - 1;
      TimeData::new(
        total,
        passed,
        total - passed,
        mode.label()
      )
    }
    | ViewMode::Life => {
      let total = LIFE_EXPECTANCY_YEARS;
      let age =
        age_in_years(birth_year, now);
      // Birth years after `now` count
      // as zero years lived.
      let passed = u32::try_from(age)
        .unwrap_or(0)
        .min(total);
      TimeData::new(
        total,
        passed,
        total.saturating_sub(passed),
        mode.label()
      )
    }
  }
}

/// String-keyed entry point for stored or
/// user-typed view names. An unknown key
/// yields `TimeData::default()` instead of
/// an error.
#[must_use]
pub fn time_data_for_key(
  key: &str,
  birth_year: i32,
  now: NaiveDate
) -> TimeData {
  match key.parse::<ViewMode>() {
    | Ok(mode) => {
      compute_time_data(
        mode, birth_year, now
      )
    }
    | Err(err) => {
      tracing::warn!(
        key,
        error = %err,
        "unrecognized view key; using empty time data"
      );
      TimeData::default()
    }
  }
}

/// Index of the cell holding `now`. Life
/// mode has none.
#[must_use]
pub fn current_unit_index(
  mode: ViewMode,
  now: NaiveDate
) -> Option<u32> {
  match mode {
    | ViewMode::Month => {
      Some(now.day() - 1)
    }
    | ViewMode::Year => {
      Some(day_of_year(now) - 1)
    }
    | ViewMode::Life => None
  }
}

/// Lazily yields one cell per unit of
/// `data`, in index order.
pub fn dot_cells(
  data: &TimeData,
  mode: ViewMode,
  now: NaiveDate
) -> impl Iterator<Item = DotCell> + use<>
{
  let passed = data.passed_units;
  let today =
    current_unit_index(mode, now);
  (0..data.total_units).map(
    move |index| {
      DotCell {
        index,
        is_passed: index < passed,
        is_today: today == Some(index)
      }
    }
  )
}

#[must_use]
pub fn generate_dot_cells(
  data: &TimeData,
  mode: ViewMode,
  now: NaiveDate
) -> Vec<DotCell> {
  dot_cells(data, mode, now).collect()
}
