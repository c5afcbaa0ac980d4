use std::fmt::Display;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "dottime-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DOTTIME_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DOTTIME_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Calendar the dot grid is computed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalendarZone {
  Named(Tz),
  HostLocal
}

impl CalendarZone {
  #[must_use]
  pub fn local_naive(
    self,
    dt: DateTime<Utc>
  ) -> NaiveDateTime {
    match self {
      | CalendarZone::Named(tz) => {
        dt.with_timezone(&tz)
          .naive_local()
      }
      | CalendarZone::HostLocal => {
        dt.with_timezone(&Local)
          .naive_local()
      }
    }
  }

  #[must_use]
  pub fn local_date(
    self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    self.local_naive(dt).date()
  }

  pub fn to_utc(
    self,
    local_naive: NaiveDateTime,
    context: &str
  ) -> anyhow::Result<DateTime<Utc>> {
    match self {
      | CalendarZone::Named(tz) => {
        resolve_local(
          &tz,
          local_naive,
          context
        )
      }
      | CalendarZone::HostLocal => {
        resolve_local(
          &Local,
          local_naive,
          context
        )
      }
    }
  }
}

impl std::fmt::Display for CalendarZone {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    match self {
      | CalendarZone::Named(tz) => {
        write!(f, "{}", tz.name())
      }
      | CalendarZone::HostLocal => {
        f.write_str("local")
      }
    }
  }
}

pub fn calendar_zone() -> CalendarZone {
  static ZONE: OnceLock<CalendarZone> =
    OnceLock::new();
  *ZONE.get_or_init(
    resolve_calendar_zone
  )
}

/// Calendar date of `dt` in the
/// configured zone; this is the "now"
/// handed to the partition functions.
#[must_use]
pub fn to_calendar_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  calendar_zone().local_date(dt)
}

#[must_use]
pub fn current_year(
  now: DateTime<Utc>
) -> i32 {
  to_calendar_date(now).year()
}

fn resolve_calendar_zone() -> CalendarZone
{
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return CalendarZone::Named(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return CalendarZone::Named(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     host local time"
  );
  CalendarZone::HostLocal
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  parse_timezone_config(
    &raw,
    &format!("file:{}", path.display())
  )
}

fn parse_timezone_config(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let parsed = match toml::from_str::<
    TimezoneConfig
  >(raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        source,
        error = %err,
        "failed parsing timezone config"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      source,
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(&timezone, source)
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured calendar timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn resolve_local<Z>(
  zone: &Z,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>>
where
  Z: TimeZone,
  Z::Offset: Display
{
  match zone
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

fn local_midnight(
  date: NaiveDate,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {context}"
      )
    })?;
  calendar_zone()
    .to_utc(midnight, context)
}

/// Resolves the reference instant for an
/// `at:` override.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = to_calendar_date(now);

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return local_midnight(
        today, "today"
      );
    }
    | "tomorrow" => {
      return local_midnight(
        today + Duration::days(1),
        "tomorrow"
      );
    }
    | "yesterday" => {
      return local_midnight(
        today - Duration::days(1),
        "yesterday"
      );
    }
    | _ => {}
  }

  if token.len() == 4
    && token
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    let year: i32 =
      token.parse().context(
        "invalid 4-digit year"
      )?;
    let date = NaiveDate::from_ymd_opt(
      year, 1, 1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid year value: {year}"
      )
    })?;
    return local_midnight(
      date,
      "year-4digit"
    );
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    let date = NaiveDate::from_ymd_opt(
      today.year(),
      month,
      1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month value: {month}"
      )
    })?;
    return local_midnight(
      date,
      "month-name"
    );
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[ymwdh])$")
    .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let negative = caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;
    let signed =
      if negative { -num } else { num };

    let out_of_range = || {
      anyhow!(
        "relative offset out of range: \
         {token}"
      )
    };

    let delta = match unit {
      | "y" | "m" => {
        let months = if unit == "y" {
          signed
            .checked_mul(12)
            .ok_or_else(out_of_range)?
        } else {
          signed
        };
        return shift_months(now, months);
      }
      | "w" => Duration::try_weeks(signed),
      | "d" => Duration::try_days(signed),
      | "h" => Duration::try_hours(signed),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    }
    .ok_or_else(out_of_range)?;

    return now
      .checked_add_signed(delta)
      .ok_or_else(out_of_range);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return local_midnight(date, "date");
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return calendar_zone()
        .to_utc(ndt, fmt);
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     4-digit year, month names (e.g. \
     march), +N/-N with unit \
     y/m/w/d/h, RFC3339, YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM, YYYY-MM-DD HH:MM"
  })
}

/// Moves `now` by whole calendar
/// months, clamping the day to the
/// target month's length.
fn shift_months(
  now: DateTime<Utc>,
  months: i64
) -> anyhow::Result<DateTime<Utc>> {
  let zone = calendar_zone();
  let local = zone.local_naive(now);
  let shifted = if months >= 0 {
    local.checked_add_months(
      chrono::Months::new(
        u32::try_from(months)
          .context("month shift out of range")?
      )
    )
  } else {
    local.checked_sub_months(
      chrono::Months::new(
        u32::try_from(-months)
          .context("month shift out of range")?
      )
    )
  }
  .ok_or_else(|| {
    anyhow!(
      "month shift out of range: \
       {months}"
    )
  })?;
  zone.to_utc(shifted, "month-shift")
}

/// Parses `HH:MM` (24h) or `H:MMam` /
/// `H:MMpm` into `(hour, minute)`.
#[must_use]
pub fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    let pm = ampm_match
      .as_str()
      .eq_ignore_ascii_case("pm");
    match (pm, raw_hour) {
      | (false, 12) => 0,
      | (true, 12) => 12,
      | (false, h) => h,
      | (true, h) => h + 12
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    parse_clock_time,
    parse_date_expr,
    parse_timezone_config,
    to_calendar_date
  };

  fn fixed_now() -> chrono::DateTime<Utc>
  {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn parses_iso_date() {
    let parsed = parse_date_expr(
      "2024-02-10",
      fixed_now()
    )
    .expect("parse date");
    assert_eq!(
      to_calendar_date(parsed)
        .format("%Y-%m-%d")
        .to_string(),
      "2024-02-10"
    );
  }

  #[test]
  fn parses_four_digit_year() {
    let parsed =
      parse_date_expr("2028", fixed_now())
        .expect("parse year");
    assert_eq!(
      to_calendar_date(parsed)
        .format("%Y-%m-%d")
        .to_string(),
      "2028-01-01"
    );
  }

  #[test]
  fn parses_month_name_in_current_year()
  {
    let parsed = parse_date_expr(
      "march",
      fixed_now()
    )
    .expect("parse month");
    assert_eq!(
      to_calendar_date(parsed)
        .format("%Y-%m-%d")
        .to_string(),
      "2026-03-01"
    );
  }

  #[test]
  fn parses_relative_days() {
    let now = fixed_now();
    let parsed =
      parse_date_expr("+10d", now)
        .expect("parse relative");
    assert_eq!(
      parsed - now,
      chrono::Duration::days(10)
    );
  }

  #[test]
  fn huge_relative_offsets_are_errors() {
    let now = fixed_now();
    for expr in [
      "+999999999999999999y",
      "-999999999999999999y",
      "+99999999999m",
      "+99999999999999999w",
      "+100000000d",
      "-100000000d",
      "+9999999999999h"
    ] {
      let err = parse_date_expr(expr, now)
        .expect_err(expr);
      assert!(
        err
          .to_string()
          .contains("out of range"),
        "{expr}: {err}"
      );
    }
  }

  #[test]
  fn relative_months_and_years_shift_calendar()
  {
    let now = fixed_now();
    let months =
      parse_date_expr("+2m", now)
        .expect("parse months");
    assert_eq!(
      to_calendar_date(months)
        .format("%Y-%m")
        .to_string(),
      "2026-04"
    );
    let years =
      parse_date_expr("-1y", now)
        .expect("parse years");
    assert_eq!(
      to_calendar_date(years)
        .format("%Y-%m")
        .to_string(),
      "2025-02"
    );
  }

  #[test]
  fn now_is_passthrough() {
    let now = fixed_now();
    assert_eq!(
      parse_date_expr("now", now)
        .expect("parse now"),
      now
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_date_expr(
        "someday",
        fixed_now()
      )
      .is_err()
    );
  }

  #[test]
  fn parses_clock_times() {
    assert_eq!(
      parse_clock_time("08:00"),
      Some((8, 0))
    );
    assert_eq!(
      parse_clock_time("3:23pm"),
      Some((15, 23))
    );
    assert_eq!(
      parse_clock_time("12:05am"),
      Some((0, 5))
    );
    assert_eq!(
      parse_clock_time("24:00"),
      None
    );
    assert_eq!(
      parse_clock_time("7:61"),
      None
    );
  }

  #[test]
  fn timezone_config_accepts_both_shapes()
  {
    let top = parse_timezone_config(
      "timezone = \"Europe/Berlin\"",
      "test"
    );
    assert_eq!(
      top,
      Some(chrono_tz::Europe::Berlin)
    );

    let nested = parse_timezone_config(
      "[time]\ntimezone = \"Asia/Tokyo\"",
      "test"
    );
    assert_eq!(
      nested,
      Some(chrono_tz::Asia::Tokyo)
    );

    assert_eq!(
      parse_timezone_config(
        "timezone = \"Mars/Olympus\"",
        "test"
      ),
      None
    );
  }
}
