use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::{calendar_zone, current_year, parse_clock_time, parse_date_expr};
use crate::partition::{DotCell, TimeData, ViewMode, compute_time_data, generate_dot_cells};
use crate::prefs::{self, PreferenceStore, WidgetSnapshot};
use crate::reminder::{next_fire_time, reminder_message};
use crate::render::{Renderer, format_date};
use crate::theme::Theme;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "show",
        "month",
        "year",
        "life",
        "summary",
        "export",
        "set",
        "get",
        "unset",
        "prefs",
        "presets",
        "remind",
        "onboard",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv, now))]
pub fn dispatch(
    store: &mut PreferenceStore,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, args = ?args, "dispatching command");

    match command {
        "show" => cmd_show(store, cfg, renderer, args, now),
        "month" => cmd_switch_view(store, cfg, renderer, ViewMode::Month, args, now),
        "year" => cmd_switch_view(store, cfg, renderer, ViewMode::Year, args, now),
        "life" => cmd_switch_view(store, cfg, renderer, ViewMode::Life, args, now),
        "summary" => cmd_summary(store, cfg, renderer, args, now),
        "export" => cmd_export(store, cfg, args, now),
        "set" => cmd_set(store, args, now),
        "get" => cmd_get(store, cfg, args),
        "unset" => cmd_unset(store, args),
        "prefs" => renderer.print_preferences(store.entries()),
        "presets" => renderer.print_presets(),
        "remind" => cmd_remind(store, cfg, args, now),
        "onboard" => cmd_onboard(store, cfg, args, now),
        "_commands" => cmd_commands(),
        "_show" => cmd_show_config(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Modifiers accepted by the view commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewArgs {
    pub mode: Option<ViewMode>,
    pub at: Option<DateTime<Utc>>,
    pub birth_year: Option<i32>,
}

impl ViewArgs {
    #[instrument(skip(args, now))]
    pub fn parse(args: &[String], now: DateTime<Utc>) -> anyhow::Result<Self> {
        let mut out = Self::default();
        for arg in args {
            if let Some((key, value)) = arg.split_once(':') {
                match key.to_ascii_lowercase().as_str() {
                    "at" | "date" => {
                        out.at = Some(parse_date_expr(value, now)?);
                    }
                    "birth" | "born" => {
                        out.birth_year = Some(
                            value
                                .trim()
                                .parse()
                                .with_context(|| format!("invalid birth year: {value}"))?,
                        );
                    }
                    "view" => out.mode = Some(value.parse()?),
                    other => return Err(anyhow!("unknown modifier: {other}")),
                }
                continue;
            }
            let mode = arg
                .parse::<ViewMode>()
                .with_context(|| format!("unrecognized argument: {arg}"))?;
            out.mode = Some(mode);
        }
        Ok(out)
    }
}

/// Everything a view command needs, with preference and config fallbacks
/// applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedView {
    pub mode: ViewMode,
    pub birth_year: i32,
    pub birth_year_is_default: bool,
    pub date: NaiveDate,
    pub data: TimeData,
    pub cells: Vec<DotCell>,
}

#[instrument(skip(store, cfg, args, now))]
pub fn resolve_view(
    store: &PreferenceStore,
    cfg: &Config,
    args: &ViewArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<ResolvedView> {
    let mode = match args.mode.or_else(|| store.view_type()) {
        Some(mode) => mode,
        None => cfg.default_view()?,
    };
    let stored_birth = args.birth_year.or_else(|| store.birth_year());
    let birth_year = match stored_birth {
        Some(year) => year,
        None => cfg.default_birth_year()?,
    };

    let reference = args.at.unwrap_or(now);
    let date = calendar_zone().local_date(reference);
    let data = compute_time_data(mode, birth_year, date);
    let cells = generate_dot_cells(&data, mode, date);

    debug!(
        view = %mode,
        birth_year,
        date = %date,
        total = data.total_units,
        passed = data.passed_units,
        "resolved view"
    );

    Ok(ResolvedView {
        mode,
        birth_year,
        birth_year_is_default: stored_birth.is_none(),
        date,
        data,
        cells,
    })
}

fn cmd_show(
    store: &mut PreferenceStore,
    cfg: &Config,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command show");

    let view_args = ViewArgs::parse(args, now)?;
    let view = resolve_view(store, cfg, &view_args, now)?;

    if view.mode == ViewMode::Life && view.birth_year_is_default {
        eprintln!(
            "note: assuming birth year {}; set yours with `dottime set birth_year YYYY`",
            view.birth_year
        );
    }

    let theme = Theme::new(store.dot_color(), store.background());
    renderer.print_view(view.mode, &view.data, &view.cells, theme)?;

    let snapshot = WidgetSnapshot::new(&view.data, view.mode);
    if let Err(err) = store.write_widget_snapshot(&snapshot) {
        let reason = format!("{err:#}");
        warn!(error = %reason, "failed to update widget snapshot");
    }
    Ok(())
}

fn cmd_switch_view(
    store: &mut PreferenceStore,
    cfg: &Config,
    renderer: &Renderer,
    mode: ViewMode,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(view = %mode, "command switch view");
    store.set_view_type(mode)?;

    let mut forwarded = vec![mode.as_str().to_string()];
    forwarded.extend(args.iter().cloned());
    cmd_show(store, cfg, renderer, &forwarded, now)
}

fn cmd_summary(
    store: &PreferenceStore,
    cfg: &Config,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command summary");
    let view = resolve_view(store, cfg, &ViewArgs::parse(args, now)?, now)?;
    renderer.print_summary(&view.data)
}

#[derive(Debug, Serialize)]
struct ExportDoc<'a> {
    view: ViewMode,
    date: String,
    birth_year: i32,
    time_data: &'a TimeData,
    cells: &'a [DotCell],
}

fn cmd_export(
    store: &PreferenceStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command export");
    let view = resolve_view(store, cfg, &ViewArgs::parse(args, now)?, now)?;
    let doc = ExportDoc {
        view: view.mode,
        date: format_date(view.date),
        birth_year: view.birth_year,
        time_data: &view.data,
        cells: &view.cells,
    };
    println!("{}", serde_json::to_string(&doc)?);
    Ok(())
}

fn expect_key_value(args: &[String], usage: &str) -> anyhow::Result<(String, String)> {
    match args {
        [key, rest @ ..] if !rest.is_empty() => Ok((key.to_ascii_lowercase(), rest.join(" "))),
        _ => Err(anyhow!("usage: {usage}")),
    }
}

#[instrument(skip(store, args, now))]
fn cmd_set(store: &mut PreferenceStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let (key, value) = expect_key_value(args, "dottime set KEY VALUE")?;
    info!(key = %key, value = %value, "command set");

    match key.as_str() {
        "birth_year" | "birth" => {
            let year: i32 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid birth year: {value}"))?;
            store.set_birth_year(year, current_year(now))?;
        }
        "view" | "view_type" => store.set_view_type(value.parse()?)?,
        "color" | "dot_color" => store.set_dot_color(value.parse()?)?,
        "background" => store.set_background(value.parse()?)?,
        "font" => store.set_font(value.parse()?)?,
        "notifications" | "notifications.enabled" => {
            let mut settings = store.reminder_settings();
            settings.enabled = match value.trim().to_ascii_lowercase().as_str() {
                "on" | "yes" | "true" | "1" => true,
                "off" | "no" | "false" | "0" => false,
                other => return Err(anyhow!("expected on or off, got: {other}")),
            };
            store.set_reminder_settings(settings)?;
        }
        "notify_time" | "notifications.time" => {
            let (hour, minute) = parse_clock_time(&value)
                .ok_or_else(|| anyhow!("invalid time (expected HH:MM): {value}"))?;
            let mut settings = store.reminder_settings();
            settings.hour = hour;
            settings.minute = minute;
            store.set_reminder_settings(settings)?;
        }
        other => return Err(anyhow!("unknown preference: {other}")),
    }

    println!("{key} set.");
    Ok(())
}

fn cmd_get(store: &PreferenceStore, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    let [key] = args else {
        return Err(anyhow!("usage: dottime get KEY"));
    };
    let key = key.to_ascii_lowercase();

    let value = match key.as_str() {
        "birth_year" | "birth" => match store.birth_year() {
            Some(year) => year.to_string(),
            None => cfg.default_birth_year()?.to_string(),
        },
        "view" | "view_type" => match store.view_type() {
            Some(mode) => mode.to_string(),
            None => cfg.default_view()?.to_string(),
        },
        "color" | "dot_color" => store.dot_color().to_string(),
        "background" => store.background().to_string(),
        "font" => store.font().to_string(),
        "notifications" | "notifications.enabled" => {
            let enabled = store.reminder_settings().enabled;
            (if enabled { "on" } else { "off" }).to_string()
        }
        "notify_time" | "notifications.time" => {
            let settings = store.reminder_settings();
            format!("{:02}:{:02}", settings.hour, settings.minute)
        }
        other => store
            .get_raw(other)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no stored preference: {other}"))?,
    };

    println!("{value}");
    Ok(())
}

fn cmd_unset(store: &mut PreferenceStore, args: &[String]) -> anyhow::Result<()> {
    let [key] = args else {
        return Err(anyhow!("usage: dottime unset KEY"));
    };
    let stored_key = match key.to_ascii_lowercase().as_str() {
        "birth" | "birth_year" => prefs::BIRTH_YEAR_KEY.to_string(),
        "view" | "view_type" => prefs::VIEW_TYPE_KEY.to_string(),
        "color" | "dot_color" => prefs::DOT_COLOR_KEY.to_string(),
        other => other.to_string(),
    };
    if store.remove(&stored_key)? {
        println!("{stored_key} removed.");
    } else {
        println!("{stored_key} was not set.");
    }
    Ok(())
}

fn cmd_remind(
    store: &PreferenceStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command remind");
    let settings = store.reminder_settings();
    if !settings.enabled {
        println!("Reminders are off. Turn them on with `dottime set notifications on`.");
        return Ok(());
    }

    let view_args = ViewArgs::parse(args, now)?;
    let reference = view_args.at.unwrap_or(now);
    let zone = calendar_zone();
    let local_now = zone.local_naive(reference);
    let birth_year = match view_args.birth_year.or_else(|| store.birth_year()) {
        Some(year) => year,
        None => cfg.default_birth_year()?,
    };

    let message = reminder_message(birth_year, local_now.date(), &mut rand::thread_rng());
    let fire_at = next_fire_time(settings, local_now)?;

    println!("next reminder {} ({zone})", fire_at.format("%Y-%m-%d %H:%M"));
    println!("{}", message.title);
    println!("{}", message.body);
    Ok(())
}

fn cmd_onboard(
    store: &mut PreferenceStore,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command onboard");
    let year = match args {
        [] => cfg.default_birth_year()?,
        [raw] => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid birth year: {raw}"))?,
        _ => return Err(anyhow!("usage: dottime onboard [YEAR]")),
    };

    store.set_birth_year(year, current_year(now))?;
    store.set_onboarding_complete(true)?;

    println!("Welcome to dottime.");
    println!("Every dot is a day of your month or year, or a year of your life.");
    println!("Birth year saved as {year}. Try `dottime life`.");
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show_config(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: dottime [COMMAND] [month|year|life] [at:DATE] [birth:YEAR]\n\
         \n\
         commands: show, month, year, life, summary, export, set, get, unset, prefs, presets, remind, onboard\n\
         preferences: birth_year, view, color, background, font, notifications, notify_time"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("sum", &known), Some("summary"));
        assert_eq!(expand_command_abbrev("l", &known), Some("life"));
        assert_eq!(expand_command_abbrev("s", &known), None);
        assert_eq!(expand_command_abbrev("pre", &known), None);
        assert_eq!(expand_command_abbrev("pres", &known), Some("presets"));
    }

    #[test]
    fn view_args_collect_modifiers() {
        let parsed =
            ViewArgs::parse(&args(&["life", "birth:1984", "at:2024-02-10"]), fixed_now())
                .expect("parse");
        assert_eq!(parsed.mode, Some(ViewMode::Life));
        assert_eq!(parsed.birth_year, Some(1984));
        assert!(parsed.at.is_some());

        assert!(ViewArgs::parse(&args(&["decade"]), fixed_now()).is_err());
        assert!(ViewArgs::parse(&args(&["color:rose"]), fixed_now()).is_err());
    }

    #[test]
    fn resolution_prefers_args_then_prefs_then_config() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        let cfg = Config::default();
        let now = fixed_now();

        let view = resolve_view(&store, &cfg, &ViewArgs::default(), now).expect("resolve");
        assert_eq!(view.mode, ViewMode::Month);
        assert_eq!(view.birth_year, 1990);
        assert!(view.birth_year_is_default);

        store.set_view_type(ViewMode::Life).expect("view");
        store.set_birth_year(2000, 2026).expect("birth");
        let view = resolve_view(&store, &cfg, &ViewArgs::default(), now).expect("resolve");
        assert_eq!(view.mode, ViewMode::Life);
        assert_eq!(view.birth_year, 2000);
        assert!(!view.birth_year_is_default);

        let explicit = ViewArgs {
            mode: Some(ViewMode::Year),
            at: None,
            birth_year: Some(1950),
        };
        let view = resolve_view(&store, &cfg, &explicit, now).expect("resolve");
        assert_eq!(view.mode, ViewMode::Year);
        assert_eq!(view.birth_year, 1950);
        assert_eq!(view.cells.len() as u32, view.data.total_units);
    }

    #[test]
    fn set_validates_and_persists() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        let now = fixed_now();

        cmd_set(&mut store, &args(&["birth_year", "1975"]), now).expect("set birth");
        cmd_set(&mut store, &args(&["color", "ocean"]), now).expect("set color");
        cmd_set(&mut store, &args(&["notify_time", "9:30pm"]), now).expect("set time");
        cmd_set(&mut store, &args(&["notifications", "on"]), now).expect("enable");

        assert_eq!(store.birth_year(), Some(1975));
        assert_eq!(store.dot_color(), crate::theme::DotPreset::Ocean);
        let settings = store.reminder_settings();
        assert!(settings.enabled);
        assert_eq!((settings.hour, settings.minute), (21, 30));

        assert!(cmd_set(&mut store, &args(&["birth_year", "2031"]), now).is_err());
        assert!(cmd_set(&mut store, &args(&["mood", "happy"]), now).is_err());
        assert!(cmd_set(&mut store, &args(&["color"]), now).is_err());
    }

    #[test]
    fn switching_view_persists_it() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        let cfg = Config::default();
        let renderer = Renderer::new(&cfg).expect("renderer").with_color(false);

        cmd_switch_view(
            &mut store,
            &cfg,
            &renderer,
            ViewMode::Year,
            &args(&["at:2023-01-01"]),
            fixed_now(),
        )
        .expect("switch");

        assert_eq!(store.view_type(), Some(ViewMode::Year));
        let snapshot = store
            .load_widget_snapshot()
            .expect("load snapshot")
            .expect("snapshot written");
        assert_eq!(snapshot.total, 365);
        assert_eq!(snapshot.remaining, 365);
        assert_eq!(snapshot.view, ViewMode::Year);
    }

    #[test]
    fn onboarding_stores_birth_year() {
        let temp = tempdir().expect("tempdir");
        let mut store = PreferenceStore::open(temp.path()).expect("open store");
        cmd_onboard(&mut store, &Config::default(), &args(&["1988"]), fixed_now())
            .expect("onboard");
        assert_eq!(store.birth_year(), Some(1988));
        assert!(store.onboarding_complete());
    }
}
