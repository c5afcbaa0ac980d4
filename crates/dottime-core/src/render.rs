use std::io::{self, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::partition::{DotCell, TimeData, ViewMode};
use crate::theme::{self, BackgroundPreset, DotPalette, DotPreset, FontPreset, Rgba, Theme};

#[derive(Debug, Clone)]
pub struct Glyphs {
    pub passed: String,
    pub today: String,
    pub future: String,
}

/// Per-role colors from `color.passed`, `color.empty` and `color.today`.
#[derive(Debug, Clone, Default)]
struct PaletteOverrides {
    passed: Option<Rgba>,
    empty: Option<Rgba>,
    today: Option<Rgba>,
}

impl PaletteOverrides {
    fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let color = |key: &str| -> anyhow::Result<Option<Rgba>> {
            cfg.get(key)
                .map(|raw| {
                    raw.parse::<Rgba>()
                        .with_context(|| format!("invalid config key {key}"))
                })
                .transpose()
        };
        Ok(Self {
            passed: color("color.passed")?,
            empty: color("color.empty")?,
            today: color("color.today")?,
        })
    }

    fn apply(&self, palette: DotPalette) -> DotPalette {
        DotPalette {
            passed: self.passed.unwrap_or(palette.passed),
            empty: self.empty.unwrap_or(palette.empty),
            today: self.today.unwrap_or(palette.today),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    glyphs: Glyphs,
    columns: [u32; 3],
    overrides: PaletteOverrides,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        let glyph = |key: &str, fallback: &str| {
            cfg.get(key)
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        let glyphs = Glyphs {
            passed: glyph("grid.glyph.passed", "●"),
            today: glyph("grid.glyph.today", "◉"),
            future: glyph("grid.glyph.future", "·"),
        };

        let columns = [
            cfg.grid_columns(ViewMode::Month)?,
            cfg.grid_columns(ViewMode::Year)?,
            cfg.grid_columns(ViewMode::Life)?,
        ];

        Ok(Self {
            color,
            glyphs,
            columns,
            overrides: PaletteOverrides::from_config(cfg)?,
        })
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn columns_for(&self, mode: ViewMode) -> usize {
        let columns = match mode {
            ViewMode::Month => self.columns[0],
            ViewMode::Year => self.columns[1],
            ViewMode::Life => self.columns[2],
        };
        columns as usize
    }

    #[tracing::instrument(skip(self, data, cells), fields(view = %mode))]
    pub fn print_view(
        &self,
        mode: ViewMode,
        data: &TimeData,
        cells: &[DotCell],
        theme: Theme,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_view(&mut out, mode, data, cells, theme)
    }

    /// Header (remaining count and label), progress line, then the grid.
    pub fn write_view<W: Write>(
        &self,
        mut out: W,
        mode: ViewMode,
        data: &TimeData,
        cells: &[DotCell],
        theme: Theme,
    ) -> anyhow::Result<()> {
        let palette = self.overrides.apply(theme.palette);

        writeln!(
            out,
            "{} {}",
            self.paint_over(
                &data.remaining_units.to_string(),
                palette.today,
                theme.surface
            ),
            data.label
        )?;
        writeln!(
            out,
            "{} {:.1}% of {} elapsed",
            mode.display_name(),
            data.progress_percent(),
            mode_unit_noun(mode)
        )?;
        writeln!(out)?;

        for row in cells.chunks(self.columns_for(mode).max(1)) {
            let line = row
                .iter()
                .map(|cell| self.cell_glyph(cell, &palette, theme.surface))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{line}")?;
        }

        Ok(())
    }

    pub fn write_summary<W: Write>(
        &self,
        mut out: W,
        data: &TimeData,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} {} ({:.1}%)",
            data.remaining_units,
            data.label,
            data.progress_percent()
        )?;
        Ok(())
    }

    pub fn print_summary(&self, data: &TimeData) -> anyhow::Result<()> {
        self.write_summary(io::stdout().lock(), data)
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_preferences<'a, I>(&self, entries: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rows = entries
            .into_iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect();
        write_table(
            io::stdout().lock(),
            vec!["Key".to_string(), "Value".to_string()],
            rows,
        )
    }

    pub fn print_presets(&self) -> anyhow::Result<()> {
        let mut rows = Vec::new();
        for preset in DotPreset::ALL {
            let palette = preset.palette();
            let swatch = [palette.passed, palette.empty, palette.today]
                .into_iter()
                .map(|c| self.paint(&self.glyphs.passed, c))
                .collect::<Vec<_>>()
                .join(" ");
            rows.push(vec!["color".to_string(), preset.to_string(), swatch]);
        }
        for preset in BackgroundPreset::ALL {
            let swatch = preset
                .tint()
                .map(|tint| self.paint("███", tint))
                .unwrap_or_default();
            rows.push(vec![
                "background".to_string(),
                format!("{preset} ({})", preset.display_name()),
                swatch,
            ]);
        }
        for preset in FontPreset::ALL {
            rows.push(vec![
                "font".to_string(),
                format!("{preset} ({})", preset.display_name()),
                String::new(),
            ]);
        }

        write_table(
            io::stdout().lock(),
            vec!["Kind".to_string(), "Name".to_string(), "Preview".to_string()],
            rows,
        )
    }

    fn cell_glyph(&self, cell: &DotCell, palette: &DotPalette, surface: Rgba) -> String {
        if cell.is_today {
            self.paint_over(&self.glyphs.today, palette.today, surface)
        } else if cell.is_passed {
            self.paint_over(&self.glyphs.passed, palette.passed, surface)
        } else {
            self.paint_over(&self.glyphs.future, palette.empty, surface)
        }
    }

    fn paint(&self, text: &str, color: Rgba) -> String {
        self.paint_over(text, color, theme::BACKGROUND)
    }

    fn paint_over(&self, text: &str, color: Rgba, surface: Rgba) -> String {
        if !self.color {
            return text.to_string();
        }
        let (r, g, b) = color.over(surface);
        format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m")
    }
}

fn mode_unit_noun(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Month => "the month",
        ViewMode::Year => "the year",
        ViewMode::Life => "a life",
    }
}

/// Human date used in headers and exports.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|h| UnicodeWidthStr::width(h.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:w$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| {
                let padding = w.saturating_sub(visible_width(cell));
                format!("{cell}{}", " ".repeat(padding))
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn visible_width(s: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(s).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::partition::{compute_time_data, generate_dot_cells};

    fn plain_renderer() -> Renderer {
        Renderer::new(&Config::default())
            .expect("renderer")
            .with_color(false)
    }

    #[test]
    fn month_view_lays_out_weeks() {
        let now = NaiveDate::from_ymd_opt(2024, 2, 10).expect("valid date");
        let data = compute_time_data(ViewMode::Month, 1990, now);
        let cells = generate_dot_cells(&data, ViewMode::Month, now);

        let mut buf = Vec::new();
        plain_renderer()
            .write_view(
                &mut buf,
                ViewMode::Month,
                &data,
                &cells,
                Theme::new(DotPreset::Default, BackgroundPreset::None),
            )
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "20 days left this month");
        assert!(lines[1].starts_with("Month 31.0%"));
        assert_eq!(lines[2], "");
        // 29 days in rows of 7
        assert_eq!(lines.len(), 3 + 5);
        assert_eq!(lines[3], "● ● ● ● ● ● ●");
        assert_eq!(lines[4], "● ● ◉ · · · ·");
        assert_eq!(lines[7], "·");
    }

    #[test]
    fn summary_is_one_line() {
        let now = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
        let data = compute_time_data(ViewMode::Year, 1990, now);
        let mut buf = Vec::new();
        plain_renderer().write_summary(&mut buf, &data).expect("render");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "365 days left this year (0.0%)\n"
        );
    }

    #[test]
    fn colored_output_uses_truecolor() {
        let renderer = plain_renderer().with_color(true);
        let painted = renderer.paint("x", DotPreset::Rose.palette().today);
        assert_eq!(painted, "\x1b[38;2;229;115;115mx\x1b[0m");
        assert_eq!(strip_ansi(&painted), "x");
    }

    fn colored_month_view(cfg: &Config, theme: Theme) -> String {
        let now = NaiveDate::from_ymd_opt(2024, 2, 10).expect("valid date");
        let data = compute_time_data(ViewMode::Month, 1990, now);
        let cells = generate_dot_cells(&data, ViewMode::Month, now);
        let mut buf = Vec::new();
        Renderer::new(cfg)
            .expect("renderer")
            .with_color(true)
            .write_view(&mut buf, ViewMode::Month, &data, &cells, theme)
            .expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn background_changes_blended_dots() {
        let cfg = Config::default();
        let plain = colored_month_view(&cfg, Theme::new(DotPreset::Default, BackgroundPreset::None));
        let night = colored_month_view(&cfg, Theme::new(DotPreset::Default, BackgroundPreset::Stars));

        assert!(plain.contains("\x1b[38;2;140;140;140m●"), "{plain}");
        assert!(night.contains("\x1b[38;2;144;144;151m●"), "{night}");
        assert_eq!(strip_ansi(&plain), strip_ansi(&night));
    }

    #[test]
    fn config_colors_override_preset() {
        let mut cfg = Config::default();
        cfg.set("color.today", "#FF0000");
        cfg.set("color.passed", "rgba(255, 0, 0, 0.5)");
        let text = colored_month_view(&cfg, Theme::new(DotPreset::Ocean, BackgroundPreset::None));

        assert!(text.contains("\x1b[38;2;255;0;0m◉"), "{text}");
        assert!(text.contains("\x1b[38;2;128;0;0m●"), "{text}");
        assert!(text.contains("\x1b[38;2;255;0;0m20\x1b[0m days left"));
    }

    #[test]
    fn unparseable_config_color_is_rejected() {
        let mut cfg = Config::default();
        cfg.set("color.today", "red");
        let err = Renderer::new(&cfg).expect_err("bad color");
        assert!(format!("{err:#}").contains("color.today"));
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let mut cfg = Config::default();
        cfg.set("color", "sometimes");
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn table_pads_to_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Key".to_string(), "Value".to_string()],
            vec![vec!["birth_year".to_string(), "1990".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "Key        Value\n---------- -----\nbirth_year 1990\n"
        );
    }
}
