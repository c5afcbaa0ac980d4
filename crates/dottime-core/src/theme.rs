//! Cosmetic presets: dot colors, backgrounds and fonts.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

/// App background the dot colors are drawn over.
pub const BACKGROUND: Rgba = Rgba::opaque(0, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Composites `self` over an opaque `base`.
    #[must_use]
    pub fn over(self, base: Rgba) -> (u8, u8, u8) {
        let a = self.a.clamp(0.0, 1.0);
        let mix = |top: u8, bottom: u8| -> u8 {
            (f32::from(top) * a + f32::from(bottom) * (1.0 - a)).round() as u8
        };
        (mix(self.r, base.r), mix(self.g, base.g), mix(self.b, base.b))
    }
}

impl FromStr for Rgba {
    type Err = anyhow::Error;

    /// Accepts `#RRGGBB` and `rgba(r, g, b, a)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(anyhow!("expected #RRGGBB, got: {s}"));
            }
            let channel = |range: std::ops::Range<usize>| {
                u8::from_str_radix(&hex[range], 16)
                    .with_context(|| format!("invalid hex color: {s}"))
            };
            return Ok(Self::opaque(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }

        let inner = s
            .strip_prefix("rgba(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| anyhow!("unrecognized color: {s}"))?;
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        let [r, g, b, a] = parts.as_slice() else {
            return Err(anyhow!("rgba() needs four components: {s}"));
        };
        Ok(Self {
            r: r.parse().with_context(|| format!("invalid red channel in {s}"))?,
            g: g.parse().with_context(|| format!("invalid green channel in {s}"))?,
            b: b.parse().with_context(|| format!("invalid blue channel in {s}"))?,
            a: a.parse().with_context(|| format!("invalid alpha in {s}"))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotPalette {
    pub passed: Rgba,
    pub empty: Rgba,
    pub today: Rgba,
}

/// Colors for one render: the dot palette and the surface under it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub palette: DotPalette,
    pub surface: Rgba,
}

impl Theme {
    pub fn new(dots: DotPreset, background: BackgroundPreset) -> Self {
        Self {
            palette: dots.palette(),
            surface: background.surface(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DotPreset {
    #[default]
    Default,
    Silver,
    Ocean,
    Mint,
    Rose,
    Purple,
}

impl DotPreset {
    pub const ALL: [DotPreset; 6] = [
        DotPreset::Default,
        DotPreset::Silver,
        DotPreset::Ocean,
        DotPreset::Mint,
        DotPreset::Rose,
        DotPreset::Purple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DotPreset::Default => "default",
            DotPreset::Silver => "silver",
            DotPreset::Ocean => "ocean",
            DotPreset::Mint => "mint",
            DotPreset::Rose => "rose",
            DotPreset::Purple => "purple",
        }
    }

    pub fn palette(self) -> DotPalette {
        let white = |a: f32| Rgba { r: 255, g: 255, b: 255, a };
        match self {
            // muted gold accent
            DotPreset::Default => DotPalette {
                passed: white(0.55),
                empty: white(0.08),
                today: Rgba::opaque(0xC9, 0xA9, 0x62),
            },
            DotPreset::Silver => DotPalette {
                passed: white(0.45),
                empty: white(0.06),
                today: Rgba::opaque(0xE8, 0xE8, 0xE8),
            },
            DotPreset::Ocean => DotPalette {
                passed: white(0.45),
                empty: white(0.06),
                today: Rgba::opaque(0x64, 0xB5, 0xF6),
            },
            DotPreset::Mint => DotPalette {
                passed: white(0.45),
                empty: white(0.06),
                today: Rgba::opaque(0x81, 0xC7, 0x84),
            },
            DotPreset::Rose => DotPalette {
                passed: white(0.45),
                empty: white(0.06),
                today: Rgba::opaque(0xE5, 0x73, 0x73),
            },
            DotPreset::Purple => DotPalette {
                passed: white(0.45),
                empty: white(0.06),
                today: Rgba::opaque(0xB3, 0x9D, 0xDB),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundPreset {
    #[default]
    None,
    Aurora,
    Marble,
    Mesh,
    Stars,
    Waves,
    Gold,
    Glass,
}

impl BackgroundPreset {
    pub const ALL: [BackgroundPreset; 8] = [
        BackgroundPreset::None,
        BackgroundPreset::Aurora,
        BackgroundPreset::Marble,
        BackgroundPreset::Mesh,
        BackgroundPreset::Stars,
        BackgroundPreset::Waves,
        BackgroundPreset::Gold,
        BackgroundPreset::Glass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundPreset::None => "none",
            BackgroundPreset::Aurora => "aurora",
            BackgroundPreset::Marble => "marble",
            BackgroundPreset::Mesh => "mesh",
            BackgroundPreset::Stars => "stars",
            BackgroundPreset::Waves => "waves",
            BackgroundPreset::Gold => "gold",
            BackgroundPreset::Glass => "glass",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackgroundPreset::None => "None",
            BackgroundPreset::Aurora => "Aurora",
            BackgroundPreset::Marble => "Marble",
            BackgroundPreset::Mesh => "Ocean",
            BackgroundPreset::Stars => "Night",
            BackgroundPreset::Waves => "Deep",
            BackgroundPreset::Gold => "Warm",
            BackgroundPreset::Glass => "Frost",
        }
    }

    /// Swatch tint; `None` for the plain background.
    pub fn tint(self) -> Option<Rgba> {
        let rgba = |r, g, b, a| Some(Rgba { r, g, b, a });
        match self {
            BackgroundPreset::None => None,
            BackgroundPreset::Aurora => rgba(45, 80, 140, 0.5),
            BackgroundPreset::Marble => rgba(50, 50, 55, 0.7),
            BackgroundPreset::Mesh => rgba(20, 60, 100, 0.5),
            BackgroundPreset::Stars => rgba(10, 10, 30, 0.8),
            BackgroundPreset::Waves => rgba(25, 40, 70, 0.6),
            BackgroundPreset::Gold => rgba(120, 90, 40, 0.4),
            BackgroundPreset::Glass => rgba(80, 80, 100, 0.35),
        }
    }

    /// Opaque color the grid is drawn on: the tint laid over the app background.
    pub fn surface(self) -> Rgba {
        match self.tint() {
            Some(tint) => {
                let (r, g, b) = tint.over(BACKGROUND);
                Rgba::opaque(r, g, b)
            }
            None => BACKGROUND,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontPreset {
    #[default]
    System,
    Inter,
    Roboto,
    Outfit,
    Space,
}

impl FontPreset {
    pub const ALL: [FontPreset; 5] = [
        FontPreset::System,
        FontPreset::Inter,
        FontPreset::Roboto,
        FontPreset::Outfit,
        FontPreset::Space,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FontPreset::System => "system",
            FontPreset::Inter => "inter",
            FontPreset::Roboto => "roboto",
            FontPreset::Outfit => "outfit",
            FontPreset::Space => "space",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FontPreset::System => "System",
            FontPreset::Inter => "Serif",
            FontPreset::Roboto => "Mono",
            FontPreset::Outfit => "Round",
            FontPreset::Space => "Thin",
        }
    }
}

macro_rules! preset_text_impls {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                <$ty>::ALL
                    .into_iter()
                    .find(|preset| preset.as_str() == wanted)
                    .ok_or_else(|| {
                        let names: Vec<&str> = <$ty>::ALL.iter().map(|p| p.as_str()).collect();
                        anyhow!(
                            "unknown {} preset: {s} (expected one of {})",
                            $what,
                            names.join(", ")
                        )
                    })
            }
        }
    };
}

preset_text_impls!(DotPreset, "dot color");
preset_text_impls!(BackgroundPreset, "background");
preset_text_impls!(FontPreset, "font");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_rgba() {
        assert_eq!("#C9A962".parse::<Rgba>().expect("hex"), Rgba::opaque(0xC9, 0xA9, 0x62));
        let rgba: Rgba = "rgba(255, 255, 255, 0.55)".parse().expect("rgba");
        assert_eq!((rgba.r, rgba.g, rgba.b), (255, 255, 255));
        assert!((rgba.a - 0.55).abs() < f32::EPSILON);
        assert!("#12345".parse::<Rgba>().is_err());
        assert!("rgb(1, 2, 3)".parse::<Rgba>().is_err());
    }

    #[test]
    fn alpha_blends_against_background() {
        let passed = DotPreset::Default.palette().passed;
        assert_eq!(passed.over(BACKGROUND), (140, 140, 140));
        let today = DotPreset::Ocean.palette().today;
        assert_eq!(today.over(BACKGROUND), (0x64, 0xB5, 0xF6));
    }

    #[test]
    fn background_surface_is_tint_over_black() {
        assert_eq!(BackgroundPreset::None.surface(), BACKGROUND);
        assert_eq!(BackgroundPreset::Stars.surface(), Rgba::opaque(8, 8, 24));
        let theme = Theme::new(DotPreset::Mint, BackgroundPreset::Gold);
        assert_eq!(theme.palette, DotPreset::Mint.palette());
        assert_eq!(theme.surface, Rgba::opaque(48, 36, 16));
    }

    #[test]
    fn preset_names_parse_back() {
        for preset in DotPreset::ALL {
            assert_eq!(preset.as_str().parse::<DotPreset>().expect("dot"), preset);
        }
        for preset in BackgroundPreset::ALL {
            assert_eq!(preset.to_string().parse::<BackgroundPreset>().expect("bg"), preset);
        }
        assert_eq!(" Roboto ".parse::<FontPreset>().expect("font"), FontPreset::Roboto);
        let err = "neon".parse::<DotPreset>().expect_err("unknown preset");
        assert!(err.to_string().contains("default, silver"));
    }
}
