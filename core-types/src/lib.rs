use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod export;
pub mod placement;
pub mod watermark;

pub use export::{ExportFormat, ExportSpec, NamingPolicy, ResizeSpec};
pub use placement::{Anchor, PlacementSpec, EDGE_PADDING_PX};
pub use watermark::{FontStyle, ImageWatermark, TextWatermark, WatermarkSettings, WatermarkSpec};

/// Rejected configuration values. Raised when a config is built or loaded,
/// never from inside rendering.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("opacity must be within 0..=100, got {0}")]
    Opacity(f32),

    #[error("image scale must be a non-negative percentage, got {0}")]
    Scale(f32),

    #[error("JPEG quality must be within 0..=100, got {0}")]
    Quality(u8),

    #[error("rotation must be a finite number of degrees, got {0}")]
    Rotation(f32),

    #[error("font size must be positive, got {0}")]
    FontSize(f32),

    #[error("invalid resize: {0}")]
    Resize(String),

    #[error("invalid color '{0}', expected #RRGGBB")]
    Color(String),

    #[error("unknown {kind} '{value}'")]
    UnknownToken { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub(crate) fn check_opacity(opacity: f32) -> Result<()> {
    if opacity.is_finite() && (0.0..=100.0).contains(&opacity) {
        Ok(())
    } else {
        Err(ConfigError::Opacity(opacity))
    }
}

/// Opaque sRGB color, serialized as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .unwrap_or(trimmed);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::Color(s.to_string()));
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| ConfigError::Color(s.to_string()))?;
        Ok(Rgb {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Downscaled composite handed to a display collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major.
    pub data: Vec<u8>,
}

/// Everything needed for one compositing call. Rebuilt from the current
/// driver state for every preview tick and export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub watermark: WatermarkSettings,
    #[serde(default)]
    pub placement: PlacementSpec,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        self.watermark.validate()?;
        self.placement.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!("#FF8000".parse::<Rgb>().unwrap(), Rgb::new(255, 128, 0));
        assert_eq!("00ff00".parse::<Rgb>().unwrap(), Rgb::new(0, 255, 0));
        assert_eq!("0x0000FF".parse::<Rgb>().unwrap(), Rgb::new(0, 0, 255));
        assert!("#FFF".parse::<Rgb>().is_err());
        assert!("#GGGGGG".parse::<Rgb>().is_err());
    }

    #[test]
    fn color_serializes_as_hex_string() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 255)).unwrap();
        assert_eq!(json, "\"#0102FF\"");
        let back: Rgb = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgb::new(1, 2, 255));
    }

    #[test]
    fn default_render_config_is_valid() {
        RenderConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn render_config_loads_from_partial_json() {
        let cfg: RenderConfig =
            serde_json::from_str(r#"{"placement":{"anchor":"BOTTOM_RIGHT"}}"#).unwrap();
        assert_eq!(cfg.placement.anchor, Anchor::BottomRight);
        assert_eq!(cfg.watermark, WatermarkSettings::default());
    }
}
