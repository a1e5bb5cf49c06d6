use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{check_opacity, ConfigError, Result, Rgb};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FontStyle: u8 {
        const BOLD   = 0b0000_0001;
        const ITALIC = 0b0000_0010;
    }
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        let mut style = FontStyle::empty();
        style.set(FontStyle::BOLD, bold);
        style.set(FontStyle::ITALIC, italic);
        style
    }

    pub fn is_bold(self) -> bool {
        self.contains(FontStyle::BOLD)
    }

    pub fn is_italic(self) -> bool {
        self.contains(FontStyle::ITALIC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextWatermark {
    pub content: String,
    pub font_family: String,
    /// Pixel height of the em box.
    pub size: f32,
    pub style: FontStyle,
    pub color: Rgb,
    /// Percentage, 0 is invisible and 100 fully opaque.
    pub opacity: f32,
}

impl Default for TextWatermark {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_family: "Arial".to_string(),
            size: 24.0,
            style: FontStyle::empty(),
            color: Rgb::BLACK,
            opacity: 100.0,
        }
    }
}

impl TextWatermark {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_opacity(self.opacity)?;
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(ConfigError::FontSize(self.size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageWatermark {
    pub source_path: PathBuf,
    /// Percentage of the watermark's own size; 100 draws it unscaled.
    #[serde(default = "hundred")]
    pub scale: f32,
    #[serde(default = "hundred")]
    pub opacity: f32,
}

fn hundred() -> f32 {
    100.0
}

impl ImageWatermark {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            scale: 100.0,
            opacity: 100.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_opacity(self.opacity)?;
        if !(self.scale.is_finite() && self.scale >= 0.0) {
            return Err(ConfigError::Scale(self.scale));
        }
        Ok(())
    }
}

/// The single watermark drawn by one render call.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkSpec {
    Text(TextWatermark),
    Image(ImageWatermark),
}

impl WatermarkSpec {
    pub fn opacity(&self) -> f32 {
        match self {
            WatermarkSpec::Text(text) => text.opacity,
            WatermarkSpec::Image(image) => image.opacity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            WatermarkSpec::Text(text) => text.validate(),
            WatermarkSpec::Image(image) => image.validate(),
        }
    }
}

/// Persisted form where both a text and an image watermark may be
/// configured at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub text: TextWatermark,
    pub image: Option<ImageWatermark>,
}

impl WatermarkSettings {
    /// An image watermark wins over text; empty text means nothing to draw.
    pub fn active(&self) -> Option<WatermarkSpec> {
        if let Some(image) = &self.image {
            return Some(WatermarkSpec::Image(image.clone()));
        }
        if self.text.content.is_empty() {
            None
        } else {
            Some(WatermarkSpec::Text(self.text.clone()))
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.text.validate()?;
        if let Some(image) = &self.image {
            image.validate()?;
        }
        Ok(())
    }
}
