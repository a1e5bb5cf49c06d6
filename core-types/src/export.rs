use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    /// Extension written for this format, independent of the input's.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Png => f.write_str("PNG"),
            ExportFormat::Jpeg => f.write_str("JPEG"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            _ => Err(ConfigError::UnknownToken {
                kind: "export format",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NamingPolicy {
    #[default]
    Original,
    Prefix,
    Suffix,
}

impl FromStr for NamingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(NamingPolicy::Original),
            "prefix" => Ok(NamingPolicy::Prefix),
            "suffix" => Ok(NamingPolicy::Suffix),
            _ => Err(ConfigError::UnknownToken {
                kind: "naming policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Optional output resize, applied to the composited buffer before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeSpec {
    /// Uniform scale in percent of the source size.
    Percent(f32),
    /// Fit inside the box, keeping the aspect ratio.
    Fit { width: u32, height: u32 },
}

impl ResizeSpec {
    pub fn validate(&self) -> Result<()> {
        match *self {
            ResizeSpec::Percent(pct) if !(pct.is_finite() && pct > 0.0) => Err(
                ConfigError::Resize(format!("percentage must be positive, got {pct}")),
            ),
            ResizeSpec::Fit { width, height } if width == 0 || height == 0 => Err(
                ConfigError::Resize(format!("fit box must be non-empty, got {width}x{height}")),
            ),
            _ => Ok(()),
        }
    }

    /// Target dimensions for an input of `width` x `height`, never below 1px.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = match *self {
            ResizeSpec::Percent(pct) => {
                let factor = f64::from(pct) / 100.0;
                (
                    (f64::from(width) * factor).round(),
                    (f64::from(height) * factor).round(),
                )
            }
            ResizeSpec::Fit {
                width: max_w,
                height: max_h,
            } => {
                let factor = (f64::from(max_w) / f64::from(width.max(1)))
                    .min(f64::from(max_h) / f64::from(height.max(1)));
                (
                    (f64::from(width) * factor).round(),
                    (f64::from(height) * factor).round(),
                )
            }
        };
        ((w as u32).max(1), (h as u32).max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSpec {
    pub format: ExportFormat,
    /// Only used for JPEG output.
    pub jpeg_quality: u8,
    pub naming: NamingPolicy,
    pub prefix: String,
    pub suffix: String,
    pub resize: Option<ResizeSpec>,
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            jpeg_quality: 90,
            naming: NamingPolicy::Original,
            prefix: String::new(),
            suffix: "_watermarked".to_string(),
            resize: None,
        }
    }
}

impl ExportSpec {
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(ConfigError::Quality(self.jpeg_quality));
        }
        if let Some(resize) = &self.resize {
            resize.validate()?;
        }
        Ok(())
    }
}
