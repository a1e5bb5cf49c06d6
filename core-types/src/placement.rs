use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, Result};

/// Fixed margin between a non-custom anchor and the image border.
pub const EDGE_PADDING_PX: i64 = 20;

pub const MAX_ROTATION_DEGREES: f32 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Custom,
}

impl Anchor {
    pub const ALL: [Anchor; 10] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::CenterLeft,
        Anchor::Center,
        Anchor::CenterRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
        Anchor::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::TopLeft => "TOP_LEFT",
            Anchor::TopCenter => "TOP_CENTER",
            Anchor::TopRight => "TOP_RIGHT",
            Anchor::CenterLeft => "CENTER_LEFT",
            Anchor::Center => "CENTER",
            Anchor::CenterRight => "CENTER_RIGHT",
            Anchor::BottomLeft => "BOTTOM_LEFT",
            Anchor::BottomCenter => "BOTTOM_CENTER",
            Anchor::BottomRight => "BOTTOM_RIGHT",
            Anchor::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Anchor::ALL
            .into_iter()
            .find(|anchor| anchor.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownToken {
                kind: "anchor",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSpec {
    pub anchor: Anchor,
    /// Only read when `anchor` is `Custom`.
    pub custom_x: i64,
    pub custom_y: i64,
    /// Degrees, positive turns clockwise.
    pub rotation_degrees: f32,
}

impl Default for PlacementSpec {
    fn default() -> Self {
        Self {
            anchor: Anchor::Center,
            custom_x: 0,
            custom_y: 0,
            rotation_degrees: 0.0,
        }
    }
}

impl PlacementSpec {
    pub fn at(anchor: Anchor) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    pub fn custom(x: i64, y: i64) -> Self {
        Self {
            anchor: Anchor::Custom,
            custom_x: x,
            custom_y: y,
            rotation_degrees: 0.0,
        }
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rotation_degrees.is_finite() {
            return Err(ConfigError::Rotation(self.rotation_degrees));
        }
        Ok(())
    }

    /// Rotation limited to [-180, 180]; NaN collapses to 0.
    pub fn clamped_rotation(&self) -> f32 {
        if self.rotation_degrees.is_nan() {
            return 0.0;
        }
        self.rotation_degrees
            .clamp(-MAX_ROTATION_DEGREES, MAX_ROTATION_DEGREES)
    }
}
