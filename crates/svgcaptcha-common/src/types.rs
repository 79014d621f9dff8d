//! Core types shared across the SVG captcha components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CaptchaError;

/// Canonical difficulty levels.
///
/// - Easy: rotation only, glyph fragments, light curve mutation
/// - Medium: rotation/skew/scale, random noise shapes, moderate mutation
/// - Hard: every affine transformation, more noise, aggressive mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptchaDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl CaptchaDifficulty {
    pub const ALL: [CaptchaDifficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for CaptchaDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptchaDifficulty {
    type Err = CaptchaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(CaptchaError::Config(format!("unknown difficulty '{other}'"))),
        }
    }
}

/// Output of one generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaResult {
    /// Glyph ids in selection order, case as generated
    pub answer: String,

    /// Complete SVG document
    pub markup: String,

    /// Set when any random draw fell back to the non-cryptographic generator
    #[serde(default)]
    pub degraded_randomness: bool,
}

impl CaptchaResult {
    /// Turn degraded randomness into a hard error, for hosts that refuse
    /// to serve a captcha built from weakened randomness.
    pub fn ensure_secure(self) -> Result<Self, CaptchaError> {
        if self.degraded_randomness {
            Err(CaptchaError::DegradedRandomness {
                draws: crate::constants::MAX_SECURE_DRAWS,
            })
        } else {
            Ok(self)
        }
    }
}
