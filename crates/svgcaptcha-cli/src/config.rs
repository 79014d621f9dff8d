//! Configuration management for the svgcaptcha binary.
//!
//! Sources, lowest priority first: built-in defaults, the TOML file,
//! `SVGCAPTCHA__*` environment variables, then command line flags.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use svgcaptcha::{DifficultyProfile, StageToggles};
use svgcaptcha_common::constants::config_keys::{ENV_PREFIX, ENV_SEPARATOR};
use svgcaptcha_common::constants::{
    DEFAULT_ANSWER_TTL_SECS, DEFAULT_GLYPH_COUNT, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use svgcaptcha_common::{CaptchaDifficulty, CaptchaError};

/// Difficulty as configured: a canonical level or the custom stage toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DifficultySetting {
    #[default]
    Easy,
    Medium,
    Hard,
    Custom,
}

impl DifficultySetting {
    pub fn level(&self) -> Option<CaptchaDifficulty> {
        match self {
            Self::Easy => Some(CaptchaDifficulty::Easy),
            Self::Medium => Some(CaptchaDifficulty::Medium),
            Self::Hard => Some(CaptchaDifficulty::Hard),
            Self::Custom => None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Captcha configuration
    #[serde(default)]
    pub captcha: CaptchaSettings,

    /// Worker threads for batch generation (0 = one per core)
    #[serde(default)]
    pub threads: usize,
}

/// Captcha-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaSettings {
    #[serde(default)]
    pub difficulty: DifficultySetting,

    /// Number of glyphs per captcha
    #[serde(default = "default_length")]
    pub length: usize,

    /// Declared image width
    #[serde(default = "default_width")]
    pub width: u32,

    /// Declared image height
    #[serde(default = "default_height")]
    pub height: u32,

    /// Compare answers case-sensitively
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,

    /// Answer validity in seconds
    #[serde(default = "default_answer_ttl")]
    pub answer_ttl_secs: u64,

    /// Stage switches used when `difficulty = "custom"`
    #[serde(default)]
    pub stages: StageToggles,

    /// JSON profile replacing the resolved one entirely
    #[serde(default)]
    pub profile_path: Option<PathBuf>,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            difficulty: DifficultySetting::default(),
            length: default_length(),
            width: default_width(),
            height: default_height(),
            case_sensitive: default_case_sensitive(),
            answer_ttl_secs: default_answer_ttl(),
            stages: StageToggles::default(),
            profile_path: None,
        }
    }
}

// Default value functions
fn default_length() -> usize { DEFAULT_GLYPH_COUNT }
fn default_width() -> u32 { DEFAULT_WIDTH }
fn default_height() -> u32 { DEFAULT_HEIGHT }
fn default_case_sensitive() -> bool { true }
fn default_answer_ttl() -> u64 { DEFAULT_ANSWER_TTL_SECS }

impl CaptchaSettings {
    /// The profile a generation request runs with
    pub fn resolve_profile(&self) -> Result<DifficultyProfile> {
        if let Some(path) = &self.profile_path {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile {}", path.display()))?;
            let profile = DifficultyProfile::from_json(&json)
                .with_context(|| format!("Invalid profile {}", path.display()))?;
            return Ok(profile);
        }

        Ok(match self.difficulty.level() {
            Some(level) => DifficultyProfile::for_difficulty(level),
            None => DifficultyProfile::custom(self.stages),
        })
    }

    pub fn validate(&self) -> Result<(), CaptchaError> {
        if self.length == 0 {
            return Err(CaptchaError::Config("length must be at least 1".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CaptchaError::Config(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let mut config: Self = builder
            .build()
            .context("Failed to load config")?
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        let captcha = &mut config.captcha;
        if let Some(difficulty) = args.difficulty {
            captcha.difficulty = difficulty;
        }
        if let Some(length) = args.length {
            captcha.length = length;
        }
        if let Some(width) = args.width {
            captcha.width = width;
        }
        if let Some(height) = args.height {
            captcha.height = height;
        }
        if args.case_insensitive {
            captcha.case_sensitive = false;
        }
        if let Some(ref profile) = args.profile {
            captcha.profile_path = Some(profile.clone());
        }

        captcha.validate()?;
        Ok(config)
    }
}
