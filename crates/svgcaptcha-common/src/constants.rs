//! Shared constants for the SVG captcha components.

/// Default number of glyphs in a captcha
pub const DEFAULT_GLYPH_COUNT: usize = 4;

/// Default declared image width (pixels)
pub const DEFAULT_WIDTH: u32 = 150;

/// Default declared image height (pixels)
pub const DEFAULT_HEIGHT: u32 = 80;

/// Answer validity in the answer store (1 hour)
pub const DEFAULT_ANSWER_TTL_SECS: u64 = 3600;

/// The tallest selected glyph is scaled to this fraction of the image height
pub const GLYPH_HEIGHT_FRACTION: f64 = 2.0 / 3.0;

/// Consecutive secure draws without an in-range value before falling back
pub const MAX_SECURE_DRAWS: u32 = 50;

/// Decimal digits used for x coordinates in path data (inclusive)
pub const X_PRECISION: (i64, i64) = (3, 6);

/// Decimal digits used for y coordinates in path data (inclusive)
pub const Y_PRECISION: (i64, i64) = (4, 7);

/// Generic message shown to end users whenever generation fails
pub const USER_FACING_FAILURE: &str = "Could not generate captcha, please retry.";

/// Environment and config file names
pub mod config_keys {
    /// Prefix for environment overrides: SVGCAPTCHA__CAPTCHA__LENGTH=6
    pub const ENV_PREFIX: &str = "SVGCAPTCHA";

    /// Separator between nested keys in environment overrides
    pub const ENV_SEPARATOR: &str = "__";

    /// Default configuration file path
    pub const DEFAULT_CONFIG_PATH: &str = "config/svgcaptcha.toml";
}
