//! # svgcaptcha
//!
//! Captcha synthesis engine. Renders a short random string as a single
//! obfuscated SVG path and returns the expected answer with the markup.
//!
//! ## Modules
//! - `random` - Pooled rejection sampling over a secure byte source
//! - `geometry` - Points, affine operators and the point visitor
//! - `shape` - Lines, quadratic and cubic curves, Bezier arithmetic
//! - `glyph` - The glyph catalog
//! - `profile` - Difficulty profiles
//! - `pipeline` - The distortion pipeline and [`CaptchaGenerator`]
//! - `serializer` - Path data and the SVG template
//!
//! ```no_run
//! use svgcaptcha::{DifficultyProfile, generate};
//!
//! let captcha = generate(&DifficultyProfile::easy(), 4, 150, 80)?;
//! println!("{} -> {} bytes", captcha.answer, captcha.markup.len());
//! # Ok::<(), svgcaptcha::CaptchaError>(())
//! ```

pub mod geometry;
pub mod glyph;
pub mod pipeline;
pub mod profile;
pub mod random;
pub mod serializer;
pub mod shape;

pub use glyph::{Glyph, GlyphCatalog};
pub use pipeline::CaptchaGenerator;
pub use profile::{DifficultyProfile, StageToggles};
pub use random::SecureRandom;
pub use serializer::{SvgTemplate, to_data_uri};
pub use svgcaptcha_common::{CaptchaDifficulty, CaptchaError, CaptchaResult};

/// Generate one captcha from the built-in catalog with a fresh RNG context.
///
/// `glyph_count` above the catalog size is clamped. `width` and `height`
/// are written verbatim into the markup.
pub fn generate(
    profile: &DifficultyProfile,
    glyph_count: usize,
    width: u32,
    height: u32,
) -> Result<CaptchaResult, CaptchaError> {
    CaptchaGenerator::new(GlyphCatalog::builtin(), *profile, glyph_count, width, height)?.generate()
}
