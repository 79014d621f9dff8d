//! Common error types for the SVG captcha components.

use thiserror::Error;

use crate::constants::USER_FACING_FAILURE;

/// Errors raised while synthesizing a captcha
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// Malformed numeric bounds passed to sampling
    #[error("Invalid range: [{lo}, {hi}]")]
    InvalidRange { lo: i64, hi: i64 },

    /// Malformed shape/curve input, conflicting shear axes, oversized selection
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The secure source exhausted its retry budget and a
    /// non-cryptographic generator was used instead
    #[error("Degraded randomness: no in-range value after {draws} secure draws")]
    DegradedRandomness { draws: u32 },

    /// The operating system entropy source returned an error
    #[error("Entropy source error: {0}")]
    EntropySource(String),

    /// Glyph table failed to parse or validate
    #[error("Glyph catalog error: {0}")]
    Catalog(String),

    /// Difficulty profile failed validation
    #[error("Profile error: {0}")]
    Profile(String),

    /// Host configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptchaError {
    /// Returns true for errors caused by bad input rather than by the environment.
    /// These abort the current generation and are not worth retrying.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::InvalidArgument(_)
                | Self::Catalog(_)
                | Self::Profile(_)
                | Self::Config(_)
        )
    }

    /// Returns true if a fresh attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DegradedRandomness { .. } | Self::EntropySource(_))
    }

    /// The only text that should ever reach an end user
    pub fn user_message(&self) -> &'static str {
        USER_FACING_FAILURE
    }
}
