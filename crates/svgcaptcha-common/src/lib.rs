//! # SVG Captcha Common
//!
//! Shared types, errors, and constants used across the SVG captcha components.
//!
//! ## Modules
//! - `types` - Core data structures (CaptchaDifficulty, CaptchaResult)
//! - `error` - The error taxonomy shared by the engine and its hosts
//! - `constants` - Shared configuration constants

pub mod constants;
pub mod error;
pub mod types;

pub use error::CaptchaError;
pub use types::*;
