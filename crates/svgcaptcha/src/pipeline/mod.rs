//! The distortion pipeline.
//!
//! Stages run in a fixed order, each toggled by the profile:
//!
//! ```text
//! select & pack -> normalize scale -> affine transforms -> offsetting
//!   -> fragments -> flatten & shuffle -> shapeify
//!   -> change degree -> split curves -> approximate -> shuffle -> serialize
//! ```
//!
//! Shape order is shuffled with a fast non-cryptographic generator seeded
//! from the secure stream. Order is visual noise, not a secret: the answer
//! and every geometric parameter still come from [`SecureRandom`].

mod layout;
mod mutate;
mod noise;

use rand::seq::SliceRandom;

use svgcaptcha_common::{CaptchaError, CaptchaResult};

use crate::geometry::{Point, Points};
use crate::glyph::{Glyph, GlyphCatalog};
use crate::profile::DifficultyProfile;
use crate::random::SecureRandom;
use crate::serializer::{self, SvgTemplate};
use crate::shape::Shape;

/// One glyph (or fragment) while it moves through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphLayer {
    /// `None` for injected fragments
    pub id: Option<char>,
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
}

impl From<&Glyph> for GlyphLayer {
    fn from(glyph: &Glyph) -> Self {
        Self {
            id: Some(glyph.id),
            width: glyph.width,
            height: glyph.height,
            shapes: glyph.shapes.clone(),
        }
    }
}

impl Points for GlyphLayer {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        self.shapes.for_each_point(f);
    }
}

/// A parameterized generator for one kind of request.
///
/// Cheap to build: construct one per request rather than caching it, so a
/// request never inherits another request's settings.
#[derive(Debug, Clone)]
pub struct CaptchaGenerator<'c> {
    catalog: &'c GlyphCatalog,
    profile: DifficultyProfile,
    glyph_count: usize,
    width: u32,
    height: u32,
    template: SvgTemplate,
}

impl<'c> CaptchaGenerator<'c> {
    pub fn new(
        catalog: &'c GlyphCatalog,
        profile: DifficultyProfile,
        glyph_count: usize,
        width: u32,
        height: u32,
    ) -> Result<Self, CaptchaError> {
        if glyph_count == 0 {
            return Err(CaptchaError::InvalidArgument(
                "a captcha needs at least one glyph".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(CaptchaError::InvalidArgument(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        profile.validate()?;

        Ok(Self {
            catalog,
            profile,
            glyph_count,
            width,
            height,
            template: SvgTemplate::default(),
        })
    }

    pub fn with_template(mut self, template: SvgTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    /// Generate with a fresh OS-backed RNG context
    pub fn generate(&self) -> Result<CaptchaResult, CaptchaError> {
        let mut rng = SecureRandom::new();
        self.generate_with(&mut rng)
    }

    /// Generate with a caller-supplied RNG context.
    ///
    /// Any error aborts the whole generation; no partial markup escapes.
    pub fn generate_with(&self, rng: &mut SecureRandom) -> Result<CaptchaResult, CaptchaError> {
        let profile = &self.profile;
        let image_height = f64::from(self.height);
        let mut canvas_width = f64::from(self.width);

        let selected = self.catalog.select(self.glyph_count, rng)?;
        let answer: String = selected.iter().map(|g| g.id).collect();
        let mut layers: Vec<GlyphLayer> = selected.into_iter().map(GlyphLayer::from).collect();
        tracing::debug!(glyphs = layers.len(), "Selected glyphs");

        layout::normalize_scale(&mut layers, image_height)?;

        if profile.transformations.apply {
            layout::transform_glyphs(&mut layers, &profile.transformations, rng)?;
        }

        if profile.glyph_offsetting.apply {
            let laid_out =
                layout::offset_glyphs(&mut layers, &profile.glyph_offsetting, image_height, rng)?;
            if let Some(width) = laid_out {
                canvas_width = width;
            }
        }

        if profile.glyph_fragments.apply {
            noise::glyph_fragments(
                &mut layers,
                &profile.glyph_fragments,
                canvas_width,
                image_height,
                rng,
            )?;
        }

        let mut shapes: Vec<Shape> = layers.into_iter().flat_map(|l| l.shapes).collect();
        let mut shuffler = rng.fast_rng()?;
        shapes.shuffle(&mut shuffler);

        if profile.shapeify.apply {
            shapes.extend(noise::shapeify(&profile.shapeify, canvas_width, image_height, rng)?);
        }

        if profile.change_degree.apply {
            mutate::change_degree(&mut shapes, profile.change_degree.p, rng)?;
        }
        if profile.split_curve.apply {
            shapes = mutate::split_curves(shapes, profile.split_curve.p, rng)?;
        }
        if profile.approx_shapes.apply {
            shapes = mutate::approximate_shapes(shapes, &profile.approx_shapes, rng)?;
        }

        shapes.shuffle(&mut shuffler);

        let path = serializer::path_data(&shapes, rng)?;
        let view_box = serializer::view_box(&shapes, canvas_width, image_height);
        let markup = self.template.render(self.width, self.height, &view_box, &path);

        let degraded_randomness = rng.is_degraded();
        if degraded_randomness {
            tracing::warn!(
                secure_draws = rng.secure_draws(),
                "Captcha generated with degraded randomness"
            );
        }
        tracing::debug!(
            shapes = shapes.len(),
            canvas_width,
            bytes = markup.len(),
            "Generated captcha"
        );

        Ok(CaptchaResult {
            answer,
            markup,
            degraded_randomness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ByteSource;
    use svgcaptcha_common::constants::MAX_SECURE_DRAWS;

    struct Saturated;

    impl ByteSource for Saturated {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), CaptchaError> {
            buf.fill(0xFF);
            Ok(())
        }
    }

    struct Unplugged;

    impl ByteSource for Unplugged {
        fn fill(&mut self, _buf: &mut [u8]) -> Result<(), CaptchaError> {
            Err(CaptchaError::EntropySource("no entropy device".to_string()))
        }
    }

    fn path_attr(markup: &str) -> &str {
        let start = markup.find(" d=\"").unwrap() + 4;
        let len = markup[start..].find('"').unwrap();
        &markup[start..start + len]
    }

    #[test]
    fn test_new_rejects_bad_arguments() {
        let catalog = GlyphCatalog::builtin();
        let easy = DifficultyProfile::easy();
        assert!(CaptchaGenerator::new(catalog, easy, 0, 150, 80).is_err());
        assert!(CaptchaGenerator::new(catalog, easy, 4, 0, 80).is_err());

        let mut broken = easy;
        broken.split_curve.p = 0;
        assert!(matches!(
            CaptchaGenerator::new(catalog, broken, 4, 150, 80),
            Err(CaptchaError::Profile(_))
        ));
    }

    #[test]
    fn test_every_profile_generates() {
        let catalog = GlyphCatalog::builtin();
        for (seed, profile) in [
            DifficultyProfile::easy(),
            DifficultyProfile::medium(),
            DifficultyProfile::hard(),
        ]
        .into_iter()
        .enumerate()
        {
            let generator = CaptchaGenerator::new(catalog, profile, 5, 200, 90).unwrap();
            for round in 0..10 {
                let mut rng = SecureRandom::seeded((seed * 100 + round) as u64);
                let result = generator.generate_with(&mut rng).unwrap();
                assert_eq!(result.answer.chars().count(), 5);
                assert!(path_attr(&result.markup).starts_with('M'));
                assert!(!result.degraded_randomness);
            }
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let generator =
            CaptchaGenerator::new(GlyphCatalog::builtin(), DifficultyProfile::hard(), 4, 150, 80)
                .unwrap();
        let a = generator.generate_with(&mut SecureRandom::seeded(7)).unwrap();
        let b = generator.generate_with(&mut SecureRandom::seeded(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_stages_off_keeps_glyph_outlines() {
        let mut profile = DifficultyProfile::easy();
        profile.glyph_offsetting.apply = false;
        profile.glyph_fragments.apply = false;
        profile.transformations.apply = false;
        profile.approx_shapes.apply = false;
        profile.change_degree.apply = false;
        profile.split_curve.apply = false;
        profile.shapeify.apply = false;

        let catalog = GlyphCatalog::builtin();
        let generator = CaptchaGenerator::new(catalog, profile, 1, 150, 80).unwrap();
        let result = generator.generate_with(&mut SecureRandom::seeded(8)).unwrap();

        let glyph = catalog.get(result.answer.chars().next().unwrap()).unwrap();
        let d = path_attr(&result.markup);
        let drawn = d.chars().filter(|c| matches!(c, 'L' | 'Q' | 'C')).count();
        assert_eq!(drawn, glyph.shapes.len());
    }

    #[test]
    fn test_degraded_randomness_is_reported() {
        let generator =
            CaptchaGenerator::new(GlyphCatalog::builtin(), DifficultyProfile::easy(), 4, 150, 80)
                .unwrap();
        let mut rng = SecureRandom::with_source(Saturated);
        let result = generator.generate_with(&mut rng).unwrap();
        assert!(result.degraded_randomness);
        assert!(result.ensure_secure().is_err());
    }

    #[test]
    fn test_failing_source_is_queried_a_bounded_number_of_times() {
        let generator =
            CaptchaGenerator::new(GlyphCatalog::builtin(), DifficultyProfile::easy(), 4, 150, 80)
                .unwrap();
        let mut rng = SecureRandom::with_source(Unplugged);
        let result = generator.generate_with(&mut rng).unwrap();

        assert!(result.degraded_randomness);
        assert_eq!(result.answer.chars().count(), 4);
        assert_eq!(rng.source_failures(), u64::from(MAX_SECURE_DRAWS));
    }

    #[test]
    fn test_custom_template_is_used() {
        let template = SvgTemplate::custom(r#"<svg><path d="{{pathdata}}"/></svg>"#).unwrap();
        let generator =
            CaptchaGenerator::new(GlyphCatalog::builtin(), DifficultyProfile::easy(), 3, 150, 80)
                .unwrap()
                .with_template(template);
        let result = generator.generate_with(&mut SecureRandom::seeded(9)).unwrap();
        assert!(result.markup.starts_with("<svg><path d=\"M"));
    }
}
