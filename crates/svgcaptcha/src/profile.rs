//! Difficulty profiles: which distortion stages run and how hard they push.
//!
//! A profile is resolved once per request. The three canonical profiles are
//! built from the defaults below; a host may instead pass a complete profile
//! of its own, which replaces the canonical one wholesale (no merging).

use serde::{Deserialize, Serialize};

use svgcaptcha_common::{CaptchaDifficulty, CaptchaError};

/// Inclusive integer range, written `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Span {
    pub min: u32,
    pub max: u32,
}

impl Span {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn check(&self, what: &str) -> Result<(), CaptchaError> {
        if self.min > self.max {
            return Err(CaptchaError::Profile(format!(
                "{what}: range [{}, {}] is inverted",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl From<[u32; 2]> for Span {
    fn from([min, max]: [u32; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Span> for [u32; 2] {
    fn from(span: Span) -> Self {
        [span.min, span.max]
    }
}

/// Left-to-right layout with controlled overlap and jittered baselines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlyphOffsetting {
    pub apply: bool,
    /// Minimal advance as a fraction of the previous glyph's width
    pub h: f64,
    /// Maximal vertical displacement as a fraction of the glyph height
    pub v: f64,
    /// Minimal vertical offset, as a divisor of the image height
    pub mh: f64,
}

/// Copies of partial glyphs scattered over the canvas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlyphFragments {
    pub apply: bool,
    /// Upper end is the fragment count; unset means a random count
    pub num_fragments: Option<Span>,
    /// A fragment copies at most `shapes / frag_factor` shapes
    pub frag_factor: u32,
}

/// Which affine operators a glyph may receive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transformations {
    pub apply: bool,
    pub rotate: bool,
    pub skew: bool,
    pub scale: bool,
    pub shear: bool,
    pub translate: bool,
}

impl Transformations {
    pub fn enabled_count(&self) -> usize {
        [self.rotate, self.skew, self.scale, self.shear, self.translate]
            .into_iter()
            .filter(|&on| on)
            .count()
    }
}

/// Curves to lines and lines to near-straight curves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproxShapes {
    pub apply: bool,
    /// Each shape is touched with probability 1/p
    pub p: u32,
    /// How many lines replace a curve
    pub num_lines: Span,
}

/// A mutation applied to each shape with probability 1/p
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub apply: bool,
    pub p: u32,
}

/// Closed random-walk noise shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shapeify {
    pub apply: bool,
    pub num_shapes: Span,
    /// Primitives per noise shape
    pub num_primitives: Span,
}

/// Per-stage enable flags for a custom profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub glyph_offsetting: bool,
    pub glyph_fragments: bool,
    pub transformations: bool,
    pub approx_shapes: bool,
    pub change_degree: bool,
    pub split_curve: bool,
    pub shapeify: bool,
}

impl Default for StageToggles {
    /// Offsetting on, everything else off. Without offsetting every glyph
    /// is drawn on top of the others.
    fn default() -> Self {
        Self {
            glyph_offsetting: true,
            glyph_fragments: false,
            transformations: false,
            approx_shapes: false,
            change_degree: false,
            split_curve: false,
            shapeify: false,
        }
    }
}

/// Per-stage switches and tunables for one generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub glyph_offsetting: GlyphOffsetting,
    pub glyph_fragments: GlyphFragments,
    pub transformations: Transformations,
    pub approx_shapes: ApproxShapes,
    pub change_degree: Trial,
    pub split_curve: Trial,
    pub shapeify: Shapeify,
}

impl Default for DifficultyProfile {
    /// Baseline every canonical profile starts from: layout only.
    fn default() -> Self {
        Self {
            glyph_offsetting: GlyphOffsetting {
                apply: true,
                h: 1.0,
                v: 0.5,
                mh: 8.0,
            },
            glyph_fragments: GlyphFragments {
                apply: false,
                num_fragments: None,
                frag_factor: 2,
            },
            transformations: Transformations {
                apply: false,
                rotate: false,
                skew: false,
                scale: false,
                shear: false,
                translate: false,
            },
            approx_shapes: ApproxShapes {
                apply: false,
                p: 3,
                num_lines: Span::new(10, 30),
            },
            change_degree: Trial { apply: false, p: 5 },
            split_curve: Trial { apply: false, p: 5 },
            shapeify: Shapeify {
                apply: false,
                num_shapes: Span::new(0, 6),
                num_primitives: Span::new(4, 10),
            },
        }
    }
}

impl DifficultyProfile {
    pub fn easy() -> Self {
        let mut p = Self::default();
        p.glyph_fragments.apply = true;
        p.glyph_fragments.num_fragments = Some(Span::new(2, 4));
        p.transformations.apply = true;
        p.transformations.rotate = true;
        p.shapeify = Shapeify {
            apply: false,
            num_shapes: Span::new(0, 4),
            num_primitives: Span::new(2, 4),
        };
        p.approx_shapes = ApproxShapes {
            apply: true,
            p: 5,
            num_lines: Span::new(4, 20),
        };
        p.change_degree = Trial { apply: true, p: 5 };
        p.split_curve.apply = true;
        p
    }

    pub fn medium() -> Self {
        let mut p = Self::default();
        p.transformations.apply = true;
        p.transformations.rotate = true;
        p.transformations.skew = true;
        p.transformations.scale = true;
        p.shapeify = Shapeify {
            apply: true,
            num_shapes: Span::new(4, 5),
            num_primitives: Span::new(3, 4),
        };
        p.approx_shapes = ApproxShapes {
            apply: true,
            p: 3,
            num_lines: Span::new(4, 16),
        };
        p.change_degree = Trial { apply: true, p: 5 };
        p.split_curve.apply = true;
        p
    }

    pub fn hard() -> Self {
        let mut p = Self::default();
        p.transformations = Transformations {
            apply: true,
            rotate: true,
            skew: true,
            scale: true,
            shear: true,
            translate: true,
        };
        p.shapeify = Shapeify {
            apply: true,
            num_shapes: Span::new(3, 8),
            num_primitives: Span::new(3, 5),
        };
        p.approx_shapes = ApproxShapes {
            apply: true,
            p: 2,
            num_lines: Span::new(6, 26),
        };
        p.change_degree = Trial { apply: true, p: 3 };
        p.split_curve.apply = true;
        p
    }

    /// Stage parameters at their custom defaults, switched by `toggles`
    pub fn custom(toggles: StageToggles) -> Self {
        let mut p = Self::default();
        p.glyph_offsetting.apply = toggles.glyph_offsetting;
        p.glyph_fragments.apply = toggles.glyph_fragments;
        p.glyph_fragments.num_fragments = Some(Span::new(0, 6));
        p.transformations = Transformations {
            apply: toggles.transformations,
            rotate: true,
            skew: true,
            scale: true,
            shear: false,
            translate: true,
        };
        p.approx_shapes.apply = toggles.approx_shapes;
        p.change_degree.apply = toggles.change_degree;
        p.split_curve.apply = toggles.split_curve;
        p.shapeify.apply = toggles.shapeify;
        p
    }

    pub fn for_difficulty(difficulty: CaptchaDifficulty) -> Self {
        match difficulty {
            CaptchaDifficulty::Easy => Self::easy(),
            CaptchaDifficulty::Medium => Self::medium(),
            CaptchaDifficulty::Hard => Self::hard(),
        }
    }

    /// Parse a complete profile from JSON
    pub fn from_json(json: &str) -> Result<Self, CaptchaError> {
        let profile: Self =
            serde_json::from_str(json).map_err(|e| CaptchaError::Profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Reject parameters the pipeline cannot honour
    pub fn validate(&self) -> Result<(), CaptchaError> {
        let o = &self.glyph_offsetting;
        if !(o.h.is_finite() && o.h >= 0.0) || !(o.v.is_finite() && o.v >= 0.0) {
            return Err(CaptchaError::Profile(format!(
                "glyph_offsetting: h ({}) and v ({}) must be non-negative",
                o.h, o.v
            )));
        }
        if !(o.mh.is_finite() && o.mh > 0.0) {
            return Err(CaptchaError::Profile(format!(
                "glyph_offsetting: mh ({}) must be positive",
                o.mh
            )));
        }

        if self.glyph_fragments.frag_factor == 0 {
            return Err(CaptchaError::Profile(
                "glyph_fragments: frag_factor must be positive".to_string(),
            ));
        }
        if let Some(span) = self.glyph_fragments.num_fragments {
            span.check("glyph_fragments.num_fragments")?;
        }

        for (name, p) in [
            ("approx_shapes", self.approx_shapes.p),
            ("change_degree", self.change_degree.p),
            ("split_curve", self.split_curve.p),
        ] {
            if p == 0 {
                return Err(CaptchaError::Profile(format!("{name}: p must be at least 1")));
            }
        }

        self.approx_shapes.num_lines.check("approx_shapes.num_lines")?;
        if self.approx_shapes.num_lines.min == 0 {
            return Err(CaptchaError::Profile(
                "approx_shapes.num_lines: a curve needs at least one line".to_string(),
            ));
        }
        self.shapeify.num_shapes.check("shapeify.num_shapes")?;
        self.shapeify.num_primitives.check("shapeify.num_primitives")?;
        if self.shapeify.num_primitives.min < 2 {
            return Err(CaptchaError::Profile(
                "shapeify.num_primitives: a closed shape needs at least two primitives".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<CaptchaDifficulty> for DifficultyProfile {
    fn from(difficulty: CaptchaDifficulty) -> Self {
        Self::for_difficulty(difficulty)
    }
}
