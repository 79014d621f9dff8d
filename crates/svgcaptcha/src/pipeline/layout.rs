//! Glyph placement: uniform scaling, per-glyph affine distortion, and the
//! left-to-right layout with jittered baselines.

use svgcaptcha_common::CaptchaError;
use svgcaptcha_common::constants::GLYPH_HEIGHT_FRACTION;

use super::GlyphLayer;
use crate::geometry::{Transform, on_points};
use crate::profile::{GlyphOffsetting, Transformations};
use crate::random::SecureRandom;

/// Largest rotation and skew angle, in tenths of a radian
const MAX_ANGLE_TENTHS: i64 = 4;

/// Largest shear factor, in tenths
const MAX_SHEAR_TENTHS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Rotate,
    Skew,
    Scale,
    Shear,
    Translate,
}

/// Scale every glyph so the tallest one spans a fixed fraction of the image.
///
/// Nominal metrics are scaled along with the points so later layout math
/// works on the same scale as the outlines.
pub(crate) fn normalize_scale(layers: &mut [GlyphLayer], image_height: f64) -> Result<(), CaptchaError> {
    let tallest = layers.iter().map(|l| l.height).fold(0.0_f64, f64::max);
    if tallest <= 0.0 {
        return Err(CaptchaError::InvalidArgument(
            "cannot normalize glyphs without height".to_string(),
        ));
    }

    let factor = image_height * GLYPH_HEIGHT_FRACTION / tallest;
    on_points(layers, Transform::Scale(factor))?;
    for layer in layers.iter_mut() {
        layer.width *= factor;
        layer.height *= factor;
    }

    tracing::debug!(factor, tallest, "Normalized glyph scale");
    Ok(())
}

/// Distort each glyph with its own random subset of the enabled operators
pub(crate) fn transform_glyphs(
    layers: &mut [GlyphLayer],
    enabled: &Transformations,
    rng: &mut SecureRandom,
) -> Result<(), CaptchaError> {
    for layer in layers.iter_mut() {
        let transforms = random_transforms(enabled, layer.height, rng)?;
        for transform in &transforms {
            on_points(layer, *transform)?;
        }
        tracing::trace!(glyph = ?layer.id, ?transforms, "Applied affine transforms");
    }
    Ok(())
}

/// A random-size, non-empty subset of the enabled operators, in random
/// order, each with fresh arguments
fn random_transforms(
    enabled: &Transformations,
    glyph_height: f64,
    rng: &mut SecureRandom,
) -> Result<Vec<Transform>, CaptchaError> {
    let operators: Vec<Operator> = [
        (enabled.rotate, Operator::Rotate),
        (enabled.skew, Operator::Skew),
        (enabled.scale, Operator::Scale),
        (enabled.shear, Operator::Shear),
        (enabled.translate, Operator::Translate),
    ]
    .into_iter()
    .filter_map(|(on, op)| on.then_some(op))
    .collect();

    if operators.is_empty() {
        return Ok(Vec::new());
    }

    let keep = rng.uniform(1, operators.len() as i64)? as usize;
    rng.choose_keys(&operators, keep, false)?
        .into_iter()
        .map(|op| random_transform(op, glyph_height, rng))
        .collect()
}

fn random_transform(
    op: Operator,
    glyph_height: f64,
    rng: &mut SecureRandom,
) -> Result<Transform, CaptchaError> {
    let transform = match op {
        Operator::Rotate => Transform::Rotate(signed_tenths(MAX_ANGLE_TENTHS, rng)?),
        Operator::Skew => Transform::Skew(signed_tenths(MAX_ANGLE_TENTHS, rng)?),
        Operator::Scale => Transform::Scale(rng.uniform(8, 13)? as f64 / 10.0),
        Operator::Shear => {
            let factor = signed_tenths(MAX_SHEAR_TENTHS, rng)?;
            if rng.coin()? {
                Transform::Shear { mh: factor, mv: 0.0 }
            } else {
                Transform::Shear { mh: 0.0, mv: factor }
            }
        }
        Operator::Translate => {
            let reach = (glyph_height / 10.0).max(0.0) as i64;
            Transform::Translate {
                dx: signed(rng.uniform(0, reach)? as f64, rng)?,
                dy: signed(rng.uniform(0, reach)? as f64, rng)?,
            }
        }
    };
    Ok(transform)
}

/// Uniform value in {-max/10, ..., max/10}
pub(crate) fn signed_tenths(max: i64, rng: &mut SecureRandom) -> Result<f64, CaptchaError> {
    let magnitude = rng.uniform(0, max)? as f64 / 10.0;
    signed(magnitude, rng)
}

fn signed(magnitude: f64, rng: &mut SecureRandom) -> Result<f64, CaptchaError> {
    Ok(if rng.coin()? { -magnitude } else { magnitude })
}

/// Lay glyphs out left to right and return the recomputed canvas width.
///
/// The first glyph starts at a third of its own width. Every following
/// advance is drawn between the previous glyph's overlap threshold
/// (`h` times its width) and the current glyph's width, so a glyph never
/// covers more of its predecessor than `h` allows. Baselines are jittered
/// within a band bounded by `v` times the glyph height, starting at the
/// image height divided by `mh` unless that exceeds the band.
pub(crate) fn offset_glyphs(
    layers: &mut [GlyphLayer],
    params: &GlyphOffsetting,
    image_height: f64,
    rng: &mut SecureRandom,
) -> Result<Option<f64>, CaptchaError> {
    let mut advance = 0.0;
    let mut threshold = 0.0_f64;

    for (i, layer) in layers.iter_mut().enumerate() {
        advance += if i == 0 {
            layer.width / 3.0
        } else {
            rng.between(threshold, threshold.max(layer.width))?
        };

        let band = (layer.height * params.v).round();
        let floor = image_height / params.mh;
        let dy = rng.between(if floor > band { 0.0 } else { floor }, band)?;

        on_points(layer, Transform::Translate { dx: advance, dy })?;
        threshold = (layer.width * params.h).round();
    }

    let Some(last) = layers.last() else {
        return Ok(None);
    };
    let padding = rng.between(last.width * params.h, last.width)?;
    let canvas_width = advance + last.width + padding;

    tracing::debug!(canvas_width, glyphs = layers.len(), "Offset glyphs");
    Ok(Some(canvas_width))
}
