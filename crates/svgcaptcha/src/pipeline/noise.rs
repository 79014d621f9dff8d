//! Noise that carries no answer: glyph fragments and random closed shapes.

use svgcaptcha_common::CaptchaError;

use super::GlyphLayer;
use super::layout::signed_tenths;
use crate::geometry::{Point, Transform, on_points};
use crate::profile::{GlyphFragments, Shapeify, Span};
use crate::random::SecureRandom;
use crate::shape::Shape;

/// Largest fragment rotation, in tenths of a radian
const MAX_FRAGMENT_ANGLE_TENTHS: i64 = 1;

/// Closing starts this many primitives before the end of a random shape
const CLOSING_PRIMITIVES: u32 = 4;

/// Scatter partial copies of random glyphs over the canvas.
///
/// Fragments are inserted in front of the real glyphs as layers without an id.
/// A glyph may be picked more than once.
pub(crate) fn glyph_fragments(
    layers: &mut Vec<GlyphLayer>,
    params: &GlyphFragments,
    canvas_width: f64,
    image_height: f64,
    rng: &mut SecureRandom,
) -> Result<(), CaptchaError> {
    if layers.is_empty() {
        return Ok(());
    }

    let most = layers.len() - 1;
    let count = match params.num_fragments {
        Some(span) => (span.max as usize).min(most),
        None => rng.uniform(0, most as i64)? as usize,
    };

    let candidates: Vec<usize> = (0..layers.len()).collect();
    let picked = rng.choose_keys(&candidates, count, true)?;

    let mut fragments = Vec::with_capacity(picked.len());
    for idx in picked {
        let source = &layers[idx];
        let total = source.shapes.len();
        let take = rng.uniform(0, (total / params.frag_factor as usize) as i64)? as usize;
        let shape_idx: Vec<usize> = rng.choose_keys(&(0..total).collect::<Vec<_>>(), take, false)?;
        let Some(&first) = shape_idx.first() else {
            continue;
        };

        // Push the copy away from the side the fragment's first point sits on
        let rel = source.shapes[first].start().x;
        let dx = if rel <= canvas_width / 2.0 {
            rng.between(rel.abs(), canvas_width)?
        } else {
            -rng.between(0.0, rel.abs())?
        };
        let jitter = rng.uniform(0, (image_height / 5.0) as i64)? as f64;
        let dy = if rng.coin()? { -jitter } else { jitter };
        let angle = signed_tenths(MAX_FRAGMENT_ANGLE_TENTHS, rng)?;

        let mut shapes: Vec<Shape> = shape_idx.iter().map(|&i| source.shapes[i]).collect();
        on_points(&mut shapes, Transform::Translate { dx, dy })?;
        on_points(&mut shapes, Transform::Rotate(angle))?;

        fragments.push(GlyphLayer {
            id: None,
            width: source.width,
            height: source.height,
            shapes,
        });
    }

    tracing::debug!(fragments = fragments.len(), "Injected glyph fragments");
    layers.splice(0..0, fragments);
    Ok(())
}

/// Closed random-walk shapes inside the canvas
pub(crate) fn shapeify(
    params: &Shapeify,
    canvas_width: f64,
    image_height: f64,
    rng: &mut SecureRandom,
) -> Result<Vec<Shape>, CaptchaError> {
    let count = uniform_in(params.num_shapes, rng)?;
    let mut noise = Vec::new();
    for _ in 0..count {
        noise.extend(random_shape(params.num_primitives, canvas_width, image_height, rng)?);
    }
    tracing::debug!(shapes = count, primitives = noise.len(), "Generated noise shapes");
    Ok(noise)
}

/// One closed walk of lines and quadratic curves.
///
/// The last few waypoints are pulled a quarter of the way back toward the
/// start along whichever axis is further off, then a final line closes it.
fn random_shape(
    primitives: Span,
    width: f64,
    height: f64,
    rng: &mut SecureRandom,
) -> Result<Vec<Shape>, CaptchaError> {
    let (w, h) = (width.max(0.0) as i64, height.max(0.0) as i64);
    let point = |rng: &mut SecureRandom| -> Result<Point, CaptchaError> {
        Ok(Point::new(rng.uniform(0, w)? as f64, rng.uniform(0, h)? as f64))
    };

    let start = point(rng)?;
    let ngp = uniform_in(primitives, rng)?;
    let mut previous = start;
    let mut walk = Vec::with_capacity(ngp as usize);

    for j in 0..ngp {
        if j + 1 == ngp {
            walk.push(Shape::Line([previous, start]));
            break;
        }

        let mut next = point(rng)?;
        if j + CLOSING_PRIMITIVES >= ngp {
            let (ax, ay) = ((start.x - next.x).abs(), (start.y - next.y).abs());
            if ax > ay {
                next.x += (start.x - next.x) / 4.0;
            } else {
                next.y += (start.y - next.y) / 4.0;
            }
        }

        if rng.coin()? {
            walk.push(Shape::Line([previous, next]));
        } else {
            walk.push(Shape::Quad([previous, Point::new(previous.x, next.y), next]));
        }
        previous = next;
    }
    Ok(walk)
}

fn uniform_in(span: Span, rng: &mut SecureRandom) -> Result<u32, CaptchaError> {
    Ok(rng.uniform(i64::from(span.min), i64::from(span.max))? as u32)
}
