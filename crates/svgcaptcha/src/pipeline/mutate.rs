//! Per-shape stochastic rewrites. Each shape gets its own 1/p trial.

use svgcaptcha_common::CaptchaError;

use crate::geometry::Point;
use crate::profile::ApproxShapes;
use crate::random::SecureRandom;
use crate::shape::Shape;

/// Raise quadratic curves to the identical cubic
pub(crate) fn change_degree(
    shapes: &mut [Shape],
    p: u32,
    rng: &mut SecureRandom,
) -> Result<(), CaptchaError> {
    let mut elevated = 0usize;
    for shape in shapes.iter_mut() {
        if !rng.one_in(p)? {
            continue;
        }
        if let Some(cubic) = shape.elevate() {
            *shape = cubic;
            elevated += 1;
        }
    }
    tracing::debug!(elevated, "Changed curve degrees");
    Ok(())
}

/// Split curves in two at a random interior parameter.
///
/// Halves of split curves lead the returned list, untouched shapes follow.
pub(crate) fn split_curves(
    shapes: Vec<Shape>,
    p: u32,
    rng: &mut SecureRandom,
) -> Result<Vec<Shape>, CaptchaError> {
    let mut halves = Vec::new();
    let mut kept = Vec::with_capacity(shapes.len());

    for shape in shapes {
        if rng.one_in(p)? && shape.is_curve() {
            let t = rng.uniform(1, 999)? as f64 / 1000.0;
            let (left, right) = shape.split(t)?;
            halves.push(left);
            halves.push(right);
        } else {
            kept.push(shape);
        }
    }

    tracing::debug!(split = halves.len() / 2, "Split curves");
    halves.extend(kept);
    Ok(halves)
}

/// Replace curves by line chains and lines by near-straight curves.
///
/// Line chains lead the returned list. Curved lines stay where they were.
pub(crate) fn approximate_shapes(
    shapes: Vec<Shape>,
    params: &ApproxShapes,
    rng: &mut SecureRandom,
) -> Result<Vec<Shape>, CaptchaError> {
    let mut chains = Vec::new();
    let mut kept = Vec::with_capacity(shapes.len());
    let mut curved = 0usize;

    for shape in shapes {
        if !rng.one_in(params.p)? {
            kept.push(shape);
            continue;
        }
        match shape {
            Shape::Line([a, b]) => {
                kept.push(curvaceous(a, b, rng)?);
                curved += 1;
            }
            curve => {
                let n = rng.uniform(
                    i64::from(params.num_lines.min),
                    i64::from(params.num_lines.max),
                )?;
                chains.extend(curve.approximate(n as usize)?);
            }
        }
    }

    tracing::debug!(lines = chains.len(), curved, "Approximated shapes");
    chains.extend(kept);
    Ok(chains)
}

/// A quadratic or cubic curve that looks like the segment `a`-`b`.
///
/// Control points sit on the segment, nudged by at most a tenth of its
/// length on each axis.
fn curvaceous(a: Point, b: Point, rng: &mut SecureRandom) -> Result<Shape, CaptchaError> {
    let cubic = rng.coin()?;
    let reach = a.distance(b) / rng.uniform(10, 50)? as f64;
    let mut near = || -> Result<Point, CaptchaError> {
        let t = rng.uniform(0, 1000)? as f64 / 1000.0;
        let mut p = a.lerp(b, t);
        p.x += if rng.coin()? { reach } else { -reach };
        p.y += if rng.coin()? { reach } else { -reach };
        Ok(p)
    };

    if cubic {
        Ok(Shape::Cubic([a, near()?, near()?, b]))
    } else {
        Ok(Shape::Quad([a, near()?, b]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Span;

    fn sample() -> Vec<Shape> {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(60.0, 20.0);
        let c = Point::new(100.0, 80.0);
        vec![
            Shape::Line([a, b]),
            Shape::Quad([a, b, c]),
            Shape::Cubic([a, b, b, c]),
            Shape::Quad([c, b, a]),
        ]
    }

    #[test]
    fn test_change_degree_always() {
        let mut rng = SecureRandom::seeded(41);
        let mut shapes = sample();
        change_degree(&mut shapes, 1, &mut rng).unwrap();
        assert!(matches!(shapes[0], Shape::Line(_)));
        assert!(shapes[1..].iter().all(|s| matches!(s, Shape::Cubic(_))));
    }

    #[test]
    fn test_split_always() {
        let mut rng = SecureRandom::seeded(42);
        let shapes = split_curves(sample(), 1, &mut rng).unwrap();
        // three curves become six halves, the line trails
        assert_eq!(shapes.len(), 7);
        assert!(matches!(shapes[6], Shape::Line(_)));
        for pair in shapes[..6].chunks(2) {
            assert_eq!(pair[0].points().len(), pair[1].points().len());
            assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    #[test]
    fn test_split_never_when_unlucky() {
        let mut rng = SecureRandom::seeded(43);
        let shapes = split_curves(sample(), 1_000_000, &mut rng).unwrap();
        assert_eq!(shapes.len(), 4);
    }

    #[test]
    fn test_approximate_always() {
        let mut rng = SecureRandom::seeded(44);
        let params = ApproxShapes {
            apply: true,
            p: 1,
            num_lines: Span::new(5, 5),
        };
        let shapes = approximate_shapes(sample(), &params, &mut rng).unwrap();
        assert_eq!(shapes.len(), 3 * 5 + 1);
        assert!(shapes[..15].iter().all(|s| matches!(s, Shape::Line(_))));
        assert!(shapes[15].is_curve());
        assert_eq!(shapes[15].start(), Point::new(0.0, 0.0));
        assert_eq!(shapes[15].end(), Point::new(60.0, 20.0));
    }

    #[test]
    fn test_curvaceous_hugs_the_line() {
        let mut rng = SecureRandom::seeded(45);
        let a = Point::new(10.0, 10.0);
        let b = Point::new(110.0, 10.0);
        for _ in 0..100 {
            let curve = curvaceous(a, b, &mut rng).unwrap();
            assert_eq!(curve.start(), a);
            assert_eq!(curve.end(), b);
            for p in &curve.points()[1..curve.points().len() - 1] {
                assert!((p.y - 10.0).abs() <= 10.0 + 1e-9);
                assert!((0.0..=120.0).contains(&p.x));
            }
        }
    }
}
