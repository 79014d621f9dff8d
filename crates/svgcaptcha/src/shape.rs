//! Path primitives and the Bezier arithmetic behind the curve mutations.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Points};
use svgcaptcha_common::CaptchaError;

/// A line segment, quadratic curve, or cubic curve.
///
/// The degree follows from the variant, and the variant from the point
/// count when decoding (`[[x, y], ...]` with 2, 3 or 4 points).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub enum Shape {
    Line([Point; 2]),
    /// start, control, end
    Quad([Point; 3]),
    /// start, control 1, control 2, end
    Cubic([Point; 4]),
}

impl TryFrom<Vec<Point>> for Shape {
    type Error = CaptchaError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Shape::from_points(&points)
    }
}

impl From<Shape> for Vec<Point> {
    fn from(shape: Shape) -> Self {
        shape.points().to_vec()
    }
}

impl Shape {
    pub fn from_points(points: &[Point]) -> Result<Self, CaptchaError> {
        match *points {
            [a, b] => Ok(Self::Line([a, b])),
            [a, b, c] => Ok(Self::Quad([a, b, c])),
            [a, b, c, d] => Ok(Self::Cubic([a, b, c, d])),
            _ => Err(CaptchaError::InvalidArgument(format!(
                "a shape needs 2, 3 or 4 points, got {}",
                points.len()
            ))),
        }
    }

    pub fn points(&self) -> &[Point] {
        match self {
            Self::Line(p) => p,
            Self::Quad(p) => p,
            Self::Cubic(p) => p,
        }
    }

    pub fn points_mut(&mut self) -> &mut [Point] {
        match self {
            Self::Line(p) => p,
            Self::Quad(p) => p,
            Self::Cubic(p) => p,
        }
    }

    pub fn start(&self) -> Point {
        self.points()[0]
    }

    pub fn end(&self) -> Point {
        let pts = self.points();
        pts[pts.len() - 1]
    }

    pub fn is_curve(&self) -> bool {
        !matches!(self, Self::Line(_))
    }

    /// Point at parameter `t` in [0, 1]
    pub fn evaluate(&self, t: f64) -> Point {
        let mut work: Vec<Point> = self.points().to_vec();
        while work.len() > 1 {
            work = work.windows(2).map(|w| w[0].lerp(w[1], t)).collect();
        }
        work[0]
    }

    /// Rewrite a quadratic as the identical cubic.
    ///
    /// Controls go to 1/3 P1 + 2/3 P2 and 1/3 P3 + 2/3 P2. Any other shape
    /// yields `None`.
    pub fn elevate(&self) -> Option<Shape> {
        let Self::Quad([p1, p2, p3]) = *self else {
            return None;
        };
        let third = |a: Point, b: Point| {
            Point::new(a.x / 3.0 + 2.0 * b.x / 3.0, a.y / 3.0 + 2.0 * b.y / 3.0)
        };
        Some(Self::Cubic([p1, third(p1, p2), third(p3, p2), p3]))
    }

    /// Split a curve at `t` into two curves of the same degree tracing the
    /// same path. The right half runs from the split point to the end.
    pub fn split(&self, t: f64) -> Result<(Shape, Shape), CaptchaError> {
        if !self.is_curve() {
            return Err(CaptchaError::InvalidArgument(
                "only quadratic and cubic curves can be split".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&t) {
            return Err(CaptchaError::InvalidArgument(format!(
                "split parameter {t} outside [0, 1]"
            )));
        }

        let mut left = Vec::with_capacity(4);
        let mut right = Vec::with_capacity(4);
        de_casteljau(self.points(), t, &mut left, &mut right);
        right.reverse();

        Ok((Shape::from_points(&left)?, Shape::from_points(&right)?))
    }

    /// Replace a curve by `segments` lines through evenly spaced samples
    pub fn approximate(&self, segments: usize) -> Result<Vec<Shape>, CaptchaError> {
        if !self.is_curve() {
            return Err(CaptchaError::InvalidArgument(
                "only quadratic and cubic curves can be approximated".to_string(),
            ));
        }
        if segments == 0 {
            return Err(CaptchaError::InvalidArgument(
                "approximation needs at least one segment".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(segments);
        let mut last = self.start();
        for i in 1..=segments {
            let next = self.evaluate(i as f64 / segments as f64);
            lines.push(Shape::Line([last, next]));
            last = next;
        }
        Ok(lines)
    }
}

/// Recursive linear interpolation. Each level contributes its first point to
/// `left` and its last point to `right` (which therefore comes out reversed).
fn de_casteljau(points: &[Point], t: f64, left: &mut Vec<Point>, right: &mut Vec<Point>) {
    if let [only] = points {
        left.push(*only);
        right.push(*only);
        return;
    }
    left.push(points[0]);
    right.push(points[points.len() - 1]);
    let next: Vec<Point> = points.windows(2).map(|w| w[0].lerp(w[1], t)).collect();
    de_casteljau(&next, t, left, right);
}

impl Points for Shape {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        for p in self.points_mut() {
            f(p);
        }
    }
}
