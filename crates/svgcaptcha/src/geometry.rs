//! 2D points and the affine operators applied to them.
//!
//! Operators mutate points in place. [`Points`] is the visitor that walks any
//! container of points (a point, a shape, a glyph, or slices of those) so one
//! transform can be applied uniformly without touching the structure around it.

use serde::{Deserialize, Serialize};
use std::fmt;

use svgcaptcha_common::CaptchaError;

/// A point in image space (y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// (x, y) = (cos(a)x - sin(a)y, sin(a)x + cos(a)y)
    pub fn rotate(&mut self, a: f64) {
        let (sin, cos) = a.sin_cos();
        let (x, y) = (self.x, self.y);
        self.x = cos * x - sin * y;
        self.y = sin * x + cos * y;
    }

    /// (x, y) = (x + sin(a)y, y)
    pub fn skew(&mut self, a: f64) {
        self.x += a.sin() * self.y;
    }

    /// Uniform scale about the origin
    pub fn scale(&mut self, s: f64) {
        self.x *= s;
        self.y *= s;
    }

    /// Horizontal shear (x + mh*y, y) or vertical shear (x, y + mv*x).
    /// Exactly one axis may be sheared at a time.
    pub fn shear(&mut self, mh: f64, mv: f64) -> Result<(), CaptchaError> {
        check_shear(mh, mv)?;
        self.shear_unchecked(mh, mv);
        Ok(())
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Linear interpolation: `self` at t = 0, `other` at t = 1
    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(
            (1.0 - t) * self.x + t * other.x,
            (1.0 - t) * self.y + t * other.y,
        )
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn shear_unchecked(&mut self, mh: f64, mv: f64) {
        let (x, y) = (self.x, self.y);
        self.x = x + mh * y;
        self.y = y + mv * x;
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point(x={}, y={})", self.x, self.y)
    }
}

fn check_shear(mh: f64, mv: f64) -> Result<(), CaptchaError> {
    if mh != 0.0 && mv != 0.0 {
        return Err(CaptchaError::InvalidArgument(format!(
            "shear along both axes at once (mh: {mh}, mv: {mv})"
        )));
    }
    Ok(())
}

/// One affine operator with its arguments bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Rotate(f64),
    Skew(f64),
    Scale(f64),
    Shear { mh: f64, mv: f64 },
    Translate { dx: f64, dy: f64 },
}

impl Transform {
    pub fn validate(&self) -> Result<(), CaptchaError> {
        match *self {
            Self::Shear { mh, mv } => check_shear(mh, mv),
            _ => Ok(()),
        }
    }

    fn apply(&self, p: &mut Point) {
        match *self {
            Self::Rotate(a) => p.rotate(a),
            Self::Skew(a) => p.skew(a),
            Self::Scale(s) => p.scale(s),
            Self::Shear { mh, mv } => p.shear_unchecked(mh, mv),
            Self::Translate { dx, dy } => p.translate(dx, dy),
        }
    }
}

/// Anything that owns points
pub trait Points {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point));
}

impl Points for Point {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        f(self);
    }
}

impl<T: Points> Points for [T] {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        for item in self.iter_mut() {
            item.for_each_point(f);
        }
    }
}

impl<T: Points> Points for Vec<T> {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        self.as_mut_slice().for_each_point(f);
    }
}

/// Apply `transform` to every point reachable from `target`.
///
/// The transform is validated once up front, so a rejected transform leaves
/// every point untouched.
pub fn on_points<P: Points + ?Sized>(target: &mut P, transform: Transform) -> Result<(), CaptchaError> {
    transform.validate()?;
    target.for_each_point(&mut |p| transform.apply(p));
    Ok(())
}

/// Axis-aligned bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn include(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}
