//! Path-data assembly and the SVG document template.

use base64::{Engine, engine::general_purpose::STANDARD};
use std::borrow::Cow;
use std::fmt::Write;

use svgcaptcha_common::CaptchaError;
use svgcaptcha_common::constants::{X_PRECISION, Y_PRECISION};

use crate::geometry::{Bounds, Point};
use crate::random::SecureRandom;
use crate::shape::Shape;

const DEFAULT_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{{width}}" height="{{height}}" viewBox="{{viewbox}}" version="1.1">
  <style>
    .captcha { fill: none; stroke: #000000; stroke-width: 2px; stroke-linecap: round; stroke-linejoin: miter; stroke-opacity: 1; }
  </style>
  <title>SVGCaptcha</title>
  <path class="captcha" d="{{pathdata}}"/>
</svg>
"#;

const PATHDATA: &str = "{{pathdata}}";

/// Render shapes as one continuous path.
///
/// Every point gets its own random precision (`X_PRECISION` digits for x,
/// `Y_PRECISION` for y). A moveto precedes any shape that does not start at
/// the current pen position, so the first shape always gets one.
pub fn path_data(shapes: &[Shape], rng: &mut SecureRandom) -> Result<String, CaptchaError> {
    let mut out = String::with_capacity(shapes.len() * 48);
    let mut pen: Option<Point> = None;

    for shape in shapes {
        let pts = shape.points();
        if pen != Some(pts[0]) {
            out.push('M');
            push_point(&mut out, pts[0], rng)?;
        }

        out.push(match shape {
            Shape::Line(_) => 'L',
            Shape::Quad(_) => 'Q',
            Shape::Cubic(_) => 'C',
        });
        for &p in &pts[1..] {
            push_point(&mut out, p, rng)?;
        }
        pen = Some(shape.end());
    }

    Ok(out.trim_end().to_string())
}

fn push_point(out: &mut String, p: Point, rng: &mut SecureRandom) -> Result<(), CaptchaError> {
    let xd = rng.uniform(X_PRECISION.0, X_PRECISION.1)? as usize;
    let yd = rng.uniform(Y_PRECISION.0, Y_PRECISION.1)? as usize;
    // Writing to a String cannot fail
    let _ = write!(out, " {:.*} {:.*} ", xd, p.x, yd, p.y);
    Ok(())
}

/// Union of the layout canvas and every control point
pub fn view_box(shapes: &[Shape], canvas_width: f64, canvas_height: f64) -> Bounds {
    let mut bounds = Bounds::new(0.0, 0.0, canvas_width, canvas_height);
    for p in shapes.iter().flat_map(|s| s.points()) {
        bounds.include(*p);
    }
    bounds
}

/// SVG document skeleton with `{{width}}`, `{{height}}`, `{{viewbox}}` and
/// `{{pathdata}}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgTemplate {
    body: Cow<'static, str>,
}

impl Default for SvgTemplate {
    fn default() -> Self {
        Self {
            body: Cow::Borrowed(DEFAULT_TEMPLATE),
        }
    }
}

impl SvgTemplate {
    /// Host-supplied template. Only `{{pathdata}}` is mandatory.
    pub fn custom(body: impl Into<String>) -> Result<Self, CaptchaError> {
        let body = body.into();
        if !body.contains(PATHDATA) {
            return Err(CaptchaError::InvalidArgument(format!(
                "template lacks the {PATHDATA} placeholder"
            )));
        }
        Ok(Self {
            body: Cow::Owned(body),
        })
    }

    /// Plain substitution, no escaping or validation
    pub fn render(&self, width: u32, height: u32, view_box: &Bounds, path: &str) -> String {
        let view_box = format!(
            "{:.3} {:.3} {:.3} {:.3}",
            view_box.min_x,
            view_box.min_y,
            view_box.width(),
            view_box.height()
        );
        self.body
            .replace("{{width}}", &width.to_string())
            .replace("{{height}}", &height.to_string())
            .replace("{{viewbox}}", &view_box)
            .replace(PATHDATA, path)
    }
}

/// `data:` URI for embedding markup in an `<img>` tag
pub fn to_data_uri(markup: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(markup))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn test_path_data_commands_and_moveto() {
        let mut rng = SecureRandom::seeded(51);
        let shapes = vec![
            Shape::Line([p(0.0, 0.0), p(10.0, 10.0)]),
            // continues from the pen: no moveto
            Shape::Quad([p(10.0, 10.0), p(20.0, 0.0), p(30.0, 10.0)]),
            // detached: moveto
            Shape::Cubic([p(50.0, 50.0), p(60.0, 40.0), p(70.0, 40.0), p(80.0, 50.0)]),
        ];
        let d = path_data(&shapes, &mut rng).unwrap();

        assert!(d.starts_with("M "));
        let commands: String = d.chars().filter(|c| c.is_ascii_alphabetic()).collect();
        assert_eq!(commands, "MLQMC");
        // 1 + 1 + 2 + 1 + 3 points
        let numbers = d.split_whitespace().filter(|t| t.parse::<f64>().is_ok()).count();
        assert_eq!(numbers, 16);
    }

    #[test]
    fn test_path_data_precision() {
        let mut rng = SecureRandom::seeded(52);
        let shapes = vec![Shape::Line([p(1.0 / 3.0, 2.0 / 3.0), p(5.0, 7.0)])];
        for _ in 0..50 {
            let d = path_data(&shapes, &mut rng).unwrap();
            let numbers: Vec<&str> = d.split_whitespace().filter(|t| t.contains('.')).collect();
            assert_eq!(numbers.len(), 4);
            for (i, n) in numbers.iter().enumerate() {
                let digits = n.split('.').nth(1).unwrap().len();
                let (lo, hi) = if i % 2 == 0 { X_PRECISION } else { Y_PRECISION };
                assert!((lo as usize..=hi as usize).contains(&digits), "{n}");
            }
        }
    }

    #[test]
    fn test_empty_path() {
        let mut rng = SecureRandom::seeded(53);
        assert_eq!(path_data(&[], &mut rng).unwrap(), "");
    }

    #[test]
    fn test_view_box_covers_overflow() {
        let shapes = vec![Shape::Line([p(-5.0, 10.0), p(200.0, 90.0)])];
        let b = view_box(&shapes, 150.0, 80.0);
        assert_eq!(b, Bounds::new(-5.0, 0.0, 200.0, 90.0));
        assert_eq!(view_box(&[], 150.0, 80.0), Bounds::new(0.0, 0.0, 150.0, 80.0));
    }

    #[test]
    fn test_render_default_template() {
        let markup = SvgTemplate::default().render(
            150,
            80,
            &Bounds::new(0.0, 0.0, 150.0, 80.0),
            "M 1 2 L 3 4",
        );
        assert!(markup.contains(r#"width="150""#));
        assert!(markup.contains(r#"height="80""#));
        assert!(markup.contains(r#"viewBox="0.000 0.000 150.000 80.000""#));
        assert!(markup.contains(r#"d="M 1 2 L 3 4""#));
        assert_eq!(markup.matches("<path").count(), 1);
        assert!(!markup.contains("{{"));
    }

    #[test]
    fn test_custom_template() {
        assert!(SvgTemplate::custom("<svg/>").is_err());
        let t = SvgTemplate::custom(r#"<svg w="{{width}}"><path d="{{pathdata}}"/></svg>"#).unwrap();
        let out = t.render(10, 20, &Bounds::new(0.0, 0.0, 1.0, 1.0), "M 0 0");
        assert_eq!(out, r#"<svg w="10"><path d="M 0 0"/></svg>"#);
    }

    #[test]
    fn test_data_uri() {
        let uri = to_data_uri("<svg/>");
        assert_eq!(uri, "data:image/svg+xml;base64,PHN2Zy8+");
    }
}
