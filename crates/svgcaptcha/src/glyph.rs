//! The glyph catalog: outline data for every character a captcha can show.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::geometry::{Point, Points};
use crate::random::SecureRandom;
use crate::shape::Shape;
use svgcaptcha_common::CaptchaError;

const BUILTIN_GLYPHS: &str = include_str!("../data/glyphs.json");

static BUILTIN: LazyLock<GlyphCatalog> = LazyLock::new(|| {
    GlyphCatalog::from_json(BUILTIN_GLYPHS).expect("embedded glyph table is valid")
});

/// One character's outline.
///
/// `width` and `height` are nominal typeface metrics used for layout,
/// not bounds recomputed from the shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub id: char,
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
}

impl Points for Glyph {
    fn for_each_point(&mut self, f: &mut dyn FnMut(&mut Point)) {
        self.shapes.for_each_point(f);
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    glyphs: Vec<Glyph>,
}

/// Immutable table of glyphs, in table order
#[derive(Debug, Clone)]
pub struct GlyphCatalog {
    glyphs: Vec<Glyph>,
}

impl GlyphCatalog {
    /// The built-in alphabet, parsed once per process
    pub fn builtin() -> &'static GlyphCatalog {
        &BUILTIN
    }

    /// Parse a catalog from `{"glyphs": [{"id", "width", "height", "shapes"}]}`
    pub fn from_json(json: &str) -> Result<Self, CaptchaError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| CaptchaError::Catalog(e.to_string()))?;
        Self::new(file.glyphs)
    }

    pub fn new(glyphs: Vec<Glyph>) -> Result<Self, CaptchaError> {
        if glyphs.is_empty() {
            return Err(CaptchaError::Catalog("catalog has no glyphs".to_string()));
        }

        let mut seen = HashSet::with_capacity(glyphs.len());
        for glyph in &glyphs {
            if !seen.insert(glyph.id) {
                return Err(CaptchaError::Catalog(format!("duplicate glyph '{}'", glyph.id)));
            }
            if !(glyph.width > 0.0 && glyph.height > 0.0) {
                return Err(CaptchaError::Catalog(format!(
                    "glyph '{}' has non-positive metrics {}x{}",
                    glyph.id, glyph.width, glyph.height
                )));
            }
            if glyph.shapes.is_empty() {
                return Err(CaptchaError::Catalog(format!("glyph '{}' has no shapes", glyph.id)));
            }
        }

        tracing::debug!(glyphs = glyphs.len(), "Glyph catalog loaded");
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn get(&self, id: char) -> Option<&Glyph> {
        self.glyphs.iter().find(|g| g.id == id)
    }

    pub fn contains(&self, id: char) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = char> + '_ {
        self.glyphs.iter().map(|g| g.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Glyph> {
        self.glyphs.iter()
    }

    /// Pick `n` distinct glyphs in selection order.
    ///
    /// `n` larger than the catalog is clamped to the catalog size: an
    /// oversized character count must never fail a generation request.
    pub fn select(&self, n: usize, rng: &mut SecureRandom) -> Result<Vec<&Glyph>, CaptchaError> {
        let n = n.min(self.glyphs.len());
        let indices: Vec<usize> = (0..self.glyphs.len()).collect();
        let chosen = rng.choose_keys(&indices, n, false)?;
        Ok(chosen.into_iter().map(|i| &self.glyphs[i]).collect())
    }
}
