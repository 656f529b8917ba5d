// ============================================================================
// TEXT: font resolution, single-line layout, glyph coverage masks
// ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, FontVec, GlyphId, PxScale, ScaleFont};
use font_kit::family_name::FamilyName;
use font_kit::handle::Handle;
use font_kit::properties::{Properties, Style, Weight};
use font_kit::source::SystemSource;

use crate::layer::{FontFamily, FontStyle, FontWeight, TextAlignment};
use crate::surface::Mask;

/// Horizontal shear applied per pixel of height above the baseline when a
/// face has no italic variant.
const ITALIC_SHEAR: f32 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("could not read font file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' is not a usable TrueType/OpenType font", path.display())]
    Invalid { path: PathBuf },
}

/// A loaded face plus the styling it cannot provide natively.
#[derive(Clone)]
pub struct ResolvedFont {
    pub font: FontArc,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

type FontKey = (FontFamily, FontWeight, FontStyle);

/// Font lookup cache for text layers.
///
/// Each (family, weight, style) is resolved once: first the named family,
/// then the matching generic family, and the outcome (including "nothing
/// found") is remembered. A registered font overrides system lookup.
#[derive(Default)]
pub struct FontBook {
    cache: HashMap<FontKey, Option<ResolvedFont>>,
    registered: Option<FontArc>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book that renders every family with `font`.
    pub fn with_font(font: FontArc) -> Self {
        Self { cache: HashMap::new(), registered: Some(font) }
    }

    pub fn register(&mut self, font: FontArc) {
        self.registered = Some(font);
        self.cache.clear();
    }

    /// Read a TTF/OTF file from disk.
    pub fn load_file(path: &Path) -> Result<FontArc, FontError> {
        let bytes = std::fs::read(path).map_err(|e| FontError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        FontArc::try_from_vec(bytes).map_err(|_| FontError::Invalid { path: path.to_path_buf() })
    }

    pub fn resolve(
        &mut self,
        family: FontFamily,
        weight: FontWeight,
        style: FontStyle,
    ) -> Option<ResolvedFont> {
        if let Some(font) = &self.registered {
            return Some(ResolvedFont {
                font: font.clone(),
                synthetic_bold: weight != FontWeight::Normal,
                synthetic_italic: style == FontStyle::Italic,
            });
        }

        self.cache
            .entry((family, weight, style))
            .or_insert_with(|| {
                let resolved = lookup_system_font(family, weight, style);
                match &resolved {
                    Some(r) => log::debug!(
                        "font {} {:?} {:?} resolved (synthetic bold: {}, italic: {})",
                        family.name(),
                        weight,
                        style,
                        r.synthetic_bold,
                        r.synthetic_italic
                    ),
                    None => log::warn!("no system font available for '{}'", family.name()),
                }
                resolved
            })
            .clone()
    }
}

fn generic_family(family: FontFamily) -> FamilyName {
    if family.is_monospace() {
        FamilyName::Monospace
    } else if family.is_serif() {
        FamilyName::Serif
    } else {
        FamilyName::SansSerif
    }
}

fn lookup_system_font(family: FontFamily, weight: FontWeight, style: FontStyle) -> Option<ResolvedFont> {
    let mut props = Properties::new();
    props.weight = Weight(weight.css_weight() as f32);
    let italic = style == FontStyle::Italic;
    if italic {
        props.style = Style::Italic;
    }

    let source = SystemSource::new();
    let named = [FamilyName::Title(family.name().to_string())];
    let generic = [generic_family(family)];
    let handle = source
        .select_best_match(&named, &props)
        .or_else(|_| source.select_best_match(&generic, &props))
        .ok()?;

    let font_index = match &handle {
        Handle::Path { font_index, .. } | Handle::Memory { font_index, .. } => *font_index,
    };
    let loaded = handle.load().ok()?;
    let actual = loaded.properties();
    let data = loaded.copy_font_data()?;
    let font = FontVec::try_from_vec_and_index((*data).clone(), font_index).ok()?;

    Some(ResolvedFont {
        font: FontArc::new(font),
        synthetic_bold: weight.css_weight() >= 700 && actual.weight.0 < 600.0,
        synthetic_italic: italic && actual.style == Style::Normal,
    })
}

// ---------------------------------------------------------------------------
//  Layout
// ---------------------------------------------------------------------------

/// Scale at which one em equals `font_size` pixels.
pub fn em_scale(font: &FontArc, font_size: f32) -> PxScale {
    match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(font_size * font.height_unscaled() / upem),
        _ => PxScale::from(font_size),
    }
}

/// Glyphs of a single line, positioned relative to its left edge and baseline.
pub struct TextLayout {
    pub glyphs: Vec<(GlyphId, f32)>,
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
    pub scale: PxScale,
}

/// Lay out `text` as one line. Line breaks and other control characters are
/// rendered as spaces.
pub fn layout_text(font: &FontArc, text: &str, font_size: f32) -> TextLayout {
    let scale = em_scale(font, font_size);
    let scaled = font.as_scaled(scale);

    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let ch = if ch.is_control() { ' ' } else { ch };
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    TextLayout {
        glyphs,
        width: cursor_x,
        ascent: scaled.ascent(),
        descent: scaled.descent(),
        scale,
    }
}

/// Rasterize a line of text into a coverage mask.
///
/// `anchor_x` is interpreted through `alignment` (left edge, center or right
/// edge of the run) and `top_y` is the top of the line box. Returns `None`
/// when nothing would be drawn.
pub fn rasterize_text(
    face: &ResolvedFont,
    text: &str,
    font_size: f32,
    alignment: TextAlignment,
    anchor_x: f32,
    top_y: f32,
) -> Option<Mask> {
    if text.is_empty() {
        return None;
    }
    let font = &face.font;
    let layout = layout_text(font, text, font_size);
    let start_x = match alignment {
        TextAlignment::Left => anchor_x,
        TextAlignment::Center => anchor_x - layout.width * 0.5,
        TextAlignment::Right => anchor_x - layout.width,
    };
    let baseline = top_y + layout.ascent;

    let outlined: Vec<_> = layout
        .glyphs
        .iter()
        .filter_map(|&(id, gx)| {
            font.outline_glyph(id.with_scale_and_position(layout.scale, point(start_x + gx, baseline)))
        })
        .collect();
    if outlined.is_empty() {
        return None;
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for g in &outlined {
        let b = g.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }

    // Room for the italic shear and the synthetic-bold spread.
    let shear = if face.synthetic_italic { (baseline - min_y).max(0.0) * ITALIC_SHEAR } else { 0.0 };
    let pad = 2.0;
    let x0 = (min_x - pad).floor();
    let y0 = (min_y - pad).floor();
    let width = ((max_x + shear + pad + 1.0).ceil() - x0).max(1.0) as u32;
    let height = ((max_y + pad).ceil() - y0).max(1.0) as u32;

    let mut mask = Mask::new(x0, y0, width, height);
    let w = width as i32;
    let h = height as i32;
    for g in &outlined {
        let b = g.px_bounds();
        g.draw(|px, py, cov| {
            let mut cx = b.min.x + px as f32;
            let cy = b.min.y + py as f32;
            if face.synthetic_italic {
                cx += (baseline - (cy + 0.5)) * ITALIC_SHEAR;
            }
            let ix = (cx - x0).round() as i32;
            let iy = (cy - y0).round() as i32;
            if ix >= 0 && iy >= 0 && ix < w && iy < h {
                let idx = iy as usize * width as usize + ix as usize;
                mask.data[idx] = mask.data[idx].max(cov);
                if face.synthetic_bold && ix + 1 < w {
                    mask.data[idx + 1] = mask.data[idx + 1].max(cov);
                }
            }
        });
    }
    Some(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Text tests need a real face; hosts without any system fonts skip them.
    fn any_face() -> Option<ResolvedFont> {
        FontBook::new().resolve(FontFamily::Arial, FontWeight::Normal, FontStyle::Normal)
    }

    #[test]
    fn generic_fallbacks_follow_family_class() {
        assert_eq!(generic_family(FontFamily::Georgia), FamilyName::Serif);
        assert_eq!(generic_family(FontFamily::CourierNew), FamilyName::Monospace);
        assert_eq!(generic_family(FontFamily::Impact), FamilyName::SansSerif);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let err = FontBook::load_file(Path::new("/definitely/not/here.ttf"));
        assert!(matches!(err, Err(FontError::Io { .. })));
    }

    #[test]
    fn registered_font_synthesizes_styles() {
        let Some(face) = any_face() else { return };
        let mut book = FontBook::new();
        book.register(face.font);
        let r = book.resolve(FontFamily::Georgia, FontWeight::Black, FontStyle::Italic).unwrap();
        assert!(r.synthetic_bold);
        assert!(r.synthetic_italic);
        let plain = book.resolve(FontFamily::Georgia, FontWeight::Normal, FontStyle::Normal).unwrap();
        assert!(!plain.synthetic_bold && !plain.synthetic_italic);
    }

    #[test]
    fn newlines_lay_out_as_spaces() {
        let Some(face) = any_face() else { return };
        let a = layout_text(&face.font, "AB\nCD", 40.0);
        let b = layout_text(&face.font, "AB CD", 40.0);
        assert_eq!(a.glyphs.len(), b.glyphs.len());
        assert!((a.width - b.width).abs() < 1e-3);
    }

    #[test]
    fn alignment_moves_the_mask() {
        let Some(face) = any_face() else { return };
        let left = rasterize_text(&face, "HELLO", 40.0, TextAlignment::Left, 100.0, 10.0).unwrap();
        let right = rasterize_text(&face, "HELLO", 40.0, TextAlignment::Right, 100.0, 10.0).unwrap();
        assert!(left.x >= 90.0);
        assert!(right.x + right.width as f32 <= 112.0);
        assert!(left.data.iter().any(|&c| c > 0.5));
    }

    #[test]
    fn empty_text_draws_nothing() {
        let Some(face) = any_face() else { return };
        assert!(rasterize_text(&face, "", 40.0, TextAlignment::Left, 0.0, 0.0).is_none());
        assert!(rasterize_text(&face, "   ", 40.0, TextAlignment::Left, 0.0, 0.0).is_none());
    }
}
