// ============================================================================
// RENDERER: composite base image + layers + selection outline
// ============================================================================

use image::RgbaImage;

use crate::bitmap::BitmapCache;
use crate::color::Color;
use crate::geometry::{Rect, rotate_around_center};
use crate::layer::{Layer, LayerContent, LayerId, ShapeContent, TextContent};
use crate::ops::shapes::{Polygon, ShapeOutline};
use crate::ops::text::{FontBook, rasterize_text};
use crate::surface::{Shadow, Surface};

/// Fixed output size of every composition.
pub const CANVAS_WIDTH: u32 = 1792;
pub const CANVAS_HEIGHT: u32 = 1024;

pub const SELECTION_COLOR: Color = Color::rgb(0x3B, 0x82, 0xF6);
pub const SELECTION_LINE_WIDTH: f32 = 3.0;
pub const SELECTION_DASH: [f32; 2] = [5.0, 5.0];
/// Gap between a layer's box and its selection outline.
pub const SELECTION_MARGIN: f32 = 5.0;

/// Stateless apart from the font cache: the same inputs always produce the
/// same pixels.
#[derive(Default)]
pub struct Renderer {
    fonts: FontBook,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fonts(fonts: FontBook) -> Self {
        Self { fonts }
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    /// Redraw the whole frame. `layers` must already be in ascending z order.
    pub fn render(
        &mut self,
        surface: &mut Surface,
        base: Option<&RgbaImage>,
        layers: &[&Layer],
        selected: Option<LayerId>,
        bitmaps: &BitmapCache,
    ) {
        surface.reset(CANVAS_WIDTH, CANVAS_HEIGHT);

        if let Some(base) = base {
            surface.draw_image(
                base,
                Rect::new(0.0, 0.0, CANVAS_WIDTH as f32, CANVAS_HEIGHT as f32),
            );
        }

        for layer in layers {
            surface.save();
            surface.set_global_alpha(layer.opacity);

            let (cx, cy) = layer.center();
            let is_selected = selected == Some(layer.id());
            rotate_around_center(surface, layer.rotation, cx, cy, |s| {
                self.draw_layer(s, layer, bitmaps);
                if is_selected {
                    draw_selection_outline(s, &layer.bounds());
                }
            });

            surface.restore();
        }
    }

    fn draw_layer(&mut self, surface: &mut Surface, layer: &Layer, bitmaps: &BitmapCache) {
        match &layer.content {
            LayerContent::Text(text) => self.draw_text(surface, layer, text),
            LayerContent::Image(_) => {
                if let Some(bitmap) = bitmaps.layer(layer.id()) {
                    surface.draw_image(bitmap, layer.bounds());
                }
            }
            LayerContent::Shape(shape) => draw_shape(surface, &layer.bounds(), shape),
        }
    }

    fn draw_text(&mut self, surface: &mut Surface, layer: &Layer, text: &TextContent) {
        if text.text.is_empty() {
            return;
        }
        let Some(face) = self.fonts.resolve(text.font_family, text.font_weight, text.font_style) else {
            return;
        };
        let anchor = text.text_align.anchor_x(layer.x, layer.width);
        let Some(mask) = rasterize_text(&face, &text.text, text.font_size, text.text_align, anchor, layer.y)
        else {
            return;
        };

        if let Some(shadow) = text.shadow {
            surface.set_shadow(Some(Shadow {
                color: shadow.color,
                blur: shadow.blur,
                offset_x: shadow.offset_x,
                offset_y: shadow.offset_y,
            }));
        }
        // Outline first so the fill sits on top of its inner half.
        if let Some(stroke) = text.stroke
            && stroke.width > 0.0
        {
            surface.draw_mask(&mask.dilate(stroke.width * 0.5), stroke.color);
        }
        surface.draw_mask(&mask, text.color);
        surface.set_shadow(None);
    }
}

fn draw_shape(surface: &mut Surface, bounds: &Rect, shape: &ShapeContent) {
    let outline = ShapeOutline::for_shape(shape, bounds);
    if let Some(fill) = shape.fill_color {
        surface.fill_shape(&outline, fill);
    }
    if let Some(border) = shape.border_color
        && shape.border_width > 0.0
    {
        surface.stroke_shape(&outline, border, shape.border_width);
    }
}

fn draw_selection_outline(surface: &mut Surface, bounds: &Rect) {
    let outline = Polygon::rect(&bounds.inflate(SELECTION_MARGIN));
    surface.stroke_dashed(&outline, SELECTION_COLOR, SELECTION_LINE_WIDTH, SELECTION_DASH);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{BitmapSlot, ImageSource};
    use crate::layer::{LayerInit, ShapePatch, ShapeType, LayerPatch};
    use crate::store::LayerStore;
    use image::Rgba;
    use std::sync::Arc;

    fn solid_rect(store: &mut LayerStore, x: f32, y: f32, color: Color) -> LayerId {
        let id = store.add_layer(LayerInit::shape(ShapeType::Rectangle).at(x, y).size(100.0, 100.0));
        store.update_layer(
            id,
            &LayerPatch::shape(ShapePatch {
                fill_color: Some(Some(color)),
                border_color: Some(None),
                ..ShapePatch::default()
            }),
        );
        id
    }

    fn render(store: &LayerStore, selected: Option<LayerId>, bitmaps: &BitmapCache) -> RgbaImage {
        let mut surface = Surface::new(1, 1);
        Renderer::new().render(&mut surface, bitmaps.base(), &store.z_sorted(), selected, bitmaps);
        surface.into_image()
    }

    #[test]
    fn surface_is_canvas_sized_regardless_of_base() {
        let mut bitmaps = BitmapCache::new();
        bitmaps.set_base(BitmapSlot::Ready(Arc::new(RgbaImage::from_pixel(7, 3, Rgba([9, 9, 9, 255])))));
        let img = render(&LayerStore::new(), None, &bitmaps);
        assert_eq!(img.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        assert_eq!(img.get_pixel(1791, 1023).0, [9, 9, 9, 255]);
    }

    #[test]
    fn failed_base_leaves_background_transparent() {
        let mut bitmaps = BitmapCache::new();
        bitmaps.set_base(BitmapSlot::Failed("broken".into()));
        let mut store = LayerStore::new();
        solid_rect(&mut store, 0.0, 0.0, Color::WHITE);
        let img = render(&store, None, &bitmaps);
        assert_eq!(img.get_pixel(500, 500).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(50, 50).0, [255, 255, 255, 255]);
    }

    #[test]
    fn higher_z_paints_last() {
        let mut store = LayerStore::new();
        let red = solid_rect(&mut store, 0.0, 0.0, Color::rgb(255, 0, 0));
        solid_rect(&mut store, 50.0, 50.0, Color::rgb(0, 0, 255));
        let img = render(&store, None, &BitmapCache::new());
        assert_eq!(img.get_pixel(75, 75).0, [0, 0, 255, 255]);

        store.move_up(red);
        let img = render(&store, None, &BitmapCache::new());
        assert_eq!(img.get_pixel(75, 75).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut store = LayerStore::new();
        let a = store.add_layer(LayerInit::shape(ShapeType::Circle).at(80.0, 80.0).size(120.0, 120.0));
        let b = solid_rect(&mut store, 300.0, 200.0, Color::rgba(0, 255, 0, 200));
        store.update_layer(b, &LayerPatch::rotation(33.0));
        store.update_layer(
            a,
            &LayerPatch::shape(ShapePatch { border_radius: Some(30.0), ..ShapePatch::default() }),
        );
        let first = render(&store, Some(b), &BitmapCache::new());
        let second = render(&store, Some(b), &BitmapCache::new());
        assert!(first == second);
    }

    #[test]
    fn selection_outline_is_drawn_outside_the_box() {
        let mut store = LayerStore::new();
        let id = solid_rect(&mut store, 100.0, 100.0, Color::WHITE);
        let img = render(&store, Some(id), &BitmapCache::new());
        assert_eq!(img.get_pixel(95, 95).0, [0x3B, 0x82, 0xF6, 255]);
        // Second dash gap along the top edge.
        assert_eq!(img.get_pixel(102, 95).0, [0, 0, 0, 0]);

        let unselected = render(&store, None, &BitmapCache::new());
        assert_eq!(unselected.get_pixel(95, 95).0, [0, 0, 0, 0]);
    }

    #[test]
    fn opacity_and_rotation_apply_per_layer() {
        let mut store = LayerStore::new();
        let id = solid_rect(&mut store, 100.0, 100.0, Color::WHITE);
        store.update_layer(id, &LayerPatch::opacity(0.5));
        let img = render(&store, None, &BitmapCache::new());
        assert_eq!(img.get_pixel(150, 150).0, [255, 255, 255, 128]);

        // A 200x20 bar rotated 90° about its center becomes vertical.
        store.update_layer(id, &LayerPatch { width: Some(200.0), height: Some(20.0), ..LayerPatch::default() });
        store.update_layer(id, &LayerPatch::rotation(90.0));
        let img = render(&store, None, &BitmapCache::new());
        assert_eq!(img.get_pixel(290, 110).0[3], 0);
        assert!(img.get_pixel(200, 30).0[3] > 0);
    }

    #[test]
    fn undecoded_image_layers_are_skipped() {
        let mut store = LayerStore::new();
        let id = store.add_layer(LayerInit::image(ImageSource::Base64(String::new())).at(0.0, 0.0));
        let mut bitmaps = BitmapCache::new();
        bitmaps.set_layer(id, BitmapSlot::Pending);
        let img = render(&store, None, &bitmaps);
        assert_eq!(img.get_pixel(10, 10).0, [0, 0, 0, 0]);

        bitmaps.set_layer(id, BitmapSlot::Ready(Arc::new(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])))));
        let img = render(&store, None, &bitmaps);
        assert_eq!(img.get_pixel(10, 10).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(299, 299).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(301, 301).0, [0, 0, 0, 0]);
    }

    #[test]
    fn text_shadow_does_not_leak_onto_later_layers() {
        use crate::layer::{DropShadow, FontFamily, FontStyle, FontWeight, TextPatch, TextStroke};

        let Some(face) = FontBook::new().resolve(FontFamily::Arial, FontWeight::Bold, FontStyle::Normal) else {
            return;
        };
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let green = Color::rgb(0, 255, 0);

        let mut store = LayerStore::new();
        let text = store.add_layer(LayerInit::text("HH").at(100.0, 100.0).size(800.0, 300.0));
        store.update_layer(
            text,
            &LayerPatch::text(TextPatch {
                font_size: Some(200.0),
                color: Some(Color::WHITE),
                stroke: Some(Some(TextStroke { color: red, width: 10.0 })),
                shadow: Some(Some(DropShadow { color: blue, blur: 0.0, offset_x: 30.0, offset_y: 30.0 })),
                ..TextPatch::default()
            }),
        );
        solid_rect(&mut store, 1000.0, 600.0, green);

        let mut surface = Surface::new(1, 1);
        Renderer::with_fonts(FontBook::with_font(face.font)).render(
            &mut surface,
            None,
            &store.z_sorted(),
            None,
            &BitmapCache::new(),
        );
        let img = surface.into_image();

        let count = |c: Color| img.pixels().filter(|p| p.0 == c.0).count();
        assert!(count(Color::WHITE) > 0, "no fill pixels");
        assert!(count(red) > 0, "no stroke pixels");
        assert!(count(blue) > 0, "no shadow pixels");
        assert!(img.enumerate_pixels().all(|(x, _, p)| x < 1000 || p.0 != blue.0));

        assert_eq!(img.get_pixel(1050, 650).0, green.0);
        // Where the rectangle's own shadow would fall.
        assert_eq!(img.get_pixel(1120, 720).0, [0, 0, 0, 0]);
    }
}
