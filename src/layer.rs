// ============================================================================
// LAYER MODEL: one visual element composited over the base image
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bitmap::ImageSource;
use crate::color::Color;
use crate::geometry::Rect;

/// Smallest width/height a layer may have; degenerate patches clamp to this.
pub const MIN_LAYER_SIZE: f32 = 1.0;

/// Editable font-size range for text layers.
pub const MIN_FONT_SIZE: f32 = 10.0;
pub const MAX_FONT_SIZE: f32 = 300.0;

/// Upper bounds for text outline width and shadow blur.
pub const MAX_STROKE_WIDTH: f32 = 30.0;
pub const MAX_SHADOW_BLUR: f32 = 50.0;

/// Opaque, immutable layer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    pub(crate) fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Discriminant of [`LayerContent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Text,
    Image,
    Shape,
}

// ---------------------------------------------------------------------------
//  Text styling
// ---------------------------------------------------------------------------

/// Fonts offered by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Arial,
    Helvetica,
    Impact,
    #[serde(rename = "Times New Roman")]
    TimesNewRoman,
    Georgia,
    #[serde(rename = "Courier New")]
    CourierNew,
    Verdana,
    #[serde(rename = "Comic Sans MS")]
    ComicSansMs,
    #[serde(rename = "Trebuchet MS")]
    TrebuchetMs,
    #[serde(rename = "Arial Black")]
    ArialBlack,
    Palatino,
    Garamond,
    Bookman,
    Tahoma,
    #[serde(rename = "Lucida Console")]
    LucidaConsole,
}

impl FontFamily {
    pub fn name(&self) -> &'static str {
        match self {
            FontFamily::Arial => "Arial",
            FontFamily::Helvetica => "Helvetica",
            FontFamily::Impact => "Impact",
            FontFamily::TimesNewRoman => "Times New Roman",
            FontFamily::Georgia => "Georgia",
            FontFamily::CourierNew => "Courier New",
            FontFamily::Verdana => "Verdana",
            FontFamily::ComicSansMs => "Comic Sans MS",
            FontFamily::TrebuchetMs => "Trebuchet MS",
            FontFamily::ArialBlack => "Arial Black",
            FontFamily::Palatino => "Palatino",
            FontFamily::Garamond => "Garamond",
            FontFamily::Bookman => "Bookman",
            FontFamily::Tahoma => "Tahoma",
            FontFamily::LucidaConsole => "Lucida Console",
        }
    }

    /// Whether the family is a serif face (used to pick a generic fallback).
    pub fn is_serif(&self) -> bool {
        matches!(
            self,
            FontFamily::TimesNewRoman
                | FontFamily::Georgia
                | FontFamily::Palatino
                | FontFamily::Garamond
                | FontFamily::Bookman
        )
    }

    pub fn is_monospace(&self) -> bool {
        matches!(self, FontFamily::CourierNew | FontFamily::LucidaConsole)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontWeight {
    #[serde(rename = "normal")]
    Normal,
    #[default]
    #[serde(rename = "bold")]
    Bold,
    #[serde(rename = "900")]
    Black,
}

impl FontWeight {
    /// CSS numeric weight.
    pub fn css_weight(&self) -> u16 {
        match self {
            FontWeight::Normal => 400,
            FontWeight::Bold => 700,
            FontWeight::Black => 900,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Horizontal anchor of a text run inside its box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlignment {
    /// Anchor x for a box starting at `x` with the given `width`.
    pub fn anchor_x(&self, x: f32, width: f32) -> f32 {
        match self {
            TextAlignment::Left => x,
            TextAlignment::Center => x + width / 2.0,
            TextAlignment::Right => x + width,
        }
    }
}

/// Outline drawn beneath the text fill.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStroke {
    pub color: Color,
    pub width: f32,
}

impl TextStroke {
    /// Width clamped to `0..=MAX_STROKE_WIDTH`; non-finite widths become 0.
    pub fn sanitized(self) -> Self {
        Self { width: finite_or_zero(self.width).clamp(0.0, MAX_STROKE_WIDTH), ..self }
    }
}

/// Drop shadow behind text.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropShadow {
    pub color: Color,
    #[serde(default)]
    pub blur: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

impl DropShadow {
    /// Blur clamped to `0..=MAX_SHADOW_BLUR`; non-finite values become 0.
    pub fn sanitized(self) -> Self {
        Self {
            blur: finite_or_zero(self.blur).clamp(0.0, MAX_SHADOW_BLUR),
            offset_x: finite_or_zero(self.offset_x),
            offset_y: finite_or_zero(self.offset_y),
            ..self
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextContent {
    pub text: String,
    pub font_size: f32,
    pub font_family: FontFamily,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub text_align: TextAlignment,
    pub color: Color,
    pub stroke: Option<TextStroke>,
    pub shadow: Option<DropShadow>,
}

impl Default for TextContent {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 60.0,
            font_family: FontFamily::Arial,
            font_weight: FontWeight::Bold,
            font_style: FontStyle::Normal,
            text_align: TextAlignment::Left,
            color: Color::WHITE,
            stroke: None,
            shadow: None,
        }
    }
}

// ---------------------------------------------------------------------------
//  Image + shape content
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub source: ImageSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    Rectangle,
    Circle,
}

impl ShapeType {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeType::Rectangle => "rectangle",
            ShapeType::Circle => "circle",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeContent {
    pub shape_type: ShapeType,
    #[serde(default)]
    pub fill_color: Option<Color>,
    #[serde(default)]
    pub border_color: Option<Color>,
    #[serde(default)]
    pub border_width: f32,
    /// Rectangle corner radius; ignored for circles.
    #[serde(default)]
    pub border_radius: f32,
}

impl ShapeContent {
    /// Styling used by the editor's "add shape" action.
    pub fn preset(shape_type: ShapeType) -> Self {
        Self {
            shape_type,
            fill_color: Some(Color::rgba(255, 0, 0, 128)),
            border_color: Some(Color::WHITE),
            border_width: 4.0,
            border_radius: 0.0,
        }
    }
}

/// Kind-specific payload of a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerContent {
    Text(TextContent),
    Image(ImageContent),
    Shape(ShapeContent),
}

impl LayerContent {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerContent::Text(_) => LayerKind::Text,
            LayerContent::Image(_) => LayerKind::Image,
            LayerContent::Shape(_) => LayerKind::Shape,
        }
    }
}

// ---------------------------------------------------------------------------
//  Layer
// ---------------------------------------------------------------------------

/// A layer as held by the [`LayerStore`](crate::store::LayerStore).
///
/// `id` and `z_index` are owned by the store; callers only ever see shared
/// references, so every change goes through `update_layer`.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) z_index: i64,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, applied around the layer's own center.
    pub rotation: f32,
    pub opacity: f32,
    pub content: LayerContent,
}

impl Layer {
    pub(crate) fn from_init(init: LayerInit, z_index: i64) -> Self {
        let mut layer = Self {
            id: LayerId::mint(),
            z_index,
            x: 0.0,
            y: 0.0,
            width: MIN_LAYER_SIZE,
            height: MIN_LAYER_SIZE,
            rotation: 0.0,
            opacity: 1.0,
            content: init.content,
        };
        // Route the geometry through the same sanitising path as patches.
        layer.apply_patch(&LayerPatch {
            x: Some(init.x),
            y: Some(init.y),
            width: Some(init.width),
            height: Some(init.height),
            rotation: Some(init.rotation),
            opacity: Some(init.opacity),
            content: None,
        });
        if let LayerContent::Text(text) = &mut layer.content {
            text.font_size = clamp_font_size(text.font_size).unwrap_or(60.0);
            text.stroke = text.stroke.map(TextStroke::sanitized);
            text.shadow = text.shadow.map(DropShadow::sanitized);
        }
        layer
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn z_index(&self) -> i64 {
        self.z_index
    }

    pub fn kind(&self) -> LayerKind {
        self.content.kind()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> (f32, f32) {
        self.bounds().center()
    }

    /// Axis-aligned hit-test against the unrotated box (inclusive edges).
    pub fn contains(&self, px: f32, py: f32) -> bool {
        self.bounds().contains(px, py)
    }

    /// Name shown in the layers panel.
    pub fn display_label(&self) -> String {
        match &self.content {
            LayerContent::Text(t) if !t.text.is_empty() => t.text.clone(),
            LayerContent::Text(_) => "Text Layer".to_string(),
            LayerContent::Image(_) => "Image Layer".to_string(),
            LayerContent::Shape(s) => format!("{} Layer", s.shape_type.name()),
        }
    }

    /// Merge a patch. Returns `false` when a content patch targeted another
    /// kind (geometry fields are still applied).
    pub(crate) fn apply_patch(&mut self, patch: &LayerPatch) -> bool {
        if let Some(x) = patch.x.filter(|v| v.is_finite()) {
            self.x = x;
        }
        if let Some(y) = patch.y.filter(|v| v.is_finite()) {
            self.y = y;
        }
        if let Some(w) = patch.width.filter(|v| v.is_finite()) {
            self.width = clamp_size(w);
        }
        if let Some(h) = patch.height.filter(|v| v.is_finite()) {
            self.height = clamp_size(h);
        }
        if let Some(r) = patch.rotation.filter(|v| v.is_finite()) {
            self.rotation = r;
        }
        if let Some(o) = patch.opacity.filter(|v| !v.is_nan()) {
            self.opacity = o.clamp(0.0, 1.0);
        }

        match (&mut self.content, &patch.content) {
            (_, None) => true,
            (LayerContent::Text(text), Some(ContentPatch::Text(p))) => {
                p.apply(text);
                true
            }
            (LayerContent::Image(image), Some(ContentPatch::Image(p))) => {
                if let Some(source) = &p.source {
                    image.source = source.clone();
                }
                true
            }
            (LayerContent::Shape(shape), Some(ContentPatch::Shape(p))) => {
                p.apply(shape);
                true
            }
            (_, Some(_)) => false,
        }
    }
}

fn clamp_size(v: f32) -> f32 {
    v.max(MIN_LAYER_SIZE)
}

fn clamp_font_size(v: f32) -> Option<f32> {
    v.is_finite().then(|| v.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE))
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// Read-only row for a layers list panel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerSummary {
    pub id: LayerId,
    pub kind: LayerKind,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub z_index: i64,
    pub selected: bool,
}

// ---------------------------------------------------------------------------
//  Construction + patch records
// ---------------------------------------------------------------------------

fn default_xy() -> f32 {
    100.0
}

fn default_extent() -> f32 {
    200.0
}

fn default_opacity() -> f32 {
    1.0
}

/// Everything needed to create a layer except its id and z-index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerInit {
    #[serde(default = "default_xy")]
    pub x: f32,
    #[serde(default = "default_xy")]
    pub y: f32,
    #[serde(default = "default_extent")]
    pub width: f32,
    #[serde(default = "default_extent")]
    pub height: f32,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(flatten)]
    pub content: LayerContent,
}

impl LayerInit {
    pub fn new(content: LayerContent) -> Self {
        Self {
            x: default_xy(),
            y: default_xy(),
            width: default_extent(),
            height: default_extent(),
            rotation: 0.0,
            opacity: 1.0,
            content,
        }
    }

    /// The "add text" preset: large white bold text with an outline and shadow.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(LayerContent::Text(TextContent {
            text: text.into(),
            font_size: 80.0,
            stroke: Some(TextStroke { color: Color::BLACK, width: 4.0 }),
            shadow: Some(DropShadow {
                color: Color::rgba(0, 0, 0, 128),
                blur: 4.0,
                offset_x: 2.0,
                offset_y: 2.0,
            }),
            ..TextContent::default()
        }))
        .size(600.0, 100.0)
    }

    pub fn shape(shape_type: ShapeType) -> Self {
        Self::new(LayerContent::Shape(ShapeContent::preset(shape_type)))
    }

    pub fn image(source: ImageSource) -> Self {
        Self::new(LayerContent::Image(ImageContent { source })).size(300.0, 300.0)
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// Partial update. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub rotation: Option<f32>,
    pub opacity: Option<f32>,
    pub content: Option<ContentPatch>,
}

impl LayerPatch {
    pub fn position(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    pub fn size(width: f32, height: f32) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    pub fn rotation(degrees: f32) -> Self {
        Self { rotation: Some(degrees), ..Self::default() }
    }

    pub fn opacity(opacity: f32) -> Self {
        Self { opacity: Some(opacity), ..Self::default() }
    }

    pub fn text(patch: TextPatch) -> Self {
        Self { content: Some(ContentPatch::Text(patch)), ..Self::default() }
    }

    pub fn shape(patch: ShapePatch) -> Self {
        Self { content: Some(ContentPatch::Shape(patch)), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentPatch {
    Text(TextPatch),
    Image(ImagePatch),
    Shape(ShapePatch),
}

/// Text fields to change. `Some(None)` clears an optional style.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextPatch {
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub font_family: Option<FontFamily>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<FontStyle>,
    pub text_align: Option<TextAlignment>,
    pub color: Option<Color>,
    pub stroke: Option<Option<TextStroke>>,
    pub shadow: Option<Option<DropShadow>>,
}

impl TextPatch {
    fn apply(&self, text: &mut TextContent) {
        if let Some(v) = &self.text {
            text.text = v.clone();
        }
        if let Some(size) = self.font_size.and_then(clamp_font_size) {
            text.font_size = size;
        }
        if let Some(v) = self.font_family {
            text.font_family = v;
        }
        if let Some(v) = self.font_weight {
            text.font_weight = v;
        }
        if let Some(v) = self.font_style {
            text.font_style = v;
        }
        if let Some(v) = self.text_align {
            text.text_align = v;
        }
        if let Some(v) = self.color {
            text.color = v;
        }
        if let Some(v) = self.stroke {
            text.stroke = v.map(TextStroke::sanitized);
        }
        if let Some(v) = self.shadow {
            text.shadow = v.map(DropShadow::sanitized);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImagePatch {
    pub source: Option<ImageSource>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShapePatch {
    pub fill_color: Option<Option<Color>>,
    pub border_color: Option<Option<Color>>,
    pub border_width: Option<f32>,
    pub border_radius: Option<f32>,
}

impl ShapePatch {
    fn apply(&self, shape: &mut ShapeContent) {
        if let Some(v) = self.fill_color {
            shape.fill_color = v;
        }
        if let Some(v) = self.border_color {
            shape.border_color = v;
        }
        if let Some(v) = self.border_width.filter(|v| v.is_finite()) {
            shape.border_width = v.max(0.0);
        }
        if let Some(v) = self.border_radius.filter(|v| v.is_finite()) {
            shape.border_radius = v.max(0.0);
        }
    }
}
