//! ThumbFE: layered 1792x1024 thumbnail composition.
//!
//! [`Editor`] is the entry point. It owns the layer stack, selection and drag
//! state, the background bitmap decoder and the rendered frame.

pub mod bitmap;
pub mod cli;
pub mod color;
pub mod editor;
pub mod geometry;
pub mod import;
pub mod interaction;
pub mod io;
pub mod layer;
pub mod logger;
pub mod ops;
pub mod render;
pub mod scene;
pub mod store;
pub mod surface;

pub use bitmap::{BitmapSlot, DecodeError, ImageSource};
pub use color::Color;
pub use editor::Editor;
pub use geometry::{Rect, Viewport};
pub use import::OverlayImage;
pub use interaction::DragState;
pub use io::{ExportError, ExportFormat};
pub use layer::{
    ContentPatch, Layer, LayerContent, LayerId, LayerInit, LayerKind, LayerPatch, LayerSummary,
    ShapePatch, ShapeType, TextPatch,
};
pub use render::{CANVAS_HEIGHT, CANVAS_WIDTH};
pub use scene::{SceneError, SceneFile};
pub use surface::Surface;
