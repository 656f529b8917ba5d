// ============================================================================
// EDITOR: one composition session: layers, selection, bitmaps, frame, export
// ============================================================================
//
// Every mutation bumps `revision`; `frame()` re-renders only when the surface
// is older than the current revision. Decodes run in the background and are
// applied on the next poll (or frame request).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;

use crate::bitmap::{BitmapCache, BitmapSlot, DecodeOutcome, DecodeQueue, DecodeTarget, ImageSource};
use crate::geometry::Viewport;
use crate::import::{Importer, OverlayImage};
use crate::interaction::{DragState, InteractionController};
use crate::io::{ExportError, ExportFormat, encode_surface, write_export};
use crate::layer::{
    ContentPatch, Layer, LayerContent, LayerId, LayerInit, LayerKind, LayerPatch, LayerSummary,
    ShapeType,
};
use crate::ops::text::FontBook;
use crate::render::{CANVAS_HEIGHT, CANVAS_WIDTH, Renderer};
use crate::store::LayerStore;
use crate::surface::Surface;

/// Placeholder text of a freshly added text layer.
pub const DEFAULT_TEXT: &str = "YOUR TEXT HERE";

pub struct Editor {
    store: LayerStore,
    controller: InteractionController,
    importer: Importer,
    bitmaps: BitmapCache,
    decoder: DecodeQueue,
    renderer: Renderer,
    surface: Surface,
    revision: u64,
    rendered: Option<u64>,
    base_generation: u64,
    next_ticket: u64,
    layer_tickets: HashMap<LayerId, u64>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Self::with_renderer(Renderer::new())
    }

    pub fn with_renderer(renderer: Renderer) -> Self {
        Self {
            store: LayerStore::new(),
            controller: InteractionController::new(),
            importer: Importer::new(),
            bitmaps: BitmapCache::new(),
            decoder: DecodeQueue::new(),
            renderer,
            surface: Surface::new(CANVAS_WIDTH, CANVAS_HEIGHT),
            revision: 0,
            rendered: None,
            base_generation: 0,
            next_ticket: 0,
            layer_tickets: HashMap::new(),
        }
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        self.touch();
        self.renderer.fonts_mut()
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // --- read access -----------------------------------------------------------

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.store.get(id)
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> &[Layer] {
        self.store.layers()
    }

    pub fn layers_panel(&self) -> Vec<LayerSummary> {
        self.store.summaries(self.controller.selected())
    }

    pub fn selected(&self) -> Option<LayerId> {
        self.controller.selected()
    }

    pub fn drag_state(&self) -> DragState {
        self.controller.drag_state()
    }

    pub fn bitmap_slot(&self, id: LayerId) -> Option<&BitmapSlot> {
        self.bitmaps.layer_slot(id)
    }

    pub fn base_slot(&self) -> Option<&BitmapSlot> {
        self.bitmaps.base_slot()
    }

    // --- selection ---------------------------------------------------------------

    /// Select a layer (or clear with `None`). Unknown ids are refused.
    pub fn select(&mut self, id: Option<LayerId>) -> bool {
        if let Some(id) = id
            && !self.store.contains(id)
        {
            return false;
        }
        if self.controller.selected() != id {
            self.controller.select(id);
            self.touch();
        }
        true
    }

    // --- layer lifecycle -----------------------------------------------------------

    /// Add a layer on top and select it.
    pub fn add_layer(&mut self, init: LayerInit) -> LayerId {
        let source = match &init.content {
            LayerContent::Image(image) => Some(image.source.clone()),
            _ => None,
        };
        let id = self.store.add_layer(init);
        if let Some(source) = source {
            self.request_layer_decode(id, source);
        }
        self.controller.select(Some(id));
        self.touch();
        id
    }

    pub fn add_text_layer(&mut self) -> LayerId {
        self.add_layer(LayerInit::text(DEFAULT_TEXT))
    }

    pub fn add_shape_layer(&mut self, shape_type: ShapeType) -> LayerId {
        self.add_layer(LayerInit::shape(shape_type))
    }

    pub fn add_image_layer(&mut self, source: ImageSource) -> LayerId {
        self.add_layer(LayerInit::image(source))
    }

    pub fn update_layer(&mut self, id: LayerId, patch: &LayerPatch) -> bool {
        if !self.store.update_layer(id, patch) {
            return false;
        }
        if let Some(ContentPatch::Image(image)) = &patch.content
            && let Some(source) = &image.source
            && self.store.get(id).is_some_and(|l| l.kind() == LayerKind::Image)
        {
            self.request_layer_decode(id, source.clone());
        }
        self.touch();
        true
    }

    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        if self.store.remove_layer(id).is_none() {
            return false;
        }
        self.controller.forget(id);
        self.bitmaps.remove_layer(id);
        self.layer_tickets.remove(&id);
        self.touch();
        true
    }

    /// Duplicate a layer (+20, +20, on top) and select the copy.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Option<LayerId> {
        let dup = self.store.duplicate_layer(id)?;
        let settled = matches!(
            self.bitmaps.layer_slot(id),
            Some(BitmapSlot::Ready(_) | BitmapSlot::Failed(_))
        );
        if settled {
            self.bitmaps.share(id, dup);
        } else if let Some(LayerContent::Image(image)) = self.store.get(dup).map(|l| &l.content) {
            // Still decoding: the copy needs its own request.
            let source = image.source.clone();
            self.request_layer_decode(dup, source);
        }
        self.controller.select(Some(dup));
        self.touch();
        Some(dup)
    }

    pub fn move_up(&mut self, id: LayerId) -> bool {
        let moved = self.store.move_up(id);
        if moved {
            self.touch();
        }
        moved
    }

    pub fn move_down(&mut self, id: LayerId) -> bool {
        let moved = self.store.move_down(id);
        if moved {
            self.touch();
        }
        moved
    }

    // --- pointer -------------------------------------------------------------------

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.controller.set_viewport(viewport);
    }

    pub fn pointer_down(&mut self, screen_x: f32, screen_y: f32) -> Option<LayerId> {
        let before = self.controller.selected();
        let after = self.controller.pointer_down(&self.store, screen_x, screen_y);
        if before != after {
            self.touch();
        }
        after
    }

    pub fn pointer_move(&mut self, screen_x: f32, screen_y: f32) -> bool {
        let moved = self.controller.pointer_move(&mut self.store, screen_x, screen_y);
        if moved {
            self.touch();
        }
        moved
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up();
    }

    pub fn pointer_leave(&mut self) {
        self.controller.pointer_leave();
    }

    // --- overlays + base image -------------------------------------------------------

    /// Place an overlay batch (once per distinct batch) and select its first
    /// layer. Returns the new layer ids.
    pub fn import_overlays(&mut self, overlays: &[OverlayImage]) -> Vec<LayerId> {
        let ids = self.importer.import(&mut self.store, overlays);
        for (id, overlay) in ids.iter().zip(overlays) {
            self.request_layer_decode(*id, overlay.source.clone());
        }
        if let Some(&first) = ids.first() {
            self.controller.select(Some(first));
            self.touch();
        }
        ids
    }

    /// Decode `source` in the background and use it as the base image.
    /// Supersedes any base request still in flight.
    pub fn set_base_image(&mut self, source: ImageSource) {
        self.base_generation += 1;
        log::info!("loading base image {}", source.describe());
        self.bitmaps.set_base(BitmapSlot::Pending);
        self.decoder.request(DecodeTarget::Base(self.base_generation), source);
        self.touch();
    }

    /// Use an already decoded bitmap as the base image.
    pub fn set_base_bitmap(&mut self, bitmap: RgbaImage) {
        self.base_generation += 1;
        self.bitmaps.set_base(BitmapSlot::Ready(Arc::new(bitmap)));
        self.touch();
    }

    fn request_layer_decode(&mut self, id: LayerId, source: ImageSource) {
        self.next_ticket += 1;
        self.layer_tickets.insert(id, self.next_ticket);
        self.bitmaps.set_layer(id, BitmapSlot::Pending);
        self.decoder.request(DecodeTarget::Layer(id, self.next_ticket), source);
    }

    // --- background decode results ------------------------------------------------------

    pub fn pending_decodes(&self) -> usize {
        self.decoder.outstanding()
    }

    /// Apply every finished decode. Returns how many changed the frame.
    pub fn poll_decodes(&mut self) -> usize {
        let done = self.decoder.drain();
        self.apply_decodes(done)
    }

    /// Block until all outstanding decodes have finished, then apply them.
    pub fn wait_for_decodes(&mut self) -> usize {
        let done = self.decoder.wait_all();
        self.apply_decodes(done)
    }

    fn apply_decodes(&mut self, done: Vec<DecodeOutcome>) -> usize {
        let mut applied = 0;
        for outcome in done {
            let slot = match outcome.result {
                Ok(img) => {
                    log::debug!("decoded {} ({}x{})", outcome.source, img.width(), img.height());
                    BitmapSlot::Ready(Arc::new(img))
                }
                Err(e) => {
                    log::warn!("could not decode {}: {}", outcome.source, e);
                    BitmapSlot::Failed(e.to_string())
                }
            };
            match outcome.target {
                DecodeTarget::Base(generation) if generation == self.base_generation => {
                    self.bitmaps.set_base(slot);
                    applied += 1;
                }
                DecodeTarget::Layer(id, ticket) if self.layer_tickets.get(&id) == Some(&ticket) => {
                    self.bitmaps.set_layer(id, slot);
                    applied += 1;
                }
                target => log::debug!("dropping stale decode result for {:?}", target),
            }
        }
        if applied > 0 {
            self.touch();
        }
        applied
    }

    // --- output -------------------------------------------------------------------------

    /// The current frame, re-rendered if anything changed since the last call.
    pub fn frame(&mut self) -> &Surface {
        self.poll_decodes();
        if self.rendered != Some(self.revision) {
            let layers = self.store.z_sorted();
            self.renderer.render(
                &mut self.surface,
                self.bitmaps.base(),
                &layers,
                self.controller.selected(),
                &self.bitmaps,
            );
            self.rendered = Some(self.revision);
        }
        &self.surface
    }

    /// Encode the current frame.
    pub fn export(&mut self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        encode_surface(self.frame(), format)
    }

    pub fn export_to(&mut self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let bytes = self.export(format)?;
        write_export(path, &bytes)
    }
}
