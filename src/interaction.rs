// ============================================================================
// INTERACTION: selection, hit-testing and drag-to-move
// ============================================================================

use crate::geometry::Viewport;
use crate::layer::{LayerId, LayerPatch};
use crate::render::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::store::LayerStore;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    /// `grab_*` is the pointer offset from the layer's top-left at press time.
    Dragging { layer: LayerId, grab_x: f32, grab_y: f32 },
}

/// Pointer state machine. Owns the selection; layers never carry it.
#[derive(Clone, Debug)]
pub struct InteractionController {
    selected: Option<LayerId>,
    drag: DragState,
    viewport: Viewport,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            selected: None,
            drag: DragState::Idle,
            viewport: Viewport::identity(CANVAS_WIDTH as f32, CANVAS_HEIGHT as f32),
        }
    }

    pub fn selected(&self) -> Option<LayerId> {
        self.selected
    }

    /// Selecting a different layer ends any drag of the previous one.
    pub fn select(&mut self, id: Option<LayerId>) {
        if let DragState::Dragging { layer, .. } = self.drag
            && Some(layer) != id
        {
            self.drag = DragState::Idle;
        }
        self.selected = id;
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Topmost layer whose unrotated box contains the canvas point.
    pub fn hit_test(store: &LayerStore, cx: f32, cy: f32) -> Option<LayerId> {
        store
            .z_sorted()
            .into_iter()
            .rev()
            .find(|l| l.contains(cx, cy))
            .map(|l| l.id())
    }

    /// Press at a screen position: select the topmost hit and start dragging
    /// it, or clear the selection on empty canvas. Returns the new selection.
    pub fn pointer_down(&mut self, store: &LayerStore, screen_x: f32, screen_y: f32) -> Option<LayerId> {
        let (cx, cy) = self.viewport.to_canvas(screen_x, screen_y);
        match Self::hit_test(store, cx, cy).and_then(|id| store.get(id)) {
            Some(layer) => {
                let id = layer.id();
                self.selected = Some(id);
                self.drag = DragState::Dragging {
                    layer: id,
                    grab_x: cx - layer.x,
                    grab_y: cy - layer.y,
                };
                log::debug!("drag start on {} at ({:.1}, {:.1})", id, cx, cy);
            }
            None => {
                self.selected = None;
                self.drag = DragState::Idle;
            }
        }
        self.selected
    }

    /// Move the dragged layer so the grab point follows the pointer. Returns
    /// `true` if a layer moved.
    pub fn pointer_move(&mut self, store: &mut LayerStore, screen_x: f32, screen_y: f32) -> bool {
        let DragState::Dragging { layer, grab_x, grab_y } = self.drag else {
            return false;
        };
        let (cx, cy) = self.viewport.to_canvas(screen_x, screen_y);
        if store.update_layer(layer, &LayerPatch::position(cx - grab_x, cy - grab_y)) {
            true
        } else {
            // The layer vanished mid-drag.
            self.drag = DragState::Idle;
            false
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.drag = DragState::Idle;
    }

    /// Drop any reference to a removed layer.
    pub fn forget(&mut self, id: LayerId) {
        if self.selected == Some(id) {
            self.selected = None;
        }
        if let DragState::Dragging { layer, .. } = self.drag
            && layer == id
        {
            self.drag = DragState::Idle;
        }
    }
}
