// ============================================================================
// OVERLAY IMPORT: one-shot placement of externally supplied image batches
// ============================================================================

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::bitmap::ImageSource;
use crate::layer::{LayerId, LayerInit};
use crate::render::{CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::store::LayerStore;

/// Imported overlays are scaled down to this fraction of their natural size.
pub const IMPORT_SCALE: f32 = 0.4;
/// Each further overlay in a batch is shifted by this much on both axes.
pub const IMPORT_STAGGER: f32 = 50.0;
/// Z-index floor of the first overlay in a batch.
pub const IMPORT_Z_BASE: i64 = 100;

/// An externally supplied image with its natural pixel size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayImage {
    pub id: String,
    pub source: ImageSource,
    pub width: u32,
    pub height: u32,
}

/// Where an overlay at batch index `index` lands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub z_floor: i64,
}

pub fn placement(index: usize, natural_width: u32, natural_height: u32) -> Placement {
    let width = natural_width as f32 * IMPORT_SCALE;
    let height = natural_height as f32 * IMPORT_SCALE;
    let stagger = index as f32 * IMPORT_STAGGER;
    Placement {
        x: (CANVAS_WIDTH as f32 - width) / 2.0 + stagger,
        y: (CANVAS_HEIGHT as f32 - height) / 2.0 + stagger,
        width,
        height,
        z_floor: IMPORT_Z_BASE + index as i64,
    }
}

/// Key identifying a batch: its overlay ids, in order.
pub fn batch_key(overlays: &[OverlayImage]) -> Vec<String> {
    overlays.iter().map(|o| o.id.clone()).collect()
}

/// Remembers which batches were already placed so a repeated delivery of the
/// same batch does not stack duplicate layers.
#[derive(Clone, Debug, Default)]
pub struct Importer {
    imported: HashSet<Vec<String>>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_imported(&self, overlays: &[OverlayImage]) -> bool {
        self.imported.contains(&batch_key(overlays))
    }

    /// Add one image layer per overlay. Returns the new ids in batch order;
    /// empty when the batch is empty or was seen before.
    pub fn import(&mut self, store: &mut LayerStore, overlays: &[OverlayImage]) -> Vec<LayerId> {
        if overlays.is_empty() {
            return Vec::new();
        }
        if !self.imported.insert(batch_key(overlays)) {
            log::debug!("overlay batch of {} already imported, skipping", overlays.len());
            return Vec::new();
        }

        let ids: Vec<LayerId> = overlays
            .iter()
            .enumerate()
            .map(|(i, overlay)| {
                let p = placement(i, overlay.width, overlay.height);
                let init = LayerInit::image(overlay.source.clone())
                    .at(p.x, p.y)
                    .size(p.width, p.height);
                store.add_layer_at_least(init, p.z_floor)
            })
            .collect();
        log::info!("imported {} overlay(s)", ids.len());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerKind, ShapeType};

    fn overlay(id: &str, w: u32, h: u32) -> OverlayImage {
        OverlayImage {
            id: id.to_string(),
            source: ImageSource::Base64(String::new()),
            width: w,
            height: h,
        }
    }

    #[test]
    fn placement_centers_and_staggers() {
        let p0 = placement(0, 1000, 500);
        assert_eq!((p0.width, p0.height), (400.0, 200.0));
        assert_eq!((p0.x, p0.y), (696.0, 412.0));
        assert_eq!(p0.z_floor, 100);

        let p2 = placement(2, 1000, 500);
        assert_eq!((p2.x, p2.y), (796.0, 512.0));
        assert_eq!(p2.z_floor, 102);
    }

    #[test]
    fn batch_is_imported_once() {
        let mut store = LayerStore::new();
        let mut importer = Importer::new();
        let batch = vec![overlay("a", 100, 100), overlay("b", 200, 100)];

        let ids = importer.import(&mut store, &batch);
        assert_eq!(ids.len(), 2);
        assert!(importer.was_imported(&batch));
        assert!(importer.import(&mut store, &batch).is_empty());
        assert_eq!(store.len(), 2);

        let other = vec![overlay("c", 100, 100)];
        assert_eq!(importer.import(&mut store, &other).len(), 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn empty_batch_does_nothing() {
        let mut store = LayerStore::new();
        let mut importer = Importer::new();
        assert!(importer.import(&mut store, &[]).is_empty());
        assert!(store.is_empty());
        assert!(!importer.was_imported(&[]));
    }

    #[test]
    fn imported_layers_sit_above_existing_content() {
        let mut store = LayerStore::new();
        for _ in 0..3 {
            store.add_layer(LayerInit::shape(ShapeType::Rectangle));
        }
        let mut importer = Importer::new();
        let ids = importer.import(&mut store, &[overlay("a", 10, 10), overlay("b", 10, 10)]);
        let z: Vec<i64> = ids.iter().map(|id| store.get(*id).unwrap().z_index()).collect();
        assert_eq!(z, vec![100, 101]);
        assert!(ids.iter().all(|id| store.get(*id).unwrap().kind() == LayerKind::Image));
    }
}
