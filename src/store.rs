// ============================================================================
// LAYER STORE: ordered layer collection and z-order bookkeeping
// ============================================================================
//
// `layers` keeps insertion order (what the layers panel lists). Paint order is
// defined solely by `z_index`, which is unique across the store and only ever
// assigned here.

use crate::layer::{Layer, LayerId, LayerInit, LayerPatch, LayerSummary};

/// Offset applied to a duplicated layer so it does not sit exactly on top.
pub const DUPLICATE_OFFSET: f32 = 20.0;

#[derive(Clone, Debug, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.get(id).is_some()
    }

    fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    /// Highest z-index in the store.
    pub fn max_z(&self) -> Option<i64> {
        self.layers.iter().map(|l| l.z_index).max()
    }

    fn next_z(&self) -> i64 {
        self.max_z().map_or(0, |z| z + 1)
    }

    /// Create a layer on top of the stack. Always succeeds.
    pub fn add_layer(&mut self, init: LayerInit) -> LayerId {
        let z = self.next_z();
        self.push(Layer::from_init(init, z))
    }

    /// Create a layer with a z-index of at least `floor`, still above
    /// everything already in the store.
    pub fn add_layer_at_least(&mut self, init: LayerInit, floor: i64) -> LayerId {
        let z = self.next_z().max(floor);
        self.push(Layer::from_init(init, z))
    }

    fn push(&mut self, layer: Layer) -> LayerId {
        let id = layer.id;
        log::debug!("layer {} added ({:?}, z={})", id, layer.kind(), layer.z_index);
        self.layers.push(layer);
        id
    }

    /// Merge `patch` into the layer. Returns `false` if the id is unknown.
    pub fn update_layer(&mut self, id: LayerId, patch: &LayerPatch) -> bool {
        let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) else {
            return false;
        };
        if !layer.apply_patch(patch) {
            log::debug!("ignored content patch of another kind for layer {}", id);
        }
        true
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let idx = self.position(id)?;
        Some(self.layers.remove(idx))
    }

    /// Copy a layer with a fresh id, offset by [`DUPLICATE_OFFSET`], on top.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Option<LayerId> {
        let src = self.get(id)?;
        let mut dup = src.clone();
        dup.id = LayerId::mint();
        dup.x += DUPLICATE_OFFSET;
        dup.y += DUPLICATE_OFFSET;
        dup.z_index = self.next_z();
        Some(self.push(dup))
    }

    /// Layers sorted bottom-to-top.
    pub fn z_sorted(&self) -> Vec<&Layer> {
        let mut sorted: Vec<&Layer> = self.layers.iter().collect();
        sorted.sort_by_key(|l| l.z_index);
        sorted
    }

    /// Position of the layer in paint order (0 = bottom).
    pub fn rank_of(&self, id: LayerId) -> Option<usize> {
        self.z_sorted().iter().position(|l| l.id == id)
    }

    /// Swap paint position with the layer directly above.
    pub fn move_up(&mut self, id: LayerId) -> bool {
        self.swap_with_neighbour(id, true)
    }

    /// Swap paint position with the layer directly below.
    pub fn move_down(&mut self, id: LayerId) -> bool {
        self.swap_with_neighbour(id, false)
    }

    fn swap_with_neighbour(&mut self, id: LayerId, upward: bool) -> bool {
        let order: Vec<LayerId> = self.z_sorted().iter().map(|l| l.id).collect();
        let Some(rank) = order.iter().position(|&l| l == id) else {
            return false;
        };
        let neighbour_rank = if upward {
            if rank + 1 >= order.len() {
                return false;
            }
            rank + 1
        } else {
            if rank == 0 {
                return false;
            }
            rank - 1
        };

        // Exchanging the two values keeps every other index untouched and
        // stays unique even when the indices have gaps.
        let (Some(a), Some(b)) = (self.position(id), self.position(order[neighbour_rank])) else {
            return false;
        };
        let za = self.layers[a].z_index;
        self.layers[a].z_index = self.layers[b].z_index;
        self.layers[b].z_index = za;
        true
    }

    /// Rows for a layers panel, in insertion order.
    pub fn summaries(&self, selected: Option<LayerId>) -> Vec<LayerSummary> {
        self.layers
            .iter()
            .map(|l| LayerSummary {
                id: l.id,
                kind: l.kind(),
                label: l.display_label(),
                x: l.x,
                y: l.y,
                z_index: l.z_index,
                selected: selected == Some(l.id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ShapeType;
    use std::collections::HashSet;

    fn rect() -> LayerInit {
        LayerInit::shape(ShapeType::Rectangle)
    }

    fn assert_z_consistent(store: &LayerStore) {
        let z: Vec<i64> = store.z_sorted().iter().map(|l| l.z_index()).collect();
        assert!(z.windows(2).all(|w| w[0] < w[1]), "z not strictly ascending: {:?}", z);
        let unique: HashSet<i64> = z.iter().copied().collect();
        assert_eq!(unique.len(), store.len());
    }

    #[test]
    fn add_assigns_increasing_z_from_zero() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect());
        let b = store.add_layer(rect());
        assert_eq!(store.get(a).unwrap().z_index(), 0);
        assert_eq!(store.get(b).unwrap().z_index(), 1);
    }

    #[test]
    fn stale_ids_are_no_ops() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect());
        store.remove_layer(a);
        assert!(!store.update_layer(a, &LayerPatch::position(1.0, 1.0)));
        assert!(store.remove_layer(a).is_none());
        assert!(store.duplicate_layer(a).is_none());
        assert!(!store.move_up(a));
        assert!(!store.move_down(a));
    }

    #[test]
    fn duplicate_offsets_and_takes_new_identity() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect().at(100.0, 100.0));
        store.add_layer(rect());
        let dup = store.duplicate_layer(a).unwrap();
        let copy = store.get(dup).unwrap();
        assert_ne!(dup, a);
        assert_eq!((copy.x, copy.y), (120.0, 120.0));
        let others = store.layers().iter().filter(|l| l.id() != dup);
        assert!(others.into_iter().all(|l| l.z_index() < copy.z_index()));
    }

    #[test]
    fn move_up_and_down_swap_only_two_layers() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect());
        let b = store.add_layer(rect());
        let c = store.add_layer(rect());

        assert!(store.move_up(a));
        let order: Vec<LayerId> = store.z_sorted().iter().map(|l| l.id()).collect();
        assert_eq!(order, vec![b, a, c]);
        assert_eq!(store.get(c).unwrap().z_index(), 2);

        assert!(!store.move_up(c));
        assert!(!store.move_down(b));
        assert!(store.move_down(c));
        let order: Vec<LayerId> = store.z_sorted().iter().map(|l| l.id()).collect();
        assert_eq!(order, vec![b, c, a]);
    }

    #[test]
    fn reorder_survives_gapped_indices() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect());
        let _gap = store.add_layer(rect());
        let imported = store.add_layer_at_least(rect(), 100);
        let top = store.add_layer(rect());
        store.remove_layer(_gap);
        assert_eq!(store.get(imported).unwrap().z_index(), 100);
        assert_eq!(store.get(top).unwrap().z_index(), 101);

        assert!(store.move_up(a));
        let order: Vec<LayerId> = store.z_sorted().iter().map(|l| l.id()).collect();
        assert_eq!(order, vec![imported, a, top]);
        assert_z_consistent(&store);
    }

    #[test]
    fn z_order_stays_consistent_under_mixed_operations() {
        let mut store = LayerStore::new();
        let mut ids: Vec<LayerId> = Vec::new();
        // Small deterministic LCG so the sequence is reproducible.
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = |n: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % n.max(1)
        };

        for _ in 0..400 {
            match next(5) {
                0 => ids.push(store.add_layer(rect())),
                1 if !ids.is_empty() => {
                    let id = ids[next(ids.len())];
                    store.move_up(id);
                }
                2 if !ids.is_empty() => {
                    let id = ids[next(ids.len())];
                    store.move_down(id);
                }
                3 if !ids.is_empty() => {
                    let id = ids.remove(next(ids.len()));
                    store.remove_layer(id);
                }
                4 if !ids.is_empty() => {
                    let id = ids[next(ids.len())];
                    if let Some(dup) = store.duplicate_layer(id) {
                        ids.push(dup);
                    }
                }
                _ => ids.push(store.add_layer(rect())),
            }
            assert_z_consistent(&store);
            assert_eq!(store.len(), ids.len());
        }
    }

    #[test]
    fn move_up_then_down_restores_order() {
        let mut store = LayerStore::new();
        let ids: Vec<LayerId> = (0..4).map(|_| store.add_layer(rect())).collect();
        let before: Vec<LayerId> = store.z_sorted().iter().map(|l| l.id()).collect();
        assert!(store.move_up(ids[1]));
        assert!(store.move_down(ids[1]));
        let after: Vec<LayerId> = store.z_sorted().iter().map(|l| l.id()).collect();
        assert_eq!(before, after);
        assert_eq!(store.rank_of(ids[3]), Some(3));
    }

    #[test]
    fn summaries_mark_selection() {
        let mut store = LayerStore::new();
        let a = store.add_layer(rect());
        let b = store.add_layer(LayerInit::text("HELLO"));
        let rows = store.summaries(Some(b));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a);
        assert!(!rows[0].selected);
        assert_eq!(rows[1].label, "HELLO");
        assert!(rows[1].selected);
    }
}
