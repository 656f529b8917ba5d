// ============================================================================
// SCENE FILES: JSON description of a composition for headless rendering
// ============================================================================
//
// {
//   "base": { "path": "bg.png" },
//   "overlays": [ { "id": "logo", "source": { "path": "logo.png" } } ],
//   "layers": [ { "kind": "text", "text": "HELLO", "x": 100, "y": 100 } ],
//   "selected": 0
// }
//
// Relative paths are resolved against the scene file's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bitmap::{DecodeError, ImageSource, read_dimensions};
use crate::editor::Editor;
use crate::import::OverlayImage;
use crate::layer::{LayerContent, LayerId, LayerInit};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("could not read scene '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("overlay '{id}': {source}")]
    Overlay {
        id: String,
        #[source]
        source: DecodeError,
    },
    #[error("selected layer index {index} is out of range ({count} layers)")]
    SelectionOutOfRange { index: usize, count: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneOverlay {
    pub id: String,
    pub source: ImageSource,
    /// Natural size; read from the image header when omitted.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub base: Option<ImageSource>,
    #[serde(default)]
    pub overlays: Vec<SceneOverlay>,
    #[serde(default)]
    pub layers: Vec<LayerInit>,
    /// Index into `layers` to select after loading.
    #[serde(default)]
    pub selected: Option<usize>,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let text = std::fs::read_to_string(path).map_err(|e| SceneError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut scene: SceneFile = serde_json::from_str(&text).map_err(|e| SceneError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(dir) = path.parent() {
            scene.resolve_paths(dir);
        }
        Ok(scene)
    }

    /// Make every relative file path absolute with respect to `dir`.
    pub fn resolve_paths(&mut self, dir: &Path) {
        let fix = |source: &mut ImageSource| {
            if let ImageSource::Path(p) = source
                && p.is_relative()
            {
                *p = dir.join(&*p);
            }
        };
        if let Some(base) = &mut self.base {
            fix(base);
        }
        for overlay in &mut self.overlays {
            fix(&mut overlay.source);
        }
        for layer in &mut self.layers {
            if let LayerContent::Image(image) = &mut layer.content {
                fix(&mut image.source);
            }
        }
    }

    /// Overlays with their natural sizes filled in.
    pub fn overlay_images(&self) -> Result<Vec<OverlayImage>, SceneError> {
        self.overlays
            .iter()
            .map(|o| {
                let (width, height) = match (o.width, o.height) {
                    (Some(w), Some(h)) => (w, h),
                    _ => read_dimensions(&o.source).map_err(|e| SceneError::Overlay {
                        id: o.id.clone(),
                        source: e,
                    })?,
                };
                Ok(OverlayImage { id: o.id.clone(), source: o.source.clone(), width, height })
            })
            .collect()
    }

    /// Load the scene into `editor`: base image, then layers in order, then
    /// the overlay batch. Returns the ids of the `layers` entries.
    pub fn apply(&self, editor: &mut Editor) -> Result<Vec<LayerId>, SceneError> {
        if let Some(index) = self.selected
            && index >= self.layers.len()
        {
            return Err(SceneError::SelectionOutOfRange { index, count: self.layers.len() });
        }
        let overlays = self.overlay_images()?;

        if let Some(base) = &self.base {
            editor.set_base_image(base.clone());
        }
        let ids: Vec<LayerId> = self.layers.iter().map(|init| editor.add_layer(init.clone())).collect();
        editor.import_overlays(&overlays);

        if let Some(index) = self.selected {
            editor.select(ids.get(index).copied());
        }
        log::info!(
            "scene applied: {} layer(s), {} overlay(s)",
            ids.len(),
            overlays.len()
        );
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;

    #[test]
    fn parses_a_minimal_scene() {
        let scene: SceneFile = serde_json::from_str(
            r##"{
                "base": { "path": "bg.png" },
                "layers": [
                    { "kind": "text", "text": "HELLO", "x": 100, "y": 100, "width": 600, "height": 100 },
                    { "kind": "shape", "shape_type": "circle", "x": 80, "y": 80, "width": 120, "height": 120,
                      "fill_color": "#ff0000" }
                ],
                "selected": 1
            }"##,
        )
        .unwrap();
        assert_eq!(scene.layers.len(), 2);
        assert_eq!(scene.layers[1].content.kind(), LayerKind::Shape);
        assert_eq!(scene.selected, Some(1));
        assert!(scene.overlays.is_empty());
    }

    #[test]
    fn relative_paths_follow_the_scene_file() {
        let mut scene: SceneFile = serde_json::from_str(
            r#"{ "base": { "path": "bg.png" },
                 "overlays": [ { "id": "a", "source": { "path": "/abs/a.png" }, "width": 10, "height": 10 } ] }"#,
        )
        .unwrap();
        scene.resolve_paths(Path::new("/scenes/one"));
        assert_eq!(scene.base, Some(ImageSource::Path("/scenes/one/bg.png".into())));
        assert_eq!(scene.overlays[0].source, ImageSource::Path("/abs/a.png".into()));
    }

    #[test]
    fn apply_selects_requested_layer() {
        let scene: SceneFile = serde_json::from_str(
            r#"{ "layers": [ { "kind": "shape", "shape_type": "rectangle" },
                             { "kind": "shape", "shape_type": "circle" } ],
                 "selected": 0 }"#,
        )
        .unwrap();
        let mut editor = Editor::new();
        let ids = scene.apply(&mut editor).unwrap();
        assert_eq!(editor.selected(), Some(ids[0]));
        assert_eq!(editor.layers().len(), 2);
    }

    #[test]
    fn out_of_range_selection_is_rejected_before_mutating() {
        let scene = SceneFile { selected: Some(3), ..SceneFile::default() };
        let mut editor = Editor::new();
        assert!(matches!(
            scene.apply(&mut editor),
            Err(SceneError::SelectionOutOfRange { index: 3, count: 0 })
        ));
        assert!(editor.layers().is_empty());
    }

    #[test]
    fn missing_scene_file_reports_io_error() {
        let err = SceneFile::load(Path::new("/no/such/scene.json")).unwrap_err();
        assert!(matches!(err, SceneError::Io { .. }));
    }
}
