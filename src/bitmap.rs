// ============================================================================
// BITMAPS: image sources, background decoding, per-layer bitmap cache
// ============================================================================
//
// Decoding never happens inside the render loop. A source is handed to
// `DecodeQueue::request`, decoded on the rayon pool, and the result is picked
// up by the editor on its next poll. The renderer only reads `BitmapCache`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::layer::LayerId;

/// Where the encoded bytes of an image come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// A file on disk.
    Path(PathBuf),
    /// Base64 payload, optionally wrapped in a `data:<mime>;base64,` URL.
    Base64(String),
    /// Encoded bytes already in memory.
    #[serde(skip)]
    Bytes(Arc<Vec<u8>>),
}

impl ImageSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(Arc::new(bytes))
    }

    /// Resolve to encoded bytes.
    pub fn read_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        match self {
            ImageSource::Path(path) => std::fs::read(path).map_err(|e| DecodeError::Io {
                path: path.clone(),
                source: e,
            }),
            ImageSource::Base64(data) => {
                let payload = match data.split_once(";base64,") {
                    Some((prefix, rest)) if prefix.starts_with("data:") => rest,
                    _ => data.as_str(),
                };
                let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
                BASE64.decode(cleaned.as_bytes()).map_err(DecodeError::Base64)
            }
            ImageSource::Bytes(bytes) => Ok(bytes.as_ref().clone()),
        }
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Base64(data) => format!("<base64, {} chars>", data.len()),
            ImageSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a source into straight-alpha RGBA. Blocking.
pub fn decode_source(source: &ImageSource) -> Result<RgbaImage, DecodeError> {
    let bytes = source.read_bytes()?;
    let img = image::load_from_memory(&bytes)?;
    Ok(img.into_rgba8())
}

/// Natural pixel size of an encoded image, read from its header only.
pub fn read_dimensions(source: &ImageSource) -> Result<(u32, u32), DecodeError> {
    if let ImageSource::Path(path) = source {
        return Ok(image::image_dimensions(path)?);
    }
    let bytes = source.read_bytes()?;
    let reader = image::io::Reader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    Ok(reader.into_dimensions()?)
}

// ---------------------------------------------------------------------------
//  Cache
// ---------------------------------------------------------------------------

/// Decode status of one bitmap slot.
#[derive(Clone, Debug)]
pub enum BitmapSlot {
    Pending,
    Ready(Arc<RgbaImage>),
    Failed(String),
}

impl BitmapSlot {
    pub fn ready(&self) -> Option<&RgbaImage> {
        match self {
            BitmapSlot::Ready(img) => Some(img),
            _ => None,
        }
    }
}

/// Resolved bitmaps for the base image and each image layer.
#[derive(Default)]
pub struct BitmapCache {
    base: Option<BitmapSlot>,
    layers: HashMap<LayerId, BitmapSlot>,
}

impl BitmapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> Option<&RgbaImage> {
        self.base.as_ref().and_then(BitmapSlot::ready)
    }

    pub fn base_slot(&self) -> Option<&BitmapSlot> {
        self.base.as_ref()
    }

    pub fn set_base(&mut self, slot: BitmapSlot) {
        self.base = Some(slot);
    }

    pub fn layer(&self, id: LayerId) -> Option<&RgbaImage> {
        self.layers.get(&id).and_then(BitmapSlot::ready)
    }

    pub fn layer_slot(&self, id: LayerId) -> Option<&BitmapSlot> {
        self.layers.get(&id)
    }

    pub fn set_layer(&mut self, id: LayerId, slot: BitmapSlot) {
        self.layers.insert(id, slot);
    }

    pub fn remove_layer(&mut self, id: LayerId) {
        self.layers.remove(&id);
    }

    /// Share `from`'s slot with `to` (duplicated image layers).
    pub fn share(&mut self, from: LayerId, to: LayerId) -> bool {
        match self.layers.get(&from).cloned() {
            Some(slot) => {
                self.layers.insert(to, slot);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
//  Background decode queue
// ---------------------------------------------------------------------------

/// What a finished decode belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeTarget {
    /// Base image request, tagged with the request generation.
    Base(u64),
    /// Image layer request, tagged with a per-request ticket.
    Layer(LayerId, u64),
}

pub struct DecodeOutcome {
    pub target: DecodeTarget,
    pub source: String,
    pub result: Result<RgbaImage, DecodeError>,
}

/// Fire-and-forget decoding on the rayon pool, collected through a channel.
pub struct DecodeQueue {
    sender: Sender<DecodeOutcome>,
    receiver: Receiver<DecodeOutcome>,
    outstanding: usize,
}

impl Default for DecodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver, outstanding: 0 }
    }

    pub fn request(&mut self, target: DecodeTarget, source: ImageSource) {
        let sender = self.sender.clone();
        self.outstanding += 1;
        rayon::spawn(move || {
            let result = decode_source(&source);
            // The editor may be gone by now; a closed channel is fine.
            let _ = sender.send(DecodeOutcome {
                target,
                source: source.describe(),
                result,
            });
        });
    }

    /// Number of requests that have not been collected yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Collect every finished decode without blocking.
    pub fn drain(&mut self) -> Vec<DecodeOutcome> {
        let mut done = Vec::new();
        while let Ok(outcome) = self.receiver.try_recv() {
            done.push(outcome);
        }
        self.outstanding = self.outstanding.saturating_sub(done.len());
        done
    }

    /// Block until every outstanding request has finished.
    pub fn wait_all(&mut self) -> Vec<DecodeOutcome> {
        let mut done = Vec::with_capacity(self.outstanding);
        while self.outstanding > 0 {
            match self.receiver.recv() {
                Ok(outcome) => {
                    self.outstanding -= 1;
                    done.push(outcome);
                }
                Err(_) => break,
            }
        }
        done
    }
}
