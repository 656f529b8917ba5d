// ============================================================================
// EXPORT: encode the rendered surface and write it atomically
// ============================================================================

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageError};

use crate::surface::Surface;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    /// Quality 1..=100; alpha is discarded.
    Jpeg { quality: u8 },
    Bmp,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg { .. } => "jpg",
            ExportFormat::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg { .. } => "image/jpeg",
            ExportFormat::Bmp => "image/bmp",
        }
    }

    /// Parse a format name (`png`, `jpg`/`jpeg`, `bmp`).
    pub fn from_name(name: &str, quality: u8) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg { quality: quality.clamp(1, 100) }),
            "bmp" => Some(ExportFormat::Bmp),
            _ => None,
        }
    }

    /// Infer the format from a file extension.
    pub fn from_path(path: &Path, quality: u8) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| Self::from_name(e, quality))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("surface is empty ({0}x{1})")]
    EmptySurface(u32, u32),
    #[error("encoding failed: {0}")]
    Encode(#[from] ImageError),
    #[error("could not write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Encode the surface exactly as last rendered.
pub fn encode_surface(surface: &Surface, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let image = surface.pixels();
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(ExportError::EmptySurface(w, h));
    }

    let mut out = Cursor::new(Vec::new());
    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut out).write_image(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
        ExportFormat::Jpeg { quality } => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder.encode(rgb_image.as_raw(), w, h, image::ColorType::Rgb8)?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut out);
            encoder.encode(image.as_raw(), w, h, image::ColorType::Rgba8)?;
        }
    }
    Ok(out.into_inner())
}

/// Write `bytes` to `path` via a sibling temporary file and a rename, so the
/// destination is either the old file or the complete new one.
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let write_err = |source: std::io::Error| ExportError::Write { path: path.to_path_buf(), source };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    log::info!("exported {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
