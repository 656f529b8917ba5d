// ============================================================================
// ThumbFE CLI: headless thumbnail composition via command-line arguments
// ============================================================================
//
// Usage examples:
//   thumbfe --base bg.png --scene layers.json --output thumb.png
//   thumbfe --base bg.jpg --overlay "logos/*.png" -o thumb.jpg --quality 85
//   thumbfe --scene scene.json --font Impact.ttf -o out.bmp --keep-selection
//
// The composition is built through the same `Editor` the interactive front end
// drives, so the exported file is pixel-identical to what the editor shows.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::bitmap::{ImageSource, read_dimensions};
use crate::editor::Editor;
use crate::import::OverlayImage;
use crate::io::{DEFAULT_JPEG_QUALITY, ExportFormat};
use crate::ops::text::FontBook;
use crate::scene::SceneFile;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ThumbFE headless thumbnail composer.
///
/// Composite text, shape and image layers over a base image and export a
/// 1792x1024 thumbnail.
#[derive(Parser, Debug)]
#[command(
    name = "thumbfe",
    about = "ThumbFE headless thumbnail composer",
    long_about = "Compose a 1792x1024 thumbnail from a base image, a JSON scene of\n\
                  text/shape/image layers and imported overlay images, then export\n\
                  it as PNG, JPEG or BMP.\n\n\
                  Example:\n  \
                  thumbfe --base bg.png --scene layers.json --output thumb.png\n  \
                  thumbfe --base bg.jpg --overlay \"logos/*.png\" -o thumb.jpg"
)]
pub struct CliArgs {
    /// Base image stretched to fill the canvas.
    #[arg(short, long, value_name = "FILE")]
    pub base: Option<PathBuf>,

    /// Scene file describing layers, overlays and the selected layer.
    #[arg(short, long, value_name = "FILE.json")]
    pub scene: Option<PathBuf>,

    /// Overlay image(s) imported as one batch. Glob patterns accepted.
    #[arg(long, num_args = 1.., value_name = "PATTERN")]
    pub overlay: Vec<String>,

    /// Output file path.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Output format: png, jpeg, bmp.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100, default 90).
    #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY, value_name = "1-100")]
    pub quality: u8,

    /// Keep the selected layer's dashed outline in the exported image.
    #[arg(long)]
    pub keep_selection: bool,

    /// TTF/OTF font used for every text layer instead of system lookup.
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Print progress and timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the composition and return an OS exit code.
/// `0` = exported, `1` = any failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match compose(&args) {
        Ok(format) => {
            if args.verbose {
                println!(
                    "{} ({}, {:.0}ms)",
                    args.output.display(),
                    format.mime_type(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            // The session logger mirrors errors to stderr.
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Composition pipeline
// ============================================================================

fn compose(args: &CliArgs) -> Result<ExportFormat, String> {
    let format = parse_format(args.format.as_deref(), &args.output, args.quality)?;

    // -- Step 1: Fonts -----------------------------------------------------
    let mut editor = Editor::new();
    if let Some(path) = &args.font {
        let font = FontBook::load_file(path).map_err(|e| e.to_string())?;
        editor.fonts_mut().register(font);
    }

    // -- Step 2: Base, scene, overlays ---------------------------------------
    if let Some(base) = &args.base {
        editor.set_base_image(ImageSource::Path(base.clone()));
    }
    if let Some(path) = &args.scene {
        let scene = SceneFile::load(path).map_err(|e| e.to_string())?;
        scene.apply(&mut editor).map_err(|e| e.to_string())?;
    }
    if !args.overlay.is_empty() {
        let inputs = resolve_inputs(&args.overlay);
        if inputs.is_empty() {
            return Err("no overlay files matched the given pattern(s)".to_string());
        }
        let overlays = overlay_batch(&inputs)?;
        editor.import_overlays(&overlays);
    }

    // -- Step 3: Decode, render, export ---------------------------------------
    let decoded = editor.wait_for_decodes();
    if args.verbose {
        println!("decoded {} image(s), {} layer(s)", decoded, editor.layers().len());
    }
    if !args.keep_selection {
        editor.select(None);
    }
    editor.export_to(&args.output, format).map_err(|e| e.to_string())?;
    Ok(format)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path: use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    log::warn!("pattern '{}' matched no files", pattern);
                }
            }
            Err(e) => {
                log::warn!("invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// One overlay per file, identified by its path, sized from the file header.
fn overlay_batch(paths: &[PathBuf]) -> Result<Vec<OverlayImage>, String> {
    paths
        .iter()
        .map(|path| {
            let source = ImageSource::Path(path.clone());
            let (width, height) = read_dimensions(&source)
                .map_err(|e| format!("overlay '{}': {}", path.display(), e))?;
            Ok(OverlayImage { id: path.display().to_string(), source, width, height })
        })
        .collect()
}

/// Choose the [`ExportFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when the extension is unknown.
fn parse_format(format_arg: Option<&str>, output: &Path, quality: u8) -> Result<ExportFormat, String> {
    if let Some(f) = format_arg {
        return ExportFormat::from_name(f, quality)
            .ok_or_else(|| format!("unsupported format '{}' (expected png, jpeg or bmp)", f));
    }
    Ok(ExportFormat::from_path(output, quality).unwrap_or_default())
}
