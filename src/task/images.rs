//! In-place image recompression.
//!
//! PNG files are re-encoded losslessly at maximum compression and JPEG
//! files at a fixed quality. The new encoding replaces the source only
//! when it is strictly smaller, and the surviving content is remembered
//! by hash under `.cache/img/`, so the task reaches a fixed point:
//! re-running it does nothing and costs almost nothing.

use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::time::Instant;

use camino::Utf8Path;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

use crate::config::Project;
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Couldn't read or write the image.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't process the image.\n{0}")]
    Image(#[from] image::ImageError),
}

const JPEG_QUALITY: u8 = 80;

/// Recompresses the images in `src/assets/images/` in place. Only PNG
/// and JPEG are re-encoded; GIF, ICO and SVG pass through untouched.
pub struct Images {
    files: FileSet,
}

impl Images {
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            files: FileSet::new([format!("{}/*", project.images())])?
                .extensions(&["png", "jpg", "jpeg", "gif", "ico", "svg"]),
        })
    }
}

impl Task for Images {
    fn name(&self) -> &'static str {
        "minify-image"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let files = self.files.walk()?;

        let cache = ctx.project.cache().join("img");
        fs::create_dir_all(&cache)?;

        let outcomes: Vec<Outcome> = files
            .par_iter()
            .map(|file| match compress_one(file, &cache) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("{file}: {err}");
                    Outcome::Failed
                }
            })
            .collect();

        let summary = Summary::collect(outcomes);
        tracing::info!("Compressed {} images {}", summary.processed, as_overhead(s));
        Ok(summary)
    }
}

enum Encoding {
    Png,
    Jpeg,
}

fn compress_one(file: &Utf8Path, cache: &Utf8Path) -> Result<Outcome, ImageError> {
    let encoding = match file.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("png") => Encoding::Png,
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            Encoding::Jpeg
        }
        // Formats we never re-encode.
        _ => return Ok(Outcome::Skipped),
    };

    // FAST PATH: content already known to be at its fixed point.
    let hash = hash_file(file)?;
    let marker = cache.join(&hash);
    if marker.exists() {
        return Ok(Outcome::Skipped);
    }

    let original = fs::metadata(file)?.len();
    let encoded = reencode(file, encoding)?;

    if (encoded.len() as u64) < original {
        fs::write(file, &encoded)?;
        fs::write(cache.join(hash_bytes(&encoded)), [])?;
        Ok(Outcome::Processed)
    } else {
        // Already as small as this encoder gets it.
        fs::write(marker, [])?;
        Ok(Outcome::Skipped)
    }
}

fn reencode(file: &Utf8Path, encoding: Encoding) -> Result<Vec<u8>, ImageError> {
    let reader = BufReader::new(File::open(file)?);
    let image = ImageReader::new(reader).with_guessed_format()?.decode()?;
    let (width, height) = (image.width(), image.height());

    let mut buffer = Cursor::new(Vec::new());

    match encoding {
        Encoding::Png => {
            let pixels = image.to_rgba8();
            PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive)
                .write_image(&pixels, width, height, ExtendedColorType::Rgba8)?;
        }
        Encoding::Jpeg => {
            let pixels = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY) //
                .write_image(&pixels, width, height, ExtendedColorType::Rgb8)?;
        }
    }

    Ok(buffer.into_inner())
}

fn hash_file(path: &Utf8Path) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
