//! Uploaded photo storage.
//!
//! Files live flat in the uploads directory under `<16 hex>-<sanitized name>`
//! and are addressed publicly as `/uploads/<name>`. Raster payloads are
//! decoded and re-encoded before they touch the disk so EXIF/XMP blocks
//! (GPS positions, camera serials) never get stored.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::AppError;

pub const PUBLIC_PREFIX: &str = "/uploads/";
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
const MAX_FILENAME_LEN: usize = 255;
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the uploads directory if needed.
    pub async fn initialize(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.root).await?;
        info!(path = %self.root.display(), "photo store initialized");
        Ok(())
    }

    /// Validate, scrub and persist an upload. Returns its public path.
    pub async fn save(&self, original_filename: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        if !is_allowed(original_filename) {
            return Err(AppError::validation(format!(
                "Unsupported photo type. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
        let sanitized = sanitize_filename(original_filename)
            .ok_or_else(|| AppError::validation("Invalid photo filename"))?;

        let (clean, ext) = tokio::task::spawn_blocking(move || strip_metadata(&bytes))
            .await
            .map_err(|e| AppError::UnexpectedError(format!("image task failed: {e}")))??;

        let name = unique_name(&with_extension(&sanitized, ext));
        let path = self.root.join(&name);

        fs::create_dir_all(&self.root).await?;
        write_atomically(&path, &clean).await?;

        debug!(file = %name, bytes = clean.len(), "stored photo");
        Ok(format!("{PUBLIC_PREFIX}{name}"))
    }

    /// Map a public path (or bare file name) to a path under the root.
    pub fn resolve(&self, public_path: &str) -> Result<PathBuf, AppError> {
        let name = public_path.strip_prefix(PUBLIC_PREFIX).unwrap_or(public_path);
        let unsafe_name = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
            || name.contains("..");
        if unsafe_name {
            return Err(AppError::FileNotFound(public_path.to_string()));
        }
        Ok(self.root.join(name))
    }

    pub async fn read(&self, public_path: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(public_path)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::FileNotFound(public_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored photo. A missing file is not an error.
    pub async fn remove(&self, public_path: &str) -> Result<(), AppError> {
        let path = self.resolve(public_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %public_path, "removed photo");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write through a sibling `.tmp` file and rename it into place. The temp
/// file is removed again when any step fails.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let temp_path = path.with_extension("tmp");
    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temp_path).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp photo");
        }
        return Err(e.into());
    }
    Ok(())
}

pub fn is_allowed(filename: &str) -> bool {
    extension_of(filename)
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn extension_of(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

/// Keep only `[A-Za-z0-9_-]` in the stem of the final path component.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        return None;
    }
    let stem: String = stem
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = match stem.trim_matches('_') {
        "" => "photo",
        s => s,
    };
    let budget = MAX_FILENAME_LEN.saturating_sub(17 + ext.len() + 1);
    let stem: String = stem.chars().take(budget).collect();
    Some(format!("{stem}.{ext}"))
}

fn unique_name(sanitized: &str) -> String {
    format!("{:016x}-{sanitized}", rand::random::<u64>())
}

/// Swap the extension when the payload turned out to be another format.
fn with_extension(sanitized: &str, ext: &str) -> String {
    match sanitized.rsplit_once('.') {
        Some((_, current)) if ext == "jpg" && current == "jpeg" => sanitized.to_string(),
        Some((stem, current)) if current != ext => format!("{stem}.{ext}"),
        _ => sanitized.to_string(),
    }
}

/// Decode and re-encode so only pixel data survives.
fn strip_metadata(bytes: &[u8]) -> Result<(Vec<u8>, &'static str), AppError> {
    let format = image::guess_format(bytes)?;
    let mut out = Vec::with_capacity(bytes.len());
    match format {
        ImageFormat::Gif => {
            // GIF carries no EXIF; re-encoding would drop animation frames.
            image::load_from_memory_with_format(bytes, format)?;
            out.extend_from_slice(bytes);
            Ok((out, "gif"))
        }
        ImageFormat::Png => {
            let img = image::load_from_memory_with_format(bytes, format)?;
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
            Ok((out, "png"))
        }
        ImageFormat::Jpeg => {
            let img = image::load_from_memory_with_format(bytes, format)?;
            let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            encoder.encode_image(&img.to_rgb8())?;
            Ok((out, "jpg"))
        }
        ImageFormat::WebP => {
            let img = image::load_from_memory_with_format(bytes, format)?;
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)?;
            Ok((out, "webp"))
        }
        _ => Err(AppError::validation(
            "Unsupported photo type. Allowed: png, jpg, jpeg, gif, webp",
        )),
    }
}
