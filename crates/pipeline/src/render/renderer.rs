use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use core_types::raw_jpeg::find_embedded_jpeg;
use image::{imageops::FilterType, DynamicImage, ImageBuffer};
use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};

/// Longest edge of a grid thumbnail rendition.
pub const THUMBNAIL_MAX_DIM: u32 = 256;
/// Longest edge of a loupe preview rendition.
pub const PREVIEW_MAX_DIM: u32 = 2048;

/// A decoded, downscaled rendition along with the source's full pixel
/// dimensions, which the catalog back-fills onto the asset record.
pub struct Rendered {
    pub image: DynamicImage,
    pub source_width: u32,
    pub source_height: u32,
}

/// Pixel decoding seam. The render queue never touches codecs directly so
/// tests can swap in a deterministic implementation.
pub trait Renderer: Send + Sync {
    fn render(&self, path: &Path, max_dim: u32) -> Result<Rendered>;
}

/// Production renderer: decode via the image crate, fall back to the
/// embedded JPEG preview that RAW containers carry when direct decoding
/// fails or panics.
#[derive(Debug, Default)]
pub struct ImageRenderer;

impl Renderer for ImageRenderer {
    fn render(&self, path: &Path, max_dim: u32) -> Result<Rendered> {
        let source = load_source(path)?;
        let (source_width, source_height) = (source.width(), source.height());
        let image = source.resize(max_dim, max_dim, FilterType::Lanczos3);
        Ok(Rendered {
            image,
            source_width,
            source_height,
        })
    }
}

fn load_source(path: &Path) -> Result<DynamicImage> {
    // RAW containers can't be decoded directly; go straight to the
    // embedded preview they carry.
    let is_raw = path
        .extension()
        .and_then(|e| e.to_str())
        .map(core_types::is_raw_extension)
        .unwrap_or(false);
    if is_raw {
        let bytes = find_embedded_jpeg(path)?
            .ok_or_else(|| anyhow!("no embedded preview found in {:?}", path))?;
        return decode_embedded_jpeg(&bytes)
            .with_context(|| format!("failed to decode embedded JPEG preview for {:?}", path));
    }

    // Some codecs panic on malformed input, so the direct decode runs
    // inside catch_unwind before we reach for the embedded preview.
    match catch_unwind(AssertUnwindSafe(|| image::open(path))) {
        Ok(Ok(img)) => Ok(img),
        Ok(Err(open_err)) => {
            if let Some(bytes) = find_embedded_jpeg(path)? {
                decode_embedded_jpeg(&bytes)
                    .with_context(|| format!("failed to decode embedded JPEG preview for {:?}", path))
            } else {
                Err(anyhow!(open_err)).with_context(|| {
                    format!("failed to decode image and no embedded preview found: {:?}", path)
                })
            }
        }
        Err(_) => Err(anyhow!("image decode panicked for {:?}", path)),
    }
}

fn decode_embedded_jpeg(bytes: &[u8]) -> Result<DynamicImage> {
    let mut decoder = JpegDecoder::new(Cursor::new(bytes));
    let pixels = decoder
        .decode()
        .map_err(|err| anyhow!("embedded JPEG decode failed: {err}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("embedded JPEG metadata missing"))?;
    let dyn_img = match info.pixel_format {
        PixelFormat::L8 => {
            let buffer = ImageBuffer::from_vec(info.width as u32, info.height as u32, pixels)
                .ok_or_else(|| anyhow!("embedded JPEG luma buffer size mismatch"))?;
            DynamicImage::ImageLuma8(buffer)
        }
        PixelFormat::RGB24 => {
            let buffer = ImageBuffer::from_vec(info.width as u32, info.height as u32, pixels)
                .ok_or_else(|| anyhow!("embedded JPEG RGB buffer size mismatch"))?;
            DynamicImage::ImageRgb8(buffer)
        }
        PixelFormat::CMYK32 => {
            let mut rgb = Vec::with_capacity((info.width * info.height * 3) as usize);
            for chunk in pixels.chunks_exact(4) {
                let c = chunk[0] as f32 / 255.0;
                let m = chunk[1] as f32 / 255.0;
                let y = chunk[2] as f32 / 255.0;
                let k = chunk[3] as f32 / 255.0;
                let r = (1.0 - (c * (1.0 - k) + k)) * 255.0;
                let g = (1.0 - (m * (1.0 - k) + k)) * 255.0;
                let b = (1.0 - (y * (1.0 - k) + k)) * 255.0;
                rgb.push(r.clamp(0.0, 255.0) as u8);
                rgb.push(g.clamp(0.0, 255.0) as u8);
                rgb.push(b.clamp(0.0, 255.0) as u8);
            }
            let buffer = ImageBuffer::from_vec(info.width as u32, info.height as u32, rgb)
                .ok_or_else(|| anyhow!("embedded JPEG CMYK buffer size mismatch"))?;
            DynamicImage::ImageRgb8(buffer)
        }
        other => {
            return Err(anyhow!("unsupported embedded JPEG pixel format: {:?}", other));
        }
    };
    Ok(dyn_img)
}
