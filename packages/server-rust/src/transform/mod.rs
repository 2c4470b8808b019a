//! Image decoding, resizing and re-encoding on top of the `image` crate.
//!
//! Only JPEG and PNG inputs are transformed. Everything else is served as
//! fetched.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use rendition_core::{Gravity, TransformError, TransformOptions, Transformer};

const FILTER: FilterType = FilterType::Triangle;

/// Sniffs the container format from the leading bytes.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Whether `bytes` are in a format the transformer accepts.
#[must_use]
pub fn is_resizable(bytes: &[u8]) -> bool {
    matches!(sniff_format(bytes), Some(ImageFormat::Jpeg | ImageFormat::Png))
}

/// `Content-Type` for a response body.
#[must_use]
pub fn content_type(bytes: &[u8]) -> &'static str {
    sniff_format(bytes).map_or("application/octet-stream", |format| format.to_mime_type())
}

/// [`Transformer`] backed by the `image` crate.
///
/// WebP output is lossless; `quality` applies to JPEG only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransformer;

impl Transformer for ImageTransformer {
    fn transform(
        &self,
        input: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, TransformError> {
        let format = match sniff_format(input) {
            Some(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
            _ => return Err(TransformError::Unsupported),
        };
        if options.width == 0 && options.height == 0 && !options.webp {
            return Ok(input.to_vec());
        }

        let decoded = image::load_from_memory_with_format(input, format)
            .map_err(|err| TransformError::Decode(err.to_string()))?;
        let resized = resize(decoded, options);

        let output = if options.webp { ImageFormat::WebP } else { format };
        encode(&resized, output, options.quality)
    }
}

fn resize(img: DynamicImage, options: &TransformOptions) -> DynamicImage {
    let (src_w, src_h) = (img.width(), img.height());
    match (options.width, options.height) {
        (0, 0) => img,
        (width, 0) => {
            let width = bounded(width, src_w, options.enlarge);
            let height = proportional(src_h, width, src_w);
            scale_to(img, width, height)
        }
        (0, height) => {
            let height = bounded(height, src_h, options.enlarge);
            let width = proportional(src_w, height, src_h);
            scale_to(img, width, height)
        }
        (width, height) if options.crop => {
            fill_and_crop(img, width, height, options.gravity, options.enlarge)
        }
        (width, height) => {
            if !options.enlarge && width >= src_w && height >= src_h {
                img
            } else {
                img.resize(width, height, FILTER)
            }
        }
    }
}

fn bounded(target: u32, source: u32, enlarge: bool) -> u32 {
    if enlarge {
        target
    } else {
        target.min(source)
    }
}

/// `other * target / source`, rounded, at least 1.
fn proportional(other: u32, target: u32, source: u32) -> u32 {
    let source = u64::from(source.max(1));
    let scaled = (u64::from(other) * u64::from(target) + source / 2) / source;
    u32::try_from(scaled.max(1)).unwrap_or(u32::MAX)
}

fn scale_to(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FILTER)
    }
}

/// Scales `img` to cover `width`x`height`, then cuts the overflow at `gravity`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fill_and_crop(
    img: DynamicImage,
    width: u32,
    height: u32,
    gravity: Gravity,
    enlarge: bool,
) -> DynamicImage {
    let (src_w, src_h) = (f64::from(img.width()), f64::from(img.height()));
    let mut factor = f64::max(f64::from(width) / src_w, f64::from(height) / src_h);
    if !enlarge {
        factor = factor.min(1.0);
    }
    let scaled_w = ((src_w * factor).round() as u32).max(1);
    let scaled_h = ((src_h * factor).round() as u32).max(1);
    let scaled = scale_to(img, scaled_w, scaled_h);

    let crop_w = width.min(scaled_w);
    let crop_h = height.min(scaled_h);
    let x = if gravity.contains(Gravity::LEFT) {
        0
    } else if gravity.contains(Gravity::RIGHT) {
        scaled_w - crop_w
    } else {
        (scaled_w - crop_w) / 2
    };
    let y = if gravity.contains(Gravity::TOP) {
        0
    } else if gravity.contains(Gravity::BOTTOM) {
        scaled_h - crop_h
    } else {
        (scaled_h - crop_h) / 2
    };

    if (crop_w, crop_h) == (scaled_w, scaled_h) {
        scaled
    } else {
        scaled.crop_imm(x, y, crop_w, crop_h)
    }
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    let encoded = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))),
        ImageFormat::WebP => {
            let normalised = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            normalised.write_with_encoder(WebPEncoder::new_lossless(&mut out))
        }
        _ => img.write_with_encoder(PngEncoder::new(&mut out)),
    };
    encoded.map_err(|err| TransformError::Encode(err.to_string()))?;
    Ok(out)
}
