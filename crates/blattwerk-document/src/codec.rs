// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image codec — decodes uploaded images, produces cropped JPEG derivatives,
// and re-encodes awkward formats to PNG for embedding. Operates on in-memory
// images using the `image` crate.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{ImageEncoding, ImageRef, PixelRect};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument, warn};

/// Stateless codec for page images.
///
/// Every method takes encoded bytes in and hands encoded bytes out as a new
/// [`ImageRef`]; nothing is modified in place, so callers can keep the input
/// handle alive in history snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    // -- Ingest ---------------------------------------------------------------

    /// Wrap uploaded image bytes as an [`ImageRef`], decoding once to learn
    /// the natural dimensions.
    ///
    /// Formats the assembler can embed directly (JPEG, PNG, TIFF, WebP) keep
    /// their original bytes; anything else is normalised to PNG.
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub fn ingest(&self, bytes: Vec<u8>) -> Result<ImageRef> {
        let format = image::guess_format(&bytes)
            .map_err(|err| BlattwerkError::Codec(format!("unrecognised image data: {}", err)))?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|err| BlattwerkError::Codec(format!("failed to decode image: {}", err)))?;

        let encoding = match format {
            ImageFormat::Jpeg => ImageEncoding::Jpeg,
            ImageFormat::Png => ImageEncoding::Png,
            ImageFormat::Tiff => ImageEncoding::Tiff,
            ImageFormat::WebP => ImageEncoding::WebP,
            other => {
                debug!(?other, "normalising uncommon upload format to PNG");
                return encode_png(&decoded);
            }
        };

        Ok(ImageRef::new(
            bytes,
            decoded.width(),
            decoded.height(),
            encoding,
        ))
    }

    // -- Crop -----------------------------------------------------------------

    /// Produce a cropped JPEG derivative of `source`.
    ///
    /// The rectangle is clamped to the image bounds, matching what a canvas
    /// crop of a user-dragged selection does at the edges.
    #[instrument(skip(self, source), fields(rect = ?rect, quality))]
    pub fn crop(&self, source: &ImageRef, rect: PixelRect, quality: u8) -> Result<ImageRef> {
        let decoded = image::load_from_memory(source.bytes())
            .map_err(|err| BlattwerkError::Codec(format!("failed to decode source: {}", err)))?;

        let img_w = decoded.width();
        let img_h = decoded.height();
        let safe_x = rect.x.min(img_w.saturating_sub(1));
        let safe_y = rect.y.min(img_h.saturating_sub(1));
        let safe_w = rect.width.clamp(1, img_w - safe_x);
        let safe_h = rect.height.clamp(1, img_h - safe_y);
        if (safe_x, safe_y, safe_w, safe_h) != (rect.x, rect.y, rect.width, rect.height) {
            warn!(img_w, img_h, "crop rectangle clamped to image bounds");
        }

        let cropped = decoded.crop_imm(safe_x, safe_y, safe_w, safe_h);
        encode_jpeg(&cropped, quality)
    }

    // -- Re-encode ------------------------------------------------------------

    /// Re-encode an image as PNG.
    ///
    /// Fallback path for pages whose original bytes the assembler cannot
    /// embed (e.g. exotic TIFF variants).
    #[instrument(skip(self, source), fields(encoding = ?source.encoding()))]
    pub fn reencode(&self, source: &ImageRef) -> Result<ImageRef> {
        let decoded = image::load_from_memory(source.bytes())
            .map_err(|err| BlattwerkError::Codec(format!("failed to decode for re-encode: {}", err)))?;
        encode_png(&decoded)
    }
}

/// Encode a decoded image as JPEG with the given quality (1-100).
fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<ImageRef> {
    let mut buffer = Vec::new();
    let rgb = image.to_rgb8();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|err| BlattwerkError::Codec(format!("JPEG encoding failed: {}", err)))?;
    Ok(ImageRef::new(
        buffer,
        image.width(),
        image.height(),
        ImageEncoding::Jpeg,
    ))
}

/// Encode a decoded image as PNG.
fn encode_png(image: &DynamicImage) -> Result<ImageRef> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| BlattwerkError::Codec(format!("PNG encoding failed: {}", err)))?;
    Ok(ImageRef::new(
        buffer,
        image.width(),
        image.height(),
        ImageEncoding::Png,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Helper: a solid-colour PNG of the given size.
    fn png_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200u8, 60, 30]));
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("encode test png");
        buffer
    }

    #[test]
    fn ingest_keeps_png_bytes_and_reads_dimensions() {
        let bytes = png_image(40, 30);
        let image_ref = ImageCodec::new().ingest(bytes.clone()).expect("ingest");
        assert_eq!(image_ref.bytes(), bytes.as_slice());
        assert_eq!(image_ref.width(), 40);
        assert_eq!(image_ref.height(), 30);
        assert_eq!(image_ref.encoding(), ImageEncoding::Png);
    }

    #[test]
    fn ingest_rejects_garbage() {
        let result = ImageCodec::new().ingest(vec![0u8; 64]);
        assert!(matches!(result, Err(BlattwerkError::Codec(_))));
    }

    #[test]
    fn crop_produces_jpeg_of_requested_size() {
        let codec = ImageCodec::new();
        let source = codec.ingest(png_image(100, 80)).expect("ingest");

        let rect = PixelRect {
            x: 10,
            y: 8,
            width: 50,
            height: 40,
        };
        let derived = codec.crop(&source, rect, 85).expect("crop");
        assert_eq!(derived.width(), 50);
        assert_eq!(derived.height(), 40);
        assert_eq!(derived.encoding(), ImageEncoding::Jpeg);
        // Source handle is untouched.
        assert_eq!(source.width(), 100);
    }

    #[test]
    fn crop_clamps_out_of_bounds_rectangle() {
        let codec = ImageCodec::new();
        let source = codec.ingest(png_image(100, 80)).expect("ingest");

        let rect = PixelRect {
            x: 90,
            y: 70,
            width: 500,
            height: 500,
        };
        let derived = codec.crop(&source, rect, 85).expect("crop");
        assert_eq!(derived.width(), 10);
        assert_eq!(derived.height(), 10);
    }

    #[test]
    fn reencode_yields_png() {
        let codec = ImageCodec::new();
        let source = codec.ingest(png_image(20, 20)).expect("ingest");
        let cropped = codec
            .crop(
                &source,
                PixelRect {
                    x: 0,
                    y: 0,
                    width: 20,
                    height: 20,
                },
                85,
            )
            .expect("crop");

        let normalised = codec.reencode(&cropped).expect("reencode");
        assert_eq!(normalised.encoding(), ImageEncoding::Png);
        assert_eq!(normalised.width(), 20);
        assert_eq!(normalised.height(), 20);
    }
}
