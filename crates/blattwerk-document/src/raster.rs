// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterizer — turns uploaded document bytes into per-page images.
//
// Scanned PDFs carry one dominant image XObject per page; we extract and
// decode that rather than rendering page content streams (vector-heavy PDFs
// are out of scope for a scanning tool). Plain image uploads pass through
// the codec unchanged.

use std::io::Read;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{DocumentKind, ImageEncoding, ImageRef};
use flate2::read::ZlibDecoder;
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, info, instrument, warn};

use crate::codec::ImageCodec;

/// Extracts page images from uploaded documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rasterizer {
    codec: ImageCodec,
}

impl Rasterizer {
    pub fn new() -> Self {
        Self {
            codec: ImageCodec::new(),
        }
    }

    /// Produce one image per document page, in page order.
    ///
    /// Fails with [`BlattwerkError::Rasterize`] when the input is unreadable
    /// or yields no page images at all; individual unreadable pages inside an
    /// otherwise usable PDF are skipped with a warning.
    #[instrument(skip(self, bytes), fields(kind = ?kind, bytes_len = bytes.len()))]
    pub fn rasterize(&self, bytes: &[u8], kind: DocumentKind) -> Result<Vec<ImageRef>> {
        match kind {
            DocumentKind::Pdf => self.rasterize_pdf(bytes),
            DocumentKind::Jpeg | DocumentKind::Png | DocumentKind::Tiff | DocumentKind::WebP => {
                let image = self
                    .codec
                    .ingest(bytes.to_vec())
                    .map_err(|err| BlattwerkError::Rasterize(err.to_string()))?;
                Ok(vec![image])
            }
        }
    }

    fn rasterize_pdf(&self, bytes: &[u8]) -> Result<Vec<ImageRef>> {
        let doc = Document::load_mem(bytes)
            .map_err(|err| BlattwerkError::Rasterize(format!("failed to load PDF: {}", err)))?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(BlattwerkError::Rasterize("PDF has no pages".into()));
        }

        info!(pages = pages.len(), "extracting page images from PDF");

        let mut images = Vec::new();
        for (page_number, page_id) in &pages {
            match self.page_image(&doc, *page_id) {
                Some(image) => images.push(image),
                None => warn!(page_number, "no usable page image, skipping page"),
            }
        }

        if images.is_empty() {
            return Err(BlattwerkError::Rasterize(
                "no page images found in PDF".into(),
            ));
        }
        Ok(images)
    }

    /// Find and decode the dominant (largest-area) image XObject on a page.
    fn page_image(&self, doc: &Document, page_id: lopdf::ObjectId) -> Option<ImageRef> {
        let page_dict = match doc.get_object(page_id) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => return None,
        };

        let resources = page_resources(doc, page_dict)?;
        let xobjects = match resolve(doc, resources.get(b"XObject").ok()?)? {
            Object::Dictionary(dict) => dict,
            _ => return None,
        };

        let mut best: Option<(u64, &Stream)> = None;
        for (name, value) in xobjects.iter() {
            let Some(Object::Stream(stream)) = resolve(doc, value) else {
                continue;
            };
            if dict_name(&stream.dict, b"Subtype").as_deref() != Some("Image") {
                continue;
            }
            let width = dict_int(&stream.dict, b"Width").unwrap_or(0);
            let height = dict_int(&stream.dict, b"Height").unwrap_or(0);
            let area = width as u64 * height as u64;
            debug!(
                name = %String::from_utf8_lossy(name),
                width,
                height,
                "image XObject found"
            );
            if area > 0 && best.map(|(a, _)| area > a).unwrap_or(true) {
                best = Some((area, stream));
            }
        }

        let (_, stream) = best?;
        match decode_image_stream(stream) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!(%err, "failed to decode page image stream");
                None
            }
        }
    }
}

/// Resolve a page's /Resources dictionary, walking /Parent for inherited
/// resources.
fn page_resources<'a>(doc: &'a Document, page_dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let mut dict = page_dict;
    loop {
        if let Ok(resources) = dict.get(b"Resources") {
            return match resolve(doc, resources)? {
                Object::Dictionary(d) => Some(d),
                _ => None,
            };
        }
        dict = match resolve(doc, dict.get(b"Parent").ok()?)? {
            Object::Dictionary(parent) => parent,
            _ => return None,
        };
    }
}

/// Resolve a reference to the actual object.
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

fn dict_name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        _ => None,
    }
}

fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key).ok()? {
        Object::Integer(n) => Some(*n as u32),
        _ => None,
    }
}

/// First entry of /Filter (a single name or an array of names).
fn stream_filter(stream: &Stream) -> Option<String> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        Object::Array(arr) => arr.first().and_then(|f| match f {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Colour space name, resolving one level of indirection for array forms
/// like [/ICCBased ref].
fn stream_color_space(stream: &Stream) -> Option<String> {
    match stream.dict.get(b"ColorSpace").ok()? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
        Object::Array(arr) => arr.first().and_then(|c| match c {
            Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Decode a PDF image stream into an [`ImageRef`].
///
/// DCTDecode payloads are already JPEG and pass through byte-for-byte;
/// FlateDecode / unfiltered payloads are rebuilt from raw samples and
/// re-encoded as PNG.
fn decode_image_stream(stream: &Stream) -> std::result::Result<ImageRef, String> {
    let width = dict_int(&stream.dict, b"Width").ok_or("image stream without /Width")?;
    let height = dict_int(&stream.dict, b"Height").ok_or("image stream without /Height")?;

    let raw = match stream_filter(stream).as_deref() {
        Some("DCTDecode") => {
            // Validate the JPEG once; keep the original bytes.
            image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .map_err(|e| format!("invalid DCTDecode payload: {}", e))?;
            return Ok(ImageRef::new(
                stream.content.clone(),
                width,
                height,
                ImageEncoding::Jpeg,
            ));
        }
        Some("FlateDecode") => {
            let mut decoder = ZlibDecoder::new(&stream.content[..]);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| format!("FlateDecode failed: {}", e))?;
            decoded
        }
        None => stream.content.clone(),
        Some(other) => return Err(format!("unsupported image filter: {}", other)),
    };

    let bits = dict_int(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(format!("unsupported bits per component: {}", bits));
    }

    let color_space = stream_color_space(stream).unwrap_or_else(|| "DeviceRGB".to_string());
    let decoded = pixels_to_image(&raw, width, height, &color_space)?;

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    decoded
        .write_to(&mut cursor, image::ImageFormat::Png)
        .map_err(|e| format!("PNG encode failed: {}", e))?;
    Ok(ImageRef::new(buffer, width, height, ImageEncoding::Png))
}

/// Rebuild raw 8-bit samples into a decoded image.
fn pixels_to_image(
    raw: &[u8],
    width: u32,
    height: u32,
    color_space: &str,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (width * height) as usize;
    match color_space {
        "DeviceRGB" | "CalRGB" | "ICCBased" => {
            let expected = pixel_count * 3;
            if raw.len() < expected {
                return Err(format!("RGB data too short: {} < {}", raw.len(), expected));
            }
            image::RgbImage::from_raw(width, height, raw[..expected].to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| "RGB buffer rejected".to_string())
        }
        "DeviceGray" | "CalGray" => {
            if raw.len() < pixel_count {
                return Err(format!(
                    "grayscale data too short: {} < {}",
                    raw.len(),
                    pixel_count
                ));
            }
            image::GrayImage::from_raw(width, height, raw[..pixel_count].to_vec())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| "grayscale buffer rejected".to_string())
        }
        "DeviceCMYK" => {
            let expected = pixel_count * 4;
            if raw.len() < expected {
                return Err(format!("CMYK data too short: {} < {}", raw.len(), expected));
            }
            let mut rgb = Vec::with_capacity(pixel_count * 3);
            for chunk in raw[..expected].chunks(4) {
                let c = chunk[0] as f32 / 255.0;
                let m = chunk[1] as f32 / 255.0;
                let y = chunk[2] as f32 / 255.0;
                let k = chunk[3] as f32 / 255.0;
                rgb.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
                rgb.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
            }
            image::RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| "CMYK buffer rejected".to_string())
        }
        other => Err(format!("unsupported colour space: {}", other)),
    }
}
