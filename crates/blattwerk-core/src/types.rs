// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Blattwerk scanning engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Unique identifier for a page record.
///
/// Stable for the record's lifetime: copy-on-write mutations produce a new
/// record value carrying the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded form of an in-memory page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    Jpeg,
    Png,
    Tiff,
    WebP,
}

impl ImageEncoding {
    /// MIME type string, as sent to the vision service.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::WebP => "image/webp",
        }
    }
}

/// Immutable, cheaply cloneable handle over encoded image bytes.
///
/// Clones share one allocation; the payload is released when the last
/// handle (typically held by a history snapshot) is dropped. Equality
/// compares content hashes, so a re-encode of identical pixels from a
/// different pass still compares unequal bytes honestly.
#[derive(Debug, Clone)]
pub struct ImageRef(Arc<ImageData>);

#[derive(Debug)]
struct ImageData {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    encoding: ImageEncoding,
    sha256: String,
}

impl ImageRef {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32, encoding: ImageEncoding) -> Self {
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Self(Arc::new(ImageData {
            bytes,
            width,
            height,
            encoding,
            sha256,
        }))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Natural width of the encoded image in pixels.
    pub fn width(&self) -> u32 {
        self.0.width
    }

    /// Natural height of the encoded image in pixels.
    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.0.encoding
    }

    /// SHA-256 of the encoded bytes, hex-encoded.
    pub fn sha256(&self) -> &str {
        &self.0.sha256
    }
}

impl PartialEq for ImageRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.sha256 == other.0.sha256
    }
}

impl Eq for ImageRef {}

/// Normalized crop rectangle in percentage units (0-100) relative to the
/// source image's natural dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp all components so the box stays inside the unit page.
    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 100.0);
        let y = self.y.clamp(0.0, 100.0);
        let width = self.width.clamp(0.0, 100.0 - x);
        let height = self.height.clamp(0.0, 100.0 - y);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to a pixel rectangle against the given natural dimensions.
    ///
    /// The result is clamped to the image bounds and never degenerates
    /// below 1x1.
    pub fn to_pixel_rect(self, natural_width: u32, natural_height: u32) -> PixelRect {
        let b = self.clamped();
        let x = (b.x / 100.0 * natural_width as f32).round() as u32;
        let y = (b.y / 100.0 * natural_height as f32).round() as u32;
        let x = x.min(natural_width.saturating_sub(1));
        let y = y.min(natural_height.saturating_sub(1));
        let width = (b.width / 100.0 * natural_width as f32).round() as u32;
        let height = (b.height / 100.0 * natural_height as f32).round() as u32;
        PixelRect {
            x,
            y,
            width: width.clamp(1, natural_width - x),
            height: height.clamp(1, natural_height - y),
        }
    }
}

/// Pixel-space crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Crop lifecycle of a page, derived from field presence on [`PageRecord`].
///
/// There is no stored status column: a crop box with no derived image means
/// "suggested but not yet applied", a crop box with a derived image means
/// "applied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropState {
    Uncropped,
    PendingReview,
    Applied,
}

/// One logical document page and its derived artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: PageId,
    /// Human-readable origin, e.g. "receipt.pdf p.3".
    pub label: String,
    /// Original uploaded image, owned for the record's lifetime.
    pub source: ImageRef,
    /// Cropped / re-encoded image derived from `source`; present once a
    /// crop has been applied.
    pub derived: Option<ImageRef>,
    /// Applied crop or pending suggestion, in percent of `source` dimensions.
    pub crop: Option<CropBox>,
    /// Cached OCR text. Persists until the record is deleted; a later crop
    /// does not invalidate it.
    pub extracted_text: Option<String>,
}

impl PageRecord {
    pub fn new(label: impl Into<String>, source: ImageRef) -> Self {
        Self {
            id: PageId::new(),
            label: label.into(),
            source,
            derived: None,
            crop: None,
            extracted_text: None,
        }
    }

    pub fn crop_state(&self) -> CropState {
        match (&self.crop, &self.derived) {
            (None, _) => CropState::Uncropped,
            (Some(_), None) => CropState::PendingReview,
            (Some(_), Some(_)) => CropState::Applied,
        }
    }

    /// The image a viewer or exporter should use: the derived crop when
    /// applied, otherwise the original.
    pub fn display_image(&self) -> &ImageRef {
        self.derived.as_ref().unwrap_or(&self.source)
    }
}

/// Ordered page sequence. Mutated only by whole-value replacement — the
/// mutation operations in `blattwerk-session` take `&PageCollection` and
/// return a new one. Clones are cheap: records share image payloads
/// through [`ImageRef`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageCollection(Vec<PageRecord>);

impl PageCollection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_records(records: Vec<PageRecord>) -> Self {
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PageRecord> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&PageRecord> {
        self.0.get(index)
    }

    pub fn find(&self, id: PageId) -> Option<&PageRecord> {
        self.0.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: PageId) -> Option<usize> {
        self.0.iter().position(|r| r.id == id)
    }

    pub fn into_records(self) -> Vec<PageRecord> {
        self.0
    }
}

impl FromIterator<PageRecord> for PageCollection {
    fn from_iter<T: IntoIterator<Item = PageRecord>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PageCollection {
    type Item = &'a PageRecord;
    type IntoIter = std::slice::Iter<'a, PageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Supported upload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    WebP,
}

impl DocumentKind {
    /// Infer document kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Infer document kind from a file name or path.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?;
        Self::from_extension(ext)
    }
}

/// Per-page outcome of a table-extraction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableOutcome {
    /// A table was found; the payload is its CSV text.
    Table(String),
    /// The page was readable but contained no table.
    NoTable,
    /// The extraction call itself failed.
    Failed(String),
}

/// One row of the table-extraction batch report. This is a side table for
/// the caller to render or export — producing it never mutates the page
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub page_index: usize,
    pub page_id: PageId,
    pub label: String,
    pub outcome: TableOutcome,
}
