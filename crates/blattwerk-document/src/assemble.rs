// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler — re-assembles page images into a PDF using `printpdf`
// 0.8. Each output page is sized to its image at the configured DPI, so the
// export mirrors what the user cropped rather than forcing a paper size.

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::ImageRef;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument, warn};

use crate::codec::ImageCodec;

const MM_PER_INCH: f32 = 25.4;

/// Builds the exported PDF from the session's current page images.
pub struct DocumentAssembler {
    /// DPI at which page images are placed on their pages.
    dpi: f32,
    codec: ImageCodec,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl DocumentAssembler {
    pub fn new(dpi: f32) -> Self {
        Self {
            dpi,
            codec: ImageCodec::new(),
            title: None,
        }
    }

    /// Set a title for the PDF metadata.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Assemble the given page images, in order, into PDF bytes.
    ///
    /// A page whose image cannot be decoded in its original form is retried
    /// through the codec's PNG re-encode; if that also fails the page is
    /// skipped. Producing zero pages (or zero bytes) is an assembly error —
    /// no partial export is returned.
    #[instrument(skip(self, pages), fields(page_count = pages.len()))]
    pub fn build(&self, pages: &[ImageRef]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(BlattwerkError::Assemble("no pages to export".into()));
        }

        let title = self.title.as_deref().unwrap_or("Blattwerk Export");
        let mut doc = PdfDocument::new(title);
        let mut pdf_pages: Vec<PdfPage> = Vec::new();

        for (index, image) in pages.iter().enumerate() {
            match self.decode_embeddable(image) {
                Ok(decoded) => {
                    pdf_pages.push(self.image_page(&mut doc, &decoded));
                }
                Err(err) => {
                    warn!(page = index + 1, %err, "skipping unembeddable page");
                }
            }
        }

        if pdf_pages.is_empty() {
            return Err(BlattwerkError::Assemble(
                "no page image could be embedded".into(),
            ));
        }

        let embedded = pdf_pages.len();
        doc.with_pages(pdf_pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if output.is_empty() {
            return Err(BlattwerkError::Assemble("serialised PDF is empty".into()));
        }

        info!(
            embedded,
            requested = pages.len(),
            output_bytes = output.len(),
            "document assembled"
        );
        Ok(output)
    }

    /// Decode an image for embedding, falling back to a PNG re-encode when
    /// the original bytes are unusable.
    fn decode_embeddable(&self, image: &ImageRef) -> Result<image::DynamicImage> {
        match image::load_from_memory(image.bytes()) {
            Ok(decoded) => Ok(decoded),
            Err(first_err) => {
                debug!(%first_err, "direct decode failed, trying re-encode fallback");
                let normalised = self.codec.reencode(image)?;
                image::load_from_memory(normalised.bytes()).map_err(|err| {
                    BlattwerkError::Assemble(format!("re-encoded image still unusable: {}", err))
                })
            }
        }
    }

    /// Create one PDF page holding the image at full-bleed.
    fn image_page(&self, doc: &mut PdfDocument, decoded: &image::DynamicImage) -> PdfPage {
        let width_px = decoded.width() as usize;
        let height_px = decoded.height() as usize;

        let rgb = decoded.to_rgb8();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: width_px,
            height: height_px,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = doc.add_image(&raw);

        let page_w = Mm(width_px as f32 / self.dpi * MM_PER_INCH);
        let page_h = Mm(height_px as f32 / self.dpi * MM_PER_INCH);

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(self.dpi),
                rotate: None,
            },
        }];

        PdfPage::new(page_w, page_h, ops)
    }
}
