// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The editing session: one page collection under linear undo/redo, with
// every mutation routed through the pure operations so each user-visible
// change is exactly one history snapshot.

use std::path::Path;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{
    CropBox, CropState, DocumentKind, PageCollection, PageId, SessionConfig,
};
use blattwerk_document::{DocumentAssembler, ImageCodec, Rasterizer};
use blattwerk_vision::VisionService;
use tracing::{info, instrument, warn};

use crate::batch;
use crate::history::History;
use crate::ops;

/// Editing context for one scan session.
///
/// Failed collaborator calls never mutate the collection: a snapshot is
/// pushed only after an operation has produced a changed state.
pub struct EditorSession<V: VisionService> {
    config: SessionConfig,
    history: History,
    rasterizer: Rasterizer,
    codec: ImageCodec,
    vision: V,
}

impl<V: VisionService> EditorSession<V> {
    pub fn new(vision: V, config: SessionConfig) -> Self {
        Self {
            history: History::new(config.history_limit),
            rasterizer: Rasterizer::new(),
            codec: ImageCodec::new(),
            vision,
            config,
        }
    }

    /// The collection at the history cursor.
    pub fn pages(&self) -> &PageCollection {
        self.history.current()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> &PageCollection {
        self.history.undo()
    }

    pub fn redo(&mut self) -> &PageCollection {
        self.history.redo()
    }

    /// Drop all pages and all history.
    pub fn reset(&mut self) {
        self.history.reset();
    }

    // -- Ingest ---------------------------------------------------------------

    /// Rasterize an uploaded document and append its pages to the collection.
    ///
    /// Rasterization runs on the blocking pool under the configured deadline;
    /// on any failure the collection is left untouched. Returns the number of
    /// pages appended.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn ingest(&mut self, name: &str, bytes: Vec<u8>) -> Result<usize> {
        let kind = DocumentKind::from_name(name).ok_or_else(|| {
            BlattwerkError::UnsupportedDocument(format!("cannot ingest {:?}", name))
        })?;

        let rasterizer = self.rasterizer;
        let images = tokio::time::timeout(
            self.config.rasterize_timeout(),
            tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, kind)),
        )
        .await
        .map_err(|_| {
            BlattwerkError::Timeout(format!(
                "rasterizing {} exceeded {}s",
                name,
                self.config.rasterize_timeout_secs
            ))
        })?
        .map_err(|err| BlattwerkError::Rasterize(format!("rasterize task failed: {}", err)))??;

        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let multi = images.len() > 1;
        let records: Vec<_> = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| {
                let label = if multi {
                    format!("{} p.{}", stem, i + 1)
                } else {
                    stem.clone()
                };
                blattwerk_core::PageRecord::new(label, image)
            })
            .collect();

        let count = records.len();
        info!(pages = count, "document ingested");
        self.history.push(ops::add_pages(self.history.current(), records));
        Ok(count)
    }

    // -- Structural edits -----------------------------------------------------

    /// Remove a page. An absent id is a no-op and pushes no snapshot.
    pub fn delete_page(&mut self, id: PageId) -> bool {
        if self.history.current().position(id).is_none() {
            warn!(%id, "delete requested for absent page");
            return false;
        }
        self.history.push(ops::delete_page(self.history.current(), id));
        true
    }

    /// Move a page by `delta` positions, clamped to the collection bounds.
    pub fn move_page(&mut self, id: PageId, delta: isize) -> bool {
        if self.history.current().position(id).is_none() {
            warn!(%id, "move requested for absent page");
            return false;
        }
        let moved = ops::move_page(self.history.current(), id, delta);
        if &moved == self.history.current() {
            return false;
        }
        self.history.push(moved);
        true
    }

    // -- Cropping -------------------------------------------------------------

    /// Crop a page to a user-drawn box, immediately deriving the cropped
    /// image. The box is interpreted in normalised source coordinates.
    pub fn apply_manual_crop(&mut self, id: PageId, crop: CropBox) -> Result<bool> {
        let Some(record) = self.history.current().find(id) else {
            warn!(%id, "crop requested for absent page");
            return Ok(false);
        };
        let crop = crop.clamped();
        let rect = crop.to_pixel_rect(record.source.width(), record.source.height());
        let derived = self
            .codec
            .crop(&record.source, rect, self.config.jpeg_quality)?;
        self.history
            .push(ops::apply_crop(self.history.current(), id, crop, derived));
        Ok(true)
    }

    /// Stage a crop box on one page for review without deriving an image.
    pub fn stage_crop(&mut self, id: PageId, crop: CropBox) -> bool {
        if self.history.current().position(id).is_none() {
            return false;
        }
        self.history
            .push(ops::stage_suggestion(self.history.current(), id, crop.clamped()));
        true
    }

    /// Ask the vision service for a crop suggestion on every uncropped page
    /// and stage the answers for review. One snapshot covers the whole batch.
    /// Returns the number of pages that received a suggestion.
    #[instrument(skip(self))]
    pub async fn auto_crop_all(&mut self) -> usize {
        let current = self.history.current().clone();
        let vision = &self.vision;
        let suggested = batch::map_pages(&current, self.config.batch_fanout, |record| async move {
            if record.crop_state() != CropState::Uncropped {
                return record;
            }
            match vision.suggest_crop(record.source.clone()).await {
                Some(crop) => blattwerk_core::PageRecord {
                    crop: Some(crop.clamped()),
                    derived: None,
                    ..record
                },
                None => record,
            }
        })
        .await;

        let staged = current
            .iter()
            .zip(suggested.iter())
            .filter(|(before, after)| before.crop_state() != after.crop_state())
            .count();
        if staged == 0 {
            info!("no crop suggestions returned");
            return 0;
        }
        info!(staged, "crop suggestions staged for review");
        self.history.push(suggested);
        staged
    }

    /// Derive images for every pending-review crop. Returns the number of
    /// pages committed; zero pending pages pushes no snapshot.
    pub fn commit_staged_crops(&mut self) -> usize {
        let pending = self.pending_review_count();
        if pending == 0 {
            return 0;
        }
        self.history.push(ops::commit_staged(
            self.history.current(),
            &self.codec,
            self.config.jpeg_quality,
        ));
        pending
    }

    /// Drop every pending-review crop, returning the affected page count.
    pub fn discard_staged_crops(&mut self) -> usize {
        let pending = self.pending_review_count();
        if pending == 0 {
            return 0;
        }
        self.history.push(ops::discard_staged(self.history.current()));
        pending
    }

    fn pending_review_count(&self) -> usize {
        self.history
            .current()
            .iter()
            .filter(|r| r.crop_state() == CropState::PendingReview)
            .count()
    }

    // -- Text and tables ------------------------------------------------------

    /// OCR one page and attach the text. A page the service cannot read is
    /// left unchanged with no snapshot.
    pub async fn ocr_page(&mut self, id: PageId) -> bool {
        let Some(record) = self.history.current().find(id) else {
            warn!(%id, "OCR requested for absent page");
            return false;
        };
        let image = record.display_image().clone();
        let Some(text) = self.vision.extract_text(image).await else {
            return false;
        };
        self.history
            .push(ops::attach_text(self.history.current(), id, &text));
        true
    }

    /// OCR every page concurrently, attaching text where the service answers.
    /// One snapshot covers the whole batch; zero answers push none.
    #[instrument(skip(self))]
    pub async fn ocr_all_pages(&mut self) -> usize {
        let current = self.history.current().clone();
        let vision = &self.vision;
        let read = batch::map_pages(&current, self.config.batch_fanout, |record| async move {
            let image = record.display_image().clone();
            match vision.extract_text(image).await {
                Some(text) => blattwerk_core::PageRecord {
                    extracted_text: Some(text),
                    ..record
                },
                None => record,
            }
        })
        .await;

        let attached = current
            .iter()
            .zip(read.iter())
            .filter(|(before, after)| before.extracted_text != after.extracted_text)
            .count();
        if attached == 0 {
            return 0;
        }
        info!(attached, "text attached from batch OCR");
        self.history.push(read);
        attached
    }

    /// Scan every page for a table. Reporting only: the collection is never
    /// mutated and no snapshot is pushed.
    pub async fn scan_all_tables(&self) -> Vec<blattwerk_core::TableReport> {
        batch::scan_tables(self.history.current(), &self.vision, self.config.batch_fanout).await
    }

    // -- Export ---------------------------------------------------------------

    /// Assemble the current pages into a PDF at `path`, cropped pages by
    /// their derived image. Returns the document size in bytes.
    #[instrument(skip(self))]
    pub async fn export(&self, path: &Path) -> Result<usize> {
        let images: Vec<_> = self
            .history
            .current()
            .iter()
            .map(|record| record.display_image().clone())
            .collect();

        let mut assembler = DocumentAssembler::new(self.config.render_dpi);
        if let Some(stem) = path.file_stem() {
            assembler.set_title(stem.to_string_lossy().into_owned());
        }
        let bytes = assembler.build(&images)?;
        let len = bytes.len();
        tokio::fs::write(path, bytes)
            .await
            .map_err(|err| BlattwerkError::Export(format!("write {:?} failed: {}", path, err)))?;
        info!(pages = images.len(), bytes = len, "document exported");
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blattwerk_vision::{ScriptedVision, TableScript};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([120, 130, 140]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("encode test png");
        out.into_inner()
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            // Scripted outcomes align with page order only when batches run
            // one page at a time.
            batch_fanout: 1,
            ..SessionConfig::default()
        }
    }

    fn session() -> EditorSession<ScriptedVision> {
        EditorSession::new(ScriptedVision::new(), test_config())
    }

    #[tokio::test]
    async fn ingest_labels_pages_and_snapshots_once() {
        let mut session = session();
        let count = session
            .ingest("receipt.png", png_bytes(40, 30))
            .await
            .expect("ingest");
        assert_eq!(count, 1);
        assert_eq!(session.pages().len(), 1);
        assert_eq!(session.pages().get(0).expect("page").label, "receipt");
        assert!(session.can_undo());

        session.undo();
        assert!(session.pages().is_empty());
    }

    #[tokio::test]
    async fn ingest_of_unknown_extension_leaves_history_untouched() {
        let mut session = session();
        let err = session
            .ingest("notes.txt", b"plain text".to_vec())
            .await
            .expect_err("should be rejected");
        assert!(matches!(err, BlattwerkError::UnsupportedDocument(_)));
        assert!(session.pages().is_empty());
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn delete_then_undo_restores_page_order() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(20, 20))
            .await
            .expect("ingest a");
        session
            .ingest("b.png", png_bytes(20, 20))
            .await
            .expect("ingest b");
        let first = session.pages().get(0).expect("first").id;

        assert!(session.delete_page(first));
        assert_eq!(session.pages().len(), 1);
        assert_eq!(session.pages().get(0).expect("page").label, "b");

        session.undo();
        let labels: Vec<_> = session.pages().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["a", "b"]);

        session.redo();
        assert_eq!(session.pages().len(), 1);
    }

    #[tokio::test]
    async fn deleting_an_absent_page_pushes_no_snapshot() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(20, 20))
            .await
            .expect("ingest");
        let depth = session.history.depth();
        assert!(!session.delete_page(PageId::new()));
        assert_eq!(session.history.depth(), depth);
    }

    #[tokio::test]
    async fn manual_crop_applies_immediately() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(80, 60))
            .await
            .expect("ingest");
        let id = session.pages().get(0).expect("page").id;

        let applied = session
            .apply_manual_crop(id, CropBox::new(25.0, 25.0, 50.0, 50.0))
            .expect("crop");
        assert!(applied);

        let record = session.pages().get(0).expect("page");
        assert_eq!(record.crop_state(), CropState::Applied);
        let derived = record.derived.as_ref().expect("derived image");
        assert_eq!(derived.width(), 40);
        assert_eq!(derived.height(), 30);
    }

    #[tokio::test]
    async fn auto_crop_stages_only_answered_pages_in_one_snapshot() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(40, 40))
            .await
            .expect("ingest a");
        session
            .ingest("b.png", png_bytes(40, 40))
            .await
            .expect("ingest b");
        session.vision.push_crop(Some(CropBox::new(10.0, 10.0, 80.0, 80.0)));
        session.vision.push_crop(None);

        let staged = session.auto_crop_all().await;
        assert_eq!(staged, 1);
        assert_eq!(
            session.pages().get(0).expect("a").crop_state(),
            CropState::PendingReview
        );
        assert_eq!(
            session.pages().get(1).expect("b").crop_state(),
            CropState::Uncropped
        );

        // The whole batch is one undo step.
        session.undo();
        assert!(session
            .pages()
            .iter()
            .all(|r| r.crop_state() == CropState::Uncropped));
    }

    #[tokio::test]
    async fn staged_crops_commit_to_derived_images() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(100, 100))
            .await
            .expect("ingest");
        let id = session.pages().get(0).expect("page").id;
        assert!(session.stage_crop(id, CropBox::new(0.0, 0.0, 50.0, 50.0)));

        assert_eq!(session.commit_staged_crops(), 1);
        let record = session.pages().get(0).expect("page");
        assert_eq!(record.crop_state(), CropState::Applied);
        assert_eq!(record.derived.as_ref().expect("derived").width(), 50);

        // Nothing left to commit.
        assert_eq!(session.commit_staged_crops(), 0);
    }

    #[tokio::test]
    async fn discarding_staged_crops_restores_uncropped() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(40, 40))
            .await
            .expect("ingest");
        let id = session.pages().get(0).expect("page").id;
        session.stage_crop(id, CropBox::new(20.0, 20.0, 60.0, 60.0));

        assert_eq!(session.discard_staged_crops(), 1);
        let record = session.pages().get(0).expect("page");
        assert_eq!(record.crop_state(), CropState::Uncropped);
        assert!(record.crop.is_none());
    }

    #[tokio::test]
    async fn ocr_attaches_text_only_when_service_answers() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(40, 40))
            .await
            .expect("ingest");
        let id = session.pages().get(0).expect("page").id;
        let depth = session.history.depth();

        session.vision.push_text(None);
        assert!(!session.ocr_page(id).await);
        assert_eq!(session.history.depth(), depth);

        session.vision.push_text(Some("Invoice 42"));
        assert!(session.ocr_page(id).await);
        assert_eq!(
            session.pages().get(0).expect("page").extracted_text.as_deref(),
            Some("Invoice 42")
        );
    }

    #[tokio::test]
    async fn table_scan_reports_without_mutating_or_snapshotting() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(40, 40))
            .await
            .expect("ingest a");
        session
            .ingest("b.png", png_bytes(40, 40))
            .await
            .expect("ingest b");
        session
            .vision
            .push_table(TableScript::Table("x,y\n1,2".into()));
        session.vision.push_table(TableScript::Fail("offline".into()));
        let depth = session.history.depth();

        let reports = session.scan_all_tables().await;
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0].outcome, blattwerk_core::TableOutcome::Table(_)));
        assert!(matches!(reports[1].outcome, blattwerk_core::TableOutcome::Failed(_)));
        assert_eq!(session.history.depth(), depth);
    }

    #[tokio::test]
    async fn export_writes_pdf_bytes() {
        let mut session = session();
        session
            .ingest("a.png", png_bytes(60, 40))
            .await
            .expect("ingest");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.pdf");
        let len = session.export(&path).await.expect("export");
        assert!(len > 0);

        let bytes = std::fs::read(&path).expect("read back");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn export_of_empty_session_is_an_error() {
        let session = session();
        let dir = tempfile::tempdir().expect("tempdir");
        let err = session
            .export(&dir.path().join("out.pdf"))
            .await
            .expect_err("nothing to export");
        assert!(matches!(err, BlattwerkError::Assemble(_)));
    }
}
