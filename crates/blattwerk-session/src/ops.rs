// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mutation operations on the page collection.
//
// Each operation is a pure function: it reads the input collection and
// returns a new one, never touching the input. Operations targeting an id
// that is no longer present return an identical collection — stale
// references from the UI are safe no-ops, not errors.

use blattwerk_core::{CropBox, CropState, ImageRef, PageCollection, PageId, PageRecord};
use blattwerk_document::ImageCodec;
use tracing::{debug, warn};

/// Append new records at the end, preserving existing order.
pub fn add_pages(pages: &PageCollection, new: Vec<PageRecord>) -> PageCollection {
    pages.iter().cloned().chain(new).collect()
}

/// Remove the record with the matching id.
pub fn delete_page(pages: &PageCollection, id: PageId) -> PageCollection {
    pages.iter().filter(|r| r.id != id).cloned().collect()
}

/// Move the record with the matching id by `delta` positions, clamped to
/// the collection bounds.
pub fn move_page(pages: &PageCollection, id: PageId, delta: isize) -> PageCollection {
    let Some(from) = pages.position(id) else {
        return pages.clone();
    };
    let mut records: Vec<PageRecord> = pages.iter().cloned().collect();
    let to = (from as isize + delta).clamp(0, records.len() as isize - 1) as usize;
    let record = records.remove(from);
    records.insert(to, record);
    PageCollection::from_records(records)
}

/// Replace the matching record's crop box and derived image; the record is
/// now in the applied state. All other fields are untouched.
pub fn apply_crop(
    pages: &PageCollection,
    id: PageId,
    crop: CropBox,
    derived: ImageRef,
) -> PageCollection {
    map_record(pages, id, |record| PageRecord {
        crop: Some(crop),
        derived: Some(derived.clone()),
        ..record
    })
}

/// Record a crop suggestion on the matching record without rendering it:
/// the crop box is set and any derived image cleared, entering the
/// pending-review state. The codec is not called.
pub fn stage_suggestion(pages: &PageCollection, id: PageId, crop: CropBox) -> PageCollection {
    map_record(pages, id, |record| PageRecord {
        crop: Some(crop),
        derived: None,
        ..record
    })
}

/// Render every pending-review suggestion into a derived image.
///
/// A record whose codec call fails is left unchanged — one bad page never
/// fails the rest of the commit.
pub fn commit_staged(pages: &PageCollection, codec: &ImageCodec, quality: u8) -> PageCollection {
    pages
        .iter()
        .map(|record| {
            let Some(crop) = record.crop else {
                return record.clone();
            };
            if record.crop_state() != CropState::PendingReview {
                return record.clone();
            }
            let rect = crop.to_pixel_rect(record.source.width(), record.source.height());
            match codec.crop(&record.source, rect, quality) {
                Ok(derived) => PageRecord {
                    derived: Some(derived),
                    ..record.clone()
                },
                Err(err) => {
                    warn!(page = %record.id, %err, "crop commit failed, leaving page unchanged");
                    record.clone()
                }
            }
        })
        .collect()
}

/// Revert every pending-review record to its uncropped state.
pub fn discard_staged(pages: &PageCollection) -> PageCollection {
    pages
        .iter()
        .map(|record| {
            if record.crop_state() == CropState::PendingReview {
                PageRecord {
                    crop: None,
                    ..record.clone()
                }
            } else {
                record.clone()
            }
        })
        .collect()
}

/// Cache extracted text on the matching record. Idempotent.
pub fn attach_text(pages: &PageCollection, id: PageId, text: &str) -> PageCollection {
    map_record(pages, id, |record| PageRecord {
        extracted_text: Some(text.to_string()),
        ..record
    })
}

/// Replace the record with the matching id via `f`, cloning the rest.
fn map_record(
    pages: &PageCollection,
    id: PageId,
    f: impl Fn(PageRecord) -> PageRecord,
) -> PageCollection {
    if pages.position(id).is_none() {
        debug!(page = %id, "operation on absent page id, no-op");
        return pages.clone();
    }
    pages
        .iter()
        .map(|record| {
            if record.id == id {
                f(record.clone())
            } else {
                record.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blattwerk_core::ImageEncoding;

    fn record(label: &str) -> PageRecord {
        PageRecord::new(
            label,
            ImageRef::new(label.as_bytes().to_vec(), 100, 100, ImageEncoding::Png),
        )
    }

    fn collection(labels: &[&str]) -> PageCollection {
        labels.iter().map(|l| record(l)).collect()
    }

    fn labels(pages: &PageCollection) -> Vec<String> {
        pages.iter().map(|r| r.label.clone()).collect()
    }

    #[test]
    fn add_pages_appends_preserving_order() {
        let before = collection(&["a", "b"]);
        let after = add_pages(&before, vec![record("c"), record("d")]);
        assert_eq!(labels(&after), ["a", "b", "c", "d"]);
        assert_eq!(labels(&before), ["a", "b"]);
    }

    #[test]
    fn delete_page_removes_only_the_match() {
        let before = collection(&["a", "b", "c"]);
        let id = before.get(1).expect("b").id;

        let after = delete_page(&before, id);
        assert_eq!(labels(&after), ["a", "c"]);
        // Input untouched (purity).
        assert_eq!(labels(&before), ["a", "b", "c"]);
    }

    #[test]
    fn delete_with_absent_id_is_identity() {
        let before = collection(&["a", "b"]);
        let after = delete_page(&before, PageId::new());
        assert_eq!(after, before);
    }

    #[test]
    fn move_page_clamps_to_bounds() {
        let before = collection(&["a", "b", "c"]);
        let id_a = before.get(0).expect("a").id;

        assert_eq!(labels(&move_page(&before, id_a, 2)), ["b", "c", "a"]);
        assert_eq!(labels(&move_page(&before, id_a, 99)), ["b", "c", "a"]);
        assert_eq!(labels(&move_page(&before, id_a, -5)), ["a", "b", "c"]);
        assert_eq!(move_page(&before, PageId::new(), 1), before);
    }

    #[test]
    fn stage_then_discard_restores_the_original_record() {
        let before = collection(&["a"]);
        let id = before.get(0).expect("a").id;
        let crop = CropBox::new(10.0, 10.0, 80.0, 80.0);

        let staged = stage_suggestion(&before, id, crop);
        let page = staged.get(0).expect("a");
        assert_eq!(page.crop, Some(crop));
        assert_eq!(page.derived, None);
        assert_eq!(page.crop_state(), CropState::PendingReview);

        let discarded = discard_staged(&staged);
        assert_eq!(discarded, before);
    }

    #[test]
    fn stage_then_commit_applies_the_crop() {
        let source = {
            // Real decodable pixels so the codec commit can run.
            let img = image::RgbImage::from_pixel(100, 100, image::Rgb([80u8, 80, 80]));
            let mut buffer = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut buffer);
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut cursor, image::ImageFormat::Png)
                .expect("encode");
            ImageRef::new(buffer, 100, 100, ImageEncoding::Png)
        };
        let before: PageCollection = [PageRecord::new("a", source)].into_iter().collect();
        let id = before.get(0).expect("a").id;
        let crop = CropBox::new(10.0, 10.0, 80.0, 80.0);

        let staged = stage_suggestion(&before, id, crop);
        let committed = commit_staged(&staged, &ImageCodec::new(), 85);

        let page = committed.get(0).expect("a");
        assert_eq!(page.crop_state(), CropState::Applied);
        assert_eq!(page.crop, Some(crop));
        let derived = page.derived.as_ref().expect("derived image");
        assert_eq!(derived.width(), 80);
        assert_eq!(derived.height(), 80);
    }

    #[test]
    fn commit_leaves_failing_records_unchanged() {
        // Source bytes are not decodable, so the codec call fails.
        let before = collection(&["broken", "alsobroken"]);
        let id = before.get(0).expect("first").id;
        let staged = stage_suggestion(&before, id, CropBox::new(0.0, 0.0, 50.0, 50.0));

        let committed = commit_staged(&staged, &ImageCodec::new(), 85);
        assert_eq!(committed, staged);
        assert_eq!(
            committed.get(0).expect("first").crop_state(),
            CropState::PendingReview
        );
    }

    #[test]
    fn commit_skips_applied_and_uncropped_records() {
        let before = collection(&["plain"]);
        let committed = commit_staged(&before, &ImageCodec::new(), 85);
        assert_eq!(committed, before);
    }

    #[test]
    fn attach_text_is_idempotent() {
        let before = collection(&["a"]);
        let id = before.get(0).expect("a").id;

        let once = attach_text(&before, id, "hello");
        let twice = attach_text(&once, id, "hello");
        assert_eq!(once, twice);
        assert_eq!(
            once.get(0).expect("a").extracted_text.as_deref(),
            Some("hello")
        );
        assert_eq!(before.get(0).expect("a").extracted_text, None);
    }

    #[test]
    fn applied_crop_survives_unrelated_operations() {
        let before = collection(&["a", "b"]);
        let id_a = before.get(0).expect("a").id;
        let id_b = before.get(1).expect("b").id;
        let derived = ImageRef::new(vec![7u8; 4], 50, 50, ImageEncoding::Jpeg);

        let cropped = apply_crop(&before, id_a, CropBox::new(0.0, 0.0, 50.0, 50.0), derived);
        let after = attach_text(&cropped, id_b, "text");

        let page_a = after.get(0).expect("a");
        assert_eq!(page_a.crop_state(), CropState::Applied);
        assert_eq!(page_a.extracted_text, None);
    }
}
