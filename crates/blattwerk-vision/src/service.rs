// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Narrow typed interface over the vision model.

use std::future::Future;

use blattwerk_core::error::Result;
use blattwerk_core::{CropBox, ImageRef};

/// A vision model consulted per page image.
///
/// Images are passed by handle ([`ImageRef`] clones share the payload), so
/// concurrent per-page calls read shared immutable data only. No call is
/// retried automatically: a single attempt either yields a result or the
/// documented fail-soft outcome.
pub trait VisionService: Send + Sync {
    /// Suggest a crop box for the page, in percent of its natural
    /// dimensions. `None` (service unavailable, unparseable model output,
    /// no document detected) is a normal outcome.
    fn suggest_crop(&self, image: ImageRef) -> impl Future<Output = Option<CropBox>> + Send;

    /// Extract the page's text. `None` is a normal outcome.
    fn extract_text(&self, image: ImageRef) -> impl Future<Output = Option<String>> + Send;

    /// Extract the page's table as CSV text.
    ///
    /// `Ok(None)` means the page holds no table; `Err` means the extraction
    /// call itself failed (transport, auth, service error).
    fn extract_table(&self, image: ImageRef)
    -> impl Future<Output = Result<Option<String>>> + Send;
}
