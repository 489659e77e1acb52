// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-vision — Vision-model collaborator for Blattwerk.
//
// Provides crop-box suggestion, OCR text, and table-CSV extraction from page
// images. Crop and text calls are best-effort: any service or parse failure
// surfaces as "no result", never as an error. Table extraction keeps the
// transport error visible so batch reports can distinguish "no table" from
// "the call failed".

pub mod gemini;
pub mod scripted;
pub mod service;

pub use gemini::GeminiVision;
pub use scripted::{ScriptedVision, TableScript};
pub use service::VisionService;
