// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-document — Document collaborators for the Blattwerk session core.
//
// Provides the rasterizer (uploaded PDF/image bytes → per-page images), the
// image codec (crop and re-encode page images), and the assembler (page
// images → exported PDF bytes).

pub mod assemble;
pub mod codec;
pub mod raster;

pub use assemble::DocumentAssembler;
pub use codec::ImageCodec;
pub use raster::Rasterizer;
