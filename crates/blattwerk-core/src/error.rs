// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Blattwerk.

use thiserror::Error;

/// Top-level error type for all Blattwerk operations.
///
/// Vision-service "no result" outcomes are not errors — they surface as
/// `None` at the collaborator boundary. Only whole-operation failures
/// (unreadable input, no output bytes, exhausted timeouts) reach this type.
#[derive(Debug, Error)]
pub enum BlattwerkError {
    // -- Ingest errors --
    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("rasterization failed: {0}")]
    Rasterize(String),

    // -- Image codec errors --
    #[error("image codec failed: {0}")]
    Codec(String),

    // -- Export errors --
    #[error("document assembly failed: {0}")]
    Assemble(String),

    #[error("export failed: {0}")]
    Export(String),

    // -- Vision service errors --
    #[error("vision service failed: {0}")]
    Vision(String),

    // -- Bounded waits --
    #[error("{0} timed out")]
    Timeout(String),

    // -- I/O and serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlattwerkError>;
