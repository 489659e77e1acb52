// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for an editing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// JPEG quality (1-100) for cropped / re-encoded page images.
    pub jpeg_quality: u8,
    /// DPI used when placing page images into the exported PDF.
    pub render_dpi: f32,
    /// Bounded wait for rasterizing one uploaded document.
    pub rasterize_timeout_secs: u64,
    /// Bounded wait for a single vision-service call.
    pub vision_timeout_secs: u64,
    /// Maximum number of per-page operations in flight during a batch.
    pub batch_fanout: usize,
    /// Maximum number of history snapshots kept beyond the empty baseline.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            render_dpi: 150.0,
            rasterize_timeout_secs: 15,
            vision_timeout_secs: 30,
            batch_fanout: 4,
            history_limit: 100,
        }
    }
}

impl SessionConfig {
    pub fn rasterize_timeout(&self) -> Duration {
        Duration::from_secs(self.rasterize_timeout_secs)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision_timeout_secs)
    }
}
