// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Linear undo/redo timeline of page-collection snapshots.
//
// The snapshot at index 0 is always the empty collection — the "no documents
// loaded" baseline callers use to decide between the upload and editing
// views. Pushing while the cursor sits mid-timeline discards everything
// after it (standard linear branch-discard semantics).

use blattwerk_core::PageCollection;
use tracing::debug;

/// Navigable, linear timeline of [`PageCollection`] states.
#[derive(Debug)]
pub struct History {
    snapshots: Vec<PageCollection>,
    cursor: usize,
    /// Maximum snapshots kept beyond the baseline; oldest are pruned first.
    limit: usize,
}

impl History {
    /// Start with the single empty baseline snapshot.
    pub fn new(limit: usize) -> Self {
        Self {
            snapshots: vec![PageCollection::new()],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Append `state` as the new current snapshot.
    ///
    /// Discards any redo branch first. When the timeline outgrows the
    /// configured limit, the oldest snapshot after the baseline is dropped,
    /// releasing the image payloads only it still referenced.
    pub fn push(&mut self, state: PageCollection) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(state);
        while self.snapshots.len() > self.limit + 1 {
            self.snapshots.remove(1);
            debug!("history limit reached, dropped oldest snapshot");
        }
        self.cursor = self.snapshots.len() - 1;
    }

    /// Step back one snapshot. At the baseline this is a no-op, not an
    /// error.
    pub fn undo(&mut self) -> &PageCollection {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.current()
    }

    /// Step forward one snapshot. At the newest snapshot this is a no-op.
    pub fn redo(&mut self) -> &PageCollection {
        if self.cursor + 1 < self.snapshots.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// The snapshot at the cursor. Never absent: the baseline always exists.
    pub fn current(&self) -> &PageCollection {
        &self.snapshots[self.cursor]
    }

    /// Collapse back to the single empty baseline.
    pub fn reset(&mut self) {
        self.snapshots = vec![PageCollection::new()];
        self.cursor = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Number of snapshots currently held, baseline included.
    pub fn depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(blattwerk_core::SessionConfig::default().history_limit)
    }
}
