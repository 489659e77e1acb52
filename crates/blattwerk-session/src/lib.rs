// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-session — Editing session core.
//
// Holds the linear undo/redo history of page-collection snapshots, the pure
// copy-on-write mutation operations, the batch orchestrator that fans
// per-page work out concurrently and merges it back in page order, and the
// `EditorSession` context that ties them to the document and vision
// collaborators.

pub mod batch;
pub mod history;
pub mod ops;
pub mod session;
pub mod tables;

pub use history::History;
pub use session::EditorSession;
