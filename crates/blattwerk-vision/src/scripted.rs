// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Offline vision adapter with scripted per-call outcomes.
//
// Used by tests to drive batch scenarios deterministically, and by callers
// that have no API key configured. Outcomes are consumed in call order;
// an exhausted queue reports "no result".

use std::collections::VecDeque;
use std::sync::Mutex;

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{CropBox, ImageRef};

use crate::service::VisionService;

/// Scripted outcome for one table-extraction call.
#[derive(Debug, Clone)]
pub enum TableScript {
    /// The call succeeds and finds this CSV.
    Table(String),
    /// The call succeeds but finds no table.
    NoTable,
    /// The call fails with this reason.
    Fail(String),
}

/// A [`VisionService`] that replays queued outcomes instead of calling out.
#[derive(Debug, Default)]
pub struct ScriptedVision {
    crops: Mutex<VecDeque<Option<CropBox>>>,
    texts: Mutex<VecDeque<Option<String>>>,
    tables: Mutex<VecDeque<TableScript>>,
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_crop(&self, outcome: Option<CropBox>) -> &Self {
        if let Ok(mut queue) = self.crops.lock() {
            queue.push_back(outcome);
        }
        self
    }

    pub fn push_text(&self, outcome: Option<&str>) -> &Self {
        if let Ok(mut queue) = self.texts.lock() {
            queue.push_back(outcome.map(|s| s.to_string()));
        }
        self
    }

    pub fn push_table(&self, outcome: TableScript) -> &Self {
        if let Ok(mut queue) = self.tables.lock() {
            queue.push_back(outcome);
        }
        self
    }
}

impl VisionService for ScriptedVision {
    async fn suggest_crop(&self, _image: ImageRef) -> Option<CropBox> {
        self.crops
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .flatten()
    }

    async fn extract_text(&self, _image: ImageRef) -> Option<String> {
        self.texts
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .flatten()
    }

    async fn extract_table(&self, _image: ImageRef) -> Result<Option<String>> {
        let scripted = self
            .tables
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(TableScript::Table(csv)) => Ok(Some(csv)),
            Some(TableScript::NoTable) | None => Ok(None),
            Some(TableScript::Fail(reason)) => Err(BlattwerkError::Vision(reason)),
        }
    }
}
