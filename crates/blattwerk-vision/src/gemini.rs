// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP client for a Gemini-style generateContent endpoint.
//
// Requests carry the page image as an inline base64 part plus a task prompt;
// the model's text reply is parsed into a crop box, plain text, or CSV.
// Every request is bounded by the configured timeout and attempted once.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::{CropBox, ImageRef, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::service::VisionService;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const CROP_PROMPT: &str = "Locate the document in this photo. Reply with only a JSON object \
     {\"x\", \"y\", \"width\", \"height\"} giving the document's bounding box as percentages \
     (0-100) of the image dimensions. If no document is visible, reply NONE.";

const TEXT_PROMPT: &str =
    "Transcribe all text in this document image. Reply with the plain text only.";

const TABLE_PROMPT: &str = "Extract the table from this document image as CSV with a header row. \
     Reply with only the CSV. If the page contains no table, reply NO_TABLE.";

/// Vision client for the Gemini generateContent API.
pub struct GeminiVision {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiVision {
    /// Build a client with the configured per-request timeout.
    pub fn new(api_key: impl Into<String>, config: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.vision_timeout())
            .build()
            .map_err(|err| BlattwerkError::Vision(format!("client build failed: {}", err)))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Override the endpoint base URL (tests point this at a local mock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// One prompt + image round trip, returning the model's text reply.
    #[instrument(skip_all, fields(model = %self.model, image_bytes = image.len()))]
    async fn generate(&self, prompt: &str, image: &ImageRef) -> Result<Option<String>> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(prompt.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.encoding().mime_type().to_string(),
                            data: BASE64.encode(image.bytes()),
                        }),
                    },
                ],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| BlattwerkError::Vision(format!("request failed: {}", err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlattwerkError::Vision(format!(
                "service returned {}",
                status
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| BlattwerkError::Vision(format!("malformed response body: {}", err)))?;

        let text = body
            .candidates
            .into_iter()
            .flatten()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .into_iter()
            .flatten()
            .find_map(|p| p.text);

        debug!(got_text = text.is_some(), "generate call complete");
        Ok(text)
    }
}

impl VisionService for GeminiVision {
    async fn suggest_crop(&self, image: ImageRef) -> Option<CropBox> {
        match self.generate(CROP_PROMPT, &image).await {
            Ok(Some(reply)) => parse_crop_reply(&reply),
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "crop suggestion unavailable");
                None
            }
        }
    }

    async fn extract_text(&self, image: ImageRef) -> Option<String> {
        match self.generate(TEXT_PROMPT, &image).await {
            Ok(Some(reply)) => {
                let trimmed = reply.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "text extraction unavailable");
                None
            }
        }
    }

    async fn extract_table(&self, image: ImageRef) -> Result<Option<String>> {
        let reply = self.generate(TABLE_PROMPT, &image).await?;
        Ok(reply.as_deref().and_then(parse_table_reply))
    }
}

/// Parse a crop-box reply, tolerating markdown code fences and prose around
/// the JSON object.
fn parse_crop_reply(reply: &str) -> Option<CropBox> {
    let stripped = strip_code_fence(reply);
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    let json = &stripped[start..=end];

    let parsed: CropBox = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(%err, "unparseable crop reply");
            return None;
        }
    };

    let boxed = parsed.clamped();
    (boxed.width > 0.0 && boxed.height > 0.0).then_some(boxed)
}

/// Normalise a table reply: fence-stripped CSV, or `None` for the
/// no-table sentinel / empty output.
fn parse_table_reply(reply: &str) -> Option<String> {
    let stripped = strip_code_fence(reply);
    let trimmed = stripped.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NO_TABLE") {
        return None;
    }
    Some(trimmed.to_string())
}

/// Drop a surrounding markdown code fence (``` or ```csv / ```json).
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// -- Wire types ---------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ReplyPart>>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}
