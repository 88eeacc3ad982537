//! Export of finished analyses to a note service.
//!
//! [`NoteExporter`] is the outbound capability; [`CapacitiesExporter`]
//! posts a weblink object to the Capacities API. Export is strictly
//! additive: a failure here never invalidates the analysis, the caller
//! keeps the result and may retry the export alone.

use async_trait::async_trait;
use log::debug;
use serde_json::json;
use std::time::Duration;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::models::{format_timestamp, AnalysisResult};

/// Maximum characters sent as the note description.
const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Confirmation of a completed export.
#[derive(Debug, Clone)]
pub struct ExportReceipt {
    pub service: String,
    /// Identifier of the created note, when the service reports one.
    pub note_id: Option<String>,
}

/// Pushes one analysis to an external note service.
#[async_trait]
pub trait NoteExporter: Send + Sync {
    async fn export(&self, result: &AnalysisResult) -> Result<ExportReceipt, ExportError>;
}

/// Render the analysis as the markdown body of the note.
pub fn render_markdown(result: &AnalysisResult) -> String {
    let mut out = String::new();

    out.push_str("## Summary\n\n");
    out.push_str(result.summary.trim());
    out.push('\n');

    if !result.chapters.is_empty() {
        out.push_str("\n## Chapters\n\n");
        for chapter in &result.chapters {
            out.push_str(&format!(
                "- **{}** {}\n",
                format_timestamp(chapter.start_seconds),
                chapter.title
            ));
        }
    }

    if !result.structure_digest.is_empty() {
        out.push_str("\n## Structure\n\n");
        out.push_str(result.structure_digest.trim());
        out.push('\n');
    }

    if !result.tags.is_empty() {
        let hashtags: Vec<String> = result.tags.iter().map(|t| format!("#{}", t)).collect();
        out.push_str(&format!("\n{}\n", hashtags.join(" ")));
    }

    out.push_str(&format!(
        "\nAnalyzed on {}\n",
        result.processed_at.format("%Y-%m-%d")
    ));
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Client for the Capacities save-weblink endpoint.
pub struct CapacitiesExporter {
    api_base: String,
    api_key: String,
    space_id: String,
    client: reqwest::Client,
}

impl CapacitiesExporter {
    /// Create an exporter from configuration. Requires a configured
    /// space id and the API key in the configured environment variable.
    pub fn new(config: &ExportConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        let space_id = config
            .space_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("export.space_id is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            space_id,
            client,
        })
    }
}

#[async_trait]
impl NoteExporter for CapacitiesExporter {
    async fn export(&self, result: &AnalysisResult) -> Result<ExportReceipt, ExportError> {
        let body = json!({
            "spaceId": self.space_id,
            "url": result.url,
            "titleOverwrite": truncate_chars(&result.title, 500),
            "descriptionOverwrite": truncate_chars(&result.summary, DESCRIPTION_MAX_CHARS),
            "mdText": render_markdown(result),
        });

        let response = self
            .client
            .post(format!("{}/save-weblink", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ExportError::Network(e.to_string()))?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(ExportError::AuthFailed(format!("status {}", status)));
        }
        if status == 400 || status == 422 {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExportError::ValidationFailed(detail));
        }
        if !status.is_success() {
            return Err(ExportError::Network(format!("status {}", status)));
        }

        let note_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["id"].as_str().map(|s| s.to_string()));
        debug!("exported {} to capacities", result.url);

        Ok(ExportReceipt {
            service: "capacities".to_string(),
            note_id,
        })
    }
}
