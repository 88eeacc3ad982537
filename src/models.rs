//! Core data models used throughout linkbrief.
//!
//! These types represent the content that flows through the pipeline:
//! raw extractor output (transcript segments, repository nodes), the
//! normalized document handed to synthesis, and the final analysis result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timed unit of transcribed speech.
///
/// Segments are ordered by `start_seconds`, non-decreasing. An absent
/// duration means the captions carried no explicit end time; it is
/// inferred during extraction from the next segment's start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_seconds: f64,
    pub duration_seconds: Option<f64>,
    pub text: String,
}

/// Basic metadata about a video, from the host's oEmbed endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub author: String,
}

/// Kind of a repository tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One node of a repository file tree.
///
/// Paths are posix-style, relative to the repository root. `is_binary`
/// is only meaningful for files; directories always carry `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoNode {
    pub path: String,
    pub kind: NodeKind,
    pub is_binary: bool,
    pub size_bytes: u64,
}

/// Extracted repository content: the full tree plus the text file
/// contents that fit the content budget, in fetch priority order
/// (README first, then shallowest-path-first).
#[derive(Debug, Clone, Default)]
pub struct RepoContent {
    pub tree: Vec<RepoNode>,
    /// `(path, text)` pairs, ordered. Binary and over-budget files are
    /// represented in `tree` only.
    pub texts: Vec<(String, String)>,
    pub readme_path: Option<String>,
}

/// Origin of a normalized document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Video,
    Repository,
}

/// One unit of normalized content.
///
/// Exactly one of `timestamp_seconds` (video origin) or `source_path`
/// (repository origin) is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl Block {
    /// Render the block for inclusion in a model prompt. Repository
    /// blocks carry a file header so the model can attribute content.
    pub fn rendered(&self) -> String {
        match &self.source_path {
            Some(path) => format!("File: {}\n{}", path, self.text),
            None => self.text.clone(),
        }
    }
}

/// The uniform intermediate representation both extraction paths
/// normalize into, and the sole input to synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDocument {
    pub kind: DocumentKind,
    pub blocks: Vec<Block>,
}

impl ContentDocument {
    /// Start offset of the first block, for video documents.
    pub fn first_timestamp(&self) -> Option<f64> {
        self.blocks.first().and_then(|b| b.timestamp_seconds)
    }
}

/// A chapter aligned to a concrete transcript offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_seconds: f64,
}

/// The final synthesized analysis for one URL.
///
/// `chapters` is populated for video sources only; `structure_digest`
/// for repository sources only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub url: String,
    pub title: String,
    pub kind: DocumentKind,
    pub summary: String,
    /// Lowercase, deduplicated, at most [`MAX_TAGS`].
    pub tags: Vec<String>,
    pub chapters: Vec<Chapter>,
    pub structure_digest: String,
    pub processed_at: DateTime<Utc>,
}

/// Upper bound on the number of tags in an [`AnalysisResult`].
pub const MAX_TAGS: usize = 15;

/// Format a second offset as `HH:MM:SS`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(59.9), "00:00:59");
        assert_eq!(format_timestamp(150.0), "00:02:30");
        assert_eq!(format_timestamp(3725.0), "01:02:05");
        assert_eq!(format_timestamp(-3.0), "00:00:00");
    }

    #[test]
    fn test_block_rendered_with_path() {
        let block = Block {
            text: "fn main() {}".to_string(),
            timestamp_seconds: None,
            source_path: Some("src/main.rs".to_string()),
        };
        assert_eq!(block.rendered(), "File: src/main.rs\nfn main() {}");
    }

    #[test]
    fn test_block_rendered_plain() {
        let block = Block {
            text: "hello there".to_string(),
            timestamp_seconds: Some(12.0),
            source_path: None,
        };
        assert_eq!(block.rendered(), "hello there");
    }
}
