//! Analysis synthesis over a normalized document.
//!
//! The synthesizer runs a fixed sequence of model calls against a
//! [`LanguageModel`]: summary (map-reduce over chunks when the document
//! does not fit in one), tags, and a kind-specific step that produces
//! chapters for videos or a structure digest for repositories. This is
//! the only place that dispatches on [`DocumentKind`]; everything
//! upstream and downstream is kind-agnostic.

use chrono::Utc;
use log::{debug, warn};
use serde::Deserialize;

use crate::chapters::{self, ProposedBoundary};
use crate::chunk::chunk_blocks;
use crate::config::{ChunkingConfig, ModelConfig};
use crate::error::SynthesisError;
use crate::llm::LanguageModel;
use crate::models::{
    format_timestamp, AnalysisResult, ContentDocument, DocumentKind, RepoContent,
    TranscriptSegment, VideoInfo, MAX_TAGS,
};
use crate::repo::tree_outline;

/// Source-specific material the synthesizer needs beyond the document:
/// timed segments for chapter alignment, the tree for the structure
/// digest, and the display title.
pub enum SourceData {
    Video {
        info: VideoInfo,
        segments: Vec<TranscriptSegment>,
    },
    Repository {
        owner: String,
        repo: String,
        content: RepoContent,
    },
}

impl SourceData {
    fn title(&self) -> String {
        match self {
            SourceData::Video { info, .. } => info.title.clone(),
            SourceData::Repository { owner, repo, .. } => format!("{}/{}", owner, repo),
        }
    }
}

/// Split a raw tag line into clean tags: comma or newline separated,
/// leading `#` stripped, lowercased, deduplicated in order, capped.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for piece in raw.split(|c| c == ',' || c == '\n') {
        let tag = piece.trim().trim_start_matches('#').trim().to_lowercase();
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        tags.push(tag);
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

#[derive(Deserialize)]
struct BoundaryJson {
    anchor: String,
    title: String,
}

/// Parse the model's chapter proposal: a JSON array of
/// `{"anchor", "title"}` objects, possibly wrapped in a code fence.
pub fn parse_boundaries(raw: &str) -> Result<Vec<ProposedBoundary>, SynthesisError> {
    let stripped = strip_code_fence(raw);
    let parsed: Vec<BoundaryJson> = serde_json::from_str(stripped)
        .map_err(|e| SynthesisError::InvalidResponse(format!("chapter JSON: {}", e)))?;
    Ok(parsed
        .into_iter()
        .filter(|b| !b.anchor.trim().is_empty())
        .map(|b| ProposedBoundary {
            anchor: b.anchor,
            title: b.title,
        })
        .collect())
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    let inner = match inner.find('\n') {
        Some(pos) => &inner[pos + 1..],
        None => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Runs the synthesis step sequence for one document.
pub struct Synthesizer<'a> {
    model: &'a dyn LanguageModel,
    model_config: &'a ModelConfig,
    chunking: &'a ChunkingConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        model_config: &'a ModelConfig,
        chunking: &'a ChunkingConfig,
    ) -> Self {
        Self {
            model,
            model_config,
            chunking,
        }
    }

    /// Produce the full [`AnalysisResult`] for a document.
    pub async fn synthesize(
        &self,
        url: &str,
        doc: &ContentDocument,
        source: &SourceData,
    ) -> Result<AnalysisResult, SynthesisError> {
        let summary = self.summarize(doc).await?;
        let tags = self.tag(&summary).await?;

        let (chapters, structure_digest) = match source {
            SourceData::Video { segments, .. } => {
                (self.chapterize(doc, segments).await?, String::new())
            }
            SourceData::Repository { content, .. } => {
                (Vec::new(), self.digest_structure(content, &summary).await?)
            }
        };

        Ok(AnalysisResult {
            url: url.to_string(),
            title: source.title(),
            kind: doc.kind,
            summary,
            tags,
            chapters,
            structure_digest,
            processed_at: Utc::now(),
        })
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, SynthesisError> {
        self.model
            .complete(system, user, self.model_config.max_output_tokens)
            .await
    }

    /// Like [`Self::complete`], but an empty reply gets one corrective
    /// retry with a stricter instruction before failing.
    async fn complete_nonempty(
        &self,
        system: &str,
        user: &str,
    ) -> Result<String, SynthesisError> {
        let reply = self.complete(system, user).await?;
        if !reply.trim().is_empty() {
            return Ok(reply);
        }

        warn!("model returned an empty reply, retrying once");
        let strict = format!(
            "{} Your previous reply was empty. Reply with the requested text \
             and nothing else.",
            system
        );
        let reply = self.complete(&strict, user).await?;
        if reply.trim().is_empty() {
            return Err(SynthesisError::InvalidResponse(
                "model returned an empty reply twice".to_string(),
            ));
        }
        Ok(reply)
    }

    /// Map-reduce summarization: each chunk is summarized on its own,
    /// then the partial summaries are merged. A single chunk skips the
    /// reduce step.
    async fn summarize(&self, doc: &ContentDocument) -> Result<String, SynthesisError> {
        let chunks = chunk_blocks(&doc.blocks, self.chunking.max_chunk_chars);
        if chunks.is_empty() {
            return Err(SynthesisError::InvalidResponse(
                "document has no content".to_string(),
            ));
        }

        let system = match doc.kind {
            DocumentKind::Video => {
                "You summarize video transcripts. Write a concise prose summary \
                 of the main points. No preamble."
            }
            DocumentKind::Repository => {
                "You summarize software repositories. Write a concise prose \
                 summary of what the project does and how. No preamble."
            }
        };

        if chunks.len() == 1 {
            return self.complete_nonempty(system, &chunks[0].text).await;
        }

        debug!("map-reduce summary over {} chunks", chunks.len());
        let mut partials = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let user = format!("Part {} of {}:\n\n{}", idx + 1, chunks.len(), chunk.text);
            partials.push(self.complete(system, &user).await?);
        }

        let reduce_user = format!(
            "Merge these part summaries of one document into a single \
             coherent summary:\n\n{}",
            partials.join("\n\n---\n\n")
        );
        self.complete_nonempty(system, &reduce_user).await
    }

    async fn tag(&self, summary: &str) -> Result<Vec<String>, SynthesisError> {
        let raw = self
            .complete(
                "You produce topic tags. Reply with a comma-separated list of \
                 short lowercase tags, nothing else.",
                summary,
            )
            .await?;
        Ok(parse_tags(&raw))
    }

    /// Ask the model for chapter boundaries as verbatim anchors, then
    /// align them back to segment timestamps. A malformed reply gets
    /// one corrective retry with a stricter instruction.
    async fn chapterize(
        &self,
        doc: &ContentDocument,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<crate::models::Chapter>, SynthesisError> {
        let system = "You split a video transcript into chapters. Reply with a JSON \
                      array of objects with fields \"anchor\" (a short phrase quoted \
                      VERBATIM from the transcript where the chapter starts) and \
                      \"title\" (the chapter name). No other text.";

        // Timestamped lines help the model pick boundaries, capped to
        // one chunk's worth of text.
        let (lines, included) = timestamped_lines(segments, self.chunking.max_chunk_chars);
        if included < segments.len() {
            warn!(
                "chapter proposal sees only the first {} of {} segments; \
                 later boundaries cannot be proposed",
                included,
                segments.len()
            );
        }

        let mut raw = self.complete(system, &lines).await?;
        let proposed = match parse_boundaries(&raw) {
            Ok(p) => p,
            Err(first_err) => {
                warn!("chapter proposal unparseable, retrying once: {}", first_err);
                let strict = format!(
                    "{} Your previous reply was not valid JSON. Reply with ONLY \
                     the JSON array.",
                    system
                );
                raw = self.complete(&strict, &lines).await?;
                parse_boundaries(&raw)?
            }
        };

        let mut chapters = chapters::align(&proposed, segments);

        // Ensure coverage from the start of the video.
        if let Some(first) = doc.first_timestamp() {
            let starts_at_opening = chapters
                .first()
                .map(|c| c.start_seconds <= first)
                .unwrap_or(false);
            if !starts_at_opening {
                chapters.insert(
                    0,
                    crate::models::Chapter {
                        title: "Introduction".to_string(),
                        start_seconds: first,
                    },
                );
            }
        }

        Ok(chapters)
    }

    /// Narrative digest of the repository layout: the full tree outline
    /// followed by a model-written walkthrough.
    async fn digest_structure(
        &self,
        content: &RepoContent,
        summary: &str,
    ) -> Result<String, SynthesisError> {
        let outline = tree_outline(&content.tree);
        let user = format!(
            "Project summary:\n{}\n\nFile tree:\n{}",
            summary,
            truncate_chars(&outline, self.chunking.max_chunk_chars)
        );
        let narrative = self
            .complete(
                "You explain repository layouts. Given a project summary and its \
                 file tree, describe how the codebase is organized and where the \
                 main pieces live. No preamble.",
                &user,
            )
            .await?;

        Ok(format!("{}\n\n{}", outline.trim_end(), narrative))
    }
}

/// Render `[HH:MM:SS] text` lines for the chapter prompt, stopping at
/// `max_chars`. Returns the rendered text and how many segments fit.
fn timestamped_lines(segments: &[TranscriptSegment], max_chars: usize) -> (String, usize) {
    let mut lines = String::new();
    let mut included = 0usize;
    for segment in segments {
        let line = format!(
            "[{}] {}\n",
            format_timestamp(segment.start_seconds),
            segment.text
        );
        if lines.len() + line.len() > max_chars {
            break;
        }
        lines.push_str(&line);
        included += 1;
    }
    (lines, included)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_parse_tags_cleanup() {
        let tags = parse_tags("#Rust, CLI , rust,, async\nTokio");
        assert_eq!(tags, vec!["rust", "cli", "async", "tokio"]);
    }

    #[test]
    fn test_parse_tags_cap() {
        let raw = (0..30).map(|i| format!("tag{}", i)).collect::<Vec<_>>().join(", ");
        assert_eq!(parse_tags(&raw).len(), MAX_TAGS);
    }

    #[test]
    fn test_parse_boundaries_plain_and_fenced() {
        let plain = r#"[{"anchor": "welcome back", "title": "Intro"}]"#;
        let fenced = format!("```json\n{}\n```", plain);

        for raw in [plain.to_string(), fenced] {
            let parsed = parse_boundaries(&raw).unwrap();
            assert_eq!(parsed.len(), 1);
            assert_eq!(parsed[0].anchor, "welcome back");
            assert_eq!(parsed[0].title, "Intro");
        }
    }

    #[test]
    fn test_parse_boundaries_rejects_prose() {
        assert!(parse_boundaries("Sure! Here are the chapters:").is_err());
    }

    // ---- scripted model ----

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _max_output_tokens: u32,
        ) -> Result<String, SynthesisError> {
            self.calls.lock().unwrap().push(user.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SynthesisError::ModelUnavailable("script exhausted".to_string()))
        }
    }

    fn segment(start: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_seconds: start,
            duration_seconds: Some(5.0),
            text: text.to_string(),
        }
    }

    fn video_doc(segments: &[TranscriptSegment]) -> ContentDocument {
        crate::document::from_transcript(segments)
    }

    fn configs() -> (ModelConfig, ChunkingConfig) {
        (ModelConfig::default(), ChunkingConfig::default())
    }

    #[tokio::test]
    async fn test_video_synthesis_end_to_end() {
        let segments = vec![
            segment(0.0, "welcome to the show"),
            segment(30.0, "first we cover parsing"),
            segment(150.0, "now on to codegen"),
        ];
        let doc = video_doc(&segments);
        let model = ScriptedModel::new(&[
            "A talk about compilers.",
            "Compilers, #Parsing",
            r#"[{"anchor": "we cover parsing", "title": "Parsing"},
                {"anchor": "on to codegen", "title": "Codegen"}]"#,
        ]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Video {
            info: VideoInfo {
                title: "Compilers 101".to_string(),
                author: "Ada".to_string(),
            },
            segments: segments.clone(),
        };
        let result = synth
            .synthesize("https://youtu.be/abc123def45", &doc, &source)
            .await
            .unwrap();

        assert_eq!(result.title, "Compilers 101");
        assert_eq!(result.kind, DocumentKind::Video);
        assert_eq!(result.summary, "A talk about compilers.");
        assert_eq!(result.tags, vec!["compilers", "parsing"]);
        assert!(result.structure_digest.is_empty());

        // Neither anchor matches the opening segment, so an
        // Introduction chapter is prepended at the first timestamp.
        let titles: Vec<&str> = result.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Introduction", "Parsing", "Codegen"]);
        assert_eq!(result.chapters[0].start_seconds, 0.0);
        assert_eq!(result.chapters[1].start_seconds, 30.0);
        assert_eq!(result.chapters[2].start_seconds, 150.0);
    }

    #[tokio::test]
    async fn test_chapter_retry_then_success() {
        let segments = vec![segment(0.0, "hello world")];
        let doc = video_doc(&segments);
        let model = ScriptedModel::new(&[
            "Summary.",
            "tag",
            "Sorry, here you go:",
            r#"[{"anchor": "hello world", "title": "Hello"}]"#,
        ]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Video {
            info: VideoInfo {
                title: "t".to_string(),
                author: "a".to_string(),
            },
            segments: segments.clone(),
        };
        let result = synth.synthesize("u", &doc, &source).await.unwrap();

        // summary + tags + failed chapters + retried chapters
        assert_eq!(model.call_count(), 4);
        assert_eq!(result.chapters.len(), 1);
        assert_eq!(result.chapters[0].title, "Hello");
    }

    #[tokio::test]
    async fn test_chapter_double_failure_is_invalid_response() {
        let segments = vec![segment(0.0, "hello")];
        let doc = video_doc(&segments);
        let model = ScriptedModel::new(&["Summary.", "tag", "not json", "still not json"]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Video {
            info: VideoInfo {
                title: "t".to_string(),
                author: "a".to_string(),
            },
            segments,
        };
        let err = synth.synthesize("u", &doc, &source).await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_map_reduce_over_multiple_chunks() {
        // Three oversized blocks force three chunks.
        let blocks: Vec<Block> = (0..3)
            .map(|i| Block {
                text: format!("{} ", i).repeat(300),
                timestamp_seconds: None,
                source_path: Some(format!("f{}.txt", i)),
            })
            .collect();
        let doc = ContentDocument {
            kind: DocumentKind::Repository,
            blocks,
        };

        let model = ScriptedModel::new(&[
            "part one", "part two", "part three", "merged summary", "tags", "layout",
        ]);
        let model_config = ModelConfig::default();
        let chunking = ChunkingConfig {
            max_chunk_chars: 200,
        };
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Repository {
            owner: "o".to_string(),
            repo: "r".to_string(),
            content: RepoContent {
                tree: Vec::new(),
                texts: Vec::new(),
                readme_path: None,
            },
        };
        let result = synth.synthesize("u", &doc, &source).await.unwrap();

        assert_eq!(result.summary, "merged summary");
        assert_eq!(result.title, "o/r");
        assert!(result.chapters.is_empty());
        assert!(result.structure_digest.contains("layout"));
        // 3 map calls + 1 reduce + tags + digest
        assert_eq!(model.call_count(), 6);

        let calls = model.calls.lock().unwrap();
        assert!(calls[0].starts_with("Part 1 of 3:"));
        assert!(calls[3].starts_with("Merge these part summaries"));
    }

    #[tokio::test]
    async fn test_empty_summary_reply_retried_once() {
        let segments = vec![segment(0.0, "hello world")];
        let doc = video_doc(&segments);
        // First summary reply is empty; the corrective retry recovers.
        let model = ScriptedModel::new(&[
            "",
            "A recovered summary.",
            "tag",
            r#"[{"anchor": "hello world", "title": "Hello"}]"#,
        ]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Video {
            info: VideoInfo {
                title: "t".to_string(),
                author: "a".to_string(),
            },
            segments: segments.clone(),
        };
        let result = synth.synthesize("u", &doc, &source).await.unwrap();

        assert_eq!(result.summary, "A recovered summary.");
        assert_eq!(model.call_count(), 4);
    }

    #[tokio::test]
    async fn test_empty_summary_twice_is_invalid_response() {
        let segments = vec![segment(0.0, "hello")];
        let doc = video_doc(&segments);
        let model = ScriptedModel::new(&["", "   \n"]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);

        let source = SourceData::Video {
            info: VideoInfo {
                title: "t".to_string(),
                author: "a".to_string(),
            },
            segments,
        };
        let err = synth.synthesize("u", &doc, &source).await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidResponse(_)));
        assert_eq!(model.call_count(), 2);
    }

    #[test]
    fn test_timestamped_lines_cap() {
        let segments: Vec<TranscriptSegment> = (0..100)
            .map(|i| segment(i as f64 * 10.0, "a segment of reasonable length"))
            .collect();

        let (full, all) = timestamped_lines(&segments, 1_000_000);
        assert_eq!(all, segments.len());
        assert!(full.starts_with("[00:00:00] a segment"));

        let (capped, included) = timestamped_lines(&segments, 200);
        assert!(capped.len() <= 200);
        assert!(included < segments.len());
        assert!(included > 0);
        assert_eq!(capped.lines().count(), included);
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let doc = ContentDocument {
            kind: DocumentKind::Video,
            blocks: Vec::new(),
        };
        let model = ScriptedModel::new(&[]);
        let (model_config, chunking) = configs();
        let synth = Synthesizer::new(&model, &model_config, &chunking);
        let source = SourceData::Video {
            info: VideoInfo {
                title: "t".to_string(),
                author: "a".to_string(),
            },
            segments: Vec::new(),
        };

        let err = synth.synthesize("u", &doc, &source).await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidResponse(_)));
        assert_eq!(model.call_count(), 0);
    }
}
