//! Normalization of extractor output into a [`ContentDocument`].
//!
//! Both extraction paths converge here on the one representation the
//! synthesizer consumes. Pure and deterministic: the same input always
//! yields the same block order.

use crate::models::{Block, ContentDocument, DocumentKind, RepoContent, TranscriptSegment};

/// One block per transcript segment, timestamp populated.
pub fn from_transcript(segments: &[TranscriptSegment]) -> ContentDocument {
    let blocks = segments
        .iter()
        .map(|seg| Block {
            text: seg.text.clone(),
            timestamp_seconds: Some(seg.start_seconds),
            source_path: None,
        })
        .collect();

    ContentDocument {
        kind: DocumentKind::Video,
        blocks,
    }
}

/// One block per fetched text file, source path populated.
///
/// `RepoContent::texts` is already in fetch priority order with the
/// README first; that order is preserved verbatim.
pub fn from_repo(content: &RepoContent) -> ContentDocument {
    let blocks = content
        .texts
        .iter()
        .map(|(path, text)| Block {
            text: text.clone(),
            timestamp_seconds: None,
            source_path: Some(path.clone()),
        })
        .collect();

    ContentDocument {
        kind: DocumentKind::Repository,
        blocks,
    }
}
