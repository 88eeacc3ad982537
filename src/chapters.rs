//! Chapter alignment.
//!
//! The model proposes topic boundaries as `{anchor, title}` pairs where
//! the anchor is a phrase it claims occurs at the transition. This
//! module grounds those proposals in the actual transcript: a boundary
//! whose anchor is not found verbatim (case-insensitively) is dropped,
//! never invented, and offsets never regress.

use log::warn;

use crate::models::{Chapter, TranscriptSegment};

/// A topic boundary proposed by the model, not yet tied to a timestamp.
#[derive(Debug, Clone)]
pub struct ProposedBoundary {
    pub anchor: String,
    pub title: String,
}

/// Map proposed boundaries onto transcript offsets.
///
/// For each boundary, the first segment at or after the previous
/// chapter's offset whose text contains the anchor wins. The result is
/// sorted by offset with duplicate offsets removed (keep first).
pub fn align(proposed: &[ProposedBoundary], segments: &[TranscriptSegment]) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut prev_offset = f64::NEG_INFINITY;

    for boundary in proposed {
        let anchor = boundary.anchor.trim().to_lowercase();
        if anchor.is_empty() {
            continue;
        }

        let hit = segments.iter().find(|seg| {
            seg.start_seconds >= prev_offset && seg.text.to_lowercase().contains(&anchor)
        });

        match hit {
            Some(seg) => {
                chapters.push(Chapter {
                    title: boundary.title.clone(),
                    start_seconds: seg.start_seconds,
                });
                prev_offset = seg.start_seconds;
            }
            None => {
                warn!(
                    "dropping chapter '{}': anchor not found in transcript",
                    boundary.title
                );
            }
        }
    }

    chapters.sort_by(|a, b| {
        a.start_seconds
            .partial_cmp(&b.start_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chapters.dedup_by(|b, a| a.start_seconds == b.start_seconds);
    chapters
}
