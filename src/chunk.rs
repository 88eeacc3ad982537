//! Block-atomic document chunker.
//!
//! Splits a [`ContentDocument`]'s blocks into [`DocChunk`]s that respect
//! a maximum rendered-character budget. A block is the atomic unit: a
//! split never occurs inside a block. A single block larger than the
//! whole budget is truncated with an explicit marker instead.

use std::ops::Range;

use crate::models::Block;

/// Marker appended to a block that had to be cut to fit the budget.
pub const TRUNCATION_MARKER: &str = " … [truncated]";

/// A model-context-sized slice of the document, composed of whole blocks.
#[derive(Debug, Clone)]
pub struct DocChunk {
    /// Rendered text of the member blocks, joined with blank lines.
    pub text: String,
    /// Indices of the member blocks within the source document.
    /// Chunk ranges are contiguous and cover the block sequence exactly.
    pub block_range: Range<usize>,
}

/// Split blocks into chunks of at most `max_chars` rendered characters.
///
/// Returns an empty vec for an empty block list; otherwise every block
/// lands in exactly one chunk, in order.
pub fn chunk_blocks(blocks: &[Block], max_chars: usize) -> Vec<DocChunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut range_start = 0usize;

    for (i, block) in blocks.iter().enumerate() {
        let rendered = block.rendered();

        // An oversized block becomes its own, truncated chunk.
        if rendered.len() > max_chars {
            if !buf.is_empty() {
                chunks.push(DocChunk {
                    text: std::mem::take(&mut buf),
                    block_range: range_start..i,
                });
            }
            chunks.push(DocChunk {
                text: truncate_to(&rendered, max_chars),
                block_range: i..i + 1,
            });
            range_start = i + 1;
            continue;
        }

        let would_be = if buf.is_empty() {
            rendered.len()
        } else {
            buf.len() + 2 + rendered.len() // +2 for the \n\n separator
        };

        if would_be > max_chars && !buf.is_empty() {
            chunks.push(DocChunk {
                text: std::mem::take(&mut buf),
                block_range: range_start..i,
            });
            range_start = i;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(&rendered);
    }

    if !buf.is_empty() || range_start < blocks.len() {
        chunks.push(DocChunk {
            text: buf,
            block_range: range_start..blocks.len(),
        });
    }

    chunks
}

/// Cut `text` to at most `max_chars` bytes on a char boundary and
/// append [`TRUNCATION_MARKER`].
fn truncate_to(text: &str, max_chars: usize) -> String {
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.len());
    let mut cut = keep.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = text[..cut].to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str) -> Block {
        Block {
            text: text.to_string(),
            timestamp_seconds: Some(0.0),
            source_path: None,
        }
    }

    #[test]
    fn test_empty_input_no_chunks() {
        assert!(chunk_blocks(&[], 100).is_empty());
    }

    #[test]
    fn test_small_blocks_single_chunk() {
        let blocks = vec![block("alpha"), block("beta"), block("gamma")];
        let chunks = chunk_blocks(&blocks, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "alpha\n\nbeta\n\ngamma");
        assert_eq!(chunks[0].block_range, 0..3);
    }

    #[test]
    fn test_split_respects_block_boundaries() {
        let blocks = vec![block("aaaaaaaaaa"), block("bbbbbbbbbb"), block("cccccccccc")];
        // Budget fits one block plus separator but not two.
        let chunks = chunk_blocks(&blocks, 15);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.block_range, i..i + 1);
            assert!(!c.text.contains("\n\n"));
        }
    }

    #[test]
    fn test_ranges_cover_sequence_exactly() {
        let blocks: Vec<Block> = (0..40).map(|i| block(&format!("block number {}", i))).collect();
        let chunks = chunk_blocks(&blocks, 64);
        let mut next = 0usize;
        for c in &chunks {
            assert_eq!(c.block_range.start, next, "ranges must be contiguous");
            assert!(c.block_range.end > c.block_range.start);
            next = c.block_range.end;
        }
        assert_eq!(next, blocks.len());
    }

    #[test]
    fn test_oversized_block_truncated_alone() {
        let big = "x".repeat(500);
        let blocks = vec![block("small"), block(&big), block("tail")];
        let chunks = chunk_blocks(&blocks, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].block_range, 1..2);
        assert!(chunks[1].text.ends_with(TRUNCATION_MARKER));
        assert!(chunks[1].text.len() <= 100);
    }

    #[test]
    fn test_truncation_keeps_char_boundary() {
        // Multi-byte characters near the cut point must not split.
        let big = "é".repeat(300);
        let chunks = chunk_blocks(&[block(&big)], 101);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_long_document_chunk_count() {
        // 50 blocks of ~1000 chars with a 5000-char budget: at least 10 chunks.
        let blocks: Vec<Block> = (0..50).map(|_| block(&"w".repeat(1000))).collect();
        let chunks = chunk_blocks(&blocks, 5000);
        assert!(chunks.len() >= 10, "got {} chunks", chunks.len());
    }

    #[test]
    fn test_deterministic() {
        let blocks = vec![block("alpha"), block(&"b".repeat(200)), block("gamma")];
        let a = chunk_blocks(&blocks, 50);
        let b = chunk_blocks(&blocks, 50);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.block_range, y.block_range);
        }
    }
}
