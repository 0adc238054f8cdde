//! Sliding-window chunking of loaded segments.
//!
//! Each segment is windowed on its own so chunks never straddle two pages or files. Windows are
//! `chunk_size` characters wide and advance by `chunk_size - overlap`, so consecutive chunks of a
//! segment share exactly `overlap` characters. Lengths are counted in `char`s, not bytes.

use super::types::{Chunk, ChunkingError, TextSegment};

/// Split segments into overlapping fixed-size chunks.
///
/// Requires `chunk_size > overlap`. Blank segments produce no chunks; a segment no longer than
/// `chunk_size` produces exactly one.
pub fn split(
    segments: &[TextSegment],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(ChunkingError::InvalidParameters {
            chunk_size,
            overlap,
        });
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();

    for (segment_index, segment) in segments.iter().enumerate() {
        if segment.text.trim().is_empty() {
            continue;
        }

        // Byte offset of every char boundary, plus the end of the string.
        let boundaries: Vec<usize> = segment
            .text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(segment.text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let mut start = 0;
        loop {
            let end = (start + chunk_size).min(char_count);
            chunks.push(Chunk {
                text: segment.text[boundaries[start]..boundaries[end]].to_string(),
                metadata: segment.metadata.clone(),
                segment_index,
                start,
            });
            if end == char_count {
                break;
            }
            start += step;
        }
    }

    tracing::debug!(
        segments = segments.len(),
        chunks = chunks.len(),
        chunk_size,
        overlap,
        "Document split"
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::Metadata;

    fn segment(text: &str, page: &str) -> TextSegment {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "proposal.pdf".into());
        metadata.insert("page".into(), page.into());
        TextSegment {
            text: text.to_string(),
            metadata,
        }
    }

    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            if idx == 0 {
                text.push_str(&chunk.text);
            } else {
                text.extend(chunk.text.chars().skip(overlap));
            }
        }
        text
    }

    #[test]
    fn short_segment_yields_one_chunk() {
        let chunks = split(&[segment("Budget: $500,000", "1")], 100, 10).expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Budget: $500,000");
        assert_eq!(chunks[0].metadata["page"], "1");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let chunks = split(&[segment("abcdefghij", "1")], 4, 1).expect("chunks");
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
        assert_eq!(
            chunks.iter().map(|chunk| chunk.start).collect::<Vec<_>>(),
            vec![0, 3, 6]
        );
    }

    #[test]
    fn chunk_invariants_hold_across_parameters() {
        let text = "Water Infrastructure Upgrade. Budget: $500,000. Timeline: 6 months. \
                    Objectives: replace old pipelines and improve water quality for 10,000 residents.";
        for (chunk_size, overlap) in [(1, 0), (7, 0), (7, 3), (16, 15), (50, 10), (500, 499)] {
            let chunks = split(&[segment(text, "1")], chunk_size, overlap).expect("chunks");
            assert!(!chunks.is_empty());
            for chunk in &chunks {
                assert!(chunk.text.chars().count() <= chunk_size);
            }
            for pair in chunks.windows(2) {
                let previous: Vec<char> = pair[0].text.chars().collect();
                let current: Vec<char> = pair[1].text.chars().collect();
                assert_eq!(
                    previous[previous.len() - overlap..],
                    current[..overlap],
                    "overlap mismatch for size {chunk_size} overlap {overlap}"
                );
            }
            assert_eq!(reconstruct(&chunks, overlap), text);
        }
    }

    #[test]
    fn chunks_do_not_cross_segment_boundaries() {
        let segments = [segment("first page text", "1"), segment("second", "2")];
        let chunks = split(&segments, 8, 2).expect("chunks");
        assert!(chunks.iter().any(|chunk| chunk.segment_index == 1));
        for chunk in &chunks {
            let source = &segments[chunk.segment_index];
            assert!(source.text.contains(&chunk.text));
            assert_eq!(chunk.metadata, source.metadata);
        }
    }

    #[test]
    fn multibyte_text_is_counted_in_chars() {
        let chunks = split(&[segment("€€€€€", "1")], 2, 0).expect("chunks");
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["€€", "€€", "€"]);
    }

    #[test]
    fn blank_segments_are_skipped() {
        let chunks = split(&[segment("   ", "1"), segment("text", "2")], 10, 0).expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].segment_index, 1);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let error = split(&[segment("text", "1")], 4, 4).expect_err("invalid");
        assert!(matches!(
            error,
            ChunkingError::InvalidParameters {
                chunk_size: 4,
                overlap: 4
            }
        ));
        assert!(split(&[], 0, 0).is_err());
    }

    #[test]
    fn split_is_deterministic() {
        let segments = [segment("The quick brown fox jumps over the lazy dog.", "1")];
        assert_eq!(split(&segments, 10, 3).unwrap(), split(&segments, 10, 3).unwrap());
    }
}
