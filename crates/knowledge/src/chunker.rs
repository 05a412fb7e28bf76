//! Splits source documents into snippet-sized pieces before embedding.

use crate::types::ChunkCandidate;

fn floor_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn ceil_boundary(text: &str, mut at: usize) -> usize {
    while at < text.len() && !text.is_char_boundary(at) {
        at += 1;
    }
    at
}

/// End of the window starting at `start`: at most `size` bytes, pulled back
/// to the last whitespace unless the window reaches the end of `text`.
fn window_end(text: &str, start: usize, size: usize) -> usize {
    let mut end = floor_boundary(text, (start + size).min(text.len())).max(start);

    if end < text.len() {
        if let Some(ws) = text[start..end].rfind(char::is_whitespace).filter(|&ws| ws > 0) {
            end = start + ws;
        }
    }

    if end == start {
        // One character wider than the window.
        end += text[start..].chars().next().map_or(1, char::len_utf8);
    }
    end
}

/// Byte ranges of every window, each starting `overlap` bytes before the
/// previous end and always advancing.
fn windows(text: &str, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = window_end(text, start, size);
        ranges.push((start, end));
        if end >= text.len() {
            break;
        }
        start = ceil_boundary(text, end.saturating_sub(overlap).max(start + 1));
    }
    ranges
}

/// Overlapping chunks of at most `chunk_size` bytes, numbered in order.
/// Whitespace-only windows are skipped without using up a position.
pub fn chunk_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<ChunkCandidate> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let chunks: Vec<ChunkCandidate> = windows(text, chunk_size, overlap)
        .into_iter()
        .filter(|&(start, end)| !text[start..end].trim().is_empty())
        .enumerate()
        .map(|(position, (start, end))| ChunkCandidate {
            source_id: source_id.to_string(),
            position: position as u32,
            text: text[start..end].trim().to_string(),
            metadata: serde_json::json!({ "start": start, "end": end }),
        })
        .collect();

    tracing::debug!(
        "Split '{}' into {} chunks ({} bytes, overlap {})",
        source_id,
        chunks.len(),
        chunk_size,
        overlap
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_text_is_split_in_order() {
        let text = "a".repeat(1000);
        let chunks = chunk_text("notes.md", &text, 200, 50);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().enumerate().all(|(i, c)| c.position == i as u32));
        assert!(chunks.iter().all(|c| c.text.len() <= 200));
    }

    #[test]
    fn test_windows_without_overlap_tile_the_text() {
        let text = "a".repeat(300);
        assert_eq!(windows(&text, 100, 0), vec![(0, 100), (100, 200), (200, 300)]);
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert!(chunk_text("s", "", 100, 10).is_empty());
        assert!(chunk_text("s", "   \n", 100, 10).is_empty());
        assert!(chunk_text("s", "text", 0, 0).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("s", "Water boils at 100 C.", 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Water boils at 100 C.");
        assert_eq!(chunks[0].metadata["end"], 21);
    }

    #[test]
    fn test_words_are_not_split() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        for chunk in chunk_text("s", text, 12, 0) {
            for word in chunk.text.split_whitespace() {
                assert!(text.split_whitespace().any(|w| w == word), "split word {}", word);
            }
        }
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(10);
        let chunks = chunk_text("s", &text, 50, 10);

        let tail = &chunks[0].text[40..];
        assert!(chunks[1].text.starts_with(tail));
    }

    #[test]
    fn test_multibyte_text_respects_char_boundaries() {
        let text = "é".repeat(100);
        let chunks = chunk_text("s", &text, 15, 3);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.text.chars().all(|ch| ch == 'é')));
    }
}
