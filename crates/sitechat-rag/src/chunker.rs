//! Sliding-window text chunking with word-boundary snapping.

use sitechat_core::config::IngestConfig;

/// Split `text` into overlapping chunks of roughly `chunk_size` characters.
///
/// Windows prefer to end on whitespace: when the last whitespace in a window
/// sits past the halfway point, the window is cut there so words are not
/// split. Each
/// window after the first starts `chunk_overlap` characters before the
/// previous cut. Chunks shorter than `min_chunk_len` after trimming are
/// dropped. All offsets are in characters, not bytes.
pub fn chunk_text(text: &str, config: &IngestConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let mut cut = end;
        if end < chars.len() {
            if let Some(pos) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if pos > config.chunk_size / 2 {
                    cut = start + pos + 1;
                }
            }
        }

        let chunk: String = chars[start..cut].iter().collect();
        let trimmed = chunk.trim();
        if trimmed.chars().count() >= config.min_chunk_len {
            chunks.push(trimmed.to_string());
        }

        if cut >= chars.len() {
            break;
        }
        start = cut.saturating_sub(config.chunk_overlap);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let text = "The warranty covers parts and labor for two years.";
        let chunks = chunk_text(text, &config());
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_text_below_min_length_is_dropped() {
        assert!(chunk_text("too short", &config()).is_empty());
        assert!(chunk_text("", &config()).is_empty());
        assert!(chunk_text("   \n  ", &config()).is_empty());
    }

    #[test]
    fn test_long_text_produces_overlapping_chunks() {
        let word = "alpha ";
        let text = word.repeat(500); // 3000 chars
        let cfg = config();
        let chunks = chunk_text(&text, &cfg);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= cfg.chunk_size);
            assert!(chunk.chars().count() >= cfg.min_chunk_len);
            // word-boundary snapping keeps words intact
            for w in chunk.split_whitespace() {
                assert_eq!(w, "alpha");
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text = "word ".repeat(400);
        let cfg = config();
        let chunks = chunk_text(&text, &cfg);
        assert!(chunks.len() >= 2);
        // the tail of chunk N reappears at the head of chunk N+1
        let tail: String = chunks[0]
            .chars()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn test_unbroken_text_cuts_at_window_edge() {
        let text = "x".repeat(2000);
        let cfg = config();
        let chunks = chunk_text(&text, &cfg);
        assert_eq!(chunks[0].chars().count(), cfg.chunk_size);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "naïve café résumé ".repeat(100);
        let chunks = chunk_text(&text, &config());
        assert!(!chunks.is_empty());
    }
}
