//! Adaptive `content_chunk` sizing (`spec.md` §4.6 step 2): 200 chars for
//! payloads under 2000, 500 for 2000-5000, 1000 otherwise.

/// Splits `content` into a sequence of chunks sized per the adaptive
/// table. Splits on char boundaries (not byte offsets) so multi-byte
/// UTF-8 content is never sliced mid-codepoint.
pub fn chunk_content(content: &str) -> Vec<String> {
    let len = content.chars().count();
    let chunk_size = if len < 2000 {
        200
    } else if len <= 5000 {
        500
    } else {
        1000
    };

    if content.is_empty() {
        return Vec::new();
    }

    content
        .chars()
        .collect::<Vec<char>>()
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(chunk_content("").is_empty());
    }

    #[test]
    fn short_content_uses_200_char_chunks() {
        let content = "a".repeat(450);
        let chunks = chunk_content(&content);
        assert_eq!(chunks.len(), 3); // 200 + 200 + 50
        assert_eq!(chunks[0].len(), 200);
        assert_eq!(chunks.last().unwrap().len(), 50);
    }

    #[test]
    fn mid_range_content_uses_500_char_chunks() {
        let content = "b".repeat(3000);
        let chunks = chunk_content(&content);
        assert_eq!(chunks.len(), 6);
        assert!(chunks.iter().all(|c| c.len() == 500));
    }

    #[test]
    fn long_content_uses_1000_char_chunks() {
        let content = "c".repeat(10_500);
        let chunks = chunk_content(&content);
        assert_eq!(chunks.len(), 11);
        assert_eq!(chunks.last().unwrap().len(), 500);
    }

    #[test]
    fn reassembled_chunks_equal_original() {
        let content = "hello world, this is a test of chunk reassembly ".repeat(10);
        let chunks = chunk_content(&content);
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn never_splits_a_multi_byte_codepoint() {
        let content = "é".repeat(300); // 2 bytes each, forces a split inside the 200-char window
        let chunks = chunk_content(&content);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
        assert_eq!(chunks.concat(), content);
    }
}
