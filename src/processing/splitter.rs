//! Recursive character splitting with a bounded overlap pass.
//!
//! Text is split on the highest-priority separator first. Parts are greedily packed into
//! chunks of at most `chunk_size` characters; a part that is too long on its own is split
//! again with the remaining separators, and once none remain it is cut into fixed-size
//! slices. Lengths are counted in `char`s, never bytes, so multi-byte text is never cut
//! inside a code point.
//!
//! After trimming, each chunk after the first may be prefixed with the last
//! `chunk_overlap` characters of its predecessor. The prefix is only added when the result
//! stays within `chunk_size + chunk_overlap`; otherwise the chunk is left untouched.

use super::types::ChunkingError;

/// Default soft maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of trailing characters carried into the next chunk.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default separators, highest priority first. The empty string means "cut anywhere".
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Size, overlap, and separator policy for [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterOptions {
    /// Soft maximum length of a chunk before overlap is added.
    pub chunk_size: usize,
    /// Trailing characters of the previous chunk prepended to the next one.
    pub chunk_overlap: usize,
    /// Candidate split tokens, highest priority first.
    pub separators: Vec<String>,
}

impl Default for SplitterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SplitterOptions {
    /// Default separators with a custom size and overlap.
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    /// Reject policies that cannot produce bounded chunks.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

/// Split `text` into ordered, trimmed, non-empty chunks.
///
/// Returns an empty vector for empty or whitespace-only input. The output is a pure
/// function of `text` and `options`.
pub fn split(text: &str, options: &SplitterOptions) -> Result<Vec<String>, ChunkingError> {
    options.validate()?;

    let chunks: Vec<String> = split_recursive(text, &options.separators, options.chunk_size)
        .into_iter()
        .filter_map(|chunk| {
            let trimmed = chunk.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();

    if options.chunk_overlap == 0 || chunks.len() <= 1 {
        return Ok(chunks);
    }

    Ok(apply_overlap(
        &chunks,
        options.chunk_size,
        options.chunk_overlap,
    ))
}

fn split_recursive(text: &str, separators: &[String], chunk_size: usize) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((separator, remaining)) = separators.split_first() else {
        return hard_cut(text, chunk_size);
    };
    if separator.is_empty() {
        return hard_cut(text, chunk_size);
    }

    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for part in text.split(separator.as_str()) {
        let part_len = char_len(part);
        let candidate_len = if current.is_empty() {
            part_len
        } else {
            current_len + separator_len + part_len
        };

        if candidate_len <= chunk_size {
            if !current.is_empty() {
                current.push_str(separator);
            }
            current.push_str(part);
            current_len = candidate_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current_len = 0;

        if part_len > chunk_size {
            if remaining.is_empty() {
                chunks.extend(hard_cut(part, chunk_size));
            } else {
                chunks.extend(split_recursive(part, remaining, chunk_size));
            }
        } else {
            current.push_str(part);
            current_len = part_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn hard_cut(text: &str, chunk_size: usize) -> Vec<String> {
    let mut slices = Vec::new();
    let mut slice = String::new();
    let mut slice_len = 0;
    for ch in text.chars() {
        slice.push(ch);
        slice_len += 1;
        if slice_len == chunk_size {
            slices.push(std::mem::take(&mut slice));
            slice_len = 0;
        }
    }
    if !slice.is_empty() {
        slices.push(slice);
    }
    slices
}

fn apply_overlap(chunks: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let limit = chunk_size + chunk_overlap;
    let mut merged = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.iter().enumerate() {
        let Some(previous) = index.checked_sub(1).map(|prev| &chunks[prev]) else {
            merged.push(chunk.clone());
            continue;
        };

        let tail = tail_chars(previous, chunk_overlap);
        let combined_len = char_len(tail) + 1 + char_len(chunk);
        if combined_len <= limit {
            merged.push(format!("{tail} {chunk}"));
        } else {
            merged.push(chunk.clone());
        }
    }

    merged
}

fn tail_chars(text: &str, count: usize) -> &str {
    let skip = char_len(text).saturating_sub(count);
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => "",
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(chunk_size: usize, chunk_overlap: usize) -> SplitterOptions {
        SplitterOptions::with_sizes(chunk_size, chunk_overlap)
    }

    #[test]
    fn short_text_is_single_trimmed_chunk() {
        let chunks = split("  Short text \n", &opts(100, 0)).unwrap();
        assert_eq!(chunks, vec!["Short text"]);
    }

    #[test]
    fn defaults_keep_small_input_whole() {
        let chunks = split("Hello world.", &SplitterOptions::default()).unwrap();
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn empty_and_whitespace_inputs_yield_nothing() {
        assert!(split("", &SplitterOptions::default()).unwrap().is_empty());
        assert!(
            split("   \n\n  ", &SplitterOptions::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn long_token_is_hard_cut_into_exact_slices() {
        let word = "A".repeat(3000);
        let chunks = split(&word, &opts(1000, 0)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() == 1000));
    }

    #[test]
    fn uneven_token_leaves_short_final_slice() {
        let word = "A".repeat(2500);
        let chunks = split(&word, &opts(1000, 0)).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lengths, vec![1000, 1000, 500]);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split(text, &opts(30, 0)).unwrap();
        assert_eq!(
            chunks,
            vec!["First paragraph.", "Second paragraph.", "Third paragraph."]
        );
    }

    #[test]
    fn packs_small_parts_up_to_chunk_size() {
        let text = "aa bb cc dd ee";
        let chunks = split(text, &opts(5, 0)).unwrap();
        assert_eq!(chunks, vec!["aa bb", "cc dd", "ee"]);
    }

    #[test]
    fn overlap_prefixes_tail_of_previous_chunk() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split(text, &opts(30, 10)).unwrap();
        assert_eq!(
            chunks,
            vec![
                "First paragraph.",
                "paragraph. Second paragraph.",
                "paragraph. Third paragraph.",
            ]
        );
    }

    #[test]
    fn overlap_is_added_exactly_at_the_length_limit() {
        // 5 (tail) + 1 (space) + 9 == 10 + 5
        let chunks = split("aaaaaaaaaa bbbbbbbbb", &opts(10, 5)).unwrap();
        assert_eq!(chunks, vec!["aaaaaaaaaa", "aaaaa bbbbbbbbb"]);
    }

    #[test]
    fn overlap_is_skipped_past_the_length_limit() {
        // 5 + 1 + 10 exceeds 10 + 5, so the second chunk stays as split
        let chunks = split("aaaaaaaaaa bbbbbbbbbb", &opts(10, 5)).unwrap();
        assert_eq!(chunks, vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
    }

    #[test]
    fn overlap_uses_untouched_previous_chunk() {
        // the third chunk borrows from "b", not from the merged "aa b"
        let chunks = split("aaaa b ccc", &opts(4, 2)).unwrap();
        assert_eq!(chunks, vec!["aaaa", "aa b", "b ccc"]);
    }

    #[test]
    fn chunks_respect_size_plus_overlap() {
        let text = (0..200)
            .map(|i| format!("Sentence number {i} talks about topic {}.", i % 7))
            .collect::<Vec<_>>()
            .join(" ");
        let options = opts(120, 30);
        for chunk in split(&text, &options).unwrap() {
            assert!(chunk.chars().count() <= 150, "chunk too long: {chunk}");
        }
    }

    #[test]
    fn zero_overlap_reconstructs_words() {
        let text = (0..80)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .chunks(8)
            .map(|group| group.join(" "))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split(&text, &opts(40, 0)).unwrap();
        let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn zero_overlap_does_not_duplicate_text() {
        let text = "Word1 Word2 Word3 Word4 Word5";
        let chunks = split(text, &opts(12, 0)).unwrap();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total <= text.len() + 10);
    }

    #[test]
    fn custom_separators_are_honoured() {
        let text = "Section1|Section2|Section3";
        assert_eq!(split(text, &opts(100, 0)).unwrap().len(), 1);

        let options = SplitterOptions {
            chunk_size: 15,
            chunk_overlap: 0,
            separators: vec!["|".into(), "".into()],
        };
        assert_eq!(
            split(text, &options).unwrap(),
            vec!["Section1", "Section2", "Section3"]
        );
    }

    #[test]
    fn exhausted_separators_fall_back_to_hard_cut() {
        let options = SplitterOptions {
            chunk_size: 4,
            chunk_overlap: 0,
            separators: vec![" ".into()],
        };
        assert_eq!(
            split("abcdefghij kl", &options).unwrap(),
            vec!["abcd", "efgh", "ij", "kl"]
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = split(&text, &opts(4, 0)).unwrap();
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
    }

    #[test]
    fn filters_whitespace_only_fragments() {
        let text = "  \n\n  \nActual content here\n\n  ";
        let chunks = split(text, &opts(10, 0)).unwrap();
        assert!(chunks.iter().all(|chunk| !chunk.trim().is_empty()));
        assert_eq!(chunks.join(" "), "Actual content here");
    }

    #[test]
    fn output_is_deterministic() {
        let text = "One. Two. Three.\nFour five six seven.\n\nEight nine ten.";
        let options = opts(12, 4);
        assert_eq!(
            split(text, &options).unwrap(),
            split(text, &options).unwrap()
        );
    }

    #[test]
    fn rejects_degenerate_policies() {
        assert!(matches!(
            split("text", &opts(0, 0)),
            Err(ChunkingError::InvalidChunkSize)
        ));
        assert!(matches!(
            split("text", &opts(10, 10)),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
    }
}
