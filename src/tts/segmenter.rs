//! Sentence segmentation for incremental synthesis.

/// Split text into complete sentences and an unterminated remainder.
///
/// A sentence ends after a run of one or more `punctuation` characters, once
/// the next character is known to not continue a word or number. A run
/// followed by an ASCII letter or digit (as in `3.14`) does not end a
/// sentence, and a run at the very end of `text` stays in the remainder until
/// more text arrives. Sentences are trimmed and dropped when blank. The
/// remainder keeps trailing whitespace so that it can be joined with text that
/// arrives later.
///
/// # Arguments
/// * `text` - Text to split
/// * `punctuation` - Characters that end a sentence (may be empty)
///
/// # Returns
/// A tuple of (complete sentences, residual text).
pub fn split_sentences(text: &str, punctuation: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut run_end = None; // End of the pending punctuation run

    for (i, c) in text.char_indices() {
        if punctuation.contains(c) {
            run_end = Some(i + c.len_utf8());
            continue;
        }

        // Check for sentence boundaries
        if let Some(end) = run_end.take()
            && !c.is_ascii_alphanumeric()
        {
            let trimmed = text[start..end].trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            start = end;
        }
    }

    (sentences, text[start..].trim_start().to_string())
}

/// Incremental sentence splitter for streamed text.
///
/// Fragments are appended with [`SentenceSegmenter::push`], which returns every
/// sentence completed so far. [`SentenceSegmenter::flush`] ends the request and
/// yields the unterminated remainder. Any split of the same text into fragments
/// produces the same sentences as pushing it at once.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    punctuation: String, // Sentence-ending characters
    residual: String,    // Text after the last boundary
}

impl SentenceSegmenter {
    /// Create a segmenter for the given punctuation set.
    pub fn new(punctuation: impl Into<String>) -> Self {
        Self { punctuation: punctuation.into(), residual: String::new() }
    }

    /// Append a fragment and return the sentences it completes.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.residual.push_str(fragment);
        let (sentences, residual) = split_sentences(&self.residual, &self.punctuation);
        self.residual = residual;
        sentences
    }

    /// End the current request, returning the remainder as a final sentence.
    pub fn flush(&mut self) -> Option<String> {
        let residual = std::mem::take(&mut self.residual);
        let trimmed = residual.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Text waiting for a sentence boundary.
    pub fn residual(&self) -> &str {
        &self.residual
    }

    /// Split a complete request into sentences, including the remainder.
    pub fn segment_all(&mut self, text: &str) -> Vec<String> {
        let mut sentences = self.push(text);
        sentences.extend(self.flush());
        sentences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUNCTUATION: &str = ".?!";

    #[test]
    fn test_split_sentences() {
        let (sentences, residual) = split_sentences("Hello. World! How are you", PUNCTUATION);
        assert_eq!(sentences, vec!["Hello.", "World!"]);
        assert_eq!(residual, "How are you");
    }

    #[test]
    fn test_flush_emits_residual() {
        let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
        assert_eq!(segmenter.push("Hello. World! How are you"), vec!["Hello.", "World!"]);
        assert_eq!(segmenter.residual(), "How are you");
        assert_eq!(segmenter.flush().as_deref(), Some("How are you"));
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_interior_whitespace_is_preserved() {
        let (sentences, residual) = split_sentences("  Line one,\n  still one.  Two?", PUNCTUATION);
        assert_eq!(sentences, vec!["Line one,\n  still one."]);
        assert_eq!(residual, "Two?");
    }

    #[test]
    fn test_punctuation_run_ends_one_sentence() {
        let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
        assert_eq!(segmenter.segment_all("Wait... what?!"), vec!["Wait...", "what?!"]);
        assert_eq!(segmenter.segment_all("Wait... what?! Really."), vec!["Wait...", "what?!", "Really."]);
    }

    #[test]
    fn test_decimal_point_does_not_split() {
        let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
        assert_eq!(segmenter.segment_all("Pi is 3.14 exactly. Next."), vec!["Pi is 3.14 exactly.", "Next."]);
    }

    #[test]
    fn test_empty_punctuation_never_splits() {
        let mut segmenter = SentenceSegmenter::new("");
        assert!(segmenter.push("One. Two! Three?").is_empty());
        assert_eq!(segmenter.flush().as_deref(), Some("One. Two! Three?"));
    }

    #[test]
    fn test_blank_input_produces_nothing() {
        let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
        assert!(segmenter.segment_all("   \n ").is_empty());
        assert!(segmenter.segment_all("").is_empty());
    }

    #[test]
    fn test_non_ascii_punctuation() {
        let (sentences, residual) = split_sentences("你好。世界！再见", "。！");
        assert_eq!(sentences, vec!["你好。", "世界！"]);
        assert_eq!(residual, "再见");
    }

    #[test]
    fn test_fragments_match_whole_text() {
        let text = "Hello there. How are you today? I am fine! Thanks for asking";
        let expected = SentenceSegmenter::new(PUNCTUATION).segment_all(text);
        assert_eq!(expected.len(), 4);

        // Every two-way and three-way split must produce the same sentences
        let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain([text.len()]).collect();
        for &a in &bounds {
            for &b in bounds.iter().filter(|&&b| b >= a).step_by(5) {
                let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
                let mut sentences = Vec::new();
                for fragment in [&text[..a], &text[a..b], &text[b..]] {
                    sentences.extend(segmenter.push(fragment));
                }
                sentences.extend(segmenter.flush());
                assert_eq!(sentences, expected, "split at {} and {}", a, b);
            }
        }
    }

    #[test]
    fn test_sentence_completes_when_next_character_arrives() {
        let mut segmenter = SentenceSegmenter::new(PUNCTUATION);
        assert!(segmenter.push("Wait").is_empty());
        assert!(segmenter.push("..").is_empty());
        assert_eq!(segmenter.push(". what"), vec!["Wait..."]);
        assert!(segmenter.push("?").is_empty());
        assert!(segmenter.push("!").is_empty());
        assert_eq!(segmenter.residual(), "what?!");
        assert_eq!(segmenter.push(" No way"), vec!["what?!"]);
        assert!(segmenter.push("!").is_empty());
        assert_eq!(segmenter.push(" Okay"), vec!["No way!"]);
        assert_eq!(segmenter.flush().as_deref(), Some("Okay"));
    }
}
