//! Span Index
//!
//! Locates contiguous occurrences of a short token sequence inside a
//! sentence. The index tracks which positions have already been claimed so
//! that several needles (name variants, fact alternates) can be matched in
//! priority order without producing overlapping spans.

use kbp_core::{Sentence, Span};

/// How `find_all` treats overlapping occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Report every occurrence, including overlapping ones
    All,
    /// Scan left to right and skip past each reported occurrence
    NonOverlapping,
    /// Like `NonOverlapping`, and every position must be unclaimed
    Unclaimed,
}

/// Token sequence with a claimed-position mask
#[derive(Debug, Clone)]
pub struct SpanIndex {
    words: Vec<String>,
    claimed: Vec<bool>,
    case_insensitive: bool,
}

impl SpanIndex {
    pub fn new(sentence: &Sentence, case_insensitive: bool) -> Self {
        Self::from_words(
            sentence.tokens.iter().map(|t| t.word.clone()),
            case_insensitive,
        )
    }

    pub fn from_words<I, S>(words: I, case_insensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let claimed = vec![false; words.len()];
        Self {
            words,
            claimed,
            case_insensitive,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_claimed(&self, index: usize) -> bool {
        self.claimed.get(index).copied().unwrap_or(true)
    }

    /// True if every position of the span is unclaimed
    pub fn is_free(&self, span: Span) -> bool {
        span.end <= self.words.len() && span.indices().all(|i| !self.claimed[i])
    }

    pub fn claim(&mut self, span: Span) {
        let end = span.end.min(self.claimed.len());
        for flag in &mut self.claimed[span.start.min(end)..end] {
            *flag = true;
        }
    }

    fn word_eq(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.to_lowercase() == b.to_lowercase()
        } else {
            a == b
        }
    }

    /// True if `needle` occurs at `start`
    pub fn matches_at(&self, start: usize, needle: &[String]) -> bool {
        if needle.is_empty() || start + needle.len() > self.words.len() {
            return false;
        }
        needle
            .iter()
            .zip(&self.words[start..start + needle.len()])
            .all(|(n, w)| self.word_eq(n, w))
    }

    /// All occurrences of `needle` under the given policy, left to right
    pub fn find_all(&self, needle: &[String], policy: OverlapPolicy) -> Vec<Span> {
        let mut spans = Vec::new();
        if needle.is_empty() {
            return spans;
        }

        let mut start = 0;
        while start + needle.len() <= self.words.len() {
            let span = Span::new(start, start + needle.len());
            let accepted = self.matches_at(start, needle)
                && (policy != OverlapPolicy::Unclaimed || self.is_free(span));
            if accepted {
                spans.push(span);
                start += match policy {
                    OverlapPolicy::All => 1,
                    _ => needle.len(),
                };
            } else {
                start += 1;
            }
        }
        spans
    }

    /// Find unclaimed occurrences of `needle` and claim them
    pub fn claim_all(&mut self, needle: &[String]) -> Vec<Span> {
        let spans = self.find_all(needle, OverlapPolicy::Unclaimed);
        for span in &spans {
            self.claim(*span);
        }
        spans
    }
}

/// Split text into match tokens
///
/// Whitespace separates tokens; commas, semicolons, colons, brackets and
/// quotes are split off as their own tokens, mirroring how the annotator
/// tokenizes sentences. Periods stay attached ("Jr.", "U.S.").
pub fn tokenize(text: &str) -> Vec<String> {
    const LEADING: &[char] = &['(', '[', '"', '\''];
    const TRAILING: &[char] = &[',', ';', ':', '!', '?', ')', ']', '"', '\''];

    let mut tokens = Vec::new();
    for piece in text.split_whitespace() {
        let mut rest = piece;
        while let Some(c) = rest.chars().next().filter(|c| LEADING.contains(c)) {
            if rest.len() == c.len_utf8() {
                break;
            }
            tokens.push(c.to_string());
            rest = &rest[c.len_utf8()..];
        }

        let mut trailing = Vec::new();
        while let Some(c) = rest.chars().last().filter(|c| TRAILING.contains(c)) {
            if rest.len() == c.len_utf8() {
                break;
            }
            trailing.push(c.to_string());
            rest = &rest[..rest.len() - c.len_utf8()];
        }

        tokens.push(rest.to_string());
        tokens.extend(trailing.into_iter().rev());
    }
    tokens
}
