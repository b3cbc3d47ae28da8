//! Slot Candidate Extractor
//!
//! Segments a sentence into maximal same-tag NE spans and keeps those that
//! could fill a slot and sit close enough to an entity mention.

use kbp_core::{Sentence, Span, SlotSchema};

use crate::{EntityMention, SlotCandidate};

/// Extracts slot candidates from a sentence
pub struct CandidateExtractor<'a> {
    schema: &'a SlotSchema,
    max_distance: usize,
    match_slot_ne: bool,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(schema: &'a SlotSchema) -> Self {
        Self {
            schema,
            max_distance: 20,
            match_slot_ne: true,
        }
    }

    pub fn with_max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// When disabled, any tagged span is a valid candidate
    pub fn with_ne_gating(mut self, match_slot_ne: bool) -> Self {
        self.match_slot_ne = match_slot_ne;
        self
    }

    pub fn extract(&self, sentence: &Sentence, mentions: &[EntityMention]) -> Vec<SlotCandidate> {
        let tokens = &sentence.tokens;
        let mut candidates = Vec::new();

        let mut start = 0;
        while start < tokens.len() {
            if !tokens[start].has_ner() {
                start += 1;
                continue;
            }

            let ne = &tokens[start].ner;
            let mut end = start + 1;
            while end < tokens.len() && &tokens[end].ner == ne {
                end += 1;
            }

            let span = Span::new(start, end);
            if self.valid_ne(ne) && !overlaps_any(span, mentions) && self.close_enough(span, mentions)
            {
                candidates.push(SlotCandidate {
                    span,
                    ne: ne.clone(),
                    text: sentence.span_text(span),
                });
            }
            start = end;
        }

        candidates
    }

    fn valid_ne(&self, ne: &str) -> bool {
        !self.match_slot_ne || self.schema.is_valid_ne(ne)
    }

    fn close_enough(&self, span: Span, mentions: &[EntityMention]) -> bool {
        mentions.iter().any(|m| {
            let e = m.span;
            (span.end <= e.start && e.start - span.end < self.max_distance)
                || (e.end <= span.start && span.start - e.end < self.max_distance)
        })
    }
}

fn overlaps_any(span: Span, mentions: &[EntityMention]) -> bool {
    mentions.iter().any(|m| m.span.overlaps(&span))
}
