//! Slot Value Matcher / Instance Labeler
//!
//! Aligns known fact values (and their alternates) against slot candidates
//! and turns every (entity mention, slot candidate) pair into a labeled
//! instance.

use std::collections::{BTreeMap, BTreeSet};

use kbp_core::schema::is_date_slot;
use kbp_core::{
    EntityType, FactTuple, MatchingConfig, Result, Sentence, SlotMatchPolicy, SlotSchema, Span,
};

use crate::names::NameVariants;
use crate::span::{tokenize, SpanIndex};
use crate::{EntityMention, Label, LabeledInstance, SlotCandidate};

// ============================================================================
// Prepared Facts
// ============================================================================

/// A fact with its value and alternates tokenized once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFact {
    pub fact: FactTuple,
    pub tokens: Vec<String>,
    /// Alternate forms, longest first
    pub alternates: Vec<Vec<String>>,
}

impl PreparedFact {
    pub fn new(fact: FactTuple, variants: &NameVariants<'_>) -> Self {
        let tokens = tokenize(&fact.slot_value);
        let alternates = variants.slot_alternates(&fact.slot_name, &fact.slot_value, &fact.alternates);
        Self {
            fact,
            tokens,
            alternates,
        }
    }

    /// Prepare all facts, ordered by slot name then value
    pub fn prepare_all(facts: Vec<FactTuple>, variants: &NameVariants<'_>) -> Vec<Self> {
        let mut prepared: Vec<Self> = facts.into_iter().map(|f| Self::new(f, variants)).collect();
        prepared.sort_by(|a, b| {
            (&a.fact.slot_name, &a.fact.slot_value).cmp(&(&b.fact.slot_name, &b.fact.slot_value))
        });
        prepared
    }

    pub fn slot_name(&self) -> &str {
        &self.fact.slot_name
    }
}

/// Where a fact value (or alternate) occurs in a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactMatch {
    pub span: Span,
    /// True for the primary value, false for an alternate
    pub exact: bool,
}

// ============================================================================
// Matcher
// ============================================================================

/// Labels slot candidates against known facts
pub struct SlotValueMatcher<'a> {
    schema: &'a SlotSchema,
    policy: SlotMatchPolicy,
    case_insensitive: bool,
    match_slot_ne: bool,
    enforce_ne_in_training: bool,
    allow_multiple_labels: bool,
}

impl<'a> SlotValueMatcher<'a> {
    pub fn new(schema: &'a SlotSchema, config: &MatchingConfig) -> Self {
        Self {
            schema,
            policy: config.slot_match_policy,
            case_insensitive: config.case_insensitive_slot_match,
            match_slot_ne: config.match_slot_ne,
            enforce_ne_in_training: config.enforce_ne_in_training,
            allow_multiple_labels: config.allow_multiple_labels,
        }
    }

    /// Occurrences of the primary value, then of each alternate at free positions
    pub fn locate(&self, sentence: &Sentence, fact: &PreparedFact) -> Vec<FactMatch> {
        let mut index = SpanIndex::new(sentence, self.case_insensitive);
        let mut matches: Vec<FactMatch> = index
            .claim_all(&fact.tokens)
            .into_iter()
            .map(|span| FactMatch { span, exact: true })
            .collect();
        for alternate in &fact.alternates {
            matches.extend(
                index
                    .claim_all(alternate)
                    .into_iter()
                    .map(|span| FactMatch { span, exact: false }),
            );
        }
        matches
    }

    /// True if the candidate aligns with one of the fact's occurrences
    pub fn span_matches(&self, candidate: &SlotCandidate, slot_name: &str, matches: &[FactMatch]) -> bool {
        let c = candidate.span;
        matches.iter().any(|m| {
            m.span == c
                || m.span.contains(&c)
                || (m.exact && is_date_slot(slot_name) && c.contains(&m.span))
        })
    }

    /// True if the candidate's words equal the fact value
    pub fn text_matches(&self, sentence: &Sentence, candidate: &SlotCandidate, fact: &PreparedFact) -> bool {
        let words = &sentence.tokens[candidate.span.start..candidate.span.end];
        let value: Vec<&str> = fact.fact.slot_value.split_whitespace().collect();
        words.len() == value.len()
            && words.iter().zip(&value).all(|(w, v)| {
                if self.case_insensitive {
                    w.word.to_lowercase() == v.to_lowercase()
                } else {
                    w.word == *v
                }
            })
    }

    /// NE gate; an unknown slot is fatal when gating is on
    fn passes_ne_gate(&self, candidate: &SlotCandidate, slot_name: &str) -> Result<bool> {
        if !self.match_slot_ne {
            return Ok(true);
        }
        let accepted = self.schema.accepts(slot_name, &candidate.ne)?;
        Ok(!self.enforce_ne_in_training || accepted)
    }

    /// Matched fact value -> slot names, for one candidate
    pub fn match_candidate(
        &self,
        sentence: &Sentence,
        candidate: &SlotCandidate,
        facts: &[PreparedFact],
        located: &[Vec<FactMatch>],
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut matched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (fact, occurrences) in facts.iter().zip(located) {
            if !self.passes_ne_gate(candidate, fact.slot_name())? {
                continue;
            }
            let hit = match self.policy {
                SlotMatchPolicy::SpanAlignment => {
                    self.span_matches(candidate, fact.slot_name(), occurrences)
                }
                SlotMatchPolicy::ExactText => self.text_matches(sentence, candidate, fact),
            };
            if hit {
                matched
                    .entry(fact.fact.slot_value.clone())
                    .or_default()
                    .insert(fact.fact.slot_name.clone());
                if !self.allow_multiple_labels {
                    break;
                }
            }
        }

        Ok(matched)
    }

    /// Label every (mention, candidate) pair of a sentence
    #[allow(clippy::too_many_arguments)]
    pub fn label(
        &self,
        sentence: &Sentence,
        sentence_index: usize,
        entity_id: &str,
        entity_type: EntityType,
        mentions: &[EntityMention],
        candidates: &[SlotCandidate],
        facts: &[PreparedFact],
    ) -> Result<Vec<LabeledInstance>> {
        let mut instances = Vec::new();
        if mentions.is_empty() || candidates.is_empty() {
            return Ok(instances);
        }

        let located: Vec<Vec<FactMatch>> = match self.policy {
            SlotMatchPolicy::SpanAlignment => facts.iter().map(|f| self.locate(sentence, f)).collect(),
            SlotMatchPolicy::ExactText => vec![Vec::new(); facts.len()],
        };

        for candidate in candidates {
            let matched = self.match_candidate(sentence, candidate, facts, &located)?;

            let groups: Vec<(String, Label)> = if matched.is_empty() {
                vec![(candidate.text.clone(), Label::Unrelated)]
            } else {
                matched
                    .into_iter()
                    .map(|(value, slots)| (value, Label::Slots(slots)))
                    .collect()
            };

            for (value, label) in groups {
                if let Label::Slots(slots) = &label {
                    tracing::debug!(
                        label = %label,
                        candidate = %candidate.text,
                        slots = slots.len(),
                        sentence = sentence_index,
                        "Positive instance"
                    );
                }
                for mention in mentions {
                    instances.push(LabeledInstance {
                        entity_id: entity_id.to_string(),
                        entity_type,
                        mention: mention.clone(),
                        candidate: candidate.clone(),
                        sentence_index,
                        label: label.clone(),
                        slot_value: value.clone(),
                        temporal: None,
                    });
                }
            }
        }

        Ok(instances)
    }

    /// Query mode: each candidate once, paired with its nearest mention
    pub fn label_unlabeled(
        &self,
        sentence_index: usize,
        entity_id: &str,
        entity_type: EntityType,
        mentions: &[EntityMention],
        candidates: &[SlotCandidate],
    ) -> Vec<LabeledInstance> {
        candidates
            .iter()
            .filter_map(|candidate| {
                let nearest = mentions
                    .iter()
                    .min_by_key(|m| (token_distance(m.span, candidate.span), m.span.start))?;
                Some(LabeledInstance {
                    entity_id: entity_id.to_string(),
                    entity_type,
                    mention: nearest.clone(),
                    candidate: candidate.clone(),
                    sentence_index,
                    label: Label::Unlabeled,
                    slot_value: candidate.text.clone(),
                    temporal: None,
                })
            })
            .collect()
    }
}

/// Token gap between two disjoint spans
fn token_distance(a: Span, b: Span) -> usize {
    if a.end <= b.start {
        b.start - a.end
    } else if b.end <= a.start {
        a.start - b.end
    } else {
        0
    }
}

// ============================================================================
// Tests
// ============================================================================
