//! Entity Mention Matcher
//!
//! Finds the spans of a sentence that denote the query entity: exact
//! occurrences of a name variant, plus single pronouns or nouns whose
//! coreference antecedent is that variant.

use kbp_core::{EntityType, Sentence, Span, Token};

use crate::coref::AntecedentTable;
use crate::span::{tokenize, SpanIndex};
use crate::EntityMention;

/// Matches one entity's name variants against sentences
#[derive(Debug, Clone)]
pub struct MentionMatcher {
    entity_id: String,
    label: String,
    /// (variant text, variant tokens) in priority order
    variants: Vec<(String, Vec<String>)>,
    case_insensitive: bool,
    use_coref: bool,
}

impl MentionMatcher {
    pub fn new(entity_id: impl Into<String>, entity_type: EntityType, variants: &[String]) -> Self {
        Self {
            entity_id: entity_id.into(),
            label: entity_type.mention_label().to_string(),
            variants: variants
                .iter()
                .map(|v| (v.clone(), tokenize(v)))
                .filter(|(_, tokens)| !tokens.is_empty())
                .collect(),
            case_insensitive: false,
            use_coref: true,
        }
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_coref(mut self, use_coref: bool) -> Self {
        self.use_coref = use_coref;
        self
    }

    fn same_name(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.to_lowercase() == b.to_lowercase()
        } else {
            a == b
        }
    }

    /// Find non-overlapping mentions, ordered by position
    ///
    /// Tokens accepted through coreference are re-tagged `NNP` so downstream
    /// features treat them like names.
    pub fn find(
        &self,
        sentence: &mut Sentence,
        sentence_index: usize,
        antecedents: &AntecedentTable,
    ) -> Vec<EntityMention> {
        let mut index = SpanIndex::new(sentence, self.case_insensitive);
        let mut mentions = Vec::new();

        for (name, tokens) in &self.variants {
            for start in 0..sentence.len() {
                if index.is_claimed(start) {
                    continue;
                }

                let span = Span::new(start, start + tokens.len());
                if index.matches_at(start, tokens) && index.is_free(span) {
                    index.claim(span);
                    mentions.push(self.mention(sentence, span, false));
                    continue;
                }

                if !self.use_coref {
                    continue;
                }
                let Some(antecedent) = antecedents.get(sentence_index, start) else {
                    continue;
                };
                let token = &sentence.tokens[start];
                if self.same_name(antecedent, name) && plausible_coref(token, antecedent) {
                    let span = Span::new(start, start + 1);
                    index.claim(span);
                    tracing::trace!(word = %token.word, antecedent, "Coreferent entity mention");
                    mentions.push(self.mention(sentence, span, true));
                    if !sentence.tokens[start].pos.starts_with("NNP") {
                        sentence.tokens[start].pos = "NNP".to_string();
                    }
                }
            }
        }

        mentions.sort_by_key(|m| m.span);
        mentions
    }

    fn mention(&self, sentence: &Sentence, span: Span, via_coref: bool) -> EntityMention {
        EntityMention {
            span,
            entity_id: self.entity_id.clone(),
            label: self.label.clone(),
            text: sentence.span_text(span),
            via_coref,
        }
    }
}

/// Pronouns always; common nouns only when the antecedent contains the word
fn plausible_coref(token: &Token, antecedent: &str) -> bool {
    if token.pos.starts_with("PRP") {
        return true;
    }
    token.pos.starts_with("NN")
        && antecedent
            .to_lowercase()
            .contains(&token.word.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbp_core::Location;
    use proptest::prelude::*;

    fn variants(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_and_variant_matches() {
        let mut sentence = Sentence::from_tagged(
            &["Barack", "Obama", "met", "Obama", "'s", "aide"],
            &["NNP", "NNP", "VBD", "NNP", "POS", "NN"],
            &["PERSON", "PERSON", "O", "PERSON", "O", "O"],
        );
        let matcher = MentionMatcher::new(
            "E1",
            EntityType::Person,
            &variants(&["Barack Obama", "Obama"]),
        );
        let mentions = matcher.find(&mut sentence, 0, &AntecedentTable::default());

        let spans: Vec<Span> = mentions.iter().map(|m| m.span).collect();
        assert_eq!(spans, vec![Span::new(0, 2), Span::new(3, 4)]);
        assert_eq!(mentions[0].label, "ENT:PERSON");
        assert_eq!(mentions[0].text, "Barack Obama");
    }

    #[test]
    fn test_coref_pronoun_upgraded_to_nnp() {
        let mut sentence = Sentence::from_tagged(
            &["He", "was", "born", "in", "Honolulu"],
            &["PRP", "VBD", "VBN", "IN", "NNP"],
            &["O", "O", "O", "O", "CITY"],
        );
        let mut table = AntecedentTable::default();
        table.insert(Location::new(3, 0), "Barack Obama");

        let matcher = MentionMatcher::new("E1", EntityType::Person, &variants(&["Barack Obama"]));
        let mentions = matcher.find(&mut sentence, 3, &table);

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].span, Span::new(0, 1));
        assert!(mentions[0].via_coref);
        assert_eq!(sentence.tokens[0].pos, "NNP");

        let mut untouched = sentence.clone();
        untouched.tokens[0].pos = "PRP".to_string();
        let off = matcher.clone().with_coref(false);
        assert!(off.find(&mut untouched, 3, &table).is_empty());
        assert_eq!(untouched.tokens[0].pos, "PRP");
    }

    #[test]
    fn test_coref_noun_requires_word_in_antecedent() {
        let mut sentence = Sentence::from_tagged(
            &["The", "company", "and", "the", "firm"],
            &["DT", "NN", "CC", "DT", "NN"],
            &["O", "O", "O", "O", "O"],
        );
        let mut table = AntecedentTable::default();
        table.insert(Location::new(0, 1), "Acme Company");
        table.insert(Location::new(0, 4), "Acme Company");

        let matcher =
            MentionMatcher::new("E2", EntityType::Organization, &variants(&["Acme Company"]));
        let mentions = matcher.find(&mut sentence, 0, &table);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].span, Span::new(1, 2));
        assert_eq!(mentions[0].label, "ENT:ORGANIZATION");
    }

    #[test]
    fn test_case_insensitive_entity_match() {
        let mut sentence = Sentence::from_tagged(&["ACME", "rose"], &["NNP", "VBD"], &["O", "O"]);
        let matcher = MentionMatcher::new("E2", EntityType::Organization, &variants(&["Acme"]));
        assert!(matcher
            .find(&mut sentence.clone(), 0, &AntecedentTable::default())
            .is_empty());
        let matcher = matcher.with_case_insensitive(true);
        assert_eq!(
            matcher
                .find(&mut sentence, 0, &AntecedentTable::default())
                .len(),
            1
        );
    }

    proptest! {
        #[test]
        fn prop_mentions_never_overlap(
            words in proptest::collection::vec(prop_oneof![Just("A"), Just("B"), Just("he")], 0..25),
            linked in proptest::collection::vec(any::<bool>(), 25),
        ) {
            let pos: Vec<&str> = words.iter().map(|w| if *w == "he" { "PRP" } else { "NNP" }).collect();
            let ner: Vec<&str> = words.iter().map(|_| "O").collect();
            let mut sentence = Sentence::from_tagged(&words, &pos, &ner);
            let mut table = AntecedentTable::default();
            for (i, l) in linked.iter().enumerate().take(words.len()) {
                if *l {
                    table.insert(Location::new(0, i), "A B");
                }
            }

            let matcher = MentionMatcher::new("E", EntityType::Person, &variants(&["A B", "A", "B A"]));
            let mentions = matcher.find(&mut sentence, 0, &table);
            for pair in mentions.windows(2) {
                prop_assert!(!pair[0].span.overlaps(&pair[1].span));
            }
        }
    }
}
