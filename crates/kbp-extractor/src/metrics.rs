//! Labeling statistics
//!
//! Counts accumulated per entity and summed across workers: how many
//! sentences produced instances, how labels are distributed, and how many
//! known facts were found in text at least once.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Label, LabeledInstance};

/// Statistics for a labeling run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelStats {
    /// Entities processed
    pub entities: usize,
    /// Entities with at least one positive instance
    pub useful_entities: usize,
    /// Sentences examined
    pub sentences: usize,
    /// Sentences that produced at least one instance
    pub sentences_with_instances: usize,
    /// Instances emitted
    pub instances: usize,
    pub positives: usize,
    pub negatives: usize,
    /// Query-mode instances
    pub unlabeled: usize,
    /// Known facts offered to the labeler
    pub facts: usize,
    /// Instance count per slot name
    pub per_label: BTreeMap<String, usize>,
    /// Distinct "entity value" pairs labeled positive, per slot name
    pub matched_facts: BTreeMap<String, BTreeSet<String>>,
}

impl LabelStats {
    /// Record the instances of one sentence
    pub fn add_sentence(&mut self, instances: &[LabeledInstance]) {
        self.sentences += 1;
        if instances.is_empty() {
            return;
        }
        self.sentences_with_instances += 1;

        for instance in instances {
            self.instances += 1;
            match &instance.label {
                Label::Slots(names) => {
                    self.positives += 1;
                    for name in names {
                        *self.per_label.entry(name.clone()).or_default() += 1;
                        self.matched_facts
                            .entry(name.clone())
                            .or_default()
                            .insert(format!("{} {}", instance.entity_id, instance.slot_value));
                    }
                }
                Label::Unrelated => self.negatives += 1,
                Label::Unlabeled => self.unlabeled += 1,
            }
        }
    }

    /// Close out one entity
    pub fn finish_entity(&mut self, facts: usize, had_positive: bool) {
        self.entities += 1;
        self.facts += facts;
        if had_positive {
            self.useful_entities += 1;
        }
    }

    /// Sum another worker's counts into this one
    pub fn merge(&mut self, other: &LabelStats) {
        self.entities += other.entities;
        self.useful_entities += other.useful_entities;
        self.sentences += other.sentences;
        self.sentences_with_instances += other.sentences_with_instances;
        self.instances += other.instances;
        self.positives += other.positives;
        self.negatives += other.negatives;
        self.unlabeled += other.unlabeled;
        self.facts += other.facts;
        for (label, count) in &other.per_label {
            *self.per_label.entry(label.clone()).or_default() += count;
        }
        for (label, tuples) in &other.matched_facts {
            self.matched_facts
                .entry(label.clone())
                .or_default()
                .extend(tuples.iter().cloned());
        }
    }

    /// Distinct positive tuples across all slots
    pub fn matched_fact_count(&self) -> usize {
        self.matched_facts.values().map(BTreeSet::len).sum()
    }

    /// Share of known facts found in text at least once
    pub fn fact_coverage(&self) -> f32 {
        if self.facts == 0 {
            0.0
        } else {
            self.matched_fact_count() as f32 / self.facts as f32
        }
    }

    /// Print a summary report
    pub fn report(&self) -> String {
        let mut out = format!(
            "=== Instance Labeling Report ===\n\n\
             Entities: {} ({} with positives)\n\
             Sentences: {} ({} with instances)\n\n\
             Instances: {}\n\
               Positive:  {}\n\
               Unrelated: {}\n\
               Unlabeled: {}\n\n\
             Fact coverage: {:.1}% ({} of {})\n",
            self.entities,
            self.useful_entities,
            self.sentences,
            self.sentences_with_instances,
            self.instances,
            self.positives,
            self.negatives,
            self.unlabeled,
            self.fact_coverage() * 100.0,
            self.matched_fact_count(),
            self.facts,
        );

        if !self.per_label.is_empty() {
            out.push_str("\nPer slot:\n");
            for (label, count) in &self.per_label {
                let distinct = self.matched_facts.get(label).map_or(0, BTreeSet::len);
                out.push_str(&format!("  {:<40} {:>6} instances {:>5} facts\n", label, count, distinct));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityMention, SlotCandidate};
    use kbp_core::{EntityType, Span};

    fn instance(entity: &str, label: Label, value: &str) -> LabeledInstance {
        LabeledInstance {
            entity_id: entity.to_string(),
            entity_type: EntityType::Person,
            mention: EntityMention {
                span: Span::new(0, 1),
                entity_id: entity.to_string(),
                label: "ENT:PERSON".to_string(),
                text: String::new(),
                via_coref: false,
            },
            candidate: SlotCandidate {
                span: Span::new(3, 4),
                ne: "CITY".to_string(),
                text: value.to_string(),
            },
            sentence_index: 0,
            label,
            slot_value: value.to_string(),
            temporal: None,
        }
    }

    fn slots(names: &[&str]) -> Label {
        Label::Slots(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_add_sentence_counts() {
        let mut stats = LabelStats::default();
        stats.add_sentence(&[
            instance("E1", slots(&["per:city_of_birth", "per:cities_of_residence"]), "Boston"),
            instance("E1", slots(&["per:city_of_birth"]), "Boston"),
            instance("E1", Label::Unrelated, "Paris"),
        ]);
        stats.add_sentence(&[]);

        assert_eq!(stats.sentences, 2);
        assert_eq!(stats.sentences_with_instances, 1);
        assert_eq!(stats.instances, 3);
        assert_eq!(stats.positives, 2);
        assert_eq!(stats.negatives, 1);
        assert_eq!(stats.per_label["per:city_of_birth"], 2);
        assert_eq!(stats.matched_fact_count(), 2);
    }

    #[test]
    fn test_merge_and_coverage() {
        let mut a = LabelStats::default();
        a.add_sentence(&[instance("E1", slots(&["per:city_of_birth"]), "Boston")]);
        a.finish_entity(2, true);

        let mut b = LabelStats::default();
        b.add_sentence(&[instance("E1", slots(&["per:city_of_birth"]), "Boston")]);
        b.add_sentence(&[instance("E2", Label::Unlabeled, "Rome")]);
        b.finish_entity(2, false);

        a.merge(&b);
        assert_eq!(a.entities, 2);
        assert_eq!(a.useful_entities, 1);
        assert_eq!(a.instances, 3);
        assert_eq!(a.unlabeled, 1);
        assert_eq!(a.matched_fact_count(), 1);
        assert!((a.fact_coverage() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_report_lists_slots() {
        let mut stats = LabelStats::default();
        stats.add_sentence(&[instance("E1", slots(&["per:title"]), "mayor")]);
        stats.finish_entity(1, true);
        let report = stats.report();
        assert!(report.contains("Instance Labeling Report"));
        assert!(report.contains("per:title"));
        assert!(report.contains("100.0%"));
    }

    #[test]
    fn test_empty_coverage() {
        assert_eq!(LabelStats::default().fact_coverage(), 0.0);
    }
}
