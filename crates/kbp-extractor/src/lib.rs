//! KBP Extractor - Distant-supervision instance labeling
//!
//! Finds entity mentions and slot candidates in annotated sentences, aligns
//! known facts against the candidates, and emits labeled training instances
//! for a relation classifier.

use std::collections::BTreeSet;

use kbp_core::{EntityType, Span, TemporalFields};
use serde::{Deserialize, Serialize};

pub mod batch;
pub mod candidate;
pub mod coref;
pub mod labeler;
pub mod mention;
pub mod metrics;
pub mod names;
pub mod ner_fix;
pub mod output;
pub mod pipeline;
pub mod ranking;
pub mod span;
pub mod temporal;

pub use batch::{BatchReport, BatchRunner, EntityFailure};
pub use candidate::CandidateExtractor;
pub use coref::{AntecedentTable, ClusterArena, CorefResolution, CorefResolver};
pub use labeler::{FactMatch, PreparedFact, SlotValueMatcher};
pub use mention::MentionMatcher;
pub use metrics::LabelStats;
pub use names::{NameFinder, NameVariants};
pub use ner_fix::NerCorrector;
pub use output::InstanceLine;
pub use pipeline::{EntityOutput, EntityPipeline};
pub use ranking::SentenceRanker;
pub use span::{OverlapPolicy, SpanIndex};
pub use temporal::{DistanceMatrix, TemporalAligner};

/// Label placeholder written for negative and unlabeled instances
pub const UNRELATED: &str = "unrelated";

/// A span of a sentence that denotes the query entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub span: Span,
    pub entity_id: String,
    /// Type label, e.g. "ENT:PERSON"
    pub label: String,
    pub text: String,
    /// True when the mention was accepted through coreference
    #[serde(default)]
    pub via_coref: bool,
}

/// A maximal same-tag NE span considered as a possible slot filler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub span: Span,
    pub ne: String,
    pub text: String,
}

/// Instance label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// Non-empty set of matched slot names
    Slots(BTreeSet<String>),
    /// Matched no known fact
    Unrelated,
    /// Query mode, left for the classifier
    Unlabeled,
}

impl Label {
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Slots(_))
    }

    /// Serialized form: sorted slot names joined by `|`
    pub fn as_string(&self) -> String {
        match self {
            Self::Slots(names) => names.iter().cloned().collect::<Vec<_>>().join("|"),
            Self::Unrelated | Self::Unlabeled => UNRELATED.to_string(),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// A labeled (entity mention, slot candidate) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledInstance {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub mention: EntityMention,
    pub candidate: SlotCandidate,
    /// Index of the sentence in the retrieved corpus
    pub sentence_index: usize,
    pub label: Label,
    /// Matched fact value for positives, candidate text otherwise
    pub slot_value: String,
    #[serde(default)]
    pub temporal: Option<TemporalFields>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_serialization() {
        let label = Label::Slots(
            ["per:employee_of", "per:city_of_birth"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(label.to_string(), "per:city_of_birth|per:employee_of");
        assert!(label.is_positive());
        assert_eq!(Label::Unrelated.to_string(), "unrelated");
        assert!(!Label::Unlabeled.is_positive());
    }
}
