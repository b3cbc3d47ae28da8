//! KBP Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the distant-supervision
//! labeling engine:
//! - Annotated text (tokens, spans, sentences, dependency graphs, temporals)
//! - Coreference links and corpora
//! - Knowledge-base entities and fact tuples
//! - Slot schema
//! - Common error types
//! - Collaborator traits (sentence retrieval, knowledge base)
//! - Configuration management

pub mod config;
pub mod schema;
pub mod store;

pub use config::{
    AppConfig, BatchConfig, ConfigError, LoggingConfig, MatchingConfig, RetrievalConfig,
    SlotMatchPolicy, SortMode, TemporalConfig,
};
pub use schema::{Nationalities, SlotInfo, SlotKind, SlotSchema};
pub use store::{CachedSentenceSource, InMemorySentenceSource, JsonKnowledgeBase};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for KBP operations
#[derive(Error, Debug)]
pub enum KbpError {
    #[error("Coreference cluster {cluster} contains no tagged token")]
    UntaggedCluster { cluster: usize },

    #[error("Found an entity without an id: {0}")]
    MissingEntityId(String),

    #[error("Cannot find slot information for {0}")]
    UnknownSlot(String),

    #[error("Coreference location out of range: sentence {sentence}, token {token}")]
    InvalidLocation { sentence: usize, token: usize },

    #[error("Invalid schema line: '{0}'")]
    InvalidSchema(String),

    #[error("Invalid instance line: '{0}'")]
    InvalidInstanceLine(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for KbpError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KbpError>;

/// NE tag carried by tokens outside any named entity
pub const NER_BLANK: &str = "O";

// ============================================================================
// Annotated Text
// ============================================================================

/// Half-open `[start, end)` range of token indices within one sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start after end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True if both spans share at least one token index
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely inside this span
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn contains_index(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A single annotated token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Surface text
    pub word: String,

    /// Character offset of the first character
    #[serde(default)]
    pub begin: usize,

    /// Character offset one past the last character
    #[serde(default)]
    pub end: usize,

    /// Part-of-speech tag
    #[serde(default)]
    pub pos: String,

    /// Named-entity tag ("O" when outside any entity)
    #[serde(default = "blank_ner")]
    pub ner: String,
}

fn blank_ner() -> String {
    NER_BLANK.to_string()
}

impl Token {
    pub fn new(word: impl Into<String>, pos: impl Into<String>, ner: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            begin: 0,
            end: 0,
            pos: pos.into(),
            ner: ner.into(),
        }
    }

    /// Set character offsets
    pub fn with_offsets(mut self, begin: usize, end: usize) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    /// True if the token carries a named-entity tag
    pub fn has_ner(&self) -> bool {
        !self.ner.is_empty() && self.ner != NER_BLANK
    }
}

/// A typed governor -> dependent edge; indices are 0-based token positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub governor: usize,
    pub dependent: usize,
    #[serde(default)]
    pub relation: String,
}

impl DependencyEdge {
    pub fn new(governor: usize, dependent: usize, relation: impl Into<String>) -> Self {
        Self {
            governor,
            dependent,
            relation: relation.into(),
        }
    }
}

/// Dependency graph of a sentence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(edges: Vec<DependencyEdge>) -> Self {
        Self { edges }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// The four normalized date sub-fields of a temporally scoped fact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFields {
    pub t1: Option<String>,
    pub t2: Option<String>,
    pub t3: Option<String>,
    pub t4: Option<String>,
}

impl TemporalFields {
    pub fn is_empty(&self) -> bool {
        self.t1.is_none() && self.t2.is_none() && self.t3.is_none() && self.t4.is_none()
    }
}

impl std::fmt::Display for TemporalFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "NIL".to_string());
        write!(
            f,
            "{{{}, {}, {}, {}}}",
            show(&self.t1),
            show(&self.t2),
            show(&self.t3),
            show(&self.t4)
        )
    }
}

/// A normalized temporal expression found in a sentence
///
/// An expression may cover several token spans when the annotator merged
/// nearby expressions describing the same event ("from Mar 2003 to May 2007").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalExpression {
    pub spans: Vec<Span>,
    #[serde(flatten)]
    pub fields: TemporalFields,
}

impl TemporalExpression {
    pub fn new(span: Span, fields: TemporalFields) -> Self {
        Self {
            spans: vec![span],
            fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Leftmost token position covered by the expression
    pub fn leftmost(&self) -> usize {
        self.spans.iter().map(|s| s.start).min().unwrap_or(usize::MAX)
    }

    /// Rightmost (exclusive) token position covered by the expression
    pub fn rightmost(&self) -> usize {
        self.spans.iter().map(|s| s.end).max().unwrap_or(0)
    }
}

/// An annotated sentence as delivered by the annotation collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<Token>,

    /// Collapsed dependency graph (absent when the sentence was not parsed)
    #[serde(default)]
    pub dependencies: Option<DependencyGraph>,

    /// Normalized temporal expressions
    #[serde(default)]
    pub temporals: Vec<TemporalExpression>,

    /// Source document id
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl Sentence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            ..Default::default()
        }
    }

    /// Build a sentence from parallel word / POS / NE slices
    pub fn from_tagged(words: &[&str], pos: &[&str], ner: &[&str]) -> Self {
        let mut offset = 0;
        let tokens = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let begin = offset;
                offset += w.len() + 1;
                Token::new(
                    *w,
                    pos.get(i).copied().unwrap_or(""),
                    ner.get(i).copied().unwrap_or(NER_BLANK),
                )
                .with_offsets(begin, begin + w.len())
            })
            .collect();
        Self::new(tokens)
    }

    pub fn with_dependencies(mut self, graph: DependencyGraph) -> Self {
        self.dependencies = Some(graph);
        self
    }

    pub fn with_temporals(mut self, temporals: Vec<TemporalExpression>) -> Self {
        self.temporals = temporals;
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Words of the given span joined by single spaces
    pub fn span_text(&self, span: Span) -> String {
        let end = span.end.min(self.tokens.len());
        let start = span.start.min(end);
        self.tokens[start..end]
            .iter()
            .map(|t| t.word.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All words joined by single spaces
    pub fn text(&self) -> String {
        self.span_text(Span::new(0, self.tokens.len()))
    }
}

// ============================================================================
// Coreference
// ============================================================================

/// A (sentence, token) position in a corpus, 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub sentence: usize,
    pub token: usize,
}

impl Location {
    pub fn new(sentence: usize, token: usize) -> Self {
        Self { sentence, token }
    }

    /// Convert from the annotator's 1-based convention
    pub fn from_one_based(sentence: usize, token: usize) -> Result<Self> {
        if sentence == 0 || token == 0 {
            return Err(KbpError::InvalidLocation { sentence, token });
        }
        Ok(Self::new(sentence - 1, token - 1))
    }
}

/// Two locations asserted to be coreferent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorefLink {
    pub first: Location,
    pub second: Location,
}

impl CorefLink {
    pub fn new(first: Location, second: Location) -> Self {
        Self { first, second }
    }

    /// Build from 1-based `(sentence, token)` pairs
    pub fn from_one_based(first: (usize, usize), second: (usize, usize)) -> Result<Self> {
        Ok(Self::new(
            Location::from_one_based(first.0, first.1)?,
            Location::from_one_based(second.0, second.1)?,
        ))
    }
}

/// The sentences retrieved for one entity plus their coreference links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub coref_links: Vec<CorefLink>,
}

impl Corpus {
    pub fn new(sentences: Vec<Sentence>, coref_links: Vec<CorefLink>) -> Self {
        Self {
            sentences,
            coref_links,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Check that every link points at an existing token
    pub fn validate_links(&self) -> Result<()> {
        for link in &self.coref_links {
            for loc in [link.first, link.second] {
                let in_range = self
                    .sentences
                    .get(loc.sentence)
                    .map(|s| loc.token < s.len())
                    .unwrap_or(false);
                if !in_range {
                    return Err(KbpError::InvalidLocation {
                        sentence: loc.sentence,
                        token: loc.token,
                    });
                }
            }
        }
        Ok(())
    }

    /// Append another corpus, shifting its link sentence indices
    pub fn extend(&mut self, other: Corpus) {
        let offset = self.sentences.len();
        self.sentences.extend(other.sentences);
        self.coref_links
            .extend(other.coref_links.into_iter().map(|l| CorefLink {
                first: Location::new(l.first.sentence + offset, l.first.token),
                second: Location::new(l.second.sentence + offset, l.second.token),
            }));
    }

    /// Keep the first `limit` sentences and the links that still resolve
    pub fn truncate(&mut self, limit: usize) {
        if self.sentences.len() <= limit {
            return;
        }
        self.sentences.truncate(limit);
        self.coref_links
            .retain(|l| l.first.sentence < limit && l.second.sentence < limit);
    }
}

// ============================================================================
// Knowledge Base Models
// ============================================================================

/// Entity types handled by the slot-filling task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "PER", alias = "PERSON")]
    Person,
    #[serde(rename = "ORG", alias = "ORGANIZATION")]
    Organization,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PER",
            Self::Organization => "ORG",
        }
    }

    /// Parse the KB representation ("PER"/"ORG", long forms accepted)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PER" | "PERSON" => Some(Self::Person),
            "ORG" | "ORGANIZATION" => Some(Self::Organization),
            _ => None,
        }
    }

    /// Type label attached to entity mentions
    pub fn mention_label(&self) -> &'static str {
        match self {
            Self::Person => "ENT:PERSON",
            Self::Organization => "ENT:ORGANIZATION",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A query entity from the knowledge base
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KbpEntity {
    /// KB identifier (required; a missing id is a reader contract violation)
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Evaluation query id, if the entity came from a query file
    #[serde(default)]
    pub query_id: Option<String>,
}

impl KbpEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            entity_type,
            query_id: None,
        }
    }

    /// The entity id, or `MissingEntityId` when absent or blank
    pub fn require_id(&self) -> Result<&str> {
        match self.id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(KbpError::MissingEntityId(self.to_string())),
        }
    }
}

impl std::fmt::Display for KbpEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.name, self.entity_type)?;
        if let Some(id) = &self.id {
            write!(f, " id={id}")?;
        }
        if let Some(q) = &self.query_id {
            write!(f, " query={q}")?;
        }
        Ok(())
    }
}

/// A known (entity, slot, value) fact used as distant supervision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTuple {
    pub entity_id: String,
    pub entity_name: String,
    pub entity_type: EntityType,

    /// Relation name, e.g. "per:city_of_birth"
    pub slot_name: String,

    /// Filler value, e.g. "Honolulu"
    pub slot_value: String,

    /// Extra surface forms supplied by the KB
    #[serde(default)]
    pub alternates: Vec<String>,
}

impl FactTuple {
    pub fn new(entity: &KbpEntity, slot_name: impl Into<String>, slot_value: impl Into<String>) -> Self {
        Self {
            entity_id: entity.id.clone().unwrap_or_default(),
            entity_name: entity.name.clone(),
            entity_type: entity.entity_type,
            slot_name: slot_name.into(),
            slot_value: slot_value.into(),
            alternates: Vec::new(),
        }
    }

    pub fn with_alternate(mut self, alternate: impl Into<String>) -> Self {
        self.alternates.push(alternate.into());
        self
    }
}

impl std::fmt::Display for FactTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}: {}", self.entity_name, self.slot_name, self.slot_value)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Retrieval collaborator: supplies annotated sentences for an entity
pub trait SentenceSource: Send + Sync {
    /// Find up to `limit` sentences about `entity`, optionally guided by keywords
    fn find_sentences(&self, entity: &KbpEntity, keywords: &[String], limit: usize)
        -> Result<Corpus>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Knowledge-base collaborator: supplies entities and their facts
pub trait KnowledgeBase: Send + Sync {
    /// All entities known to the KB
    fn entities(&self) -> Vec<KbpEntity>;

    /// Facts known for one entity
    fn facts(&self, entity: &KbpEntity) -> Vec<FactTuple>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap_and_containment() {
        let a = Span::new(2, 5);
        assert!(a.overlaps(&Span::new(4, 6)));
        assert!(a.overlaps(&Span::new(0, 3)));
        assert!(!a.overlaps(&Span::new(5, 7)));
        assert!(!a.overlaps(&Span::new(0, 2)));
        assert!(a.contains(&Span::new(3, 5)));
        assert!(a.contains(&a));
        assert!(!Span::new(3, 5).contains(&a));
    }

    #[test]
    fn test_location_from_one_based() {
        assert_eq!(Location::from_one_based(1, 3).unwrap(), Location::new(0, 2));
        assert!(matches!(
            Location::from_one_based(0, 3),
            Err(KbpError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_corpus_extend_shifts_links() {
        let s = Sentence::from_tagged(&["He", "ran"], &["PRP", "VBD"], &["O", "O"]);
        let link = CorefLink::new(Location::new(0, 0), Location::new(0, 1));
        let mut a = Corpus::new(vec![s.clone()], vec![link]);
        a.extend(Corpus::new(vec![s], vec![link]));

        assert_eq!(a.sentences.len(), 2);
        assert_eq!(a.coref_links[1].first, Location::new(1, 0));
        assert!(a.validate_links().is_ok());
    }

    #[test]
    fn test_corpus_truncate_drops_dangling_links() {
        let s = Sentence::from_tagged(&["He"], &["PRP"], &["O"]);
        let link = CorefLink::new(Location::new(0, 0), Location::new(2, 0));
        let mut corpus = Corpus::new(vec![s.clone(), s.clone(), s], vec![link]);
        corpus.truncate(2);
        assert_eq!(corpus.sentences.len(), 2);
        assert!(corpus.coref_links.is_empty());
    }

    #[test]
    fn test_validate_links_out_of_range() {
        let s = Sentence::from_tagged(&["He"], &["PRP"], &["O"]);
        let link = CorefLink::new(Location::new(0, 0), Location::new(0, 4));
        let corpus = Corpus::new(vec![s], vec![link]);
        assert!(matches!(
            corpus.validate_links(),
            Err(KbpError::InvalidLocation { sentence: 0, token: 4 })
        ));
    }

    #[test]
    fn test_entity_requires_id() {
        let mut entity = KbpEntity::new("E1", "Barack Obama", EntityType::Person);
        assert_eq!(entity.require_id().unwrap(), "E1");
        entity.id = Some("  ".to_string());
        assert!(matches!(
            entity.require_id(),
            Err(KbpError::MissingEntityId(_))
        ));
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("per"), Some(EntityType::Person));
        assert_eq!(EntityType::parse("ORGANIZATION"), Some(EntityType::Organization));
        assert_eq!(EntityType::parse("GPE"), None);
        assert_eq!(EntityType::Person.to_string(), "PER");
    }

    #[test]
    fn test_sentence_span_text() {
        let s = Sentence::from_tagged(
            &["Obama", "was", "born", "in", "Hawaii"],
            &["NNP", "VBD", "VBN", "IN", "NNP"],
            &["PERSON", "O", "O", "O", "LOCATION"],
        );
        assert_eq!(s.span_text(Span::new(2, 5)), "born in Hawaii");
        assert_eq!(s.tokens[4].begin, 18);
        assert!(s.tokens[0].has_ner());
        assert!(!s.tokens[1].has_ner());
    }

    #[test]
    fn test_temporal_fields_display() {
        let fields = TemporalFields {
            t1: Some("1975".to_string()),
            ..Default::default()
        };
        assert_eq!(fields.to_string(), "{1975, NIL, NIL, NIL}");
        assert!(!fields.is_empty());
        assert!(TemporalFields::default().is_empty());
    }
}
