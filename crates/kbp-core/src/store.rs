//! File-backed collaborators
//!
//! JSON stand-ins for the knowledge base and the sentence retrieval cache.
//! They only deserialize; annotation and retrieval happen upstream.

use crate::{
    Corpus, CorefLink, EntityType, FactTuple, KbpEntity, KbpError, KnowledgeBase, Result,
    Sentence, SentenceSource,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Knowledge Base
// ============================================================================

/// KB file layout
#[derive(Debug, Deserialize)]
struct KbFile {
    entities: Vec<KbRecord>,
}

#[derive(Debug, Deserialize)]
struct KbRecord {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    entity_type: EntityType,
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    facts: Vec<FactRecord>,
}

#[derive(Debug, Deserialize)]
struct FactRecord {
    slot: String,
    value: String,
    #[serde(default)]
    alternates: Vec<String>,
}

/// Knowledge base loaded from a JSON document
#[derive(Debug, Clone, Default)]
pub struct JsonKnowledgeBase {
    entities: Vec<KbpEntity>,
    facts: HashMap<String, Vec<FactTuple>>,
}

impl JsonKnowledgeBase {
    pub fn from_json(text: &str) -> Result<Self> {
        let file: KbFile = serde_json::from_str(text)?;
        let mut kb = Self::default();

        for record in file.entities {
            let entity = KbpEntity {
                id: record.id,
                name: record.name,
                entity_type: record.entity_type,
                query_id: record.query_id,
            };
            let facts: Vec<FactTuple> = record
                .facts
                .into_iter()
                .map(|f| FactTuple {
                    alternates: f.alternates,
                    ..FactTuple::new(&entity, f.slot, f.value)
                })
                .collect();
            kb.add(entity, facts);
        }

        tracing::info!(
            entities = kb.entities.len(),
            facts = kb.facts.values().map(Vec::len).sum::<usize>(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Register an entity and its facts
    ///
    /// Entities without an id are kept so the pipeline can reject them.
    pub fn add(&mut self, entity: KbpEntity, facts: Vec<FactTuple>) {
        if let Some(id) = entity.id.clone() {
            self.facts.entry(id).or_default().extend(facts);
        }
        self.entities.push(entity);
    }
}

impl KnowledgeBase for JsonKnowledgeBase {
    fn entities(&self) -> Vec<KbpEntity> {
        self.entities.clone()
    }

    fn facts(&self, entity: &KbpEntity) -> Vec<FactTuple> {
        entity
            .id
            .as_ref()
            .and_then(|id| self.facts.get(id))
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// Sentence Cache
// ============================================================================

/// Cached corpus layout; coreference links are 1-based
/// `[sentence, token, sentence, token]` quadruples
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedCorpus {
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub coref: Vec<[usize; 4]>,
}

impl TryFrom<CachedCorpus> for Corpus {
    type Error = KbpError;

    fn try_from(cached: CachedCorpus) -> Result<Self> {
        let links = cached
            .coref
            .iter()
            .map(|q| CorefLink::from_one_based((q[0], q[1]), (q[2], q[3])))
            .collect::<Result<Vec<_>>>()?;
        let corpus = Corpus::new(cached.sentences, links);
        corpus.validate_links()?;
        Ok(corpus)
    }
}

/// Sentence source reading `<root>/<entity id>.json` from one or more roots
///
/// A blob that fails to deserialize is logged and skipped; a missing blob
/// simply contributes nothing.
#[derive(Debug, Clone)]
pub struct CachedSentenceSource {
    roots: Vec<PathBuf>,
}

impl CachedSentenceSource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn blob_path(root: &Path, id: &str) -> PathBuf {
        let file: String = id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        root.join(format!("{file}.json"))
    }

    fn read_blob(path: &Path) -> Result<Corpus> {
        let text = std::fs::read_to_string(path)?;
        let cached: CachedCorpus = serde_json::from_str(&text)?;
        Corpus::try_from(cached)
    }
}

impl SentenceSource for CachedSentenceSource {
    fn find_sentences(
        &self,
        entity: &KbpEntity,
        _keywords: &[String],
        limit: usize,
    ) -> Result<Corpus> {
        let id = entity.require_id()?;
        let mut merged = Corpus::default();

        for root in &self.roots {
            let path = Self::blob_path(root, id);
            if !path.exists() {
                tracing::debug!(path = %path.display(), "No cached sentences");
                continue;
            }
            match Self::read_blob(&path) {
                Ok(mut corpus) => {
                    corpus.truncate(limit);
                    tracing::debug!(
                        path = %path.display(),
                        sentences = corpus.sentences.len(),
                        "Loaded cached sentences"
                    );
                    merged.extend(corpus);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }

        Ok(merged)
    }

    fn name(&self) -> &str {
        "cache"
    }
}

/// Sentence source backed by a map from entity id to corpus
#[derive(Debug, Clone, Default)]
pub struct InMemorySentenceSource {
    corpora: HashMap<String, Corpus>,
}

impl InMemorySentenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corpus(mut self, entity_id: impl Into<String>, corpus: Corpus) -> Self {
        self.corpora.insert(entity_id.into(), corpus);
        self
    }
}

impl SentenceSource for InMemorySentenceSource {
    fn find_sentences(
        &self,
        entity: &KbpEntity,
        _keywords: &[String],
        limit: usize,
    ) -> Result<Corpus> {
        let id = entity.require_id()?;
        let mut corpus = self.corpora.get(id).cloned().unwrap_or_default();
        corpus.truncate(limit);
        Ok(corpus)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
