//! Coreference Cluster Resolver
//!
//! Merges pairwise coreference links into disjoint clusters, elects one
//! antecedent string per cluster and records it for every member location.
//! Also selects the sentences that are useful for the query entity.

use std::collections::{BTreeSet, HashMap};

use kbp_core::{Corpus, CorefLink, KbpError, Location, Result, Sentence, Span};

use crate::names::NameFinder;

// ============================================================================
// Cluster Arena
// ============================================================================

/// Union-find over locations with dense, compacted cluster ids
#[derive(Debug, Clone, Default)]
pub struct ClusterArena {
    clusters: Vec<Vec<Location>>,
    index: HashMap<Location, usize>,
}

impl ClusterArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_links(links: &[CorefLink]) -> Self {
        let mut arena = Self::new();
        for link in links {
            arena.add_link(link.first, link.second);
        }
        arena
    }

    /// Record that `a` and `b` corefer
    pub fn add_link(&mut self, a: Location, b: Location) {
        match (self.index.get(&a).copied(), self.index.get(&b).copied()) {
            (None, None) => {
                let id = self.clusters.len();
                let mut members = vec![a];
                if a != b {
                    members.push(b);
                }
                for m in &members {
                    self.index.insert(*m, id);
                }
                self.clusters.push(members);
            }
            (Some(id), None) => {
                self.index.insert(b, id);
                self.clusters[id].push(b);
            }
            (None, Some(id)) => {
                self.index.insert(a, id);
                self.clusters[id].push(a);
            }
            (Some(x), Some(y)) if x != y => self.merge(x.min(y), x.max(y)),
            _ => {}
        }
    }

    /// Move cluster `from` into `into` (`into < from`) and compact
    fn merge(&mut self, into: usize, from: usize) {
        let moved = std::mem::take(&mut self.clusters[from]);
        for loc in &moved {
            self.index.insert(*loc, into);
        }
        self.clusters[into].extend(moved);

        self.clusters.swap_remove(from);
        if from < self.clusters.len() {
            for loc in &self.clusters[from] {
                self.index.insert(*loc, from);
            }
        }
    }

    pub fn clusters(&self) -> &[Vec<Location>] {
        &self.clusters
    }

    pub fn cluster_of(&self, loc: &Location) -> Option<usize> {
        self.index.get(loc).copied()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

// ============================================================================
// Antecedent Table
// ============================================================================

/// Antecedent string per linked token location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AntecedentTable {
    entries: HashMap<Location, String>,
}

impl AntecedentTable {
    pub fn get(&self, sentence: usize, token: usize) -> Option<&str> {
        self.entries
            .get(&Location::new(sentence, token))
            .map(String::as_str)
    }

    pub fn insert(&mut self, loc: Location, antecedent: impl Into<String>) {
        self.entries.insert(loc, antecedent.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of the resolver pre-pass
#[derive(Debug, Clone, Default)]
pub struct CorefResolution {
    pub antecedents: AntecedentTable,
    /// Indices of sentences mentioning the entity directly or through a cluster
    pub useful_sentences: BTreeSet<usize>,
    pub cluster_count: usize,
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves coreference clusters against one query entity name
pub struct CorefResolver {
    entity_name: String,
    finder: NameFinder,
    max_sentence_length: usize,
}

impl CorefResolver {
    /// `max_sentence_length` of 0 disables the length limit
    pub fn new(entity_name: &str, max_sentence_length: usize) -> Result<Self> {
        Ok(Self {
            entity_name: entity_name.to_string(),
            finder: NameFinder::new([entity_name])?,
            max_sentence_length,
        })
    }

    /// Run over the entire corpus
    pub fn resolve(&self, corpus: &Corpus) -> Result<CorefResolution> {
        corpus.validate_links()?;

        let mut resolution = CorefResolution {
            useful_sentences: self.naming_sentences(&corpus.sentences),
            ..Default::default()
        };

        let arena = ClusterArena::from_links(&corpus.coref_links);
        resolution.cluster_count = arena.len();

        for (id, cluster) in arena.clusters().iter().enumerate() {
            let mut members = cluster.clone();
            members.sort();

            let antecedent = self
                .best_ner(&corpus.sentences, &members)
                .or_else(|| best_pos(&corpus.sentences, &members))
                .ok_or(KbpError::UntaggedCluster { cluster: id })?;
            tracing::trace!(cluster = id, antecedent = %antecedent, "Elected antecedent");

            if antecedent.to_lowercase() == self.entity_name.to_lowercase() {
                resolution
                    .useful_sentences
                    .extend(members.iter().map(|m| m.sentence));
            }
            for member in &members {
                resolution.antecedents.insert(*member, antecedent.clone());
            }
        }

        tracing::debug!(
            entity = %self.entity_name,
            clusters = resolution.cluster_count,
            useful = resolution.useful_sentences.len(),
            "Resolved coreference"
        );
        Ok(resolution)
    }

    /// Sentences within the length limit that name the entity
    pub fn naming_sentences(&self, sentences: &[Sentence]) -> BTreeSet<usize> {
        sentences
            .iter()
            .enumerate()
            .filter(|(_, sentence)| {
                self.max_sentence_length == 0 || sentence.len() <= self.max_sentence_length
            })
            .filter(|(_, sentence)| self.finder.matches_sentence(sentence))
            .map(|(i, _)| i)
            .collect()
    }

    /// Antecedent from the NE runs around tagged members
    fn best_ner(&self, sentences: &[Sentence], members: &[Location]) -> Option<String> {
        let needle = format!(" {} ", self.entity_name);
        let mut best: Option<(usize, Span)> = None;

        for loc in members {
            let sentence = &sentences[loc.sentence];
            if !sentence.tokens[loc.token].has_ner() {
                continue;
            }
            let run = ner_run(sentence, loc.token);
            let rendered = format!(" {} ", sentence.span_text(run));
            if rendered.contains(&needle) {
                return Some(self.entity_name.clone());
            }

            let better = match best {
                None => true,
                Some((s, b)) => {
                    run.len() > b.len()
                        || (run.len() == b.len()
                            && (loc.sentence < s || (loc.sentence == s && run.start < b.start)))
                }
            };
            if better {
                best = Some((loc.sentence, run));
            }
        }

        best.map(|(s, span)| sentences[s].span_text(span))
    }
}

/// Maximal run of tokens sharing the NE tag of `token`
fn ner_run(sentence: &Sentence, token: usize) -> Span {
    let tag = &sentence.tokens[token].ner;
    let mut start = token;
    while start > 0 && &sentence.tokens[start - 1].ner == tag {
        start -= 1;
    }
    let mut end = token + 1;
    while end < sentence.tokens.len() && &sentence.tokens[end].ner == tag {
        end += 1;
    }
    Span::new(start, end)
}

/// Earliest member word whose POS tag matches, trying narrower tags first
fn best_pos(sentences: &[Sentence], members: &[Location]) -> Option<String> {
    let tiers: [fn(&str) -> bool; 4] = [
        |t| t.starts_with("nnp"),
        |t| t.starts_with("nn"),
        |t| t.starts_with('n'),
        |t| !t.is_empty(),
    ];

    tiers.iter().find_map(|accept| {
        members
            .iter()
            .map(|loc| &sentences[loc.sentence].tokens[loc.token])
            .find(|token| accept(token.pos.to_lowercase().as_str()))
            .map(|token| token.word.clone())
    })
}
