//! Entity pipeline
//!
//! Runs every stage for one query entity: NER corrections, the corpus-wide
//! coreference pre-pass, sentence ranking, then mention matching, candidate
//! extraction, labeling and temporal binding per sentence.

use std::collections::BTreeSet;

use kbp_core::{
    AppConfig, Corpus, FactTuple, KbpEntity, KnowledgeBase, Nationalities, Result, SentenceSource,
    SlotSchema,
};
use serde::{Deserialize, Serialize};

use crate::candidate::CandidateExtractor;
use crate::coref::{CorefResolution, CorefResolver};
use crate::labeler::{PreparedFact, SlotValueMatcher};
use crate::mention::MentionMatcher;
use crate::metrics::LabelStats;
use crate::names::NameVariants;
use crate::ner_fix::NerCorrector;
use crate::ranking::SentenceRanker;
use crate::temporal::TemporalAligner;
use crate::LabeledInstance;

/// Instances and statistics for one entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityOutput {
    pub entity_id: String,
    pub instances: Vec<LabeledInstance>,
    pub stats: LabelStats,
}

/// Labels the corpus of one entity at a time
///
/// Holds only read-only state, so one pipeline can be shared by all
/// workers of a batch.
pub struct EntityPipeline {
    schema: SlotSchema,
    config: AppConfig,
    nationalities: Option<Nationalities>,
    corrector: NerCorrector,
    ranker: SentenceRanker,
    aligner: TemporalAligner,
}

impl EntityPipeline {
    pub fn new(schema: SlotSchema, config: AppConfig) -> Result<Self> {
        let corrector = NerCorrector::new()?;
        let ranker = SentenceRanker::from_config(&config.retrieval)?;
        let aligner = TemporalAligner::from_config(&config.temporal);
        Ok(Self {
            schema,
            config,
            nationalities: None,
            corrector,
            ranker,
            aligner,
        })
    }

    pub fn with_nationalities(mut self, nationalities: Nationalities) -> Self {
        self.nationalities = Some(nationalities);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn schema(&self) -> &SlotSchema {
        &self.schema
    }

    /// Fetch facts and sentences for `entity`, then label them
    pub fn run(
        &self,
        source: &dyn SentenceSource,
        kb: &dyn KnowledgeBase,
        entity: &KbpEntity,
    ) -> Result<EntityOutput> {
        entity.require_id()?;
        let facts = kb.facts(entity);
        let keywords: Vec<String> = facts
            .iter()
            .map(|f| f.slot_value.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let corpus = source.find_sentences(entity, &keywords, self.config.retrieval.sentences_per_entity)?;
        tracing::debug!(
            entity = %entity,
            source = source.name(),
            sentences = corpus.sentences.len(),
            facts = facts.len(),
            "Retrieved corpus"
        );
        self.process(entity, facts, corpus)
    }

    /// Label an already retrieved corpus
    pub fn process(&self, entity: &KbpEntity, facts: Vec<FactTuple>, mut corpus: Corpus) -> Result<EntityOutput> {
        let entity_id = entity.require_id()?.to_string();
        let matching = &self.config.matching;

        let variants = NameVariants::new()
            .with_exact_entity_match(matching.exact_entity_match)
            .with_nationalities(self.nationalities.as_ref(), matching.country_eq_nationality);
        let names = variants.entity_variants(entity);
        let facts = PreparedFact::prepare_all(facts, &variants);

        for sentence in corpus.sentences.iter_mut() {
            self.corrector.correct(sentence);
        }

        let resolver = CorefResolver::new(&entity.name, self.config.retrieval.max_sentence_length)?;
        let resolution = if matching.use_coref {
            resolver.resolve(&corpus)?
        } else {
            CorefResolution {
                useful_sentences: resolver.naming_sentences(&corpus.sentences),
                ..Default::default()
            }
        };

        let order = self.ranker.rank(&corpus.sentences);

        let mentions = MentionMatcher::new(entity_id.clone(), entity.entity_type, &names)
            .with_case_insensitive(matching.case_insensitive_entity_match)
            .with_coref(matching.use_coref);
        let extractor = CandidateExtractor::new(&self.schema)
            .with_max_distance(matching.max_entity_slot_distance)
            .with_ne_gating(matching.match_slot_ne);
        let labeler = SlotValueMatcher::new(&self.schema, matching);

        let mut output = EntityOutput {
            entity_id: entity_id.clone(),
            ..Default::default()
        };

        for index in order {
            if self.config.retrieval.useful_sentences_only
                && !resolution.useful_sentences.contains(&index)
            {
                continue;
            }
            let sentence = &mut corpus.sentences[index];

            let found = mentions.find(sentence, index, &resolution.antecedents);
            let candidates = extractor.extract(sentence, &found);

            let mut instances = if matching.query_mode {
                labeler.label_unlabeled(index, &entity_id, entity.entity_type, &found, &candidates)
            } else {
                labeler.label(sentence, index, &entity_id, entity.entity_type, &found, &candidates, &facts)?
            };

            if self.config.temporal.enabled {
                self.aligner.align(sentence, &mut instances);
            }

            output.stats.add_sentence(&instances);
            output.instances.extend(instances);
        }

        let had_positive = output.instances.iter().any(|i| i.label.is_positive());
        output.stats.finish_entity(facts.len(), had_positive);

        tracing::info!(
            entity = %entity,
            sentences = output.stats.sentences,
            instances = output.stats.instances,
            positives = output.stats.positives,
            "Labeled entity"
        );
        Ok(output)
    }
}
