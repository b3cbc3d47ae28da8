//! End-to-end labeling scenarios

use std::sync::Arc;

use kbp_core::store::CachedCorpus;
use kbp_core::{
    AppConfig, CachedSentenceSource, Corpus, CorefLink, DependencyEdge, DependencyGraph, EntityType,
    FactTuple, JsonKnowledgeBase, KbpEntity, Location, Sentence, SlotSchema, Span, TemporalExpression,
    TemporalFields,
};
use kbp_extractor::{
    BatchRunner, ClusterArena, CorefResolver, DistanceMatrix, EntityPipeline, InstanceLine, Label,
    TemporalAligner,
};

const SCHEMA: &str = "
per:stateorprovince_of_birth single LOCATION/STATE_OR_PROVINCE NNP
per:title list TITLE NN
per:city_of_birth single CITY NNP
";

fn schema() -> SlotSchema {
    SlotSchema::parse(SCHEMA).unwrap()
}

fn obama() -> KbpEntity {
    KbpEntity::new("SF_100", "Obama", EntityType::Person)
}

fn born_in_hawaii() -> Corpus {
    Corpus::new(
        vec![Sentence::from_tagged(
            &["Obama", "was", "born", "in", "Hawaii"],
            &["NNP", "VBD", "VBN", "IN", "NNP"],
            &["PERSON", "O", "O", "O", "LOCATION"],
        )],
        vec![],
    )
}

#[test]
fn test_known_fact_yields_positive_instance() {
    let pipeline = EntityPipeline::new(schema(), AppConfig::default()).unwrap();
    let facts = vec![FactTuple::new(&obama(), "per:stateorprovince_of_birth", "Hawaii")];
    let output = pipeline.process(&obama(), facts, born_in_hawaii()).unwrap();

    assert_eq!(output.instances.len(), 1);
    let instance = &output.instances[0];
    assert_eq!(instance.label.to_string(), "per:stateorprovince_of_birth");
    assert_eq!(instance.mention.span, Span::new(0, 1));
    assert_eq!(instance.candidate.span, Span::new(4, 5));
    assert_eq!(
        InstanceLine::from_instance(instance).to_line(),
        "{SF_100} PER LOCATION Hawaii per:stateorprovince_of_birth"
    );
}

#[test]
fn test_unmatched_candidate_yields_unrelated_instance() {
    let pipeline = EntityPipeline::new(schema(), AppConfig::default()).unwrap();
    let facts = vec![FactTuple::new(&obama(), "per:title", "Senator")];
    let output = pipeline.process(&obama(), facts, born_in_hawaii()).unwrap();

    assert_eq!(output.instances.len(), 1);
    assert_eq!(output.instances[0].label, Label::Unrelated);
    assert_eq!(output.instances[0].label.to_string(), "unrelated");
    assert_eq!(output.instances[0].slot_value, "Hawaii");
}

#[test]
fn test_duplicate_and_self_links_form_one_cluster() {
    let links = vec![
        CorefLink::from_one_based((2, 1), (3, 4)).unwrap(),
        CorefLink::from_one_based((3, 4), (3, 4)).unwrap(),
        CorefLink::from_one_based((2, 1), (3, 4)).unwrap(),
        CorefLink::from_one_based((3, 4), (3, 4)).unwrap(),
    ];
    let arena = ClusterArena::from_links(&links);
    assert_eq!(arena.len(), 1);
    let mut members = arena.clusters()[0].clone();
    members.sort();
    assert_eq!(members, vec![Location::new(1, 0), Location::new(2, 3)]);

    let sentences = vec![
        Sentence::from_tagged(&["Nothing", "here"], &["NN", "RB"], &["O", "O"]),
        Sentence::from_tagged(&["Obama", "spoke"], &["NNP", "VBD"], &["PERSON", "O"]),
        Sentence::from_tagged(
            &["Then", "the", "senator", "he", "left"],
            &["RB", "DT", "NN", "PRP", "VBD"],
            &["O", "O", "TITLE", "O", "O"],
        ),
    ];
    let resolution = CorefResolver::new("Obama", 0)
        .unwrap()
        .resolve(&Corpus::new(sentences, links))
        .unwrap();
    assert_eq!(resolution.cluster_count, 1);
    assert_eq!(resolution.antecedents.get(2, 3), Some("Obama"));
    assert!(resolution.useful_sentences.contains(&2));
}

/// "Smith became mayor in 1975 and moved to Boston in 1980"
fn mayor() -> Sentence {
    let year = |y: &str| TemporalFields {
        t1: Some(y.to_string()),
        ..Default::default()
    };
    Sentence::from_tagged(
        &["Smith", "became", "mayor", "in", "1975", "and", "moved", "to", "Boston", "in", "1980"],
        &["NNP", "VBD", "NN", "IN", "CD", "CC", "VBD", "TO", "NNP", "IN", "CD"],
        &["PERSON", "O", "TITLE", "O", "DATE", "O", "O", "O", "CITY", "O", "DATE"],
    )
    .with_dependencies(DependencyGraph::new(vec![
        DependencyEdge::new(1, 0, "nsubj"),
        DependencyEdge::new(1, 2, "xcomp"),
        DependencyEdge::new(2, 4, "prep_in"),
        DependencyEdge::new(1, 6, "conj_and"),
        DependencyEdge::new(6, 8, "prep_to"),
        DependencyEdge::new(8, 10, "prep_in"),
    ]))
    .with_temporals(vec![
        TemporalExpression::new(Span::new(10, 11), year("1980")),
        TemporalExpression::new(Span::new(4, 5), year("1975")),
    ])
}

#[test]
fn test_temporal_binds_nearest_expression() {
    let sentence = mayor();
    let graph = sentence.dependencies.clone().unwrap();
    let matrix = DistanceMatrix::compute(&sentence, &graph, false, true);
    assert_eq!(matrix.get(4, 2), Some(2));
    assert_eq!(matrix.get(10, 2), Some(5));

    let temporals = TemporalAligner::candidates(&sentence);
    let chosen = TemporalAligner::default()
        .choose(&temporals, Span::new(2, 3), Some(&matrix))
        .unwrap();
    assert_eq!(chosen.fields.t1.as_deref(), Some("1975"));

    let mut config = AppConfig::default();
    config.temporal.enabled = true;
    let pipeline = EntityPipeline::new(schema(), config).unwrap();
    let smith = KbpEntity::new("SF_200", "Smith", EntityType::Person);
    let facts = vec![FactTuple::new(&smith, "per:title", "mayor")];
    let output = pipeline
        .process(&smith, facts, Corpus::new(vec![mayor()], vec![]))
        .unwrap();

    let positive = output
        .instances
        .iter()
        .find(|i| i.label.is_positive())
        .unwrap();
    assert_eq!(positive.slot_value, "mayor");
    assert_eq!(
        positive.temporal.as_ref().and_then(|t| t.t1.as_deref()),
        Some("1975")
    );
}

#[test]
fn test_labeling_is_deterministic() {
    let pipeline = EntityPipeline::new(schema(), AppConfig::default()).unwrap();
    let facts = vec![
        FactTuple::new(&obama(), "per:title", "Senator"),
        FactTuple::new(&obama(), "per:stateorprovince_of_birth", "Hawaii"),
    ];
    let first = pipeline.process(&obama(), facts.clone(), born_in_hawaii()).unwrap();
    let second = pipeline.process(&obama(), facts, born_in_hawaii()).unwrap();
    assert_eq!(first.instances, second.instances);
}

#[tokio::test]
async fn test_batch_over_cached_corpora() {
    let cache = tempfile::tempdir().unwrap();
    let blob = CachedCorpus {
        sentences: born_in_hawaii().sentences,
        coref: vec![],
    };
    std::fs::write(
        cache.path().join("SF_100.json"),
        serde_json::to_string(&blob).unwrap(),
    )
    .unwrap();
    std::fs::write(cache.path().join("SF_101.json"), "{ not json").unwrap();

    let kb = JsonKnowledgeBase::from_json(
        r#"{"entities": [
            {"id": "SF_100", "name": "Obama", "type": "PER",
             "facts": [{"slot": "per:stateorprovince_of_birth", "value": "Hawaii"}]},
            {"id": "SF_101", "name": "Nobody", "type": "PER", "facts": []}
        ]}"#,
    )
    .unwrap();

    let pipeline = EntityPipeline::new(schema(), AppConfig::default()).unwrap();
    let source = CachedSentenceSource::new(vec![cache.path().to_path_buf()]);
    let report = BatchRunner::new(Arc::new(pipeline), Arc::new(source), Arc::new(kb))
        .run_all()
        .await;

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.stats.positives, 1);
    assert_eq!(report.stats.useful_entities, 1);
}
