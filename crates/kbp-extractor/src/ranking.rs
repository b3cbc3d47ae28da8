//! Sentence ranking
//!
//! Reorders an entity's retrieved sentences so the most promising are
//! labeled first. Ranking yields a permutation of sentence indices; the
//! sentences themselves never move, since coreference locations refer to
//! their original positions.

use std::cmp::Reverse;

use kbp_core::{KbpError, Result, RetrievalConfig, Sentence, SortMode};

use crate::names::{match_string, NameFinder};

/// Produces the processing order of a corpus
#[derive(Debug, Clone)]
pub struct SentenceRanker {
    mode: SortMode,
    too_short: usize,
    too_few: usize,
    triggers: Vec<NameFinder>,
}

impl SentenceRanker {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let mut triggers = Vec::new();
        if config.sort_mode == SortMode::Trigger {
            if config.triggers.is_empty() {
                return Err(KbpError::ConfigError(
                    "trigger sort mode requires at least one trigger".to_string(),
                ));
            }
            for trigger in &config.triggers {
                triggers.push(NameFinder::new([trigger])?);
            }
        }

        Ok(Self {
            mode: config.sort_mode,
            too_short: config.sentence_too_short,
            too_few: config.ner_too_few,
            triggers,
        })
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    /// Indices of `sentences` in processing order
    pub fn rank(&self, sentences: &[Sentence]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..sentences.len()).collect();
        match self.mode {
            SortMode::None => {}
            SortMode::Ner => {
                order.sort_by_key(|&i| Reverse(count_ner_runs(&sentences[i])));
            }
            SortMode::Buckets => {
                order.sort_by_key(|&i| !self.is_good(&sentences[i]));
            }
            SortMode::Trigger => {
                order.sort_by_key(|&i| Reverse(self.trigger_count(&sentences[i])));
            }
        }
        tracing::debug!(mode = ?self.mode, sentences = sentences.len(), "Ranked sentences");
        order
    }

    fn is_good(&self, sentence: &Sentence) -> bool {
        sentence.len() > self.too_short && count_ner_runs(sentence) > self.too_few
    }

    fn trigger_count(&self, sentence: &Sentence) -> usize {
        let text = match_string(sentence);
        self.triggers.iter().map(|t| t.count(&text)).sum()
    }
}

/// Number of maximal runs of equal, non-blank NE tags
pub fn count_ner_runs(sentence: &Sentence) -> usize {
    let mut runs = 0;
    let mut previous: Option<&str> = None;
    for token in &sentence.tokens {
        if !token.has_ner() {
            previous = None;
            continue;
        }
        if previous != Some(token.ner.as_str()) {
            runs += 1;
        }
        previous = Some(token.ner.as_str());
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(ner: &[&str]) -> Sentence {
        let words: Vec<String> = (0..ner.len()).map(|i| format!("w{}", i)).collect();
        let words: Vec<&str> = words.iter().map(|s| s.as_str()).collect();
        let pos = vec!["NN"; ner.len()];
        Sentence::from_tagged(&words, &pos, ner)
    }

    fn text(words: &[&str]) -> Sentence {
        let pos = vec!["NN"; words.len()];
        let ner = vec!["O"; words.len()];
        Sentence::from_tagged(words, &pos, &ner)
    }

    fn config(mode: SortMode) -> RetrievalConfig {
        RetrievalConfig {
            sort_mode: mode,
            sentence_too_short: 3,
            ner_too_few: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_count_ner_runs() {
        assert_eq!(count_ner_runs(&sentence(&["O", "O"])), 0);
        assert_eq!(count_ner_runs(&sentence(&["PERSON", "PERSON", "O", "CITY"])), 2);
        assert_eq!(count_ner_runs(&sentence(&["PERSON", "CITY", "CITY"])), 2);
        assert_eq!(count_ner_runs(&sentence(&["DATE", "O", "DATE"])), 2);
    }

    #[test]
    fn test_none_keeps_order() {
        let ranker = SentenceRanker::from_config(&config(SortMode::None)).unwrap();
        let sentences = vec![sentence(&["O"]), sentence(&["PERSON", "O", "CITY"])];
        assert_eq!(ranker.rank(&sentences), vec![0, 1]);
    }

    #[test]
    fn test_ner_mode_is_stable_descending() {
        let ranker = SentenceRanker::from_config(&config(SortMode::Ner)).unwrap();
        let sentences = vec![
            sentence(&["PERSON"]),
            sentence(&["PERSON", "O", "CITY"]),
            sentence(&["CITY"]),
            sentence(&["O"]),
        ];
        assert_eq!(ranker.rank(&sentences), vec![1, 0, 2, 3]);
    }

    #[test]
    fn test_buckets_mode() {
        let ranker = SentenceRanker::from_config(&config(SortMode::Buckets)).unwrap();
        let sentences = vec![
            // too short
            sentence(&["PERSON", "O", "CITY"]),
            sentence(&["PERSON", "O", "CITY", "O"]),
            // too few NE runs
            sentence(&["PERSON", "O", "O", "O"]),
            sentence(&["DATE", "O", "O", "TITLE", "O"]),
        ];
        assert_eq!(ranker.rank(&sentences), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_trigger_mode() {
        let mut cfg = config(SortMode::Trigger);
        cfg.triggers = vec!["born".to_string(), "died".to_string()];
        let ranker = SentenceRanker::from_config(&cfg).unwrap();
        let sentences = vec![
            text(&["He", "works", "here"]),
            text(&["He", "was", "born", "and", "died", "there"]),
            text(&["Born", "in", "Ohio"]),
        ];
        assert_eq!(ranker.rank(&sentences), vec![1, 2, 0]);
    }

    #[test]
    fn test_trigger_mode_without_triggers_is_error() {
        let err = SentenceRanker::from_config(&config(SortMode::Trigger)).unwrap_err();
        assert!(matches!(err, KbpError::ConfigError(_)));
    }
}
