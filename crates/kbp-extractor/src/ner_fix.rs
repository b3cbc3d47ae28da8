//! NER post-corrections
//!
//! Repairs systematic tagging mistakes of the annotator before matching:
//! ages written as one token, year ranges read as a single date, and
//! pronouns or prepositions tagged as places.

use kbp_core::{KbpError, Result, Sentence, NER_BLANK};
use regex::Regex;

const NUMBER: &str = "NUMBER";
const DATE: &str = "DATE";

/// Applies the correction rules in a fixed order
#[derive(Debug, Clone)]
pub struct NerCorrector {
    digits: Regex,
    age: Regex,
    age_prefix: Regex,
    year: Regex,
}

impl NerCorrector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            digits: compile(r"^[0-9]+$")?,
            age: compile(r"(?i)^[1-9][0-9]?-year-old$")?,
            age_prefix: compile(r"^[1-9][0-9]?-$")?,
            year: compile(r"^[12][0-9]{3}$")?,
        })
    }

    /// Returns the number of tokens whose tag changed
    pub fn correct(&self, sentence: &mut Sentence) -> usize {
        let tokens = &mut sentence.tokens;
        let mut changed = 0;

        // "10 years": NUMBER on "years" after a numeric NUMBER
        for i in 1..tokens.len() {
            if tokens[i].word.starts_with("year")
                && tokens[i].ner == NUMBER
                && tokens[i - 1].ner == NUMBER
                && self.digits.is_match(&tokens[i - 1].word)
            {
                tokens[i].ner = NER_BLANK.to_string();
                changed += 1;
            }
        }

        for token in tokens.iter_mut() {
            if !token.has_ner() && self.age.is_match(&token.word) {
                token.ner = NUMBER.to_string();
                changed += 1;
            }
        }

        for token in tokens.iter_mut() {
            if !token.has_ner() && self.age_prefix.is_match(&token.word) {
                token.ner = NUMBER.to_string();
                changed += 1;
            }
        }

        // "1990 - 1995": keep the two years apart
        for i in 1..tokens.len().saturating_sub(1) {
            if tokens[i - 1].ner == DATE
                && tokens[i].ner == DATE
                && tokens[i + 1].ner == DATE
                && self.year.is_match(&tokens[i - 1].word)
                && self.year.is_match(&tokens[i + 1].word)
                && matches!(tokens[i].word.to_lowercase().as_str(), "-" | "--" | "to")
            {
                tokens[i].ner = NER_BLANK.to_string();
                changed += 1;
            }
        }

        for token in tokens.iter_mut() {
            if (token.ner == "COUNTRY" || token.ner == "STATE_OR_PROVINCE")
                && (token.pos.starts_with("PRP") || token.pos.starts_with("IN"))
            {
                token.ner = NER_BLANK.to_string();
                changed += 1;
            }
        }

        if changed > 0 {
            tracing::trace!(changed, "Corrected NE tags");
        }
        changed
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| KbpError::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(sentence: &Sentence) -> Vec<&str> {
        sentence.tokens.iter().map(|t| t.ner.as_str()).collect()
    }

    #[test]
    fn test_years_after_number() {
        let mut sentence = Sentence::from_tagged(
            &["for", "10", "years"],
            &["IN", "CD", "NNS"],
            &["O", "NUMBER", "NUMBER"],
        );
        assert_eq!(NerCorrector::new().unwrap().correct(&mut sentence), 1);
        assert_eq!(tags(&sentence), vec!["O", "NUMBER", "O"]);

        let mut spelled = Sentence::from_tagged(
            &["ten", "years"],
            &["CD", "NNS"],
            &["NUMBER", "NUMBER"],
        );
        assert_eq!(NerCorrector::new().unwrap().correct(&mut spelled), 0);
    }

    #[test]
    fn test_ages() {
        let mut sentence = Sentence::from_tagged(
            &["a", "45-Year-Old", "man", "aged", "7-", "to", "100-year-old"],
            &["DT", "JJ", "NN", "VBN", "CD", "TO", "JJ"],
            &["O", "O", "O", "O", "O", "O", "O"],
        );
        NerCorrector::new().unwrap().correct(&mut sentence);
        assert_eq!(tags(&sentence), vec!["O", "NUMBER", "O", "O", "NUMBER", "O", "O"]);
    }

    #[test]
    fn test_year_range_split() {
        let mut sentence = Sentence::from_tagged(
            &["from", "1990", "to", "1995"],
            &["IN", "CD", "TO", "CD"],
            &["O", "DATE", "DATE", "DATE"],
        );
        NerCorrector::new().unwrap().correct(&mut sentence);
        assert_eq!(tags(&sentence), vec!["O", "DATE", "O", "DATE"]);

        let mut month = Sentence::from_tagged(
            &["May", "to", "1995"],
            &["NNP", "TO", "CD"],
            &["DATE", "DATE", "DATE"],
        );
        NerCorrector::new().unwrap().correct(&mut month);
        assert_eq!(tags(&month), vec!["DATE", "DATE", "DATE"]);
    }

    #[test]
    fn test_places_on_function_words() {
        let mut sentence = Sentence::from_tagged(
            &["In", "US", "it", "rained"],
            &["IN", "NNP", "PRP", "VBD"],
            &["COUNTRY", "COUNTRY", "STATE_OR_PROVINCE", "O"],
        );
        NerCorrector::new().unwrap().correct(&mut sentence);
        assert_eq!(tags(&sentence), vec!["O", "COUNTRY", "O", "O"]);
    }

    #[test]
    fn test_short_sentences() {
        let mut empty = Sentence::default();
        assert_eq!(NerCorrector::new().unwrap().correct(&mut empty), 0);
        let mut one = Sentence::from_tagged(&["1990"], &["CD"], &["DATE"]);
        assert_eq!(NerCorrector::new().unwrap().correct(&mut one), 0);
    }
}
