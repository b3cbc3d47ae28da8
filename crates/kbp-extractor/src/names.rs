//! Name variants and lenient name finding
//!
//! Builds the ordered list of surface forms for an entity name or a fact
//! value, and a lenient pattern for spotting a name in raw sentence text.

use kbp_core::schema::{is_country_name_slot, is_date_slot, is_person_name_slot};
use kbp_core::{EntityType, KbpEntity, KbpError, Nationalities, Result, Sentence};
use regex::Regex;

use crate::span::tokenize;

const PERSON_PREFIXES: &[&str] = &[
    "mr", "mr.", "ms", "ms.", "mrs", "mrs.", "miss", "mister", "sir", "dr", "dr.",
];
const PERSON_SUFFIXES: &[&str] = &["jr", "jr.", "sr", "sr.", "i", "ii", "iii", "iv"];

/// Name variant builder
#[derive(Debug, Clone, Default)]
pub struct NameVariants<'a> {
    exact_entity_match: bool,
    country_eq_nationality: bool,
    nationalities: Option<&'a Nationalities>,
    year: Option<Regex>,
}

impl<'a> NameVariants<'a> {
    pub fn new() -> Self {
        Self {
            year: Regex::new(r"[12]\d\d\d").ok(),
            ..Default::default()
        }
    }

    /// Only use the primary entity name
    pub fn with_exact_entity_match(mut self, exact: bool) -> Self {
        self.exact_entity_match = exact;
        self
    }

    /// Accept nationalities for country slots
    pub fn with_nationalities(mut self, table: Option<&'a Nationalities>, enabled: bool) -> Self {
        self.nationalities = table;
        self.country_eq_nationality = enabled;
        self
    }

    /// "First Last" for a person name with honorifics and suffixes removed
    ///
    /// Empty unless more than two tokens remain after stripping.
    pub fn person_variants(name: &str) -> Vec<String> {
        let tokens = tokenize(name);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut start = 0;
        let mut end = tokens.len() - 1;
        while start < end && PERSON_PREFIXES.contains(&tokens[start].to_lowercase().as_str()) {
            start += 1;
        }
        while end > start && PERSON_SUFFIXES.contains(&tokens[end].to_lowercase().as_str()) {
            end -= 1;
        }

        if start + 1 < end {
            vec![format!("{} {}", tokens[start], tokens[end])]
        } else {
            Vec::new()
        }
    }

    /// Entity name variants in priority order, primary name first
    pub fn entity_variants(&self, entity: &KbpEntity) -> Vec<String> {
        let mut variants = vec![entity.name.clone()];
        if entity.entity_type == EntityType::Person && !self.exact_entity_match {
            for v in Self::person_variants(&entity.name) {
                if !variants.contains(&v) {
                    variants.push(v);
                }
            }
        }
        variants
    }

    /// Alternate surface forms for a fact value, longest first
    ///
    /// `extra` holds alternates supplied by the knowledge base. Ordering is
    /// by token count, stable among equal lengths.
    pub fn slot_alternates(&self, slot_name: &str, value: &str, extra: &[String]) -> Vec<Vec<String>> {
        let mut alternates: Vec<String> = Vec::new();

        if is_date_slot(slot_name) {
            if let Some(year) = self.year.as_ref().and_then(|re| re.find(value)) {
                if year.as_str().len() < value.len() {
                    alternates.push(year.as_str().to_string());
                }
            }
        }

        if is_person_name_slot(slot_name) {
            alternates.extend(Self::person_variants(value));
        }

        if self.country_eq_nationality && is_country_name_slot(slot_name) {
            if let Some(nat) = self.nationalities.and_then(|t| t.nationality_of(value)) {
                alternates.push(nat.to_string());
            }
        }

        alternates.extend(extra.iter().cloned());

        let mut tokenized: Vec<Vec<String>> = Vec::new();
        for alt in alternates {
            let tokens = tokenize(&alt);
            if !tokens.is_empty() && !tokenized.contains(&tokens) {
                tracing::trace!(slot = slot_name, value, alternate = %alt, "Added alternate slot value");
                tokenized.push(tokens);
            }
        }
        tokenized.sort_by(|a, b| b.len().cmp(&a.len()));
        tokenized
    }
}

/// Lenient matcher for a name in lower-cased sentence text
///
/// Periods and dashes become optional, commas are ignored and brackets match
/// the annotator's `-lrb-` / `-rrb-` escapes.
#[derive(Debug, Clone)]
pub struct NameFinder {
    regex: Regex,
}

impl NameFinder {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = names
            .into_iter()
            .map(|n| clean_match_regex(n.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Err(KbpError::MalformedInput("empty name pattern".to_string()));
        }

        let pattern = format!("(?:{})", alternatives.join("|"));
        let regex = Regex::new(&pattern).map_err(|e| KbpError::Other(e.into()))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Number of non-overlapping occurrences
    pub fn count(&self, haystack: &str) -> usize {
        self.regex.find_iter(haystack).count()
    }

    pub fn matches_sentence(&self, sentence: &Sentence) -> bool {
        self.is_match(&match_string(sentence))
    }
}

/// Lower-cased words joined by spaces, commas dropped
pub fn match_string(sentence: &Sentence) -> String {
    sentence
        .tokens
        .iter()
        .filter(|t| t.word != ",")
        .map(|t| t.word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_match_regex(name: &str) -> String {
    let lowered = name.to_lowercase().replace(',', " ");
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut pattern = String::new();
    for c in collapsed.chars() {
        match c {
            '.' => pattern.push_str("[ .]?"),
            '-' => pattern.push_str("[ -]?"),
            '(' => pattern.push_str(r"\s*-lrb-\s*"),
            ')' => pattern.push_str(r"\s*-rrb-\s*"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern
}
