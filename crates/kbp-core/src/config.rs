//! KBP Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with defaults suited to KBP slot-filling runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Mention and slot matching policies
    pub matching: MatchingConfig,

    /// Temporal alignment
    pub temporal: TemporalConfig,

    /// Sentence retrieval and ranking
    pub retrieval: RetrievalConfig,

    /// Batch worker pool
    pub batch: BatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Matching
        if let Some(v) = env_bool("KBP_CASE_INSENSITIVE_ENTITY_MATCH")? {
            config.matching.case_insensitive_entity_match = v;
        }
        if let Some(v) = env_bool("KBP_CASE_INSENSITIVE_SLOT_MATCH")? {
            config.matching.case_insensitive_slot_match = v;
        }
        if let Some(v) = env_bool("KBP_EXACT_ENTITY_MATCH")? {
            config.matching.exact_entity_match = v;
        }
        if let Ok(policy) = std::env::var("KBP_SLOT_MATCH_POLICY") {
            config.matching.slot_match_policy = policy.parse()?;
        }
        if let Some(v) = env_bool("KBP_MATCH_SLOT_NE")? {
            config.matching.match_slot_ne = v;
        }
        if let Some(v) = env_bool("KBP_ALLOW_MULTIPLE_LABELS")? {
            config.matching.allow_multiple_labels = v;
        }
        if let Some(v) = env_bool("KBP_USE_COREF")? {
            config.matching.use_coref = v;
        }
        if let Some(v) = env_usize("KBP_MAX_ENTITY_SLOT_DISTANCE")? {
            config.matching.max_entity_slot_distance = v;
        }
        if let Some(v) = env_bool("KBP_COUNTRY_EQ_NATIONALITY")? {
            config.matching.country_eq_nationality = v;
        }
        if let Some(v) = env_bool("KBP_QUERY_MODE")? {
            config.matching.query_mode = v;
        }

        // Temporal
        if let Some(v) = env_bool("KBP_TEMPORAL")? {
            config.temporal.enabled = v;
        }
        if let Some(v) = env_bool("KBP_FILTER_DEPENDENCY_PATHS")? {
            config.temporal.filter_dependency_paths = v;
        }

        // Retrieval
        if let Some(v) = env_usize("KBP_SENTENCES_PER_ENTITY")? {
            config.retrieval.sentences_per_entity = v;
        }
        if let Ok(mode) = std::env::var("KBP_SORT_MODE") {
            config.retrieval.sort_mode = mode.parse()?;
        }
        if let Some(v) = env_bool("KBP_USEFUL_SENTENCES_ONLY")? {
            config.retrieval.useful_sentences_only = v;
        }
        if let Ok(triggers) = std::env::var("KBP_TRIGGERS") {
            config.retrieval.triggers = triggers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Batch
        if let Some(v) = env_usize("KBP_WORKERS")? {
            config.batch.workers = v;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(v) = env_bool("LOG_JSON")? {
            config.logging.json_format = v;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let matching = MatchingConfig::default();

        // Only override if env values differ from defaults
        if env_config.matching.case_insensitive_entity_match
            != matching.case_insensitive_entity_match
        {
            self.matching.case_insensitive_entity_match =
                env_config.matching.case_insensitive_entity_match;
        }
        if env_config.matching.case_insensitive_slot_match != matching.case_insensitive_slot_match
        {
            self.matching.case_insensitive_slot_match =
                env_config.matching.case_insensitive_slot_match;
        }
        if env_config.matching.exact_entity_match != matching.exact_entity_match {
            self.matching.exact_entity_match = env_config.matching.exact_entity_match;
        }
        if env_config.matching.slot_match_policy != matching.slot_match_policy {
            self.matching.slot_match_policy = env_config.matching.slot_match_policy;
        }
        if env_config.matching.match_slot_ne != matching.match_slot_ne {
            self.matching.match_slot_ne = env_config.matching.match_slot_ne;
        }
        if env_config.matching.allow_multiple_labels != matching.allow_multiple_labels {
            self.matching.allow_multiple_labels = env_config.matching.allow_multiple_labels;
        }
        if env_config.matching.use_coref != matching.use_coref {
            self.matching.use_coref = env_config.matching.use_coref;
        }
        if env_config.matching.max_entity_slot_distance != matching.max_entity_slot_distance {
            self.matching.max_entity_slot_distance = env_config.matching.max_entity_slot_distance;
        }
        if env_config.matching.country_eq_nationality != matching.country_eq_nationality {
            self.matching.country_eq_nationality = env_config.matching.country_eq_nationality;
        }
        if env_config.matching.query_mode != matching.query_mode {
            self.matching.query_mode = env_config.matching.query_mode;
        }

        let temporal = TemporalConfig::default();
        if env_config.temporal.enabled != temporal.enabled {
            self.temporal.enabled = env_config.temporal.enabled;
        }
        if env_config.temporal.filter_dependency_paths != temporal.filter_dependency_paths {
            self.temporal.filter_dependency_paths = env_config.temporal.filter_dependency_paths;
        }

        let retrieval = RetrievalConfig::default();
        if env_config.retrieval.sentences_per_entity != retrieval.sentences_per_entity {
            self.retrieval.sentences_per_entity = env_config.retrieval.sentences_per_entity;
        }
        if env_config.retrieval.sort_mode != retrieval.sort_mode {
            self.retrieval.sort_mode = env_config.retrieval.sort_mode;
        }
        if env_config.retrieval.useful_sentences_only != retrieval.useful_sentences_only {
            self.retrieval.useful_sentences_only = env_config.retrieval.useful_sentences_only;
        }
        if !env_config.retrieval.triggers.is_empty() {
            self.retrieval.triggers = env_config.retrieval.triggers;
        }

        if env_config.batch.workers != BatchConfig::default().workers {
            self.batch.workers = env_config.batch.workers;
        }

        let logging = LoggingConfig::default();
        if env_config.logging.level != logging.level {
            self.logging.level = env_config.logging.level;
        }
        if env_config.logging.json_format != logging.json_format {
            self.logging.json_format = env_config.logging.json_format;
        }

        Ok(self)
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        },
        Err(_) => Ok(None),
    }
}

fn env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Mention and slot matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Compare entity name tokens case-insensitively
    pub case_insensitive_entity_match: bool,

    /// Compare slot value tokens case-insensitively
    pub case_insensitive_slot_match: bool,

    /// Only match the primary entity name (no derived variants)
    pub exact_entity_match: bool,

    /// How fact values are aligned with slot candidates
    pub slot_match_policy: SlotMatchPolicy,

    /// Require the candidate NE tag to be accepted by the slot
    pub match_slot_ne: bool,

    /// Apply the per-slot NE check when labeling training data
    pub enforce_ne_in_training: bool,

    /// Allow one candidate to match several facts
    pub allow_multiple_labels: bool,

    /// Accept coreferent pronouns and nouns as entity mentions
    pub use_coref: bool,

    /// Maximum token gap between an entity mention and a slot candidate
    pub max_entity_slot_distance: usize,

    /// Add the nationality of a country as an alternate slot value
    pub country_eq_nationality: bool,

    /// Emit unlabeled instances without consulting facts
    pub query_mode: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            case_insensitive_entity_match: false,
            case_insensitive_slot_match: false,
            exact_entity_match: false,
            slot_match_policy: SlotMatchPolicy::SpanAlignment,
            match_slot_ne: true,
            enforce_ne_in_training: true,
            allow_multiple_labels: true,
            use_coref: true,
            max_entity_slot_distance: 20,
            country_eq_nationality: false,
            query_mode: false,
        }
    }
}

/// Fact value alignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotMatchPolicy {
    /// Locate fact values in the sentence and compare spans
    SpanAlignment,
    /// Compare candidate text with the fact value directly
    ExactText,
}

impl std::str::FromStr for SlotMatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "span_alignment" | "span" => Ok(Self::SpanAlignment),
            "exact_text" | "exact" => Ok(Self::ExactText),
            _ => Err(ConfigError::InvalidValue {
                key: "KBP_SLOT_MATCH_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Temporal alignment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Bind temporal sub-fields onto date-slot instances
    pub enabled: bool,

    /// Only count dependency paths with a governing endpoint
    pub filter_dependency_paths: bool,

    /// Also accept paths where the source attaches to a governing verb
    pub attach_to_governor_verb: bool,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter_dependency_paths: true,
            attach_to_governor_verb: true,
        }
    }
}

/// Sentence retrieval and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Sentences requested per entity
    pub sentences_per_entity: usize,

    /// Skip sentences longer than this many tokens when selecting useful ones
    pub max_sentence_length: usize,

    /// Reordering applied to retrieved sentences
    pub sort_mode: SortMode,

    /// Token count at or below which a sentence ranks as too short
    pub sentence_too_short: usize,

    /// NE-run count at or below which a sentence ranks as too sparse
    pub ner_too_few: usize,

    /// Trigger regexes used by the trigger sort mode
    pub triggers: Vec<String>,

    /// Only label sentences that name the entity or hold a coreferent mention
    pub useful_sentences_only: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            sentences_per_entity: 500,
            max_sentence_length: 100,
            sort_mode: SortMode::None,
            sentence_too_short: 15,
            ner_too_few: 1,
            triggers: vec![],
            useful_sentences_only: false,
        }
    }
}

/// Sentence ranking modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    None,
    Ner,
    Buckets,
    Trigger,
}

impl std::str::FromStr for SortMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "ner" => Ok(Self::Ner),
            "buckets" => Ok(Self::Buckets),
            "trigger" => Ok(Self::Trigger),
            _ => Err(ConfigError::InvalidValue {
                key: "KBP_SORT_MODE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Batch worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of entities processed concurrently
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.matching.max_entity_slot_distance, 20);
        assert_eq!(config.retrieval.max_sentence_length, 100);
        assert!(config.matching.use_coref);
        assert!(!config.matching.case_insensitive_entity_match);
        assert!(!config.temporal.enabled);
        assert_eq!(config.retrieval.sort_mode, SortMode::None);
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!("ner".parse::<SortMode>().unwrap(), SortMode::Ner);
        assert_eq!("BUCKETS".parse::<SortMode>().unwrap(), SortMode::Buckets);
        assert!("invalid".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_slot_match_policy_parse() {
        assert_eq!(
            "exact-text".parse::<SlotMatchPolicy>().unwrap(),
            SlotMatchPolicy::ExactText
        );
        assert_eq!(
            "span".parse::<SlotMatchPolicy>().unwrap(),
            SlotMatchPolicy::SpanAlignment
        );
        assert!("fuzzy".parse::<SlotMatchPolicy>().is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[matching]\nmax_entity_slot_distance = 8\n\n[retrieval]\nsort_mode = \"trigger\"\ntriggers = [\"born\"]"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.matching.max_entity_slot_distance, 8);
        assert!(config.matching.use_coref);
        assert_eq!(config.retrieval.sort_mode, SortMode::Trigger);
        assert_eq!(config.retrieval.triggers, vec!["born".to_string()]);
        assert_eq!(config.batch.workers, 4);
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::from_file("/nonexistent/kbp.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
