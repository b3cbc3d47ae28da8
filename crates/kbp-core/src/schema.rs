//! Slot schema
//!
//! Maps each slot name to its cardinality, the NE labels a filler may carry
//! and the POS prefixes a filler may start with. Parsed from whitespace
//! separated lines: `name single|list NE1/NE2 POS1/POS2`.

use crate::{KbpError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Slot cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Single,
    List,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Schema entry for one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub name: String,
    pub kind: SlotKind,
    pub ne_labels: BTreeSet<String>,
    pub pos_prefixes: BTreeSet<String>,
}

impl SlotInfo {
    pub fn accepts_ne(&self, ne: &str) -> bool {
        self.ne_labels.contains(ne)
    }
}

/// The full slot schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotSchema {
    slots: BTreeMap<String, SlotInfo>,
    valid_ne_labels: BTreeSet<String>,
    valid_pos_prefixes: BTreeSet<String>,
    ne_to_slots: BTreeMap<String, BTreeSet<String>>,
}

impl SlotSchema {
    /// Parse schema text; blank lines are skipped
    pub fn parse(text: &str) -> Result<Self> {
        let mut schema = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            schema.insert(parse_line(line)?);
        }
        tracing::debug!(
            slots = schema.slots.len(),
            ne_labels = schema.valid_ne_labels.len(),
            "Parsed slot schema"
        );
        Ok(schema)
    }

    /// Read and parse a schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Add or replace a slot
    pub fn insert(&mut self, info: SlotInfo) {
        if let Some(previous) = self.slots.remove(&info.name) {
            for ne in &previous.ne_labels {
                if let Some(names) = self.ne_to_slots.get_mut(ne) {
                    names.remove(&previous.name);
                }
            }
        }
        for ne in &info.ne_labels {
            self.valid_ne_labels.insert(ne.clone());
            self.ne_to_slots
                .entry(ne.clone())
                .or_default()
                .insert(info.name.clone());
        }
        self.valid_pos_prefixes
            .extend(info.pos_prefixes.iter().cloned());
        self.slots.insert(info.name.clone(), info);
    }

    /// Look up a slot; unknown names are an error
    pub fn slot(&self, name: &str) -> Result<&SlotInfo> {
        self.slots
            .get(name)
            .ok_or_else(|| KbpError::UnknownSlot(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&SlotInfo> {
        self.slots.get(name)
    }

    /// True if some slot accepts fillers tagged `ne`
    pub fn is_valid_ne(&self, ne: &str) -> bool {
        self.valid_ne_labels.contains(ne)
    }

    pub fn valid_ne_labels(&self) -> &BTreeSet<String> {
        &self.valid_ne_labels
    }

    pub fn valid_pos_prefixes(&self) -> &BTreeSet<String> {
        &self.valid_pos_prefixes
    }

    /// Slots accepting fillers tagged `ne`
    pub fn slots_for_ne(&self, ne: &str) -> impl Iterator<Item = &str> {
        self.ne_to_slots
            .get(ne)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// True if the slot accepts the NE label; unknown slots are an error
    pub fn accepts(&self, slot_name: &str, ne: &str) -> Result<bool> {
        Ok(self.slot(slot_name)?.accepts_ne(ne))
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotInfo> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn parse_line(line: &str) -> Result<SlotInfo> {
    let pieces: Vec<&str> = line.split_whitespace().collect();
    if pieces.len() != 4 {
        return Err(KbpError::InvalidSchema(line.to_string()));
    }
    let kind = match pieces[1].to_lowercase().as_str() {
        "single" => SlotKind::Single,
        "list" => SlotKind::List,
        _ => return Err(KbpError::InvalidSchema(line.to_string())),
    };
    let split = |field: &str| -> BTreeSet<String> {
        field
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    Ok(SlotInfo {
        name: pieces[0].to_string(),
        kind,
        ne_labels: split(pieces[2]),
        pos_prefixes: split(pieces[3]),
    })
}

// ============================================================================
// Slot Families
// ============================================================================

const PERSON_NAME_SLOTS: &[&str] = &[
    "per:alternate_names",
    "per:spouse",
    "per:children",
    "per:parents",
    "per:siblings",
    "per:other_family",
    "org:top_members/employees",
    "org:top_membersSLASHemployees",
    "org:shareholders",
    "org:founded_by",
];

const COUNTRY_NAME_SLOTS: &[&str] = &[
    "org:country_of_headquarters",
    "org:member_of",
    "org:parents",
    "per:employee_of",
    "per:origin",
    "per:country_of_birth",
    "per:country_of_death",
    "per:countries_of_residence",
];

/// Slots whose fillers are dates
pub fn is_date_slot(slot_name: &str) -> bool {
    slot_name.starts_with("per:date_") || slot_name == "org:founded" || slot_name == "org:dissolved"
}

/// Slots whose fillers are person names
pub fn is_person_name_slot(slot_name: &str) -> bool {
    PERSON_NAME_SLOTS.contains(&slot_name)
}

/// Slots whose fillers may be country names
pub fn is_country_name_slot(slot_name: &str) -> bool {
    COUNTRY_NAME_SLOTS.contains(&slot_name)
}

// ============================================================================
// Nationalities
// ============================================================================

/// Country <-> nationality table
///
/// Lines are `Country Nationality`, multi-word names joined with `_`.
/// Lookups are case-insensitive; results keep the table's casing.
#[derive(Debug, Clone, Default)]
pub struct Nationalities {
    country_to_nationality: HashMap<String, String>,
    nationality_to_country: HashMap<String, String>,
}

impl Nationalities {
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bits: Vec<&str> = line.split_whitespace().collect();
            if bits.len() < 2 {
                return Err(KbpError::MalformedInput(format!(
                    "nationality line '{line}'"
                )));
            }
            table.insert(&bits[0].replace('_', " "), &bits[1].replace('_', " "));
        }
        tracing::debug!(
            entries = table.country_to_nationality.len(),
            "Loaded nationalities"
        );
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn insert(&mut self, country: &str, nationality: &str) {
        self.country_to_nationality
            .insert(country.to_lowercase(), nationality.to_string());
        self.nationality_to_country
            .insert(nationality.to_lowercase(), country.to_string());
    }

    pub fn nationality_of(&self, country: &str) -> Option<&str> {
        self.country_to_nationality
            .get(&country.to_lowercase())
            .map(String::as_str)
    }

    pub fn country_of(&self, nationality: &str) -> Option<&str> {
        self.nationality_to_country
            .get(&nationality.to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.country_to_nationality.len()
    }

    pub fn is_empty(&self) -> bool {
        self.country_to_nationality.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "
per:city_of_birth single LOCATION/CITY NNP
per:date_of_birth single DATE CD/NNP
per:employee_of list ORGANIZATION/COUNTRY NNP
";

    #[test]
    fn test_parse_schema() {
        let schema = SlotSchema::parse(SCHEMA).unwrap();
        assert_eq!(schema.len(), 3);

        let info = schema.slot("per:employee_of").unwrap();
        assert_eq!(info.kind, SlotKind::List);
        assert!(info.accepts_ne("COUNTRY"));
        assert!(schema.is_valid_ne("DATE"));
        assert!(!schema.is_valid_ne("PERSON"));
        assert!(schema.valid_pos_prefixes().contains("CD"));

        let slots: Vec<&str> = schema.slots_for_ne("LOCATION").collect();
        assert_eq!(slots, vec!["per:city_of_birth"]);
    }

    #[test]
    fn test_unknown_slot() {
        let schema = SlotSchema::parse(SCHEMA).unwrap();
        assert!(matches!(
            schema.accepts("per:religion", "RELIGION"),
            Err(KbpError::UnknownSlot(_))
        ));
        assert!(schema.accepts("per:date_of_birth", "DATE").unwrap());
    }

    #[test]
    fn test_invalid_schema_line() {
        assert!(matches!(
            SlotSchema::parse("per:spouse single PERSON"),
            Err(KbpError::InvalidSchema(_))
        ));
        assert!(matches!(
            SlotSchema::parse("per:spouse many PERSON NNP"),
            Err(KbpError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_slot_families() {
        assert!(is_date_slot("per:date_of_death"));
        assert!(is_date_slot("org:founded"));
        assert!(!is_date_slot("org:founded_by"));
        assert!(is_person_name_slot("org:founded_by"));
        assert!(is_country_name_slot("per:origin"));
        assert!(!is_country_name_slot("per:city_of_birth"));
    }

    #[test]
    fn test_nationalities() {
        let table = Nationalities::parse("United_States American\nFrance French\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.nationality_of("united states"), Some("American"));
        assert_eq!(table.country_of("FRENCH"), Some("France"));
        assert_eq!(table.nationality_of("Spain"), None);
    }
}
