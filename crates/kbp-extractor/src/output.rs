//! Instance line format
//!
//! One labeled instance per line:
//! `{entityId} entityType neType slotValue label feature1 feature2 ...`
//! Type fields lose their whitespace; the value and features have it
//! replaced by `_`. A multi-label is written as slot names joined by `|`.

use std::io::{BufRead, Write};

use kbp_core::{KbpError, Result};
use serde::{Deserialize, Serialize};

use crate::LabeledInstance;

/// A single serialized training instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceLine {
    pub entity_id: String,
    pub entity_type: String,
    pub ne_type: String,
    pub slot_value: String,
    pub label: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl InstanceLine {
    pub fn from_instance(instance: &LabeledInstance) -> Self {
        Self {
            entity_id: instance.entity_id.clone(),
            entity_type: instance.entity_type.as_str().to_string(),
            ne_type: instance.candidate.ne.clone(),
            slot_value: instance.slot_value.clone(),
            label: instance.label.as_string(),
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{{{}}} {} {} {} {}",
            self.entity_id,
            strip_whitespace(&self.entity_type),
            strip_whitespace(&self.ne_type),
            underscore_whitespace(&self.slot_value),
            self.label
        );
        for feature in &self.features {
            line.push(' ');
            line.push_str(&underscore_whitespace(feature));
        }
        line
    }

    /// Parse one line, producing one record per label of a multi-label
    pub fn parse(line: &str) -> Result<Vec<Self>> {
        let line = line.trim_end();
        let invalid = || KbpError::InvalidInstanceLine(line.to_string());

        if !line.starts_with('{') {
            return Err(invalid());
        }
        let close = line.find("} ").ok_or_else(invalid)?;
        if close < 2 {
            return Err(invalid());
        }
        let entity_id = &line[1..close];

        let bits: Vec<&str> = line[close + 2..].split_whitespace().collect();
        if bits.len() < 4 {
            return Err(invalid());
        }
        let features: Vec<String> = bits[4..].iter().map(|s| s.to_string()).collect();

        Ok(bits[3]
            .split('|')
            .filter(|label| !label.is_empty())
            .map(|label| Self {
                entity_id: entity_id.to_string(),
                entity_type: bits[0].to_string(),
                ne_type: bits[1].to_string(),
                slot_value: bits[2].to_string(),
                label: label.to_string(),
                features: features.clone(),
            })
            .collect())
    }
}

impl std::fmt::Display for InstanceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}

/// Write one instance line per instance, returning the line count
pub fn write_lines<W: Write>(mut writer: W, instances: &[LabeledInstance]) -> Result<usize> {
    for instance in instances {
        writeln!(writer, "{}", InstanceLine::from_instance(instance))?;
    }
    writer.flush()?;
    Ok(instances.len())
}

/// Write full instances as JSON lines
pub fn write_jsonl<W: Write>(mut writer: W, instances: &[LabeledInstance]) -> Result<usize> {
    for instance in instances {
        serde_json::to_writer(&mut writer, instance)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(instances.len())
}

/// Parse an instance file, skipping blank lines
pub fn read_lines<R: BufRead>(reader: R) -> Result<Vec<InstanceLine>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.extend(InstanceLine::parse(&line)?);
    }
    Ok(records)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn underscore_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join("_")
}
