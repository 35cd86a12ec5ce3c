//! Denormalized table row: one record per (field, subfield, funder) leaf

use serde::{Deserialize, Serialize, Serializer};

/// One topic in a (subfield, funder) pair's topic list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub topic_id: String,
    pub topic_name: String,
    pub topic_works_count: u64,
}

/// Topic list of a record as found in storage.
///
/// CSV tables embed the list as JSON text, so a single row can carry
/// unparsable data. Such rows keep the raw text and are skipped by
/// topic-level queries instead of failing the whole table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedTopics {
    Parsed(Vec<TopicEntry>),
    Malformed { raw: String, reason: String },
}

/// Error returned when a row's topic list could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed embedded topics: {reason}")]
pub struct MalformedTopics {
    pub reason: String,
}

impl EmbeddedTopics {
    /// Parse the embedded text of a CSV cell. Never fails; bad text
    /// becomes [`EmbeddedTopics::Malformed`]. A blank cell is an empty list.
    ///
    /// JSON is tried first, then the Python literal form
    /// (`[{'topic_id': 'T1', ...}]`) that older tables carry.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Parsed(Vec::new());
        }
        let err = match serde_json::from_str::<Vec<TopicEntry>>(trimmed) {
            Ok(topics) => return Self::Parsed(topics),
            Err(e) => e,
        };
        if trimmed.contains('\'') {
            if let Ok(topics) = serde_json::from_str(&python_literal_to_json(trimmed)) {
                return Self::Parsed(topics);
            }
        }
        Self::Malformed {
            raw: raw.to_string(),
            reason: err.to_string(),
        }
    }

    /// Topic entries, or the parse failure for this row.
    pub fn entries(&self) -> Result<&[TopicEntry], MalformedTopics> {
        match self {
            Self::Parsed(topics) => Ok(topics),
            Self::Malformed { reason, .. } => Err(MalformedTopics {
                reason: reason.clone(),
            }),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// Text form for a CSV cell. Malformed rows round-trip their raw text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Parsed(topics) => {
                serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string())
            }
            Self::Malformed { raw, .. } => raw.clone(),
        }
    }
}

impl Default for EmbeddedTopics {
    fn default() -> Self {
        Self::Parsed(Vec::new())
    }
}

impl From<Vec<TopicEntry>> for EmbeddedTopics {
    fn from(topics: Vec<TopicEntry>) -> Self {
        Self::Parsed(topics)
    }
}

/// JSON form: a list of topics, or the raw text for malformed rows.
impl Serialize for EmbeddedTopics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Parsed(topics) => topics.serialize(serializer),
            Self::Malformed { raw, .. } => serializer.serialize_str(raw),
        }
    }
}

/// One row of the denormalized table.
///
/// Column order here is the CSV header order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub field_id: u32,
    pub field_name: String,
    pub subfield_id: u32,
    pub subfield_name: String,
    pub subfield_works_count: u64,
    pub funder_id: String,
    pub funder_name: String,
    pub funder_works_count: u64,
    #[serde(with = "topics_text")]
    pub topics: EmbeddedTopics,
    pub fetch_date: String,
    pub country_code: String,
    pub year_range: String,
}

impl Record {
    /// Leaf key; unique within a table
    pub fn leaf_key(&self) -> (u32, u32, &str) {
        (self.field_id, self.subfield_id, &self.funder_id)
    }
}

/// Rewrite a Python list/dict literal as JSON text.
///
/// Single-quoted strings become double-quoted, `None`/`True`/`False` become
/// `null`/`true`/`false`. Anything JSON cannot express is left as is and
/// fails the subsequent parse.
fn python_literal_to_json(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => break,
                        },
                        c if c == quote => break,
                        '"' => out.push_str("\\\""),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() && next != '_' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }
    out
}

/// Topics as embedded JSON text inside a single CSV column
mod topics_text {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::EmbeddedTopics;

    pub fn serialize<S: Serializer>(topics: &EmbeddedTopics, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&topics.to_text())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<EmbeddedTopics, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(EmbeddedTopics::parse(&raw))
    }
}
