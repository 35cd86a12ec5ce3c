//! Combined "research data" view: progressive filters, then one row per
//! (funder, field, subfield) combination.

use std::collections::BTreeMap;

use fundscape_store::{EmbeddedTopics, Record};
use serde::Serialize;

use crate::params::{QueryError, optional_id, optional_str};

/// Optional filters, applied field → subfield → funder → topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchFilter {
    pub field_id: Option<u32>,
    pub subfield_id: Option<u32>,
    pub funder_id: Option<String>,
    pub topic_id: Option<String>,
}

impl ResearchFilter {
    /// Build from raw query parameters. Only numeric ids can be invalid.
    pub fn from_params(
        field_id: Option<&str>,
        subfield_id: Option<&str>,
        funder_id: Option<&str>,
        topic_id: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            field_id: optional_id("field_id", field_id)?,
            subfield_id: optional_id("subfield_id", subfield_id)?,
            funder_id: optional_str(funder_id),
            topic_id: optional_str(topic_id),
        })
    }

    fn keeps(&self, r: &Record) -> bool {
        if self.field_id.is_some_and(|id| r.field_id != id)
            || self.subfield_id.is_some_and(|id| r.subfield_id != id)
            || self.funder_id.as_deref().is_some_and(|id| r.funder_id != id)
        {
            return false;
        }
        match &self.topic_id {
            None => true,
            // Malformed rows cannot be shown to contain the topic
            Some(topic_id) => r
                .topics
                .entries()
                .is_ok_and(|topics| topics.iter().any(|t| &t.topic_id == topic_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchRow {
    pub funder_id: String,
    pub funder_name: String,
    pub field_name: String,
    pub subfield_name: String,
    pub funder_works_count: u64,
    pub subfield_works_count: u64,
    pub topics: EmbeddedTopics,
}

/// Filtered rows regrouped by (funder id, funder name, field name,
/// subfield name), first value per group, in grouping-key order.
pub fn research_data(records: &[Record], filter: &ResearchFilter) -> Vec<ResearchRow> {
    let mut groups: BTreeMap<(&str, &str, &str, &str), &Record> = BTreeMap::new();
    for r in records.iter().filter(|r| filter.keeps(r)) {
        groups
            .entry((
                r.funder_id.as_str(),
                r.funder_name.as_str(),
                r.field_name.as_str(),
                r.subfield_name.as_str(),
            ))
            .or_insert(r);
    }

    groups
        .into_values()
        .map(|r| ResearchRow {
            funder_id: r.funder_id.clone(),
            funder_name: r.funder_name.clone(),
            field_name: r.field_name.clone(),
            subfield_name: r.subfield_name.clone(),
            funder_works_count: r.funder_works_count,
            subfield_works_count: r.subfield_works_count,
            topics: r.topics.clone(),
        })
        .collect()
}
