//! Re-aggregated views over one table snapshot
//!
//! Each view groups into a key-ordered map first and then stable-sorts by its
//! ranking column, so ties come out in ascending key order.

use std::collections::{BTreeMap, HashMap, HashSet};

use fundscape_store::{Record, TopicEntry};
use serde::Serialize;

/// One top-level field with totals over all its rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub id: u32,
    pub name: String,
    /// Sum of `subfield_works_count` over the field's rows
    pub total_works: u64,
    /// Sum of `funder_works_count` over the field's rows
    pub total_funder_works: u64,
    /// Distinct funders under the field
    pub total_funders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubfieldSummary {
    pub id: u32,
    pub name: String,
    pub works_count: u64,
    /// Distinct funders for this subfield within the requested field
    pub funder_count: usize,
    /// Distinct funders for this subfield across all fields
    pub total_funders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunderSummary {
    pub id: String,
    pub name: String,
    pub works_count: u64,
}

/// All fields, ordered by name.
pub fn fields(records: &[Record]) -> Vec<FieldSummary> {
    #[derive(Default)]
    struct Acc<'a> {
        works: u64,
        funder_works: u64,
        funders: HashSet<&'a str>,
    }

    let mut groups: BTreeMap<(u32, &str), Acc> = BTreeMap::new();
    for r in records {
        let acc = groups.entry((r.field_id, r.field_name.as_str())).or_default();
        acc.works += r.subfield_works_count;
        acc.funder_works += r.funder_works_count;
        acc.funders.insert(&r.funder_id);
    }

    let mut out: Vec<FieldSummary> = groups
        .into_iter()
        .map(|((id, name), acc)| FieldSummary {
            id,
            name: name.to_string(),
            total_works: acc.works,
            total_funder_works: acc.funder_works,
            total_funders: acc.funders.len(),
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Subfields of one field, ranked by distinct funder count.
pub fn subfields(records: &[Record], field_id: u32, limit: usize) -> Vec<SubfieldSummary> {
    let mut totals: HashMap<u32, HashSet<&str>> = HashMap::new();
    for r in records {
        totals.entry(r.subfield_id).or_default().insert(&r.funder_id);
    }

    let mut groups: BTreeMap<(u32, &str), (u64, HashSet<&str>)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.field_id == field_id) {
        let (_, funders) = groups
            .entry((r.subfield_id, r.subfield_name.as_str()))
            .or_insert_with(|| (r.subfield_works_count, HashSet::new()));
        funders.insert(&r.funder_id);
    }

    let mut out: Vec<SubfieldSummary> = groups
        .into_iter()
        .map(|((id, name), (works_count, funders))| SubfieldSummary {
            id,
            name: name.to_string(),
            works_count,
            funder_count: funders.len(),
            total_funders: totals.get(&id).map_or(0, HashSet::len),
        })
        .collect();
    out.sort_by(|a, b| b.funder_count.cmp(&a.funder_count));
    out.truncate(limit);
    out
}

/// Funders of one subfield, ranked by works count. Ids are unique; the
/// first row seen for a funder supplies its name and count.
pub fn funders(records: &[Record], subfield_id: u32, limit: usize) -> Vec<FunderSummary> {
    let mut groups: BTreeMap<&str, (&str, u64)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.subfield_id == subfield_id) {
        groups
            .entry(r.funder_id.as_str())
            .or_insert((r.funder_name.as_str(), r.funder_works_count));
    }

    let mut out: Vec<FunderSummary> = groups
        .into_iter()
        .map(|(id, (name, works_count))| FunderSummary {
            id: id.to_string(),
            name: name.to_string(),
            works_count,
        })
        .collect();
    out.sort_by(|a, b| b.works_count.cmp(&a.works_count));
    out.truncate(limit);
    out
}

/// Topics of one (funder, subfield) pair, deduplicated by id keeping the
/// higher count, ranked by count.
///
/// Rows with malformed topics contribute nothing.
pub fn topics(records: &[Record], funder_id: &str, subfield_id: u32, limit: usize) -> Vec<TopicEntry> {
    let mut best: BTreeMap<&str, &TopicEntry> = BTreeMap::new();
    for r in records
        .iter()
        .filter(|r| r.subfield_id == subfield_id && r.funder_id == funder_id)
    {
        let entries = match r.topics.entries() {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!(
                    "skipping topics of ({}, {}, {}): {e}",
                    r.field_id,
                    r.subfield_id,
                    r.funder_id
                );
                continue;
            }
        };
        for topic in entries {
            best.entry(topic.topic_id.as_str())
                .and_modify(|kept| {
                    if topic.topic_works_count > kept.topic_works_count {
                        *kept = topic;
                    }
                })
                .or_insert(topic);
        }
    }

    let mut out: Vec<TopicEntry> = best.into_values().cloned().collect();
    out.sort_by(|a, b| b.topic_works_count.cmp(&a.topic_works_count));
    out.truncate(limit);
    out
}
