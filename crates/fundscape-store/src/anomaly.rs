//! Count-consistency report
//!
//! Counts come from independent grouped queries, so the source can hand back
//! a funder count above its subfield count, or a different subfield count for
//! the same subfield on another request. These are reported, never rejected.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CountAnomaly {
    /// A funder reports more works than the subfield it was found under.
    FunderExceedsSubfield {
        field_id: u32,
        subfield_id: u32,
        funder_id: String,
        funder_works_count: u64,
        subfield_works_count: u64,
    },
    /// Rows of one (field, subfield) pair disagree on the subfield count.
    SubfieldCountMismatch {
        field_id: u32,
        subfield_id: u32,
        counts: Vec<u64>,
    },
}

impl fmt::Display for CountAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FunderExceedsSubfield {
                field_id,
                subfield_id,
                funder_id,
                funder_works_count,
                subfield_works_count,
            } => write!(
                f,
                "field {field_id} subfield {subfield_id}: funder {funder_id} has \
                 {funder_works_count} works, subfield only {subfield_works_count}"
            ),
            Self::SubfieldCountMismatch {
                field_id,
                subfield_id,
                counts,
            } => write!(
                f,
                "field {field_id} subfield {subfield_id}: inconsistent subfield counts {counts:?}"
            ),
        }
    }
}

/// List count inconsistencies, ordered by (field, subfield).
pub fn find_count_anomalies(records: &[Record]) -> Vec<CountAnomaly> {
    let mut by_subfield: BTreeMap<(u32, u32), Vec<&Record>> = BTreeMap::new();
    for r in records {
        by_subfield
            .entry((r.field_id, r.subfield_id))
            .or_default()
            .push(r);
    }

    let mut out = Vec::new();
    for ((field_id, subfield_id), rows) in by_subfield {
        let mut counts: Vec<u64> = rows.iter().map(|r| r.subfield_works_count).collect();
        counts.sort_unstable();
        counts.dedup();
        if counts.len() > 1 {
            out.push(CountAnomaly::SubfieldCountMismatch {
                field_id,
                subfield_id,
                counts,
            });
        }

        for r in rows {
            if r.funder_works_count > r.subfield_works_count {
                out.push(CountAnomaly::FunderExceedsSubfield {
                    field_id,
                    subfield_id,
                    funder_id: r.funder_id.clone(),
                    funder_works_count: r.funder_works_count,
                    subfield_works_count: r.subfield_works_count,
                });
            }
        }
    }
    out
}
