//! Field → subfield → funder → topic traversal
//!
//! One grouped-count query per level, capped per level, flattened into one
//! record per (field, subfield, funder) leaf. A failing field is logged and
//! skipped; the run continues with the next one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fundscape_core::{BreadthCaps, ProgressContext};
use fundscape_store::{Record, TopicEntry};

use crate::config::CollectScope;
use crate::fields::{TARGET_FIELDS, TargetField};
use crate::filter::{Dimension, WorksFilter};
use crate::source::{GroupCount, GroupedCountSource, SourceError};

/// Format of the `fetch_date` provenance column
pub const FETCH_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A field that was skipped because a query under it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field_id: u32,
    pub field_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub fields_total: usize,
    pub fields_done: usize,
    /// Grouped-count queries issued (retries not counted)
    pub queries: u64,
    pub duplicates_dropped: usize,
    pub elapsed: Duration,
}

/// Output of a traversal.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: Vec<Record>,
    pub failed_fields: Vec<FieldFailure>,
    pub stats: CollectStats,
    /// Stopped early on a shutdown request
    pub interrupted: bool,
}

/// Shared per-run state threaded through the traversal
struct Walk<'a, S: ?Sized> {
    source: &'a S,
    scope: &'a CollectScope,
    caps: BreadthCaps,
    base: WorksFilter,
    fetch_date: String,
    year_range: String,
    queries: u64,
}

impl<S: GroupedCountSource + ?Sized> Walk<'_, S> {
    fn query(
        &mut self,
        filter: &WorksFilter,
        dimension: Dimension,
        cap: usize,
    ) -> Result<Vec<GroupCount>, SourceError> {
        self.queries += 1;
        let mut groups = self.source.group_by(filter, dimension)?;
        groups.truncate(cap);
        Ok(groups)
    }

    fn field(
        &mut self,
        field: &TargetField,
        stage: &indicatif::ProgressBar,
    ) -> Result<Vec<Record>, SourceError> {
        let field_filter = self.base.clone().with("topics.field.id", field.id);
        let subfields = self.query(&field_filter, Dimension::Subfield, self.caps.subfields)?;
        if subfields.is_empty() {
            log::warn!("no subfields found for {} ({})", field.name, field.id);
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for subfield in &subfields {
            let Ok(subfield_id) = subfield.key.parse::<u32>() else {
                log::warn!("skipping subfield with non-numeric id {:?}", subfield.key);
                continue;
            };
            log::debug!(
                "  subfield {} ({} works)",
                subfield.display_name,
                subfield.count
            );
            stage.set_message(format!("{} / {}", field.name, subfield.display_name));

            let subfield_filter = self.base.clone().with("topics.subfield.id", subfield_id);
            let funders = self.query(&subfield_filter, Dimension::Funder, self.caps.funders)?;

            for funder in funders {
                let topic_filter = subfield_filter.clone().with("grants.funder", &funder.key);
                let topics = self
                    .query(&topic_filter, Dimension::Topic, self.caps.topics)?
                    .into_iter()
                    .map(|t| TopicEntry {
                        topic_id: t.key,
                        topic_name: t.display_name,
                        topic_works_count: t.count,
                    })
                    .collect::<Vec<_>>();
                log::debug!(
                    "    funder {} ({} works, {} topics)",
                    funder.display_name,
                    funder.count,
                    topics.len()
                );

                records.push(Record {
                    field_id: field.id,
                    field_name: field.name.to_string(),
                    subfield_id,
                    subfield_name: subfield.display_name.clone(),
                    subfield_works_count: subfield.count,
                    funder_id: funder.key,
                    funder_name: funder.display_name,
                    funder_works_count: funder.count,
                    topics: topics.into(),
                    fetch_date: self.fetch_date.clone(),
                    country_code: self.scope.country_code.clone(),
                    year_range: self.year_range.clone(),
                });
            }
        }
        Ok(records)
    }
}

/// Walk every target field.
pub fn collect<S: GroupedCountSource + ?Sized>(
    source: &S,
    scope: &CollectScope,
    caps: BreadthCaps,
    stop: &AtomicBool,
    progress: &ProgressContext,
) -> Collection {
    collect_fields(source, &TARGET_FIELDS, scope, caps, stop, progress)
}

/// Walk the given fields in order.
///
/// `stop` is checked before each field; once set, the walk ends and the
/// collection is marked interrupted. Pass
/// [`shutdown_flag`](fundscape_core::shutdown_flag) to stop on SIGINT/SIGTERM.
pub fn collect_fields<S: GroupedCountSource + ?Sized>(
    source: &S,
    fields: &[TargetField],
    scope: &CollectScope,
    caps: BreadthCaps,
    stop: &AtomicBool,
    progress: &ProgressContext,
) -> Collection {
    let start = Instant::now();
    let mut walk = Walk {
        source,
        scope,
        caps,
        base: scope.base_filter(),
        fetch_date: chrono::Local::now().format(FETCH_DATE_FORMAT).to_string(),
        year_range: scope.year_range(),
        queries: 0,
    };

    let bar = progress.count_bar("fields", fields.len() as u64);
    let stage = progress.stage_line("query");
    let mut out = Collection::default();
    let mut seen: HashSet<(u32, u32, String)> = HashSet::new();

    for field in fields {
        if stop.load(Ordering::Relaxed) {
            log::warn!("shutdown requested, stopping before {}", field.name);
            out.interrupted = true;
            break;
        }
        log::info!("processing field {} ({})", field.name, field.id);
        bar.set_message(field.name);

        match walk.field(field, &stage) {
            Ok(records) => {
                let before = out.records.len();
                for record in records {
                    let key = (record.field_id, record.subfield_id, record.funder_id.clone());
                    if seen.insert(key) {
                        out.records.push(record);
                    } else {
                        out.stats.duplicates_dropped += 1;
                    }
                }
                out.stats.fields_done += 1;
                log::info!(
                    "  {}: {} records",
                    field.name,
                    out.records.len() - before
                );
            }
            Err(e) => {
                log::error!("error processing {}: {e}", field.name);
                out.failed_fields.push(FieldFailure {
                    field_id: field.id,
                    field_name: field.name.to_string(),
                    error: e.to_string(),
                });
            }
        }
        bar.inc(1);
    }

    stage.finish_and_clear();
    bar.finish_and_clear();
    out.stats.fields_total = fields.len();
    out.stats.queries = walk.queries;
    out.stats.elapsed = start.elapsed();
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::FundingPredicate;
    use fundscape_core::HttpError;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory source keyed by (dimension, parent id).
    ///
    /// The parent id is the most specific filter value: field id for
    /// subfields, subfield id for funders, funder id for topics.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        groups: HashMap<(Dimension, String), Vec<GroupCount>>,
        fail_fields: HashSet<String>,
        pub(crate) calls: RefCell<Vec<(Dimension, String)>>,
    }

    fn group(key: &str, count: u64) -> GroupCount {
        GroupCount {
            key: key.to_string(),
            display_name: format!("Name {key}"),
            count,
        }
    }

    impl FakeSource {
        pub(crate) fn add(mut self, dim: Dimension, parent: &str, groups: &[(&str, u64)]) -> Self {
            self.groups.insert(
                (dim, parent.to_string()),
                groups.iter().map(|(k, c)| group(k, *c)).collect(),
            );
            self
        }

        fn fail_field(mut self, field: &str) -> Self {
            self.fail_fields.insert(field.to_string());
            self
        }
    }

    impl GroupedCountSource for FakeSource {
        fn group_by(
            &self,
            filter: &WorksFilter,
            dimension: Dimension,
        ) -> Result<Vec<GroupCount>, SourceError> {
            let parent = match dimension {
                Dimension::Subfield => filter.get("topics.field.id"),
                Dimension::Funder => filter.get("topics.subfield.id"),
                Dimension::Topic => filter.get("grants.funder"),
            }
            .unwrap_or_default()
            .to_string();
            self.calls.borrow_mut().push((dimension, filter.render()));
            if dimension == Dimension::Subfield && self.fail_fields.contains(&parent) {
                return Err(SourceError::Http(HttpError::Status {
                    status: 500,
                    message: "boom".into(),
                }));
            }
            Ok(self
                .groups
                .get(&(dimension, parent))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn cs() -> TargetField {
        TargetField {
            id: 17,
            name: "Computer Science",
        }
    }

    fn math() -> TargetField {
        TargetField {
            id: 26,
            name: "Mathematics",
        }
    }

    fn quiet() -> ProgressContext {
        ProgressContext::with_tty(false)
    }

    fn cs_source() -> FakeSource {
        FakeSource::default()
            .add(Dimension::Subfield, "17", &[("1702", 900), ("1705", 400)])
            .add(Dimension::Funder, "1702", &[("F1", 300), ("F2", 200)])
            .add(Dimension::Funder, "1705", &[("F1", 50)])
            .add(Dimension::Topic, "F1", &[("T1", 40), ("T2", 20)])
            .add(Dimension::Topic, "F2", &[("T3", 10)])
    }

    #[test]
    fn one_record_per_leaf() {
        let source = cs_source();
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());

        assert!(out.failed_fields.is_empty());
        assert!(!out.interrupted);
        let leaves: Vec<(u32, u32, &str)> = out.records.iter().map(|r| r.leaf_key()).collect();
        assert_eq!(
            leaves,
            [(17, 1702, "F1"), (17, 1702, "F2"), (17, 1705, "F1")]
        );

        let r = &out.records[0];
        assert_eq!(r.field_name, "Computer Science");
        assert_eq!(r.subfield_works_count, 900);
        assert_eq!(r.funder_works_count, 300);
        assert_eq!(r.topics.entries().unwrap().len(), 2);
        assert_eq!(r.country_code, "US");
        assert_eq!(r.year_range, "1975-2025");
        // 1 subfield query + 2 funder queries + 3 topic queries
        assert_eq!(out.stats.queries, 6);
    }

    #[test]
    fn caps_bound_every_level() {
        let source = FakeSource::default()
            .add(Dimension::Subfield, "17", &[("1702", 9), ("1705", 8), ("1710", 7)])
            .add(Dimension::Funder, "1702", &[("F1", 5), ("F2", 4), ("F3", 3)])
            .add(Dimension::Funder, "1705", &[("F1", 5), ("F2", 4), ("F3", 3)])
            .add(Dimension::Topic, "F1", &[("T1", 3), ("T2", 2), ("T3", 1)]);
        let caps = BreadthCaps {
            subfields: 2,
            funders: 1,
            topics: 2,
        };
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), caps, &AtomicBool::new(false), &quiet());

        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.funder_id == "F1"));
        assert!(out.records.iter().all(|r| r.topics.entries().unwrap().len() == 2));
    }

    #[test]
    fn failing_field_is_skipped() {
        let source = cs_source()
            .add(Dimension::Subfield, "26", &[("2604", 100)])
            .add(Dimension::Funder, "2604", &[("F9", 10)])
            .fail_field("17");
        let out = collect_fields(&source, &[cs(), math()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());

        assert_eq!(out.failed_fields.len(), 1);
        assert_eq!(out.failed_fields[0].field_id, 17);
        assert!(out.failed_fields[0].error.contains("500"));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].field_id, 26);
        assert_eq!(out.stats.fields_done, 1);
        assert_eq!(out.stats.fields_total, 2);
    }

    #[test]
    fn field_without_subfields_yields_nothing() {
        let source = FakeSource::default();
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());
        assert!(out.records.is_empty());
        assert!(out.failed_fields.is_empty());
        assert_eq!(out.stats.fields_done, 1);
    }

    #[test]
    fn repeated_funder_leaf_is_dropped() {
        let source = FakeSource::default()
            .add(Dimension::Subfield, "17", &[("1702", 900)])
            .add(Dimension::Funder, "1702", &[("F1", 300), ("F1", 300)]);
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.duplicates_dropped, 1);
    }

    #[test]
    fn funding_predicate_reaches_every_level() {
        let source = cs_source();
        let scope = CollectScope {
            funding: FundingPredicate::DateRange,
            ..CollectScope::default()
        };
        collect_fields(&source, &[cs()], &scope, BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());

        let calls = source.calls.borrow();
        assert!(calls.iter().any(|(d, _)| *d == Dimension::Topic));
        for (_, filter) in calls.iter() {
            assert!(filter.contains("from_publication_date:1975-01-01"));
            assert!(filter.contains("authorships.institutions.country_code:US"));
            assert!(!filter.contains("has_grants"));
        }
    }

    #[test]
    fn topic_query_narrows_by_subfield_and_funder() {
        let source = cs_source();
        collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());

        let calls = source.calls.borrow();
        let (_, filter) = calls
            .iter()
            .find(|(d, _)| *d == Dimension::Topic)
            .unwrap();
        assert!(filter.contains("topics.subfield.id:1702"));
        assert!(filter.contains("grants.funder:F1"));
        assert!(filter.contains("has_grants:true"));
        assert!(!filter.contains("topics.field.id"));
    }

    /// Raises `stop` on its first query, like a signal arriving mid-field.
    pub(crate) struct StopDuringFirstField<'a> {
        pub(crate) inner: FakeSource,
        pub(crate) stop: &'a AtomicBool,
    }

    impl GroupedCountSource for StopDuringFirstField<'_> {
        fn group_by(
            &self,
            filter: &WorksFilter,
            dimension: Dimension,
        ) -> Result<Vec<GroupCount>, SourceError> {
            self.stop.store(true, Ordering::Relaxed);
            self.inner.group_by(filter, dimension)
        }
    }

    #[test]
    fn stop_ends_walk_before_next_field() {
        let stop = AtomicBool::new(false);
        let source = StopDuringFirstField {
            inner: cs_source()
                .add(Dimension::Subfield, "26", &[("2604", 100)])
                .add(Dimension::Funder, "2604", &[("F9", 10)]),
            stop: &stop,
        };
        let out = collect_fields(&source, &[cs(), math()], &CollectScope::default(), BreadthCaps::DEFAULT, &stop, &quiet());

        assert!(out.interrupted);
        // The field in flight finishes; the next one is never queried
        assert_eq!(out.stats.fields_done, 1);
        assert_eq!(out.records.len(), 3);
        assert!(out.records.iter().all(|r| r.field_id == 17));
        let calls = source.inner.calls.borrow();
        assert!(calls.iter().all(|(_, filter)| !filter.contains("topics.field.id:26")));
    }

    #[test]
    fn stop_set_up_front_walks_nothing() {
        let source = cs_source();
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(true), &quiet());
        assert!(out.interrupted);
        assert!(out.records.is_empty());
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn fetch_date_is_shared_by_all_records() {
        let source = cs_source();
        let out = collect_fields(&source, &[cs()], &CollectScope::default(), BreadthCaps::DEFAULT, &AtomicBool::new(false), &quiet());
        let first = &out.records[0].fetch_date;
        assert_eq!(first.len(), "2025-06-01 12:00:00".len());
        assert!(out.records.iter().all(|r| &r.fetch_date == first));
    }
}
