//! fundscape-openalex: builds the research-funding table from OpenAlex
//!
//! Walks field → subfield → funder → topic with grouped-count queries
//! (`/works?group_by=...`) and flattens the result into one record per
//! (field, subfield, funder).

pub mod collector;
pub mod config;
pub mod fields;
pub mod filter;
pub mod runner;
pub mod source;

pub use collector::{
    CollectStats, Collection, FETCH_DATE_FORMAT, FieldFailure, collect, collect_fields,
};
pub use config::{CollectScope, Config, DEFAULT_BASE_URL, FundingPredicate};
pub use fields::{TARGET_FIELDS, TargetField};
pub use filter::{Dimension, WorksFilter};
pub use runner::{CollectSummary, run, run_with_source};
pub use source::{GroupCount, GroupedCountSource, OpenAlexSource, SourceError, parse_group_by};
