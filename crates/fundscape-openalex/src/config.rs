//! Collection run configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use fundscape_core::BreadthCaps;
use serde::{Deserialize, Serialize};

use crate::filter::WorksFilter;

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// How a run restricts works to funded research.
///
/// One predicate is chosen per run and applied at every traversal level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FundingPredicate {
    /// `has_grants:true` plus an inclusive `publication_year` range
    #[default]
    HasGrants,
    /// Publication date bounds only; funder grouping implies funding
    DateRange,
}

impl fmt::Display for FundingPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HasGrants => "has-grants",
            Self::DateRange => "date-range",
        })
    }
}

/// Which works a run counts: country, publication years, funding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectScope {
    pub country_code: String,
    pub start_year: u16,
    pub end_year: u16,
    pub funding: FundingPredicate,
}

impl Default for CollectScope {
    fn default() -> Self {
        Self {
            country_code: "US".to_string(),
            start_year: 1975,
            end_year: 2025,
            funding: FundingPredicate::HasGrants,
        }
    }
}

impl CollectScope {
    /// Provenance string stored on every record, e.g. `1975-2025`
    pub fn year_range(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }

    /// Run-wide predicates every query starts from.
    pub fn base_filter(&self) -> WorksFilter {
        let filter = WorksFilter::new().with(
            "authorships.institutions.country_code",
            &self.country_code,
        );
        match self.funding {
            FundingPredicate::HasGrants => filter
                .with("publication_year", self.year_range())
                .with("has_grants", true),
            FundingPredicate::DateRange => filter
                .with("from_publication_date", format!("{}-01-01", self.start_year))
                .with("to_publication_date", format!("{}-12-31", self.end_year)),
        }
    }
}

/// Runtime configuration for one collection run
#[derive(Debug, Clone)]
pub struct Config {
    /// Table destination; `.parquet` selects Parquet, anything else CSV
    pub table_path: PathBuf,
    /// zstd level for Parquet output
    pub compression_level: i32,
    pub base_url: String,
    /// Polite-pool contact address
    pub mailto: Option<String>,
    pub scope: CollectScope,
    pub caps: BreadthCaps,
    /// Request budget: `max_requests` per `per`
    pub max_requests: u32,
    pub per: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("data/usa_research_data.csv"),
            compression_level: 3,
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto: None,
            scope: CollectScope::default(),
            caps: BreadthCaps::default(),
            max_requests: 8,
            per: Duration::from_secs(1),
        }
    }
}
