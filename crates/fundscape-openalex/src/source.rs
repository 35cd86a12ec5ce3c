//! Grouped-count queries against the OpenAlex works endpoint
//!
//! `GET {base}/works?filter=..&group_by=<dim>&per_page=200` answers with
//! `{"group_by": [{"key", "key_display_name", "count"}, ...]}`. Keys are
//! entity URLs; only their last path segment is kept.

use std::sync::atomic::{AtomicU64, Ordering};

use fundscape_core::{HttpError, RequestBudget, RetryPolicy, Retryable, get_text, retry_with_backoff};
use serde::Deserialize;

use crate::filter::{Dimension, WorksFilter};

/// Groups per page; OpenAlex caps grouped results at 200.
const PER_PAGE: &str = "200";

/// One ranked group of a grouped-count query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    /// Short id, e.g. `1702` or `F4320332161`
    pub key: String,
    pub display_name: String,
    pub count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("invalid group_by response: {0}")]
    Decode(String),
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_retryable(),
            Self::Decode(_) => false,
        }
    }
}

/// Anything that can answer "count works matching `filter`, grouped by
/// `dimension`", ranked by count descending.
pub trait GroupedCountSource {
    fn group_by(
        &self,
        filter: &WorksFilter,
        dimension: Dimension,
    ) -> Result<Vec<GroupCount>, SourceError>;
}

/// Live OpenAlex client, paced by a request budget and retried with backoff.
pub struct OpenAlexSource {
    works_url: String,
    mailto: Option<String>,
    budget: RequestBudget,
    retry: RetryPolicy,
    requests: AtomicU64,
}

impl OpenAlexSource {
    pub fn new(base_url: &str, mailto: Option<String>, budget: RequestBudget, retry: RetryPolicy) -> Self {
        log::debug!(
            "OpenAlex budget: {} requests per {:?}, {} retries",
            budget.max_requests(),
            budget.per(),
            retry.max_retries
        );
        Self {
            works_url: format!("{}/works", base_url.trim_end_matches('/')),
            mailto: mailto.filter(|m| !m.is_empty()),
            budget,
            retry,
            requests: AtomicU64::new(0),
        }
    }

    /// HTTP requests issued so far, retries included
    pub fn requests_sent(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn fetch(&self, filter: &str, dimension: Dimension) -> Result<String, SourceError> {
        self.budget.acquire();
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut query = vec![
            ("filter", filter),
            ("group_by", dimension.as_str()),
            ("per_page", PER_PAGE),
        ];
        if let Some(mailto) = &self.mailto {
            query.push(("mailto", mailto.as_str()));
        }
        Ok(get_text(&self.works_url, &query)?)
    }
}

impl GroupedCountSource for OpenAlexSource {
    fn group_by(
        &self,
        filter: &WorksFilter,
        dimension: Dimension,
    ) -> Result<Vec<GroupCount>, SourceError> {
        let filter = filter.render();
        log::debug!("group_by {dimension} filter={filter}");
        let label = format!("group_by {dimension}");
        let body = retry_with_backoff(&label, self.retry, || self.fetch(&filter, dimension))?;
        parse_group_by(&body)
    }
}

#[derive(Deserialize)]
struct GroupByResponse {
    group_by: Vec<RawGroup>,
}

#[derive(Deserialize)]
struct RawGroup {
    key: String,
    key_display_name: Option<String>,
    count: u64,
}

/// Last path segment of an OpenAlex entity URL (`.../subfields/1702` → `1702`).
pub fn short_id(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

/// Decode a grouped-count response, ranked by count descending.
///
/// Groups with an empty key are dropped. Equal counts keep response order.
pub fn parse_group_by(body: &str) -> Result<Vec<GroupCount>, SourceError> {
    let response: GroupByResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    let mut groups: Vec<GroupCount> = response
        .group_by
        .into_iter()
        .filter_map(|g| {
            let key = short_id(&g.key).to_string();
            if key.is_empty() {
                return None;
            }
            let display_name = g.key_display_name.unwrap_or_else(|| key.clone());
            Some(GroupCount {
                key,
                display_name,
                count: g.count,
            })
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_takes_last_segment() {
        assert_eq!(short_id("https://openalex.org/subfields/1702"), "1702");
        assert_eq!(short_id("https://openalex.org/F4320332161"), "F4320332161");
        assert_eq!(short_id("T10978"), "T10978");
    }

    #[test]
    fn parse_and_rank() {
        let body = r#"{
            "meta": {"count": 3},
            "group_by": [
                {"key": "https://openalex.org/subfields/1705", "key_display_name": "Computer Networks", "count": 10},
                {"key": "https://openalex.org/subfields/1702", "key_display_name": "Artificial Intelligence", "count": 90},
                {"key": "https://openalex.org/subfields/1710", "key_display_name": "Information Systems", "count": 10}
            ]
        }"#;
        let groups = parse_group_by(body).unwrap();
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, ["1702", "1705", "1710"]);
        assert_eq!(groups[0].display_name, "Artificial Intelligence");
        assert_eq!(groups[0].count, 90);
    }

    #[test]
    fn missing_display_name_falls_back_to_key() {
        let body = r#"{"group_by": [{"key": "https://openalex.org/F1", "key_display_name": null, "count": 3}]}"#;
        assert_eq!(parse_group_by(body).unwrap()[0].display_name, "F1");
    }

    #[test]
    fn empty_key_is_dropped() {
        let body = r#"{"group_by": [{"key": "", "key_display_name": "unknown", "count": 3}]}"#;
        assert!(parse_group_by(body).unwrap().is_empty());
    }

    #[test]
    fn bad_body_is_decode_error() {
        let err = parse_group_by("<html>").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_errors_keep_retryability() {
        let err = SourceError::from(HttpError::Status {
            status: 503,
            message: "unavailable".into(),
        });
        assert!(err.is_retryable());
        let err = SourceError::from(HttpError::Status {
            status: 400,
            message: "bad filter".into(),
        });
        assert!(!err.is_retryable());
    }

    #[test]
    fn works_url_trims_slash() {
        let source = OpenAlexSource::new(
            "https://api.openalex.org/",
            Some(String::new()),
            RequestBudget::unlimited(),
            RetryPolicy::none(),
        );
        assert_eq!(source.works_url, "https://api.openalex.org/works");
        assert!(source.mailto.is_none());
        assert_eq!(source.requests_sent(), 0);
    }
}
