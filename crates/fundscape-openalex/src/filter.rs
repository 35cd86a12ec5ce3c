//! Works filter builder and grouping dimensions for OpenAlex queries

use std::fmt;

/// Grouping dimension of a grouped-count query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Subfield,
    Funder,
    Topic,
}

impl Dimension {
    /// Value of the `group_by` query parameter
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subfield => "topics.subfield.id",
            Self::Funder => "grants.funder",
            Self::Topic => "topics.id",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of `key:value` filter predicates.
///
/// Every level of the traversal starts from the same base filter and
/// narrows it with [`WorksFilter::with`], so run-wide predicates apply
/// identically everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorksFilter {
    predicates: Vec<(String, String)>,
}

impl WorksFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate, replacing any earlier value for the same key.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.predicates.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.predicates.push((key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.predicates
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Value of the `filter` query parameter: `k:v,k:v`
    pub fn render(&self) -> String {
        self.predicates
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for WorksFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
