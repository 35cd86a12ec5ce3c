//! fundscape-query: read views over the research-funding table
//!
//! Pure functions over a record slice. Parameter validation lives in
//! [`params`]; the HTTP layer maps [`QueryError`] to 400 responses.

pub mod params;
pub mod research;
pub mod views;

pub use params::{QueryError, optional_id, optional_str, required_id, required_str};
pub use research::{ResearchFilter, ResearchRow, research_data};
pub use views::{FieldSummary, FunderSummary, SubfieldSummary, fields, funders, subfields, topics};
