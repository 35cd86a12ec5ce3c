//! Breadth caps for the field → subfield → funder → topic hierarchy.
//!
//! The same caps bound what the collector keeps per level and what the
//! subfield, funder and topic views return.

/// Maximum number of groups retained per hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreadthCaps {
    /// Subfields kept per field
    pub subfields: usize,
    /// Funders kept per subfield
    pub funders: usize,
    /// Topics kept per (subfield, funder) pair
    pub topics: usize,
}

impl BreadthCaps {
    pub const DEFAULT: Self = Self {
        subfields: 20,
        funders: 20,
        topics: 10,
    };
}

impl Default for BreadthCaps {
    fn default() -> Self {
        Self::DEFAULT
    }
}
