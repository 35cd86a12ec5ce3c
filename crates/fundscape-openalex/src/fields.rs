//! The fixed set of top-level fields a collection run walks

/// An OpenAlex field: numeric id plus display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetField {
    pub id: u32,
    pub name: &'static str,
}

const fn field(id: u32, name: &'static str) -> TargetField {
    TargetField { id, name }
}

/// Physical-science and engineering fields, in id order.
pub static TARGET_FIELDS: [TargetField; 10] = [
    field(15, "Chemical Engineering"),
    field(16, "Chemistry"),
    field(17, "Computer Science"),
    field(19, "Earth and Planetary Sciences"),
    field(21, "Energy"),
    field(22, "Engineering"),
    field(23, "Environmental Science"),
    field(25, "Materials Science"),
    field(26, "Mathematics"),
    field(31, "Physics and Astronomy"),
];
