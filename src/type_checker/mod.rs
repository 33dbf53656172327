//! Pure type-level predicates and helpers.
//!
//! Nothing in this module holds state. It provides:
//!
//! - The implicit-compatibility predicate between two type references
//! - Advisory classification of implicit casts (never blocks compilation)
//! - The fixed integer size/signedness and float width tables
//! - Parsing of flattened generic type names (`"Inner<u64>"`) back into
//!   structured references, and the canonical rendering inverse

pub mod type_checker;
