//! Semantic analysis.
//!
//! A single pre-order walk over the parsed tree that:
//! - registers every declaration and resolves every name and type,
//! - infers a type for every expression and validates each operation,
//! - triggers on-demand monomorphization at generic call sites,
//! - aborts on the first fatal diagnostic and accumulates advisories.
//!
//! The walk threads an immutable `FlowContext` (enclosing function frame,
//! loop depth) instead of mutating a shared context stack. Statement checks
//! live in `stmt`, expression inference in `expr`.

pub mod expr;
pub mod semantic;
pub mod stmt;
