//! The typed intermediate representation.
//!
//! Lowering consumes the validated tree plus the populated symbol table and
//! produces a `Module`: struct type declarations, globals and functions made
//! of labeled basic blocks with explicit terminators. The renderer turns a
//! module into the LLVM-flavoured textual form consumed by the downstream
//! toolchain.

pub mod ir;
pub mod lower;
pub mod render;

#[cfg(test)]
mod tests;
