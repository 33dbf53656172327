//! On-demand monomorphization of generic functions and struct methods.
//!
//! Templates are registered once with their parameter names and unresolved
//! bodies; the first concrete use substitutes every parameter occurrence,
//! clones the declaration under a canonical mangled name and registers it
//! exactly once. Repeated requests for the same mangled name return the
//! existing instance, so unused generic declarations never reach code
//! generation.

pub mod generics;

#[cfg(test)]
mod tests;
