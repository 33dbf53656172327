//! Symbol table and resolved program information.
//!
//! Scopes live in an arena indexed by opaque ids. Variable bindings are
//! scope-local; the type and function namespaces are global to the
//! compilation unit and live on the arena itself, together with the
//! generic-instantiation cache (keyed by canonical instantiation names).
//!
//! The module also owns C-style struct layout: field offsets, padding and
//! total size are computed here when a struct is declared or a generic
//! struct is instantiated.

pub mod info;
pub mod scope;

#[cfg(test)]
mod tests;
