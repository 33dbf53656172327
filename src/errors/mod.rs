//! Diagnostics for the semantic core.
//!
//! Two tiers of diagnostics exist:
//!
//! - Fatal errors (`Error`) abort the analysis walk immediately and are
//!   reported once at the top level with a message and an optional tip
//! - Advisory warnings (`Warning`) accumulate during the walk and are
//!   returned to the caller after the pass completes
//!
//! There is no recovery within one compilation unit; the caller re-invokes
//! the pipeline on a corrected source.

pub mod errors;
