//! Input syntax tree for the semantic core.
//!
//! The parser (an external collaborator) produces this tree; the semantic
//! analyzer consumes it. The module defines:
//!
//! - Unresolved type references (`TypeExpr`)
//! - Expressions (`Expr` / `ExprKind`)
//! - Statements and declarations (`Stmt` / `StmtKind`, `Program`)
//!
//! Every node carries the 1-based source line it originated from so
//! diagnostics can point back at the source.

pub mod expressions;
pub mod statements;
pub mod types;
