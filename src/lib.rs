#![allow(clippy::module_inception)]

pub mod ast;
pub mod errors;
pub mod generics;
pub mod ir;
pub mod scope;
pub mod semantic;
pub mod type_checker;

extern crate regex;

use crate::ast::statements::Program;
use crate::errors::errors::{Error, ErrorTip, Warning};
use crate::ir::render::render_module;
use crate::scope::scope::SymbolTable;
use crate::semantic::semantic::analyze;

/// Runs the full semantic pipeline on an already-parsed program: analysis
/// (name/type resolution, monomorphization, validation), IR lowering and
/// textual rendering.
///
/// The symbol table may be pre-seeded with imported types and functions
/// before this call. On success the rendered IR text and the accumulated
/// advisory warnings are returned; the first fatal diagnostic aborts the
/// pipeline.
pub fn compile(program: &Program, table: &mut SymbolTable) -> Result<(String, Vec<Warning>), Error> {
    let (analyzer, error) = analyze(program, table);

    if let Some(error) = error {
        return Err(error);
    }

    let module = ir::lower::lower(program, &analyzer.instantiated, table)?;

    Ok((render_module(&module), analyzer.warnings))
}

pub fn display_error(error: &Error) {
    /*
        Error: TypeMismatch (expected `u64`, received `*u8`)
        -> line 20
    */

    if let ErrorTip::None = error.get_tip() {
        println!("Error: {}", error.get_error_name());
    } else {
        println!("Error: {} ({})", error.get_error_name(), error.get_tip());
    }
    println!("-> line {}", error.get_line());
}

pub fn display_warnings(warnings: &[Warning]) {
    for warning in warnings {
        if let Some(hint) = &warning.hint {
            println!(
                "Warning: {} ({}) -> line {}",
                warning.message, hint, warning.line
            );
        } else {
            println!("Warning: {} -> line {}", warning.message, warning.line);
        }
    }
}
