use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::statements::{FunctionDecl, Program, StmtKind};
use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, Warning};
use crate::scope::info::Binding;
use crate::scope::scope::{ScopeId, SymbolTable};

/// The enclosing function of a statement being checked.
#[derive(Debug, Clone)]
pub struct FunctionFrame {
    pub name: String,
    /// None means void.
    pub return_type: Option<TypeExpr>,
    /// The identifier bound to the receiver inside a method body.
    pub receiver: Option<String>,
}

/// Immutable control-flow context threaded through the walk. Entering a
/// loop or a function derives a new value rather than mutating shared
/// state, so the context can never be left unbalanced.
#[derive(Debug, Clone, Default)]
pub struct FlowContext {
    pub frame: Option<FunctionFrame>,
    pub loop_depth: u32,
}

impl FlowContext {
    pub fn in_function(frame: FunctionFrame) -> Self {
        FlowContext {
            frame: Some(frame),
            loop_depth: 0,
        }
    }

    pub fn entering_loop(&self) -> Self {
        FlowContext {
            frame: self.frame.clone(),
            loop_depth: self.loop_depth + 1,
        }
    }

    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }
}

/// The analysis pass and everything it accumulates.
pub struct SemanticAnalyzer {
    pub warnings: Vec<Warning>,
    /// Declarations synthesized during the walk: monomorphized generic
    /// functions, instantiated generic methods and concrete struct methods
    /// with their bound receiver. Lowering emits these alongside the plain
    /// functions of the unit.
    pub instantiated: Vec<Rc<FunctionDecl>>,
    /// Flat set of names known to hold a value in the current function.
    pub(super) initialized: HashSet<String>,
    /// Names initialized at the top level; every function starts from a
    /// copy of this set.
    pub(super) global_initialized: HashSet<String>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        SemanticAnalyzer::new()
    }
}

/// Runs the analysis pass over one compilation unit.
///
/// The analyzer is returned even on failure so callers can present the
/// advisories collected before the fatal diagnostic.
pub fn analyze(program: &Program, table: &mut SymbolTable) -> (SemanticAnalyzer, Option<Error>) {
    let mut analyzer = SemanticAnalyzer::new();
    let error = analyzer.run(program, table).err();
    (analyzer, error)
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        SemanticAnalyzer {
            warnings: vec![],
            instantiated: vec![],
            initialized: HashSet::new(),
            global_initialized: HashSet::new(),
        }
    }

    fn run(&mut self, program: &Program, table: &mut SymbolTable) -> Result<(), Error> {
        // Declarations are hoisted: every top-level function, extern and
        // struct is registered before any body is checked, so bodies may
        // refer forward.
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Function(decl) => self.register_function(decl, table, stmt.line)?,
                StmtKind::Extern(decl) => self.register_extern(decl, table)?,
                StmtKind::Struct(decl) => self.register_struct(decl, table)?,
                _ => {}
            }
        }

        // Top-level executable statements run in the root scope; their
        // declarations become globals.
        let root = table.root();
        let ctx = FlowContext::default();
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Function(_) | StmtKind::Extern(_) | StmtKind::Struct(_) => {}
                _ => self.check_stmt(stmt, table, root, &ctx)?,
            }
        }
        self.global_initialized = self.initialized.clone();

        // Bodies last, so they see every global.
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Function(decl) if decl.generic_params.is_empty() => {
                    self.check_function(decl, None, table)?;
                }
                StmtKind::Struct(decl) if decl.generic_params.is_empty() => {
                    self.check_struct_methods(decl, table)?;
                }
                _ => {}
            }
        }

        self.scan_unused(table, root);
        Ok(())
    }

    /// Checks one function body in a fresh scope under the root.
    ///
    /// The initialization set is swapped for the duration of the body:
    /// parameters (including a bound receiver) and top-level names start
    /// initialized, everything else must be assigned before it is read.
    pub(super) fn check_function(
        &mut self,
        decl: &FunctionDecl,
        receiver: Option<&str>,
        table: &mut SymbolTable,
    ) -> Result<(), Error> {
        let root = table.root();
        let scope = table.push_scope(root);

        let saved = std::mem::replace(&mut self.initialized, self.global_initialized.clone());

        for param in &decl.params {
            table.resolve_type_expr(&param.ty, scope, None, decl.line)?;
            table.define(
                scope,
                &param.name,
                Binding::new(param.ty.clone(), false, decl.line),
            )?;
            self.initialized.insert(param.name.clone());
        }
        if let Some(return_type) = &decl.return_type {
            table.resolve_type_expr(return_type, scope, None, decl.line)?;
        }

        let ctx = FlowContext::in_function(FunctionFrame {
            name: decl.name.clone(),
            return_type: decl.return_type.clone(),
            receiver: receiver.map(String::from),
        });
        let result = self.check_block(&decl.body, table, scope, &ctx);
        // Parameters carry usage counters like any binding; scan them too.
        self.scan_unused(table, scope);

        self.initialized = saved;
        result
    }

    /// Unused-binding advisories for one scope, emitted when the scope is
    /// left. An underscore prefix opts a name out; the receiver never
    /// counts.
    pub(super) fn scan_unused(&mut self, table: &SymbolTable, scope: ScopeId) {
        let mut unused: Vec<(String, u32)> = table
            .bindings(scope)
            .filter(|(name, binding)| {
                binding.uses == 0 && !name.starts_with('_') && name.as_str() != "this"
            })
            .map(|(name, binding)| (name.clone(), binding.line))
            .collect();
        unused.sort();
        for (name, line) in unused {
            self.warnings.push(Warning::with_hint(
                format!("unused variable `{}`", name),
                line,
                String::from("prefix the name with `_` if this is intentional"),
            ));
        }
    }

    pub(super) fn warn(&mut self, message: String, line: u32) {
        self.warnings.push(Warning::new(message, line));
    }

    pub(super) fn warn_hint(&mut self, message: String, line: u32, hint: String) {
        self.warnings.push(Warning::with_hint(message, line, hint));
    }
}
