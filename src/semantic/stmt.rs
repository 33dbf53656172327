//! Statement checks and declaration registration.

use std::rc::Rc;

use crate::ast::expressions::{Expr, ExprKind, UnaryOp};
use crate::ast::statements::{Block, ExternDecl, FunctionDecl, Param, Stmt, StmtKind, StructDecl};
use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, ErrorKind};
use crate::generics::generics::check_method_generics;
use crate::scope::info::{Binding, FunctionInfo, FunctionKind, Member, TypeInfo};
use crate::scope::scope::{align_to, ScopeId, SymbolTable};
use crate::type_checker::type_checker::{
    aliased, canonical_name, cast_warning, check_type_compatibility, is_integer,
};

use super::semantic::{FlowContext, SemanticAnalyzer};

impl SemanticAnalyzer {
    pub(super) fn check_block(
        &mut self,
        block: &Block,
        table: &mut SymbolTable,
        parent: ScopeId,
        ctx: &FlowContext,
    ) -> Result<(), Error> {
        let scope = table.push_scope(parent);
        let mut returned = false;
        let mut warned = false;
        for stmt in &block.statements {
            if returned && !warned {
                self.warn(String::from("unreachable code after return"), stmt.line);
                warned = true;
            }
            self.check_stmt(stmt, table, scope, ctx)?;
            if matches!(stmt.kind, StmtKind::Return(_)) {
                returned = true;
            }
        }
        self.scan_unused(table, scope);
        Ok(())
    }

    pub(super) fn check_stmt(
        &mut self,
        stmt: &Stmt,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<(), Error> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.infer_type(expr, table, scope, ctx)?;
                Ok(())
            }
            StmtKind::Block(block) => self.check_block(block, table, scope, ctx),
            StmtKind::Declaration {
                name,
                ty,
                value,
                constant,
            } => self.check_declaration(name, ty, value, *constant, stmt.line, table, scope, ctx),
            StmtKind::Assignment { target, value } => {
                self.check_assignment(target, value, table, scope, ctx)
            }
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.value_type(condition, table, scope, ctx)?;
                self.check_block(then_block, table, scope, ctx)?;
                if let Some(else_block) = else_block {
                    self.check_block(else_block, table, scope, ctx)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                self.value_type(condition, table, scope, ctx)?;
                self.check_block(body, table, scope, &ctx.entering_loop())
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                let value_ty = self.value_type(value, table, scope, ctx)?;
                if !is_integer(&aliased(&value_ty)) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("an integer"),
                            received: canonical_name(&value_ty),
                        },
                        stmt.line,
                    ));
                }
                for (_, block) in cases {
                    self.check_block(block, table, scope, ctx)?;
                }
                if let Some(default) = default {
                    self.check_block(default, table, scope, ctx)?;
                }
                Ok(())
            }
            StmtKind::Break => {
                if !ctx.in_loop() {
                    return Err(Error::new(ErrorKind::BreakOutsideLoop, stmt.line));
                }
                Ok(())
            }
            StmtKind::Continue => {
                if !ctx.in_loop() {
                    return Err(Error::new(ErrorKind::ContinueOutsideLoop, stmt.line));
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                self.check_return(value.as_ref(), stmt.line, table, scope, ctx)
            }
            StmtKind::Function(decl) => {
                // Nested declaration: register, then check the body right
                // away if it is not a template.
                self.register_function(decl, table, stmt.line)?;
                if decl.generic_params.is_empty() {
                    self.check_function(decl, None, table)?;
                }
                Ok(())
            }
            StmtKind::Extern(decl) => self.register_extern(decl, table),
            StmtKind::Struct(decl) => {
                self.register_struct(decl, table)?;
                if decl.generic_params.is_empty() {
                    self.check_struct_methods(decl, table)?;
                }
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_declaration(
        &mut self,
        name: &str,
        ty: &Option<TypeExpr>,
        value: &Option<Expr>,
        constant: bool,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<(), Error> {
        if constant && value.is_none() {
            return Err(Error::new(
                ErrorKind::UninitializedConst {
                    name: String::from(name),
                },
                line,
            ));
        }

        if let Some(declared) = ty {
            table.resolve_type_expr(declared, scope, None, line)?;
        }

        let value_ty = match value {
            Some(value) => Some(self.value_type(value, table, scope, ctx)?),
            None => None,
        };

        if let (Some(declared), Some(value_ty)) = (ty, &value_ty) {
            if !check_type_compatibility(declared, value_ty) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch {
                        expected: canonical_name(declared),
                        received: canonical_name(value_ty),
                    },
                    line,
                ));
            }
            if let Some(note) = cast_warning(declared, value_ty) {
                self.warn(note, line);
            }
        }

        let binding_ty = match (ty, value_ty) {
            (Some(declared), _) => declared.clone(),
            (None, Some(value_ty)) => TypeExpr {
                from_literal: false,
                ..value_ty
            },
            (None, None) => {
                return Err(Error::new(
                    ErrorKind::TypeMismatch {
                        expected: String::from("a type annotation or an initializer"),
                        received: String::from("neither"),
                    },
                    line,
                ));
            }
        };

        table.define(scope, name, Binding::new(binding_ty, constant, line))?;
        if value.is_some() {
            self.initialized.insert(String::from(name));
        }
        Ok(())
    }

    fn check_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<(), Error> {
        let target_ty = match &target.kind {
            ExprKind::Identifier(name) => {
                if let Some(frame) = &ctx.frame {
                    if frame.receiver.as_deref() == Some(name.as_str()) {
                        return Err(Error::new(ErrorKind::ReceiverReassigned, target.line));
                    }
                }
                let binding = table.resolve_for_write(scope, name).cloned().ok_or_else(|| {
                    Error::new(
                        ErrorKind::VariableNotDefined { name: name.clone() },
                        target.line,
                    )
                })?;
                if binding.constant {
                    return Err(Error::new(
                        ErrorKind::ConstReassigned { name: name.clone() },
                        target.line,
                    ));
                }
                self.initialized.insert(name.clone());
                binding.ty
            }
            ExprKind::Member { .. }
            | ExprKind::Index { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref, ..
            } => self.value_type(target, table, scope, ctx)?,
            _ => {
                return Err(Error::new(ErrorKind::InvalidAssignmentTarget, target.line));
            }
        };

        let value_ty = self.value_type(value, table, scope, ctx)?;
        if !check_type_compatibility(&target_ty, &value_ty) {
            return Err(Error::new(
                ErrorKind::TypeMismatch {
                    expected: canonical_name(&target_ty),
                    received: canonical_name(&value_ty),
                },
                value.line,
            ));
        }
        if let Some(note) = cast_warning(&target_ty, &value_ty) {
            self.warn(note, value.line);
        }
        Ok(())
    }

    fn check_return(
        &mut self,
        value: Option<&Expr>,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<(), Error> {
        let frame = match &ctx.frame {
            Some(frame) => frame.clone(),
            None => return Err(Error::new(ErrorKind::ReturnOutsideFunction, line)),
        };

        match (&frame.return_type, value) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(Error::new(
                ErrorKind::VoidFunctionReturnsValue {
                    function: frame.name,
                },
                line,
            )),
            (Some(_), None) => Err(Error::new(
                ErrorKind::MissingReturnValue {
                    function: frame.name,
                },
                line,
            )),
            (Some(expected), Some(value)) => {
                let value_ty = self.value_type(value, table, scope, ctx)?;
                if !check_type_compatibility(expected, &value_ty) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: canonical_name(expected),
                            received: canonical_name(&value_ty),
                        },
                        line,
                    ));
                }
                if let Some(note) = cast_warning(expected, &value_ty) {
                    self.warn(note, line);
                }
                Ok(())
            }
        }
    }

    pub(super) fn register_function(
        &mut self,
        decl: &Rc<FunctionDecl>,
        table: &mut SymbolTable,
        line: u32,
    ) -> Result<(), Error> {
        let kind = if decl.generic_params.is_empty() {
            FunctionKind::Plain
        } else {
            FunctionKind::GenericTemplate {
                params: decl.generic_params.clone(),
            }
        };
        table.define_function(
            FunctionInfo {
                name: decl.name.clone(),
                label: decl.name.clone(),
                params: decl
                    .params
                    .iter()
                    .map(|param| (param.name.clone(), param.ty.clone()))
                    .collect(),
                return_type: decl.return_type.clone(),
                kind,
                decl: Some(Rc::clone(decl)),
            },
            line,
        )
    }

    pub(super) fn register_extern(
        &mut self,
        decl: &ExternDecl,
        table: &mut SymbolTable,
    ) -> Result<(), Error> {
        table.define_function(
            FunctionInfo {
                name: decl.name.clone(),
                label: decl.name.clone(),
                params: decl
                    .params
                    .iter()
                    .map(|param| (param.name.clone(), param.ty.clone()))
                    .collect(),
                return_type: decl.return_type.clone(),
                kind: FunctionKind::External {
                    variadic: decl.variadic,
                    variadic_type: decl.variadic_type.clone(),
                },
                decl: None,
            },
            decl.line,
        )
    }

    /// Registers a struct declaration: generic structs become templates,
    /// concrete ones are laid out immediately (inherited members first) and
    /// their methods registered under the mangled name.
    pub(super) fn register_struct(
        &mut self,
        decl: &StructDecl,
        table: &mut SymbolTable,
    ) -> Result<(), Error> {
        check_method_generics(decl)?;

        // A struct may only contain itself behind a pointer or an array.
        for field in &decl.fields {
            if field.ty.name == decl.name
                && field.ty.pointer_depth == 0
                && field.ty.array_dims.is_empty()
            {
                return Err(Error::new(
                    ErrorKind::RecursiveStruct {
                        name: decl.name.clone(),
                    },
                    field.line,
                ));
            }
        }

        let root = table.root();
        if !decl.generic_params.is_empty() {
            table.define_type(
                TypeInfo {
                    generic_params: Some(decl.generic_params.clone()),
                    template_fields: Some(decl.fields.clone()),
                    template_methods: decl.methods.clone(),
                    parent: decl.parent.clone(),
                    defining_scope: Some(root),
                    ..TypeInfo::named(&decl.name)
                },
                decl.line,
            )?;
            return Ok(());
        }

        let mut members: Vec<Member> = vec![];
        let mut offset = 0;
        let mut max_align = 1;
        if let Some(parent) = &decl.parent {
            let parent_rc = table.resolve_type(root, parent).ok_or_else(|| {
                Error::new(
                    ErrorKind::TypeNotDefined {
                        name: parent.clone(),
                    },
                    decl.line,
                )
            })?;
            let parent_info = parent_rc.borrow();
            for member in &parent_info.members {
                offset = member.offset + member.size;
                max_align = max_align.max(member.alignment);
                members.push(member.clone());
            }
        }
        for field in &decl.fields {
            let (size, alignment) = table.size_and_align_of(&field.ty, root, field.line)?;
            offset = align_to(offset, alignment);
            members.push(Member {
                name: field.name.clone(),
                type_name: canonical_name(&field.ty),
                size,
                offset,
                alignment,
                index: members.len(),
            });
            offset += size;
            max_align = max_align.max(alignment);
        }

        table.define_type(
            TypeInfo {
                size: align_to(offset, max_align),
                alignment: max_align,
                members,
                parent: decl.parent.clone(),
                defining_scope: Some(root),
                ..TypeInfo::named(&decl.name)
            },
            decl.line,
        )?;

        for method in &decl.methods {
            let mangled = table.mangle_method(&decl.name, &method.name);
            let mut params = vec![Param {
                name: String::from("this"),
                ty: TypeExpr::pointer(&decl.name, 1),
            }];
            params.extend(method.params.iter().cloned());
            let instance = Rc::new(FunctionDecl {
                name: mangled.clone(),
                generic_params: vec![],
                params,
                return_type: method.return_type.clone(),
                body: method.body.clone(),
                line: method.line,
            });
            table.define_function(
                FunctionInfo {
                    name: mangled.clone(),
                    label: mangled,
                    params: instance
                        .params
                        .iter()
                        .map(|param| (param.name.clone(), param.ty.clone()))
                        .collect(),
                    return_type: instance.return_type.clone(),
                    kind: FunctionKind::Method {
                        receiver: decl.name.clone(),
                        original_name: method.name.clone(),
                    },
                    decl: Some(instance),
                },
                method.line,
            )?;
        }

        Ok(())
    }

    /// Checks the bodies of a concrete struct's methods and queues them for
    /// lowering.
    pub(super) fn check_struct_methods(
        &mut self,
        decl: &StructDecl,
        table: &mut SymbolTable,
    ) -> Result<(), Error> {
        for method in &decl.methods {
            let mangled = table.mangle_method(&decl.name, &method.name);
            let instance = table
                .resolve_function(&mangled)
                .and_then(|info| info.decl.clone())
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::MethodNotDefined {
                            struct_name: decl.name.clone(),
                            method: method.name.clone(),
                        },
                        method.line,
                    )
                })?;
            self.instantiated.push(Rc::clone(&instance));
            self.check_function(&instance, Some("this"), table)?;
        }
        Ok(())
    }
}
