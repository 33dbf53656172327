//! Expression inference and validation.
//!
//! `infer_type` walks every expression kind, resolving names through the
//! symbol table, enforcing the compatibility rules, running the
//! undefined-behavior checks for shifts, modulo and pointer arithmetic, and
//! triggering lazy monomorphization at generic call and method-call sites.

use std::rc::Rc;

use crate::ast::expressions::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, ErrorKind};
use crate::generics::generics::{instantiate_struct_method, monomorphize_function};
use crate::scope::info::FunctionInfo;
use crate::scope::scope::{ScopeId, SymbolTable};
use crate::type_checker::type_checker::{
    aliased, canonical_name, cast_warning, check_type_compatibility, int_info, is_float,
    is_integer, is_numeric, parse_type_name,
};

use super::semantic::{FlowContext, SemanticAnalyzer};

/// Best-effort compile-time folding of an integer expression. `None` means
/// the value is only known at runtime.
pub fn fold_constant(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Int(value) => Some(*value),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => fold_constant(operand)?.checked_neg(),
        ExprKind::Binary { op, left, right } => {
            let left = fold_constant(left)?;
            let right = fold_constant(right)?;
            match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Sub => left.checked_sub(right),
                BinaryOp::Mul => left.checked_mul(right),
                BinaryOp::Div if right != 0 => left.checked_div(right),
                BinaryOp::Mod if right != 0 => left.checked_rem(right),
                BinaryOp::Shl if (0..64).contains(&right) => left.checked_shl(right as u32),
                BinaryOp::Shr if (0..64).contains(&right) => left.checked_shr(right as u32),
                BinaryOp::BitAnd => Some(left & right),
                BinaryOp::BitOr => Some(left | right),
                BinaryOp::BitXor => Some(left ^ right),
                _ => None,
            }
        }
        _ => None,
    }
}

impl SemanticAnalyzer {
    /// Infers the type of an expression, validating it as a side effect.
    /// `None` means void (a call to a function without a return type).
    pub fn infer_type(
        &mut self,
        expr: &Expr,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        match &expr.kind {
            ExprKind::Int(_) => Ok(Some(TypeExpr::literal("u64"))),
            ExprKind::Float(_) => Ok(Some(TypeExpr::literal("f64"))),
            ExprKind::Str(_) => Ok(Some(TypeExpr::literal("string"))),
            ExprKind::Bool(_) => Ok(Some(TypeExpr::literal("u8"))),
            ExprKind::ArrayLiteral(elements) => {
                self.check_array_literal(elements, table, scope, ctx)
            }
            ExprKind::Identifier(name) => {
                match table.resolve(scope, name) {
                    Some(binding) => {
                        if !self.initialized.contains(name.as_str()) {
                            self.warn_hint(
                                format!("variable `{}` may be used before initialization", name),
                                expr.line,
                                String::from("assign it a value before this read"),
                            );
                        }
                        Ok(Some(binding.ty))
                    }
                    None => Err(Error::new(
                        ErrorKind::VariableNotDefined { name: name.clone() },
                        expr.line,
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => {
                self.check_binary(*op, left, right, expr.line, table, scope, ctx)
            }
            ExprKind::Unary { op, operand } => {
                self.check_unary(*op, operand, expr.line, table, scope, ctx)
            }
            ExprKind::Index { target, index } => {
                let target_ty = aliased(&self.value_type(target, table, scope, ctx)?);
                let index_ty = self.value_type(index, table, scope, ctx)?;
                if !is_integer(&aliased(&index_ty)) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("an integer index"),
                            received: canonical_name(&index_ty),
                        },
                        index.line,
                    ));
                }
                if target_ty.is_array() || target_ty.is_pointer() {
                    Ok(Some(target_ty.element()))
                } else {
                    Err(Error::new(
                        ErrorKind::NotIndexable {
                            type_name: canonical_name(&target_ty),
                        },
                        expr.line,
                    ))
                }
            }
            ExprKind::Member { target, member } => {
                self.check_member(target, member, expr.line, table, scope, ctx)
            }
            ExprKind::Call {
                name,
                generic_args,
                args,
            } => self.check_call(name, generic_args, args, expr.line, table, scope, ctx),
            ExprKind::MethodCall {
                target,
                method,
                args,
            } => self.check_method_call(target, method, args, expr.line, table, scope, ctx),
            ExprKind::StructInit { ty, fields } => {
                self.check_struct_init(ty, fields, expr.line, table, scope, ctx)
            }
            ExprKind::Cast { target, value } => {
                self.value_type(value, table, scope, ctx)?;
                table.resolve_type_expr(target, scope, None, expr.line)?;
                Ok(Some(target.clone()))
            }
        }
    }

    /// Infers a type and rejects void expressions.
    pub(super) fn value_type(
        &mut self,
        expr: &Expr,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<TypeExpr, Error> {
        match self.infer_type(expr, table, scope, ctx)? {
            Some(ty) => Ok(ty),
            None => Err(Error::new(
                ErrorKind::TypeMismatch {
                    expected: String::from("a value"),
                    received: String::from("void"),
                },
                expr.line,
            )),
        }
    }

    fn check_array_literal(
        &mut self,
        elements: &[Expr],
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let first = match elements.first() {
            Some(first) => self.value_type(first, table, scope, ctx)?,
            None => TypeExpr::literal("u64"),
        };
        for element in elements.iter().skip(1) {
            let element_ty = self.value_type(element, table, scope, ctx)?;
            if !check_type_compatibility(&first, &element_ty)
                && !check_type_compatibility(&element_ty, &first)
            {
                return Err(Error::new(
                    ErrorKind::TypeMismatch {
                        expected: canonical_name(&first),
                        received: canonical_name(&element_ty),
                    },
                    element.line,
                ));
            }
        }
        let mut dims = vec![elements.len() as u64];
        dims.extend(first.array_dims.iter().copied());
        Ok(Some(TypeExpr {
            array_dims: dims,
            from_literal: true,
            ..first
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn check_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let left_ty = self.value_type(left, table, scope, ctx)?;
        let right_ty = self.value_type(right, table, scope, ctx)?;
        let left_aliased = aliased(&left_ty);
        let right_aliased = aliased(&right_ty);

        if op.is_logical() {
            for (ty, expr) in [(&left_aliased, left), (&right_aliased, right)] {
                if !is_integer(ty) && !ty.is_pointer() {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("an integer or pointer operand"),
                            received: canonical_name(ty),
                        },
                        expr.line,
                    ));
                }
            }
            return Ok(Some(TypeExpr::plain("u8")));
        }

        if op.is_comparison() {
            // Acceptance is symmetric: either direction suffices.
            if !check_type_compatibility(&left_ty, &right_ty)
                && !check_type_compatibility(&right_ty, &left_ty)
            {
                return Err(Error::new(
                    ErrorKind::TypeMismatch {
                        expected: canonical_name(&left_ty),
                        received: canonical_name(&right_ty),
                    },
                    line,
                ));
            }
            // Comparisons yield a narrow integer.
            return Ok(Some(TypeExpr::plain("u8")));
        }

        if op.is_shift() {
            return self
                .check_shift(op, &left_aliased, &right_aliased, right, line)
                .map(|_| Some(left_ty));
        }

        if left_aliased.is_pointer() || right_aliased.is_pointer() {
            return self
                .check_pointer_arithmetic(op, &left_ty, &right_ty, line)
                .map(Some);
        }

        if op == BinaryOp::Mod {
            if let Some(0) = fold_constant(right) {
                return Err(Error::new(ErrorKind::ModuloByZero, right.line));
            }
        }

        if !is_numeric(&left_aliased) || !is_numeric(&right_aliased) {
            return Err(Error::new(
                ErrorKind::TypeMismatch {
                    expected: canonical_name(&left_ty),
                    received: canonical_name(&right_ty),
                },
                line,
            ));
        }

        // Division always yields a float.
        if op == BinaryOp::Div {
            let narrow = left_aliased.name == "f32" || right_aliased.name == "f32";
            let wide = left_aliased.name == "f64" || right_aliased.name == "f64";
            let name = if narrow && !wide { "f32" } else { "f64" };
            return Ok(Some(TypeExpr::plain(name)));
        }

        // Float dominates int; f64 dominates f32; ints keep the wider width.
        let result = match (is_float(&left_aliased), is_float(&right_aliased)) {
            (true, true) => {
                if left_aliased.name == "f64" || right_aliased.name == "f64" {
                    TypeExpr::plain("f64")
                } else {
                    TypeExpr::plain("f32")
                }
            }
            (true, false) => left_aliased.clone(),
            (false, true) => right_aliased.clone(),
            (false, false) => {
                let left_bits = int_info(&left_aliased).map(|info| info.bits).unwrap_or(64);
                let right_bits = int_info(&right_aliased).map(|info| info.bits).unwrap_or(64);
                if left_bits >= right_bits {
                    left_aliased.clone()
                } else {
                    right_aliased.clone()
                }
            }
        };
        Ok(Some(TypeExpr {
            from_literal: left_ty.from_literal && right_ty.from_literal,
            ..result
        }))
    }

    /// The shift portion of the undefined-behavior matrix.
    fn check_shift(
        &mut self,
        op: BinaryOp,
        left: &TypeExpr,
        right: &TypeExpr,
        amount_expr: &Expr,
        line: u32,
    ) -> Result<(), Error> {
        if is_float(left) || is_float(right) {
            return Err(Error::new(ErrorKind::ShiftOnFloat, line));
        }
        if !is_integer(left) || !is_integer(right) {
            return Err(Error::new(
                ErrorKind::TypeMismatch {
                    expected: String::from("an integer operand"),
                    received: canonical_name(if is_integer(left) { right } else { left }),
                },
                line,
            ));
        }

        let info = int_info(left).ok_or_else(|| {
            Error::new(
                ErrorKind::TypeMismatch {
                    expected: String::from("an integer operand"),
                    received: canonical_name(left),
                },
                line,
            )
        })?;

        match fold_constant(amount_expr) {
            Some(amount) if amount < 0 => {
                return Err(Error::new(ErrorKind::NegativeShift { amount }, line));
            }
            Some(amount) if amount >= info.bits as i64 => {
                return Err(Error::new(
                    ErrorKind::ShiftOutOfRange {
                        amount,
                        width: info.bits,
                        type_name: left.name.clone(),
                    },
                    line,
                ));
            }
            Some(_) => {}
            None => {
                self.warn(
                    format!(
                        "Shift amount should be checked against the {}-bit operand width",
                        info.bits
                    ),
                    line,
                );
            }
        }

        if op == BinaryOp::Shl && info.signed {
            self.warn(
                String::from("left shift of a signed integer may overflow"),
                line,
            );
        }
        Ok(())
    }

    fn check_pointer_arithmetic(
        &mut self,
        op: BinaryOp,
        left_ty: &TypeExpr,
        right_ty: &TypeExpr,
        line: u32,
    ) -> Result<TypeExpr, Error> {
        let left = aliased(left_ty);
        let right = aliased(right_ty);
        match op {
            BinaryOp::Add | BinaryOp::Mul if left.is_pointer() && right.is_pointer() => {
                let operation = if op == BinaryOp::Add {
                    "addition"
                } else {
                    "multiplication"
                };
                Err(Error::new(
                    ErrorKind::InvalidPointerArithmetic {
                        operation: String::from(operation),
                    },
                    line,
                ))
            }
            BinaryOp::Sub if left.is_pointer() && right.is_pointer() => {
                if left.name != right.name || left.pointer_depth != right.pointer_depth {
                    self.warn(
                        format!(
                            "subtraction of pointers to different base types `{}` and `{}`",
                            left, right
                        ),
                        line,
                    );
                }
                Ok(TypeExpr::plain("u64"))
            }
            BinaryOp::Add | BinaryOp::Sub if left.is_pointer() && is_integer(&right) => {
                Ok(left_ty.clone())
            }
            BinaryOp::Add if is_integer(&left) && right.is_pointer() => Ok(right_ty.clone()),
            _ => Err(Error::new(
                ErrorKind::TypeMismatch {
                    expected: canonical_name(left_ty),
                    received: canonical_name(right_ty),
                },
                line,
            )),
        }
    }

    fn check_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let ty = self.value_type(operand, table, scope, ctx)?;
        let plain = aliased(&ty);
        match op {
            UnaryOp::Neg => {
                if !is_numeric(&plain) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("a numeric operand"),
                            received: canonical_name(&ty),
                        },
                        line,
                    ));
                }
                Ok(Some(ty))
            }
            UnaryOp::Not => {
                if !is_integer(&plain) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("an integer operand"),
                            received: canonical_name(&ty),
                        },
                        line,
                    ));
                }
                Ok(Some(ty))
            }
            UnaryOp::Deref => {
                if !plain.is_pointer() {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch {
                            expected: String::from("a pointer"),
                            received: canonical_name(&ty),
                        },
                        line,
                    ));
                }
                Ok(Some(plain.dereference()))
            }
            UnaryOp::AddressOf => Ok(Some(ty.reference())),
        }
    }

    fn check_member(
        &mut self,
        target: &Expr,
        member: &str,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let target_ty = self.value_type(target, table, scope, ctx)?;
        let mut base = aliased(&target_ty);
        if base.is_array() || base.pointer_depth > 1 {
            return Err(Error::new(
                ErrorKind::NotAStruct {
                    type_name: canonical_name(&target_ty),
                },
                line,
            ));
        }
        // Member access reaches through one level of indirection.
        if base.pointer_depth == 1 {
            base = base.dereference();
        }

        let info_rc = table.resolve_type_expr(&base, scope, None, line)?;
        let info = info_rc.borrow();
        if info.primitive {
            return Err(Error::new(
                ErrorKind::NotAStruct {
                    type_name: info.name.clone(),
                },
                line,
            ));
        }
        match info.member(member) {
            // Flattened member type names are re-parsed on access.
            Some(found) => Ok(Some(parse_type_name(&found.type_name))),
            None => Err(Error::new(
                ErrorKind::MemberNotDefined {
                    struct_name: info.name.clone(),
                    member: String::from(member),
                },
                line,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_call(
        &mut self,
        name: &str,
        generic_args: &[TypeExpr],
        args: &[Expr],
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let info = table.resolve_function(name).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::FunctionNotDefined {
                    name: String::from(name),
                },
                line,
            )
        })?;

        if info.is_template() {
            let decl = info.decl.clone().ok_or_else(|| {
                Error::new(
                    ErrorKind::FunctionNotDefined {
                        name: String::from(name),
                    },
                    line,
                )
            })?;
            let (mangled, fresh) =
                monomorphize_function(&decl, generic_args, table, scope, line)?;
            if let Some(instance) = fresh {
                self.instantiated.push(Rc::clone(&instance));
                self.check_function(&instance, None, table)?;
            }
            let instance_info = table.resolve_function(&mangled).cloned().ok_or_else(|| {
                Error::new(
                    ErrorKind::FunctionNotDefined { name: mangled },
                    line,
                )
            })?;
            return self.check_args(&instance_info, args, 0, line, table, scope, ctx);
        }

        if !generic_args.is_empty() {
            return Err(Error::new(
                ErrorKind::GenericArgumentCount {
                    name: String::from(name),
                    expected: 0,
                    received: generic_args.len(),
                },
                line,
            ));
        }
        self.check_args(&info, args, 0, line, table, scope, ctx)
    }

    /// Argument validation shared by calls and method calls. `skip` is the
    /// number of leading parameters bound implicitly (the receiver).
    #[allow(clippy::too_many_arguments)]
    fn check_args(
        &mut self,
        info: &FunctionInfo,
        args: &[Expr],
        skip: usize,
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let fixed = info.params.len() - skip;
        if info.is_variadic() {
            if args.len() < fixed {
                return Err(Error::new(
                    ErrorKind::ArgumentCount {
                        function: info.name.clone(),
                        expected: fixed,
                        received: args.len(),
                    },
                    line,
                ));
            }
        } else if args.len() != fixed {
            return Err(Error::new(
                ErrorKind::ArgumentCount {
                    function: info.name.clone(),
                    expected: fixed,
                    received: args.len(),
                },
                line,
            ));
        }

        for ((_, expected), arg) in info.params.iter().skip(skip).zip(args.iter()) {
            let arg_ty = self.value_type(arg, table, scope, ctx)?;
            if !check_type_compatibility(expected, &arg_ty) {
                return Err(Error::new(
                    ErrorKind::ArgumentTypeMismatch {
                        expected: canonical_name(expected),
                        received: canonical_name(&arg_ty),
                    },
                    arg.line,
                ));
            }
            if let Some(note) = cast_warning(expected, &arg_ty) {
                self.warn(note, arg.line);
            }
        }

        // The variadic tail is checked against the declared element type.
        if info.is_variadic() {
            let tail_ty = info.variadic_type().cloned();
            for arg in args.iter().skip(fixed) {
                let arg_ty = self.value_type(arg, table, scope, ctx)?;
                if let Some(expected) = &tail_ty {
                    if !check_type_compatibility(expected, &arg_ty) {
                        return Err(Error::new(
                            ErrorKind::ArgumentTypeMismatch {
                                expected: canonical_name(expected),
                                received: canonical_name(&arg_ty),
                            },
                            arg.line,
                        ));
                    }
                }
            }
        }

        Ok(info.return_type.clone())
    }

    /// Method-call resolution: mangled lookup against the concrete struct,
    /// then the parent chain, then lazy instantiation of a generic method
    /// template. Exhausting all three is fatal.
    #[allow(clippy::too_many_arguments)]
    fn check_method_call(
        &mut self,
        target: &Expr,
        method: &str,
        args: &[Expr],
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let target_ty = self.value_type(target, table, scope, ctx)?;
        let mut base = aliased(&target_ty);
        if base.pointer_depth == 1 && base.array_dims.is_empty() {
            base = base.dereference();
        }
        if base.is_pointer() || base.is_array() {
            return Err(Error::new(
                ErrorKind::NotAStruct {
                    type_name: canonical_name(&target_ty),
                },
                line,
            ));
        }

        let info_rc = table.resolve_type_expr(&base, scope, None, line)?;
        let struct_name = info_rc.borrow().name.clone();

        let mut current = struct_name.clone();
        let found = loop {
            let mangled = table.mangle_method(&current, method);
            if let Some(info) = table.resolve_function(&mangled) {
                break Some(info.clone());
            }
            let parent = table
                .resolve_type(scope, &current)
                .and_then(|rc| rc.borrow().parent.clone());
            match parent {
                Some(parent) => current = parent,
                None => break None,
            }
        };

        let info = match found {
            Some(info) => info,
            None => {
                let template = info_rc
                    .borrow()
                    .template_methods
                    .iter()
                    .find(|candidate| candidate.name == method)
                    .cloned();
                let template = template.ok_or_else(|| {
                    Error::new(
                        ErrorKind::MethodNotDefined {
                            struct_name: struct_name.clone(),
                            method: String::from(method),
                        },
                        line,
                    )
                })?;

                let shape = parse_type_name(&struct_name);
                let params = table
                    .resolve_type(scope, &shape.name)
                    .and_then(|rc| rc.borrow().generic_params.clone())
                    .unwrap_or_default();
                let (mangled, fresh) = instantiate_struct_method(
                    &struct_name,
                    &template,
                    &shape.generic_args,
                    &params,
                    table,
                    scope,
                    line,
                )?;
                if let Some(instance) = fresh {
                    self.instantiated.push(Rc::clone(&instance));
                    self.check_function(&instance, Some("this"), table)?;
                }
                table.resolve_function(&mangled).cloned().ok_or_else(|| {
                    Error::new(
                        ErrorKind::MethodNotDefined {
                            struct_name: struct_name.clone(),
                            method: String::from(method),
                        },
                        line,
                    )
                })?
            }
        };

        self.check_args(&info, args, 1, line, table, scope, ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_struct_init(
        &mut self,
        ty: &TypeExpr,
        fields: &[(String, Expr)],
        line: u32,
        table: &mut SymbolTable,
        scope: ScopeId,
        ctx: &FlowContext,
    ) -> Result<Option<TypeExpr>, Error> {
        let info_rc = table.resolve_type_expr(ty, scope, None, line)?;
        let (struct_name, primitive) = {
            let info = info_rc.borrow();
            (info.name.clone(), info.primitive)
        };
        if primitive {
            return Err(Error::new(
                ErrorKind::NotAStruct {
                    type_name: struct_name,
                },
                line,
            ));
        }

        for (field_name, value) in fields {
            let member = info_rc.borrow().member(field_name).cloned();
            let member = member.ok_or_else(|| {
                Error::new(
                    ErrorKind::MemberNotDefined {
                        struct_name: struct_name.clone(),
                        member: field_name.clone(),
                    },
                    value.line,
                )
            })?;
            let expected = parse_type_name(&member.type_name);
            let value_ty = self.value_type(value, table, scope, ctx)?;
            if !check_type_compatibility(&expected, &value_ty) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch {
                        expected: canonical_name(&expected),
                        received: canonical_name(&value_ty),
                    },
                    value.line,
                ));
            }
            if let Some(note) = cast_warning(&expected, &value_ty) {
                self.warn(note, value.line);
            }
        }

        Ok(Some(parse_type_name(&struct_name)))
    }
}
