use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::expressions::{Expr, ExprKind};
use crate::ast::statements::{Block, FunctionDecl, Param, Stmt, StmtKind, StructDecl};
use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, ErrorKind};
use crate::scope::info::{FunctionInfo, FunctionKind};
use crate::scope::scope::{ScopeId, SymbolTable};
use crate::type_checker::type_checker::{canonical_generic_name, canonical_name, parse_type_name};

/// Makes a canonical name usable as a linkage symbol: alphanumerics and
/// underscores survive, `*` becomes `p`, everything else collapses to `_`.
pub fn sanitize_symbol(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if c == '*' {
            out.push('p');
        } else if c != ' ' {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

/// The mangled global name of a monomorphized generic function.
pub fn mangle_generic_function(base: &str, args: &[TypeExpr]) -> String {
    sanitize_symbol(&canonical_generic_name(base, args))
}

/// Replaces generic parameter names in a type reference with their concrete
/// arguments, composing pointer and array decorations and recursing into
/// nested generic argument lists.
pub fn substitute_type(ty: &TypeExpr, substitution: &HashMap<String, TypeExpr>) -> TypeExpr {
    if ty.generic_args.is_empty() {
        if let Some(replacement) = substitution.get(&ty.name) {
            let mut dims = ty.array_dims.clone();
            dims.extend(replacement.array_dims.iter().copied());
            return TypeExpr {
                name: replacement.name.clone(),
                pointer_depth: ty.pointer_depth + replacement.pointer_depth,
                array_dims: dims,
                generic_args: replacement.generic_args.clone(),
                from_literal: false,
            };
        }
        return ty.clone();
    }

    TypeExpr {
        generic_args: ty
            .generic_args
            .iter()
            .map(|arg| substitute_type(arg, substitution))
            .collect(),
        ..ty.clone()
    }
}

pub fn substitute_expr(expr: &Expr, substitution: &HashMap<String, TypeExpr>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Bool(_) => {
            expr.kind.clone()
        }
        ExprKind::Identifier(_) => expr.kind.clone(),
        ExprKind::ArrayLiteral(elements) => ExprKind::ArrayLiteral(
            elements
                .iter()
                .map(|element| substitute_expr(element, substitution))
                .collect(),
        ),
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op: *op,
            left: Box::new(substitute_expr(left, substitution)),
            right: Box::new(substitute_expr(right, substitution)),
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: Box::new(substitute_expr(operand, substitution)),
        },
        ExprKind::Index { target, index } => ExprKind::Index {
            target: Box::new(substitute_expr(target, substitution)),
            index: Box::new(substitute_expr(index, substitution)),
        },
        ExprKind::Member { target, member } => ExprKind::Member {
            target: Box::new(substitute_expr(target, substitution)),
            member: member.clone(),
        },
        ExprKind::Call {
            name,
            generic_args,
            args,
        } => ExprKind::Call {
            name: name.clone(),
            generic_args: generic_args
                .iter()
                .map(|arg| substitute_type(arg, substitution))
                .collect(),
            args: args
                .iter()
                .map(|arg| substitute_expr(arg, substitution))
                .collect(),
        },
        ExprKind::MethodCall {
            target,
            method,
            args,
        } => ExprKind::MethodCall {
            target: Box::new(substitute_expr(target, substitution)),
            method: method.clone(),
            args: args
                .iter()
                .map(|arg| substitute_expr(arg, substitution))
                .collect(),
        },
        ExprKind::StructInit { ty, fields } => ExprKind::StructInit {
            ty: substitute_type(ty, substitution),
            fields: fields
                .iter()
                .map(|(name, value)| (name.clone(), substitute_expr(value, substitution)))
                .collect(),
        },
        ExprKind::Cast { target, value } => ExprKind::Cast {
            target: substitute_type(target, substitution),
            value: Box::new(substitute_expr(value, substitution)),
        },
    };
    Expr::new(kind, expr.line)
}

pub fn substitute_stmt(stmt: &Stmt, substitution: &HashMap<String, TypeExpr>) -> Stmt {
    let kind = match &stmt.kind {
        StmtKind::Expression(expr) => StmtKind::Expression(substitute_expr(expr, substitution)),
        StmtKind::Block(block) => StmtKind::Block(substitute_block(block, substitution)),
        StmtKind::Declaration {
            name,
            ty,
            value,
            constant,
        } => StmtKind::Declaration {
            name: name.clone(),
            ty: ty.as_ref().map(|ty| substitute_type(ty, substitution)),
            value: value.as_ref().map(|value| substitute_expr(value, substitution)),
            constant: *constant,
        },
        StmtKind::Assignment { target, value } => StmtKind::Assignment {
            target: substitute_expr(target, substitution),
            value: substitute_expr(value, substitution),
        },
        StmtKind::If {
            condition,
            then_block,
            else_block,
        } => StmtKind::If {
            condition: substitute_expr(condition, substitution),
            then_block: substitute_block(then_block, substitution),
            else_block: else_block
                .as_ref()
                .map(|block| substitute_block(block, substitution)),
        },
        StmtKind::While { condition, body } => StmtKind::While {
            condition: substitute_expr(condition, substitution),
            body: substitute_block(body, substitution),
        },
        StmtKind::Switch {
            value,
            cases,
            default,
        } => StmtKind::Switch {
            value: substitute_expr(value, substitution),
            cases: cases
                .iter()
                .map(|(case, block)| (*case, substitute_block(block, substitution)))
                .collect(),
            default: default
                .as_ref()
                .map(|block| substitute_block(block, substitution)),
        },
        StmtKind::Break => StmtKind::Break,
        StmtKind::Continue => StmtKind::Continue,
        StmtKind::Return(value) => StmtKind::Return(
            value
                .as_ref()
                .map(|value| substitute_expr(value, substitution)),
        ),
        // Nested declarations do not participate in substitution.
        StmtKind::Function(decl) => StmtKind::Function(Rc::clone(decl)),
        StmtKind::Extern(decl) => StmtKind::Extern(decl.clone()),
        StmtKind::Struct(decl) => StmtKind::Struct(decl.clone()),
    };
    Stmt::new(kind, stmt.line)
}

pub fn substitute_block(block: &Block, substitution: &HashMap<String, TypeExpr>) -> Block {
    Block {
        statements: block
            .statements
            .iter()
            .map(|stmt| substitute_stmt(stmt, substitution))
            .collect(),
    }
}

/// Checks that each concrete type argument names a known type; called
/// before any substitution happens.
fn check_type_args(
    name: &str,
    expected: usize,
    args: &[TypeExpr],
    table: &mut SymbolTable,
    scope: ScopeId,
    line: u32,
) -> Result<(), Error> {
    if expected != args.len() {
        return Err(Error::new(
            ErrorKind::GenericArgumentCount {
                name: String::from(name),
                expected,
                received: args.len(),
            },
            line,
        ));
    }
    for arg in args {
        if arg.generic_args.is_empty() {
            if table.resolve_type(scope, &arg.name).is_none() {
                return Err(Error::new(
                    ErrorKind::UnresolvedGenericArgument {
                        name: canonical_name(arg),
                    },
                    line,
                ));
            }
        } else {
            table.resolve_generic_type(&arg.name, &arg.generic_args, scope, None, line)?;
        }
    }
    Ok(())
}

/// Monomorphizes a generic function for one set of concrete type arguments.
///
/// Idempotent: if the mangled name is already registered the existing
/// instance is reused and no new declaration is produced. On a fresh
/// instantiation the cloned, substituted declaration is returned so the
/// caller can analyze and lower it.
pub fn monomorphize_function(
    decl: &FunctionDecl,
    type_args: &[TypeExpr],
    table: &mut SymbolTable,
    scope: ScopeId,
    line: u32,
) -> Result<(String, Option<Rc<FunctionDecl>>), Error> {
    check_type_args(
        &decl.name,
        decl.generic_params.len(),
        type_args,
        table,
        scope,
        line,
    )?;

    let mangled = mangle_generic_function(&decl.name, type_args);
    if table.resolve_function(&mangled).is_some() {
        return Ok((mangled, None));
    }

    let mut substitution = HashMap::new();
    for (param, arg) in decl.generic_params.iter().zip(type_args.iter()) {
        substitution.insert(param.clone(), arg.clone());
    }

    let instance = Rc::new(FunctionDecl {
        name: mangled.clone(),
        generic_params: vec![],
        params: decl
            .params
            .iter()
            .map(|param| Param {
                name: param.name.clone(),
                ty: substitute_type(&param.ty, &substitution),
            })
            .collect(),
        return_type: decl
            .return_type
            .as_ref()
            .map(|ty| substitute_type(ty, &substitution)),
        body: substitute_block(&decl.body, &substitution),
        line: decl.line,
    });

    table.define_function(
        FunctionInfo {
            name: mangled.clone(),
            label: mangled.clone(),
            params: instance
                .params
                .iter()
                .map(|param| (param.name.clone(), param.ty.clone()))
                .collect(),
            return_type: instance.return_type.clone(),
            kind: FunctionKind::Plain,
            decl: Some(Rc::clone(&instance)),
        },
        line,
    )?;

    Ok((mangled, Some(instance)))
}

/// Instantiates a generic struct's method template against a concrete
/// instantiation, binding `this` to a pointer to the concrete struct.
/// Triggered lazily at the first call site against that instantiation.
pub fn instantiate_struct_method(
    struct_name: &str,
    method: &FunctionDecl,
    type_args: &[TypeExpr],
    generic_params: &[String],
    table: &mut SymbolTable,
    scope: ScopeId,
    line: u32,
) -> Result<(String, Option<Rc<FunctionDecl>>), Error> {
    check_type_args(
        struct_name,
        generic_params.len(),
        type_args,
        table,
        scope,
        line,
    )?;

    let mangled = table.mangle_method(struct_name, &method.name);
    if table.resolve_function(&mangled).is_some() {
        return Ok((mangled, None));
    }

    let mut substitution = HashMap::new();
    for (param, arg) in generic_params.iter().zip(type_args.iter()) {
        substitution.insert(param.clone(), arg.clone());
    }

    let receiver = parse_type_name(struct_name).reference();
    let mut params = vec![Param {
        name: String::from("this"),
        ty: receiver,
    }];
    params.extend(method.params.iter().map(|param| Param {
        name: param.name.clone(),
        ty: substitute_type(&param.ty, &substitution),
    }));

    let instance = Rc::new(FunctionDecl {
        name: mangled.clone(),
        generic_params: vec![],
        params,
        return_type: method
            .return_type
            .as_ref()
            .map(|ty| substitute_type(ty, &substitution)),
        body: substitute_block(&method.body, &substitution),
        line: method.line,
    });

    table.define_function(
        FunctionInfo {
            name: mangled.clone(),
            label: mangled.clone(),
            params: instance
                .params
                .iter()
                .map(|param| (param.name.clone(), param.ty.clone()))
                .collect(),
            return_type: instance.return_type.clone(),
            kind: FunctionKind::Method {
                receiver: String::from(struct_name),
                original_name: method.name.clone(),
            },
            decl: Some(Rc::clone(&instance)),
        },
        line,
    )?;

    Ok((mangled, Some(instance)))
}

/// Declaration-time rule: a method's own generic parameter may not collide
/// with a generic parameter of its enclosing struct.
pub fn check_method_generics(decl: &StructDecl) -> Result<(), Error> {
    for method in &decl.methods {
        for param in &method.generic_params {
            if decl.generic_params.contains(param) {
                return Err(Error::new(
                    ErrorKind::GenericParameterShadowed {
                        name: param.clone(),
                    },
                    method.line,
                ));
            }
        }
    }
    Ok(())
}
