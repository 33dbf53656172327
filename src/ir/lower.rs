//! Lowering of the validated tree into the typed IR.
//!
//! Runs after analysis, so every name resolves and every generic is already
//! instantiated; lowering reads the populated symbol table and never mutates
//! it. Locals live in stack slots (one alloca per declaration); expression
//! results are numbered temporaries.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::ast::expressions::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::ast::statements::{Block, FunctionDecl, Program, Stmt, StmtKind};
use crate::ast::types::TypeExpr;
use crate::errors::errors::{Error, ErrorKind};
use crate::generics::generics::{mangle_generic_function, sanitize_symbol};
use crate::scope::info::Member;
use crate::scope::scope::SymbolTable;
use crate::type_checker::type_checker::{
    aliased, canonical_name, int_info, is_float, is_integer, parse_type_name,
};

use super::ir::{
    BasicBlock, CastOp, FcmpPred, GlobalInit, IcmpPred, Instruction, IrFunction, IrGlobal, IrOp,
    IrStruct, IrType, Module, Terminator, Value,
};

/// Lowers one validated compilation unit.
///
/// `instantiated` carries the declarations synthesized during analysis
/// (monomorphized generics and methods); they are emitted after the unit's
/// plain functions. Remaining top-level executable statements become the
/// body of a synthesized `__init` function.
pub fn lower(
    program: &Program,
    instantiated: &[Rc<FunctionDecl>],
    table: &mut SymbolTable,
) -> Result<Module, Error> {
    let mut lowerer = Lowerer::new(table);
    lowerer.collect_structs();

    // Top-level declarations become globals; everything else executable is
    // deferred into `__init`.
    let mut init_statements: Vec<Stmt> = vec![];
    for stmt in &program.statements {
        match &stmt.kind {
            StmtKind::Function(_) | StmtKind::Extern(_) | StmtKind::Struct(_) => {}
            StmtKind::Declaration {
                name,
                ty,
                value,
                constant,
            } => {
                lowerer.lower_global(name, ty, value, *constant, stmt.line, &mut init_statements);
            }
            _ => init_statements.push(stmt.clone()),
        }
    }

    for stmt in &program.statements {
        if let StmtKind::Function(decl) = &stmt.kind {
            if decl.generic_params.is_empty() {
                lowerer.lower_function(decl)?;
            }
        }
    }
    for decl in instantiated {
        lowerer.lower_function(decl)?;
    }
    while let Some(pending) = lowerer.pending.pop() {
        lowerer.lower_function(&pending)?;
    }

    if !init_statements.is_empty() {
        let init = FunctionDecl {
            name: String::from("__init"),
            generic_params: vec![],
            params: vec![],
            return_type: None,
            body: Block {
                statements: init_statements,
            },
            line: 0,
        };
        lowerer.lower_function(&init)?;
    }

    lowerer.declare_externs();
    Ok(lowerer.module)
}

struct Lowerer<'a> {
    table: &'a SymbolTable,
    module: Module,
    /// Top-level bindings and their source-level types.
    globals: HashMap<String, TypeExpr>,
    string_count: u32,
    pending: Vec<Rc<FunctionDecl>>,
    // Per-function state.
    blocks: Vec<BasicBlock>,
    current: Vec<Instruction>,
    current_label: String,
    terminated: bool,
    temp_count: u32,
    label_count: u32,
    locals: Vec<HashMap<String, (Value, TypeExpr)>>,
    loop_stack: Vec<(String, String)>,
    return_type: Option<TypeExpr>,
}

impl<'a> Lowerer<'a> {
    fn new(table: &'a SymbolTable) -> Self {
        Lowerer {
            table,
            module: Module::default(),
            globals: HashMap::new(),
            string_count: 0,
            pending: vec![],
            blocks: vec![],
            current: vec![],
            current_label: String::new(),
            terminated: true,
            temp_count: 0,
            label_count: 0,
            locals: vec![],
            loop_stack: vec![],
            return_type: None,
        }
    }

    /// Emits one `%Name = type { ... }` per resolved struct. The generic
    /// cache guarantees a single entry per instantiation, so each concrete
    /// struct renders exactly once.
    fn collect_structs(&mut self) {
        let mut structs: Vec<IrStruct> = vec![];
        for rc in self.table.struct_types() {
            let info = rc.borrow();
            if info.primitive || info.is_template() {
                continue;
            }
            structs.push(IrStruct {
                name: sanitize_symbol(&info.name),
                fields: info
                    .members
                    .iter()
                    .map(|member| self.ir_type(&parse_type_name(&member.type_name)))
                    .collect(),
            });
        }
        structs.sort_by(|a, b| a.name.cmp(&b.name));
        self.module.structs = structs;
    }

    fn declare_externs(&mut self) {
        let mut declarations: Vec<IrFunction> = self
            .table
            .functions()
            .filter(|info| info.is_external())
            .map(|info| IrFunction {
                name: info.label.clone(),
                params: info
                    .params
                    .iter()
                    .map(|(name, ty)| (name.clone(), self.ir_type(ty)))
                    .collect(),
                ret: match &info.return_type {
                    Some(ty) => self.ir_type(ty),
                    None => IrType::Void,
                },
                variadic: info.is_variadic(),
                blocks: vec![],
            })
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        self.module.functions.extend(declarations);
    }

    fn lower_global(
        &mut self,
        name: &str,
        ty: &Option<TypeExpr>,
        value: &Option<Expr>,
        constant: bool,
        line: u32,
        init_statements: &mut Vec<Stmt>,
    ) {
        let frame_ty = match ty {
            Some(ty) => ty.clone(),
            None => match value.as_ref().map(|value| &value.kind) {
                Some(ExprKind::Float(_)) => TypeExpr::plain("f64"),
                Some(ExprKind::Str(_)) => TypeExpr::pointer("u8", 1),
                Some(ExprKind::StructInit { ty, .. }) => ty.clone(),
                Some(ExprKind::Cast { target, .. }) => target.clone(),
                _ => TypeExpr::plain("u64"),
            },
        };

        let mut runtime_init = false;
        let init = match value.as_ref().map(|value| &value.kind) {
            Some(ExprKind::Int(literal)) => GlobalInit::Value(Value::Int(*literal)),
            Some(ExprKind::Float(literal)) => GlobalInit::Value(Value::Float(*literal)),
            Some(ExprKind::Bool(literal)) => GlobalInit::Value(Value::Int(i64::from(*literal))),
            Some(_) => {
                // Runtime initializer: zero-filled global assigned in
                // `__init`, which also means it cannot be constant storage.
                runtime_init = true;
                init_statements.push(Stmt::new(
                    StmtKind::Assignment {
                        target: Expr::new(ExprKind::Identifier(String::from(name)), line),
                        value: value.clone().unwrap_or(Expr::new(ExprKind::Int(0), line)),
                    },
                    line,
                ));
                GlobalInit::Zero
            }
            None => GlobalInit::Zero,
        };

        self.module.globals.push(IrGlobal {
            name: String::from(name),
            ty: self.ir_type(&frame_ty),
            init,
            constant: constant && !runtime_init,
        });
        self.globals.insert(String::from(name), frame_ty);
    }

    fn lower_function(&mut self, decl: &FunctionDecl) -> Result<(), Error> {
        self.blocks = vec![];
        self.current = vec![];
        self.current_label = String::from("entry");
        self.terminated = false;
        self.temp_count = 0;
        self.label_count = 0;
        self.locals = vec![HashMap::new()];
        self.loop_stack = vec![];
        self.return_type = decl.return_type.clone();

        let mut params = vec![];
        for param in &decl.params {
            let ir_ty = self.ir_type(&param.ty);
            params.push((param.name.clone(), ir_ty.clone()));
            let slot = self.temp();
            self.emit(Instruction::Alloca {
                dest: slot,
                ty: ir_ty.clone(),
            });
            self.emit(Instruction::Store {
                ty: ir_ty,
                value: Value::Arg(param.name.clone()),
                ptr: Value::Temp(slot),
            });
            self.bind_local(&param.name, Value::Temp(slot), param.ty.clone());
        }

        for stmt in &decl.body.statements {
            self.lower_stmt(stmt)?;
        }

        if !self.terminated {
            let terminator = match self.return_type.clone() {
                None => Terminator::Ret(None),
                Some(ty) => {
                    let ir_ty = self.ir_type(&ty);
                    let zero = if ir_ty.is_float() {
                        Value::Float(0.0)
                    } else if ir_ty.is_pointer() {
                        Value::Null
                    } else {
                        Value::Int(0)
                    };
                    Terminator::Ret(Some((ir_ty, zero)))
                }
            };
            self.seal(terminator);
        }

        let ret = match &decl.return_type {
            Some(ty) => self.ir_type(ty),
            None => IrType::Void,
        };
        self.module.functions.push(IrFunction {
            name: decl.name.clone(),
            params,
            ret,
            variadic: false,
            blocks: mem::take(&mut self.blocks),
        });
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            StmtKind::Block(block) => {
                self.locals.push(HashMap::new());
                for inner in &block.statements {
                    self.lower_stmt(inner)?;
                }
                self.locals.pop();
                Ok(())
            }
            StmtKind::Declaration {
                name, ty, value, ..
            } => {
                let (value_ty, lowered) = match value {
                    Some(value) => {
                        let (value_ty, lowered) = self.lower_expr(value)?;
                        (Some(value_ty), Some(lowered))
                    }
                    None => (None, None),
                };
                let frame_ty = match (ty, &value_ty) {
                    (Some(ty), _) => ty.clone(),
                    (None, Some(value_ty)) => value_ty.clone(),
                    (None, None) => TypeExpr::plain("u64"),
                };
                let ir_ty = self.ir_type(&frame_ty);
                let slot = self.temp();
                self.emit(Instruction::Alloca {
                    dest: slot,
                    ty: ir_ty.clone(),
                });
                if let (Some(value_ty), Some(lowered)) = (value_ty, lowered) {
                    let coerced = self.coerce(lowered, &value_ty, &frame_ty);
                    self.emit(Instruction::Store {
                        ty: ir_ty,
                        value: coerced,
                        ptr: Value::Temp(slot),
                    });
                }
                self.bind_local(name, Value::Temp(slot), frame_ty);
                Ok(())
            }
            StmtKind::Assignment { target, value } => {
                let (target_ty, ptr) = self.lower_address(target)?;
                let (value_ty, lowered) = self.lower_expr(value)?;
                let coerced = self.coerce(lowered, &value_ty, &target_ty);
                self.emit(Instruction::Store {
                    ty: self.ir_type(&target_ty),
                    value: coerced,
                    ptr,
                });
                Ok(())
            }
            StmtKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let (cond_ty, cond) = self.lower_expr(condition)?;
                let flag = self.truthy(cond, &cond_ty);
                let then_label = self.fresh_label("then");
                let end_label = self.fresh_label("endif");
                let else_label = match else_block {
                    Some(_) => self.fresh_label("else"),
                    None => end_label.clone(),
                };
                self.seal(Terminator::CondBr {
                    cond: flag,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });

                self.start_block(then_label);
                self.lower_nested(then_block)?;
                self.seal(Terminator::Br(end_label.clone()));

                if let Some(else_block) = else_block {
                    self.start_block(else_label);
                    self.lower_nested(else_block)?;
                    self.seal(Terminator::Br(end_label.clone()));
                }

                self.start_block(end_label);
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let cond_label = self.fresh_label("cond");
                let body_label = self.fresh_label("loop");
                let end_label = self.fresh_label("endloop");
                self.seal(Terminator::Br(cond_label.clone()));

                self.start_block(cond_label.clone());
                let (cond_ty, cond) = self.lower_expr(condition)?;
                let flag = self.truthy(cond, &cond_ty);
                self.seal(Terminator::CondBr {
                    cond: flag,
                    then_label: body_label.clone(),
                    else_label: end_label.clone(),
                });

                self.start_block(body_label);
                self.loop_stack.push((cond_label.clone(), end_label.clone()));
                self.lower_nested(body)?;
                self.loop_stack.pop();
                self.seal(Terminator::Br(cond_label));

                self.start_block(end_label);
                Ok(())
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                let (value_ty, lowered) = self.lower_expr(value)?;
                let end_label = self.fresh_label("endswitch");
                let default_label = match default {
                    Some(_) => self.fresh_label("default"),
                    None => end_label.clone(),
                };
                let case_labels: Vec<(i64, String)> = cases
                    .iter()
                    .map(|(case, _)| (*case, self.fresh_label("case")))
                    .collect();
                self.seal(Terminator::Switch {
                    ty: self.ir_type(&value_ty),
                    value: lowered,
                    default: default_label.clone(),
                    cases: case_labels.clone(),
                });

                for ((_, block), (_, label)) in cases.iter().zip(case_labels.iter()) {
                    self.start_block(label.clone());
                    self.lower_nested(block)?;
                    self.seal(Terminator::Br(end_label.clone()));
                }
                if let Some(default) = default {
                    self.start_block(default_label);
                    self.lower_nested(default)?;
                    self.seal(Terminator::Br(end_label.clone()));
                }

                self.start_block(end_label);
                Ok(())
            }
            StmtKind::Break => match self.loop_stack.last().cloned() {
                Some((_, break_label)) => {
                    self.seal(Terminator::Br(break_label));
                    Ok(())
                }
                None => Err(Error::new(ErrorKind::BreakOutsideLoop, stmt.line)),
            },
            StmtKind::Continue => match self.loop_stack.last().cloned() {
                Some((continue_label, _)) => {
                    self.seal(Terminator::Br(continue_label));
                    Ok(())
                }
                None => Err(Error::new(ErrorKind::ContinueOutsideLoop, stmt.line)),
            },
            StmtKind::Return(value) => {
                let terminator = match (value, self.return_type.clone()) {
                    (Some(value), Some(expected)) => {
                        let (value_ty, lowered) = self.lower_expr(value)?;
                        let coerced = self.coerce(lowered, &value_ty, &expected);
                        Terminator::Ret(Some((self.ir_type(&expected), coerced)))
                    }
                    _ => Terminator::Ret(None),
                };
                self.seal(terminator);
                Ok(())
            }
            StmtKind::Function(decl) => {
                if decl.generic_params.is_empty() {
                    self.pending.push(Rc::clone(decl));
                }
                Ok(())
            }
            StmtKind::Extern(_) | StmtKind::Struct(_) => Ok(()),
        }
    }

    fn lower_nested(&mut self, block: &Block) -> Result<(), Error> {
        self.locals.push(HashMap::new());
        for stmt in &block.statements {
            self.lower_stmt(stmt)?;
        }
        self.locals.pop();
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<(TypeExpr, Value), Error> {
        match &expr.kind {
            ExprKind::Int(value) => Ok((TypeExpr::literal("u64"), Value::Int(*value))),
            ExprKind::Float(value) => Ok((TypeExpr::literal("f64"), Value::Float(*value))),
            ExprKind::Bool(value) => Ok((TypeExpr::literal("u8"), Value::Int(i64::from(*value)))),
            ExprKind::Str(text) => Ok(self.lower_string(text)),
            ExprKind::ArrayLiteral(elements) => self.lower_array_literal(elements),
            ExprKind::Identifier(_) => {
                let (ty, ptr) = self.lower_address(expr)?;
                let dest = self.temp();
                self.emit(Instruction::Load {
                    dest,
                    ty: self.ir_type(&ty),
                    ptr,
                });
                Ok((ty, Value::Temp(dest)))
            }
            ExprKind::Binary { op, left, right } => self.lower_binary(*op, left, right),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand),
            ExprKind::Index { .. } | ExprKind::Member { .. } => {
                let (ty, ptr) = self.lower_address(expr)?;
                let dest = self.temp();
                self.emit(Instruction::Load {
                    dest,
                    ty: self.ir_type(&ty),
                    ptr,
                });
                Ok((ty, Value::Temp(dest)))
            }
            ExprKind::Call {
                name,
                generic_args,
                args,
            } => {
                let callee = if generic_args.is_empty() {
                    name.clone()
                } else {
                    mangle_generic_function(name, generic_args)
                };
                self.lower_call(&callee, None, args, expr.line)
            }
            ExprKind::MethodCall {
                target,
                method,
                args,
            } => self.lower_method_call(target, method, args, expr.line),
            ExprKind::StructInit { ty, fields } => self.lower_struct_init(ty, fields, expr.line),
            ExprKind::Cast { target, value } => {
                let (value_ty, lowered) = self.lower_expr(value)?;
                let coerced = self.coerce(lowered, &value_ty, target);
                Ok((target.clone(), coerced))
            }
        }
    }

    fn lower_string(&mut self, text: &str) -> (TypeExpr, Value) {
        let name = format!("str.{}", self.string_count);
        self.string_count += 1;
        let bytes = text.as_bytes().to_vec();
        let length = bytes.len() as u64 + 1;
        self.module.globals.push(IrGlobal {
            name: name.clone(),
            ty: IrType::Array(length, Box::new(IrType::I8)),
            init: GlobalInit::Bytes(bytes),
            constant: true,
        });

        let dest = self.temp();
        self.emit(Instruction::Gep {
            dest,
            ty: IrType::Array(length, Box::new(IrType::I8)),
            ptr: Value::Global(name),
            indices: vec![(IrType::I64, Value::Int(0)), (IrType::I64, Value::Int(0))],
        });
        (TypeExpr::pointer("u8", 1), Value::Temp(dest))
    }

    fn lower_array_literal(&mut self, elements: &[Expr]) -> Result<(TypeExpr, Value), Error> {
        // Materialized in a stack slot, then loaded as an aggregate.
        let mut lowered = vec![];
        let mut element_ty = TypeExpr::literal("u64");
        for (index, element) in elements.iter().enumerate() {
            let (ty, value) = self.lower_expr(element)?;
            if index == 0 {
                element_ty = ty.clone();
            }
            lowered.push((ty, value));
        }

        let array_ty = TypeExpr {
            array_dims: vec![elements.len() as u64],
            from_literal: true,
            ..element_ty.clone()
        };
        let ir_array = self.ir_type(&array_ty);
        let slot = self.temp();
        self.emit(Instruction::Alloca {
            dest: slot,
            ty: ir_array.clone(),
        });
        for (index, (ty, value)) in lowered.into_iter().enumerate() {
            let coerced = self.coerce(value, &ty, &element_ty);
            let field_ptr = self.temp();
            self.emit(Instruction::Gep {
                dest: field_ptr,
                ty: ir_array.clone(),
                ptr: Value::Temp(slot),
                indices: vec![
                    (IrType::I64, Value::Int(0)),
                    (IrType::I64, Value::Int(index as i64)),
                ],
            });
            self.emit(Instruction::Store {
                ty: self.ir_type(&element_ty),
                value: coerced,
                ptr: Value::Temp(field_ptr),
            });
        }

        let dest = self.temp();
        self.emit(Instruction::Load {
            dest,
            ty: ir_array,
            ptr: Value::Temp(slot),
        });
        Ok((array_ty, Value::Temp(dest)))
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<(TypeExpr, Value), Error> {
        let (left_ty, left_value) = self.lower_expr(left)?;
        let (right_ty, right_value) = self.lower_expr(right)?;
        let left_aliased = aliased(&left_ty);
        let right_aliased = aliased(&right_ty);

        if op.is_logical() {
            let lhs = self.truthy(left_value, &left_ty);
            let rhs = self.truthy(right_value, &right_ty);
            let ir_op = if op == BinaryOp::And {
                IrOp::And
            } else {
                IrOp::Or
            };
            let dest = self.temp();
            self.emit(Instruction::Binary {
                dest,
                op: ir_op,
                ty: IrType::I8,
                lhs,
                rhs,
            });
            return Ok((TypeExpr::plain("u8"), Value::Temp(dest)));
        }

        if op.is_comparison() {
            return Ok(self.lower_comparison(
                op,
                (left_ty, left_value),
                (right_ty, right_value),
            ));
        }

        if op.is_shift() {
            let amount = self.coerce(right_value, &right_ty, &left_ty);
            let ir_op = if op == BinaryOp::Shl {
                IrOp::Shl
            } else {
                IrOp::Shr
            };
            let dest = self.temp();
            self.emit(Instruction::Binary {
                dest,
                op: ir_op,
                ty: self.ir_type(&left_ty),
                lhs: left_value,
                rhs: amount,
            });
            return Ok((left_ty, Value::Temp(dest)));
        }

        // Pointer arithmetic lowers to GEP; pointer difference to a raw
        // integer subtraction.
        if left_aliased.is_pointer() && right_aliased.is_pointer() {
            let lhs = self.cast_to(left_value, &left_aliased, CastOp::Ptrtoint, IrType::I64);
            let rhs = self.cast_to(right_value, &right_aliased, CastOp::Ptrtoint, IrType::I64);
            let dest = self.temp();
            self.emit(Instruction::Binary {
                dest,
                op: IrOp::Sub,
                ty: IrType::I64,
                lhs,
                rhs,
            });
            return Ok((TypeExpr::plain("u64"), Value::Temp(dest)));
        }
        if left_aliased.is_pointer() && is_integer(&right_aliased) {
            let mut index = self.coerce(right_value, &right_ty, &TypeExpr::plain("u64"));
            if op == BinaryOp::Sub {
                let negated = self.temp();
                self.emit(Instruction::Binary {
                    dest: negated,
                    op: IrOp::Sub,
                    ty: IrType::I64,
                    lhs: Value::Int(0),
                    rhs: index,
                });
                index = Value::Temp(negated);
            }
            let pointee = left_aliased.dereference();
            let dest = self.temp();
            self.emit(Instruction::Gep {
                dest,
                ty: self.ir_type(&pointee),
                ptr: left_value,
                indices: vec![(IrType::I64, index)],
            });
            return Ok((left_ty, Value::Temp(dest)));
        }
        if is_integer(&left_aliased) && right_aliased.is_pointer() {
            let index = self.coerce(left_value, &left_ty, &TypeExpr::plain("u64"));
            let pointee = right_aliased.dereference();
            let dest = self.temp();
            self.emit(Instruction::Gep {
                dest,
                ty: self.ir_type(&pointee),
                ptr: right_value,
                indices: vec![(IrType::I64, index)],
            });
            return Ok((right_ty, Value::Temp(dest)));
        }

        // Division always yields a float.
        if op == BinaryOp::Div {
            let narrow = left_aliased.name == "f32" || right_aliased.name == "f32";
            let wide = left_aliased.name == "f64" || right_aliased.name == "f64";
            let result = TypeExpr::plain(if narrow && !wide { "f32" } else { "f64" });
            let lhs = self.coerce(left_value, &left_ty, &result);
            let rhs = self.coerce(right_value, &right_ty, &result);
            let dest = self.temp();
            self.emit(Instruction::Binary {
                dest,
                op: IrOp::FDiv,
                ty: self.ir_type(&result),
                lhs,
                rhs,
            });
            return Ok((result, Value::Temp(dest)));
        }

        let result = dominant_type(&left_aliased, &right_aliased);
        let lhs = self.coerce(left_value, &left_ty, &result);
        let rhs = self.coerce(right_value, &right_ty, &result);
        let float = is_float(&result);
        let ir_op = match op {
            BinaryOp::Add if float => IrOp::FAdd,
            BinaryOp::Sub if float => IrOp::FSub,
            BinaryOp::Mul if float => IrOp::FMul,
            BinaryOp::Mod if float => IrOp::FRem,
            BinaryOp::Add => IrOp::Add,
            BinaryOp::Sub => IrOp::Sub,
            BinaryOp::Mul => IrOp::Mul,
            BinaryOp::Mod => IrOp::Rem,
            BinaryOp::BitAnd => IrOp::And,
            BinaryOp::BitOr => IrOp::Or,
            BinaryOp::BitXor => IrOp::Xor,
            // Remaining operators were handled above.
            _ => IrOp::Add,
        };
        let dest = self.temp();
        self.emit(Instruction::Binary {
            dest,
            op: ir_op,
            ty: self.ir_type(&result),
            lhs,
            rhs,
        });
        Ok((result, Value::Temp(dest)))
    }

    fn lower_comparison(
        &mut self,
        op: BinaryOp,
        (left_ty, left_value): (TypeExpr, Value),
        (right_ty, right_value): (TypeExpr, Value),
    ) -> (TypeExpr, Value) {
        let left_aliased = aliased(&left_ty);
        let right_aliased = aliased(&right_ty);
        let dest = self.temp();

        if left_aliased.is_pointer() || right_aliased.is_pointer() {
            let ty = self.ir_type(&left_aliased);
            self.emit(Instruction::Icmp {
                dest,
                pred: icmp_pred(op),
                ty,
                lhs: left_value,
                rhs: right_value,
            });
            return (TypeExpr::plain("u8"), Value::Temp(dest));
        }

        let common = dominant_type(&left_aliased, &right_aliased);
        let lhs = self.coerce(left_value, &left_ty, &common);
        let rhs = self.coerce(right_value, &right_ty, &common);
        if is_float(&common) {
            self.emit(Instruction::Fcmp {
                dest,
                pred: fcmp_pred(op),
                ty: self.ir_type(&common),
                lhs,
                rhs,
            });
        } else {
            // Signed predicates for every integer comparison, including
            // unsigned operand types.
            self.emit(Instruction::Icmp {
                dest,
                pred: icmp_pred(op),
                ty: self.ir_type(&common),
                lhs,
                rhs,
            });
        }
        (TypeExpr::plain("u8"), Value::Temp(dest))
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<(TypeExpr, Value), Error> {
        match op {
            UnaryOp::Neg => {
                let (ty, value) = self.lower_expr(operand)?;
                let dest = self.temp();
                if is_float(&aliased(&ty)) {
                    self.emit(Instruction::Binary {
                        dest,
                        op: IrOp::FSub,
                        ty: self.ir_type(&ty),
                        lhs: Value::Float(0.0),
                        rhs: value,
                    });
                } else {
                    self.emit(Instruction::Binary {
                        dest,
                        op: IrOp::Sub,
                        ty: self.ir_type(&ty),
                        lhs: Value::Int(0),
                        rhs: value,
                    });
                }
                Ok((ty, Value::Temp(dest)))
            }
            UnaryOp::Not => {
                let (ty, value) = self.lower_expr(operand)?;
                let dest = self.temp();
                self.emit(Instruction::Binary {
                    dest,
                    op: IrOp::Xor,
                    ty: self.ir_type(&ty),
                    lhs: value,
                    rhs: Value::Int(-1),
                });
                Ok((ty, Value::Temp(dest)))
            }
            UnaryOp::Deref => {
                let (ty, value) = self.lower_expr(operand)?;
                let pointee = aliased(&ty).dereference();
                let dest = self.temp();
                self.emit(Instruction::Load {
                    dest,
                    ty: self.ir_type(&pointee),
                    ptr: value,
                });
                Ok((pointee, Value::Temp(dest)))
            }
            UnaryOp::AddressOf => {
                let (ty, ptr) = self.lower_address(operand)?;
                Ok((ty.reference(), ptr))
            }
        }
    }

    fn lower_call(
        &mut self,
        callee: &str,
        receiver: Option<(TypeExpr, Value)>,
        args: &[Expr],
        line: u32,
    ) -> Result<(TypeExpr, Value), Error> {
        let info = self.table.resolve_function(callee).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::FunctionNotDefined {
                    name: String::from(callee),
                },
                line,
            )
        })?;

        let skip = usize::from(receiver.is_some());
        let mut lowered: Vec<(IrType, Value)> = vec![];
        if let Some((receiver_ty, receiver_value)) = receiver {
            // An inherited method expects a pointer to the parent type.
            let (value, ir_ty) = match info.params.first() {
                Some((_, expected)) => (
                    self.coerce(receiver_value, &receiver_ty, expected),
                    self.ir_type(expected),
                ),
                None => (receiver_value, self.ir_type(&receiver_ty)),
            };
            lowered.push((ir_ty, value));
        }
        for (position, arg) in args.iter().enumerate() {
            let (arg_ty, value) = self.lower_expr(arg)?;
            let value = match info.params.get(skip + position) {
                Some((_, expected)) => self.coerce(value, &arg_ty, expected),
                // Variadic tail arguments pass through unchanged.
                None => value,
            };
            let ir_ty = match info.params.get(skip + position) {
                Some((_, expected)) => self.ir_type(expected),
                None => self.ir_type(&arg_ty),
            };
            lowered.push((ir_ty, value));
        }

        let ret_frame = info.return_type.clone();
        let ret = match &ret_frame {
            Some(ty) => self.ir_type(ty),
            None => IrType::Void,
        };
        let dest = match ret {
            IrType::Void => None,
            _ => Some(self.temp()),
        };
        self.emit(Instruction::Call {
            dest,
            ret,
            callee: info.label.clone(),
            args: lowered,
        });

        match (ret_frame, dest) {
            (Some(ty), Some(dest)) => Ok((ty, Value::Temp(dest))),
            // A void result is never read; validation rejects such uses.
            _ => Ok((TypeExpr::plain("u8"), Value::Int(0))),
        }
    }

    fn lower_method_call(
        &mut self,
        target: &Expr,
        method: &str,
        args: &[Expr],
        line: u32,
    ) -> Result<(TypeExpr, Value), Error> {
        // The receiver is passed by address; a pointer-typed target is
        // passed as-is.
        let (receiver_ty, receiver_value, struct_ty) = {
            let lvalue = matches!(
                target.kind,
                ExprKind::Identifier(_)
                    | ExprKind::Member { .. }
                    | ExprKind::Index { .. }
                    | ExprKind::Unary {
                        op: UnaryOp::Deref,
                        ..
                    }
            );
            if lvalue {
                let (ty, ptr) = self.lower_address(target)?;
                let base = aliased(&ty);
                if base.pointer_depth == 1 {
                    // A pointer variable: load the pointer itself.
                    let dest = self.temp();
                    self.emit(Instruction::Load {
                        dest,
                        ty: self.ir_type(&base),
                        ptr,
                    });
                    (base.clone(), Value::Temp(dest), base.dereference())
                } else {
                    (ty.reference(), ptr, base)
                }
            } else {
                let (ty, value) = self.lower_expr(target)?;
                let base = aliased(&ty);
                if base.pointer_depth == 1 {
                    (base.clone(), value, base.dereference())
                } else {
                    // Rvalue struct: spill to a slot to take its address.
                    let slot = self.temp();
                    self.emit(Instruction::Alloca {
                        dest: slot,
                        ty: self.ir_type(&base),
                    });
                    self.emit(Instruction::Store {
                        ty: self.ir_type(&base),
                        value,
                        ptr: Value::Temp(slot),
                    });
                    (base.reference(), Value::Temp(slot), base)
                }
            }
        };

        // Mangled lookup against the struct, then its parent chain.
        let mut current = canonical_name(&struct_ty);
        let callee = loop {
            let mangled = self.table.mangle_method(&current, method);
            if self.table.resolve_function(&mangled).is_some() {
                break mangled;
            }
            let parent = self
                .table
                .resolve_type(self.table.root(), &current)
                .and_then(|rc| rc.borrow().parent.clone());
            match parent {
                Some(parent) => current = parent,
                None => {
                    return Err(Error::new(
                        ErrorKind::MethodNotDefined {
                            struct_name: current,
                            method: String::from(method),
                        },
                        line,
                    ));
                }
            }
        };

        self.lower_call(&callee, Some((receiver_ty, receiver_value)), args, line)
    }

    fn lower_struct_init(
        &mut self,
        ty: &TypeExpr,
        fields: &[(String, Expr)],
        line: u32,
    ) -> Result<(TypeExpr, Value), Error> {
        let frame_ty = parse_type_name(&canonical_name(ty));
        let ir_ty = self.ir_type(&frame_ty);
        let slot = self.temp();
        self.emit(Instruction::Alloca {
            dest: slot,
            ty: ir_ty.clone(),
        });

        for (field_name, value) in fields {
            let member = self.member_of(&canonical_name(&frame_ty), field_name, line)?;
            let expected = parse_type_name(&member.type_name);
            let (value_ty, lowered) = self.lower_expr(value)?;
            let coerced = self.coerce(lowered, &value_ty, &expected);
            let field_ptr = self.temp();
            self.emit(Instruction::Gep {
                dest: field_ptr,
                ty: ir_ty.clone(),
                ptr: Value::Temp(slot),
                indices: vec![
                    (IrType::I64, Value::Int(0)),
                    (IrType::I32, Value::Int(member.index as i64)),
                ],
            });
            self.emit(Instruction::Store {
                ty: self.ir_type(&expected),
                value: coerced,
                ptr: Value::Temp(field_ptr),
            });
        }

        let dest = self.temp();
        self.emit(Instruction::Load {
            dest,
            ty: ir_ty,
            ptr: Value::Temp(slot),
        });
        Ok((frame_ty, Value::Temp(dest)))
    }

    /// The address of an lvalue, together with the frame type stored there.
    fn lower_address(&mut self, expr: &Expr) -> Result<(TypeExpr, Value), Error> {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                for scope in self.locals.iter().rev() {
                    if let Some((ptr, ty)) = scope.get(name) {
                        return Ok((ty.clone(), ptr.clone()));
                    }
                }
                if let Some(ty) = self.globals.get(name) {
                    return Ok((ty.clone(), Value::Global(name.clone())));
                }
                Err(Error::new(
                    ErrorKind::VariableNotDefined { name: name.clone() },
                    expr.line,
                ))
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let (ty, value) = self.lower_expr(operand)?;
                Ok((aliased(&ty).dereference(), value))
            }
            ExprKind::Index { target, index } => {
                let (target_ty, ptr) = self.lower_address(target)?;
                let base = aliased(&target_ty);
                let (index_ty, index_value) = self.lower_expr(index)?;
                let index_value = self.coerce(index_value, &index_ty, &TypeExpr::plain("u64"));

                if base.is_array() {
                    let element = base.element();
                    let dest = self.temp();
                    self.emit(Instruction::Gep {
                        dest,
                        ty: self.ir_type(&base),
                        ptr,
                        indices: vec![(IrType::I64, Value::Int(0)), (IrType::I64, index_value)],
                    });
                    Ok((element, Value::Temp(dest)))
                } else {
                    // A pointer: load it, then offset.
                    let loaded = self.temp();
                    self.emit(Instruction::Load {
                        dest: loaded,
                        ty: self.ir_type(&base),
                        ptr,
                    });
                    let element = base.dereference();
                    let dest = self.temp();
                    self.emit(Instruction::Gep {
                        dest,
                        ty: self.ir_type(&element),
                        ptr: Value::Temp(loaded),
                        indices: vec![(IrType::I64, index_value)],
                    });
                    Ok((element, Value::Temp(dest)))
                }
            }
            ExprKind::Member { target, member } => {
                let (target_ty, mut ptr) = self.lower_address(target)?;
                let mut base = aliased(&target_ty);
                if base.pointer_depth == 1 {
                    let loaded = self.temp();
                    self.emit(Instruction::Load {
                        dest: loaded,
                        ty: self.ir_type(&base),
                        ptr,
                    });
                    ptr = Value::Temp(loaded);
                    base = base.dereference();
                }
                let found = self.member_of(&canonical_name(&base), member, expr.line)?;
                let dest = self.temp();
                self.emit(Instruction::Gep {
                    dest,
                    ty: self.ir_type(&base),
                    ptr,
                    indices: vec![
                        (IrType::I64, Value::Int(0)),
                        (IrType::I32, Value::Int(found.index as i64)),
                    ],
                });
                Ok((parse_type_name(&found.type_name), Value::Temp(dest)))
            }
            _ => Err(Error::new(ErrorKind::InvalidAssignmentTarget, expr.line)),
        }
    }

    fn member_of(&self, struct_name: &str, member: &str, line: u32) -> Result<Member, Error> {
        let info = self
            .table
            .resolve_type(self.table.root(), struct_name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::TypeNotDefined {
                        name: String::from(struct_name),
                    },
                    line,
                )
            })?;
        let found = info.borrow().member(member).cloned();
        found.ok_or_else(|| {
            Error::new(
                ErrorKind::MemberNotDefined {
                    struct_name: String::from(struct_name),
                    member: String::from(member),
                },
                line,
            )
        })
    }

    /// Converts a value between frame types, inserting the matching cast
    /// opcode. Identical canonical types pass through untouched.
    fn coerce(&mut self, value: Value, from: &TypeExpr, to: &TypeExpr) -> Value {
        let from_aliased = aliased(from);
        let to_aliased = aliased(to);
        if canonical_name(&from_aliased) == canonical_name(&to_aliased) {
            return value;
        }

        let to_ir = self.ir_type(&to_aliased);

        if from_aliased.is_pointer() && to_aliased.is_pointer() {
            return self.cast_to(value, &from_aliased, CastOp::Bitcast, to_ir);
        }
        if from_aliased.is_pointer() && is_integer(&to_aliased) {
            return self.cast_to(value, &from_aliased, CastOp::Ptrtoint, to_ir);
        }
        if is_integer(&from_aliased) && to_aliased.is_pointer() {
            return self.cast_to(value, &from_aliased, CastOp::Inttoptr, to_ir);
        }

        match (int_info(&from_aliased), int_info(&to_aliased)) {
            (Some(from_info), Some(to_info)) => {
                if to_info.bits > from_info.bits {
                    let op = if from_info.signed {
                        CastOp::Sext
                    } else {
                        CastOp::Zext
                    };
                    return self.cast_to(value, &from_aliased, op, to_ir);
                }
                if to_info.bits < from_info.bits {
                    return self.cast_to(value, &from_aliased, CastOp::Trunc, to_ir);
                }
                // Same width, different signedness: bits are unchanged.
                return value;
            }
            _ => {}
        }

        if is_integer(&from_aliased) && is_float(&to_aliased) {
            return self.cast_to(value, &from_aliased, CastOp::Sitofp, to_ir);
        }
        if is_float(&from_aliased) && is_integer(&to_aliased) {
            return self.cast_to(value, &from_aliased, CastOp::Fptosi, to_ir);
        }
        if from_aliased.name == "f32" && to_aliased.name == "f64" {
            return self.cast_to(value, &from_aliased, CastOp::Fpext, to_ir);
        }
        if from_aliased.name == "f64" && to_aliased.name == "f32" {
            return self.cast_to(value, &from_aliased, CastOp::Fptrunc, to_ir);
        }
        // Aggregates and remaining pairs pass through; validation already
        // accepted the pairing.
        value
    }

    fn cast_to(&mut self, value: Value, from: &TypeExpr, op: CastOp, to: IrType) -> Value {
        let dest = self.temp();
        self.emit(Instruction::Cast {
            dest,
            op,
            from: self.ir_type(from),
            value,
            to,
        });
        Value::Temp(dest)
    }

    /// A branchable flag: nonzero (or non-null) compares not-equal to zero.
    fn truthy(&mut self, value: Value, ty: &TypeExpr) -> Value {
        let plain = aliased(ty);
        let dest = self.temp();
        if is_float(&plain) {
            self.emit(Instruction::Fcmp {
                dest,
                pred: FcmpPred::One,
                ty: self.ir_type(&plain),
                lhs: value,
                rhs: Value::Float(0.0),
            });
        } else if plain.is_pointer() {
            self.emit(Instruction::Icmp {
                dest,
                pred: IcmpPred::Ne,
                ty: self.ir_type(&plain),
                lhs: value,
                rhs: Value::Null,
            });
        } else {
            self.emit(Instruction::Icmp {
                dest,
                pred: IcmpPred::Ne,
                ty: self.ir_type(&plain),
                lhs: value,
                rhs: Value::Int(0),
            });
        }
        Value::Temp(dest)
    }

    fn ir_type(&self, ty: &TypeExpr) -> IrType {
        let plain = aliased(ty);
        let mut base = match plain.name.as_str() {
            "u8" | "i8" => IrType::I8,
            "u16" | "i16" => IrType::I16,
            "u32" | "i32" => IrType::I32,
            "u64" | "i64" => IrType::I64,
            "f32" => IrType::F32,
            "f64" => IrType::F64,
            _ => {
                let bare = TypeExpr {
                    pointer_depth: 0,
                    array_dims: vec![],
                    from_literal: false,
                    ..plain.clone()
                };
                IrType::Struct(sanitize_symbol(&canonical_name(&bare)))
            }
        };
        for _ in 0..plain.pointer_depth {
            base = base.pointer_to();
        }
        for dim in plain.array_dims.iter().rev() {
            base = if *dim == 0 {
                // Unsized arrays decay to pointers.
                base.pointer_to()
            } else {
                IrType::Array(*dim, Box::new(base))
            };
        }
        base
    }

    fn bind_local(&mut self, name: &str, ptr: Value, ty: TypeExpr) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(String::from(name), (ptr, ty));
        }
    }

    fn temp(&mut self) -> u32 {
        let index = self.temp_count;
        self.temp_count += 1;
        index
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let index = self.label_count;
        self.label_count += 1;
        format!("{}{}", prefix, index)
    }

    fn emit(&mut self, instruction: Instruction) {
        if self.terminated {
            // Code after a terminator lands in an unlabeled dead block.
            let label = self.fresh_label("dead");
            self.current_label = label;
            self.terminated = false;
        }
        self.current.push(instruction);
    }

    fn seal(&mut self, terminator: Terminator) {
        if self.terminated {
            return;
        }
        self.blocks.push(BasicBlock {
            label: mem::take(&mut self.current_label),
            instructions: mem::take(&mut self.current),
            terminator: Some(terminator),
        });
        self.terminated = true;
    }

    fn start_block(&mut self, label: String) {
        if !self.terminated {
            self.seal(Terminator::Br(label.clone()));
        }
        self.current_label = label;
        self.current = vec![];
        self.terminated = false;
    }
}

/// The arithmetic result type: float dominates int, f64 dominates f32,
/// integers keep the wider width.
fn dominant_type(left: &TypeExpr, right: &TypeExpr) -> TypeExpr {
    match (is_float(left), is_float(right)) {
        (true, true) => {
            if left.name == "f64" || right.name == "f64" {
                TypeExpr::plain("f64")
            } else {
                TypeExpr::plain("f32")
            }
        }
        (true, false) => left.clone(),
        (false, true) => right.clone(),
        (false, false) => {
            let left_bits = int_info(left).map(|info| info.bits).unwrap_or(64);
            let right_bits = int_info(right).map(|info| info.bits).unwrap_or(64);
            if left_bits >= right_bits {
                TypeExpr {
                    from_literal: false,
                    ..left.clone()
                }
            } else {
                TypeExpr {
                    from_literal: false,
                    ..right.clone()
                }
            }
        }
    }
}

fn icmp_pred(op: BinaryOp) -> IcmpPred {
    match op {
        BinaryOp::Eq => IcmpPred::Eq,
        BinaryOp::Ne => IcmpPred::Ne,
        BinaryOp::Lt => IcmpPred::Slt,
        BinaryOp::Le => IcmpPred::Sle,
        BinaryOp::Gt => IcmpPred::Sgt,
        _ => IcmpPred::Sge,
    }
}

fn fcmp_pred(op: BinaryOp) -> FcmpPred {
    match op {
        BinaryOp::Eq => FcmpPred::Oeq,
        BinaryOp::Ne => FcmpPred::One,
        BinaryOp::Lt => FcmpPred::Olt,
        BinaryOp::Le => FcmpPred::Ole,
        BinaryOp::Gt => FcmpPred::Ogt,
        _ => FcmpPred::Oge,
    }
}
