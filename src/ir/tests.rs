use std::rc::Rc;

use super::ir::{
    BasicBlock, GlobalInit, IcmpPred, Instruction, IrFunction, IrGlobal, IrStruct, IrType, Module,
    Terminator, Value,
};
use super::render::render_module;
use crate::ast::expressions::{BinaryOp, Expr, ExprKind};
use crate::ast::statements::{
    Block, ExternDecl, FieldDecl, FunctionDecl, Param, Program, Stmt, StmtKind, StructDecl,
};
use crate::ast::types::TypeExpr;
use crate::compile;
use crate::scope::scope::SymbolTable;

fn int(value: i64, line: u32) -> Expr {
    Expr::new(ExprKind::Int(value), line)
}

fn ident(name: &str, line: u32) -> Expr {
    Expr::new(ExprKind::Identifier(String::from(name)), line)
}

fn binary(op: BinaryOp, left: Expr, right: Expr, line: u32) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    )
}

fn declaration(name: &str, ty: Option<TypeExpr>, value: Option<Expr>, line: u32) -> Stmt {
    Stmt::new(
        StmtKind::Declaration {
            name: String::from(name),
            ty,
            value,
            constant: false,
        },
        line,
    )
}

fn function(name: &str, params: Vec<Param>, return_type: Option<TypeExpr>, body: Vec<Stmt>) -> Stmt {
    Stmt::new(
        StmtKind::Function(Rc::new(FunctionDecl {
            name: String::from(name),
            generic_params: vec![],
            params,
            return_type,
            body: Block { statements: body },
            line: 1,
        })),
        1,
    )
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: String::from(name),
        ty,
    }
}

fn lower_program(statements: Vec<Stmt>) -> String {
    let program = Program { statements };
    let mut table = SymbolTable::new();
    let (text, _) = compile(&program, &mut table).expect("program must compile");
    text
}

#[test]
fn test_render_struct_and_global() {
    let module = Module {
        structs: vec![IrStruct {
            name: String::from("Pair"),
            fields: vec![IrType::I64, IrType::F64],
        }],
        globals: vec![IrGlobal {
            name: String::from("g"),
            ty: IrType::I64,
            init: GlobalInit::Value(Value::Int(3)),
            constant: false,
        }],
        functions: vec![],
    };
    let text = render_module(&module);
    assert!(text.contains("%Pair = type { i64, double }"), "{}", text);
    assert!(text.contains("@g = global i64 3"), "{}", text);
}

#[test]
fn test_render_escapes_string_bytes() {
    let module = Module {
        globals: vec![IrGlobal {
            name: String::from("str.0"),
            ty: IrType::Array(5, Box::new(IrType::I8)),
            init: GlobalInit::Bytes(b"a\"b\n".to_vec()),
            constant: true,
        }],
        ..Module::default()
    };
    let text = render_module(&module);
    assert!(
        text.contains("@str.0 = private constant [5 x i8] c\"a\\22b\\0A\\00\""),
        "{}",
        text
    );
}

#[test]
fn test_render_declaration_versus_definition() {
    let module = Module {
        functions: vec![
            IrFunction {
                name: String::from("printf"),
                params: vec![(String::from("fmt"), IrType::I8.pointer_to())],
                ret: IrType::I32,
                variadic: true,
                blocks: vec![],
            },
            IrFunction {
                name: String::from("zero"),
                params: vec![],
                ret: IrType::I64,
                variadic: false,
                blocks: vec![BasicBlock {
                    label: String::from("entry"),
                    instructions: vec![],
                    terminator: Some(Terminator::Ret(Some((IrType::I64, Value::Int(0))))),
                }],
            },
        ],
        ..Module::default()
    };
    let text = render_module(&module);
    assert!(text.contains("declare i32 @printf(i8* %fmt, ...)"), "{}", text);
    assert!(text.contains("define i64 @zero() {"), "{}", text);
    assert!(text.contains("  ret i64 0"), "{}", text);
}

#[test]
fn test_render_conditional_branch() {
    let module = Module {
        functions: vec![IrFunction {
            name: String::from("f"),
            params: vec![],
            ret: IrType::Void,
            variadic: false,
            blocks: vec![
                BasicBlock {
                    label: String::from("entry"),
                    instructions: vec![Instruction::Icmp {
                        dest: 0,
                        pred: IcmpPred::Ne,
                        ty: IrType::I64,
                        lhs: Value::Int(1),
                        rhs: Value::Int(0),
                    }],
                    terminator: Some(Terminator::CondBr {
                        cond: Value::Temp(0),
                        then_label: String::from("then0"),
                        else_label: String::from("endif1"),
                    }),
                },
                BasicBlock {
                    label: String::from("then0"),
                    instructions: vec![],
                    terminator: Some(Terminator::Ret(None)),
                },
            ],
        }],
        ..Module::default()
    };
    let text = render_module(&module);
    assert!(text.contains("%t0 = icmp ne i64 1, 0"), "{}", text);
    assert!(
        text.contains("br i1 %t0, label %then0, label %endif1"),
        "{}",
        text
    );
    assert!(text.contains("ret void"), "{}", text);
}

#[test]
fn test_comparison_lowers_to_signed_predicate() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(BinaryOp::Lt, ident("a", 2), ident("b", 2), 2))),
        2,
    )];
    let text = lower_program(vec![function(
        "lt",
        vec![
            param("a", TypeExpr::plain("u64")),
            param("b", TypeExpr::plain("u64")),
        ],
        Some(TypeExpr::plain("u8")),
        body,
    )]);
    assert!(text.contains("define i8 @lt(i64 %a, i64 %b) {"), "{}", text);
    assert!(text.contains("icmp slt i64"), "{}", text);
}

#[test]
fn test_division_always_lowers_to_float() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(BinaryOp::Div, int(10, 2), int(4, 2), 2))),
        2,
    )];
    let text = lower_program(vec![function(
        "quarter",
        vec![],
        Some(TypeExpr::plain("f64")),
        body,
    )]);
    assert!(text.contains("fdiv double"), "{}", text);
}

#[test]
fn test_float_modulo_lowers_to_frem() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(
            BinaryOp::Mod,
            Expr::new(ExprKind::Float(1.5), 2),
            Expr::new(ExprKind::Float(0.5), 2),
            2,
        ))),
        2,
    )];
    let text = lower_program(vec![function(
        "wrap",
        vec![],
        Some(TypeExpr::plain("f64")),
        body,
    )]);
    assert!(text.contains("frem double"), "{}", text);
    assert!(!text.contains("srem double"), "{}", text);
}

#[test]
fn test_string_literal_becomes_private_constant() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(Expr::new(ExprKind::Str(String::from("hi")), 2))),
        2,
    )];
    let text = lower_program(vec![function(
        "greeting",
        vec![],
        Some(TypeExpr::pointer("u8", 1)),
        body,
    )]);
    assert!(
        text.contains("@str.0 = private constant [3 x i8] c\"hi\\00\""),
        "{}",
        text
    );
    assert!(
        text.contains("getelementptr [3 x i8], [3 x i8]* @str.0, i64 0, i64 0"),
        "{}",
        text
    );
}

#[test]
fn test_extern_renders_as_declare() {
    let text = lower_program(vec![Stmt::new(
        StmtKind::Extern(ExternDecl {
            name: String::from("printf"),
            params: vec![param("fmt", TypeExpr::pointer("u8", 1))],
            return_type: Some(TypeExpr::plain("u32")),
            variadic: true,
            variadic_type: None,
            line: 1,
        }),
        1,
    )]);
    assert!(text.contains("declare i32 @printf(i8* %fmt, ...)"), "{}", text);
}

#[test]
fn test_top_level_statements_form_init_function() {
    let statements = vec![
        declaration("g", Some(TypeExpr::plain("u64")), Some(int(1, 1)), 1),
        Stmt::new(
            StmtKind::Assignment {
                target: ident("g", 2),
                value: int(2, 2),
            },
            2,
        ),
    ];
    let text = lower_program(statements);
    assert!(text.contains("@g = global i64 1"), "{}", text);
    assert!(text.contains("define void @__init() {"), "{}", text);
    assert!(text.contains("store i64 2, i64* @g"), "{}", text);
}

fn box_struct() -> Stmt {
    Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Box"),
            generic_params: vec![String::from("T")],
            parent: None,
            fields: vec![FieldDecl {
                name: String::from("value"),
                ty: TypeExpr::plain("T"),
                line: 1,
            }],
            methods: vec![],
            line: 1,
        }),
        1,
    )
}

#[test]
fn test_repeated_instantiation_emits_one_struct_type() {
    let box_u64 = TypeExpr::generic("Box", vec![TypeExpr::plain("u64")]);
    let init = |value: i64, line: u32| {
        Expr::new(
            ExprKind::StructInit {
                ty: box_u64.clone(),
                fields: vec![(String::from("value"), int(value, line))],
            },
            line,
        )
    };
    let statements = vec![
        box_struct(),
        declaration("a", Some(box_u64.clone()), Some(init(1, 2)), 2),
        declaration("b", Some(box_u64.clone()), Some(init(2, 3)), 3),
    ];
    let text = lower_program(statements);
    assert_eq!(
        text.matches("%Box_u64 = type").count(),
        1,
        "one type declaration for two uses\n{}",
        text
    );
    assert!(text.contains("%Box_u64 = type { i64 }"), "{}", text);
    assert!(text.contains("@a = global %Box_u64 zeroinitializer"), "{}", text);
}

#[test]
fn test_struct_member_access_uses_field_index() {
    let pair = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Pair"),
            generic_params: vec![],
            parent: None,
            fields: vec![
                FieldDecl {
                    name: String::from("first"),
                    ty: TypeExpr::plain("u64"),
                    line: 1,
                },
                FieldDecl {
                    name: String::from("second"),
                    ty: TypeExpr::plain("u64"),
                    line: 1,
                },
            ],
            methods: vec![],
            line: 1,
        }),
        1,
    );
    let body = vec![Stmt::new(
        StmtKind::Return(Some(Expr::new(
            ExprKind::Member {
                target: Box::new(ident("p", 2)),
                member: String::from("second"),
            },
            2,
        ))),
        2,
    )];
    let text = lower_program(vec![
        pair,
        function(
            "second",
            vec![param("p", TypeExpr::plain("Pair"))],
            Some(TypeExpr::plain("u64")),
            body,
        ),
    ]);
    assert!(
        text.contains("getelementptr %Pair, %Pair*"),
        "{}",
        text
    );
    assert!(text.contains("i64 0, i32 1"), "{}", text);
}

#[test]
fn test_while_loop_branches_back_to_condition() {
    let body = vec![
        declaration("i", Some(TypeExpr::plain("u64")), Some(int(0, 2)), 2),
        Stmt::new(
            StmtKind::While {
                condition: binary(BinaryOp::Lt, ident("i", 3), int(10, 3), 3),
                body: Block {
                    statements: vec![Stmt::new(
                        StmtKind::Assignment {
                            target: ident("i", 4),
                            value: binary(BinaryOp::Add, ident("i", 4), int(1, 4), 4),
                        },
                        4,
                    )],
                },
            },
            3,
        ),
    ];
    let text = lower_program(vec![function("count", vec![], None, body)]);
    assert!(text.contains("cond0:"), "{}", text);
    assert!(text.contains("br label %cond0"), "{}", text);
    assert!(
        text.contains("br i1 %t"),
        "the loop condition drives a conditional branch\n{}",
        text
    );
}

#[test]
fn test_switch_renders_case_table() {
    let body = vec![
        Stmt::new(
            StmtKind::Switch {
                value: ident("x", 2),
                cases: vec![(
                    1,
                    Block {
                        statements: vec![Stmt::new(StmtKind::Return(Some(int(10, 3))), 3)],
                    },
                )],
                default: Some(Block {
                    statements: vec![Stmt::new(StmtKind::Return(Some(int(0, 4))), 4)],
                }),
            },
            2,
        ),
        Stmt::new(StmtKind::Return(Some(int(0, 5))), 5),
    ];
    let text = lower_program(vec![function(
        "pick",
        vec![param("x", TypeExpr::plain("u64"))],
        Some(TypeExpr::plain("u64")),
        body,
    )]);
    assert!(text.contains("switch i64"), "{}", text);
    assert!(text.contains("i64 1, label %case"), "{}", text);
}

#[test]
fn test_method_call_lowers_through_mangled_symbol() {
    let point = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Point"),
            generic_params: vec![],
            parent: None,
            fields: vec![FieldDecl {
                name: String::from("x"),
                ty: TypeExpr::plain("u64"),
                line: 1,
            }],
            methods: vec![FunctionDecl {
                name: String::from("get"),
                generic_params: vec![],
                params: vec![],
                return_type: Some(TypeExpr::plain("u64")),
                body: Block {
                    statements: vec![Stmt::new(
                        StmtKind::Return(Some(Expr::new(
                            ExprKind::Member {
                                target: Box::new(ident("this", 2)),
                                member: String::from("x"),
                            },
                            2,
                        ))),
                        2,
                    )],
                },
                line: 2,
            }],
            line: 1,
        }),
        1,
    );
    let body = vec![Stmt::new(
        StmtKind::Return(Some(Expr::new(
            ExprKind::MethodCall {
                target: Box::new(ident("p", 3)),
                method: String::from("get"),
                args: vec![],
            },
            3,
        ))),
        3,
    )];
    let text = lower_program(vec![
        point,
        function(
            "read",
            vec![param("p", TypeExpr::plain("Point"))],
            Some(TypeExpr::plain("u64")),
            body,
        ),
    ]);
    assert!(
        text.contains("define i64 @Point__get(%Point* %this) {"),
        "{}",
        text
    );
    assert!(text.contains("call i64 @Point__get(%Point*"), "{}", text);
}

#[test]
fn test_generic_function_lowers_under_mangled_name() {
    let template = Stmt::new(
        StmtKind::Function(Rc::new(FunctionDecl {
            name: String::from("id"),
            generic_params: vec![String::from("T")],
            params: vec![param("v", TypeExpr::plain("T"))],
            return_type: Some(TypeExpr::plain("T")),
            body: Block {
                statements: vec![Stmt::new(StmtKind::Return(Some(ident("v", 2))), 2)],
            },
            line: 1,
        })),
        1,
    );
    let call = Expr::new(
        ExprKind::Call {
            name: String::from("id"),
            generic_args: vec![TypeExpr::plain("u64")],
            args: vec![int(5, 3)],
        },
        3,
    );
    let body = vec![Stmt::new(StmtKind::Return(Some(call)), 3)];
    let text = lower_program(vec![
        template,
        function("caller", vec![], Some(TypeExpr::plain("u64")), body),
    ]);
    assert!(!text.contains("define i64 @id("), "{}", text);
    assert!(text.contains("define i64 @id_u64(i64 %v) {"), "{}", text);
    assert!(text.contains("call i64 @id_u64(i64 5)"), "{}", text);
}
