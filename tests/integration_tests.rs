//! Integration tests for end-to-end compilation.
//!
//! Each test builds a program tree, runs the complete pipeline (analysis,
//! monomorphization, lowering) through `compile` and checks the rendered IR
//! text and the collected diagnostics.

use std::rc::Rc;

use framec::ast::expressions::{BinaryOp, Expr, ExprKind, UnaryOp};
use framec::ast::statements::{
    Block, ExternDecl, FieldDecl, FunctionDecl, Param, Program, Stmt, StmtKind, StructDecl,
};
use framec::ast::types::TypeExpr;
use framec::compile;
use framec::errors::errors::Warning;
use framec::scope::scope::SymbolTable;

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

fn expression(expr: Expr, line: u32) -> Stmt {
    Stmt::new(StmtKind::Expression(expr), line)
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: String::from(name),
        ty,
    }
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

fn field(name: &str, ty: TypeExpr, line: u32) -> FieldDecl {
    FieldDecl {
        name: String::from(name),
        ty,
        line,
    }
}

fn run(statements: Vec<Stmt>) -> (String, Vec<Warning>) {
    let program = Program { statements };
    let mut table = SymbolTable::new();
    compile(&program, &mut table).expect("program must compile")
}

fn run_expecting_error(statements: Vec<Stmt>) -> framec::errors::errors::Error {
    let program = Program { statements };
    let mut table = SymbolTable::new();
    compile(&program, &mut table).expect_err("program must be rejected")
}

#[test]
fn test_compile_simple_function() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(BinaryOp::Add, ident("a", 2), ident("b", 2), 2))),
        2,
    )];
    let (text, warnings) = run(vec![function(
        "add",
        vec![
            param("a", TypeExpr::plain("u64")),
            param("b", TypeExpr::plain("u64")),
        ],
        Some(TypeExpr::plain("u64")),
        body,
    )]);
    assert!(text.contains("define i64 @add(i64 %a, i64 %b) {"), "{}", text);
    assert!(text.contains("add i64"), "{}", text);
    assert!(warnings.is_empty(), "{:?}", warnings);
}

#[test]
fn test_compile_struct_with_padding() {
    // {u8, u64} pads the second field to offset 8 and the total to 16; the
    // emitted type keeps declaration order.
    let mixed = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Mixed"),
            generic_params: vec![],
            parent: None,
            fields: vec![
                field("a", TypeExpr::plain("u8"), 1),
                field("b", TypeExpr::plain("u64"), 1),
            ],
            methods: vec![],
            line: 1,
        }),
        1,
    );
    let (text, _) = run(vec![
        mixed,
        declaration("m", Some(TypeExpr::plain("Mixed")), None, 2),
    ]);
    assert!(text.contains("%Mixed = type { i8, i64 }"), "{}", text);
    assert!(text.contains("@m = global %Mixed zeroinitializer"), "{}", text);
}

#[test]
fn test_generic_function_shared_across_call_sites() {
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
    let call = |value: i64, line: u32| {
        expression(
            Expr::new(
                ExprKind::Call {
                    name: String::from("id"),
                    generic_args: vec![TypeExpr::plain("u64")],
                    args: vec![int(value, line)],
                },
                line,
            ),
            line,
        )
    };
    let (text, _) = run(vec![template, call(1, 2), call(2, 3)]);
    assert_eq!(
        text.matches("define i64 @id_u64(i64 %v) {").count(),
        1,
        "two call sites share one instance\n{}",
        text
    );
    assert_eq!(text.matches("call i64 @id_u64").count(), 2, "{}", text);
}

#[test]
fn test_generic_struct_shared_across_uses() {
    let boxed = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Box"),
            generic_params: vec![String::from("T")],
            parent: None,
            fields: vec![field("value", TypeExpr::plain("T"), 1)],
            methods: vec![],
            line: 1,
        }),
        1,
    );
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
    let (text, _) = run(vec![
        boxed,
        declaration("a", Some(box_u64.clone()), Some(init(1, 2)), 2),
        declaration("b", Some(box_u64.clone()), Some(init(2, 3)), 3),
    ]);
    assert_eq!(text.matches("%Box_u64 = type").count(), 1, "{}", text);
}

#[test]
fn test_method_resolves_through_parent_chain() {
    let base = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Base"),
            generic_params: vec![],
            parent: None,
            fields: vec![field("id", TypeExpr::plain("u64"), 1)],
            methods: vec![FunctionDecl {
                name: String::from("tag"),
                generic_params: vec![],
                params: vec![],
                return_type: Some(TypeExpr::plain("u64")),
                body: Block {
                    statements: vec![Stmt::new(
                        StmtKind::Return(Some(Expr::new(
                            ExprKind::Member {
                                target: Box::new(ident("this", 2)),
                                member: String::from("id"),
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
    let child = Stmt::new(
        StmtKind::Struct(StructDecl {
            name: String::from("Child"),
            generic_params: vec![],
            parent: Some(String::from("Base")),
            fields: vec![field("extra", TypeExpr::plain("u64"), 3)],
            methods: vec![],
            line: 3,
        }),
        3,
    );
    let body = vec![Stmt::new(
        StmtKind::Return(Some(Expr::new(
            ExprKind::MethodCall {
                target: Box::new(ident("c", 4)),
                method: String::from("tag"),
                args: vec![],
            },
            4,
        ))),
        4,
    )];
    let (text, _) = run(vec![
        base,
        child,
        function(
            "read",
            vec![param("c", TypeExpr::plain("Child"))],
            Some(TypeExpr::plain("u64")),
            body,
        ),
    ]);
    // The inherited method is the parent's symbol; the child layout keeps
    // the parent members first.
    assert!(text.contains("call i64 @Base__tag("), "{}", text);
    assert!(text.contains("%Child = type { i64, i64 }"), "{}", text);
}

#[test]
fn test_negative_shift_rejected_end_to_end() {
    let negated = Expr::new(
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(int(1, 1)),
        },
        1,
    );
    let error = run_expecting_error(vec![expression(
        binary(BinaryOp::Shl, int(10, 1), negated, 1),
        1,
    )]);
    assert_eq!(error.get_error_name(), "NegativeShift");
}

#[test]
fn test_runtime_shift_warns_but_compiles() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(BinaryOp::Shl, ident("v", 2), ident("n", 2), 2))),
        2,
    )];
    let (text, warnings) = run(vec![function(
        "shift",
        vec![
            param("v", TypeExpr::plain("u64")),
            param("n", TypeExpr::plain("u64")),
        ],
        Some(TypeExpr::plain("u64")),
        body,
    )]);
    assert!(text.contains("shl i64"), "{}", text);
    assert_eq!(
        warnings
            .iter()
            .filter(|warning| warning.message.contains("Shift amount should be checked"))
            .count(),
        1,
        "{:?}",
        warnings
    );
}

#[test]
fn test_pointer_difference_yields_u64_with_warning() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(binary(BinaryOp::Sub, ident("p", 2), ident("q", 2), 2))),
        2,
    )];
    let (text, warnings) = run(vec![function(
        "distance",
        vec![
            param("p", TypeExpr::pointer("u8", 1)),
            param("q", TypeExpr::pointer("u64", 1)),
        ],
        Some(TypeExpr::plain("u64")),
        body,
    )]);
    assert!(text.contains("ptrtoint"), "{}", text);
    assert!(text.contains("sub i64"), "{}", text);
    assert!(
        warnings
            .iter()
            .any(|warning| warning.message.contains("different base types")),
        "{:?}",
        warnings
    );
}

#[test]
fn test_advisories_do_not_block_compilation() {
    let body = vec![declaration(
        "unread",
        Some(TypeExpr::plain("u64")),
        Some(int(1, 2)),
        2,
    )];
    let (text, warnings) = run(vec![function("f", vec![], None, body)]);
    assert!(text.contains("define void @f() {"), "{}", text);
    assert!(
        warnings
            .iter()
            .any(|warning| warning.message.contains("unused variable `unread`")),
        "{:?}",
        warnings
    );
}

#[test]
fn test_variadic_extern_call() {
    let printf = Stmt::new(
        StmtKind::Extern(ExternDecl {
            name: String::from("printf"),
            params: vec![param("fmt", TypeExpr::pointer("u8", 1))],
            return_type: Some(TypeExpr::plain("u32")),
            variadic: true,
            variadic_type: None,
            line: 1,
        }),
        1,
    );
    let body = vec![expression(
        Expr::new(
            ExprKind::Call {
                name: String::from("printf"),
                generic_args: vec![],
                args: vec![
                    Expr::new(ExprKind::Str(String::from("%d\n")), 2),
                    int(7, 2),
                ],
            },
            2,
        ),
        2,
    )];
    let (text, _) = run(vec![printf, function("main", vec![], None, body)]);
    assert!(text.contains("declare i32 @printf(i8* %fmt, ...)"), "{}", text);
    assert!(text.contains("call i32 @printf(i8*"), "{}", text);
    assert!(text.contains("c\"%d\\0A\\00\""), "{}", text);
}

#[test]
fn test_string_alias_is_a_byte_pointer() {
    let body = vec![Stmt::new(
        StmtKind::Return(Some(ident("s", 2))),
        2,
    )];
    let (text, _) = run(vec![function(
        "echo",
        vec![param("s", TypeExpr::plain("string"))],
        Some(TypeExpr::pointer("u8", 1)),
        body,
    )]);
    assert!(text.contains("define i8* @echo(i8* %s) {"), "{}", text);
}

#[test]
fn test_if_else_control_flow() {
    let body = vec![Stmt::new(
        StmtKind::If {
            condition: binary(BinaryOp::Gt, ident("n", 2), int(0, 2), 2),
            then_block: Block {
                statements: vec![Stmt::new(StmtKind::Return(Some(int(1, 3))), 3)],
            },
            else_block: Some(Block {
                statements: vec![Stmt::new(StmtKind::Return(Some(int(0, 5))), 5)],
            }),
        },
        2,
    )];
    let (text, _) = run(vec![function(
        "positive",
        vec![param("n", TypeExpr::plain("i64"))],
        Some(TypeExpr::plain("u64")),
        body,
    )]);
    assert!(text.contains("icmp sgt i64"), "{}", text);
    assert!(text.contains("br i1 %t"), "{}", text);
    assert!(text.contains("ret i64 1"), "{}", text);
    assert!(text.contains("ret i64 0"), "{}", text);
}
