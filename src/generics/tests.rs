use std::collections::HashMap;

use super::generics::{
    check_method_generics, instantiate_struct_method, mangle_generic_function,
    monomorphize_function, sanitize_symbol, substitute_block, substitute_type,
};
use crate::ast::expressions::{BinaryOp, Expr, ExprKind};
use crate::ast::statements::{Block, FunctionDecl, Param, Stmt, StmtKind, StructDecl};
use crate::ast::types::TypeExpr;
use crate::scope::info::FunctionKind;
use crate::scope::scope::SymbolTable;
use crate::type_checker::type_checker::canonical_name;

fn substitution(pairs: &[(&str, TypeExpr)]) -> HashMap<String, TypeExpr> {
    pairs
        .iter()
        .map(|(name, ty)| (String::from(*name), ty.clone()))
        .collect()
}

fn identity_decl(name: &str, params: Vec<String>) -> FunctionDecl {
    // frame name<T>(value: T) -> T { return value; }
    FunctionDecl {
        name: String::from(name),
        generic_params: params,
        params: vec![Param {
            name: String::from("value"),
            ty: TypeExpr::plain("T"),
        }],
        return_type: Some(TypeExpr::plain("T")),
        body: Block {
            statements: vec![Stmt::new(
                StmtKind::Return(Some(Expr::new(
                    ExprKind::Identifier(String::from("value")),
                    2,
                ))),
                2,
            )],
        },
        line: 1,
    }
}

#[test]
fn test_sanitize_symbol() {
    assert_eq!(sanitize_symbol("plain"), "plain");
    assert_eq!(sanitize_symbol("Box<u64>"), "Box_u64");
    assert_eq!(sanitize_symbol("Pair<*u8, f64>"), "Pair_pu8_f64");
    assert_eq!(sanitize_symbol("Box<Box<u8>>"), "Box_Box_u8");
}

#[test]
fn test_mangle_generic_function() {
    assert_eq!(
        mangle_generic_function("max", &[TypeExpr::plain("u64")]),
        "max_u64"
    );
    assert_eq!(
        mangle_generic_function("swap", &[TypeExpr::pointer("u8", 1), TypeExpr::plain("f64")]),
        "swap_pu8_f64"
    );
}

#[test]
fn test_substitute_type_composes_decorations() {
    let map = substitution(&[("T", TypeExpr::pointer("u8", 1))]);

    // *T[2] with T = *u8 composes to **u8[2].
    let source = TypeExpr {
        pointer_depth: 1,
        array_dims: vec![2],
        ..TypeExpr::plain("T")
    };
    let result = substitute_type(&source, &map);
    assert_eq!(result.pointer_depth, 2);
    assert_eq!(result.array_dims, vec![2]);
    assert_eq!(canonical_name(&result), "**u8[2]");
    assert!(!result.from_literal);
}

#[test]
fn test_substitute_type_recurses_into_generic_args() {
    let map = substitution(&[("T", TypeExpr::plain("u64"))]);
    let source = TypeExpr::generic("Box", vec![TypeExpr::plain("T")]);
    let result = substitute_type(&source, &map);
    assert_eq!(canonical_name(&result), "Box<u64>");

    // Unrelated names pass through untouched.
    let other = TypeExpr::plain("u8");
    assert_eq!(substitute_type(&other, &map), other);
}

#[test]
fn test_substitute_block_rewrites_annotations_and_casts() {
    let map = substitution(&[("T", TypeExpr::plain("f64"))]);
    let block = Block {
        statements: vec![
            Stmt::new(
                StmtKind::Declaration {
                    name: String::from("x"),
                    ty: Some(TypeExpr::plain("T")),
                    value: Some(Expr::new(
                        ExprKind::Cast {
                            target: TypeExpr::plain("T"),
                            value: Box::new(Expr::new(ExprKind::Int(1), 2)),
                        },
                        2,
                    )),
                    constant: false,
                },
                2,
            ),
            Stmt::new(
                StmtKind::Expression(Expr::new(
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        left: Box::new(Expr::new(
                            ExprKind::Identifier(String::from("x")),
                            3,
                        )),
                        right: Box::new(Expr::new(ExprKind::Int(1), 3)),
                    },
                    3,
                )),
                3,
            ),
        ],
    };

    let result = substitute_block(&block, &map);
    match &result.statements[0].kind {
        StmtKind::Declaration { ty, value, .. } => {
            assert_eq!(ty.as_ref().unwrap().name, "f64");
            match &value.as_ref().unwrap().kind {
                ExprKind::Cast { target, .. } => assert_eq!(target.name, "f64"),
                other => panic!("expected a cast, found {:?}", other),
            }
        }
        other => panic!("expected a declaration, found {:?}", other),
    }
}

#[test]
fn test_monomorphize_function_registers_instance() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let decl = identity_decl("identity", vec![String::from("T")]);

    let (name, instance) =
        monomorphize_function(&decl, &[TypeExpr::plain("u64")], &mut table, root, 5).unwrap();
    assert_eq!(name, "identity_u64");

    let instance = instance.expect("fresh instantiation yields a declaration");
    assert!(instance.generic_params.is_empty());
    assert_eq!(instance.params[0].ty.name, "u64");
    assert_eq!(instance.return_type.as_ref().unwrap().name, "u64");

    let info = table.resolve_function("identity_u64").unwrap();
    assert!(matches!(info.kind, FunctionKind::Plain));
    assert!(info.decl.is_some());
}

#[test]
fn test_monomorphize_function_is_idempotent() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let decl = identity_decl("identity", vec![String::from("T")]);

    let first = monomorphize_function(&decl, &[TypeExpr::plain("u8")], &mut table, root, 5).unwrap();
    let second =
        monomorphize_function(&decl, &[TypeExpr::plain("u8")], &mut table, root, 9).unwrap();

    assert_eq!(first.0, second.0);
    assert!(first.1.is_some(), "first call produces the instance");
    assert!(second.1.is_none(), "repeat call reuses the registration");
}

#[test]
fn test_monomorphize_rejects_bad_type_args() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let decl = identity_decl("identity", vec![String::from("T")]);

    let error = monomorphize_function(&decl, &[], &mut table, root, 5).unwrap_err();
    assert_eq!(error.get_error_name(), "GenericArgumentCount");

    let error =
        monomorphize_function(&decl, &[TypeExpr::plain("Missing")], &mut table, root, 5)
            .unwrap_err();
    assert_eq!(error.get_error_name(), "UnresolvedGenericArgument");
}

#[test]
fn test_instantiate_struct_method_binds_receiver() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let method = FunctionDecl {
        name: String::from("get"),
        generic_params: vec![],
        params: vec![],
        return_type: Some(TypeExpr::plain("T")),
        body: Block::default(),
        line: 4,
    };

    let (name, instance) = instantiate_struct_method(
        "Box<u64>",
        &method,
        &[TypeExpr::plain("u64")],
        &[String::from("T")],
        &mut table,
        root,
        7,
    )
    .unwrap();

    assert_eq!(name, "Box_u64__get");
    let instance = instance.unwrap();
    assert_eq!(instance.params[0].name, "this");
    assert_eq!(canonical_name(&instance.params[0].ty), "*Box<u64>");
    assert_eq!(instance.return_type.as_ref().unwrap().name, "u64");

    match &table.resolve_function("Box_u64__get").unwrap().kind {
        FunctionKind::Method {
            receiver,
            original_name,
        } => {
            assert_eq!(receiver, "Box<u64>");
            assert_eq!(original_name, "get");
        }
        other => panic!("expected a method registration, found {:?}", other),
    }
}

#[test]
fn test_method_generic_shadowing_is_rejected() {
    let shadowing = StructDecl {
        name: String::from("Box"),
        generic_params: vec![String::from("T")],
        parent: None,
        fields: vec![],
        methods: vec![FunctionDecl {
            name: String::from("map"),
            generic_params: vec![String::from("T")],
            params: vec![],
            return_type: None,
            body: Block::default(),
            line: 3,
        }],
        line: 1,
    };
    let error = check_method_generics(&shadowing).unwrap_err();
    assert_eq!(error.get_error_name(), "GenericParameterShadowed");
    assert_eq!(error.get_line(), 3);

    let disjoint = StructDecl {
        methods: vec![FunctionDecl {
            name: String::from("map"),
            generic_params: vec![String::from("U")],
            params: vec![],
            return_type: None,
            body: Block::default(),
            line: 3,
        }],
        ..shadowing
    };
    assert!(check_method_generics(&disjoint).is_ok());
}
