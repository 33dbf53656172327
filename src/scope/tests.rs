use std::rc::Rc;

use super::info::{Binding, FunctionInfo, FunctionKind, TypeInfo};
use super::scope::{align_to, default_method_mangler, unpadded_size, SymbolTable};
use crate::ast::statements::FieldDecl;
use crate::ast::types::TypeExpr;

fn extern_info(name: &str, params: &[&str]) -> FunctionInfo {
    FunctionInfo {
        name: String::from(name),
        label: String::from(name),
        params: params
            .iter()
            .map(|ty| (String::from("arg"), TypeExpr::plain(ty)))
            .collect(),
        return_type: None,
        kind: FunctionKind::External {
            variadic: false,
            variadic_type: None,
        },
        decl: None,
    }
}

#[test]
fn test_primitives_are_seeded() {
    let table = SymbolTable::new();
    let root = table.root();
    for (name, size) in [("u8", 1), ("u16", 2), ("u32", 4), ("u64", 8), ("f32", 4), ("f64", 8)] {
        let info = table.resolve_type(root, name).unwrap();
        assert_eq!(info.borrow().size, size, "size of {}", name);
        assert!(info.borrow().primitive);
    }
    assert_eq!(table.resolve_type(root, "string").unwrap().borrow().size, 8);
}

#[test]
fn test_define_and_shadow_variables() {
    let mut table = SymbolTable::new();
    let root = table.root();
    table
        .define(root, "x", Binding::new(TypeExpr::plain("u64"), false, 1))
        .unwrap();

    // Duplicate in the same scope is an error.
    assert!(table
        .define(root, "x", Binding::new(TypeExpr::plain("u8"), false, 2))
        .is_err());

    // A nested scope shadows the outer binding.
    let inner = table.push_scope(root);
    table
        .define(inner, "x", Binding::new(TypeExpr::plain("u8"), false, 3))
        .unwrap();
    assert_eq!(table.resolve(inner, "x").unwrap().ty.name, "u8");
    assert_eq!(table.resolve(root, "x").unwrap().ty.name, "u64");
}

#[test]
fn test_resolve_counts_reads() {
    let mut table = SymbolTable::new();
    let root = table.root();
    table
        .define(root, "x", Binding::new(TypeExpr::plain("u64"), false, 1))
        .unwrap();

    assert_eq!(table.resolve_for_write(root, "x").unwrap().uses, 0);
    table.resolve(root, "x");
    table.resolve(root, "x");
    assert_eq!(table.resolve_for_write(root, "x").unwrap().uses, 2);

    let inner = table.push_scope(root);
    assert!(table.resolve(inner, "x").is_some(), "chain lookup");
    assert!(table.resolve(inner, "missing").is_none());
}

#[test]
fn test_function_namespace_is_global() {
    let mut table = SymbolTable::new();
    let plain = FunctionInfo {
        kind: FunctionKind::Plain,
        ..extern_info("main", &["u64"])
    };
    table.define_function(plain.clone(), 1).unwrap();
    assert!(table.resolve_function("main").is_some());
    assert!(table.define_function(plain, 2).is_err(), "non-external duplicate");
}

#[test]
fn test_extern_redeclaration_rules() {
    let mut table = SymbolTable::new();
    table.define_function(extern_info("write", &["u64"]), 1).unwrap();

    // A wider signature replaces the prior entry.
    table
        .define_function(extern_info("write", &["u64", "u64", "u64"]), 2)
        .unwrap();
    assert_eq!(table.resolve_function("write").unwrap().params.len(), 3);

    // A narrower one is a no-op, not an error.
    table.define_function(extern_info("write", &["u64"]), 3).unwrap();
    assert_eq!(table.resolve_function("write").unwrap().params.len(), 3);
}

#[test]
fn test_struct_layout_pads_fields() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let fields = vec![
        (String::from("a"), TypeExpr::plain("u8")),
        (String::from("b"), TypeExpr::plain("u64")),
    ];
    let (members, size, alignment) = table.layout_struct(&fields, root, None, 1).unwrap();

    assert_eq!(members[0].offset, 0);
    assert_eq!(members[1].offset, 8, "u64 field is padded to its alignment");
    assert_eq!(size, 16, "total size is padded to the max member alignment");
    assert_eq!(alignment, 8);
}

#[test]
fn test_layout_offsets_strictly_increase() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let fields = vec![
        (String::from("a"), TypeExpr::plain("u32")),
        (String::from("b"), TypeExpr::plain("u8")),
        (String::from("c"), TypeExpr::plain("u16")),
        (String::from("d"), TypeExpr::pointer("u8", 1)),
    ];
    let (members, size, _) = table.layout_struct(&fields, root, None, 1).unwrap();
    assert_eq!(
        members.iter().map(|m| m.offset).collect::<Vec<_>>(),
        vec![0, 4, 6, 8]
    );
    assert_eq!(size, 16);
}

#[test]
fn test_unpadded_fallback_matches_layout_when_naturally_aligned() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let fields = vec![
        (String::from("a"), TypeExpr::plain("u64")),
        (String::from("b"), TypeExpr::plain("u32")),
        (String::from("c"), TypeExpr::plain("u32")),
    ];
    let (members, size, _) = table.layout_struct(&fields, root, None, 1).unwrap();
    assert_eq!(unpadded_size(&members), size);
}

#[test]
fn test_array_field_layout() {
    let mut table = SymbolTable::new();
    let root = table.root();
    let fields = vec![
        (String::from("data"), TypeExpr::array("u32", vec![4])),
        (String::from("len"), TypeExpr::plain("u64")),
    ];
    let (members, size, _) = table.layout_struct(&fields, root, None, 1).unwrap();
    assert_eq!(members[0].size, 16);
    assert_eq!(members[1].offset, 16);
    assert_eq!(size, 24);
}

fn box_template(table: &mut SymbolTable) {
    // struct Box<T> { value: T, next: *Box<T> }
    let template = TypeInfo {
        generic_params: Some(vec![String::from("T")]),
        template_fields: Some(vec![
            FieldDecl {
                name: String::from("value"),
                ty: TypeExpr::plain("T"),
                line: 2,
            },
            FieldDecl {
                name: String::from("next"),
                ty: TypeExpr {
                    pointer_depth: 1,
                    ..TypeExpr::generic("Box", vec![TypeExpr::plain("T")])
                },
                line: 3,
            },
        ]),
        ..TypeInfo::named("Box")
    };
    table.define_type(template, 1).unwrap();
}

#[test]
fn test_generic_instantiation_is_cached() {
    let mut table = SymbolTable::new();
    let root = table.root();
    box_template(&mut table);

    let args = vec![TypeExpr::plain("u64")];
    let first = table.resolve_generic_type("Box", &args, root, None, 5).unwrap();
    let second = table.resolve_generic_type("Box", &args, root, None, 9).unwrap();
    assert!(Rc::ptr_eq(&first, &second), "cache must return the identical object");

    let info = first.borrow();
    assert_eq!(info.name, "Box<u64>");
    assert_eq!(info.members.len(), 2);
    assert_eq!(info.member("value").unwrap().offset, 0);
    assert_eq!(info.member("next").unwrap().offset, 8);
    assert_eq!(info.member("next").unwrap().type_name, "*Box<u64>");
    assert_eq!(info.size, 16);
}

#[test]
fn test_generic_argument_count_is_checked() {
    let mut table = SymbolTable::new();
    let root = table.root();
    box_template(&mut table);

    let too_many = vec![TypeExpr::plain("u64"), TypeExpr::plain("u8")];
    let error = table
        .resolve_generic_type("Box", &too_many, root, None, 5)
        .unwrap_err();
    assert_eq!(error.get_error_name(), "GenericArgumentCount");

    let error = table
        .resolve_generic_type("Missing", &[TypeExpr::plain("u64")], root, None, 5)
        .unwrap_err();
    assert_eq!(error.get_error_name(), "TypeNotDefined");
}

#[test]
fn test_nested_generic_instantiation() {
    let mut table = SymbolTable::new();
    let root = table.root();
    box_template(&mut table);

    let nested = vec![TypeExpr::generic("Box", vec![TypeExpr::plain("u8")])];
    let outer = table.resolve_generic_type("Box", &nested, root, None, 7).unwrap();
    assert_eq!(outer.borrow().name, "Box<Box<u8>>");

    // The inner instantiation was created on demand.
    assert!(table.resolve_type(root, "Box<u8>").is_some());
}

#[test]
fn test_inherited_members_are_copied_first() {
    let mut table = SymbolTable::new();
    let root = table.root();

    let (members, size, alignment) = table
        .layout_struct(
            &[(String::from("id"), TypeExpr::plain("u64"))],
            root,
            None,
            1,
        )
        .unwrap();
    table
        .define_type(
            TypeInfo {
                members,
                size,
                alignment,
                ..TypeInfo::named("Base")
            },
            1,
        )
        .unwrap();

    let template = TypeInfo {
        generic_params: Some(vec![String::from("T")]),
        parent: Some(String::from("Base")),
        template_fields: Some(vec![FieldDecl {
            name: String::from("value"),
            ty: TypeExpr::plain("T"),
            line: 3,
        }]),
        ..TypeInfo::named("Child")
    };
    table.define_type(template, 2).unwrap();

    let instance = table
        .resolve_generic_type("Child", &[TypeExpr::plain("u8")], root, None, 9)
        .unwrap();
    let info = instance.borrow();
    assert_eq!(info.members[0].name, "id");
    assert_eq!(info.members[0].offset, 0);
    assert_eq!(info.member("value").unwrap().offset, 8);
}

#[test]
fn test_default_method_mangler() {
    assert_eq!(default_method_mangler("Point", "scale"), "Point__scale");
    assert_eq!(default_method_mangler("Box<u64>", "get"), "Box_u64__get");
}

#[test]
fn test_align_to() {
    assert_eq!(align_to(0, 8), 0);
    assert_eq!(align_to(1, 8), 8);
    assert_eq!(align_to(8, 8), 8);
    assert_eq!(align_to(9, 4), 12);
}
