//! Resolved symbol records.
//!
//! `TypeInfo` describes a resolved (or template) type, `FunctionInfo` a
//! resolved function, and `Binding` a variable in one lexical scope. These
//! are the records the analyzer writes into the symbol table and the
//! lowerer reads back out.

use std::rc::Rc;

use crate::ast::statements::{FieldDecl, FunctionDecl};
use crate::ast::types::TypeExpr;

use super::scope::ScopeId;

/// One field of a resolved struct type.
///
/// The field type is stored as its canonical flattened name; accessors
/// re-parse it into a structured reference on demand (instantiated generic
/// members keep names like `"Inner<u64>"`).
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub type_name: String,
    pub size: u64,
    pub offset: u64,
    pub alignment: u64,
    /// Declaration order, which is also the IR field index.
    pub index: usize,
}

/// A resolved type, or a generic template awaiting instantiation.
///
/// Templates carry `generic_params` plus their unresolved field and method
/// declarations and have no members; instantiation fills a fresh `TypeInfo`
/// with concrete, laid-out members.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub size: u64,
    pub alignment: u64,
    pub primitive: bool,
    /// Ordered by declaration index; offsets are strictly increasing.
    pub members: Vec<Member>,
    pub generic_params: Option<Vec<String>>,
    pub template_fields: Option<Vec<FieldDecl>>,
    pub template_methods: Vec<FunctionDecl>,
    /// Single inheritance parent, if any.
    pub parent: Option<String>,
    /// The scope the declaration appeared in; consulted as a resolution
    /// fallback for fields whose types were only visible there.
    pub defining_scope: Option<ScopeId>,
}

impl TypeInfo {
    pub fn primitive(name: &str, size: u64, alignment: u64) -> Self {
        TypeInfo {
            name: String::from(name),
            size,
            alignment,
            primitive: true,
            members: vec![],
            generic_params: None,
            template_fields: None,
            template_methods: vec![],
            parent: None,
            defining_scope: None,
        }
    }

    pub fn named(name: &str) -> Self {
        TypeInfo {
            primitive: false,
            ..TypeInfo::primitive(name, 0, 1)
        }
    }

    pub fn is_template(&self) -> bool {
        self.generic_params.is_some()
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.name == name)
    }
}

/// What kind of function a `FunctionInfo` describes. Each variant only
/// carries the fields that apply to it.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    Plain,
    External {
        variadic: bool,
        variadic_type: Option<TypeExpr>,
    },
    Method {
        receiver: String,
        original_name: String,
    },
    GenericTemplate {
        params: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    /// Linkage label used in the emitted IR.
    pub label: String,
    pub params: Vec<(String, TypeExpr)>,
    /// None means void.
    pub return_type: Option<TypeExpr>,
    pub kind: FunctionKind,
    /// The originating declaration, kept for later monomorphization and
    /// lowering.
    pub decl: Option<Rc<FunctionDecl>>,
}

impl FunctionInfo {
    pub fn is_external(&self) -> bool {
        matches!(self.kind, FunctionKind::External { .. })
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.kind, FunctionKind::External { variadic: true, .. })
    }

    pub fn variadic_type(&self) -> Option<&TypeExpr> {
        match &self.kind {
            FunctionKind::External { variadic_type, .. } => variadic_type.as_ref(),
            _ => None,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self.kind, FunctionKind::GenericTemplate { .. })
    }
}

/// A variable binding in one lexical scope.
#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: TypeExpr,
    pub constant: bool,
    /// Bumped by every read resolution; drives unused-variable advisories.
    pub uses: u32,
    pub line: u32,
}

impl Binding {
    pub fn new(ty: TypeExpr, constant: bool, line: u32) -> Self {
        Binding {
            ty,
            constant,
            uses: 0,
            line,
        }
    }
}
