//! Statement and declaration nodes.

use std::rc::Rc;

use super::expressions::Expr;
use super::types::TypeExpr;

/// A parsed compilation unit: the ordered top-level statements of one file.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Stmt { kind, line }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expression(Expr),
    Block(Block),
    /// `local name: ty = value;` or `const name: ty = value;`
    Declaration {
        name: String,
        ty: Option<TypeExpr>,
        value: Option<Expr>,
        constant: bool,
    },
    Assignment {
        target: Expr,
        value: Expr,
    },
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Switch {
        value: Expr,
        cases: Vec<(i64, Block)>,
        default: Option<Block>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Function(Rc<FunctionDecl>),
    Extern(ExternDecl),
    Struct(StructDecl),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

/// A `frame` declaration. Also used for struct methods, where an implicit
/// `this` receiver is added during analysis.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub variadic: bool,
    /// Declared element type of the variadic tail, if any.
    pub variadic_type: Option<TypeExpr>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub parent: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub line: u32,
}
