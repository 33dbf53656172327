use std::fmt::Display;

/// A lowered type. Struct types are referenced by their sanitized name and
/// declared once at module level.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Void,
    Ptr(Box<IrType>),
    Array(u64, Box<IrType>),
    Struct(String),
}

impl IrType {
    pub fn pointer_to(self) -> IrType {
        IrType::Ptr(Box::new(self))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }
}

impl Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F32 => write!(f, "float"),
            IrType::F64 => write!(f, "double"),
            IrType::Void => write!(f, "void"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Array(count, element) => write!(f, "[{} x {}]", count, element),
            IrType::Struct(name) => write!(f, "%{}", name),
        }
    }
}

/// An operand: a numbered temporary, an immediate, a global symbol, a named
/// function argument, or null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Temp(u32),
    Int(i64),
    Float(f64),
    Global(String),
    Arg(String),
    Null,
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Temp(index) => write!(f, "%t{}", index),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Arg(name) => write!(f, "%{}", name),
            Value::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl IrOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            IrOp::Add => "add",
            IrOp::Sub => "sub",
            IrOp::Mul => "mul",
            IrOp::Div => "sdiv",
            IrOp::Rem => "srem",
            IrOp::Shl => "shl",
            IrOp::Shr => "ashr",
            IrOp::And => "and",
            IrOp::Or => "or",
            IrOp::Xor => "xor",
            IrOp::FAdd => "fadd",
            IrOp::FSub => "fsub",
            IrOp::FMul => "fmul",
            IrOp::FDiv => "fdiv",
            IrOp::FRem => "frem",
        }
    }
}

/// Integer comparison predicates. Always signed, including for unsigned
/// operand types; a known simplification of this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl IcmpPred {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Slt => "slt",
            IcmpPred::Sle => "sle",
            IcmpPred::Sgt => "sgt",
            IcmpPred::Sge => "sge",
        }
    }
}

/// Ordered float comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcmpPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl FcmpPred {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            FcmpPred::Oeq => "oeq",
            FcmpPred::One => "one",
            FcmpPred::Olt => "olt",
            FcmpPred::Ole => "ole",
            FcmpPred::Ogt => "ogt",
            FcmpPred::Oge => "oge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Trunc,
    Zext,
    Sext,
    Fptrunc,
    Fpext,
    Fptosi,
    Sitofp,
    Ptrtoint,
    Inttoptr,
    Bitcast,
}

impl CastOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::Zext => "zext",
            CastOp::Sext => "sext",
            CastOp::Fptrunc => "fptrunc",
            CastOp::Fpext => "fpext",
            CastOp::Fptosi => "fptosi",
            CastOp::Sitofp => "sitofp",
            CastOp::Ptrtoint => "ptrtoint",
            CastOp::Inttoptr => "inttoptr",
            CastOp::Bitcast => "bitcast",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Binary {
        dest: u32,
        op: IrOp,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    Icmp {
        dest: u32,
        pred: IcmpPred,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    Fcmp {
        dest: u32,
        pred: FcmpPred,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    Alloca {
        dest: u32,
        ty: IrType,
    },
    Load {
        dest: u32,
        ty: IrType,
        ptr: Value,
    },
    Store {
        ty: IrType,
        value: Value,
        ptr: Value,
    },
    Call {
        dest: Option<u32>,
        ret: IrType,
        callee: String,
        args: Vec<(IrType, Value)>,
    },
    Gep {
        dest: u32,
        /// The pointee type of `ptr`.
        ty: IrType,
        ptr: Value,
        indices: Vec<(IrType, Value)>,
    },
    Cast {
        dest: u32,
        op: CastOp,
        from: IrType,
        value: Value,
        to: IrType,
    },
}

/// Every basic block ends in exactly one terminator.
#[derive(Debug, Clone)]
pub enum Terminator {
    Ret(Option<(IrType, Value)>),
    Br(String),
    CondBr {
        cond: Value,
        then_label: String,
        else_label: String,
    },
    Switch {
        ty: IrType,
        value: Value,
        default: String,
        cases: Vec<(i64, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

/// A function. No blocks means a forward declaration (externs).
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub ret: IrType,
    pub variadic: bool,
    pub blocks: Vec<BasicBlock>,
}

#[derive(Debug, Clone)]
pub enum GlobalInit {
    /// String constant bytes, rendered NUL-terminated.
    Bytes(Vec<u8>),
    Value(Value),
    Zero,
}

#[derive(Debug, Clone)]
pub struct IrGlobal {
    pub name: String,
    pub ty: IrType,
    pub init: GlobalInit,
    pub constant: bool,
}

#[derive(Debug, Clone)]
pub struct IrStruct {
    pub name: String,
    pub fields: Vec<IrType>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub structs: Vec<IrStruct>,
    pub globals: Vec<IrGlobal>,
    pub functions: Vec<IrFunction>,
}
