use std::fmt::Display;

use thiserror::Error;

/// A fatal semantic diagnostic.
///
/// Carries the error kind and the 1-based source line the offending
/// construct was declared on. Fatal errors abort the analysis walk for the
/// compilation unit.
#[derive(Debug, Clone)]
pub struct Error {
    internal_error: ErrorKind,
    line: u32,
}

impl Error {
    pub fn new(error_kind: ErrorKind, line: u32) -> Self {
        Error {
            internal_error: error_kind,
            line,
        }
    }

    pub fn get_line(&self) -> u32 {
        self.line
    }

    pub fn get_kind(&self) -> &ErrorKind {
        &self.internal_error
    }

    /// The rendered message of the underlying kind.
    pub fn message(&self) -> String {
        self.internal_error.to_string()
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorKind::VariableAlreadyDefined { .. } => "VariableAlreadyDefined",
            ErrorKind::VariableNotDefined { .. } => "VariableNotDefined",
            ErrorKind::TypeAlreadyDefined { .. } => "TypeAlreadyDefined",
            ErrorKind::TypeNotDefined { .. } => "TypeNotDefined",
            ErrorKind::FunctionAlreadyDefined { .. } => "FunctionAlreadyDefined",
            ErrorKind::FunctionNotDefined { .. } => "FunctionNotDefined",
            ErrorKind::MethodNotDefined { .. } => "MethodNotDefined",
            ErrorKind::MemberNotDefined { .. } => "MemberNotDefined",
            ErrorKind::TypeMismatch { .. } => "TypeMismatch",
            ErrorKind::ArgumentTypeMismatch { .. } => "ArgumentTypeMismatch",
            ErrorKind::ArgumentCount { .. } => "ArgumentCount",
            ErrorKind::GenericArgumentCount { .. } => "GenericArgumentCount",
            ErrorKind::UnresolvedGenericArgument { .. } => "UnresolvedGenericArgument",
            ErrorKind::GenericParameterShadowed { .. } => "GenericParameterShadowed",
            ErrorKind::RecursiveStruct { .. } => "RecursiveStruct",
            ErrorKind::UninitializedConst { .. } => "UninitializedConst",
            ErrorKind::ConstReassigned { .. } => "ConstReassigned",
            ErrorKind::VoidFunctionReturnsValue { .. } => "VoidFunctionReturnsValue",
            ErrorKind::MissingReturnValue { .. } => "MissingReturnValue",
            ErrorKind::ReturnOutsideFunction => "ReturnOutsideFunction",
            ErrorKind::BreakOutsideLoop => "BreakOutsideLoop",
            ErrorKind::ContinueOutsideLoop => "ContinueOutsideLoop",
            ErrorKind::ReceiverReassigned => "ReceiverReassigned",
            ErrorKind::NotIndexable { .. } => "NotIndexable",
            ErrorKind::NotAStruct { .. } => "NotAStruct",
            ErrorKind::InvalidPointerArithmetic { .. } => "InvalidPointerArithmetic",
            ErrorKind::NegativeShift { .. } => "NegativeShift",
            ErrorKind::ShiftOutOfRange { .. } => "ShiftOutOfRange",
            ErrorKind::ShiftOnFloat => "ShiftOnFloat",
            ErrorKind::ModuloByZero => "ModuloByZero",
            ErrorKind::InvalidAssignmentTarget => "InvalidAssignmentTarget",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorKind::VariableAlreadyDefined { name } => ErrorTip::Suggestion(format!(
                "variable `{}` is already defined in this scope",
                name
            )),
            ErrorKind::VariableNotDefined { name } => {
                ErrorTip::Suggestion(format!("variable `{}` is not defined", name))
            }
            ErrorKind::TypeAlreadyDefined { name } => {
                ErrorTip::Suggestion(format!("type `{}` is already defined", name))
            }
            ErrorKind::TypeNotDefined { name } => {
                ErrorTip::Suggestion(format!("unknown type `{}`", name))
            }
            ErrorKind::FunctionAlreadyDefined { name } => ErrorTip::Suggestion(format!(
                "function `{}` is already defined; only externs may be re-declared",
                name
            )),
            ErrorKind::FunctionNotDefined { name } => {
                ErrorTip::Suggestion(format!("function `{}` is not defined", name))
            }
            ErrorKind::MethodNotDefined { struct_name, method } => ErrorTip::Suggestion(format!(
                "`{}` has no method `{}`, not even on a parent type",
                struct_name, method
            )),
            ErrorKind::MemberNotDefined { struct_name, member } => {
                ErrorTip::Suggestion(format!("`{}` has no member `{}`", struct_name, member))
            }
            ErrorKind::TypeMismatch { expected, received } => ErrorTip::Suggestion(format!(
                "expected `{}`, received `{}`",
                expected, received
            )),
            ErrorKind::ArgumentTypeMismatch { expected, received } => ErrorTip::Suggestion(
                format!("expected argument of type `{}`, received `{}`", expected, received),
            ),
            ErrorKind::ArgumentCount { function, expected, received } => {
                ErrorTip::Suggestion(format!(
                    "`{}` takes {} arguments but {} were supplied",
                    function, expected, received
                ))
            }
            ErrorKind::GenericArgumentCount { name, expected, received } => {
                ErrorTip::Suggestion(format!(
                    "`{}` takes {} type arguments but {} were supplied",
                    name, expected, received
                ))
            }
            ErrorKind::UnresolvedGenericArgument { name } => ErrorTip::Suggestion(format!(
                "type argument `{}` does not name a known type",
                name
            )),
            ErrorKind::GenericParameterShadowed { name } => ErrorTip::Suggestion(format!(
                "rename the method parameter `{}` so it does not shadow the struct parameter",
                name
            )),
            ErrorKind::RecursiveStruct { name } => ErrorTip::Suggestion(format!(
                "`{}` may only contain itself behind a pointer or array",
                name
            )),
            ErrorKind::UninitializedConst { name } => ErrorTip::Suggestion(format!(
                "give `{}` a value at its declaration",
                name
            )),
            ErrorKind::ConstReassigned { name } => ErrorTip::Suggestion(format!(
                "`{}` is a constant; declare it without `const` to allow reassignment",
                name
            )),
            ErrorKind::VoidFunctionReturnsValue { function } => ErrorTip::Suggestion(format!(
                "`{}` has no return type; remove the return value",
                function
            )),
            ErrorKind::MissingReturnValue { function } => ErrorTip::Suggestion(format!(
                "`{}` declares a return type; return a value",
                function
            )),
            ErrorKind::ReturnOutsideFunction => ErrorTip::None,
            ErrorKind::BreakOutsideLoop => ErrorTip::None,
            ErrorKind::ContinueOutsideLoop => ErrorTip::None,
            ErrorKind::ReceiverReassigned => ErrorTip::Suggestion(String::from(
                "`this` always refers to the receiver and cannot be rebound",
            )),
            ErrorKind::NotIndexable { type_name } => ErrorTip::Suggestion(format!(
                "`{}` is neither an array nor a pointer",
                type_name
            )),
            ErrorKind::NotAStruct { type_name } => ErrorTip::Suggestion(format!(
                "`{}` is not a struct type",
                type_name
            )),
            ErrorKind::InvalidPointerArithmetic { operation } => ErrorTip::Suggestion(format!(
                "`{}` of two pointers has no meaning; cast to u64 first",
                operation
            )),
            ErrorKind::NegativeShift { .. } => {
                ErrorTip::Suggestion(String::from("shift amounts must be non-negative"))
            }
            ErrorKind::ShiftOutOfRange { type_name, .. } => ErrorTip::Suggestion(format!(
                "the shift amount must be smaller than the bit width of `{}`",
                type_name
            )),
            ErrorKind::ShiftOnFloat => {
                ErrorTip::Suggestion(String::from("bit shifts are only defined on integers"))
            }
            ErrorKind::ModuloByZero => ErrorTip::None,
            ErrorKind::InvalidAssignmentTarget => ErrorTip::Suggestion(String::from(
                "only variables, members, indexes and dereferences can be assigned to",
            )),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.internal_error)
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ErrorKind {
    #[error("variable {name:?} already defined")]
    VariableAlreadyDefined { name: String },
    #[error("variable {name:?} not defined")]
    VariableNotDefined { name: String },
    #[error("type {name:?} already defined")]
    TypeAlreadyDefined { name: String },
    #[error("unknown type {name:?}")]
    TypeNotDefined { name: String },
    #[error("function {name:?} already defined")]
    FunctionAlreadyDefined { name: String },
    #[error("function {name:?} not defined")]
    FunctionNotDefined { name: String },
    #[error("struct {struct_name:?} has no method {method:?}")]
    MethodNotDefined { struct_name: String, method: String },
    #[error("struct {struct_name:?} has no member {member:?}")]
    MemberNotDefined { struct_name: String, member: String },
    #[error("types do not match: expected {expected:?}, received {received:?}")]
    TypeMismatch { expected: String, received: String },
    #[error("argument types do not match: expected {expected:?}, received {received:?}")]
    ArgumentTypeMismatch { expected: String, received: String },
    #[error("function {function:?} expects {expected} arguments, received {received}")]
    ArgumentCount {
        function: String,
        expected: usize,
        received: usize,
    },
    #[error("generic {name:?} expects {expected} type arguments, received {received}")]
    GenericArgumentCount {
        name: String,
        expected: usize,
        received: usize,
    },
    #[error("unresolved generic type argument {name:?}")]
    UnresolvedGenericArgument { name: String },
    #[error("method generic parameter {name:?} shadows a struct generic parameter")]
    GenericParameterShadowed { name: String },
    #[error("struct {name:?} contains itself by value")]
    RecursiveStruct { name: String },
    #[error("constant {name:?} declared without a value")]
    UninitializedConst { name: String },
    #[error("constant {name:?} cannot be reassigned")]
    ConstReassigned { name: String },
    #[error("void function {function:?} returns a value")]
    VoidFunctionReturnsValue { function: String },
    #[error("function {function:?} must return a value")]
    MissingReturnValue { function: String },
    #[error("return outside of a function")]
    ReturnOutsideFunction,
    #[error("break outside of a loop")]
    BreakOutsideLoop,
    #[error("continue outside of a loop")]
    ContinueOutsideLoop,
    #[error("the method receiver cannot be reassigned")]
    ReceiverReassigned,
    #[error("type {type_name:?} cannot be indexed")]
    NotIndexable { type_name: String },
    #[error("type {type_name:?} has no members")]
    NotAStruct { type_name: String },
    #[error("invalid pointer arithmetic: {operation} of two pointers")]
    InvalidPointerArithmetic { operation: String },
    #[error("shift by negative amount {amount}")]
    NegativeShift { amount: i64 },
    #[error("undefined behavior: shift amount {amount} is out of range for {width}-bit type {type_name:?}")]
    ShiftOutOfRange {
        amount: i64,
        width: u32,
        type_name: String,
    },
    #[error("undefined behavior: shift on a float operand")]
    ShiftOnFloat,
    #[error("undefined behavior: modulo by zero")]
    ModuloByZero,
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}

/// An advisory diagnostic.
///
/// Warnings share the shape of fatal errors (message, line, optional hint)
/// but never halt compilation; they are collected during the walk and handed
/// back to the caller afterwards.
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub line: u32,
    pub hint: Option<String>,
}

impl Warning {
    pub fn new(message: String, line: u32) -> Self {
        Warning {
            message,
            line,
            hint: None,
        }
    }

    pub fn with_hint(message: String, line: u32, hint: String) -> Self {
        Warning {
            message,
            line,
            hint: Some(hint),
        }
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}
