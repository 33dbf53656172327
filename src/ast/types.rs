//! Unresolved type references.
//!
//! During parsing every type annotation is recorded as a `TypeExpr`: a base
//! name plus pointer/array decorations and optional generic arguments. The
//! semantic analyzer resolves these against the symbol table; nothing here
//! knows about sizes or layout.

use std::fmt::Display;

/// An unresolved type reference as written in source.
///
/// `pointer_depth` counts leading `*`s, `array_dims` holds the declared
/// dimensions in order (0 meaning unsized), and `generic_args` carries the
/// nested arguments of a `Base<...>` reference. `from_literal` marks types
/// inferred from literal expressions, which are allowed to narrow silently.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub name: String,
    pub pointer_depth: usize,
    pub array_dims: Vec<u64>,
    pub generic_args: Vec<TypeExpr>,
    pub from_literal: bool,
}

impl TypeExpr {
    pub fn plain(name: &str) -> Self {
        TypeExpr {
            name: String::from(name),
            pointer_depth: 0,
            array_dims: vec![],
            generic_args: vec![],
            from_literal: false,
        }
    }

    pub fn literal(name: &str) -> Self {
        TypeExpr {
            from_literal: true,
            ..TypeExpr::plain(name)
        }
    }

    pub fn pointer(name: &str, depth: usize) -> Self {
        TypeExpr {
            pointer_depth: depth,
            ..TypeExpr::plain(name)
        }
    }

    pub fn generic(name: &str, args: Vec<TypeExpr>) -> Self {
        TypeExpr {
            generic_args: args,
            ..TypeExpr::plain(name)
        }
    }

    pub fn array(name: &str, dims: Vec<u64>) -> Self {
        TypeExpr {
            array_dims: dims,
            ..TypeExpr::plain(name)
        }
    }

    /// A copy with one more level of pointer indirection.
    pub fn reference(&self) -> Self {
        TypeExpr {
            pointer_depth: self.pointer_depth + 1,
            from_literal: false,
            ..self.clone()
        }
    }

    /// A copy with one level of pointer indirection removed.
    ///
    /// Callers must check `is_pointer` first.
    pub fn dereference(&self) -> Self {
        TypeExpr {
            pointer_depth: self.pointer_depth - 1,
            from_literal: false,
            ..self.clone()
        }
    }

    /// The element type obtained by indexing once: drops the outermost array
    /// dimension if present, otherwise one level of indirection.
    pub fn element(&self) -> Self {
        if !self.array_dims.is_empty() {
            TypeExpr {
                array_dims: self.array_dims[1..].to_vec(),
                from_literal: false,
                ..self.clone()
            }
        } else {
            self.dereference()
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0 && self.array_dims.is_empty()
    }

    pub fn is_array(&self) -> bool {
        !self.array_dims.is_empty()
    }

    /// Whether this is a bare name with no decorations.
    pub fn is_plain(&self) -> bool {
        self.pointer_depth == 0 && self.array_dims.is_empty() && self.generic_args.is_empty()
    }
}

impl Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The canonical spelling: *s, base name, <args>, [dims].
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        write!(f, "{}", self.name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (index, arg) in self.generic_args.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        for dim in &self.array_dims {
            if *dim == 0 {
                write!(f, "[]")?;
            } else {
                write!(f, "[{}]", dim)?;
            }
        }
        Ok(())
    }
}
