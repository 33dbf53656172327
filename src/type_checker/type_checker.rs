use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::types::TypeExpr;

/// Width and signedness of a primitive integer type.
#[derive(Debug, Clone, Copy)]
pub struct IntInfo {
    pub bits: u32,
    pub signed: bool,
}

lazy_static! {
    pub static ref INTEGER_TYPES: HashMap<&'static str, IntInfo> = {
        let mut map = HashMap::new();
        map.insert("u8", IntInfo { bits: 8, signed: false });
        map.insert("u16", IntInfo { bits: 16, signed: false });
        map.insert("u32", IntInfo { bits: 32, signed: false });
        map.insert("u64", IntInfo { bits: 64, signed: false });
        map.insert("i8", IntInfo { bits: 8, signed: true });
        map.insert("i16", IntInfo { bits: 16, signed: true });
        map.insert("i32", IntInfo { bits: 32, signed: true });
        map.insert("i64", IntInfo { bits: 64, signed: true });
        map
    };
    pub static ref FLOAT_WIDTHS: HashMap<&'static str, u32> = {
        let mut map = HashMap::new();
        map.insert("f32", 32);
        map.insert("f64", 64);
        map
    };
    static ref GENERIC_SHAPE: Regex =
        Regex::new("^([A-Za-z_][A-Za-z0-9_]*)<(.+)>$").unwrap();
}

/// `string` is the surface spelling of `*u8`; comparisons work on the
/// aliased form.
pub fn aliased(ty: &TypeExpr) -> TypeExpr {
    if ty.name == "string" {
        TypeExpr {
            name: String::from("u8"),
            pointer_depth: ty.pointer_depth + 1,
            ..ty.clone()
        }
    } else {
        ty.clone()
    }
}

pub fn is_integer(ty: &TypeExpr) -> bool {
    ty.pointer_depth == 0 && ty.array_dims.is_empty() && INTEGER_TYPES.contains_key(ty.name.as_str())
}

pub fn is_float(ty: &TypeExpr) -> bool {
    ty.pointer_depth == 0 && ty.array_dims.is_empty() && FLOAT_WIDTHS.contains_key(ty.name.as_str())
}

pub fn is_numeric(ty: &TypeExpr) -> bool {
    is_integer(ty) || is_float(ty)
}

pub fn int_info(ty: &TypeExpr) -> Option<IntInfo> {
    if ty.pointer_depth == 0 && ty.array_dims.is_empty() {
        INTEGER_TYPES.get(ty.name.as_str()).copied()
    } else {
        None
    }
}

/// Whether `*u8`, the void-pointer convention.
fn is_void_pointer(ty: &TypeExpr) -> bool {
    ty.name == "u8" && ty.pointer_depth == 1 && ty.array_dims.is_empty()
}

fn is_u64(ty: &TypeExpr) -> bool {
    ty.name == "u64" && ty.pointer_depth == 0 && ty.array_dims.is_empty()
}

/// Whether a value of type `actual` may be used where `expected` is required.
///
/// Accepts: exact shape match; any float/float pair; int/float in either
/// direction; any int/int pair regardless of width or signedness; pointer
/// pairs where either side is the `*u8` void pointer or the names and depths
/// match; array literals against fixed arrays of equal dims and a compatible
/// base; pointer/`u64` in either direction (raw address). Everything else is
/// rejected.
pub fn check_type_compatibility(expected: &TypeExpr, actual: &TypeExpr) -> bool {
    let expected = aliased(expected);
    let actual = aliased(actual);

    if expected.to_string() == actual.to_string() {
        return true;
    }

    // Array literal against a fixed array of the same shape.
    if expected.is_array() || actual.is_array() {
        if actual.from_literal
            && expected.is_array()
            && actual.is_array()
            && expected.array_dims == actual.array_dims
        {
            let expected_base = TypeExpr {
                array_dims: vec![],
                ..expected.clone()
            };
            let actual_base = TypeExpr {
                array_dims: vec![],
                ..actual.clone()
            };
            return check_type_compatibility(&expected_base, &actual_base);
        }
        return false;
    }

    if expected.is_pointer() && actual.is_pointer() {
        return is_void_pointer(&expected)
            || is_void_pointer(&actual)
            || (expected.name == actual.name && expected.pointer_depth == actual.pointer_depth);
    }

    // Pointers convert to and from raw u64 addresses.
    if (expected.is_pointer() && is_u64(&actual)) || (is_u64(&expected) && actual.is_pointer()) {
        return true;
    }

    if is_float(&expected) && is_float(&actual) {
        return true;
    }
    if (is_integer(&expected) && is_float(&actual)) || (is_float(&expected) && is_integer(&actual)) {
        return true;
    }
    if is_integer(&expected) && is_integer(&actual) {
        return true;
    }

    false
}

/// Advisory classification of an already-accepted implicit cast.
///
/// Returns `None` for an exact match; otherwise a human-readable note. The
/// result never blocks compilation.
pub fn cast_warning(expected: &TypeExpr, actual: &TypeExpr) -> Option<String> {
    let expected = aliased(expected);
    let actual = aliased(actual);

    if expected.to_string() == actual.to_string() {
        return None;
    }

    if expected.is_pointer() && actual.is_pointer() {
        return Some(format!("pointer cast from `{}` to `{}`", actual, expected));
    }

    if (expected.is_pointer() && is_u64(&actual)) || (is_u64(&expected) && actual.is_pointer()) {
        return Some(format!(
            "unsafe pointer/integer cast between `{}` and `{}`",
            actual, expected
        ));
    }

    if expected.name == "f32" && actual.name == "f64" && is_float(&expected) && is_float(&actual) {
        return Some(String::from(
            "possible precision loss casting f64 to f32",
        ));
    }

    if let (Some(to), Some(from)) = (int_info(&expected), int_info(&actual)) {
        // Literals may narrow silently.
        if actual.from_literal {
            return None;
        }
        if to.bits > from.bits {
            return Some(format!(
                "implicit promotion from `{}` to `{}`",
                actual, expected
            ));
        }
        if to.bits < from.bits {
            return Some(format!(
                "implicit narrowing from `{}` to `{}` may lose information",
                actual, expected
            ));
        }
    }

    if is_float(&expected) && is_integer(&actual) {
        return Some(format!(
            "implicit conversion from integer `{}` to float `{}`",
            actual, expected
        ));
    }
    if is_integer(&expected) && is_float(&actual) {
        return Some(format!(
            "implicit conversion from float `{}` to integer `{}` truncates",
            actual, expected
        ));
    }

    Some(format!("implicit cast from `{}` to `{}`", actual, expected))
}

/// The canonical spelling of a type reference; the inverse of
/// `parse_type_name`.
pub fn canonical_name(ty: &TypeExpr) -> String {
    ty.to_string()
}

/// The canonical name of a generic instantiation, the cache key for the
/// instantiation cache. Structurally identical instantiations collapse to
/// the same string.
pub fn canonical_generic_name(base: &str, args: &[TypeExpr]) -> String {
    let rendered: Vec<String> = args.iter().map(canonical_name).collect();
    format!("{}<{}>", base, rendered.join(", "))
}

/// Parses a flattened type name (`"*Inner<u64>[4]"`) back into a structured
/// reference. Member types of instantiated generics are stored flattened and
/// re-parsed on access.
pub fn parse_type_name(raw: &str) -> TypeExpr {
    let mut rest = raw.trim();

    let mut pointer_depth = 0;
    while let Some(stripped) = rest.strip_prefix('*') {
        pointer_depth += 1;
        rest = stripped;
    }

    let mut dims_reversed = vec![];
    while rest.ends_with(']') {
        match rest.rfind('[') {
            Some(open) => {
                let dim = rest[open + 1..rest.len() - 1].trim();
                if dim.is_empty() {
                    dims_reversed.push(0);
                } else {
                    dims_reversed.push(dim.parse::<u64>().unwrap_or(0));
                }
                rest = rest[..open].trim_end();
            }
            None => break,
        }
    }
    dims_reversed.reverse();

    let (name, generic_args) = match GENERIC_SHAPE.captures(rest) {
        Some(captures) => {
            let base = captures.get(1).unwrap().as_str().to_string();
            let inner = captures.get(2).unwrap().as_str();
            let args = split_generic_args(inner)
                .iter()
                .map(|arg| parse_type_name(arg))
                .collect();
            (base, args)
        }
        None => (rest.to_string(), vec![]),
    };

    TypeExpr {
        name,
        pointer_depth,
        array_dims: dims_reversed,
        generic_args,
        from_literal: false,
    }
}

/// Splits a generic argument list on top-level commas, respecting nested
/// `<...>` depth.
pub fn split_generic_args(raw: &str) -> Vec<String> {
    let mut parts = vec![];
    let mut depth = 0;
    let mut current = String::new();

    for c in raw.chars() {
        match c {
            '<' => {
                depth += 1;
                current.push(c);
            }
            '>' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
}
