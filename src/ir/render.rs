//! Textual rendering of a lowered module.

use std::fmt::Write;

use super::ir::{BasicBlock, GlobalInit, Instruction, IrFunction, Module, Terminator};

/// Renders a module to its textual form: struct types first, then globals,
/// then declarations and definitions.
pub fn render_module(module: &Module) -> String {
    let mut out = String::new();

    for decl in &module.structs {
        let fields: Vec<String> = decl.fields.iter().map(|field| field.to_string()).collect();
        let _ = writeln!(out, "%{} = type {{ {} }}", decl.name, fields.join(", "));
    }
    if !module.structs.is_empty() {
        out.push('\n');
    }

    for global in &module.globals {
        let keyword = if global.constant { "constant" } else { "global" };
        match &global.init {
            GlobalInit::Bytes(bytes) => {
                let _ = writeln!(
                    out,
                    "@{} = private constant [{} x i8] c\"{}\\00\"",
                    global.name,
                    bytes.len() + 1,
                    escape_bytes(bytes)
                );
            }
            GlobalInit::Value(value) => {
                let _ = writeln!(out, "@{} = {} {} {}", global.name, keyword, global.ty, value);
            }
            GlobalInit::Zero => {
                let _ = writeln!(
                    out,
                    "@{} = {} {} zeroinitializer",
                    global.name, keyword, global.ty
                );
            }
        }
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    for function in &module.functions {
        render_function(&mut out, function);
    }

    out
}

fn render_function(out: &mut String, function: &IrFunction) {
    let mut params: Vec<String> = function
        .params
        .iter()
        .map(|(name, ty)| format!("{} %{}", ty, name))
        .collect();
    if function.variadic {
        params.push(String::from("..."));
    }
    let signature = format!(
        "{} @{}({})",
        function.ret,
        function.name,
        params.join(", ")
    );

    // Blockless functions are forward declarations.
    if function.blocks.is_empty() {
        let _ = writeln!(out, "declare {}", signature);
        out.push('\n');
        return;
    }

    let _ = writeln!(out, "define {} {{", signature);
    for block in &function.blocks {
        render_block(out, block);
    }
    out.push_str("}\n\n");
}

fn render_block(out: &mut String, block: &BasicBlock) {
    let _ = writeln!(out, "{}:", block.label);
    for instruction in &block.instructions {
        let _ = writeln!(out, "  {}", render_instruction(instruction));
    }
    if let Some(terminator) = &block.terminator {
        let _ = writeln!(out, "  {}", render_terminator(terminator));
    }
}

fn render_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Binary {
            dest,
            op,
            ty,
            lhs,
            rhs,
        } => format!("%t{} = {} {} {}, {}", dest, op.mnemonic(), ty, lhs, rhs),
        Instruction::Icmp {
            dest,
            pred,
            ty,
            lhs,
            rhs,
        } => format!("%t{} = icmp {} {} {}, {}", dest, pred.mnemonic(), ty, lhs, rhs),
        Instruction::Fcmp {
            dest,
            pred,
            ty,
            lhs,
            rhs,
        } => format!("%t{} = fcmp {} {} {}, {}", dest, pred.mnemonic(), ty, lhs, rhs),
        Instruction::Alloca { dest, ty } => format!("%t{} = alloca {}", dest, ty),
        Instruction::Load { dest, ty, ptr } => {
            format!("%t{} = load {}, {}* {}", dest, ty, ty, ptr)
        }
        Instruction::Store { ty, value, ptr } => {
            format!("store {} {}, {}* {}", ty, value, ty, ptr)
        }
        Instruction::Call {
            dest,
            ret,
            callee,
            args,
        } => {
            let rendered: Vec<String> = args
                .iter()
                .map(|(ty, value)| format!("{} {}", ty, value))
                .collect();
            match dest {
                Some(dest) => format!(
                    "%t{} = call {} @{}({})",
                    dest,
                    ret,
                    callee,
                    rendered.join(", ")
                ),
                None => format!("call {} @{}({})", ret, callee, rendered.join(", ")),
            }
        }
        Instruction::Gep {
            dest,
            ty,
            ptr,
            indices,
        } => {
            let rendered: Vec<String> = indices
                .iter()
                .map(|(index_ty, value)| format!("{} {}", index_ty, value))
                .collect();
            format!(
                "%t{} = getelementptr {}, {}* {}, {}",
                dest,
                ty,
                ty,
                ptr,
                rendered.join(", ")
            )
        }
        Instruction::Cast {
            dest,
            op,
            from,
            value,
            to,
        } => format!("%t{} = {} {} {} to {}", dest, op.mnemonic(), from, value, to),
    }
}

fn render_terminator(terminator: &Terminator) -> String {
    match terminator {
        Terminator::Ret(None) => String::from("ret void"),
        Terminator::Ret(Some((ty, value))) => format!("ret {} {}", ty, value),
        Terminator::Br(label) => format!("br label %{}", label),
        Terminator::CondBr {
            cond,
            then_label,
            else_label,
        } => format!(
            "br i1 {}, label %{}, label %{}",
            cond, then_label, else_label
        ),
        Terminator::Switch {
            ty,
            value,
            default,
            cases,
        } => {
            let rendered: Vec<String> = cases
                .iter()
                .map(|(case, label)| format!("{} {}, label %{}", ty, case, label))
                .collect();
            format!(
                "switch {} {}, label %{} [ {} ]",
                ty,
                value,
                default,
                rendered.join(" ")
            )
        }
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for byte in bytes {
        if (0x20..0x7f).contains(byte) && *byte != b'"' && *byte != b'\\' {
            out.push(*byte as char);
        } else {
            let _ = write!(out, "\\{:02X}", byte);
        }
    }
    out
}
