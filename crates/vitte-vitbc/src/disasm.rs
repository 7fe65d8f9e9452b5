//! Disassembler / inspector (C6, §4.6): render a code section as text, plus
//! a canonical hexdump and string-pool listing for `vitte inspect`.

use std::fmt::Write as _;

use vitte_core::bytecode::opcode::{branch_target, decode, CodecError, OperandValue};
use vitte_core::bytecode::pool::StringPool;

use crate::container::Module;

fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            },
        }
    }
    out.push('"');
    out
}

/// Render the single instruction starting at `offset`, returning the text
/// and the number of bytes it occupies.
///
/// # Errors
/// Propagates [`decode`]'s errors.
pub fn disassemble_one(
    code: &[u8],
    offset: usize,
    pool: &StringPool,
) -> Result<(String, usize), CodecError> {
    let (op, operands, size) = decode(code, offset)?;
    let info = op.info();
    let mut line = format!("{offset:08x}: {:<7}", info.mnemonic);

    let mut comment: Option<String> = None;
    for (kind, value) in info.operands.iter().zip(operands.into_iter().flatten()) {
        match (kind, value) {
            (vitte_core::bytecode::opcode::OperandKind::Rel32, OperandValue::I32(rel)) => {
                let _ = write!(line, " {rel:+}");
                if let Ok(Some(target)) = branch_target(code, offset) {
                    comment = Some(match u32::try_from(target) {
                        Ok(t) => format!("-> {t:#010x}"),
                        Err(_) => format!("-> {target} (out of section)"),
                    });
                }
            },
            (kind, value) if kind.is_pool_index() => {
                if let OperandValue::U32(ix) = value {
                    let _ = write!(line, " {ix}");
                    if let Ok(bytes) = pool.get(ix) {
                        comment = Some(quote(bytes));
                    }
                }
            },
            (_, OperandValue::U8(v)) => {
                let _ = write!(line, " {v}");
            },
            (_, OperandValue::U32(v)) => {
                let _ = write!(line, " {v}");
            },
            (_, OperandValue::I32(v)) => {
                let _ = write!(line, " {v}");
            },
            (_, OperandValue::I64(v)) => {
                let _ = write!(line, " {v}");
            },
            (_, OperandValue::F64(v)) => {
                let _ = write!(line, " {v}");
            },
        }
    }
    if let Some(c) = comment {
        let _ = write!(line, "  ;; {c}");
    }
    Ok((line, size))
}

/// Render an entire code section, one instruction per line, until either the
/// code ends or decoding fails.
///
/// # Errors
/// Propagates [`decode`]'s errors if the code section is not well-formed.
pub fn disassemble_code(code: &[u8], pool: &StringPool) -> Result<String, CodecError> {
    let mut out = String::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let (line, size) = disassemble_one(code, offset, pool)?;
        out.push_str(&line);
        out.push('\n');
        offset += size;
    }
    Ok(out)
}

/// Render a module's string pool as `index: "contents"` lines.
#[must_use]
pub fn disassemble_pool(pool: &StringPool) -> String {
    let mut out = String::new();
    for (i, s) in pool.iter().enumerate() {
        let _ = writeln!(out, "{i}: {}", quote(s));
    }
    out
}

/// A full inspector report: header summary, pool listing, then disassembly
/// (§4.6, §6.4's `inspect` subcommand).
///
/// # Errors
/// Propagates [`decode`]'s errors if the module's code section is malformed
/// (should not happen for a module that passed [`Module::from_bytes`]).
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(code_len = module.code_len())))]
pub fn inspect(module: &Module) -> Result<String, CodecError> {
    let mut out = String::new();
    let _ = writeln!(out, "version: {}", module.version);
    let _ = writeln!(out, "kcount: {}", module.kcount());
    let _ = writeln!(out, "code_size: {}", module.code_len());
    out.push_str("\n.strings\n");
    out.push_str(&disassemble_pool(&module.strings));
    out.push_str("\n.code\n");
    out.push_str(&disassemble_code(&module.code, &module.strings)?);
    Ok(out)
}

/// Canonical 16-bytes-per-line hexdump: offset, hex bytes, ASCII gutter.
#[must_use]
pub fn hexdump(bytes: &[u8], base_offset: usize) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", base_offset + row * 16);
        for i in 0..16 {
            if i < chunk.len() {
                let _ = write!(out, "{:02x} ", chunk[i]);
            } else {
                out.push_str("   ");
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push(' ');
        for &b in chunk {
            out.push(if (0x20..=0x7E).contains(&b) { b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vitte_core::bytecode::opcode::{encode, Opcode};

    #[test]
    fn disassembles_pushi_halt() {
        let mut code = Vec::new();
        encode(Opcode::Pushi, &[OperandValue::I64(40)], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        let pool = StringPool::new();
        let text = disassemble_code(&code, &pool).unwrap();
        assert!(text.contains("PUSHI"));
        assert!(text.contains("40"));
        assert!(text.contains("HALT"));
    }

    #[test]
    fn shows_pool_string_preview_for_pushs() {
        let mut pool = StringPool::new();
        pool.intern(b"hi").unwrap();
        let mut code = Vec::new();
        encode(Opcode::Pushs, &[OperandValue::U32(0)], &mut code).unwrap();
        let text = disassemble_code(&code, &pool).unwrap();
        assert!(text.contains("\"hi\""));
    }

    #[test]
    fn shows_absolute_branch_target() {
        let mut code = Vec::new();
        encode(Opcode::Jump, &[OperandValue::I32(0)], &mut code).unwrap();
        let pool = StringPool::new();
        let text = disassemble_code(&code, &pool).unwrap();
        assert!(text.contains("0x00000005"));
    }

    #[test]
    fn hexdump_wraps_at_sixteen_bytes() {
        let bytes: Vec<u8> = (0..20).collect();
        let dump = hexdump(&bytes, 0);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.starts_with("00000000"));
        assert!(dump.lines().nth(1).unwrap().starts_with("00000010"));
    }
}
