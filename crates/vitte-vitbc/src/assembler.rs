//! Two-pass textual assembler (C3, §4.3).
//!
//! Pass 1 lexes the source into lines, emits each instruction's bytes,
//! interns string/name operands into a local [`StringPool`], and records
//! label definitions plus every `rel32` operand that names a label (written
//! as a placeholder `0i32` for now). Pass 2 walks the recorded patch list and
//! rewrites each placeholder to `label_offset - (patch_offset + 4)`.
//!
//! Comments: `;`, `#` and `//` run to end of line; `/* ... */` is a
//! non-nestable block comment that may span lines.

use std::collections::HashMap;

use vitte_core::bytecode::opcode::{encode, Opcode, OperandValue};
use vitte_core::bytecode::pool::StringPool;
use vitte_core::VLBC_VERSION;

use crate::container::Module;
use crate::error::AsmError;
use crate::validate::validate_code;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
    Colon,
    Comma,
}

struct Lexed {
    tok: Tok,
    line: u32,
    col: u32,
}

/// Lex `src` into lines of tokens. A `Lex` error aborts immediately — unlike
/// pass 1/2, a malformed character stream can't be recovered from line by
/// line.
fn lex(src: &str) -> Result<Vec<Vec<Lexed>>, AsmError> {
    let bytes = src.as_bytes();
    let mut i = 0usize;
    let mut line = 1u32;
    let mut col = 1u32;
    let mut lines: Vec<Vec<Lexed>> = vec![Vec::new()];

    let err_here =
        |line: u32, col: u32, message: &str| AsmError::Lex { line, column: col, message: message.to_string() };

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\n' => {
                lines.push(Vec::new());
                i += 1;
                line += 1;
                col = 1;
            },
            b' ' | b'\t' | b'\r' => {
                i += 1;
                col += 1;
            },
            b';' | b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            },
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            },
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let (start_line, start_col) = (line, col);
                i += 2;
                col += 2;
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        i += 2;
                        col += 2;
                        closed = true;
                        break;
                    }
                    if bytes[i] == b'\n' {
                        lines.push(Vec::new());
                        line += 1;
                        col = 1;
                    } else {
                        col += 1;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(err_here(start_line, start_col, "unterminated block comment"));
                }
            },
            b':' => {
                lines.last_mut().unwrap().push(Lexed { tok: Tok::Colon, line, col });
                i += 1;
                col += 1;
            },
            b',' => {
                lines.last_mut().unwrap().push(Lexed { tok: Tok::Comma, line, col });
                i += 1;
                col += 1;
            },
            b'"' => {
                let (start_line, start_col) = (line, col);
                i += 1;
                col += 1;
                let mut out = Vec::new();
                let mut closed = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'"' => {
                            i += 1;
                            col += 1;
                            closed = true;
                            break;
                        },
                        b'\\' => {
                            let esc = *bytes.get(i + 1).ok_or_else(|| {
                                err_here(line, col, "unterminated escape at end of input")
                            })?;
                            out.push(match esc {
                                b'n' => b'\n',
                                b'r' => b'\r',
                                b't' => b'\t',
                                b'"' => b'"',
                                b'\\' => b'\\',
                                other => {
                                    return Err(err_here(
                                        line,
                                        col,
                                        &format!("unknown escape `\\{}`", other as char),
                                    ))
                                },
                            });
                            i += 2;
                            col += 2;
                        },
                        b'\n' => return Err(err_here(start_line, start_col, "unterminated string literal")),
                        other => {
                            out.push(other);
                            i += 1;
                            col += 1;
                        },
                    }
                }
                if !closed {
                    return Err(err_here(start_line, start_col, "unterminated string literal"));
                }
                lines.last_mut().unwrap().push(Lexed { tok: Tok::Str(out), line: start_line, col: start_col });
            },
            b'-' | b'0'..=b'9' => {
                let (start_line, start_col) = (line, col);
                let start = i;
                if c == b'-' {
                    i += 1;
                    col += 1;
                }
                let is_hex = bytes.get(i) == Some(&b'0') && matches!(bytes.get(i + 1), Some(b'x' | b'X'));
                if is_hex {
                    i += 2;
                    col += 2;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                        col += 1;
                    }
                    let text = std::str::from_utf8(&bytes[start..i]).unwrap();
                    let neg = text.starts_with('-');
                    let digits = &text[if neg { 3 } else { 2 }..];
                    let mag = i64::from_str_radix(digits, 16).map_err(|_| {
                        err_here(start_line, start_col, "invalid hexadecimal literal")
                    })?;
                    let v = if neg { -mag } else { mag };
                    lines.last_mut().unwrap().push(Lexed { tok: Tok::Int(v), line: start_line, col: start_col });
                } else {
                    let mut is_float = false;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                        col += 1;
                    }
                    if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                        is_float = true;
                        i += 1;
                        col += 1;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                            col += 1;
                        }
                    }
                    // Optional exponent: [eE][+-]?digits. Only consumed when
                    // followed by at least one digit, so a bare `e`/`E` is
                    // left for the identifier lexer (e.g. a label `e`).
                    if matches!(bytes.get(i), Some(b'e' | b'E')) {
                        let mut j = i + 1;
                        if matches!(bytes.get(j), Some(b'+' | b'-')) {
                            j += 1;
                        }
                        if bytes.get(j).is_some_and(u8::is_ascii_digit) {
                            while j < bytes.len() && bytes[j].is_ascii_digit() {
                                j += 1;
                            }
                            is_float = true;
                            col += (j - i) as u32;
                            i = j;
                        }
                    }
                    let text = std::str::from_utf8(&bytes[start..i]).unwrap();
                    let tok = if is_float {
                        Tok::Float(text.parse().map_err(|_| {
                            err_here(start_line, start_col, "invalid floating-point literal")
                        })?)
                    } else {
                        Tok::Int(text.parse().map_err(|_| {
                            err_here(start_line, start_col, "invalid integer literal")
                        })?)
                    };
                    lines.last_mut().unwrap().push(Lexed { tok, line: start_line, col: start_col });
                }
            },
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'.' => {
                let (start_line, start_col) = (line, col);
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                    col += 1;
                }
                let text = std::str::from_utf8(&bytes[start..i]).unwrap().to_string();
                lines.last_mut().unwrap().push(Lexed { tok: Tok::Ident(text), line: start_line, col: start_col });
            },
            other => {
                return Err(err_here(line, col, &format!("unexpected character `{}`", other as char)));
            },
        }
    }
    Ok(lines)
}

struct Assembler {
    code: Vec<u8>,
    strings: StringPool,
    labels: HashMap<String, u32>,
    patches: Vec<(usize, String, u32)>,
    errors: Vec<AsmError>,
}

impl Assembler {
    fn intern_name(&mut self, line: u32, bytes: &[u8]) -> Option<u32> {
        match self.strings.intern(bytes) {
            Ok(ix) => Some(ix),
            Err(_) => {
                self.errors.push(AsmError::PoolOverflow { line });
                None
            },
        }
    }

    /// Parse and emit one non-empty, label-stripped instruction line.
    fn assemble_instruction(&mut self, toks: &[Lexed]) {
        let Some(first) = toks.first() else { return };
        let Tok::Ident(mnemonic) = &first.tok else {
            self.errors.push(AsmError::Syntax {
                line: first.line,
                column: first.col,
                message: "expected an instruction mnemonic".to_string(),
            });
            return;
        };
        let Some(op) = Opcode::from_mnemonic(mnemonic) else {
            self.errors.push(AsmError::UnknownMnemonic {
                line: first.line,
                column: first.col,
                mnemonic: mnemonic.clone(),
            });
            return;
        };
        let info = op.info();
        let line = first.line;

        // Operand tokens, commas optional between them.
        let operand_toks: Vec<&Lexed> =
            toks[1..].iter().filter(|t| !matches!(t.tok, Tok::Comma)).collect();
        if operand_toks.len() != info.operands.len() {
            self.errors.push(AsmError::Syntax {
                line,
                column: first.col,
                message: format!(
                    "{mnemonic} expects {} operand(s), got {}",
                    info.operands.len(),
                    operand_toks.len()
                ),
            });
            return;
        }

        let mut values: Vec<OperandValue> = Vec::with_capacity(info.operands.len());
        let mut rel32_label: Option<(usize, String)> = None;

        for (kind, tok) in info.operands.iter().zip(operand_toks.iter()) {
            use vitte_core::bytecode::opcode::OperandKind as K;
            match (kind, &tok.tok) {
                (K::I64, Tok::Int(v)) => values.push(OperandValue::I64(*v)),
                (K::F64, Tok::Float(v)) => values.push(OperandValue::F64(*v)),
                (K::F64, Tok::Int(v)) => values.push(OperandValue::F64(*v as f64)),
                (K::U8, Tok::Int(v)) => {
                    let Ok(b) = u8::try_from(*v) else {
                        self.errors.push(AsmError::OperandOutOfRange {
                            line: tok.line,
                            column: tok.col,
                            message: format!("{v} does not fit in a u8"),
                        });
                        return;
                    };
                    values.push(OperandValue::U8(b));
                },
                (K::Kidx | K::Sidx, Tok::Str(bytes)) => {
                    let Some(ix) = self.intern_name(line, bytes) else { return };
                    values.push(OperandValue::U32(ix));
                },
                (K::Kidx | K::Sidx, Tok::Ident(name)) => {
                    let Some(ix) = self.intern_name(line, name.as_bytes()) else { return };
                    values.push(OperandValue::U32(ix));
                },
                (K::Rel32, Tok::Ident(label)) => {
                    // Patched in pass 2; reserve a zero placeholder for now.
                    rel32_label = Some((self.code.len() + 1, label.clone()));
                    values.push(OperandValue::I32(0));
                },
                _ => {
                    self.errors.push(AsmError::Syntax {
                        line: tok.line,
                        column: tok.col,
                        message: format!("operand does not match {mnemonic}'s expected kind"),
                    });
                    return;
                },
            }
        }

        let offset_before = self.code.len();
        if let Err(e) = encode(op, &values, &mut self.code) {
            self.errors.push(AsmError::OperandOutOfRange {
                line,
                column: first.col,
                message: e.to_string(),
            });
            self.code.truncate(offset_before);
            return;
        }
        if let Some((patch_offset, label)) = rel32_label {
            self.patches.push((patch_offset, label, line));
        }
    }
}

/// Assemble one `.asm` source into a [`Module`] (§4.3).
///
/// Every error encountered is collected; assembly only stops early on a
/// lexical error (an unterminated string or comment leaves no reliable way
/// to keep splitting the remainder into lines).
///
/// # Errors
/// Returns every [`AsmError`] collected across both passes.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(bytes = src.len())))]
pub fn assemble(src: &str) -> Result<Module, Vec<AsmError>> {
    let lines = lex(src).map_err(|e| vec![e])?;

    let mut asm = Assembler {
        code: Vec::new(),
        strings: StringPool::new(),
        labels: HashMap::new(),
        patches: Vec::new(),
        errors: Vec::new(),
    };

    for toks in &lines {
        if toks.is_empty() {
            continue;
        }
        let mut rest = &toks[..];
        if let [Lexed { tok: Tok::Ident(name), line, col }, Lexed { tok: Tok::Colon, .. }, remainder @ ..] =
            toks.as_slice()
        {
            if asm.labels.insert(name.clone(), asm.code.len() as u32).is_some() {
                asm.errors.push(AsmError::Syntax {
                    line: *line,
                    column: *col,
                    message: format!("label `{name}` redefined"),
                });
            }
            rest = remainder;
        }
        if !rest.is_empty() {
            asm.assemble_instruction(rest);
        }
    }

    for (patch_offset, label, line) in &asm.patches {
        match asm.labels.get(label) {
            Some(&target) => {
                let rel = target as i64 - (*patch_offset as i64 + 4);
                let rel = rel as i32;
                asm.code[*patch_offset..*patch_offset + 4].copy_from_slice(&rel.to_le_bytes());
            },
            None => asm.errors.push(AsmError::UndefinedLabel { label: label.clone(), line: *line }),
        }
    }

    if !asm.errors.is_empty() {
        return Err(asm.errors);
    }

    if let Err(e) = validate_code(&asm.code, asm.strings.len()) {
        return Err(vec![AsmError::BadBytecode(e)]);
    }

    Ok(Module { version: VLBC_VERSION, strings: asm.strings, code: asm.code })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assembles_arithmetic_program() {
        let src = "PUSHI 40\nPUSHI 2\nADD\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(module.code_len(), 20);
        assert_eq!(module.kcount(), 0);
    }

    #[test]
    fn assembles_forward_and_backward_jumps() {
        let src = "\
start:
    PUSHI 1
    JZ end
    JUMP start
end:
    HALT
";
        let module = assemble(src).unwrap();
        assert!(module.code_len() > 0);
    }

    #[test]
    fn interns_string_operands_and_dedups() {
        let src = "PUSHS \"hi\"\nPUSHS \"hi\"\nPOP\nPOP\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(module.kcount(), 1);
    }

    #[test]
    fn accepts_all_documented_string_escapes() {
        let src = "PUSHS \"a\\nb\\rc\\td\\\"e\\\\f\"\nPOP\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(module.strings.get(0).unwrap(), b"a\nb\rc\td\"e\\f");
    }

    #[test]
    fn parses_float_literal_with_exponent() {
        let src = "PUSHF 1.5e10\nPOP\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(&module.code[1..9], &1.5e10f64.to_le_bytes());
    }

    #[test]
    fn parses_float_literal_with_signed_exponent_and_no_dot() {
        let src = "PUSHF 2e-3\nPOP\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(&module.code[1..9], &2e-3f64.to_le_bytes());
    }

    #[test]
    fn reports_undefined_label() {
        let src = "JUMP nowhere\n";
        let errs = assemble(src).unwrap_err();
        assert!(matches!(errs[0], AsmError::UndefinedLabel { .. }));
    }

    #[test]
    fn reports_unknown_mnemonic() {
        let src = "FROBNICATE\n";
        let errs = assemble(src).unwrap_err();
        assert!(matches!(errs[0], AsmError::UnknownMnemonic { .. }));
    }

    #[test]
    fn reports_calln_argc_out_of_range() {
        let src = "CALLN \"f\", 256\nHALT\n";
        let errs = assemble(src).unwrap_err();
        assert!(matches!(errs[0], AsmError::OperandOutOfRange { .. }));
    }

    #[test]
    fn ignores_comment_styles() {
        let src = "; line comment\n# also a comment\n// and this\n/* block\n   spanning lines */\nHALT\n";
        let module = assemble(src).unwrap();
        assert_eq!(module.code_len(), 1);
    }

    #[test]
    fn collects_multiple_diagnostics() {
        let src = "BOGUS1\nBOGUS2\n";
        let errs = assemble(src).unwrap_err();
        assert_eq!(errs.len(), 2);
    }
}
