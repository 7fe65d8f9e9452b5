//! Opcode table & codec (C1): the single source of truth for instruction
//! encoding. Every consumer — assembler, loader/validator, linker patcher,
//! disassembler — reads instructions through [`info`], [`decode`] and
//! [`encode`] rather than hand-rolling per-opcode matches, so a new opcode (or
//! a new pool-index-carrying operand) is taught once here.

#[cfg(feature = "std")]
use std::{string::String, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use core::fmt;

/// The width and interpretation of one operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Unsigned byte.
    U8,
    /// Unsigned 16-bit, little-endian.
    U16,
    /// Unsigned 32-bit, little-endian.
    U32,
    /// Signed 32-bit, little-endian.
    I32,
    /// Signed 64-bit, little-endian.
    I64,
    /// IEEE-754 double, little-endian.
    F64,
    /// Signed 32-bit branch offset, measured from the byte after the
    /// instruction.
    Rel32,
    /// Unsigned string-pool index. VLBC v1 encodes this as `u32-LE` (see
    /// `DESIGN.md` for the 16- vs 32-bit resolution).
    Kidx,
    /// Unsigned symbol-name index. Unused by VLBC v1 — the pool doubles as
    /// the only name table — kept in the vocabulary because §3 of the
    /// specification defines it alongside `kidx`.
    Sidx,
}

impl OperandKind {
    /// Size in bytes of this operand kind.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            OperandKind::U8 => 1,
            OperandKind::U16 => 2,
            OperandKind::U32 | OperandKind::I32 | OperandKind::Rel32 | OperandKind::Kidx => 4,
            OperandKind::Sidx => 4,
            OperandKind::I64 | OperandKind::F64 => 8,
        }
    }

    /// Whether this operand kind is a string-pool reference. The linker's
    /// patch pass derives "which operand to rewrite" from this predicate
    /// instead of hard-coding a list of opcodes.
    #[must_use]
    pub const fn is_pool_index(self) -> bool {
        matches!(self, OperandKind::Kidx | OperandKind::Sidx)
    }
}

bitflags::bitflags! {
    /// Per-opcode behavioural flags.
    pub struct OpFlags: u8 {
        /// Unconditional control transfer.
        const BRANCH = 1 << 0;
        /// Control transfer taken depending on a runtime value.
        const CONDITIONAL_BRANCH = 1 << 1;
        /// Calls into another routine by name.
        const CALL = 1 << 2;
        /// Returns from the current routine.
        const RETURN = 1 << 3;
        /// No instruction after this one is reachable by fallthrough.
        const TERMINATOR = 1 << 4;
        /// May raise a runtime error.
        const MAY_THROW = 1 << 5;
    }
}

/// Decoded operand value, tagged by the [`OperandKind`] it was read as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandValue {
    U8(u8),
    U32(u32),
    I32(i32),
    I64(i64),
    F64(f64),
}

impl OperandValue {
    /// Reinterpret as a pool index, if this value came from a `kidx`/`sidx`
    /// operand.
    #[must_use]
    pub const fn as_pool_index(self) -> Option<u32> {
        match self {
            OperandValue::U32(v) => Some(v),
            _ => None,
        }
    }
}

/// Static metadata for one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    /// Canonical (uppercase) mnemonic.
    pub mnemonic: &'static str,
    /// Operand kinds in declared order (at most 2 for VLBC v1).
    pub operands: &'static [OperandKind],
    /// Total encoded size including the opcode byte.
    pub size: usize,
    /// Minimum values popped from the operand stack.
    pub stack_in: u8,
    /// Values pushed onto the operand stack.
    pub stack_out: u8,
    /// Behavioural flags.
    pub flags: OpFlags,
}

impl OpInfo {
    const fn new(
        mnemonic: &'static str,
        operands: &'static [OperandKind],
        stack_in: u8,
        stack_out: u8,
        flags: OpFlags,
    ) -> Self {
        let mut size = 1usize;
        let mut i = 0;
        while i < operands.len() {
            size += operands[i].width();
            i += 1;
        }
        Self { mnemonic, operands, size, stack_in, stack_out, flags }
    }
}

macro_rules! opcodes {
    ($($variant:ident = $tag:expr => $mnemonic:expr, [$($kind:expr),*], in $sin:expr, out $sout:expr, flags $flags:expr;)+) => {
        /// The closed set of VLBC v1 instruction tags.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $tag,)+
        }

        impl Opcode {
            /// Decode a raw opcode byte, or `None` if it names no instruction.
            #[must_use]
            pub const fn from_u8(b: u8) -> Option<Self> {
                match b {
                    $($tag => Some(Opcode::$variant),)+
                    _ => None,
                }
            }

            /// The raw opcode byte.
            #[must_use]
            pub const fn as_u8(self) -> u8 {
                self as u8
            }

            /// Look up this opcode's mnemonic, case-insensitively.
            #[must_use]
            pub fn from_mnemonic(s: &str) -> Option<Self> {
                $(if s.eq_ignore_ascii_case($mnemonic) { return Some(Opcode::$variant); })+
                None
            }

            /// Static metadata for this opcode.
            #[must_use]
            pub const fn info(self) -> &'static OpInfo {
                match self {
                    $(Opcode::$variant => {
                        const INFO: OpInfo = OpInfo::new($mnemonic, &[$($kind),*], $sin, $sout, $flags);
                        &INFO
                    })+
                }
            }
        }
    };
}

opcodes! {
    Nop    = 0x00 => "NOP",    [], in 0, out 0, flags OpFlags::empty();
    Pushi  = 0x01 => "PUSHI",  [OperandKind::I64], in 0, out 1, flags OpFlags::empty();
    Pushf  = 0x02 => "PUSHF",  [OperandKind::F64], in 0, out 1, flags OpFlags::empty();
    Pushs  = 0x03 => "PUSHS",  [OperandKind::Kidx], in 0, out 1, flags OpFlags::empty();
    Add    = 0x04 => "ADD",    [], in 2, out 1, flags OpFlags::empty();
    Sub    = 0x05 => "SUB",    [], in 2, out 1, flags OpFlags::empty();
    Mul    = 0x06 => "MUL",    [], in 2, out 1, flags OpFlags::empty();
    Div    = 0x07 => "DIV",    [], in 2, out 1, flags OpFlags::MAY_THROW;
    Eq     = 0x08 => "EQ",     [], in 2, out 1, flags OpFlags::empty();
    Neq    = 0x09 => "NEQ",    [], in 2, out 1, flags OpFlags::empty();
    Lt     = 0x0A => "LT",     [], in 2, out 1, flags OpFlags::empty();
    Gt     = 0x0B => "GT",     [], in 2, out 1, flags OpFlags::empty();
    Le     = 0x0C => "LE",     [], in 2, out 1, flags OpFlags::empty();
    Ge     = 0x0D => "GE",     [], in 2, out 1, flags OpFlags::empty();
    Pop    = 0x0E => "POP",    [], in 1, out 0, flags OpFlags::empty();
    Print  = 0x0F => "PRINT",  [], in 1, out 0, flags OpFlags::empty();
    Storeg = 0x10 => "STOREG", [OperandKind::Kidx], in 1, out 0, flags OpFlags::empty();
    Loadg  = 0x11 => "LOADG",  [OperandKind::Kidx], in 0, out 1, flags OpFlags::empty();
    Calln  = 0x12 => "CALLN",  [OperandKind::Kidx, OperandKind::U8], in 0, out 1, flags OpFlags::CALL.union(OpFlags::MAY_THROW);
    Halt   = 0x13 => "HALT",   [], in 0, out 0, flags OpFlags::TERMINATOR.union(OpFlags::RETURN);
    Jump   = 0x14 => "JUMP",   [OperandKind::Rel32], in 0, out 0, flags OpFlags::BRANCH.union(OpFlags::TERMINATOR);
    Jz     = 0x15 => "JZ",     [OperandKind::Rel32], in 1, out 0, flags OpFlags::CONDITIONAL_BRANCH;
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().mnemonic)
    }
}

/// Static metadata for `op` (free function mirroring [`Opcode::info`], for
/// callers that prefer the §4.1 contract's naming).
#[must_use]
pub fn info(op: Opcode) -> &'static OpInfo {
    op.info()
}

/// `encoded_size(op)`: deterministic, depends only on `op`.
#[must_use]
pub fn encoded_size(op: Opcode) -> usize {
    op.info().size
}

/// Failures from decoding, encoding or branch-target resolution (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The byte at this offset is not a recognised opcode.
    BadOpcode { offset: usize, byte: u8 },
    /// Fewer bytes remain than the instruction's declared size requires.
    TruncatedInstruction { offset: usize, needed: usize, available: usize },
    /// An operand value does not fit the declared kind's range.
    OperandOutOfRange { mnemonic: &'static str, detail: String },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BadOpcode { offset, byte } => {
                write!(f, "unknown opcode 0x{byte:02X} at offset {offset}")
            },
            CodecError::TruncatedInstruction { offset, needed, available } => {
                write!(
                    f,
                    "truncated instruction at offset {offset}: needed {needed} bytes, {available} available"
                )
            },
            CodecError::OperandOutOfRange { mnemonic, detail } => {
                write!(f, "operand out of range for {mnemonic}: {detail}")
            },
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}

fn read_operand(
    bytes: &[u8],
    offset: usize,
    kind: OperandKind,
) -> Result<OperandValue, CodecError> {
    let width = kind.width();
    if bytes.len() < offset + width {
        return Err(CodecError::TruncatedInstruction {
            offset,
            needed: width,
            available: bytes.len().saturating_sub(offset),
        });
    }
    let slice = &bytes[offset..offset + width];
    Ok(match kind {
        OperandKind::U8 => OperandValue::U8(slice[0]),
        OperandKind::U16 => OperandValue::U32(u32::from(u16::from_le_bytes([slice[0], slice[1]]))),
        OperandKind::U32 | OperandKind::Kidx | OperandKind::Sidx => {
            OperandValue::U32(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
        },
        OperandKind::I32 | OperandKind::Rel32 => {
            OperandValue::I32(i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
        },
        OperandKind::I64 => OperandValue::I64(i64::from_le_bytes([
            slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
        ])),
        OperandKind::F64 => OperandValue::F64(f64::from_bits(u64::from_le_bytes([
            slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
        ]))),
    })
}

/// At most two operands per VLBC v1 instruction (`CALLN`'s name + argc).
pub type Operands = [Option<OperandValue>; 2];

/// `decode(bytes, i) → (opcode, operand_values, size_read)`.
///
/// # Errors
/// Returns [`CodecError::BadOpcode`] if byte `i` is not a known opcode, or
/// [`CodecError::TruncatedInstruction`] if fewer than `encoded_size(op)` bytes
/// remain.
pub fn decode(bytes: &[u8], i: usize) -> Result<(Opcode, Operands, usize), CodecError> {
    let tag = *bytes
        .get(i)
        .ok_or(CodecError::TruncatedInstruction { offset: i, needed: 1, available: 0 })?;
    let op = Opcode::from_u8(tag).ok_or(CodecError::BadOpcode { offset: i, byte: tag })?;
    let info = op.info();
    if bytes.len() < i + info.size {
        return Err(CodecError::TruncatedInstruction {
            offset: i,
            needed: info.size,
            available: bytes.len().saturating_sub(i),
        });
    }
    let mut operands: Operands = [None, None];
    let mut cursor = i + 1;
    for (slot, kind) in operands.iter_mut().zip(info.operands.iter()) {
        *slot = Some(read_operand(bytes, cursor, *kind)?);
        cursor += kind.width();
    }
    Ok((op, operands, info.size))
}

/// `encode(op, operands, out)`: append the canonical encoding of `op` with the
/// given operand values to `out`.
///
/// # Errors
/// Returns [`CodecError::OperandOutOfRange`] if `operands` doesn't match
/// `op`'s declared kinds, count, or value range.
pub fn encode(op: Opcode, operands: &[OperandValue], out: &mut Vec<u8>) -> Result<(), CodecError> {
    let info = op.info();
    if operands.len() != info.operands.len() {
        return Err(CodecError::OperandOutOfRange {
            mnemonic: info.mnemonic,
            detail: format!("expected {} operand(s), got {}", info.operands.len(), operands.len()),
        });
    }
    out.push(op.as_u8());
    for (kind, value) in info.operands.iter().zip(operands.iter()) {
        encode_operand(info.mnemonic, *kind, *value, out)?;
    }
    Ok(())
}

fn encode_operand(
    mnemonic: &'static str,
    kind: OperandKind,
    value: OperandValue,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let range_err = |detail: String| CodecError::OperandOutOfRange { mnemonic, detail };
    match (kind, value) {
        (OperandKind::U8, OperandValue::U8(v)) => out.push(v),
        (OperandKind::U16, OperandValue::U32(v)) => {
            let v16 = u16::try_from(v).map_err(|_| range_err(format!("{v} does not fit u16")))?;
            out.extend_from_slice(&v16.to_le_bytes());
        },
        (OperandKind::U32 | OperandKind::Kidx | OperandKind::Sidx, OperandValue::U32(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
        },
        (OperandKind::I32 | OperandKind::Rel32, OperandValue::I32(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
        },
        (OperandKind::I64, OperandValue::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (OperandKind::F64, OperandValue::F64(v)) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        _ => return Err(range_err(format!("operand kind mismatch: expected {kind:?}, got {value:?}"))),
    }
    Ok(())
}

/// `branch_target(bytes, i) → absolute offset` if the instruction at `i` is a
/// branch or conditional branch; `Ok(None)` otherwise.
///
/// The target is returned as a signed `i64` rather than a `u32` so that a
/// `rel32` pointing before offset 0 (or past any representable `u32`
/// boundary) is reported as an out-of-range value instead of silently
/// wrapping into `None` — callers (the validator in particular) must reject
/// it explicitly rather than mistake it for "not a branch".
///
/// # Errors
/// Propagates [`decode`]'s errors.
pub fn branch_target(bytes: &[u8], i: usize) -> Result<Option<i64>, CodecError> {
    let (op, operands, size) = decode(bytes, i)?;
    let info = op.info();
    if !info.flags.intersects(OpFlags::BRANCH | OpFlags::CONDITIONAL_BRANCH) {
        return Ok(None);
    }
    let Some(OperandValue::I32(rel)) = operands[0] else {
        return Ok(None);
    };
    let end_of_instruction = i as i64 + size as i64;
    Ok(Some(end_of_instruction + i64::from(rel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sizes_match_spec_table() {
        assert_eq!(encoded_size(Opcode::Nop), 1);
        assert_eq!(encoded_size(Opcode::Pushi), 9);
        assert_eq!(encoded_size(Opcode::Pushf), 9);
        assert_eq!(encoded_size(Opcode::Pushs), 5);
        assert_eq!(encoded_size(Opcode::Add), 1);
        assert_eq!(encoded_size(Opcode::Storeg), 5);
        assert_eq!(encoded_size(Opcode::Loadg), 5);
        assert_eq!(encoded_size(Opcode::Calln), 6);
        assert_eq!(encoded_size(Opcode::Halt), 1);
        assert_eq!(encoded_size(Opcode::Jump), 5);
        assert_eq!(encoded_size(Opcode::Jz), 5);
    }

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("pushi"), Some(Opcode::Pushi));
        assert_eq!(Opcode::from_mnemonic("PushI"), Some(Opcode::Pushi));
        assert_eq!(Opcode::from_mnemonic("bogus"), None);
    }

    #[test]
    fn encode_decode_roundtrip_pushi() {
        let mut buf = Vec::new();
        encode(Opcode::Pushi, &[OperandValue::I64(-7)], &mut buf).unwrap();
        assert_eq!(buf.len(), 9);
        let (op, operands, size) = decode(&buf, 0).unwrap();
        assert_eq!(op, Opcode::Pushi);
        assert_eq!(size, 9);
        assert_eq!(operands[0], Some(OperandValue::I64(-7)));
    }

    #[test]
    fn decode_unknown_opcode() {
        let buf = [0xFFu8];
        let err = decode(&buf, 0).unwrap_err();
        assert_eq!(err, CodecError::BadOpcode { offset: 0, byte: 0xFF });
    }

    #[test]
    fn decode_truncated() {
        let buf = [Opcode::Pushi.as_u8(), 0, 0];
        let err = decode(&buf, 0).unwrap_err();
        assert_eq!(
            err,
            CodecError::TruncatedInstruction { offset: 0, needed: 9, available: 3 }
        );
    }

    #[test]
    fn branch_target_is_absolute() {
        let mut buf = Vec::new();
        encode(Opcode::Jump, &[OperandValue::I32(10)], &mut buf).unwrap();
        // JUMP is 5 bytes; end-of-instruction is offset 5, target is 5+10=15
        assert_eq!(branch_target(&buf, 0).unwrap(), Some(15));
    }

    #[test]
    fn non_branch_has_no_target() {
        let mut buf = Vec::new();
        encode(Opcode::Halt, &[], &mut buf).unwrap();
        assert_eq!(branch_target(&buf, 0).unwrap(), None);
    }

    #[test]
    fn branch_target_before_offset_zero_is_reported_negative() {
        let mut buf = Vec::new();
        encode(Opcode::Jump, &[OperandValue::I32(-1000)], &mut buf).unwrap();
        // JUMP is 5 bytes; end-of-instruction is offset 5, target is 5-1000=-995.
        assert_eq!(branch_target(&buf, 0).unwrap(), Some(-995));
    }

    #[test]
    fn kidx_is_pool_index_but_rel32_is_not() {
        assert!(OperandKind::Kidx.is_pool_index());
        assert!(!OperandKind::Rel32.is_pool_index());
    }

    proptest::proptest! {
        #[test]
        fn pushi_roundtrips_any_i64(v: i64) {
            let mut buf = Vec::new();
            encode(Opcode::Pushi, &[OperandValue::I64(v)], &mut buf).unwrap();
            let (op, operands, size) = decode(&buf, 0).unwrap();
            proptest::prop_assert_eq!(op, Opcode::Pushi);
            proptest::prop_assert_eq!(size, 9);
            proptest::prop_assert_eq!(operands[0], Some(OperandValue::I64(v)));
        }
    }
}
