//! Module loader / validator (C4, §4.4): a linear pass over a code section
//! that checks every opcode is known, every instruction stays in bounds,
//! every `kidx` operand is within the pool, and a second pass that checks
//! every branch target lands on a boundary collected during the first pass.

use std::collections::BTreeSet;

use vitte_core::bytecode::opcode::{branch_target, decode, OperandValue};

use crate::error::BytecodeError;

/// Walk `code` start to end, checking opcodes, bounds and pool-index
/// operands, then checking branch targets against the instruction
/// boundaries collected along the way. Returns the boundary set (including
/// the one-past-the-end sentinel) on success.
///
/// # Errors
/// See [`BytecodeError`].
pub fn validate_code(code: &[u8], kcount: u32) -> Result<BTreeSet<usize>, BytecodeError> {
    let mut boundaries = BTreeSet::new();
    let mut offset = 0usize;
    while offset < code.len() {
        boundaries.insert(offset);
        let (op, operands, size) = decode(code, offset)?;
        for (slot, kind) in operands.iter().zip(op.info().operands.iter()) {
            if kind.is_pool_index() {
                if let Some(OperandValue::U32(index)) = *slot {
                    if index >= kcount {
                        return Err(BytecodeError::PoolIndexOutOfRange {
                            offset,
                            index,
                            len: kcount,
                        });
                    }
                }
            }
        }
        offset += size;
    }
    // The end of the code section is itself a valid branch target (e.g. a
    // forward jump to a label that happens to be the last byte), matching
    // §3's "within [0, code_len]".
    boundaries.insert(code.len());

    let mut offset = 0usize;
    while offset < code.len() {
        if let Some(target) = branch_target(code, offset)? {
            let in_section = usize::try_from(target).ok().is_some_and(|t| boundaries.contains(&t));
            if !in_section {
                return Err(BytecodeError::MisalignedBranch { offset, target });
            }
        }
        let (_, _, size) = decode(code, offset)?;
        offset += size;
    }

    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitte_core::bytecode::opcode::{encode, Opcode, OperandValue as OV};

    #[test]
    fn accepts_well_formed_program() {
        let mut code = Vec::new();
        encode(Opcode::Pushi, &[OV::I64(1)], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        assert!(validate_code(&code, 0).is_ok());
    }

    #[test]
    fn rejects_unknown_opcode() {
        let code = vec![0xFFu8];
        assert!(validate_code(&code, 0).is_err());
    }

    #[test]
    fn rejects_out_of_range_pool_index() {
        let mut code = Vec::new();
        encode(Opcode::Pushs, &[OV::U32(3)], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        let err = validate_code(&code, 1).unwrap_err();
        assert!(matches!(err, BytecodeError::PoolIndexOutOfRange { index: 3, len: 1, .. }));
    }

    #[test]
    fn accepts_pool_index_within_range() {
        let mut code = Vec::new();
        encode(Opcode::Pushs, &[OV::U32(0)], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        assert!(validate_code(&code, 1).is_ok());
    }

    #[test]
    fn rejects_misaligned_branch() {
        let mut code = Vec::new();
        // JUMP into the middle of itself (offset 2, not an instruction start)
        encode(Opcode::Jump, &[OV::I32(-3)], &mut code).unwrap();
        let err = validate_code(&code, 0).unwrap_err();
        assert!(matches!(err, BytecodeError::MisalignedBranch { .. }));
    }

    #[test]
    fn accepts_jump_to_end_of_code() {
        let mut code = Vec::new();
        // JUMP is 5 bytes; rel=0 lands exactly on code_len (5).
        encode(Opcode::Jump, &[OV::I32(0)], &mut code).unwrap();
        assert!(validate_code(&code, 0).is_ok());
    }

    #[test]
    fn rejects_branch_target_before_start_of_section() {
        let mut code = Vec::new();
        // JUMP is 5 bytes; end-of-instruction is offset 5, rel=-1000 puts
        // the target far before offset 0.
        encode(Opcode::Jump, &[OV::I32(-1000)], &mut code).unwrap();
        let err = validate_code(&code, 0).unwrap_err();
        assert!(matches!(err, BytecodeError::MisalignedBranch { target, .. } if target < 0));
    }
}
