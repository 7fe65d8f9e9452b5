//! Linker (C5, §4.5): merge N modules into one, deduplicating their string
//! pools and rewriting every `kidx`/`sidx` operand to the merged index.
//!
//! The global pool is built by walking the inputs in argument order and
//! interning each one's strings in on-disk order — first appearance across
//! the whole link wins the final index, matching [`StringPool::intern`]'s
//! own semantics. Patching is generic: any operand whose [`OperandKind`]
//! reports [`OperandKind::is_pool_index`] gets rewritten, so a new
//! pool-index-carrying opcode needs no change here.

use std::fmt::Write as _;

use vitte_core::bytecode::opcode::{decode, OperandValue};
use vitte_core::bytecode::pool::StringPool;
use vitte_core::VLBC_VERSION;

use crate::container::Module;
use crate::error::LinkError;
use crate::validate::validate_code;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-input bookkeeping recorded while linking, used to render a `.map`
/// file (§6.5) or to report on the merge.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkInput {
    /// The name the input was linked under (typically its path).
    pub name: String,
    /// Where this input's code landed in the merged code section.
    pub base_offset: u32,
    /// `(old_index, new_index)` pairs, in the input's original pool order.
    pub remap: Vec<(u32, u32)>,
}

/// Summary of a completed link, suitable for rendering a map file or a
/// human-readable report.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkReport {
    /// Every input, in the order it was linked.
    pub inputs: Vec<LinkInput>,
    /// Size of the merged string pool.
    pub total_strings: u32,
    /// Size of the merged code section, in bytes.
    pub total_code: usize,
}

fn patch_pool_operands(
    code: &[u8],
    remap: &[(u32, u32)],
) -> Result<Vec<u8>, LinkError> {
    let mut out = code.to_vec();
    let mut offset = 0usize;
    while offset < code.len() {
        let (op, operands, size) = decode(code, offset).map_err(|_| LinkError::PatchOutOfBounds {
            input: String::new(),
            offset,
        })?;
        let info = op.info();
        let mut cursor = offset + 1;
        for (kind, value) in info.operands.iter().zip(operands.into_iter().flatten()) {
            if kind.is_pool_index() {
                if let OperandValue::U32(old_ix) = value {
                    let new_ix = remap
                        .iter()
                        .find(|(old, _)| *old == old_ix)
                        .map(|(_, new)| *new)
                        .ok_or(LinkError::PatchOutOfBounds { input: String::new(), offset: cursor })?;
                    out[cursor..cursor + 4].copy_from_slice(&new_ix.to_le_bytes());
                }
            }
            cursor += kind.width();
        }
        offset += size;
    }
    Ok(out)
}

/// Link `modules` (name, module) in the given order into one [`Module`]
/// (§4.5).
///
/// # Errors
/// Returns [`LinkError::TooManyStrings`], [`LinkError::TooMuchCode`],
/// [`LinkError::PatchOutOfBounds`] or [`LinkError::BadBytecode`] if the
/// merged module fails re-validation.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(inputs = modules.len())))]
pub fn link(modules: &[(String, Module)]) -> Result<(Module, LinkReport), LinkError> {
    let mut global = StringPool::new();
    let mut inputs = Vec::with_capacity(modules.len());
    let mut out_code = Vec::new();

    for (name, module) in modules {
        let mut remap = Vec::with_capacity(module.kcount() as usize);
        for old_ix in 0..module.kcount() {
            let bytes = module.strings.get(old_ix).expect("module already validated its own pool");
            let new_ix = global
                .intern(bytes)
                .map_err(|_| LinkError::TooManyStrings { cap: vitte_core::bytecode::pool::VLBC_MAX_STRINGS })?;
            remap.push((old_ix, new_ix));
        }

        let patched = patch_pool_operands(&module.code, &remap).map_err(|e| match e {
            LinkError::PatchOutOfBounds { offset, .. } => {
                LinkError::PatchOutOfBounds { input: name.clone(), offset }
            },
            other => other,
        })?;

        let base_offset =
            u32::try_from(out_code.len()).map_err(|_| LinkError::TooMuchCode { cap: u32::MAX as usize })?;
        inputs.push(LinkInput { name: name.clone(), base_offset, remap });
        out_code.extend_from_slice(&patched);
    }

    if out_code.len() > u32::MAX as usize {
        return Err(LinkError::TooMuchCode { cap: u32::MAX as usize });
    }

    validate_code(&out_code, global.len())?;

    let report =
        LinkReport { total_strings: global.len(), total_code: out_code.len(), inputs };
    let module = Module { version: VLBC_VERSION, strings: global, code: out_code };
    Ok((module, report))
}

/// Render a `.map` file for a completed link (§6.5): a header line, then one
/// `[input]` section per input listing `old -> new` pool-index remaps.
#[must_use]
pub fn render_map(tool: &str, report: &LinkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {tool} link map");
    for input in &report.inputs {
        let _ = writeln!(out, "[{}]", input.name);
        for (old, new) in &input.remap {
            let _ = writeln!(out, "  {old} -> {new}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vitte_core::bytecode::opcode::{encode, Opcode};

    fn module_with_string(s: &str) -> Module {
        let mut pool = StringPool::new();
        pool.intern(s.as_bytes()).unwrap();
        let mut code = Vec::new();
        encode(Opcode::Pushs, &[OperandValue::U32(0)], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        Module { version: VLBC_VERSION, strings: pool, code }
    }

    #[test]
    fn links_two_modules_concatenating_code() {
        let a = module_with_string("a");
        let b = module_with_string("b");
        let (merged, report) = link(&[("a.vlbc".to_string(), a), ("b.vlbc".to_string(), b)]).unwrap();
        assert_eq!(merged.kcount(), 2);
        assert_eq!(report.inputs.len(), 2);
        assert_eq!(report.inputs[1].base_offset, 6); // PUSHS(5) + HALT(1)
    }

    #[test]
    fn dedups_shared_strings_across_inputs() {
        let a = module_with_string("shared");
        let b = module_with_string("shared");
        let (merged, _) = link(&[("a.vlbc".to_string(), a), ("b.vlbc".to_string(), b)]).unwrap();
        assert_eq!(merged.kcount(), 1);
    }

    #[test]
    fn remaps_pool_indices_when_second_input_shifts() {
        let a = module_with_string("a");
        let b = module_with_string("b");
        let (merged, report) = link(&[("a.vlbc".to_string(), a), ("b.vlbc".to_string(), b)]).unwrap();
        // b's "b" string becomes global index 1.
        assert_eq!(report.inputs[1].remap, vec![(0, 1)]);
        let (_, operands, _) = decode(&merged.code, report.inputs[1].base_offset as usize).unwrap();
        assert_eq!(operands[0], Some(OperandValue::U32(1)));
    }

    #[test]
    fn render_map_lists_per_input_remaps() {
        let a = module_with_string("a");
        let (_, report) = link(&[("only.vlbc".to_string(), a)]).unwrap();
        let text = render_map("vitte-link", &report);
        assert!(text.contains("[only.vlbc]"));
        assert!(text.contains("0 -> 0"));
    }
}
