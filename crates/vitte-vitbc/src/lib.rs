//! VLBC: the container format, assembler, linker and disassembler/inspector
//! for VitteLight bytecode modules (§3–§6 of the specification).
//!
//! ```text
//! .asm source --[assemble]--> Module --[to_bytes]--> .vlbc file
//! .vlbc file  --[from_bytes]--> Module --[link]--> Module --[to_bytes]--> .vlbc
//! Module --[disasm]--> text
//! ```
//!
//! [`container::Module`] is the load-bearing type: every other module in
//! this crate either produces one ([`assembler::assemble`],
//! [`linker::link`]) or consumes one ([`disasm`]).

#![deny(missing_docs)]

/// Two-pass textual assembler (§4.3).
pub mod assembler;
/// The VLBC container format itself (§6.1).
pub mod container;
/// Disassembler and inspector report rendering (§4.6).
pub mod disasm;
/// Error taxonomy shared by every stage (§7).
pub mod error;
/// Module linker (§4.5).
pub mod linker;
/// Structural validation of a decoded code section (§4.4).
pub mod validate;

pub use assembler::assemble;
pub use container::Module;
pub use disasm::{disassemble_code, disassemble_one, disassemble_pool, hexdump, inspect};
pub use error::{AsmError, BytecodeError, LinkError, LoadError};
pub use linker::{link, render_map, LinkInput, LinkReport};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assemble_serialize_reload_roundtrip() {
        let src = "PUSHI 1\nPUSHI 2\nADD\nHALT\n";
        let module = assemble(src).unwrap();
        let bytes = module.to_bytes();
        let reloaded = Module::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.code, module.code);
    }

    #[test]
    fn assemble_link_disassemble_end_to_end() {
        let a = assemble("PUSHS \"a\"\nPOP\nHALT\n").unwrap();
        let b = assemble("PUSHS \"b\"\nPOP\nHALT\n").unwrap();
        let (merged, report) =
            link(&[("a.asm".to_string(), a), ("b.asm".to_string(), b)]).unwrap();
        assert_eq!(merged.kcount(), 2);
        let text = inspect(&merged).unwrap();
        assert!(text.contains("PUSHS"));
        let map = render_map("vitte-link", &report);
        assert!(map.contains("[a.asm]"));
        assert!(map.contains("[b.asm]"));
    }
}
