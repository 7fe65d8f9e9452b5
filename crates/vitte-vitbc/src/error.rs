//! Error taxonomy for assembling, loading, validating, linking and
//! disassembling VLBC modules (§7 of the specification).
//!
//! Each stage gets its own enum so callers can match on failure kind without
//! string-parsing; the CLI binaries wrap these in `anyhow` at the edge.

use thiserror::Error;

use vitte_core::bytecode::opcode::CodecError;

/// A line/column-scoped assembler diagnostic (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// Unterminated string literal, bad escape, or a character no token
    /// starts with.
    #[error("{line}:{column}: {message}")]
    Lex { line: u32, column: u32, message: String },
    /// A line's shape doesn't match the grammar (missing operand, stray
    /// token, wrong operand kind for the opcode).
    #[error("{line}:{column}: {message}")]
    Syntax { line: u32, column: u32, message: String },
    /// The mnemonic names no VLBC v1 opcode.
    #[error("{line}:{column}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic { line: u32, column: u32, mnemonic: String },
    /// An integer operand (or `CALLN`'s argc) doesn't fit its declared range.
    #[error("{line}:{column}: operand out of range: {message}")]
    OperandOutOfRange { line: u32, column: u32, message: String },
    /// The local string pool overflowed while interning an operand.
    #[error("{line}: string pool exceeded its capacity while interning a string operand")]
    PoolOverflow { line: u32 },
    /// A branch or call referenced a label that was never defined, anywhere
    /// in the program.
    #[error("line {line}: undefined label `{label}`")]
    UndefinedLabel { label: String, line: u32 },
    /// Pass 2 resolved every label, but the resulting module still fails
    /// structural validation.
    #[error("assembled module failed validation: {0}")]
    BadBytecode(#[from] BytecodeError),
}

/// Failures from decoding or structurally validating a code section (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Propagated from [`vitte_core::bytecode::opcode::decode`].
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A `kidx`/`sidx` operand names a string outside the pool.
    #[error("pool index {index} out of range (pool has {len} entries) at offset {offset}")]
    PoolIndexOutOfRange { offset: usize, index: u32, len: u32 },
    /// A branch's absolute target isn't the start of an instruction, and
    /// isn't the (valid) one-past-the-end sentinel either. `target` is
    /// signed because an out-of-section `rel32` (e.g. one pointing before
    /// offset 0) must still be reported rather than collapsed into a valid
    /// `u32`.
    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    MisalignedBranch { offset: usize, target: i64 },
}

/// Failures from loading a VLBC byte stream (§4.4, §6.1).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The first four bytes aren't ASCII `VLBC`.
    #[error("bad magic: expected `VLBC`")]
    BadMagic,
    /// The version byte doesn't match any version this crate understands.
    #[error("unsupported VLBC version: {found}")]
    UnsupportedVersion { found: u8 },
    /// The buffer ended before a declared length was satisfied.
    #[error("truncated module: needed {needed} more byte(s) at offset {at}")]
    Truncated { needed: usize, at: usize },
    /// The buffer has bytes left over after the declared code section.
    #[error("trailing {extra} byte(s) after the declared code section")]
    TrailingData { extra: usize },
    /// The decoded code section is structurally invalid.
    #[error("invalid bytecode: {0}")]
    BadBytecode(#[from] BytecodeError),
}

/// Failures from the linker (§4.5, §7).
#[derive(Debug, Error)]
pub enum LinkError {
    /// An input path's extension is neither `.asm` nor `.vlbc`.
    #[error("unsupported input format: `{path}` (expected a `.asm` or `.vlbc` extension)")]
    UnsupportedInputFormat {
        /// The offending path, as given on the command line.
        path: String,
    },
    /// The global string pool would exceed its implementation cap.
    #[error("global string pool exceeds the {cap} entry cap")]
    TooManyStrings {
        /// The implementation cap that was hit.
        cap: u32,
    },
    /// The merged code section would exceed the implementation cap.
    #[error("merged code section exceeds the {cap} byte cap")]
    TooMuchCode {
        /// The implementation cap that was hit.
        cap: usize,
    },
    /// While patching a string-pool operand, the source byte at this offset
    /// wasn't the start of a known instruction — the source module should
    /// have been rejected by its own validation pass.
    #[error("patch out of bounds at offset {offset} in `{input}`: source module was not structurally valid")]
    PatchOutOfBounds {
        /// The input whose code is being patched.
        input: String,
        /// Byte offset into that input's code section.
        offset: usize,
    },
    /// One of the `.asm` inputs failed to assemble.
    #[error("failed to assemble `{input}`: {errors:?}")]
    Assemble {
        /// The offending input path.
        input: String,
        /// Every diagnostic collected for that input.
        errors: Vec<AsmError>,
    },
    /// One of the `.vlbc` inputs failed to load.
    #[error("failed to load `{input}`: {source}")]
    Load {
        /// The offending input path.
        input: String,
        /// The underlying loader failure.
        #[source]
        source: LoadError,
    },
    /// The merged module failed structural validation.
    #[error("linked module failed validation: {0}")]
    BadBytecode(#[from] BytecodeError),
    /// Reading or writing one of the inputs/outputs failed.
    #[error("io error on `{path}`: {message}")]
    Io {
        /// The path that could not be read or written.
        path: String,
        /// The underlying OS error, rendered to text.
        message: String,
    },
}
