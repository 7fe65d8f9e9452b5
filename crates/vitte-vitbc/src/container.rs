//! The VLBC container (§6.1): header, string pool, code section, bit-exact.
//!
//! ```text
//! offset   size    field
//! 0        4       magic = ASCII "VLBC"
//! 4        1       version (u8)
//! 5        4       kcount (u32) — number of strings
//! 9        …       for i in 0..kcount: 4-byte len_i, then len_i raw bytes
//! …        4       code_size (u32)
//! …        code_size bytes: code section
//! ```
//!
//! No trailing padding; a tail longer than the declared code section is
//! rejected (§4.4).

use vitte_core::bytecode::pool::StringPool;
use vitte_core::{ByteReader, ByteWriter, MAGIC_VLBC, VLBC_VERSION};

use crate::error::LoadError;
use crate::validate::validate_code;

/// An in-memory VLBC module (§3): a version tag, an ordered string pool and a
/// code section. Every instruction in `code` decodes successfully; every
/// `kidx` operand is within the pool; every branch target lands on an
/// instruction boundary.
#[derive(Debug, Clone)]
pub struct Module {
    /// Container format version. This crate produces and accepts only
    /// [`VLBC_VERSION`].
    pub version: u8,
    /// The module's string pool, in on-disk order.
    pub strings: StringPool,
    /// The packed instruction stream.
    pub code: Vec<u8>,
}

impl Module {
    /// An empty module at the current version.
    #[must_use]
    pub fn empty() -> Self {
        Self { version: VLBC_VERSION, strings: StringPool::new(), code: Vec::new() }
    }

    /// `kcount`: number of strings in the pool.
    #[must_use]
    pub fn kcount(&self) -> u32 {
        self.strings.len()
    }

    /// `code_len`: size of the code section in bytes.
    #[must_use]
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Serialize to the exact on-disk VLBC layout described above.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_bytes(MAGIC_VLBC);
        w.write_u8(self.version);
        w.write_u32_le(self.strings.len());
        for s in self.strings.iter() {
            w.write_u32_le(s.len() as u32);
            w.write_bytes(s);
        }
        w.write_u32_le(self.code.len() as u32);
        w.write_bytes(&self.code);
        w.into_vec()
    }

    /// Parse and structurally validate a VLBC byte stream (§4.4).
    ///
    /// # Errors
    /// Returns [`LoadError::BadMagic`], [`LoadError::UnsupportedVersion`],
    /// [`LoadError::Truncated`], [`LoadError::TrailingData`] or
    /// [`LoadError::BadBytecode`].
    pub fn from_bytes(buf: &[u8]) -> Result<Self, LoadError> {
        let mut r = ByteReader::new(buf);
        let magic = r.read_bytes(4).map_err(|_| LoadError::Truncated { needed: 4, at: 0 })?;
        if magic != MAGIC_VLBC {
            return Err(LoadError::BadMagic);
        }
        let version = r.read_u8().map_err(|_| LoadError::Truncated { needed: 1, at: 4 })?;
        if version != VLBC_VERSION {
            return Err(LoadError::UnsupportedVersion { found: version });
        }
        let kcount =
            r.read_u32_le().map_err(|_| LoadError::Truncated { needed: 4, at: r.offset() })?;

        let mut strings = Vec::with_capacity(kcount as usize);
        for _ in 0..kcount {
            let at = r.offset();
            let len = r.read_u32_le().map_err(|_| LoadError::Truncated { needed: 4, at })? as usize;
            let at = r.offset();
            let bytes =
                r.read_bytes(len).map_err(|_| LoadError::Truncated { needed: len, at })?;
            strings.push(bytes.to_vec());
        }

        let at = r.offset();
        let code_size =
            r.read_u32_le().map_err(|_| LoadError::Truncated { needed: 4, at })? as usize;
        let at = r.offset();
        let code = r
            .read_bytes(code_size)
            .map_err(|_| LoadError::Truncated { needed: code_size, at })?
            .to_vec();

        if r.remaining() > 0 {
            return Err(LoadError::TrailingData { extra: r.remaining() });
        }

        let pool = StringPool::from_ordered(strings);
        validate_code(&code, pool.len())?;

        Ok(Self { version, strings: pool, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vitte_core::bytecode::opcode::{encode, Opcode, OperandValue};

    fn minimal_program() -> Vec<u8> {
        let mut code = Vec::new();
        encode(Opcode::Pushi, &[OperandValue::I64(40)], &mut code).unwrap();
        encode(Opcode::Pushi, &[OperandValue::I64(2)], &mut code).unwrap();
        encode(Opcode::Add, &[], &mut code).unwrap();
        encode(Opcode::Halt, &[], &mut code).unwrap();
        code
    }

    #[test]
    fn minimal_program_encodes_to_expected_bytes() {
        let m = Module { version: 1, strings: StringPool::new(), code: minimal_program() };
        let bytes = m.to_bytes();
        // magic + version + kcount(0) + code_size(20) + code(20)
        assert_eq!(bytes.len(), 4 + 1 + 4 + 4 + 20);
        assert_eq!(&bytes[0..4], b"VLBC");
        assert_eq!(bytes[4], 1);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(bytes[9..13].try_into().unwrap()), 20);
    }

    #[test]
    fn roundtrip_preserves_pool_and_code() {
        let mut pool = StringPool::new();
        pool.intern(b"hello").unwrap();
        let code = minimal_program();
        let m = Module { version: 1, strings: pool, code };
        let bytes = m.to_bytes();
        let back = Module::from_bytes(&bytes).unwrap();
        assert_eq!(back.kcount(), 1);
        assert_eq!(back.strings.get(0).unwrap(), b"hello");
        assert_eq!(back.code, m.code);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Module::empty().to_bytes();
        bytes[0] = b'X';
        assert_eq!(Module::from_bytes(&bytes).unwrap_err(), LoadError::BadMagic);
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Module::empty().to_bytes();
        bytes[4] = 9;
        assert_eq!(
            Module::from_bytes(&bytes).unwrap_err(),
            LoadError::UnsupportedVersion { found: 9 }
        );
    }

    #[test]
    fn rejects_trailing_data() {
        let mut bytes = Module::empty().to_bytes();
        bytes.push(0xAA);
        assert!(matches!(
            Module::from_bytes(&bytes).unwrap_err(),
            LoadError::TrailingData { extra: 1 }
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = Module::empty().to_bytes();
        let err = Module::from_bytes(&bytes[..6]).unwrap_err();
        assert!(matches!(err, LoadError::Truncated { .. }));
    }
}
