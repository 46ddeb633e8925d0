//! Byte-buffer emission helpers.
//!
//! The linker re-frames merged modules through this writer; tests use it
//! to assemble fixtures. The `canonicalize_lebs` option mirrors the
//! relocatable-output convention: when off, every u32/i32 LEB operand is
//! written padded to 5 bytes so relocation records stay patchable.

use crate::binary::{
    self, write_fixed_leb128_i32, write_fixed_leb128_u32, write_leb128_i32, write_leb128_i64,
    write_leb128_u32,
};
use crate::module::InitExpr;
use crate::types::Limits;

const I32_CONST_OPCODE: u8 = 0x41;
const I64_CONST_OPCODE: u8 = 0x42;
const F32_CONST_OPCODE: u8 = 0x43;
const F64_CONST_OPCODE: u8 = 0x44;
const GET_GLOBAL_OPCODE: u8 = 0x23;
const END_OPCODE: u8 = 0x0B;

/// Options for binary emission.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// When true, LEB operands use the canonical shortest form; when
    /// false they are padded to 5 bytes for later in-place patching.
    pub canonicalize_lebs: bool,
    /// Whether to emit the debug-names custom section.
    pub write_debug_names: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            canonicalize_lebs: true,
            write_debug_names: false,
        }
    }
}

/// An append-only wasm binary writer.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    canonicalize_lebs: bool,
}

impl BinaryWriter {
    /// Create a writer honoring the given options.
    pub fn new(options: &WriteOptions) -> Self {
        Self {
            buf: Vec::new(),
            canonicalize_lebs: options.canonicalize_lebs,
        }
    }

    /// Create a writer that always emits canonical LEBs.
    pub fn canonical() -> Self {
        Self {
            buf: Vec::new(),
            canonicalize_lebs: true,
        }
    }

    /// Current length of the buffer.
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    /// Consume the writer, yielding the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrow the bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append the module header: magic and version.
    pub fn write_module_header(&mut self) {
        self.buf.extend_from_slice(&binary::WASM_MAGIC);
        self.buf.extend_from_slice(&binary::WASM_VERSION.to_le_bytes());
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a raw little-endian u32.
    pub fn write_raw_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append an unsigned 32-bit LEB, canonical or padded per options.
    pub fn write_u32_leb(&mut self, value: u32) {
        if self.canonicalize_lebs {
            self.buf.extend_from_slice(&write_leb128_u32(value));
        } else {
            self.buf.extend_from_slice(&write_fixed_leb128_u32(value));
        }
    }

    /// Append an unsigned 32-bit LEB in canonical form regardless of
    /// options. Counts and sizes are never relocation targets.
    pub fn write_u32_leb_canonical(&mut self, value: u32) {
        self.buf.extend_from_slice(&write_leb128_u32(value));
    }

    /// Append a signed 32-bit LEB, canonical or padded per options.
    pub fn write_i32_leb(&mut self, value: i32) {
        if self.canonicalize_lebs {
            self.buf.extend_from_slice(&write_leb128_i32(value));
        } else {
            self.buf.extend_from_slice(&write_fixed_leb128_i32(value));
        }
    }

    /// Append a signed 64-bit LEB in canonical form.
    pub fn write_i64_leb(&mut self, value: i64) {
        self.buf.extend_from_slice(&write_leb128_i64(value));
    }

    /// Append a length-prefixed string.
    pub fn write_str(&mut self, value: &str) {
        self.write_u32_leb_canonical(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Append resizable limits: flag byte, initial, optional max.
    pub fn write_limits(&mut self, limits: &Limits) {
        match limits.max {
            Some(max) => {
                self.write_u8(1);
                self.write_u32_leb_canonical(limits.initial);
                self.write_u32_leb_canonical(max);
            }
            None => {
                self.write_u8(0);
                self.write_u32_leb_canonical(limits.initial);
            }
        }
    }

    /// Append a constant initializer expression, `end` included.
    pub fn write_init_expr(&mut self, expr: &InitExpr) {
        match *expr {
            InitExpr::I32Const(value) => {
                self.write_u8(I32_CONST_OPCODE);
                self.write_i32_leb(value);
            }
            InitExpr::I64Const(value) => {
                self.write_u8(I64_CONST_OPCODE);
                self.write_i64_leb(value);
            }
            InitExpr::F32Const(bits) => {
                self.write_u8(F32_CONST_OPCODE);
                self.buf.extend_from_slice(&bits.to_le_bytes());
            }
            InitExpr::F64Const(bits) => {
                self.write_u8(F64_CONST_OPCODE);
                self.buf.extend_from_slice(&bits.to_le_bytes());
            }
            InitExpr::GetGlobal(index) => {
                self.write_u8(GET_GLOBAL_OPCODE);
                self.write_u32_leb(index);
            }
        }
        self.write_u8(END_OPCODE);
    }

    /// Append a framed section: id, payload length, payload.
    pub fn write_section(&mut self, id: u8, payload: &[u8]) {
        self.write_u8(id);
        self.write_u32_leb_canonical(payload.len() as u32);
        self.buf.extend_from_slice(payload);
    }

    /// Append a framed custom section: id 0, name inside the payload.
    pub fn write_custom_section(&mut self, name: &str, payload: &[u8]) {
        let mut framed = Vec::with_capacity(name.len() + payload.len() + 5);
        framed.extend_from_slice(&write_leb128_u32(name.len() as u32));
        framed.extend_from_slice(name.as_bytes());
        framed.extend_from_slice(payload);
        self.write_section(binary::CUSTOM_SECTION_ID, &framed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{read_leb128_u32, read_section_header};

    #[test]
    fn header_is_magic_plus_version() {
        let mut writer = BinaryWriter::canonical();
        writer.write_module_header();
        assert_eq!(
            writer.bytes(),
            &[0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn padded_mode_widens_operands_but_not_counts() {
        let mut writer = BinaryWriter::new(&WriteOptions {
            canonicalize_lebs: false,
            write_debug_names: false,
        });
        writer.write_u32_leb(3);
        assert_eq!(writer.pos(), 5);
        writer.write_u32_leb_canonical(3);
        assert_eq!(writer.pos(), 6);
    }

    #[test]
    fn section_framing_round_trips() {
        let mut writer = BinaryWriter::canonical();
        writer.write_section(7, &[1, 2, 3]);
        let bytes = writer.into_bytes();
        let (id, size, consumed) = read_section_header(&bytes, 0).unwrap();
        assert_eq!((id, size), (7, 3));
        assert_eq!(&bytes[consumed..consumed + 3], &[1, 2, 3]);
    }

    #[test]
    fn custom_section_embeds_name() {
        let mut writer = BinaryWriter::canonical();
        writer.write_custom_section("name", &[0]);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0); // custom id
        let (payload_len, _) = read_leb128_u32(&bytes, 1).unwrap();
        assert_eq!(payload_len, 6); // 1 len byte + 4 name bytes + 1 payload
        assert_eq!(&bytes[3..7], b"name");
    }

    #[test]
    fn init_expr_encoding() {
        let mut writer = BinaryWriter::canonical();
        writer.write_init_expr(&InitExpr::I32Const(42));
        assert_eq!(writer.bytes(), &[0x41, 42, 0x0B]);
    }
}
