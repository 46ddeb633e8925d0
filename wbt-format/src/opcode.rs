//! Static opcode metadata.
//!
//! One sorted table holds everything the toolkit knows about an opcode:
//! its class (which decides the reader event it dispatches to), its
//! static `(result, arg1, arg2)` type triple, its memory access width,
//! its mnemonic, and its encoding. Lookup is a binary search on
//! `(prefix << 24) | code`; the prefix byte is reserved for future
//! extension opcodes and is zero for the whole concrete set.

use crate::types::ValueType;

/// Instruction shape; selects the reader event an opcode dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// `unreachable`.
    Unreachable,
    /// `nop`.
    Nop,
    /// `block`, carries a block signature.
    Block,
    /// `loop`, carries a block signature.
    Loop,
    /// `if`, carries a block signature.
    If,
    /// `else`.
    Else,
    /// `end`.
    End,
    /// `br`, carries a label depth.
    Br,
    /// `br_if`, carries a label depth.
    BrIf,
    /// `br_table`, carries a target vector and a default depth.
    BrTable,
    /// `return`.
    Return,
    /// `call`, carries a function index.
    Call,
    /// `call_indirect`, carries a signature index and a reserved byte.
    CallIndirect,
    /// `drop`.
    Drop,
    /// `select`.
    Select,
    /// `get_local`, carries a local index.
    GetLocal,
    /// `set_local`, carries a local index.
    SetLocal,
    /// `tee_local`, carries a local index.
    TeeLocal,
    /// `get_global`, carries a global index.
    GetGlobal,
    /// `set_global`, carries a global index.
    SetGlobal,
    /// Memory load, carries alignment and offset immediates.
    Load,
    /// Memory store, carries alignment and offset immediates.
    Store,
    /// `current_memory`, carries a reserved byte.
    CurrentMemory,
    /// `grow_memory`, carries a reserved byte.
    GrowMemory,
    /// Constant, carries a literal immediate.
    Const,
    /// One-operand numeric instruction.
    Unary,
    /// Two-operand numeric instruction.
    Binary,
    /// Two-operand comparison producing i32.
    Compare,
    /// Type-changing one-operand instruction (conversions, `eqz`,
    /// reinterprets).
    Convert,
}

/// Static metadata for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Extension prefix byte; zero for the concrete set.
    pub prefix: u8,
    /// Primary opcode byte.
    pub code: u8,
    /// Instruction shape.
    pub class: OpClass,
    /// Result type, if the instruction produces a value.
    pub result: Option<ValueType>,
    /// First (deepest) operand type, if statically known.
    pub arg1: Option<ValueType>,
    /// Second operand type, if statically known.
    pub arg2: Option<ValueType>,
    /// Memory access width in bytes; zero for non-memory instructions.
    pub mem_size: u8,
    /// Text mnemonic.
    pub name: &'static str,
}

impl OpcodeInfo {
    /// Sort/lookup key.
    pub fn key(&self) -> u32 {
        (u32::from(self.prefix) << 24) | u32::from(self.code)
    }

    /// log2 of the natural alignment of a load or store.
    pub fn natural_alignment_log2(&self) -> u32 {
        u32::from(self.mem_size).trailing_zeros()
    }
}

const ___: Option<ValueType> = None;
const I32: Option<ValueType> = Some(ValueType::I32);
const I64: Option<ValueType> = Some(ValueType::I64);
const F32: Option<ValueType> = Some(ValueType::F32);
const F64: Option<ValueType> = Some(ValueType::F64);

macro_rules! op {
    ($code:expr, $class:ident, $result:expr, $arg1:expr, $arg2:expr, $mem:expr, $name:expr) => {
        OpcodeInfo {
            prefix: 0,
            code: $code,
            class: OpClass::$class,
            result: $result,
            arg1: $arg1,
            arg2: $arg2,
            mem_size: $mem,
            name: $name,
        }
    };
}

/// The full concrete opcode set, sorted by [`OpcodeInfo::key`].
pub static OPCODE_TABLE: &[OpcodeInfo] = &[
    op!(0x00, Unreachable, ___, ___, ___, 0, "unreachable"),
    op!(0x01, Nop, ___, ___, ___, 0, "nop"),
    op!(0x02, Block, ___, ___, ___, 0, "block"),
    op!(0x03, Loop, ___, ___, ___, 0, "loop"),
    op!(0x04, If, ___, I32, ___, 0, "if"),
    op!(0x05, Else, ___, ___, ___, 0, "else"),
    op!(0x0B, End, ___, ___, ___, 0, "end"),
    op!(0x0C, Br, ___, ___, ___, 0, "br"),
    op!(0x0D, BrIf, ___, I32, ___, 0, "br_if"),
    op!(0x0E, BrTable, ___, I32, ___, 0, "br_table"),
    op!(0x0F, Return, ___, ___, ___, 0, "return"),
    op!(0x10, Call, ___, ___, ___, 0, "call"),
    op!(0x11, CallIndirect, ___, ___, ___, 0, "call_indirect"),
    op!(0x1A, Drop, ___, ___, ___, 0, "drop"),
    op!(0x1B, Select, ___, ___, I32, 0, "select"),
    op!(0x20, GetLocal, ___, ___, ___, 0, "get_local"),
    op!(0x21, SetLocal, ___, ___, ___, 0, "set_local"),
    op!(0x22, TeeLocal, ___, ___, ___, 0, "tee_local"),
    op!(0x23, GetGlobal, ___, ___, ___, 0, "get_global"),
    op!(0x24, SetGlobal, ___, ___, ___, 0, "set_global"),
    op!(0x28, Load, I32, I32, ___, 4, "i32.load"),
    op!(0x29, Load, I64, I32, ___, 8, "i64.load"),
    op!(0x2A, Load, F32, I32, ___, 4, "f32.load"),
    op!(0x2B, Load, F64, I32, ___, 8, "f64.load"),
    op!(0x2C, Load, I32, I32, ___, 1, "i32.load8_s"),
    op!(0x2D, Load, I32, I32, ___, 1, "i32.load8_u"),
    op!(0x2E, Load, I32, I32, ___, 2, "i32.load16_s"),
    op!(0x2F, Load, I32, I32, ___, 2, "i32.load16_u"),
    op!(0x30, Load, I64, I32, ___, 1, "i64.load8_s"),
    op!(0x31, Load, I64, I32, ___, 1, "i64.load8_u"),
    op!(0x32, Load, I64, I32, ___, 2, "i64.load16_s"),
    op!(0x33, Load, I64, I32, ___, 2, "i64.load16_u"),
    op!(0x34, Load, I64, I32, ___, 4, "i64.load32_s"),
    op!(0x35, Load, I64, I32, ___, 4, "i64.load32_u"),
    op!(0x36, Store, ___, I32, I32, 4, "i32.store"),
    op!(0x37, Store, ___, I32, I64, 8, "i64.store"),
    op!(0x38, Store, ___, I32, F32, 4, "f32.store"),
    op!(0x39, Store, ___, I32, F64, 8, "f64.store"),
    op!(0x3A, Store, ___, I32, I32, 1, "i32.store8"),
    op!(0x3B, Store, ___, I32, I32, 2, "i32.store16"),
    op!(0x3C, Store, ___, I32, I64, 1, "i64.store8"),
    op!(0x3D, Store, ___, I32, I64, 2, "i64.store16"),
    op!(0x3E, Store, ___, I32, I64, 4, "i64.store32"),
    op!(0x3F, CurrentMemory, I32, ___, ___, 0, "current_memory"),
    op!(0x40, GrowMemory, I32, I32, ___, 0, "grow_memory"),
    op!(0x41, Const, I32, ___, ___, 0, "i32.const"),
    op!(0x42, Const, I64, ___, ___, 0, "i64.const"),
    op!(0x43, Const, F32, ___, ___, 0, "f32.const"),
    op!(0x44, Const, F64, ___, ___, 0, "f64.const"),
    op!(0x45, Convert, I32, I32, ___, 0, "i32.eqz"),
    op!(0x46, Compare, I32, I32, I32, 0, "i32.eq"),
    op!(0x47, Compare, I32, I32, I32, 0, "i32.ne"),
    op!(0x48, Compare, I32, I32, I32, 0, "i32.lt_s"),
    op!(0x49, Compare, I32, I32, I32, 0, "i32.lt_u"),
    op!(0x4A, Compare, I32, I32, I32, 0, "i32.gt_s"),
    op!(0x4B, Compare, I32, I32, I32, 0, "i32.gt_u"),
    op!(0x4C, Compare, I32, I32, I32, 0, "i32.le_s"),
    op!(0x4D, Compare, I32, I32, I32, 0, "i32.le_u"),
    op!(0x4E, Compare, I32, I32, I32, 0, "i32.ge_s"),
    op!(0x4F, Compare, I32, I32, I32, 0, "i32.ge_u"),
    op!(0x50, Convert, I32, I64, ___, 0, "i64.eqz"),
    op!(0x51, Compare, I32, I64, I64, 0, "i64.eq"),
    op!(0x52, Compare, I32, I64, I64, 0, "i64.ne"),
    op!(0x53, Compare, I32, I64, I64, 0, "i64.lt_s"),
    op!(0x54, Compare, I32, I64, I64, 0, "i64.lt_u"),
    op!(0x55, Compare, I32, I64, I64, 0, "i64.gt_s"),
    op!(0x56, Compare, I32, I64, I64, 0, "i64.gt_u"),
    op!(0x57, Compare, I32, I64, I64, 0, "i64.le_s"),
    op!(0x58, Compare, I32, I64, I64, 0, "i64.le_u"),
    op!(0x59, Compare, I32, I64, I64, 0, "i64.ge_s"),
    op!(0x5A, Compare, I32, I64, I64, 0, "i64.ge_u"),
    op!(0x5B, Compare, I32, F32, F32, 0, "f32.eq"),
    op!(0x5C, Compare, I32, F32, F32, 0, "f32.ne"),
    op!(0x5D, Compare, I32, F32, F32, 0, "f32.lt"),
    op!(0x5E, Compare, I32, F32, F32, 0, "f32.gt"),
    op!(0x5F, Compare, I32, F32, F32, 0, "f32.le"),
    op!(0x60, Compare, I32, F32, F32, 0, "f32.ge"),
    op!(0x61, Compare, I32, F64, F64, 0, "f64.eq"),
    op!(0x62, Compare, I32, F64, F64, 0, "f64.ne"),
    op!(0x63, Compare, I32, F64, F64, 0, "f64.lt"),
    op!(0x64, Compare, I32, F64, F64, 0, "f64.gt"),
    op!(0x65, Compare, I32, F64, F64, 0, "f64.le"),
    op!(0x66, Compare, I32, F64, F64, 0, "f64.ge"),
    op!(0x67, Unary, I32, I32, ___, 0, "i32.clz"),
    op!(0x68, Unary, I32, I32, ___, 0, "i32.ctz"),
    op!(0x69, Unary, I32, I32, ___, 0, "i32.popcnt"),
    op!(0x6A, Binary, I32, I32, I32, 0, "i32.add"),
    op!(0x6B, Binary, I32, I32, I32, 0, "i32.sub"),
    op!(0x6C, Binary, I32, I32, I32, 0, "i32.mul"),
    op!(0x6D, Binary, I32, I32, I32, 0, "i32.div_s"),
    op!(0x6E, Binary, I32, I32, I32, 0, "i32.div_u"),
    op!(0x6F, Binary, I32, I32, I32, 0, "i32.rem_s"),
    op!(0x70, Binary, I32, I32, I32, 0, "i32.rem_u"),
    op!(0x71, Binary, I32, I32, I32, 0, "i32.and"),
    op!(0x72, Binary, I32, I32, I32, 0, "i32.or"),
    op!(0x73, Binary, I32, I32, I32, 0, "i32.xor"),
    op!(0x74, Binary, I32, I32, I32, 0, "i32.shl"),
    op!(0x75, Binary, I32, I32, I32, 0, "i32.shr_s"),
    op!(0x76, Binary, I32, I32, I32, 0, "i32.shr_u"),
    op!(0x77, Binary, I32, I32, I32, 0, "i32.rotl"),
    op!(0x78, Binary, I32, I32, I32, 0, "i32.rotr"),
    op!(0x79, Unary, I64, I64, ___, 0, "i64.clz"),
    op!(0x7A, Unary, I64, I64, ___, 0, "i64.ctz"),
    op!(0x7B, Unary, I64, I64, ___, 0, "i64.popcnt"),
    op!(0x7C, Binary, I64, I64, I64, 0, "i64.add"),
    op!(0x7D, Binary, I64, I64, I64, 0, "i64.sub"),
    op!(0x7E, Binary, I64, I64, I64, 0, "i64.mul"),
    op!(0x7F, Binary, I64, I64, I64, 0, "i64.div_s"),
    op!(0x80, Binary, I64, I64, I64, 0, "i64.div_u"),
    op!(0x81, Binary, I64, I64, I64, 0, "i64.rem_s"),
    op!(0x82, Binary, I64, I64, I64, 0, "i64.rem_u"),
    op!(0x83, Binary, I64, I64, I64, 0, "i64.and"),
    op!(0x84, Binary, I64, I64, I64, 0, "i64.or"),
    op!(0x85, Binary, I64, I64, I64, 0, "i64.xor"),
    op!(0x86, Binary, I64, I64, I64, 0, "i64.shl"),
    op!(0x87, Binary, I64, I64, I64, 0, "i64.shr_s"),
    op!(0x88, Binary, I64, I64, I64, 0, "i64.shr_u"),
    op!(0x89, Binary, I64, I64, I64, 0, "i64.rotl"),
    op!(0x8A, Binary, I64, I64, I64, 0, "i64.rotr"),
    op!(0x8B, Unary, F32, F32, ___, 0, "f32.abs"),
    op!(0x8C, Unary, F32, F32, ___, 0, "f32.neg"),
    op!(0x8D, Unary, F32, F32, ___, 0, "f32.ceil"),
    op!(0x8E, Unary, F32, F32, ___, 0, "f32.floor"),
    op!(0x8F, Unary, F32, F32, ___, 0, "f32.trunc"),
    op!(0x90, Unary, F32, F32, ___, 0, "f32.nearest"),
    op!(0x91, Unary, F32, F32, ___, 0, "f32.sqrt"),
    op!(0x92, Binary, F32, F32, F32, 0, "f32.add"),
    op!(0x93, Binary, F32, F32, F32, 0, "f32.sub"),
    op!(0x94, Binary, F32, F32, F32, 0, "f32.mul"),
    op!(0x95, Binary, F32, F32, F32, 0, "f32.div"),
    op!(0x96, Binary, F32, F32, F32, 0, "f32.min"),
    op!(0x97, Binary, F32, F32, F32, 0, "f32.max"),
    op!(0x98, Binary, F32, F32, F32, 0, "f32.copysign"),
    op!(0x99, Unary, F64, F64, ___, 0, "f64.abs"),
    op!(0x9A, Unary, F64, F64, ___, 0, "f64.neg"),
    op!(0x9B, Unary, F64, F64, ___, 0, "f64.ceil"),
    op!(0x9C, Unary, F64, F64, ___, 0, "f64.floor"),
    op!(0x9D, Unary, F64, F64, ___, 0, "f64.trunc"),
    op!(0x9E, Unary, F64, F64, ___, 0, "f64.nearest"),
    op!(0x9F, Unary, F64, F64, ___, 0, "f64.sqrt"),
    op!(0xA0, Binary, F64, F64, F64, 0, "f64.add"),
    op!(0xA1, Binary, F64, F64, F64, 0, "f64.sub"),
    op!(0xA2, Binary, F64, F64, F64, 0, "f64.mul"),
    op!(0xA3, Binary, F64, F64, F64, 0, "f64.div"),
    op!(0xA4, Binary, F64, F64, F64, 0, "f64.min"),
    op!(0xA5, Binary, F64, F64, F64, 0, "f64.max"),
    op!(0xA6, Binary, F64, F64, F64, 0, "f64.copysign"),
    op!(0xA7, Convert, I32, I64, ___, 0, "i32.wrap/i64"),
    op!(0xA8, Convert, I32, F32, ___, 0, "i32.trunc_s/f32"),
    op!(0xA9, Convert, I32, F32, ___, 0, "i32.trunc_u/f32"),
    op!(0xAA, Convert, I32, F64, ___, 0, "i32.trunc_s/f64"),
    op!(0xAB, Convert, I32, F64, ___, 0, "i32.trunc_u/f64"),
    op!(0xAC, Convert, I64, I32, ___, 0, "i64.extend_s/i32"),
    op!(0xAD, Convert, I64, I32, ___, 0, "i64.extend_u/i32"),
    op!(0xAE, Convert, I64, F32, ___, 0, "i64.trunc_s/f32"),
    op!(0xAF, Convert, I64, F32, ___, 0, "i64.trunc_u/f32"),
    op!(0xB0, Convert, I64, F64, ___, 0, "i64.trunc_s/f64"),
    op!(0xB1, Convert, I64, F64, ___, 0, "i64.trunc_u/f64"),
    op!(0xB2, Convert, F32, I32, ___, 0, "f32.convert_s/i32"),
    op!(0xB3, Convert, F32, I32, ___, 0, "f32.convert_u/i32"),
    op!(0xB4, Convert, F32, I64, ___, 0, "f32.convert_s/i64"),
    op!(0xB5, Convert, F32, I64, ___, 0, "f32.convert_u/i64"),
    op!(0xB6, Convert, F32, F64, ___, 0, "f32.demote/f64"),
    op!(0xB7, Convert, F64, I32, ___, 0, "f64.convert_s/i32"),
    op!(0xB8, Convert, F64, I32, ___, 0, "f64.convert_u/i32"),
    op!(0xB9, Convert, F64, I64, ___, 0, "f64.convert_s/i64"),
    op!(0xBA, Convert, F64, I64, ___, 0, "f64.convert_u/i64"),
    op!(0xBB, Convert, F64, F32, ___, 0, "f64.promote/f32"),
    op!(0xBC, Convert, I32, F32, ___, 0, "i32.reinterpret/f32"),
    op!(0xBD, Convert, I64, F64, ___, 0, "i64.reinterpret/f64"),
    op!(0xBE, Convert, F32, I32, ___, 0, "f32.reinterpret/i32"),
    op!(0xBF, Convert, F64, I64, ___, 0, "f64.reinterpret/i64"),
];

/// Look up an opcode by `(prefix, code)`.
///
/// Returns `None` for unknown encodings; the caller is expected to fold
/// the original bytes into its diagnostic so they round-trip.
pub fn lookup(prefix: u8, code: u8) -> Option<&'static OpcodeInfo> {
    let key = (u32::from(prefix) << 24) | u32::from(code);
    OPCODE_TABLE
        .binary_search_by_key(&key, OpcodeInfo::key)
        .ok()
        .map(|index| &OPCODE_TABLE[index])
}
