//! The compiled module image.
//!
//! Everything a stack interpreter needs to instantiate and run a
//! validated module: signatures, resolved imports, per-function istream
//! offsets, evaluated globals, segment images, and the istream itself.

use wbt_format::types::{FuncSignature, Limits, ValueType};

/// A typed constant value; floats are kept as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float bits.
    F32(u32),
    /// 64-bit float bits.
    F64(u64),
}

impl Value {
    /// The type of this value.
    pub fn ty(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// The zero value of a type, used for imported globals.
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0),
            ValueType::F64 => Value::F64(0),
        }
    }
}

/// A function import surviving into the compiled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFuncImport {
    /// Import module name.
    pub module: String,
    /// Import field name.
    pub field: String,
    /// Signature index.
    pub sig_index: u32,
}

/// A global import surviving into the compiled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGlobalImport {
    /// Import module name.
    pub module: String,
    /// Import field name.
    pub field: String,
    /// Declared type.
    pub ty: ValueType,
    /// Declared mutability.
    pub mutable: bool,
}

/// A compiled module-local function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledFunc {
    /// Signature index.
    pub sig_index: u32,
    /// Byte offset of the function's first bytecode in the istream.
    pub istream_offset: u32,
}

/// A module-local global with its evaluated initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledGlobal {
    /// Value type.
    pub ty: ValueType,
    /// Mutability.
    pub mutable: bool,
    /// Evaluated initializer.
    pub value: Value,
}

/// One evaluated element segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledElementSegment {
    /// Evaluated table offset.
    pub offset: u32,
    /// Function indices to place, in order.
    pub func_indices: Vec<u32>,
}

/// The module's table with its evaluated element segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTable {
    /// Declared limits.
    pub limits: Limits,
    /// Element segments.
    pub elements: Vec<CompiledElementSegment>,
}

/// One evaluated data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDataSegment {
    /// Evaluated memory offset.
    pub offset: u32,
    /// Segment payload.
    pub data: Vec<u8>,
}

/// The module's memory with its evaluated data segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMemory {
    /// Declared limits, in pages.
    pub limits: Limits,
    /// Data segments.
    pub data_segments: Vec<CompiledDataSegment>,
}

/// An export, re-exported from the format crate for convenience.
pub use wbt_format::module::Export;

/// A validated module lowered to its interpreter image.
///
/// The istream is owned exclusively by the compiler invocation that
/// produced it and transferred here on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledModule {
    /// Declared signatures, in type-section order.
    pub signatures: Vec<FuncSignature>,
    /// Function imports; they occupy function indices
    /// `0..func_imports.len()`.
    pub func_imports: Vec<CompiledFuncImport>,
    /// Global imports; they occupy global indices
    /// `0..global_imports.len()`.
    pub global_imports: Vec<CompiledGlobalImport>,
    /// Module-local functions, in declaration order.
    pub functions: Vec<CompiledFunc>,
    /// Module-local globals, in declaration order.
    pub globals: Vec<CompiledGlobal>,
    /// The table, if declared or imported.
    pub table: Option<CompiledTable>,
    /// The memory, if declared or imported.
    pub memory: Option<CompiledMemory>,
    /// Exports, in declaration order.
    pub exports: Vec<Export>,
    /// Start function index, if any.
    pub start: Option<u32>,
    /// The instruction stream.
    pub istream: Vec<u8>,
}

impl CompiledModule {
    /// Number of imported functions preceding local definitions in the
    /// function index space.
    pub fn num_func_imports(&self) -> u32 {
        self.func_imports.len() as u32
    }

    /// The signature of a function by absolute index, if in range.
    pub fn func_signature(&self, func_index: u32) -> Option<&FuncSignature> {
        let imports = self.num_func_imports();
        let sig_index = if func_index < imports {
            self.func_imports[func_index as usize].sig_index
        } else {
            self.functions
                .get((func_index - imports) as usize)?
                .sig_index
        };
        self.signatures.get(sig_index as usize)
    }
}
