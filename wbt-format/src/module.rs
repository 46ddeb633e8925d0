//! Owned module substructures shared across the toolkit.
//!
//! The decoder surfaces most of these borrowed from the input buffer;
//! the structures here are the owned forms the compiler and linker keep
//! once an input has been consumed.

use wbt_error::{codes, Error, Result};

use crate::binary;
use crate::types::{ExternalKind, Limits, ValueType};

/// Name of the debug-names custom section.
pub const NAME_SECTION_NAME: &str = "name";

/// Prefix of relocation custom sections: `reloc.<section-name>`.
pub const RELOC_SECTION_PREFIX: &str = "reloc.";

/// Canonical lowercase name of a known section id.
pub fn section_name(id: u8) -> &'static str {
    match id {
        binary::CUSTOM_SECTION_ID => "custom",
        binary::TYPE_SECTION_ID => "type",
        binary::IMPORT_SECTION_ID => "import",
        binary::FUNCTION_SECTION_ID => "function",
        binary::TABLE_SECTION_ID => "table",
        binary::MEMORY_SECTION_ID => "memory",
        binary::GLOBAL_SECTION_ID => "global",
        binary::EXPORT_SECTION_ID => "export",
        binary::START_SECTION_ID => "start",
        binary::ELEMENT_SECTION_ID => "element",
        binary::CODE_SECTION_ID => "code",
        binary::DATA_SECTION_ID => "data",
        _ => "unknown",
    }
}

/// Import descriptor, one per external kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    /// Function import with its signature index.
    Func {
        /// Index into the type section.
        sig_index: u32,
    },
    /// Table import.
    Table(Limits),
    /// Memory import.
    Memory(Limits),
    /// Global import.
    Global {
        /// Declared value type.
        ty: ValueType,
        /// Declared mutability.
        mutable: bool,
    },
}

impl ImportDesc {
    /// The external kind of this descriptor.
    pub fn kind(&self) -> ExternalKind {
        match self {
            ImportDesc::Func { .. } => ExternalKind::Func,
            ImportDesc::Table(_) => ExternalKind::Table,
            ImportDesc::Memory(_) => ExternalKind::Memory,
            ImportDesc::Global { .. } => ExternalKind::Global,
        }
    }
}

/// An import: `(module_name, field_name, descriptor)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Module name.
    pub module: String,
    /// Field name within the module.
    pub field: String,
    /// What is imported.
    pub desc: ImportDesc,
}

/// An export: `(name, kind, index-in-kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Export name; unique per kind in a valid module.
    pub name: String,
    /// Exported kind.
    pub kind: ExternalKind,
    /// Index into the union of imports + local definitions of the kind.
    pub index: u32,
}

/// A constant initializer expression.
///
/// The binary format permits exactly one constant instruction followed
/// by `end`; float literals are kept as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitExpr {
    /// `i32.const`.
    I32Const(i32),
    /// `i64.const`.
    I64Const(i64),
    /// `f32.const`, raw bits.
    F32Const(u32),
    /// `f64.const`, raw bits.
    F64Const(u64),
    /// `get_global` of an imported global.
    GetGlobal(u32),
}

impl InitExpr {
    /// The static type of the expression, if determinable without
    /// consulting global declarations.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            InitExpr::I32Const(_) => Some(ValueType::I32),
            InitExpr::I64Const(_) => Some(ValueType::I64),
            InitExpr::F32Const(_) => Some(ValueType::F32),
            InitExpr::F64Const(_) => Some(ValueType::F64),
            InitExpr::GetGlobal(_) => None,
        }
    }
}

/// A module-local global definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    /// Value type.
    pub ty: ValueType,
    /// Whether the global is mutable.
    pub mutable: bool,
    /// Constant initializer.
    pub init: InitExpr,
}

/// An element segment populating the function table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    /// Target table index (always 0 in this format).
    pub table_index: u32,
    /// Start offset in the table.
    pub offset: InitExpr,
    /// Function indices to place.
    pub func_indices: Vec<u32>,
}

/// A data segment initializing linear memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// Target memory index (always 0 in this format).
    pub memory_index: u32,
    /// Start offset in memory.
    pub offset: InitExpr,
    /// Bytes to place.
    pub data: Vec<u8>,
}

/// Relocation entry types.
///
/// Each names the encoding of the operand at the recorded offset, which
/// decides how the linker rewrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocType {
    /// Function index as a padded unsigned LEB.
    FuncIndexLeb,
    /// Table element index as a padded signed LEB (an `i32.const`).
    TableIndexSleb,
    /// Table element index as a raw little-endian i32.
    TableIndexI32,
    /// Memory address as a padded unsigned LEB, with addend.
    MemoryAddrLeb,
    /// Memory address as a padded signed LEB, with addend.
    MemoryAddrSleb,
    /// Memory address as a raw little-endian i32, with addend.
    MemoryAddrI32,
    /// Type index as a padded unsigned LEB.
    TypeIndexLeb,
    /// Global index as a padded unsigned LEB.
    GlobalIndexLeb,
}

impl RelocType {
    /// Decode the wire value.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RelocType::FuncIndexLeb),
            1 => Ok(RelocType::TableIndexSleb),
            2 => Ok(RelocType::TableIndexI32),
            3 => Ok(RelocType::MemoryAddrLeb),
            4 => Ok(RelocType::MemoryAddrSleb),
            5 => Ok(RelocType::MemoryAddrI32),
            6 => Ok(RelocType::TypeIndexLeb),
            7 => Ok(RelocType::GlobalIndexLeb),
            _ => Err(Error::schema_error(
                codes::INVALID_RELOC_TYPE,
                format!("invalid relocation type {value}"),
            )),
        }
    }

    /// The wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            RelocType::FuncIndexLeb => 0,
            RelocType::TableIndexSleb => 1,
            RelocType::TableIndexI32 => 2,
            RelocType::MemoryAddrLeb => 3,
            RelocType::MemoryAddrSleb => 4,
            RelocType::MemoryAddrI32 => 5,
            RelocType::TypeIndexLeb => 6,
            RelocType::GlobalIndexLeb => 7,
        }
    }

    /// Whether entries of this type carry an addend on the wire.
    pub fn has_addend(self) -> bool {
        matches!(
            self,
            RelocType::MemoryAddrLeb | RelocType::MemoryAddrSleb | RelocType::MemoryAddrI32
        )
    }
}

/// One relocation record: an operand inside a section payload that must
/// be rewritten when indices are renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocEntry {
    /// Operand encoding and index space.
    pub ty: RelocType,
    /// Byte offset of the operand within the target section payload.
    pub offset: u32,
    /// Addend applied after index remapping; zero when absent.
    pub addend: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloc_type_round_trip() {
        for value in 0..8 {
            let ty = RelocType::from_u32(value).unwrap();
            assert_eq!(ty.to_u32(), value);
        }
        assert!(RelocType::from_u32(8).is_err());
    }

    #[test]
    fn addend_only_on_memory_relocs() {
        assert!(RelocType::MemoryAddrLeb.has_addend());
        assert!(RelocType::MemoryAddrI32.has_addend());
        assert!(!RelocType::FuncIndexLeb.has_addend());
        assert!(!RelocType::TypeIndexLeb.has_addend());
    }

    #[test]
    fn section_names() {
        assert_eq!(section_name(binary::CODE_SECTION_ID), "code");
        assert_eq!(section_name(binary::CUSTOM_SECTION_ID), "custom");
        assert_eq!(section_name(0x7F), "unknown");
    }
}
