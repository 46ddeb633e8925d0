//! Shared type definitions for the wasm binary model.

use core::fmt;

use wbt_error::{codes, Error, Result};

use crate::binary;

/// Number of bytes in one wasm memory page.
pub const PAGE_SIZE: u32 = 65536;

/// Maximum number of pages a memory may declare.
pub const MAX_PAGES: u32 = 65536;

/// The four concrete wasm value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl ValueType {
    /// Decode a value-type byte (the signed-LEB128 image of a small
    /// negative integer; one byte on the wire).
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            binary::I32_TYPE => Ok(ValueType::I32),
            binary::I64_TYPE => Ok(ValueType::I64),
            binary::F32_TYPE => Ok(ValueType::F32),
            binary::F64_TYPE => Ok(ValueType::F64),
            _ => Err(Error::schema_error(
                codes::INVALID_VALUE_TYPE,
                format!("invalid value type byte {byte:#04x}"),
            )),
        }
    }

    /// The wire encoding of this type.
    pub fn to_byte(self) -> u8 {
        match self {
            ValueType::I32 => binary::I32_TYPE,
            ValueType::I64 => binary::I64_TYPE,
            ValueType::F32 => binary::F32_TYPE,
            ValueType::F64 => binary::F64_TYPE,
        }
    }

    /// Text mnemonic.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A block signature: void or a single concrete value type.
pub type BlockType = Option<ValueType>;

/// Decode a block signature byte; void is allowed here.
pub fn block_type_from_byte(byte: u8) -> Result<BlockType> {
    if byte == binary::VOID_TYPE {
        return Ok(None);
    }
    ValueType::from_byte(byte)
        .map(Some)
        .map_err(|_| {
            Error::schema_error(
                codes::INVALID_BLOCK_TYPE,
                format!("invalid block signature byte {byte:#04x}"),
            )
        })
}

/// The four kinds of imports and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalKind {
    /// A function.
    Func,
    /// A table.
    Table,
    /// A linear memory.
    Memory,
    /// A global.
    Global,
}

impl ExternalKind {
    /// Decode an external-kind byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ExternalKind::Func),
            1 => Ok(ExternalKind::Table),
            2 => Ok(ExternalKind::Memory),
            3 => Ok(ExternalKind::Global),
            _ => Err(Error::schema_error(
                codes::INVALID_EXTERNAL_KIND,
                format!("invalid external kind {byte}"),
            )),
        }
    }

    /// The wire encoding of this kind.
    pub fn to_byte(self) -> u8 {
        match self {
            ExternalKind::Func => 0,
            ExternalKind::Table => 1,
            ExternalKind::Memory => 2,
            ExternalKind::Global => 3,
        }
    }

    /// Text name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ExternalKind::Func => "function",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
        }
    }
}

/// Resizable limits for tables and memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    /// Initial size (pages for memories, elements for tables).
    pub initial: u32,
    /// Optional maximum size.
    pub max: Option<u32>,
}

impl Limits {
    /// Check the `initial <= max` invariant and, for memories, the page
    /// ceiling.
    pub fn validate(&self, is_memory: bool) -> Result<()> {
        if let Some(max) = self.max {
            if self.initial > max {
                return Err(Error::schema_error(
                    codes::INVALID_LIMITS,
                    format!("initial size {} exceeds max {}", self.initial, max),
                ));
            }
        }
        if is_memory {
            let effective_max = self.max.unwrap_or(self.initial);
            if self.initial > MAX_PAGES || effective_max > MAX_PAGES {
                return Err(Error::schema_error(
                    codes::INVALID_LIMITS,
                    format!("memory size exceeds {MAX_PAGES} pages"),
                ));
            }
        }
        Ok(())
    }
}

/// A function signature: ordered parameters and at most one result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncSignature {
    /// Parameter types, in order.
    pub params: Vec<ValueType>,
    /// Result type, if any.
    pub result: Option<ValueType>,
}

impl FuncSignature {
    /// Number of results (0 or 1).
    pub fn result_arity(&self) -> u32 {
        u32::from(self.result.is_some())
    }
}

impl fmt::Display for FuncSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(") -> ")?;
        match self.result {
            Some(result) => write!(f, "{result}"),
            None => f.write_str("()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_round_trips_through_bytes() {
        for ty in [ValueType::I32, ValueType::I64, ValueType::F32, ValueType::F64] {
            assert_eq!(ValueType::from_byte(ty.to_byte()).unwrap(), ty);
        }
    }

    #[test]
    fn void_is_a_block_type_but_not_a_value_type() {
        assert!(ValueType::from_byte(0x40).is_err());
        assert_eq!(block_type_from_byte(0x40).unwrap(), None);
        assert_eq!(block_type_from_byte(0x7F).unwrap(), Some(ValueType::I32));
        assert!(block_type_from_byte(0x6F).is_err());
    }

    #[test]
    fn limits_invariants() {
        assert!(Limits { initial: 1, max: Some(2) }.validate(false).is_ok());
        assert!(Limits { initial: 3, max: Some(2) }.validate(false).is_err());
        assert!(Limits { initial: 65537, max: None }.validate(true).is_err());
        assert!(Limits { initial: 65537, max: None }.validate(false).is_ok());
    }

    #[test]
    fn signature_display() {
        let sig = FuncSignature {
            params: vec![ValueType::I32, ValueType::F64],
            result: Some(ValueType::I32),
        };
        assert_eq!(sig.to_string(), "(i32, f64) -> i32");
    }
}
