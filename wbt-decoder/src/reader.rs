//! The streaming binary reader.
//!
//! [`read_module`] walks the input from byte 0, decoding the header,
//! section framing, declarations, and (unless configured otherwise)
//! every instruction of every function body, delivering one handler
//! event per decoded unit. The reader owns all framing and index-range
//! checks; type checking belongs to the handler (`wbt-compiler`).

use log::trace;

use wbt_error::{codes, Error, Result};
use wbt_format::binary::{self, LAST_KNOWN_SECTION_ID};
use wbt_format::module::{
    section_name, RelocEntry, RelocType, NAME_SECTION_NAME, RELOC_SECTION_PREFIX,
};
use wbt_format::opcode::{self, OpClass};
use wbt_format::types::{block_type_from_byte, FuncSignature, Limits, ValueType};
use wbt_format::ExternalKind;

use crate::handler::ModuleHandler;

const I32_CONST_OPCODE: u8 = 0x41;
const I64_CONST_OPCODE: u8 = 0x42;
const F32_CONST_OPCODE: u8 = 0x43;
const F64_CONST_OPCODE: u8 = 0x44;
const GET_GLOBAL_OPCODE: u8 = 0x23;
const END_OPCODE: u8 = 0x0B;

/// Reader configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Parse the debug-names custom section and deliver its events.
    pub read_debug_names: bool,
    /// Do not decode expressions inside function bodies; bodies are
    /// skipped by their declared size. This is the linker
    /// configuration, which records section spans and relocations only.
    pub skip_function_bodies: bool,
}

/// Traverse a wasm binary, delivering events in file order.
///
/// On the first violation the handler's `on_error` sink receives one
/// diagnostic and the error is returned; no partial results escape.
pub fn read_module<H: ModuleHandler>(
    data: &[u8],
    options: &ReaderOptions,
    handler: &mut H,
) -> Result<()> {
    let mut reader = BinaryReader {
        data,
        offset: 0,
        options: *options,
        num_signatures: 0,
        num_func_imports: 0,
        num_table_imports: 0,
        num_memory_imports: 0,
        num_global_imports: 0,
        num_functions: 0,
        num_tables: 0,
        num_memories: 0,
        num_globals: 0,
    };
    match reader.read_all(handler) {
        Ok(()) => Ok(()),
        Err(err) => {
            let offset = err.offset.unwrap_or(reader.offset);
            handler.on_error(offset, &err.message);
            Err(err)
        }
    }
}

struct BinaryReader<'a> {
    data: &'a [u8],
    offset: usize,
    options: ReaderOptions,
    num_signatures: u32,
    num_func_imports: u32,
    num_table_imports: u32,
    num_memory_imports: u32,
    num_global_imports: u32,
    num_functions: u32,
    num_tables: u32,
    num_memories: u32,
    num_globals: u32,
}

impl<'a> BinaryReader<'a> {
    fn total_funcs(&self) -> u32 {
        self.num_func_imports + self.num_functions
    }

    fn total_tables(&self) -> u32 {
        self.num_table_imports + self.num_tables
    }

    fn total_memories(&self) -> u32 {
        self.num_memory_imports + self.num_memories
    }

    fn total_globals(&self) -> u32 {
        self.num_global_imports + self.num_globals
    }

    fn recontext(err: Error, kind: &str, desc: &str) -> Error {
        Error {
            message: format!("unable to read {kind}: {desc}"),
            ..err
        }
    }

    fn read_u8_val(&mut self, desc: &str) -> Result<u8> {
        let (value, size) = binary::read_u8(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "byte", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_u32_leb(&mut self, desc: &str) -> Result<u32> {
        let (value, size) = binary::read_leb128_u32(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "u32 leb128", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_i32_leb(&mut self, desc: &str) -> Result<i32> {
        let (value, size) = binary::read_leb128_i32(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "i32 leb128", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_i64_leb(&mut self, desc: &str) -> Result<i64> {
        let (value, size) = binary::read_leb128_i64(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "i64 leb128", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_f32_bits(&mut self, desc: &str) -> Result<u32> {
        let (value, size) = binary::read_f32_bits(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "f32", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_f64_bits(&mut self, desc: &str) -> Result<u64> {
        let (value, size) = binary::read_f64_bits(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "f64", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_str(&mut self, desc: &str) -> Result<&'a str> {
        let (value, size) = binary::read_string(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "string", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_data_slice(&mut self, desc: &str) -> Result<&'a [u8]> {
        let (value, size) = binary::read_bytes(self.data, self.offset)
            .map_err(|e| Self::recontext(e, "byte slice", desc))?;
        self.offset += size;
        Ok(value)
    }

    fn read_value_type(&mut self, desc: &str) -> Result<ValueType> {
        let offset = self.offset;
        let byte = self.read_u8_val(desc)?;
        ValueType::from_byte(byte).map_err(|e| e.at(offset))
    }

    fn read_limits(&mut self, is_memory: bool) -> Result<Limits> {
        let offset = self.offset;
        let flags = self.read_u32_leb("limits flags")?;
        if flags > 1 {
            return Err(Error::schema_error(
                codes::INVALID_LIMITS,
                format!("invalid limits flags {flags:#x}"),
            )
            .at(offset));
        }
        let initial = self.read_u32_leb("limits initial size")?;
        let max = if flags & 1 != 0 {
            Some(self.read_u32_leb("limits max size")?)
        } else {
            None
        };
        let limits = Limits { initial, max };
        limits.validate(is_memory).map_err(|e| e.at(offset))?;
        Ok(limits)
    }

    fn read_all<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<()> {
        if self.data.len() < 4 || self.data[0..4] != binary::WASM_MAGIC {
            return Err(Error::decode_error(codes::BAD_MAGIC, "bad magic value").at(0));
        }
        let (version, _) = binary::read_u32(self.data, 4)
            .map_err(|e| Self::recontext(e, "u32", "module version"))?;
        if version != binary::WASM_VERSION {
            return Err(Error::decode_error(
                codes::BAD_VERSION,
                format!(
                    "bad wasm file version {version:#x} (expected {:#x})",
                    binary::WASM_VERSION
                ),
            )
            .at(4));
        }
        self.offset = 8;
        handler.begin_module(version)?;

        let mut last_known_id = 0u8;
        while self.offset < self.data.len() {
            let header_offset = self.offset;
            let (id, size, header_size) = binary::read_section_header(self.data, self.offset)
                .map_err(|e| Self::recontext(e, "u32 leb128", "section size"))?;
            self.offset += header_size;

            let payload_start = self.offset;
            let payload_end = payload_start + size as usize;
            if payload_end > self.data.len() {
                return Err(Error::decode_error(
                    codes::UNEXPECTED_EOF,
                    format!("section size {size} exceeds input length"),
                )
                .at(header_offset));
            }

            if id != binary::CUSTOM_SECTION_ID {
                if id > LAST_KNOWN_SECTION_ID {
                    return Err(Error::decode_error(
                        codes::SECTION_OUT_OF_ORDER,
                        format!("invalid section id {id}"),
                    )
                    .at(header_offset));
                }
                if id <= last_known_id {
                    return Err(Error::decode_error(
                        codes::SECTION_OUT_OF_ORDER,
                        format!("{} section out of order", section_name(id)),
                    )
                    .at(header_offset));
                }
                last_known_id = id;
            }

            trace!(
                "section {} ({}) size {} at {:#x}",
                id,
                section_name(id),
                size,
                header_offset
            );
            handler.begin_section(id, size, payload_start)?;

            match id {
                binary::CUSTOM_SECTION_ID => {
                    self.read_custom_section(handler, size, payload_start, payload_end)?;
                }
                binary::TYPE_SECTION_ID => self.read_type_section(handler, size)?,
                binary::IMPORT_SECTION_ID => self.read_import_section(handler, size)?,
                binary::FUNCTION_SECTION_ID => self.read_function_section(handler, size)?,
                binary::TABLE_SECTION_ID => self.read_table_section(handler, size)?,
                binary::MEMORY_SECTION_ID => self.read_memory_section(handler, size)?,
                binary::GLOBAL_SECTION_ID => self.read_global_section(handler, size)?,
                binary::EXPORT_SECTION_ID => self.read_export_section(handler, size)?,
                binary::START_SECTION_ID => self.read_start_section(handler)?,
                binary::ELEMENT_SECTION_ID => self.read_element_section(handler, size)?,
                binary::CODE_SECTION_ID => {
                    self.read_code_section(handler, size, payload_end)?;
                }
                binary::DATA_SECTION_ID => self.read_data_section(handler, size)?,
                _ => unreachable!("section id checked above"),
            }

            if self.offset != payload_end {
                return Err(Error::decode_error(
                    codes::UNFINISHED_SECTION,
                    format!(
                        "unfinished {} section (expected end offset {payload_end:#x}, got {:#x})",
                        section_name(id),
                        self.offset
                    ),
                )
                .at(self.offset));
            }
            handler.end_section()?;
        }

        handler.end_module()
    }

    fn read_type_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_type_section(size)?;
        let count = self.read_u32_leb("type count")?;
        handler.on_type_count(count)?;
        for i in 0..count {
            let form_offset = self.offset;
            let form = self.read_u8_val("type form")?;
            if form != binary::FUNC_TYPE_FORM {
                return Err(Error::schema_error(
                    codes::INVALID_VALUE_TYPE,
                    format!("expected function type form, got {form:#04x}"),
                )
                .at(form_offset));
            }
            let param_count = self.read_u32_leb("function param count")?;
            let mut params = Vec::new();
            for _ in 0..param_count {
                params.push(self.read_value_type("param type")?);
            }
            let result_count = self.read_u32_leb("function result count")?;
            if result_count > 1 {
                return Err(Error::schema_error(
                    codes::MULTIPLE_RESULTS,
                    format!("function type declares {result_count} results"),
                )
                .at(form_offset));
            }
            let result = if result_count == 1 {
                Some(self.read_value_type("result type")?)
            } else {
                None
            };
            let sig = FuncSignature { params, result };
            handler.on_signature(i, &sig)?;
        }
        self.num_signatures = count;
        handler.end_type_section()
    }

    fn read_import_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_import_section(size)?;
        let count = self.read_u32_leb("import count")?;
        handler.on_import_count(count)?;
        for i in 0..count {
            let module = self.read_str("import module name")?;
            let field = self.read_str("import field name")?;
            let kind_offset = self.offset;
            let kind_byte = self.read_u8_val("import kind")?;
            match ExternalKind::from_byte(kind_byte).map_err(|e| e.at(kind_offset))? {
                ExternalKind::Func => {
                    let sig_index = self.read_u32_leb("import signature index")?;
                    if sig_index >= self.num_signatures {
                        return Err(Error::schema_error(
                            codes::INDEX_OUT_OF_RANGE,
                            format!("import signature index {sig_index} out of range"),
                        )
                        .at(kind_offset));
                    }
                    let func_index = self.num_func_imports;
                    handler.on_import_func(i, func_index, module, field, sig_index)?;
                    self.num_func_imports += 1;
                }
                ExternalKind::Table => {
                    self.read_table_decl()?;
                    let limits = self.read_limits(false)?;
                    handler.on_import_table(i, module, field, &limits)?;
                    self.num_table_imports += 1;
                }
                ExternalKind::Memory => {
                    let limits = self.read_limits(true)?;
                    handler.on_import_memory(i, module, field, &limits)?;
                    self.num_memory_imports += 1;
                }
                ExternalKind::Global => {
                    let ty = self.read_value_type("imported global type")?;
                    let mutable = self.read_mutability()?;
                    let global_index = self.num_global_imports;
                    handler.on_import_global(i, global_index, module, field, ty, mutable)?;
                    self.num_global_imports += 1;
                }
            }
        }
        handler.end_import_section()
    }

    // Reads the element type byte preceding table limits.
    fn read_table_decl(&mut self) -> Result<()> {
        let offset = self.offset;
        let elem_type = self.read_u8_val("table element type")?;
        if elem_type != binary::ANYFUNC_TYPE {
            return Err(Error::schema_error(
                codes::INVALID_VALUE_TYPE,
                format!("expected anyfunc element type, got {elem_type:#04x}"),
            )
            .at(offset));
        }
        Ok(())
    }

    fn read_mutability(&mut self) -> Result<bool> {
        let offset = self.offset;
        let byte = self.read_u8_val("global mutability")?;
        match byte {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::schema_error(
                codes::INVALID_VALUE_TYPE,
                format!("invalid mutability {byte}"),
            )
            .at(offset)),
        }
    }

    fn read_function_section<H: ModuleHandler>(
        &mut self,
        handler: &mut H,
        size: u32,
    ) -> Result<()> {
        handler.begin_function_section(size)?;
        let count = self.read_u32_leb("function count")?;
        handler.on_function_count(count)?;
        self.num_functions = count;
        for i in 0..count {
            let offset = self.offset;
            let sig_index = self.read_u32_leb("function signature index")?;
            if sig_index >= self.num_signatures {
                return Err(Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("function signature index {sig_index} out of range"),
                )
                .at(offset));
            }
            handler.on_function(i, sig_index)?;
        }
        handler.end_function_section()
    }

    fn read_table_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_table_section(size)?;
        let count_offset = self.offset;
        let count = self.read_u32_leb("table count")?;
        if self.num_table_imports + count > 1 {
            return Err(Error::schema_error(
                codes::DUPLICATE_SECTION_ITEM,
                "only one table allowed",
            )
            .at(count_offset));
        }
        handler.on_table_count(count)?;
        for i in 0..count {
            self.read_table_decl()?;
            let limits = self.read_limits(false)?;
            handler.on_table(i, &limits)?;
        }
        self.num_tables = count;
        handler.end_table_section()
    }

    fn read_memory_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_memory_section(size)?;
        let count_offset = self.offset;
        let count = self.read_u32_leb("memory count")?;
        if self.num_memory_imports + count > 1 {
            return Err(Error::schema_error(
                codes::DUPLICATE_SECTION_ITEM,
                "only one memory allowed",
            )
            .at(count_offset));
        }
        handler.on_memory_count(count)?;
        for i in 0..count {
            let limits = self.read_limits(true)?;
            handler.on_memory(i, &limits)?;
        }
        self.num_memories = count;
        handler.end_memory_section()
    }

    fn read_global_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_global_section(size)?;
        let count = self.read_u32_leb("global count")?;
        handler.on_global_count(count)?;
        for i in 0..count {
            let ty = self.read_value_type("global type")?;
            let mutable = self.read_mutability()?;
            handler.begin_global(i, ty, mutable)?;
            self.read_init_expr(handler, i)?;
            handler.end_global(i)?;
            self.num_globals += 1;
        }
        handler.end_global_section()
    }

    fn read_init_expr<H: ModuleHandler>(&mut self, handler: &mut H, index: u32) -> Result<()> {
        let expr_offset = self.offset;
        let byte = self.read_u8_val("init expression opcode")?;
        match byte {
            I32_CONST_OPCODE => {
                let value = self.read_i32_leb("i32.const value")?;
                handler.on_init_expr_i32_const(index, value)?;
            }
            I64_CONST_OPCODE => {
                let value = self.read_i64_leb("i64.const value")?;
                handler.on_init_expr_i64_const(index, value)?;
            }
            F32_CONST_OPCODE => {
                let bits = self.read_f32_bits("f32.const value")?;
                handler.on_init_expr_f32_const(index, bits)?;
            }
            F64_CONST_OPCODE => {
                let bits = self.read_f64_bits("f64.const value")?;
                handler.on_init_expr_f64_const(index, bits)?;
            }
            GET_GLOBAL_OPCODE => {
                let global_index = self.read_u32_leb("get_global index")?;
                if global_index >= self.num_global_imports {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!(
                            "init expression global index {global_index} must refer to an \
                             imported global"
                        ),
                    )
                    .at(expr_offset));
                }
                handler.on_init_expr_get_global(index, global_index)?;
            }
            _ => {
                return Err(Error::schema_error(
                    codes::INVALID_INIT_EXPR,
                    format!("unexpected opcode {byte:#04x} in initializer expression"),
                )
                .at(expr_offset));
            }
        }
        let end_offset = self.offset;
        let end = self.read_u8_val("init expression end")?;
        if end != END_OPCODE {
            return Err(Error::schema_error(
                codes::INVALID_INIT_EXPR,
                "expected end of initializer expression",
            )
            .at(end_offset));
        }
        Ok(())
    }

    fn read_export_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_export_section(size)?;
        let count = self.read_u32_leb("export count")?;
        handler.on_export_count(count)?;
        for i in 0..count {
            let name = self.read_str("export name")?;
            let kind_offset = self.offset;
            let kind_byte = self.read_u8_val("export kind")?;
            let kind = ExternalKind::from_byte(kind_byte).map_err(|e| e.at(kind_offset))?;
            let index_offset = self.offset;
            let item_index = self.read_u32_leb("export index")?;
            let bound = match kind {
                ExternalKind::Func => self.total_funcs(),
                ExternalKind::Table => self.total_tables(),
                ExternalKind::Memory => self.total_memories(),
                ExternalKind::Global => self.total_globals(),
            };
            if item_index >= bound {
                return Err(Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("export {} index {item_index} out of range", kind.name()),
                )
                .at(index_offset));
            }
            handler.on_export(i, kind, item_index, name)?;
        }
        handler.end_export_section()
    }

    fn read_start_section<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<()> {
        let offset = self.offset;
        let func_index = self.read_u32_leb("start function index")?;
        if func_index >= self.total_funcs() {
            return Err(Error::schema_error(
                codes::INDEX_OUT_OF_RANGE,
                format!("start function index {func_index} out of range"),
            )
            .at(offset));
        }
        handler.on_start_function(func_index)
    }

    fn read_element_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_element_section(size)?;
        let count_offset = self.offset;
        let count = self.read_u32_leb("element segment count")?;
        if count > 0 && self.total_tables() == 0 {
            return Err(Error::schema_error(
                codes::ELEMENT_WITHOUT_TABLE,
                "element section requires a table",
            )
            .at(count_offset));
        }
        handler.on_element_count(count)?;
        for i in 0..count {
            let index_offset = self.offset;
            let table_index = self.read_u32_leb("element segment table index")?;
            if table_index >= self.total_tables() {
                return Err(Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("element segment table index {table_index} out of range"),
                )
                .at(index_offset));
            }
            handler.begin_element_segment(i, table_index)?;
            self.read_init_expr(handler, i)?;
            let func_count = self.read_u32_leb("element function index count")?;
            handler.on_element_function_count(i, func_count)?;
            for _ in 0..func_count {
                let func_offset = self.offset;
                let func_index = self.read_u32_leb("element function index")?;
                if func_index >= self.total_funcs() {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("element function index {func_index} out of range"),
                    )
                    .at(func_offset));
                }
                handler.on_element_function(i, func_index)?;
            }
            handler.end_element_segment(i)?;
        }
        handler.end_element_section()
    }

    fn read_data_section<H: ModuleHandler>(&mut self, handler: &mut H, size: u32) -> Result<()> {
        handler.begin_data_section(size)?;
        let count_offset = self.offset;
        let count = self.read_u32_leb("data segment count")?;
        if count > 0 && self.total_memories() == 0 {
            return Err(Error::schema_error(
                codes::DATA_WITHOUT_MEMORY,
                "data section requires a memory",
            )
            .at(count_offset));
        }
        handler.on_data_count(count)?;
        for i in 0..count {
            let index_offset = self.offset;
            let memory_index = self.read_u32_leb("data segment memory index")?;
            if memory_index >= self.total_memories() {
                return Err(Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("data segment memory index {memory_index} out of range"),
                )
                .at(index_offset));
            }
            handler.begin_data_segment(i, memory_index)?;
            self.read_init_expr(handler, i)?;
            let data = self.read_data_slice("data segment payload")?;
            handler.on_data_segment_data(i, data)?;
            handler.end_data_segment(i)?;
        }
        handler.end_data_section()
    }

    fn read_code_section<H: ModuleHandler>(
        &mut self,
        handler: &mut H,
        size: u32,
        section_end: usize,
    ) -> Result<()> {
        handler.begin_code_section(size)?;
        let count_offset = self.offset;
        let count = self.read_u32_leb("function body count")?;
        if count != self.num_functions {
            return Err(Error::schema_error(
                codes::COUNT_MISMATCH,
                format!(
                    "function signature count {} != function body count {count}",
                    self.num_functions
                ),
            )
            .at(count_offset));
        }
        handler.on_function_body_count(count)?;
        for i in 0..count {
            let size_offset = self.offset;
            let body_size = self.read_u32_leb("function body size")?;
            let body_end = self.offset + body_size as usize;
            if body_end > section_end {
                return Err(Error::decode_error(
                    codes::UNEXPECTED_EOF,
                    format!("function body size {body_size} exceeds section"),
                )
                .at(size_offset));
            }
            handler.begin_function_body(i)?;
            if self.options.skip_function_bodies {
                self.offset = body_end;
            } else {
                self.read_local_decls(handler)?;
                self.read_function_exprs(handler, body_end)?;
            }
            handler.end_function_body(i)?;
        }
        handler.end_code_section()
    }

    fn read_local_decls<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<()> {
        let count_offset = self.offset;
        let decl_count = self.read_u32_leb("local declaration count")?;
        handler.on_local_decl_count(decl_count)?;
        let mut total: u32 = 0;
        for i in 0..decl_count {
            let count = self.read_u32_leb("local type count")?;
            let ty = self.read_value_type("local type")?;
            total = total.checked_add(count).ok_or_else(|| {
                Error::schema_error(codes::INVALID_LIMITS, "too many locals").at(count_offset)
            })?;
            handler.on_local_decl(i, count, ty)?;
        }
        Ok(())
    }

    fn read_function_exprs<H: ModuleHandler>(
        &mut self,
        handler: &mut H,
        body_end: usize,
    ) -> Result<()> {
        let body_offset = self.offset;
        let mut last_was_end = false;
        while self.offset < body_end {
            last_was_end = self.read_expr(handler)?;
        }
        if self.offset != body_end {
            return Err(Error::decode_error(
                codes::UNFINISHED_FUNCTION_BODY,
                "function body overran its declared size",
            )
            .at(body_offset));
        }
        if !last_was_end {
            return Err(Error::decode_error(
                codes::UNFINISHED_FUNCTION_BODY,
                "function body must end with end opcode",
            )
            .at(self.offset));
        }
        Ok(())
    }

    // Decodes one instruction and dispatches its event. Returns whether
    // the instruction was `end`.
    fn read_expr<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<bool> {
        let opcode_offset = self.offset;
        let byte = self.read_u8_val("opcode")?;
        let info = opcode::lookup(0, byte).ok_or_else(|| {
            Error::decode_error(
                codes::UNKNOWN_OPCODE,
                format!("unknown opcode {byte:#04x}"),
            )
            .at(opcode_offset)
        })?;

        match info.class {
            OpClass::Unreachable => handler.on_unreachable_expr()?,
            OpClass::Nop => handler.on_nop_expr()?,
            OpClass::Block => {
                let bt = self.read_block_type()?;
                handler.on_block_expr(bt)?;
            }
            OpClass::Loop => {
                let bt = self.read_block_type()?;
                handler.on_loop_expr(bt)?;
            }
            OpClass::If => {
                let bt = self.read_block_type()?;
                handler.on_if_expr(bt)?;
            }
            OpClass::Else => handler.on_else_expr()?,
            OpClass::End => handler.on_end_expr()?,
            OpClass::Br => {
                let depth = self.read_u32_leb("br depth")?;
                handler.on_br_expr(depth)?;
            }
            OpClass::BrIf => {
                let depth = self.read_u32_leb("br_if depth")?;
                handler.on_br_if_expr(depth)?;
            }
            OpClass::BrTable => {
                let num_targets = self.read_u32_leb("br_table target count")?;
                let mut targets = Vec::new();
                for _ in 0..num_targets {
                    targets.push(self.read_u32_leb("br_table target depth")?);
                }
                let default = self.read_u32_leb("br_table default depth")?;
                handler.on_br_table_expr(&targets, default)?;
            }
            OpClass::Return => handler.on_return_expr()?,
            OpClass::Call => {
                let func_index = self.read_u32_leb("call function index")?;
                if func_index >= self.total_funcs() {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("call function index {func_index} out of range"),
                    )
                    .at(opcode_offset));
                }
                handler.on_call_expr(func_index)?;
            }
            OpClass::CallIndirect => {
                let sig_index = self.read_u32_leb("call_indirect signature index")?;
                if sig_index >= self.num_signatures {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("call_indirect signature index {sig_index} out of range"),
                    )
                    .at(opcode_offset));
                }
                self.read_reserved("call_indirect")?;
                handler.on_call_indirect_expr(sig_index)?;
            }
            OpClass::Drop => handler.on_drop_expr()?,
            OpClass::Select => handler.on_select_expr()?,
            OpClass::GetLocal => {
                let index = self.read_u32_leb("get_local index")?;
                handler.on_get_local_expr(index)?;
            }
            OpClass::SetLocal => {
                let index = self.read_u32_leb("set_local index")?;
                handler.on_set_local_expr(index)?;
            }
            OpClass::TeeLocal => {
                let index = self.read_u32_leb("tee_local index")?;
                handler.on_tee_local_expr(index)?;
            }
            OpClass::GetGlobal => {
                let index = self.read_u32_leb("get_global index")?;
                if index >= self.total_globals() {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("get_global index {index} out of range"),
                    )
                    .at(opcode_offset));
                }
                handler.on_get_global_expr(index)?;
            }
            OpClass::SetGlobal => {
                let index = self.read_u32_leb("set_global index")?;
                if index >= self.total_globals() {
                    return Err(Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("set_global index {index} out of range"),
                    )
                    .at(opcode_offset));
                }
                handler.on_set_global_expr(index)?;
            }
            OpClass::Load => {
                let align_log2 = self.read_u32_leb("load alignment")?;
                let offset = self.read_u32_leb("load offset")?;
                handler.on_load_expr(info, align_log2, offset)?;
            }
            OpClass::Store => {
                let align_log2 = self.read_u32_leb("store alignment")?;
                let offset = self.read_u32_leb("store offset")?;
                handler.on_store_expr(info, align_log2, offset)?;
            }
            OpClass::CurrentMemory => {
                self.read_reserved("current_memory")?;
                handler.on_current_memory_expr()?;
            }
            OpClass::GrowMemory => {
                self.read_reserved("grow_memory")?;
                handler.on_grow_memory_expr()?;
            }
            OpClass::Const => match info.result {
                Some(ValueType::I32) => {
                    let value = self.read_i32_leb("i32.const value")?;
                    handler.on_i32_const_expr(value)?;
                }
                Some(ValueType::I64) => {
                    let value = self.read_i64_leb("i64.const value")?;
                    handler.on_i64_const_expr(value)?;
                }
                Some(ValueType::F32) => {
                    let bits = self.read_f32_bits("f32.const value")?;
                    handler.on_f32_const_expr(bits)?;
                }
                Some(ValueType::F64) => {
                    let bits = self.read_f64_bits("f64.const value")?;
                    handler.on_f64_const_expr(bits)?;
                }
                None => unreachable!("const opcodes declare a result type"),
            },
            OpClass::Unary => handler.on_unary_expr(info)?,
            OpClass::Binary => handler.on_binary_expr(info)?,
            OpClass::Compare => handler.on_compare_expr(info)?,
            OpClass::Convert => handler.on_convert_expr(info)?,
        }

        Ok(info.class == OpClass::End)
    }

    fn read_block_type(&mut self) -> Result<wbt_format::types::BlockType> {
        let offset = self.offset;
        let byte = self.read_u8_val("block signature")?;
        block_type_from_byte(byte).map_err(|e| e.at(offset))
    }

    fn read_reserved(&mut self, what: &str) -> Result<()> {
        let offset = self.offset;
        let reserved = self.read_u32_leb("reserved value")?;
        if reserved != 0 {
            return Err(Error::schema_error(
                codes::RESERVED_NONZERO,
                format!("{what} reserved value must be 0"),
            )
            .at(offset));
        }
        Ok(())
    }

    fn read_custom_section<H: ModuleHandler>(
        &mut self,
        handler: &mut H,
        size: u32,
        payload_start: usize,
        section_end: usize,
    ) -> Result<()> {
        let name = self.read_str("custom section name")?;
        handler.begin_custom_section(name, size, payload_start)?;
        if name == NAME_SECTION_NAME {
            if self.options.read_debug_names {
                self.read_names_section(handler)?;
            } else {
                self.offset = section_end;
            }
        } else if name.starts_with(RELOC_SECTION_PREFIX) {
            self.read_reloc_section(handler)?;
        } else {
            // Unknown custom sections are skipped, not rejected.
            self.offset = section_end;
        }
        handler.end_custom_section()
    }

    fn read_names_section<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<()> {
        let count = self.read_u32_leb("function name count")?;
        handler.on_function_names_count(count)?;
        for i in 0..count {
            let name = self.read_str("function name")?;
            handler.on_function_name(i, name)?;
            let local_count = self.read_u32_leb("local name count")?;
            handler.on_local_names_count(i, local_count)?;
            for j in 0..local_count {
                let local_name = self.read_str("local name")?;
                handler.on_local_name(i, j, local_name)?;
            }
        }
        Ok(())
    }

    fn read_reloc_section<H: ModuleHandler>(&mut self, handler: &mut H) -> Result<()> {
        let id_offset = self.offset;
        let section_id = self.read_u32_leb("reloc target section id")?;
        if section_id > u32::from(LAST_KNOWN_SECTION_ID) {
            return Err(Error::schema_error(
                codes::INVALID_RELOC_TYPE,
                format!("reloc target section id {section_id} out of range"),
            )
            .at(id_offset));
        }
        let target_name = if section_id == u32::from(binary::CUSTOM_SECTION_ID) {
            Some(self.read_str("reloc target section name")?)
        } else {
            None
        };
        handler.begin_reloc_section(section_id as u8, target_name)?;
        let count = self.read_u32_leb("relocation count")?;
        handler.on_reloc_count(count)?;
        for _ in 0..count {
            let ty_offset = self.offset;
            let ty_raw = self.read_u32_leb("relocation type")?;
            let ty = RelocType::from_u32(ty_raw).map_err(|e| e.at(ty_offset))?;
            let offset = self.read_u32_leb("relocation offset")?;
            let addend = if ty.has_addend() {
                self.read_i32_leb("relocation addend")?
            } else {
                0
            };
            handler.on_reloc(RelocEntry { ty, offset, addend })?;
        }
        handler.end_reloc_section()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NopHandler;

    #[test]
    fn empty_module_succeeds() {
        // Magic + version 13, no sections.
        let data = [0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        assert!(read_module(&data, &ReaderOptions::default(), &mut NopHandler).is_ok());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let data = [0x00, 0x61, 0x73, 0x6E, 0x0D, 0x00, 0x00, 0x00];
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::BAD_MAGIC);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let data = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::BAD_VERSION);
        assert_eq!(err.offset, Some(4));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let data = [0x00, 0x61, 0x73, 0x6D];
        assert!(read_module(&data, &ReaderOptions::default(), &mut NopHandler).is_err());
    }

    #[test]
    fn section_size_beyond_input_is_rejected() {
        let mut data = vec![0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0x01, 0x10]); // type section claiming 16 bytes
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::UNEXPECTED_EOF);
    }

    #[test]
    fn out_of_order_sections_are_rejected() {
        let mut data = vec![0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        // memory section (5) then type section (1): ids must increase.
        data.extend_from_slice(&[0x05, 0x01, 0x00]);
        data.extend_from_slice(&[0x01, 0x01, 0x00]);
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::SECTION_OUT_OF_ORDER);
    }

    #[test]
    fn duplicate_known_section_is_rejected() {
        let mut data = vec![0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[0x01, 0x01, 0x00]);
        data.extend_from_slice(&[0x01, 0x01, 0x00]);
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::SECTION_OUT_OF_ORDER);
    }

    #[test]
    fn unfinished_section_is_rejected() {
        let mut data = vec![0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        // type section with 2 payload bytes but a count of 0 leaves one
        // byte unconsumed.
        data.extend_from_slice(&[0x01, 0x02, 0x00, 0x00]);
        let err = read_module(&data, &ReaderOptions::default(), &mut NopHandler).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::UNFINISHED_SECTION);
    }

    #[test]
    fn unknown_custom_sections_are_skipped() {
        let mut data = vec![0x00, 0x61, 0x73, 0x6D, 0x0D, 0x00, 0x00, 0x00];
        // custom section: name "x", 2 junk bytes.
        data.extend_from_slice(&[0x00, 0x04, 0x01, b'x', 0xDE, 0xAD]);
        assert!(read_module(&data, &ReaderOptions::default(), &mut NopHandler).is_ok());
    }
}
