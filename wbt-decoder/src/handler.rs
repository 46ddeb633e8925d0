//! The reader's event sink.
//!
//! One callback per event kind; every callback has a no-op default so
//! implementations override only what they consume. Returning an error
//! from any callback aborts the reader.

use wbt_error::Result;
use wbt_format::module::RelocEntry;
use wbt_format::opcode::OpcodeInfo;
use wbt_format::types::{BlockType, ExternalKind, FuncSignature, Limits, ValueType};

/// Event sink for [`crate::read_module`].
#[allow(unused_variables)]
pub trait ModuleHandler {
    /// Fatal diagnostic sink; called once, with the byte offset where
    /// the failure was detected, before the reader unwinds.
    fn on_error(&mut self, offset: usize, message: &str) {}

    /// Module header decoded.
    fn begin_module(&mut self, version: u32) -> Result<()> {
        Ok(())
    }
    /// Whole module consumed.
    fn end_module(&mut self) -> Result<()> {
        Ok(())
    }

    /// A section header was decoded; `payload_offset` is the absolute
    /// offset of the payload's first byte.
    fn begin_section(&mut self, id: u8, size: u32, payload_offset: usize) -> Result<()> {
        Ok(())
    }
    /// A section's payload was fully consumed.
    fn end_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// A custom section header (name decoded from the payload).
    fn begin_custom_section(&mut self, name: &str, size: u32, payload_offset: usize) -> Result<()> {
        Ok(())
    }
    /// End of a custom section.
    fn end_custom_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the type section.
    fn begin_type_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared signature count.
    fn on_type_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One function signature.
    fn on_signature(&mut self, index: u32, sig: &FuncSignature) -> Result<()> {
        Ok(())
    }
    /// End of the type section.
    fn end_type_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the import section.
    fn begin_import_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared import count.
    fn on_import_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// A function import; `func_index` is its position in the function
    /// index space (imports precede module-local definitions).
    fn on_import_func(
        &mut self,
        import_index: u32,
        func_index: u32,
        module: &str,
        field: &str,
        sig_index: u32,
    ) -> Result<()> {
        Ok(())
    }
    /// A table import.
    fn on_import_table(
        &mut self,
        import_index: u32,
        module: &str,
        field: &str,
        limits: &Limits,
    ) -> Result<()> {
        Ok(())
    }
    /// A memory import.
    fn on_import_memory(
        &mut self,
        import_index: u32,
        module: &str,
        field: &str,
        limits: &Limits,
    ) -> Result<()> {
        Ok(())
    }
    /// A global import; `global_index` is its position in the global
    /// index space.
    fn on_import_global(
        &mut self,
        import_index: u32,
        global_index: u32,
        module: &str,
        field: &str,
        ty: ValueType,
        mutable: bool,
    ) -> Result<()> {
        Ok(())
    }
    /// End of the import section.
    fn end_import_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the function section.
    fn begin_function_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared module-local function count.
    fn on_function_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// Signature index of one module-local function.
    fn on_function(&mut self, index: u32, sig_index: u32) -> Result<()> {
        Ok(())
    }
    /// End of the function section.
    fn end_function_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the table section.
    fn begin_table_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared table count.
    fn on_table_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One table declaration.
    fn on_table(&mut self, index: u32, limits: &Limits) -> Result<()> {
        Ok(())
    }
    /// End of the table section.
    fn end_table_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the memory section.
    fn begin_memory_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared memory count.
    fn on_memory_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One memory declaration.
    fn on_memory(&mut self, index: u32, limits: &Limits) -> Result<()> {
        Ok(())
    }
    /// End of the memory section.
    fn end_memory_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the global section.
    fn begin_global_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared module-local global count.
    fn on_global_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One global declaration; its initializer follows as init-expr
    /// events, then [`ModuleHandler::end_global`].
    fn begin_global(&mut self, index: u32, ty: ValueType, mutable: bool) -> Result<()> {
        Ok(())
    }
    /// End of one global declaration.
    fn end_global(&mut self, index: u32) -> Result<()> {
        Ok(())
    }
    /// End of the global section.
    fn end_global_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the export section.
    fn begin_export_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared export count.
    fn on_export_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One export.
    fn on_export(
        &mut self,
        index: u32,
        kind: ExternalKind,
        item_index: u32,
        name: &str,
    ) -> Result<()> {
        Ok(())
    }
    /// End of the export section.
    fn end_export_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// The start section's function index.
    fn on_start_function(&mut self, func_index: u32) -> Result<()> {
        Ok(())
    }

    /// Start of the element section.
    fn begin_element_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared element segment count.
    fn on_element_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One element segment; its offset follows as init-expr events.
    fn begin_element_segment(&mut self, index: u32, table_index: u32) -> Result<()> {
        Ok(())
    }
    /// Number of function indices in one element segment.
    fn on_element_function_count(&mut self, index: u32, count: u32) -> Result<()> {
        Ok(())
    }
    /// One function index inside an element segment.
    fn on_element_function(&mut self, segment_index: u32, func_index: u32) -> Result<()> {
        Ok(())
    }
    /// End of one element segment.
    fn end_element_segment(&mut self, index: u32) -> Result<()> {
        Ok(())
    }
    /// End of the element section.
    fn end_element_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the code section.
    fn begin_code_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared function body count (equals the function section count).
    fn on_function_body_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// Start of one function body; `index` counts module-local
    /// functions from zero.
    fn begin_function_body(&mut self, index: u32) -> Result<()> {
        Ok(())
    }
    /// Number of count-compressed local groups.
    fn on_local_decl_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One local group: `count` locals of type `ty`.
    fn on_local_decl(&mut self, decl_index: u32, count: u32, ty: ValueType) -> Result<()> {
        Ok(())
    }
    /// End of one function body.
    fn end_function_body(&mut self, index: u32) -> Result<()> {
        Ok(())
    }
    /// End of the code section.
    fn end_code_section(&mut self) -> Result<()> {
        Ok(())
    }

    /// Start of the data section.
    fn begin_data_section(&mut self, size: u32) -> Result<()> {
        Ok(())
    }
    /// Declared data segment count.
    fn on_data_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One data segment; its offset follows as init-expr events.
    fn begin_data_segment(&mut self, index: u32, memory_index: u32) -> Result<()> {
        Ok(())
    }
    /// The payload of one data segment.
    fn on_data_segment_data(&mut self, index: u32, data: &[u8]) -> Result<()> {
        Ok(())
    }
    /// End of one data segment.
    fn end_data_segment(&mut self, index: u32) -> Result<()> {
        Ok(())
    }
    /// End of the data section.
    fn end_data_section(&mut self) -> Result<()> {
        Ok(())
    }

    // Init expressions (globals, element offsets, data offsets). The
    // `index` is the declaring item's index within its section.

    /// `i32.const` initializer.
    fn on_init_expr_i32_const(&mut self, index: u32, value: i32) -> Result<()> {
        Ok(())
    }
    /// `i64.const` initializer.
    fn on_init_expr_i64_const(&mut self, index: u32, value: i64) -> Result<()> {
        Ok(())
    }
    /// `f32.const` initializer, raw bits.
    fn on_init_expr_f32_const(&mut self, index: u32, bits: u32) -> Result<()> {
        Ok(())
    }
    /// `f64.const` initializer, raw bits.
    fn on_init_expr_f64_const(&mut self, index: u32, bits: u64) -> Result<()> {
        Ok(())
    }
    /// `get_global` initializer referring to an imported global.
    fn on_init_expr_get_global(&mut self, index: u32, global_index: u32) -> Result<()> {
        Ok(())
    }

    // Debug-names custom section.

    /// Number of named functions.
    fn on_function_names_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One function name.
    fn on_function_name(&mut self, index: u32, name: &str) -> Result<()> {
        Ok(())
    }
    /// Number of named locals of one function.
    fn on_local_names_count(&mut self, func_index: u32, count: u32) -> Result<()> {
        Ok(())
    }
    /// One local name.
    fn on_local_name(&mut self, func_index: u32, local_index: u32, name: &str) -> Result<()> {
        Ok(())
    }

    // Relocation custom sections.

    /// Start of a `reloc.*` custom section targeting `section_id`
    /// (with the target custom section's name when `section_id` is 0).
    fn begin_reloc_section(&mut self, section_id: u8, name: Option<&str>) -> Result<()> {
        Ok(())
    }
    /// Declared relocation count.
    fn on_reloc_count(&mut self, count: u32) -> Result<()> {
        Ok(())
    }
    /// One relocation record.
    fn on_reloc(&mut self, entry: RelocEntry) -> Result<()> {
        Ok(())
    }
    /// End of a `reloc.*` custom section.
    fn end_reloc_section(&mut self) -> Result<()> {
        Ok(())
    }

    // Instructions, one event per shape.

    /// `unreachable`.
    fn on_unreachable_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `nop`.
    fn on_nop_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `block` with its signature.
    fn on_block_expr(&mut self, block_type: BlockType) -> Result<()> {
        Ok(())
    }
    /// `loop` with its signature.
    fn on_loop_expr(&mut self, block_type: BlockType) -> Result<()> {
        Ok(())
    }
    /// `if` with its signature.
    fn on_if_expr(&mut self, block_type: BlockType) -> Result<()> {
        Ok(())
    }
    /// `else`.
    fn on_else_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `end` (block, loop, if, or function body).
    fn on_end_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `br` to a label depth.
    fn on_br_expr(&mut self, depth: u32) -> Result<()> {
        Ok(())
    }
    /// `br_if` to a label depth.
    fn on_br_if_expr(&mut self, depth: u32) -> Result<()> {
        Ok(())
    }
    /// `br_table` with its target depths and default depth.
    fn on_br_table_expr(&mut self, targets: &[u32], default: u32) -> Result<()> {
        Ok(())
    }
    /// `return`.
    fn on_return_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `call` of a function index.
    fn on_call_expr(&mut self, func_index: u32) -> Result<()> {
        Ok(())
    }
    /// `call_indirect` of a signature index.
    fn on_call_indirect_expr(&mut self, sig_index: u32) -> Result<()> {
        Ok(())
    }
    /// `drop`.
    fn on_drop_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `select`.
    fn on_select_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `get_local`.
    fn on_get_local_expr(&mut self, local_index: u32) -> Result<()> {
        Ok(())
    }
    /// `set_local`.
    fn on_set_local_expr(&mut self, local_index: u32) -> Result<()> {
        Ok(())
    }
    /// `tee_local`.
    fn on_tee_local_expr(&mut self, local_index: u32) -> Result<()> {
        Ok(())
    }
    /// `get_global`.
    fn on_get_global_expr(&mut self, global_index: u32) -> Result<()> {
        Ok(())
    }
    /// `set_global`.
    fn on_set_global_expr(&mut self, global_index: u32) -> Result<()> {
        Ok(())
    }
    /// `i32.const`.
    fn on_i32_const_expr(&mut self, value: i32) -> Result<()> {
        Ok(())
    }
    /// `i64.const`.
    fn on_i64_const_expr(&mut self, value: i64) -> Result<()> {
        Ok(())
    }
    /// `f32.const`, raw bits.
    fn on_f32_const_expr(&mut self, bits: u32) -> Result<()> {
        Ok(())
    }
    /// `f64.const`, raw bits.
    fn on_f64_const_expr(&mut self, bits: u64) -> Result<()> {
        Ok(())
    }
    /// A load with its alignment and offset immediates.
    fn on_load_expr(
        &mut self,
        opcode: &'static OpcodeInfo,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        Ok(())
    }
    /// A store with its alignment and offset immediates.
    fn on_store_expr(
        &mut self,
        opcode: &'static OpcodeInfo,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        Ok(())
    }
    /// `current_memory`.
    fn on_current_memory_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// `grow_memory`.
    fn on_grow_memory_expr(&mut self) -> Result<()> {
        Ok(())
    }
    /// A one-operand numeric instruction.
    fn on_unary_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        Ok(())
    }
    /// A two-operand numeric instruction.
    fn on_binary_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        Ok(())
    }
    /// A comparison.
    fn on_compare_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        Ok(())
    }
    /// A conversion (or `eqz`, or a reinterpret).
    fn on_convert_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        Ok(())
    }
}

/// A handler that accepts every event and records nothing.
///
/// Running the reader with this handler checks well-formedness only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopHandler;

impl ModuleHandler for NopHandler {}
