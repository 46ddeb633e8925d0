//! Linker input scanning.
//!
//! A [`LinkerInput`] holds one object module's bytes plus everything
//! the linker needs without decoding expressions: section byte spans,
//! relocation records, imports with their resolution state, exports,
//! segment contents, and debug names. It is filled by [`LinkReader`],
//! a reader handler running with `skip_function_bodies` set.

use std::collections::HashMap;

use wbt_decoder::{read_module, ModuleHandler, ReaderOptions};
use wbt_error::{codes, Error, Result};
use wbt_format::binary;
use wbt_format::module::{Export, RelocEntry};
use wbt_format::types::{FuncSignature, Limits, ValueType};
use wbt_format::ExternalKind;

/// One section's byte span within an input, with attached relocations.
#[derive(Debug, Clone)]
pub struct SectionSpan {
    /// Section id.
    pub id: u8,
    /// Custom section name, when `id` is 0.
    pub name: Option<String>,
    /// Absolute offset of the payload in the input bytes.
    pub payload_offset: usize,
    /// Payload length in bytes.
    pub payload_size: usize,
    /// Relocations targeting this section's payload.
    pub relocations: Vec<RelocEntry>,
}

/// A function import and its link-time resolution state.
#[derive(Debug, Clone)]
pub struct FunctionImport {
    /// Import module name.
    pub module: String,
    /// Import field name; the symbol used for resolution.
    pub field: String,
    /// Signature index within the importing input.
    pub sig_index: u32,
    /// An active import survives resolution and stays in the output's
    /// import table.
    pub active: bool,
    /// Defining `(input, function index)` for resolved imports.
    pub resolved: Option<(usize, u32)>,
    /// Final index for active imports, assigned after resolution.
    pub relocated_index: u32,
}

/// A global import; globals are never resolved away.
#[derive(Debug, Clone)]
pub struct GlobalImport {
    /// Import module name.
    pub module: String,
    /// Import field name.
    pub field: String,
    /// Declared type.
    pub ty: ValueType,
    /// Declared mutability.
    pub mutable: bool,
}

/// One element segment's function indices; merged segments are
/// appended in input order, so input offsets do not survive.
#[derive(Debug, Clone, Default)]
pub struct ElemSegment {
    /// Function indices, in the input's index space.
    pub func_indices: Vec<u32>,
}

/// One data segment with its evaluated offset.
#[derive(Debug, Clone, Default)]
pub struct DataSegment {
    /// Offset within the input's own memory.
    pub offset: u32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// One scanned linker input.
#[derive(Debug, Clone, Default)]
pub struct LinkerInput {
    /// Diagnostic name.
    pub name: String,
    /// The input module bytes; section spans borrow from these by
    /// offset until the emit pass materializes owned copies.
    pub data: Vec<u8>,
    /// Sections in file order.
    pub sections: Vec<SectionSpan>,
    /// Function imports, in declaration order.
    pub func_imports: Vec<FunctionImport>,
    /// Global imports, in declaration order.
    pub global_imports: Vec<GlobalImport>,
    /// Declared signatures.
    pub signatures: Vec<FuncSignature>,
    /// Module-local function count.
    pub num_functions: u32,
    /// Module-local global count.
    pub num_globals: u32,
    /// Exports.
    pub exports: Vec<Export>,
    /// Element segments.
    pub elem_segments: Vec<ElemSegment>,
    /// Data segments.
    pub data_segments: Vec<DataSegment>,
    /// Table limits, if a table is declared.
    pub table_limits: Option<Limits>,
    /// Memory limits (pages), if a memory is declared.
    pub memory_limits: Option<Limits>,
    /// Start function index, if any.
    pub start: Option<u32>,
    /// Debug names keyed by function index in this input's space.
    pub function_names: HashMap<u32, String>,

    /// Base of this input's types in the merged type index space.
    pub type_index_offset: u32,
    /// Offset added to local function indices; may be negative while
    /// unresolved imports compress the space.
    pub function_index_offset: i64,
    /// Offset added to local global indices.
    pub global_index_offset: i64,
    /// Ordinal base of this input's global imports in the output.
    pub global_import_base: u32,
    /// Base of this input's element entries in the merged table.
    pub table_index_offset: u32,
    /// Pages preceding this input's memory in the merged memory.
    pub memory_page_offset: u32,
}

impl LinkerInput {
    /// Scan one object module.
    pub fn read(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let mut reader = LinkReader {
            input: LinkerInput {
                name: name.into(),
                data,
                ..LinkerInput::default()
            },
            init_context: InitContext::None,
            pending_offset: None,
            current_elem: ElemSegment::default(),
            current_data: DataSegment::default(),
            reloc_target: None,
        };
        let options = ReaderOptions {
            read_debug_names: true,
            skip_function_bodies: true,
        };
        let data = std::mem::take(&mut reader.input.data);
        read_module(&data, &options, &mut reader)?;
        reader.input.data = data;
        Ok(reader.input)
    }

    /// Number of function imports.
    pub fn num_func_imports(&self) -> u32 {
        self.func_imports.len() as u32
    }

    /// Number of global imports.
    pub fn num_global_imports(&self) -> u32 {
        self.global_imports.len() as u32
    }

    /// Total element entries contributed to the merged table.
    pub fn num_elem_entries(&self) -> u32 {
        self.elem_segments
            .iter()
            .map(|segment| segment.func_indices.len() as u32)
            .sum()
    }

    /// The span of a known section, if present.
    pub fn known_section(&self, id: u8) -> Option<&SectionSpan> {
        self.sections.iter().find(|span| span.id == id)
    }

    /// The payload bytes of a known section.
    pub fn section_payload(&self, id: u8) -> Option<&[u8]> {
        self.known_section(id)
            .map(|span| &self.data[span.payload_offset..span.payload_offset + span.payload_size])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitContext {
    None,
    Global,
    Element,
    Data,
}

struct LinkReader {
    input: LinkerInput,
    init_context: InitContext,
    pending_offset: Option<u32>,
    current_elem: ElemSegment,
    current_data: DataSegment,
    reloc_target: Option<(u8, Option<String>)>,
}

impl LinkReader {
    fn segment_offset(&mut self, what: &str) -> Result<u32> {
        self.pending_offset.take().ok_or_else(|| {
            Error::link_error(
                codes::UNSUPPORTED_SEGMENT_OFFSET,
                format!("{what} offset is not an i32 constant"),
            )
        })
    }
}

impl ModuleHandler for LinkReader {
    fn begin_section(&mut self, id: u8, size: u32, payload_offset: usize) -> Result<()> {
        self.input.sections.push(SectionSpan {
            id,
            name: None,
            payload_offset,
            payload_size: size as usize,
            relocations: Vec::new(),
        });
        Ok(())
    }

    fn begin_custom_section(&mut self, name: &str, _size: u32, _payload_offset: usize) -> Result<()> {
        if let Some(span) = self.input.sections.last_mut() {
            span.name = Some(name.to_string());
        }
        Ok(())
    }

    fn on_signature(&mut self, _index: u32, sig: &FuncSignature) -> Result<()> {
        self.input.signatures.push(sig.clone());
        Ok(())
    }

    fn on_import_func(
        &mut self,
        _import_index: u32,
        _func_index: u32,
        module: &str,
        field: &str,
        sig_index: u32,
    ) -> Result<()> {
        self.input.func_imports.push(FunctionImport {
            module: module.to_string(),
            field: field.to_string(),
            sig_index,
            active: true,
            resolved: None,
            relocated_index: 0,
        });
        Ok(())
    }

    fn on_import_table(
        &mut self,
        _import_index: u32,
        module: &str,
        field: &str,
        _limits: &Limits,
    ) -> Result<()> {
        Err(Error::link_error(
            codes::UNSUPPORTED_IMPORT,
            format!("cannot link a module importing table {module}.{field}"),
        ))
    }

    fn on_import_memory(
        &mut self,
        _import_index: u32,
        module: &str,
        field: &str,
        _limits: &Limits,
    ) -> Result<()> {
        Err(Error::link_error(
            codes::UNSUPPORTED_IMPORT,
            format!("cannot link a module importing memory {module}.{field}"),
        ))
    }

    fn on_import_global(
        &mut self,
        _import_index: u32,
        _global_index: u32,
        module: &str,
        field: &str,
        ty: ValueType,
        mutable: bool,
    ) -> Result<()> {
        self.input.global_imports.push(GlobalImport {
            module: module.to_string(),
            field: field.to_string(),
            ty,
            mutable,
        });
        Ok(())
    }

    fn on_function_count(&mut self, count: u32) -> Result<()> {
        self.input.num_functions = count;
        Ok(())
    }

    fn on_table(&mut self, _index: u32, limits: &Limits) -> Result<()> {
        self.input.table_limits = Some(*limits);
        Ok(())
    }

    fn on_memory(&mut self, _index: u32, limits: &Limits) -> Result<()> {
        self.input.memory_limits = Some(*limits);
        Ok(())
    }

    fn on_global_count(&mut self, count: u32) -> Result<()> {
        self.input.num_globals = count;
        Ok(())
    }

    fn begin_global(&mut self, _index: u32, _ty: ValueType, _mutable: bool) -> Result<()> {
        // Global payloads are copied whole; initializers are rewritten
        // through relocation records, not re-evaluated.
        self.init_context = InitContext::Global;
        Ok(())
    }

    fn end_global(&mut self, _index: u32) -> Result<()> {
        self.init_context = InitContext::None;
        Ok(())
    }

    fn on_export(
        &mut self,
        _index: u32,
        kind: ExternalKind,
        item_index: u32,
        name: &str,
    ) -> Result<()> {
        self.input.exports.push(Export {
            name: name.to_string(),
            kind,
            index: item_index,
        });
        Ok(())
    }

    fn on_start_function(&mut self, func_index: u32) -> Result<()> {
        self.input.start = Some(func_index);
        Ok(())
    }

    fn begin_element_segment(&mut self, _index: u32, _table_index: u32) -> Result<()> {
        self.init_context = InitContext::Element;
        self.pending_offset = None;
        self.current_elem = ElemSegment::default();
        Ok(())
    }

    fn on_element_function(&mut self, _segment_index: u32, func_index: u32) -> Result<()> {
        self.current_elem.func_indices.push(func_index);
        Ok(())
    }

    fn end_element_segment(&mut self, _index: u32) -> Result<()> {
        // Merged element entries are appended in input order; the
        // original segment offset does not survive.
        self.segment_offset("element segment")?;
        self.init_context = InitContext::None;
        let segment = std::mem::take(&mut self.current_elem);
        self.input.elem_segments.push(segment);
        Ok(())
    }

    fn begin_data_segment(&mut self, _index: u32, _memory_index: u32) -> Result<()> {
        self.init_context = InitContext::Data;
        self.pending_offset = None;
        self.current_data = DataSegment::default();
        Ok(())
    }

    fn on_data_segment_data(&mut self, _index: u32, data: &[u8]) -> Result<()> {
        self.current_data.data = data.to_vec();
        Ok(())
    }

    fn end_data_segment(&mut self, _index: u32) -> Result<()> {
        self.current_data.offset = self.segment_offset("data segment")?;
        self.init_context = InitContext::None;
        let segment = std::mem::take(&mut self.current_data);
        self.input.data_segments.push(segment);
        Ok(())
    }

    fn on_init_expr_i32_const(&mut self, _index: u32, value: i32) -> Result<()> {
        self.pending_offset = Some(value as u32);
        Ok(())
    }

    fn on_init_expr_get_global(&mut self, _index: u32, _global_index: u32) -> Result<()> {
        match self.init_context {
            // Global initializers pass through unevaluated.
            InitContext::Global | InitContext::None => Ok(()),
            InitContext::Element | InitContext::Data => Err(Error::link_error(
                codes::UNSUPPORTED_SEGMENT_OFFSET,
                "cannot merge a segment whose offset is a get_global",
            )),
        }
    }

    fn begin_reloc_section(&mut self, section_id: u8, name: Option<&str>) -> Result<()> {
        self.reloc_target = Some((section_id, name.map(str::to_string)));
        Ok(())
    }

    fn on_reloc(&mut self, entry: RelocEntry) -> Result<()> {
        let (target_id, target_name) = self.reloc_target.clone().ok_or_else(|| {
            Error::link_error(codes::BAD_RELOC_SITE, "relocation outside a reloc section")
        })?;
        let span = self
            .input
            .sections
            .iter_mut()
            .find(|span| {
                span.id == target_id
                    && (target_id != binary::CUSTOM_SECTION_ID || span.name == target_name)
            })
            .ok_or_else(|| {
                Error::link_error(
                    codes::BAD_RELOC_SITE,
                    format!("relocation targets missing section {target_id}"),
                )
            })?;
        span.relocations.push(entry);
        Ok(())
    }

    fn end_reloc_section(&mut self) -> Result<()> {
        self.reloc_target = None;
        Ok(())
    }

    fn on_function_name(&mut self, index: u32, name: &str) -> Result<()> {
        if !name.is_empty() {
            self.input.function_names.insert(index, name.to_string());
        }
        Ok(())
    }
}
