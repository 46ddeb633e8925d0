//! The validating compiler: a reader handler that type-checks each
//! function body and lowers it to the istream.
//!
//! Per body, the compiler keeps a symbolic type stack (operand values
//! only; params and locals are accounted separately) and a stack of
//! control labels. Forward branches record fixups on their target
//! label; forward calls record fixups keyed by callee index. Closing a
//! label (or reaching a callee's body) patches every recorded offset,
//! so no fixup list survives its target (nothing dangles on success).

use std::collections::HashSet;

use log::debug;

use wbt_decoder::{read_module, ModuleHandler, ReaderOptions};
use wbt_error::{codes, Error, Result};
use wbt_format::module::{Export, InitExpr};
use wbt_format::opcode::OpcodeInfo;
use wbt_format::types::{BlockType, FuncSignature, Limits, ValueType};
use wbt_format::ExternalKind;

use crate::istream::{op, IstreamWriter, BR_TABLE_ENTRY_SIZE};
use crate::module::{
    CompiledDataSegment, CompiledElementSegment, CompiledFunc, CompiledFuncImport, CompiledGlobal,
    CompiledGlobalImport, CompiledMemory, CompiledModule, CompiledTable, Value,
};

const NO_FIXUP: u32 = u32::MAX;

/// Validator-internal value type.
///
/// `Any` marks a stack slot made polymorphic by preceding unconditional
/// control flow; it unifies with every type and is never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Any,
    Void,
    I32,
    I64,
    F32,
    F64,
}

impl Ty {
    fn name(self) -> &'static str {
        match self {
            Ty::Any => "any",
            Ty::Void => "void",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::F32 => "f32",
            Ty::F64 => "f64",
        }
    }

    fn from_result(result: Option<ValueType>) -> Self {
        result.map_or(Ty::Void, Ty::from)
    }
}

impl From<ValueType> for Ty {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Ty::I32,
            ValueType::I64 => Ty::I64,
            ValueType::F32 => Ty::F32,
            ValueType::F64 => Ty::F64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

impl LabelKind {
    fn name(self) -> &'static str {
        match self {
            LabelKind::Func => "function",
            LabelKind::Block => "block",
            LabelKind::Loop => "loop",
            LabelKind::If => "if",
            LabelKind::Else => "else arm",
        }
    }
}

/// One control label. Labels form a strict stack tied to lexical
/// `block`/`loop`/`if`/`else`/`end` pairing.
#[derive(Debug)]
struct Label {
    kind: LabelKind,
    /// Declared result type.
    sig: Ty,
    /// Type-stack depth at entry.
    stack_limit: usize,
    /// Branch target for loops (istream position at entry).
    offset: u32,
    /// Pending `br_unless`/`br` operand for if/else, `NO_FIXUP` if none.
    fixup_offset: u32,
    /// Istream offsets of forward branches targeting this label.
    branch_fixups: Vec<u32>,
    /// The remainder of this label is dead code (after `br`, `return`,
    /// or `unreachable`); pops yield `Any` and depth checks are off.
    unreachable: bool,
}

/// The validating interpreter compiler.
///
/// Implements [`ModuleHandler`]; drive it with
/// [`wbt_decoder::read_module`] or use [`compile_module`].
#[derive(Debug, Default)]
pub struct Compiler {
    istream: IstreamWriter,

    signatures: Vec<FuncSignature>,
    func_imports: Vec<CompiledFuncImport>,
    global_imports: Vec<CompiledGlobalImport>,
    func_sig_indices: Vec<u32>,
    func_offsets: Vec<Option<u32>>,
    call_fixups: Vec<Vec<u32>>,
    globals: Vec<CompiledGlobal>,
    table_limits: Option<Limits>,
    memory_limits: Option<Limits>,
    elements: Vec<CompiledElementSegment>,
    data_segments: Vec<CompiledDataSegment>,
    exports: Vec<Export>,
    export_names: HashSet<(ExternalKind, String)>,
    start: Option<u32>,

    pending_init: Option<InitExpr>,
    current_global: Option<(ValueType, bool)>,
    current_elem_funcs: Vec<u32>,
    current_data: Vec<u8>,

    local_types: Vec<ValueType>,
    num_params: usize,
    pending_local_decls: u32,
    type_stack: Vec<Ty>,
    labels: Vec<Label>,
}

/// Read, validate, and lower a module in one pass.
///
/// On success the caller receives the compiled image, istream included.
/// On failure the first diagnostic is returned and no partial istream
/// escapes.
pub fn compile_module(data: &[u8]) -> Result<CompiledModule> {
    let mut compiler = Compiler::new();
    read_module(data, &ReaderOptions::default(), &mut compiler)?;
    Ok(compiler.finish())
}

impl Compiler {
    /// Create an empty compiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the compiler, yielding the compiled module.
    ///
    /// Only meaningful after a successful [`read_module`] run.
    pub fn finish(self) -> CompiledModule {
        let istream = self.istream.into_bytes();
        debug!(
            "compiled {} function(s), istream is {} byte(s)",
            self.func_offsets.len(),
            istream.len()
        );
        CompiledModule {
            signatures: self.signatures,
            functions: self
                .func_sig_indices
                .iter()
                .zip(&self.func_offsets)
                .map(|(&sig_index, offset)| CompiledFunc {
                    sig_index,
                    istream_offset: offset.unwrap_or(0),
                })
                .collect(),
            func_imports: self.func_imports,
            global_imports: self.global_imports,
            globals: self.globals,
            table: self.table_limits.map(|limits| CompiledTable {
                limits,
                elements: self.elements,
            }),
            memory: self.memory_limits.map(|limits| CompiledMemory {
                limits,
                data_segments: self.data_segments,
            }),
            exports: self.exports,
            start: self.start,
            istream,
        }
    }

    // -- type stack ------------------------------------------------------

    fn local_depth(&self) -> u32 {
        self.local_types.len() as u32
    }

    fn top_label(&self, context: &str) -> Result<&Label> {
        self.labels.last().ok_or_else(|| {
            Error::validation_error(
                codes::EXPR_AFTER_END,
                format!("{context} after end of function"),
            )
        })
    }

    fn check_type(&self, expected: Ty, actual: Ty, context: &str) -> Result<()> {
        if expected == Ty::Any || actual == Ty::Any || expected == actual {
            return Ok(());
        }
        Err(Error::validation_error(
            codes::TYPE_MISMATCH,
            format!(
                "type mismatch in {context}: expected {}, got {}",
                expected.name(),
                actual.name()
            ),
        ))
    }

    fn push_ty(&mut self, ty: Ty) {
        if ty != Ty::Void {
            self.type_stack.push(ty);
        }
    }

    fn push_result(&mut self, result: Option<ValueType>) {
        self.push_ty(Ty::from_result(result));
    }

    fn pop_any(&mut self, context: &str) -> Result<Ty> {
        let label = self.top_label(context)?;
        let (limit, unreachable) = (label.stack_limit, label.unreachable);
        if self.type_stack.len() <= limit {
            if unreachable {
                return Ok(Ty::Any);
            }
            return Err(Error::validation_error(
                codes::TYPE_STACK_UNDERFLOW,
                format!("type stack underflow in {context}"),
            ));
        }
        Ok(self.type_stack.pop().unwrap_or(Ty::Any))
    }

    fn pop_expect(&mut self, expected: Ty, context: &str) -> Result<()> {
        let actual = self.pop_any(context)?;
        self.check_type(expected, actual, context)
    }

    // Checks the top of the stack without consuming it; branches leave
    // the transferred value in place.
    fn peek_expect(&self, expected: Ty, context: &str) -> Result<()> {
        if expected == Ty::Void {
            return Ok(());
        }
        let label = self.top_label(context)?;
        if self.type_stack.len() <= label.stack_limit {
            if label.unreachable {
                return Ok(());
            }
            return Err(Error::validation_error(
                codes::TYPE_STACK_UNDERFLOW,
                format!("type stack underflow in {context}"),
            ));
        }
        if let Some(&actual) = self.type_stack.last() {
            self.check_type(expected, actual, context)?;
        }
        Ok(())
    }

    fn mark_unreachable(&mut self) {
        if let Some(label) = self.labels.last_mut() {
            self.type_stack.truncate(label.stack_limit);
            label.unreachable = true;
        }
    }

    // -- labels ----------------------------------------------------------

    fn push_label(&mut self, kind: LabelKind, sig: Ty, offset: u32, fixup_offset: u32) {
        self.labels.push(Label {
            kind,
            sig,
            stack_limit: self.type_stack.len(),
            offset,
            fixup_offset,
            branch_fixups: Vec::new(),
            unreachable: false,
        });
    }

    fn label_index_from_depth(&self, depth: u32, context: &str) -> Result<usize> {
        let len = self.top_label(context).map(|_| self.labels.len())?;
        if depth as usize >= len {
            return Err(Error::validation_error(
                codes::INVALID_BRANCH_DEPTH,
                format!("invalid depth {depth} in {context} (max {})", len - 1),
            ));
        }
        Ok(len - 1 - depth as usize)
    }

    // Checks that the stack at the end of a label (or at an `else`
    // boundary) matches its declared result: exact depth, exact type.
    fn check_label_result(&self, index: usize) -> Result<()> {
        let label = &self.labels[index];
        if label.unreachable {
            return Ok(());
        }
        let arity = usize::from(label.sig != Ty::Void);
        let actual = self.type_stack.len();
        if actual != label.stack_limit + arity {
            return Err(Error::validation_error(
                codes::TYPE_MISMATCH,
                format!(
                    "type stack at end of {} has {} value(s), expected {arity}",
                    label.kind.name(),
                    actual - label.stack_limit
                ),
            ));
        }
        if arity == 1 {
            let context = format!("{} result", label.kind.name());
            self.check_type(label.sig, self.type_stack[actual - 1], &context)?;
        }
        Ok(())
    }

    // -- branch lowering -------------------------------------------------

    // Branches to a loop label re-enter the loop and carry no value;
    // branches to any other label produce the label's declared result.
    fn branch_result_type(&self, index: usize) -> Ty {
        let label = &self.labels[index];
        if label.kind == LabelKind::Loop {
            Ty::Void
        } else {
            label.sig
        }
    }

    fn check_branch_value(&self, index: usize, context: &str) -> Result<()> {
        self.peek_expect(self.branch_result_type(index), context)
    }

    fn branch_drop_keep(&self, index: usize) -> (u32, u8) {
        let label = &self.labels[index];
        let arity = u32::from(self.branch_result_type(index) != Ty::Void);
        let avail = (self.type_stack.len() - label.stack_limit) as u32;
        let mut drop = avail.saturating_sub(arity);
        if label.kind == LabelKind::Func {
            drop += self.local_depth();
        }
        (drop, arity as u8)
    }

    fn emit_drop_keep(&mut self, drop: u32, keep: u8) {
        if drop > 0 || keep > 0 {
            self.istream.emit_opcode(op::DROP_KEEP);
            self.istream.emit_u32(drop);
            self.istream.emit_u8(keep);
        }
    }

    // Emits the target operand of a branch: loops are backward (target
    // known), everything else records a fixup resolved when the label
    // closes.
    fn emit_branch_target(&mut self, index: usize) {
        if self.labels[index].kind == LabelKind::Loop {
            let offset = self.labels[index].offset;
            self.istream.emit_u32(offset);
        } else {
            let pos = self.istream.pos();
            self.labels[index].branch_fixups.push(pos);
            self.istream.emit_u32(0);
        }
    }

    // Emits drop_keep plus the transfer for one branch. A branch to the
    // function label is a return.
    fn emit_branch(&mut self, index: usize) {
        let (drop, keep) = self.branch_drop_keep(index);
        self.emit_drop_keep(drop, keep);
        if self.labels[index].kind == LabelKind::Func {
            self.istream.emit_opcode(op::RETURN);
        } else {
            self.istream.emit_opcode(op::BR);
            self.emit_branch_target(index);
        }
    }

    // -- module-level helpers --------------------------------------------

    fn signature(&self, sig_index: u32) -> Result<&FuncSignature> {
        self.signatures.get(sig_index as usize).ok_or_else(|| {
            Error::schema_error(
                codes::INDEX_OUT_OF_RANGE,
                format!("signature index {sig_index} out of range"),
            )
        })
    }

    fn func_signature(&self, func_index: u32) -> Result<&FuncSignature> {
        let imports = self.func_imports.len() as u32;
        let sig_index = if func_index < imports {
            self.func_imports[func_index as usize].sig_index
        } else {
            self.func_sig_indices
                .get((func_index - imports) as usize)
                .copied()
                .ok_or_else(|| {
                    Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("function index {func_index} out of range"),
                    )
                })?
        };
        self.signature(sig_index)
    }

    fn global_info(&self, index: u32) -> Result<(ValueType, bool)> {
        let imports = self.global_imports.len() as u32;
        if index < imports {
            let import = &self.global_imports[index as usize];
            return Ok((import.ty, import.mutable));
        }
        self.globals
            .get((index - imports) as usize)
            .map(|global| (global.ty, global.mutable))
            .ok_or_else(|| {
                Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("global index {index} out of range"),
                )
            })
    }

    fn local_type(&self, index: u32) -> Result<ValueType> {
        self.local_types.get(index as usize).copied().ok_or_else(|| {
            Error::validation_error(
                codes::INVALID_LOCAL_INDEX,
                format!(
                    "local index {index} out of range (function has {})",
                    self.local_types.len()
                ),
            )
        })
    }

    // Top-relative operand stack slot of a wasm local. Params and
    // declared locals sit below the operand region at runtime.
    fn translate_local_index(&self, index: u32) -> u32 {
        self.local_depth() + self.type_stack.len() as u32 - index
    }

    fn check_has_memory(&self, what: &str) -> Result<()> {
        if self.memory_limits.is_none() {
            return Err(Error::validation_error(
                codes::NO_MEMORY,
                format!("{what} requires a memory"),
            ));
        }
        Ok(())
    }

    fn take_init_expr(&mut self, what: &str) -> Result<InitExpr> {
        self.pending_init.take().ok_or_else(|| {
            Error::schema_error(
                codes::INVALID_INIT_EXPR,
                format!("{what} is missing its initializer expression"),
            )
        })
    }

    // Constant expressions are evaluated immediately; imported globals
    // contribute the zero value of their declared type.
    fn eval_init_expr(&self, expr: InitExpr) -> Result<Value> {
        Ok(match expr {
            InitExpr::I32Const(value) => Value::I32(value),
            InitExpr::I64Const(value) => Value::I64(value),
            InitExpr::F32Const(bits) => Value::F32(bits),
            InitExpr::F64Const(bits) => Value::F64(bits),
            InitExpr::GetGlobal(index) => {
                let import = self.global_imports.get(index as usize).ok_or_else(|| {
                    Error::schema_error(
                        codes::INDEX_OUT_OF_RANGE,
                        format!("init expression global index {index} out of range"),
                    )
                })?;
                Value::zero(import.ty)
            }
        })
    }

    fn eval_init_as_i32(&mut self, what: &str) -> Result<u32> {
        let expr = self.take_init_expr(what)?;
        match self.eval_init_expr(expr)? {
            Value::I32(value) => Ok(value as u32),
            other => Err(Error::validation_error(
                codes::INIT_EXPR_TYPE_MISMATCH,
                format!("{what} offset must be i32, got {}", other.ty()),
            )),
        }
    }

    fn compile_simple(&mut self, info: &'static OpcodeInfo) -> Result<()> {
        if let Some(arg2) = info.arg2 {
            self.pop_expect(Ty::from(arg2), info.name)?;
        }
        if let Some(arg1) = info.arg1 {
            self.pop_expect(Ty::from(arg1), info.name)?;
        }
        self.push_result(info.result);
        self.istream.emit_opcode(info.code);
        Ok(())
    }
}

impl ModuleHandler for Compiler {
    fn on_signature(&mut self, _index: u32, sig: &FuncSignature) -> Result<()> {
        self.signatures.push(sig.clone());
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
        self.func_imports.push(CompiledFuncImport {
            module: module.to_string(),
            field: field.to_string(),
            sig_index,
        });
        Ok(())
    }

    fn on_import_table(
        &mut self,
        _import_index: u32,
        _module: &str,
        _field: &str,
        limits: &Limits,
    ) -> Result<()> {
        self.table_limits = Some(*limits);
        Ok(())
    }

    fn on_import_memory(
        &mut self,
        _import_index: u32,
        _module: &str,
        _field: &str,
        limits: &Limits,
    ) -> Result<()> {
        self.memory_limits = Some(*limits);
        Ok(())
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
        self.global_imports.push(CompiledGlobalImport {
            module: module.to_string(),
            field: field.to_string(),
            ty,
            mutable,
        });
        Ok(())
    }

    fn on_function_count(&mut self, count: u32) -> Result<()> {
        self.func_sig_indices.reserve(count as usize);
        self.func_offsets = vec![None; count as usize];
        self.call_fixups = vec![Vec::new(); count as usize];
        Ok(())
    }

    fn on_function(&mut self, _index: u32, sig_index: u32) -> Result<()> {
        self.func_sig_indices.push(sig_index);
        Ok(())
    }

    fn on_table(&mut self, _index: u32, limits: &Limits) -> Result<()> {
        self.table_limits = Some(*limits);
        Ok(())
    }

    fn on_memory(&mut self, _index: u32, limits: &Limits) -> Result<()> {
        self.memory_limits = Some(*limits);
        Ok(())
    }

    fn begin_global(&mut self, _index: u32, ty: ValueType, mutable: bool) -> Result<()> {
        self.current_global = Some((ty, mutable));
        self.pending_init = None;
        Ok(())
    }

    fn end_global(&mut self, index: u32) -> Result<()> {
        let (ty, mutable) = self.current_global.take().ok_or_else(|| {
            Error::schema_error(codes::INVALID_INIT_EXPR, "global declaration out of order")
        })?;
        let expr = self.take_init_expr("global")?;
        let value = self.eval_init_expr(expr)?;
        if value.ty() != ty {
            return Err(Error::validation_error(
                codes::INIT_EXPR_TYPE_MISMATCH,
                format!(
                    "global {index} initializer type {} does not match declared type {ty}",
                    value.ty()
                ),
            ));
        }
        self.globals.push(CompiledGlobal { ty, mutable, value });
        Ok(())
    }

    fn on_export(
        &mut self,
        _index: u32,
        kind: ExternalKind,
        item_index: u32,
        name: &str,
    ) -> Result<()> {
        if !self.export_names.insert((kind, name.to_string())) {
            return Err(Error::validation_error(
                codes::DUPLICATE_EXPORT,
                format!("duplicate {} export name: {name}", kind.name()),
            ));
        }
        self.exports.push(Export {
            name: name.to_string(),
            kind,
            index: item_index,
        });
        Ok(())
    }

    fn on_start_function(&mut self, func_index: u32) -> Result<()> {
        let sig = self.func_signature(func_index)?;
        if !sig.params.is_empty() || sig.result.is_some() {
            return Err(Error::validation_error(
                codes::BAD_START_SIGNATURE,
                format!("start function must have signature () -> (), got {sig}"),
            ));
        }
        self.start = Some(func_index);
        Ok(())
    }

    fn begin_element_segment(&mut self, _index: u32, _table_index: u32) -> Result<()> {
        self.pending_init = None;
        self.current_elem_funcs.clear();
        Ok(())
    }

    fn on_element_function(&mut self, _segment_index: u32, func_index: u32) -> Result<()> {
        self.current_elem_funcs.push(func_index);
        Ok(())
    }

    fn end_element_segment(&mut self, _index: u32) -> Result<()> {
        let offset = self.eval_init_as_i32("element segment")?;
        self.elements.push(CompiledElementSegment {
            offset,
            func_indices: std::mem::take(&mut self.current_elem_funcs),
        });
        Ok(())
    }

    fn begin_data_segment(&mut self, _index: u32, _memory_index: u32) -> Result<()> {
        self.pending_init = None;
        self.current_data.clear();
        Ok(())
    }

    fn on_data_segment_data(&mut self, _index: u32, data: &[u8]) -> Result<()> {
        self.current_data = data.to_vec();
        Ok(())
    }

    fn end_data_segment(&mut self, _index: u32) -> Result<()> {
        let offset = self.eval_init_as_i32("data segment")?;
        self.data_segments.push(CompiledDataSegment {
            offset,
            data: std::mem::take(&mut self.current_data),
        });
        Ok(())
    }

    fn on_init_expr_i32_const(&mut self, _index: u32, value: i32) -> Result<()> {
        self.pending_init = Some(InitExpr::I32Const(value));
        Ok(())
    }

    fn on_init_expr_i64_const(&mut self, _index: u32, value: i64) -> Result<()> {
        self.pending_init = Some(InitExpr::I64Const(value));
        Ok(())
    }

    fn on_init_expr_f32_const(&mut self, _index: u32, bits: u32) -> Result<()> {
        self.pending_init = Some(InitExpr::F32Const(bits));
        Ok(())
    }

    fn on_init_expr_f64_const(&mut self, _index: u32, bits: u64) -> Result<()> {
        self.pending_init = Some(InitExpr::F64Const(bits));
        Ok(())
    }

    fn on_init_expr_get_global(&mut self, _index: u32, global_index: u32) -> Result<()> {
        self.pending_init = Some(InitExpr::GetGlobal(global_index));
        Ok(())
    }

    // -- function bodies -------------------------------------------------

    fn begin_function_body(&mut self, index: u32) -> Result<()> {
        let sig_index = self
            .func_sig_indices
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                Error::schema_error(
                    codes::INDEX_OUT_OF_RANGE,
                    format!("function body {index} has no declared signature"),
                )
            })?;
        let sig = self.signature(sig_index)?.clone();

        // The callee's istream offset is now known: resolve every call
        // site that referenced this function before its body.
        let offset = self.istream.pos();
        self.func_offsets[index as usize] = Some(offset);
        for fixup in std::mem::take(&mut self.call_fixups[index as usize]) {
            self.istream.patch_u32(fixup, offset)?;
        }

        self.local_types = sig.params.clone();
        self.num_params = sig.params.len();
        self.pending_local_decls = 0;
        self.type_stack.clear();
        self.labels.clear();
        self.push_label(
            LabelKind::Func,
            Ty::from_result(sig.result),
            0,
            NO_FIXUP,
        );
        Ok(())
    }

    fn on_local_decl_count(&mut self, count: u32) -> Result<()> {
        self.pending_local_decls = count;
        Ok(())
    }

    fn on_local_decl(&mut self, decl_index: u32, count: u32, ty: ValueType) -> Result<()> {
        for _ in 0..count {
            self.local_types.push(ty);
        }
        if decl_index + 1 == self.pending_local_decls {
            let num_locals = (self.local_types.len() - self.num_params) as u32;
            if num_locals > 0 {
                self.istream.emit_opcode(op::ALLOCA);
                self.istream.emit_u32(num_locals);
            }
        }
        Ok(())
    }

    fn end_function_body(&mut self, index: u32) -> Result<()> {
        if !self.labels.is_empty() {
            return Err(Error::validation_error(
                codes::UNMATCHED_LABEL,
                format!("function {index} body ended with unclosed labels"),
            ));
        }
        Ok(())
    }

    fn end_module(&mut self) -> Result<()> {
        for (index, offset) in self.func_offsets.iter().enumerate() {
            if offset.is_none() {
                return Err(Error::validation_error(
                    codes::MISSING_FUNCTION_BODY,
                    format!("function {index} has no body"),
                ));
            }
        }
        Ok(())
    }

    // -- instructions ----------------------------------------------------

    fn on_unreachable_expr(&mut self) -> Result<()> {
        self.top_label("unreachable")?;
        self.istream.emit_opcode(op::UNREACHABLE);
        self.mark_unreachable();
        Ok(())
    }

    fn on_nop_expr(&mut self) -> Result<()> {
        self.top_label("nop")?;
        Ok(())
    }

    fn on_block_expr(&mut self, block_type: BlockType) -> Result<()> {
        self.top_label("block")?;
        self.push_label(LabelKind::Block, Ty::from_result(block_type), 0, NO_FIXUP);
        Ok(())
    }

    fn on_loop_expr(&mut self, block_type: BlockType) -> Result<()> {
        self.top_label("loop")?;
        let offset = self.istream.pos();
        self.push_label(LabelKind::Loop, Ty::from_result(block_type), offset, NO_FIXUP);
        Ok(())
    }

    fn on_if_expr(&mut self, block_type: BlockType) -> Result<()> {
        self.pop_expect(Ty::I32, "if condition")?;
        self.istream.emit_opcode(op::BR_UNLESS);
        let fixup = self.istream.pos();
        self.istream.emit_u32(0);
        self.push_label(LabelKind::If, Ty::from_result(block_type), 0, fixup);
        Ok(())
    }

    fn on_else_expr(&mut self) -> Result<()> {
        let top = match self.labels.last() {
            Some(label) if label.kind == LabelKind::If => self.labels.len() - 1,
            Some(_) => {
                return Err(Error::validation_error(
                    codes::UNMATCHED_LABEL,
                    "else without matching if",
                ));
            }
            None => {
                return Err(Error::validation_error(
                    codes::EXPR_AFTER_END,
                    "else after end of function",
                ));
            }
        };
        self.check_label_result(top)?;

        // Jump over the else arm when the then arm ran, and point the
        // if's br_unless here, at the start of the else arm.
        self.istream.emit_opcode(op::BR);
        let end_fixup = self.istream.pos();
        self.istream.emit_u32(0);
        let else_start = self.istream.pos();
        let old_fixup = self.labels[top].fixup_offset;
        self.istream.patch_u32(old_fixup, else_start)?;

        let limit = self.labels[top].stack_limit;
        self.type_stack.truncate(limit);
        let label = &mut self.labels[top];
        label.kind = LabelKind::Else;
        label.fixup_offset = end_fixup;
        label.unreachable = false;
        Ok(())
    }

    fn on_end_expr(&mut self) -> Result<()> {
        let top = match self.labels.len() {
            0 => {
                return Err(Error::validation_error(
                    codes::UNMATCHED_LABEL,
                    "unexpected end opcode",
                ));
            }
            len => len - 1,
        };
        if self.labels[top].kind == LabelKind::If && self.labels[top].sig != Ty::Void {
            return Err(Error::validation_error(
                codes::IF_WITHOUT_ELSE,
                format!(
                    "if with result type {} requires an else arm",
                    self.labels[top].sig.name()
                ),
            ));
        }
        self.check_label_result(top)?;

        let label = match self.labels.pop() {
            Some(label) => label,
            None => unreachable!("label presence checked above"),
        };

        if label.kind == LabelKind::Func {
            // Function epilogue: drop params, locals, and spent operand
            // slots, keep the result, return. Branches that targeted
            // the function label land on the return opcode, after their
            // own drop_keep.
            let arity = u32::from(label.sig != Ty::Void);
            let avail = (self.type_stack.len() - label.stack_limit) as u32;
            let drop = (self.local_depth() + avail).saturating_sub(arity);
            self.emit_drop_keep(drop, arity as u8);
            let return_pos = self.istream.pos();
            for fixup in &label.branch_fixups {
                self.istream.patch_u32(*fixup, return_pos)?;
            }
            self.istream.emit_opcode(op::RETURN);
        } else {
            let end_pos = self.istream.pos();
            if label.fixup_offset != NO_FIXUP {
                self.istream.patch_u32(label.fixup_offset, end_pos)?;
            }
            for fixup in &label.branch_fixups {
                self.istream.patch_u32(*fixup, end_pos)?;
            }
        }

        self.type_stack.truncate(label.stack_limit);
        self.push_ty(label.sig);
        Ok(())
    }

    fn on_br_expr(&mut self, depth: u32) -> Result<()> {
        let index = self.label_index_from_depth(depth, "br")?;
        self.check_branch_value(index, "br value")?;
        self.emit_branch(index);
        self.mark_unreachable();
        Ok(())
    }

    fn on_br_if_expr(&mut self, depth: u32) -> Result<()> {
        self.pop_expect(Ty::I32, "br_if condition")?;
        let index = self.label_index_from_depth(depth, "br_if")?;
        self.check_branch_value(index, "br_if value")?;

        // The drop_keep must only run when the branch is taken, so the
        // whole transfer is guarded by a br_unless over it.
        self.istream.emit_opcode(op::BR_UNLESS);
        let skip_fixup = self.istream.pos();
        self.istream.emit_u32(0);
        self.emit_branch(index);
        let after = self.istream.pos();
        self.istream.patch_u32(skip_fixup, after)?;
        Ok(())
    }

    fn on_br_table_expr(&mut self, targets: &[u32], default: u32) -> Result<()> {
        self.pop_expect(Ty::I32, "br_table index")?;
        let num_targets = targets.len() as u32;
        self.istream.emit_opcode(op::BR_TABLE);
        self.istream.emit_u32(num_targets);
        // The jump table follows immediately: right after this offset
        // operand, a data opcode and its byte length.
        let table_offset = self.istream.pos() + 4 + 1 + 4;
        self.istream.emit_u32(table_offset);
        self.istream.emit_opcode(op::DATA);
        self.istream
            .emit_u32((num_targets + 1) * BR_TABLE_ENTRY_SIZE);

        for &depth in targets.iter().chain(std::iter::once(&default)) {
            let index = self.label_index_from_depth(depth, "br_table")?;
            self.check_branch_value(index, "br_table value")?;
            let (drop, keep) = self.branch_drop_keep(index);
            self.emit_branch_target(index);
            self.istream.emit_u32(drop);
            self.istream.emit_u8(keep);
        }
        self.mark_unreachable();
        Ok(())
    }

    fn on_return_expr(&mut self) -> Result<()> {
        self.top_label("return")?;
        self.check_branch_value(0, "return value")?;
        let (drop, keep) = self.branch_drop_keep(0);
        self.emit_drop_keep(drop, keep);
        self.istream.emit_opcode(op::RETURN);
        self.mark_unreachable();
        Ok(())
    }

    fn on_call_expr(&mut self, func_index: u32) -> Result<()> {
        self.top_label("call")?;
        let sig = self.func_signature(func_index)?.clone();
        for param in sig.params.iter().rev() {
            self.pop_expect(Ty::from(*param), "call argument")?;
        }
        let imports = self.func_imports.len() as u32;
        if func_index < imports {
            self.istream.emit_opcode(op::CALL_HOST);
            self.istream.emit_u32(func_index);
        } else {
            self.istream.emit_opcode(op::CALL);
            let local = (func_index - imports) as usize;
            match self.func_offsets[local] {
                Some(offset) => self.istream.emit_u32(offset),
                None => {
                    // Forward call: patched when the callee's body is
                    // reached.
                    let pos = self.istream.pos();
                    self.call_fixups[local].push(pos);
                    self.istream.emit_u32(0);
                }
            }
        }
        self.push_result(sig.result);
        Ok(())
    }

    fn on_call_indirect_expr(&mut self, sig_index: u32) -> Result<()> {
        self.top_label("call_indirect")?;
        if self.table_limits.is_none() {
            return Err(Error::validation_error(
                codes::NO_TABLE,
                "call_indirect requires a table",
            ));
        }
        let sig = self.signature(sig_index)?.clone();
        self.pop_expect(Ty::I32, "call_indirect index")?;
        for param in sig.params.iter().rev() {
            self.pop_expect(Ty::from(*param), "call_indirect argument")?;
        }
        self.istream.emit_opcode(op::CALL_INDIRECT);
        self.istream.emit_u32(sig_index);
        self.push_result(sig.result);
        Ok(())
    }

    fn on_drop_expr(&mut self) -> Result<()> {
        self.pop_any("drop")?;
        self.istream.emit_opcode(op::DROP);
        Ok(())
    }

    fn on_select_expr(&mut self) -> Result<()> {
        self.pop_expect(Ty::I32, "select condition")?;
        let first = self.pop_any("select")?;
        let second = self.pop_any("select")?;
        let unified = match (first, second) {
            (Ty::Any, other) | (other, Ty::Any) => other,
            (a, b) if a == b => a,
            (a, b) => {
                return Err(Error::validation_error(
                    codes::TYPE_MISMATCH,
                    format!(
                        "select operand types differ: {} and {}",
                        b.name(),
                        a.name()
                    ),
                ));
            }
        };
        self.push_ty(unified);
        self.istream.emit_opcode(op::SELECT);
        Ok(())
    }

    fn on_get_local_expr(&mut self, local_index: u32) -> Result<()> {
        self.top_label("get_local")?;
        let ty = self.local_type(local_index)?;
        let translated = self.translate_local_index(local_index);
        self.istream.emit_opcode(op::GET_LOCAL);
        self.istream.emit_u32(translated);
        self.push_ty(Ty::from(ty));
        Ok(())
    }

    fn on_set_local_expr(&mut self, local_index: u32) -> Result<()> {
        let ty = self.local_type(local_index)?;
        // The slot distance counts the value still on the stack.
        let translated = self.translate_local_index(local_index);
        self.pop_expect(Ty::from(ty), "set_local")?;
        self.istream.emit_opcode(op::SET_LOCAL);
        self.istream.emit_u32(translated);
        Ok(())
    }

    fn on_tee_local_expr(&mut self, local_index: u32) -> Result<()> {
        let ty = self.local_type(local_index)?;
        self.peek_expect(Ty::from(ty), "tee_local")?;
        let translated = self.translate_local_index(local_index);
        self.istream.emit_opcode(op::TEE_LOCAL);
        self.istream.emit_u32(translated);
        Ok(())
    }

    fn on_get_global_expr(&mut self, global_index: u32) -> Result<()> {
        self.top_label("get_global")?;
        let (ty, _) = self.global_info(global_index)?;
        self.istream.emit_opcode(op::GET_GLOBAL);
        self.istream.emit_u32(global_index);
        self.push_ty(Ty::from(ty));
        Ok(())
    }

    fn on_set_global_expr(&mut self, global_index: u32) -> Result<()> {
        let (ty, mutable) = self.global_info(global_index)?;
        if !mutable {
            return Err(Error::validation_error(
                codes::IMMUTABLE_GLOBAL,
                format!("global {global_index} is immutable"),
            ));
        }
        self.pop_expect(Ty::from(ty), "set_global")?;
        self.istream.emit_opcode(op::SET_GLOBAL);
        self.istream.emit_u32(global_index);
        Ok(())
    }

    fn on_i32_const_expr(&mut self, value: i32) -> Result<()> {
        self.top_label("i32.const")?;
        self.istream.emit_opcode(op::I32_CONST);
        self.istream.emit_u32(value as u32);
        self.push_ty(Ty::I32);
        Ok(())
    }

    fn on_i64_const_expr(&mut self, value: i64) -> Result<()> {
        self.top_label("i64.const")?;
        self.istream.emit_opcode(op::I64_CONST);
        self.istream.emit_u64(value as u64);
        self.push_ty(Ty::I64);
        Ok(())
    }

    fn on_f32_const_expr(&mut self, bits: u32) -> Result<()> {
        self.top_label("f32.const")?;
        self.istream.emit_opcode(op::F32_CONST);
        self.istream.emit_u32(bits);
        self.push_ty(Ty::F32);
        Ok(())
    }

    fn on_f64_const_expr(&mut self, bits: u64) -> Result<()> {
        self.top_label("f64.const")?;
        self.istream.emit_opcode(op::F64_CONST);
        self.istream.emit_u64(bits);
        self.push_ty(Ty::F64);
        Ok(())
    }

    fn on_load_expr(
        &mut self,
        opcode: &'static OpcodeInfo,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        self.check_has_memory(opcode.name)?;
        if align_log2 > opcode.natural_alignment_log2() {
            return Err(Error::validation_error(
                codes::INVALID_ALIGNMENT,
                format!(
                    "{} alignment must not be larger than natural alignment ({})",
                    opcode.name, opcode.mem_size
                ),
            ));
        }
        self.pop_expect(Ty::I32, opcode.name)?;
        self.push_result(opcode.result);
        self.istream.emit_opcode(opcode.code);
        self.istream.emit_u32(offset);
        Ok(())
    }

    fn on_store_expr(
        &mut self,
        opcode: &'static OpcodeInfo,
        align_log2: u32,
        offset: u32,
    ) -> Result<()> {
        self.check_has_memory(opcode.name)?;
        if align_log2 > opcode.natural_alignment_log2() {
            return Err(Error::validation_error(
                codes::INVALID_ALIGNMENT,
                format!(
                    "{} alignment must not be larger than natural alignment ({})",
                    opcode.name, opcode.mem_size
                ),
            ));
        }
        if let Some(arg2) = opcode.arg2 {
            self.pop_expect(Ty::from(arg2), opcode.name)?;
        }
        self.pop_expect(Ty::I32, opcode.name)?;
        self.istream.emit_opcode(opcode.code);
        self.istream.emit_u32(offset);
        Ok(())
    }

    fn on_current_memory_expr(&mut self) -> Result<()> {
        self.top_label("current_memory")?;
        self.check_has_memory("current_memory")?;
        self.istream.emit_opcode(op::CURRENT_MEMORY);
        self.push_ty(Ty::I32);
        Ok(())
    }

    fn on_grow_memory_expr(&mut self) -> Result<()> {
        self.check_has_memory("grow_memory")?;
        self.pop_expect(Ty::I32, "grow_memory")?;
        self.istream.emit_opcode(op::GROW_MEMORY);
        self.push_ty(Ty::I32);
        Ok(())
    }

    fn on_unary_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        self.compile_simple(opcode)
    }

    fn on_binary_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        self.compile_simple(opcode)
    }

    fn on_compare_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        self.compile_simple(opcode)
    }

    fn on_convert_expr(&mut self, opcode: &'static OpcodeInfo) -> Result<()> {
        self.compile_simple(opcode)
    }
}
