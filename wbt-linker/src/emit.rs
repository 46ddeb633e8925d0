//! The emit pass: re-framing the merged module.
//!
//! Import, export, table, memory, element, start and name sections are
//! recomputed from scratch because their counts and ordering change
//! under merge. Type, function, global and code payloads are carried
//! over in input order with relocations applied; data is re-framed per
//! segment so offsets can shift with the merged memory layout.

use log::debug;

use wbt_error::{codes, Error, Result};
use wbt_format::binary::{
    self, read_leb128_u32, CODE_SECTION_ID, DATA_SECTION_ID, FUNCTION_SECTION_ID,
    GLOBAL_SECTION_ID, TYPE_SECTION_ID,
};
use wbt_format::module::{section_name, InitExpr, RelocEntry, RELOC_SECTION_PREFIX};
use wbt_format::types::{Limits, PAGE_SIZE};
use wbt_format::writer::BinaryWriter;
use wbt_format::ExternalKind;

use crate::input::LinkerInput;
use crate::linker::{relocate_func_index, relocate_global_index, relocate_type_index, LinkOptions};
use crate::reloc::apply_section_relocations;

/// Assemble the combined module from planned inputs.
pub fn write_combined(inputs: &[LinkerInput], options: &LinkOptions) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::canonical();
    writer.write_module_header();

    // Rebased relocation tables for the copied sections, collected as
    // chunks land in their combined payloads.
    let mut reloc_outputs: Vec<(u8, Vec<RelocEntry>)> = Vec::new();

    if let Some((payload, relocs)) = concat_section(inputs, TYPE_SECTION_ID)? {
        writer.write_section(TYPE_SECTION_ID, &payload);
        reloc_outputs.push((TYPE_SECTION_ID, relocs));
    }

    write_import_section(inputs, &mut writer);

    if let Some((payload, relocs)) = concat_section(inputs, FUNCTION_SECTION_ID)? {
        writer.write_section(FUNCTION_SECTION_ID, &payload);
        reloc_outputs.push((FUNCTION_SECTION_ID, relocs));
    }

    write_table_section(inputs, &mut writer);
    write_memory_section(inputs, &mut writer);

    if let Some((payload, relocs)) = concat_section(inputs, GLOBAL_SECTION_ID)? {
        writer.write_section(GLOBAL_SECTION_ID, &payload);
        reloc_outputs.push((GLOBAL_SECTION_ID, relocs));
    }

    write_export_section(inputs, &mut writer)?;
    write_start_section(inputs, &mut writer)?;
    write_element_section(inputs, &mut writer)?;

    if let Some((payload, relocs)) = concat_section(inputs, CODE_SECTION_ID)? {
        writer.write_section(CODE_SECTION_ID, &payload);
        reloc_outputs.push((CODE_SECTION_ID, relocs));
    }

    write_data_section(inputs, &mut writer)?;

    if options.write_debug_names {
        write_name_section(inputs, &mut writer)?;
    }
    if options.relocatable {
        write_reloc_sections(&reloc_outputs, &mut writer);
    }

    debug!("combined module is {} byte(s)", writer.pos());
    Ok(writer.into_bytes())
}

// Concatenate one copied section across inputs: a summed count, then
// each input's payload (its own count stripped) with relocations
// applied. Returns the rebased relocation entries alongside.
fn concat_section(inputs: &[LinkerInput], id: u8) -> Result<Option<(Vec<u8>, Vec<RelocEntry>)>> {
    let mut total_count: u32 = 0;
    let mut chunks: Vec<(usize, Vec<u8>, usize)> = Vec::new(); // input, payload, count_len
    for (index, input) in inputs.iter().enumerate() {
        let Some(span) = input.known_section(id) else {
            continue;
        };
        let payload = apply_section_relocations(inputs, index, span)?;
        let (count, count_len) = read_leb128_u32(&payload, 0)?;
        total_count += count;
        chunks.push((index, payload, count_len));
    }
    if total_count == 0 {
        return Ok(None);
    }

    let mut combined = BinaryWriter::canonical();
    combined.write_u32_leb_canonical(total_count);
    let mut rebased = Vec::new();
    for (index, payload, count_len) in &chunks {
        let chunk_start = combined.pos();
        combined.write_bytes(&payload[*count_len..]);
        let input = &inputs[*index];
        if let Some(span) = input.known_section(id) {
            for entry in &span.relocations {
                let offset = entry.offset as usize;
                if offset < *count_len {
                    return Err(Error::link_error(
                        codes::BAD_RELOC_SITE,
                        format!("relocation inside the count of section {}", section_name(id)),
                    ));
                }
                rebased.push(RelocEntry {
                    ty: entry.ty,
                    offset: (offset - count_len + chunk_start) as u32,
                    addend: entry.addend,
                });
            }
        }
    }
    Ok(Some((combined.into_bytes(), rebased)))
}

fn write_import_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) {
    let active_funcs: u32 = inputs
        .iter()
        .flat_map(|input| &input.func_imports)
        .filter(|import| import.active)
        .count() as u32;
    let globals: u32 = inputs.iter().map(LinkerInput::num_global_imports).sum();
    if active_funcs + globals == 0 {
        return;
    }

    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(active_funcs + globals);
    for (index, input) in inputs.iter().enumerate() {
        for import in input.func_imports.iter().filter(|import| import.active) {
            payload.write_str(&import.module);
            payload.write_str(&import.field);
            payload.write_u8(ExternalKind::Func.to_byte());
            payload.write_u32_leb_canonical(relocate_type_index(inputs, index, import.sig_index));
        }
    }
    for input in inputs {
        for import in &input.global_imports {
            payload.write_str(&import.module);
            payload.write_str(&import.field);
            payload.write_u8(ExternalKind::Global.to_byte());
            payload.write_u8(import.ty.to_byte());
            payload.write_u8(u8::from(import.mutable));
        }
    }
    writer.write_section(binary::IMPORT_SECTION_ID, &payload.into_bytes());
}

// The merged module has a single table sized to hold every element
// entry appended across inputs.
fn write_table_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) {
    let total_elems: u32 = inputs.iter().map(LinkerInput::num_elem_entries).sum();
    let any_table = inputs.iter().any(|input| input.table_limits.is_some());
    if !any_table && total_elems == 0 {
        return;
    }
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(1);
    payload.write_u8(binary::ANYFUNC_TYPE);
    payload.write_limits(&Limits {
        initial: total_elems,
        max: Some(total_elems),
    });
    writer.write_section(binary::TABLE_SECTION_ID, &payload.into_bytes());
}

// A single memory holding every input's pages back to back.
fn write_memory_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) {
    let any_memory = inputs.iter().any(|input| input.memory_limits.is_some());
    if !any_memory {
        return;
    }
    let total_pages: u32 = inputs
        .iter()
        .map(|input| input.memory_limits.map_or(0, |limits| limits.initial))
        .sum();
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(1);
    payload.write_limits(&Limits {
        initial: total_pages,
        max: None,
    });
    writer.write_section(binary::MEMORY_SECTION_ID, &payload.into_bytes());
}

fn write_export_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) -> Result<()> {
    let count: u32 = inputs.iter().map(|input| input.exports.len() as u32).sum();
    if count == 0 {
        return Ok(());
    }
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(count);
    for (index, input) in inputs.iter().enumerate() {
        for export in &input.exports {
            payload.write_str(&export.name);
            payload.write_u8(export.kind.to_byte());
            let remapped = match export.kind {
                ExternalKind::Func => relocate_func_index(inputs, index, export.index)?,
                ExternalKind::Global => relocate_global_index(inputs, index, export.index),
                ExternalKind::Table | ExternalKind::Memory => 0,
            };
            payload.write_u32_leb_canonical(remapped);
        }
    }
    writer.write_section(binary::EXPORT_SECTION_ID, &payload.into_bytes());
    Ok(())
}

fn write_start_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) -> Result<()> {
    let mut start: Option<u32> = None;
    for (index, input) in inputs.iter().enumerate() {
        let Some(func_index) = input.start else {
            continue;
        };
        if start.is_some() {
            return Err(Error::link_error(
                codes::CONFLICTING_START,
                "more than one input declares a start section",
            ));
        }
        start = Some(relocate_func_index(inputs, index, func_index)?);
    }
    if let Some(func_index) = start {
        let mut payload = BinaryWriter::canonical();
        payload.write_u32_leb_canonical(func_index);
        writer.write_section(binary::START_SECTION_ID, &payload.into_bytes());
    }
    Ok(())
}

// All element entries are appended in input order into one segment at
// table offset 0; each input's entries start at its table_index_offset.
fn write_element_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) -> Result<()> {
    let total: u32 = inputs.iter().map(LinkerInput::num_elem_entries).sum();
    if total == 0 {
        return Ok(());
    }
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(1);
    payload.write_u32_leb_canonical(0); // table index
    payload.write_init_expr(&InitExpr::I32Const(0));
    payload.write_u32_leb_canonical(total);
    for (index, input) in inputs.iter().enumerate() {
        for segment in &input.elem_segments {
            for &func_index in &segment.func_indices {
                payload.write_u32_leb_canonical(relocate_func_index(inputs, index, func_index)?);
            }
        }
    }
    writer.write_section(binary::ELEMENT_SECTION_ID, &payload.into_bytes());
    Ok(())
}

// Data is re-framed per segment: memory index 0, offset shifted by the
// input's page base, payload verbatim.
fn write_data_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) -> Result<()> {
    for input in inputs {
        if let Some(span) = input.known_section(DATA_SECTION_ID) {
            if !span.relocations.is_empty() {
                return Err(Error::link_error(
                    codes::BAD_RELOC_SITE,
                    "relocations against the data section are not supported",
                ));
            }
        }
    }
    let count: u32 = inputs
        .iter()
        .map(|input| input.data_segments.len() as u32)
        .sum();
    if count == 0 {
        return Ok(());
    }
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(count);
    for input in inputs {
        let shift = (u64::from(input.memory_page_offset) * u64::from(PAGE_SIZE)) as u32;
        for segment in &input.data_segments {
            payload.write_u32_leb_canonical(0); // memory index
            payload.write_init_expr(&InitExpr::I32Const(segment.offset.wrapping_add(shift) as i32));
            payload.write_u32_leb_canonical(segment.data.len() as u32);
            payload.write_bytes(&segment.data);
        }
    }
    writer.write_section(DATA_SECTION_ID, &payload.into_bytes());
    Ok(())
}

// Merged debug names: active imports keep their field name, local
// functions keep the name their input recorded, in final index order.
fn write_name_section(inputs: &[LinkerInput], writer: &mut BinaryWriter) -> Result<()> {
    if inputs.iter().all(|input| input.function_names.is_empty()) {
        return Ok(());
    }
    let mut names: Vec<String> = Vec::new();
    for input in inputs {
        for import in input.func_imports.iter().filter(|import| import.active) {
            names.push(import.field.clone());
        }
    }
    for input in inputs {
        for local in 0..input.num_functions {
            let original_index = input.num_func_imports() + local;
            names.push(
                input
                    .function_names
                    .get(&original_index)
                    .cloned()
                    .unwrap_or_default(),
            );
        }
    }
    let mut payload = BinaryWriter::canonical();
    payload.write_u32_leb_canonical(names.len() as u32);
    for name in &names {
        payload.write_str(name);
        payload.write_u32_leb_canonical(0); // no local names
    }
    writer.write_custom_section(wbt_format::module::NAME_SECTION_NAME, &payload.into_bytes());
    Ok(())
}

fn write_reloc_sections(reloc_outputs: &[(u8, Vec<RelocEntry>)], writer: &mut BinaryWriter) {
    for (id, entries) in reloc_outputs {
        if entries.is_empty() {
            continue;
        }
        let mut payload = BinaryWriter::canonical();
        payload.write_u32_leb_canonical(u32::from(*id));
        payload.write_u32_leb_canonical(entries.len() as u32);
        for entry in entries {
            payload.write_u32_leb_canonical(entry.ty.to_u32());
            payload.write_u32_leb_canonical(entry.offset);
            if entry.ty.has_addend() {
                payload.write_i32_leb(entry.addend);
            }
        }
        let name = format!("{}{}", RELOC_SECTION_PREFIX, section_name(*id));
        writer.write_custom_section(&name, &payload.into_bytes());
    }
}
