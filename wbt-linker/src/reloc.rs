//! In-place relocation rewriting.
//!
//! Every relocation site in an object module holds an operand padded to
//! a fixed width (5-byte LEB128 or raw little-endian i32), so rewriting
//! never changes a section's size and no downstream offset shifts.

use wbt_error::{codes, Error, Result};
use wbt_format::binary::{
    read_leb128_i32, read_leb128_u32, write_fixed_leb128_i32, write_fixed_leb128_u32,
};
use wbt_format::module::{RelocEntry, RelocType};
use wbt_format::types::PAGE_SIZE;

use crate::input::{LinkerInput, SectionSpan};
use crate::linker::{relocate_func_index, relocate_global_index, relocate_type_index};

/// Copy a section payload and rewrite every relocation recorded for it.
pub fn apply_section_relocations(
    inputs: &[LinkerInput],
    input_index: usize,
    span: &SectionSpan,
) -> Result<Vec<u8>> {
    let input = &inputs[input_index];
    let mut payload =
        input.data[span.payload_offset..span.payload_offset + span.payload_size].to_vec();
    for entry in &span.relocations {
        apply_relocation(inputs, input_index, entry, &mut payload)?;
    }
    Ok(payload)
}

fn bad_site(at: usize, why: &str) -> Error {
    Error::link_error(
        codes::BAD_RELOC_SITE,
        format!("relocation site at payload offset {at:#x}: {why}"),
    )
}

fn read_padded_u32(payload: &[u8], at: usize) -> Result<u32> {
    let (value, size) =
        read_leb128_u32(payload, at).map_err(|_| bad_site(at, "unreadable leb128"))?;
    if size != 5 {
        return Err(bad_site(at, "operand is not a 5-byte leb128"));
    }
    Ok(value)
}

fn read_padded_i32(payload: &[u8], at: usize) -> Result<i32> {
    let (value, size) =
        read_leb128_i32(payload, at).map_err(|_| bad_site(at, "unreadable leb128"))?;
    if size != 5 {
        return Err(bad_site(at, "operand is not a 5-byte leb128"));
    }
    Ok(value)
}

fn read_raw_u32(payload: &[u8], at: usize) -> Result<u32> {
    if at + 4 > payload.len() {
        return Err(bad_site(at, "operand runs past the section"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&payload[at..at + 4]);
    Ok(u32::from_le_bytes(buf))
}

fn write_padded_u32(payload: &mut [u8], at: usize, value: u32) {
    payload[at..at + 5].copy_from_slice(&write_fixed_leb128_u32(value));
}

fn write_padded_i32(payload: &mut [u8], at: usize, value: i32) {
    payload[at..at + 5].copy_from_slice(&write_fixed_leb128_i32(value));
}

fn write_raw_u32(payload: &mut [u8], at: usize, value: u32) {
    payload[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn apply_relocation(
    inputs: &[LinkerInput],
    input_index: usize,
    entry: &RelocEntry,
    payload: &mut [u8],
) -> Result<()> {
    let at = entry.offset as usize;
    let input = &inputs[input_index];
    let page_shift = (u64::from(input.memory_page_offset) * u64::from(PAGE_SIZE)) as u32;

    match entry.ty {
        RelocType::FuncIndexLeb => {
            let old = read_padded_u32(payload, at)?;
            let new = relocate_func_index(inputs, input_index, old)?;
            write_padded_u32(payload, at, new);
        }
        RelocType::TypeIndexLeb => {
            let old = read_padded_u32(payload, at)?;
            write_padded_u32(payload, at, relocate_type_index(inputs, input_index, old));
        }
        RelocType::GlobalIndexLeb => {
            let old = read_padded_u32(payload, at)?;
            write_padded_u32(payload, at, relocate_global_index(inputs, input_index, old));
        }
        RelocType::TableIndexSleb => {
            let old = read_padded_i32(payload, at)?;
            write_padded_i32(payload, at, old + input.table_index_offset as i32);
        }
        RelocType::TableIndexI32 => {
            let old = read_raw_u32(payload, at)?;
            write_raw_u32(payload, at, old + input.table_index_offset);
        }
        RelocType::MemoryAddrLeb => {
            let old = read_padded_u32(payload, at)?;
            write_padded_u32(payload, at, old.wrapping_add(page_shift));
        }
        RelocType::MemoryAddrSleb => {
            let old = read_padded_i32(payload, at)?;
            write_padded_i32(payload, at, old.wrapping_add(page_shift as i32));
        }
        RelocType::MemoryAddrI32 => {
            let old = read_raw_u32(payload, at)?;
            write_raw_u32(payload, at, old.wrapping_add(page_shift));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_sites_round_trip_their_width() {
        let mut payload = write_fixed_leb128_u32(7).to_vec();
        assert_eq!(read_padded_u32(&payload, 0).unwrap(), 7);
        write_padded_u32(&mut payload, 0, 123_456);
        assert_eq!(payload.len(), 5);
        assert_eq!(read_padded_u32(&payload, 0).unwrap(), 123_456);
    }

    #[test]
    fn canonical_sites_are_rejected() {
        let payload = vec![0x07]; // canonical, 1 byte
        let err = read_padded_u32(&payload, 0).unwrap_err();
        assert_eq!(err.code, codes::BAD_RELOC_SITE);
    }
}
