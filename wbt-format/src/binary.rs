//! WebAssembly binary format utilities.
//!
//! Low-level readers and writers for the wire encodings: LEB128 variable
//! length integers, raw little-endian words, and length-prefixed strings.
//! All readers take `(bytes, pos)` and return the decoded value together
//! with the number of bytes consumed.

use wbt_error::{codes, Error, Result};

/// Magic bytes for WebAssembly modules: `\0asm`.
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// The single module version this toolkit accepts.
pub const WASM_VERSION: u32 = 13;

/// WebAssembly section IDs, in canonical on-disk order.
pub const CUSTOM_SECTION_ID: u8 = 0x00;
/// Type section id.
pub const TYPE_SECTION_ID: u8 = 0x01;
/// Import section id.
pub const IMPORT_SECTION_ID: u8 = 0x02;
/// Function section id.
pub const FUNCTION_SECTION_ID: u8 = 0x03;
/// Table section id.
pub const TABLE_SECTION_ID: u8 = 0x04;
/// Memory section id.
pub const MEMORY_SECTION_ID: u8 = 0x05;
/// Global section id.
pub const GLOBAL_SECTION_ID: u8 = 0x06;
/// Export section id.
pub const EXPORT_SECTION_ID: u8 = 0x07;
/// Start section id.
pub const START_SECTION_ID: u8 = 0x08;
/// Element section id.
pub const ELEMENT_SECTION_ID: u8 = 0x09;
/// Code section id.
pub const CODE_SECTION_ID: u8 = 0x0A;
/// Data section id.
pub const DATA_SECTION_ID: u8 = 0x0B;
/// Highest known section id.
pub const LAST_KNOWN_SECTION_ID: u8 = DATA_SECTION_ID;

/// Value type byte: i32.
pub const I32_TYPE: u8 = 0x7F;
/// Value type byte: i64.
pub const I64_TYPE: u8 = 0x7E;
/// Value type byte: f32.
pub const F32_TYPE: u8 = 0x7D;
/// Value type byte: f64.
pub const F64_TYPE: u8 = 0x7C;
/// Element type byte: anyfunc.
pub const ANYFUNC_TYPE: u8 = 0x70;
/// Block signature byte: void.
pub const VOID_TYPE: u8 = 0x40;
/// Function type form byte.
pub const FUNC_TYPE_FORM: u8 = 0x60;

fn truncated(pos: usize, what: &str) -> Error {
    Error::decode_error(
        codes::LEB128_TRUNCATED,
        format!("unable to read {what}: unexpected end of input"),
    )
    .at(pos)
}

/// Read an unsigned 32-bit LEB128 integer.
///
/// Reads 1-5 bytes, stopping at the first byte with the high bit clear.
/// The high four bits of a fifth byte must be zero, else the value does
/// not fit in 32 bits.
pub fn read_leb128_u32(bytes: &[u8], pos: usize) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0u32;
    let mut offset = 0usize;

    loop {
        if pos + offset >= bytes.len() {
            return Err(truncated(pos + offset, "u32 leb128"));
        }

        let byte = bytes[pos + offset];
        offset += 1;

        if shift == 28 && byte & 0xF0 != 0 {
            return Err(Error::decode_error(
                codes::LEB128_OVERFLOW,
                "u32 leb128 does not fit in 32 bits",
            )
            .at(pos));
        }

        result |= u32::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 32 {
            return Err(
                Error::decode_error(codes::LEB128_OVERFLOW, "u32 leb128 too long").at(pos),
            );
        }
    }

    Ok((result, offset))
}

/// Read an unsigned 64-bit LEB128 integer.
///
/// Reads 1-10 bytes. A tenth byte may only contribute the final value
/// bit; anything above it must be zero.
pub fn read_leb128_u64(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;
    let mut offset = 0usize;

    loop {
        if pos + offset >= bytes.len() {
            return Err(truncated(pos + offset, "u64 leb128"));
        }

        let byte = bytes[pos + offset];
        offset += 1;

        if shift == 63 && byte & 0xFE != 0 {
            return Err(Error::decode_error(
                codes::LEB128_OVERFLOW,
                "u64 leb128 does not fit in 64 bits",
            )
            .at(pos));
        }

        result |= u64::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 64 {
            return Err(
                Error::decode_error(codes::LEB128_OVERFLOW, "u64 leb128 too long").at(pos),
            );
        }
    }

    Ok((result, offset))
}

/// Read a signed 32-bit LEB128 integer.
///
/// The bits of a fifth byte past the value range must equal the sign
/// extension of the value's top bit; a mismatch is a decode error.
pub fn read_leb128_i32(bytes: &[u8], pos: usize) -> Result<(i32, usize)> {
    let mut result = 0i32;
    let mut shift = 0u32;
    let mut offset = 0usize;
    let mut byte;

    loop {
        if pos + offset >= bytes.len() {
            return Err(truncated(pos + offset, "i32 leb128"));
        }

        byte = bytes[pos + offset];
        offset += 1;

        if shift == 28 {
            if byte & 0x80 != 0 {
                return Err(Error::decode_error(
                    codes::LEB128_OVERFLOW,
                    "i32 leb128 does not fit in 32 bits",
                )
                .at(pos));
            }
            let extension = byte & 0x78;
            if extension != 0 && extension != 0x78 {
                return Err(Error::decode_error(
                    codes::LEB128_SIGN_EXTENSION,
                    "i32 leb128 has bad sign extension",
                )
                .at(pos));
            }
        }

        result |= ((byte & 0x7F) as i32) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }
    }

    if shift < 32 && byte & 0x40 != 0 {
        result |= -1i32 << shift;
    }

    Ok((result, offset))
}

/// Read a signed 64-bit LEB128 integer.
pub fn read_leb128_i64(bytes: &[u8], pos: usize) -> Result<(i64, usize)> {
    let mut result = 0i64;
    let mut shift = 0u32;
    let mut offset = 0usize;
    let mut byte;

    loop {
        if pos + offset >= bytes.len() {
            return Err(truncated(pos + offset, "i64 leb128"));
        }

        byte = bytes[pos + offset];
        offset += 1;

        if shift == 63 {
            if byte & 0x80 != 0 {
                return Err(Error::decode_error(
                    codes::LEB128_OVERFLOW,
                    "i64 leb128 does not fit in 64 bits",
                )
                .at(pos));
            }
            let extension = byte & 0x7E;
            if extension != 0 && extension != 0x7E {
                return Err(Error::decode_error(
                    codes::LEB128_SIGN_EXTENSION,
                    "i64 leb128 has bad sign extension",
                )
                .at(pos));
            }
        }

        result |= ((byte & 0x7F) as i64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }
    }

    if shift < 64 && byte & 0x40 != 0 {
        result |= -1i64 << shift;
    }

    Ok((result, offset))
}

/// Write an unsigned 32-bit LEB128 integer in canonical (shortest) form.
pub fn write_leb128_u32(value: u32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut value = value;

    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if value == 0 {
            break;
        }
    }

    result
}

/// Write an unsigned 64-bit LEB128 integer in canonical form.
pub fn write_leb128_u64(value: u64) -> Vec<u8> {
    let mut result = Vec::new();
    let mut value = value;

    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if value == 0 {
            break;
        }
    }

    result
}

/// Write a signed 32-bit LEB128 integer in canonical form.
///
/// Termination rule: stop at the byte whose sign bit (bit 6) already
/// equals the remaining sign extension. The same rule the decoder checks.
pub fn write_leb128_i32(value: i32) -> Vec<u8> {
    let mut result = Vec::new();
    let mut value = value;

    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        result.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }

    result
}

/// Write a signed 64-bit LEB128 integer in canonical form.
pub fn write_leb128_i64(value: i64) -> Vec<u8> {
    let mut result = Vec::new();
    let mut value = value;

    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        result.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }

    result
}

/// Write an unsigned 32-bit LEB128 integer padded to exactly 5 bytes.
///
/// Used wherever an operand must be patched in place after its length is
/// already fixed: forward references in the writer and every relocation
/// site the linker rewrites.
pub fn write_fixed_leb128_u32(value: u32) -> [u8; 5] {
    [
        (value & 0x7F) as u8 | 0x80,
        ((value >> 7) & 0x7F) as u8 | 0x80,
        ((value >> 14) & 0x7F) as u8 | 0x80,
        ((value >> 21) & 0x7F) as u8 | 0x80,
        ((value >> 28) & 0x0F) as u8,
    ]
}

/// Write a signed 32-bit LEB128 integer padded to exactly 5 bytes.
pub fn write_fixed_leb128_i32(value: i32) -> [u8; 5] {
    let unsigned = value as u32;
    let sign = if value < 0 { 0x70 } else { 0x00 };
    [
        (unsigned & 0x7F) as u8 | 0x80,
        ((unsigned >> 7) & 0x7F) as u8 | 0x80,
        ((unsigned >> 14) & 0x7F) as u8 | 0x80,
        ((unsigned >> 21) & 0x7F) as u8 | 0x80,
        ((unsigned >> 28) & 0x0F) as u8 | sign,
    ]
}

/// Read a single byte.
pub fn read_u8(bytes: &[u8], pos: usize) -> Result<(u8, usize)> {
    if pos >= bytes.len() {
        return Err(truncated(pos, "byte"));
    }
    Ok((bytes[pos], 1))
}

/// Read a raw little-endian u32.
pub fn read_u32(bytes: &[u8], pos: usize) -> Result<(u32, usize)> {
    if pos + 4 > bytes.len() {
        return Err(truncated(pos, "u32"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[pos..pos + 4]);
    Ok((u32::from_le_bytes(buf), 4))
}

/// Read a raw little-endian u64.
pub fn read_u64(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    if pos + 8 > bytes.len() {
        return Err(truncated(pos, "u64"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[pos..pos + 8]);
    Ok((u64::from_le_bytes(buf), 8))
}

/// Read the raw bits of a little-endian f32.
///
/// Float literals are surfaced as bits so that NaN payloads round-trip.
pub fn read_f32_bits(bytes: &[u8], pos: usize) -> Result<(u32, usize)> {
    read_u32(bytes, pos)
}

/// Read the raw bits of a little-endian f64.
pub fn read_f64_bits(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    read_u64(bytes, pos)
}

/// Read a length-prefixed byte slice.
///
/// Returns the slice borrowed from the input buffer plus bytes consumed
/// (length prefix included).
pub fn read_bytes(bytes: &[u8], pos: usize) -> Result<(&[u8], usize)> {
    let (length, length_size) = read_leb128_u32(bytes, pos)?;
    let start = pos + length_size;
    let end = start
        .checked_add(length as usize)
        .ok_or_else(|| truncated(pos, "byte slice"))?;

    if end > bytes.len() {
        return Err(Error::decode_error(
            codes::UNEXPECTED_EOF,
            format!("byte slice of length {length} exceeds buffer bounds"),
        )
        .at(pos));
    }

    Ok((&bytes[start..end], length_size + length as usize))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string(bytes: &[u8], pos: usize) -> Result<(&str, usize)> {
    let (raw, size) = read_bytes(bytes, pos)?;
    let name = core::str::from_utf8(raw).map_err(|_| {
        Error::decode_error(codes::INVALID_UTF8, "string is not valid UTF-8").at(pos)
    })?;
    Ok((name, size))
}

/// Read a section header: `(id, payload_len, bytes_consumed)`.
pub fn read_section_header(bytes: &[u8], pos: usize) -> Result<(u8, u32, usize)> {
    let (id, id_size) = read_u8(bytes, pos)?;
    let (payload_len, len_size) = read_leb128_u32(bytes, pos + id_size)?;
    Ok((id, payload_len, id_size + len_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn u32_leb_decodes_single_byte() {
        assert_eq!(read_leb128_u32(&[0x00], 0).unwrap(), (0, 1));
        assert_eq!(read_leb128_u32(&[0x7F], 0).unwrap(), (127, 1));
    }

    #[test]
    fn u32_leb_decodes_multi_byte() {
        assert_eq!(read_leb128_u32(&[0xE5, 0x8E, 0x26], 0).unwrap(), (624485, 3));
        assert_eq!(
            read_leb128_u32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], 0).unwrap(),
            (u32::MAX, 5)
        );
    }

    #[test]
    fn u32_leb_accepts_padded_form() {
        // The linker rewrites operands as fixed 5-byte LEBs; the decoder
        // must accept them even though they are not canonical.
        let padded = write_fixed_leb128_u32(3);
        assert_eq!(read_leb128_u32(&padded, 0).unwrap(), (3, 5));
    }

    #[test]
    fn u32_leb_rejects_overflow() {
        let err = read_leb128_u32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F], 0).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::LEB128_OVERFLOW);
    }

    #[test]
    fn u32_leb_rejects_truncation() {
        let err = read_leb128_u32(&[0x80, 0x80], 0).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::LEB128_TRUNCATED);
    }

    #[test]
    fn i32_leb_decodes_negative() {
        assert_eq!(read_leb128_i32(&[0x7F], 0).unwrap(), (-1, 1));
        assert_eq!(read_leb128_i32(&[0xC0, 0xBB, 0x78], 0).unwrap(), (-123456, 3));
    }

    #[test]
    fn i32_leb_rejects_bad_sign_extension() {
        // Fifth byte claims positive in its low value bits but carries
        // nonzero garbage above bit 31.
        let err = read_leb128_i32(&[0x80, 0x80, 0x80, 0x80, 0x10], 0).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::LEB128_SIGN_EXTENSION);
    }

    #[test]
    fn i64_leb_decodes_extremes() {
        let min = write_leb128_i64(i64::MIN);
        assert_eq!(min.len(), 10);
        assert_eq!(read_leb128_i64(&min, 0).unwrap(), (i64::MIN, 10));

        let max = write_leb128_i64(i64::MAX);
        assert_eq!(read_leb128_i64(&max, 0).unwrap(), (i64::MAX, 10));
    }

    #[test]
    fn fixed_leb_is_five_bytes_and_round_trips() {
        for value in [0u32, 1, 127, 128, 624485, u32::MAX] {
            let bytes = write_fixed_leb128_u32(value);
            assert_eq!(read_leb128_u32(&bytes, 0).unwrap(), (value, 5));
        }
        for value in [0i32, -1, 42, -624485, i32::MIN, i32::MAX] {
            let bytes = write_fixed_leb128_i32(value);
            assert_eq!(read_leb128_i32(&bytes, 0).unwrap(), (value, 5));
        }
    }

    #[test]
    fn canonical_encoding_is_shortest() {
        assert_eq!(write_leb128_u32(0), vec![0x00]);
        assert_eq!(write_leb128_u32(127), vec![0x7F]);
        assert_eq!(write_leb128_u32(128), vec![0x80, 0x01]);
        assert_eq!(write_leb128_i32(-1), vec![0x7F]);
        assert_eq!(write_leb128_i32(63), vec![0x3F]);
        // 64 needs a second byte: bit 6 of 0x40 would read as a sign bit.
        assert_eq!(write_leb128_i32(64), vec![0xC0, 0x00]);
        assert_eq!(write_leb128_i32(-64), vec![0x40]);
        assert_eq!(write_leb128_i32(-65), vec![0xBF, 0x7F]);
    }

    #[test]
    fn read_string_checks_utf8() {
        let mut bytes = write_leb128_u32(2);
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        let err = read_string(&bytes, 0).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::INVALID_UTF8);
    }

    #[test]
    fn read_bytes_bounds_checked() {
        let bytes = write_leb128_u32(10);
        let err = read_bytes(&bytes, 0).unwrap_err();
        assert_eq!(err.code, wbt_error::codes::UNEXPECTED_EOF);
    }

    proptest! {
        #[test]
        fn u32_round_trip(value: u32) {
            let encoded = write_leb128_u32(value);
            prop_assert!(encoded.len() <= 5);
            let (decoded, size) = read_leb128_u32(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(size, encoded.len());
        }

        #[test]
        fn i32_round_trip(value: i32) {
            let encoded = write_leb128_i32(value);
            prop_assert!(encoded.len() <= 5);
            let (decoded, size) = read_leb128_i32(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(size, encoded.len());
        }

        #[test]
        fn i64_round_trip(value: i64) {
            let encoded = write_leb128_i64(value);
            prop_assert!(encoded.len() <= 10);
            let (decoded, size) = read_leb128_i64(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(size, encoded.len());
        }

        #[test]
        fn u64_round_trip(value: u64) {
            let encoded = write_leb128_u64(value);
            prop_assert!(encoded.len() <= 10);
            let (decoded, size) = read_leb128_u64(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(size, encoded.len());
        }

        #[test]
        fn u32_canonical_shorter_encoding_does_not_exist(value: u32) {
            // Shortest form: the last byte is never zero unless the value is.
            let encoded = write_leb128_u32(value);
            if value != 0 {
                prop_assert_ne!(*encoded.last().unwrap(), 0);
            }
        }
    }
}
