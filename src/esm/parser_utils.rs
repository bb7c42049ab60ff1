//! Shared winnow-based parsing utilities for record and subrecord payloads.

use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;
use winnow::Parser;
use winnow::binary::le_u32;
use winnow::error::ContextError;
use winnow::token::take;

use crate::esm::{FourCc, RecordFlags};

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

pub const RECORD_HEADER_SIZE: usize = 16;
pub const SUB_HEADER_SIZE: usize = 8;

pub(crate) struct RawRecordHeader {
    pub tag: FourCc,
    pub size: u32,
    pub flags: RecordFlags,
}

pub(crate) fn parse_record_header(input: &mut &[u8]) -> WResult<RawRecordHeader> {
    let tag = le_u32.parse_next(input)?;
    let size = le_u32.parse_next(input)?;
    let _unused = le_u32.parse_next(input)?;
    let flags = le_u32.parse_next(input)?;
    Ok(RawRecordHeader {
        tag: FourCc(tag),
        size,
        flags: RecordFlags(flags),
    })
}

pub(crate) fn parse_sub_header(input: &mut &[u8]) -> WResult<(FourCc, u32)> {
    let tag = le_u32.parse_next(input)?;
    let size = le_u32.parse_next(input)?;
    Ok((FourCc(tag), size))
}

/// Decode a Windows-1252 string payload, dropping everything from the first
/// NUL onwards.
pub fn decode_zstring(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    WINDOWS_1252
        .decode_without_bom_handling(&bytes[..end])
        .0
        .into_owned()
}

/// Windows-1252 bytes of `value`. Characters outside the code page become
/// numeric character references.
pub fn encode_string(value: &str) -> Cow<'_, [u8]> {
    WINDOWS_1252.encode(value).0
}

/// Parse a fixed-width, NUL padded string field such as the 32 byte ids
/// embedded in inventory entries.
pub fn parse_fixed_string(width: usize) -> impl FnMut(&mut &[u8]) -> WResult<String> {
    move |input: &mut &[u8]| {
        let bytes: &[u8] = take(width).parse_next(input)?;
        Ok(decode_zstring(bytes))
    }
}

/// Write `value` into a fixed-width NUL padded field, truncating if needed.
pub fn write_fixed_string(out: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = encode_string(value);
    let len = bytes.len().min(width);
    out.extend_from_slice(&bytes[..len]);
    out.resize(out.len() + (width - len), 0);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zstring_stops_at_first_nul() {
        assert_eq!(decode_zstring(b"gold_001\0\0junk"), "gold_001");
        assert_eq!(decode_zstring(b"no terminator"), "no terminator");
        assert_eq!(decode_zstring(b""), "");
    }

    #[test]
    fn fixed_strings_are_padded() {
        let mut out = Vec::new();
        write_fixed_string(&mut out, "iron dagger", 32);
        assert_eq!(out.len(), 32);

        let input = &mut &out[..];
        let value = parse_fixed_string(32).parse_next(input).unwrap();
        assert_eq!(value, "iron dagger");
        assert!(input.is_empty());
    }

    #[test]
    fn strings_use_windows_1252() {
        assert_eq!(decode_zstring(b"Vivec's \xe9p\xe9e\0"), "Vivec's épée");
        assert_eq!(&*encode_string("Vivec's épée"), b"Vivec's \xe9p\xe9e");

        let first = decode_zstring(b"\xc4lm\xe4");
        let second = decode_zstring(b"\xd6lm\xf6");
        assert_eq!(first, "Älmä");
        assert_ne!(first, second);

        let all: Vec<u8> = (1..=255).collect();
        assert_eq!(&*encode_string(&decode_zstring(&all)), &all[..]);
    }
}
