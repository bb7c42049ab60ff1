use winnow::Parser;
use winnow::binary::{le_f32, le_i16, le_i32, le_u16, le_u32, le_u64, u8 as le_u8};
use winnow::token::rest;

use crate::esm::parser_utils::{WResult, decode_zstring, encode_string};

/// A value that is stored as the full payload of one subrecord.
pub trait SubRecord: Sized {
    fn parse(input: &mut &[u8]) -> WResult<Self>;

    fn write(&self, out: &mut Vec<u8>);

    /// Optional fields are left out of a record when unset.
    fn is_unset(&self) -> bool {
        false
    }
}

impl SubRecord for String {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        let bytes: &[u8] = rest.parse_next(input)?;
        Ok(decode_zstring(bytes))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&encode_string(self));
        out.push(0);
    }

    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

/// Opaque payload kept verbatim so records round-trip through save games.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawBytes(pub Vec<u8>);

impl SubRecord for RawBytes {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        let bytes: &[u8] = rest.parse_next(input)?;
        Ok(RawBytes(bytes.to_vec()))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn is_unset(&self) -> bool {
        self.0.is_empty()
    }
}

macro_rules! numeric_subrecord {
    ($($ty:ty => $parser:expr,)*) => {
        $(
            impl SubRecord for $ty {
                fn parse(input: &mut &[u8]) -> WResult<Self> {
                    $parser.parse_next(input)
                }

                fn write(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

numeric_subrecord! {
    u8 => le_u8,
    u16 => le_u16,
    i16 => le_i16,
    u32 => le_u32,
    i32 => le_i32,
    u64 => le_u64,
    f32 => le_f32,
}

impl<T: SubRecord> SubRecord for Option<T> {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        T::parse(input).map(Some)
    }

    fn write(&self, out: &mut Vec<u8>) {
        if let Some(value) = self {
            value.write(out);
        }
    }

    fn is_unset(&self) -> bool {
        self.is_none()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strings_are_written_nul_terminated() {
        let mut out = Vec::new();
        "player".to_string().write(&mut out);
        assert_eq!(out, b"player\0");
        assert_eq!(String::parse(&mut &out[..]).unwrap(), "player");
    }

    #[test]
    fn optional_values_skip_when_unset() {
        let value: Option<f32> = None;
        assert!(value.is_unset());
        assert!(String::new().is_unset());
        assert!(!0u32.is_unset());
    }
}
