//! Sequential codec for TES3 content files (`.esm`, `.esp`, `.omwaddon` and save games).
//!
//! A content file is a flat list of records. Each record starts with a 16 byte
//! header (tag, payload size, an unused word, flags) followed by a list of
//! subrecords, each of which is a 4 byte tag, a `u32` payload size and the
//! payload itself.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

mod kind;
pub mod parser_utils;
mod reader;
mod readers_cache;
mod subrecord;
mod writer;

pub use kind::RecordKind;
pub use reader::{EsmReader, FileHeader, MasterFile, ReaderContext, RecordHeader, SubRecordData};
pub use readers_cache::{BusyReader, ContentSource, ReadersCache};
pub use subrecord::{RawBytes, SubRecord};
pub use writer::EsmWriter;

/// Bytes backing a content file. Either a memory map or an owned buffer.
pub type ContentData = Arc<dyn AsRef<[u8]> + Send + Sync>;

#[derive(Debug, Error)]
pub enum EsmError {
    #[error("{file}: not a TES3 content file")]
    MissingHeader { file: String },
    #[error("{file}: record at 0x{offset:X} needs 0x{needed:X} bytes, 0x{available:X} available")]
    TruncatedRecord {
        file: String,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{file}: subrecord at 0x{offset:X} runs past the end of its record")]
    TruncatedSubRecord { file: String, offset: usize },
    #[error("{file}: expected subrecord {expected} at 0x{offset:X}, found {found}")]
    UnexpectedSubRecord {
        file: String,
        offset: usize,
        expected: FourCc,
        found: FourCc,
    },
    #[error("{file}: failed to decode {tag} at 0x{offset:X}: {detail}")]
    Parse {
        file: String,
        tag: FourCc,
        offset: usize,
        detail: String,
    },
    #[error("no record is open on the writer")]
    NoOpenRecord,
    #[error("content file index {0} is not registered with the readers cache")]
    UnknownContentFile(usize),
    #[error("I/O error")]
    IoError(#[from] io::Error),
}

/// A four character record or subrecord tag, stored as its little-endian value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn new(tag: [u8; 4]) -> Self {
        FourCc(u32::from_le_bytes(tag))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<[u8; 4]> for FourCc {
    fn from(tag: [u8; 4]) -> Self {
        FourCc::new(tag)
    }
}

impl From<&[u8; 4]> for FourCc {
    fn from(tag: &[u8; 4]) -> Self {
        FourCc::new(*tag)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02X}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// Record header flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordFlags(pub u32);

impl RecordFlags {
    pub const DELETED: RecordFlags = RecordFlags(0x0020);
    pub const PERSISTENT: RecordFlags = RecordFlags(0x0400);
    pub const IGNORED: RecordFlags = RecordFlags(0x1000);
    pub const BLOCKED: RecordFlags = RecordFlags(0x2000);

    pub fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_ignored(self) -> bool {
        self.contains(Self::IGNORED)
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        RecordFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for RecordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordFlags({:#x})", self.0)
    }
}

/// Identifies a placed reference: a per-file placement index and the content
/// file that introduced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefNum {
    pub index: u32,
    pub content_file: i32,
}

impl RefNum {
    pub fn has_content_file(&self) -> bool {
        self.content_file >= 0
    }
}

impl fmt::Display for RefNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_file, self.index)
    }
}
