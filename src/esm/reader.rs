use std::fmt;

use bon::Builder;
use winnow::Parser;
use winnow::binary::{le_f32, le_u32};

use crate::esm::parser_utils::{
    RECORD_HEADER_SIZE, SUB_HEADER_SIZE, WResult, parse_fixed_string, parse_record_header,
    parse_sub_header, write_fixed_string,
};
use crate::esm::{
    ContentData, EsmError, EsmWriter, FourCc, RecordFlags, RecordKind, RefNum, SubRecord,
};

/// A master file listed in a content file's header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterFile {
    pub name: String,
    pub size: u64,
}

/// The `TES3` record at the start of every content file.
#[derive(Clone, Debug, Default, PartialEq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileHeader {
    #[builder(default = 1.3)]
    pub version: f32,
    #[builder(default)]
    pub file_type: u32,
    #[builder(default, into)]
    pub author: String,
    #[builder(default, into)]
    pub description: String,
    #[builder(default)]
    pub record_count: u32,
    #[builder(default)]
    pub masters: Vec<MasterFile>,
}

const AUTHOR_WIDTH: usize = 32;
const DESCRIPTION_WIDTH: usize = 256;

fn parse_hedr(input: &mut &[u8]) -> WResult<(f32, u32, String, String, u32)> {
    let version = le_f32.parse_next(input)?;
    let file_type = le_u32.parse_next(input)?;
    let author = parse_fixed_string(AUTHOR_WIDTH).parse_next(input)?;
    let description = parse_fixed_string(DESCRIPTION_WIDTH).parse_next(input)?;
    let record_count = le_u32.parse_next(input)?;
    Ok((version, file_type, author, description, record_count))
}

impl FileHeader {
    fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut header = FileHeader::default();
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"HEDR" => {
                    let (version, file_type, author, description, record_count) =
                        sub.parse_with(parse_hedr)?;
                    header.version = version;
                    header.file_type = file_type;
                    header.author = author;
                    header.description = description;
                    header.record_count = record_count;
                }
                b"MAST" => header.masters.push(MasterFile {
                    name: sub.parse()?,
                    size: 0,
                }),
                b"DATA" => {
                    let size: u64 = sub.parse()?;
                    if let Some(master) = header.masters.last_mut() {
                        master.size = size;
                    }
                }
                _ => {}
            }
        }
        Ok(header)
    }

    pub(crate) fn save(&self, writer: &mut EsmWriter) {
        let mut hedr = Vec::with_capacity(300);
        hedr.extend_from_slice(&self.version.to_le_bytes());
        hedr.extend_from_slice(&self.file_type.to_le_bytes());
        write_fixed_string(&mut hedr, &self.author, AUTHOR_WIDTH);
        write_fixed_string(&mut hedr, &self.description, DESCRIPTION_WIDTH);
        hedr.extend_from_slice(&self.record_count.to_le_bytes());
        writer.write_sub_raw(b"HEDR", &hedr);
        for master in &self.masters {
            writer.write_string(b"MAST", &master.name);
            writer.write_sub(b"DATA", &master.size);
        }
    }
}

/// Header of the record the reader is currently positioned in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: FourCc,
    pub size: u32,
    pub flags: RecordFlags,
    /// File offset of the record header.
    pub offset: usize,
}

impl RecordHeader {
    pub fn kind(&self) -> Option<RecordKind> {
        RecordKind::from_tag(self.tag)
    }
}

/// A saved position inside a record, used to replay cell references later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderContext {
    /// Content file index of the reader the context was taken from.
    pub index: usize,
    pub offset: usize,
    pub end: usize,
}

/// One subrecord payload borrowed from the reader.
pub struct SubRecordData<'a> {
    pub tag: FourCc,
    pub data: &'a [u8],
    pub offset: usize,
    file: &'a str,
}

impl SubRecordData<'_> {
    pub fn parse<T: SubRecord>(&self) -> Result<T, EsmError> {
        self.parse_with(T::parse)
    }

    pub fn parse_with<T>(
        &self,
        parser: impl FnOnce(&mut &[u8]) -> WResult<T>,
    ) -> Result<T, EsmError> {
        let mut input = self.data;
        parser(&mut input).map_err(|e| EsmError::Parse {
            file: self.file.to_string(),
            tag: self.tag,
            offset: self.offset,
            detail: format!("{e}"),
        })
    }
}

/// Sequential pull decoder over one content file.
pub struct EsmReader {
    data: ContentData,
    index: usize,
    name: String,
    header: FileHeader,
    master_indices: Vec<i32>,
    pos: usize,
    record_end: usize,
    in_record: bool,
}

impl fmt::Debug for EsmReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EsmReader")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("pos", &self.pos)
            .field("size", &self.file_size())
            .finish()
    }
}

impl EsmReader {
    /// Create a reader over raw record data with no file header.
    pub fn new(data: ContentData, index: usize, name: impl Into<String>) -> Self {
        EsmReader {
            data,
            index,
            name: name.into(),
            header: FileHeader::default(),
            master_indices: Vec::new(),
            pos: 0,
            record_end: 0,
            in_record: false,
        }
    }

    /// Create a reader and consume the leading `TES3` header record.
    pub fn open(data: ContentData, index: usize, name: impl Into<String>) -> Result<Self, EsmError> {
        let mut reader = EsmReader::new(data, index, name);
        if !reader.has_more_records() {
            return Err(EsmError::MissingHeader { file: reader.name });
        }
        let header = reader.next_record_header()?;
        if header.kind() != Some(RecordKind::Header) {
            return Err(EsmError::MissingHeader { file: reader.name });
        }
        reader.header = FileHeader::load(&mut reader)?;
        reader.master_indices = (0..reader.header.masters.len() as i32).collect();
        reader.skip_record();
        Ok(reader)
    }

    fn bytes(&self) -> &[u8] {
        let data: &(dyn AsRef<[u8]> + Send + Sync) = &*self.data;
        data.as_ref()
    }

    pub fn data(&self) -> &ContentData {
        &self.data
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Content file index for each entry of the header's master list.
    pub fn set_master_indices(&mut self, indices: Vec<i32>) {
        self.master_indices = indices;
    }

    pub fn master_indices(&self) -> &[i32] {
        &self.master_indices
    }

    /// Map a raw `FRMR`/`MVRF` value to the content file that placed it. The
    /// high byte is a 1-based master slot, or zero for this file.
    pub fn adjust_ref_num(&self, raw: u32) -> RefNum {
        let slot = raw >> 24;
        let content_file = if slot == 0 {
            self.index as i32
        } else {
            self.master_indices
                .get(slot as usize - 1)
                .copied()
                .unwrap_or(-1)
        };
        RefNum {
            index: raw & 0x00ff_ffff,
            content_file,
        }
    }

    pub fn file_offset(&self) -> usize {
        self.pos
    }

    pub fn file_size(&self) -> usize {
        self.bytes().len()
    }

    pub fn has_more_records(&self) -> bool {
        let next = if self.in_record {
            self.record_end
        } else {
            self.pos
        };
        next < self.file_size()
    }

    /// Advance to the next record, skipping whatever is left of the current one.
    pub fn next_record_header(&mut self) -> Result<RecordHeader, EsmError> {
        if self.in_record {
            self.pos = self.record_end;
            self.in_record = false;
        }
        let start = self.pos;
        let available = self.file_size() - start;
        if available < RECORD_HEADER_SIZE {
            return Err(EsmError::TruncatedRecord {
                file: self.name.clone(),
                offset: start,
                needed: RECORD_HEADER_SIZE,
                available,
            });
        }
        let raw = parse_record_header(&mut &self.bytes()[start..]).map_err(|e| EsmError::Parse {
            file: self.name.clone(),
            tag: FourCc::default(),
            offset: start,
            detail: format!("{e}"),
        })?;
        let needed = RECORD_HEADER_SIZE + raw.size as usize;
        if available < needed {
            return Err(EsmError::TruncatedRecord {
                file: self.name.clone(),
                offset: start,
                needed,
                available,
            });
        }

        self.pos = start + RECORD_HEADER_SIZE;
        self.record_end = start + needed;
        self.in_record = true;
        Ok(RecordHeader {
            tag: raw.tag,
            size: raw.size,
            flags: raw.flags,
            offset: start,
        })
    }

    pub fn skip_record(&mut self) {
        if self.in_record {
            self.pos = self.record_end;
            self.in_record = false;
        }
    }

    /// Drop the current record position without moving the file offset.
    pub(crate) fn close_record(&mut self) {
        self.in_record = false;
    }

    pub fn has_more_subs(&self) -> bool {
        self.in_record && self.pos < self.record_end
    }

    pub fn peek_sub_name(&self) -> Option<FourCc> {
        if !self.has_more_subs() || self.record_end - self.pos < 4 {
            return None;
        }
        let bytes = &self.bytes()[self.pos..self.pos + 4];
        Some(FourCc(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }

    pub fn is_next_sub(&self, tag: &[u8; 4]) -> bool {
        self.peek_sub_name() == Some(FourCc::new(*tag))
    }

    pub fn next_sub(&mut self) -> Result<SubRecordData<'_>, EsmError> {
        let start = self.pos;
        if !self.in_record || self.record_end - start < SUB_HEADER_SIZE {
            return Err(EsmError::TruncatedSubRecord {
                file: self.name.clone(),
                offset: start,
            });
        }
        let (tag, size) = parse_sub_header(&mut &self.bytes()[start..self.record_end])
            .map_err(|e| EsmError::Parse {
                file: self.name.clone(),
                tag: FourCc::default(),
                offset: start,
                detail: format!("{e}"),
            })?;
        let end = start + SUB_HEADER_SIZE + size as usize;
        if end > self.record_end {
            return Err(EsmError::TruncatedSubRecord {
                file: self.name.clone(),
                offset: start,
            });
        }
        self.pos = end;
        Ok(SubRecordData {
            tag,
            data: &self.bytes()[start + SUB_HEADER_SIZE..end],
            offset: start,
            file: &self.name,
        })
    }

    pub fn skip_sub(&mut self) -> Result<(), EsmError> {
        self.next_sub().map(|_| ())
    }

    /// Read the next subrecord, which must carry `tag`.
    pub fn get_sub_named<T: SubRecord>(&mut self, tag: &[u8; 4]) -> Result<T, EsmError> {
        let expected = FourCc::new(*tag);
        let sub = self.next_sub()?;
        if sub.tag != expected {
            return Err(EsmError::UnexpectedSubRecord {
                file: sub.file.to_string(),
                offset: sub.offset,
                expected,
                found: sub.tag,
            });
        }
        sub.parse()
    }

    pub fn context(&self) -> ReaderContext {
        ReaderContext {
            index: self.index,
            offset: self.pos,
            end: self.record_end,
        }
    }

    pub fn restore(&mut self, context: &ReaderContext) {
        self.pos = context.offset;
        self.record_end = context.end;
        self.in_record = true;
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn sample() -> Vec<u8> {
        let mut writer = EsmWriter::new();
        let header = FileHeader::builder()
            .author("tester")
            .masters(vec![MasterFile {
                name: "Morrowind.esm".to_string(),
                size: 79837557,
            }])
            .build();
        writer.write_file_header(&header).unwrap();
        writer.start_record(RecordKind::Static, RecordFlags::default());
        writer.write_string(b"NAME", "ex_common_house");
        writer.write_string(b"MODL", "x\\ex_common_house.nif");
        writer.end_record().unwrap();
        writer.start_record(RecordKind::Global, RecordFlags::IGNORED);
        writer.write_string(b"NAME", "timescale");
        writer.end_record().unwrap();
        writer.into_inner()
    }

    #[test]
    fn header_and_records_are_read_in_order() {
        let mut reader = EsmReader::open(Arc::new(sample()), 1, "test.esp").unwrap();
        assert_eq!(reader.header().author, "tester");
        assert_eq!(reader.header().masters[0].name, "Morrowind.esm");
        assert_eq!(reader.header().masters[0].size, 79837557);

        let header = reader.next_record_header().unwrap();
        assert_eq!(header.kind(), Some(RecordKind::Static));
        assert!(reader.is_next_sub(b"NAME"));
        let id: String = reader.get_sub_named(b"NAME").unwrap();
        assert_eq!(id, "ex_common_house");

        // The MODL subrecord is left unread and skipped implicitly.
        let header = reader.next_record_header().unwrap();
        assert_eq!(header.kind(), Some(RecordKind::Global));
        assert!(header.flags.is_ignored());
        reader.skip_record();
        assert!(!reader.has_more_records());
    }

    #[test]
    fn missing_header_is_rejected() {
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::Static, RecordFlags::default());
        writer.end_record().unwrap();
        let err = EsmReader::open(Arc::new(writer.into_inner()), 0, "bad.esp").unwrap_err();
        assert!(matches!(err, EsmError::MissingHeader { .. }));
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut bytes = sample();
        bytes.truncate(bytes.len() - 3);
        let mut reader = EsmReader::open(Arc::new(bytes), 0, "cut.esp").unwrap();
        reader.next_record_header().unwrap();
        let err = reader.next_record_header().unwrap_err();
        assert!(matches!(err, EsmError::TruncatedRecord { .. }));
    }

    #[test]
    fn ref_nums_resolve_master_slots() {
        let mut reader = EsmReader::open(Arc::new(sample()), 3, "test.esp").unwrap();
        assert_eq!(
            reader.adjust_ref_num(42),
            RefNum {
                index: 42,
                content_file: 3
            }
        );
        reader.set_master_indices(vec![7]);
        assert_eq!(
            reader.adjust_ref_num((1 << 24) | 42),
            RefNum {
                index: 42,
                content_file: 7
            }
        );
        assert_eq!(reader.adjust_ref_num((2 << 24) | 1).content_file, -1);
    }
}
