use crate::esm::parser_utils::{RECORD_HEADER_SIZE, encode_string};
use crate::esm::{EsmError, FileHeader, FourCc, RecordFlags, RecordKind, SubRecord};

/// Serializes records into the TES3 layout.
#[derive(Clone, Debug, Default)]
pub struct EsmWriter {
    buf: Vec<u8>,
    record_start: Option<usize>,
    record_count: u32,
}

impl EsmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_file_header(&mut self, header: &FileHeader) -> Result<(), EsmError> {
        self.start_record(RecordKind::Header, RecordFlags::default());
        header.save(self);
        self.end_record()?;
        // The header does not count towards the records it describes.
        self.record_count -= 1;
        Ok(())
    }

    /// Open a record. The payload size is patched in by [`EsmWriter::end_record`].
    pub fn start_record(&mut self, tag: impl Into<FourCc>, flags: RecordFlags) {
        self.record_start = Some(self.buf.len());
        self.buf.extend_from_slice(&tag.into().0.to_le_bytes());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&flags.0.to_le_bytes());
    }

    pub fn end_record(&mut self) -> Result<(), EsmError> {
        let start = self.record_start.take().ok_or(EsmError::NoOpenRecord)?;
        let size = (self.buf.len() - start - RECORD_HEADER_SIZE) as u32;
        self.buf[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
        self.record_count += 1;
        Ok(())
    }

    pub fn write_sub_raw(&mut self, tag: &[u8; 4], payload: &[u8]) {
        self.buf.extend_from_slice(tag);
        self.buf
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
    }

    pub fn write_sub<T: SubRecord>(&mut self, tag: &[u8; 4], value: &T) {
        let mut payload = Vec::new();
        value.write(&mut payload);
        self.write_sub_raw(tag, &payload);
    }

    /// Write `value` only when it carries data.
    pub fn write_optional<T: SubRecord>(&mut self, tag: &[u8; 4], value: &T) {
        if !value.is_unset() {
            self.write_sub(tag, value);
        }
    }

    pub fn write_string(&mut self, tag: &[u8; 4], value: &str) {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(&encode_string(value));
        payload.push(0);
        self.write_sub_raw(tag, &payload);
    }

    /// Number of records completed so far.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_size_is_patched() {
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::DynamicCount, RecordFlags::default());
        writer.write_sub(b"COUN", &5u32);
        writer.end_record().unwrap();
        let bytes = writer.into_inner();

        assert_eq!(&bytes[0..4], b"DYNA");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 12);
        assert_eq!(&bytes[16..20], b"COUN");
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 4);
        assert_eq!(bytes.len(), 28);
    }

    #[test]
    fn ending_without_a_record_fails() {
        let mut writer = EsmWriter::new();
        assert!(matches!(writer.end_record(), Err(EsmError::NoOpenRecord)));
    }
}
