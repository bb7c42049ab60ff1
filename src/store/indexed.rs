use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::esm::{EsmError, EsmReader, EsmWriter};
use crate::loading::Listener;
use crate::records::{Attribute, IndexedRecord};
use crate::store::{DynamicStore, RecordId};

/// Collection of records keyed by a numeric index, such as magic effects and
/// skills. A later definition replaces an earlier one outright; there is no
/// deletion and no dynamic partition.
#[derive(Clone, Debug)]
pub struct IndexedStore<T: IndexedRecord> {
    records: BTreeMap<i32, T>,
}

impl<T: IndexedRecord> Default for IndexedStore<T> {
    fn default() -> Self {
        IndexedStore {
            records: BTreeMap::new(),
        }
    }
}

impl<T: IndexedRecord> IndexedStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError> {
        let record = T::load(reader)?;
        let index = record.index();
        self.records.insert(index, record);
        Ok(RecordId {
            id: index.to_string(),
            deleted: false,
        })
    }

    pub fn insert(&mut self, record: T) -> &T {
        let index = record.index();
        self.records.insert(index, record);
        &self.records[&index]
    }

    pub fn search(&self, index: i32) -> Option<&T> {
        self.records.get(&index)
    }

    pub fn find(&self, index: i32) -> Result<&T, ErrorKind> {
        self.search(index).ok_or_else(|| ErrorKind::NotFound {
            kind: T::KIND,
            id: index.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: IndexedRecord> DynamicStore for IndexedStore<T> {
    fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError> {
        IndexedStore::load(self, reader)
    }

    fn read(&mut self, reader: &mut EsmReader, _override_only: bool) -> Result<RecordId, EsmError> {
        IndexedStore::load(self, reader)
    }

    fn write(&self, _writer: &mut EsmWriter, _listener: &mut dyn Listener) -> Result<usize, EsmError> {
        Ok(0)
    }

    fn set_up(&mut self) {}

    fn list_identifiers(&self, _out: &mut Vec<String>) {}

    fn clear_dynamic(&mut self) {}

    fn erase_static(&mut self, _id: &str) -> bool {
        false
    }

    fn len(&self) -> usize {
        IndexedStore::len(self)
    }

    fn dynamic_len(&self) -> usize {
        0
    }
}

/// The built-in attributes, materialized on first set up.
#[derive(Clone, Debug, Default)]
pub struct AttributeStore {
    attributes: Vec<Attribute>,
}

impl AttributeStore {
    pub fn set_up(&mut self) {
        if self.attributes.is_empty() {
            self.attributes = Attribute::built_in();
        }
    }

    pub fn search(&self, index: i32) -> Option<&Attribute> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.attributes.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl DynamicStore for AttributeStore {
    fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError> {
        reader.skip_record();
        Ok(RecordId {
            id: String::new(),
            deleted: false,
        })
    }

    fn read(&mut self, reader: &mut EsmReader, _override_only: bool) -> Result<RecordId, EsmError> {
        DynamicStore::load(self, reader)
    }

    fn write(&self, _writer: &mut EsmWriter, _listener: &mut dyn Listener) -> Result<usize, EsmError> {
        Ok(0)
    }

    fn set_up(&mut self) {
        AttributeStore::set_up(self)
    }

    fn list_identifiers(&self, _out: &mut Vec<String>) {}

    fn clear_dynamic(&mut self) {}

    fn erase_static(&mut self, _id: &str) -> bool {
        false
    }

    fn len(&self) -> usize {
        AttributeStore::len(self)
    }

    fn dynamic_len(&self) -> usize {
        0
    }
}
