//! Builders for content files used across the test suites.

use std::sync::Arc;

use crate::content::{ContentFile, load_content};
use crate::esm::{
    EsmReader, EsmWriter, FileHeader, FourCc, MasterFile, ReadersCache, RecordFlags, RecordKind,
    RefNum,
};
use crate::loading::NoProgress;
use crate::records::{
    Cell, CellRef, DialInfo, Dialogue, IndexedRecord, LuaScriptsCfg, MagicEffect, Record, Skill,
};
use crate::store::{EsmStore, ValidationReport};

/// Assembles a content file record by record.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContentBuilder {
    masters: Vec<MasterFile>,
    body: EsmWriter,
}

impl ContentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn master(mut self, name: &str) -> Self {
        self.masters.push(MasterFile {
            name: name.to_string(),
            size: 0,
        });
        self
    }

    pub fn raw(
        mut self,
        tag: impl Into<FourCc>,
        flags: RecordFlags,
        body: impl FnOnce(&mut EsmWriter),
    ) -> Self {
        self.body.start_record(tag, flags);
        body(&mut self.body);
        self.body.end_record().unwrap();
        self
    }

    pub fn record<T: Record>(self, record: &T) -> Self {
        self.flagged(record, RecordFlags::default())
    }

    pub fn flagged<T: Record>(self, record: &T, flags: RecordFlags) -> Self {
        self.raw(T::KIND, flags, |writer| record.save(writer, false))
    }

    pub fn deleted<T: Record>(self, record: &T) -> Self {
        self.raw(T::KIND, RecordFlags::default(), |writer| {
            record.save(writer, true)
        })
    }

    pub fn dialogue(mut self, dialogue: &Dialogue) -> Self {
        dialogue.save_with_infos(&mut self.body).unwrap();
        self
    }

    pub fn info(self, info: &DialInfo) -> Self {
        self.raw(RecordKind::DialInfo, RecordFlags::default(), |writer| {
            info.save(writer)
        })
    }

    pub fn magic_effect(self, effect: &MagicEffect) -> Self {
        self.raw(RecordKind::MagicEffect, RecordFlags::default(), |writer| {
            effect.save(writer)
        })
    }

    pub fn skill(self, skill: &Skill) -> Self {
        self.raw(RecordKind::Skill, RecordFlags::default(), |writer| {
            skill.save(writer)
        })
    }

    pub fn lua(self, cfg: &LuaScriptsCfg) -> Self {
        self.raw(RecordKind::LuaScripts, RecordFlags::default(), |writer| {
            cfg.save(writer)
        })
    }

    /// A cell followed by references placed by this file.
    pub fn cell(self, cell: &Cell, refs: &[(RefNum, &str, bool)]) -> Self {
        self.cell_with(cell, |writer| {
            for (ref_num, id, deleted) in refs {
                CellRef::builder()
                    .ref_num(*ref_num)
                    .ref_id(*id)
                    .build()
                    .save(writer, *deleted);
            }
        })
    }

    pub fn cell_with(self, cell: &Cell, refs: impl FnOnce(&mut EsmWriter)) -> Self {
        self.raw(RecordKind::Cell, RecordFlags::default(), |writer| {
            cell.save(writer, false);
            refs(writer);
        })
    }

    pub fn build(&self) -> Vec<u8> {
        let header = FileHeader::builder()
            .author("esmstore tests")
            .record_count(self.body.record_count())
            .masters(self.masters.clone())
            .build();
        let mut writer = EsmWriter::new();
        writer.write_file_header(&header).unwrap();
        let mut data = writer.into_inner();
        data.extend_from_slice(&self.body.clone().into_inner());
        data
    }

    pub fn reader(&self, index: usize) -> EsmReader {
        EsmReader::open(Arc::new(self.build()), index, "Test.esm").unwrap()
    }
}

/// The first file is named `Master.esm` so later files can list it as a master.
fn content_files(contents: Vec<ContentBuilder>) -> Vec<ContentFile> {
    contents
        .iter()
        .enumerate()
        .map(|(index, content)| {
            let name = if index == 0 {
                "Master.esm".to_string()
            } else {
                format!("Plugin{index}.esp")
            };
            ContentFile::from_memory(name, content.build())
        })
        .collect()
}

pub(crate) fn load_files_with_readers(
    contents: Vec<ContentBuilder>,
) -> (EsmStore, ReadersCache, ValidationReport) {
    let mut store = EsmStore::new();
    let mut readers = ReadersCache::default();
    let report = load_content(
        &content_files(contents),
        &mut store,
        &mut readers,
        &mut NoProgress,
    )
    .unwrap();
    (store, readers, report)
}

pub(crate) fn load_files(contents: Vec<ContentBuilder>) -> (EsmStore, ValidationReport) {
    let (store, _, report) = load_files_with_readers(contents);
    (store, report)
}
