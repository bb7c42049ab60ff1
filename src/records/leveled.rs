use crate::esm::{EsmError, EsmReader, EsmWriter, RecordKind};
use crate::records::Record;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeveledEntry {
    pub id: String,
    pub level: u16,
}

/// Shared view of creature and item leveled lists.
pub trait LeveledList: Record {
    fn entries(&self) -> &[LeveledEntry];

    fn entries_mut(&mut self) -> &mut Vec<LeveledEntry>;
}

macro_rules! leveled_list {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $entry_tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            pub id: String,
            pub flags: u32,
            pub chance_none: u8,
            pub entries: Vec<LeveledEntry>,
        }

        impl Record for $name {
            const KIND: RecordKind = RecordKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
                let mut list = $name::default();
                let mut deleted = false;
                while reader.has_more_subs() {
                    let sub = reader.next_sub()?;
                    match &sub.tag.to_bytes() {
                        b"NAME" => list.id = sub.parse()?,
                        b"DATA" => list.flags = sub.parse()?,
                        b"NNAM" => list.chance_none = sub.parse()?,
                        $entry_tag => list.entries.push(LeveledEntry {
                            id: sub.parse()?,
                            level: 0,
                        }),
                        b"INTV" => {
                            let level: u16 = sub.parse()?;
                            if let Some(entry) = list.entries.last_mut() {
                                entry.level = level;
                            }
                        }
                        b"DELE" => deleted = true,
                        _ => {}
                    }
                }
                Ok((list, deleted))
            }

            fn save(&self, writer: &mut EsmWriter, deleted: bool) {
                writer.write_string(b"NAME", &self.id);
                if deleted {
                    writer.write_sub(b"DELE", &0u32);
                    return;
                }
                writer.write_sub(b"DATA", &self.flags);
                writer.write_sub(b"NNAM", &self.chance_none);
                writer.write_sub(b"INDX", &(self.entries.len() as u32));
                for entry in &self.entries {
                    writer.write_string($entry_tag, &entry.id);
                    writer.write_sub(b"INTV", &entry.level);
                }
            }
        }

        impl LeveledList for $name {
            fn entries(&self) -> &[LeveledEntry] {
                &self.entries
            }

            fn entries_mut(&mut self) -> &mut Vec<LeveledEntry> {
                &mut self.entries
            }
        }
    };
}

leveled_list!(CreatureLevList, CreatureLevList, b"CNAM");
leveled_list!(ItemLevList, ItemLevList, b"INAM");

impl CreatureLevList {
    pub const ALL_LEVELS: u32 = 0x01;
}

impl ItemLevList {
    pub const EACH: u32 = 0x01;
    pub const ALL_LEVELS: u32 = 0x02;
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::esm::RecordFlags;

    #[test]
    fn entries_pair_ids_with_levels() {
        let list = ItemLevList {
            id: "random_loot".to_string(),
            flags: ItemLevList::EACH,
            chance_none: 25,
            entries: vec![
                LeveledEntry {
                    id: "gold_001".to_string(),
                    level: 1,
                },
                LeveledEntry {
                    id: "iron dagger".to_string(),
                    level: 3,
                },
            ],
        };
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::ItemLevList, RecordFlags::default());
        list.save(&mut writer, false);
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        let (loaded, deleted) = ItemLevList::load(&mut reader).unwrap();
        assert!(!deleted);
        assert_eq!(loaded, list);
        assert_eq!(loaded.entries()[1].level, 3);
    }

    #[test]
    fn entry_count_is_not_trusted() {
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::ItemLevList, RecordFlags::default());
        writer.write_string(b"NAME", "random_gold");
        writer.write_sub(b"DATA", &0u32);
        writer.write_sub(b"NNAM", &0u8);
        writer.write_sub(b"INDX", &u32::MAX);
        writer.write_string(b"INAM", "gold_001");
        writer.write_sub(b"INTV", &1u16);
        writer.end_record().unwrap();

        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        let (loaded, _) = ItemLevList::load(&mut reader).unwrap();
        assert_eq!(loaded.entries().len(), 1);
        assert_eq!(loaded.entries()[0].id, "gold_001");
    }
}
