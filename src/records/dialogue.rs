use std::collections::BTreeMap;

use tracing::debug;
use winnow::Parser;
use winnow::binary::u8 as le_u8;

use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, RecordFlags};
use crate::records::Record;

/// One line of a dialogue topic (`INFO`). Infos form a linked list through
/// their `prev`/`next` ids.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DialInfo {
    pub id: String,
    pub prev: String,
    pub next: String,
    pub data: RawBytes,
    pub actor: String,
    pub race: String,
    pub class: String,
    pub faction: String,
    pub cell: String,
    pub pc_faction: String,
    pub sound: String,
    pub response: String,
    pub result_script: String,
    pub deleted: bool,
}

impl DialInfo {
    pub fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut info = DialInfo::default();
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"INAM" => info.id = sub.parse()?,
                b"PNAM" => info.prev = sub.parse()?,
                b"NNAM" => info.next = sub.parse()?,
                b"DATA" => info.data = sub.parse()?,
                b"ONAM" => info.actor = sub.parse()?,
                b"RNAM" => info.race = sub.parse()?,
                b"CNAM" => info.class = sub.parse()?,
                b"FNAM" => info.faction = sub.parse()?,
                b"ANAM" => info.cell = sub.parse()?,
                b"DNAM" => info.pc_faction = sub.parse()?,
                b"SNAM" => info.sound = sub.parse()?,
                b"NAME" => info.response = sub.parse()?,
                b"BNAM" => info.result_script = sub.parse()?,
                b"DELE" => info.deleted = true,
                _ => {}
            }
        }
        Ok(info)
    }

    pub fn save(&self, writer: &mut EsmWriter) {
        writer.write_string(b"INAM", &self.id);
        writer.write_string(b"PNAM", &self.prev);
        writer.write_string(b"NNAM", &self.next);
        if self.deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"DATA", &self.data);
        writer.write_optional(b"ONAM", &self.actor);
        writer.write_optional(b"RNAM", &self.race);
        writer.write_optional(b"CNAM", &self.class);
        writer.write_optional(b"FNAM", &self.faction);
        writer.write_optional(b"ANAM", &self.cell);
        writer.write_optional(b"DNAM", &self.pc_faction);
        writer.write_optional(b"SNAM", &self.sound);
        writer.write_optional(b"NAME", &self.response);
        writer.write_optional(b"BNAM", &self.result_script);
    }
}

/// A dialogue topic, greeting, persuasion response or journal entry.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dialogue {
    pub id: String,
    pub dialogue_type: u8,
    pub infos: Vec<DialInfo>,
}

impl Dialogue {
    pub const TOPIC: u8 = 0;
    pub const VOICE: u8 = 1;
    pub const GREETING: u8 = 2;
    pub const PERSUASION: u8 = 3;
    pub const JOURNAL: u8 = 4;

    /// Read an `INFO` record following this dialogue and splice it into the
    /// info list. A known id is replaced in place, a new one goes after its
    /// `prev` entry, or first when `prev` is empty.
    pub fn read_info(&mut self, reader: &mut EsmReader) -> Result<(), EsmError> {
        let info = DialInfo::load(reader)?;
        if let Some(existing) = self
            .infos
            .iter_mut()
            .find(|existing| existing.id.eq_ignore_ascii_case(&info.id))
        {
            *existing = info;
            return Ok(());
        }

        let position = if info.prev.is_empty() {
            0
        } else {
            match self
                .infos
                .iter()
                .position(|existing| existing.id.eq_ignore_ascii_case(&info.prev))
            {
                Some(index) => index + 1,
                None => {
                    debug!(
                        "Info '{}' in dialogue '{}' follows unknown info '{}'",
                        info.id, self.id, info.prev
                    );
                    self.infos.len()
                }
            }
        };
        self.infos.insert(position, info);
        Ok(())
    }

    pub fn clear_deleted_infos(&mut self) {
        self.infos.retain(|info| !info.deleted);
    }

    /// Write the dialogue record followed by its `INFO` records.
    pub fn save_with_infos(&self, writer: &mut EsmWriter) -> Result<(), EsmError> {
        writer.start_record(RecordKind::Dialogue, RecordFlags::default());
        self.save(writer, false);
        writer.end_record()?;
        for info in &self.infos {
            writer.start_record(RecordKind::DialInfo, RecordFlags::default());
            info.save(writer);
            writer.end_record()?;
        }
        Ok(())
    }
}

impl Record for Dialogue {
    const KIND: RecordKind = RecordKind::Dialogue;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut dialogue = Dialogue::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => dialogue.id = sub.parse()?,
                // Some files store the type widened to four bytes.
                b"DATA" => dialogue.dialogue_type = sub.parse_with(|input| le_u8.parse_next(input))?,
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((dialogue, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_string(b"NAME", &self.id);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_sub(b"DATA", &self.dialogue_type);
    }

    fn merge(&mut self, previous: Self) {
        self.infos = previous.infos;
    }

    fn set_up(records: &mut BTreeMap<String, Self>) {
        for dialogue in records.values_mut() {
            dialogue.clear_deleted_infos();
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn info(id: &str, prev: &str) -> DialInfo {
        DialInfo {
            id: id.to_string(),
            prev: prev.to_string(),
            response: format!("response {id}"),
            ..Default::default()
        }
    }

    fn read_infos(dialogue: &mut Dialogue, infos: &[DialInfo]) {
        let mut writer = EsmWriter::new();
        for info in infos {
            writer.start_record(RecordKind::DialInfo, RecordFlags::default());
            info.save(&mut writer);
            writer.end_record().unwrap();
        }
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        while reader.has_more_records() {
            reader.next_record_header().unwrap();
            dialogue.read_info(&mut reader).unwrap();
        }
    }

    #[test]
    fn infos_are_spliced_after_their_predecessor() {
        let mut dialogue = Dialogue {
            id: "background".to_string(),
            ..Default::default()
        };
        read_infos(&mut dialogue, &[info("1", ""), info("2", "1"), info("3", "2")]);
        read_infos(&mut dialogue, &[info("4", "1")]);

        let order: Vec<&str> = dialogue.infos.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, ["1", "4", "2", "3"]);
    }

    #[test]
    fn deleted_infos_are_dropped_on_set_up() {
        let mut dialogue = Dialogue {
            id: "greeting 0".to_string(),
            dialogue_type: Dialogue::GREETING,
            ..Default::default()
        };
        read_infos(&mut dialogue, &[info("1", ""), info("2", "1")]);
        let mut removed = info("2", "1");
        removed.deleted = true;
        read_infos(&mut dialogue, &[removed]);
        assert_eq!(dialogue.infos.len(), 2);

        let mut records = BTreeMap::new();
        records.insert("greeting 0".to_string(), dialogue);
        Dialogue::set_up(&mut records);
        assert_eq!(records["greeting 0"].infos.len(), 1);
    }

    #[test]
    fn redefinition_keeps_loaded_infos() {
        let mut original = Dialogue {
            id: "Rumors".to_string(),
            ..Default::default()
        };
        read_infos(&mut original, &[info("1", "")]);
        let mut replacement = Dialogue {
            id: "rumors".to_string(),
            dialogue_type: Dialogue::TOPIC,
            ..Default::default()
        };
        replacement.merge(original);
        assert_eq!(replacement.infos.len(), 1);
    }
}
