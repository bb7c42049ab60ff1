use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, SubRecordData};
use crate::records::{EffectEntry, Record};

esm_record! {
    pub struct Potion: Potion {
        model: String => one(b"MODL"),
        icon: String => one(b"TEXT"),
        script: String => one(b"SCRI"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"ALDT"),
        effects: Vec<EffectEntry> => many(b"ENAM"),
    }
}

esm_record! {
    pub struct Apparatus: Apparatus {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"AADT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Book: Book {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"BKDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
        text: String => one(b"TEXT"),
        enchantment: String => one(b"ENAM"),
    }
}

esm_record! {
    pub struct Ingredient: Ingredient {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"IRDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Light: Light {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        icon: String => one(b"ITEX"),
        data: RawBytes => one(b"LHDT"),
        script: String => one(b"SCRI"),
        sound: String => one(b"SNAM"),
    }
}

esm_record! {
    pub struct Lockpick: Lockpick {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"LKDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Miscellaneous: Miscellaneous {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"MCDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Probe: Probe {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"PBDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Repair: Repair {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"RIDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
    }
}

esm_record! {
    pub struct Weapon: Weapon {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"WPDT"),
        script: String => one(b"SCRI"),
        icon: String => one(b"ITEX"),
        enchantment: String => one(b"ENAM"),
    }
}

/// Body part slot covered by a piece of armor or clothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartReference {
    pub part: u8,
    pub male: String,
    pub female: String,
}

fn load_part(parts: &mut Vec<PartReference>, sub: &SubRecordData<'_>) -> Result<(), EsmError> {
    match &sub.tag.to_bytes() {
        b"INDX" => parts.push(PartReference {
            part: sub.parse()?,
            ..Default::default()
        }),
        b"BNAM" => {
            if let Some(part) = parts.last_mut() {
                part.male = sub.parse()?;
            }
        }
        b"CNAM" => {
            if let Some(part) = parts.last_mut() {
                part.female = sub.parse()?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn save_parts(parts: &[PartReference], writer: &mut EsmWriter) {
    for part in parts {
        writer.write_sub(b"INDX", &part.part);
        writer.write_optional(b"BNAM", &part.male);
        writer.write_optional(b"CNAM", &part.female);
    }
}

macro_rules! wearable {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $data:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            pub id: String,
            pub model: String,
            pub name: String,
            pub script: String,
            pub data: RawBytes,
            pub icon: String,
            pub parts: Vec<PartReference>,
            pub enchantment: String,
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
                let mut record = $name::default();
                let mut deleted = false;
                while reader.has_more_subs() {
                    let sub = reader.next_sub()?;
                    match &sub.tag.to_bytes() {
                        b"NAME" => record.id = sub.parse()?,
                        b"MODL" => record.model = sub.parse()?,
                        b"FNAM" => record.name = sub.parse()?,
                        b"SCRI" => record.script = sub.parse()?,
                        $data => record.data = sub.parse()?,
                        b"ITEX" => record.icon = sub.parse()?,
                        b"ENAM" => record.enchantment = sub.parse()?,
                        b"DELE" => deleted = true,
                        _ => load_part(&mut record.parts, &sub)?,
                    }
                }
                Ok((record, deleted))
            }

            fn save(&self, writer: &mut EsmWriter, deleted: bool) {
                writer.write_string(b"NAME", &self.id);
                if deleted {
                    writer.write_sub(b"DELE", &0u32);
                    return;
                }
                writer.write_optional(b"MODL", &self.model);
                writer.write_optional(b"FNAM", &self.name);
                writer.write_optional(b"SCRI", &self.script);
                writer.write_optional($data, &self.data);
                writer.write_optional(b"ITEX", &self.icon);
                save_parts(&self.parts, writer);
                writer.write_optional(b"ENAM", &self.enchantment);
            }
        }
    };
}

wearable!(Armor, Armor, b"AODT");
wearable!(Clothing, Clothing, b"CTDT");

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::esm::RecordFlags;

    #[test]
    fn armor_keeps_part_pairs_and_enchantment() {
        let armor = Armor {
            id: "daedric_cuirass".to_string(),
            name: "Daedric Cuirass".to_string(),
            data: RawBytes(vec![0; 24]),
            parts: vec![
                PartReference {
                    part: 1,
                    male: "a_daedric_chest".to_string(),
                    female: String::new(),
                },
                PartReference {
                    part: 10,
                    male: "a_daedric_pauldron".to_string(),
                    female: "a_daedric_pauldron_f".to_string(),
                },
            ],
            enchantment: "missing_enchant".to_string(),
            ..Default::default()
        };

        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::Armor, RecordFlags::default());
        armor.save(&mut writer, false);
        writer.end_record().unwrap();
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        let (loaded, deleted) = Armor::load(&mut reader).unwrap();
        assert!(!deleted);
        assert_eq!(loaded, armor);
    }

    #[test]
    fn deleted_record_only_carries_its_id() {
        let book = Book {
            id: "bk_lustyargonianmaid".to_string(),
            text: "...".to_string(),
            ..Default::default()
        };
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::Book, RecordFlags::default());
        book.save(&mut writer, true);
        writer.end_record().unwrap();
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        let (loaded, deleted) = Book::load(&mut reader).unwrap();
        assert!(deleted);
        assert_eq!(loaded.id, "bk_lustyargonianmaid");
        assert!(loaded.text.is_empty());
    }
}
