//! Typed TES3 records and their wire encodings.

use std::collections::BTreeMap;
use std::fmt;

use crate::esm::{EsmError, EsmReader, EsmWriter, RecordKind};

/// Defines a record whose subrecords each map onto one struct field.
///
/// Fields are declared as `name: Type => mode(b"TAG")` where `one` stores a
/// single [`SubRecord`](crate::esm::SubRecord) value (skipped on save when
/// unset) and `many` collects every occurrence of the tag into a `Vec`.
macro_rules! esm_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $kind:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $ty:ty => $mode:ident($tag:literal),
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            pub id: String,
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $crate::records::Record for $name {
            const KIND: $crate::esm::RecordKind = $crate::esm::RecordKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn load(
                reader: &mut $crate::esm::EsmReader,
            ) -> Result<(Self, bool), $crate::esm::EsmError> {
                let mut record = Self::default();
                let mut deleted = false;
                while reader.has_more_subs() {
                    let sub = reader.next_sub()?;
                    match &sub.tag.to_bytes() {
                        b"NAME" => record.id = sub.parse()?,
                        b"DELE" => deleted = true,
                        $($tag => esm_record!(@load $mode, record.$field, sub),)*
                        _ => {}
                    }
                }
                Ok((record, deleted))
            }

            fn save(&self, writer: &mut $crate::esm::EsmWriter, deleted: bool) {
                writer.write_string(b"NAME", &self.id);
                if deleted {
                    writer.write_sub(b"DELE", &0u32);
                    return;
                }
                $(esm_record!(@save $mode, writer, $tag, &self.$field);)*
            }
        }
    };
    (@load one, $slot:expr, $sub:ident) => {
        $slot = $sub.parse()?
    };
    (@load many, $slot:expr, $sub:ident) => {
        $slot.push($sub.parse()?)
    };
    (@save one, $writer:ident, $tag:literal, $value:expr) => {
        $writer.write_optional($tag, $value)
    };
    (@save many, $writer:ident, $tag:literal, $value:expr) => {
        for item in $value {
            $writer.write_sub($tag, item);
        }
    };
}

mod actors;
mod cell;
mod dialogue;
mod items;
mod leveled;
mod lua;
mod magic;
mod nested;
mod scripting;
mod world;

pub use actors::{BirthSign, BodyPart, Class, Creature, Faction, InventoryItem, Npc, NpcData, NpcStats, Race};
pub use cell::{Cell, CellData, CellRef, LeasedRef, Position};
pub use dialogue::{DialInfo, Dialogue};
pub use items::{
    Apparatus, Armor, Book, Clothing, Ingredient, Light, Lockpick, Miscellaneous, PartReference,
    Potion, Probe, Repair, Weapon,
};
pub use leveled::{CreatureLevList, ItemLevList, LeveledEntry, LeveledList};
pub use lua::{LuaContent, LuaScriptCfg, LuaScriptsCfg, parse_omw_scripts};
pub use magic::{
    Attribute, EffectEntry, Enchantment, MagicEffect, MagicEffectData, Skill, SkillData, Spell,
};
pub use nested::NestedList;
pub use scripting::{
    GameSetting, Global, GlobalScript, GmstValue, LocalValue, Script, ScriptHeader, ScriptTarget,
    StartScript, TargetRef,
};
pub use world::{
    Activator, Container, Door, Land, LandTexture, Pathgrid, PathgridData, Region, Sound,
    SoundGenerator, Static,
};
pub(crate) use world::exterior_id;

/// A record type held in a generic [`Store`](crate::store::Store).
pub trait Record: Clone + fmt::Debug + Default + PartialEq + 'static {
    const KIND: RecordKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Decode the body of the record the reader is positioned in. The flag is
    /// true when the record is a deletion marker.
    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError>;

    /// Encode the record body. The caller frames the record.
    fn save(&self, writer: &mut EsmWriter, deleted: bool);

    /// Called when a later content file redefines a record that is already
    /// loaded. `previous` is the definition being replaced.
    fn merge(&mut self, _previous: Self) {}

    /// Finalize a collection after a batch of loads.
    fn set_up(_records: &mut BTreeMap<String, Self>) {}
}

/// A record keyed by a fixed numeric index rather than a string id. Loading
/// the same index again overwrites the earlier definition.
pub trait IndexedRecord: Clone + fmt::Debug + PartialEq + 'static {
    const KIND: RecordKind;

    fn index(&self) -> i32;

    fn load(reader: &mut EsmReader) -> Result<Self, EsmError>;

    fn save(&self, writer: &mut EsmWriter);
}

/// Records that may point at a script.
pub trait Scripted {
    fn script(&self) -> &str;

    fn clear_script(&mut self);
}

macro_rules! scripted {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scripted for $ty {
                fn script(&self) -> &str {
                    &self.script
                }

                fn clear_script(&mut self) {
                    self.script.clear();
                }
            }
        )*
    };
}

scripted!(Armor, Book, Clothing, Weapon);

/// Lowercase key used for every id lookup.
pub fn id_key(id: &str) -> String {
    id.to_ascii_lowercase()
}
