use std::fmt;

use crate::esm::FourCc;

macro_rules! record_kinds {
    ($($variant:ident = $tag:literal,)*) => {
        /// Every record kind that can appear in a TES3 content file or save game.
        ///
        /// The discriminant of each variant is its little-endian wire tag.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u32)]
        pub enum RecordKind {
            $($variant = u32::from_le_bytes(*$tag),)*
        }

        impl RecordKind {
            pub const ALL: &[RecordKind] = &[$(RecordKind::$variant,)*];

            pub fn from_tag(tag: FourCc) -> Option<RecordKind> {
                $(
                    if tag.0 == RecordKind::$variant as u32 {
                        return Some(RecordKind::$variant);
                    }
                )*
                None
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(RecordKind::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

record_kinds! {
    Activator = b"ACTI",
    Potion = b"ALCH",
    Apparatus = b"APPA",
    Armor = b"ARMO",
    BodyPart = b"BODY",
    Book = b"BOOK",
    BirthSign = b"BSGN",
    Class = b"CLAS",
    Clothing = b"CLOT",
    Container = b"CONT",
    Creature = b"CREA",
    Dialogue = b"DIAL",
    Door = b"DOOR",
    Enchantment = b"ENCH",
    Faction = b"FACT",
    Global = b"GLOB",
    Ingredient = b"INGR",
    CreatureLevList = b"LEVC",
    ItemLevList = b"LEVI",
    Light = b"LIGH",
    Lockpick = b"LOCK",
    Miscellaneous = b"MISC",
    Npc = b"NPC_",
    Probe = b"PROB",
    Race = b"RACE",
    Region = b"REGN",
    Repair = b"REPA",
    SoundGenerator = b"SNDG",
    Sound = b"SOUN",
    Spell = b"SPEL",
    StartScript = b"SSCR",
    Static = b"STAT",
    Weapon = b"WEAP",
    GameSetting = b"GMST",
    Script = b"SCPT",
    Cell = b"CELL",
    Land = b"LAND",
    LandTexture = b"LTEX",
    Pathgrid = b"PGRD",
    MagicEffect = b"MGEF",
    Skill = b"SKIL",
    DialInfo = b"INFO",
    Filter = b"FILT",
    DebugProfile = b"DBGP",
    LuaScripts = b"LUAL",
    DynamicCount = b"DYNA",
    Header = b"TES3",
    GlobalScript = b"GSCR",
}

impl RecordKind {
    pub fn tag(self) -> FourCc {
        FourCc(self as u32)
    }

    /// Kinds whose identifiers take part in the registry-wide id index.
    pub fn is_cacheable(self) -> bool {
        matches!(
            self,
            RecordKind::Activator
                | RecordKind::Potion
                | RecordKind::Apparatus
                | RecordKind::Armor
                | RecordKind::Book
                | RecordKind::Clothing
                | RecordKind::Container
                | RecordKind::Creature
                | RecordKind::Door
                | RecordKind::Ingredient
                | RecordKind::CreatureLevList
                | RecordKind::ItemLevList
                | RecordKind::Light
                | RecordKind::Lockpick
                | RecordKind::Miscellaneous
                | RecordKind::Npc
                | RecordKind::Probe
                | RecordKind::Repair
                | RecordKind::Static
                | RecordKind::Weapon
                | RecordKind::BodyPart
        )
    }
}

impl From<RecordKind> for FourCc {
    fn from(kind: RecordKind) -> Self {
        kind.tag()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tags_map_back_to_kinds() {
        for kind in RecordKind::ALL {
            assert_eq!(RecordKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(RecordKind::from_tag(FourCc::new(*b"XXXX")), None);
        assert_eq!(RecordKind::Npc.to_string(), "NPC_");
    }

    #[test]
    fn structural_kinds_are_not_cached() {
        assert!(RecordKind::Potion.is_cacheable());
        assert!(RecordKind::BodyPart.is_cacheable());
        for kind in [
            RecordKind::Cell,
            RecordKind::Land,
            RecordKind::Pathgrid,
            RecordKind::Skill,
            RecordKind::MagicEffect,
            RecordKind::Spell,
        ] {
            assert!(!kind.is_cacheable(), "{kind}");
        }
    }
}
