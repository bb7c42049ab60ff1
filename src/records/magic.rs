use bon::Builder;
use winnow::Parser;
use winnow::binary::{i8 as le_i8, le_f32, le_i16, le_i32};

use crate::esm::parser_utils::WResult;
use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, SubRecord};
use crate::records::IndexedRecord;

/// One `ENAM` effect of a spell, potion or enchantment.
#[derive(Clone, Debug, PartialEq, Eq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectEntry {
    pub effect_id: i16,
    /// Affected skill, or -1.
    #[builder(default = -1)]
    pub skill: i8,
    /// Affected attribute, or -1.
    #[builder(default = -1)]
    pub attribute: i8,
    #[builder(default)]
    pub range: i32,
    #[builder(default)]
    pub area: i32,
    #[builder(default)]
    pub duration: i32,
    #[builder(default)]
    pub magnitude_min: i32,
    #[builder(default)]
    pub magnitude_max: i32,
}

impl SubRecord for EffectEntry {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(EffectEntry {
            effect_id: le_i16.parse_next(input)?,
            skill: le_i8.parse_next(input)?,
            attribute: le_i8.parse_next(input)?,
            range: le_i32.parse_next(input)?,
            area: le_i32.parse_next(input)?,
            duration: le_i32.parse_next(input)?,
            magnitude_min: le_i32.parse_next(input)?,
            magnitude_max: le_i32.parse_next(input)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.effect_id.to_le_bytes());
        out.extend_from_slice(&self.skill.to_le_bytes());
        out.extend_from_slice(&self.attribute.to_le_bytes());
        for value in [
            self.range,
            self.area,
            self.duration,
            self.magnitude_min,
            self.magnitude_max,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

esm_record! {
    pub struct Spell: Spell {
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"SPDT"),
        effects: Vec<EffectEntry> => many(b"ENAM"),
    }
}

esm_record! {
    pub struct Enchantment: Enchantment {
        data: RawBytes => one(b"ENDT"),
        effects: Vec<EffectEntry> => many(b"ENAM"),
    }
}

/// `MEDT` payload of a magic effect.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MagicEffectData {
    pub school: i32,
    pub base_cost: f32,
    pub flags: i32,
    pub color: [i32; 3],
    pub speed: f32,
    pub size: f32,
    pub size_cap: f32,
}

impl SubRecord for MagicEffectData {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(MagicEffectData {
            school: le_i32.parse_next(input)?,
            base_cost: le_f32.parse_next(input)?,
            flags: le_i32.parse_next(input)?,
            color: [
                le_i32.parse_next(input)?,
                le_i32.parse_next(input)?,
                le_i32.parse_next(input)?,
            ],
            speed: le_f32.parse_next(input)?,
            size: le_f32.parse_next(input)?,
            size_cap: le_f32.parse_next(input)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.school.to_le_bytes());
        out.extend_from_slice(&self.base_cost.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        for channel in self.color {
            out.extend_from_slice(&channel.to_le_bytes());
        }
        out.extend_from_slice(&self.speed.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.size_cap.to_le_bytes());
    }
}

/// A magic effect definition, keyed by its numeric index.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MagicEffect {
    pub index: i32,
    pub data: MagicEffectData,
    pub icon: String,
    pub particle: String,
    pub description: String,
}

impl MagicEffect {
    pub const TARGET_SKILL: i32 = 0x1;
    pub const TARGET_ATTRIBUTE: i32 = 0x2;

    pub fn targets_skill(&self) -> bool {
        self.data.flags & Self::TARGET_SKILL != 0
    }

    pub fn targets_attribute(&self) -> bool {
        self.data.flags & Self::TARGET_ATTRIBUTE != 0
    }

    /// Game setting style name of a built-in effect, e.g. `WaterBreathing`.
    pub fn effect_name(index: i32) -> Option<&'static str> {
        usize::try_from(index)
            .ok()
            .and_then(|index| EFFECT_NAMES.get(index).copied())
    }
}

impl IndexedRecord for MagicEffect {
    const KIND: RecordKind = RecordKind::MagicEffect;

    fn index(&self) -> i32 {
        self.index
    }

    fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut effect = MagicEffect {
            index: reader.get_sub_named(b"INDX")?,
            ..Default::default()
        };
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"MEDT" => effect.data = sub.parse()?,
                b"ITEX" => effect.icon = sub.parse()?,
                b"PTEX" => effect.particle = sub.parse()?,
                b"DESC" => effect.description = sub.parse()?,
                _ => {}
            }
        }
        Ok(effect)
    }

    fn save(&self, writer: &mut EsmWriter) {
        writer.write_sub(b"INDX", &self.index);
        writer.write_sub(b"MEDT", &self.data);
        writer.write_optional(b"ITEX", &self.icon);
        writer.write_optional(b"PTEX", &self.particle);
        writer.write_optional(b"DESC", &self.description);
    }
}

/// `SKDT` payload of a skill.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkillData {
    pub attribute: i32,
    pub specialization: i32,
    pub use_value: [f32; 4],
}

impl SubRecord for SkillData {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(SkillData {
            attribute: le_i32.parse_next(input)?,
            specialization: le_i32.parse_next(input)?,
            use_value: [
                le_f32.parse_next(input)?,
                le_f32.parse_next(input)?,
                le_f32.parse_next(input)?,
                le_f32.parse_next(input)?,
            ],
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.attribute.to_le_bytes());
        out.extend_from_slice(&self.specialization.to_le_bytes());
        for value in self.use_value {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Skill {
    pub index: i32,
    pub data: SkillData,
    pub description: String,
}

impl Skill {
    pub fn skill_name(index: i32) -> Option<&'static str> {
        usize::try_from(index)
            .ok()
            .and_then(|index| SKILL_NAMES.get(index).copied())
    }
}

impl IndexedRecord for Skill {
    const KIND: RecordKind = RecordKind::Skill;

    fn index(&self) -> i32 {
        self.index
    }

    fn load(reader: &mut EsmReader) -> Result<Self, EsmError> {
        let mut skill = Skill {
            index: reader.get_sub_named(b"INDX")?,
            ..Default::default()
        };
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"SKDT" => skill.data = sub.parse()?,
                b"DESC" => skill.description = sub.parse()?,
                _ => {}
            }
        }
        Ok(skill)
    }

    fn save(&self, writer: &mut EsmWriter) {
        writer.write_sub(b"INDX", &self.index);
        writer.write_sub(b"SKDT", &self.data);
        writer.write_optional(b"DESC", &self.description);
    }
}

/// One of the eight character attributes. These have no record in content
/// files and are built in.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    pub index: i32,
    pub name: String,
    /// Game setting holding the display name.
    pub game_setting: String,
}

impl Attribute {
    pub const LENGTH: usize = 8;

    pub fn built_in() -> Vec<Attribute> {
        ATTRIBUTE_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| Attribute {
                index: index as i32,
                name: name.to_string(),
                game_setting: format!("sAttribute{name}"),
            })
            .collect()
    }
}

const ATTRIBUTE_NAMES: [&str; Attribute::LENGTH] = [
    "Strength",
    "Intelligence",
    "Willpower",
    "Agility",
    "Speed",
    "Endurance",
    "Personality",
    "Luck",
];

const SKILL_NAMES: [&str; 27] = [
    "Block",
    "Armorer",
    "MediumArmor",
    "HeavyArmor",
    "BluntWeapon",
    "LongBlade",
    "Axe",
    "Spear",
    "Athletics",
    "Enchant",
    "Destruction",
    "Alteration",
    "Illusion",
    "Conjuration",
    "Mysticism",
    "Restoration",
    "Alchemy",
    "Unarmored",
    "Security",
    "Sneak",
    "Acrobatics",
    "LightArmor",
    "ShortBlade",
    "Marksman",
    "Mercantile",
    "Speechcraft",
    "HandToHand",
];

const EFFECT_NAMES: [&str; 143] = [
    "WaterBreathing",
    "SwiftSwim",
    "WaterWalking",
    "Shield",
    "FireShield",
    "LightningShield",
    "FrostShield",
    "Burden",
    "Feather",
    "Jump",
    "Levitate",
    "SlowFall",
    "Lock",
    "Open",
    "FireDamage",
    "ShockDamage",
    "FrostDamage",
    "DrainAttribute",
    "DrainHealth",
    "DrainMagicka",
    "DrainFatigue",
    "DrainSkill",
    "DamageAttribute",
    "DamageHealth",
    "DamageMagicka",
    "DamageFatigue",
    "DamageSkill",
    "Poison",
    "WeaknessToFire",
    "WeaknessToFrost",
    "WeaknessToShock",
    "WeaknessToMagicka",
    "WeaknessToCommonDisease",
    "WeaknessToBlightDisease",
    "WeaknessToCorprusDisease",
    "WeaknessToPoison",
    "WeaknessToNormalWeapons",
    "DisintegrateWeapon",
    "DisintegrateArmor",
    "Invisibility",
    "Chameleon",
    "Light",
    "Sanctuary",
    "NightEye",
    "Charm",
    "Paralyze",
    "Silence",
    "Blind",
    "Sound",
    "CalmHumanoid",
    "CalmCreature",
    "FrenzyHumanoid",
    "FrenzyCreature",
    "DemoralizeHumanoid",
    "DemoralizeCreature",
    "RallyHumanoid",
    "RallyCreature",
    "Dispel",
    "Soultrap",
    "Telekinesis",
    "Mark",
    "Recall",
    "DivineIntervention",
    "AlmsiviIntervention",
    "DetectAnimal",
    "DetectEnchantment",
    "DetectKey",
    "SpellAbsorption",
    "Reflect",
    "CureCommonDisease",
    "CureBlightDisease",
    "CureCorprusDisease",
    "CurePoison",
    "CureParalyzation",
    "RestoreAttribute",
    "RestoreHealth",
    "RestoreMagicka",
    "RestoreFatigue",
    "RestoreSkill",
    "FortifyAttribute",
    "FortifyHealth",
    "FortifyMagicka",
    "FortifyFatigue",
    "FortifySkill",
    "FortifyMaximumMagicka",
    "AbsorbAttribute",
    "AbsorbHealth",
    "AbsorbMagicka",
    "AbsorbFatigue",
    "AbsorbSkill",
    "ResistFire",
    "ResistFrost",
    "ResistShock",
    "ResistMagicka",
    "ResistCommonDisease",
    "ResistBlightDisease",
    "ResistCorprusDisease",
    "ResistPoison",
    "ResistNormalWeapons",
    "ResistParalysis",
    "RemoveCurse",
    "TurnUndead",
    "SummonScamp",
    "SummonClannfear",
    "SummonDaedroth",
    "SummonDremora",
    "SummonAncestralGhost",
    "SummonSkeletalMinion",
    "SummonBonewalker",
    "SummonGreaterBonewalker",
    "SummonBonelord",
    "SummonWingedTwilight",
    "SummonHunger",
    "SummonGoldenSaint",
    "SummonFlameAtronach",
    "SummonFrostAtronach",
    "SummonStormAtronach",
    "FortifyAttack",
    "CommandCreature",
    "CommandHumanoid",
    "BoundDagger",
    "BoundLongsword",
    "BoundMace",
    "BoundBattleAxe",
    "BoundSpear",
    "BoundLongbow",
    "ExtraSpell",
    "BoundCuirass",
    "BoundHelm",
    "BoundBoots",
    "BoundShield",
    "BoundGloves",
    "Corprus",
    "Vampirism",
    "SummonCenturionSphere",
    "SunDamage",
    "StuntedMagicka",
    "SummonFabricant",
    "SummonWolf",
    "SummonBear",
    "SummonBonewolf",
    "SummonCreature04",
    "SummonCreature05",
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn effect_entry_defaults_to_no_arguments() {
        let effect = EffectEntry::builder().effect_id(14).magnitude_max(10).build();
        assert_eq!(effect.skill, -1);
        assert_eq!(effect.attribute, -1);

        let mut out = Vec::new();
        effect.write(&mut out);
        assert_eq!(out.len(), 24);
        assert_eq!(EffectEntry::parse(&mut &out[..]).unwrap(), effect);
    }

    #[test]
    fn name_tables() {
        assert_eq!(MagicEffect::effect_name(0), Some("WaterBreathing"));
        assert_eq!(MagicEffect::effect_name(142), Some("SummonCreature05"));
        assert_eq!(MagicEffect::effect_name(143), None);
        assert_eq!(MagicEffect::effect_name(-1), None);
        assert_eq!(Skill::skill_name(26), Some("HandToHand"));
        assert_eq!(Attribute::built_in()[7].game_setting, "sAttributeLuck");
    }
}
