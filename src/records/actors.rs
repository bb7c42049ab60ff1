use winnow::Parser;
use winnow::binary::{le_i16, le_i32, le_u16, u8 as le_u8};
use winnow::token::take;

use crate::esm::parser_utils::{WResult, parse_fixed_string, write_fixed_string};
use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, SubRecord};
use crate::records::Record;

const ITEM_ID_WIDTH: usize = 32;

/// An `NPCO` inventory entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryItem {
    pub count: i32,
    pub item: String,
}

impl SubRecord for InventoryItem {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        let count = le_i32.parse_next(input)?;
        let item = parse_fixed_string(ITEM_ID_WIDTH).parse_next(input)?;
        Ok(InventoryItem { count, item })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.count.to_le_bytes());
        write_fixed_string(out, &self.item, ITEM_ID_WIDTH);
    }
}

esm_record! {
    pub struct Class: Class {
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"CLDT"),
        description: String => one(b"DESC"),
    }
}

esm_record! {
    pub struct Race: Race {
        name: String => one(b"FNAM"),
        data: RawBytes => one(b"RADT"),
        powers: Vec<String> => many(b"NPCS"),
        description: String => one(b"DESC"),
    }
}

esm_record! {
    pub struct BirthSign: BirthSign {
        name: String => one(b"FNAM"),
        texture: String => one(b"TNAM"),
        description: String => one(b"DESC"),
        powers: Vec<String> => many(b"NPCS"),
    }
}

esm_record! {
    pub struct BodyPart: BodyPart {
        model: String => one(b"MODL"),
        race: String => one(b"FNAM"),
        data: RawBytes => one(b"BYDT"),
    }
}

esm_record! {
    pub struct Creature: Creature {
        model: String => one(b"MODL"),
        original: String => one(b"CNAM"),
        name: String => one(b"FNAM"),
        script: String => one(b"SCRI"),
        data: RawBytes => one(b"NPDT"),
        flags: u32 => one(b"FLAG"),
        scale: Option<f32> => one(b"XSCL"),
        inventory: Vec<InventoryItem> => many(b"NPCO"),
        spells: Vec<String> => many(b"NPCS"),
        ai_data: Option<RawBytes> => one(b"AIDT"),
    }
}

/// Faction membership, ranks and reactions towards other factions.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Faction {
    pub id: String,
    pub name: String,
    pub ranks: Vec<String>,
    pub data: RawBytes,
    pub reactions: Vec<(String, i32)>,
}

impl Record for Faction {
    const KIND: RecordKind = RecordKind::Faction;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut faction = Faction::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => faction.id = sub.parse()?,
                b"FNAM" => faction.name = sub.parse()?,
                b"RNAM" => faction.ranks.push(sub.parse()?),
                b"FADT" => faction.data = sub.parse()?,
                b"ANAM" => faction.reactions.push((sub.parse()?, 0)),
                b"INTV" => {
                    let reaction: i32 = sub.parse()?;
                    if let Some(last) = faction.reactions.last_mut() {
                        last.1 = reaction;
                    }
                }
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((faction, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_string(b"NAME", &self.id);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"FNAM", &self.name);
        for rank in &self.ranks {
            writer.write_string(b"RNAM", rank);
        }
        writer.write_optional(b"FADT", &self.data);
        for (faction, reaction) in &self.reactions {
            writer.write_string(b"ANAM", faction);
            writer.write_sub(b"INTV", reaction);
        }
    }
}

/// Attributes, skills and derived stats stored when an NPC does not
/// auto-calculate them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NpcStats {
    pub attributes: [u8; 8],
    pub skills: [u8; 27],
    pub health: u16,
    pub mana: u16,
    pub fatigue: u16,
}

/// `NPDT`, either the 52 byte full layout or the 12 byte auto-calculated one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NpcData {
    pub level: i16,
    pub disposition: u8,
    pub reputation: u8,
    pub rank: u8,
    pub gold: i32,
    /// `None` for auto-calculated NPCs.
    pub stats: Option<NpcStats>,
}

const NPDT_FULL_SIZE: usize = 52;

fn parse_full_npc_data(input: &mut &[u8]) -> WResult<NpcData> {
    let level = le_i16.parse_next(input)?;
    let mut stats = NpcStats::default();
    stats
        .attributes
        .copy_from_slice(take(8usize).parse_next(input)?);
    stats.skills.copy_from_slice(take(27usize).parse_next(input)?);
    let _unknown = le_u8.parse_next(input)?;
    stats.health = le_u16.parse_next(input)?;
    stats.mana = le_u16.parse_next(input)?;
    stats.fatigue = le_u16.parse_next(input)?;
    let disposition = le_u8.parse_next(input)?;
    let reputation = le_u8.parse_next(input)?;
    let rank = le_u8.parse_next(input)?;
    let _unknown = le_u8.parse_next(input)?;
    let gold = le_i32.parse_next(input)?;
    Ok(NpcData {
        level,
        disposition,
        reputation,
        rank,
        gold,
        stats: Some(stats),
    })
}

fn parse_autocalc_npc_data(input: &mut &[u8]) -> WResult<NpcData> {
    let level = le_i16.parse_next(input)?;
    let disposition = le_u8.parse_next(input)?;
    let reputation = le_u8.parse_next(input)?;
    let rank = le_u8.parse_next(input)?;
    let _unknown: &[u8] = take(3usize).parse_next(input)?;
    let gold = le_i32.parse_next(input)?;
    Ok(NpcData {
        level,
        disposition,
        reputation,
        rank,
        gold,
        stats: None,
    })
}

impl SubRecord for NpcData {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        if input.len() >= NPDT_FULL_SIZE {
            parse_full_npc_data(input)
        } else {
            parse_autocalc_npc_data(input)
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.level.to_le_bytes());
        match &self.stats {
            Some(stats) => {
                out.extend_from_slice(&stats.attributes);
                out.extend_from_slice(&stats.skills);
                out.push(0);
                out.extend_from_slice(&stats.health.to_le_bytes());
                out.extend_from_slice(&stats.mana.to_le_bytes());
                out.extend_from_slice(&stats.fatigue.to_le_bytes());
                out.extend_from_slice(&[self.disposition, self.reputation, self.rank, 0]);
            }
            None => {
                out.extend_from_slice(&[self.disposition, self.reputation, self.rank, 0, 0, 0]);
            }
        }
        out.extend_from_slice(&self.gold.to_le_bytes());
    }
}

/// A non-player character, and the player itself under the id `player`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Npc {
    pub id: String,
    pub model: String,
    pub name: String,
    pub race: String,
    pub class: String,
    pub faction: String,
    pub head: String,
    pub hair: String,
    pub script: String,
    pub data: NpcData,
    pub flags: u32,
    pub inventory: Vec<InventoryItem>,
    pub spells: Vec<String>,
    pub ai_data: Option<RawBytes>,
}

impl Npc {
    pub fn is_player(&self) -> bool {
        self.id.eq_ignore_ascii_case("player")
    }
}

impl Record for Npc {
    const KIND: RecordKind = RecordKind::Npc;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut npc = Npc::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => npc.id = sub.parse()?,
                b"MODL" => npc.model = sub.parse()?,
                b"FNAM" => npc.name = sub.parse()?,
                b"RNAM" => npc.race = sub.parse()?,
                b"CNAM" => npc.class = sub.parse()?,
                b"ANAM" => npc.faction = sub.parse()?,
                b"BNAM" => npc.head = sub.parse()?,
                b"KNAM" => npc.hair = sub.parse()?,
                b"SCRI" => npc.script = sub.parse()?,
                b"NPDT" => npc.data = sub.parse()?,
                b"FLAG" => npc.flags = sub.parse()?,
                b"NPCO" => npc.inventory.push(sub.parse()?),
                b"NPCS" => npc.spells.push(sub.parse()?),
                b"AIDT" => npc.ai_data = Some(sub.parse()?),
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((npc, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_string(b"NAME", &self.id);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"MODL", &self.model);
        writer.write_optional(b"FNAM", &self.name);
        writer.write_string(b"RNAM", &self.race);
        writer.write_string(b"CNAM", &self.class);
        writer.write_optional(b"ANAM", &self.faction);
        writer.write_optional(b"BNAM", &self.head);
        writer.write_optional(b"KNAM", &self.hair);
        writer.write_optional(b"SCRI", &self.script);
        writer.write_sub(b"NPDT", &self.data);
        writer.write_sub(b"FLAG", &self.flags);
        for item in &self.inventory {
            writer.write_sub(b"NPCO", item);
        }
        for spell in &self.spells {
            writer.write_string(b"NPCS", spell);
        }
        writer.write_optional(b"AIDT", &self.ai_data);
    }
}
