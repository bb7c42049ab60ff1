use winnow::Parser;
use winnow::binary::{le_i32, le_u16};

use crate::esm::parser_utils::WResult;
use crate::esm::{EsmError, EsmReader, EsmWriter, RawBytes, RecordKind, SubRecord};
use crate::records::{InventoryItem, Record};

esm_record! {
    pub struct Activator: Activator {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        script: String => one(b"SCRI"),
    }
}

esm_record! {
    pub struct Container: Container {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        weight: f32 => one(b"CNDT"),
        flags: u32 => one(b"FLAG"),
        script: String => one(b"SCRI"),
        inventory: Vec<InventoryItem> => many(b"NPCO"),
    }
}

esm_record! {
    pub struct Door: Door {
        model: String => one(b"MODL"),
        name: String => one(b"FNAM"),
        script: String => one(b"SCRI"),
        open_sound: String => one(b"SNAM"),
        close_sound: String => one(b"ANAM"),
    }
}

esm_record! {
    pub struct Static: Static {
        model: String => one(b"MODL"),
    }
}

esm_record! {
    pub struct Region: Region {
        name: String => one(b"FNAM"),
        weather: RawBytes => one(b"WEAT"),
        sleep_list: String => one(b"BNAM"),
        map_color: Option<u32> => one(b"CNAM"),
        sounds: Vec<RawBytes> => many(b"SNAM"),
    }
}

esm_record! {
    pub struct Sound: Sound {
        file: String => one(b"FNAM"),
        data: RawBytes => one(b"DATA"),
    }
}

esm_record! {
    pub struct SoundGenerator: SoundGenerator {
        sound_type: i32 => one(b"DATA"),
        creature: String => one(b"CNAM"),
        sound: String => one(b"SNAM"),
    }
}

esm_record! {
    /// A terrain texture. The index is local to the content file that defines it.
    pub struct LandTexture: LandTexture {
        index: u32 => one(b"INTV"),
        texture: String => one(b"DATA"),
    }
}

/// Id used for both exterior cells and the records attached to them.
pub(crate) fn exterior_id(x: i32, y: i32) -> String {
    format!("#{x} {y}")
}

/// Terrain for one exterior cell. Only the grid position and data flags are
/// decoded; height and texture data is kept verbatim.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Land {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub flags: i32,
    pub data: Vec<(crate::esm::FourCc, RawBytes)>,
}

fn parse_grid(input: &mut &[u8]) -> WResult<(i32, i32)> {
    Ok((le_i32.parse_next(input)?, le_i32.parse_next(input)?))
}

impl Record for Land {
    const KIND: RecordKind = RecordKind::Land;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut land = Land::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"INTV" => (land.x, land.y) = sub.parse_with(parse_grid)?,
                b"DATA" => land.flags = sub.parse()?,
                b"DELE" => deleted = true,
                _ => land.data.push((sub.tag, sub.parse()?)),
            }
        }
        land.id = exterior_id(land.x, land.y);
        Ok((land, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        let mut grid = Vec::with_capacity(8);
        grid.extend_from_slice(&self.x.to_le_bytes());
        grid.extend_from_slice(&self.y.to_le_bytes());
        writer.write_sub_raw(b"INTV", &grid);
        writer.write_sub(b"DATA", &self.flags);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        for (tag, payload) in &self.data {
            writer.write_sub_raw(&tag.to_bytes(), &payload.0);
        }
    }
}

/// `DATA` of a path grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathgridData {
    pub x: i32,
    pub y: i32,
    pub granularity: u16,
    pub points: u16,
}

impl SubRecord for PathgridData {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(PathgridData {
            x: le_i32.parse_next(input)?,
            y: le_i32.parse_next(input)?,
            granularity: le_u16.parse_next(input)?,
            points: le_u16.parse_next(input)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.granularity.to_le_bytes());
        out.extend_from_slice(&self.points.to_le_bytes());
    }
}

/// AI navigation graph of a cell. Exterior grids (non-zero grid position) are
/// keyed like their exterior cell, interior ones by cell name.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pathgrid {
    pub id: String,
    pub cell: String,
    pub data: PathgridData,
    pub points: RawBytes,
    pub edges: RawBytes,
}

impl Record for Pathgrid {
    const KIND: RecordKind = RecordKind::Pathgrid;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut grid = Pathgrid::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"DATA" => grid.data = sub.parse()?,
                b"NAME" => grid.cell = sub.parse()?,
                b"PGRP" => grid.points = sub.parse()?,
                b"PGRC" => grid.edges = sub.parse()?,
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        grid.id = if grid.data.x != 0 || grid.data.y != 0 {
            exterior_id(grid.data.x, grid.data.y)
        } else {
            grid.cell.clone()
        };
        Ok((grid, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_sub(b"DATA", &self.data);
        writer.write_string(b"NAME", &self.cell);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"PGRP", &self.points);
        writer.write_optional(b"PGRC", &self.edges);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::esm::RecordFlags;

    fn reload<T: Record>(record: &T) -> T {
        let mut writer = EsmWriter::new();
        writer.start_record(T::KIND, RecordFlags::default());
        record.save(&mut writer, false);
        writer.end_record().unwrap();
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        T::load(&mut reader).unwrap().0
    }

    #[test]
    fn land_and_pathgrid_ids_come_from_the_grid() {
        let land = Land {
            x: -2,
            y: 7,
            flags: 1,
            data: vec![(crate::esm::FourCc::new(*b"VHGT"), RawBytes(vec![1, 2, 3]))],
            ..Default::default()
        };
        let loaded = reload(&land);
        assert_eq!(loaded.id, "#-2 7");
        assert_eq!(loaded.data, land.data);

        let interior = Pathgrid {
            cell: "Balmora, Guild of Mages".to_string(),
            ..Default::default()
        };
        assert_eq!(reload(&interior).id, "Balmora, Guild of Mages");

        let exterior = Pathgrid {
            cell: "Bitter Coast Region".to_string(),
            data: PathgridData {
                x: 3,
                y: -4,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(reload(&exterior).id, "#3 -4");
    }

    #[test]
    fn container_inventory() {
        let chest = Container {
            id: "chest_small_01".to_string(),
            weight: 50.0,
            inventory: vec![
                InventoryItem {
                    count: 25,
                    item: "gold_001".to_string(),
                },
                InventoryItem {
                    count: 1,
                    item: "random_loot".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(reload(&chest), chest);
    }
}
