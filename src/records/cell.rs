//! Cells and the object references placed in them.
//!
//! A cell record is followed in the content file by the list of references it
//! contains. Those are not decoded at load time; the cell only remembers where
//! they start (one [`ReaderContext`] per content file that touches the cell)
//! so the references can be replayed later through a
//! [`ReadersCache`](crate::esm::ReadersCache).
//!
//! A reference moved into another exterior cell is announced with an `MVRF`
//! subrecord naming its placement number, optionally followed by `CNDT` with
//! the target grid and the `FRMR` block of the moved reference. The source cell
//! keeps the placement number so it can skip the stale copy; the target cell
//! receives the reference as a leased reference.

use std::collections::BTreeMap;

use bon::Builder;
use tracing::warn;
use winnow::Parser;
use winnow::binary::{le_f32, le_i32, le_u32};

use crate::esm::parser_utils::WResult;
use crate::esm::{
    EsmError, EsmReader, EsmWriter, RawBytes, ReaderContext, RecordKind, RefNum, SubRecord,
};
use crate::records::world::exterior_id;
use crate::records::{Record, id_key};

/// `DATA` of a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellData {
    pub flags: u32,
    pub x: i32,
    pub y: i32,
}

impl CellData {
    pub const INTERIOR: u32 = 0x01;
    pub const HAS_WATER: u32 = 0x02;
    pub const NO_SLEEP: u32 = 0x04;
    pub const QUASI_EXTERIOR: u32 = 0x80;
}

impl SubRecord for CellData {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        Ok(CellData {
            flags: le_u32.parse_next(input)?,
            x: le_i32.parse_next(input)?,
            y: le_i32.parse_next(input)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub pos: [f32; 3],
    pub rot: [f32; 3],
}

impl SubRecord for Position {
    fn parse(input: &mut &[u8]) -> WResult<Self> {
        let mut values = [0f32; 6];
        for value in &mut values {
            *value = le_f32.parse_next(input)?;
        }
        Ok(Position {
            pos: [values[0], values[1], values[2]],
            rot: [values[3], values[4], values[5]],
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        for value in self.pos.iter().chain(&self.rot) {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// One placed object inside a cell.
#[derive(Clone, Debug, Default, PartialEq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellRef {
    pub ref_num: RefNum,
    #[builder(into)]
    pub ref_id: String,
    pub scale: Option<f32>,
    pub position: Option<Position>,
    #[builder(default, into)]
    pub owner: String,
    pub count: Option<i32>,
}

impl CellRef {
    /// Read an `FRMR` block: the placement number and every subrecord up to
    /// the next reference.
    pub fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let raw: u32 = reader.get_sub_named(b"FRMR")?;
        let mut cell_ref = CellRef {
            ref_num: reader.adjust_ref_num(raw),
            ..Default::default()
        };
        let mut deleted = false;
        while reader.has_more_subs() && !reader.is_next_sub(b"FRMR") && !reader.is_next_sub(b"MVRF")
        {
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => cell_ref.ref_id = sub.parse()?,
                b"XSCL" => cell_ref.scale = Some(sub.parse()?),
                b"DATA" => cell_ref.position = Some(sub.parse()?),
                b"ANAM" => cell_ref.owner = sub.parse()?,
                b"NAM9" => cell_ref.count = Some(sub.parse()?),
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        Ok((cell_ref, deleted))
    }

    /// Write the reference as placed by the file being written.
    pub fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_sub(b"FRMR", &(self.ref_num.index & 0x00ff_ffff));
        writer.write_string(b"NAME", &self.ref_id);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"XSCL", &self.scale);
        writer.write_optional(b"ANAM", &self.owner);
        writer.write_optional(b"NAM9", &self.count);
        writer.write_optional(b"DATA", &self.position);
    }
}

/// A reference moved into a cell from another one.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeasedRef {
    pub cell_ref: CellRef,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct PendingLease {
    target: (i32, i32),
    lease: LeasedRef,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    pub id: String,
    pub name: String,
    pub data: CellData,
    pub region: String,
    pub water_height: Option<f32>,
    pub map_color: Option<u32>,
    pub ambient: Option<RawBytes>,
    pub ref_num_counter: Option<u32>,
    /// Where each contributing content file's reference list starts.
    pub context_list: Vec<ReaderContext>,
    /// Placement numbers that moved out of this cell.
    pub moved_refs: Vec<RefNum>,
    pub leased_refs: Vec<LeasedRef>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pending_leases: Vec<PendingLease>,
}

impl Cell {
    pub fn interior(name: impl Into<String>) -> Self {
        let name = name.into();
        Cell {
            id: name.clone(),
            name,
            data: CellData {
                flags: CellData::INTERIOR,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn exterior(x: i32, y: i32) -> Self {
        Cell {
            id: exterior_id(x, y),
            data: CellData { flags: 0, x, y },
            ..Default::default()
        }
    }

    pub fn is_exterior(&self) -> bool {
        self.data.flags & CellData::INTERIOR == 0
    }

    pub fn grid(&self) -> (i32, i32) {
        (self.data.x, self.data.y)
    }

    /// Position `reader` at the start of the reference list saved at `index`.
    pub fn restore(&self, reader: &mut EsmReader, index: usize) {
        if let Some(context) = self.context_list.get(index) {
            reader.restore(context);
        }
    }

    /// Next live or deleted reference, skipping references announced as moved.
    pub fn next_ref(reader: &mut EsmReader) -> Result<Option<(CellRef, bool)>, EsmError> {
        while reader.is_next_sub(b"MVRF") {
            reader.skip_sub()?;
            if reader.is_next_sub(b"CNDT") {
                reader.skip_sub()?;
            }
            if !reader.is_next_sub(b"FRMR") {
                return Ok(None);
            }
            CellRef::load(reader)?;
        }
        if reader.is_next_sub(b"FRMR") {
            return CellRef::load(reader).map(Some);
        }
        Ok(None)
    }

    fn scan_moved_refs(&mut self, reader: &mut EsmReader) -> Result<(), EsmError> {
        while reader.has_more_subs() {
            if !reader.is_next_sub(b"MVRF") {
                reader.skip_sub()?;
                continue;
            }
            let raw: u32 = reader.get_sub_named(b"MVRF")?;
            let ref_num = reader.adjust_ref_num(raw);
            self.moved_refs.push(ref_num);

            let target = if reader.is_next_sub(b"CNDT") {
                let sub = reader.next_sub()?;
                Some(sub.parse_with(|input: &mut &[u8]| {
                    Ok((le_i32.parse_next(input)?, le_i32.parse_next(input)?))
                })?)
            } else {
                None
            };
            if reader.is_next_sub(b"FRMR") {
                let (cell_ref, deleted) = CellRef::load(reader)?;
                if let Some(target) = target {
                    self.pending_leases.push(PendingLease {
                        target,
                        lease: LeasedRef { cell_ref, deleted },
                    });
                }
            }
        }
        Ok(())
    }
}

impl Record for Cell {
    const KIND: RecordKind = RecordKind::Cell;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn load(reader: &mut EsmReader) -> Result<(Self, bool), EsmError> {
        let mut cell = Cell::default();
        let mut deleted = false;
        while reader.has_more_subs() {
            if reader.is_next_sub(b"FRMR") || reader.is_next_sub(b"MVRF") {
                cell.context_list.push(reader.context());
                cell.scan_moved_refs(reader)?;
                break;
            }
            let sub = reader.next_sub()?;
            match &sub.tag.to_bytes() {
                b"NAME" => cell.name = sub.parse()?,
                b"DATA" => cell.data = sub.parse()?,
                b"RGNN" => cell.region = sub.parse()?,
                b"WHGT" => cell.water_height = Some(sub.parse()?),
                b"INTV" => cell.water_height = Some(sub.parse::<i32>()? as f32),
                b"NAM5" => cell.map_color = Some(sub.parse()?),
                b"AMBI" => cell.ambient = Some(sub.parse()?),
                b"NAM0" => cell.ref_num_counter = Some(sub.parse()?),
                b"DELE" => deleted = true,
                _ => {}
            }
        }
        cell.id = if cell.is_exterior() {
            exterior_id(cell.data.x, cell.data.y)
        } else {
            cell.name.clone()
        };
        Ok((cell, deleted))
    }

    fn save(&self, writer: &mut EsmWriter, deleted: bool) {
        writer.write_string(b"NAME", &self.name);
        writer.write_sub(b"DATA", &self.data);
        if deleted {
            writer.write_sub(b"DELE", &0u32);
            return;
        }
        writer.write_optional(b"RGNN", &self.region);
        writer.write_optional(b"WHGT", &self.water_height);
        writer.write_optional(b"NAM5", &self.map_color);
        writer.write_optional(b"AMBI", &self.ambient);
        writer.write_optional(b"NAM0", &self.ref_num_counter);
    }

    fn merge(&mut self, previous: Self) {
        let mut contexts = previous.context_list;
        contexts.append(&mut self.context_list);
        self.context_list = contexts;

        let mut moved = previous.moved_refs;
        moved.append(&mut self.moved_refs);
        self.moved_refs = moved;

        let mut leased = previous.leased_refs;
        leased.append(&mut self.leased_refs);
        self.leased_refs = leased;

        let mut pending = previous.pending_leases;
        pending.append(&mut self.pending_leases);
        self.pending_leases = pending;
    }

    fn set_up(records: &mut BTreeMap<String, Self>) {
        let pending: Vec<PendingLease> = records
            .values_mut()
            .flat_map(|cell| std::mem::take(&mut cell.pending_leases))
            .collect();
        for PendingLease { target, lease } in pending {
            let key = id_key(&exterior_id(target.0, target.1));
            match records.get_mut(&key) {
                Some(cell) => cell.leased_refs.push(lease),
                None => warn!(
                    "Reference '{}' ({}) moved into missing cell {key}",
                    lease.cell_ref.ref_id, lease.cell_ref.ref_num
                ),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::esm::RecordFlags;

    fn cell_with_refs(cell: &Cell, body: impl FnOnce(&mut EsmWriter)) -> EsmReader {
        let mut writer = EsmWriter::new();
        writer.start_record(RecordKind::Cell, RecordFlags::default());
        cell.save(&mut writer, false);
        body(&mut writer);
        writer.end_record().unwrap();
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "test");
        reader.next_record_header().unwrap();
        reader
    }

    #[test]
    fn references_are_replayed_from_the_saved_context() {
        let mut reader = cell_with_refs(&Cell::interior("Arrille's Tradehouse"), |writer| {
            CellRef::builder()
                .ref_num(RefNum { index: 1, content_file: 0 })
                .ref_id("gold_001")
                .count(15)
                .build()
                .save(writer, false);
            CellRef::builder()
                .ref_num(RefNum { index: 2, content_file: 0 })
                .ref_id("arrille")
                .build()
                .save(writer, true);
        });
        let (cell, deleted) = Cell::load(&mut reader).unwrap();
        assert!(!deleted);
        assert_eq!(cell.id, "Arrille's Tradehouse");
        assert!(!cell.is_exterior());
        assert_eq!(cell.context_list.len(), 1);

        cell.restore(&mut reader, 0);
        let (first, deleted) = Cell::next_ref(&mut reader).unwrap().unwrap();
        assert_eq!(first.ref_id, "gold_001");
        assert_eq!(first.count, Some(15));
        assert!(!deleted);
        let (second, deleted) = Cell::next_ref(&mut reader).unwrap().unwrap();
        assert_eq!(second.ref_id, "arrille");
        assert!(deleted);
        assert!(Cell::next_ref(&mut reader).unwrap().is_none());
    }

    #[test]
    fn moved_references_lease_into_their_target() {
        let mut reader = cell_with_refs(&Cell::exterior(-3, -2), |writer| {
            writer.write_sub(b"MVRF", &7u32);
            let mut grid = Vec::new();
            grid.extend_from_slice(&(-2i32).to_le_bytes());
            grid.extend_from_slice(&(-9i32).to_le_bytes());
            writer.write_sub_raw(b"CNDT", &grid);
            CellRef::builder()
                .ref_num(RefNum { index: 7, content_file: 0 })
                .ref_id("mudcrab")
                .build()
                .save(writer, false);
            CellRef::builder()
                .ref_num(RefNum { index: 8, content_file: 0 })
                .ref_id("flora_kelp_01")
                .build()
                .save(writer, false);
        });
        let (source, _) = Cell::load(&mut reader).unwrap();
        assert_eq!(source.id, "#-3 -2");
        assert_eq!(source.moved_refs, vec![RefNum { index: 7, content_file: 0 }]);

        source.restore(&mut reader, 0);
        let (kept, _) = Cell::next_ref(&mut reader).unwrap().unwrap();
        assert_eq!(kept.ref_id, "flora_kelp_01");

        let mut cells = BTreeMap::new();
        cells.insert(id_key(&source.id), source);
        cells.insert("#-2 -9".to_string(), Cell::exterior(-2, -9));
        Cell::set_up(&mut cells);
        let target = &cells["#-2 -9"];
        assert_eq!(target.leased_refs.len(), 1);
        assert_eq!(target.leased_refs[0].cell_ref.ref_id, "mudcrab");

        // Pending leases are consumed once.
        Cell::set_up(&mut cells);
        assert_eq!(cells["#-2 -9"].leased_refs.len(), 1);
    }
}
