//! Record collections and the registry that owns them.
//!
//! Every record type lives in a [`Store`] with two partitions: static records
//! loaded from content files and dynamic records created or edited during a
//! session. Lookups are case-insensitive and a dynamic record shadows the
//! static record with the same id.

use std::collections::{BTreeMap, BTreeSet};

use itertools::{EitherOrBoth, Itertools};

use crate::error::ErrorKind;
use crate::esm::{EsmError, EsmReader, EsmWriter, RecordFlags, RecordKind};
use crate::loading::Listener;
use crate::records::{Cell, Record, exterior_id, id_key};

mod indexed;
mod refcount;
mod registry;
mod validate;

pub use indexed::{AttributeStore, IndexedStore};
pub use registry::{EsmStore, StoreIndex, Stored, StoredRecord};
pub use validate::ValidationReport;

/// Identity of a record that was just decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordId {
    pub id: String,
    /// The record was a deletion marker and the caller should erase it.
    pub deleted: bool,
}

/// Modification state of one id in a [`Store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecordState {
    /// Present in base content only.
    Unmodified,
    /// Base content shadowed by a session edit.
    Modified,
    /// Created during the session.
    Added,
    /// Removed by a deletion marker in content.
    Deleted,
    /// Removed during the session.
    Erased,
}

impl RecordState {
    pub fn is_deleted(self) -> bool {
        matches!(self, RecordState::Deleted | RecordState::Erased)
    }

    /// The state as exposed to readers, where erased records are deleted.
    pub fn reported(self) -> RecordState {
        match self {
            RecordState::Erased => RecordState::Deleted,
            other => other,
        }
    }
}

/// Operations every collection supports without its record type being known.
///
/// Collections that have no use for an operation implement it as a no-op.
pub trait DynamicStore {
    fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError>;

    /// Read a record from a save game into the dynamic partition. With
    /// `override_only`, records without a static counterpart are dropped.
    fn read(&mut self, reader: &mut EsmReader, override_only: bool) -> Result<RecordId, EsmError>;

    /// Write the dynamic partition, returning the number of records written.
    fn write(&self, writer: &mut EsmWriter, listener: &mut dyn Listener) -> Result<usize, EsmError>;

    fn set_up(&mut self);

    fn list_identifiers(&self, out: &mut Vec<String>);

    fn clear_dynamic(&mut self);

    fn erase_static(&mut self, id: &str) -> bool;

    fn len(&self) -> usize;

    fn dynamic_len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collection of one record type.
#[derive(Clone, Debug)]
pub struct Store<T: Record> {
    static_records: BTreeMap<String, T>,
    dynamic: BTreeMap<String, T>,
    deleted: BTreeSet<String>,
    erased: BTreeSet<String>,
}

impl<T: Record> Default for Store<T> {
    fn default() -> Self {
        Store {
            static_records: BTreeMap::new(),
            dynamic: BTreeMap::new(),
            deleted: BTreeSet::new(),
            erased: BTreeSet::new(),
        }
    }
}

impl<T: Record> Store<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(&self, id: &str) -> Option<&T> {
        let key = id_key(id);
        self.dynamic.get(&key).or_else(|| self.static_records.get(&key))
    }

    pub fn search_static(&self, id: &str) -> Option<&T> {
        self.static_records.get(&id_key(id))
    }

    pub(crate) fn search_static_mut(&mut self, id: &str) -> Option<&mut T> {
        self.static_records.get_mut(&id_key(id))
    }

    pub fn find(&self, id: &str) -> Result<&T, ErrorKind> {
        self.search(id).ok_or_else(|| ErrorKind::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    pub fn is_dynamic(&self, id: &str) -> bool {
        self.dynamic.contains_key(&id_key(id))
    }

    /// Insert into the dynamic partition, replacing any earlier session edit.
    pub fn insert(&mut self, record: T) -> &T {
        let key = id_key(record.id());
        self.erased.remove(&key);
        let slot = self.dynamic.entry(key).or_default();
        *slot = record;
        slot
    }

    pub fn insert_static(&mut self, record: T) -> &T {
        let key = id_key(record.id());
        self.deleted.remove(&key);
        let slot = self.static_records.entry(key).or_default();
        *slot = record;
        slot
    }

    /// Remove a session edit. The static record, if any, becomes visible again.
    pub fn erase(&mut self, id: &str) -> bool {
        let key = id_key(id);
        if self.dynamic.remove(&key).is_none() {
            return false;
        }
        if !self.static_records.contains_key(&key) {
            self.erased.insert(key);
        }
        true
    }

    pub fn erase_static(&mut self, id: &str) -> bool {
        let key = id_key(id);
        let removed = self.static_records.remove(&key).is_some();
        self.deleted.insert(key);
        removed
    }

    pub fn state(&self, id: &str) -> Option<RecordState> {
        let key = id_key(id);
        match (
            self.static_records.contains_key(&key),
            self.dynamic.contains_key(&key),
        ) {
            (true, true) => Some(RecordState::Modified),
            (false, true) => Some(RecordState::Added),
            (true, false) => Some(RecordState::Unmodified),
            (false, false) if self.erased.contains(&key) => Some(RecordState::Erased),
            (false, false) if self.deleted.contains(&key) => Some(RecordState::Deleted),
            (false, false) => None,
        }
    }

    /// Every visible record in id order, dynamic records taking the place of
    /// the static ones they shadow.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.static_records
            .iter()
            .merge_join_by(self.dynamic.iter(), |(left, _), (right, _)| left.cmp(right))
            .map(|pair| match pair {
                EitherOrBoth::Left((_, record)) => record,
                EitherOrBoth::Right((_, record)) | EitherOrBoth::Both(_, (_, record)) => record,
            })
    }

    pub fn iter_static(&self) -> impl Iterator<Item = &T> {
        self.static_records.values()
    }

    pub fn iter_dynamic(&self) -> impl Iterator<Item = &T> {
        self.dynamic.values()
    }

    pub(crate) fn dynamic_values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.dynamic.values_mut()
    }

    pub fn len(&self) -> usize {
        self.static_records.len()
            + self
                .dynamic
                .keys()
                .filter(|key| !self.static_records.contains_key(*key))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.static_records.is_empty() && self.dynamic.is_empty()
    }

    pub fn static_len(&self) -> usize {
        self.static_records.len()
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamic.len()
    }

    /// Decode one record into the static partition. A redefinition is merged
    /// with the record it replaces.
    pub fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError> {
        let (mut record, deleted) = T::load(reader)?;
        let key = id_key(record.id());
        if let Some(previous) = self.static_records.remove(&key) {
            record.merge(previous);
        }
        let id = record.id().to_string();
        self.static_records.insert(key, record);
        Ok(RecordId { id, deleted })
    }

    pub fn read(&mut self, reader: &mut EsmReader, override_only: bool) -> Result<RecordId, EsmError> {
        let (record, deleted) = T::load(reader)?;
        let id = record.id().to_string();
        if !override_only || self.static_records.contains_key(&id_key(&id)) {
            self.insert(record);
        }
        Ok(RecordId { id, deleted })
    }

    pub fn write(&self, writer: &mut EsmWriter, listener: &mut dyn Listener) -> Result<usize, EsmError> {
        for record in self.dynamic.values() {
            writer.start_record(T::KIND, RecordFlags::default());
            record.save(writer, false);
            writer.end_record()?;
            listener.increase_progress(1);
        }
        Ok(self.dynamic.len())
    }

    pub fn set_up(&mut self) {
        T::set_up(&mut self.static_records);
    }

    pub fn list_identifiers(&self, out: &mut Vec<String>) {
        out.reserve(self.len());
        out.extend(self.iter().map(|record| record.id().to_string()));
    }

    pub fn clear_dynamic(&mut self) {
        self.dynamic.clear();
        self.erased.clear();
    }
}

impl<T: Record> DynamicStore for Store<T> {
    fn load(&mut self, reader: &mut EsmReader) -> Result<RecordId, EsmError> {
        Store::load(self, reader)
    }

    fn read(&mut self, reader: &mut EsmReader, override_only: bool) -> Result<RecordId, EsmError> {
        Store::read(self, reader, override_only)
    }

    fn write(&self, writer: &mut EsmWriter, listener: &mut dyn Listener) -> Result<usize, EsmError> {
        Store::write(self, writer, listener)
    }

    fn set_up(&mut self) {
        Store::set_up(self)
    }

    fn list_identifiers(&self, out: &mut Vec<String>) {
        Store::list_identifiers(self, out)
    }

    fn clear_dynamic(&mut self) {
        Store::clear_dynamic(self)
    }

    fn erase_static(&mut self, id: &str) -> bool {
        Store::erase_static(self, id)
    }

    fn len(&self) -> usize {
        Store::len(self)
    }

    fn dynamic_len(&self) -> usize {
        Store::dynamic_len(self)
    }
}

impl Store<Cell> {
    pub fn interiors(&self) -> impl Iterator<Item = &Cell> {
        self.iter().filter(|cell| !cell.is_exterior())
    }

    pub fn exteriors(&self) -> impl Iterator<Item = &Cell> {
        self.iter().filter(|cell| cell.is_exterior())
    }

    pub fn search_exterior(&self, x: i32, y: i32) -> Option<&Cell> {
        self.search(&exterior_id(x, y))
    }
}

/// Record kinds written to save games, in save order.
pub const SAVED_GAME_KINDS: &[RecordKind] = &[
    RecordKind::Potion,
    RecordKind::Armor,
    RecordKind::Book,
    RecordKind::Class,
    RecordKind::Clothing,
    RecordKind::Enchantment,
    RecordKind::Npc,
    RecordKind::Spell,
    RecordKind::Weapon,
    RecordKind::CreatureLevList,
    RecordKind::ItemLevList,
    RecordKind::Creature,
    RecordKind::Container,
];

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::loading::NoProgress;
    use crate::records::{Potion, Static};

    fn potion(id: &str, name: &str) -> Potion {
        Potion {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn reader_for<T: Record>(records: &[(T, bool)]) -> EsmReader {
        let mut writer = EsmWriter::new();
        for (record, deleted) in records {
            writer.start_record(T::KIND, RecordFlags::default());
            record.save(&mut writer, *deleted);
            writer.end_record().unwrap();
        }
        EsmReader::new(Arc::new(writer.into_inner()), 0, "test")
    }

    #[test]
    fn lookups_ignore_case() {
        let mut store = Store::new();
        store.insert_static(potion("p_Restore_Health_B", "Restore Health"));
        for id in ["p_restore_health_b", "P_RESTORE_HEALTH_B", "p_Restore_Health_B"] {
            assert_eq!(store.search(id).map(|p| p.name.as_str()), Some("Restore Health"));
        }
        assert!(store.search("p_restore_magicka_b").is_none());
        assert!(matches!(
            store.find("p_restore_magicka_b"),
            Err(ErrorKind::NotFound {
                kind: RecordKind::Potion,
                ..
            })
        ));
    }

    #[test]
    fn dynamic_shadows_static() {
        let mut store = Store::new();
        store.insert_static(potion("p_fortify_luck", "Static"));
        assert_eq!(store.state("p_fortify_luck"), Some(RecordState::Unmodified));

        store.insert(potion("P_Fortify_Luck", "Edited"));
        assert_eq!(store.search("p_fortify_luck").unwrap().name, "Edited");
        assert_eq!(store.search_static("p_fortify_luck").unwrap().name, "Static");
        assert!(store.is_dynamic("p_fortify_luck"));
        assert_eq!(store.state("p_fortify_luck"), Some(RecordState::Modified));
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().count(), 1);

        store.insert(potion("p_new", "New"));
        assert_eq!(store.state("p_new"), Some(RecordState::Added));
        assert_eq!(store.len(), 2);

        assert!(store.erase("p_new"));
        assert_eq!(store.state("p_new").map(RecordState::reported), Some(RecordState::Deleted));
        assert!(store.erase("p_fortify_luck"));
        assert_eq!(store.search("p_fortify_luck").unwrap().name, "Static");
        assert_eq!(store.state("p_fortify_luck"), Some(RecordState::Unmodified));
    }

    #[test]
    fn clear_dynamic_restores_static_state() {
        let mut store = Store::new();
        store.insert_static(potion("p_cure_common", "Cure"));
        store.insert(potion("p_cure_common", "Edited"));
        store.insert(potion("$dynamic0", "Brewed"));
        store.clear_dynamic();

        assert_eq!(store.search("p_cure_common").unwrap().name, "Cure");
        assert!(store.search("$dynamic0").is_none());
        assert_eq!(store.dynamic_len(), 0);
    }

    #[test]
    fn load_reports_tombstones() {
        let mut store = Store::<Static>::new();
        let mut reader = reader_for(&[
            (
                Static {
                    id: "ex_hlaalu_win_01".to_string(),
                    model: "x\\ex_hlaalu_win_01.nif".to_string(),
                },
                false,
            ),
            (
                Static {
                    id: "Ex_Hlaalu_Win_01".to_string(),
                    ..Default::default()
                },
                true,
            ),
        ]);
        reader.next_record_header().unwrap();
        let first = store.load(&mut reader).unwrap();
        assert!(!first.deleted);
        reader.next_record_header().unwrap();
        let second = store.load(&mut reader).unwrap();
        assert!(second.deleted);
        assert_eq!(second.id, "Ex_Hlaalu_Win_01");

        store.erase_static(&second.id);
        assert!(store.search("ex_hlaalu_win_01").is_none());
        assert_eq!(store.state("ex_hlaalu_win_01"), Some(RecordState::Deleted));
        assert!(store.state("ex_hlaalu_win_01").unwrap().is_deleted());
    }

    #[test]
    fn accented_ids_stay_distinct() {
        let mut store = Store::<Potion>::new();
        let mut reader = reader_for(&[
            (potion("p_Älmä", "First"), false),
            (potion("p_Ölmö", "Second"), false),
        ]);
        for _ in 0..2 {
            reader.next_record_header().unwrap();
            store.load(&mut reader).unwrap();
        }
        assert_eq!(store.static_len(), 2);
        assert_eq!(store.search("P_Älmä").unwrap().name, "First");
        assert_eq!(store.search("P_ÖLMÖ"), None);
        assert_eq!(store.search("P_Ölmö").unwrap().id, "p_Ölmö");
    }

    #[test]
    fn override_only_reads_require_a_static_record() {
        let mut store = Store::new();
        store.insert_static(potion("p_known", "Known"));
        let mut reader = reader_for(&[
            (potion("p_known", "Saved"), false),
            (potion("p_unknown", "Orphan"), false),
        ]);
        reader.next_record_header().unwrap();
        store.read(&mut reader, true).unwrap();
        reader.next_record_header().unwrap();
        store.read(&mut reader, true).unwrap();

        assert_eq!(store.search("p_known").unwrap().name, "Saved");
        assert!(store.search("p_unknown").is_none());
    }

    #[test]
    fn write_emits_the_dynamic_partition() {
        let mut store = Store::new();
        store.insert_static(potion("p_static", "Static"));
        store.insert(potion("$dynamic3", "Brewed"));
        let mut writer = EsmWriter::new();
        let written = store.write(&mut writer, &mut NoProgress).unwrap();
        assert_eq!(written, 1);
        assert_eq!(writer.record_count(), 1);

        let mut restored = Store::<Potion>::new();
        let mut reader = EsmReader::new(Arc::new(writer.into_inner()), 0, "save");
        reader.next_record_header().unwrap();
        restored.read(&mut reader, false).unwrap();
        assert_eq!(restored.search("$dynamic3").unwrap().name, "Brewed");
        assert!(restored.is_dynamic("$dynamic3"));
    }

    #[test]
    fn identifiers_cover_both_partitions() {
        let mut store = Store::new();
        store.insert_static(potion("B", "b"));
        store.insert_static(potion("a", "a"));
        store.insert(potion("b", "edited"));
        store.insert(potion("C", "c"));
        let mut ids = Vec::new();
        store.list_identifiers(&mut ids);
        assert_eq!(ids, ["a", "b", "C"]);
    }

    #[test]
    fn cells_split_by_kind() {
        let mut cells = Store::new();
        cells.insert_static(Cell::interior("Seyda Neen, Census and Excise Office"));
        cells.insert_static(Cell::exterior(-2, -9));
        cells.insert_static(Cell::exterior(-3, -9));

        assert_eq!(cells.interiors().count(), 1);
        assert_eq!(cells.exteriors().count(), 2);
        assert_eq!(cells.search_exterior(-2, -9).unwrap().grid(), (-2, -9));
        assert!(cells.search_exterior(0, 0).is_none());
    }
}
