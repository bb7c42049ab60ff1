//! The registry owning one collection per record type.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::error::ErrorKind;
use crate::esm::{EsmError, EsmReader, EsmWriter, FourCc, RecordFlags, RecordKind};
use crate::loading::{FILE_PROGRESS, Listener};
use crate::records::{
    Activator, Apparatus, Armor, Attribute, BirthSign, BodyPart, Book, Cell, Class, Clothing,
    Container, Creature, CreatureLevList, Dialogue, Door, Enchantment, Faction, GameSetting,
    Global, Ingredient, ItemLevList, Land, LandTexture, Light, Lockpick, LuaContent,
    LuaScriptsCfg, MagicEffect, Miscellaneous, Npc, Pathgrid, Potion, Probe, Race, Record, Region,
    Repair, Script, Skill, Sound, SoundGenerator, Spell, StartScript, Static, Weapon, id_key,
    parse_omw_scripts,
};
use crate::store::{AttributeStore, DynamicStore, IndexedStore, SAVED_GAME_KINDS, Store};

/// Ties a record type to the collection holding it inside [`EsmStore`].
pub trait Stored: 'static {
    type Collection: DynamicStore + 'static;

    const INDEX: StoreIndex;

    fn collection(store: &EsmStore) -> &Self::Collection;

    fn collection_mut(store: &mut EsmStore) -> &mut Self::Collection;
}

/// A [`Record`] kept in a generic [`Store`].
pub trait StoredRecord: Record + Stored<Collection = Store<Self>> {}

impl<T: Record + Stored<Collection = Store<T>>> StoredRecord for T {}

struct StoreEntry {
    index: StoreIndex,
    /// Wire kind of the records, if they have one.
    kind: Option<RecordKind>,
    /// Whether the loader dispatches records of `kind` through this entry.
    dispatch: bool,
    get: fn(&EsmStore) -> &dyn DynamicStore,
    get_mut: fn(&mut EsmStore) -> &mut dyn DynamicStore,
}

fn erased<T: Stored>(store: &EsmStore) -> &dyn DynamicStore {
    T::collection(store)
}

fn erased_mut<T: Stored>(store: &mut EsmStore) -> &mut dyn DynamicStore {
    T::collection_mut(store)
}

macro_rules! stores {
    ($($ty:ident => $field:ident: $collection:ty, $kind:expr, $dispatch:literal;)*) => {
        /// Fixed position of each collection in the registry.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(usize)]
        pub enum StoreIndex {
            $($ty,)*
        }

        impl StoreIndex {
            pub const ALL: &[StoreIndex] = &[$(StoreIndex::$ty,)*];
            pub const COUNT: usize = Self::ALL.len();
        }

        #[derive(Debug, Default)]
        struct Stores {
            $($field: $collection,)*
        }

        $(
            impl Stored for $ty {
                type Collection = $collection;

                const INDEX: StoreIndex = StoreIndex::$ty;

                fn collection(store: &EsmStore) -> &Self::Collection {
                    &store.stores.$field
                }

                fn collection_mut(store: &mut EsmStore) -> &mut Self::Collection {
                    &mut store.stores.$field
                }
            }
        )*

        const STORE_TABLE: &[StoreEntry] = &[
            $(
                StoreEntry {
                    index: StoreIndex::$ty,
                    kind: $kind,
                    dispatch: $dispatch,
                    get: erased::<$ty>,
                    get_mut: erased_mut::<$ty>,
                },
            )*
        ];
    };
}

stores! {
    Activator => activators: Store<Activator>, Some(RecordKind::Activator), true;
    Potion => potions: Store<Potion>, Some(RecordKind::Potion), true;
    Apparatus => apparatus: Store<Apparatus>, Some(RecordKind::Apparatus), true;
    Armor => armors: Store<Armor>, Some(RecordKind::Armor), true;
    BodyPart => body_parts: Store<BodyPart>, Some(RecordKind::BodyPart), true;
    Book => books: Store<Book>, Some(RecordKind::Book), true;
    BirthSign => birth_signs: Store<BirthSign>, Some(RecordKind::BirthSign), true;
    Class => classes: Store<Class>, Some(RecordKind::Class), true;
    Clothing => clothing: Store<Clothing>, Some(RecordKind::Clothing), true;
    Container => containers: Store<Container>, Some(RecordKind::Container), true;
    Creature => creatures: Store<Creature>, Some(RecordKind::Creature), true;
    Dialogue => dialogues: Store<Dialogue>, Some(RecordKind::Dialogue), true;
    Door => doors: Store<Door>, Some(RecordKind::Door), true;
    Enchantment => enchantments: Store<Enchantment>, Some(RecordKind::Enchantment), true;
    Faction => factions: Store<Faction>, Some(RecordKind::Faction), true;
    Global => globals: Store<Global>, Some(RecordKind::Global), true;
    Ingredient => ingredients: Store<Ingredient>, Some(RecordKind::Ingredient), true;
    CreatureLevList => creature_lists: Store<CreatureLevList>, Some(RecordKind::CreatureLevList), true;
    ItemLevList => item_lists: Store<ItemLevList>, Some(RecordKind::ItemLevList), true;
    Light => lights: Store<Light>, Some(RecordKind::Light), true;
    Lockpick => lockpicks: Store<Lockpick>, Some(RecordKind::Lockpick), true;
    Miscellaneous => miscellaneous: Store<Miscellaneous>, Some(RecordKind::Miscellaneous), true;
    Npc => npcs: Store<Npc>, Some(RecordKind::Npc), true;
    Probe => probes: Store<Probe>, Some(RecordKind::Probe), true;
    Race => races: Store<Race>, Some(RecordKind::Race), true;
    Region => regions: Store<Region>, Some(RecordKind::Region), true;
    Repair => repairs: Store<Repair>, Some(RecordKind::Repair), true;
    SoundGenerator => sound_generators: Store<SoundGenerator>, Some(RecordKind::SoundGenerator), true;
    Sound => sounds: Store<Sound>, Some(RecordKind::Sound), true;
    Spell => spells: Store<Spell>, Some(RecordKind::Spell), true;
    StartScript => start_scripts: Store<StartScript>, Some(RecordKind::StartScript), true;
    Static => statics: Store<Static>, Some(RecordKind::Static), true;
    Weapon => weapons: Store<Weapon>, Some(RecordKind::Weapon), true;
    GameSetting => game_settings: Store<GameSetting>, Some(RecordKind::GameSetting), true;
    Script => scripts: Store<Script>, Some(RecordKind::Script), true;
    Cell => cells: Store<Cell>, Some(RecordKind::Cell), true;
    Land => lands: Store<Land>, Some(RecordKind::Land), true;
    LandTexture => land_textures: Store<LandTexture>, Some(RecordKind::LandTexture), true;
    Pathgrid => pathgrids: Store<Pathgrid>, Some(RecordKind::Pathgrid), true;
    MagicEffect => magic_effects: IndexedStore<MagicEffect>, Some(RecordKind::MagicEffect), false;
    Skill => skills: IndexedStore<Skill>, Some(RecordKind::Skill), false;
    Attribute => attributes: AttributeStore, None, false;
}

fn entry(index: StoreIndex) -> &'static StoreEntry {
    &STORE_TABLE[index as usize]
}

/// Registry of every record collection, with a case-insensitive id index
/// across the object kinds.
#[derive(Debug)]
pub struct EsmStore {
    stores: Stores,
    dispatch: BTreeMap<RecordKind, StoreIndex>,
    pub(super) ids: HashMap<String, RecordKind>,
    /// Snapshot of `ids` taken when base content finished loading.
    pub(super) static_ids: HashMap<String, RecordKind>,
    pub(super) ref_count: HashMap<String, u32>,
    dynamic_count: u32,
    lua_content: Vec<LuaContent>,
}

impl Default for EsmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EsmStore {
    pub fn new() -> Self {
        let dispatch = STORE_TABLE
            .iter()
            .filter(|entry| entry.dispatch)
            .filter_map(|entry| entry.kind.map(|kind| (kind, entry.index)))
            .collect();
        EsmStore {
            stores: Stores::default(),
            dispatch,
            ids: HashMap::new(),
            static_ids: HashMap::new(),
            ref_count: HashMap::new(),
            dynamic_count: 0,
            lua_content: Vec::new(),
        }
    }

    pub fn get<T: Stored>(&self) -> &T::Collection {
        T::collection(self)
    }

    pub fn get_writable<T: Stored>(&mut self) -> &mut T::Collection {
        T::collection_mut(self)
    }

    /// The collection records of `kind` are loaded into.
    pub fn dynamic(&self, kind: RecordKind) -> Option<&dyn DynamicStore> {
        let index = *self.dispatch.get(&kind)?;
        Some((entry(index).get)(self))
    }

    pub(crate) fn dynamic_mut(&mut self, kind: RecordKind) -> Option<&mut dyn DynamicStore> {
        let index = *self.dispatch.get(&kind)?;
        Some((entry(index).get_mut)(self))
    }

    /// Every collection in registry order, including the built-in ones.
    pub fn collections(&self) -> impl Iterator<Item = (StoreIndex, Option<RecordKind>, &dyn DynamicStore)> {
        STORE_TABLE
            .iter()
            .map(|entry| (entry.index, entry.kind, (entry.get)(self)))
    }

    /// Kind of the object with this id, or `None` if no such object exists.
    pub fn find(&self, id: &str) -> Option<RecordKind> {
        self.ids.get(&id_key(id)).copied()
    }

    /// Like [`find`](Self::find), but only for ids present in base content.
    pub fn find_static(&self, id: &str) -> Option<RecordKind> {
        self.static_ids.get(&id_key(id)).copied()
    }

    /// Number of placed references to `id` across every cell.
    pub fn get_ref_count(&self, id: &str) -> u32 {
        self.ref_count.get(&id_key(id)).copied().unwrap_or(0)
    }

    pub fn dynamic_count(&self) -> u32 {
        self.dynamic_count
    }

    pub fn set_dynamic_count(&mut self, count: u32) {
        self.dynamic_count = count;
    }

    /// Load every record of a content file.
    ///
    /// `dialogue` is the id of the dialogue that following `INFO` records
    /// belong to. It is carried across files because a plugin may append
    /// infos to a dialogue defined by its master.
    pub fn load(
        &mut self,
        reader: &mut EsmReader,
        listener: &mut dyn Listener,
        dialogue: &mut Option<String>,
    ) -> Result<(), ErrorKind> {
        listener.set_progress_range(FILE_PROGRESS);

        while reader.has_more_records() {
            let header = reader.next_record_header()?;
            if header.flags.is_ignored() {
                reader.skip_record();
                continue;
            }

            let kind = header.kind();
            if let Some(index) = kind.and_then(|kind| self.dispatch.get(&kind).copied()) {
                let store = (entry(index).get_mut)(self);
                let record = store.load(reader)?;
                if record.deleted {
                    store.erase_static(&record.id);
                    *dialogue = None;
                } else if kind == Some(RecordKind::Dialogue) {
                    *dialogue = Some(record.id);
                } else {
                    *dialogue = None;
                }
            } else {
                match kind {
                    Some(RecordKind::DialInfo) => self.load_info(reader, dialogue.as_deref())?,
                    Some(RecordKind::MagicEffect) => {
                        self.stores.magic_effects.load(reader)?;
                    }
                    Some(RecordKind::Skill) => {
                        self.stores.skills.load(reader)?;
                    }
                    Some(RecordKind::Filter | RecordKind::DebugProfile) => reader.skip_record(),
                    Some(RecordKind::LuaScripts) => {
                        let cfg = LuaScriptsCfg::load(reader)?;
                        self.lua_content.push(LuaContent::Records(cfg));
                    }
                    _ => return Err(ErrorKind::UnknownRecord { tag: header.tag }),
                }
            }

            let size = reader.file_size() as u64;
            if size > 0 {
                listener.set_progress(FILE_PROGRESS * reader.file_offset() as u64 / size);
            }
        }
        Ok(())
    }

    fn load_info(&mut self, reader: &mut EsmReader, dialogue: Option<&str>) -> Result<(), EsmError> {
        let target = dialogue.and_then(|id| self.stores.dialogues.search_static_mut(id));
        match target {
            Some(dialogue) => dialogue.read_info(reader),
            None => {
                error!("Info record without dialogue in {}", reader.name());
                reader.skip_record();
                Ok(())
            }
        }
    }

    /// Finalize every collection after loading and rebuild the id index.
    pub fn set_up(&mut self) {
        self.ids.clear();
        for entry in STORE_TABLE.iter().filter(|entry| entry.dispatch) {
            (entry.get_mut)(self).set_up();

            let Some(kind) = entry.kind.filter(|kind| kind.is_cacheable()) else {
                continue;
            };
            let mut identifiers = Vec::new();
            (entry.get)(self).list_identifiers(&mut identifiers);
            for id in identifiers {
                self.ids.insert(id_key(&id), kind);
            }
        }

        if self.static_ids.is_empty() {
            self.static_ids = self.ids.clone();
        }

        self.stores.attributes.set_up();
        self.stores.dialogues.set_up();
    }

    /// Repair content and count cell references. Run once after all content is loaded.
    pub fn validate_records(
        &mut self,
        readers: &mut crate::esm::ReadersCache,
    ) -> Result<super::ValidationReport, ErrorKind> {
        let report = self.validate()?;
        self.count_all_cell_refs(readers)?;
        Ok(report)
    }

    /// Drop every session edit and restore the player from base content.
    pub fn clear_dynamic(&mut self) -> Result<(), ErrorKind> {
        for entry in STORE_TABLE {
            (entry.get_mut)(self).clear_dynamic();
        }
        self.move_player_record()
    }

    /// Copy the static player record into the dynamic partition, where the
    /// session edits it.
    pub fn move_player_record(&mut self) -> Result<(), ErrorKind> {
        let npcs = &mut self.stores.npcs;
        let player = npcs.find("player")?.clone();
        npcs.insert(player);
        Ok(())
    }

    pub fn check_player(&mut self) -> Result<(), ErrorKind> {
        self.set_up();
        let Some(player) = self.stores.npcs.search("player") else {
            return Err(ErrorKind::InvalidPlayer);
        };
        if self.stores.races.search(&player.race).is_none()
            || self.stores.classes.search(&player.class).is_none()
        {
            return Err(ErrorKind::InvalidPlayer);
        }
        Ok(())
    }

    fn index_id<T: Record>(&mut self, id: &str) {
        self.ids.insert(id_key(id), T::KIND);
    }

    fn next_dynamic_id(&mut self) -> String {
        let id = format!("$dynamic{}", self.dynamic_count);
        self.dynamic_count += 1;
        id
    }

    /// Consume the next `$dynamic<n>` id, failing if a `T` already uses it.
    fn claim_dynamic_id<T: StoredRecord>(&mut self) -> Result<String, ErrorKind> {
        let id = self.next_dynamic_id();
        if self.get::<T>().search(&id).is_some() {
            return Err(ErrorKind::DynamicIdCollision { id });
        }
        Ok(id)
    }

    fn insert_with_dynamic_id<T: StoredRecord>(&mut self, record: &T) -> Result<&T, ErrorKind> {
        let id = self.claim_dynamic_id::<T>()?;
        let mut record = record.clone();
        record.set_id(id.clone());
        self.index_id::<T>(&id);
        debug!("Created {} record '{id}'", T::KIND.name());
        Ok(self.get_writable::<T>().insert(record))
    }

    /// Insert a record created during the session.
    pub fn insert<T: RuntimeInsert>(&mut self, record: &T) -> Result<&T, ErrorKind> {
        T::insert_runtime(self, record)
    }

    /// Insert into base content under the record's own id. The next dynamic
    /// id is still consumed and must be free.
    pub fn insert_static<T: StaticInsert>(&mut self, record: &T) -> Result<&T, ErrorKind> {
        self.claim_dynamic_id::<T>()?;
        self.index_id::<T>(record.id());
        Ok(self.get_writable::<T>().insert_static(record.clone()))
    }

    /// Replace a record for the session under its own id.
    pub fn override_record<T: OverrideRecord>(&mut self, record: &T) -> &T {
        self.index_id::<T>(record.id());
        self.get_writable::<T>().insert(record.clone())
    }

    /// One record for the dynamic id counter plus every dynamic record of the
    /// kinds saved with a game.
    pub fn count_saved_game_records(&self) -> usize {
        1 + SAVED_GAME_KINDS
            .iter()
            .filter_map(|kind| self.dynamic(*kind))
            .map(|store| store.dynamic_len())
            .sum::<usize>()
    }

    pub fn write(&self, writer: &mut EsmWriter, listener: &mut dyn Listener) -> Result<(), EsmError> {
        writer.start_record(RecordKind::DynamicCount, RecordFlags::default());
        writer.write_sub(b"COUN", &self.dynamic_count);
        writer.end_record()?;

        for kind in SAVED_GAME_KINDS {
            if let Some(store) = self.dynamic(*kind) {
                store.write(writer, listener)?;
            }
        }
        Ok(())
    }

    /// Read one save game record whose header has just been read. Returns
    /// `false` when the record kind is not one the registry saves.
    pub fn read_record(&mut self, reader: &mut EsmReader, tag: FourCc) -> Result<bool, ErrorKind> {
        let Some(kind) = RecordKind::from_tag(tag) else {
            return Ok(false);
        };
        let override_only = match kind {
            RecordKind::Potion
            | RecordKind::Armor
            | RecordKind::Book
            | RecordKind::Class
            | RecordKind::Clothing
            | RecordKind::Enchantment
            | RecordKind::Spell
            | RecordKind::Weapon
            | RecordKind::ItemLevList
            | RecordKind::CreatureLevList => false,
            RecordKind::Npc | RecordKind::Creature | RecordKind::Container => true,
            RecordKind::DynamicCount => {
                self.dynamic_count = reader.get_sub_named(b"COUN")?;
                return Ok(true);
            }
            _ => return Ok(false),
        };
        let Some(store) = self.dynamic_mut(kind) else {
            return Ok(false);
        };
        store.read(reader, override_only)?;
        Ok(true)
    }

    pub fn lua_content(&self) -> &[LuaContent] {
        &self.lua_content
    }

    /// Register an `.omwscripts` file. It is read every time
    /// [`lua_scripts_cfg`](Self::lua_scripts_cfg) is called.
    pub fn add_omw_scripts(&mut self, path: impl Into<PathBuf>) {
        self.lua_content.push(LuaContent::File(path.into()));
    }

    /// Lua script configuration merged from every source in load order.
    pub fn lua_scripts_cfg(&self) -> LuaScriptsCfg {
        let mut cfg = LuaScriptsCfg::default();
        for content in &self.lua_content {
            match content {
                LuaContent::File(path) => {
                    let parsed = std::fs::read_to_string(path)
                        .map_err(ErrorKind::from)
                        .and_then(|text| parse_omw_scripts(&mut cfg, &text));
                    if let Err(err) = parsed {
                        warn!("Skipping {}: {err}", path.display());
                    }
                }
                LuaContent::Records(records) => cfg.extend(records),
            }
        }
        cfg
    }
}

/// Record types that can be created during a session under a generated
/// `$dynamic<n>` id.
pub trait RuntimeInsert: StoredRecord {
    fn insert_runtime<'a>(store: &'a mut EsmStore, record: &Self) -> Result<&'a Self, ErrorKind> {
        store.insert_with_dynamic_id(record)
    }
}

impl RuntimeInsert for Book {}
impl RuntimeInsert for Armor {}
impl RuntimeInsert for Class {}
impl RuntimeInsert for Enchantment {}
impl RuntimeInsert for Potion {}
impl RuntimeInsert for Weapon {}
impl RuntimeInsert for Clothing {}
impl RuntimeInsert for Spell {}

impl RuntimeInsert for Npc {
    fn insert_runtime<'a>(store: &'a mut EsmStore, record: &Self) -> Result<&'a Self, ErrorKind> {
        if record.is_player() {
            store.claim_dynamic_id::<Npc>()?;
            return Ok(store.stores.npcs.insert(record.clone()));
        }
        store.insert_with_dynamic_id(record)
    }
}

impl RuntimeInsert for Cell {
    fn insert_runtime<'a>(store: &'a mut EsmStore, record: &Self) -> Result<&'a Self, ErrorKind> {
        Ok(store.stores.cells.insert(record.clone()))
    }
}

/// Record types that may be added to base content after loading.
pub trait StaticInsert: StoredRecord {}

impl StaticInsert for GameSetting {}
impl StaticInsert for Static {}
impl StaticInsert for Door {}
impl StaticInsert for Global {}
impl StaticInsert for Npc {}

/// Record types whose base definition a session may replace.
pub trait OverrideRecord: StoredRecord {}

impl OverrideRecord for Container {}
impl OverrideRecord for Creature {}
impl OverrideRecord for CreatureLevList {}
impl OverrideRecord for Door {}
impl OverrideRecord for ItemLevList {}
impl OverrideRecord for Npc {}
