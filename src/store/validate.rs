use tracing::debug;

use crate::error::ErrorKind;
use crate::records::{
    Armor, Book, Class, Clothing, CreatureLevList, EffectEntry, Faction, ItemLevList,
    LeveledList, MagicEffect, Npc, Script, Scripted, Spell, Weapon,
};
use crate::store::{EsmStore, IndexedStore, Store, StoredRecord};

/// What a repair pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationReport {
    pub npcs_repaired: usize,
    pub spells_repaired: usize,
    pub scripts_cleared: usize,
    pub leveled_entries_removed: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        *self == ValidationReport::default()
    }
}

/// Copies of the NPCs whose faction or class does not resolve, repaired.
///
/// An unknown faction is dropped along with the rank in it. An unknown class
/// is replaced by the first class in id order.
fn npcs_to_replace<'a>(
    factions: &Store<Faction>,
    classes: &Store<Class>,
    npcs: impl Iterator<Item = &'a Npc>,
) -> Result<Vec<Npc>, ErrorKind> {
    let mut repaired = Vec::new();
    for npc in npcs {
        let mut fixed = None;

        if !npc.faction.is_empty() && factions.search(&npc.faction).is_none() {
            debug!(
                "NPC '{}' ({}) has nonexistent faction '{}', ignoring it",
                npc.id, npc.name, npc.faction
            );
            let fixed = fixed.get_or_insert_with(|| npc.clone());
            fixed.faction.clear();
            fixed.data.rank = 0;
        }

        if classes.search(&npc.class).is_none() {
            let default_class = classes.iter().next().ok_or(ErrorKind::EmptyClassList)?;
            debug!(
                "NPC '{}' ({}) has nonexistent class '{}', using '{}' class as replacement",
                npc.id, npc.name, npc.class, default_class.id
            );
            fixed.get_or_insert_with(|| npc.clone()).class = default_class.id.clone();
        }

        repaired.extend(fixed);
    }
    Ok(repaired)
}

/// Drop effects with no magic effect definition and clear arguments the
/// effect does not take. Returns whether anything changed.
fn repair_effects(
    owner: &str,
    effects: &mut Vec<EffectEntry>,
    magic_effects: &IndexedStore<MagicEffect>,
) -> bool {
    let before = effects.len();
    effects.retain(|effect| {
        let known = magic_effects.search(i32::from(effect.effect_id)).is_some();
        if !known {
            debug!(
                "Spell '{owner}' has an invalid effect (index {}) present, dropping the effect",
                effect.effect_id
            );
        }
        known
    });
    let mut changed = effects.len() != before;

    for effect in effects.iter_mut() {
        let Some(definition) = magic_effects.search(i32::from(effect.effect_id)) else {
            continue;
        };
        let name = MagicEffect::effect_name(i32::from(effect.effect_id)).unwrap_or("Unknown");
        if definition.targets_skill() {
            if effect.attribute != -1 {
                effect.attribute = -1;
                debug!("{name} effect of spell '{owner}' has an attribute argument present, dropping it");
                changed = true;
            }
        } else if definition.targets_attribute() {
            if effect.skill != -1 {
                effect.skill = -1;
                debug!("{name} effect of spell '{owner}' has a skill argument present, dropping it");
                changed = true;
            }
        } else if effect.skill != -1 || effect.attribute != -1 {
            effect.skill = -1;
            effect.attribute = -1;
            debug!("{name} effect of spell '{owner}' has argument(s) present, dropping them");
            changed = true;
        }
    }
    changed
}

/// Clear script references on dynamic items whose script no longer exists.
/// The item itself is kept.
fn clear_missing_scripts<T: StoredRecord + Scripted>(store: &mut EsmStore) -> usize {
    let scripts = store.get::<Script>();
    let stale: Vec<String> = store
        .get::<T>()
        .iter_dynamic()
        .filter(|item| !item.script().is_empty() && scripts.search(item.script()).is_none())
        .map(|item| item.id().to_string())
        .collect();

    for item in store.get_writable::<T>().dynamic_values_mut() {
        if stale.iter().any(|id| id == item.id()) {
            debug!(
                "{} '{}' has nonexistent script '{}', ignoring it",
                T::KIND.name(),
                item.id(),
                item.script()
            );
            item.clear_script();
        }
    }
    stale.len()
}

/// Remove entries of dynamic leveled lists that point at ids the registry no
/// longer knows.
fn remove_missing_objects<T: StoredRecord + LeveledList>(store: &mut EsmStore) -> usize {
    let mut removed = 0;
    let mut changed = Vec::new();
    for list in store.get::<T>().iter_dynamic() {
        let mut list = list.clone();
        let list_id = list.id().to_string();
        let before = list.entries().len();
        list.entries_mut().retain(|entry| {
            let found = store.find(&entry.id).is_some();
            if !found {
                debug!(
                    "Leveled list '{list_id}' has nonexistent object '{}', ignoring it",
                    entry.id
                );
            }
            found
        });
        let after = list.entries().len();
        if after != before {
            removed += before - after;
            changed.push(list);
        }
    }

    let lists = store.get_writable::<T>();
    for list in changed {
        lists.insert(list);
    }
    removed
}

impl EsmStore {
    /// Repair base content: NPC factions and classes, and spell effects.
    /// Repaired records replace their static originals.
    pub fn validate(&mut self) -> Result<ValidationReport, ErrorKind> {
        let mut report = ValidationReport::default();

        let npcs = npcs_to_replace(
            self.get::<Faction>(),
            self.get::<Class>(),
            self.get::<Npc>().iter_static(),
        )?;
        report.npcs_repaired = npcs.len();
        let store = self.get_writable::<Npc>();
        for npc in npcs {
            store.erase_static(&npc.id);
            store.insert_static(npc);
        }

        let magic_effects = self.get::<MagicEffect>();
        let mut spells = Vec::new();
        for spell in self.get::<Spell>().iter_static() {
            if spell.effects.is_empty() {
                continue;
            }
            let mut spell = spell.clone();
            if repair_effects(&spell.id, &mut spell.effects, magic_effects) {
                spells.push(spell);
            }
        }
        report.spells_repaired = spells.len();
        let store = self.get_writable::<Spell>();
        for spell in spells {
            store.erase_static(&spell.id);
            store.insert_static(spell);
        }

        Ok(report)
    }

    /// Repair session records, which may point at content that has since
    /// been removed.
    pub fn validate_dynamic(&mut self) -> Result<ValidationReport, ErrorKind> {
        let mut report = ValidationReport::default();

        let npcs = npcs_to_replace(
            self.get::<Faction>(),
            self.get::<Class>(),
            self.get::<Npc>().iter_dynamic(),
        )?;
        report.npcs_repaired = npcs.len();
        let store = self.get_writable::<Npc>();
        for npc in npcs {
            store.insert(npc);
        }

        report.scripts_cleared = clear_missing_scripts::<Armor>(self)
            + clear_missing_scripts::<Book>(self)
            + clear_missing_scripts::<Clothing>(self)
            + clear_missing_scripts::<Weapon>(self);

        report.leveled_entries_removed = remove_missing_objects::<CreatureLevList>(self)
            + remove_missing_objects::<ItemLevList>(self);

        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::records::{LeveledEntry, MagicEffectData, NpcData, Potion, Record};
    use crate::testing::{ContentBuilder, load_files};

    fn npc(id: &str, faction: &str, class: &str) -> Npc {
        Npc {
            id: id.to_string(),
            name: id.to_uppercase(),
            faction: faction.to_string(),
            class: class.to_string(),
            data: NpcData {
                rank: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn class(id: &str) -> Class {
        Class {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn magic_effect(index: i32, flags: i32) -> MagicEffect {
        MagicEffect {
            index,
            data: MagicEffectData {
                flags,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn effect(effect_id: i16, skill: i8, attribute: i8) -> EffectEntry {
        EffectEntry::builder()
            .effect_id(effect_id)
            .skill(skill)
            .attribute(attribute)
            .build()
    }

    #[test]
    fn unknown_factions_are_dropped() {
        let content = ContentBuilder::new()
            .record(&class("Thief"))
            .record(&npc("habasi", "thieves", "Thief"))
            .record(&Faction {
                id: "Thieves Guild".to_string(),
                ..Default::default()
            })
            .record(&npc("sugar-lips", "thieves guild", "thief"));
        let (mut store, report) = load_files(vec![content]);
        assert_eq!(report.npcs_repaired, 1);

        let habasi = store.get::<Npc>().find("habasi").unwrap();
        assert!(habasi.faction.is_empty());
        assert_eq!(habasi.data.rank, 0);
        assert!(!store.get::<Npc>().is_dynamic("habasi"));
        let sugar_lips = store.get::<Npc>().find("sugar-lips").unwrap();
        assert_eq!(sugar_lips.faction, "thieves guild");
        assert_eq!(sugar_lips.data.rank, 3);

        assert!(store.validate().unwrap().is_clean());
    }

    #[test]
    fn unknown_classes_fall_back_to_the_first_class() {
        let content = ContentBuilder::new()
            .record(&class("Warrior"))
            .record(&class("Agent"))
            .record(&npc("fargoth", "", "Commoner"));
        let (store, report) = load_files(vec![content]);
        assert_eq!(report.npcs_repaired, 1);
        assert_eq!(store.get::<Npc>().find("fargoth").unwrap().class, "Agent");
    }

    #[test]
    fn missing_classes_are_fatal_only_when_needed() {
        let mut store = EsmStore::new();
        assert!(store.validate().unwrap().is_clean());

        store.get_writable::<Npc>().insert_static(npc("fargoth", "", "Commoner"));
        assert!(matches!(store.validate(), Err(ErrorKind::EmptyClassList)));
    }

    #[test]
    fn spell_effects_are_repaired() {
        let content = ContentBuilder::new()
            .magic_effect(&magic_effect(17, MagicEffect::TARGET_ATTRIBUTE))
            .magic_effect(&magic_effect(21, MagicEffect::TARGET_SKILL))
            .magic_effect(&magic_effect(23, 0))
            .record(&Spell {
                id: "unknown effect".to_string(),
                effects: vec![effect(900, -1, -1)],
                ..Default::default()
            })
            .record(&Spell {
                id: "mixed".to_string(),
                effects: vec![effect(17, 4, 2), effect(21, 8, 1), effect(23, 8, 1)],
                ..Default::default()
            })
            .record(&Spell {
                id: "clean".to_string(),
                effects: vec![effect(17, -1, 2)],
                ..Default::default()
            });
        let (mut store, report) = load_files(vec![content]);
        assert_eq!(report.spells_repaired, 2);

        let spells = store.get::<Spell>();
        assert!(spells.find("unknown effect").unwrap().effects.is_empty());
        assert_eq!(
            spells.find("mixed").unwrap().effects,
            vec![effect(17, -1, 2), effect(21, 8, -1), effect(23, -1, -1)]
        );
        assert_eq!(spells.find("clean").unwrap().effects, vec![effect(17, -1, 2)]);

        assert!(store.validate().unwrap().is_clean());
    }

    #[test]
    fn dangling_enchantments_are_left_alone() {
        let armor = Armor {
            id: "daedric_cuirass_enchanted".to_string(),
            enchantment: "missing_enchantment".to_string(),
            ..Default::default()
        };
        let (store, report) = load_files(vec![ContentBuilder::new().record(&armor)]);
        assert!(report.is_clean());
        let loaded = store.get::<Armor>().find("daedric_cuirass_enchanted").unwrap();
        assert_eq!(loaded.enchantment, "missing_enchantment");
    }

    #[test]
    fn dynamic_repairs_touch_session_records_only() {
        let content = ContentBuilder::new()
            .record(&class("Warrior"))
            .record(&{
                let mut script = Script::default();
                script.set_id("ringScript".to_string());
                script
            })
            .record(&Potion {
                id: "p_heal".to_string(),
                ..Default::default()
            });
        let (mut store, _) = load_files(vec![content]);

        store.override_record(&npc("guard", "legion", "Warrior"));
        store.get_writable::<Weapon>().insert(Weapon {
            id: "$dynamic0".to_string(),
            script: "removedScript".to_string(),
            ..Default::default()
        });
        store.get_writable::<Book>().insert(Book {
            id: "$dynamic1".to_string(),
            script: "ringscript".to_string(),
            ..Default::default()
        });
        store.override_record(&ItemLevList {
            id: "l_potions".to_string(),
            entries: vec![
                LeveledEntry {
                    id: "p_heal".to_string(),
                    level: 1,
                },
                LeveledEntry {
                    id: "p_removed".to_string(),
                    level: 5,
                },
            ],
            ..Default::default()
        });

        let report = store.validate_dynamic().unwrap();
        assert_eq!(
            report,
            ValidationReport {
                npcs_repaired: 1,
                spells_repaired: 0,
                scripts_cleared: 1,
                leveled_entries_removed: 1,
            }
        );
        let guard = store.get::<Npc>().find("guard").unwrap();
        assert!(guard.faction.is_empty());
        assert!(store.get::<Npc>().is_dynamic("guard"));
        assert!(store.get::<Weapon>().find("$dynamic0").unwrap().script.is_empty());
        assert_eq!(store.get::<Book>().find("$dynamic1").unwrap().script, "ringscript");
        let list = store.get::<ItemLevList>().find("l_potions").unwrap();
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].id, "p_heal");

        assert!(store.validate_dynamic().unwrap().is_clean());
    }
}
