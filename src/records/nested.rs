use crate::error::ErrorKind;
use crate::records::{
    Container, Creature, CreatureLevList, EffectEntry, Enchantment, InventoryItem, ItemLevList,
    LeveledEntry, Npc, Potion, Spell,
};

/// Bounds-checked row access to a list embedded in a record.
///
/// A record can expose several lists; the row type picks which one, e.g.
/// `NestedList::<String>::nested_row(&npc, 0)` for an NPC's spells.
pub trait NestedList<R: Clone> {
    fn nested(&self) -> &Vec<R>;

    fn nested_mut(&mut self) -> &mut Vec<R>;

    fn nested_row(&self, index: usize) -> Result<&R, ErrorKind> {
        let rows = self.nested();
        rows.get(index).ok_or(ErrorKind::IndexOutOfRange {
            index,
            len: rows.len(),
        })
    }

    fn set_nested_row(&mut self, index: usize, row: R) -> Result<(), ErrorKind> {
        let rows = self.nested_mut();
        let len = rows.len();
        let slot = rows
            .get_mut(index)
            .ok_or(ErrorKind::IndexOutOfRange { index, len })?;
        *slot = row;
        Ok(())
    }

    /// Insert `row` before `position`, or append it when `position` is past the end.
    fn add_nested_row(&mut self, position: usize, row: R) {
        let rows = self.nested_mut();
        if position >= rows.len() {
            rows.push(row);
        } else {
            rows.insert(position, row);
        }
    }

    fn remove_nested_row(&mut self, index: usize) -> Result<R, ErrorKind> {
        let rows = self.nested_mut();
        if index >= rows.len() {
            return Err(ErrorKind::IndexOutOfRange {
                index,
                len: rows.len(),
            });
        }
        Ok(rows.remove(index))
    }
}

macro_rules! nested_list {
    ($($record:ty => $field:ident: $row:ty),* $(,)?) => {
        $(
            impl NestedList<$row> for $record {
                fn nested(&self) -> &Vec<$row> {
                    &self.$field
                }

                fn nested_mut(&mut self) -> &mut Vec<$row> {
                    &mut self.$field
                }
            }
        )*
    };
}

nested_list! {
    Container => inventory: InventoryItem,
    Creature => inventory: InventoryItem,
    Npc => inventory: InventoryItem,
    Npc => spells: String,
    Spell => effects: EffectEntry,
    Potion => effects: EffectEntry,
    Enchantment => effects: EffectEntry,
    CreatureLevList => entries: LeveledEntry,
    ItemLevList => entries: LeveledEntry,
}

#[cfg(test)]
mod test {
    use super::*;

    fn item(id: &str, count: i32) -> InventoryItem {
        InventoryItem {
            count,
            item: id.to_string(),
        }
    }

    #[test]
    fn rows_are_bounds_checked() {
        let mut chest = Container {
            id: "chest".to_string(),
            inventory: vec![item("gold_001", 10)],
            ..Default::default()
        };
        chest.add_nested_row(0, item("pick_apprentice_01", 1));
        chest.add_nested_row(99, item("probe_journeyman_01", 2));
        let order: Vec<&str> = chest.inventory.iter().map(|i| i.item.as_str()).collect();
        assert_eq!(order, ["pick_apprentice_01", "gold_001", "probe_journeyman_01"]);

        chest.set_nested_row(1, item("gold_001", 50)).unwrap();
        assert_eq!(chest.nested_row(1).unwrap().count, 50);

        let err = chest.nested_row(3).unwrap_err();
        assert!(matches!(err, ErrorKind::IndexOutOfRange { index: 3, len: 3 }));
        assert!(chest.set_nested_row(5, item("x", 1)).is_err());
        assert!(chest.remove_nested_row(3).is_err());
        assert_eq!(chest.remove_nested_row(0).unwrap().item, "pick_apprentice_01");
    }

    #[test]
    fn npc_exposes_inventory_and_spells() {
        let mut npc = Npc {
            id: "fargoth".to_string(),
            spells: vec!["sanctuary".to_string()],
            ..Default::default()
        };
        NestedList::<InventoryItem>::add_nested_row(&mut npc, 0, item("ring_fargoth", 1));
        assert_eq!(NestedList::<String>::nested_row(&npc, 0).unwrap(), "sanctuary");
        assert_eq!(NestedList::<InventoryItem>::nested(&npc).len(), 1);
        assert!(NestedList::<String>::remove_nested_row(&mut npc, 1).is_err());
    }
}
