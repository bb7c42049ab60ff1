use itertools::Itertools;
use tracing::debug;

use crate::error::ErrorKind;
use crate::esm::{ReadersCache, RefNum};
use crate::records::{Cell, id_key};
use crate::store::EsmStore;

/// Replay the references of one cell. Deleted placements are kept with no id
/// so they still claim their placement number.
fn read_refs(
    cell: &Cell,
    refs: &mut Vec<(RefNum, Option<String>)>,
    readers: &mut ReadersCache,
) -> Result<(), ErrorKind> {
    for (i, context) in cell.context_list.iter().enumerate() {
        let mut reader = readers.get(context.index)?;
        cell.restore(&mut reader, i);
        while let Some((cell_ref, deleted)) = Cell::next_ref(&mut reader)? {
            if deleted {
                refs.push((cell_ref.ref_num, None));
            } else if !cell.moved_refs.contains(&cell_ref.ref_num) {
                refs.push((cell_ref.ref_num, Some(cell_ref.ref_id)));
            }
        }
    }

    for leased in &cell.leased_refs {
        let id = (!leased.deleted).then(|| leased.cell_ref.ref_id.clone());
        refs.push((leased.cell_ref.ref_num, id));
    }
    Ok(())
}

impl EsmStore {
    /// Count placed references per object id across every cell.
    ///
    /// When several references share a placement number, the first one read
    /// decides whether and what it counts. Content is not expected to change
    /// after loading, so a table that is already filled is left as is.
    pub fn count_all_cell_refs(&mut self, readers: &mut ReadersCache) -> Result<(), ErrorKind> {
        if !self.ref_count.is_empty() {
            return Ok(());
        }

        let mut refs = Vec::new();
        let cells = self.get::<Cell>();
        for cell in cells.interiors().chain(cells.exteriors()) {
            read_refs(cell, &mut refs, readers)?;
        }
        refs.sort_by_key(|(ref_num, _)| *ref_num);

        for (_, id) in refs.into_iter().dedup_by(|(left, _), (right, _)| left == right) {
            if let Some(id) = id {
                *self.ref_count.entry(id_key(&id)).or_default() += 1;
            }
        }
        debug!("Counted references to {} objects", self.ref_count.len());
        Ok(())
    }
}
