//! Segmented memory for the Universal Machine.
//!
//! Memory is a table of segments, each a fixed-length array of words named
//! by an integer id. Segment 0 always exists and holds the running program.
//!
//! Segments live in an arena indexed by id. Unmapping a segment empties its
//! slot and pushes the id on a free list; the next [`SegmentTable::map`]
//! pops the most recently freed id before minting a new one.

use crate::cpu::decode::Word;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Segment identifier.
pub type SegmentId = u32;

/// The program segment.
pub const PROGRAM_SEGMENT: SegmentId = 0;

/// The segment table.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTable {
    /// Slot `id` holds segment `id`, or `None` once unmapped.
    slots: Vec<Option<Vec<Word>>>,
    /// Ids awaiting reuse; the last entry is handed out first.
    free: Vec<SegmentId>,
}

impl SegmentTable {
    /// Create a table whose segment 0 holds `program`.
    pub fn new(program: Vec<Word>) -> Self {
        Self {
            slots: vec![Some(program)],
            free: Vec::new(),
        }
    }

    /// Map a new zero-filled segment of `size` words and return its id.
    ///
    /// # Panics
    ///
    /// Panics if every one of the 2^32 ids is live at once. Each live
    /// segment costs host memory, so the allocator gives out first.
    pub fn map(&mut self, size: u32) -> SegmentId {
        let segment = vec![0; size as usize];

        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(segment);
                id
            }
            None => {
                let id = slot_id(self.slots.len());
                self.slots.push(Some(segment));
                id
            }
        }
    }

    /// Unmap segment `id`, making the id available for reuse.
    pub fn unmap(&mut self, id: SegmentId) -> Result<(), MemoryError> {
        if id == PROGRAM_SEGMENT {
            return Err(MemoryError::UnmapProgram);
        }
        let slot = self
            .slots
            .get_mut(id as usize)
            .filter(|slot| slot.is_some())
            .ok_or(MemoryError::Unmapped(id))?;

        *slot = None;
        self.free.push(id);
        Ok(())
    }

    /// Read the word at `offset` in segment `id`.
    #[inline]
    pub fn read(&self, id: SegmentId, offset: u32) -> Result<Word, MemoryError> {
        let segment = self.segment(id).ok_or(MemoryError::Unmapped(id))?;
        segment
            .get(offset as usize)
            .copied()
            .ok_or(MemoryError::OutOfBounds {
                id,
                offset,
                len: segment.len(),
            })
    }

    /// Write `value` at `offset` in segment `id`.
    #[inline]
    pub fn write(&mut self, id: SegmentId, offset: u32, value: Word) -> Result<(), MemoryError> {
        let segment = self
            .slots
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .ok_or(MemoryError::Unmapped(id))?;
        let len = segment.len();
        let cell = segment
            .get_mut(offset as usize)
            .ok_or(MemoryError::OutOfBounds { id, offset, len })?;
        *cell = value;
        Ok(())
    }

    /// Replace the program with a copy of segment `id`.
    ///
    /// Segment 0 keeps no link to the source, so later changes to segment
    /// `id` do not reach the program. Replacing with segment 0 itself does
    /// nothing.
    pub fn replace_program(&mut self, id: SegmentId) -> Result<(), MemoryError> {
        if id == PROGRAM_SEGMENT {
            return Ok(());
        }
        let copy = self.segment(id).ok_or(MemoryError::Unmapped(id))?.to_vec();
        self.slots[PROGRAM_SEGMENT as usize] = Some(copy);
        Ok(())
    }

    /// Fetch the program word at `pc`, or `None` past the end of segment 0.
    #[inline]
    pub fn fetch(&self, pc: u32) -> Option<Word> {
        self.program().get(pc as usize).copied()
    }

    /// The current contents of segment 0.
    pub fn program(&self) -> &[Word] {
        self.segment(PROGRAM_SEGMENT).unwrap_or(&[])
    }

    /// Segment `id`, if mapped.
    pub fn segment(&self, id: SegmentId) -> Option<&[Word]> {
        self.slots.get(id as usize)?.as_deref()
    }

    /// Length of segment `id`, if mapped.
    pub fn len(&self, id: SegmentId) -> Option<usize> {
        self.segment(id).map(<[Word]>::len)
    }

    /// Is segment `id` currently mapped?
    pub fn is_mapped(&self, id: SegmentId) -> bool {
        self.segment(id).is_some()
    }

    /// Number of mapped segments, including segment 0.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of ids waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Mapped segments with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &[Word])> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_deref().map(|seg| (id as SegmentId, seg)))
    }
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Segment contents can be megabytes; only show the shape
        f.debug_struct("SegmentTable")
            .field("program_len", &self.program().len())
            .field("live_segments", &self.live_count())
            .field("free_ids", &self.free)
            .finish()
    }
}

/// The id of the slot at `index`. Ids are 32 bits wide, so at most
/// `SegmentId::MAX + 1` slots can ever exist.
fn slot_id(index: usize) -> SegmentId {
    SegmentId::try_from(index)
        .unwrap_or_else(|_| panic!("segment table full: {} ids already in use", index))
}

/// Errors that can occur during segment access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("segment {0} is not mapped")]
    Unmapped(SegmentId),

    #[error("offset {offset} is outside segment {id} of length {len}")]
    OutOfBounds { id: SegmentId, offset: u32, len: usize },

    #[error("segment 0 cannot be unmapped")]
    UnmapProgram,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_segment_zero_holds_program() {
        let mem = SegmentTable::new(vec![1, 2, 3]);
        assert_eq!(mem.program(), &[1, 2, 3]);
        assert_eq!(mem.fetch(2), Some(3));
        assert_eq!(mem.fetch(3), None);
    }

    #[test]
    fn test_map_is_zero_filled() {
        let mut mem = SegmentTable::default();
        let id = mem.map(4);
        assert_eq!(id, 1);
        assert_eq!(mem.segment(id), Some(&[0, 0, 0, 0][..]));
    }

    #[test]
    fn test_map_empty_segment() {
        let mut mem = SegmentTable::default();
        let id = mem.map(0);
        assert_eq!(mem.len(id), Some(0));
        assert_eq!(
            mem.read(id, 0),
            Err(MemoryError::OutOfBounds { id, offset: 0, len: 0 })
        );
    }

    #[test]
    fn test_freed_ids_are_reused_last_in_first_out() {
        let mut mem = SegmentTable::default();
        let a = mem.map(1);
        let b = mem.map(1);
        let c = mem.map(1);
        assert_eq!((a, b, c), (1, 2, 3));

        mem.unmap(a).unwrap();
        mem.unmap(c).unwrap();

        assert_eq!(mem.map(1), c);
        assert_eq!(mem.map(1), a);
        assert_eq!(mem.map(1), 4);
    }

    #[test]
    fn test_slot_id_covers_the_full_id_range() {
        assert_eq!(slot_id(1), 1);
        assert_eq!(slot_id(SegmentId::MAX as usize), SegmentId::MAX);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "segment table full")]
    fn test_slot_id_past_the_last_id_panics() {
        slot_id(SegmentId::MAX as usize + 1);
    }

    #[test]
    fn test_reused_segment_is_fresh() {
        let mut mem = SegmentTable::default();
        let id = mem.map(2);
        mem.write(id, 1, 99).unwrap();
        mem.unmap(id).unwrap();

        let again = mem.map(3);
        assert_eq!(again, id);
        assert_eq!(mem.segment(again), Some(&[0, 0, 0][..]));
    }

    #[test]
    fn test_unmap_errors() {
        let mut mem = SegmentTable::default();
        assert_eq!(mem.unmap(0), Err(MemoryError::UnmapProgram));
        assert_eq!(mem.unmap(5), Err(MemoryError::Unmapped(5)));

        let id = mem.map(1);
        mem.unmap(id).unwrap();
        assert_eq!(mem.unmap(id), Err(MemoryError::Unmapped(id)));
        assert_eq!(mem.free_count(), 1);
    }

    #[test]
    fn test_read_write_bounds() {
        let mut mem = SegmentTable::default();
        let id = mem.map(2);

        mem.write(id, 1, 7).unwrap();
        assert_eq!(mem.read(id, 1), Ok(7));
        assert_eq!(
            mem.write(id, 2, 7),
            Err(MemoryError::OutOfBounds { id, offset: 2, len: 2 })
        );
        assert_eq!(mem.read(9, 0), Err(MemoryError::Unmapped(9)));
    }

    #[test]
    fn test_replace_program_copies() {
        let mut mem = SegmentTable::new(vec![7]);
        let id = mem.map(2);
        mem.write(id, 0, 11).unwrap();

        mem.replace_program(id).unwrap();
        mem.write(id, 0, 12).unwrap();
        mem.unmap(id).unwrap();

        assert_eq!(mem.program(), &[11, 0]);
    }

    #[test]
    fn test_replace_program_with_itself_is_noop() {
        let mut mem = SegmentTable::new(vec![1, 2]);
        mem.replace_program(0).unwrap();
        assert_eq!(mem.program(), &[1, 2]);
    }

    #[test]
    fn test_replace_program_unmapped() {
        let mut mem = SegmentTable::new(vec![1]);
        assert_eq!(mem.replace_program(3), Err(MemoryError::Unmapped(3)));
        assert_eq!(mem.program(), &[1]);
    }

    proptest! {
        #[test]
        fn property_map_never_returns_a_live_id(
            ops in prop::collection::vec((any::<bool>(), 0u32..16), 1..200)
        ) {
            let mut mem = SegmentTable::default();
            let mut live: Vec<SegmentId> = Vec::new();

            for (do_map, n) in ops {
                if do_map || live.is_empty() {
                    let id = mem.map(n);
                    prop_assert!(id != PROGRAM_SEGMENT);
                    prop_assert!(!live.contains(&id));
                    live.push(id);
                } else {
                    let victim = live.remove(n as usize % live.len());
                    mem.unmap(victim).unwrap();
                    prop_assert_eq!(mem.map(n), victim);
                    live.push(victim);
                }
            }

            let ids: HashSet<_> = mem.iter().map(|(id, _)| id).collect();
            prop_assert_eq!(ids.len(), live.len() + 1);
        }
    }
}
