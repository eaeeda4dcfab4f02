use crate::virtual_machine::isa::{DATA_STORE_SIZE, Word};
use crate::virtual_machine::status::Fault;
use std::ops::Range;

/// The data store shared by the stack (growing up from `SB`) and the heap
/// (growing down from `HB`).
///
/// Every access is bounds-checked. An address outside the store is
/// [`Fault::StoreExhausted`], and a failed access never modifies the store.
pub struct DataStore {
    words: Box<[Word; DATA_STORE_SIZE]>,
}

impl DataStore {
    pub(super) fn new() -> Self {
        Self {
            words: Box::new([0; DATA_STORE_SIZE]),
        }
    }

    /// Returns the word at `addr` without faulting, for diagnostics.
    pub fn get(&self, addr: Word) -> Option<Word> {
        usize::try_from(addr)
            .ok()
            .and_then(|idx| self.words.get(idx).copied())
    }

    /// Returns the words in `[start, end)`, clamped to the store.
    pub fn words(&self, range: Range<Word>) -> &[Word] {
        let clamp = |w: Word| w.clamp(0, DATA_STORE_SIZE as Word) as usize;
        let start = clamp(range.start);
        let end = clamp(range.end).max(start);
        &self.words[start..end]
    }

    pub(super) fn read(&self, addr: Word) -> Result<Word, Fault> {
        self.get(addr).ok_or(Fault::StoreExhausted)
    }

    pub(super) fn write(&mut self, addr: Word, value: Word) -> Result<(), Fault> {
        let slot = usize::try_from(addr)
            .ok()
            .and_then(|idx| self.words.get_mut(idx))
            .ok_or(Fault::StoreExhausted)?;
        *slot = value;
        Ok(())
    }

    /// Copies `len` words starting at `addr`.
    pub(super) fn read_block(&self, addr: Word, len: Word) -> Result<Vec<Word>, Fault> {
        let range = Self::span(addr, len)?;
        Ok(self.words[range].to_vec())
    }

    /// Writes `values` starting at `addr`, all or nothing.
    pub(super) fn write_block(&mut self, addr: Word, values: &[Word]) -> Result<(), Fault> {
        let len = Word::try_from(values.len()).map_err(|_| Fault::StoreExhausted)?;
        let range = Self::span(addr, len)?;
        self.words[range].copy_from_slice(values);
        Ok(())
    }

    /// Index range of `len` words at `addr`, if it lies inside the store.
    fn span(addr: Word, len: Word) -> Result<Range<usize>, Fault> {
        let start = usize::try_from(addr).map_err(|_| Fault::StoreExhausted)?;
        let len = usize::try_from(len).map_err(|_| Fault::StoreExhausted)?;
        let end = start.checked_add(len).ok_or(Fault::StoreExhausted)?;
        if end > DATA_STORE_SIZE {
            return Err(Fault::StoreExhausted);
        }
        Ok(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access_faults() {
        let mut store = DataStore::new();
        assert_eq!(store.read(-1), Err(Fault::StoreExhausted));
        assert_eq!(store.read(DATA_STORE_SIZE as Word), Err(Fault::StoreExhausted));
        assert_eq!(store.write(1024, 1), Err(Fault::StoreExhausted));
        assert_eq!(store.get(-5), None);
    }

    #[test]
    fn block_write_is_all_or_nothing() {
        let mut store = DataStore::new();
        assert_eq!(store.write_block(1022, &[1, 2, 3]), Err(Fault::StoreExhausted));
        assert_eq!(store.words(1020..1024), &[0, 0, 0, 0]);

        store.write_block(1021, &[1, 2, 3]).unwrap();
        assert_eq!(store.read_block(1021, 3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn negative_length_faults() {
        let store = DataStore::new();
        assert_eq!(store.read_block(10, -1), Err(Fault::StoreExhausted));
        assert_eq!(store.read_block(10, 0).unwrap(), Vec::<Word>::new());
    }

    #[test]
    fn words_clamps_range() {
        let store = DataStore::new();
        assert_eq!(store.words(-3..2).len(), 2);
        assert_eq!(store.words(1000..2000).len(), 24);
        assert!(store.words(5..2).is_empty());
    }
}
