use super::FrameError;

/// Index of a slot in the [`ResourceViewTable`]. Shaders address views by this value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ViewIndex(pub u32);

/// Fixed-capacity table of shader-visible resource views.
///
/// Slots are handed out lowest-first and recycled after `remove`. The table
/// never grows: running out of slots is a configuration error.
pub struct ResourceViewTable<V> {
    slots: Vec<Option<V>>,
    free: Vec<u32>,
    capacity: u32,
    live: u32,
    generation: u64,
}

impl<V> ResourceViewTable<V> {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
            live: 0,
            generation: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> u32 {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Bumped by every successful `insert`, `remove` and `replace`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One past the highest slot ever handed out. Every live index is below it.
    pub fn span(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Stores `view` in the lowest free slot.
    pub fn insert(&mut self, view: V) -> Result<ViewIndex, FrameError> {
        let index = match self.pop_lowest_free() {
            Some(index) => index,
            None => {
                let next = self.slots.len() as u32;
                if next >= self.capacity {
                    return Err(FrameError::ViewTableFull {
                        capacity: self.capacity,
                    });
                }
                self.slots.push(None);
                next
            }
        };

        self.slots[index as usize] = Some(view);
        self.live += 1;
        self.generation += 1;
        Ok(ViewIndex(index))
    }

    /// Frees a slot and returns its view.
    pub fn remove(&mut self, index: ViewIndex) -> Result<V, FrameError> {
        let view = self
            .slots
            .get_mut(index.0 as usize)
            .and_then(Option::take)
            .ok_or(FrameError::InvalidViewIndex(index.0))?;
        self.free.push(index.0);
        self.live -= 1;
        self.generation += 1;
        Ok(view)
    }

    pub fn get(&self, index: ViewIndex) -> Option<&V> {
        self.slots.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Replaces the view in an occupied slot, returning the old one.
    pub fn replace(&mut self, index: ViewIndex, view: V) -> Result<V, FrameError> {
        let slot = self
            .slots
            .get_mut(index.0 as usize)
            .filter(|slot| slot.is_some())
            .ok_or(FrameError::InvalidViewIndex(index.0))?;
        let old = slot.replace(view).ok_or(FrameError::InvalidViewIndex(index.0))?;
        self.generation += 1;
        Ok(old)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewIndex, &V)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (ViewIndex(i as u32), v)))
    }

    fn pop_lowest_free(&mut self) -> Option<u32> {
        let (pos, _) = self.free.iter().enumerate().min_by_key(|(_, index)| **index)?;
        Some(self.free.swap_remove(pos))
    }
}

/// A backend object built from a [`ResourceViewTable`] (a bind group on wgpu).
///
/// Rebuilt on first use after the table changed.
pub struct TableBinding<G> {
    built: Option<(u64, G)>,
}

impl<G> Default for TableBinding<G> {
    fn default() -> Self {
        Self { built: None }
    }
}

impl<G> TableBinding<G> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stale<V>(&self, table: &ResourceViewTable<V>) -> bool {
        self.built
            .as_ref()
            .is_none_or(|(generation, _)| *generation != table.generation())
    }

    /// Returns the object for the table's current contents, calling `build`
    /// only when the table changed since the last build.
    pub fn get_or_rebuild<V>(
        &mut self,
        table: &ResourceViewTable<V>,
        build: impl FnOnce(&ResourceViewTable<V>) -> G,
    ) -> &G {
        if self.is_stale(table) {
            self.built = None;
        }
        &self
            .built
            .get_or_insert_with(|| (table.generation(), build(table)))
            .1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_lowest_free_slot() {
        let mut table = ResourceViewTable::new(8);
        let a = table.insert("a").unwrap();
        let b = table.insert("b").unwrap();
        let c = table.insert("c").unwrap();
        assert_eq!((a, b, c), (ViewIndex(0), ViewIndex(1), ViewIndex(2)));

        table.remove(c).unwrap();
        table.remove(a).unwrap();
        assert_eq!(table.insert("d").unwrap(), ViewIndex(0));
        assert_eq!(table.insert("e").unwrap(), ViewIndex(2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn full_table_is_an_error() {
        let mut table = ResourceViewTable::new(2);
        table.insert(1).unwrap();
        table.insert(2).unwrap();
        assert_eq!(table.insert(3), Err(FrameError::ViewTableFull { capacity: 2 }));
    }

    #[test]
    fn removing_twice_fails() {
        let mut table = ResourceViewTable::new(2);
        let index = table.insert(1).unwrap();
        assert_eq!(table.remove(index), Ok(1));
        assert_eq!(table.remove(index), Err(FrameError::InvalidViewIndex(0)));
        assert!(table.is_empty());
    }

    #[test]
    fn replace_requires_occupied_slot() {
        let mut table = ResourceViewTable::new(4);
        let index = table.insert("old").unwrap();
        assert_eq!(table.replace(index, "new"), Ok("old"));
        assert_eq!(table.get(index), Some(&"new"));
        assert!(table.replace(ViewIndex(3), "x").is_err());
    }

    #[test]
    fn binding_rebuilds_only_after_the_table_changes() {
        let mut table = ResourceViewTable::new(4);
        let mut binding = TableBinding::new();
        let mut builds = 0;
        let mut build = |table: &ResourceViewTable<&str>| {
            builds += 1;
            table.len()
        };

        assert_eq!(*binding.get_or_rebuild(&table, &mut build), 0);
        assert_eq!(*binding.get_or_rebuild(&table, &mut build), 0);

        let index = table.insert("albedo").unwrap();
        assert!(binding.is_stale(&table));
        assert_eq!(*binding.get_or_rebuild(&table, &mut build), 1);

        assert!(table.remove(ViewIndex(3)).is_err());
        assert!(!binding.is_stale(&table));

        table.replace(index, "normal").unwrap();
        binding.get_or_rebuild(&table, &mut build);
        table.remove(index).unwrap();
        assert_eq!(*binding.get_or_rebuild(&table, &mut build), 0);
        assert_eq!(builds, 4);
    }

    #[test]
    fn span_covers_every_handed_out_slot() {
        let mut table = ResourceViewTable::new(4);
        assert_eq!(table.span(), 0);
        table.insert(1).unwrap();
        let b = table.insert(2).unwrap();
        table.remove(b).unwrap();
        assert_eq!(table.span(), 2);
    }
}
