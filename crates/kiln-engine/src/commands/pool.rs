use crate::device::FrameError;

/// Bounded, growable storage for command-list entries.
///
/// Grows by doubling until `cap`. Entries are never dropped while the pool
/// lives, so their backing objects are reused frame after frame.
#[derive(Debug)]
pub struct CommandListPool<T> {
    entries: Vec<T>,
    cap: usize,
}

impl<T> CommandListPool<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Entries allocated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Makes sure at least `count` entries exist, creating new ones with `make`.
    pub fn ensure(&mut self, count: usize, mut make: impl FnMut(usize) -> T) -> Result<(), FrameError> {
        if count > self.cap {
            return Err(FrameError::CommandListCapExceeded { cap: self.cap });
        }
        if count <= self.entries.len() {
            return Ok(());
        }

        let grown = (self.entries.len() * 2).max(1).max(count).min(self.cap);
        log::debug!("command list pool grows {} -> {grown}", self.entries.len());
        self.entries.reserve_exact(grown - self.entries.len());
        while self.entries.len() < grown {
            let index = self.entries.len();
            self.entries.push(make(index));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    /// The first `count` entries, in allocation order.
    pub fn head_mut(&mut self, count: usize) -> &mut [T] {
        let count = count.min(self.entries.len());
        &mut self.entries[..count]
    }
}
