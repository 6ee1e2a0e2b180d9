use crate::instructions::instructions::InstrId;

/// The instructions between dispatch and retirement, acting as one big pool
/// of reservation stations. Only live entries are stored; they are kept in
/// dispatch order, which makes the oldest instruction win when the stages
/// arbitrate over buses and functional units.
pub(crate) struct SchedulingWindow {
    pub(crate) capacity: usize,
    entries: Vec<InstrId>,
}

impl SchedulingWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        SchedulingWindow {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, id: InstrId) {
        assert!(self.entries.len() < self.capacity, "SchedulingWindow: can't insert {} when full", id);
        debug_assert!(!self.contains(id), "SchedulingWindow: {} is already present", id);
        self.entries.push(id);
    }

    pub(crate) fn contains(&self, id: InstrId) -> bool {
        self.entries.contains(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=InstrId> + '_ {
        self.entries.iter().copied()
    }

    // Removes every entry for which remove returns true, returning the number removed.
    pub(crate) fn remove_if<F>(&mut self, mut remove: F) -> u64
        where F: FnMut(InstrId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|id| !remove(*id));
        (before - self.entries.len()) as u64
    }
}
