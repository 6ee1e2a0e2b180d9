use crate::instructions::instructions::{RegisterType, Tag};

pub(crate) struct RegEntry {
    pub(crate) ready: bool,
    // The instruction that is going to write this register; only valid if not ready.
    pub(crate) tag: Tag,
}

/// The architectural register file. There is no renaming: a register that is
/// claimed by a dispatching instruction is not ready until that instruction
/// broadcasts its result. A younger writer simply overwrites the claim of an
/// older one, so the broadcast of the older writer leaves the register pending.
pub(crate) struct RegFile {
    entries: Vec<RegEntry>,
}

impl RegFile {
    pub(crate) fn new(register_count: u16) -> RegFile {
        let mut entries = Vec::with_capacity(register_count as usize);
        for _ in 0..register_count {
            entries.push(RegEntry { ready: true, tag: 0 });
        }

        RegFile { entries }
    }

    pub(crate) fn get(&self, reg: RegisterType) -> &RegEntry {
        &self.entries[reg as usize]
    }

    pub(crate) fn claim(&mut self, reg: RegisterType, tag: Tag) {
        let entry = &mut self.entries[reg as usize];
        entry.ready = false;
        entry.tag = tag;
    }

    // Makes the register ready if it is still claimed by the given tag.
    pub(crate) fn resolve(&mut self, reg: RegisterType, tag: Tag) -> bool {
        let entry = &mut self.entries[reg as usize];
        if entry.ready || entry.tag != tag {
            return false;
        }

        entry.ready = true;
        entry.tag = 0;
        true
    }

    pub(crate) fn count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_ready() {
        let reg_file = RegFile::new(64);
        assert_eq!(reg_file.count(), 64);
        assert!(reg_file.get(0).ready);
        assert!(reg_file.get(63).ready);
    }

    #[test]
    fn test_claim_and_resolve() {
        let mut reg_file = RegFile::new(8);
        reg_file.claim(3, 10);
        assert!(!reg_file.get(3).ready);
        assert_eq!(reg_file.get(3).tag, 10);

        assert!(reg_file.resolve(3, 10));
        assert!(reg_file.get(3).ready);

        // a second broadcast of the same tag is a no-op
        assert!(!reg_file.resolve(3, 10));
    }

    #[test]
    fn test_last_writer_wins() {
        let mut reg_file = RegFile::new(8);
        reg_file.claim(5, 1);
        reg_file.claim(5, 2);

        assert!(!reg_file.resolve(5, 1));
        assert!(!reg_file.get(5).ready);
        assert_eq!(reg_file.get(5).tag, 2);

        assert!(reg_file.resolve(5, 2));
        assert!(reg_file.get(5).ready);
    }
}
