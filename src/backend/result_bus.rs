use crate::instructions::instructions::{RegisterType, Tag};

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum CDBState {
    IDLE,
    BUSY,
}

/// A single common data bus. While busy it carries the tag of the producing
/// instruction and the register the result is meant for.
pub(crate) struct CDB {
    pub(crate) index: u16,
    pub(crate) state: CDBState,
    pub(crate) tag: Tag,
    pub(crate) dest_reg: RegisterType,
}

impl CDB {
    fn reset(&mut self) {
        self.state = CDBState::IDLE;
        self.tag = 0;
        self.dest_reg = 0;
    }
}

/// The pool of result buses. A bus is acquired in the first half of a cycle
/// and every bus is released again after the broadcast in the second half.
pub(crate) struct CDBTable {
    pub(crate) capacity: u16,
    idle_stack: Vec<u16>,
    array: Vec<CDB>,
}

impl CDBTable {
    pub(crate) fn new(capacity: u16) -> CDBTable {
        let mut idle_stack = Vec::with_capacity(capacity as usize);
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(CDB {
                index: i,
                state: CDBState::IDLE,
                tag: 0,
                dest_reg: 0,
            });
            // lowest index on top of the stack
            idle_stack.push(capacity - 1 - i);
        }

        CDBTable { capacity, idle_stack, array }
    }

    pub(crate) fn has_idle(&self) -> bool {
        !self.idle_stack.is_empty()
    }

    pub(crate) fn busy_count(&self) -> usize {
        self.capacity as usize - self.idle_stack.len()
    }

    pub(crate) fn allocate(&mut self, tag: Tag, dest_reg: RegisterType) -> u16 {
        if let Some(cdb_index) = self.idle_stack.pop() {
            let cdb = &mut self.array[cdb_index as usize];
            debug_assert!(cdb.state == CDBState::IDLE);

            cdb.state = CDBState::BUSY;
            cdb.tag = tag;
            cdb.dest_reg = dest_reg;
            cdb_index
        } else {
            panic!("No idle CDB")
        }
    }

    pub(crate) fn busy(&self) -> impl Iterator<Item=&CDB> {
        self.array.iter().filter(|cdb| cdb.state == CDBState::BUSY)
    }

    pub(crate) fn release_all(&mut self) {
        self.idle_stack.clear();
        for cdb in self.array.iter_mut().rev() {
            cdb.reset();
            self.idle_stack.push(cdb.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate() {
        let mut cdb_table = CDBTable::new(2);
        assert!(cdb_table.has_idle());

        let index = cdb_table.allocate(7, 3);
        assert_eq!(index, 0);
        assert_eq!(cdb_table.busy_count(), 1);

        let busy: Vec<(Tag, RegisterType)> = cdb_table.busy().map(|cdb| (cdb.tag, cdb.dest_reg)).collect();
        assert_eq!(busy, vec![(7, 3)]);

        cdb_table.allocate(8, 4);
        assert!(!cdb_table.has_idle());
    }

    #[test]
    fn test_release_all() {
        let mut cdb_table = CDBTable::new(3);
        cdb_table.allocate(1, 1);
        cdb_table.allocate(2, 2);
        cdb_table.release_all();

        assert_eq!(cdb_table.busy_count(), 0);
        assert_eq!(cdb_table.busy().count(), 0);
        assert_eq!(cdb_table.allocate(3, 3), 0);
    }

    #[test]
    #[should_panic]
    fn test_allocate_when_none_idle() {
        let mut cdb_table = CDBTable::new(1);
        cdb_table.allocate(1, 1);
        cdb_table.allocate(2, 2);
    }
}
