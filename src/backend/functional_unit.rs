use crate::instructions::instructions::{OP_CLASS_COUNT, OpClass};

/// The functional units, counted per op class. A unit is taken when an
/// instruction fires and given back when its result has been broadcast.
pub(crate) struct FUPool {
    capacity: [u16; OP_CLASS_COUNT],
    idle: [u16; OP_CLASS_COUNT],
}

impl FUPool {
    pub(crate) fn new(fu_count: [u16; OP_CLASS_COUNT]) -> FUPool {
        FUPool { capacity: fu_count, idle: fu_count }
    }

    pub(crate) fn has_idle(&self, op_class: OpClass) -> bool {
        self.idle[op_class.index()] > 0
    }

    pub(crate) fn idle(&self, op_class: OpClass) -> u16 {
        self.idle[op_class.index()]
    }

    pub(crate) fn capacity(&self, op_class: OpClass) -> u16 {
        self.capacity[op_class.index()]
    }

    pub(crate) fn allocate(&mut self, op_class: OpClass) {
        let idle = &mut self.idle[op_class.index()];
        assert!(*idle > 0, "FUPool: no idle functional unit for {}", op_class);
        *idle -= 1;
    }

    pub(crate) fn deallocate(&mut self, op_class: OpClass) {
        let index = op_class.index();
        debug_assert!(self.idle[index] < self.capacity[index],
                      "FUPool: deallocate of {} while all units are idle", op_class);
        self.idle[index] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_deallocate() {
        let mut pool = FUPool::new([1, 2, 0]);
        assert!(pool.has_idle(OpClass::K0));
        assert!(!pool.has_idle(OpClass::K2));

        pool.allocate(OpClass::K0);
        assert!(!pool.has_idle(OpClass::K0));
        assert_eq!(pool.idle(OpClass::K1), 2);

        pool.deallocate(OpClass::K0);
        assert_eq!(pool.idle(OpClass::K0), pool.capacity(OpClass::K0));
    }

    #[test]
    #[should_panic]
    fn test_allocate_without_units() {
        let mut pool = FUPool::new([1, 1, 0]);
        pool.allocate(OpClass::K2);
    }
}
