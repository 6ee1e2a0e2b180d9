use std::fmt;

use crate::frontend::frontend::InstrSource;

pub(crate) type RegisterType = u16;
// The sequence number of an instruction; starts at 1.
pub(crate) type InstrId = u64;
// The id of the instruction that is going to produce a value.
pub(crate) type Tag = InstrId;
pub(crate) type CycleType = u64;

// The number of op classes; every op class has its own pool of functional units.
pub(crate) const OP_CLASS_COUNT: usize = 3;
// The number of source operands of an instruction.
pub(crate) const SOURCE_COUNT: usize = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum OpClass {
    K0,
    K1,
    K2,
}

impl OpClass {
    pub(crate) const ALL: [OpClass; OP_CLASS_COUNT] = [OpClass::K0, OpClass::K1, OpClass::K2];

    pub(crate) fn index(self) -> usize {
        match self {
            OpClass::K0 => 0,
            OpClass::K1 => 1,
            OpClass::K2 => 2,
        }
    }

    // A trace uses -1 for instructions without a specific class; they run on the k1 units.
    pub(crate) fn from_code(code: i64) -> Option<OpClass> {
        match code {
            0 => Some(OpClass::K0),
            -1 | 1 => Some(OpClass::K1),
            2 => Some(OpClass::K2),
            _ => None,
        }
    }
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.index())
    }
}

struct Reg(Option<RegisterType>);

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(reg) => write!(f, "R{}", reg),
            None => write!(f, "-"),
        }
    }
}

/// An instruction as it comes out of a trace, before it enters the pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct RawInstr {
    pub(crate) address: u64,
    pub(crate) op_class: OpClass,
    pub(crate) dest_reg: Option<RegisterType>,
    pub(crate) src_reg: [Option<RegisterType>; SOURCE_COUNT],
}

impl RawInstr {
    pub(crate) fn new(op_class: OpClass,
                      dest_reg: Option<RegisterType>,
                      src_reg: [Option<RegisterType>; SOURCE_COUNT]) -> Self {
        Self { address: 0, op_class, dest_reg, src_reg }
    }
}

impl fmt::Display for RawInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x} {} {} <- {}, {}",
               self.address, self.op_class, Reg(self.dest_reg), Reg(self.src_reg[0]), Reg(self.src_reg[1]))
    }
}

/// An in-flight (or retired) instruction.
///
/// A cycle field of 0 means the instruction hasn't reached that stage yet.
#[derive(Clone, Debug)]
pub(crate) struct Instr {
    pub(crate) id: InstrId,
    pub(crate) op_class: OpClass,
    pub(crate) src_reg: [Option<RegisterType>; SOURCE_COUNT],
    pub(crate) dest_reg: Option<RegisterType>,
    pub(crate) src_ready: [bool; SOURCE_COUNT],
    // only meaningful while the corresponding src_ready is false
    pub(crate) src_tag: [Tag; SOURCE_COUNT],
    // a slot in the scheduling window has been reserved for this instruction
    pub(crate) reserved: bool,
    // eligible to fire: both source operands are ready
    pub(crate) fire: bool,
    pub(crate) fired: bool,
    pub(crate) executed: bool,
    pub(crate) cycle_fetch_decode: CycleType,
    pub(crate) cycle_dispatch: CycleType,
    pub(crate) cycle_schedule: CycleType,
    pub(crate) cycle_fire: CycleType,
    pub(crate) cycle_execute: CycleType,
    pub(crate) cycle_state_update: CycleType,
}

impl Instr {
    fn new(id: InstrId, raw: &RawInstr, cycle: CycleType) -> Self {
        Self {
            id,
            op_class: raw.op_class,
            src_reg: raw.src_reg,
            dest_reg: raw.dest_reg,
            src_ready: [raw.src_reg[0].is_none(), raw.src_reg[1].is_none()],
            src_tag: [0; SOURCE_COUNT],
            reserved: false,
            fire: false,
            fired: false,
            executed: false,
            cycle_fetch_decode: cycle,
            // provisional; the instruction enters the dispatch queue at the next cycle.
            cycle_dispatch: cycle + 1,
            cycle_schedule: 0,
            cycle_fire: 0,
            cycle_execute: 0,
            cycle_state_update: 0,
        }
    }

    pub(crate) fn sources_ready(&self) -> bool {
        self.src_ready.iter().all(|ready| *ready)
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.cycle_state_update != 0
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {} <- {}, {}",
               self.id, self.op_class, Reg(self.dest_reg), Reg(self.src_reg[0]), Reg(self.src_reg[1]))
    }
}

/// Owns every instruction that has been fetched. The dispatch queue and the
/// scheduling window only refer to instructions by id.
pub(crate) struct InstrTable {
    entries: Vec<Instr>,
}

impl InstrTable {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn allocate(&mut self, raw: &RawInstr, cycle: CycleType) -> InstrId {
        let id = self.entries.len() as InstrId + 1;
        self.entries.push(Instr::new(id, raw, cycle));
        id
    }

    pub(crate) fn get(&self, id: InstrId) -> &Instr {
        debug_assert!(id > 0, "instruction ids start at 1");
        &self.entries[(id - 1) as usize]
    }

    pub(crate) fn get_mut(&mut self, id: InstrId) -> &mut Instr {
        debug_assert!(id > 0, "instruction ids start at 1");
        &mut self.entries[(id - 1) as usize]
    }

    pub(crate) fn size(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=&Instr> {
        self.entries.iter()
    }
}

/// An in memory instruction trace.
pub(crate) struct Program {
    pub(crate) code: Vec<RawInstr>,
    pos: usize,
}

impl Program {
    pub(crate) fn new(code: Vec<RawInstr>) -> Self {
        Self { code, pos: 0 }
    }
}

impl InstrSource for Program {
    fn next_instr(&mut self) -> Option<RawInstr> {
        let instr = self.code.get(self.pos).copied();
        if instr.is_some() {
            self.pos += 1;
        }
        instr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_class_from_code() {
        assert_eq!(OpClass::from_code(0), Some(OpClass::K0));
        assert_eq!(OpClass::from_code(1), Some(OpClass::K1));
        assert_eq!(OpClass::from_code(2), Some(OpClass::K2));
        assert_eq!(OpClass::from_code(-1), Some(OpClass::K1));
        assert_eq!(OpClass::from_code(3), None);
    }

    #[test]
    fn test_allocate() {
        let mut table = InstrTable::new();
        let raw = RawInstr::new(OpClass::K2, Some(4), [Some(1), None]);
        let id = table.allocate(&raw, 7);
        assert_eq!(id, 1);
        assert_eq!(table.allocate(&raw, 7), 2);

        let instr = table.get(id);
        assert_eq!(instr.op_class, OpClass::K2);
        assert_eq!(instr.cycle_fetch_decode, 7);
        assert_eq!(instr.cycle_dispatch, 8);
        assert_eq!(instr.cycle_schedule, 0);
        assert_eq!(instr.src_ready, [false, true]);
        assert!(!instr.fire && !instr.fired && !instr.executed);
        assert!(!instr.is_retired());
    }

    #[test]
    fn test_program_exhausts() {
        let raw = RawInstr::new(OpClass::K0, None, [None, None]);
        let mut program = Program::new(vec![raw, raw]);
        assert!(program.next_instr().is_some());
        assert!(program.next_instr().is_some());
        assert!(program.next_instr().is_none());
        assert!(program.next_instr().is_none());
    }

    #[test]
    fn test_display() {
        let mut table = InstrTable::new();
        let id = table.allocate(&RawInstr::new(OpClass::K1, Some(3), [Some(1), None]), 1);
        assert_eq!(format!("{}", table.get(id)), "#1 k1 R3 <- R1, -");
    }
}
