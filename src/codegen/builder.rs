use smol_str::SmolStr;

use super::ir::{Block, BlockId, Inst, NullTest, Operand, Reg, RoutineIr, Terminator};
use crate::parse::ParseOutcome;
use crate::tuple::{NullIndicator, ScalarType};

/// Assembles a [`RoutineIr`] one block at a time.
///
/// The builder never fails; misuse is recorded and reported by the verifier
/// when the routine is finalized.
#[derive(Debug)]
pub struct RoutineBuilder {
    ir: RoutineIr,
    insert_point: BlockId,
}

impl RoutineBuilder {
    /// Declare a routine with an empty `entry` block as insert point.
    pub fn new(name: impl Into<SmolStr>, tuple_size: usize) -> Self {
        Self {
            ir: RoutineIr {
                name: name.into(),
                tuple_size,
                blocks: vec![Block::new("entry")],
                num_regs: 0,
                defects: Vec::new(),
            },
            insert_point: BlockId::ENTRY,
        }
    }

    pub fn append_block(&mut self, name: impl Into<SmolStr>) -> BlockId {
        self.ir.blocks.push(Block::new(name));
        BlockId(self.ir.blocks.len() - 1)
    }

    pub fn create_if_else_blocks(
        &mut self,
        if_name: impl Into<SmolStr>,
        else_name: impl Into<SmolStr>,
    ) -> (BlockId, BlockId) {
        (self.append_block(if_name), self.append_block(else_name))
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.insert_point = block;
    }

    pub fn insert_point(&self) -> BlockId {
        self.insert_point
    }

    fn fresh_reg(&mut self) -> Reg {
        let reg = Reg(self.ir.num_regs);
        self.ir.num_regs += 1;
        reg
    }

    fn push(&mut self, inst: Inst) {
        match self.ir.blocks.get_mut(self.insert_point.0) {
            Some(block) if block.terminator.is_some() => {
                let message = format!("instruction `{inst}` after terminator in {}", block.name);
                self.ir.defects.push(message);
            }
            Some(block) => block.insts.push(inst),
            None => self
                .ir
                .defects
                .push(format!("insert point bb{} does not exist", self.insert_point.0)),
        }
    }

    fn terminate(&mut self, terminator: Terminator) {
        match self.ir.blocks.get_mut(self.insert_point.0) {
            Some(block) if block.terminator.is_some() => {
                let message = format!("block {} terminated twice", block.name);
                self.ir.defects.push(message);
            }
            Some(block) => block.terminator = Some(terminator),
            None => self
                .ir
                .defects
                .push(format!("insert point bb{} does not exist", self.insert_point.0)),
        }
    }

    pub fn call_is_null(&mut self, test: NullTest) -> Reg {
        let dst = self.fresh_reg();
        self.push(Inst::IsNull { dst, test });
        dst
    }

    pub fn len_is_zero(&mut self) -> Reg {
        let dst = self.fresh_reg();
        self.push(Inst::LenIsZero { dst });
        dst
    }

    /// Call the typed parser; returns `(value, outcome)` registers.
    pub fn call_parse(&mut self, ty: ScalarType) -> (Reg, Reg) {
        let value = self.fresh_reg();
        let outcome = self.fresh_reg();
        self.push(Inst::Parse { value, outcome, ty });
        (value, outcome)
    }

    pub fn outcome_is(&mut self, outcome: Reg, expected: ParseOutcome) -> Reg {
        let dst = self.fresh_reg();
        self.push(Inst::OutcomeIs {
            dst,
            outcome,
            expected,
        });
        dst
    }

    pub fn or(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        let dst = self.fresh_reg();
        self.push(Inst::Or { dst, lhs, rhs });
        dst
    }

    pub fn store(&mut self, offset: usize, ty: ScalarType, src: Reg, null: NullIndicator) {
        self.push(Inst::Store {
            offset,
            ty,
            src,
            null,
        });
    }

    pub fn store_data_ptr(&mut self, offset: usize) {
        self.push(Inst::StorePtr { offset });
    }

    pub fn store_len(&mut self, offset: usize, max_len: Option<u32>, null: NullIndicator) {
        self.push(Inst::StoreLen {
            offset,
            max_len,
            null,
        });
    }

    pub fn set_null(&mut self, null: NullIndicator) {
        self.push(Inst::SetNull { null });
    }

    pub fn cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: bool) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn finish(self) -> RoutineIr {
        self.ir
    }
}
