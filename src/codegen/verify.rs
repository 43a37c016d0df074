use super::ir::{BlockId, Operand, RoutineIr, Terminator};
use crate::constants::MAX_REGISTERS;
use crate::{Error, Result};

/// Control-flow facts established by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCfg {
    /// Reachable blocks, every block before its successors.
    pub order: Vec<BlockId>,
}

impl VerifiedCfg {
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.order.contains(&block)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Check that `ir` is well formed enough to lower.
pub fn verify(ir: &RoutineIr) -> Result<VerifiedCfg> {
    let fail = |reason: String| Error::verification(ir.name.as_str(), reason);

    if let Some(defect) = ir.defects.first() {
        return Err(fail(defect.clone()));
    }
    if ir.blocks.is_empty() {
        return Err(fail("routine has no entry block".to_string()));
    }
    if ir.num_regs > MAX_REGISTERS {
        return Err(fail(format!(
            "routine uses {} registers, limit is {MAX_REGISTERS}",
            ir.num_regs
        )));
    }

    let mut defined = vec![false; ir.num_regs];
    for block in &ir.blocks {
        let Some(terminator) = block.terminator else {
            return Err(fail(format!("block {} has no terminator", block.name)));
        };
        for target in terminator.successors() {
            if ir.block(target).is_none() {
                return Err(fail(format!(
                    "block {} branches to missing bb{}",
                    block.name,
                    target.index()
                )));
            }
        }
        for inst in &block.insts {
            for reg in inst.defs() {
                match defined.get_mut(reg.index()) {
                    Some(seen) if *seen => {
                        return Err(fail(format!("{reg} is defined more than once")));
                    }
                    Some(seen) => *seen = true,
                    None => return Err(fail(format!("{reg} was never allocated"))),
                }
            }
            for range in inst.writes() {
                if range.end > ir.tuple_size {
                    return Err(fail(format!(
                        "`{inst}` writes bytes {}..{} past tuple size {}",
                        range.start, range.end, ir.tuple_size
                    )));
                }
            }
        }
    }

    let order = topological_order(ir).map_err(fail)?;
    check_defined_before_use(ir, &order).map_err(fail)?;
    Ok(VerifiedCfg { order })
}

fn topological_order(ir: &RoutineIr) -> std::result::Result<Vec<BlockId>, String> {
    let mut marks = vec![Mark::Unvisited; ir.blocks.len()];
    let mut postorder = Vec::with_capacity(ir.blocks.len());
    let mut stack = vec![(BlockId::ENTRY, 0usize)];
    marks[BlockId::ENTRY.index()] = Mark::Active;

    while let Some((block, next)) = stack.pop() {
        let successors = ir.blocks[block.index()]
            .terminator
            .map(|terminator| terminator.successors())
            .unwrap_or_default();
        match successors.get(next) {
            Some(&succ) => {
                stack.push((block, next + 1));
                match marks[succ.index()] {
                    Mark::Active => {
                        return Err(format!(
                            "cycle through block {}",
                            ir.blocks[succ.index()].name
                        ));
                    }
                    Mark::Unvisited => {
                        marks[succ.index()] = Mark::Active;
                        stack.push((succ, 0));
                    }
                    Mark::Done => {}
                }
            }
            None => {
                marks[block.index()] = Mark::Done;
                postorder.push(block);
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}

fn check_defined_before_use(ir: &RoutineIr, order: &[BlockId]) -> std::result::Result<(), String> {
    // Registers definitely defined on entry to each block, as bitsets.
    let mut live_in: Vec<Option<u64>> = vec![None; ir.blocks.len()];
    live_in[BlockId::ENTRY.index()] = Some(0);

    for &id in order {
        let block = &ir.blocks[id.index()];
        let mut defined = live_in[id.index()].unwrap_or(0);
        let check = |reg: super::ir::Reg, defined: u64, site: &dyn std::fmt::Display| {
            if defined & (1 << reg.index()) == 0 {
                Err(format!("{reg} used by `{site}` in {} before definition", block.name))
            } else {
                Ok(())
            }
        };
        for inst in &block.insts {
            for reg in inst.uses() {
                check(reg, defined, inst)?;
            }
            for reg in inst.defs() {
                defined |= 1 << reg.index();
            }
        }
        if let Some(Terminator::CondBr {
            cond: Operand::Reg(reg),
            ..
        }) = block.terminator
        {
            check(reg, defined, &"br")?;
        }
        if let Some(terminator) = block.terminator {
            for succ in terminator.successors() {
                let slot = &mut live_in[succ.index()];
                *slot = Some(slot.map_or(defined, |existing| existing & defined));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::builder::RoutineBuilder;
    use crate::codegen::ir::NullTest;
    use crate::tuple::{NullIndicator, ScalarType};

    fn diamond() -> RoutineBuilder {
        let mut builder = RoutineBuilder::new("Diamond", 8);
        let (left, right) = builder.create_if_else_blocks("left", "right");
        let cond = builder.call_is_null(NullTest::Default);
        builder.cond_br(Operand::Reg(cond), left, right);
        builder.set_insert_point(left);
        builder.set_null(NullIndicator::new(4, 1));
        builder.ret(true);
        builder.set_insert_point(right);
        builder
    }

    #[rstest::rstest]
    fn test_accepts_well_formed_routine() {
        let mut builder = diamond();
        builder.ret(false);
        let cfg = verify(&builder.finish()).unwrap();
        assert_eq!(cfg.order[0], BlockId::ENTRY);
        assert_eq!(cfg.order.len(), 3);
    }

    #[rstest::rstest]
    fn test_rejects_missing_terminator() {
        let err = verify(&diamond().finish()).unwrap_err();
        assert!(err.to_string().contains("block right has no terminator"));
    }

    #[rstest::rstest]
    fn test_rejects_cycle() {
        let mut builder = diamond();
        builder.cond_br(Operand::Const(true), BlockId::ENTRY, BlockId::ENTRY);
        let err = verify(&builder.finish()).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[rstest::rstest]
    fn test_rejects_use_on_path_without_definition() {
        let mut builder = RoutineBuilder::new("Leaky", 8);
        let (parse, skip) = builder.create_if_else_blocks("parse", "skip");
        let join = builder.append_block("join");
        let cond = builder.len_is_zero();
        builder.cond_br(Operand::Reg(cond), skip, parse);
        builder.set_insert_point(parse);
        let (value, _) = builder.call_parse(ScalarType::I32);
        builder.cond_br(Operand::Const(true), join, join);
        builder.set_insert_point(skip);
        builder.cond_br(Operand::Const(true), join, join);
        builder.set_insert_point(join);
        builder.store(0, ScalarType::I32, value, NullIndicator::new(4, 1));
        builder.ret(true);

        let err = verify(&builder.finish()).unwrap_err();
        assert!(err.to_string().contains("before definition"), "{err}");
    }

    #[rstest::rstest]
    fn test_rejects_store_past_tuple() {
        let mut builder = RoutineBuilder::new("Wide", 4);
        let (value, _) = builder.call_parse(ScalarType::I64);
        builder.store(0, ScalarType::I64, value, NullIndicator::new(3, 1));
        builder.ret(true);
        let err = verify(&builder.finish()).unwrap_err();
        assert!(err.to_string().contains("past tuple size 4"));
    }

    #[rstest::rstest]
    fn test_reports_builder_defects() {
        let mut builder = RoutineBuilder::new("Twice", 4);
        builder.ret(true);
        builder.ret(true);
        let err = verify(&builder.finish()).unwrap_err();
        assert!(matches!(err, Error::Verification { .. }));
        assert!(err.to_string().contains("terminated twice"));
    }
}
