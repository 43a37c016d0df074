use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use super::ir::{BlockId, Inst, NullTest, Operand, RoutineIr, Terminator};
use super::routine::{BlockFn, Frame, Routine};
use super::verify::verify;
use crate::constants::POINTER_SIZE;
use crate::parse::{ParseFn, ParserTable};
use crate::text::{generic_is_null_string, is_null_string};
use crate::tuple::{NullIndicator, ScalarType, SlotValue};
use crate::Result;

/// Turns assembled IR into an invocable [`Routine`].
///
/// Implementations must verify the IR and either produce a routine with the
/// IR's exact behavior, calling `parsers` for every `Parse` instruction, or
/// fail. Implementations outside this crate build their result with
/// [`Routine::from_fn`].
pub trait Backend: Send + Sync {
    fn finalize(&self, ir: RoutineIr, parsers: &ParserTable) -> Result<Routine>;
}

type Step = Box<dyn Fn(&mut Frame<'_, '_>) + Send + Sync>;

/// Lowers each reachable block into a closure with every type decision,
/// parser lookup and constant branch resolved up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosureBackend;

impl ClosureBackend {
    fn lower_block(
        &self,
        ir: &RoutineIr,
        id: BlockId,
        parsers: &ParserTable,
        lowered: &FxHashMap<BlockId, BlockFn>,
    ) -> BlockFn {
        let block = &ir.blocks[id.index()];
        let steps: Box<[Step]> = block.insts.iter().map(|inst| self.lower_inst(inst, parsers)).collect();

        // Verified: every block is terminated and successors are lowered first.
        let terminator = block.terminator.unwrap_or(Terminator::Ret(false));
        match terminator {
            Terminator::Ret(value) if steps.is_empty() => Arc::new(move |_: &mut Frame<'_, '_>| value),
            Terminator::Ret(value) => Arc::new(move |frame: &mut Frame<'_, '_>| {
                run(&steps, frame);
                value
            }),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let then_fn = Arc::clone(&lowered[&then_block]);
                let else_fn = Arc::clone(&lowered[&else_block]);
                match cond {
                    Operand::Const(true) => chain(steps, then_fn),
                    Operand::Const(false) => chain(steps, else_fn),
                    Operand::Reg(_) if then_block == else_block => chain(steps, then_fn),
                    Operand::Reg(reg) => {
                        let reg = reg.index();
                        Arc::new(move |frame: &mut Frame<'_, '_>| {
                            run(&steps, frame);
                            if frame.regs[reg] != 0 {
                                then_fn(frame)
                            } else {
                                else_fn(frame)
                            }
                        })
                    }
                }
            }
        }
    }

    fn lower_inst(&self, inst: &Inst, parsers: &ParserTable) -> Step {
        match inst {
            Inst::IsNull {
                dst,
                test: NullTest::Default,
            } => {
                let dst = dst.index();
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    frame.regs[dst] = u64::from(is_null_string(frame.data));
                })
            }
            Inst::IsNull {
                dst,
                test: NullTest::Sentinel(sentinel),
            } => {
                let dst = dst.index();
                let sentinel: Box<[u8]> = sentinel.as_bytes().into();
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    frame.regs[dst] = u64::from(generic_is_null_string(frame.data, &sentinel));
                })
            }
            Inst::LenIsZero { dst } => {
                let dst = dst.index();
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    frame.regs[dst] = u64::from(frame.data.is_empty());
                })
            }
            Inst::Parse { value, outcome, ty } => {
                let (value, outcome) = (value.index(), outcome.index());
                match ty {
                    ScalarType::Bool => lower_parse(bool::parser(parsers), value, outcome),
                    ScalarType::I8 => lower_parse(i8::parser(parsers), value, outcome),
                    ScalarType::I16 => lower_parse(i16::parser(parsers), value, outcome),
                    ScalarType::I32 => lower_parse(i32::parser(parsers), value, outcome),
                    ScalarType::I64 => lower_parse(i64::parser(parsers), value, outcome),
                    ScalarType::F32 => lower_parse(f32::parser(parsers), value, outcome),
                    ScalarType::F64 => lower_parse(f64::parser(parsers), value, outcome),
                }
            }
            Inst::OutcomeIs {
                dst,
                outcome,
                expected,
            } => {
                let (dst, outcome, expected) = (dst.index(), outcome.index(), *expected as u64);
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    frame.regs[dst] = u64::from(frame.regs[outcome] == expected);
                })
            }
            Inst::Or { dst, lhs, rhs } => {
                let (dst, lhs, rhs) = (dst.index(), lhs.index(), rhs.index());
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    frame.regs[dst] = u64::from(frame.regs[lhs] != 0 || frame.regs[rhs] != 0);
                })
            }
            Inst::Store {
                offset,
                ty,
                src,
                null,
            } => {
                let (offset, src, null) = (*offset, src.index(), *null);
                match ty {
                    ScalarType::Bool => lower_store::<bool>(offset, src, null),
                    ScalarType::I8 => lower_store::<i8>(offset, src, null),
                    ScalarType::I16 => lower_store::<i16>(offset, src, null),
                    ScalarType::I32 => lower_store::<i32>(offset, src, null),
                    ScalarType::I64 => lower_store::<i64>(offset, src, null),
                    ScalarType::F32 => lower_store::<f32>(offset, src, null),
                    ScalarType::F64 => lower_store::<f64>(offset, src, null),
                }
            }
            Inst::StorePtr { offset } => {
                let range = *offset..*offset + POINTER_SIZE;
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    let ptr = frame.data.as_ptr() as usize;
                    frame.tuple[range.clone()].copy_from_slice(&ptr.to_ne_bytes());
                })
            }
            Inst::StoreLen {
                offset,
                max_len: Some(max_len),
                null,
            } => {
                let (range, max_len, null) = (*offset..*offset + 4, *max_len, *null);
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    let len = field_len(frame.data).min(max_len);
                    frame.tuple[range.clone()].copy_from_slice(&len.to_ne_bytes());
                    null.clear(frame.tuple);
                })
            }
            Inst::StoreLen {
                offset,
                max_len: None,
                null,
            } => {
                let (range, null) = (*offset..*offset + 4, *null);
                Box::new(move |frame: &mut Frame<'_, '_>| {
                    let len = field_len(frame.data);
                    frame.tuple[range.clone()].copy_from_slice(&len.to_ne_bytes());
                    null.clear(frame.tuple);
                })
            }
            Inst::SetNull { null } => {
                let null = *null;
                Box::new(move |frame: &mut Frame<'_, '_>| null.set(frame.tuple))
            }
        }
    }
}

impl Backend for ClosureBackend {
    fn finalize(&self, ir: RoutineIr, parsers: &ParserTable) -> Result<Routine> {
        let cfg = verify(&ir)?;
        trace!(routine = %ir.name, reachable = cfg.order.len(), "lowering routine\n{ir}");

        let mut lowered: FxHashMap<BlockId, BlockFn> = FxHashMap::default();
        for &id in cfg.order.iter().rev() {
            let block_fn = self.lower_block(&ir, id, parsers, &lowered);
            lowered.insert(id, block_fn);
        }
        let entry = lowered
            .remove(&BlockId::ENTRY)
            .unwrap_or_else(|| Arc::new(|_: &mut Frame<'_, '_>| false));
        Ok(Routine::new(ir, entry))
    }
}

/// Prefix `target` with a block's straight-line steps, if it has any.
fn chain(steps: Box<[Step]>, target: BlockFn) -> BlockFn {
    if steps.is_empty() {
        return target;
    }
    Arc::new(move |frame: &mut Frame<'_, '_>| {
        run(&steps, frame);
        target(frame)
    })
}

#[inline]
fn run(steps: &[Step], frame: &mut Frame<'_, '_>) {
    for step in steps {
        step(frame);
    }
}

/// Field lengths past `u32::MAX` saturate; the scanner never produces them.
#[inline]
fn field_len(data: &[u8]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}

fn lower_parse<T: SlotValue>(parser: ParseFn<T>, value: usize, outcome: usize) -> Step {
    Box::new(move |frame: &mut Frame<'_, '_>| {
        let (parsed, result) = parser(frame.data);
        frame.regs[value] = parsed.to_word();
        frame.regs[outcome] = result as u64;
    })
}

fn lower_store<T: SlotValue>(offset: usize, src: usize, null: NullIndicator) -> Step {
    Box::new(move |frame: &mut Frame<'_, '_>| {
        T::from_word(frame.regs[src]).write_to(&mut frame.tuple[offset..]);
        null.clear(frame.tuple);
    })
}
