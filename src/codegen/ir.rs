//! Routine IR: named blocks of instructions over virtual registers.
//!
//! A routine has three implicit arguments, `%tuple`, `%data` and `%len`, and
//! returns a boolean. Registers hold 64-bit words.

use std::fmt;

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::parse::ParseOutcome;
use crate::tuple::{NullIndicator, ScalarType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub(crate) usize);

impl Reg {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Branch condition: a register or a constant left for the backend to fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Const(bool),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => reg.fmt(f),
            Operand::Const(value) => write!(f, "{value}"),
        }
    }
}

/// Which null-string helper a routine calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NullTest {
    Default,
    Sentinel(SmolStr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// `dst = IsNullString(data, len[, sentinel])`
    IsNull { dst: Reg, test: NullTest },
    /// `dst = (len == 0)`
    LenIsZero { dst: Reg },
    /// `value = StringTo<ty>(data, len, &outcome)`
    Parse {
        value: Reg,
        outcome: Reg,
        ty: ScalarType,
    },
    /// `dst = (outcome == expected)`
    OutcomeIs {
        dst: Reg,
        outcome: Reg,
        expected: ParseOutcome,
    },
    Or { dst: Reg, lhs: Reg, rhs: Reg },
    /// Store a scalar register at `offset` and clear the slot's null bit.
    Store {
        offset: usize,
        ty: ScalarType,
        src: Reg,
        null: NullIndicator,
    },
    /// Store the `data` pointer at `offset`.
    StorePtr { offset: usize },
    /// Store `min(len, max_len)` (or `len`) at `offset` and clear the null bit.
    StoreLen {
        offset: usize,
        max_len: Option<u32>,
        null: NullIndicator,
    },
    SetNull { null: NullIndicator },
}

impl Inst {
    pub fn defs(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::IsNull { dst, .. } | Inst::LenIsZero { dst } => SmallVec::from_slice(&[*dst]),
            Inst::OutcomeIs { dst, .. } | Inst::Or { dst, .. } => SmallVec::from_slice(&[*dst]),
            Inst::Parse { value, outcome, .. } => SmallVec::from_slice(&[*value, *outcome]),
            Inst::Store { .. } | Inst::StorePtr { .. } | Inst::StoreLen { .. } | Inst::SetNull { .. } => {
                SmallVec::new()
            }
        }
    }

    pub fn uses(&self) -> SmallVec<[Reg; 2]> {
        match self {
            Inst::OutcomeIs { outcome, .. } => SmallVec::from_slice(&[*outcome]),
            Inst::Or { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            Inst::Store { src, .. } => SmallVec::from_slice(&[*src]),
            _ => SmallVec::new(),
        }
    }

    /// Tuple bytes written by this instruction.
    pub fn writes(&self) -> SmallVec<[std::ops::Range<usize>; 2]> {
        let null_range = |null: &NullIndicator| null.byte_offset..null.byte_offset + 1;
        match self {
            Inst::Store {
                offset, ty, null, ..
            } => SmallVec::from_iter([*offset..*offset + ty.byte_size(), null_range(null)]),
            Inst::StorePtr { offset } => {
                SmallVec::from_iter([*offset..*offset + crate::constants::POINTER_SIZE])
            }
            Inst::StoreLen { offset, null, .. } => {
                SmallVec::from_iter([*offset..*offset + 4, null_range(null)])
            }
            Inst::SetNull { null } => SmallVec::from_iter([null_range(null)]),
            _ => SmallVec::new(),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::IsNull {
                dst,
                test: NullTest::Default,
            } => write!(f, "{dst} = call i1 @IsNullString(%data, %len)"),
            Inst::IsNull {
                dst,
                test: NullTest::Sentinel(sentinel),
            } => write!(
                f,
                "{dst} = call i1 @GenericIsNullString(%data, %len, {sentinel:?}, {})",
                sentinel.len()
            ),
            Inst::LenIsZero { dst } => write!(f, "{dst} = icmp eq %len, 0"),
            Inst::Parse { value, outcome, ty } => {
                write!(f, "{value}, {outcome} = call {ty} @StringTo.{ty}(%data, %len)")
            }
            Inst::OutcomeIs {
                dst,
                outcome,
                expected,
            } => write!(f, "{dst} = icmp eq {outcome}, {}", *expected as u8),
            Inst::Or { dst, lhs, rhs } => write!(f, "{dst} = or i1 {lhs}, {rhs}"),
            Inst::Store {
                offset, ty, src, ..
            } => write!(f, "store {ty} {src}, %tuple+{offset}"),
            Inst::StorePtr { offset } => write!(f, "store ptr %data, %tuple+{offset}"),
            Inst::StoreLen {
                offset,
                max_len: Some(max_len),
                ..
            } => write!(f, "store i32 select(%len < {max_len}, %len, {max_len}), %tuple+{offset}"),
            Inst::StoreLen {
                offset,
                max_len: None,
                ..
            } => write!(f, "store i32 %len, %tuple+{offset}"),
            Inst::SetNull { null } => write!(
                f,
                "call void @SetNull(%tuple+{}, {:#04x})",
                null.byte_offset, null.bit_mask
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(bool),
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => SmallVec::from_slice(&[*then_block, *else_block]),
            Terminator::Ret(_) => SmallVec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: SmolStr,
    pub insts: SmallVec<[Inst; 4]>,
    pub terminator: Option<Terminator>,
}

impl Block {
    pub(crate) fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            insts: SmallVec::new(),
            terminator: None,
        }
    }
}

/// An assembled, not yet verified routine.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineIr {
    pub name: SmolStr,
    pub tuple_size: usize,
    pub blocks: Vec<Block>,
    pub num_regs: usize,
    /// Builder misuse recorded for the verifier, e.g. a second terminator.
    pub defects: Vec<String>,
}

impl RoutineIr {
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    pub fn block_by_name(&self, name: &str) -> Option<(BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .find(|(_, block)| block.name == name)
            .map(|(idx, block)| (BlockId(idx), block))
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|block| block.insts.iter())
    }
}

impl fmt::Display for RoutineIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "define i1 @{}(ptr %tuple, ptr %data, i32 %len) ; tuple size {}",
            self.name, self.tuple_size
        )?;
        writeln!(f, "{{")?;
        for (idx, block) in self.blocks.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.name)?;
            for inst in &block.insts {
                writeln!(f, "  {inst}")?;
            }
            match block.terminator {
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    let name = |id: BlockId| {
                        self.block(id)
                            .map_or_else(|| format!("<bb{}>", id.0), |b| b.name.to_string())
                    };
                    writeln!(
                        f,
                        "  br i1 {cond}, label %{}, label %{}",
                        name(then_block),
                        name(else_block)
                    )?;
                }
                Some(Terminator::Ret(value)) => writeln!(f, "  ret i1 {value}")?,
                None => writeln!(f, "  ; <no terminator>")?,
            }
        }
        write!(f, "}}")
    }
}
