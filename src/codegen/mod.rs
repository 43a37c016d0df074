//! Routine IR, its builder and verifier, and the backend that turns it into
//! callable code.

pub mod backend;
pub mod builder;
pub mod cache;
pub mod ir;
pub mod routine;
pub mod verify;

pub use backend::{Backend, ClosureBackend};
pub use builder::RoutineBuilder;
pub use cache::{CacheStats, RoutineCache, RoutineKey};
pub use ir::{Block, BlockId, Inst, NullTest, Operand, Reg, RoutineIr, Terminator};
pub use routine::Routine;
pub use verify::{verify, VerifiedCfg};
