use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use super::ir::RoutineIr;
use crate::constants::MAX_REGISTERS;

/// Per-call state threaded through a lowered routine.
pub(crate) struct Frame<'d, 't> {
    pub data: &'d [u8],
    pub tuple: &'t mut [u8],
    pub regs: [u64; MAX_REGISTERS],
}

pub(crate) type BlockFn = Arc<dyn Fn(&mut Frame<'_, '_>) -> bool + Send + Sync>;

/// A finalized slot writer: `(data, tuple) -> bool`.
///
/// Immutable and cheap to clone. It may be called from many threads at once
/// as long as each call gets its own tuple.
#[derive(Clone)]
pub struct Routine {
    name: SmolStr,
    tuple_size: usize,
    entry: BlockFn,
    ir: Arc<RoutineIr>,
}

impl Routine {
    pub(crate) fn new(ir: RoutineIr, entry: BlockFn) -> Self {
        Self {
            name: ir.name.clone(),
            tuple_size: ir.tuple_size,
            entry,
            ir: Arc::new(ir),
        }
    }

    /// Wrap a writer built outside this crate.
    ///
    /// `write` must behave exactly like `ir` would: same slot writes, same
    /// return value. This is how a custom [`Backend`](super::Backend)
    /// produces its routines.
    ///
    /// # Examples
    /// ```
    /// use slot_codegen::codegen::{Backend, ClosureBackend, Routine, RoutineIr};
    /// use slot_codegen::{ParserTable, Result};
    ///
    /// /// Delegates lowering to [`ClosureBackend`].
    /// struct Passthrough;
    ///
    /// impl Backend for Passthrough {
    ///     fn finalize(&self, ir: RoutineIr, parsers: &ParserTable) -> Result<Routine> {
    ///         let inner = ClosureBackend.finalize(ir.clone(), parsers)?;
    ///         Ok(Routine::from_fn(ir, move |data, tuple| inner.invoke(data, tuple)))
    ///     }
    /// }
    /// ```
    pub fn from_fn<F>(ir: RoutineIr, write: F) -> Self
    where
        F: Fn(&[u8], &mut [u8]) -> bool + Send + Sync + 'static,
    {
        Self::new(ir, Arc::new(move |frame: &mut Frame<'_, '_>| write(frame.data, &mut *frame.tuple)))
    }

    /// Convert one field into the routine's slot of `tuple`.
    ///
    /// Returns `false` only for a parse failure (or an overflow in strict
    /// mode); the slot is null afterwards in that case.
    ///
    /// # Panics
    ///
    /// Panics if `tuple` is shorter than the layout the routine was built for.
    #[inline]
    pub fn invoke(&self, data: &[u8], tuple: &mut [u8]) -> bool {
        assert!(
            tuple.len() >= self.tuple_size,
            "tuple of {} bytes passed to {} built for {} bytes",
            tuple.len(),
            self.name,
            self.tuple_size
        );
        let mut frame = Frame {
            data,
            tuple,
            regs: [0; MAX_REGISTERS],
        };
        (self.entry)(&mut frame)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// The verified IR this routine was lowered from.
    pub fn ir(&self) -> &RoutineIr {
        &self.ir
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("tuple_size", &self.tuple_size)
            .field("blocks", &self.ir.blocks.len())
            .finish()
    }
}
