//! Row-level driver: one slot writer per column, generated where possible.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::TextConverter;
use crate::codegen::{Routine, RoutineCache};
use crate::tuple::{SlotDescriptor, TupleLayout};
use crate::Result;

#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 16;

/// How one column's fields reach its slot.
#[derive(Debug, Clone)]
pub enum ColumnWriter {
    Generated(Routine),
    /// Reference path, used when no routine could be generated.
    Interpreted,
}

impl ColumnWriter {
    #[inline]
    pub fn write(&self, converter: &TextConverter, slot: &SlotDescriptor, data: &[u8], tuple: &mut [u8]) -> bool {
        match self {
            ColumnWriter::Generated(routine) => routine.invoke(data, tuple),
            ColumnWriter::Interpreted => converter.write_slot(slot, data, tuple),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, ColumnWriter::Generated(_))
    }
}

/// Per-slot outcome of [`TupleWriter::write_tuple`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// `true` at index `i` when slot `i` failed to parse.
    pub slot_errors: SmallVec<[bool; 16]>,
    pub has_error: bool,
}

impl WriteResult {
    pub fn is_ok(&self) -> bool {
        !self.has_error
    }

    pub fn error_count(&self) -> usize {
        self.slot_errors.iter().filter(|failed| **failed).count()
    }

    pub fn failed_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slot_errors
            .iter()
            .enumerate()
            .filter_map(|(idx, failed)| failed.then_some(idx))
    }
}

/// Writes whole rows of delimited fields into tuples of one layout.
///
/// # Examples
/// ```
/// use slot_codegen::codegen::RoutineCache;
/// use slot_codegen::convert::{TextConverter, TupleWriter};
/// use slot_codegen::{SlotType, Tuple, TupleLayout};
///
/// let layout = TupleLayout::builder()
///     .slots([SlotType::Int, SlotType::String, SlotType::Boolean])
///     .build()
///     .unwrap();
/// let cache = RoutineCache::default();
/// let writer = TupleWriter::new(layout.clone(), TextConverter::default(), &cache).unwrap();
///
/// let line = b"7,seven,maybe";
/// let fields: Vec<&[u8]> = line.split(|b| *b == b',').collect();
/// let mut tuple = Tuple::new(&layout);
/// let result = writer.write_tuple(&fields, tuple.as_bytes_mut());
///
/// assert_eq!(result.failed_slots().collect::<Vec<_>>(), vec![2]);
/// assert_eq!(tuple.render(&layout, line), "7|seven|NULL");
/// assert_eq!(writer.codegen_summary(), "generated: 3 out of 3");
/// ```
#[derive(Debug, Clone)]
pub struct TupleWriter {
    layout: TupleLayout,
    converter: TextConverter,
    columns: Vec<ColumnWriter>,
}

impl TupleWriter {
    /// Generate (or fetch from `cache`) a routine for every slot.
    ///
    /// A slot whose routine cannot be produced falls back to the
    /// interpreted path, except for unsupported slot types, which fail.
    pub fn new(layout: TupleLayout, converter: TextConverter, cache: &RoutineCache) -> Result<Self> {
        let columns = map_slots(layout.slots(), |slot| {
            match cache.get_or_generate(&converter, &layout, slot) {
                Ok(routine) => Ok(ColumnWriter::Generated(routine)),
                Err(err) if err.is_unsupported() => Err(err),
                Err(err) => {
                    warn!(slot = slot.id, slot_type = %slot.slot_type, error = %err, "falling back to interpreted slot writer");
                    Ok(ColumnWriter::Interpreted)
                }
            }
        })
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        let writer = Self {
            layout,
            converter,
            columns,
        };
        debug!(columns = writer.columns.len(), "{}", writer.codegen_summary());
        Ok(writer)
    }

    /// A writer that never generates code.
    pub fn interpreted(layout: TupleLayout, converter: TextConverter) -> Self {
        let columns = vec![ColumnWriter::Interpreted; layout.len()];
        Self {
            layout,
            converter,
            columns,
        }
    }

    pub fn layout(&self) -> &TupleLayout {
        &self.layout
    }

    pub fn converter(&self) -> &TextConverter {
        &self.converter
    }

    pub fn columns(&self) -> &[ColumnWriter] {
        &self.columns
    }

    pub fn generated_columns(&self) -> usize {
        self.columns.iter().filter(|column| column.is_generated()).count()
    }

    /// E.g. `generated: 2 out of 3`.
    pub fn codegen_summary(&self) -> String {
        format!("generated: {} out of {}", self.generated_columns(), self.columns.len())
    }

    /// Write field `i` into slot `i`.
    ///
    /// Slots without a field are set null; fields past the last slot are
    /// ignored.
    ///
    /// # Panics
    ///
    /// Panics if `tuple` is shorter than the layout.
    pub fn write_tuple(&self, fields: &[&[u8]], tuple: &mut [u8]) -> WriteResult {
        assert!(
            tuple.len() >= self.layout.byte_size(),
            "tuple of {} bytes is shorter than layout of {} bytes",
            tuple.len(),
            self.layout.byte_size()
        );
        let mut result = WriteResult::default();
        for (idx, (slot, column)) in self.layout.slots().iter().zip(&self.columns).enumerate() {
            let ok = match fields.get(idx) {
                Some(data) => column.write(&self.converter, slot, data, tuple),
                None => {
                    slot.null_indicator.set(tuple);
                    true
                }
            };
            result.slot_errors.push(!ok);
            result.has_error |= !ok;
        }
        result
    }
}

#[cfg(feature = "parallel")]
fn map_slots<R, F>(slots: &[SlotDescriptor], func: F) -> Vec<R>
where
    R: Send,
    F: Fn(&SlotDescriptor) -> R + Sync + Send,
{
    if slots.len() >= PARALLEL_THRESHOLD {
        slots.par_iter().map(func).collect()
    } else {
        slots.iter().map(func).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn map_slots<R, F>(slots: &[SlotDescriptor], func: F) -> Vec<R>
where
    F: Fn(&SlotDescriptor) -> R,
{
    slots.iter().map(func).collect()
}
