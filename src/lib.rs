pub mod codegen;
pub mod constants;
pub mod convert;
pub mod error;
pub mod options;
pub mod parse;
pub mod text;
pub mod tuple;

pub use crate::codegen::{Backend, ClosureBackend, Routine, RoutineCache};
pub use crate::convert::{TextConverter, TupleWriter, WriteResult};
pub use crate::error::Error;
pub use crate::options::ConversionPolicy;
pub use crate::parse::{ParseOutcome, ParserTable};
pub use crate::tuple::{NullIndicator, SlotDescriptor, SlotType, StringRef, Tuple, TupleLayout};

pub type Result<T> = std::result::Result<T, Error>;

/// Build the slot writer for `slot` with the default backend and parsers.
///
/// # Examples
/// ```
/// use slot_codegen::{ConversionPolicy, SlotType, Tuple, TupleLayout};
///
/// let layout = TupleLayout::builder().slot(SlotType::Int).build().unwrap();
/// let slot = &layout.slots()[0];
/// let routine = slot_codegen::generate(&layout, slot, &ConversionPolicy::default()).unwrap();
///
/// let mut tuple = Tuple::new(&layout);
/// assert!(routine.invoke(b"123", tuple.as_bytes_mut()));
/// assert_eq!(tuple.get::<i32>(slot), Some(123));
/// ```
pub fn generate(layout: &TupleLayout, slot: &SlotDescriptor, policy: &ConversionPolicy) -> Result<Routine> {
    generate_with_backend(layout, slot, policy, &ClosureBackend)
}

pub fn generate_with_backend(
    layout: &TupleLayout,
    slot: &SlotDescriptor,
    policy: &ConversionPolicy,
    backend: &dyn Backend,
) -> Result<Routine> {
    TextConverter::new(policy.clone()).generate(layout, slot, backend)
}

/// Run `routine` on one field. Same as [`Routine::invoke`].
#[inline]
pub fn invoke(routine: &Routine, data: &[u8], tuple: &mut [u8]) -> bool {
    routine.invoke(data, tuple)
}

/// Unescape `src` into a new buffer of at most `capacity` bytes.
///
/// # Examples
/// ```
/// assert_eq!(slot_codegen::unescape(b"a\\,b\\\\c", 16, b'\\'), b"abc");
/// assert_eq!(slot_codegen::unescape(b"abcdef", 4, b'\\'), b"abcd");
/// ```
pub fn unescape(src: &[u8], capacity: usize, escape_char: u8) -> Vec<u8> {
    let mut dest = vec![0; capacity.min(src.len())];
    let len = text::unescape(src, &mut dest, escape_char);
    dest.truncate(len);
    dest
}
