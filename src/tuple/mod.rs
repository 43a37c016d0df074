pub mod row;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{POINTER_SIZE, STRING_SLOT_SIZE};
use crate::parse::{ParseFn, ParserTable};
use crate::{Error, Result};

pub use row::{StringRef, Tuple};

/// Column type of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    String,
    Varchar { max_len: u32 },
    /// Fixed-width embedded characters; no slot writer can be generated.
    Char { len: u32 },
}

impl SlotType {
    /// `String` and `Varchar` store a pointer and a length instead of bytes.
    pub fn is_var_len_string(self) -> bool {
        matches!(self, SlotType::String | SlotType::Varchar { .. })
    }

    pub fn scalar(self) -> Option<ScalarType> {
        match self {
            SlotType::Boolean => Some(ScalarType::Bool),
            SlotType::TinyInt => Some(ScalarType::I8),
            SlotType::SmallInt => Some(ScalarType::I16),
            SlotType::Int => Some(ScalarType::I32),
            SlotType::BigInt => Some(ScalarType::I64),
            SlotType::Float => Some(ScalarType::F32),
            SlotType::Double => Some(ScalarType::F64),
            SlotType::String | SlotType::Varchar { .. } | SlotType::Char { .. } => None,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            SlotType::String | SlotType::Varchar { .. } => STRING_SLOT_SIZE,
            SlotType::Char { len } => len as usize,
            other => other.scalar().map_or(0, ScalarType::byte_size),
        }
    }

    pub fn alignment(self) -> usize {
        match self {
            SlotType::String | SlotType::Varchar { .. } => POINTER_SIZE,
            SlotType::Char { .. } => 1,
            other => other.byte_size(),
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Boolean => f.write_str("BOOLEAN"),
            SlotType::TinyInt => f.write_str("TINYINT"),
            SlotType::SmallInt => f.write_str("SMALLINT"),
            SlotType::Int => f.write_str("INT"),
            SlotType::BigInt => f.write_str("BIGINT"),
            SlotType::Float => f.write_str("FLOAT"),
            SlotType::Double => f.write_str("DOUBLE"),
            SlotType::String => f.write_str("STRING"),
            SlotType::Varchar { max_len } => write!(f, "VARCHAR({max_len})"),
            SlotType::Char { len } => write!(f, "CHAR({len})"),
        }
    }
}

/// Type tag shared by the parsers and the routine IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::I8 => 1,
            ScalarType::I16 => 2,
            ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::F64 => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Bool => "i1",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        };
        f.write_str(name)
    }
}

/// A Rust value that can live in a fixed-width slot.
///
/// Values travel through routine registers as 64-bit words and are stored in
/// native byte order.
pub trait SlotValue: Copy + Send + Sync + 'static {
    const SCALAR: ScalarType;

    fn parser(table: &ParserTable) -> ParseFn<Self>;

    fn to_word(self) -> u64;

    fn from_word(word: u64) -> Self;

    fn write_to(self, dest: &mut [u8]);

    fn read_from(src: &[u8]) -> Self;
}

impl SlotValue for bool {
    const SCALAR: ScalarType = ScalarType::Bool;

    fn parser(table: &ParserTable) -> ParseFn<Self> {
        table.bool
    }

    fn to_word(self) -> u64 {
        u64::from(self)
    }

    fn from_word(word: u64) -> Self {
        word != 0
    }

    fn write_to(self, dest: &mut [u8]) {
        dest[0] = u8::from(self);
    }

    fn read_from(src: &[u8]) -> Self {
        src[0] != 0
    }
}

macro_rules! impl_int_slot_value {
    ($ty:ty, $scalar:ident, $field:ident) => {
        impl SlotValue for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;

            fn parser(table: &ParserTable) -> ParseFn<Self> {
                table.$field
            }

            fn to_word(self) -> u64 {
                self as u64
            }

            fn from_word(word: u64) -> Self {
                word as $ty
            }

            fn write_to(self, dest: &mut [u8]) {
                dest[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
            }

            fn read_from(src: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&src[..std::mem::size_of::<$ty>()]);
                <$ty>::from_ne_bytes(buf)
            }
        }
    };
}

impl_int_slot_value!(i8, I8, int8);
impl_int_slot_value!(i16, I16, int16);
impl_int_slot_value!(i32, I32, int32);
impl_int_slot_value!(i64, I64, int64);

macro_rules! impl_float_slot_value {
    ($ty:ty, $bits:ty, $scalar:ident, $field:ident) => {
        impl SlotValue for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;

            fn parser(table: &ParserTable) -> ParseFn<Self> {
                table.$field
            }

            fn to_word(self) -> u64 {
                u64::from(self.to_bits())
            }

            fn from_word(word: u64) -> Self {
                <$ty>::from_bits(word as $bits)
            }

            fn write_to(self, dest: &mut [u8]) {
                dest[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
            }

            fn read_from(src: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&src[..std::mem::size_of::<$ty>()]);
                <$ty>::from_ne_bytes(buf)
            }
        }
    };
}

impl_float_slot_value!(f32, u32, F32, float);
impl_float_slot_value!(f64, u64, F64, double);

/// Location of one slot's null bit, relative to the tuple start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NullIndicator {
    pub byte_offset: usize,
    pub bit_mask: u8,
}

impl NullIndicator {
    pub fn new(byte_offset: usize, bit_mask: u8) -> Self {
        Self {
            byte_offset,
            bit_mask,
        }
    }

    #[inline]
    pub fn set(self, tuple: &mut [u8]) {
        tuple[self.byte_offset] |= self.bit_mask;
    }

    #[inline]
    pub fn clear(self, tuple: &mut [u8]) {
        tuple[self.byte_offset] &= !self.bit_mask;
    }

    #[inline]
    pub fn is_set(self, tuple: &[u8]) -> bool {
        tuple[self.byte_offset] & self.bit_mask != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    pub id: usize,
    pub slot_type: SlotType,
    pub offset: usize,
    pub null_indicator: NullIndicator,
}

impl SlotDescriptor {
    pub fn new(id: usize, slot_type: SlotType, offset: usize, null_indicator: NullIndicator) -> Self {
        Self {
            id,
            slot_type,
            offset,
            null_indicator,
        }
    }

    pub fn value_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.slot_type.byte_size()
    }
}

/// Binary shape of a row: value slots plus their null bits.
///
/// # Examples
/// ```
/// use slot_codegen::{SlotType, TupleLayout};
///
/// let layout = TupleLayout::builder()
///     .slot(SlotType::TinyInt)
///     .slot(SlotType::Int)
///     .build()
///     .unwrap();
/// assert_eq!(layout.slot(1).unwrap().offset, 4);
/// assert_eq!(layout.byte_size(), 9);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleLayout {
    byte_size: usize,
    slots: Vec<SlotDescriptor>,
}

impl TupleLayout {
    /// Adopt a layout computed elsewhere, checking that it is self-consistent.
    pub fn new(byte_size: usize, slots: Vec<SlotDescriptor>) -> Result<Self> {
        let layout = Self { byte_size, slots };
        layout.validate()?;
        Ok(layout)
    }

    pub fn builder() -> TupleLayoutBuilder {
        TupleLayoutBuilder::default()
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    pub fn slot(&self, id: usize) -> Option<&SlotDescriptor> {
        self.slots.get(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        for slot in &self.slots {
            self.validate_slot(slot)?;
        }
        Ok(())
    }

    pub fn validate_slot(&self, slot: &SlotDescriptor) -> Result<()> {
        let range = slot.value_range();
        if range.end > self.byte_size {
            return Err(Error::layout(format!(
                "slot {} ({}) spans bytes {}..{} past tuple size {}",
                slot.id, slot.slot_type, range.start, range.end, self.byte_size
            )));
        }
        let null = slot.null_indicator;
        if null.byte_offset >= self.byte_size {
            return Err(Error::layout(format!(
                "null indicator of slot {} at byte {} is past tuple size {}",
                slot.id, null.byte_offset, self.byte_size
            )));
        }
        if null.bit_mask == 0 {
            return Err(Error::layout(format!(
                "null indicator of slot {} has an empty bit mask",
                slot.id
            )));
        }
        if let Some(owner) = self
            .slots
            .iter()
            .find(|other| other.value_range().contains(&null.byte_offset))
        {
            return Err(Error::layout(format!(
                "null indicator of slot {} overlaps the value bytes of slot {}",
                slot.id, owner.id
            )));
        }
        Ok(())
    }
}

/// Places slots in declaration order at natural alignment, followed by one
/// null bit per slot.
#[derive(Debug, Default, Clone)]
pub struct TupleLayoutBuilder {
    types: Vec<SlotType>,
}

impl TupleLayoutBuilder {
    pub fn slot(mut self, slot_type: SlotType) -> Self {
        self.types.push(slot_type);
        self
    }

    pub fn slots(mut self, slot_types: impl IntoIterator<Item = SlotType>) -> Self {
        self.types.extend(slot_types);
        self
    }

    pub fn build(self) -> Result<TupleLayout> {
        let mut offset = 0usize;
        let mut placed = Vec::with_capacity(self.types.len());
        for slot_type in &self.types {
            offset = offset.next_multiple_of(slot_type.alignment());
            placed.push(offset);
            offset += slot_type.byte_size();
        }

        let null_start = offset;
        let null_bytes = self.types.len().div_ceil(8);
        let slots = self
            .types
            .iter()
            .zip(placed)
            .enumerate()
            .map(|(id, (slot_type, slot_offset))| {
                let null_indicator = NullIndicator::new(null_start + id / 8, 1 << (id % 8));
                SlotDescriptor::new(id, *slot_type, slot_offset, null_indicator)
            })
            .collect();
        TupleLayout::new(null_start + null_bytes, slots)
    }
}
