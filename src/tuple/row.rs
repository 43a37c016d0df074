use itoa::Buffer as ItoaBuffer;
use ryu::Buffer as RyuBuffer;

use super::{SlotDescriptor, SlotType, SlotValue, TupleLayout};
use crate::constants::{NULL_TEXT, POINTER_SIZE};

/// Pointer/length pair stored in a variable-length string slot.
///
/// The pointer refers to the scanner's source buffer; the slot never owns
/// string bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringRef {
    pub ptr: usize,
    pub len: u32,
}

impl StringRef {
    pub fn new(data: &[u8], len: u32) -> Self {
        Self {
            ptr: data.as_ptr() as usize,
            len,
        }
    }

    pub(crate) fn write_to(self, dest: &mut [u8]) {
        dest[..POINTER_SIZE].copy_from_slice(&self.ptr.to_ne_bytes());
        dest[POINTER_SIZE..POINTER_SIZE + 4].copy_from_slice(&self.len.to_ne_bytes());
    }

    pub(crate) fn read_from(src: &[u8]) -> Self {
        let mut ptr = [0u8; POINTER_SIZE];
        ptr.copy_from_slice(&src[..POINTER_SIZE]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&src[POINTER_SIZE..POINTER_SIZE + 4]);
        Self {
            ptr: usize::from_ne_bytes(ptr),
            len: u32::from_ne_bytes(len),
        }
    }

    /// Resolve the bytes against the buffer they were taken from.
    ///
    /// Returns `None` when the referenced range does not lie inside `source`.
    pub fn resolve<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.ptr.checked_sub(source.as_ptr() as usize)?;
        let end = start.checked_add(self.len as usize)?;
        source.get(start..end)
    }
}

/// Owned, zero-initialized memory for one row of a [`TupleLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    bytes: Vec<u8>,
}

impl Tuple {
    pub fn new(layout: &TupleLayout) -> Self {
        Self {
            bytes: vec![0; layout.byte_size()],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    pub fn is_null(&self, slot: &SlotDescriptor) -> bool {
        slot.null_indicator.is_set(&self.bytes)
    }

    /// Typed read of a fixed-width slot; `None` when the slot is null.
    pub fn get<T: SlotValue>(&self, slot: &SlotDescriptor) -> Option<T> {
        debug_assert_eq!(slot.slot_type.scalar(), Some(T::SCALAR));
        if self.is_null(slot) {
            return None;
        }
        Some(T::read_from(&self.bytes[slot.offset..]))
    }

    pub fn get_string(&self, slot: &SlotDescriptor) -> Option<StringRef> {
        debug_assert!(slot.slot_type.is_var_len_string());
        if self.is_null(slot) {
            return None;
        }
        Some(StringRef::read_from(&self.bytes[slot.offset..]))
    }

    /// One `|`-separated line, strings resolved against `source`.
    pub fn render(&self, layout: &TupleLayout, source: &[u8]) -> String {
        let mut out = String::new();
        for (idx, slot) in layout.slots().iter().enumerate() {
            if idx > 0 {
                out.push('|');
            }
            if self.is_null(slot) {
                out.push_str(NULL_TEXT);
                continue;
            }
            self.render_slot(slot, source, &mut out);
        }
        out
    }

    fn render_slot(&self, slot: &SlotDescriptor, source: &[u8], out: &mut String) {
        let value = &self.bytes[slot.offset..];
        let mut ints = ItoaBuffer::new();
        let mut floats = RyuBuffer::new();
        match slot.slot_type {
            SlotType::Boolean => out.push_str(if bool::read_from(value) { "true" } else { "false" }),
            SlotType::TinyInt => out.push_str(ints.format(i8::read_from(value))),
            SlotType::SmallInt => out.push_str(ints.format(i16::read_from(value))),
            SlotType::Int => out.push_str(ints.format(i32::read_from(value))),
            SlotType::BigInt => out.push_str(ints.format(i64::read_from(value))),
            SlotType::Float => out.push_str(floats.format(f32::read_from(value))),
            SlotType::Double => out.push_str(floats.format(f64::read_from(value))),
            SlotType::String | SlotType::Varchar { .. } => {
                let string = StringRef::read_from(value);
                match string.resolve(source) {
                    Some(bytes) => out.push_str(&String::from_utf8_lossy(bytes)),
                    None => {
                        out.push('<');
                        out.push_str(ints.format(string.len));
                        out.push_str(" bytes>");
                    }
                }
            }
            SlotType::Char { len } => {
                out.push_str(&String::from_utf8_lossy(&value[..len as usize]));
            }
        }
    }
}
