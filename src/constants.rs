pub const DEFAULT_NULL_SENTINEL: &str = "\\N";

/// Name given to every generated slot routine.
pub const WRITE_SLOT_ROUTINE: &str = "WriteSlot";

/// Upper bound on virtual registers a routine may use.
pub const MAX_REGISTERS: usize = 8;

pub const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Pointer word followed by a `u32` length.
pub const STRING_SLOT_SIZE: usize = POINTER_SIZE + 4;

pub const NULL_TEXT: &str = "NULL";

#[inline]
pub fn is_default_null_sentinel(sentinel: &[u8]) -> bool {
    sentinel.len() == 2 && sentinel[0] == b'\\' && sentinel[1] == b'N'
}
