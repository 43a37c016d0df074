//! Field-to-slot conversion: the interpreted reference path and the emitter
//! of equivalent routine IR.

pub mod writer;

use smol_str::SmolStr;
use tracing::debug;

use crate::codegen::{Backend, NullTest, Operand, Routine, RoutineBuilder, RoutineIr};
use crate::constants::{POINTER_SIZE, WRITE_SLOT_ROUTINE};
use crate::options::ConversionPolicy;
use crate::parse::{ParseOutcome, ParserTable};
use crate::text::{self, NullMatcher};
use crate::tuple::{SlotDescriptor, SlotType, SlotValue, StringRef, TupleLayout};
use crate::{Error, Result};

pub use writer::{ColumnWriter, TupleWriter, WriteResult};

/// Converts delimited text fields into tuple slots under one policy.
///
/// # Examples
/// ```
/// use slot_codegen::convert::TextConverter;
/// use slot_codegen::{SlotType, Tuple, TupleLayout};
///
/// let layout = TupleLayout::builder().slot(SlotType::Int).build().unwrap();
/// let slot = &layout.slots()[0];
/// let mut tuple = Tuple::new(&layout);
///
/// let converter = TextConverter::default();
/// assert!(converter.write_slot(slot, b"123", tuple.as_bytes_mut()));
/// assert_eq!(tuple.get::<i32>(slot), Some(123));
/// assert!(!converter.write_slot(slot, b"abc", tuple.as_bytes_mut()));
/// assert!(tuple.is_null(slot));
/// ```
#[derive(Debug, Clone)]
pub struct TextConverter {
    policy: ConversionPolicy,
    parsers: ParserTable,
    matcher: NullMatcher,
}

impl TextConverter {
    pub fn new(policy: ConversionPolicy) -> Self {
        let matcher = NullMatcher::new(policy.null_sentinel.as_bytes());
        Self {
            policy,
            parsers: ParserTable::default(),
            matcher,
        }
    }

    /// Use `parsers` for both the interpreted path and generated routines.
    pub fn with_parsers(mut self, parsers: ParserTable) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn policy(&self) -> &ConversionPolicy {
        &self.policy
    }

    pub fn parsers(&self) -> &ParserTable {
        &self.parsers
    }

    pub fn matcher(&self) -> &NullMatcher {
        &self.matcher
    }

    /// Copy `src` into `dest` with escape markers removed.
    ///
    /// At most `max_len` bytes (and never more than `dest.len()`) are
    /// written; the rest is dropped silently. Without an escape character
    /// this is a bounded copy.
    pub fn unescape_string(&self, src: &[u8], dest: &mut [u8], max_len: Option<usize>) -> usize {
        let capacity = max_len.map_or(dest.len(), |max| max.min(dest.len()));
        let dest = &mut dest[..capacity];
        match self.policy.escape_char {
            Some(escape_char) => text::unescape(src, dest, escape_char),
            None => {
                let len = src.len().min(capacity);
                dest[..len].copy_from_slice(&src[..len]);
                len
            }
        }
    }

    /// In-place form of [`unescape_string`](Self::unescape_string).
    pub fn unescape_in_place(&self, buf: &mut [u8], max_len: Option<usize>) -> usize {
        match self.policy.escape_char {
            Some(escape_char) => text::unescape_in_place(buf, max_len, escape_char),
            None => max_len.map_or(buf.len(), |max| max.min(buf.len())),
        }
    }

    /// Interpreted conversion of one field into `slot`.
    ///
    /// Returns `false` only when the field does not parse (or overflows in
    /// strict mode); the slot is null afterwards. `Char` slots are not
    /// supported and always end up null with `false`.
    ///
    /// # Panics
    ///
    /// Panics if `tuple` does not cover the slot and its null indicator.
    pub fn write_slot(&self, slot: &SlotDescriptor, data: &[u8], tuple: &mut [u8]) -> bool {
        let null = slot.null_indicator;
        let slot_type = slot.slot_type;
        if (self.policy.check_null && self.matcher.is_null(data))
            || (!slot_type.is_var_len_string() && data.is_empty())
        {
            null.set(tuple);
            return true;
        }

        match slot_type {
            SlotType::String => self.write_string(slot, data, None, tuple),
            SlotType::Varchar { max_len } => self.write_string(slot, data, Some(max_len), tuple),
            SlotType::Boolean => self.write_scalar::<bool>(slot, data, tuple),
            SlotType::TinyInt => self.write_scalar::<i8>(slot, data, tuple),
            SlotType::SmallInt => self.write_scalar::<i16>(slot, data, tuple),
            SlotType::Int => self.write_scalar::<i32>(slot, data, tuple),
            SlotType::BigInt => self.write_scalar::<i64>(slot, data, tuple),
            SlotType::Float => self.write_scalar::<f32>(slot, data, tuple),
            SlotType::Double => self.write_scalar::<f64>(slot, data, tuple),
            SlotType::Char { .. } => {
                null.set(tuple);
                false
            }
        }
    }

    fn write_string(&self, slot: &SlotDescriptor, data: &[u8], max_len: Option<u32>, tuple: &mut [u8]) -> bool {
        let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
        let len = max_len.map_or(len, |max| len.min(max));
        StringRef::new(data, len).write_to(&mut tuple[slot.offset..]);
        slot.null_indicator.clear(tuple);
        true
    }

    fn write_scalar<T: SlotValue>(&self, slot: &SlotDescriptor, data: &[u8], tuple: &mut [u8]) -> bool {
        let (value, outcome) = T::parser(&self.parsers)(data);
        if outcome.is_error(self.policy.strict_mode) {
            slot.null_indicator.set(tuple);
            return false;
        }
        value.write_to(&mut tuple[slot.offset..]);
        slot.null_indicator.clear(tuple);
        true
    }

    fn null_test(&self) -> NullTest {
        if self.policy.is_default_null() {
            NullTest::Default
        } else {
            NullTest::Sentinel(self.policy.null_sentinel.clone())
        }
    }

    /// Emit the IR of a routine equivalent to [`write_slot`](Self::write_slot)
    /// for `slot`.
    ///
    /// ```text
    /// entry:       null sentinel?        -> set_null | check_zero (or parse_slot)
    /// check_zero:  len == 0?             -> set_null | parse_slot
    /// parse_slot:  strings store and return true, scalars parse
    ///              failure or strict overflow? -> parse_fail | parse_success
    /// ```
    pub fn codegen_write_slot(&self, layout: &TupleLayout, slot: &SlotDescriptor) -> Result<RoutineIr> {
        let slot_type = slot.slot_type;
        if matches!(slot_type, SlotType::Char { .. }) {
            return Err(Error::UnsupportedSlotType(slot_type));
        }
        layout.validate_slot(slot)?;

        let null = slot.null_indicator;
        let mut builder = RoutineBuilder::new(SmolStr::new_static(WRITE_SLOT_ROUTINE), layout.byte_size());
        let (set_null, parse_slot) = builder.create_if_else_blocks("set_null", "parse_slot");
        let check_zero = (!slot_type.is_var_len_string()).then(|| builder.append_block("check_zero"));

        let is_null = if self.policy.check_null {
            Operand::Reg(builder.call_is_null(self.null_test()))
        } else {
            Operand::Const(false)
        };
        builder.cond_br(is_null, set_null, check_zero.unwrap_or(parse_slot));

        if let Some(check_zero) = check_zero {
            builder.set_insert_point(check_zero);
            let is_empty = builder.len_is_zero();
            builder.cond_br(Operand::Reg(is_empty), set_null, parse_slot);
        }

        builder.set_insert_point(parse_slot);
        match slot_type.scalar() {
            None => {
                let max_len = match slot_type {
                    SlotType::Varchar { max_len } => Some(max_len),
                    _ => None,
                };
                builder.store_data_ptr(slot.offset);
                builder.store_len(slot.offset + POINTER_SIZE, max_len, null);
                builder.ret(true);
            }
            Some(scalar) => {
                let (parse_success, parse_fail) = builder.create_if_else_blocks("parse_success", "parse_fail");
                let (value, outcome) = builder.call_parse(scalar);
                let mut failed = builder.outcome_is(outcome, ParseOutcome::Failure);
                if self.policy.strict_mode {
                    let overflowed = builder.outcome_is(outcome, ParseOutcome::Overflow);
                    failed = builder.or(failed, overflowed);
                }
                builder.cond_br(Operand::Reg(failed), parse_fail, parse_success);

                builder.set_insert_point(parse_success);
                builder.store(slot.offset, scalar, value, null);
                builder.ret(true);

                builder.set_insert_point(parse_fail);
                builder.set_null(null);
                builder.ret(false);
            }
        }

        builder.set_insert_point(set_null);
        builder.set_null(null);
        builder.ret(true);

        Ok(builder.finish())
    }

    /// Emit and finalize the routine for `slot` with `backend`.
    pub fn generate(&self, layout: &TupleLayout, slot: &SlotDescriptor, backend: &dyn Backend) -> Result<Routine> {
        let ir = self.codegen_write_slot(layout, slot)?;
        let blocks = ir.blocks.len();
        let routine = backend.finalize(ir, &self.parsers)?;
        debug!(
            slot = slot.id,
            slot_type = %slot.slot_type,
            blocks,
            check_null = self.policy.check_null,
            strict_mode = self.policy.strict_mode,
            "generated slot writer"
        );
        Ok(routine)
    }
}

impl Default for TextConverter {
    fn default() -> Self {
        Self::new(ConversionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::codegen::{ClosureBackend, Inst};
    use crate::tuple::Tuple;

    fn single(slot_type: SlotType) -> TupleLayout {
        TupleLayout::builder().slot(slot_type).build().unwrap()
    }

    fn block_names(ir: &RoutineIr) -> Vec<&str> {
        ir.blocks.iter().map(|block| block.name.as_str()).collect()
    }

    #[rstest]
    #[case(b"123", false, Some(123), true)]
    #[case(b"\\N", true, None, true)]
    #[case(b"", true, None, true)]
    #[case(b"abc", true, None, false)]
    fn test_interpreted_int_scenario(
        #[case] field: &[u8],
        #[case] is_null: bool,
        #[case] value: Option<i32>,
        #[case] ok: bool,
    ) {
        let layout = single(SlotType::Int);
        let slot = &layout.slots()[0];
        let mut tuple = Tuple::new(&layout);
        assert_eq!(TextConverter::default().write_slot(slot, field, tuple.as_bytes_mut()), ok);
        assert_eq!(tuple.is_null(slot), is_null);
        if let Some(value) = value {
            assert_eq!(tuple.get::<i32>(slot), Some(value));
        }
    }

    #[rstest]
    fn test_interpreted_strings_keep_empty_and_truncate() {
        let layout = single(SlotType::Varchar { max_len: 5 });
        let slot = &layout.slots()[0];
        let mut tuple = Tuple::new(&layout);
        let converter = TextConverter::default();
        let field = b"abcdefghi";

        assert!(converter.write_slot(slot, field, tuple.as_bytes_mut()));
        let stored = tuple.get_string(slot).unwrap();
        assert_eq!(stored.len, 5);
        assert_eq!(stored.ptr, field.as_ptr() as usize);

        assert!(converter.write_slot(slot, &field[..0], tuple.as_bytes_mut()));
        assert_eq!(tuple.get_string(slot).map(|s| s.len), Some(0));
    }

    #[rstest]
    fn test_interpreted_char_is_rejected() {
        let layout = single(SlotType::Char { len: 4 });
        let slot = &layout.slots()[0];
        let mut tuple = Tuple::new(&layout);
        assert!(!TextConverter::default().write_slot(slot, b"ab", tuple.as_bytes_mut()));
        assert!(tuple.is_null(slot));
    }

    #[rstest]
    fn test_scalar_ir_shape() {
        let layout = single(SlotType::BigInt);
        let ir = TextConverter::default()
            .codegen_write_slot(&layout, &layout.slots()[0])
            .unwrap();
        assert_eq!(ir.name, WRITE_SLOT_ROUTINE);
        assert_eq!(
            block_names(&ir),
            vec!["entry", "set_null", "parse_slot", "check_zero", "parse_success", "parse_fail"]
        );
        assert!(ir.instructions().any(|inst| matches!(inst, Inst::LenIsZero { .. })));
        assert!(!ir.instructions().any(|inst| matches!(inst, Inst::Or { .. })));
    }

    #[rstest]
    fn test_string_ir_skips_zero_length_check() {
        let layout = single(SlotType::String);
        let ir = TextConverter::default()
            .codegen_write_slot(&layout, &layout.slots()[0])
            .unwrap();
        assert_eq!(block_names(&ir), vec!["entry", "set_null", "parse_slot"]);
        let text = ir.to_string();
        assert!(text.contains("store ptr %data, %tuple+0"), "{text}");
        assert!(text.contains(&format!("store i32 %len, %tuple+{POINTER_SIZE}")), "{text}");
    }

    #[rstest]
    fn test_strict_mode_ors_overflow() {
        let layout = single(SlotType::SmallInt);
        let converter = TextConverter::new(ConversionPolicy::new().with_strict_mode(true));
        let ir = converter.codegen_write_slot(&layout, &layout.slots()[0]).unwrap();
        let compares = ir
            .instructions()
            .filter(|inst| matches!(inst, Inst::OutcomeIs { .. }))
            .count();
        assert_eq!(compares, 2);
        assert!(ir.instructions().any(|inst| matches!(inst, Inst::Or { .. })));
    }

    #[rstest]
    #[case(ConversionPolicy::new(), Some(NullTest::Default))]
    #[case(
        ConversionPolicy::new().with_null_sentinel("NULL"),
        Some(NullTest::Sentinel(SmolStr::new("NULL")))
    )]
    #[case(ConversionPolicy::new().with_check_null(false), None)]
    fn test_null_check_follows_policy(#[case] policy: ConversionPolicy, #[case] expected: Option<NullTest>) {
        let layout = single(SlotType::Int);
        let ir = TextConverter::new(policy)
            .codegen_write_slot(&layout, &layout.slots()[0])
            .unwrap();
        let test = ir.instructions().find_map(|inst| match inst {
            Inst::IsNull { test, .. } => Some(test.clone()),
            _ => None,
        });
        assert_eq!(test, expected);
    }

    #[rstest]
    fn test_char_generation_fails() {
        let layout = single(SlotType::Char { len: 8 });
        let err = TextConverter::default()
            .generate(&layout, &layout.slots()[0], &ClosureBackend)
            .unwrap_err();
        assert_eq!(err, Error::UnsupportedSlotType(SlotType::Char { len: 8 }));
        assert!(err.is_unsupported());
    }

    #[rstest]
    fn test_slot_outside_layout_fails() {
        let layout = single(SlotType::TinyInt);
        let mut slot = layout.slots()[0];
        slot.offset = 64;
        let err = TextConverter::default()
            .codegen_write_slot(&layout, &slot)
            .unwrap_err();
        assert!(matches!(err, Error::Layout(_)));
    }

    #[rstest]
    #[case(None, b"a\\tb".as_slice(), None, b"a\\tb".as_slice())]
    #[case(Some(b'\\'), b"a\\tb".as_slice(), None, b"ab".as_slice())]
    #[case(Some(b'\\'), b"abcdef".as_slice(), Some(3), b"abc".as_slice())]
    #[case(None, b"abcdef".as_slice(), Some(2), b"ab".as_slice())]
    fn test_unescape_string(
        #[case] escape_char: Option<u8>,
        #[case] src: &[u8],
        #[case] max_len: Option<usize>,
        #[case] expected: &[u8],
    ) {
        let converter = TextConverter::new(ConversionPolicy::new().with_escape_char(escape_char));
        let mut dest = [0u8; 16];
        let len = converter.unescape_string(src, &mut dest, max_len);
        assert_eq!(&dest[..len], expected);

        let mut buf = src.to_vec();
        let len = converter.unescape_in_place(&mut buf, max_len);
        assert_eq!(&buf[..len], expected);
    }
}
