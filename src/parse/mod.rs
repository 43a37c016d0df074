//! Typed text parsers called by slot routines.
//!
//! Every parser has the shape `fn(&[u8]) -> (T, ParseOutcome)`. The value is
//! only meaningful for `Success`, and for `Overflow` where the parser defines
//! a best-effort value (saturation for integers, infinity for floats).

pub mod boolean;
pub mod float;
pub mod int;

pub use boolean::string_to_bool;
pub use float::{string_to_double, string_to_float};
pub use int::{string_to_int16, string_to_int32, string_to_int64, string_to_int8};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParseOutcome {
    Success = 0,
    Failure = 1,
    Overflow = 2,
}

impl ParseOutcome {
    /// Whether a slot must be nulled and the row flagged.
    #[inline]
    pub fn is_error(self, strict_mode: bool) -> bool {
        match self {
            ParseOutcome::Success => false,
            ParseOutcome::Failure => true,
            ParseOutcome::Overflow => strict_mode,
        }
    }
}

pub type ParseFn<T> = fn(&[u8]) -> (T, ParseOutcome);

/// One parser per scalar type; routines resolve their entry once.
///
/// # Examples
/// ```
/// use slot_codegen::parse::{ParseOutcome, ParserTable};
///
/// fn lenient_bool(data: &[u8]) -> (bool, ParseOutcome) {
///     (data == b"1" || data == b"true", ParseOutcome::Success)
/// }
///
/// let table = ParserTable::default().with_bool(lenient_bool);
/// assert_eq!((table.bool)(b"1"), (true, ParseOutcome::Success));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParserTable {
    pub bool: ParseFn<bool>,
    pub int8: ParseFn<i8>,
    pub int16: ParseFn<i16>,
    pub int32: ParseFn<i32>,
    pub int64: ParseFn<i64>,
    pub float: ParseFn<f32>,
    pub double: ParseFn<f64>,
}

impl Default for ParserTable {
    fn default() -> Self {
        Self {
            bool: string_to_bool,
            int8: string_to_int8,
            int16: string_to_int16,
            int32: string_to_int32,
            int64: string_to_int64,
            float: string_to_float,
            double: string_to_double,
        }
    }
}

/// Function addresses of a [`ParserTable`], usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParserTableId([usize; 7]);

impl ParserTable {
    /// Tables with equal ids call the same parsers.
    pub fn id(&self) -> ParserTableId {
        ParserTableId([
            self.bool as usize,
            self.int8 as usize,
            self.int16 as usize,
            self.int32 as usize,
            self.int64 as usize,
            self.float as usize,
            self.double as usize,
        ])
    }

    pub fn with_bool(mut self, parser: ParseFn<bool>) -> Self {
        self.bool = parser;
        self
    }

    pub fn with_int8(mut self, parser: ParseFn<i8>) -> Self {
        self.int8 = parser;
        self
    }

    pub fn with_int16(mut self, parser: ParseFn<i16>) -> Self {
        self.int16 = parser;
        self
    }

    pub fn with_int32(mut self, parser: ParseFn<i32>) -> Self {
        self.int32 = parser;
        self
    }

    pub fn with_int64(mut self, parser: ParseFn<i64>) -> Self {
        self.int64 = parser;
        self
    }

    pub fn with_float(mut self, parser: ParseFn<f32>) -> Self {
        self.float = parser;
        self
    }

    pub fn with_double(mut self, parser: ParseFn<f64>) -> Self {
        self.double = parser;
        self
    }
}
