pub mod escape;
pub mod null;

pub use escape::{unescape, unescape_in_place};
pub use null::{generic_is_null_string, is_null_string, NullMatcher};
