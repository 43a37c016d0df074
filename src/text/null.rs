use crate::constants::is_default_null_sentinel;

/// Fast path for the default `\N` sentinel.
#[inline]
pub fn is_null_string(data: &[u8]) -> bool {
    data.len() == 2 && data[0] == b'\\' && data[1] == b'N'
}

/// Exact byte comparison against an arbitrary sentinel.
#[inline]
pub fn generic_is_null_string(data: &[u8], sentinel: &[u8]) -> bool {
    data.len() == sentinel.len() && data == sentinel
}

/// Null-sentinel predicate resolved once per policy.
///
/// # Examples
/// ```
/// use slot_codegen::text::NullMatcher;
///
/// let matcher = NullMatcher::new("\\N");
/// assert!(matcher.is_null(b"\\N"));
/// assert!(!matcher.is_null(b"\\Nx"));
/// assert!(!matcher.is_null(b""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NullMatcher {
    Default,
    Sentinel(Box<[u8]>),
}

impl NullMatcher {
    pub fn new(sentinel: impl AsRef<[u8]>) -> Self {
        let sentinel = sentinel.as_ref();
        if is_default_null_sentinel(sentinel) {
            NullMatcher::Default
        } else {
            NullMatcher::Sentinel(sentinel.into())
        }
    }

    #[inline]
    pub fn is_null(&self, data: &[u8]) -> bool {
        match self {
            NullMatcher::Default => is_null_string(data),
            NullMatcher::Sentinel(sentinel) => generic_is_null_string(data, sentinel),
        }
    }

    pub fn sentinel(&self) -> &[u8] {
        match self {
            NullMatcher::Default => b"\\N",
            NullMatcher::Sentinel(sentinel) => sentinel,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"\\N", true)]
    #[case(b"\\Nx", false)]
    #[case(b"\\n", false)]
    #[case(b"N", false)]
    #[case(b"", false)]
    fn test_default_sentinel(#[case] data: &[u8], #[case] expected: bool) {
        assert_eq!(is_null_string(data), expected);
        assert_eq!(NullMatcher::new("\\N").is_null(data), expected);
    }

    #[rstest]
    fn test_fast_path_agrees_with_generic_comparator() {
        let fields: [&[u8]; 7] = [b"", b"\\", b"\\N", b"\\N\\N", b"N\\", b"null", b"\\M"];
        for field in fields {
            assert_eq!(
                is_null_string(field),
                generic_is_null_string(field, b"\\N"),
                "field {field:?}"
            );
        }
    }

    #[rstest]
    fn test_custom_sentinel() {
        let matcher = NullMatcher::new("NULL");
        assert_eq!(matcher, NullMatcher::Sentinel(b"NULL".to_vec().into()));
        assert!(matcher.is_null(b"NULL"));
        assert!(!matcher.is_null(b"null"));
        assert!(!matcher.is_null(b"NULLS"));
        assert!(!matcher.is_null(b"\\N"));
        assert_eq!(matcher.sentinel(), b"NULL");
    }

    #[rstest]
    fn test_empty_sentinel_matches_only_empty_field() {
        let matcher = NullMatcher::new("");
        assert!(matcher.is_null(b""));
        assert!(!matcher.is_null(b" "));
    }
}
