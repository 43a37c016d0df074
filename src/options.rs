use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::constants::{is_default_null_sentinel, DEFAULT_NULL_SENTINEL};
use crate::{Error, Result};

/// Per-scan text conversion settings, shared read-only by every routine.
///
/// # Examples
/// ```
/// use slot_codegen::ConversionPolicy;
///
/// let policy = ConversionPolicy::new()
///     .with_escape_char(Some(b'\\'))
///     .with_strict_mode(true);
/// assert!(policy.is_default_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionPolicy {
    pub escape_char: Option<u8>,
    pub null_sentinel: SmolStr,
    pub check_null: bool,
    pub strict_mode: bool,
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self {
            escape_char: None,
            null_sentinel: SmolStr::new_static(DEFAULT_NULL_SENTINEL),
            check_null: true,
            strict_mode: false,
        }
    }
}

impl ConversionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_escape_char(mut self, escape_char: Option<u8>) -> Self {
        self.escape_char = escape_char;
        self
    }

    pub fn with_null_sentinel(mut self, sentinel: impl Into<SmolStr>) -> Self {
        self.null_sentinel = sentinel.into();
        self
    }

    pub fn with_check_null(mut self, check_null: bool) -> Self {
        self.check_null = check_null;
        self
    }

    /// Treat numeric overflow as a parse failure.
    pub fn with_strict_mode(mut self, strict_mode: bool) -> Self {
        self.strict_mode = strict_mode;
        self
    }

    /// Whether the sentinel is the two-byte `\N` that has a dedicated matcher.
    pub fn is_default_null(&self) -> bool {
        is_default_null_sentinel(self.null_sentinel.as_bytes())
    }

    /// Load a policy from a JSON object; absent keys keep their defaults.
    ///
    /// # Examples
    /// ```
    /// use slot_codegen::ConversionPolicy;
    ///
    /// let policy = ConversionPolicy::from_json(r#"{"null_sentinel": "NULL"}"#).unwrap();
    /// assert_eq!(policy.null_sentinel, "NULL");
    /// assert!(policy.check_null);
    /// ```
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|err| Error::config(format!("policy is not valid JSON: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_defaults() {
        let policy = ConversionPolicy::default();
        assert_eq!(policy.escape_char, None);
        assert_eq!(policy.null_sentinel, "\\N");
        assert!(policy.check_null);
        assert!(!policy.strict_mode);
        assert!(policy.is_default_null());
    }

    #[rstest::rstest]
    fn test_builder_chain() {
        let policy = ConversionPolicy::new()
            .with_escape_char(Some(b'\\'))
            .with_null_sentinel("")
            .with_check_null(false)
            .with_strict_mode(true);
        assert_eq!(policy.escape_char, Some(b'\\'));
        assert_eq!(policy.null_sentinel, "");
        assert!(!policy.check_null);
        assert!(policy.strict_mode);
        assert!(!policy.is_default_null());
    }

    #[rstest::rstest]
    fn test_from_json() {
        let policy =
            ConversionPolicy::from_json(r#"{"escape_char": 92, "strict_mode": true}"#).unwrap();
        assert_eq!(policy.escape_char, Some(b'\\'));
        assert!(policy.strict_mode);
        assert_eq!(policy.null_sentinel, "\\N");

        let round_trip =
            ConversionPolicy::from_json(&serde_json::to_string(&policy).unwrap()).unwrap();
        assert_eq!(round_trip, policy);
    }

    #[rstest::rstest]
    fn test_from_json_rejects_garbage() {
        let err = ConversionPolicy::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
