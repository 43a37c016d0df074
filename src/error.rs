use thiserror::Error;

use crate::tuple::SlotType;

/// Generation-time failures.
///
/// Per-row parse problems are never reported through this type: a generated
/// routine answers `false` and leaves the slot null instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("slot type {0} is not supported for generated slot writers")]
    UnsupportedSlotType(SlotType),

    #[error("generated {routine} routine failed verification: {reason}")]
    Verification { routine: String, reason: String },

    #[error("invalid tuple layout: {0}")]
    Layout(String),

    #[error("invalid conversion policy: {0}")]
    Config(String),
}

impl Error {
    pub fn verification(routine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Verification {
            routine: routine.into(),
            reason: reason.into(),
        }
    }

    pub fn layout(message: impl Into<String>) -> Self {
        Self::Layout(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors that no amount of backend work could fix.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedSlotType(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_error_messages() {
        let err = Error::UnsupportedSlotType(SlotType::Char { len: 4 });
        assert_eq!(
            err.to_string(),
            "slot type CHAR(4) is not supported for generated slot writers"
        );
        assert!(err.is_unsupported());

        let err = Error::verification("WriteSlot", "block set_null has no terminator");
        assert_eq!(
            err.to_string(),
            "generated WriteSlot routine failed verification: block set_null has no terminator"
        );
        assert!(!err.is_unsupported());
    }
}
