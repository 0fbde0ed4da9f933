use thiserror::Error;

use crate::packet::Field;

/// Boxed error returned by a caveat condition checker.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Detailed error type for macaroon operations
#[derive(Error, Debug)]
pub enum MacaroonError {
    // ===== Structural / Codec Errors =====
    /// A field does not fit in a single packet
    #[error("{what} too big")]
    TooBig { what: &'static str },

    /// A packet header or length is inconsistent with the buffer holding it
    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: String },

    /// A packet carried a different field tag than the one expected in context
    #[error("unexpected field {found}; expected {expected}")]
    UnexpectedField { found: Field, expected: Field },

    /// A signature packet did not hold a keyed-hash output
    #[error("invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    // ===== Cryptographic / Verification Errors =====
    /// The replayed signature chain did not produce the macaroon's signature
    #[error("signature mismatch after caveat verification")]
    SignatureMismatch,

    /// A third-party caveat's verification id could not be opened
    #[error("cannot decrypt caveat verification id: {reason}")]
    Decryption { reason: String },

    /// No discharge macaroon carries the identifier of a third-party caveat
    #[error("cannot find discharge macaroon for caveat {caveat_id:?}")]
    DischargeNotFound { caveat_id: String },

    /// A discharge macaroon was reached by more than one caveat
    #[error("discharge macaroon {id:?} was used more than once")]
    DischargeUsedTwice { id: String },

    /// A supplied discharge macaroon was never reached by any caveat
    #[error("discharge macaroon {id:?} was not used")]
    DischargeNotUsed { id: String },

    /// A slice held no primary macaroon to verify
    #[error("macaroon slice is empty")]
    EmptySlice,

    /// Randomness for a third-party caveat nonce was unavailable
    #[error("cannot generate random bytes: {cause}")]
    RandomBytes { cause: String },

    // ===== Caller-supplied Errors =====
    /// The error returned by the caller's condition checker, passed through unmodified
    #[error(transparent)]
    Condition(BoxError),

    // ===== Encoding Errors =====
    /// JSON encoding or decoding failed
    #[error("json error: {reason}")]
    Json { reason: String },

    /// Hex decoding failed
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Base64 decoding failed
    #[error("failed to decode base64 token: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A structured caveat payload could not be decoded
    #[error("invalid caveat payload: {reason}")]
    Payload { reason: String },
}

impl MacaroonError {
    // ===== Helper Methods for Common Error Checks =====

    /// Check if this error is a structural or codec error
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MacaroonError::TooBig { .. }
                | MacaroonError::MalformedPacket { .. }
                | MacaroonError::UnexpectedField { .. }
                | MacaroonError::InvalidSignatureLength { .. }
        )
    }

    /// Check if this error is due to a signature mismatch
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, MacaroonError::SignatureMismatch)
    }

    /// Check if this error comes from resolving discharge macaroons
    pub fn is_discharge_error(&self) -> bool {
        matches!(
            self,
            MacaroonError::DischargeNotFound { .. }
                | MacaroonError::DischargeUsedTwice { .. }
                | MacaroonError::DischargeNotUsed { .. }
        )
    }

    /// Get the condition checker's error if this error came from it
    pub fn condition_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            MacaroonError::Condition(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    // ===== Constructor Helper Methods =====

    /// Create a too-big error for the named field
    pub fn too_big(what: &'static str) -> Self {
        MacaroonError::TooBig { what }
    }

    /// Create a malformed packet error
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        MacaroonError::MalformedPacket {
            reason: reason.into(),
        }
    }

    /// Create a caveat payload error
    pub fn payload<S: Into<String>>(reason: S) -> Self {
        MacaroonError::Payload {
            reason: reason.into(),
        }
    }

    /// Create a JSON error
    pub fn json<S: Into<String>>(reason: S) -> Self {
        MacaroonError::Json {
            reason: reason.into(),
        }
    }
}

impl From<rand::Error> for MacaroonError {
    fn from(err: rand::Error) -> Self {
        MacaroonError::RandomBytes {
            cause: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NotMet;

    impl std::fmt::Display for NotMet {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "condition not met")
        }
    }

    impl std::error::Error for NotMet {}

    #[test]
    fn test_discharge_messages_quote_identifiers() {
        let err = MacaroonError::DischargeNotFound {
            caveat_id: "3rd party caveat".to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"cannot find discharge macaroon for caveat "3rd party caveat""#
        );

        let err = MacaroonError::DischargeUsedTwice {
            id: "bob-is-great".to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"discharge macaroon "bob-is-great" was used more than once"#
        );
        assert!(err.is_discharge_error());
    }

    #[test]
    fn test_condition_error_is_transparent() {
        let err = MacaroonError::Condition(Box::new(NotMet));
        assert_eq!(err.to_string(), "condition not met");
        assert!(
            err.condition_error()
                .and_then(|e| e.downcast_ref::<NotMet>())
                .is_some()
        );
        assert!(!err.is_structural());
    }

    #[test]
    fn test_too_big_message() {
        let err = MacaroonError::too_big("caveat location");
        assert_eq!(err.to_string(), "caveat location too big");
        assert!(err.is_structural());
    }
}
