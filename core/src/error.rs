//! # Errors
//!
//! All fallible operations in the engine surface the [`Error`] enum. Failures
//! are terminal for the invocation that raised them: the buffer may contain
//! partial output and its cursor position is unspecified afterwards.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A single-assignment hook was assigned twice, or a resolver produced a
    /// formatter of the wrong type.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Configuration was mutated after the first serialize/deserialize call.
    #[error("configuration is locked once (de)serialization has started: {0}")]
    ConfigurationLocked(&'static str),

    /// A type outside the known-types table in sealed mode, or a persistent
    /// type name the binder cannot resolve.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A declared length exceeds its configured limit, or the stream is
    /// structurally malformed (negative prefix, bad tag, overlong varint).
    ///
    /// Raised before any allocation proportional to the declared size.
    #[error("malicious input: {0}")]
    MaliciousInput(String),

    /// A member present in the stream cannot be decoded into the current type.
    #[error("schema mismatch on `{type_name}${member}`: {detail}")]
    SchemaMismatch {
        type_name: String,
        member: String,
        detail: String,
    },

    /// A delegate was encountered that the configured
    /// [`DelegateSerialization`](crate::config::DelegateSerialization) mode
    /// rejects.
    #[error("delegate `{name}` not allowed: {reason}")]
    DelegateNotAllowed { name: String, reason: &'static str },

    /// The embedded protocol checksum does not match this configuration.
    #[error("checksum mismatch: stream has {found:#010x}, expected {expected:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },

    /// A read ran past the end of the provided buffer.
    #[error("unexpected end of stream")]
    EndOfStream(#[from] std::io::Error),

    /// A member payload exceeded the signed 16-bit frame bound of the
    /// version-tolerant format.
    #[error("member `{member}` encoded to {size} bytes, over the 16-bit frame bound")]
    MemberTooLarge { member: String, size: usize },
}

impl Error {
    pub(crate) fn mismatch(
        type_name: impl Into<String>,
        member: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::SchemaMismatch {
            type_name: type_name.into(),
            member: member.into(),
            detail: detail.into(),
        }
    }
}
