use thiserror::Error;

/// Errors produced while decoding or interpreting wire bytes.
///
/// These are framing/encoding failures, distinct from the relay's own
/// request-handling error taxonomy (which lives in the `relayd` crate and
/// wraps `ProtoError` where decoding fails mid-request).
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("frame exceeds maximum size ({size} > {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("unexpected end of buffer while decoding {0}")]
    UnexpectedEof(&'static str),

    #[error("invalid value tag: {0:#x}")]
    InvalidTag(u8),

    #[error("string field is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has the wrong type")]
    WrongType { field: &'static str },

    #[error("unrecognized method: {0}")]
    UnknownMethod(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
