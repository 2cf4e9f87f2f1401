//! Structural decode errors.

/// Failure to decode a wire value.
///
/// Every decoder in the workspace returns this type; none of them panic on
/// malformed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid bool byte 0x{0:02x}")]
    InvalidBool(u8),

    #[error("{remaining} trailing bytes after decode")]
    TrailingBytes { remaining: usize },

    #[error("{field} is {size} bytes, max {max}")]
    TooLarge {
        field: &'static str,
        size: usize,
        max: usize,
    },

    #[error("invalid UTF-8")]
    InvalidUtf8,

    #[error("unknown {kind} type 0x{tag:02x}")]
    UnknownType { kind: &'static str, tag: u8 },

    #[error("unsupported codec version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid {0}")]
    Invalid(&'static str),
}
