use core::fmt;

pub type ParseResult<T> = core::result::Result<T, ProtocolError>;

/// Ways a response frame can fail to decode.
///
/// Every variant describes a malformed frame; callers recover locally
/// instead of treating these as device failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is shorter than its fixed header plus trailer.
    FrameTooShort { needed: usize, available: usize },
    /// The payload between header and trailer has the wrong size.
    PayloadLength { expected: usize, actual: usize },
    /// The frame does not end with the closing delimiter, so it was read
    /// before it had fully arrived.
    Unterminated,
    /// The serial-number payload is not followed by its NUL terminator.
    MissingNul,
    /// The serial-number payload contains bytes outside 7-bit ASCII.
    NotAscii,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::FrameTooShort { needed, available } => write!(
                f,
                "malformed frame: need at least {needed} bytes, got {available}"
            ),
            ProtocolError::PayloadLength { expected, actual } => write!(
                f,
                "malformed frame: expected {expected} payload bytes, got {actual}"
            ),
            ProtocolError::Unterminated => {
                write!(f, "malformed frame: missing closing delimiter")
            }
            ProtocolError::MissingNul => {
                write!(f, "malformed frame: serial number is not NUL-terminated")
            }
            ProtocolError::NotAscii => write!(f, "malformed frame: payload is not ASCII"),
        }
    }
}

impl std::error::Error for ProtocolError {}
