use std::{error, fmt};

/// Errors produced while walking a marshal stream.
///
/// These are the fatal conditions of the core walker (see the module
/// walker's `walk` operation). Recoverable conditions (an unsupported
/// float width, for instance) are logged and skipped rather than
/// represented here.
#[derive(Debug, Clone)]
pub enum Error {
    /// The rules adapter rejected the input before any parsing began.
    Incompatible,
    /// A type-code byte that is neither a recognized marshal code nor
    /// remapped to one.
    UnexpectedTypeCode { offset: usize, raw: u8 },
    /// A `LONG` object's length field decoded to a sub-code the walker
    /// does not know how to interpret.
    MalformedLong { offset: usize },
    /// The rules adapter's header parser rejected or could not find a
    /// valid container header.
    BadHeader(String),
    /// Reading past the end of either buffer.
    BufferOverflow { offset: usize, requested: usize },
    /// A rules-file (declarative config) failed to parse.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incompatible => write!(f, "input incompatible with rules"),
            Self::UnexpectedTypeCode { offset, raw } => {
                write!(f, "unexpected type code 0x{raw:02x} at offset {offset}")
            }
            Self::MalformedLong { offset } => {
                write!(f, "malformed long-integer type code at offset {offset}")
            }
            Self::BadHeader(msg) => write!(f, "bad header: {msg}"),
            Self::BufferOverflow { offset, requested } => {
                write!(f, "buffer overflow reading {requested} bytes at offset {offset}")
            }
            Self::Config(msg) => write!(f, "bad rules config: {msg}"),
        }
    }
}

impl error::Error for Error {}
