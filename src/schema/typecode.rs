use num_enum::TryFromPrimitive;

/// The high bit of a marshal type-code byte: requests registration of the
/// parsed object in the reference table before its body is parsed.
pub const FLAG_REF: u8 = 0x80;

/// A marshal type-code byte, split into its `FLAG_REF` bit and the 7-bit
/// code identifying the object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCode {
    pub raw: u8,
}

impl TypeCode {
    #[must_use]
    pub fn new(raw: u8) -> Self {
        Self { raw }
    }

    #[must_use]
    pub fn is_ref(self) -> bool {
        self.raw & FLAG_REF != 0
    }

    #[must_use]
    pub fn code(self) -> u8 {
        self.raw & !FLAG_REF
    }
}

/// The 7-bit marshal type codes this walker recognizes, matching CPython's
/// `Python/marshal.c` definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum TypeCodeTag {
    /// `TYPE_NULL`
    Null = b'0',
    /// `TYPE_NONE`
    None = b'N',
    /// `TYPE_FALSE`
    False = b'F',
    /// `TYPE_TRUE`
    True = b'T',
    /// `TYPE_STOPITER`
    StopIter = b'S',
    /// `TYPE_ELLIPSIS`
    Ellipsis = b'.',
    /// `TYPE_INT`: 4-byte little-endian signed integer
    Int = b'i',
    /// `TYPE_INT64`, obsolete: 8-byte little-endian signed integer
    Int64 = b'I',
    /// `TYPE_FLOAT`: length-prefixed ASCII text float
    Float = b'f',
    /// `TYPE_BINARY_FLOAT`: 8-byte IEEE-754 little-endian double
    BinaryFloat = b'g',
    /// `TYPE_COMPLEX`: two text floats back to back
    Complex = b'x',
    /// `TYPE_BINARY_COMPLEX`: two binary floats back to back
    BinaryComplex = b'y',
    /// `TYPE_LONG`: arbitrary-precision integer
    Long = b'l',
    /// `TYPE_STRING`: length-prefixed bytes
    String = b's',
    /// `TYPE_STRINGREF`: 4-byte index into the intern table
    StringRef = b'R',
    /// `TYPE_INTERNED`: length-prefixed bytes, interned
    Interned = b't',
    /// `TYPE_REF`: 4-byte index into the reference table
    Ref = b'r',
    /// `TYPE_TUPLE`: 4-byte count then children
    Tuple = b'(',
    /// `TYPE_LIST`: 4-byte count then children
    List = b'[',
    /// `TYPE_DICT`: key/value pairs terminated by `TYPE_NULL`
    Dict = b'{',
    /// `TYPE_CODE`: version-sensitive code object fields
    Code = b'c',
    /// `TYPE_UNICODE`: length-prefixed UTF-8 bytes
    Unicode = b'u',
    /// `TYPE_SET`
    Set = b'<',
    /// `TYPE_FROZENSET`
    FrozenSet = b'>',
    /// `TYPE_ASCII`: length-prefixed ASCII bytes
    Ascii = b'a',
    /// `TYPE_ASCII_INTERNED`: length-prefixed ASCII bytes, interned
    AsciiInterned = b'A',
    /// `TYPE_SMALL_TUPLE`: single-byte count then children
    SmallTuple = b')',
    /// `TYPE_SHORT_ASCII`: single-byte length then ASCII bytes
    ShortAscii = b'z',
    /// `TYPE_SHORT_ASCII_INTERNED`: single-byte length then ASCII bytes, interned
    ShortAsciiInterned = b'Z',
    /// `TYPE_LEGACY_CODE`: pre-3.11 code object layout, obsolete alias
    LegacyCode = b'C',
}

impl TypeCodeTag {
    #[must_use]
    pub fn is_interned_string(self) -> bool {
        matches!(self, Self::Interned | Self::AsciiInterned | Self::ShortAsciiInterned)
    }

    #[must_use]
    pub fn is_short(self) -> bool {
        matches!(self, Self::ShortAscii | Self::ShortAsciiInterned)
    }
}
