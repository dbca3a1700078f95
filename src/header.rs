use bitflags::bitflags;

use crate::buffers::Buffers;
use crate::error::Error;

bitflags! {
    /// Flags word following the magic number in CPython >= 3.7 `.pyc`
    /// headers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        /// Bit 0: the header carries a hash-based-pyc signature instead of
        /// a timestamp + source size.
        const HASH_BASED = 0x1;
        /// Bit 1 (only meaningful when `HASH_BASED` is set): the hash is
        /// "checked" rather than trusted unconditionally at import time.
        const CHECKED_HASH = 0x2;
    }
}

/// Either half of the 8-byte field that follows the flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    SipHash([u8; 8]),
    TimestampSize { timestamp: u32, source_size: u32 },
}

/// Parsed container header. Opaque to the walker aside from `header_size`
/// and `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDescriptor {
    pub magic: [u8; 4],
    pub header_size: usize,
    /// `major*100 + minor`
    pub version: u32,
    pub flags: Option<HeaderFlags>,
    pub hash_kind: Option<HashKind>,
}

/// CPython magic-number -> `major*100+minor` table, restricted to the
/// magic numbers that changed the container header shape (3.7 added the
/// flags word). Extend as new CPython releases ship new magic numbers;
/// unknown magics fall back to treating the header as pre-3.7 shaped,
/// which the rules adapter may override via its own `header_parse`.
fn version_for_magic(magic: [u8; 4]) -> Option<u32> {
    let val = u16::from_le_bytes([magic[0], magic[1]]) as u32;
    Some(match val {
        3379 => 306,
        3394 => 307,
        3413 => 308,
        3425 => 309,
        3439 => 310,
        3495 => 311,
        3531 => 312,
        3600 => 313,
        _ => return None,
    })
}

/// The default, version-agnostic header parser: reads the 4-byte magic,
/// and for versions carrying the post-3.7 flags word, the flags plus
/// either the hash or timestamp+size field. This is the implementation a
/// `Rules` adapter's `header_parse` delegates to unless it needs to repair
/// a tampered header first.
pub fn parse_default(buffers: &Buffers) -> Result<HeaderDescriptor, Error> {
    let magic: [u8; 4] = buffers
        .read_bytes(0, 4)?
        .try_into()
        .map_err(|_| Error::BadHeader("truncated magic".into()))?;
    let version = version_for_magic(magic)
        .ok_or_else(|| Error::BadHeader(format!("unrecognized magic {magic:?}")))?;

    if version < 307 {
        return Ok(HeaderDescriptor {
            magic,
            header_size: 12,
            version,
            flags: None,
            hash_kind: Some(HashKind::TimestampSize {
                timestamp: buffers.read_u32_le(4)?,
                source_size: buffers.read_u32_le(8)?,
            }),
        });
    }

    let raw_flags = buffers.read_u32_le(4)?;
    let flags = HeaderFlags::from_bits_truncate(raw_flags);
    let (header_size, hash_kind) = if flags.contains(HeaderFlags::HASH_BASED) {
        let hash: [u8; 8] = buffers
            .read_bytes(8, 8)?
            .try_into()
            .map_err(|_| Error::BadHeader("truncated hash".into()))?;
        (16, Some(HashKind::SipHash(hash)))
    } else {
        (
            16,
            Some(HashKind::TimestampSize {
                timestamp: buffers.read_u32_le(8)?,
                source_size: buffers.read_u32_le(12)?,
            }),
        )
    };

    Ok(HeaderDescriptor {
        magic,
        header_size,
        version,
        flags: Some(flags),
        hash_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_37_header_has_no_flags() {
        // CPython 3.6 magic (3379), timestamp+size shape, 12-byte header.
        let mut bytes = vec![0x33, 0x0D, 0x0D, 0x0A];
        bytes.extend_from_slice(&1234u32.to_le_bytes());
        bytes.extend_from_slice(&5678u32.to_le_bytes());
        let buffers = Buffers::new(bytes);
        let desc = parse_default(&buffers).unwrap();
        assert_eq!(desc.header_size, 12);
        assert_eq!(desc.version, 306);
        assert!(desc.flags.is_none());
    }

    #[test]
    fn post_37_hash_based_header() {
        // CPython 3.11 magic (3495), hash-based, 16-byte header.
        let mut bytes = vec![0xA7, 0x0D, 0x0D, 0x0A];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let buffers = Buffers::new(bytes);
        let desc = parse_default(&buffers).unwrap();
        assert_eq!(desc.header_size, 16);
        assert_eq!(desc.version, 311);
        assert!(desc.flags.unwrap().contains(HeaderFlags::HASH_BASED));
        assert_eq!(desc.hash_kind, Some(HashKind::SipHash([1, 2, 3, 4, 5, 6, 7, 8])));
    }

    #[test]
    fn post_37_timestamp_header() {
        let mut bytes = vec![0xA7, 0x0D, 0x0D, 0x0A];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        bytes.extend_from_slice(&42u32.to_le_bytes());
        let buffers = Buffers::new(bytes);
        let desc = parse_default(&buffers).unwrap();
        assert_eq!(desc.header_size, 16);
        assert_eq!(
            desc.hash_kind,
            Some(HashKind::TimestampSize { timestamp: 1_700_000_000, source_size: 42 })
        );
    }
}
