//! Walks a code object's instruction stream and applies opcode
//! substitution. A forward-only sweep: it tolerates misaligned streams
//! (an obfuscated input may not decode into true instruction boundaries)
//! by never interpreting an argument, only ever substituting bytes in
//! place.

use std::ops::Range;

use crate::buffers::Buffers;
use crate::error::Error;
use crate::rules::Rules;

/// CPython's `HAVE_ARGUMENT` boundary for the pre-wordcode (< 3.6)
/// instruction encoding: opcodes at or above this value carry a 2-byte
/// argument (3 bytes total per instruction); opcodes below it carry none.
pub const HAVE_ARGUMENT: u8 = 90;

/// CPython version (`major*100+minor`) at which the bytecode stream
/// switched to fixed 2-byte "wordcode" instructions.
pub const WORDCODE_VERSION: u32 = 306;

fn default_stride(version: u32, op: u64) -> usize {
    if version >= WORDCODE_VERSION {
        2
    } else if op > u64::from(HAVE_ARGUMENT) {
        3
    } else {
        1
    }
}

/// Rewrite the opcode stream occupying `payload` (a byte range within
/// both buffers) according to `rules.opcode_remap()`. Reads always come
/// from `input`; writes always land on `output`, one instruction at a
/// time, each write exactly as wide as `rules.opcode_size()`.
pub fn rewrite(
    buffers: &mut Buffers,
    payload: Range<usize>,
    version: u32,
    rules: &dyn Rules,
) -> Result<(), Error> {
    let op_size = rules.opcode_size().max(1) as usize;
    let mut rdi = payload.start;

    while rdi < payload.end {
        let remaining = payload.end - rdi;
        let width = op_size.min(remaining);
        let op_bytes = buffers.read_bytes(rdi, width)?;
        let op_i = le_bytes_to_u64(op_bytes);

        let stride = match rules.opcode_remap().get(op_bytes) {
            Some(remap) => {
                if let Some(bytes) = &remap.bytes {
                    buffers.patch_bytes(rdi, bytes)?;
                }
                remap.stride.map(usize::from).unwrap_or_else(|| default_stride(version, op_i))
            }
            None => default_stride(version, op_i),
        };

        rdi += stride.max(1);
    }

    Ok(())
}

fn le_bytes_to_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
    u64::from_le_bytes(buf)
}
