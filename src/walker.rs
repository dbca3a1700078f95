//! Ties the pieces together: compatibility check, header parse, a single
//! recursive descent from the first object following the header, and
//! trailer finalization.

use crate::buffers::Buffers;
use crate::error::Error;
use crate::reader::Reader;
use crate::rules::Rules;
use crate::tables::{InternTable, RefTable};

/// Walks one container's worth of bytes and returns the output buffer's
/// final length after `rules.trailer_finalize` has had a chance to
/// truncate it (a rules adapter may drop trailing padding the source
/// container carried; every byte up to that point is size-preserving).
pub struct Walker {
    buffers: Buffers,
}

impl Walker {
    #[must_use]
    pub fn new(input: Vec<u8>) -> Self {
        Self { buffers: Buffers::new(input) }
    }

    pub fn walk(&mut self, rules: &dyn Rules) -> Result<usize, Error> {
        if !rules.is_compatible(self.buffers.input()) {
            return Err(Error::Incompatible);
        }

        let header = {
            let (input, output) = self.buffers.split_mut();
            rules.header_parse(input, output)?
        };

        let mut interns = InternTable::new();
        let mut refs = RefTable::new();
        {
            let mut reader = Reader::new(&mut self.buffers, &mut interns, &mut refs, rules, header.version);
            reader.read(header.header_size)?;
        }

        rules.trailer_finalize(self.buffers.input(), self.buffers.output())
    }

    /// The output buffer as it stands, truncated to `walk`'s returned
    /// length by the caller if desired. Exposed mainly for tests; the
    /// binary front end handles writing it out.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        self.buffers.output()
    }
}
