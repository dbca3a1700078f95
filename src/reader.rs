//! Given a byte offset, reads the one-byte type code, applies type-code
//! remapping (recording the change in the output buffer), resolves
//! back-references, and constructs the appropriate mapper.

use crate::buffers::Buffers;
use crate::error::Error;
use crate::mappers::{self, pending_handle, MapperKind, MapperRef};
use crate::rules::{Rules, StepResult};
use crate::schema::typecode::{TypeCodeTag, FLAG_REF};
use crate::tables::{InternTable, RefTable};

pub struct Reader<'a> {
    pub buffers: &'a mut Buffers,
    pub interns: &'a mut InternTable,
    pub refs: &'a mut RefTable,
    pub rules: &'a dyn Rules,
    pub version: u32,
}

impl<'a> Reader<'a> {
    pub fn new(
        buffers: &'a mut Buffers,
        interns: &'a mut InternTable,
        refs: &'a mut RefTable,
        rules: &'a dyn Rules,
        version: u32,
    ) -> Self {
        Self { buffers, interns, refs, rules, version }
    }

    /// Read one marshal object starting at `offset`. Returns the mapper
    /// (a shared handle — a fresh one for ordinary objects, or an
    /// existing one for a `TYPE_REF` back-reference) and the number of
    /// bytes consumed *at this occurrence*, which for a back-reference is
    /// always 5 regardless of the referenced mapper's own size.
    pub fn read(&mut self, mut offset: usize) -> Result<(MapperRef, usize), Error> {
        let pre = {
            let (input, output) = self.buffers.split_mut();
            self.rules.pre_step(input, output, offset)
        };
        if let Some(step) = pre {
            match step {
                StepResult::Abort => return Err(Error::Incompatible),
                StepResult::Offset(o) => offset = o,
            }
        }

        let raw = self.buffers.read_u8(offset)?;
        let mut effective = raw;

        // Step 2: whole-byte remap takes precedence over the split remap.
        if let Some(remap) = self.rules.typecode_remap().get(&raw) {
            self.buffers.patch_byte(offset, remap.t)?;
            effective = remap.t;
        }

        let is_ref = effective & FLAG_REF != 0;
        let mut t7 = effective & !FLAG_REF;

        // Step 5: split remap, only consulted if the whole-byte remap
        // above did not already fire.
        if effective == raw {
            if let Some(remap) = self.rules.typecode_remap().get(&t7) {
                let new_byte = remap.t | if is_ref { FLAG_REF } else { 0 };
                self.buffers.patch_byte(offset, new_byte)?;
                t7 = remap.t;
            }
        }

        if t7 == TypeCodeTag::Ref as u8 {
            let index = self.buffers.read_u32_le(offset + 1)? as usize;
            let mapper = self
                .refs
                .get(index)
                .ok_or(Error::UnexpectedTypeCode { offset, raw })?;
            let result = self.run_post_step(offset, mapper, 5)?;
            return Ok(result);
        }

        if let Some(substituted) = self.rules.substitute_mapper(t7, offset) {
            let size = substituted.frame.size;
            let handle = std::rc::Rc::new(std::cell::RefCell::new(substituted));
            if is_ref {
                self.refs.push(handle.clone());
            }
            let result = self.run_post_step(offset, handle, size)?;
            return Ok(result);
        }

        let tag = TypeCodeTag::try_from(t7).map_err(|_| Error::UnexpectedTypeCode { offset, raw })?;

        let handle = pending_handle(t7, offset);
        if is_ref {
            self.refs.push(handle.clone());
        }

        let parsed = mappers::parse_body(self, tag, offset)?;
        let size = parsed.frame.size;
        let is_interned = matches!(&parsed.kind, MapperKind::Str(_)) && tag.is_interned_string();
        *handle.borrow_mut() = parsed;

        if is_interned {
            self.interns.push(handle.clone());
        }

        self.run_post_step(offset, handle, size)
    }

    fn run_post_step(
        &mut self,
        offset: usize,
        mapper: MapperRef,
        consumed: usize,
    ) -> Result<(MapperRef, usize), Error> {
        let post = {
            let (input, output) = self.buffers.split_mut();
            self.rules.post_step(input, output, offset)
        };
        if let Some(StepResult::Abort) = post {
            return Err(Error::Incompatible);
        }
        Ok((mapper, consumed))
    }
}
