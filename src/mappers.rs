//! One entity per parsed marshal object kind. Each mapper records its own
//! on-wire `Frame` (type code, start offset, total byte size including the
//! type-code byte) and, for container kinds, owns its child mappers.
//!
//! Mappers are constructed by [`crate::reader::Reader::read`], which also
//! handles type-code remapping and reference/intern table bookkeeping;
//! this module only knows how to measure a kind's own size and descend
//! into its children once the Reader has identified what kind it is.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use crate::error::Error;
use crate::opcodes;
use crate::reader::Reader;
use crate::schema::code_layout::code_layout;
use crate::schema::typecode::TypeCodeTag;

/// `(typecode, offset, size)` shared by every mapper kind. `size` always
/// includes the leading type-code byte, and `input[offset..offset+size]`
/// is exactly that mapper's on-wire encoding.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub typecode: u8,
    pub offset: usize,
    pub size: usize,
}

/// An arbitrary-precision integer's shape, enough for size accounting.
/// See `DESIGN.md` for the long-integer sign-encoding decision.
#[derive(Debug, Clone, Copy)]
pub struct LongValue {
    pub negative: bool,
    /// Number of 15-bit "marshal digits", each stored as a 2-byte
    /// little-endian short.
    pub digit_count: u32,
}

/// A parsed `TYPE_CODE`/`TYPE_LEGACY_CODE` object. Field presence and
/// width are selected by [`code_layout`] from the header's `version`.
#[derive(Debug)]
pub struct CodeObject {
    pub argc: u32,
    pub posonlyargc: u32,
    pub kwonlyargc: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    pub firstlineno: u32,
    pub code: MapperRef,
    pub consts: MapperRef,
    pub names: MapperRef,
    pub varnames: Option<MapperRef>,
    pub localspluskinds: Option<MapperRef>,
    pub freevars: Option<MapperRef>,
    pub cellvars: Option<MapperRef>,
    pub filename: MapperRef,
    pub name: MapperRef,
    pub qualname: Option<MapperRef>,
    pub lnotab: Option<MapperRef>,
    pub exceptiontable: Option<MapperRef>,
}

/// The kind-specific payload of a [`Mapper`]. `Pending` is a transient
/// placeholder used only for the span between a `FLAG_REF` object's type
/// byte being registered in the reference table and its body finishing
/// parsing — real consumers never observe it after a walk completes.
#[derive(Debug)]
pub enum MapperKind {
    Pending,
    Trivial,
    Int(i32),
    Int64(i64),
    Long(LongValue),
    Float(f64),
    BinaryFloat(f64),
    Complex(f64, f64),
    BinaryComplex(f64, f64),
    /// Raw payload bytes of any string-like kind (`STRING`, `UNICODE`,
    /// `INTERNED`, `ASCII`, `ASCII_INTERNED`, `SHORT_ASCII`,
    /// `SHORT_ASCII_INTERNED`) — the exact kind is `frame.typecode`.
    Str(Vec<u8>),
    /// Resolved intern-table entry for a `TYPE_STRINGREF` occurrence.
    StringRef(MapperRef),
    Tuple(Vec<MapperRef>),
    List(Vec<MapperRef>),
    Set(Vec<MapperRef>),
    FrozenSet(Vec<MapperRef>),
    Dict(Vec<(MapperRef, MapperRef)>),
    Code(Box<CodeObject>),
}

/// A single parsed marshal object.
#[derive(Debug)]
pub struct Mapper {
    pub frame: Frame,
    pub kind: MapperKind,
}

/// Shared handle to a mapper. `RefCell` lets a `FLAG_REF` object be
/// registered in the reference table before its body is known, so a
/// self-referential child can hold the same handle and see the finished
/// value once parsing completes — ownership of the tree never cycles,
/// only these shared handles do.
pub type MapperRef = Rc<RefCell<Mapper>>;

/// A placeholder handle for a `FLAG_REF` object: registered in the
/// reference table before the body is known, overwritten once parsing
/// completes.
pub(crate) fn pending_handle(typecode: u8, offset: usize) -> MapperRef {
    Rc::new(RefCell::new(Mapper {
        frame: Frame { typecode, offset, size: 1 },
        kind: MapperKind::Pending,
    }))
}

/// Byte range of a string-like mapper's payload, excluding its length
/// prefix (1 byte for the two `SHORT_ASCII*` kinds, 4 bytes otherwise).
#[must_use]
pub fn string_payload_range(frame: Frame) -> Range<usize> {
    let tag = TypeCodeTag::try_from(frame.typecode).ok();
    let prefix = if tag.is_some_and(TypeCodeTag::is_short) { 2 } else { 5 };
    (frame.offset + prefix)..(frame.offset + frame.size)
}

/// Parse the body of the object whose type byte was at `offset` and whose
/// 7-bit code is `tag`. The leading type-code byte has already been
/// accounted for; this fills in `frame.size` and the kind-specific
/// payload.
pub(crate) fn parse_body(reader: &mut Reader<'_>, tag: TypeCodeTag, offset: usize) -> Result<Mapper, Error> {
    use TypeCodeTag::*;

    let frame1 = |typecode: u8, size: usize| Frame { typecode, offset, size };

    Ok(match tag {
        Null | None | False | True | StopIter | Ellipsis => {
            Mapper { frame: frame1(tag as u8, 1), kind: MapperKind::Trivial }
        }
        Int => {
            let value = reader.buffers.read_i32_le(offset + 1)?;
            Mapper { frame: frame1(tag as u8, 5), kind: MapperKind::Int(value) }
        }
        Int64 => {
            let value = reader.buffers.read_i64_le(offset + 1)?;
            Mapper { frame: frame1(tag as u8, 9), kind: MapperKind::Int64(value) }
        }
        Long => {
            let length = reader.buffers.read_i32_le(offset + 1)?;
            let negative = length < 0;
            let digit_count = length.unsigned_abs();
            let digits_start = offset + 5;
            for i in 0..digit_count as usize {
                let digit_offset = digits_start + i * 2;
                let digit = u16::from_le_bytes(
                    reader.buffers.read_bytes(digit_offset, 2)?.try_into().unwrap(),
                );
                // marshal longs pack 15-bit digits into a 2-byte field
                // (CPython's PyLong_MARSHAL_SHIFT); bit 15 set is invalid.
                if digit & 0x8000 != 0 {
                    return Err(Error::MalformedLong { offset });
                }
            }
            let size = 1 + 4 + (digit_count as usize) * 2;
            Mapper {
                frame: frame1(tag as u8, size),
                kind: MapperKind::Long(LongValue { negative, digit_count }),
            }
        }
        Float => {
            let n = reader.buffers.read_u8(offset + 1)? as usize;
            let text = reader.buffers.read_bytes(offset + 2, n)?;
            let value = parse_ascii_float(reader, offset, text);
            Mapper { frame: frame1(tag as u8, 2 + n), kind: MapperKind::Float(value) }
        }
        BinaryFloat => {
            let value = reader.buffers.read_f64_le(offset + 1)?;
            Mapper { frame: frame1(tag as u8, 9), kind: MapperKind::BinaryFloat(value) }
        }
        Complex => {
            let n1 = reader.buffers.read_u8(offset + 1)? as usize;
            let real_text = reader.buffers.read_bytes(offset + 2, n1)?;
            let real = parse_ascii_float(reader, offset, real_text);
            let imag_off = offset + 2 + n1;
            let n2 = reader.buffers.read_u8(imag_off)? as usize;
            let imag_text = reader.buffers.read_bytes(imag_off + 1, n2)?;
            let imag = parse_ascii_float(reader, imag_off, imag_text);
            let size = (imag_off + 1 + n2) - offset;
            Mapper { frame: frame1(tag as u8, size), kind: MapperKind::Complex(real, imag) }
        }
        BinaryComplex => {
            let real = reader.buffers.read_f64_le(offset + 1)?;
            let imag = reader.buffers.read_f64_le(offset + 9)?;
            Mapper { frame: frame1(tag as u8, 17), kind: MapperKind::BinaryComplex(real, imag) }
        }
        String | Unicode | Interned | Ascii | AsciiInterned => {
            let len = reader.buffers.read_u32_le(offset + 1)? as usize;
            let bytes = reader.buffers.read_bytes(offset + 5, len)?.to_vec();
            Mapper { frame: frame1(tag as u8, 5 + len), kind: MapperKind::Str(bytes) }
        }
        ShortAscii | ShortAsciiInterned => {
            let len = reader.buffers.read_u8(offset + 1)? as usize;
            let bytes = reader.buffers.read_bytes(offset + 2, len)?.to_vec();
            Mapper { frame: frame1(tag as u8, 2 + len), kind: MapperKind::Str(bytes) }
        }
        StringRef => {
            let index = reader.buffers.read_u32_le(offset + 1)? as usize;
            let target = reader
                .interns
                .get(index)
                .ok_or(Error::UnexpectedTypeCode { offset, raw: tag as u8 })?;
            Mapper { frame: frame1(tag as u8, 5), kind: MapperKind::StringRef(target) }
        }
        Tuple => {
            let count = reader.buffers.read_u32_le(offset + 1)? as usize;
            let (children, end) = read_children(reader, offset + 5, count)?;
            Mapper { frame: frame1(tag as u8, end - offset), kind: MapperKind::Tuple(children) }
        }
        SmallTuple => {
            let count = reader.buffers.read_u8(offset + 1)? as usize;
            let (children, end) = read_children(reader, offset + 2, count)?;
            Mapper { frame: frame1(tag as u8, end - offset), kind: MapperKind::Tuple(children) }
        }
        List => {
            let count = reader.buffers.read_u32_le(offset + 1)? as usize;
            let (children, end) = read_children(reader, offset + 5, count)?;
            Mapper { frame: frame1(tag as u8, end - offset), kind: MapperKind::List(children) }
        }
        Set => {
            let count = reader.buffers.read_u32_le(offset + 1)? as usize;
            let (children, end) = read_children(reader, offset + 5, count)?;
            Mapper { frame: frame1(tag as u8, end - offset), kind: MapperKind::Set(children) }
        }
        FrozenSet => {
            let count = reader.buffers.read_u32_le(offset + 1)? as usize;
            let (children, end) = read_children(reader, offset + 5, count)?;
            Mapper { frame: frame1(tag as u8, end - offset), kind: MapperKind::FrozenSet(children) }
        }
        Dict => {
            let mut pairs = Vec::new();
            let mut cur = offset + 1;
            loop {
                let (key, consumed) = reader.read(cur)?;
                cur += consumed;
                if key.borrow().frame.typecode == TypeCodeTag::Null as u8 {
                    break;
                }
                let (value, consumed) = reader.read(cur)?;
                cur += consumed;
                pairs.push((key, value));
            }
            Mapper { frame: frame1(tag as u8, cur - offset), kind: MapperKind::Dict(pairs) }
        }
        Code | LegacyCode => {
            let (code_obj, end) = parse_code_object(reader, offset)?;
            Mapper {
                frame: frame1(tag as u8, end - offset),
                kind: MapperKind::Code(Box::new(code_obj)),
            }
        }
    })
}

fn parse_ascii_float(_reader: &Reader<'_>, offset: usize, text: &[u8]) -> f64 {
    let parsed = std::str::from_utf8(text).ok().and_then(|s| s.parse::<f64>().ok());
    parsed.unwrap_or_else(|| {
        log::warn!("offset {offset}: unsupported float width/text {text:?}, using NaN");
        f64::NAN
    })
}

fn read_children(reader: &mut Reader<'_>, start: usize, count: usize) -> Result<(Vec<MapperRef>, usize), Error> {
    let mut children = Vec::with_capacity(count);
    let mut cur = start;
    for _ in 0..count {
        let (child, consumed) = reader.read(cur)?;
        cur += consumed;
        children.push(child);
    }
    Ok((children, cur))
}

fn parse_code_object(reader: &mut Reader<'_>, offset: usize) -> Result<(CodeObject, usize), Error> {
    let layout = code_layout(reader.version);
    let mut cur = offset + 1;

    let mut read_field = |reader: &Reader<'_>, cur: &mut usize, width: u8| -> Result<u32, Error> {
        if width == 0 {
            return Ok(0);
        }
        let value = if width == 2 {
            u32::from(u16::from_le_bytes(
                reader.buffers.read_bytes(*cur, 2)?.try_into().unwrap(),
            ))
        } else {
            reader.buffers.read_u32_le(*cur)?
        };
        *cur += width as usize;
        Ok(value)
    };

    let argc = read_field(reader, &mut cur, layout.argc)?;
    let posonlyargc = read_field(reader, &mut cur, layout.posonlyargc)?;
    let kwonlyargc = read_field(reader, &mut cur, layout.kwonlyargc)?;
    let nlocals = read_field(reader, &mut cur, layout.nlocals)?;
    let stacksize = read_field(reader, &mut cur, layout.stacksize)?;
    let flags = read_field(reader, &mut cur, layout.flags)?;

    let (code, consumed) = reader.read(cur)?;
    cur += consumed;
    {
        let frame = code.borrow().frame;
        let payload = string_payload_range(frame);
        opcodes::rewrite(reader.buffers, payload, reader.version, reader.rules)?;
    }

    let (consts, consumed) = reader.read(cur)?;
    cur += consumed;
    let (names, consumed) = reader.read(cur)?;
    cur += consumed;

    let varnames = if layout.has_varnames {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let localspluskinds = if layout.has_localspluskinds {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let freevars = if layout.has_freevars {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let cellvars = if layout.has_cellvars {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let (filename, consumed) = reader.read(cur)?;
    cur += consumed;
    let (name, consumed) = reader.read(cur)?;
    cur += consumed;

    let qualname = if layout.has_qualname {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let firstlineno = read_field(reader, &mut cur, layout.firstlineno)?;

    let lnotab = if layout.has_lnotab {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let exceptiontable = if layout.has_exceptiontable {
        let (m, consumed) = reader.read(cur)?;
        cur += consumed;
        Some(m)
    } else {
        None
    };

    let code_obj = CodeObject {
        argc,
        posonlyargc,
        kwonlyargc,
        nlocals,
        stacksize,
        flags,
        firstlineno,
        code,
        consts,
        names,
        varnames,
        localspluskinds,
        freevars,
        cellvars,
        filename,
        name,
        qualname,
        lnotab,
        exceptiontable,
    };
    Ok((code_obj, cur))
}
